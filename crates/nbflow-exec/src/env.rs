//! Handoff message between the orchestrator and a containerized run.
//!
//! The container receives four environment variables:
//! - `NB_EXECUTIONTASK`: the execution context as JSON
//! - `NB_AGENT_PRIVKEY`: the project agent private key
//! - `NB_WORKFLOW_SERVICE`: project service address
//! - `NB_BASE_PATH`: working directory inside the container

use std::collections::HashMap;
use std::fmt;

use crate::context::ExecutionContext;
use crate::error::ExecError;

pub const EXECUTIONTASK_VAR: &str = "NB_EXECUTIONTASK";
pub const PRIVKEY_VAR: &str = "NB_AGENT_PRIVKEY";
pub const SERVICE_VAR: &str = "NB_WORKFLOW_SERVICE";
pub const BASE_PATH_VAR: &str = "NB_BASE_PATH";

/// Base path of the project inside runtime images.
pub const CONTAINER_BASE_PATH: &str = "/app";

/// Typed form of the container environment.
#[derive(Clone, PartialEq, Eq)]
pub struct ContainerEnv {
    pub context: ExecutionContext,
    pub private_key: String,
    pub service_address: String,
    pub base_path: String,
}

impl fmt::Debug for ContainerEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerEnv")
            .field("context", &self.context)
            .field("private_key", &"<redacted>")
            .field("service_address", &self.service_address)
            .field("base_path", &self.base_path)
            .finish()
    }
}

impl ContainerEnv {
    pub fn new(context: ExecutionContext, private_key: String, service_address: String) -> Self {
        Self {
            context,
            private_key,
            service_address,
            base_path: CONTAINER_BASE_PATH.to_string(),
        }
    }

    /// Encode as environment variables.
    pub fn to_vars(&self) -> Result<HashMap<String, String>, ExecError> {
        let mut vars = HashMap::with_capacity(4);
        vars.insert(EXECUTIONTASK_VAR.to_string(), serde_json::to_string(&self.context)?);
        vars.insert(PRIVKEY_VAR.to_string(), self.private_key.clone());
        vars.insert(SERVICE_VAR.to_string(), self.service_address.clone());
        vars.insert(BASE_PATH_VAR.to_string(), self.base_path.clone());
        Ok(vars)
    }

    /// Decode from a variable lookup. A missing private key is a setup error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ExecError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw = lookup(EXECUTIONTASK_VAR)
            .ok_or_else(|| ExecError::Setup(format!("{} is not set", EXECUTIONTASK_VAR)))?;
        let context: ExecutionContext = serde_json::from_str(&raw)?;

        let private_key = lookup(PRIVKEY_VAR)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ExecError::Setup(format!("{} is not set", PRIVKEY_VAR)))?;

        let service_address = lookup(SERVICE_VAR)
            .ok_or_else(|| ExecError::Setup(format!("{} is not set", SERVICE_VAR)))?;

        let base_path = lookup(BASE_PATH_VAR).unwrap_or_else(|| CONTAINER_BASE_PATH.to_string());

        Ok(Self {
            context,
            private_key,
            service_address,
            base_path,
        })
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ExecError> {
        Self::from_lookup(|name| vars.get(name).cloned())
    }

    /// Decode from the current process environment.
    pub fn from_process_env() -> Result<Self, ExecError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }
}
