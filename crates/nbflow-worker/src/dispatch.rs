//! Dispatch entry points.
//!
//! Each entry point takes an opaque JSON payload from the queue, decodes it
//! into a typed request, performs exactly one operation and encodes the
//! resulting record back to JSON. Decoding happens before any side effect.

use nbflow_cluster::{ClusterProvider, MachineRequest, ProviderError};
use nbflow_exec::executor::{BuildContext, BuildExecutor};
use nbflow_exec::{
    execute, ContextBuilder, ExecError, ExecId, ExecutionContext, Executor, Firm, ProjectData,
    WorkflowData,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Dispatch errors.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Payload does not match the request type. Nothing was executed.
    #[error("Invalid payload: {0}")]
    Decode(String),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Failed to encode result: {0}")]
    Encode(String),
}

impl DispatchError {
    /// Redelivering the same message cannot succeed.
    pub fn is_permanent(&self) -> bool {
        match self {
            DispatchError::Decode(_) | DispatchError::Encode(_) => true,
            DispatchError::Exec(e) => e.is_setup(),
            DispatchError::Provider(e) => matches!(
                e,
                ProviderError::NotFound { .. }
                    | ProviderError::Ambiguous { .. }
                    | ProviderError::Config(_)
            ),
        }
    }
}

/// Queue message routed to one entry point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum DispatchRequest {
    Notebook(Value),
    Workflow(Value),
    Build(Value),
    CreateInstance(Value),
}

/// Workflow payload: a stored definition, or a context from a previous run.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum WorkflowPayload {
    Definition { project: ProjectData, workflow: WorkflowData },
    Context(ExecutionContext),
}

fn decode<T: DeserializeOwned>(payload: Value) -> Result<T, DispatchError> {
    serde_json::from_value(payload).map_err(|e| DispatchError::Decode(e.to_string()))
}

fn encode<T: Serialize>(record: &T) -> Result<Value, DispatchError> {
    serde_json::to_value(record).map_err(|e| DispatchError::Encode(e.to_string()))
}

/// Executor for one project, built per dispatch.
pub trait ExecutorFactory: Send + Sync {
    fn for_project(&self, projectid: &str) -> Arc<dyn Executor>;
}

impl<F> ExecutorFactory for F
where
    F: Fn(&str) -> Arc<dyn Executor> + Send + Sync,
{
    fn for_project(&self, projectid: &str) -> Arc<dyn Executor> {
        self(projectid)
    }
}

/// Routes payloads to an executor, the build executor or the cluster provider.
pub struct Dispatcher {
    builder: ContextBuilder,
    executors: Arc<dyn ExecutorFactory>,
    builds: BuildExecutor,
    provider: Option<Arc<dyn ClusterProvider>>,
}

impl Dispatcher {
    pub fn new(
        builder: ContextBuilder,
        executors: Arc<dyn ExecutorFactory>,
        builds: BuildExecutor,
    ) -> Self {
        Self {
            builder,
            executors,
            builds,
            provider: None,
        }
    }

    async fn run(&self, ctx: &ExecutionContext) -> Result<Value, DispatchError> {
        let executor = self.executors.for_project(&ctx.projectid);
        let result = execute(executor.as_ref(), ctx).await?;
        encode(&result)
    }

    pub fn with_provider(mut self, provider: Arc<dyn ClusterProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Run a pre-built execution context.
    pub async fn notebook_dispatcher(&self, payload: Value) -> Result<Value, DispatchError> {
        let ctx: ExecutionContext = decode(payload)?;
        self.run(&ctx).await
    }

    /// Run a workflow under a fresh identity stamped now.
    pub async fn workflow_dispatcher(&self, payload: Value) -> Result<Value, DispatchError> {
        let identity = ExecId::new().with_firm(Firm::Dispatcher);
        let ctx = match decode::<WorkflowPayload>(payload)? {
            WorkflowPayload::Definition { project, workflow } => {
                self.builder.build(&project, &workflow, &identity)?
            }
            WorkflowPayload::Context(previous) => self.builder.refresh(&previous, &identity),
        };

        tracing::debug!(wfid = %ctx.wfid, execid = %ctx.execid, "Workflow dispatched");
        self.run(&ctx).await
    }

    /// Build a runtime image.
    pub async fn build_dispatcher(&self, payload: Value) -> Result<Value, DispatchError> {
        let ctx: BuildContext = decode(payload)?;
        let result = self.builds.run(&ctx).await?;
        encode(&result)
    }

    /// Create a compute instance.
    pub async fn create_instance(&self, payload: Value) -> Result<Value, DispatchError> {
        let request: MachineRequest = decode(payload)?;
        let provider = self
            .provider
            .as_ref()
            .ok_or_else(|| ProviderError::Config("No cluster provider configured".to_string()))?;

        let instance = provider.create_machine(&request).await?;
        tracing::info!(
            machine_id = %instance.machine_id,
            main_addr = ?instance.main_addr,
            "Instance created"
        );
        encode(&instance)
    }

    /// Route a queue message to its entry point.
    pub async fn dispatch(&self, payload: Value) -> Result<Value, DispatchError> {
        match decode::<DispatchRequest>(payload)? {
            DispatchRequest::Notebook(p) => self.notebook_dispatcher(p).await,
            DispatchRequest::Workflow(p) => self.workflow_dispatcher(p).await,
            DispatchRequest::Build(p) => self.build_dispatcher(p).await,
            DispatchRequest::CreateInstance(p) => self.create_instance(p).await,
        }
    }
}
