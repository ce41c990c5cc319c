//! Execution result records.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::context::ExecutionContext;

/// Outcome of one executor run.
///
/// Built exactly once per run and never mutated afterwards; it is what gets
/// registered in the project history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub wfid: String,
    pub execid: String,
    pub projectid: String,

    /// Notebook name.
    pub name: String,

    pub params: HashMap<String, String>,

    /// Input notebook path.
    #[serde(rename = "input_")]
    pub input: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_dir: Option<String>,

    #[serde(default)]
    pub error: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,

    pub elapsed_secs: f64,

    pub created_at: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine: Option<String>,

    /// Image the run used, for containerized runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
}

impl ExecutionResult {
    /// Successful result carrying the context's output locations.
    pub fn from_context(ctx: &ExecutionContext, elapsed_secs: f64) -> Self {
        Self {
            wfid: ctx.wfid.clone(),
            execid: ctx.execid.clone(),
            projectid: ctx.projectid.clone(),
            name: ctx.nb_name.clone(),
            params: ctx.params.clone(),
            input: ctx.pm_input.clone(),
            output_dir: Some(ctx.output_dir.clone()),
            output_name: Some(ctx.output_name.clone()),
            error_dir: Some(ctx.error_dir.clone()),
            error: false,
            error_msg: None,
            elapsed_secs: round_secs(elapsed_secs),
            created_at: ctx.created_at.clone(),
            machine: None,
            runtime: None,
            cluster: None,
        }
    }

    /// Result of a run inside a container. Output locations belong to the
    /// container, so none are recorded here.
    pub fn from_container(ctx: &ExecutionContext, elapsed_secs: f64) -> Self {
        Self {
            output_dir: None,
            output_name: None,
            error_dir: None,
            machine: Some(ctx.machine.clone()),
            runtime: Some(ctx.docker_name.clone()),
            cluster: ctx.cluster.clone(),
            ..Self::from_context(ctx, elapsed_secs)
        }
    }

    /// Mark the result as failed.
    pub fn with_error(mut self, message: Option<String>) -> Self {
        self.error = true;
        self.error_msg = message;
        self
    }

    /// Returns true when an output artifact is referenced.
    pub fn has_artifact(&self) -> bool {
        self.output_name.is_some()
    }

    /// History status code: 0 ok, -1 failed.
    pub fn status(&self) -> i32 {
        if self.error {
            -1
        } else {
            0
        }
    }
}

/// Outcome of a runtime image build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildResult {
    pub projectid: String,
    pub execid: String,

    /// Built image reference.
    pub docker_name: String,

    #[serde(default)]
    pub error: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,

    pub elapsed_secs: f64,
}

/// Round to two decimals.
pub fn round_secs(secs: f64) -> f64 {
    (secs * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ExecutionContext {
        ExecutionContext {
            projectid: "p1".to_string(),
            wfid: "wf1".to_string(),
            execid: "xyz".to_string(),
            nb_name: "train".to_string(),
            machine: "gpu".to_string(),
            docker_name: "acme/churn:0.1".to_string(),
            params: HashMap::new(),
            pm_input: "workflows/train.ipynb".to_string(),
            pm_output: "outputs/ok/2024-01-05/train.xyz.ipynb".to_string(),
            output_name: "train.xyz.ipynb".to_string(),
            output_dir: "outputs/ok/2024-01-05".to_string(),
            error_dir: "outputs/errors/2024-01-05".to_string(),
            today: "2024-01-05".to_string(),
            timeout: 60,
            created_at: "2024-01-05T08:30:00.000000".to_string(),
            cluster: None,
        }
    }

    #[test]
    fn test_from_context() {
        let result = ExecutionResult::from_context(&ctx(), 1.23456);
        assert!(!result.error);
        assert_eq!(result.elapsed_secs, 1.23);
        assert!(result.has_artifact());
        assert_eq!(result.status(), 0);
    }

    #[test]
    fn test_from_container() {
        let result =
            ExecutionResult::from_container(&ctx(), 2.0).with_error(Some("OOM".to_string()));
        assert!(result.error);
        assert_eq!(result.error_msg.as_deref(), Some("OOM"));
        assert!(!result.has_artifact());
        assert_eq!(result.runtime.as_deref(), Some("acme/churn:0.1"));
        assert_eq!(result.status(), -1);
    }

    #[test]
    fn test_result_serialization() {
        let result = ExecutionResult::from_container(&ctx(), 2.0);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["input_"], "workflows/train.ipynb");
        assert!(json.get("output_name").is_none());
        assert_eq!(json["error"], false);
    }
}
