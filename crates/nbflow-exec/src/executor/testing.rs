//! In-memory collaborators for executor tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use super::local::{NotebookEngine, NotebookFailure};
use crate::client::ProjectClient;
use crate::context::ExecutionContext;
use crate::error::ExecError;
use crate::result::ExecutionResult;
use crate::runtime::{BuildSpec, ContainerRunResult, ContainerRuntime, ContainerSpec};

pub fn sample_context() -> ExecutionContext {
    let mut params = HashMap::new();
    params.insert("EXECID".to_string(), "xyz".to_string());
    ExecutionContext {
        projectid: "p1".to_string(),
        wfid: "wf1".to_string(),
        execid: "xyz".to_string(),
        nb_name: "train".to_string(),
        machine: "cpu".to_string(),
        docker_name: "acme/churn:0.1".to_string(),
        params,
        pm_input: "workflows/train.ipynb".to_string(),
        pm_output: "outputs/ok/2024-01-05/train.xyz.ipynb".to_string(),
        output_name: "train.xyz.ipynb".to_string(),
        output_dir: "outputs/ok/2024-01-05".to_string(),
        error_dir: "outputs/errors/2024-01-05".to_string(),
        today: "2024-01-05".to_string(),
        timeout: 30,
        created_at: "2024-01-05T08:30:00.000000".to_string(),
        cluster: None,
    }
}

/// Sample context with every path under `root`.
pub fn context_in(root: &Path) -> ExecutionContext {
    let root = root.display();
    let ctx = sample_context();
    ExecutionContext {
        pm_input: format!("{}/{}", root, ctx.pm_input),
        pm_output: format!("{}/{}", root, ctx.pm_output),
        output_dir: format!("{}/{}", root, ctx.output_dir),
        error_dir: format!("{}/{}", root, ctx.error_dir),
        ..ctx
    }
}

pub struct FakeClient {
    key: Option<String>,
    fail_results: u32,
    result_calls: AtomicU32,
    artifact_calls: AtomicU32,
}

impl FakeClient {
    pub fn new() -> Self {
        Self {
            key: Some("PRIVATE-KEY".to_string()),
            fail_results: 0,
            result_calls: AtomicU32::new(0),
            artifact_calls: AtomicU32::new(0),
        }
    }

    pub fn without_key(mut self) -> Self {
        self.key = None;
        self
    }

    /// Fail the first `n` result registrations.
    pub fn failing_results(mut self, n: u32) -> Self {
        self.fail_results = n;
        self
    }

    pub fn result_calls(&self) -> u32 {
        self.result_calls.load(Ordering::SeqCst)
    }

    pub fn artifact_calls(&self) -> u32 {
        self.artifact_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProjectClient for FakeClient {
    fn projectid(&self) -> &str {
        "p1"
    }

    fn service_address(&self) -> &str {
        "http://nbflow:8000"
    }

    async fn private_key(&self) -> Result<Option<String>, ExecError> {
        Ok(self.key.clone())
    }

    async fn register_result(&self, _result: &ExecutionResult) -> Result<(), ExecError> {
        let n = self.result_calls.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_results {
            return Err(ExecError::Client("503 Service Unavailable".to_string()));
        }
        Ok(())
    }

    async fn register_artifact(&self, _result: &ExecutionResult) -> Result<(), ExecError> {
        self.artifact_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub enum EngineBehavior {
    Succeed,
    /// Write a partial output, then fail.
    FailWithOutput,
    /// Fail before producing any output.
    FailWithoutOutput,
    Missing,
}

pub struct FakeEngine {
    behavior: EngineBehavior,
}

impl FakeEngine {
    pub fn succeeding() -> Self {
        Self {
            behavior: EngineBehavior::Succeed,
        }
    }

    pub fn with(behavior: EngineBehavior) -> Self {
        Self { behavior }
    }
}

#[async_trait]
impl NotebookEngine for FakeEngine {
    async fn execute(
        &self,
        _input: &Path,
        output: &Path,
        _params: &HashMap<String, String>,
    ) -> Result<(), NotebookFailure> {
        match self.behavior {
            EngineBehavior::Succeed => {
                tokio::fs::write(output, b"{\"cells\": []}").await.map_err(ExecError::from)?;
                Ok(())
            }
            EngineBehavior::FailWithOutput => {
                tokio::fs::write(output, b"{\"cells\": [\"partial\"]}")
                    .await
                    .map_err(ExecError::from)?;
                Err(NotebookFailure::Execution("ZeroDivisionError".to_string()))
            }
            EngineBehavior::FailWithoutOutput => {
                Err(NotebookFailure::Execution("kernel died".to_string()))
            }
            EngineBehavior::Missing => Err(NotebookFailure::Setup(ExecError::Setup(
                "papermill not found".to_string(),
            ))),
        }
    }
}

pub struct FakeRuntime {
    result: ContainerRunResult,
    pub runs: Mutex<Vec<ContainerSpec>>,
    pub builds: Mutex<Vec<BuildSpec>>,
    pub pushes: Mutex<Vec<String>>,
    pub stops: Mutex<Vec<String>>,
}

impl FakeRuntime {
    pub fn exiting(status: i32, msg: Option<&str>) -> Self {
        Self::returning(ContainerRunResult {
            status,
            msg: msg.map(str::to_string),
            timed_out: false,
        })
    }

    pub fn returning(result: ContainerRunResult) -> Self {
        Self {
            result,
            runs: Mutex::new(Vec::new()),
            builds: Mutex::new(Vec::new()),
            pushes: Mutex::new(Vec::new()),
            stops: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn run(&self, spec: &ContainerSpec) -> Result<ContainerRunResult, ExecError> {
        self.runs.lock().unwrap().push(spec.clone());
        Ok(self.result.clone())
    }

    async fn build(&self, spec: &BuildSpec) -> Result<ContainerRunResult, ExecError> {
        self.builds.lock().unwrap().push(spec.clone());
        Ok(self.result.clone())
    }

    async fn push(&self, tag: &str) -> Result<ContainerRunResult, ExecError> {
        self.pushes.lock().unwrap().push(tag.to_string());
        Ok(ContainerRunResult::ok())
    }

    async fn stop(&self, name: &str) -> Result<ContainerRunResult, ExecError> {
        self.stops.lock().unwrap().push(name.to_string());
        Ok(ContainerRunResult::ok())
    }
}
