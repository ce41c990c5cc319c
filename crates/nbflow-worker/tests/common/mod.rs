//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use nbflow_cluster::gce::{ComputeDriver, Node, NodeSpec, NodeState, Volume};
use nbflow_cluster::{BlockStorage, GceProvider, ProviderError};
use nbflow_exec::executor::{BuildExecutor, DockerExecutor};
use nbflow_exec::runtime::{BuildSpec, ContainerRunResult, ContainerSpec};
use nbflow_exec::{
    ContainerRuntime, ContextBuilder, ExecError, ExecutionResult, Executor, ExecutorCore,
    FixedClock, PathLayout, ProjectClient, Retrier, RetryPolicy,
};
use nbflow_worker::Dispatcher;

pub struct RecordingClient {
    pub results: Mutex<Vec<ExecutionResult>>,
    pub artifacts: AtomicU32,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self {
            results: Mutex::new(Vec::new()),
            artifacts: AtomicU32::new(0),
        }
    }

    pub fn artifact_calls(&self) -> u32 {
        self.artifacts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProjectClient for RecordingClient {
    fn projectid(&self) -> &str {
        "p1"
    }

    fn service_address(&self) -> &str {
        "http://nbflow:8000"
    }

    async fn private_key(&self) -> Result<Option<String>, ExecError> {
        Ok(Some("AGENT-KEY".to_string()))
    }

    async fn register_result(&self, result: &ExecutionResult) -> Result<(), ExecError> {
        self.results.lock().unwrap().push(result.clone());
        Ok(())
    }

    async fn register_artifact(&self, _result: &ExecutionResult) -> Result<(), ExecError> {
        self.artifacts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct ScriptedRuntime {
    result: ContainerRunResult,
    pub runs: Mutex<Vec<ContainerSpec>>,
    pub builds: Mutex<Vec<BuildSpec>>,
}

impl ScriptedRuntime {
    pub fn exiting(status: i32, msg: Option<&str>) -> Self {
        Self {
            result: ContainerRunResult {
                status,
                msg: msg.map(str::to_string),
                timed_out: false,
            },
            runs: Mutex::new(Vec::new()),
            builds: Mutex::new(Vec::new()),
        }
    }

    pub fn run_count(&self) -> usize {
        self.runs.lock().unwrap().len()
    }
}

#[async_trait]
impl ContainerRuntime for ScriptedRuntime {
    async fn run(&self, spec: &ContainerSpec) -> Result<ContainerRunResult, ExecError> {
        self.runs.lock().unwrap().push(spec.clone());
        Ok(self.result.clone())
    }

    async fn build(&self, spec: &BuildSpec) -> Result<ContainerRunResult, ExecError> {
        self.builds.lock().unwrap().push(spec.clone());
        Ok(self.result.clone())
    }

    async fn push(&self, _tag: &str) -> Result<ContainerRunResult, ExecError> {
        Ok(ContainerRunResult::ok())
    }

    async fn stop(&self, _name: &str) -> Result<ContainerRunResult, ExecError> {
        Ok(ContainerRunResult::ok())
    }
}

#[derive(Default)]
pub struct FakeDriver {
    pub volumes: Mutex<Vec<Volume>>,
    pub nodes: Mutex<Vec<Node>>,
    pub created_volumes: AtomicU32,
    pub attached: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl ComputeDriver for FakeDriver {
    async fn list_nodes(&self, _zone: Option<&str>) -> Result<Vec<Node>, ProviderError> {
        Ok(self.nodes.lock().unwrap().clone())
    }

    async fn create_node(&self, spec: &NodeSpec) -> Result<Node, ProviderError> {
        let node = Node {
            id: "4242".to_string(),
            name: spec.name.clone(),
            zone: spec.zone.clone(),
            state: NodeState::Running,
            private_ips: vec!["10.128.0.7".to_string()],
            public_ips: vec![],
            tags: spec.tags.clone(),
        };
        self.nodes.lock().unwrap().push(node.clone());
        Ok(node)
    }

    async fn destroy_node(&self, _node: &Node) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn list_volumes(&self) -> Result<Vec<Volume>, ProviderError> {
        Ok(self.volumes.lock().unwrap().clone())
    }

    async fn create_volume(&self, spec: &BlockStorage) -> Result<Volume, ProviderError> {
        self.created_volumes.fetch_add(1, Ordering::SeqCst);
        Ok(volume(&spec.name, spec.size))
    }

    async fn destroy_volume(&self, _volume: &Volume) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn attach_volume(&self, node: &Node, volume: &Volume) -> Result<(), ProviderError> {
        self.attached.lock().unwrap().push((node.name.clone(), volume.name.clone()));
        Ok(())
    }

    async fn detach_volume(&self, _node: &Node, _volume: &Volume) -> Result<(), ProviderError> {
        Ok(())
    }
}

pub fn volume(name: &str, size: u64) -> Volume {
    Volume {
        id: format!("vol-{}", name),
        name: name.to_string(),
        zone: "us-central1-a".to_string(),
        size,
        kind: "pd-standard".to_string(),
        extra: HashMap::new(),
    }
}

/// 2024-01-05 08:30 UTC.
pub fn fixed_builder() -> ContextBuilder {
    let now = Utc.with_ymd_and_hms(2024, 1, 5, 8, 30, 0).unwrap();
    ContextBuilder::new(
        PathLayout::new("/srv/workflows", "/srv/outputs"),
        Arc::new(FixedClock(now)),
    )
}

pub fn no_wait_retrier() -> Retrier {
    Retrier::new(RetryPolicy::new(3, std::time::Duration::ZERO))
}

/// Dispatcher running the docker executor against `runtime` and `client`.
pub fn docker_dispatcher(
    client: Arc<RecordingClient>,
    runtime: Arc<ScriptedRuntime>,
) -> Dispatcher {
    let executor_runtime = runtime.clone();
    let executors = move |_projectid: &str| -> Arc<dyn Executor> {
        let core = ExecutorCore::new(client.clone(), no_wait_retrier(), tracing::Span::none());
        Arc::new(DockerExecutor::new(core, executor_runtime.clone()))
    };
    Dispatcher::new(
        fixed_builder(),
        Arc::new(executors),
        BuildExecutor::new(runtime, tracing::Span::none()),
    )
}

pub fn gce_provider(driver: FakeDriver) -> GceProvider<FakeDriver> {
    GceProvider::new(driver, "us-central1-a", tracing::Span::none())
}
