//! Containerized notebook execution.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

use super::{Executor, ExecutorCore, ExecutorKind};
use crate::context::ExecutionContext;
use crate::env::ContainerEnv;
use crate::error::ExecError;
use crate::result::ExecutionResult;
use crate::runtime::{container_name, ContainerRuntime, ContainerSpec};

/// Command run inside the runtime image.
pub const CONTAINER_COMMAND: &[&str] = &["nbflow-exec-local"];

/// Runs notebooks inside the project's runtime image.
///
/// The container registers its own output artifact; the record registered
/// from here describes the container run.
pub struct DockerExecutor {
    core: ExecutorCore,
    runtime: Arc<dyn ContainerRuntime>,
    command: Vec<String>,
}

impl DockerExecutor {
    pub fn new(core: ExecutorCore, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            core,
            runtime,
            command: CONTAINER_COMMAND.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Override the command executed in the container.
    pub fn with_command(mut self, command: Vec<String>) -> Self {
        self.command = command;
        self
    }

    /// Environment handed to the container.
    pub async fn build_env(&self, ctx: &ExecutionContext) -> Result<ContainerEnv, ExecError> {
        let client = self.core.client();
        let private_key = client
            .private_key()
            .await?
            .ok_or_else(|| {
                ExecError::Setup(format!("No private key found for project {}", ctx.projectid))
            })?;

        Ok(ContainerEnv::new(
            ctx.clone(),
            private_key,
            client.service_address().to_string(),
        ))
    }

    /// The daemon owns the container, so expiry of the CLI process alone
    /// leaves it running.
    async fn stop_container(&self, spec: &ContainerSpec) {
        let Some(name) = &spec.name else {
            return;
        };
        match self.runtime.stop(name).await {
            Ok(stopped) if stopped.is_success() => {
                tracing::info!(container = %name, "Killed timed out container");
            }
            Ok(stopped) => {
                tracing::warn!(container = %name, msg = ?stopped.msg, "Failed to kill container");
            }
            Err(e) => {
                tracing::warn!(container = %name, error = %e, "Failed to kill container");
            }
        }
    }

    async fn run_container(&self, ctx: &ExecutionContext) -> Result<ExecutionResult, ExecError> {
        let started = Instant::now();
        let env = self.build_env(ctx).await?;

        let spec = ContainerSpec {
            name: Some(container_name(&ctx.execid)),
            image: ctx.docker_name.clone(),
            command: self.command.clone(),
            env: env.to_vars()?,
            timeout: (ctx.timeout > 0).then(|| Duration::from_secs(ctx.timeout)),
        };

        let run = self.runtime.run(&spec).await?;
        if run.timed_out {
            self.stop_container(&spec).await;
        }
        let elapsed = started.elapsed().as_secs_f64();
        let result = ExecutionResult::from_container(ctx, elapsed);

        if run.is_success() {
            return Ok(result);
        }

        tracing::error!(
            wfid = %ctx.wfid,
            execid = %ctx.execid,
            status = run.status,
            timed_out = run.timed_out,
            msg = ?run.msg,
            "Container run failed"
        );
        Ok(result.with_error(run.msg))
    }
}

#[async_trait]
impl Executor for DockerExecutor {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Docker
    }

    fn core(&self) -> &ExecutorCore {
        &self.core
    }

    async fn run(&self, ctx: &ExecutionContext) -> Result<ExecutionResult, ExecError> {
        let span = self.core.span().clone();
        self.run_container(ctx).instrument(span).await
    }
}
