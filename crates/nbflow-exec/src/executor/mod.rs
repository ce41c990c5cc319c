//! Notebook executors.
//!
//! An executor performs one unit of work described by an
//! [`ExecutionContext`] and produces an [`ExecutionResult`]:
//! - `local` - runs the notebook in this process through a notebook engine
//! - `docker` - runs the notebook inside the project's runtime image
//!
//! Failures of the notebook itself are data in the result. Only setup
//! problems (missing credentials, missing engine) are returned as errors.

mod build;
mod docker;
mod local;

#[cfg(test)]
pub(crate) mod testing;

pub use build::{BuildContext, BuildExecutor};
pub use docker::DockerExecutor;
pub use local::{LocalExecutor, NotebookEngine, NotebookFailure, PapermillEngine};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::Instrument;

use crate::client::ProjectClient;
use crate::context::ExecutionContext;
use crate::error::ExecError;
use crate::notify::{LogNotifier, Notifier};
use crate::result::ExecutionResult;
use crate::retry::{Retrier, RetryOutcome};

/// Executor variant, selected by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorKind {
    Local,
    Docker,
}

impl fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutorKind::Local => write!(f, "local"),
            ExecutorKind::Docker => write!(f, "docker"),
        }
    }
}

impl FromStr for ExecutorKind {
    type Err = ExecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(ExecutorKind::Local),
            "docker" => Ok(ExecutorKind::Docker),
            other => Err(ExecError::Setup(format!("Unknown executor kind: {}", other))),
        }
    }
}

/// Outcome of registering one result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationReport {
    /// History record.
    pub record: RetryOutcome,

    /// Output artifact reference, `None` when the result has no artifact.
    pub artifact: Option<RetryOutcome>,
}

impl RegistrationReport {
    pub fn is_complete(&self) -> bool {
        self.record.succeeded() && self.artifact.as_ref().map_or(true, RetryOutcome::succeeded)
    }
}

/// Collaborators every executor variant shares.
#[derive(Clone)]
pub struct ExecutorCore {
    client: Arc<dyn ProjectClient>,
    retrier: Retrier,
    notifier: Arc<dyn Notifier>,
    span: tracing::Span,
}

impl ExecutorCore {
    pub fn new(client: Arc<dyn ProjectClient>, retrier: Retrier, span: tracing::Span) -> Self {
        Self {
            client,
            retrier,
            notifier: Arc::new(LogNotifier),
            span,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn client(&self) -> &Arc<dyn ProjectClient> {
        &self.client
    }

    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    /// Register the record and, when present, the artifact, each under retry.
    pub async fn register(&self, result: &ExecutionResult) -> RegistrationReport {
        let client = &self.client;
        let record = self
            .retrier
            .run("register_result", || client.register_result(result))
            .instrument(self.span.clone())
            .await;

        let artifact = if result.has_artifact() {
            Some(
                self.retrier
                    .run("register_artifact", || client.register_artifact(result))
                    .instrument(self.span.clone())
                    .await,
            )
        } else {
            None
        };

        RegistrationReport { record, artifact }
    }

    /// Forward to the notifier, logging any failure.
    pub async fn notify(&self, ctx: &ExecutionContext, result: &ExecutionResult) {
        let outcome = self.notifier.notify(ctx, result).instrument(self.span.clone()).await;
        if let Err(e) = outcome {
            tracing::warn!(
                parent: &self.span,
                execid = %ctx.execid,
                error = %e,
                "Notification failed"
            );
        }
    }
}

impl fmt::Debug for ExecutorCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorCore")
            .field("projectid", &self.client.projectid())
            .field("retrier", &self.retrier)
            .finish()
    }
}

/// Capability set of a notebook executor.
#[async_trait]
pub trait Executor: Send + Sync {
    fn kind(&self) -> ExecutorKind;

    fn core(&self) -> &ExecutorCore;

    /// Execute the unit of work described by `ctx`.
    async fn run(&self, ctx: &ExecutionContext) -> Result<ExecutionResult, ExecError>;

    /// Persist a result through the project client.
    async fn register(&self, result: &ExecutionResult) -> RegistrationReport {
        self.core().register(result).await
    }

    /// Best-effort notification; never fails.
    async fn notify(&self, ctx: &ExecutionContext, result: &ExecutionResult) {
        self.core().notify(ctx, result).await
    }
}

/// Run, register and notify.
///
/// Setup errors abort before anything is registered. Registration failures
/// are logged only; the returned result is unchanged by them.
pub async fn execute(
    executor: &dyn Executor,
    ctx: &ExecutionContext,
) -> Result<ExecutionResult, ExecError> {
    tracing::info!(
        wfid = %ctx.wfid,
        execid = %ctx.execid,
        executor = %executor.kind(),
        "Starting"
    );

    let result = executor.run(ctx).await?;

    let report = executor.register(&result).await;
    if !report.is_complete() {
        tracing::error!(
            wfid = %ctx.wfid,
            execid = %ctx.execid,
            record = ?report.record.error,
            artifact = ?report.artifact.as_ref().and_then(|a| a.error.clone()),
            "Fail registration"
        );
    }

    executor.notify(ctx, &result).await;

    tracing::info!(
        wfid = %ctx.wfid,
        execid = %ctx.execid,
        elapsed_secs = result.elapsed_secs,
        error = result.error,
        "Finished"
    );

    Ok(result)
}
