//! In-process notebook execution.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::Instrument;

use super::{Executor, ExecutorCore, ExecutorKind};
use crate::context::ExecutionContext;
use crate::error::ExecError;
use crate::result::ExecutionResult;
use crate::runtime::run_process;

/// Why a notebook engine did not complete.
#[derive(Debug, Error)]
pub enum NotebookFailure {
    /// The notebook itself raised. Captured into the result.
    #[error("Notebook execution failed: {0}")]
    Execution(String),

    /// The engine could not run at all.
    #[error(transparent)]
    Setup(#[from] ExecError),
}

/// Executes a parameterized notebook from `input` into `output`.
#[async_trait]
pub trait NotebookEngine: Send + Sync {
    async fn execute(
        &self,
        input: &Path,
        output: &Path,
        params: &HashMap<String, String>,
    ) -> Result<(), NotebookFailure>;
}

/// Engine backed by the papermill CLI.
#[derive(Debug, Clone)]
pub struct PapermillEngine {
    binary: String,
    kernel: Option<String>,
    cwd: Option<PathBuf>,
}

impl PapermillEngine {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            kernel: None,
            cwd: None,
        }
    }

    pub fn with_kernel(mut self, kernel: impl Into<String>) -> Self {
        self.kernel = Some(kernel.into());
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Command line for one run. Parameters are passed raw (`-r`), sorted by name.
    pub fn args(
        &self,
        input: &Path,
        output: &Path,
        params: &HashMap<String, String>,
    ) -> Vec<String> {
        let mut args = vec![input.display().to_string(), output.display().to_string()];
        if let Some(kernel) = &self.kernel {
            args.push("-k".to_string());
            args.push(kernel.clone());
        }
        let mut names: Vec<&String> = params.keys().collect();
        names.sort();
        for name in names {
            args.push("-r".to_string());
            args.push(name.clone());
            args.push(params[name].clone());
        }
        args
    }
}

impl Default for PapermillEngine {
    fn default() -> Self {
        Self::new("papermill")
    }
}

#[async_trait]
impl NotebookEngine for PapermillEngine {
    async fn execute(
        &self,
        input: &Path,
        output: &Path,
        params: &HashMap<String, String>,
    ) -> Result<(), NotebookFailure> {
        let args = self.args(input, output, params);
        let output =
            run_process(&self.binary, &args, &HashMap::new(), self.cwd.as_deref(), None).await?;

        if output.is_success() {
            Ok(())
        } else {
            Err(NotebookFailure::Execution(output.failure_message()))
        }
    }
}

/// Runs notebooks in this process. No timeout is enforced; the hosting
/// queue worker is expected to bound the run.
pub struct LocalExecutor {
    core: ExecutorCore,
    engine: Arc<dyn NotebookEngine>,
}

impl LocalExecutor {
    pub fn new(core: ExecutorCore, engine: Arc<dyn NotebookEngine>) -> Self {
        Self { core, engine }
    }

    async fn run_notebook(&self, ctx: &ExecutionContext) -> Result<ExecutionResult, ExecError> {
        tokio::fs::create_dir_all(&ctx.output_dir).await?;

        let started = Instant::now();
        let outcome = self
            .engine
            .execute(Path::new(&ctx.pm_input), Path::new(&ctx.pm_output), &ctx.params)
            .await;
        let elapsed = started.elapsed().as_secs_f64();

        match outcome {
            Ok(()) => Ok(ExecutionResult::from_context(ctx, elapsed)),
            Err(NotebookFailure::Execution(msg)) => {
                tracing::error!(
                    wfid = %ctx.wfid,
                    execid = %ctx.execid,
                    error = %msg,
                    "Notebook failed"
                );
                if let Err(e) = self.relocate_failed_output(ctx).await {
                    tracing::error!(execid = %ctx.execid, error = %e, "Failed to relocate output");
                }
                Ok(ExecutionResult::from_context(ctx, elapsed).with_error(Some(msg)))
            }
            Err(NotebookFailure::Setup(e)) => Err(e),
        }
    }

    /// Move a partial output into the error directory, if one was produced.
    async fn relocate_failed_output(&self, ctx: &ExecutionContext) -> Result<(), ExecError> {
        tokio::fs::create_dir_all(&ctx.error_dir).await?;

        let from = Path::new(&ctx.pm_output);
        if !tokio::fs::try_exists(from).await.unwrap_or(false) {
            tracing::debug!(execid = %ctx.execid, "No output produced, nothing to relocate");
            return Ok(());
        }

        let to = ctx.error_output();
        move_file(from, Path::new(&to)).await?;
        tracing::info!(execid = %ctx.execid, to = %to, "Failed output moved");
        Ok(())
    }
}

async fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    // rename fails across filesystems
    tokio::fs::copy(from, to).await?;
    tokio::fs::remove_file(from).await
}

#[async_trait]
impl Executor for LocalExecutor {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Local
    }

    fn core(&self) -> &ExecutorCore {
        &self.core
    }

    async fn run(&self, ctx: &ExecutionContext) -> Result<ExecutionResult, ExecError> {
        let span = self.core.span().clone();
        self.run_notebook(ctx).instrument(span).await
    }
}
