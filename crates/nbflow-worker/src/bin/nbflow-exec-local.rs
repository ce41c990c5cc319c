//! In-container entry point.
//!
//! Reads the execution context handed over by the docker executor, runs the
//! notebook locally and registers the result with the project service.
//! Exits non-zero with the failure message on stderr when the notebook fails.

use anyhow::{Context, Result};
use std::sync::Arc;

use nbflow_exec::executor::{LocalExecutor, PapermillEngine};
use nbflow_exec::{execute, ContainerEnv, ExecutorCore, Retrier, RetryPolicy, ServerClient};
use nbflow_worker::logging;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logging::init(&std::env::var("NB_LOG_FORMAT").unwrap_or_default());

    let env = ContainerEnv::from_process_env()?;
    std::env::set_current_dir(&env.base_path)
        .with_context(|| format!("Failed to enter base path {}", env.base_path))?;

    let ctx = env.context;
    let client =
        ServerClient::new(&env.service_address, &ctx.projectid).with_token(env.private_key);

    let span = tracing::info_span!("nbflow_exec_local", execid = %ctx.execid);
    let core = ExecutorCore::new(Arc::new(client), Retrier::new(RetryPolicy::default()), span);

    let mut engine = PapermillEngine::default();
    if let Ok(kernel) = std::env::var("NB_KERNEL") {
        engine = engine.with_kernel(kernel);
    }
    let executor = LocalExecutor::new(core, Arc::new(engine));

    let result = execute(&executor, &ctx).await?;
    if result.error {
        eprintln!("{}", result.error_msg.as_deref().unwrap_or("Notebook execution failed"));
        std::process::exit(1);
    }
    Ok(())
}
