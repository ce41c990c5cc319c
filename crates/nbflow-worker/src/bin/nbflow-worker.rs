//! nbflow worker binary.
//!
//! Receives tasks via NATS and dispatches them one at a time.

use anyhow::Result;

use nbflow_worker::{logging, Worker, WorkerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = WorkerConfig::from_env()?;
    logging::init(&config.log_format);

    tracing::info!(
        worker = %config.worker_name,
        server_url = %config.server_url,
        executor = %config.executor,
        "Worker configuration loaded"
    );

    let worker = Worker::new(config).await?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown signal received");
    };

    tokio::select! {
        result = worker.run() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Worker error");
                return Err(e);
            }
        }
        _ = shutdown => {
            tracing::info!("Shutting down worker");
        }
    }

    tracing::info!("Worker stopped");
    Ok(())
}
