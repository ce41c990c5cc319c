//! Worker configuration.

use nbflow_cluster::ProviderKind;
use nbflow_exec::{ExecutorKind, PathLayout, RetryPolicy};
use serde::Deserialize;
use std::time::Duration;

/// Worker configuration loaded from environment variables.
///
/// Environment variables are prefixed with `NB_`:
/// - `NB_WORKER_NAME`: Worker name used in logs (default: hostname)
/// - `NB_SERVER_URL`: Project service address (default: "http://localhost:8000")
/// - `NB_CLIENT_TOKEN`: Bearer token for the project service (optional)
/// - `NB_EXECUTOR`: `local` or `docker` (default: "docker")
/// - `NB_NOTEBOOKS_DIR` / `NB_OUTPUTS_DIR`: Path roots
/// - `NB_DOCKER_BINARY` / `NB_PAPERMILL_BINARY` / `NB_KERNEL`: Engine binaries
/// - `NB_NATS_URL` / `NB_NATS_STREAM` / `NB_NATS_CONSUMER` / `NB_NATS_SUBJECT`
/// - `NB_NATS_ACK_WAIT_SECS`: Redelivery deadline between progress reports (default: 60)
/// - `NB_RETRY_ATTEMPTS` / `NB_RETRY_WAIT_SECS`: Registration retry policy
/// - `NB_WEBHOOK_URL`: Notification webhook (optional)
/// - `NB_CLUSTER_PROVIDER`: Provider for instance requests (optional)
/// - `NB_LOG_FORMAT`: `text` or `json` (default: "text")
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_worker_name")]
    pub worker_name: String,

    #[serde(default = "default_server_url")]
    pub server_url: String,

    #[serde(default)]
    pub client_token: Option<String>,

    #[serde(default = "default_executor")]
    pub executor: ExecutorKind,

    #[serde(default = "default_notebooks_dir")]
    pub notebooks_dir: String,

    #[serde(default = "default_outputs_dir")]
    pub outputs_dir: String,

    #[serde(default = "default_docker_binary")]
    pub docker_binary: String,

    #[serde(default = "default_papermill_binary")]
    pub papermill_binary: String,

    #[serde(default)]
    pub kernel: Option<String>,

    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    #[serde(default = "default_nats_stream")]
    pub nats_stream: String,

    #[serde(default = "default_nats_consumer")]
    pub nats_consumer: String,

    #[serde(default = "default_nats_subject")]
    pub nats_subject: String,

    #[serde(default = "default_nats_ack_wait_secs")]
    pub nats_ack_wait_secs: u64,

    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    #[serde(default = "default_retry_wait_secs")]
    pub retry_wait_secs: u64,

    #[serde(default)]
    pub webhook_url: Option<String>,

    #[serde(default)]
    pub cluster_provider: Option<ProviderKind>,

    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_worker_name() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "nbflow-worker".to_string())
}

fn default_server_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_executor() -> ExecutorKind {
    ExecutorKind::Docker
}

fn default_notebooks_dir() -> String {
    "workflows".to_string()
}

fn default_outputs_dir() -> String {
    "outputs".to_string()
}

fn default_docker_binary() -> String {
    "docker".to_string()
}

fn default_papermill_binary() -> String {
    "papermill".to_string()
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_nats_stream() -> String {
    "nbflow_tasks".to_string()
}

fn default_nats_consumer() -> String {
    "nbflow-worker".to_string()
}

fn default_nats_subject() -> String {
    "nbflow.tasks".to_string()
}

fn default_nats_ack_wait_secs() -> u64 {
    60
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_wait_secs() -> u64 {
    3
}

fn default_log_format() -> String {
    "text".to_string()
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("NB_").from_env::<WorkerConfig>()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, Duration::from_secs(self.retry_wait_secs))
    }

    /// How often a running task reports progress: half the ack deadline.
    pub fn progress_interval(&self) -> Duration {
        Duration::from_secs(self.nats_ack_wait_secs.max(2) / 2)
    }

    pub fn path_layout(&self) -> PathLayout {
        PathLayout::new(self.notebooks_dir.clone(), self.outputs_dir.clone())
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_name: default_worker_name(),
            server_url: default_server_url(),
            client_token: None,
            executor: default_executor(),
            notebooks_dir: default_notebooks_dir(),
            outputs_dir: default_outputs_dir(),
            docker_binary: default_docker_binary(),
            papermill_binary: default_papermill_binary(),
            kernel: None,
            nats_url: default_nats_url(),
            nats_stream: default_nats_stream(),
            nats_consumer: default_nats_consumer(),
            nats_subject: default_nats_subject(),
            nats_ack_wait_secs: default_nats_ack_wait_secs(),
            retry_attempts: default_retry_attempts(),
            retry_wait_secs: default_retry_wait_secs(),
            webhook_url: None,
            cluster_provider: None,
            log_format: default_log_format(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = WorkerConfig::default();
        assert_eq!(config.executor, ExecutorKind::Docker);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert!(config.cluster_provider.is_none());
        assert_eq!(config.progress_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_config_from_vars() {
        let vars = vec![
            ("NB_EXECUTOR".to_string(), "local".to_string()),
            ("NB_RETRY_ATTEMPTS".to_string(), "5".to_string()),
            ("NB_CLUSTER_PROVIDER".to_string(), "gce".to_string()),
            ("NB_OUTPUTS_DIR".to_string(), "/data/outputs".to_string()),
            ("NB_NATS_ACK_WAIT_SECS".to_string(), "300".to_string()),
        ];
        let config: WorkerConfig = envy::prefixed("NB_").from_iter(vars).unwrap();

        assert_eq!(config.executor, ExecutorKind::Local);
        assert_eq!(config.retry_policy().max_attempts, 5);
        assert_eq!(config.cluster_provider, Some(ProviderKind::Gce));
        assert_eq!(config.path_layout().outputs_dir, "/data/outputs");
        assert_eq!(config.nats_subject, "nbflow.tasks");
        assert_eq!(config.progress_interval(), Duration::from_secs(150));
    }
}
