//! GCE provider configuration.

use serde::Deserialize;

/// GCE configuration loaded from environment variables.
///
/// Environment variables are prefixed with `NB_GCE_`:
/// - `NB_GCE_PROJECT`: GCP project id (required)
/// - `NB_GCE_ZONE`: Default zone (default: "us-central1-a")
/// - `NB_GCE_CREDENTIAL_FILE`: Service account key file (optional, ADC otherwise)
/// - `NB_GCE_SERVICE_ACCOUNT`: Service account attached to created instances (optional)
/// - `NB_GCE_API_URL`: Compute API base URL
#[derive(Debug, Clone, Deserialize)]
pub struct GceConfig {
    pub project: String,

    #[serde(default = "default_zone")]
    pub zone: String,

    #[serde(default)]
    pub credential_file: Option<String>,

    #[serde(default)]
    pub service_account: Option<String>,

    #[serde(default = "default_api_url")]
    pub api_url: String,
}

fn default_zone() -> String {
    "us-central1-a".to_string()
}

fn default_api_url() -> String {
    "https://compute.googleapis.com/compute/v1".to_string()
}

impl GceConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("NB_GCE_").from_env::<GceConfig>()
    }

    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            zone: default_zone(),
            credential_file: None,
            service_account: None,
            api_url: default_api_url(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_vars() {
        let vars = vec![
            ("NB_GCE_PROJECT".to_string(), "acme-ml".to_string()),
            ("NB_GCE_CREDENTIAL_FILE".to_string(), "/secrets/sa.json".to_string()),
        ];
        let config: GceConfig = envy::prefixed("NB_GCE_").from_iter(vars).unwrap();
        assert_eq!(config.project, "acme-ml");
        assert_eq!(config.zone, "us-central1-a");
        assert_eq!(config.credential_file.as_deref(), Some("/secrets/sa.json"));
        assert!(config.service_account.is_none());
    }

    #[test]
    fn test_config_requires_project() {
        let vars: Vec<(String, String)> = vec![];
        assert!(envy::prefixed("NB_GCE_").from_iter::<_, GceConfig>(vars).is_err());
    }
}
