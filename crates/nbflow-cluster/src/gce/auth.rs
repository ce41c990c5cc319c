//! GCP access tokens for the Compute Engine API.

use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::ProviderError;

/// Default GCP scopes for cloud platform access.
pub const DEFAULT_SCOPES: &[&str] = &["https://www.googleapis.com/auth/cloud-platform"];

/// Lazily initialized token source.
///
/// Uses a service account key file when one is configured, Application
/// Default Credentials otherwise.
#[derive(Clone)]
pub struct GcpAuth {
    credential_file: Option<String>,
    provider: Arc<RwLock<Option<Arc<dyn gcp_auth::TokenProvider>>>>,
}

impl GcpAuth {
    pub fn new(credential_file: Option<String>) -> Self {
        Self {
            credential_file,
            provider: Arc::new(RwLock::new(None)),
        }
    }

    async fn ensure_provider(&self) -> Result<Arc<dyn gcp_auth::TokenProvider>, ProviderError> {
        {
            let guard = self.provider.read().await;
            if let Some(provider) = guard.as_ref() {
                return Ok(Arc::clone(provider));
            }
        }

        let provider: Arc<dyn gcp_auth::TokenProvider> = match &self.credential_file {
            Some(path) => {
                tracing::debug!(path = %path, "Loading GCP service account key");
                let account = gcp_auth::CustomServiceAccount::from_file(path)
                    .map_err(|e| {
                        ProviderError::Auth(format!(
                            "Failed to load credential file {}: {}",
                            path, e
                        ))
                    })?;
                Arc::new(account)
            }
            None => gcp_auth::provider()
                .await
                .map_err(|e| ProviderError::Auth(format!("Failed to initialize GCP auth: {}", e)))?,
        };

        let mut guard = self.provider.write().await;
        *guard = Some(Arc::clone(&provider));
        Ok(provider)
    }

    /// Access token with the cloud platform scope.
    pub async fn token(&self) -> Result<String, ProviderError> {
        let provider = self.ensure_provider().await?;
        let token = provider
            .token(DEFAULT_SCOPES)
            .await
            .map_err(|e| ProviderError::Auth(format!("Failed to get GCP token: {}", e)))?;
        Ok(token.as_str().to_string())
    }
}

impl Default for GcpAuth {
    fn default() -> Self {
        Self::new(None)
    }
}
