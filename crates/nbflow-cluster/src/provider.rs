//! Cluster provider abstraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ProviderError;
use crate::types::{BlockInstance, BlockStorage, MachineInstance, MachineRequest, ResourceName};

/// Provider backend, selected by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Gce,
}

impl ProviderKind {
    /// Segment used in synthesized machine ids.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            ProviderKind::Gce => "gce",
        }
    }

    /// `/<provider>/<location>/<name>`.
    pub fn machine_id(&self, location: &str, name: &str) -> String {
        format!("/{}/{}/{}", self.id_prefix(), location, name)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id_prefix())
    }
}

impl FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gce" => Ok(ProviderKind::Gce),
            other => Err(ProviderError::Config(format!("Unknown provider: {}", other))),
        }
    }
}

/// Compute and storage lifecycle of one cloud backend.
///
/// Names are resolved against a fresh listing on every call.
#[async_trait]
pub trait ClusterProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Create an instance, resolving and attaching its declared volumes.
    async fn create_machine(
        &self,
        request: &MachineRequest,
    ) -> Result<MachineInstance, ProviderError>;

    /// Running instances, optionally limited to a location and to those
    /// sharing at least one of `tags`.
    async fn list_machines(
        &self,
        location: Option<&str>,
        tags: Option<&[String]>,
    ) -> Result<Vec<MachineInstance>, ProviderError>;

    async fn destroy_machine(
        &self,
        machine: &(dyn ResourceName + Sync),
    ) -> Result<(), ProviderError>;

    async fn create_volume(&self, spec: &BlockStorage) -> Result<BlockInstance, ProviderError>;

    async fn destroy_volume(
        &self,
        volume: &(dyn ResourceName + Sync),
    ) -> Result<bool, ProviderError>;

    async fn attach_volume(
        &self,
        machine: &MachineInstance,
        volume: &BlockStorage,
    ) -> Result<bool, ProviderError>;

    async fn detach_volume(
        &self,
        machine: &MachineInstance,
        volume: &BlockStorage,
    ) -> Result<bool, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind() {
        assert_eq!("GCE".parse::<ProviderKind>().unwrap(), ProviderKind::Gce);
        assert!("aws".parse::<ProviderKind>().is_err());
        assert_eq!(
            ProviderKind::Gce.machine_id("us-central1-a", "worker-1"),
            "/gce/us-central1-a/worker-1"
        );
    }
}
