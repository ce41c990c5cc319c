//! Seam between the GCE provider and the Compute Engine API.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::ProviderError;
use crate::types::BlockStorage;

/// Instance lifecycle state as reported by the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeState {
    Running,
    Pending,
    Stopping,
    Stopped,
    Other(String),
}

impl NodeState {
    pub fn from_status(status: &str) -> Self {
        match status {
            "RUNNING" => NodeState::Running,
            "PROVISIONING" | "STAGING" => NodeState::Pending,
            "STOPPING" | "SUSPENDING" => NodeState::Stopping,
            "TERMINATED" | "STOPPED" | "SUSPENDED" => NodeState::Stopped,
            other => NodeState::Other(other.to_string()),
        }
    }
}

/// Compute instance as listed by the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub zone: String,
    pub state: NodeState,
    pub private_ips: Vec<String>,
    pub public_ips: Vec<String>,
    pub tags: Vec<String>,
}

/// Persistent disk as listed by the API.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    pub id: String,
    pub name: String,
    pub zone: String,
    pub size: u64,
    pub kind: String,
    pub extra: HashMap<String, serde_json::Value>,
}

/// Instance insert request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSpec {
    pub name: String,
    pub machine_type: String,
    pub image: String,
    pub zone: String,
    pub network: String,
    pub tags: Vec<String>,
    pub labels: HashMap<String, String>,
    pub metadata: Vec<(String, String)>,
    pub service_account: Option<String>,
}

/// Raw Compute Engine operations.
#[async_trait]
pub trait ComputeDriver: Send + Sync {
    /// Instances in `zone`, or in every zone when `None`.
    async fn list_nodes(&self, zone: Option<&str>) -> Result<Vec<Node>, ProviderError>;

    async fn create_node(&self, spec: &NodeSpec) -> Result<Node, ProviderError>;

    async fn destroy_node(&self, node: &Node) -> Result<(), ProviderError>;

    /// Disks in every zone.
    async fn list_volumes(&self) -> Result<Vec<Volume>, ProviderError>;

    /// Create a disk. `spec.location` is set by the caller.
    async fn create_volume(&self, spec: &BlockStorage) -> Result<Volume, ProviderError>;

    async fn destroy_volume(&self, volume: &Volume) -> Result<(), ProviderError>;

    async fn attach_volume(&self, node: &Node, volume: &Volume) -> Result<(), ProviderError>;

    async fn detach_volume(&self, node: &Node, volume: &Volume) -> Result<(), ProviderError>;
}
