//! Machine and volume descriptors.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Label key that carries network tags rather than a label.
pub const TAGS_LABEL: &str = "tags";

fn default_network() -> String {
    "default".to_string()
}

fn default_disk_kind() -> String {
    "pd-standard".to_string()
}

/// Declared block storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockStorage {
    pub name: String,

    /// Size in GB.
    pub size: u64,

    #[serde(default = "default_disk_kind")]
    pub kind: String,

    /// Zone; the machine's location (or the provider zone) when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<String>,

    #[serde(default)]
    pub create_if_missing: bool,
}

impl BlockStorage {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            kind: default_disk_kind(),
            location: None,
            snapshot: None,
            create_if_missing: false,
        }
    }
}

/// Materialized block storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockInstance {
    pub id: String,

    #[serde(flatten)]
    pub storage: BlockStorage,

    /// Provider metadata, passed through untouched.
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Compute instance to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineRequest {
    pub name: String,

    /// Machine type, e.g. `e2-medium`.
    pub size: String,

    pub image: String,

    pub location: String,

    #[serde(default = "default_network")]
    pub network: String,

    /// Labels. The `tags` key holds comma-separated network tags.
    #[serde(default)]
    pub labels: HashMap<String, String>,

    pub ssh_user: String,

    pub ssh_public_key: String,

    #[serde(default)]
    pub volumes: Vec<BlockStorage>,
}

impl MachineRequest {
    /// Split the reserved `tags` entry off the label set.
    pub fn tags_and_labels(&self) -> (Vec<String>, HashMap<String, String>) {
        let mut labels = self.labels.clone();
        let tags = labels
            .remove(TAGS_LABEL)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        (tags, labels)
    }

    /// Instance metadata value installing the SSH key.
    pub fn ssh_keys_entry(&self) -> String {
        format!("{}:{}", self.ssh_user, self.ssh_public_key)
    }
}

/// Materialized compute instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineInstance {
    /// `/<provider>/<location>/<name>`.
    pub machine_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,

    pub machine_name: String,

    pub location: String,

    /// First private address, if any has been assigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_addr: Option<String>,

    #[serde(default)]
    pub private_ips: Vec<String>,

    #[serde(default)]
    pub public_ips: Vec<String>,

    #[serde(default)]
    pub tags: Vec<String>,
}

/// Anything that names a machine or volume.
pub trait ResourceName {
    fn resource_name(&self) -> &str;
}

impl ResourceName for &str {
    fn resource_name(&self) -> &str {
        self
    }
}

impl ResourceName for String {
    fn resource_name(&self) -> &str {
        self
    }
}

impl ResourceName for MachineInstance {
    fn resource_name(&self) -> &str {
        &self.machine_name
    }
}

impl ResourceName for BlockStorage {
    fn resource_name(&self) -> &str {
        &self.name
    }
}

impl ResourceName for BlockInstance {
    fn resource_name(&self) -> &str {
        &self.storage.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> MachineRequest {
        serde_json::from_value(serde_json::json!({
            "name": "worker-1",
            "size": "e2-medium",
            "image": "debian-12",
            "location": "us-central1-a",
            "labels": {"tags": "nbworker, gpu", "team": "ml"},
            "ssh_user": "op",
            "ssh_public_key": "ssh-ed25519 AAAA"
        }))
        .unwrap()
    }

    #[test]
    fn test_request_defaults() {
        let req = request();
        assert_eq!(req.network, "default");
        assert!(req.volumes.is_empty());
    }

    #[test]
    fn test_tags_split_from_labels() {
        let (tags, labels) = request().tags_and_labels();
        assert_eq!(tags, vec!["nbworker", "gpu"]);
        assert_eq!(labels.len(), 1);
        assert_eq!(labels["team"], "ml");
    }

    #[test]
    fn test_ssh_keys_entry() {
        assert_eq!(request().ssh_keys_entry(), "op:ssh-ed25519 AAAA");
    }

    #[test]
    fn test_block_storage_defaults() {
        let vol: BlockStorage = serde_json::from_str(r#"{"name": "data", "size": 10}"#).unwrap();
        assert_eq!(vol.kind, "pd-standard");
        assert!(!vol.create_if_missing);
    }

    #[test]
    fn test_resource_names() {
        assert_eq!("vm".resource_name(), "vm");
        assert_eq!(BlockStorage::new("data", 1).resource_name(), "data");
    }
}
