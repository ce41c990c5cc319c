//! nbflow cluster providers
//!
//! Compute instance and block storage lifecycle behind a provider-agnostic
//! trait.
//!
//! This crate provides:
//! - The `ClusterProvider` capability set
//! - Machine and volume descriptors
//! - A GCE provider over the Compute Engine REST API

pub mod error;
pub mod gce;
pub mod provider;
pub mod types;

pub use error::{ProviderError, ResourceKind};
pub use gce::{GceConfig, GceProvider, GceRestDriver};
pub use provider::{ClusterProvider, ProviderKind};
pub use types::{BlockInstance, BlockStorage, MachineInstance, MachineRequest, ResourceName};
