//! Google Compute Engine provider.
//!
//! Resolution logic lives in [`GceProvider`]; API calls go through a
//! [`ComputeDriver`], by default [`GceRestDriver`].

mod auth;
mod config;
mod driver;
mod rest;

pub use auth::{GcpAuth, DEFAULT_SCOPES};
pub use config::GceConfig;
pub use driver::{ComputeDriver, Node, NodeSpec, NodeState, Volume};
pub use rest::GceRestDriver;

use async_trait::async_trait;
use tracing::Instrument;

use crate::error::{ProviderError, ResourceKind};
use crate::provider::{ClusterProvider, ProviderKind};
use crate::types::{BlockInstance, BlockStorage, MachineInstance, MachineRequest, ResourceName};

/// Metadata key holding SSH keys.
const SSH_KEYS_METADATA: &str = "ssh-keys";

pub struct GceProvider<D> {
    driver: D,
    zone: String,
    service_account: Option<String>,
    span: tracing::Span,
}

impl GceProvider<GceRestDriver> {
    /// Provider talking to the Compute Engine REST API.
    pub fn from_config(config: &GceConfig, span: tracing::Span) -> Result<Self, ProviderError> {
        let driver = GceRestDriver::from_config(config)?;
        Ok(Self::new(driver, config.zone.clone(), span)
            .with_service_account(config.service_account.clone()))
    }
}

impl<D: ComputeDriver> GceProvider<D> {
    pub fn new(driver: D, zone: impl Into<String>, span: tracing::Span) -> Self {
        Self {
            driver,
            zone: zone.into(),
            service_account: None,
            span,
        }
    }

    pub fn with_service_account(mut self, service_account: Option<String>) -> Self {
        self.service_account = service_account;
        self
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    async fn resolve_node(&self, name: &str) -> Result<Node, ProviderError> {
        let nodes = self.driver.list_nodes(None).await?;
        single(ResourceKind::Machine, name, nodes.into_iter().filter(|n| n.name == name).collect())
    }

    async fn find_volume(&self, name: &str) -> Result<Option<Volume>, ProviderError> {
        let volumes = self.driver.list_volumes().await?;
        let matches: Vec<Volume> = volumes.into_iter().filter(|v| v.name == name).collect();
        match single(ResourceKind::Volume, name, matches) {
            Ok(volume) => Ok(Some(volume)),
            Err(ProviderError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn resolve_volume(&self, name: &str) -> Result<Volume, ProviderError> {
        self.find_volume(name)
            .await?
            .ok_or_else(|| ProviderError::not_found(ResourceKind::Volume, name))
    }

    /// Find or create each declared volume. Existing volumes are reused as-is.
    async fn volumes_to_attach(
        &self,
        declared: &[BlockStorage],
        zone: &str,
    ) -> Result<Vec<Volume>, ProviderError> {
        let mut to_attach = Vec::with_capacity(declared.len());
        for decl in declared {
            match self.find_volume(&decl.name).await? {
                Some(existing) => {
                    warn_on_drift(decl, &existing);
                    to_attach.push(existing);
                }
                None if decl.create_if_missing => {
                    let spec = with_location(decl, zone);
                    tracing::info!(
                        volume = %decl.name,
                        zone = %zone,
                        size = decl.size,
                        "Creating volume"
                    );
                    to_attach.push(self.driver.create_volume(&spec).await?);
                }
                None => {
                    tracing::warn!(
                        volume = %decl.name,
                        "Volume does not exist and create_if_missing is off, skipping"
                    );
                }
            }
        }
        Ok(to_attach)
    }

    /// Remove a node whose volumes could not be attached, so that a retried
    /// request starts from a clean slate.
    async fn rollback_node(&self, node: &Node, volume: &str) {
        tracing::warn!(machine = %node.name, volume = %volume, "Attach failed, destroying machine");
        if let Err(e) = self.driver.destroy_node(node).await {
            tracing::error!(
                machine = %node.name,
                error = %e,
                "Failed to destroy machine after attach failure"
            );
        }
    }

    async fn create_machine_inner(
        &self,
        request: &MachineRequest,
    ) -> Result<MachineInstance, ProviderError> {
        let volumes = self.volumes_to_attach(&request.volumes, &request.location).await?;
        let (tags, labels) = request.tags_and_labels();

        let spec = NodeSpec {
            name: request.name.clone(),
            machine_type: request.size.clone(),
            image: request.image.clone(),
            zone: request.location.clone(),
            network: request.network.clone(),
            tags,
            labels,
            metadata: vec![(SSH_KEYS_METADATA.to_string(), request.ssh_keys_entry())],
            service_account: self.service_account.clone(),
        };

        tracing::info!(
            machine = %request.name,
            zone = %request.location,
            size = %request.size,
            "Creating machine"
        );
        let node = self.driver.create_node(&spec).await?;

        for volume in &volumes {
            tracing::debug!(machine = %node.name, volume = %volume.name, "Attaching volume");
            if let Err(e) = self.driver.attach_volume(&node, volume).await {
                self.rollback_node(&node, &volume.name).await;
                return Err(e);
            }
        }

        Ok(MachineInstance {
            machine_id: ProviderKind::Gce.machine_id(&request.location, &request.name),
            node_id: Some(node.id),
            machine_name: request.name.clone(),
            location: request.location.clone(),
            main_addr: node.private_ips.first().cloned(),
            private_ips: node.private_ips,
            public_ips: node.public_ips,
            tags: node.tags,
        })
    }
}

#[async_trait]
impl<D: ComputeDriver> ClusterProvider for GceProvider<D> {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gce
    }

    async fn create_machine(
        &self,
        request: &MachineRequest,
    ) -> Result<MachineInstance, ProviderError> {
        self.create_machine_inner(request).instrument(self.span.clone()).await
    }

    async fn list_machines(
        &self,
        location: Option<&str>,
        tags: Option<&[String]>,
    ) -> Result<Vec<MachineInstance>, ProviderError> {
        let nodes = self.driver.list_nodes(location).instrument(self.span.clone()).await?;

        Ok(nodes
            .into_iter()
            .filter(|n| n.state == NodeState::Running)
            .filter(|n| match tags {
                Some(wanted) if !wanted.is_empty() => n.tags.iter().any(|t| wanted.contains(t)),
                _ => true,
            })
            .map(|n| MachineInstance {
                machine_id: ProviderKind::Gce.machine_id(&n.zone, &n.name),
                node_id: Some(n.id),
                machine_name: n.name,
                location: n.zone,
                main_addr: n.private_ips.first().cloned(),
                private_ips: n.private_ips,
                public_ips: n.public_ips,
                tags: n.tags,
            })
            .collect())
    }

    async fn destroy_machine(
        &self,
        machine: &(dyn ResourceName + Sync),
    ) -> Result<(), ProviderError> {
        let name = machine.resource_name();
        async {
            let node = self.resolve_node(name).await?;
            tracing::info!(machine = %name, zone = %node.zone, "Destroying machine");
            self.driver.destroy_node(&node).await
        }
        .instrument(self.span.clone())
        .await
    }

    async fn create_volume(&self, spec: &BlockStorage) -> Result<BlockInstance, ProviderError> {
        let spec = with_location(spec, &self.zone);
        let volume = self.driver.create_volume(&spec).instrument(self.span.clone()).await?;
        Ok(BlockInstance {
            id: volume.id,
            storage: spec,
            extra: volume.extra,
        })
    }

    async fn destroy_volume(
        &self,
        volume: &(dyn ResourceName + Sync),
    ) -> Result<bool, ProviderError> {
        let name = volume.resource_name();
        async {
            let found = self.resolve_volume(name).await?;
            tracing::info!(volume = %name, "Destroying volume");
            self.driver.destroy_volume(&found).await?;
            Ok(true)
        }
        .instrument(self.span.clone())
        .await
    }

    async fn attach_volume(
        &self,
        machine: &MachineInstance,
        volume: &BlockStorage,
    ) -> Result<bool, ProviderError> {
        async {
            let node = self.resolve_node(&machine.machine_name).await?;
            let found = self.resolve_volume(&volume.name).await?;
            self.driver.attach_volume(&node, &found).await?;
            Ok(true)
        }
        .instrument(self.span.clone())
        .await
    }

    async fn detach_volume(
        &self,
        machine: &MachineInstance,
        volume: &BlockStorage,
    ) -> Result<bool, ProviderError> {
        async {
            let node = self.resolve_node(&machine.machine_name).await?;
            let found = self.resolve_volume(&volume.name).await?;
            self.driver.detach_volume(&node, &found).await?;
            Ok(true)
        }
        .instrument(self.span.clone())
        .await
    }
}

/// Exactly one match, or `NotFound`/`Ambiguous`.
fn single<T>(kind: ResourceKind, name: &str, mut matches: Vec<T>) -> Result<T, ProviderError> {
    match matches.len() {
        0 => Err(ProviderError::not_found(kind, name)),
        1 => Ok(matches.remove(0)),
        count => Err(ProviderError::Ambiguous {
            kind,
            name: name.to_string(),
            count,
        }),
    }
}

fn with_location(spec: &BlockStorage, zone: &str) -> BlockStorage {
    let mut spec = spec.clone();
    if spec.location.is_none() {
        spec.location = Some(zone.to_string());
    }
    spec
}

fn warn_on_drift(declared: &BlockStorage, existing: &Volume) {
    if declared.size != existing.size || declared.kind != existing.kind {
        tracing::warn!(
            volume = %declared.name,
            declared_size = declared.size,
            actual_size = existing.size,
            declared_kind = %declared.kind,
            actual_kind = %existing.kind,
            "Existing volume differs from declaration, using it unchanged"
        );
    }
}
