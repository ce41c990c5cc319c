//! Compute Engine v1 REST driver.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use super::auth::GcpAuth;
use super::config::GceConfig;
use super::driver::{ComputeDriver, Node, NodeSpec, NodeState, Volume};
use crate::error::ProviderError;
use crate::types::BlockStorage;

/// Rounds of `operations/{op}/wait` before giving up. Each round blocks up
/// to two minutes server-side.
const OPERATION_WAIT_ROUNDS: usize = 10;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Instance {
    #[serde(default)]
    id: String,
    name: String,
    #[serde(default)]
    zone: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    network_interfaces: Vec<NetworkInterface>,
    #[serde(default)]
    tags: Option<Tags>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NetworkInterface {
    #[serde(rename = "networkIP")]
    network_ip: Option<String>,
    #[serde(default)]
    access_configs: Vec<AccessConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessConfig {
    #[serde(rename = "natIP")]
    nat_ip: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Tags {
    #[serde(default)]
    items: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Operation {
    name: String,
    #[serde(default)]
    status: String,
    error: Option<OperationError>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    #[serde(default)]
    errors: Vec<OperationErrorItem>,
}

#[derive(Debug, Deserialize)]
struct OperationErrorItem {
    #[serde(default)]
    message: String,
}

/// Last path segment of a resource URL.
fn last_segment(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

fn to_node(instance: Instance) -> Node {
    let private_ips = instance
        .network_interfaces
        .iter()
        .filter_map(|ni| ni.network_ip.clone())
        .collect();
    let public_ips = instance
        .network_interfaces
        .iter()
        .flat_map(|ni| ni.access_configs.iter())
        .filter_map(|ac| ac.nat_ip.clone())
        .collect();

    Node {
        id: instance.id,
        zone: last_segment(&instance.zone).to_string(),
        state: NodeState::from_status(&instance.status),
        name: instance.name,
        private_ips,
        public_ips,
        tags: instance.tags.map(|t| t.items).unwrap_or_default(),
    }
}

fn to_volume(disk: Value) -> Result<Volume, ProviderError> {
    let extra: HashMap<String, Value> = serde_json::from_value(disk)?;
    let text = |key: &str| extra.get(key).and_then(Value::as_str).unwrap_or_default().to_string();

    let name = text("name");
    if name.is_empty() {
        return Err(ProviderError::Api("Disk without a name".to_string()));
    }

    Ok(Volume {
        id: text("id"),
        zone: last_segment(&text("zone")).to_string(),
        // sizeGb is an int64 encoded as a string
        size: text("sizeGb").parse().unwrap_or(0),
        kind: last_segment(&text("type")).to_string(),
        name,
        extra,
    })
}

/// Where a list response keeps its resources.
#[derive(Debug, Clone, Copy)]
enum Listing<'a> {
    /// `items` is an array.
    Zonal,
    /// `items` maps scopes to objects holding the named array.
    Aggregated(&'a str),
}

impl Listing<'_> {
    fn items(self, body: &Value) -> Vec<Value> {
        match self {
            Listing::Zonal => body
                .get("items")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            Listing::Aggregated(key) => aggregated_items(body, key),
        }
    }
}

fn next_page_token(body: &Value) -> Option<String> {
    body.get("nextPageToken")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Fetch every page of a listing, following `nextPageToken`.
async fn collect_pages<F, Fut>(
    listing: Listing<'_>,
    mut fetch: F,
) -> Result<Vec<Value>, ProviderError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Value, ProviderError>>,
{
    let mut items = Vec::new();
    let mut token = None;
    loop {
        let body = fetch(token.take()).await?;
        items.extend(listing.items(&body));
        match next_page_token(&body) {
            Some(next) => token = Some(next),
            None => return Ok(items),
        }
    }
}

/// Flatten an `aggregated/*` response into its resources.
fn aggregated_items(body: &Value, key: &str) -> Vec<Value> {
    body.get("items")
        .and_then(Value::as_object)
        .map(|zones| {
            zones
                .values()
                .filter_map(|scoped| scoped.get(key).and_then(Value::as_array))
                .flatten()
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

fn operation_error(op: &Operation) -> Option<String> {
    op.error.as_ref().map(|e| {
        let messages: Vec<&str> = e.errors.iter().map(|i| i.message.as_str()).collect();
        messages.join("; ")
    })
}

/// Driver backed by `compute.googleapis.com`.
#[derive(Clone)]
pub struct GceRestDriver {
    http: reqwest::Client,
    auth: GcpAuth,
    project: String,
    zone: String,
    api_url: String,
}

impl GceRestDriver {
    pub fn from_config(config: &GceConfig) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(150))
            .build()?;
        Ok(Self {
            http,
            auth: GcpAuth::new(config.credential_file.clone()),
            project: config.project.clone(),
            zone: config.zone.clone(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    fn project_url(&self) -> String {
        format!("{}/projects/{}", self.api_url, self.project)
    }

    fn zone_url(&self, zone: &str) -> String {
        format!("{}/zones/{}", self.project_url(), zone)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, ProviderError> {
        let token = self.auth.token().await?;
        let response = request.bearer_auth(token).send().await?;
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        if !status.is_success() {
            let message = body
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("no error message");
            return Err(ProviderError::Api(format!("{}: {}", status, message)));
        }
        Ok(body)
    }

    async fn get(&self, url: &str) -> Result<Value, ProviderError> {
        self.send(self.http.get(url)).await
    }

    async fn list(&self, url: &str, listing: Listing<'_>) -> Result<Vec<Value>, ProviderError> {
        collect_pages(listing, |token| {
            let mut request = self.http.get(url);
            if let Some(token) = token {
                request = request.query(&[("pageToken", token)]);
            }
            self.send(request)
        })
        .await
    }

    /// Submit a mutating call and block until its zone operation is done.
    async fn mutate(
        &self,
        request: reqwest::RequestBuilder,
        zone: &str,
    ) -> Result<(), ProviderError> {
        let mut op: Operation = serde_json::from_value(self.send(request).await?)?;

        for _ in 0..OPERATION_WAIT_ROUNDS {
            if op.status == "DONE" {
                return match operation_error(&op) {
                    Some(message) => Err(ProviderError::Api(message)),
                    None => Ok(()),
                };
            }
            let url = format!("{}/operations/{}/wait", self.zone_url(zone), op.name);
            op = serde_json::from_value(self.send(self.http.post(&url)).await?)?;
        }

        Err(ProviderError::Api(format!("Operation {} did not finish", op.name)))
    }

    fn insert_body(&self, spec: &NodeSpec) -> Value {
        let image = if spec.image.contains('/') {
            spec.image.clone()
        } else {
            format!("global/images/{}", spec.image)
        };
        let metadata: Vec<Value> = spec
            .metadata
            .iter()
            .map(|(key, value)| json!({"key": key, "value": value}))
            .collect();

        let mut body = json!({
            "name": spec.name,
            "machineType": format!("zones/{}/machineTypes/{}", spec.zone, spec.machine_type),
            "disks": [{
                "boot": true,
                "autoDelete": true,
                "initializeParams": {"sourceImage": image}
            }],
            "networkInterfaces": [{
                "network": format!("global/networks/{}", spec.network),
                "accessConfigs": [{"type": "ONE_TO_ONE_NAT", "name": "External NAT"}]
            }],
            "metadata": {"items": metadata},
            "tags": {"items": spec.tags},
            "labels": spec.labels,
        });

        if let Some(account) = &spec.service_account {
            body["serviceAccounts"] = json!([{
                "email": account,
                "scopes": super::auth::DEFAULT_SCOPES,
            }]);
        }
        body
    }

    fn disk_body(&self, spec: &BlockStorage, zone: &str) -> Value {
        let mut body = json!({
            "name": spec.name,
            "sizeGb": spec.size.to_string(),
            "type": format!("zones/{}/diskTypes/{}", zone, spec.kind),
        });
        if let Some(snapshot) = &spec.snapshot {
            body["sourceSnapshot"] = json!(format!("global/snapshots/{}", snapshot));
        }
        body
    }
}

#[async_trait]
impl ComputeDriver for GceRestDriver {
    async fn list_nodes(&self, zone: Option<&str>) -> Result<Vec<Node>, ProviderError> {
        let instances = match zone {
            Some(zone) => {
                let url = format!("{}/instances", self.zone_url(zone));
                self.list(&url, Listing::Zonal).await?
            }
            None => {
                let url = format!("{}/aggregated/instances", self.project_url());
                self.list(&url, Listing::Aggregated("instances")).await?
            }
        };

        instances
            .into_iter()
            .map(|v| Ok(to_node(serde_json::from_value(v)?)))
            .collect()
    }

    async fn create_node(&self, spec: &NodeSpec) -> Result<Node, ProviderError> {
        let url = format!("{}/instances", self.zone_url(&spec.zone));
        self.mutate(self.http.post(&url).json(&self.insert_body(spec)), &spec.zone)
            .await?;

        let body = self.get(&format!("{}/{}", url, spec.name)).await?;
        Ok(to_node(serde_json::from_value(body)?))
    }

    async fn destroy_node(&self, node: &Node) -> Result<(), ProviderError> {
        let url = format!("{}/instances/{}", self.zone_url(&node.zone), node.name);
        self.mutate(self.http.delete(&url), &node.zone).await
    }

    async fn list_volumes(&self) -> Result<Vec<Volume>, ProviderError> {
        let url = format!("{}/aggregated/disks", self.project_url());
        self.list(&url, Listing::Aggregated("disks"))
            .await?
            .into_iter()
            .map(to_volume)
            .collect()
    }

    async fn create_volume(&self, spec: &BlockStorage) -> Result<Volume, ProviderError> {
        let zone = spec.location.clone().unwrap_or_else(|| self.zone.clone());
        let url = format!("{}/disks", self.zone_url(&zone));
        self.mutate(self.http.post(&url).json(&self.disk_body(spec, &zone)), &zone)
            .await?;

        to_volume(self.get(&format!("{}/{}", url, spec.name)).await?)
    }

    async fn destroy_volume(&self, volume: &Volume) -> Result<(), ProviderError> {
        let url = format!("{}/disks/{}", self.zone_url(&volume.zone), volume.name);
        self.mutate(self.http.delete(&url), &volume.zone).await
    }

    async fn attach_volume(&self, node: &Node, volume: &Volume) -> Result<(), ProviderError> {
        let url = format!("{}/instances/{}/attachDisk", self.zone_url(&node.zone), node.name);
        let source = format!(
            "projects/{}/zones/{}/disks/{}",
            self.project, volume.zone, volume.name
        );
        let body = json!({
            "source": source,
            "deviceName": volume.name,
        });
        self.mutate(self.http.post(&url).json(&body), &node.zone).await
    }

    async fn detach_volume(&self, node: &Node, volume: &Volume) -> Result<(), ProviderError> {
        let url = format!("{}/instances/{}/detachDisk", self.zone_url(&node.zone), node.name);
        let request = self.http.post(&url).query(&[("deviceName", volume.name.as_str())]);
        self.mutate(request, &node.zone).await
    }
}
