//! Project service client.
//!
//! The project service owns history records and credentials. Executors only
//! need three calls from it, captured by [`ProjectClient`].

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;

use crate::error::ExecError;
use crate::result::ExecutionResult;

/// Calls an executor makes against the project service.
#[async_trait]
pub trait ProjectClient: Send + Sync {
    /// Project the client is bound to.
    fn projectid(&self) -> &str;

    /// Address handed to child processes so they can call back.
    fn service_address(&self) -> &str;

    /// Private key of the project agent, `None` when not provisioned.
    async fn private_key(&self) -> Result<Option<String>, ExecError>;

    /// Persist the history record of a run.
    async fn register_result(&self, result: &ExecutionResult) -> Result<(), ExecError>;

    /// Persist the reference to a run's output notebook.
    async fn register_artifact(&self, result: &ExecutionResult) -> Result<(), ExecError>;
}

/// History record as stored by the project service.
#[derive(Debug, Serialize)]
struct HistoryRequest<'a> {
    wfid: &'a str,
    execid: &'a str,
    projectid: &'a str,
    nb_name: &'a str,
    elapsed_secs: f64,
    status: i32,
    result: &'a ExecutionResult,
}

/// Output artifact reference.
#[derive(Debug, Serialize)]
struct ArtifactRequest<'a> {
    execid: &'a str,
    output_dir: Option<&'a str>,
    output_name: Option<&'a str>,
    error_dir: Option<&'a str>,
    error: bool,
}

/// HTTP client for the project service API.
#[derive(Clone)]
pub struct ServerClient {
    client: reqwest::Client,
    server_url: String,
    projectid: String,
    token: Option<String>,
}

impl ServerClient {
    /// Create a new project service client.
    pub fn new(server_url: &str, projectid: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client,
            server_url: server_url.trim_end_matches('/').to_string(),
            projectid: projectid.to_string(),
            token: None,
        }
    }

    /// Attach a bearer token to every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.server_url, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[async_trait]
impl ProjectClient for ServerClient {
    fn projectid(&self) -> &str {
        &self.projectid
    }

    fn service_address(&self) -> &str {
        &self.server_url
    }

    async fn private_key(&self) -> Result<Option<String>, ExecError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/projects/{}/_private_key", self.projectid),
            )
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExecError::Client(format!("Failed to fetch private key: {}", body)));
        }

        let key = response.text().await?;
        let key = key.trim().trim_matches('"').to_string();
        Ok(if key.is_empty() { None } else { Some(key) })
    }

    async fn register_result(&self, result: &ExecutionResult) -> Result<(), ExecError> {
        let body = HistoryRequest {
            wfid: &result.wfid,
            execid: &result.execid,
            projectid: &result.projectid,
            nb_name: &result.name,
            elapsed_secs: result.elapsed_secs,
            status: result.status(),
            result,
        };

        let response = self
            .request(reqwest::Method::POST, "/history")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExecError::Client(format!("Failed to register result: {}", body)));
        }

        Ok(())
    }

    async fn register_artifact(&self, result: &ExecutionResult) -> Result<(), ExecError> {
        let body = ArtifactRequest {
            execid: &result.execid,
            output_dir: result.output_dir.as_deref(),
            output_name: result.output_name.as_deref(),
            error_dir: result.error_dir.as_deref(),
            error: result.error,
        };

        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/history/{}/_output", result.projectid),
            )
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExecError::Client(format!("Failed to register artifact: {}", body)));
        }

        Ok(())
    }
}

impl std::fmt::Debug for ServerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerClient")
            .field("server_url", &self.server_url)
            .field("projectid", &self.projectid)
            .finish()
    }
}
