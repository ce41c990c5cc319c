//! Run notifications.
//!
//! Notifications are best effort: a failing notifier is logged and never
//! affects the outcome of a run.

use async_trait::async_trait;
use std::time::Duration;

use crate::context::ExecutionContext;
use crate::error::ExecError;
use crate::result::ExecutionResult;

/// Side channel informed after each run.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        ctx: &ExecutionContext,
        result: &ExecutionResult,
    ) -> Result<(), ExecError>;
}

/// Writes a log line per run.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        ctx: &ExecutionContext,
        result: &ExecutionResult,
    ) -> Result<(), ExecError> {
        if result.error {
            tracing::warn!(
                wfid = %ctx.wfid,
                execid = %ctx.execid,
                nb_name = %ctx.nb_name,
                error_msg = ?result.error_msg,
                "Notebook run failed"
            );
        } else {
            tracing::info!(
                wfid = %ctx.wfid,
                execid = %ctx.execid,
                nb_name = %ctx.nb_name,
                elapsed_secs = result.elapsed_secs,
                "Notebook run finished"
            );
        }
        Ok(())
    }
}

/// Posts a JSON summary of each run to a webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: url.into(),
        }
    }

    fn payload(ctx: &ExecutionContext, result: &ExecutionResult) -> serde_json::Value {
        let status = if result.error { "failed" } else { "ok" };
        serde_json::json!({
            "text": format!(
                "{} {} ({}) in {}s",
                ctx.nb_name, status, ctx.execid, result.elapsed_secs
            ),
            "projectid": ctx.projectid,
            "wfid": ctx.wfid,
            "execid": ctx.execid,
            "error": result.error,
            "error_msg": result.error_msg,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(
        &self,
        ctx: &ExecutionContext,
        result: &ExecutionResult,
    ) -> Result<(), ExecError> {
        let response = self
            .client
            .post(&self.url)
            .json(&Self::payload(ctx, result))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ExecError::Client(format!("Webhook returned {}", response.status())));
        }
        Ok(())
    }
}
