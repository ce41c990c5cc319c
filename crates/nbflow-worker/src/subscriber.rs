//! Task queue on NATS JetStream.
//!
//! Tasks arrive on one subject of a work stream and are pulled one at a time
//! through a durable consumer shared by every worker.

use anyhow::{Context as _, Result};
use async_nats::jetstream::{self, consumer::pull, consumer::Consumer, AckKind, Message};
use futures::StreamExt;
use std::time::Duration;

use crate::config::WorkerConfig;

/// Pull consumer on the task subject.
pub struct NatsSubscriber {
    consumer: Consumer<pull::Config>,
    subject: String,
}

impl NatsSubscriber {
    /// Attach to the task stream and its durable consumer, creating both on
    /// first use.
    pub async fn connect(config: &WorkerConfig) -> Result<Self> {
        let client = async_nats::connect(&config.nats_url)
            .await
            .with_context(|| format!("Failed to connect to NATS at {}", config.nats_url))?;
        let js = jetstream::new(client);

        let stream = js
            .get_or_create_stream(jetstream::stream::Config {
                name: config.nats_stream.clone(),
                subjects: vec![config.nats_subject.clone()],
                ..Default::default()
            })
            .await
            .with_context(|| format!("Failed to open task stream {}", config.nats_stream))?;

        let consumer = stream
            .get_or_create_consumer(&config.nats_consumer, consumer_config(config))
            .await
            .with_context(|| format!("Failed to open task consumer {}", config.nats_consumer))?;
        tracing::info!(
            stream = %config.nats_stream,
            consumer = %config.nats_consumer,
            ack_wait_secs = config.nats_ack_wait_secs,
            "Task queue ready"
        );

        Ok(Self {
            consumer,
            subject: config.nats_subject.clone(),
        })
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Next task, or `None` when none arrived before the fetch expired.
    pub async fn receive(&self) -> Result<Option<Message>> {
        let mut batch = self.consumer.fetch().max_messages(1).messages().await?;

        match batch.next().await {
            Some(msg) => {
                let msg = msg.map_err(|e| anyhow::anyhow!("Failed to receive task: {}", e))?;
                Ok(Some(msg))
            }
            None => Ok(None),
        }
    }

    /// Settle a task according to how its dispatch ended.
    pub async fn settle(&self, msg: &Message, kind: AckKind) -> Result<()> {
        msg.ack_with(kind)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to settle task: {}", e))
    }

    /// Reset the redelivery timer of a task still being worked on.
    pub async fn in_progress(&self, msg: &Message) -> Result<()> {
        msg.ack_with(AckKind::Progress)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to report task progress: {}", e))
    }
}

/// Durable consumer settings. Settings of an existing consumer are kept.
pub fn consumer_config(config: &WorkerConfig) -> pull::Config {
    pull::Config {
        durable_name: Some(config.nats_consumer.clone()),
        filter_subject: config.nats_subject.clone(),
        ack_wait: Duration::from_secs(config.nats_ack_wait_secs),
        ..Default::default()
    }
}
