//! Worker loop.

use anyhow::Result;
use async_nats::jetstream::AckKind;
use nbflow_cluster::{GceConfig, GceProvider, ProviderKind};
use nbflow_exec::executor::{BuildExecutor, DockerExecutor, LocalExecutor, PapermillEngine};
use nbflow_exec::{
    ContainerRuntime, ContextBuilder, DockerCli, Executor, ExecutorCore, ExecutorKind, Retrier,
    ServerClient, SystemClock, WebhookNotifier,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::WorkerConfig;
use crate::dispatch::{Dispatcher, ExecutorFactory};
use crate::subscriber::NatsSubscriber;

/// What to tell the queue about a processed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    /// Redeliver later.
    Nack,
    /// Never redeliver.
    Term,
}

impl Disposition {
    pub fn ack_kind(self) -> AckKind {
        match self {
            Disposition::Ack => AckKind::Ack,
            Disposition::Nack => AckKind::Nak(None),
            Disposition::Term => AckKind::Term,
        }
    }
}

/// Drive `work` to completion, running `beat` every `every` meanwhile.
pub async fn with_heartbeat<W, B, Fut>(work: W, every: Duration, mut beat: B) -> W::Output
where
    W: Future,
    B: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    tokio::pin!(work);
    let mut ticks = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
    loop {
        tokio::select! {
            output = &mut work => return output,
            _ = ticks.tick() => beat().await,
        }
    }
}

/// Dispatch one raw message.
pub async fn handle(dispatcher: &Dispatcher, payload: &[u8]) -> Disposition {
    let value: serde_json::Value = match serde_json::from_slice(payload) {
        Ok(value) => value,
        Err(e) => {
            tracing::error!(error = %e, "Message is not JSON, dropping");
            return Disposition::Term;
        }
    };

    match dispatcher.dispatch(value).await {
        Ok(record) => {
            tracing::debug!(record = %record, "Dispatch finished");
            Disposition::Ack
        }
        Err(e) if e.is_permanent() => {
            tracing::error!(error = %e, "Dispatch failed permanently");
            Disposition::Term
        }
        Err(e) => {
            tracing::warn!(error = %e, "Dispatch failed, requeueing");
            Disposition::Nack
        }
    }
}

/// Builds the configured executor variant for a project.
pub struct ConfiguredExecutors {
    config: WorkerConfig,
    runtime: Arc<dyn ContainerRuntime>,
    span: tracing::Span,
}

impl ConfiguredExecutors {
    pub fn new(
        config: WorkerConfig,
        runtime: Arc<dyn ContainerRuntime>,
        span: tracing::Span,
    ) -> Self {
        Self { config, runtime, span }
    }

    fn core(&self, projectid: &str) -> ExecutorCore {
        let mut client = ServerClient::new(&self.config.server_url, projectid);
        if let Some(token) = &self.config.client_token {
            client = client.with_token(token.clone());
        }

        let span = tracing::info_span!(parent: &self.span, "project", projectid = %projectid);
        let retrier = Retrier::new(self.config.retry_policy());
        let mut core = ExecutorCore::new(Arc::new(client), retrier, span);
        if let Some(url) = &self.config.webhook_url {
            core = core.with_notifier(Arc::new(WebhookNotifier::new(url.clone())));
        }
        core
    }
}

impl ExecutorFactory for ConfiguredExecutors {
    fn for_project(&self, projectid: &str) -> Arc<dyn Executor> {
        let core = self.core(projectid);
        match self.config.executor {
            ExecutorKind::Local => {
                let mut engine = PapermillEngine::new(self.config.papermill_binary.clone());
                if let Some(kernel) = &self.config.kernel {
                    engine = engine.with_kernel(kernel.clone());
                }
                Arc::new(LocalExecutor::new(core, Arc::new(engine)))
            }
            ExecutorKind::Docker => Arc::new(DockerExecutor::new(core, self.runtime.clone())),
        }
    }
}

/// Assemble a dispatcher from configuration.
pub fn dispatcher_from_config(config: &WorkerConfig) -> Result<Dispatcher> {
    let span = tracing::info_span!("nbflow", worker = %config.worker_name);
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerCli::new(config.docker_binary.clone()));

    let executors = ConfiguredExecutors::new(config.clone(), runtime.clone(), span.clone());
    let builder = ContextBuilder::new(config.path_layout(), Arc::new(SystemClock));
    let mut dispatcher = Dispatcher::new(
        builder,
        Arc::new(executors),
        BuildExecutor::new(runtime, span.clone()),
    );

    if let Some(ProviderKind::Gce) = config.cluster_provider {
        let gce = GceConfig::from_env()?;
        tracing::info!(project = %gce.project, zone = %gce.zone, "Using GCE cluster provider");
        dispatcher = dispatcher.with_provider(Arc::new(GceProvider::from_config(&gce, span)?));
    }

    Ok(dispatcher)
}

/// Processes queued tasks one at a time.
pub struct Worker {
    config: WorkerConfig,
    subscriber: NatsSubscriber,
    dispatcher: Dispatcher,
}

impl Worker {
    pub async fn new(config: WorkerConfig) -> Result<Self> {
        let subscriber = NatsSubscriber::connect(&config).await?;
        let dispatcher = dispatcher_from_config(&config)?;

        Ok(Self {
            config,
            subscriber,
            dispatcher,
        })
    }

    /// Run until the subscriber fails.
    pub async fn run(&self) -> Result<()> {
        tracing::info!(
            worker = %self.config.worker_name,
            executor = %self.config.executor,
            subject = %self.subscriber.subject(),
            "Worker started"
        );
        let every = self.config.progress_interval();

        loop {
            let Some(msg) = self.subscriber.receive().await? else {
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            };

            let work = handle(&self.dispatcher, &msg.payload);
            let disposition = with_heartbeat(work, every, || {
                let (subscriber, msg) = (&self.subscriber, &msg);
                async move {
                    if let Err(e) = subscriber.in_progress(msg).await {
                        tracing::warn!(error = %e, "Failed to extend task deadline");
                    }
                }
            })
            .await;
            self.subscriber.settle(&msg, disposition.ack_kind()).await?;
        }
    }
}
