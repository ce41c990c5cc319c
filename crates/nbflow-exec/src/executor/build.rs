//! Runtime image builds.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

use crate::error::ExecError;
use crate::result::{round_secs, BuildResult};
use crate::runtime::{BuildSpec, ContainerRuntime};

fn default_dockerfile() -> String {
    "Dockerfile".to_string()
}

fn default_context_dir() -> String {
    ".".to_string()
}

fn default_build_timeout() -> u64 {
    1800
}

/// Image build request for one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildContext {
    pub projectid: String,
    pub execid: String,

    /// Image reference `<owner>/<name>:<version>`, without registry.
    pub docker_name: String,

    pub version: String,

    #[serde(default = "default_dockerfile")]
    pub dockerfile: String,

    #[serde(default = "default_context_dir")]
    pub context_dir: String,

    /// Registry host, prefixed to the tag when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,

    #[serde(default)]
    pub push: bool,

    /// Build timeout in seconds.
    #[serde(default = "default_build_timeout")]
    pub timeout: u64,
}

impl BuildContext {
    pub fn tag(&self) -> String {
        match &self.registry {
            Some(registry) => format!("{}/{}", registry.trim_end_matches('/'), self.docker_name),
            None => self.docker_name.clone(),
        }
    }
}

/// Builds (and optionally pushes) runtime images.
pub struct BuildExecutor {
    runtime: Arc<dyn ContainerRuntime>,
    span: tracing::Span,
}

impl BuildExecutor {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, span: tracing::Span) -> Self {
        Self { runtime, span }
    }

    pub async fn run(&self, ctx: &BuildContext) -> Result<BuildResult, ExecError> {
        self.build(ctx).instrument(self.span.clone()).await
    }

    async fn build(&self, ctx: &BuildContext) -> Result<BuildResult, ExecError> {
        let started = Instant::now();
        let tag = ctx.tag();
        tracing::info!(
            projectid = %ctx.projectid,
            execid = %ctx.execid,
            tag = %tag,
            "Building image"
        );

        let spec = BuildSpec {
            tag: tag.clone(),
            dockerfile: ctx.dockerfile.clone(),
            context_dir: ctx.context_dir.clone(),
            timeout: (ctx.timeout > 0).then(|| Duration::from_secs(ctx.timeout)),
        };

        let mut outcome = self.runtime.build(&spec).await?;
        if outcome.is_success() && ctx.push {
            tracing::info!(tag = %tag, "Pushing image");
            outcome = self.runtime.push(&tag).await?;
        }

        let error = !outcome.is_success();
        if error {
            tracing::error!(execid = %ctx.execid, tag = %tag, msg = ?outcome.msg, "Build failed");
        }

        Ok(BuildResult {
            projectid: ctx.projectid.clone(),
            execid: ctx.execid.clone(),
            docker_name: tag,
            error,
            error_msg: if error { outcome.msg } else { None },
            elapsed_secs: round_secs(started.elapsed().as_secs_f64()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::FakeRuntime;
    use super::*;

    fn context() -> BuildContext {
        serde_json::from_value(serde_json::json!({
            "projectid": "p1",
            "execid": "bld.abc",
            "docker_name": "acme/churn:0.2",
            "version": "0.2"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_build_defaults() {
        let runtime = Arc::new(FakeRuntime::exiting(0, None));
        let result = BuildExecutor::new(runtime.clone(), tracing::Span::none())
            .run(&context())
            .await
            .unwrap();

        assert!(!result.error);
        assert_eq!(result.docker_name, "acme/churn:0.2");

        let builds = runtime.builds.lock().unwrap();
        assert_eq!(builds[0].dockerfile, "Dockerfile");
        assert_eq!(builds[0].context_dir, ".");
        assert_eq!(builds[0].timeout, Some(Duration::from_secs(1800)));
        assert!(runtime.pushes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_build_with_registry_pushes() {
        let mut ctx = context();
        ctx.registry = Some("gcr.io/acme/".to_string());
        ctx.push = true;

        let runtime = Arc::new(FakeRuntime::exiting(0, None));
        let result = BuildExecutor::new(runtime.clone(), tracing::Span::none())
            .run(&ctx)
            .await
            .unwrap();

        assert_eq!(result.docker_name, "gcr.io/acme/acme/churn:0.2");
        assert_eq!(*runtime.pushes.lock().unwrap(), vec!["gcr.io/acme/acme/churn:0.2"]);
    }

    #[tokio::test]
    async fn test_build_failure_skips_push() {
        let mut ctx = context();
        ctx.push = true;

        let runtime = Arc::new(FakeRuntime::exiting(1, Some("no such file: Dockerfile")));
        let result = BuildExecutor::new(runtime.clone(), tracing::Span::none())
            .run(&ctx)
            .await
            .unwrap();

        assert!(result.error);
        assert_eq!(result.error_msg.as_deref(), Some("no such file: Dockerfile"));
        assert!(runtime.pushes.lock().unwrap().is_empty());
    }
}
