//! nbflow execution core
//!
//! Identity-tracked execution of parameterized notebooks.
//!
//! This crate provides:
//! - Execution identities (tokens and firms)
//! - Execution context builder with an injectable clock
//! - Local and containerized notebook executors, plus image builds
//! - Retry-wrapped registration of results against the project service
//! - Best-effort notifications

pub mod client;
pub mod clock;
pub mod context;
pub mod env;
pub mod error;
pub mod execid;
pub mod executor;
pub mod notify;
pub mod result;
pub mod retry;
pub mod runtime;
pub mod workflow;

pub use client::{ProjectClient, ServerClient};
pub use clock::{Clock, FixedClock, SystemClock};
pub use context::{ContextBuilder, ExecutionContext, PathLayout};
pub use env::ContainerEnv;
pub use error::ExecError;
pub use execid::{ExecId, Firm};
pub use executor::{execute, Executor, ExecutorCore, ExecutorKind, RegistrationReport};
pub use notify::{LogNotifier, Notifier, WebhookNotifier};
pub use result::{BuildResult, ExecutionResult};
pub use retry::{with_retry, Retrier, RetryOutcome, RetryPolicy};
pub use runtime::{ContainerRuntime, DockerCli};
pub use workflow::{NotebookTask, ProjectData, WorkflowData};
