//! nbflow worker
//!
//! Consumes task messages from NATS and hands them to the dispatch entry
//! points.
//!
//! This crate provides:
//! - NATS JetStream subscriber for task messages
//! - Dispatch entry points for notebook, workflow, build and instance tasks
//! - Sequential worker loop with progress heartbeats and ack/nack/term handling

pub mod config;
pub mod dispatch;
pub mod logging;
pub mod subscriber;
pub mod worker;

pub use config::WorkerConfig;
pub use dispatch::{DispatchError, DispatchRequest, Dispatcher, ExecutorFactory};
pub use worker::{dispatcher_from_config, handle, with_heartbeat, Disposition, Worker};
