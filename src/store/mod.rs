//! Command executor abstraction and implementations
//!
//! This module defines the [`CommandExecutor`] trait, the single seam between
//! the repository and whatever actually holds the data. Implementations:
//!
//! - [`http::HttpExecutor`] -- posts each command to the HTTP command proxy.
//! - [`memory::MemoryExecutor`] -- in-process store with the same semantics,
//!   used by tests and by the `serve` proxy.
//!
//! # Design
//!
//! One call is one round trip. There is no pipelining and no retry at this
//! layer; a transport failure is returned to the caller as
//! [`crate::error::ChatKvError::Transport`] and the caller decides what to
//! do with it.
//!
//! [`KvClient`] wraps an executor with typed helpers (`get`, `hgetall`,
//! `zrange`, ...) so repository code never handles raw [`Reply`] values.

use crate::error::Result;

pub mod client;
pub mod command;
pub mod http;
pub mod memory;
pub mod reply;

pub use client::KvClient;
pub use command::Command;
pub use reply::Reply;

/// Executes one key-value primitive and returns its raw reply.
///
/// Implementations must be safe to share across tasks; the repository holds
/// them behind an `Arc<dyn CommandExecutor>`.
#[async_trait::async_trait]
pub trait CommandExecutor: Send + Sync + std::fmt::Debug {
    /// Execute `command` against the backing store.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ChatKvError::Transport`] when the store cannot
    /// be reached or rejects the command, and
    /// [`crate::error::ChatKvError::MalformedResponse`] when the reply cannot
    /// be decoded.
    async fn execute(&self, command: Command) -> Result<Reply>;
}

/// Installs the Prometheus recorder for store command metrics.
///
/// Only has an effect when built with the `prometheus` feature; otherwise the
/// `metrics` macros in [`KvClient`] are no-ops.
pub fn init_metrics_exporter() {
    #[cfg(feature = "prometheus")]
    {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let _ = PrometheusBuilder::new().install().map_err(|e| {
            tracing::warn!("Failed to install Prometheus exporter: {}", e);
        });
    }
}
