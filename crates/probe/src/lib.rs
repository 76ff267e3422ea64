//! Readiness probes for the services the web process depends on.
//!
//! Container start order says nothing about whether a dependency accepts
//! connections yet. Every dependency is therefore probed with
//! [`ReadinessProbe::check`] and retried with exponential backoff until it
//! answers or the [`RetryPolicy`] is exhausted.

pub mod cache;
pub mod http;
pub mod retry;
pub mod smtp;
pub mod sql;
pub mod tcp;
pub mod waiter;

use async_trait::async_trait;
use std::time::Duration;

pub use cache::RedisProbe;
pub use http::HttpProbe;
pub use retry::{wait_until_ready, RetryPolicy};
pub use smtp::SmtpProbe;
pub use sql::SqlProbe;
pub use tcp::TcpProbe;
pub use waiter::{first_blocking, Dependency, DependencyOutcome, DependencyWaiter};

/// Error type for readiness checks.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unexpected response: {0}")]
    Protocol(String),
    #[error("database not ready: {0:#}")]
    Database(#[source] anyhow::Error),
    #[error("cache not ready: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("http check failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{service} not ready after {attempts} attempts: {last}")]
    Exhausted {
        service: String,
        attempts: u32,
        last: Box<ProbeError>,
    },
}

/// Result type for readiness checks.
pub type ProbeResult<T> = Result<T, ProbeError>;

/// A single readiness check against one service.
///
/// `check` performs exactly one attempt; retrying is the caller's concern.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// Service name used in logs, metrics and reports.
    fn name(&self) -> &str;

    /// Human readable target, e.g. `postgres:5432`.
    fn target(&self) -> String;

    /// Perform one readiness attempt.
    async fn check(&self) -> ProbeResult<()>;
}
