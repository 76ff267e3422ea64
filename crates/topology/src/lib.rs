//! Service topology of the TravelMate deployment.
//!
//! Reads the compose definition, works out which services are enabled for
//! the active profiles, and derives a deterministic startup order from the
//! `depends_on` edges.

pub mod compose;
pub mod model;
pub mod order;

use std::path::PathBuf;

pub use model::{DependencyCondition, DependsOn, PortMapping, Service, ServiceKind, Topology};

/// Error type for topology operations.
#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid compose document: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("service {service}: invalid port mapping {spec:?}")]
    InvalidPort { service: String, spec: String },
    #[error("unknown service: {0}")]
    UnknownService(String),
    #[error("service {service} depends on undefined service {dependency}")]
    UnknownDependency { service: String, dependency: String },
    #[error("service {service} depends on {dependency}, which is disabled by profiles")]
    DisabledDependency { service: String, dependency: String },
    #[error("dependency cycle between: {}", .0.join(", "))]
    Cycle(Vec<String>),
}

/// Result type for topology operations.
pub type TopologyResult<T> = Result<T, TopologyError>;
