//! Error types for the startup sequence.

use crate::report::SequenceReport;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use travelmate_probe::ProbeError;
use travelmate_topology::TopologyError;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// Required environment variable is not set.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Failed to load env file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },
}

#[derive(Error, Debug)]
pub enum StepError {
    #[error("step {step}: command line is empty")]
    EmptyCommand { step: String },

    #[error("step {step}: failed to start {program}: {source}")]
    Spawn {
        step: String,
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("step {step} exited with {}", describe_exit(.code))]
    Failed { step: String, code: Option<i32> },

    #[error("step {step} timed out after {after:?}")]
    TimedOut { step: String, after: Duration },

    #[error("step {step}: {source:#}")]
    Database {
        step: String,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("server command is empty")]
    EmptyCommand,

    #[error("failed to start server {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to exec server {program}: {source}")]
    Exec {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to listen for shutdown signals: {0}")]
    Signals(#[source] std::io::Error),

    #[error("failed to stop server {program}: {source}")]
    Stop {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server exited before accepting connections (status {code:?})")]
    ExitedBeforeReady { code: Option<i32> },

    #[error("server never accepted connections: {0}")]
    NotReady(#[source] ProbeError),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

/// Anything that stops the container from reaching a serving state.
#[derive(Error, Debug)]
pub enum BootError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error("dependency {service} is not ready: {reason}")]
    DependencyNotReady { service: String, reason: String },

    #[error(transparent)]
    Step(#[from] StepError),

    #[error(transparent)]
    Server(#[from] ServerError),
}

/// A failed sequence together with what was recorded before it stopped.
#[derive(Error, Debug)]
#[error("startup aborted: {error}")]
pub struct BootFailure {
    pub report: SequenceReport,
    #[source]
    pub error: BootError,
}
