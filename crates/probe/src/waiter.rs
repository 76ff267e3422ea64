//! Sequential readiness gate over every dependency of the web process.

use crate::retry::{wait_until_ready, RetryPolicy};
use crate::ReadinessProbe;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};
use travelmate_telemetry::Metrics;

/// One dependency to wait for.
pub struct Dependency {
    pub probe: Box<dyn ReadinessProbe>,
    /// Optional dependencies are logged when unreachable but never block startup.
    pub required: bool,
}

impl Dependency {
    pub fn required(probe: impl ReadinessProbe + 'static) -> Self {
        Self {
            probe: Box::new(probe),
            required: true,
        }
    }

    pub fn optional(probe: impl ReadinessProbe + 'static) -> Self {
        Self {
            probe: Box::new(probe),
            required: false,
        }
    }
}

/// What happened while waiting for one dependency.
#[derive(Debug, Clone, Serialize)]
pub struct DependencyOutcome {
    pub service: String,
    pub target: String,
    pub required: bool,
    pub ready: bool,
    pub attempts: u32,
    pub elapsed_ms: u64,
    pub error: Option<String>,
}

/// Waits for dependencies one after another, in the order they were added.
pub struct DependencyWaiter {
    dependencies: Vec<Dependency>,
    policy: RetryPolicy,
    metrics: Metrics,
}

impl DependencyWaiter {
    pub fn new(policy: RetryPolicy, metrics: Metrics) -> Self {
        Self {
            dependencies: Vec::new(),
            policy,
            metrics,
        }
    }

    pub fn push(&mut self, dependency: Dependency) {
        self.dependencies.push(dependency);
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    /// Names and targets of the configured dependencies, in wait order.
    pub fn describe(&self) -> Vec<(String, String, bool)> {
        self.dependencies
            .iter()
            .map(|d| (d.probe.name().to_string(), d.probe.target(), d.required))
            .collect()
    }

    /// Wait for every dependency.
    ///
    /// Stops at the first required dependency that never becomes ready; the
    /// returned outcomes then end with that failure and later dependencies
    /// are not probed.
    pub async fn wait_all(&self) -> Vec<DependencyOutcome> {
        let mut outcomes = Vec::with_capacity(self.dependencies.len());

        for dependency in &self.dependencies {
            let probe = dependency.probe.as_ref();
            let started = Instant::now();
            info!(service = probe.name(), target = %probe.target(), required = dependency.required, "Waiting for dependency");

            let result = wait_until_ready(probe, &self.policy, &self.metrics).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let outcome = match result {
                Ok(attempts) => DependencyOutcome {
                    service: probe.name().to_string(),
                    target: probe.target(),
                    required: dependency.required,
                    ready: true,
                    attempts,
                    elapsed_ms,
                    error: None,
                },
                Err(e) => {
                    let attempts = match &e {
                        crate::ProbeError::Exhausted { attempts, .. } => *attempts,
                        _ => 1,
                    };
                    if !dependency.required {
                        warn!(service = probe.name(), error = %e, "Optional dependency unavailable, continuing");
                    }
                    DependencyOutcome {
                        service: probe.name().to_string(),
                        target: probe.target(),
                        required: dependency.required,
                        ready: false,
                        attempts,
                        elapsed_ms,
                        error: Some(e.to_string()),
                    }
                }
            };

            let blocking = outcome.required && !outcome.ready;
            outcomes.push(outcome);
            if blocking {
                break;
            }
        }

        outcomes
    }
}

/// First required dependency that did not become ready, if any.
pub fn first_blocking(outcomes: &[DependencyOutcome]) -> Option<&DependencyOutcome> {
    outcomes.iter().find(|o| o.required && !o.ready)
}
