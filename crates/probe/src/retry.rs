//! Retry with exponential backoff.

use crate::{ProbeError, ProbeResult, ReadinessProbe};
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};
use travelmate_telemetry::Metrics;

/// How often and how patiently a probe is retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    /// Upper bound for a single attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
            attempt_timeout: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    /// Delay to sleep after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.multiplier.max(1.0).powi(exponent);
        let secs = (self.initial_backoff.as_secs_f64() * factor).min(self.max_backoff.as_secs_f64());
        if secs.is_finite() {
            Duration::from_secs_f64(secs)
        } else {
            self.max_backoff
        }
    }

    /// Sum of every delay the policy can sleep through, ignoring attempt time.
    pub fn total_backoff(&self) -> Duration {
        (1..self.max_attempts.max(1)).map(|a| self.delay_for(a)).sum()
    }
}

/// Retry `probe` until it succeeds or `policy` is exhausted.
///
/// Returns the number of attempts it took.
pub async fn wait_until_ready(
    probe: &dyn ReadinessProbe,
    policy: &RetryPolicy,
    metrics: &Metrics,
) -> ProbeResult<u32> {
    let service = probe.name();
    let started = Instant::now();
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        metrics.inc_probe_attempts(service);

        let result = match timeout(policy.attempt_timeout, probe.check()).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout(policy.attempt_timeout)),
        };

        match result {
            Ok(()) => {
                info!(
                    service,
                    target = %probe.target(),
                    attempt,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Dependency ready"
                );
                return Ok(attempt);
            }
            Err(e) => {
                metrics.inc_probe_failures(service);
                if attempt >= max_attempts {
                    warn!(service, attempt, error = %e, "Giving up on dependency");
                    return Err(ProbeError::Exhausted {
                        service: service.to_string(),
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                let delay = policy.delay_for(attempt);
                debug!(
                    service,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Dependency not ready yet"
                );
                sleep(delay).await;
            }
        }
    }
}
