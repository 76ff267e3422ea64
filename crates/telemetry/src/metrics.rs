//! Prometheus metrics for the startup sequencer.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Metrics collector for one bootstrap run.
///
/// Each instance owns its registry so independent runs (and tests) never
/// collide on metric names.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    probe_attempts: IntCounterVec,
    probe_failures: IntCounterVec,
    step_duration: HistogramVec,
    steps_completed: IntCounter,
    steps_failed: IntCounter,
}

impl Metrics {
    /// Create a new metrics instance.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let probe_attempts = IntCounterVec::new(
            Opts::new(
                "travelmate_boot_probe_attempts_total",
                "Total number of readiness probe attempts",
            ),
            &["service"],
        )?;
        registry.register(Box::new(probe_attempts.clone()))?;

        let probe_failures = IntCounterVec::new(
            Opts::new(
                "travelmate_boot_probe_failures_total",
                "Total number of failed readiness probe attempts",
            ),
            &["service"],
        )?;
        registry.register(Box::new(probe_failures.clone()))?;

        let step_duration = HistogramVec::new(
            HistogramOpts::new(
                "travelmate_boot_step_duration_seconds",
                "Startup step duration in seconds",
            )
            .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 300.0, 600.0]),
            &["step"],
        )?;
        registry.register(Box::new(step_duration.clone()))?;

        let steps_completed = IntCounter::new(
            "travelmate_boot_steps_completed_total",
            "Total number of startup steps that succeeded",
        )?;
        registry.register(Box::new(steps_completed.clone()))?;

        let steps_failed = IntCounter::new(
            "travelmate_boot_steps_failed_total",
            "Total number of startup steps that failed",
        )?;
        registry.register(Box::new(steps_failed.clone()))?;

        Ok(Self {
            registry,
            probe_attempts,
            probe_failures,
            step_duration,
            steps_completed,
            steps_failed,
        })
    }

    /// Record one probe attempt against a service.
    pub fn inc_probe_attempts(&self, service: &str) {
        self.probe_attempts.with_label_values(&[service]).inc();
    }

    /// Record one failed probe attempt against a service.
    pub fn inc_probe_failures(&self, service: &str) {
        self.probe_failures.with_label_values(&[service]).inc();
    }

    /// Number of probe attempts recorded for a service.
    pub fn probe_attempts(&self, service: &str) -> u64 {
        self.probe_attempts.with_label_values(&[service]).get()
    }

    /// Record the duration of a startup step.
    pub fn observe_step_duration(&self, step: &str, duration_secs: f64) {
        self.step_duration.with_label_values(&[step]).observe(duration_secs);
    }

    pub fn inc_steps_completed(&self) {
        self.steps_completed.inc();
    }

    pub fn inc_steps_failed(&self) {
        self.steps_failed.inc();
    }

    pub fn steps_completed(&self) -> u64 {
        self.steps_completed.get()
    }

    pub fn steps_failed(&self) -> u64 {
        self.steps_failed.get()
    }

    /// Get Prometheus metrics as a string.
    pub fn gather(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instances_do_not_share_registries() {
        let first = Metrics::new().unwrap();
        let second = Metrics::new().unwrap();

        first.inc_probe_attempts("postgres");
        first.inc_probe_attempts("postgres");

        assert_eq!(first.probe_attempts("postgres"), 2);
        assert_eq!(second.probe_attempts("postgres"), 0);
    }

    #[test]
    fn gather_renders_recorded_series() {
        let metrics = Metrics::new().unwrap();
        metrics.inc_probe_failures("redis");
        metrics.observe_step_duration("collectstatic", 0.3);
        metrics.inc_steps_completed();

        let body = metrics.gather().unwrap();
        assert!(body.contains("travelmate_boot_probe_failures_total{service=\"redis\"} 1"));
        assert!(body.contains("travelmate_boot_step_duration_seconds_count{step=\"collectstatic\"} 1"));
        assert!(body.contains("travelmate_boot_steps_completed_total 1"));
    }
}
