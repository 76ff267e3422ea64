//! Runs the dependency gate and the preparation steps.

use crate::error::{BootError, BootFailure};
use crate::plan::StartupPlan;
use crate::report::{SequenceReport, StepRecord, StepStatus};
use tokio::time::Instant;
use tracing::{error, info};
use travelmate_probe::{first_blocking, DependencyWaiter};
use travelmate_telemetry::Metrics;

/// Strictly sequential startup: dependencies, then each step in order.
///
/// The first failure ends the run; nothing after it is started.
pub struct Sequencer {
    metrics: Metrics,
}

impl Sequencer {
    pub fn new(metrics: Metrics) -> Self {
        Self { metrics }
    }

    pub async fn run(
        &self,
        waiter: &DependencyWaiter,
        plan: &StartupPlan,
    ) -> Result<SequenceReport, BootFailure> {
        let mut report = SequenceReport::new();
        info!(dependencies = waiter.len(), steps = plan.steps().len(), "Starting bootstrap sequence");

        report.dependencies = waiter.wait_all().await;
        if let Some(blocking) = first_blocking(&report.dependencies) {
            let error = BootError::DependencyNotReady {
                service: blocking.service.clone(),
                reason: blocking.error.clone().unwrap_or_default(),
            };
            error!(service = %blocking.service, "Required dependency unavailable, aborting startup");
            skip_all(&mut report, plan, 0);
            report.finish();
            return Err(BootFailure { report, error });
        }

        for (index, step) in plan.steps().iter().enumerate() {
            info!(step = step.name(), command = %step.describe(), "Running step");
            let started = Instant::now();
            let result = step.run().await;
            let elapsed = started.elapsed();
            self.metrics.observe_step_duration(step.name(), elapsed.as_secs_f64());
            let elapsed_ms = elapsed.as_millis() as u64;

            match result {
                Ok(output) => {
                    self.metrics.inc_steps_completed();
                    info!(step = step.name(), elapsed_ms, "Step finished");
                    report.steps.push(StepRecord {
                        name: step.name().to_string(),
                        command: step.describe(),
                        status: StepStatus::Succeeded {
                            elapsed_ms,
                            summary: output.summary,
                        },
                    });
                }
                Err(e) => {
                    self.metrics.inc_steps_failed();
                    error!(step = step.name(), elapsed_ms, error = %e, "Step failed, aborting startup");
                    report.steps.push(StepRecord {
                        name: step.name().to_string(),
                        command: step.describe(),
                        status: StepStatus::Failed {
                            elapsed_ms,
                            error: e.to_string(),
                        },
                    });
                    skip_all(&mut report, plan, index + 1);
                    report.finish();
                    return Err(BootFailure {
                        report,
                        error: BootError::Step(e),
                    });
                }
            }
        }

        report.finish();
        info!("Bootstrap sequence complete");
        Ok(report)
    }
}

fn skip_all(report: &mut SequenceReport, plan: &StartupPlan, from: usize) {
    for step in plan.steps().iter().skip(from) {
        report.steps.push(StepRecord {
            name: step.name().to_string(),
            command: step.describe(),
            status: StepStatus::Skipped,
        });
    }
}
