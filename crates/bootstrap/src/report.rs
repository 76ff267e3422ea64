//! Record of one startup run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use travelmate_probe::DependencyOutcome;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded {
        elapsed_ms: u64,
        summary: Option<String>,
    },
    Failed {
        elapsed_ms: u64,
        error: String,
    },
    /// Never started because an earlier phase failed.
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub name: String,
    pub command: String,
    #[serde(flatten)]
    pub status: StepStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct SequenceReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub dependencies: Vec<DependencyOutcome>,
    pub steps: Vec<StepRecord>,
}

impl SequenceReport {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            dependencies: Vec::new(),
            steps: Vec::new(),
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// True when every required dependency was ready and every step succeeded.
    pub fn succeeded(&self) -> bool {
        self.dependencies.iter().all(|d| d.ready || !d.required)
            && self
                .steps
                .iter()
                .all(|s| matches!(s.status, StepStatus::Succeeded { .. }))
    }

    pub fn step(&self, name: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.name == name)
    }
}

impl Default for SequenceReport {
    fn default() -> Self {
        Self::new()
    }
}
