//! Migration bookkeeping types.

use serde::{Deserialize, Serialize};

/// A migration known to the runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedMigration {
    pub version: i64,
    pub description: String,
}

/// Outcome of one migration run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Migrations applied by this run, in version order.
    pub applied: Vec<AppliedMigration>,
    /// Number of migrations that were already present before the run.
    pub already_applied: usize,
}

impl MigrationReport {
    /// True when the run left the schema untouched.
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}
