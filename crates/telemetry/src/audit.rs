//! Startup report persistence.

use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Append a startup report as pretty JSON to the report file.
///
/// Does nothing when `path` is `None`.
pub fn write_startup_report<P: AsRef<Path>, T: Serialize>(
    path: Option<P>,
    payload: &T,
) -> anyhow::Result<()> {
    if let Some(report_path) = path {
        let json = serde_json::to_string_pretty(payload)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&report_path)?;
        writeln!(file, "{}", json)?;
        info!(path = ?report_path.as_ref(), "Wrote startup report");
    }
    Ok(())
}
