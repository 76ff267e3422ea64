//! Individual preparation steps.

use crate::error::StepError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use travelmate_db::{DbOptions, DbPool, MigrationRunner};

/// What a successful step has to say about its work.
#[derive(Debug, Clone, Default)]
pub struct StepOutput {
    pub summary: Option<String>,
}

/// One preparation step of the startup sequence.
#[async_trait]
pub trait Step: Send + Sync {
    fn name(&self) -> &str;

    /// Printable form of what the step runs.
    fn describe(&self) -> String;

    async fn run(&self) -> Result<StepOutput, StepError>;
}

/// Runs an external command; a non-zero exit fails the step.
pub struct CommandStep {
    name: String,
    argv: Vec<String>,
    timeout: Duration,
    working_dir: Option<PathBuf>,
}

impl CommandStep {
    pub fn new<I, S>(name: impl Into<String>, argv: I, timeout: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            argv: argv.into_iter().map(Into::into).collect(),
            timeout,
            working_dir: None,
        }
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }
}

#[async_trait]
impl Step for CommandStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn describe(&self) -> String {
        self.argv.join(" ")
    }

    async fn run(&self) -> Result<StepOutput, StepError> {
        let (program, args) = self.argv.split_first().ok_or_else(|| StepError::EmptyCommand {
            step: self.name.clone(),
        })?;

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        debug!(step = %self.name, command = %self.describe(), "Spawning step command");
        let mut child = command.spawn().map_err(|source| StepError::Spawn {
            step: self.name.clone(),
            program: program.clone(),
            source,
        })?;

        let waited = timeout(self.timeout, child.wait()).await;
        match waited {
            Ok(Ok(status)) if status.success() => Ok(StepOutput::default()),
            Ok(Ok(status)) => Err(StepError::Failed {
                step: self.name.clone(),
                code: status.code(),
            }),
            Ok(Err(source)) => Err(StepError::Spawn {
                step: self.name.clone(),
                program: program.clone(),
                source,
            }),
            Err(_) => {
                warn!(step = %self.name, timeout = ?self.timeout, "Step timed out, killing it");
                if let Err(e) = child.kill().await {
                    warn!(step = %self.name, error = %e, "Failed to kill timed out step");
                }
                Err(StepError::TimedOut {
                    step: self.name.clone(),
                    after: self.timeout,
                })
            }
        }
    }
}

/// Applies SQL migrations from a directory directly, without `manage.py`.
pub struct MigrateStep {
    name: String,
    database_url: String,
    migrations_dir: PathBuf,
    options: DbOptions,
}

impl MigrateStep {
    pub fn new(database_url: impl Into<String>, migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: "migrate".to_string(),
            database_url: database_url.into(),
            migrations_dir: migrations_dir.into(),
            options: DbOptions::default(),
        }
    }

    pub fn with_options(mut self, options: DbOptions) -> Self {
        self.options = options;
        self
    }

    async fn apply(&self) -> anyhow::Result<StepOutput> {
        let runner = MigrationRunner::from_dir(&self.migrations_dir).await?;
        let db = DbPool::connect(&self.database_url, &self.options).await?;
        let report = runner.run(&db).await;
        db.close().await;
        let report = report?;

        info!(
            applied = report.applied.len(),
            already_applied = report.already_applied,
            "Migrations up to date"
        );
        Ok(StepOutput {
            summary: Some(format!(
                "applied {} migration(s), {} already applied",
                report.applied.len(),
                report.already_applied
            )),
        })
    }
}

#[async_trait]
impl Step for MigrateStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn describe(&self) -> String {
        format!("apply migrations from {}", self.migrations_dir.display())
    }

    async fn run(&self) -> Result<StepOutput, StepError> {
        self.apply().await.map_err(|source| StepError::Database {
            step: self.name.clone(),
            source,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zero_exit_succeeds() {
        let step = CommandStep::new("noop", ["true"], Duration::from_secs(5));
        step.run().await.unwrap();
    }

    #[tokio::test]
    async fn non_zero_exit_is_trapped() {
        let step = CommandStep::new("collectstatic", ["sh", "-c", "exit 3"], Duration::from_secs(5));
        match step.run().await {
            Err(StepError::Failed { step, code }) => {
                assert_eq!(step, "collectstatic");
                assert_eq!(code, Some(3));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let step = CommandStep::new("schema", ["/nonexistent/python", "manage.py"], Duration::from_secs(5));
        assert!(matches!(step.run().await, Err(StepError::Spawn { .. })));
    }

    #[tokio::test]
    async fn empty_command_is_rejected() {
        let step = CommandStep::new("schema", Vec::<String>::new(), Duration::from_secs(5));
        assert!(matches!(step.run().await, Err(StepError::EmptyCommand { .. })));
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let step = CommandStep::new("migrate", ["sleep", "5"], Duration::from_millis(100));
        assert!(matches!(step.run().await, Err(StepError::TimedOut { .. })));
    }

    #[tokio::test]
    async fn runs_in_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let step = CommandStep::new("touch", ["touch", "marker"], Duration::from_secs(5)).in_dir(dir.path());
        step.run().await.unwrap();
        assert!(dir.path().join("marker").exists());
    }
}
