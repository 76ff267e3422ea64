//! The ordered list of preparation steps.

use crate::config::BootConfig;
use crate::step::{CommandStep, MigrateStep, Step};
use travelmate_db::DbOptions;

/// Steps run, in order, before the server starts.
#[derive(Default)]
pub struct StartupPlan {
    steps: Vec<Box<dyn Step>>,
}

impl StartupPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: impl Step + 'static) -> &mut Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn steps(&self) -> &[Box<dyn Step>] {
        &self.steps
    }

    pub fn names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Keep only the named steps, preserving their order.
    pub fn only(mut self, names: &[&str]) -> Self {
        self.steps.retain(|s| names.iter().any(|n| *n == s.name()));
        self
    }

    /// Static files, then the API schema, then migrations.
    pub fn django(config: &BootConfig) -> Self {
        let manage = |args: &[&str]| {
            let mut argv = vec![config.python.clone(), config.manage_py.clone()];
            argv.extend(args.iter().map(|a| a.to_string()));
            argv
        };

        let mut plan = Self::new();
        plan.push(CommandStep::new(
            "collectstatic",
            manage(&["collectstatic", "--noinput"]),
            config.step_timeout,
        ));
        plan.push(CommandStep::new(
            "schema",
            manage(&["spectacular", "--file", config.schema_file.as_str()]),
            config.step_timeout,
        ));
        match &config.migrations_dir {
            Some(dir) => {
                let options = DbOptions {
                    acquire_timeout: config.retry.attempt_timeout,
                    ..DbOptions::default()
                };
                plan.push(MigrateStep::new(config.database_url.clone(), dir.clone()).with_options(options));
            }
            None => {
                plan.push(CommandStep::new(
                    "migrate",
                    manage(&["migrate", "--noinput"]),
                    config.step_timeout,
                ));
            }
        }
        plan
    }
}
