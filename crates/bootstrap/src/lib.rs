//! Startup sequencer for the TravelMate web container.
//!
//! Replaces a plain shell entrypoint: dependencies are probed until ready,
//! the preparation steps run strictly in order with every failure trapped,
//! and only then is the server process started.

pub mod config;
pub mod deps;
pub mod error;
pub mod plan;
pub mod report;
pub mod sequencer;
pub mod server;
pub mod step;

pub use config::BootConfig;
pub use deps::{build_waiter, load_topology};
pub use error::{BootError, BootFailure, ConfigError, ServerError, StepError};
pub use plan::StartupPlan;
pub use report::{SequenceReport, StepRecord, StepStatus};
pub use sequencer::Sequencer;
pub use server::{ServerCommand, ServerLauncher};
pub use step::{CommandStep, MigrateStep, Step, StepOutput};
