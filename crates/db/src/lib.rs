//! Database access for the TravelMate startup sequencer.
//!
//! Connects through the sqlx `Any` driver so the same code path serves
//! PostgreSQL in containers and SQLite in tests, and applies SQL migrations
//! loaded from a directory at runtime.

pub mod migrations;
pub mod models;
pub mod pool;

pub use migrations::MigrationRunner;
pub use models::{AppliedMigration, MigrationReport};
pub use pool::{redact_url, DbOptions, DbPool};
