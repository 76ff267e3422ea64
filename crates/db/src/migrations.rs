//! Runtime SQL migrations.

use crate::models::{AppliedMigration, MigrationReport};
use crate::pool::DbPool;
use anyhow::{Context, Result};
use sqlx::migrate::{Migrate, Migrator};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

/// Applies the SQL migrations found in a directory.
///
/// Files follow the sqlx naming scheme (`<version>_<description>.sql`, or
/// `.up.sql`/`.down.sql` pairs). Applied versions are tracked in the
/// `_sqlx_migrations` table, which makes repeated runs no-ops.
pub struct MigrationRunner {
    migrator: Migrator,
}

impl MigrationRunner {
    /// Load migrations from `dir`.
    pub async fn from_dir(dir: &Path) -> Result<Self> {
        let migrator = Migrator::new(dir.to_path_buf())
            .await
            .with_context(|| format!("failed to load migrations from {}", dir.display()))?;
        Ok(Self { migrator })
    }

    /// All up migrations known to the runner, in version order.
    pub fn known(&self) -> Vec<AppliedMigration> {
        self.migrator
            .iter()
            .filter(|m| !m.migration_type.is_down_migration())
            .map(|m| AppliedMigration {
                version: m.version,
                description: m.description.to_string(),
            })
            .collect()
    }

    /// Versions present on disk but not yet recorded in the database.
    pub async fn pending(&self, db: &DbPool) -> Result<Vec<AppliedMigration>> {
        let applied = self.applied_versions(db).await?;
        Ok(self
            .known()
            .into_iter()
            .filter(|m| !applied.contains(&m.version))
            .collect())
    }

    /// Apply every pending migration.
    pub async fn run(&self, db: &DbPool) -> Result<MigrationReport> {
        let applied_before = self.applied_versions(db).await?;
        let pending: Vec<AppliedMigration> = self
            .known()
            .into_iter()
            .filter(|m| !applied_before.contains(&m.version))
            .collect();

        if pending.is_empty() {
            info!(already_applied = applied_before.len(), "No pending migrations");
        } else {
            info!(count = pending.len(), "Applying pending migrations");
        }

        self.migrator
            .run(db.pool())
            .await
            .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;

        for migration in &pending {
            info!(
                version = migration.version,
                description = %migration.description,
                "Applied migration"
            );
        }

        Ok(MigrationReport {
            applied: pending,
            already_applied: applied_before.len(),
        })
    }

    async fn applied_versions(&self, db: &DbPool) -> Result<HashSet<i64>> {
        let mut conn = db.pool().acquire().await.context("failed to acquire connection")?;
        conn.ensure_migrations_table()
            .await
            .context("failed to create migrations table")?;
        let applied = conn
            .list_applied_migrations()
            .await
            .context("failed to list applied migrations")?;
        Ok(applied.into_iter().map(|m| m.version).collect())
    }
}
