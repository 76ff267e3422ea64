//! Database connection pool management.

use anyhow::{Context, Result};
use sqlx::any::{install_default_drivers, AnyPoolOptions};
use sqlx::AnyPool;
use std::time::Duration;
use tracing::{debug, info};

/// Connection settings for [`DbPool`].
#[derive(Debug, Clone)]
pub struct DbOptions {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for DbOptions {
    fn default() -> Self {
        Self {
            max_connections: 5,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct DbPool {
    pool: AnyPool,
}

impl DbPool {
    /// Connect to the database named by `database_url`.
    ///
    /// Accepts `postgres://`, `postgis://` (treated as PostgreSQL) and
    /// `sqlite:` URLs. An in-memory SQLite database lives in a single
    /// connection, so the pool is pinned to one connection that never expires.
    pub async fn connect(database_url: &str, options: &DbOptions) -> Result<Self> {
        install_default_drivers();

        let url = normalize_url(database_url);
        let mut pool_options = AnyPoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(options.acquire_timeout);

        if is_in_memory(&url) {
            pool_options = pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options
            .connect(&url)
            .await
            .with_context(|| format!("failed to connect to {}", redact_url(database_url)))?;

        info!(database = %redact_url(database_url), "Connected to database");

        Ok(Self { pool })
    }

    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Round-trip a trivial query to prove the server answers.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("database ping failed")?;
        debug!("Database ping succeeded");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Map URL schemes understood by the Django side onto sqlx driver schemes.
fn normalize_url(database_url: &str) -> String {
    for prefix in ["postgis://", "pgsql://", "postgresql+psycopg://"] {
        if let Some(rest) = database_url.strip_prefix(prefix) {
            return format!("postgres://{rest}");
        }
    }
    database_url.to_string()
}

fn is_in_memory(url: &str) -> bool {
    url.starts_with("sqlite:") && (url.contains(":memory:") || url.contains("mode=memory"))
}

/// Render a connection URL without its password, for logs.
pub fn redact_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("***"));
            }
            parsed.to_string()
        }
        Err(_) if raw.contains('@') => "<redacted>".to_string(),
        Err(_) => raw.to_string(),
    }
}
