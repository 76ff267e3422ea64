//! Relational database readiness.

use crate::{ProbeError, ProbeResult, ReadinessProbe};
use async_trait::async_trait;
use std::time::Duration;
use travelmate_db::{redact_url, DbOptions, DbPool};

/// Ready once a connection can be opened and `SELECT 1` succeeds.
pub struct SqlProbe {
    name: String,
    database_url: String,
    connect_timeout: Duration,
}

impl SqlProbe {
    pub fn new(name: impl Into<String>, database_url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            database_url: database_url.into(),
            connect_timeout,
        }
    }
}

#[async_trait]
impl ReadinessProbe for SqlProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn target(&self) -> String {
        redact_url(&self.database_url)
    }

    async fn check(&self) -> ProbeResult<()> {
        let options = DbOptions {
            max_connections: 1,
            acquire_timeout: self.connect_timeout,
        };
        let db = DbPool::connect(&self.database_url, &options)
            .await
            .map_err(ProbeError::Database)?;
        let result = db.ping().await.map_err(ProbeError::Database);
        db.close().await;
        result
    }
}
