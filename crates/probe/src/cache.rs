//! Redis readiness.

use crate::{ProbeError, ProbeResult, ReadinessProbe};
use async_trait::async_trait;

/// Ready once the cache answers `PING` with `PONG`.
pub struct RedisProbe {
    name: String,
    client: redis::Client,
    display: String,
}

impl RedisProbe {
    /// Build a probe for `redis_url`; fails only if the URL cannot be parsed.
    pub fn new(name: impl Into<String>, redis_url: &str) -> ProbeResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let info = client.get_connection_info();
        let scheme = match info.addr {
            redis::ConnectionAddr::TcpTls { .. } => "rediss",
            _ => "redis",
        };
        Ok(Self {
            name: name.into(),
            display: format!("{scheme}://{}/{}", info.addr, info.redis.db),
            client,
        })
    }
}

#[async_trait]
impl ReadinessProbe for RedisProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn target(&self) -> String {
        self.display.clone()
    }

    async fn check(&self) -> ProbeResult<()> {
        let mut conn = self.client.get_async_connection().await?;
        let reply: String = redis::cmd("PING").query_async(&mut conn).await?;
        if reply != "PONG" {
            return Err(ProbeError::Protocol(format!("PING answered {reply:?}")));
        }
        Ok(())
    }
}
