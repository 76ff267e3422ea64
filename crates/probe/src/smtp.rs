//! SMTP greeting check for the mail-capture sidecar.

use crate::tcp::connect;
use crate::{ProbeError, ProbeResult, ReadinessProbe};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::time::timeout;

/// Ready once the server sends a `220` service-ready greeting.
pub struct SmtpProbe {
    name: String,
    addr: String,
    io_timeout: Duration,
}

impl SmtpProbe {
    pub fn new(name: impl Into<String>, addr: impl Into<String>, io_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            addr: addr.into(),
            io_timeout,
        }
    }
}

#[async_trait]
impl ReadinessProbe for SmtpProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn target(&self) -> String {
        format!("smtp://{}", self.addr)
    }

    async fn check(&self) -> ProbeResult<()> {
        let stream = connect(&self.addr, self.io_timeout).await?;
        let mut reader = BufReader::new(stream);

        let mut greeting = String::new();
        let read = timeout(self.io_timeout, reader.read_line(&mut greeting))
            .await
            .map_err(|_| ProbeError::Timeout(self.io_timeout))?
            .map_err(|source| ProbeError::Connect {
                addr: self.addr.clone(),
                source,
            })?;

        if read == 0 {
            return Err(ProbeError::Protocol("connection closed before greeting".to_string()));
        }
        if !greeting.starts_with("220") {
            return Err(ProbeError::Protocol(format!(
                "expected 220 greeting, got {:?}",
                greeting.trim_end()
            )));
        }

        // Best effort; the sidecar is already known to be ready.
        let _ = reader.get_mut().write_all(b"QUIT\r\n").await;
        Ok(())
    }
}
