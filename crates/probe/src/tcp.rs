//! Plain TCP reachability.

use crate::{ProbeError, ProbeResult, ReadinessProbe};
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Ready once a TCP connection to `addr` can be opened.
pub struct TcpProbe {
    name: String,
    addr: String,
    connect_timeout: Duration,
}

impl TcpProbe {
    pub fn new(name: impl Into<String>, addr: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            addr: addr.into(),
            connect_timeout,
        }
    }
}

/// Open a TCP connection within `limit`.
pub(crate) async fn connect(addr: &str, limit: Duration) -> ProbeResult<TcpStream> {
    match timeout(limit, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(source)) => Err(ProbeError::Connect {
            addr: addr.to_string(),
            source,
        }),
        Err(_) => Err(ProbeError::Timeout(limit)),
    }
}

#[async_trait]
impl ReadinessProbe for TcpProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn target(&self) -> String {
        self.addr.clone()
    }

    async fn check(&self) -> ProbeResult<()> {
        connect(&self.addr, self.connect_timeout).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn listening_port_is_ready() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let probe = TcpProbe::new("web", addr, Duration::from_secs(1));
        probe.check().await.unwrap();
    }

    #[tokio::test]
    async fn closed_port_is_not_ready() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let probe = TcpProbe::new("web", addr, Duration::from_secs(1));
        assert!(matches!(probe.check().await, Err(ProbeError::Connect { .. })));
    }
}
