//! HTTP readiness, used for the mail-capture inspection UI and the server itself.

use crate::{ProbeError, ProbeResult, ReadinessProbe};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Ready once a GET on `url` returns a 2xx status.
pub struct HttpProbe {
    name: String,
    url: String,
    client: Client,
}

impl HttpProbe {
    pub fn new(name: impl Into<String>, url: impl Into<String>, request_timeout: Duration) -> ProbeResult<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            name: name.into(),
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl ReadinessProbe for HttpProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn target(&self) -> String {
        self.url.clone()
    }

    async fn check(&self) -> ProbeResult<()> {
        let response = self.client.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(ProbeError::Protocol(format!(
                "GET {} returned {}",
                self.url,
                response.status()
            )));
        }
        Ok(())
    }
}
