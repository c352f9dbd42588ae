//! Readiness and health probes

use crate::error::{LifecycleError, LifecycleResult};
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;

/// Checks whether the backend answers
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// `Ok` when healthy, otherwise a short description of the failure
    async fn check(&self) -> Result<(), String>;
}

/// GET against the backend's liveness path; any 2xx is healthy
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    /// Probe `url`, giving up on a single request after `timeout`
    pub fn new(url: impl Into<String>, timeout: Duration) -> LifecycleResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LifecycleError::Probe(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Probed URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn check(&self) -> Result<(), String> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(format!("HTTP {}", status.as_u16()))
        }
    }
}

/// True if something accepts TCP connections on `host:port`
pub async fn port_in_use(host: &str, port: u16, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect((host, port))).await,
        Ok(Ok(_))
    )
}
