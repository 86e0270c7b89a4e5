//! Host liveness probe.
//!
//! Devices expose a tiny health endpoint next to the websocket:
//! `GET http://<host>:8081/ruok` answers `imok` when the monitor stack
//! is up. The probe is deliberately a trait so the core can take an
//! injected implementation in tests.

use std::time::Duration;

use futures_util::future::BoxFuture;

/// Health endpoint port on the device.
pub const PROBE_PORT: u16 = 8081;

const CONNECT_TIMEOUT: Duration = Duration::from_millis(200);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

/// Boolean liveness check over a hostname, with a bounded timeout.
pub trait LivenessProbe: Send + Sync {
    fn is_alive(&self, hostname: &str) -> BoxFuture<'static, bool>;
}

/// Probe against the device's `/ruok` health endpoint.
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl LivenessProbe for HttpProbe {
    fn is_alive(&self, hostname: &str) -> BoxFuture<'static, bool> {
        let url = format!("http://{}:{}/ruok", hostname.trim(), PROBE_PORT);
        let client = self.client.clone();
        Box::pin(async move {
            let response = match client.get(&url).send().await {
                Ok(r) => r,
                Err(e) => {
                    tracing::debug!(url, error = %e, "liveness probe failed");
                    return false;
                }
            };
            if !response.status().is_success() {
                return false;
            }
            match response.text().await {
                Ok(body) => body.trim() == "imok",
                Err(_) => false,
            }
        })
    }
}
