// HTTP transport configuration shared by every robot client.

use std::time::Duration;

use crate::error::Error;

/// Transport-level settings for building the underlying `reqwest` client.
///
/// The robot API is plain HTTP on the local network, so the knobs that
/// matter are the timeouts: every call a poller or executor makes must be
/// bounded, or a wedged robot stalls the whole control loop.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Per-request timeout, connect through body. Default: 10s.
    pub timeout: Duration,
    /// TCP connect timeout. Default: 5s.
    pub connect_timeout: Duration,
    /// User-Agent header sent with every request.
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            user_agent: format!("porter/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` with these settings applied.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .user_agent(&self.user_agent)
            .build()
            .map_err(Error::Transport)
    }
}
