//! Random free-port selection.
//!
//! A candidate is considered taken when something on `localhost` accepts a
//! TCP connection on it. Refused or timed-out probes mean the port is free.

use crate::config::{MIN_PORT, ShareConfig};
use crate::error::{Result, ShareError};
use rand::Rng;
use std::time::Duration;
use tokio::net::TcpStream;

/// Default budget when no config is supplied
pub const DEFAULT_MAX_ATTEMPTS: u32 = 1000;

/// Default connect timeout for a single probe
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct PortAllocator {
    low: u16,
    high: u16,
    max_attempts: u32,
    probe_timeout: Duration,
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self {
            low: MIN_PORT,
            high: u16::MAX,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl PortAllocator {
    pub fn new(range: (u16, u16), max_attempts: u32, probe_timeout: Duration) -> Self {
        Self {
            low: range.0,
            high: range.1,
            max_attempts,
            probe_timeout,
        }
    }

    pub fn from_config(config: &ShareConfig) -> Self {
        Self::new(
            config.port_range,
            config.max_port_attempts,
            config.probe_timeout(),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn sample(&self) -> u16 {
        rand::rng().random_range(self.low..=self.high)
    }

    /// Sample candidates until one is not in use, giving up after the budget.
    pub async fn allocate(&self) -> Result<u16> {
        for attempt in 1..=self.max_attempts {
            let candidate = self.sample();
            if !is_port_in_use(candidate, self.probe_timeout).await {
                tracing::debug!("Port {} is free (attempt {})", candidate, attempt);
                return Ok(candidate);
            }
            tracing::debug!("Port {} is in use, resampling", candidate);
        }

        Err(ShareError::ResourceExhausted {
            attempts: self.max_attempts,
        })
    }
}

/// Find an unused port in [1024, 65535] with the default budget
pub async fn allocate_port() -> Result<u16> {
    PortAllocator::default().allocate().await
}

/// Whether something accepts connections on `localhost:port`.
///
/// The probe stream is dropped immediately, closing the socket.
pub async fn is_port_in_use(port: u16, probe_timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(probe_timeout, TcpStream::connect(("localhost", port))).await,
        Ok(Ok(_))
    )
}
