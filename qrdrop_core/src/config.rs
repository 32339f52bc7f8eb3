use crate::error::{Result, ShareError};
use axum::http::HeaderValue;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_QUALIFIER: &str = "com";
const APP_ORGANIZATION: &str = "qrdrop";
const APP_NAME: &str = "qrdrop";
const CONFIG_FILE: &str = "config.json";

/// Lowest port the allocator may hand out (no privileged ports)
pub const MIN_PORT: u16 = 1024;

/// Session settings shared by every share started with this config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShareConfig {
    /// How long a share stays available when the caller doesn't say
    pub default_duration_secs: u64,
    /// Interface to listen on. "" and "0.0.0.0" both mean all interfaces.
    pub bind_host: String,
    /// Host placed in the download URL instead of the detected LAN address
    pub advertise_host: Option<String>,
    /// Inclusive port range sampled by the allocator
    pub port_range: (u16, u16),
    pub max_port_attempts: u32,
    pub probe_timeout_ms: u64,
    /// Basic auth realm sent in the 401 challenge
    pub realm: String,
    /// Upper bound on waiting for in-flight downloads at the deadline
    pub drain_timeout_secs: u64,
    /// Pixel size of one QR module when rendering images
    pub qr_module_pixels: u32,
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            default_duration_secs: 300,
            bind_host: "0.0.0.0".to_string(),
            advertise_host: None,
            port_range: (MIN_PORT, u16::MAX),
            max_port_attempts: 1000,
            probe_timeout_ms: 200,
            realm: "qrdrop".to_string(),
            drain_timeout_secs: 5,
            qr_module_pixels: 10,
        }
    }
}

impl ShareConfig {
    /// Get the config file path
    fn get_config_path() -> Option<PathBuf> {
        if let Ok(dir) = std::env::var("QRDROP_CONFIG_DIR") {
            return Some(PathBuf::from(dir).join(CONFIG_FILE));
        }

        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// Load config from disk or return default
    pub fn load() -> Self {
        let path = match Self::get_config_path() {
            Some(p) => p,
            None => return Self::default(),
        };

        match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring malformed config {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Load config from an explicit file, failing if it is missing or malformed
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| ShareError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `QRDROP_*` environment overrides on top of the loaded values
    pub fn apply_env_overrides(&mut self) {
        if let Some(secs) = std::env::var("QRDROP_DURATION_SECS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            self.default_duration_secs = secs;
        }
        if let Ok(host) = std::env::var("QRDROP_BIND_HOST") {
            self.bind_host = host;
        }
        if let Ok(host) = std::env::var("QRDROP_ADVERTISE_HOST") {
            let host = host.trim().to_string();
            self.advertise_host = (!host.is_empty()).then_some(host);
        }
    }

    pub fn validate(&self) -> Result<()> {
        let (low, high) = self.port_range;
        if low < MIN_PORT {
            return Err(ShareError::InvalidConfig(format!(
                "port range must start at {} or above, got {}",
                MIN_PORT, low
            )));
        }
        if low > high {
            return Err(ShareError::InvalidConfig(format!(
                "empty port range {}-{}",
                low, high
            )));
        }
        if self.max_port_attempts == 0 {
            return Err(ShareError::InvalidConfig(
                "max_port_attempts must be positive".to_string(),
            ));
        }
        if self.default_duration_secs == 0 {
            return Err(ShareError::InvalidConfig(
                "default_duration_secs must be positive".to_string(),
            ));
        }
        // A zero timeout would report every probed port as free
        if self.probe_timeout_ms == 0 {
            return Err(ShareError::InvalidConfig(
                "probe_timeout_ms must be positive".to_string(),
            ));
        }
        self.auth_challenge()?;
        Ok(())
    }

    /// Host the listener binds to, with "" normalized to all interfaces
    pub fn bind_host(&self) -> &str {
        match self.bind_host.trim() {
            "" => "0.0.0.0",
            host => host,
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    /// `WWW-Authenticate` value sent with every 401
    pub fn auth_challenge(&self) -> Result<HeaderValue> {
        HeaderValue::from_str(&format!("Basic realm=\"{}\"", self.realm))
            .map_err(|_| ShareError::InvalidConfig(format!("invalid realm {:?}", self.realm)))
    }
}
