//! Gateway configuration

use harbour_signer::StorageConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Configuration rejected at startup
#[derive(Error, Debug)]
#[error("invalid configuration: {0}")]
pub struct ConfigError(pub String);

/// Gateway server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Listen address: `tcp://host:port`, `tcp4://…`, `tcp6://…`, `host:port` or `fd://N`
    pub listen: String,
    /// Metadata service base URL
    pub meta_endpoint: String,
    /// Deadline for one metadata call (seconds)
    pub meta_timeout_secs: u64,
    /// Object store the issued links point at
    pub storage: StorageConfig,
    /// Target of the `callback` link handed out on registration
    pub callback_url: String,
    /// Upper bound on waiting for open connections after a drain signal (seconds)
    pub drain_timeout_secs: Option<u64>,
    /// Maximum request body size (bytes)
    pub max_body_size: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: "tcp://127.0.0.1:8080".to_string(),
            meta_endpoint: "http://127.0.0.1:9090".to_string(),
            meta_timeout_secs: 30,
            storage: StorageConfig::default(),
            callback_url: "http://127.0.0.1:9090/callback".to_string(),
            drain_timeout_secs: None,
            max_body_size: 64 * 1024, // register bodies are tiny
        }
    }
}

impl GatewayConfig {
    /// Metadata call deadline
    pub fn meta_timeout(&self) -> Duration {
        Duration::from_secs(self.meta_timeout_secs)
    }

    /// Drain deadline, if any
    pub fn drain_timeout(&self) -> Option<Duration> {
        self.drain_timeout_secs.map(Duration::from_secs)
    }

    /// Reject settings that would only fail later, per request
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen.is_empty() {
            return Err(ConfigError("listen address is empty".to_string()));
        }
        if self.meta_timeout_secs == 0 {
            return Err(ConfigError("metadata timeout must be at least 1 second".to_string()));
        }
        if self.storage.download_expiry_secs == 0 {
            return Err(ConfigError("download expiry must be at least 1 second".to_string()));
        }
        url::Url::parse(&self.callback_url)
            .map_err(|e| ConfigError(format!("callback url {}: {}", self.callback_url, e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(GatewayConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_values() {
        let config = GatewayConfig {
            meta_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = GatewayConfig {
            callback_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_durations() {
        let config = GatewayConfig {
            drain_timeout_secs: Some(5),
            ..Default::default()
        };
        assert_eq!(config.meta_timeout(), Duration::from_secs(30));
        assert_eq!(config.drain_timeout(), Some(Duration::from_secs(5)));
    }
}
