//! Application state

use crate::config::GatewayConfig;
use anyhow::Context;
use harbour_meta::{MetaClient, MetaConfig, MetadataStore};
use harbour_signer::CapabilityIssuer;
use std::sync::Arc;
use tracing::info;

/// Application state shared across handlers
///
/// Built once at startup and read-only afterward; each request works on its
/// own ephemeral descriptors.
pub struct AppState {
    /// Gateway configuration
    pub config: GatewayConfig,
    /// Metadata source of truth
    pub meta: Arc<dyn MetadataStore>,
    /// Capability issuer for the object store
    pub issuer: CapabilityIssuer,
}

impl AppState {
    /// Create state talking to the configured metadata service
    pub fn new(config: GatewayConfig) -> anyhow::Result<Self> {
        let meta_config = MetaConfig::new(&config.meta_endpoint).with_timeout(config.meta_timeout());
        let meta = MetaClient::new(meta_config)
            .with_context(|| format!("metadata endpoint {}", config.meta_endpoint))?;

        info!(endpoint = %config.meta_endpoint, timeout_secs = config.meta_timeout_secs, "metadata service configured");
        Self::with_store(config, Arc::new(meta))
    }

    /// Create state around an existing metadata store
    pub fn with_store(config: GatewayConfig, meta: Arc<dyn MetadataStore>) -> anyhow::Result<Self> {
        config.validate()?;

        let issuer = CapabilityIssuer::new(&config.storage)
            .with_context(|| format!("storage endpoint {}", config.storage.endpoint))?;

        info!(endpoint = %config.storage.endpoint, region = %config.storage.region, "object store configured");

        Ok(Self {
            config,
            meta,
            issuer,
        })
    }
}
