//! HTTP client for the metadata service
//!
//! Every call is exactly one outbound request: no retries, no caching. Any
//! answer other than a decodable success collapses into a non-`Found`
//! [`MetaOutcome`], and the cause is logged here so operators can tell a
//! missing record from an unreachable service.

use crate::{MetaError, MetaOutcome, MetadataStore, ObjectKey, ObjectMeta, RegisterRequest, Result};
use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, StatusCode};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Default deadline for one metadata call
pub const DEFAULT_META_TIMEOUT: Duration = Duration::from_secs(30);

/// Metadata client configuration
#[derive(Clone, Debug)]
pub struct MetaConfig {
    /// Base URL; objects live at `{endpoint}/{user}/{repo}/{oid}`
    pub endpoint: String,
    /// Deadline for one call, connect through body
    pub timeout: Duration,
}

impl MetaConfig {
    /// Create a config with the default timeout
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: DEFAULT_META_TIMEOUT,
        }
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Metadata service client
#[derive(Clone, Debug)]
pub struct MetaClient {
    http: Client,
    endpoint: Url,
    timeout: Duration,
}

impl MetaClient {
    /// Create a new client
    pub fn new(config: MetaConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| MetaError::Endpoint(format!("{}: {}", config.endpoint, e)))?;

        if endpoint.cannot_be_a_base() || !matches!(endpoint.scheme(), "http" | "https") {
            return Err(MetaError::Endpoint(format!(
                "{}: expected an http(s) base URL",
                config.endpoint
            )));
        }

        let http = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            http,
            endpoint,
            timeout: config.timeout,
        })
    }

    /// URL of an object record
    pub fn object_url(&self, key: &ObjectKey) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| MetaError::Endpoint(self.endpoint.to_string()))?
            .pop_if_empty()
            .extend([&key.user, &key.repo, &key.oid]);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder, authz: Option<&str>) -> Result<reqwest::Response> {
        let request = match authz {
            Some(value) => request.header(header::AUTHORIZATION, value),
            None => request,
        };

        request.send().await.map_err(|e| self.classify(e))
    }

    async fn decode(&self, response: reqwest::Response) -> Result<ObjectMeta> {
        let body = response.bytes().await.map_err(|e| self.classify(e))?;
        Ok(serde_json::from_slice(&body)?)
    }

    fn classify(&self, error: reqwest::Error) -> MetaError {
        if error.is_timeout() {
            MetaError::Timeout(self.timeout)
        } else {
            MetaError::Transport(error)
        }
    }
}

fn unreachable(op: &'static str, key: &ObjectKey, error: MetaError) -> MetaOutcome {
    warn!(op, key = %key, cause = error.kind(), error = %error, "metadata service unreachable");
    MetaOutcome::Unreachable(error)
}

#[async_trait]
impl MetadataStore for MetaClient {
    #[instrument(skip(self, key, authz), fields(key = %key))]
    async fn fetch(&self, key: &ObjectKey, authz: Option<&str>) -> MetaOutcome {
        let url = match self.object_url(key) {
            Ok(url) => url,
            Err(e) => return unreachable("fetch", key, e),
        };

        let response = match self.send(self.http.get(url), authz).await {
            Ok(response) => response,
            Err(e) => return unreachable("fetch", key, e),
        };

        let status = response.status();
        if status != StatusCode::OK {
            info!(op = "fetch", key = %key, status = status.as_u16(), "metadata service returned no record");
            return MetaOutcome::Missing { status: status.as_u16() };
        }

        match self.decode(response).await {
            Ok(mut meta) => {
                meta.existing = true;
                debug!(oid = %meta.oid, writeable = meta.writeable, "metadata fetched");
                MetaOutcome::Found(meta)
            }
            Err(e) => unreachable("fetch", key, e),
        }
    }

    #[instrument(skip(self, key, authz), fields(key = %key))]
    async fn register(&self, key: &ObjectKey, size: i64, authz: Option<&str>) -> MetaOutcome {
        let url = match self.object_url(key) {
            Ok(url) => url,
            Err(e) => return unreachable("register", key, e),
        };

        let body = RegisterRequest {
            oid: key.oid.clone(),
            size,
        };

        let response = match self.send(self.http.post(url).json(&body), authz).await {
            Ok(response) => response,
            Err(e) => return unreachable("register", key, e),
        };

        let status = response.status();
        let existing = match status {
            StatusCode::OK => true,
            StatusCode::CREATED => false,
            _ => {
                info!(op = "register", key = %key, status = status.as_u16(), "metadata service declined registration");
                return MetaOutcome::Missing { status: status.as_u16() };
            }
        };

        match self.decode(response).await {
            Ok(mut meta) => {
                meta.existing = existing;
                debug!(oid = %meta.oid, existing, writeable = meta.writeable, "object registered");
                MetaOutcome::Found(meta)
            }
            Err(e) => unreachable("register", key, e),
        }
    }
}
