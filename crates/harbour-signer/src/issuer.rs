//! Capability issuance
//!
//! A capability is a [`Link`]: an absolute URL into the object store plus any
//! headers the holder must attach. Each link grants exactly one verb against
//! exactly one sharded object path, and is derived purely from the oid, the
//! signing time and the configured credentials.

use crate::path::oid_path;
use crate::sigv4::{self, SigningContext, CONTENT_SHA256_HEADER, DATE_HEADER};
use crate::{Result, SignerError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// Default lifetime of a download link (24 hours)
pub const DEFAULT_DOWNLOAD_EXPIRY_SECS: u64 = 24 * 60 * 60;

/// Object store connection and signing settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Object store base URL; a path component (e.g. a bucket) prefixes every object path
    pub endpoint: String,
    /// Access key id used in the credential scope
    pub access_key_id: String,
    /// Shared signing secret
    #[serde(skip_serializing)]
    pub secret_access_key: String,
    /// Signing region
    pub region: String,
    /// Signing service name
    pub service: String,
    /// Lifetime of download links (seconds)
    pub download_expiry_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://s3.amazonaws.com/harbour".to_string(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            region: "us-east-1".to_string(),
            service: "s3".to_string(),
            download_expiry_secs: DEFAULT_DOWNLOAD_EXPIRY_SECS,
        }
    }
}

/// A capability: a URL plus the headers required to use it
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub href: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub header: BTreeMap<String, String>,
}

impl Link {
    /// A link with no required headers
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            header: BTreeMap::new(),
        }
    }
}

/// Issues signed, time-boxed links against the object store
#[derive(Clone, Debug)]
pub struct CapabilityIssuer {
    /// `scheme://host[:port]`
    origin: String,
    /// Host header value as signed
    host: String,
    /// Endpoint path, canonically encoded, with no trailing slash
    prefix: String,
    context: SigningContext,
    download_expiry_secs: u64,
}

impl CapabilityIssuer {
    /// Create an issuer, validating the endpoint and credentials
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| SignerError::InvalidEndpoint(format!("{}: {}", config.endpoint, e)))?;

        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(SignerError::InvalidEndpoint(format!(
                "{}: scheme must be http or https",
                config.endpoint
            )));
        }

        let host = match (endpoint.host_str(), endpoint.port()) {
            (Some(h), Some(p)) => format!("{}:{}", h, p),
            (Some(h), None) => h.to_string(),
            (None, _) => {
                return Err(SignerError::InvalidEndpoint(format!(
                    "{}: missing host",
                    config.endpoint
                )))
            }
        };

        if config.access_key_id.is_empty() {
            return Err(SignerError::MissingCredential("access key id"));
        }
        if config.secret_access_key.is_empty() {
            return Err(SignerError::MissingCredential("secret access key"));
        }

        let prefix = canonical_prefix(&endpoint)?;

        Ok(Self {
            origin: format!("{}://{}", endpoint.scheme(), host),
            host,
            prefix,
            context: SigningContext {
                access_key_id: config.access_key_id.clone(),
                secret_access_key: config.secret_access_key.clone(),
                region: config.region.clone(),
                service: config.service.clone(),
            },
            download_expiry_secs: config.download_expiry_secs,
        })
    }

    /// Canonical URI of an object within the store
    pub fn object_uri(&self, oid: &str) -> Result<String> {
        let path = oid_path(oid)?;
        Ok(format!("{}{}", self.prefix, sigv4::canonical_uri(&path)))
    }

    /// Query-signed GET link, valid for the configured download window
    pub fn download_link(&self, oid: &str) -> Result<Link> {
        self.download_link_at(oid, Utc::now())
    }

    /// [`download_link`](Self::download_link) signed at a fixed instant
    pub fn download_link_at(&self, oid: &str, at: DateTime<Utc>) -> Result<Link> {
        let uri = self.object_uri(oid)?;
        let query = sigv4::presign_query(
            &self.context,
            "GET",
            &self.host,
            &uri,
            self.download_expiry_secs,
            at,
        );

        tracing::debug!(oid = %oid, uri = %uri, "issued download link");
        Ok(Link::new(format!("{}{}?{}", self.origin, uri, query)))
    }

    /// Header-signed PUT link; the content hash header is the oid itself
    pub fn upload_link(&self, oid: &str) -> Result<Link> {
        self.upload_link_at(oid, Utc::now())
    }

    /// [`upload_link`](Self::upload_link) signed at a fixed instant
    pub fn upload_link_at(&self, oid: &str, at: DateTime<Utc>) -> Result<Link> {
        let uri = self.object_uri(oid)?;
        let signed = sigv4::sign_headers(&self.context, "PUT", &self.host, &uri, oid, at);

        let mut header = BTreeMap::new();
        header.insert("Authorization".to_string(), signed.authorization);
        header.insert(CONTENT_SHA256_HEADER.to_string(), signed.content_sha256);
        header.insert(DATE_HEADER.to_string(), signed.amz_date);

        tracing::debug!(oid = %oid, uri = %uri, "issued upload link");
        Ok(Link {
            href: format!("{}{}", self.origin, uri),
            header,
        })
    }
}

/// Re-encode the endpoint path segment by segment
///
/// `Url::path` is already percent-encoded, so each segment is decoded first;
/// an encoded `/` inside a segment stays part of that segment.
fn canonical_prefix(endpoint: &Url) -> Result<String> {
    let mut prefix = String::new();

    for segment in endpoint.path().split('/').filter(|s| !s.is_empty()) {
        let decoded = urlencoding::decode(segment).map_err(|e| {
            SignerError::InvalidEndpoint(format!("{}: {}", endpoint, e))
        })?;
        prefix.push('/');
        prefix.push_str(&urlencoding::encode(&decoded));
    }

    Ok(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn test_config() -> StorageConfig {
        StorageConfig {
            endpoint: "https://objects.example.com".to_string(),
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: "secret".to_string(),
            ..Default::default()
        }
    }

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_download_link() {
        let issuer = CapabilityIssuer::new(&test_config()).unwrap();
        let link = issuer.download_link_at("deadbeef", test_time()).unwrap();

        assert!(link
            .href
            .starts_with("https://objects.example.com/de/ad/deadbeef?X-Amz-Algorithm=AWS4-HMAC-SHA256"));
        assert!(link.href.contains("X-Amz-Expires=86400"));
        assert!(link.href.contains("X-Amz-Date=20240115T120000Z"));
        assert!(link.href.contains("&X-Amz-Signature="));
        assert!(link.header.is_empty());
    }

    #[test]
    fn test_download_links_vary_with_time() {
        let issuer = CapabilityIssuer::new(&test_config()).unwrap();
        let first = issuer.download_link_at("deadbeef", test_time()).unwrap();
        let second = issuer
            .download_link_at("deadbeef", test_time() + Duration::seconds(1))
            .unwrap();

        assert_ne!(first.href, second.href);
        let path = |href: &str| Url::parse(href).unwrap().path().to_string();
        assert_eq!(path(&first.href), path(&second.href));
    }

    #[test]
    fn test_signing_is_deterministic() {
        let issuer = CapabilityIssuer::new(&test_config()).unwrap();
        assert_eq!(
            issuer.upload_link_at("deadbeef", test_time()).unwrap(),
            issuer.upload_link_at("deadbeef", test_time()).unwrap()
        );
    }

    #[test]
    fn test_upload_link() {
        let issuer = CapabilityIssuer::new(&test_config()).unwrap();
        let link = issuer.upload_link_at("deadbeef", test_time()).unwrap();

        assert_eq!(link.href, "https://objects.example.com/de/ad/deadbeef");
        assert_eq!(link.header["x-amz-content-sha256"], "deadbeef");
        assert_eq!(link.header["x-amz-date"], "20240115T120000Z");
        assert!(link.header["Authorization"].starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20240115/"));
    }

    #[test]
    fn test_endpoint_prefix_and_port() {
        let config = StorageConfig {
            endpoint: "http://localhost:9000/lfs-bucket/".to_string(),
            ..test_config()
        };
        let issuer = CapabilityIssuer::new(&config).unwrap();
        let link = issuer.upload_link_at("abcd1234", test_time()).unwrap();

        assert_eq!(link.href, "http://localhost:9000/lfs-bucket/ab/cd/abcd1234");
    }

    #[test]
    fn test_endpoint_prefix_encoded_once() {
        let config = StorageConfig {
            endpoint: "http://localhost:9000/my bucket/a%2Fb".to_string(),
            ..test_config()
        };
        let issuer = CapabilityIssuer::new(&config).unwrap();

        assert_eq!(
            issuer.object_uri("deadbeef").unwrap(),
            "/my%20bucket/a%2Fb/de/ad/deadbeef"
        );

        let upload = issuer.upload_link_at("deadbeef", test_time()).unwrap();
        assert_eq!(upload.href, "http://localhost:9000/my%20bucket/a%2Fb/de/ad/deadbeef");

        let download = issuer.download_link_at("deadbeef", test_time()).unwrap();
        assert!(download
            .href
            .starts_with("http://localhost:9000/my%20bucket/a%2Fb/de/ad/deadbeef?"));

        // Signing covers the same path the href names
        let encoded = CapabilityIssuer::new(&StorageConfig {
            endpoint: "http://localhost:9000/my%20bucket/a%2Fb".to_string(),
            ..test_config()
        })
        .unwrap();
        assert_eq!(
            encoded.upload_link_at("deadbeef", test_time()).unwrap(),
            upload
        );
    }

    #[test]
    fn test_rejects_short_oid() {
        let issuer = CapabilityIssuer::new(&test_config()).unwrap();
        assert!(matches!(issuer.download_link("abc"), Err(SignerError::InvalidOid(_))));
        assert!(matches!(issuer.upload_link("abc"), Err(SignerError::InvalidOid(_))));
    }

    #[test]
    fn test_rejects_bad_config() {
        let bad_scheme = StorageConfig {
            endpoint: "ftp://objects.example.com".to_string(),
            ..test_config()
        };
        assert!(matches!(CapabilityIssuer::new(&bad_scheme), Err(SignerError::InvalidEndpoint(_))));

        let no_secret = StorageConfig {
            secret_access_key: String::new(),
            ..test_config()
        };
        assert!(matches!(
            CapabilityIssuer::new(&no_secret),
            Err(SignerError::MissingCredential(_))
        ));
    }

    #[test]
    fn test_link_serialization_omits_empty_header() {
        let json = serde_json::to_value(Link::new("http://example.com/cb")).unwrap();
        assert_eq!(json, serde_json::json!({ "href": "http://example.com/cb" }));
    }
}
