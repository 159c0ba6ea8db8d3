//! Wire types and content negotiation

use axum::http::{header, HeaderMap};
use harbour_signer::Link;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Media type of raw object content
pub const CONTENT_MEDIA_TYPE: &str = "application/vnd.git-media";

/// Media type of object metadata
pub const META_MEDIA_TYPE: &str = "application/vnd.git-media+json";

/// Link relation for fetching bytes
pub const REL_DOWNLOAD: &str = "download";

/// Link relation for storing bytes
pub const REL_UPLOAD: &str = "upload";

/// Link relation for confirming an upload
pub const REL_CALLBACK: &str = "callback";

/// Representation selected by the `Accept` header
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Representation {
    /// Raw object bytes
    Content,
    /// Structured object metadata
    Meta,
}

impl Representation {
    /// Match the `Accept` header exactly against the two protocol media types
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        match headers.get(header::ACCEPT)?.to_str().ok()?.trim() {
            CONTENT_MEDIA_TYPE => Some(Self::Content),
            META_MEDIA_TYPE => Some(Self::Meta),
            _ => None,
        }
    }
}

/// Object descriptor returned to clients
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDescriptor {
    pub oid: String,
    pub size: i64,
    #[serde(rename = "_links", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub links: BTreeMap<String, Link>,
}

impl ObjectDescriptor {
    /// A descriptor with no links
    pub fn new(oid: impl Into<String>, size: i64) -> Self {
        Self {
            oid: oid.into(),
            size,
            links: BTreeMap::new(),
        }
    }

    /// Attach a link under a relation name
    pub fn with_link(mut self, rel: &str, link: Link) -> Self {
        self.links.insert(rel.to_string(), link);
        self
    }
}

/// Client body for registering an object
#[derive(Clone, Debug, Deserialize)]
pub struct RegisterBody {
    pub oid: String,
    pub size: i64,
}
