//! AWS Signature Version 4 primitives
//!
//! Two signing styles are supported:
//!
//! - **Query signing** (presigned URLs): the signature and its parameters are
//!   carried in the query string, so the holder needs nothing but the URL.
//! - **Header signing**: the signature is carried in an `Authorization`
//!   header alongside `x-amz-date` and `x-amz-content-sha256`, which keeps the
//!   URL free of signing parameters for large streamed uploads.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::fmt;

/// Signing algorithm identifier
pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Payload hash used when the body is not covered by the signature
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// Header carrying the payload hash
pub const CONTENT_SHA256_HEADER: &str = "x-amz-content-sha256";

/// Header carrying the signing timestamp
pub const DATE_HEADER: &str = "x-amz-date";

/// Format of `x-amz-date` / `X-Amz-Date`
pub const AMZ_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

const SCOPE_DATE_FORMAT: &str = "%Y%m%d";

/// Credentials and scope used to derive signing keys
#[derive(Clone)]
pub struct SigningContext {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
    pub service: String,
}

impl fmt::Debug for SigningContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningContext")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("region", &self.region)
            .field("service", &self.service)
            .finish()
    }
}

impl SigningContext {
    /// Credential scope: `{yyyymmdd}/{region}/{service}/aws4_request`
    pub fn scope(&self, at: DateTime<Utc>) -> String {
        format!(
            "{}/{}/{}/aws4_request",
            at.format(SCOPE_DATE_FORMAT),
            self.region,
            self.service
        )
    }

    /// Credential string: `{access_key_id}/{scope}`
    pub fn credential(&self, at: DateTime<Utc>) -> String {
        format!("{}/{}", self.access_key_id, self.scope(at))
    }

    /// Derive the day-scoped signing key
    pub fn signing_key(&self, at: DateTime<Utc>) -> Vec<u8> {
        let date = at.format(SCOPE_DATE_FORMAT).to_string();
        let k_date = hmac_sha256(
            format!("AWS4{}", self.secret_access_key).as_bytes(),
            date.as_bytes(),
        );
        let k_region = hmac_sha256(&k_date, self.region.as_bytes());
        let k_service = hmac_sha256(&k_region, self.service.as_bytes());
        hmac_sha256(&k_service, b"aws4_request")
    }

    /// Sign a canonical request, returning the hex signature
    pub fn signature(&self, at: DateTime<Utc>, canonical_request: &str) -> String {
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            at.format(AMZ_DATE_FORMAT),
            self.scope(at),
            hex_sha256(canonical_request.as_bytes())
        );
        hex::encode(hmac_sha256(&self.signing_key(at), string_to_sign.as_bytes()))
    }
}

/// Header values produced by header signing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedHeaders {
    pub authorization: String,
    pub amz_date: String,
    pub content_sha256: String,
}

/// Build the presigned query string (signature included) for `method uri`
pub fn presign_query(
    ctx: &SigningContext,
    method: &str,
    host: &str,
    uri: &str,
    expires_secs: u64,
    at: DateTime<Utc>,
) -> String {
    // Already in lexicographic key order
    let params = [
        ("X-Amz-Algorithm", ALGORITHM.to_string()),
        ("X-Amz-Credential", ctx.credential(at)),
        ("X-Amz-Date", at.format(AMZ_DATE_FORMAT).to_string()),
        ("X-Amz-Expires", expires_secs.to_string()),
        ("X-Amz-SignedHeaders", "host".to_string()),
    ];
    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    let canonical = canonical_request(method, uri, &query, &[("host", host)], UNSIGNED_PAYLOAD);
    let signature = ctx.signature(at, &canonical);

    format!("{}&X-Amz-Signature={}", query, signature)
}

/// Sign `method uri` with the signature carried in headers
///
/// `payload_hash` is both the signed payload hash and the value the client
/// must send as `x-amz-content-sha256`.
pub fn sign_headers(
    ctx: &SigningContext,
    method: &str,
    host: &str,
    uri: &str,
    payload_hash: &str,
    at: DateTime<Utc>,
) -> SignedHeaders {
    let amz_date = at.format(AMZ_DATE_FORMAT).to_string();
    let headers = [
        ("host", host),
        (CONTENT_SHA256_HEADER, payload_hash),
        (DATE_HEADER, amz_date.as_str()),
    ];

    let canonical = canonical_request(method, uri, "", &headers, payload_hash);
    let signature = ctx.signature(at, &canonical);
    let authorization = format!(
        "{} Credential={}, SignedHeaders={}, Signature={}",
        ALGORITHM,
        ctx.credential(at),
        signed_header_names(&headers),
        signature
    );

    SignedHeaders {
        authorization,
        amz_date,
        content_sha256: payload_hash.to_string(),
    }
}

/// Build a canonical request
///
/// `query` must already be canonical (encoded and sorted).
pub fn canonical_request(
    method: &str,
    uri: &str,
    query: &str,
    headers: &[(&str, &str)],
    payload_hash: &str,
) -> String {
    let mut sorted: Vec<(String, &str)> = headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.trim()))
        .collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let canonical_headers: String = sorted
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v))
        .collect();

    format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method,
        uri,
        query,
        canonical_headers,
        signed_header_names(headers),
        payload_hash
    )
}

/// Encode a path for use as a canonical URI, leaving `/` separators intact
pub fn canonical_uri(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn signed_header_names(headers: &[(&str, &str)]) -> String {
    let mut names: Vec<String> = headers.iter().map(|(k, _)| k.to_ascii_lowercase()).collect();
    names.sort();
    names.join(";")
}

fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}
