//! # Harbour Signer
//!
//! Capability issuance for the Harbour LFS gateway.
//!
//! The gateway never moves object bytes. Instead it hands clients signed,
//! time-boxed links that grant one verb against one object path in the
//! backing object store. This crate provides:
//! - **Path sharding**: `oid` → `/{oid[0:2]}/{oid[2:4]}/{oid}`
//! - **Download links**: SigV4 query-signed GET URLs
//! - **Upload links**: SigV4 header-signed PUT requests carrying the oid as content hash
//!
//! ## Example
//!
//! ```rust,ignore
//! use harbour_signer::{CapabilityIssuer, StorageConfig};
//!
//! let issuer = CapabilityIssuer::new(&config)?;
//! let download = issuer.download_link("deadbeef")?;
//! let upload = issuer.upload_link("deadbeef")?;
//! ```

pub mod error;
pub mod issuer;
pub mod path;
pub mod sigv4;

pub use error::{Result, SignerError};
pub use issuer::{CapabilityIssuer, Link, StorageConfig, DEFAULT_DOWNLOAD_EXPIRY_SECS};
pub use path::{is_valid_oid, oid_path};
