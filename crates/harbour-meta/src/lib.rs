//! # Harbour Meta
//!
//! Metadata mediation for the Harbour LFS gateway.
//!
//! The metadata service owns every fact about an object: whether it exists,
//! its size, and whether the caller may write it. This crate is the only
//! place the gateway asks for those facts. It provides:
//! - **MetadataStore**: the async trait the gateway depends on
//! - **MetaClient**: the HTTP implementation talking to the remote service
//! - **MemoryMetadataStore**: an in-process implementation for tests
//!
//! Each call yields a [`MetaOutcome`] tagged by cause (`Found`, `Missing`,
//! `Unreachable`).

pub mod client;
pub mod error;
pub mod memory;
pub mod types;

pub use client::{MetaClient, MetaConfig, DEFAULT_META_TIMEOUT};
pub use error::{MetaError, Result};
pub use memory::MemoryMetadataStore;
pub use types::{MetaOutcome, ObjectKey, ObjectMeta, RegisterRequest};

use async_trait::async_trait;

/// Source of truth for object existence and writability
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Look up an existing record; `authz` is forwarded verbatim
    async fn fetch(&self, key: &ObjectKey, authz: Option<&str>) -> MetaOutcome;

    /// Register an object, or confirm it is already known; `authz` is forwarded verbatim
    async fn register(&self, key: &ObjectKey, size: i64, authz: Option<&str>) -> MetaOutcome;
}
