//! # Harbour Gateway
//!
//! Git LFS object gateway. Harbour never stores or streams object bytes:
//! it asks a metadata service what exists and who may write it, then hands
//! clients short-lived signed links into the backing object store.
//!
//! This crate provides:
//! - **LFS API**: object registration, lookup and upload probes
//! - **Content negotiation**: raw-content redirects vs. JSON descriptors
//! - **Graceful restarts**: a connection-tracking listener that can hand its
//!   socket to a successor and drain in-flight requests
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   LFS Clients                       │
//! │            (git-media, git-lfs, curl)               │
//! └─────────────────────────┬───────────────────────────┘
//!                           │
//! ┌─────────────────────────▼───────────────────────────┐
//! │                  Harbour Gateway                    │
//! ├─────────────────────────────────────────────────────┤
//! │  Tracking Listener │ Request ID │ Request Logging   │
//! ├─────────────────────────────────────────────────────┤
//! │           Object Handlers (POST/GET/OPTIONS)        │
//! ├──────────────────────────┬──────────────────────────┤
//! │       harbour-meta       │      harbour-signer      │
//! │   (metadata service)     │  (signed storage links)  │
//! └──────────────────────────┴──────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod listener;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;
pub mod types;

pub use config::GatewayConfig;
pub use error::ApiError;
pub use server::run_server;
pub use state::AppState;
