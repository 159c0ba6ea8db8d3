//! LFS API request handlers

pub mod objects;
pub mod service;

pub use objects::*;
pub use service::*;
