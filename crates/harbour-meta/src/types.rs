//! Metadata request and response types

use crate::{MetaError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Addresses one object within one repository
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    pub user: String,
    pub repo: String,
    pub oid: String,
}

impl ObjectKey {
    /// Create a key, rejecting segments that would not survive as a single path segment
    pub fn new(
        user: impl Into<String>,
        repo: impl Into<String>,
        oid: impl Into<String>,
    ) -> Result<Self> {
        let key = Self {
            user: user.into(),
            repo: repo.into(),
            oid: oid.into(),
        };

        for segment in [&key.user, &key.repo, &key.oid] {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(MetaError::InvalidKey(segment.clone()));
            }
        }

        Ok(key)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.user, self.repo, self.oid)
    }
}

/// Object record as reported by the metadata service
///
/// `existing` is never read from or written to the wire; it records whether
/// the service already knew the object (200) or just created it (201).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub oid: String,
    pub size: i64,
    #[serde(default)]
    pub writeable: bool,
    #[serde(skip)]
    pub existing: bool,
}

/// Body sent when registering an object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub oid: String,
    pub size: i64,
}

/// Result of one metadata call, tagged by cause
///
/// Callers that only care whether an answer exists use [`MetaOutcome::found`];
/// the other variants are kept apart so logs and retry policy can tell a
/// missing record from an unreachable service.
#[derive(Debug)]
pub enum MetaOutcome {
    /// The service returned a record
    Found(ObjectMeta),
    /// The service answered with a status other than success
    Missing { status: u16 },
    /// No answer: transport failure, timeout or undecodable body
    Unreachable(MetaError),
}

impl MetaOutcome {
    /// The record, if the service returned one
    pub fn found(self) -> Option<ObjectMeta> {
        match self {
            Self::Found(meta) => Some(meta),
            Self::Missing { .. } | Self::Unreachable(_) => None,
        }
    }

    /// Whether the service returned a record
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}
