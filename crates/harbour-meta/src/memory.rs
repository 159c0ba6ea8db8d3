//! In-memory metadata store for testing and local development

use crate::{MetaError, MetaOutcome, MetadataStore, ObjectKey, ObjectMeta};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// An in-memory metadata store
///
/// Registrations of unknown objects are created with the configured
/// write verdict. When an authorization value is required, calls that do not
/// carry it verbatim are answered with 401.
#[derive(Clone)]
pub struct MemoryMetadataStore {
    objects: Arc<DashMap<ObjectKey, ObjectMeta>>,
    calls: Arc<AtomicUsize>,
    unreachable: Arc<AtomicBool>,
    grant_writes: bool,
    authorization: Option<String>,
}

impl Default for MemoryMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMetadataStore {
    /// Create an empty store that grants write access on registration
    pub fn new() -> Self {
        Self {
            objects: Arc::new(DashMap::new()),
            calls: Arc::new(AtomicUsize::new(0)),
            unreachable: Arc::new(AtomicBool::new(false)),
            grant_writes: true,
            authorization: None,
        }
    }

    /// Set the write verdict for newly registered objects
    pub fn with_writes(mut self, grant: bool) -> Self {
        self.grant_writes = grant;
        self
    }

    /// Require this exact authorization value on every call
    pub fn with_authorization(mut self, value: impl Into<String>) -> Self {
        self.authorization = Some(value.into());
        self
    }

    /// Store a record under `key`
    pub fn insert(&self, key: ObjectKey, size: i64, writeable: bool) {
        let meta = ObjectMeta {
            oid: key.oid.clone(),
            size,
            writeable,
            existing: true,
        };
        self.objects.insert(key, meta);
    }

    /// Store a record verbatim, even one whose oid differs from the key
    pub fn insert_meta(&self, key: ObjectKey, meta: ObjectMeta) {
        self.objects.insert(key, meta);
    }

    /// Simulate the service being down
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Number of calls served so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of records stored
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn admit(&self, authz: Option<&str>) -> Option<MetaOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.unreachable.load(Ordering::SeqCst) {
            return Some(MetaOutcome::Unreachable(MetaError::Endpoint(
                "memory store marked unreachable".to_string(),
            )));
        }

        match &self.authorization {
            Some(required) if authz != Some(required.as_str()) => {
                Some(MetaOutcome::Missing { status: 401 })
            }
            _ => None,
        }
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn fetch(&self, key: &ObjectKey, authz: Option<&str>) -> MetaOutcome {
        if let Some(rejected) = self.admit(authz) {
            return rejected;
        }

        match self.objects.get(key) {
            Some(entry) => MetaOutcome::Found(ObjectMeta {
                existing: true,
                ..entry.value().clone()
            }),
            None => MetaOutcome::Missing { status: 404 },
        }
    }

    async fn register(&self, key: &ObjectKey, size: i64, authz: Option<&str>) -> MetaOutcome {
        if let Some(rejected) = self.admit(authz) {
            return rejected;
        }

        let mut created = false;
        let entry = self.objects.entry(key.clone()).or_insert_with(|| {
            created = true;
            ObjectMeta {
                oid: key.oid.clone(),
                size,
                writeable: self.grant_writes,
                existing: true,
            }
        });

        MetaOutcome::Found(ObjectMeta {
            existing: !created,
            ..entry.value().clone()
        })
    }
}
