//! Storage collaborators: the durable incident store and the snapshot cache.
//!
//! The engine only talks to these traits. The in-memory implementations are
//! used by tests and by single-process deployments that do not need history
//! to survive a restart.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::{CacheError, PersistenceError};
use crate::incident::IncidentRecord;

/// Durable history of retired incidents.
#[async_trait]
pub trait IncidentStore: Send + Sync {
    /// Persist a retired incident, returning its id.
    async fn insert(&self, record: &IncidentRecord) -> Result<i64, PersistenceError>;

    /// Most recent incidents, newest first.
    async fn list_recent(&self, limit: usize) -> Result<Vec<IncidentRecord>, PersistenceError>;

    /// Drop the whole history.
    async fn clear(&self) -> Result<(), PersistenceError>;
}

/// Key/blob cache holding monitor snapshots between invocations.
#[async_trait]
pub trait SnapshotCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn put(&self, key: &str, blob: Vec<u8>) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

#[derive(Default)]
pub struct MemoryIncidentStore {
    records: Mutex<Vec<IncidentRecord>>,
    next_id: AtomicI64,
}

impl MemoryIncidentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl IncidentStore for MemoryIncidentStore {
    async fn insert(&self, record: &IncidentRecord) -> Result<i64, PersistenceError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        // Ids are never reused, even after clear().
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        records.push(IncidentRecord { id: Some(id), ..record.clone() });
        Ok(id)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<IncidentRecord>, PersistenceError> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records.iter().rev().take(limit).cloned().collect())
    }

    async fn clear(&self) -> Result<(), PersistenceError> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).clear();
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).contains_key(key)
    }
}

#[async_trait]
impl SnapshotCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.entries.lock().unwrap_or_else(PoisonError::into_inner).get(key).cloned())
    }

    async fn put(&self, key: &str, blob: Vec<u8>) -> Result<(), CacheError> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).insert(key.to_string(), blob);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).remove(key);
        Ok(())
    }
}
