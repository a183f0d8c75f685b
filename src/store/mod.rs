//! Narrow contract against the durable-storage collaborator.
//!
//! The generic durable-message engine (journalling, paging, replication) is
//! out of scope for this core; everything it needs from that engine is a
//! per-key upsert store with last-write-wins ordering: for a fixed key, any
//! reader observes a state consistent with some interleaving of the writers'
//! real-time order. That ordering guarantee is what lets a `delete` issued
//! after a `persist` for the same key win without extra coordination.

use anyhow::{bail, Result};
use bytes::Bytes;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Durable key-value contract consumed by the state manager.
///
/// Operations may suspend; callers must not hold session locks across them.
pub trait StateStore: Send + Sync {
    /// Durably write `payload` under `key`, overwriting any prior value.
    fn write(&self, key: &str, payload: Bytes) -> impl Future<Output = Result<()>> + Send;

    /// Read the current value for `key`, if any.
    fn read(&self, key: &str) -> impl Future<Output = Result<Option<Bytes>>> + Send;

    /// Remove the value for `key`; absent keys are a no-op.
    fn delete(&self, key: &str) -> impl Future<Output = Result<()>> + Send;
}

/// In-memory reference implementation of the store contract.
///
/// The single map mutex serializes operations, which trivially satisfies the
/// per-key last-write-wins guarantee. An outage toggle lets tests drive the
/// `PersistenceUnavailable` path without a real storage backend.
#[derive(Debug, Default, Clone)]
pub struct MemoryStateStore {
    records: Arc<Mutex<HashMap<String, Bytes>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail, simulating a storage outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn record_count(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.records.lock().await.contains_key(key)
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            bail!("simulated storage outage");
        }
        Ok(())
    }
}

impl StateStore for MemoryStateStore {
    async fn write(&self, key: &str, payload: Bytes) -> Result<()> {
        self.check_available()?;
        self.records.lock().await.insert(key.to_string(), payload);
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<Bytes>> {
        self.check_available()?;
        Ok(self.records.lock().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check_available()?;
        self.records.lock().await.remove(key);
        Ok(())
    }
}
