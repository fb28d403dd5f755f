//! In-memory store

use async_trait::async_trait;
use invsync_types::{Error, ResourceStore, Result, RunStatus, StoredResource, SyncRecord};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

/// Resources keyed by name plus the append-only run history.
///
/// Shared by every store implementation; persistence is layered on top.
#[derive(Debug, Clone, Default)]
pub(crate) struct Inventory {
    pub(crate) resources: BTreeMap<String, StoredResource>,
    pub(crate) history: Vec<SyncRecord>,
}

impl Inventory {
    pub(crate) fn upsert(&mut self, record: StoredResource) -> Result<StoredResource> {
        record.validate()?;
        self.resources
            .insert(record.name().to_string(), record.clone());
        Ok(record)
    }

    pub(crate) fn delete(&mut self, name: &str) -> Result<StoredResource> {
        self.resources.remove(name).ok_or_else(|| Error::NotFound {
            name: name.to_string(),
        })
    }

    pub(crate) fn append_history(&mut self, record: &SyncRecord) -> Result<()> {
        if self.history.iter().any(|h| h.id == record.id) {
            return Err(Error::store(format!(
                "history record '{}' already exists",
                record.id
            )));
        }
        self.history.push(record.clone());
        Ok(())
    }

    /// Newest first; records sharing a timestamp keep reverse insertion order
    pub(crate) fn recent_history(&self) -> Vec<&SyncRecord> {
        let mut records: Vec<&SyncRecord> = self.history.iter().rev().collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records
    }

    pub(crate) fn list_history(&self, limit: usize) -> Vec<SyncRecord> {
        self.recent_history()
            .into_iter()
            .take(limit)
            .cloned()
            .collect()
    }

    pub(crate) fn last_history(&self, status: Option<RunStatus>) -> Option<SyncRecord> {
        self.recent_history()
            .into_iter()
            .find(|h| status.map_or(true, |s| h.status == s))
            .cloned()
    }
}

/// Store holding everything in process memory.
///
/// Mainly for tests and dry runs; contents are lost on drop.
#[derive(Debug, Default)]
pub struct MemoryStore {
    connected: AtomicBool,
    inventory: RwLock<Inventory>,
}

impl MemoryStore {
    /// Empty, unconnected store
    pub fn new() -> Self {
        Self::default()
    }

    /// Unconnected store pre-populated with `records`
    pub fn with_resources<I: IntoIterator<Item = StoredResource>>(records: I) -> Self {
        let resources = records
            .into_iter()
            .map(|r| (r.name().to_string(), r))
            .collect();
        Self {
            connected: AtomicBool::new(false),
            inventory: RwLock::new(Inventory {
                resources,
                history: Vec::new(),
            }),
        }
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(Error::store("store is not connected"))
        }
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn connect(&self) -> Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        debug!("Memory store connected");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn get_all(&self) -> Result<Vec<StoredResource>> {
        self.ensure_connected()?;
        Ok(self.inventory.read().await.resources.values().cloned().collect())
    }

    async fn get(&self, name: &str) -> Result<Option<StoredResource>> {
        self.ensure_connected()?;
        Ok(self.inventory.read().await.resources.get(name).cloned())
    }

    async fn upsert(&self, record: StoredResource) -> Result<StoredResource> {
        self.ensure_connected()?;
        self.inventory.write().await.upsert(record)
    }

    async fn delete_by_name(&self, name: &str) -> Result<()> {
        self.ensure_connected()?;
        self.inventory.write().await.delete(name).map(|_| ())
    }

    async fn save_history(&self, record: &SyncRecord) -> Result<()> {
        self.ensure_connected()?;
        self.inventory.write().await.append_history(record)
    }

    async fn list_history(&self, limit: usize) -> Result<Vec<SyncRecord>> {
        self.ensure_connected()?;
        Ok(self.inventory.read().await.list_history(limit))
    }

    async fn last_history(&self, status: Option<RunStatus>) -> Result<Option<SyncRecord>> {
        self.ensure_connected()?;
        Ok(self.inventory.read().await.last_history(status))
    }
}
