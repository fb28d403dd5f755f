//! Document store persisted as JSON files in a directory
//!
//! Layout:
//!
//! - `resources.json`: object keyed by resource name
//! - `sync-history.json`: array of run records in insertion order
//!
//! Each file is rewritten in full on every mutation through a temporary file
//! and a rename, so a crash never leaves a truncated document behind.

use crate::memory::Inventory;
use async_trait::async_trait;
use invsync_types::{Error, ResourceStore, Result, RunStatus, StoredResource, SyncRecord};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// File holding the stored resources
pub const RESOURCES_FILE: &str = "resources.json";

/// File holding the run history
pub const HISTORY_FILE: &str = "sync-history.json";

/// Store backed by JSON documents
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    connected: AtomicBool,
    state: Mutex<Option<Inventory>>,
}

impl JsonFileStore {
    /// Store rooted at `dir`; nothing is read until [`ResourceStore::connect`]
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            connected: AtomicBool::new(false),
            state: Mutex::new(None),
        }
    }

    /// Directory holding the documents
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn read_document<T>(&self, file: &str) -> Result<Option<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        let path = self.dir.join(file);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => serde_json::from_str(&text).map(Some).map_err(|e| {
                Error::store(format!("corrupt document '{}': {}", path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::store(format!(
                "cannot read '{}': {}",
                path.display(),
                e
            ))),
        }
    }

    async fn write_document<T: Serialize + Sync>(&self, file: &str, value: &T) -> Result<()> {
        let path = self.dir.join(file);
        let tmp = self.dir.join(format!(".{file}.{}.tmp", Uuid::new_v4()));
        let text = serde_json::to_vec_pretty(value)?;

        tokio::fs::write(&tmp, text)
            .await
            .map_err(|e| Error::store(format!("cannot write '{}': {}", tmp.display(), e)))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(Error::store(format!(
                "cannot replace '{}': {}",
                path.display(),
                e
            )));
        }
        debug!(path = %path.display(), "Document written");
        Ok(())
    }

    /// Apply `change` to a copy of the state, persist `file`, then commit the copy
    async fn mutate<T, F>(&self, file: &str, change: F) -> Result<T>
    where
        F: FnOnce(&mut Inventory) -> Result<T> + Send,
        T: Send,
    {
        let mut guard = self.state.lock().await;
        let current = guard
            .as_ref()
            .ok_or_else(|| Error::store("store is not connected"))?;

        let mut next = current.clone();
        let output = change(&mut next)?;
        if file == RESOURCES_FILE {
            self.write_document(file, &next.resources).await?;
        } else {
            self.write_document(file, &next.history).await?;
        }
        *guard = Some(next);
        Ok(output)
    }

    async fn read<T, F>(&self, view: F) -> Result<T>
    where
        F: FnOnce(&Inventory) -> T + Send,
    {
        let guard = self.state.lock().await;
        guard
            .as_ref()
            .map(view)
            .ok_or_else(|| Error::store("store is not connected"))
    }
}

#[async_trait]
impl ResourceStore for JsonFileStore {
    async fn connect(&self) -> Result<()> {
        let mut guard = self.state.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            Error::store(format!(
                "cannot create store directory '{}': {}",
                self.dir.display(),
                e
            ))
        })?;

        let resources: BTreeMap<String, StoredResource> =
            self.read_document(RESOURCES_FILE).await?.unwrap_or_default();
        let history: Vec<SyncRecord> = self.read_document(HISTORY_FILE).await?.unwrap_or_default();

        info!(
            dir = %self.dir.display(),
            resources = resources.len(),
            history = history.len(),
            "JSON file store connected"
        );
        *guard = Some(Inventory { resources, history });
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn get_all(&self) -> Result<Vec<StoredResource>> {
        self.read(|inv| inv.resources.values().cloned().collect()).await
    }

    async fn get(&self, name: &str) -> Result<Option<StoredResource>> {
        self.read(|inv| inv.resources.get(name).cloned()).await
    }

    async fn upsert(&self, record: StoredResource) -> Result<StoredResource> {
        self.mutate(RESOURCES_FILE, |inv| inv.upsert(record)).await
    }

    async fn delete_by_name(&self, name: &str) -> Result<()> {
        self.mutate(RESOURCES_FILE, |inv| inv.delete(name).map(|_| ()))
            .await
    }

    async fn save_history(&self, record: &SyncRecord) -> Result<()> {
        self.mutate(HISTORY_FILE, |inv| inv.append_history(record))
            .await
    }

    async fn list_history(&self, limit: usize) -> Result<Vec<SyncRecord>> {
        self.read(|inv| inv.list_history(limit)).await
    }

    async fn last_history(&self, status: Option<RunStatus>) -> Result<Option<SyncRecord>> {
        self.read(|inv| inv.last_history(status)).await
    }
}
