//! Provider reading a previously captured listing from disk

use crate::parse::parse_snapshot;
use async_trait::async_trait;
use invsync_types::{
    Error, Heartbeat, RawResource, RawSnapshot, ResourceProvider, Result, Subscription,
};
use std::path::{Path, PathBuf};
use tracing::info;

/// Serves the subscription and resources stored in a snapshot file.
///
/// The file is re-read on every call so edits are picked up between runs.
#[derive(Debug, Clone)]
pub struct SnapshotProvider {
    path: PathBuf,
}

impl SnapshotProvider {
    /// Provider over the snapshot at `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Snapshot location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and validate the snapshot
    pub async fn load(&self) -> Result<RawSnapshot> {
        let text = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            Error::provider(format!(
                "Failed to read snapshot '{}': {}",
                self.path.display(),
                e
            ))
        })?;
        parse_snapshot(&text)
    }

    /// Write a snapshot document
    pub async fn save(&self, snapshot: &RawSnapshot) -> Result<()> {
        let text = serde_json::to_string_pretty(snapshot)?;
        tokio::fs::write(&self.path, text).await?;
        info!(path = %self.path.display(), count = snapshot.resources.len(), "Snapshot written");
        Ok(())
    }
}

#[async_trait]
impl ResourceProvider for SnapshotProvider {
    fn name(&self) -> &str {
        "snapshot"
    }

    async fn get_subscription(&self, _heartbeat: Option<Heartbeat<'_>>) -> Result<Subscription> {
        Ok(self.load().await?.subscription)
    }

    async fn get_resources(&self, heartbeat: Option<Heartbeat<'_>>) -> Result<Vec<RawResource>> {
        if let Some(heartbeat) = heartbeat {
            heartbeat(&format!("Reading snapshot {}", self.path.display()));
        }
        let snapshot = self.load().await?;
        info!(path = %self.path.display(), count = snapshot.resources.len(), taken_at = %snapshot.timestamp, "Snapshot loaded");
        Ok(snapshot.resources)
    }
}
