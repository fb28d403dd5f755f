//! Collaborator traits consumed by the reconciliation core
//!
//! The core never talks to a cloud API or a database directly: it is handed a
//! [`ResourceProvider`] for the live side and a [`ResourceStore`] for the
//! persisted side.

use crate::{RawResource, Result, RunStatus, StoredResource, Subscription, SyncRecord};
use async_trait::async_trait;

/// Callback receiving "still working" messages while a provider call runs
pub type Heartbeat<'a> = &'a (dyn Fn(&str) + Send + Sync);

/// Source of the live resource listing
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Subscription metadata (id, display name, tenant)
    async fn get_subscription(&self, heartbeat: Option<Heartbeat<'_>>) -> Result<Subscription>;

    /// Every resource in the subscription, unnormalized
    async fn get_resources(&self, heartbeat: Option<Heartbeat<'_>>) -> Result<Vec<RawResource>>;
}

/// Persistent collection of stored resources and run history, keyed by name.
///
/// A store must be connected before use; every other operation on an
/// unconnected store fails with [`crate::Error::Store`].
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Open the underlying storage. Calling it twice is a no-op.
    async fn connect(&self) -> Result<()>;

    /// Whether [`ResourceStore::connect`] succeeded
    fn is_connected(&self) -> bool;

    /// Every stored resource
    async fn get_all(&self) -> Result<Vec<StoredResource>>;

    /// One stored resource by name
    async fn get(&self, name: &str) -> Result<Option<StoredResource>>;

    /// Insert or replace by name. The record is validated first.
    async fn upsert(&self, record: StoredResource) -> Result<StoredResource>;

    /// Remove by name; [`crate::Error::NotFound`] if absent
    async fn delete_by_name(&self, name: &str) -> Result<()>;

    /// Append a run record; ids are unique
    async fn save_history(&self, record: &SyncRecord) -> Result<()>;

    /// Most recent run records first
    async fn list_history(&self, limit: usize) -> Result<Vec<SyncRecord>>;

    /// Most recent run record, optionally restricted to one status
    async fn last_history(&self, status: Option<RunStatus>) -> Result<Option<SyncRecord>>;
}
