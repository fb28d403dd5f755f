//! Test doubles for the provider and store seams

use crate::test_utils::subscription;
use async_trait::async_trait;
use invsync_store::MemoryStore;
use invsync_types::{
    Error, Heartbeat, RawResource, ResourceProvider, ResourceStore, Result, RunStatus,
    StoredResource, Subscription, SyncRecord,
};
use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Provider replaying a script of resource listings, one per call.
///
/// Once the script is exhausted every call returns an empty listing.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    listings: Mutex<VecDeque<Result<Vec<RawResource>>>>,
    calls: AtomicUsize,
    gate: Option<(Arc<Notify>, Arc<Notify>)>,
}

impl ScriptedProvider {
    /// Provider answering successive calls with `listings`
    pub fn new(listings: Vec<Result<Vec<RawResource>>>) -> Self {
        Self {
            listings: Mutex::new(listings.into()),
            ..Self::default()
        }
    }

    /// Provider serving `listing` once
    pub fn serving(listing: Vec<RawResource>) -> Self {
        Self::new(vec![Ok(listing)])
    }

    /// Signal `entered` when a listing starts, then wait for `release`
    pub fn with_gate(mut self, entered: Arc<Notify>, release: Arc<Notify>) -> Self {
        self.gate = Some((entered, release));
        self
    }

    /// Number of listing calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn get_subscription(&self, heartbeat: Option<Heartbeat<'_>>) -> Result<Subscription> {
        if let Some(heartbeat) = heartbeat {
            heartbeat("Looking up subscription...");
        }
        Ok(subscription())
    }

    async fn get_resources(&self, _heartbeat: Option<Heartbeat<'_>>) -> Result<Vec<RawResource>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some((entered, release)) = &self.gate {
            entered.notify_one();
            release.notified().await;
        }
        let next = self
            .listings
            .lock()
            .map_err(|_| Error::other("scripted provider poisoned"))?
            .pop_front();
        next.unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// [`MemoryStore`] that fails writes for chosen resource names and counts
/// every access
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing: BTreeSet<String>,
    fail_history: AtomicBool,
    connects: AtomicUsize,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl FlakyStore {
    /// Empty store failing upserts and deletes of `failing`
    pub fn new<I, S>(failing: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_resources(Vec::new(), failing)
    }

    /// Pre-populated store failing upserts and deletes of `failing`
    pub fn with_resources<I, S>(records: Vec<StoredResource>, failing: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inner: MemoryStore::with_resources(records),
            failing: failing.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Make every history write fail
    pub fn fail_history(&self) {
        self.fail_history.store(true, Ordering::SeqCst);
    }

    /// Successful and failed `connect` calls
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// `get_all` calls
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Upsert and delete attempts, failed ones included
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check(&self, name: &str) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(name) {
            Err(Error::store(format!("injected failure for {name}")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ResourceStore for FlakyStore {
    async fn connect(&self) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.inner.connect().await
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    async fn get_all(&self) -> Result<Vec<StoredResource>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get_all().await
    }

    async fn get(&self, name: &str) -> Result<Option<StoredResource>> {
        self.inner.get(name).await
    }

    async fn upsert(&self, record: StoredResource) -> Result<StoredResource> {
        self.check(record.name())?;
        self.inner.upsert(record).await
    }

    async fn delete_by_name(&self, name: &str) -> Result<()> {
        self.check(name)?;
        self.inner.delete_by_name(name).await
    }

    async fn save_history(&self, record: &SyncRecord) -> Result<()> {
        if self.fail_history.load(Ordering::SeqCst) {
            return Err(Error::store("history collection is read-only"));
        }
        self.inner.save_history(record).await
    }

    async fn list_history(&self, limit: usize) -> Result<Vec<SyncRecord>> {
        self.inner.list_history(limit).await
    }

    async fn last_history(&self, status: Option<RunStatus>) -> Result<Option<SyncRecord>> {
        self.inner.last_history(status).await
    }
}
