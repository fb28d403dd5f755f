//! Sync orchestration: one consistent store read, one plan, sequential execution

use crate::conflict::{apply_resolutions_at, detect_conflicts, index_by_name};
use crate::plan::{calculate_sync_stats, plan, SyncStats};
use crate::progress::{ProgressCallback, ProgressUpdate};
use crate::report::PreviewReport;
use chrono::{DateTime, Utc};
use invsync_types::{
    Resolutions, Resource, ResourceStore, Result, RunStats, RunStatus, StoredResource,
    SyncAction, SyncOperation, SyncRecord, SyncSource, SyncType, TriggerSource,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Options of one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Operator resolutions; their presence turns on conflict blocking
    pub resolutions: Option<Resolutions>,
    /// Origin written on created and replaced records
    pub source: SyncSource,
    /// Surface that triggered the run
    pub trigger: TriggerSource,
    /// Operator, if known
    pub user_id: Option<String>,
}

impl SyncOptions {
    /// Default options: no resolutions, manual source, CLI trigger
    pub fn new() -> Self {
        Self::default()
    }

    /// Supply resolutions
    pub fn with_resolutions(mut self, resolutions: Resolutions) -> Self {
        self.resolutions = Some(resolutions);
        self
    }

    /// Set the record origin
    pub fn with_source(mut self, source: SyncSource) -> Self {
        self.source = source;
        self
    }

    /// Set the trigger surface
    pub fn with_trigger(mut self, trigger: TriggerSource) -> Self {
        self.trigger = trigger;
        self
    }

    /// Set the operator
    pub fn with_user_id<S: Into<String>>(mut self, user_id: S) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Kind of run these options produce
    pub fn sync_type(&self) -> SyncType {
        if self.resolutions.is_some() {
            SyncType::ConflictResolution
        } else {
            SyncType::Full
        }
    }
}

/// Outcome of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    /// No action errored
    pub success: bool,
    /// Overall status
    pub status: RunStatus,
    /// Counters, as written to history
    pub stats: RunStats,
    /// Conflicts left on skipped resources
    pub conflicts_pending: usize,
    /// Id of the history record
    pub history_id: String,
    /// Per-action error messages, `"<op> <name>: <message>"`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Store snapshot and plan of a run that has not executed yet
#[derive(Debug, Clone)]
pub struct PreparedRun {
    /// Stored set read at the start of the run
    pub stored: Vec<StoredResource>,
    /// Planned actions
    pub actions: Vec<SyncAction>,
    /// Plan statistics
    pub stats: SyncStats,
    started: Instant,
}

/// Reconciles a live resource set into a [`ResourceStore`]
#[derive(Clone)]
pub struct SyncEngine {
    store: Arc<dyn ResourceStore>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("store_connected", &self.store.is_connected())
            .finish()
    }
}

impl SyncEngine {
    /// Engine writing to `store`; the store must already be connected
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store }
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        &self.store
    }

    /// Read the stored set and plan against `live`
    pub async fn prepare(
        &self,
        live: &[Resource],
        resolutions: Option<&Resolutions>,
    ) -> Result<PreparedRun> {
        let started = Instant::now();

        let stored = self.store.get_all().await?;
        info!(live = live.len(), stored = stored.len(), "Loaded resource sets");

        let actions = plan(live, &stored, resolutions);
        let stats = calculate_sync_stats(&actions);
        info!(
            actions = stats.total_resources,
            new = stats.new_resources,
            updated = stats.updated_resources,
            deleted = stats.deleted_resources,
            unchanged = stats.unchanged_resources,
            conflicts = stats.conflicts,
            "Sync plan ready"
        );

        Ok(PreparedRun {
            stored,
            actions,
            stats,
            started,
        })
    }

    /// Read, plan, execute and record one run
    pub async fn sync(
        &self,
        live: &[Resource],
        options: &SyncOptions,
        on_progress: Option<ProgressCallback<'_>>,
    ) -> Result<SyncResult> {
        info!(
            live = live.len(),
            sync_type = %options.sync_type(),
            "Starting sync operation"
        );
        let prepared = self.prepare(live, options.resolutions.as_ref()).await?;
        self.execute(prepared, live, options, on_progress).await
    }

    /// Execute a prepared plan and write the history record.
    ///
    /// Actions run one at a time in plan order. A failing action is recorded
    /// and the run moves on; only the history write can fail the call.
    pub async fn execute(
        &self,
        prepared: PreparedRun,
        live: &[Resource],
        options: &SyncOptions,
        on_progress: Option<ProgressCallback<'_>>,
    ) -> Result<SyncResult> {
        let PreparedRun {
            stored,
            actions,
            stats: plan_stats,
            started,
        } = prepared;

        let mut live_by_name: HashMap<&str, &Resource> = HashMap::with_capacity(live.len());
        for resource in live {
            live_by_name.entry(resource.name.as_str()).or_insert(resource);
        }
        let stored_by_name = index_by_name(&stored);

        let mut stats = RunStats {
            resources_processed: actions.len(),
            conflicts_detected: plan_stats.conflicts,
            conflicts_resolved: plan_stats.conflicts_resolved,
            ..RunStats::default()
        };
        let mut errors = Vec::new();

        for action in &actions {
            let name = action.resource_name.as_str();
            match self
                .apply(action, &live_by_name, &stored_by_name, options)
                .await
            {
                Ok(true) => {
                    match action.operation {
                        SyncOperation::Create => stats.resources_created += 1,
                        SyncOperation::Update => stats.resources_updated += 1,
                        SyncOperation::Delete => stats.resources_deleted += 1,
                        SyncOperation::Skip => stats.resources_skipped += 1,
                    }
                    debug!(resource = name, operation = %action.operation, reason = %action.reason, "Action applied");
                    if let Some(report) = on_progress {
                        report(&ProgressUpdate {
                            operation: action.operation,
                            resource_name: action.resource_name.clone(),
                            reason: action.reason,
                        });
                    }
                }
                Ok(false) => {
                    warn!(resource = name, operation = %action.operation, "Resource missing from the run snapshot, skipping");
                    stats.resources_skipped += 1;
                }
                Err(e) => {
                    error!(resource = name, operation = %action.operation, error = %e, "Action failed");
                    errors.push(format!("{} {}: {}", action.operation, name, e));
                }
            }
        }

        stats.duration_ms = started.elapsed().as_millis() as u64;
        let status = RunStatus::classify(errors.len(), actions.len());
        let finished_at = unique_history_instant(Utc::now());
        let history_id = SyncRecord::id_for(finished_at);

        let record = SyncRecord {
            id: history_id.clone(),
            date: finished_at.format("%Y-%m-%d").to_string(),
            timestamp: finished_at,
            sync_type: options.sync_type(),
            source: options.trigger,
            user_id: options.user_id.clone(),
            status,
            stats,
            errors: errors.clone(),
            details: format!(
                "Synced {} new, {} updated, {} deleted",
                stats.resources_created, stats.resources_updated, stats.resources_deleted
            ),
        };
        self.store.save_history(&record).await?;

        info!(
            history_id = %history_id,
            status = %status,
            created = stats.resources_created,
            updated = stats.resources_updated,
            deleted = stats.resources_deleted,
            skipped = stats.resources_skipped,
            errors = errors.len(),
            duration_ms = stats.duration_ms,
            "Sync completed"
        );

        Ok(SyncResult {
            success: errors.is_empty(),
            status,
            stats,
            conflicts_pending: plan_stats.conflicts_pending,
            history_id,
            errors,
        })
    }

    /// Single store read and a plan without resolutions; nothing is written
    pub async fn preview(&self, live: &[Resource]) -> Result<PreviewReport> {
        let stored = self.store.get_all().await?;
        let conflicts = detect_conflicts(live, &stored);
        let actions = plan(live, &stored, None);
        info!(
            live = live.len(),
            stored = stored.len(),
            conflicts = conflicts.len(),
            "Preview computed"
        );
        Ok(PreviewReport::new(&actions, conflicts))
    }

    /// Apply one action. `Ok(false)` when the resource is absent from the snapshot.
    async fn apply(
        &self,
        action: &SyncAction,
        live_by_name: &HashMap<&str, &Resource>,
        stored_by_name: &HashMap<&str, &StoredResource>,
        options: &SyncOptions,
    ) -> Result<bool> {
        let name = action.resource_name.as_str();
        match action.operation {
            SyncOperation::Create => {
                let Some(resource) = live_by_name.get(name) else {
                    return Ok(false);
                };
                let record = StoredResource::from_live((*resource).clone(), options.source, Utc::now());
                self.store.upsert(record).await?;
            }
            SyncOperation::Update => {
                let (Some(resource), Some(existing)) =
                    (live_by_name.get(name), stored_by_name.get(name))
                else {
                    return Ok(false);
                };
                let now = Utc::now();
                let record = match options.resolutions.as_ref().and_then(|r| r.get(name)) {
                    Some(fields) => apply_resolutions_at(resource, existing, fields, now),
                    None => StoredResource {
                        created_in_store_at: existing.created_in_store_at,
                        ..StoredResource::from_live((*resource).clone(), options.source, now)
                    },
                };
                self.store.upsert(record).await?;
            }
            SyncOperation::Delete => self.store.delete_by_name(name).await?,
            SyncOperation::Skip => {}
        }
        Ok(true)
    }
}

static LAST_HISTORY_MILLIS: AtomicI64 = AtomicI64::new(0);

/// `now`, nudged forward so no two runs in this process share a history id
fn unique_history_instant(now: DateTime<Utc>) -> DateTime<Utc> {
    let wanted = now.timestamp_millis();
    let previous = LAST_HISTORY_MILLIS
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(wanted.max(last + 1))
        })
        .unwrap_or(wanted);
    let millis = wanted.max(previous + 1);
    DateTime::from_timestamp_millis(millis).unwrap_or(now)
}
