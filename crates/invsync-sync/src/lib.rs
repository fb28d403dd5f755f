//! Inventory reconciliation for InvSync
//!
//! This crate compares a freshly fetched live resource set with the stored
//! inventory and brings the store in line:
//!
//! - **Comparison**: field-by-field diff over the closed set of tracked fields
//! - **Planning**: exactly one create, update, delete or skip per resource name
//! - **Conflict Resolution**: operator choices per field (use live, use stored, manual)
//! - **Execution**: sequential, per-action failure isolation, one history record per run
//! - **Retry**: exponential backoff around flaky provider calls
//! - **Progress Streaming**: per-action callbacks and a live event channel
//!
//! # Examples
//!
//! ```rust,no_run
//! use invsync_store::MemoryStore;
//! use invsync_sync::{SyncEngine, SyncOptions};
//! use invsync_types::ResourceStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> invsync_types::Result<()> {
//! let store = Arc::new(MemoryStore::new());
//! store.connect().await?;
//!
//! let engine = SyncEngine::new(store);
//! let result = engine.sync(&[], &SyncOptions::new(), None).await?;
//! println!(
//!     "Synced {} new, {} updated, {} deleted",
//!     result.stats.resources_created, result.stats.resources_updated, result.stats.resources_deleted
//! );
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod compare;
pub mod conflict;
pub mod engine;
pub mod plan;
pub mod progress;
pub mod report;
pub mod retry;
pub mod service;

pub use compare::{compare, Comparison, Difference};
pub use conflict::{apply_resolutions, apply_resolutions_at, detect_conflicts};
pub use engine::{PreparedRun, SyncEngine, SyncOptions, SyncResult};
pub use plan::{calculate_sync_stats, plan, SyncStats};
pub use progress::{EventSink, LogLevel, ProgressCallback, ProgressUpdate, SyncEvent};
pub use report::{ChangeSet, PreviewReport, SyncApiData, SyncApiResponse, SyncSummary};
pub use retry::{
    is_network_error, is_retryable_http_error, is_transient_provider_error, with_retry,
    RetryOptions,
};
pub use service::{SyncRequest, SyncService};
