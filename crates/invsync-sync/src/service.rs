//! End-to-end sync pipeline: fetch, normalize, plan, execute, record
//!
//! [`SyncService`] owns the collaborators of a run and streams its progress
//! into an [`EventSink`]. At most one run executes at a time per service;
//! a second caller is rejected with [`Error::SyncInProgress`] before any
//! store or provider access.

use crate::engine::{SyncEngine, SyncOptions, SyncResult};
use crate::progress::{EventSink, LogLevel, ProgressUpdate};
use crate::report::PreviewReport;
use crate::retry::{is_transient_provider_error, with_retry, RetryOptions};
use invsync_config::{Config, ConfigBuilder, ProviderKind, StoreKind};
use invsync_provider::{normalize_all, AzureCliProvider, SnapshotProvider};
use invsync_store::{JsonFileStore, MemoryStore};
use invsync_types::{
    ActionReason, Error, Heartbeat, Resolutions, Resource, ResourceProvider, ResourceStore,
    Result, RetryConfig, SyncOperation, SyncSource, TriggerSource,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Parameters of one triggered run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncRequest {
    /// Operator resolutions
    pub resolutions: Option<Resolutions>,
    /// Operator, if known
    pub user_id: Option<String>,
    /// Record origin; the service default when unset
    pub source: Option<SyncSource>,
    /// Trigger surface
    pub trigger: TriggerSource,
}

impl SyncRequest {
    /// Plain run triggered from the CLI
    pub fn new() -> Self {
        Self::default()
    }

    /// Supply resolutions
    pub fn with_resolutions(mut self, resolutions: Resolutions) -> Self {
        self.resolutions = Some(resolutions);
        self
    }

    /// Set the operator
    pub fn with_user_id<S: Into<String>>(mut self, user_id: S) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Override the record origin
    pub fn with_source(mut self, source: SyncSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the trigger surface
    pub fn with_trigger(mut self, trigger: TriggerSource) -> Self {
        self.trigger = trigger;
        self
    }

    fn into_options(self, default_source: SyncSource) -> SyncOptions {
        SyncOptions {
            resolutions: self.resolutions,
            source: self.source.unwrap_or(default_source),
            trigger: self.trigger,
            user_id: self.user_id,
        }
    }
}

/// Provider, store and engine wired together behind a single-flight guard
pub struct SyncService {
    provider: Arc<dyn ResourceProvider>,
    engine: SyncEngine,
    retry: RetryConfig,
    default_source: SyncSource,
    guard: Mutex<()>,
}

impl std::fmt::Debug for SyncService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncService")
            .field("provider", &self.provider.name())
            .field("engine", &self.engine)
            .field("retry", &self.retry)
            .field("default_source", &self.default_source)
            .finish_non_exhaustive()
    }
}

impl SyncService {
    /// Service over the given collaborators with default retry settings
    pub fn new(provider: Arc<dyn ResourceProvider>, store: Arc<dyn ResourceStore>) -> Self {
        Self {
            provider,
            engine: SyncEngine::new(store),
            retry: RetryConfig::default(),
            default_source: SyncSource::default(),
            guard: Mutex::new(()),
        }
    }

    /// Build provider and store from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        ConfigBuilder::validate(config)?;

        let provider: Arc<dyn ResourceProvider> = match config.provider.kind {
            ProviderKind::AzureCli => Arc::new(AzureCliProvider::new(
                config.provider.command.clone(),
                config.provider.timeouts(),
            )),
            ProviderKind::Snapshot => {
                let path = config.provider.snapshot_path.as_ref().ok_or_else(|| {
                    Error::config("provider.snapshot_path is required for the snapshot provider")
                })?;
                Arc::new(SnapshotProvider::new(path))
            }
        };

        let store: Arc<dyn ResourceStore> = match config.store.kind {
            StoreKind::Memory => Arc::new(MemoryStore::new()),
            StoreKind::JsonFile => {
                let path = config.store.path.as_ref().ok_or_else(|| {
                    Error::config("store.path is required for the json-file store")
                })?;
                Arc::new(JsonFileStore::new(path))
            }
        };

        Ok(Self::new(provider, store)
            .with_retry_config(config.provider.retry.to_retry_config())
            .with_default_source(config.sync.source))
    }

    /// Backoff for provider calls
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Origin used when a request does not name one
    pub fn with_default_source(mut self, source: SyncSource) -> Self {
        self.default_source = source;
        self
    }

    /// The live side
    pub fn provider(&self) -> &Arc<dyn ResourceProvider> {
        &self.provider
    }

    /// The persisted side
    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        self.engine.store()
    }

    /// The reconciliation engine
    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    /// Provider backoff
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Whether a run currently holds the guard
    pub fn is_running(&self) -> bool {
        self.guard.try_lock().is_err()
    }

    /// Run one synchronization, streaming progress into `sink`.
    ///
    /// Failures before execution (store connect, fetch, store read) abort the
    /// run: an `Error` event is streamed and the error returned. Failures of
    /// individual actions are streamed and reported in the result.
    pub async fn run(&self, request: SyncRequest, sink: &EventSink) -> Result<SyncResult> {
        let Ok(_running) = self.guard.try_lock() else {
            let err = Error::SyncInProgress;
            warn!("Rejected sync request, another run holds the guard");
            sink.error(err.to_string());
            sink.fail(&err);
            return Err(err);
        };

        let options = request.into_options(self.default_source);
        info!(sync_type = %options.sync_type(), trigger = %options.trigger, "Sync run started");
        sink.info("Starting synchronization...");

        let live = match self.fetch_live(sink).await {
            Ok(live) => live,
            Err(e) => return Err(abort(sink, "Failed to fetch live resources", e)),
        };

        sink.info("Comparing with stored inventory...");
        let prepared = match self.engine.prepare(&live, options.resolutions.as_ref()).await {
            Ok(prepared) => prepared,
            Err(e) => return Err(abort(sink, "Failed to read stored inventory", e)),
        };

        let stats = prepared.stats;
        sink.info(format!(
            "Planned {} actions: {} new, {} updated, {} deleted, {} unchanged",
            stats.total_resources,
            stats.new_resources,
            stats.updated_resources,
            stats.deleted_resources,
            stats.unchanged_resources
        ));
        if stats.conflicts_pending > 0 {
            sink.warning(format!(
                "{} conflicts are waiting for a resolution",
                stats.conflicts_pending
            ));
        }

        let on_progress = |update: &ProgressUpdate| {
            let (level, message) = describe(update);
            sink.log_action(level, message, &update.resource_name, update.operation);
        };
        let result = match self
            .engine
            .execute(prepared, &live, &options, Some(&on_progress))
            .await
        {
            Ok(result) => result,
            Err(e) => return Err(abort(sink, "Failed to record sync history", e)),
        };

        for message in &result.errors {
            sink.error(message.clone());
        }

        let summary = format!(
            "Sync completed: {} created, {} updated, {} deleted, {} skipped",
            result.stats.resources_created,
            result.stats.resources_updated,
            result.stats.resources_deleted,
            result.stats.resources_skipped
        );
        if result.success {
            sink.success(summary);
        } else {
            sink.warning(format!("{summary}, {} failed", result.errors.len()));
        }
        sink.complete(result.clone());

        Ok(result)
    }

    /// Fetch and plan without writing anything
    pub async fn preview(&self, sink: &EventSink) -> Result<PreviewReport> {
        sink.info("Computing preview...");
        let live = match self.fetch_live(sink).await {
            Ok(live) => live,
            Err(e) => return Err(abort(sink, "Failed to fetch live resources", e)),
        };
        let report = match self.engine.preview(&live).await {
            Ok(report) => report,
            Err(e) => return Err(abort(sink, "Failed to read stored inventory", e)),
        };
        sink.success(format!(
            "Preview ready: {} new, {} updated, {} deleted, {} conflicts",
            report.summary.new_resources,
            report.summary.updated_resources,
            report.summary.deleted_resources,
            report.summary.conflicts
        ));
        Ok(report)
    }

    /// Connect the store, then fetch and normalize the live set
    async fn fetch_live(&self, sink: &EventSink) -> Result<Vec<Resource>> {
        sink.info("Connecting to store...");
        self.engine.store().connect().await?;

        let heartbeat_fn = |message: &str| sink.debug(message);
        let heartbeat: Heartbeat<'_> = &heartbeat_fn;

        sink.info(format!("Fetching subscription from {}...", self.provider.name()));
        let subscription = with_retry(
            || self.provider.get_subscription(Some(heartbeat)),
            &self.retry_options(sink, "Subscription lookup"),
        )
        .await?;
        sink.success(format!("Using subscription {}", subscription.name));

        sink.info("Fetching resources...");
        let raw = with_retry(
            || self.provider.get_resources(Some(heartbeat)),
            &self.retry_options(sink, "Resource listing"),
        )
        .await?;

        let live = normalize_all(&raw, &subscription);
        info!(count = live.len(), subscription = %subscription.name, "Live resources normalized");
        sink.success(format!("Fetched {} resources", live.len()));
        Ok(live)
    }

    fn retry_options(&self, sink: &EventSink, step: &'static str) -> RetryOptions {
        let sink = sink.clone();
        RetryOptions::<Error>::new(self.retry.clone())
            .retry_if(is_transient_provider_error)
            .with_on_retry(move |error, attempt, delay| {
                sink.warning(format!(
                    "{step} failed (attempt {attempt}): {error}. Retrying in {}ms",
                    delay.as_millis()
                ));
            })
    }
}

fn abort(sink: &EventSink, context: &str, err: Error) -> Error {
    error!(error = %err, "{context}");
    sink.error(format!("{context}: {err}"));
    sink.fail(&err);
    err
}

fn describe(update: &ProgressUpdate) -> (LogLevel, String) {
    let name = &update.resource_name;
    match (update.operation, update.reason) {
        (SyncOperation::Create, _) => (LogLevel::Success, format!("Created {name}")),
        (SyncOperation::Update, _) => (LogLevel::Success, format!("Updated {name}")),
        (SyncOperation::Delete, _) => (LogLevel::Success, format!("Deleted {name}")),
        (SyncOperation::Skip, ActionReason::NoChanges) => {
            (LogLevel::Debug, format!("Unchanged {name}"))
        }
        (SyncOperation::Skip, reason) => (LogLevel::Warning, format!("Skipped {name}: {reason}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::SyncEvent;
    use async_trait::async_trait;
    use invsync_types::{ProviderErrorKind, RawResource, RunStatus, Subscription};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tokio::sync::{mpsc, Notify};

    fn subscription() -> Subscription {
        Subscription {
            id: "sub-1".into(),
            name: "team-dev".into(),
            tenant_id: "tenant-1".into(),
            state: None,
        }
    }

    fn raw(name: &str) -> RawResource {
        serde_json::from_value(serde_json::json!({
            "id": format!("/subscriptions/sub-1/resourceGroups/rg-app/providers/Microsoft.Compute/virtualMachines/{name}"),
            "name": name,
            "type": "Microsoft.Compute/virtualMachines",
            "location": "eastus",
            "properties": { "powerState": "VM running" }
        }))
        .unwrap()
    }

    /// Provider replaying scripted resource listings
    struct ScriptedProvider {
        listings: StdMutex<VecDeque<Result<Vec<RawResource>>>>,
        calls: AtomicUsize,
        gate: Option<(Arc<Notify>, Arc<Notify>)>,
    }

    impl ScriptedProvider {
        fn new(listings: Vec<Result<Vec<RawResource>>>) -> Self {
            Self {
                listings: StdMutex::new(listings.into()),
                calls: AtomicUsize::new(0),
                gate: None,
            }
        }

        fn gated(listing: Vec<RawResource>, entered: Arc<Notify>, release: Arc<Notify>) -> Self {
            Self {
                gate: Some((entered, release)),
                ..Self::new(vec![Ok(listing)])
            }
        }
    }

    #[async_trait]
    impl ResourceProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn get_subscription(&self, heartbeat: Option<Heartbeat<'_>>) -> Result<Subscription> {
            if let Some(heartbeat) = heartbeat {
                heartbeat("Querying the provider API...");
            }
            Ok(subscription())
        }

        async fn get_resources(&self, _heartbeat: Option<Heartbeat<'_>>) -> Result<Vec<RawResource>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some((entered, release)) = &self.gate {
                entered.notify_one();
                release.notified().await;
            }
            self.listings
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig::new(3, Duration::from_millis(10), Duration::from_millis(100), 2.0).unwrap()
    }

    fn service(provider: ScriptedProvider) -> (SyncService, Arc<ScriptedProvider>) {
        let provider = Arc::new(provider);
        let service = SyncService::new(provider.clone(), Arc::new(MemoryStore::new()))
            .with_retry_config(fast_retry());
        (service, provider)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SyncEvent>) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn messages(events: &[SyncEvent], wanted: LogLevel) -> Vec<String> {
        events
            .iter()
            .filter_map(|event| match event {
                SyncEvent::Log { level, message, .. } if *level == wanted => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_run_streams_and_completes() {
        let (service, _) = service(ScriptedProvider::new(vec![Ok(vec![raw("vm1"), raw("vm2")])]));
        let (sink, mut rx) = EventSink::channel();

        let result = service
            .run(SyncRequest::new().with_user_id("ops"), &sink)
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.stats.resources_created, 2);
        assert_eq!(service.store().get_all().await.unwrap().len(), 2);

        let events = drain(&mut rx);
        assert!(matches!(events.last(), Some(SyncEvent::Complete(r)) if r == &result));
        assert!(messages(&events, LogLevel::Debug).contains(&"Querying the provider API...".to_string()));
        let successes = messages(&events, LogLevel::Success);
        assert!(successes.contains(&"Created vm1".to_string()));
        assert!(successes.contains(&"Created vm2".to_string()));
        assert!(messages(&events, LogLevel::Info)
            .iter()
            .any(|m| m.starts_with("Planned 2 actions: 2 new")));
    }

    #[tokio::test]
    async fn test_request_source_overrides_default() {
        let (service, _) = service(ScriptedProvider::new(vec![Ok(vec![raw("vm1")])]));
        let service = service.with_default_source(SyncSource::Automatic);

        service
            .run(SyncRequest::new().with_source(SyncSource::Script), &EventSink::disabled())
            .await
            .unwrap();

        let record = service.store().get("vm1").await.unwrap().unwrap();
        assert_eq!(record.sync_source, SyncSource::Script);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_fetch_failures_are_retried() {
        let throttled = || -> Result<Vec<RawResource>> {
            Err(Error::provider_with_kind(
                ProviderErrorKind::Throttled,
                "429 Too Many Requests",
            ))
        };
        let (service, provider) =
            service(ScriptedProvider::new(vec![throttled(), throttled(), Ok(vec![raw("vm1")])]));
        let (sink, mut rx) = EventSink::channel();

        let result = service.run(SyncRequest::new(), &sink).await.unwrap();

        assert!(result.success);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        let warnings = messages(&drain(&mut rx), LogLevel::Warning);
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("attempt 1"));
        assert!(warnings[1].contains("Retrying in 20ms"));
    }

    #[tokio::test]
    async fn test_permanent_fetch_failure_aborts_run() {
        let (service, provider) = service(ScriptedProvider::new(vec![Err(
            Error::provider_with_kind(ProviderErrorKind::NotFound, "subscription not found"),
        )]));
        let (sink, mut rx) = EventSink::channel();

        let err = service.run(SyncRequest::new(), &sink).await.unwrap_err();

        assert_eq!(err.provider_kind(), Some(ProviderErrorKind::NotFound));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(service.store().list_history(10).await.unwrap().is_empty());

        let events = drain(&mut rx);
        assert!(matches!(events.last(), Some(SyncEvent::Error { error }) if error.contains("subscription not found")));
        assert!(!events.iter().any(|e| matches!(e, SyncEvent::Complete(_))));
    }

    #[tokio::test]
    async fn test_action_errors_are_streamed() {
        let mut broken = raw("vm-broken");
        broken.location = String::new();
        let (service, _) = service(ScriptedProvider::new(vec![Ok(vec![raw("vm-ok"), broken])]));
        let (sink, mut rx) = EventSink::channel();

        let result = service.run(SyncRequest::new(), &sink).await.unwrap();

        assert_eq!(result.status, RunStatus::Partial);
        let errors = messages(&drain(&mut rx), LogLevel::Error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("create vm-broken: "));
    }

    #[tokio::test]
    async fn test_dropped_receiver_does_not_fail_run() {
        let (service, _) = service(ScriptedProvider::new(vec![Ok(vec![raw("vm1")])]));
        let (sink, rx) = EventSink::channel();
        drop(rx);

        let result = service.run(SyncRequest::new(), &sink).await.unwrap();
        assert!(result.success);
        assert_eq!(service.store().get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_run_is_rejected() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let (service, _) = service(ScriptedProvider::gated(
            vec![raw("vm1")],
            entered.clone(),
            release.clone(),
        ));
        let service = Arc::new(service);

        let first = tokio::spawn({
            let service = service.clone();
            async move { service.run(SyncRequest::new(), &EventSink::disabled()).await }
        });
        entered.notified().await;
        assert!(service.is_running());

        let (sink, mut rx) = EventSink::channel();
        let err = service.run(SyncRequest::new(), &sink).await.unwrap_err();
        assert!(matches!(err, Error::SyncInProgress));
        assert!(matches!(drain(&mut rx).last(), Some(SyncEvent::Error { .. })));

        release.notify_one();
        let result = first.await.unwrap().unwrap();
        assert!(result.success);
        assert!(!service.is_running());
        assert_eq!(service.store().list_history(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_preview_writes_nothing() {
        let (service, _) = service(ScriptedProvider::new(vec![Ok(vec![raw("vm1")])]));
        let report = service.preview(&EventSink::disabled()).await.unwrap();

        assert_eq!(report.summary.new_resources, 1);
        assert_eq!(report.changes.new, vec!["vm1".to_string()]);
        assert!(service.store().get_all().await.unwrap().is_empty());
        assert!(service.store().list_history(1).await.unwrap().is_empty());
    }

    #[test]
    fn test_from_config_requires_paths() {
        let mut config = Config::default();
        config.provider.kind = ProviderKind::Snapshot;
        assert!(SyncService::from_config(&config).is_err());

        config.provider.snapshot_path = Some("snapshot.json".into());
        config.store.kind = StoreKind::Memory;
        config.sync.source = SyncSource::Automatic;
        let service = SyncService::from_config(&config).unwrap();
        assert_eq!(service.provider().name(), "snapshot");
        assert_eq!(service.default_source, SyncSource::Automatic);
        assert_eq!(service.retry_config().initial_delay, Duration::from_millis(2000));
    }

    #[test]
    fn test_describe_levels() {
        let update = |operation, reason| ProgressUpdate {
            operation,
            resource_name: "vm1".into(),
            reason,
        };
        assert_eq!(
            describe(&update(SyncOperation::Delete, ActionReason::NoLongerPresentUpstream)),
            (LogLevel::Success, "Deleted vm1".to_string())
        );
        assert_eq!(
            describe(&update(SyncOperation::Skip, ActionReason::ManualResolutionRequired)),
            (
                LogLevel::Warning,
                "Skipped vm1: manual resolution required".to_string()
            )
        );
        assert_eq!(describe(&update(SyncOperation::Skip, ActionReason::NoChanges)).0, LogLevel::Debug);
    }
}
