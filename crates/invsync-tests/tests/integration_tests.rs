//! End-to-end tests for InvSync
//!
//! These exercise the planner, the engine and the service together against
//! real store implementations.

use futures::future::join;
use invsync_config::{Config, ProviderConfig, ProviderKind, StoreConfig, StoreKind};
use invsync_store::{JsonFileStore, MemoryStore};
use invsync_sync::{
    plan, with_retry, EventSink, LogLevel, RetryOptions, SyncEngine, SyncEvent, SyncOptions,
    SyncRequest, SyncService,
};
use invsync_tests::doubles::{FlakyStore, ScriptedProvider};
use invsync_tests::test_utils::{
    raw_vm, resolutions, resource, stored, write_snapshot, SUBSCRIPTION_NAME,
};
use invsync_types::{
    ActionReason, Error, ProviderErrorKind, Resolution, ResourceStatus, ResourceStore,
    RetryConfig, RunStatus, SyncOperation, SyncSource, SyncType, TrackedField, TriggerSource,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{mpsc, Notify};

fn drain(rx: &mut mpsc::UnboundedReceiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn log_messages(events: &[SyncEvent], wanted: LogLevel) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            SyncEvent::Log { level, message, .. } if *level == wanted => Some(message.clone()),
            _ => None,
        })
        .collect()
}

async fn connected(store: impl ResourceStore + 'static) -> Arc<dyn ResourceStore> {
    store.connect().await.unwrap();
    Arc::new(store)
}

#[test]
fn test_new_live_resource_is_created() {
    let actions = plan(&[resource("vm1", ResourceStatus::Running)], &[], None);

    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].operation, SyncOperation::Create);
    assert_eq!(actions[0].resource_name, "vm1");
    assert_eq!(actions[0].reason, ActionReason::NewResource);
}

#[test]
fn test_changed_status_without_resolutions_updates() {
    let actions = plan(
        &[resource("vm1", ResourceStatus::Running)],
        &[stored("vm1", ResourceStatus::Stopped)],
        None,
    );

    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].operation, SyncOperation::Update);
    assert_eq!(actions[0].reason, ActionReason::ResourceUpdated);
    assert_eq!(actions[0].reason.as_str(), "resource updated");
}

#[test]
fn test_manual_resolution_blocks_update() {
    let manual = resolutions(&[("vm1", TrackedField::Status, Resolution::Manual)]);
    let actions = plan(
        &[resource("vm1", ResourceStatus::Running)],
        &[stored("vm1", ResourceStatus::Stopped)],
        Some(&manual),
    );

    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].operation, SyncOperation::Skip);
    assert_eq!(actions[0].reason.as_str(), "manual resolution required");
    assert_eq!(actions[0].conflicts.len(), 1);
    assert_eq!(actions[0].conflicts[0].field, TrackedField::Status);
}

#[test]
fn test_stored_only_resource_is_deleted() {
    let actions = plan(&[], &[stored("vm1", ResourceStatus::Running)], None);

    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].operation, SyncOperation::Delete);
    assert_eq!(actions[0].resource_name, "vm1");
    assert_eq!(actions[0].reason, ActionReason::NoLongerPresentUpstream);
}

#[tokio::test(start_paused = true)]
async fn test_throttled_call_succeeds_after_two_retries() {
    let calls = AtomicU32::new(0);
    let delays = Arc::new(Mutex::new(Vec::new()));
    let seen = delays.clone();

    let options = RetryOptions::new(RetryConfig::default())
        .retry_if(invsync_sync::is_transient_provider_error)
        .with_on_retry(move |_: &Error, attempt, delay| {
            seen.lock().unwrap().push((attempt, delay));
        });

    let value = with_retry(
        || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(Error::provider_with_kind(
                    ProviderErrorKind::Throttled,
                    "429 Too Many Requests",
                ))
            } else {
                Ok("inventory")
            }
        },
        &options,
    )
    .await
    .unwrap();

    assert_eq!(value, "inventory");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(
        *delays.lock().unwrap(),
        vec![
            (1, Duration::from_millis(1000)),
            (2, Duration::from_millis(2000))
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_return_last_error_unchanged() {
    let options = RetryOptions::new(
        RetryConfig::new(2, Duration::from_millis(10), Duration::from_millis(50), 2.0).unwrap(),
    );
    let calls = AtomicU32::new(0);

    let err = with_retry(
        || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(Error::provider_with_kind(
                ProviderErrorKind::Timeout,
                format!("timeout #{n}"),
            ))
        },
        &options,
    )
    .await
    .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(err, Error::provider_with_kind(ProviderErrorKind::Timeout, "timeout #2"));
}

#[tokio::test]
async fn test_one_failing_action_makes_the_run_partial() {
    let store = Arc::new(FlakyStore::new(["vm-bad"]));
    store.connect().await.unwrap();
    let engine = SyncEngine::new(store.clone());

    let live = vec![
        resource("vm-a", ResourceStatus::Running),
        resource("vm-bad", ResourceStatus::Running),
        resource("vm-b", ResourceStatus::Stopped),
        resource("vm-c", ResourceStatus::Available),
    ];
    let result = engine.sync(&live, &SyncOptions::new(), None).await.unwrap();

    assert_eq!(result.status, RunStatus::Partial);
    assert!(!result.success);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].starts_with("create vm-bad: "));
    assert_eq!(result.stats.resources_processed, 4);
    assert_eq!(result.stats.resources_created, 3);
    let applied = result.stats.resources_created
        + result.stats.resources_updated
        + result.stats.resources_deleted
        + result.stats.resources_skipped;
    assert_eq!(result.stats.resources_processed, applied + result.errors.len());

    for name in ["vm-a", "vm-b", "vm-c"] {
        assert!(store.get(name).await.unwrap().is_some(), "{name} missing");
    }
    assert!(store.get("vm-bad").await.unwrap().is_none());

    let history = store.list_history(1).await.unwrap();
    assert_eq!(history[0].id, result.history_id);
    assert_eq!(history[0].status, RunStatus::Partial);
    assert_eq!(history[0].errors, result.errors);
}

#[tokio::test]
async fn test_every_action_failing_makes_the_run_failed() {
    let store = Arc::new(FlakyStore::with_resources(
        vec![stored("vm-gone", ResourceStatus::Running)],
        ["vm-new", "vm-gone"],
    ));
    store.connect().await.unwrap();
    let engine = SyncEngine::new(store.clone());

    let result = engine
        .sync(&[resource("vm-new", ResourceStatus::Running)], &SyncOptions::new(), None)
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.errors.len(), 2);
    assert!(result.errors.iter().any(|e| e.starts_with("delete vm-gone: ")));
    assert_eq!(store.list_history(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_history_write_failure_is_returned() {
    let store = Arc::new(FlakyStore::new(Vec::<String>::new()));
    store.connect().await.unwrap();
    store.fail_history();
    let engine = SyncEngine::new(store.clone());

    let err = engine
        .sync(&[resource("vm1", ResourceStatus::Running)], &SyncOptions::new(), None)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Store { .. }));
    assert!(store.get("vm1").await.unwrap().is_some());
}

#[tokio::test]
async fn test_resolution_run_end_to_end() {
    let store = connected(MemoryStore::with_resources(vec![
        stored("vm1", ResourceStatus::Stopped),
        stored("vm2", ResourceStatus::Stopped),
    ]))
    .await;
    let provider = Arc::new(ScriptedProvider::serving(vec![
        raw_vm("vm1", ResourceStatus::Running),
        raw_vm("vm2", ResourceStatus::Running),
    ]));
    let service = SyncService::new(provider, store.clone());

    let request = SyncRequest::new()
        .with_resolutions(resolutions(&[
            ("vm1", TrackedField::Status, Resolution::UseLive),
            ("vm2", TrackedField::Status, Resolution::Manual),
        ]))
        .with_user_id("alice")
        .with_trigger(TriggerSource::UiButton);
    let result = service.run(request, &EventSink::disabled()).await.unwrap();

    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(result.stats.resources_updated, 1);
    assert_eq!(result.stats.resources_skipped, 1);
    assert_eq!(result.stats.conflicts_detected, 2);
    assert_eq!(result.stats.conflicts_resolved, 1);

    let vm1 = store.get("vm1").await.unwrap().unwrap();
    assert_eq!(vm1.resource.status, ResourceStatus::Running);
    assert_eq!(vm1.created_in_store_at, stored("vm1", ResourceStatus::Stopped).created_in_store_at);
    assert!(vm1.updated_in_store_at > vm1.created_in_store_at);
    let vm2 = store.get("vm2").await.unwrap().unwrap();
    assert_eq!(vm2, stored("vm2", ResourceStatus::Stopped));

    let record = store.last_history(None).await.unwrap().unwrap();
    assert_eq!(record.sync_type, SyncType::ConflictResolution);
    assert_eq!(record.source, TriggerSource::UiButton);
    assert_eq!(record.user_id.as_deref(), Some("alice"));
}

#[tokio::test]
async fn test_snapshot_to_json_store_across_processes() {
    let temp = TempDir::new().unwrap();
    let snapshot_path = temp.path().join("snapshot.json");
    let store_dir = temp.path().join("store");
    let config = Config {
        provider: ProviderConfig {
            kind: ProviderKind::Snapshot,
            snapshot_path: Some(snapshot_path.clone()),
            ..ProviderConfig::default()
        },
        store: StoreConfig {
            kind: StoreKind::JsonFile,
            path: Some(store_dir.clone()),
        },
        ..Config::default()
    };

    write_snapshot(
        &snapshot_path,
        vec![
            raw_vm("vm1", ResourceStatus::Running),
            raw_vm("vm2", ResourceStatus::Stopped),
        ],
    )
    .await
    .unwrap();
    let first = SyncService::from_config(&config)
        .unwrap()
        .run(SyncRequest::new(), &EventSink::disabled())
        .await
        .unwrap();
    assert_eq!(first.stats.resources_created, 2);

    let before = {
        let store = JsonFileStore::new(&store_dir);
        store.connect().await.unwrap();
        store.get("vm1").await.unwrap().unwrap()
    };
    assert_eq!(before.resource.subscription, SUBSCRIPTION_NAME);
    assert_eq!(before.sync_source, SyncSource::Manual);

    write_snapshot(
        &snapshot_path,
        vec![
            raw_vm("vm1", ResourceStatus::Stopped),
            raw_vm("vm3", ResourceStatus::Running),
        ],
    )
    .await
    .unwrap();
    let service = SyncService::from_config(&config).unwrap();
    let second = service
        .run(
            SyncRequest::new().with_source(SyncSource::Script),
            &EventSink::disabled(),
        )
        .await
        .unwrap();

    assert_eq!(second.status, RunStatus::Success);
    assert_eq!(second.stats.resources_created, 1);
    assert_eq!(second.stats.resources_updated, 1);
    assert_eq!(second.stats.resources_deleted, 1);

    let store = JsonFileStore::new(&store_dir);
    store.connect().await.unwrap();
    let names: Vec<String> = store
        .get_all()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.resource.name)
        .collect();
    assert_eq!(names, vec!["vm1", "vm3"]);

    let after = store.get("vm1").await.unwrap().unwrap();
    assert_eq!(after.resource.status, ResourceStatus::Stopped);
    assert_eq!(after.created_in_store_at, before.created_in_store_at);
    assert_eq!(after.sync_source, SyncSource::Script);

    let history = store.list_history(10).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, second.history_id);
    assert_eq!(history[1].id, first.history_id);
}

#[tokio::test]
async fn test_run_streams_ordered_log_then_complete() {
    let provider = Arc::new(ScriptedProvider::serving(vec![
        raw_vm("vm1", ResourceStatus::Running),
        raw_vm("vm2", ResourceStatus::Running),
    ]));
    let store = connected(MemoryStore::with_resources(vec![stored(
        "vm-old",
        ResourceStatus::Running,
    )]))
    .await;
    let service = SyncService::new(provider, store);
    let (sink, mut rx) = EventSink::channel();

    let result = service.run(SyncRequest::new(), &sink).await.unwrap();
    let events = drain(&mut rx);

    let per_resource: Vec<(String, SyncOperation)> = events
        .iter()
        .filter_map(|event| match event {
            SyncEvent::Log {
                resource: Some(name),
                operation: Some(op),
                ..
            } => Some((name.clone(), *op)),
            _ => None,
        })
        .collect();
    assert_eq!(
        per_resource,
        vec![
            ("vm1".to_string(), SyncOperation::Create),
            ("vm2".to_string(), SyncOperation::Create),
            ("vm-old".to_string(), SyncOperation::Delete),
        ]
    );
    assert!(log_messages(&events, LogLevel::Debug)
        .iter()
        .any(|m| m == "Looking up subscription..."));
    assert_eq!(events.last(), Some(&SyncEvent::Complete(result)));
}

#[tokio::test]
async fn test_run_survives_disconnected_consumer() {
    let provider = Arc::new(ScriptedProvider::serving(vec![raw_vm(
        "vm1",
        ResourceStatus::Running,
    )]));
    let store = connected(MemoryStore::new()).await;
    let service = SyncService::new(provider, store.clone());
    let (sink, rx) = EventSink::channel();
    drop(rx);

    let result = service.run(SyncRequest::new(), &sink).await.unwrap();

    assert!(sink.is_closed());
    assert_eq!(result.status, RunStatus::Success);
    assert!(store.get("vm1").await.unwrap().is_some());
}

#[tokio::test]
async fn test_malformed_listing_aborts_before_any_write() {
    let provider = Arc::new(ScriptedProvider::new(vec![Err(Error::validation(
        "resource listing is not an array",
    ))]));
    let store = Arc::new(FlakyStore::with_resources(
        vec![stored("vm1", ResourceStatus::Running)],
        Vec::<String>::new(),
    ));
    let service = SyncService::new(provider.clone(), store.clone());
    let (sink, mut rx) = EventSink::channel();

    let err = service.run(SyncRequest::new(), &sink).await.unwrap_err();

    assert!(matches!(err, Error::Validation { .. }));
    assert_eq!(provider.calls(), 1);
    assert_eq!(store.reads(), 0);
    assert_eq!(store.writes(), 0);
    assert!(store.list_history(10).await.unwrap().is_empty());
    assert!(matches!(
        drain(&mut rx).last(),
        Some(SyncEvent::Error { .. })
    ));
}

#[tokio::test]
async fn test_concurrent_run_is_rejected_without_store_access() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let provider = Arc::new(
        ScriptedProvider::serving(vec![raw_vm("vm1", ResourceStatus::Running)])
            .with_gate(entered.clone(), release.clone()),
    );
    let store = Arc::new(FlakyStore::new(Vec::<String>::new()));
    let service = SyncService::new(provider.clone(), store.clone());
    let (rejected_sink, mut rejected_rx) = EventSink::channel();

    let (first, second) = join(service.run(SyncRequest::new(), &EventSink::disabled()), async {
        entered.notified().await;
        assert!(service.is_running());
        let outcome = service.run(SyncRequest::new(), &rejected_sink).await;
        assert_eq!(store.connects(), 1);
        assert_eq!(store.reads(), 0);
        release.notify_one();
        outcome
    })
    .await;

    assert_eq!(second.unwrap_err(), Error::SyncInProgress);
    let first = first.unwrap();
    assert_eq!(first.stats.resources_created, 1);
    assert_eq!(provider.calls(), 1);
    assert_eq!(store.reads(), 1);
    assert_eq!(store.list_history(10).await.unwrap().len(), 1);
    assert!(!service.is_running());

    let events = drain(&mut rejected_rx);
    assert_eq!(
        events.last(),
        Some(&SyncEvent::Error {
            error: "A synchronization run is already in progress".to_string()
        })
    );
}

#[tokio::test]
async fn test_back_to_back_runs_record_distinct_history() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Ok(vec![raw_vm("vm1", ResourceStatus::Running)]),
        Ok(vec![raw_vm("vm1", ResourceStatus::Running)]),
    ]));
    let store = connected(MemoryStore::new()).await;
    let service = SyncService::new(provider, store.clone());

    let first = service.run(SyncRequest::new(), &EventSink::disabled()).await.unwrap();
    let second = service.run(SyncRequest::new(), &EventSink::disabled()).await.unwrap();

    assert_ne!(first.history_id, second.history_id);
    assert_eq!(second.stats.resources_skipped, 1);
    assert_eq!(second.stats.resources_created, 0);

    let history = store.list_history(10).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|h| h.status == RunStatus::Success));
    assert_eq!(history[0].sync_type, SyncType::Full);
}

#[tokio::test]
async fn test_preview_reports_without_writing() {
    let provider = Arc::new(ScriptedProvider::serving(vec![
        raw_vm("vm1", ResourceStatus::Running),
        raw_vm("vm2", ResourceStatus::Running),
    ]));
    let store = Arc::new(FlakyStore::with_resources(
        vec![
            stored("vm1", ResourceStatus::Stopped),
            stored("vm-old", ResourceStatus::Running),
        ],
        Vec::<String>::new(),
    ));
    let service = SyncService::new(provider, store.clone());

    let report = service.preview(&EventSink::disabled()).await.unwrap();

    assert_eq!(report.summary.new_resources, 1);
    assert_eq!(report.summary.updated_resources, 1);
    assert_eq!(report.summary.deleted_resources, 1);
    assert_eq!(report.summary.conflicts, 1);
    assert_eq!(report.conflicting_resources(), vec!["vm1"]);
    assert_eq!(report.changes.new, vec!["vm2".to_string()]);
    assert_eq!(store.writes(), 0);
    assert!(store.list_history(10).await.unwrap().is_empty());
}

mod convergence {
    use super::*;
    use invsync_types::Resource;
    use proptest::prelude::*;

    const STATUSES: [ResourceStatus; 3] = [
        ResourceStatus::Running,
        ResourceStatus::Stopped,
        ResourceStatus::Available,
    ];

    fn side() -> impl Strategy<Value = Vec<(u8, usize)>> {
        prop::collection::btree_map(0u8..16, 0usize..STATUSES.len(), 0..12)
            .prop_map(|map| map.into_iter().collect())
    }

    fn live_set(entries: &[(u8, usize)]) -> Vec<Resource> {
        entries
            .iter()
            .map(|(n, s)| resource(&format!("vm-{n}"), STATUSES[*s]))
            .collect()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn prop_full_sync_converges(live_side in side(), stored_side in side()) {
            let live = live_set(&live_side);
            let records = stored_side
                .iter()
                .map(|(n, s)| stored(&format!("vm-{n}"), STATUSES[*s]))
                .collect::<Vec<_>>();

            let (result, after) = tokio_test::block_on(async {
                let store = connected(MemoryStore::with_resources(records)).await;
                let engine = SyncEngine::new(store.clone());
                let result = engine.sync(&live, &SyncOptions::new(), None).await.unwrap();
                (result, store.get_all().await.unwrap())
            });

            prop_assert_eq!(result.status, RunStatus::Success);
            let mut expected: Vec<&str> = live.iter().map(|r| r.name.as_str()).collect();
            expected.sort_unstable();
            let stored_names: Vec<&str> = after.iter().map(|r| r.name()).collect();
            prop_assert_eq!(stored_names, expected);

            for action in plan(&live, &after, None) {
                prop_assert_eq!(action.operation, SyncOperation::Skip);
                prop_assert_eq!(action.reason, ActionReason::NoChanges);
            }
        }
    }
}
