//! Sync planning: one action per resource name

use crate::compare::compare;
use crate::conflict::index_by_name;
use invsync_types::{
    ActionReason, Resolution, Resolutions, Resource, StoredResource, SyncAction, SyncOperation,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Decide what to do with every resource in `live ∪ stored`.
///
/// Creates and matched resources come first, in live order, then deletes in
/// stored order. Without `resolutions` any difference updates the stored
/// record from live; once a resolutions map is supplied a differing resource
/// is only updated if every conflicting field resolves to `use-live`.
/// Resolutions on fields that do not differ are ignored.
/// A live name seen twice is planned once, from its first occurrence.
pub fn plan(
    live: &[Resource],
    stored: &[StoredResource],
    resolutions: Option<&Resolutions>,
) -> Vec<SyncAction> {
    let stored_by_name = index_by_name(stored);
    let mut live_names: HashSet<&str> = HashSet::with_capacity(live.len());
    let mut actions = Vec::with_capacity(live.len() + stored.len());

    for resource in live {
        if !live_names.insert(resource.name.as_str()) {
            warn!(resource = %resource.name, "Duplicate live resource name, keeping the first");
            continue;
        }
        let action = match stored_by_name.get(resource.name.as_str()) {
            None => SyncAction::new(SyncOperation::Create, resource, ActionReason::NewResource),
            Some(record) => plan_matched(resource, record, resolutions),
        };
        actions.push(action);
    }

    let mut deleted: HashSet<&str> = HashSet::new();
    for record in stored {
        let name = record.name();
        if !live_names.contains(name) && deleted.insert(name) {
            actions.push(SyncAction::new(
                SyncOperation::Delete,
                &record.resource,
                ActionReason::NoLongerPresentUpstream,
            ));
        }
    }

    debug!(
        live = live.len(),
        stored = stored.len(),
        actions = actions.len(),
        "Plan computed"
    );
    actions
}

fn plan_matched(
    resource: &Resource,
    record: &StoredResource,
    resolutions: Option<&Resolutions>,
) -> SyncAction {
    let comparison = compare(resource, record);
    if comparison.is_equal {
        return SyncAction::new(SyncOperation::Skip, resource, ActionReason::NoChanges);
    }

    let mut conflicts = comparison.into_conflicts(&resource.name);
    let Some(resolutions) = resolutions else {
        return SyncAction::new(SyncOperation::Update, resource, ActionReason::ResourceUpdated)
            .with_conflicts(conflicts);
    };

    let chosen = resolutions.get(&resource.name);
    for conflict in &mut conflicts {
        conflict.resolution = chosen.and_then(|fields| fields.get(&conflict.field).copied());
    }

    let any_manual = conflicts
        .iter()
        .any(|c| c.resolution == Some(Resolution::Manual));
    let (operation, reason) = if any_manual {
        (SyncOperation::Skip, ActionReason::ManualResolutionRequired)
    } else if conflicts
        .iter()
        .all(|c| c.resolution == Some(Resolution::UseLive))
    {
        (SyncOperation::Update, ActionReason::ResourceUpdated)
    } else {
        (SyncOperation::Skip, ActionReason::UnresolvedConflicts)
    };

    SyncAction::new(operation, resource, reason).with_conflicts(conflicts)
}

/// Counts derived from a plan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    /// Planned actions
    pub total_resources: usize,
    /// Creates
    pub new_resources: usize,
    /// Updates
    pub updated_resources: usize,
    /// Deletes
    pub deleted_resources: usize,
    /// Skips without conflicts
    pub unchanged_resources: usize,
    /// Conflicts on update and skip actions
    pub conflicts: usize,
    /// Conflicts carrying a resolution on update actions
    pub conflicts_resolved: usize,
    /// Conflicts without a resolution on skip actions
    pub conflicts_pending: usize,
}

/// Summarize a plan
pub fn calculate_sync_stats(actions: &[SyncAction]) -> SyncStats {
    let mut stats = SyncStats {
        total_resources: actions.len(),
        ..SyncStats::default()
    };

    for action in actions {
        match action.operation {
            SyncOperation::Create => stats.new_resources += 1,
            SyncOperation::Update => {
                stats.updated_resources += 1;
                stats.conflicts += action.conflicts.len();
                stats.conflicts_resolved += action
                    .conflicts
                    .iter()
                    .filter(|c| c.resolution.is_some())
                    .count();
            }
            SyncOperation::Delete => stats.deleted_resources += 1,
            SyncOperation::Skip if action.conflicts.is_empty() => stats.unchanged_resources += 1,
            SyncOperation::Skip => {
                stats.conflicts += action.conflicts.len();
                stats.conflicts_pending += action
                    .conflicts
                    .iter()
                    .filter(|c| c.resolution.is_none())
                    .count();
            }
        }
    }

    stats
}
