//! Preview reports and the API-shaped run summary

use crate::engine::SyncResult;
use crate::plan::{calculate_sync_stats, SyncStats};
use chrono::{DateTime, Utc};
use invsync_types::{Conflict, Error, SyncAction, SyncOperation};
use serde::{Deserialize, Serialize};

/// Headline counts shown to an operator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    /// Resources considered
    pub total_resources: usize,
    /// Created (or to create)
    pub new_resources: usize,
    /// Updated (or to update)
    pub updated_resources: usize,
    /// Deleted (or to delete)
    pub deleted_resources: usize,
    /// Left alone
    pub unchanged_resources: usize,
    /// Conflicts: all of them in a preview, pending ones after a run
    pub conflicts: usize,
}

impl From<&SyncStats> for SyncSummary {
    fn from(stats: &SyncStats) -> Self {
        Self {
            total_resources: stats.total_resources,
            new_resources: stats.new_resources,
            updated_resources: stats.updated_resources,
            deleted_resources: stats.deleted_resources,
            unchanged_resources: stats.unchanged_resources,
            conflicts: stats.conflicts,
        }
    }
}

impl From<&SyncResult> for SyncSummary {
    fn from(result: &SyncResult) -> Self {
        Self {
            total_resources: result.stats.resources_processed,
            new_resources: result.stats.resources_created,
            updated_resources: result.stats.resources_updated,
            deleted_resources: result.stats.resources_deleted,
            unchanged_resources: result.stats.resources_skipped,
            conflicts: result.conflicts_pending,
        }
    }
}

/// Names per planned operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// To create
    pub new: Vec<String>,
    /// To update
    pub updated: Vec<String>,
    /// To delete
    pub deleted: Vec<String>,
}

impl ChangeSet {
    /// Group a plan's resource names by operation, keeping plan order
    pub fn from_actions(actions: &[SyncAction]) -> Self {
        let mut changes = Self::default();
        for action in actions {
            let bucket = match action.operation {
                SyncOperation::Create => &mut changes.new,
                SyncOperation::Update => &mut changes.updated,
                SyncOperation::Delete => &mut changes.deleted,
                SyncOperation::Skip => continue,
            };
            bucket.push(action.resource_name.clone());
        }
        changes
    }

    /// Nothing would change
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

/// What a run would do, computed without touching the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewReport {
    /// Counts
    pub summary: SyncSummary,
    /// Every field-level conflict, unresolved
    pub conflicts: Vec<Conflict>,
    /// Names per operation
    pub changes: ChangeSet,
}

impl PreviewReport {
    /// Build from a plan and the detected conflicts
    pub fn new(actions: &[SyncAction], conflicts: Vec<Conflict>) -> Self {
        let stats = calculate_sync_stats(actions);
        Self {
            summary: SyncSummary::from(&stats),
            conflicts,
            changes: ChangeSet::from_actions(actions),
        }
    }

    /// Names of resources with at least one conflict, first-seen order
    pub fn conflicting_resources(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for conflict in &self.conflicts {
            if !names.contains(&conflict.resource_name.as_str()) {
                names.push(&conflict.resource_name);
            }
        }
        names
    }
}

/// Payload of a successful [`SyncApiResponse`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncApiData {
    /// Counts
    pub summary: SyncSummary,
    /// Conflicts, previews only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflicts: Option<Vec<Conflict>>,
    /// Change lists, previews only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<ChangeSet>,
    /// History record, runs only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_id: Option<String>,
}

/// Response envelope of the sync trigger surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncApiResponse {
    /// No error occurred
    pub success: bool,
    /// Result payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<SyncApiData>,
    /// Error text; per-action errors are joined with `"; "`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the response was built
    pub timestamp: DateTime<Utc>,
}

impl SyncApiResponse {
    /// Envelope for a finished run
    pub fn from_result(result: &SyncResult) -> Self {
        Self {
            success: result.success,
            data: Some(SyncApiData {
                summary: SyncSummary::from(result),
                conflicts: None,
                changes: None,
                history_id: Some(result.history_id.clone()),
            }),
            error: (!result.errors.is_empty()).then(|| result.errors.join("; ")),
            timestamp: Utc::now(),
        }
    }

    /// Envelope for a preview
    pub fn from_preview(report: &PreviewReport) -> Self {
        Self {
            success: true,
            data: Some(SyncApiData {
                summary: report.summary,
                conflicts: (!report.conflicts.is_empty()).then(|| report.conflicts.clone()),
                changes: Some(report.changes.clone()),
                history_id: None,
            }),
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Envelope for an aborted run
    pub fn from_error(error: &Error) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            timestamp: Utc::now(),
        }
    }

    /// Pretty JSON
    pub fn to_json_pretty(&self) -> invsync_types::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use invsync_types::{
        ActionReason, FieldValue, Resource, RunStats, RunStatus, TrackedField,
    };

    fn action(operation: SyncOperation, name: &str, reason: ActionReason) -> SyncAction {
        SyncAction::new(operation, &Resource::named(name), reason)
    }

    fn conflict(name: &str, field: TrackedField) -> Conflict {
        Conflict {
            resource_name: name.to_string(),
            field,
            live_value: FieldValue::Text("running".into()),
            stored_value: FieldValue::Text("stopped".into()),
            resolution: None,
        }
    }

    #[test]
    fn test_change_set_groups_by_operation() {
        let actions = vec![
            action(SyncOperation::Create, "a", ActionReason::NewResource),
            action(SyncOperation::Skip, "b", ActionReason::NoChanges),
            action(SyncOperation::Update, "c", ActionReason::ResourceUpdated),
            action(SyncOperation::Create, "d", ActionReason::NewResource),
            action(SyncOperation::Delete, "e", ActionReason::NoLongerPresentUpstream),
        ];
        let changes = ChangeSet::from_actions(&actions);
        assert_eq!(changes.new, vec!["a", "d"]);
        assert_eq!(changes.updated, vec!["c"]);
        assert_eq!(changes.deleted, vec!["e"]);
        assert!(!changes.is_empty());
        assert!(ChangeSet::from_actions(&actions[1..2]).is_empty());
    }

    #[test]
    fn test_preview_conflicting_resources() {
        let report = PreviewReport::new(
            &[],
            vec![
                conflict("vm2", TrackedField::Status),
                conflict("vm1", TrackedField::Location),
                conflict("vm2", TrackedField::Environment),
            ],
        );
        assert_eq!(report.conflicting_resources(), vec!["vm2", "vm1"]);
    }

    #[test]
    fn test_response_from_result() {
        let result = SyncResult {
            success: false,
            status: RunStatus::Partial,
            stats: RunStats {
                resources_processed: 3,
                resources_created: 1,
                resources_updated: 1,
                resources_skipped: 0,
                ..RunStats::default()
            },
            conflicts_pending: 2,
            history_id: "sync-1".into(),
            errors: vec!["delete vm9: boom".into(), "create vm8: bad".into()],
        };

        let response = SyncApiResponse::from_result(&result);
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "delete vm9: boom; create vm8: bad");
        assert_eq!(json["data"]["historyId"], "sync-1");
        assert_eq!(json["data"]["summary"]["totalResources"], 3);
        assert_eq!(json["data"]["summary"]["newResources"], 1);
        assert_eq!(json["data"]["summary"]["conflicts"], 2);
        assert!(json["data"].get("changes").is_none());
    }

    #[test]
    fn test_response_from_preview() {
        let actions = vec![action(SyncOperation::Update, "vm1", ActionReason::ResourceUpdated)
            .with_conflicts(vec![conflict("vm1", TrackedField::Status)])];
        let report = PreviewReport::new(&actions, vec![conflict("vm1", TrackedField::Status)]);

        let json = serde_json::to_value(SyncApiResponse::from_preview(&report)).unwrap();
        assert_eq!(json["success"], true);
        assert!(json.get("error").is_none());
        assert_eq!(json["data"]["summary"]["updatedResources"], 1);
        assert_eq!(json["data"]["summary"]["conflicts"], 1);
        assert_eq!(json["data"]["conflicts"][0]["field"], "status");
        assert_eq!(json["data"]["changes"]["updated"][0], "vm1");
    }

    #[test]
    fn test_preview_without_conflicts_omits_them() {
        let report = PreviewReport::new(&[], Vec::new());
        let json = serde_json::to_value(SyncApiResponse::from_preview(&report)).unwrap();
        assert!(json["data"].get("conflicts").is_none());
    }

    #[test]
    fn test_response_from_error() {
        let response = SyncApiResponse::from_error(&Error::SyncInProgress);
        assert!(!response.success);
        assert!(response.data.is_none());
        assert_eq!(
            response.error.as_deref(),
            Some("A synchronization run is already in progress")
        );
        assert!(response.to_json_pretty().unwrap().contains("\"success\": false"));
    }
}
