//! Reconciliation vocabulary: tracked fields, conflicts, actions and run records

use crate::{Error, GitRepository, Resource, Result, ServiceType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Business field compared between the live and stored version of a resource.
///
/// The set is closed; store-only metadata (timestamps, sync source) is never
/// tracked. Variant order is the comparison order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrackedField {
    /// `name`
    Name,
    /// `type`
    #[serde(rename = "type")]
    Type,
    /// `resourceGroup`
    ResourceGroup,
    /// `location`
    Location,
    /// `subscription`
    Subscription,
    /// `status`
    Status,
    /// `environment`
    Environment,
    /// `createdDate`
    CreatedDate,
    /// `gitRepository`
    GitRepository,
}

impl TrackedField {
    /// All tracked fields in comparison order
    pub const ALL: [Self; 9] = [
        Self::Name,
        Self::Type,
        Self::ResourceGroup,
        Self::Location,
        Self::Subscription,
        Self::Status,
        Self::Environment,
        Self::CreatedDate,
        Self::GitRepository,
    ];

    /// Field name as it appears in records
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Type => "type",
            Self::ResourceGroup => "resourceGroup",
            Self::Location => "location",
            Self::Subscription => "subscription",
            Self::Status => "status",
            Self::Environment => "environment",
            Self::CreatedDate => "createdDate",
            Self::GitRepository => "gitRepository",
        }
    }

    /// Read this field from a resource
    pub fn value(self, resource: &Resource) -> FieldValue {
        match self {
            Self::Name => FieldValue::Text(resource.name.clone()),
            Self::Type => FieldValue::Text(resource.resource_type.as_str().to_string()),
            Self::ResourceGroup => FieldValue::Text(resource.resource_group.clone()),
            Self::Location => FieldValue::Text(resource.location.clone()),
            Self::Subscription => FieldValue::Text(resource.subscription.clone()),
            Self::Status => FieldValue::Text(resource.status.as_str().to_string()),
            Self::Environment => FieldValue::Text(resource.environment.as_str().to_string()),
            Self::CreatedDate => resource
                .created_date
                .clone()
                .map_or(FieldValue::Missing, FieldValue::Text),
            Self::GitRepository => resource
                .git_repository
                .clone()
                .map_or(FieldValue::Missing, FieldValue::Repository),
        }
    }

    /// Overwrite this field of `target` with the value held by `source`
    pub fn copy(self, source: &Resource, target: &mut Resource) {
        match self {
            Self::Name => target.name.clone_from(&source.name),
            Self::Type => target.resource_type = source.resource_type,
            Self::ResourceGroup => target.resource_group.clone_from(&source.resource_group),
            Self::Location => target.location.clone_from(&source.location),
            Self::Subscription => target.subscription.clone_from(&source.subscription),
            Self::Status => target.status = source.status,
            Self::Environment => target.environment = source.environment,
            Self::CreatedDate => target.created_date.clone_from(&source.created_date),
            Self::GitRepository => target.git_repository.clone_from(&source.git_repository),
        }
    }
}

impl fmt::Display for TrackedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackedField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| Error::validation(format!("'{s}' is not a tracked field")))
    }
}

/// Value of a tracked field, compared structurally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Optional field without a value
    Missing,
    /// Scalar value
    Text(String),
    /// Composite repository value
    Repository(GitRepository),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => f.write_str("(none)"),
            Self::Text(text) => f.write_str(text),
            Self::Repository(repo) => match &repo.branch {
                Some(branch) => write!(f, "{}@{}", repo.url, branch),
                None => f.write_str(&repo.url),
            },
        }
    }
}

/// Chosen authority for one conflicting field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    /// Take the live value
    #[serde(rename = "use-live", alias = "use-azure")]
    UseLive,
    /// Keep the stored value
    #[serde(rename = "use-stored", alias = "use-database")]
    UseStored,
    /// Deferred to an operator
    #[serde(rename = "manual")]
    Manual,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::UseLive => "use-live",
            Self::UseStored => "use-stored",
            Self::Manual => "manual",
        };
        f.write_str(name)
    }
}

/// Per-field resolutions for one resource
pub type FieldResolutions = BTreeMap<TrackedField, Resolution>;

/// Resolutions keyed by resource name
pub type Resolutions = BTreeMap<String, FieldResolutions>;

/// Parse a resolutions document `{ "<resource>": { "<field>": "<resolution>" } }`.
///
/// Unknown field names are skipped with a warning; unknown resolution values
/// are rejected.
pub fn parse_resolutions(json: &str) -> Result<Resolutions> {
    let raw: BTreeMap<String, BTreeMap<String, Resolution>> = serde_json::from_str(json)
        .map_err(|e| Error::validation(format!("invalid resolutions document: {e}")))?;

    let mut resolutions = Resolutions::new();
    for (resource, fields) in raw {
        let mut parsed = FieldResolutions::new();
        for (field, resolution) in fields {
            match field.parse::<TrackedField>() {
                Ok(field) => {
                    parsed.insert(field, resolution);
                }
                Err(_) => warn!(resource = %resource, field = %field, "Ignoring resolution for untracked field"),
            }
        }
        resolutions.insert(resource, parsed);
    }
    Ok(resolutions)
}

/// A tracked field that differs between the live and stored version of a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    /// Resource name
    pub resource_name: String,
    /// Differing field
    pub field: TrackedField,
    /// Value reported upstream
    pub live_value: FieldValue,
    /// Value currently stored
    pub stored_value: FieldValue,
    /// Resolution, once chosen
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
}

/// Planned operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOperation {
    /// Insert a new record
    Create,
    /// Overwrite an existing record
    Update,
    /// Remove a record
    Delete,
    /// Leave the record alone
    Skip,
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Skip => "skip",
        };
        f.write_str(name)
    }
}

/// Why the planner chose an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionReason {
    /// Live only
    #[serde(rename = "new resource")]
    NewResource,
    /// Matched and equal
    #[serde(rename = "no changes")]
    NoChanges,
    /// Matched, differing, live wins
    #[serde(rename = "resource updated")]
    ResourceUpdated,
    /// A field was marked manual
    #[serde(rename = "manual resolution required")]
    ManualResolutionRequired,
    /// Resolutions supplied but incomplete
    #[serde(rename = "unresolved conflicts")]
    UnresolvedConflicts,
    /// Stored only
    #[serde(rename = "no longer present upstream")]
    NoLongerPresentUpstream,
}

impl ActionReason {
    /// Reason text
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewResource => "new resource",
            Self::NoChanges => "no changes",
            Self::ResourceUpdated => "resource updated",
            Self::ManualResolutionRequired => "manual resolution required",
            Self::UnresolvedConflicts => "unresolved conflicts",
            Self::NoLongerPresentUpstream => "no longer present upstream",
        }
    }
}

impl fmt::Display for ActionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One planned operation for one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncAction {
    /// Operation
    pub operation: SyncOperation,
    /// Provider resource id
    pub resource_id: String,
    /// Resource name
    pub resource_name: String,
    /// Resource category
    pub resource_type: ServiceType,
    /// Why
    pub reason: ActionReason,
    /// Conflicts behind an update or a blocked skip
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<Conflict>,
}

impl SyncAction {
    /// Action without conflicts
    pub fn new(operation: SyncOperation, resource: &Resource, reason: ActionReason) -> Self {
        Self {
            operation,
            resource_id: resource.id.clone(),
            resource_name: resource.name.clone(),
            resource_type: resource.resource_type,
            reason,
            conflicts: Vec::new(),
        }
    }

    /// Attach conflicts
    pub fn with_conflicts(mut self, conflicts: Vec<Conflict>) -> Self {
        self.conflicts = conflicts;
        self
    }
}

/// Kind of run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncType {
    /// Plain reconciliation
    Full,
    /// Reconciliation driven by operator resolutions
    ConflictResolution,
}

impl fmt::Display for SyncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => f.write_str("full"),
            Self::ConflictResolution => f.write_str("conflict-resolution"),
        }
    }
}

/// Surface that triggered a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerSource {
    /// Dashboard button
    UiButton,
    /// Dashboard streaming log
    UiStream,
    /// HTTP API
    Api,
    /// Automation script
    Script,
    /// Scheduler
    Scheduled,
    /// Command line
    #[default]
    Cli,
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::UiButton => "ui-button",
            Self::UiStream => "ui-stream",
            Self::Api => "api",
            Self::Script => "script",
            Self::Scheduled => "scheduled",
            Self::Cli => "cli",
        };
        f.write_str(name)
    }
}

/// Overall outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// No action errored
    Success,
    /// Some but not all actions errored
    Partial,
    /// Every action errored
    Failed,
}

impl RunStatus {
    /// Classify from the error and action counts
    pub fn classify(error_count: usize, action_count: usize) -> Self {
        if error_count == 0 {
            Self::Success
        } else if error_count < action_count {
            Self::Partial
        } else {
            Self::Failed
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Counters for one run
///
/// An errored action lands in none of the per-operation counters, so
/// `resources_processed` equals created + updated + deleted + skipped + the
/// number of errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    /// Actions processed (equals the plan length)
    pub resources_processed: usize,
    /// Successful creates
    pub resources_created: usize,
    /// Successful updates
    pub resources_updated: usize,
    /// Successful deletes
    pub resources_deleted: usize,
    /// Skips, blocked conflicts and lookup misses
    pub resources_skipped: usize,
    /// Conflicts found by the planner
    pub conflicts_detected: usize,
    /// Conflicts carrying a resolution on update actions
    pub conflicts_resolved: usize,
    /// Wall time of the run
    pub duration_ms: u64,
}

/// Immutable history entry written once per run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRecord {
    /// `sync-<unix millis>`
    pub id: String,
    /// `YYYY-MM-DD` of `timestamp`
    pub date: String,
    /// Start of the run
    pub timestamp: DateTime<Utc>,
    /// Kind of run
    pub sync_type: SyncType,
    /// Trigger surface
    pub source: TriggerSource,
    /// Operator, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Outcome
    pub status: RunStatus,
    /// Counters
    pub stats: RunStats,
    /// Per-action error messages
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    /// Human readable summary
    pub details: String,
}

impl SyncRecord {
    /// History id for a run started at `timestamp`
    pub fn id_for(timestamp: DateTime<Utc>) -> String {
        format!("sync-{}", timestamp.timestamp_millis())
    }
}
