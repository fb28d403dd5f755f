//! Field-by-field comparison of a live resource against its stored record

use invsync_types::{Conflict, FieldValue, Resource, StoredResource, TrackedField};
use serde::{Deserialize, Serialize};

/// One tracked field whose value differs between the two sides
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Difference {
    /// Differing field
    pub field: TrackedField,
    /// Value reported upstream
    pub live_value: FieldValue,
    /// Value currently stored
    pub stored_value: FieldValue,
}

impl Difference {
    /// Turn into an unresolved conflict on `resource_name`
    pub fn into_conflict(self, resource_name: &str) -> Conflict {
        Conflict {
            resource_name: resource_name.to_string(),
            field: self.field,
            live_value: self.live_value,
            stored_value: self.stored_value,
            resolution: None,
        }
    }
}

/// Outcome of [`compare`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    /// No tracked field differs
    pub is_equal: bool,
    /// Differences in tracked-field order
    pub differences: Vec<Difference>,
}

impl Comparison {
    /// Differences as unresolved conflicts on `resource_name`
    pub fn into_conflicts(self, resource_name: &str) -> Vec<Conflict> {
        self.differences
            .into_iter()
            .map(|d| d.into_conflict(resource_name))
            .collect()
    }
}

/// Compare the tracked fields of `live` and `stored`.
///
/// Store-only metadata is ignored. The repository value is compared
/// structurally, everything else by value.
pub fn compare(live: &Resource, stored: &StoredResource) -> Comparison {
    let differences: Vec<Difference> = TrackedField::ALL
        .into_iter()
        .filter_map(|field| {
            let live_value = field.value(live);
            let stored_value = field.value(&stored.resource);
            (live_value != stored_value).then_some(Difference {
                field,
                live_value,
                stored_value,
            })
        })
        .collect();

    Comparison {
        is_equal: differences.is_empty(),
        differences,
    }
}
