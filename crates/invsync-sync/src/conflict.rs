//! Conflict detection and resolution

use crate::compare::compare;
use chrono::{DateTime, Utc};
use invsync_types::{Conflict, FieldResolutions, Resolution, Resource, StoredResource};
use std::collections::HashMap;
use tracing::debug;

/// Index stored records by name
pub(crate) fn index_by_name(stored: &[StoredResource]) -> HashMap<&str, &StoredResource> {
    stored.iter().map(|r| (r.name(), r)).collect()
}

/// Every tracked-field difference between matched live and stored resources.
///
/// Resources present on one side only produce nothing. Output follows the
/// live set order, then field order within a resource. Every conflict is
/// unresolved.
pub fn detect_conflicts(live: &[Resource], stored: &[StoredResource]) -> Vec<Conflict> {
    let stored_by_name = index_by_name(stored);

    let conflicts: Vec<Conflict> = live
        .iter()
        .filter_map(|resource| {
            stored_by_name
                .get(resource.name.as_str())
                .map(|record| compare(resource, record).into_conflicts(&resource.name))
        })
        .flatten()
        .collect();

    debug!(
        live = live.len(),
        stored = stored.len(),
        conflicts = conflicts.len(),
        "Conflict detection finished"
    );
    conflicts
}

/// Apply per-field resolutions to a copy of `stored`, stamped with the current time.
///
/// See [`apply_resolutions_at`].
pub fn apply_resolutions(
    live: &Resource,
    stored: &StoredResource,
    resolutions: &FieldResolutions,
) -> StoredResource {
    apply_resolutions_at(live, stored, resolutions, Utc::now())
}

/// Apply per-field resolutions to a copy of `stored`.
///
/// `use-live` copies the field from `live`; `use-stored` and `manual` leave it
/// alone. `updated_in_store_at` and `last_synced_at` are set to `now` even if
/// no field changed; `created_in_store_at` and the sync source are kept.
pub fn apply_resolutions_at(
    live: &Resource,
    stored: &StoredResource,
    resolutions: &FieldResolutions,
    now: DateTime<Utc>,
) -> StoredResource {
    let mut resolved = stored.clone();

    for (field, resolution) in resolutions {
        if *resolution == Resolution::UseLive {
            field.copy(live, &mut resolved.resource);
        }
    }

    resolved.updated_in_store_at = now;
    resolved.last_synced_at = now;
    resolved
}
