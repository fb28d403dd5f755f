//! Unified fixtures for InvSync tests and benchmarks
//!
//! Live records are produced the way a real run produces them: a raw listing
//! entry pushed through the normalizer. Stored fixtures are built from those,
//! so a fixture pair with the same name and status compares equal.

use chrono::{DateTime, TimeZone, Utc};
use invsync_provider::{normalize, SnapshotProvider};
use invsync_types::{
    RawProperties, RawResource, RawSnapshot, Resolution, Resolutions, Resource, ResourceStatus,
    Result, StoredResource, Subscription, SyncSource, TrackedField,
};
use std::path::Path;

/// Display name of the fixture subscription; resolves to the dev environment
pub const SUBSCRIPTION_NAME: &str = "team-dev";

/// Subscription every fixture belongs to
pub fn subscription() -> Subscription {
    Subscription {
        id: "00000000-0000-0000-0000-000000000001".to_string(),
        name: SUBSCRIPTION_NAME.to_string(),
        tenant_id: "tenant-1".to_string(),
        state: Some("Enabled".to_string()),
    }
}

/// Raw virtual machine entry whose normalized status is `status`
pub fn raw_vm(name: &str, status: ResourceStatus) -> RawResource {
    let properties = match status {
        ResourceStatus::Running => Some(RawProperties {
            power_state: Some("VM running".to_string()),
            ..RawProperties::default()
        }),
        ResourceStatus::Stopped => Some(RawProperties {
            power_state: Some("VM deallocated".to_string()),
            ..RawProperties::default()
        }),
        ResourceStatus::Available => Some(provisioning("Succeeded")),
        ResourceStatus::Failed => Some(provisioning("Failed")),
        ResourceStatus::Creating => Some(provisioning("Creating")),
        ResourceStatus::Unknown => None,
    };

    RawResource {
        id: format!(
            "/subscriptions/{}/resourceGroups/rg-app/providers/Microsoft.Compute/virtualMachines/{}",
            subscription().id,
            name
        ),
        name: name.to_string(),
        resource_type: "Microsoft.Compute/virtualMachines".to_string(),
        location: "eastus".to_string(),
        tags: None,
        sku: None,
        properties,
        deployment_source: None,
        devops_repository: None,
        resource_group: None,
        kind: None,
        managed_by: None,
        created_time: None,
    }
}

fn provisioning(state: &str) -> RawProperties {
    RawProperties {
        provisioning_state: Some(state.to_string()),
        ..RawProperties::default()
    }
}

/// Normalized live resource
pub fn resource(name: &str, status: ResourceStatus) -> Resource {
    normalize(&raw_vm(name, status), &subscription())
}

/// Instant stamped on stored fixtures
pub fn fixture_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// Stored record written by an earlier automatic run
pub fn stored(name: &str, status: ResourceStatus) -> StoredResource {
    StoredResource::from_live(resource(name, status), SyncSource::Automatic, fixture_time())
}

/// Resolutions map from `(resource, field, resolution)` triples
pub fn resolutions(entries: &[(&str, TrackedField, Resolution)]) -> Resolutions {
    let mut map = Resolutions::new();
    for (name, field, resolution) in entries {
        map.entry((*name).to_string())
            .or_default()
            .insert(*field, *resolution);
    }
    map
}

/// Write a snapshot of `resources` to `path` and return a provider serving it
pub async fn write_snapshot(path: &Path, resources: Vec<RawResource>) -> Result<SnapshotProvider> {
    let provider = SnapshotProvider::new(path);
    provider
        .save(&RawSnapshot {
            subscription: subscription(),
            resources,
            timestamp: Utc::now(),
        })
        .await?;
    Ok(provider)
}

/// Shape of a generated inventory
#[derive(Debug, Clone, Copy)]
pub struct InventoryShape {
    /// Live resources
    pub size: usize,
    /// Every n-th live resource has no stored counterpart
    pub new_every: usize,
    /// Every n-th matched resource changed status upstream
    pub changed_every: usize,
    /// Stored resources with no live counterpart
    pub removed: usize,
}

impl InventoryShape {
    /// Mostly unchanged inventory, a few creates, updates and deletes
    pub fn steady(size: usize) -> Self {
        Self {
            size,
            new_every: 20,
            changed_every: 10,
            removed: size / 50,
        }
    }
}

/// Deterministic live and stored sets following `shape`
pub fn generate_inventory(shape: InventoryShape) -> (Vec<Resource>, Vec<StoredResource>) {
    let mut live = Vec::with_capacity(shape.size);
    let mut stored_set = Vec::with_capacity(shape.size + shape.removed);

    for i in 0..shape.size {
        let name = format!("vm-{i:06}");
        live.push(resource(&name, ResourceStatus::Running));

        if shape.new_every > 0 && i % shape.new_every == 0 {
            continue;
        }
        let stored_status = if shape.changed_every > 0 && i % shape.changed_every == 1 {
            ResourceStatus::Stopped
        } else {
            ResourceStatus::Running
        };
        stored_set.push(stored(&name, stored_status));
    }
    for i in 0..shape.removed {
        stored_set.push(stored(&format!("retired-{i:06}"), ResourceStatus::Stopped));
    }

    (live, stored_set)
}
