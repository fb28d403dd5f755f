//! Typed parsing of provider output
//!
//! Malformed output is an [`Error::Validation`]: the fetch step cannot
//! produce a live set from it, so the run aborts before touching the store.

use invsync_types::{Error, RawResource, RawSnapshot, Result, Subscription};
use serde::de::DeserializeOwned;

fn parse_json<T: DeserializeOwned>(what: &str, text: &str) -> Result<T> {
    serde_json::from_str(text).map_err(|e| Error::validation(format!("Invalid {what} data: {e}")))
}

fn require_non_empty(what: &str, field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(format!(
            "Invalid {what} data: field '{field}' is empty"
        )));
    }
    Ok(())
}

/// Parse `account show` output
pub fn parse_subscription(text: &str) -> Result<Subscription> {
    let subscription: Subscription = parse_json("account", text)?;
    require_non_empty("account", "id", &subscription.id)?;
    require_non_empty("account", "name", &subscription.name)?;
    require_non_empty("account", "tenantId", &subscription.tenant_id)?;
    Ok(subscription)
}

/// Parse `resource list` output
pub fn parse_resources(text: &str) -> Result<Vec<RawResource>> {
    let resources: Vec<RawResource> = parse_json("resources", text)?;
    for (index, resource) in resources.iter().enumerate() {
        require_non_empty("resources", &format!("[{index}].name"), &resource.name)?;
        require_non_empty("resources", &format!("[{index}].id"), &resource.id)?;
    }
    Ok(resources)
}

/// Parse a saved snapshot document
pub fn parse_snapshot(text: &str) -> Result<RawSnapshot> {
    let snapshot: RawSnapshot = parse_json("snapshot", text)?;
    require_non_empty("snapshot", "subscription.tenantId", &snapshot.subscription.tenant_id)?;
    for (index, resource) in snapshot.resources.iter().enumerate() {
        require_non_empty("snapshot", &format!("resources[{index}].name"), &resource.name)?;
    }
    Ok(snapshot)
}
