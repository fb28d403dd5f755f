//! Provider records before normalization

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Subscription the live set was fetched from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    /// Subscription id
    #[serde(alias = "subscriptionId")]
    pub id: String,
    /// Display name
    #[serde(alias = "subscriptionName")]
    pub name: String,
    /// Directory tenant
    pub tenant_id: String,
    /// Subscription state (Enabled, Disabled...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// `sku` block of a raw record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSku {
    /// SKU name
    #[serde(default)]
    pub name: Option<String>,
    /// SKU tier
    #[serde(default)]
    pub tier: Option<String>,
}

/// `properties.hardwareProfile`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawHardwareProfile {
    /// VM size
    #[serde(default)]
    pub vm_size: Option<String>,
}

/// `properties.repositorySiteConfig` and `deploymentSource`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRepoConfig {
    /// Repository URL
    #[serde(default)]
    pub repo_url: Option<String>,
    /// Branch
    #[serde(default)]
    pub branch: Option<String>,
}

/// Repository information attached by the DevOps enrichment step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDevopsRepository {
    /// Repository URL
    pub url: String,
    /// Branch
    #[serde(default)]
    pub branch: Option<String>,
    /// `TfsGit`, `GitHub`...
    #[serde(default)]
    pub provider: Option<String>,
}

/// The subset of `properties` the normalizer reads
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawProperties {
    /// Provisioning state
    #[serde(default)]
    pub provisioning_state: Option<String>,
    /// VM power state
    #[serde(default)]
    pub power_state: Option<String>,
    /// App Service state
    #[serde(default)]
    pub state: Option<String>,
    /// VM hardware profile
    #[serde(default)]
    pub hardware_profile: Option<RawHardwareProfile>,
    /// App Service creation date
    #[serde(default)]
    pub creation_date: Option<String>,
    /// App Service repository configuration
    #[serde(default)]
    pub repository_site_config: Option<RawRepoConfig>,
}

/// One resource exactly as listed by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawResource {
    /// Full resource id
    pub id: String,
    /// Name
    pub name: String,
    /// Provider type string, e.g. `Microsoft.Compute/virtualMachines`
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Region
    pub location: String,
    /// Tags
    #[serde(default)]
    pub tags: Option<BTreeMap<String, String>>,
    /// SKU
    #[serde(default)]
    pub sku: Option<RawSku>,
    /// Properties
    #[serde(default)]
    pub properties: Option<RawProperties>,
    /// Deployment source
    #[serde(default)]
    pub deployment_source: Option<RawRepoConfig>,
    /// DevOps enrichment
    #[serde(default)]
    pub devops_repository: Option<RawDevopsRepository>,
    /// Resource group, when projected by the query
    #[serde(default)]
    pub resource_group: Option<String>,
    /// Kind
    #[serde(default)]
    pub kind: Option<String>,
    /// Managing resource id
    #[serde(default)]
    pub managed_by: Option<String>,
    /// Creation time
    #[serde(default)]
    pub created_time: Option<String>,
}

/// A full fetch result saved to disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSnapshot {
    /// Subscription
    pub subscription: Subscription,
    /// Resources
    pub resources: Vec<RawResource>,
    /// When the snapshot was taken
    pub timestamp: DateTime<Utc>,
}
