//! Normalized and stored resource records

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Category of a cloud resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ServiceType {
    /// Compute virtual machine
    #[serde(rename = "Virtual Machine")]
    VirtualMachine,
    /// SQL database
    #[serde(rename = "SQL Database")]
    SqlDatabase,
    /// Storage account
    #[serde(rename = "Storage Account")]
    StorageAccount,
    /// Virtual network
    #[serde(rename = "Virtual Network")]
    VirtualNetwork,
    /// Key vault
    #[serde(rename = "Key Vault")]
    KeyVault,
    /// Web app / function app
    #[serde(rename = "App Service")]
    AppService,
    /// Document database account
    #[serde(rename = "Cosmos DB")]
    CosmosDb,
    /// CDN profile
    #[serde(rename = "CDN Profile")]
    CdnProfile,
    /// Load balancer
    #[serde(rename = "Load Balancer")]
    LoadBalancer,
    /// Anything without a dedicated category
    Other,
}

impl ServiceType {
    /// Every category, in display order
    pub const ALL: [Self; 10] = [
        Self::VirtualMachine,
        Self::SqlDatabase,
        Self::StorageAccount,
        Self::VirtualNetwork,
        Self::KeyVault,
        Self::AppService,
        Self::CosmosDb,
        Self::CdnProfile,
        Self::LoadBalancer,
        Self::Other,
    ];

    /// Human readable name, identical to the serialized form
    pub fn as_str(self) -> &'static str {
        match self {
            Self::VirtualMachine => "Virtual Machine",
            Self::SqlDatabase => "SQL Database",
            Self::StorageAccount => "Storage Account",
            Self::VirtualNetwork => "Virtual Network",
            Self::KeyVault => "Key Vault",
            Self::AppService => "App Service",
            Self::CosmosDb => "Cosmos DB",
            Self::CdnProfile => "CDN Profile",
            Self::LoadBalancer => "Load Balancer",
            Self::Other => "Other",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::validation(format!("unknown resource type '{s}'")))
    }
}

/// Normalized runtime status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    /// Running
    Running,
    /// Stopped or deallocated
    Stopped,
    /// Provisioned and usable
    Available,
    /// Being created or updated
    Creating,
    /// Provisioning failed
    Failed,
    /// No usable state information
    #[default]
    Unknown,
}

impl ResourceStatus {
    /// Serialized name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Available => "available",
            Self::Creating => "creating",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Environment derived from the subscription name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Production subscription
    Production,
    /// Development subscription
    Development,
    /// Could not be derived
    #[default]
    Unknown,
}

impl Environment {
    /// Serialized name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Development => "development",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "development" | "dev" => Ok(Self::Development),
            "unknown" => Ok(Self::Unknown),
            other => Err(Error::validation(format!("unknown environment '{other}'"))),
        }
    }
}

/// Pricing tier of a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sku {
    /// SKU name (or VM size)
    pub name: String,
    /// Optional tier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
}

/// Hosting service of a linked git repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GitProvider {
    /// github.com
    Github,
    /// gitlab.com
    Gitlab,
    /// Azure DevOps / Visual Studio Team Services
    Azuredevops,
    /// Anything else
    Other,
}

/// Git repository linked to a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitRepository {
    /// Clone or browse URL
    pub url: String,
    /// Deployed branch, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Hosting service, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<GitProvider>,
}

/// A normalized resource as produced by one fetch cycle.
///
/// Records are replaced wholesale on every fetch; `name` is the natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// Provider resource id
    pub id: String,
    /// Unique name, used as the store key
    pub name: String,
    /// Category
    #[serde(rename = "type")]
    pub resource_type: ServiceType,
    /// Resource group
    pub resource_group: String,
    /// Region
    pub location: String,
    /// Subscription display name
    pub subscription: String,
    /// Normalized status
    pub status: ResourceStatus,
    /// Raw provisioning state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
    /// Raw power state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_state: Option<String>,
    /// Pricing tier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<Sku>,
    /// Tags as "key:value" strings
    #[serde(default)]
    pub tags: Vec<String>,
    /// Tags as reported by the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_tags: Option<BTreeMap<String, String>>,
    /// Derived environment
    pub environment: Environment,
    /// Deep link into the cloud portal
    pub portal_url: String,
    /// Provider specific kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Id of the managing resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed_by: Option<String>,
    /// Creation date as reported upstream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<String>,
    /// Linked git repository
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_repository: Option<GitRepository>,
}

impl Resource {
    /// Minimal record with the given name; everything else is empty/unknown.
    ///
    /// Mostly useful to build fixtures.
    pub fn named<S: Into<String>>(name: S) -> Self {
        let name = name.into();
        Self {
            id: format!("/resources/{name}"),
            name,
            resource_type: ServiceType::Other,
            resource_group: String::new(),
            location: String::new(),
            subscription: String::new(),
            status: ResourceStatus::Unknown,
            provisioning_state: None,
            power_state: None,
            sku: None,
            tags: Vec::new(),
            raw_tags: None,
            environment: Environment::Unknown,
            portal_url: String::new(),
            kind: None,
            managed_by: None,
            created_date: None,
            git_repository: None,
        }
    }
}

/// Who or what produced a stored record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncSource {
    /// Triggered by an operator
    #[default]
    Manual,
    /// Triggered on a schedule
    Automatic,
    /// Triggered by a script
    Script,
}

impl fmt::Display for SyncSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Manual => "manual",
            Self::Automatic => "automatic",
            Self::Script => "script",
        };
        f.write_str(name)
    }
}

impl FromStr for SyncSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "manual" => Ok(Self::Manual),
            "automatic" => Ok(Self::Automatic),
            "script" => Ok(Self::Script),
            other => Err(Error::validation(format!("unknown sync source '{other}'"))),
        }
    }
}

/// A resource as persisted in the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredResource {
    /// Business fields
    #[serde(flatten)]
    pub resource: Resource,
    /// First time the record was written
    pub created_in_store_at: DateTime<Utc>,
    /// Last time the record was written
    pub updated_in_store_at: DateTime<Utc>,
    /// Last sync run that touched the record
    pub last_synced_at: DateTime<Utc>,
    /// Origin of the last write
    pub sync_source: SyncSource,
}

impl StoredResource {
    /// Build a fresh stored record from a live one, all timestamps set to `now`
    pub fn from_live(resource: Resource, source: SyncSource, now: DateTime<Utc>) -> Self {
        Self {
            resource,
            created_in_store_at: now,
            updated_in_store_at: now,
            last_synced_at: now,
            sync_source: source,
        }
    }

    /// Store key
    pub fn name(&self) -> &str {
        &self.resource.name
    }

    /// Drop the persistence metadata
    pub fn into_resource(self) -> Resource {
        self.resource
    }

    /// Check the constraints a record must satisfy before it is persisted
    pub fn validate(&self) -> Result<()> {
        let r = &self.resource;
        let required = [
            ("name", &r.name),
            ("resourceGroup", &r.resource_group),
            ("location", &r.location),
            ("subscription", &r.subscription),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(Error::validation(format!(
                    "{}: field '{field}' must not be empty",
                    display_name(&r.name)
                )));
            }
        }
        if !r.portal_url.starts_with("https://") {
            return Err(Error::validation(format!(
                "{}: portalUrl must be an https URL",
                r.name
            )));
        }
        Ok(())
    }
}

fn display_name(name: &str) -> &str {
    if name.trim().is_empty() {
        "<unnamed>"
    } else {
        name
    }
}
