//! Filtered listing and summary statistics over any [`ResourceStore`]

use invsync_types::{Environment, ResourceStore, Result, RunStatus, ServiceType, StoredResource};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Filter and pagination for stored resources
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceQuery {
    /// Exact category
    pub resource_type: Option<ServiceType>,
    /// Exact environment
    pub environment: Option<Environment>,
    /// Exact resource group
    pub resource_group: Option<String>,
    /// Exact location
    pub location: Option<String>,
    /// With (`true`) or without (`false`) a linked repository
    pub has_git_repository: Option<bool>,
    /// Page size; everything when unset
    pub limit: Option<usize>,
    /// Items to skip
    pub offset: usize,
}

impl ResourceQuery {
    /// Query matching everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to one category
    pub fn with_type(mut self, resource_type: ServiceType) -> Self {
        self.resource_type = Some(resource_type);
        self
    }

    /// Restrict to one environment
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Page window
    pub fn paginate(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }

    /// Whether a record passes every filter
    pub fn matches(&self, record: &StoredResource) -> bool {
        let r = &record.resource;
        self.resource_type.map_or(true, |t| r.resource_type == t)
            && self.environment.map_or(true, |e| r.environment == e)
            && self
                .resource_group
                .as_ref()
                .map_or(true, |g| &r.resource_group == g)
            && self.location.as_ref().map_or(true, |l| &r.location == l)
            && self
                .has_git_repository
                .map_or(true, |has| r.git_repository.is_some() == has)
    }

    /// Filter, order by name and cut one page out of `records`
    pub fn apply(&self, records: Vec<StoredResource>) -> Page<StoredResource> {
        let mut matching: Vec<StoredResource> =
            records.into_iter().filter(|r| self.matches(r)).collect();
        matching.sort_by(|a, b| a.resource.name.cmp(&b.resource.name));

        let total = matching.len();
        let page_size = self.limit.unwrap_or(total);
        let items: Vec<StoredResource> = matching
            .into_iter()
            .skip(self.offset)
            .take(page_size)
            .collect();

        Page {
            items,
            total,
            page: if page_size == 0 {
                1
            } else {
                self.offset / page_size + 1
            },
            page_size,
            has_more: self.offset.saturating_add(page_size) < total,
        }
    }
}

/// One page of results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// Items on this page
    pub items: Vec<T>,
    /// Matches across all pages
    pub total: usize,
    /// 1-based page number
    pub page: usize,
    /// Page size used
    pub page_size: usize,
    /// Whether more pages follow
    pub has_more: bool,
}

/// Summary of the stored set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    /// Stored resources
    pub total_resources: usize,
    /// Count per category
    pub by_type: BTreeMap<String, usize>,
    /// Count per environment
    pub by_environment: BTreeMap<String, usize>,
    /// Resources with a linked repository
    pub with_git_repository: usize,
    /// Resources without one
    pub without_git_repository: usize,
    /// Start of the last successful run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
    /// Status of that run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_status: Option<RunStatus>,
}

/// Run `query` against the store
pub async fn query_resources(
    store: &dyn ResourceStore,
    query: &ResourceQuery,
) -> Result<Page<StoredResource>> {
    Ok(query.apply(store.get_all().await?))
}

/// Compute [`StoreStats`] from the store contents
pub async fn store_stats(store: &dyn ResourceStore) -> Result<StoreStats> {
    let resources = store.get_all().await?;
    let last_sync = store.last_history(Some(RunStatus::Success)).await?;

    let mut stats = StoreStats {
        total_resources: resources.len(),
        last_sync: last_sync.as_ref().map(|h| h.timestamp),
        last_sync_status: last_sync.map(|h| h.status),
        ..StoreStats::default()
    };
    for record in &resources {
        let r = &record.resource;
        *stats.by_type.entry(r.resource_type.to_string()).or_default() += 1;
        *stats
            .by_environment
            .entry(r.environment.to_string())
            .or_default() += 1;
        if r.git_repository.is_some() {
            stats.with_git_repository += 1;
        }
    }
    stats.without_git_repository = stats.total_resources - stats.with_git_repository;
    Ok(stats)
}
