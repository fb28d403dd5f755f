//! Turn raw provider records into normalized [`Resource`]s
//!
//! Everything here is pure and deterministic: the same raw record and
//! subscription always produce the same resource.

use invsync_types::{
    Environment, GitProvider, GitRepository, RawResource, Resource, ResourceStatus, ServiceType,
    Sku, Subscription,
};
use std::collections::BTreeMap;

const RESOURCE_TYPES: [(&str, ServiceType); 9] = [
    ("Microsoft.Compute/virtualMachines", ServiceType::VirtualMachine),
    ("Microsoft.Sql/servers/databases", ServiceType::SqlDatabase),
    ("Microsoft.Storage/storageAccounts", ServiceType::StorageAccount),
    ("Microsoft.Network/virtualNetworks", ServiceType::VirtualNetwork),
    ("Microsoft.KeyVault/vaults", ServiceType::KeyVault),
    ("Microsoft.Web/sites", ServiceType::AppService),
    ("Microsoft.DocumentDB/databaseAccounts", ServiceType::CosmosDb),
    ("Microsoft.Cdn/profiles", ServiceType::CdnProfile),
    ("Microsoft.Network/loadBalancers", ServiceType::LoadBalancer),
];

const CREATED_TAGS: [&str; 6] = [
    "created",
    "createdDate",
    "dateCreated",
    "Created",
    "CreatedDate",
    "DateCreated",
];

const REPOSITORY_TAGS: [&str; 6] = ["repository", "git", "gitRepository", "Repository", "Git", "repo"];

const BRANCH_TAGS: [&str; 3] = ["branch", "gitBranch", "Branch"];

/// Placeholder repo URL reported for release-pipeline deployments
const PLACEHOLDER_REPO_URL: &str = "VSTSRM";

/// Normalize one raw record in the context of its subscription
pub fn normalize(raw: &RawResource, subscription: &Subscription) -> Resource {
    let props = raw.properties.as_ref();

    Resource {
        id: raw.id.clone(),
        name: raw.name.clone(),
        resource_type: map_resource_type(&raw.resource_type),
        resource_group: raw
            .resource_group
            .clone()
            .filter(|rg| !rg.is_empty())
            .unwrap_or_else(|| extract_resource_group(&raw.id)),
        location: raw.location.clone(),
        subscription: subscription.name.clone(),
        status: normalize_status(raw),
        provisioning_state: props.and_then(|p| p.provisioning_state.clone()),
        power_state: props.and_then(|p| p.power_state.clone().or_else(|| p.state.clone())),
        sku: extract_sku(raw),
        tags: tags_to_list(raw.tags.as_ref()),
        raw_tags: raw.tags.clone(),
        environment: determine_environment(&subscription.name),
        portal_url: portal_url(&raw.id, &subscription.tenant_id),
        kind: raw.kind.clone(),
        managed_by: raw.managed_by.clone(),
        created_date: extract_created_date(raw),
        git_repository: extract_git_repository(raw),
    }
}

/// Normalize a whole listing, preserving order
pub fn normalize_all(raw: &[RawResource], subscription: &Subscription) -> Vec<Resource> {
    raw.iter().map(|r| normalize(r, subscription)).collect()
}

/// Environment from the subscription display name
pub fn determine_environment(subscription_name: &str) -> Environment {
    let lower = subscription_name.to_lowercase();

    if lower.contains("cl-azure-prd") || lower.contains("prd") || lower.contains("prod") {
        Environment::Production
    } else if lower.contains("dev") {
        Environment::Development
    } else {
        Environment::Unknown
    }
}

/// Status from power state, then app state, then provisioning state
pub fn normalize_status(raw: &RawResource) -> ResourceStatus {
    let Some(props) = raw.properties.as_ref() else {
        return ResourceStatus::Unknown;
    };

    if let Some(power_state) = props.power_state.as_deref() {
        let power_state = power_state.to_lowercase();
        if power_state.contains("running") {
            return ResourceStatus::Running;
        }
        if power_state.contains("stopped") || power_state.contains("deallocat") {
            return ResourceStatus::Stopped;
        }
    }

    if let Some(state) = props.state.as_deref() {
        match state.to_lowercase().as_str() {
            "running" => return ResourceStatus::Running,
            "stopped" => return ResourceStatus::Stopped,
            _ => {}
        }
    }

    if let Some(provisioning) = props.provisioning_state.as_deref() {
        match provisioning.to_lowercase().as_str() {
            "succeeded" => return ResourceStatus::Available,
            "failed" => return ResourceStatus::Failed,
            "creating" | "updating" => return ResourceStatus::Creating,
            _ => {}
        }
    }

    ResourceStatus::Unknown
}

/// Category from the provider type string; unmapped types are `Other`
pub fn map_resource_type(provider_type: &str) -> ServiceType {
    RESOURCE_TYPES
        .iter()
        .find(|(name, _)| *name == provider_type)
        .map_or(ServiceType::Other, |(_, service_type)| *service_type)
}

/// Portal deep link: `https://portal.azure.com/#@{tenant}/resource{id}`
pub fn portal_url(resource_id: &str, tenant_id: &str) -> String {
    format!("https://portal.azure.com/#@{tenant_id}/resource{resource_id}")
}

/// Resource group from the `/resourceGroups/<rg>` id segment, `unknown` if absent
pub fn extract_resource_group(resource_id: &str) -> String {
    let mut segments = resource_id.split('/');
    while let Some(segment) = segments.next() {
        if segment.eq_ignore_ascii_case("resourceGroups") {
            if let Some(group) = segments.next().filter(|g| !g.is_empty()) {
                return group.to_string();
            }
        }
    }
    "unknown".to_string()
}

/// Tags as `key:value` strings, ordered by key
pub fn tags_to_list(tags: Option<&BTreeMap<String, String>>) -> Vec<String> {
    tags.map(|tags| tags.iter().map(|(k, v)| format!("{k}:{v}")).collect())
        .unwrap_or_default()
}

fn extract_sku(raw: &RawResource) -> Option<Sku> {
    let name = raw
        .sku
        .as_ref()
        .and_then(|sku| sku.name.clone())
        .or_else(|| {
            raw.properties
                .as_ref()
                .and_then(|p| p.hardware_profile.as_ref())
                .and_then(|hw| hw.vm_size.clone())
        })?;

    Some(Sku {
        name,
        tier: raw.sku.as_ref().and_then(|sku| sku.tier.clone()),
    })
}

fn first_tag<'a>(tags: Option<&'a BTreeMap<String, String>>, keys: &[&str]) -> Option<&'a String> {
    let tags = tags?;
    keys.iter().find_map(|key| tags.get(*key).filter(|v| !v.is_empty()))
}

fn extract_created_date(raw: &RawResource) -> Option<String> {
    raw.properties
        .as_ref()
        .and_then(|p| p.creation_date.clone())
        .or_else(|| raw.created_time.clone())
        .or_else(|| first_tag(raw.tags.as_ref(), &CREATED_TAGS).cloned())
}

fn extract_git_repository(raw: &RawResource) -> Option<GitRepository> {
    let tags = raw.tags.as_ref();

    if let Some(devops) = raw.devops_repository.as_ref().filter(|d| !d.url.is_empty()) {
        let provider = match devops.provider.as_deref() {
            Some("TfsGit") => GitProvider::Azuredevops,
            Some("GitHub") => GitProvider::Github,
            _ => GitProvider::Other,
        };
        return Some(GitRepository {
            url: devops.url.clone(),
            branch: devops.branch.clone(),
            provider: Some(provider),
        });
    }

    let (url, branch) = if let Some(source) = raw
        .deployment_source
        .as_ref()
        .filter(|s| s.repo_url.as_deref().is_some_and(|u| !u.is_empty() && u != PLACEHOLDER_REPO_URL))
    {
        (source.repo_url.clone()?, source.branch.clone())
    } else if let Some(site) = raw
        .properties
        .as_ref()
        .and_then(|p| p.repository_site_config.as_ref())
        .filter(|s| raw.resource_type == "Microsoft.Web/sites" && s.repo_url.is_some())
    {
        (site.repo_url.clone()?, site.branch.clone())
    } else {
        let url = first_tag(tags, &REPOSITORY_TAGS)?.clone();
        (url, first_tag(tags, &BRANCH_TAGS).cloned())
    };

    let provider = infer_git_provider(&url);
    Some(GitRepository {
        url,
        branch,
        provider: Some(provider),
    })
}

/// Hosting service guessed from a repository URL
pub fn infer_git_provider(url: &str) -> GitProvider {
    let lower = url.to_lowercase();
    if lower.contains("github.com") {
        GitProvider::Github
    } else if lower.contains("gitlab.com") {
        GitProvider::Gitlab
    } else if lower.contains("dev.azure.com")
        || lower.contains("visualstudio.com")
        || lower.contains("_git")
    {
        GitProvider::Azuredevops
    } else {
        GitProvider::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use invsync_types::{RawDevopsRepository, RawHardwareProfile, RawProperties, RawRepoConfig, RawSku};
    use rstest::rstest;

    const VM_ID: &str =
        "/subscriptions/0000/resourceGroups/RG-Core/providers/Microsoft.Compute/virtualMachines/vm-01";

    fn subscription(name: &str) -> Subscription {
        Subscription {
            id: "0000".to_string(),
            name: name.to_string(),
            tenant_id: "tenant-1".to_string(),
            state: None,
        }
    }

    fn raw(resource_type: &str) -> RawResource {
        RawResource {
            id: VM_ID.to_string(),
            name: "vm-01".to_string(),
            resource_type: resource_type.to_string(),
            location: "eastus".to_string(),
            tags: None,
            sku: None,
            properties: None,
            deployment_source: None,
            devops_repository: None,
            resource_group: None,
            kind: None,
            managed_by: None,
            created_time: None,
        }
    }

    fn with_props(props: RawProperties) -> RawResource {
        RawResource {
            properties: Some(props),
            ..raw("Microsoft.Compute/virtualMachines")
        }
    }

    fn tags(pairs: &[(&str, &str)]) -> Option<BTreeMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        )
    }

    #[rstest]
    #[case("CL-AZURE-PRD", Environment::Production)]
    #[case("payments-prod", Environment::Production)]
    #[case("sub-prd-01", Environment::Production)]
    #[case("team-dev", Environment::Development)]
    #[case("Development", Environment::Development)]
    #[case("sandbox", Environment::Unknown)]
    fn test_determine_environment(#[case] name: &str, #[case] expected: Environment) {
        assert_eq!(determine_environment(name), expected);
    }

    #[rstest]
    #[case(Some("VM running"), None, None, ResourceStatus::Running)]
    #[case(Some("VM deallocated"), None, None, ResourceStatus::Stopped)]
    #[case(Some("VM stopped"), Some("Running"), None, ResourceStatus::Stopped)]
    #[case(Some("VM starting"), Some("Running"), None, ResourceStatus::Running)]
    #[case(None, Some("Stopped"), Some("Succeeded"), ResourceStatus::Stopped)]
    #[case(None, Some("Paused"), Some("Succeeded"), ResourceStatus::Available)]
    #[case(None, None, Some("Failed"), ResourceStatus::Failed)]
    #[case(None, None, Some("Updating"), ResourceStatus::Creating)]
    #[case(None, None, Some("Deleting"), ResourceStatus::Unknown)]
    #[case(None, None, None, ResourceStatus::Unknown)]
    fn test_normalize_status(
        #[case] power_state: Option<&str>,
        #[case] state: Option<&str>,
        #[case] provisioning_state: Option<&str>,
        #[case] expected: ResourceStatus,
    ) {
        let raw = with_props(RawProperties {
            power_state: power_state.map(String::from),
            state: state.map(String::from),
            provisioning_state: provisioning_state.map(String::from),
            ..RawProperties::default()
        });
        assert_eq!(normalize_status(&raw), expected);
    }

    #[rstest]
    #[case("Microsoft.Compute/virtualMachines", ServiceType::VirtualMachine)]
    #[case("Microsoft.Sql/servers/databases", ServiceType::SqlDatabase)]
    #[case("Microsoft.Storage/storageAccounts", ServiceType::StorageAccount)]
    #[case("Microsoft.Network/virtualNetworks", ServiceType::VirtualNetwork)]
    #[case("Microsoft.KeyVault/vaults", ServiceType::KeyVault)]
    #[case("Microsoft.Web/sites", ServiceType::AppService)]
    #[case("Microsoft.DocumentDB/databaseAccounts", ServiceType::CosmosDb)]
    #[case("Microsoft.Cdn/profiles", ServiceType::CdnProfile)]
    #[case("Microsoft.Network/loadBalancers", ServiceType::LoadBalancer)]
    #[case("Microsoft.Network/publicIPAddresses", ServiceType::Other)]
    fn test_map_resource_type(#[case] provider_type: &str, #[case] expected: ServiceType) {
        assert_eq!(map_resource_type(provider_type), expected);
    }

    #[rstest]
    #[case(VM_ID, "RG-Core")]
    #[case("/subscriptions/0000/resourcegroups/lower/providers/x/y/z", "lower")]
    #[case("/subscriptions/0000/providers/x/y/z", "unknown")]
    #[case("", "unknown")]
    fn test_extract_resource_group(#[case] id: &str, #[case] expected: &str) {
        assert_eq!(extract_resource_group(id), expected);
    }

    #[test]
    fn test_normalize_full_record() {
        let mut record = with_props(RawProperties {
            power_state: Some("VM running".to_string()),
            provisioning_state: Some("Succeeded".to_string()),
            hardware_profile: Some(RawHardwareProfile {
                vm_size: Some("Standard_B2s".to_string()),
            }),
            ..RawProperties::default()
        });
        record.tags = tags(&[("team", "core"), ("env", "prd"), ("created", "2024-01-01")]);
        record.kind = Some("vm".to_string());

        let resource = normalize(&record, &subscription("cl-azure-prd"));

        assert_eq!(resource.name, "vm-01");
        assert_eq!(resource.resource_type, ServiceType::VirtualMachine);
        assert_eq!(resource.resource_group, "RG-Core");
        assert_eq!(resource.subscription, "cl-azure-prd");
        assert_eq!(resource.environment, Environment::Production);
        assert_eq!(resource.status, ResourceStatus::Running);
        assert_eq!(resource.power_state.as_deref(), Some("VM running"));
        assert_eq!(resource.provisioning_state.as_deref(), Some("Succeeded"));
        assert_eq!(
            resource.portal_url,
            format!("https://portal.azure.com/#@tenant-1/resource{VM_ID}")
        );
        assert_eq!(resource.tags, vec!["created:2024-01-01", "env:prd", "team:core"]);
        assert_eq!(resource.sku.unwrap().name, "Standard_B2s");
        assert_eq!(resource.created_date.as_deref(), Some("2024-01-01"));
        assert_eq!(resource.kind.as_deref(), Some("vm"));
        assert!(resource.git_repository.is_none());
    }

    #[test]
    fn test_normalize_is_deterministic() {
        let mut record = raw("Microsoft.Web/sites");
        record.tags = tags(&[("b", "2"), ("a", "1")]);
        let sub = subscription("team-dev");

        assert_eq!(normalize(&record, &sub), normalize(&record, &sub));
    }

    #[test]
    fn test_explicit_resource_group_wins() {
        let mut record = raw("Microsoft.Compute/virtualMachines");
        record.resource_group = Some("rg-explicit".to_string());
        assert_eq!(normalize(&record, &subscription("x")).resource_group, "rg-explicit");
    }

    #[test]
    fn test_sku_prefers_sku_block() {
        let mut record = with_props(RawProperties {
            hardware_profile: Some(RawHardwareProfile {
                vm_size: Some("Standard_B2s".to_string()),
            }),
            ..RawProperties::default()
        });
        record.sku = Some(RawSku {
            name: Some("Premium_LRS".to_string()),
            tier: Some("Premium".to_string()),
        });

        let sku = extract_sku(&record).unwrap();
        assert_eq!(sku.name, "Premium_LRS");
        assert_eq!(sku.tier.as_deref(), Some("Premium"));
    }

    #[test]
    fn test_created_date_priority() {
        let mut record = with_props(RawProperties {
            creation_date: Some("2023-05-05".to_string()),
            ..RawProperties::default()
        });
        record.created_time = Some("2022-01-01".to_string());
        record.tags = tags(&[("CreatedDate", "2021-01-01")]);
        assert_eq!(extract_created_date(&record).as_deref(), Some("2023-05-05"));

        record.properties = None;
        assert_eq!(extract_created_date(&record).as_deref(), Some("2022-01-01"));

        record.created_time = None;
        assert_eq!(extract_created_date(&record).as_deref(), Some("2021-01-01"));
    }

    #[test]
    fn test_git_repository_from_devops() {
        let mut record = raw("Microsoft.Web/sites");
        record.devops_repository = Some(RawDevopsRepository {
            url: "https://dev.azure.com/acme/_git/web".to_string(),
            branch: Some("main".to_string()),
            provider: Some("TfsGit".to_string()),
        });
        record.tags = tags(&[("repository", "https://github.com/acme/ignored")]);

        let repo = extract_git_repository(&record).unwrap();
        assert_eq!(repo.url, "https://dev.azure.com/acme/_git/web");
        assert_eq!(repo.provider, Some(GitProvider::Azuredevops));
        assert_eq!(repo.branch.as_deref(), Some("main"));
    }

    #[test]
    fn test_git_repository_ignores_placeholder_deployment_source() {
        let mut record = raw("Microsoft.Web/sites");
        record.deployment_source = Some(RawRepoConfig {
            repo_url: Some("VSTSRM".to_string()),
            branch: None,
        });
        record.properties = Some(RawProperties {
            repository_site_config: Some(RawRepoConfig {
                repo_url: Some("https://gitlab.com/acme/site".to_string()),
                branch: Some("release".to_string()),
            }),
            ..RawProperties::default()
        });

        let repo = extract_git_repository(&record).unwrap();
        assert_eq!(repo.url, "https://gitlab.com/acme/site");
        assert_eq!(repo.provider, Some(GitProvider::Gitlab));
        assert_eq!(repo.branch.as_deref(), Some("release"));
    }

    #[test]
    fn test_site_config_only_applies_to_web_sites() {
        let mut record = raw("Microsoft.Compute/virtualMachines");
        record.properties = Some(RawProperties {
            repository_site_config: Some(RawRepoConfig {
                repo_url: Some("https://github.com/acme/vm".to_string()),
                branch: None,
            }),
            ..RawProperties::default()
        });
        assert!(extract_git_repository(&record).is_none());
    }

    #[test]
    fn test_git_repository_from_tags() {
        let mut record = raw("Microsoft.Storage/storageAccounts");
        record.tags = tags(&[("Repo", "ignored"), ("git", "https://github.com/acme/data"), ("gitBranch", "dev")]);

        let repo = extract_git_repository(&record).unwrap();
        assert_eq!(repo.url, "https://github.com/acme/data");
        assert_eq!(repo.branch.as_deref(), Some("dev"));
        assert_eq!(repo.provider, Some(GitProvider::Github));
    }

    #[rstest]
    #[case("https://github.com/a/b", GitProvider::Github)]
    #[case("https://GitLab.com/a/b", GitProvider::Gitlab)]
    #[case("https://acme.visualstudio.com/p/_git/r", GitProvider::Azuredevops)]
    #[case("ssh://host/_git/r", GitProvider::Azuredevops)]
    #[case("https://bitbucket.org/a/b", GitProvider::Other)]
    fn test_infer_git_provider(#[case] url: &str, #[case] expected: GitProvider) {
        assert_eq!(infer_git_provider(url), expected);
    }
}
