use super::{Output, json_string, yes_no};
use crate::repository::{
    ActiveRepositories, DataBagEntry, RepoFilter, Repository, RepositoryRegistry, RequiredLevel,
};
use crate::{Error, Result};
use serde::Serialize;

/// One line of `repo list`.
#[derive(Serialize)]
pub struct RepoSummary {
    pub platform: String,
    pub id: String,
    pub name: String,
    pub url: String,
    pub required: RequiredLevel,
    pub remote: bool,
    pub available: bool,
    pub active: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<String>,
}

impl RepoSummary {
    fn new(repo: &Repository, active: &ActiveRepositories) -> Self {
        Self {
            platform: repo.platform().to_string(),
            id: repo.id().to_string(),
            name: repo.name().to_string(),
            url: repo.url(),
            required: repo.required(),
            remote: repo.is_remote(),
            available: repo.is_available(),
            active: repo.is_active(active),
            features: repo.config().features.clone(),
        }
    }
}

#[derive(Serialize)]
pub struct RepoList {
    pub repos: Vec<RepoSummary>,
    pub count: usize,
}

impl Output for RepoList {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        if self.repos.is_empty() {
            return "No repositories found.".to_string();
        }
        let mut lines = vec![format!("{} repositories:", self.count)];
        let mut platform = "";
        for repo in &self.repos {
            if repo.platform != platform {
                platform = &repo.platform;
                lines.push(format!("  {}", platform));
            }
            let mut flags = vec![repo.required.as_str()];
            if repo.available {
                flags.push("available");
            } else {
                flags.push("missing");
            }
            if repo.active {
                flags.push("active");
            }
            lines.push(format!("    {} [{}] {}", repo.id, flags.join(", "), repo.url));
        }
        lines.join("\n")
    }
}

/// Repositories matching the platform and name filters, with availability.
pub fn repo_list(
    registry: &RepositoryRegistry,
    active: &ActiveRepositories,
    filter: &RepoFilter,
) -> Result<RepoList> {
    let repos: Vec<RepoSummary> = registry
        .enumerate(filter)
        .iter()
        .map(|repo| RepoSummary::new(repo, active))
        .collect();
    Ok(RepoList {
        count: repos.len(),
        repos,
    })
}

/// Every validation check of one repository.
#[derive(Serialize)]
pub struct RepoCheck {
    pub platform: String,
    pub id: String,
    pub name: String,
    pub url: String,
    pub required: RequiredLevel,
    pub remote: bool,
    pub exists: bool,
    pub valid_repo: bool,
    pub valid_key_file: bool,
    pub available: bool,
    pub active: bool,
    pub data_bag_entry: DataBagEntry,
}

impl Output for RepoCheck {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        [
            format!("Repository: {}/{} ({})", self.platform, self.id, self.name),
            format!("  URL: {}", self.url),
            format!("  Required: {}", self.required),
            format!("  Remote: {}", yes_no(self.remote)),
            format!("  Exists: {}", yes_no(self.exists)),
            format!("  Valid metadata tag: {}", yes_no(self.valid_repo)),
            format!("  Valid key file: {}", yes_no(self.valid_key_file)),
            format!("  Available: {}", yes_no(self.available)),
            format!("  Active: {}", yes_no(self.active)),
        ]
        .join("\n")
    }
}

/// Check one repository. An unknown `(platform, id)` is an error.
pub fn repo_check(
    registry: &RepositoryRegistry,
    active: &ActiveRepositories,
    platform: &str,
    id: &str,
) -> Result<RepoCheck> {
    let repo = registry
        .get(platform, id)
        .ok_or_else(|| Error::NotFound(format!("repository {}/{}", platform, id)))?;
    Ok(RepoCheck {
        platform: repo.platform().to_string(),
        id: repo.id().to_string(),
        name: repo.name().to_string(),
        url: repo.url(),
        required: repo.required(),
        remote: repo.is_remote(),
        exists: repo.exists(),
        valid_repo: repo.is_valid_repo(),
        valid_key_file: repo.is_valid_key_file(),
        available: repo.is_available(),
        active: repo.is_active(active),
        data_bag_entry: repo.to_data_bag_entry(),
    })
}

#[derive(Serialize)]
pub struct FeatureStatus {
    pub feature: String,
    pub platform: Option<String>,
    pub enabled: bool,
    /// `<platform>/<id>` of every repository declaring the feature
    pub providers: Vec<String>,
}

impl Output for FeatureStatus {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        let scope = self.platform.as_deref().unwrap_or("any platform");
        let state = if self.enabled { "enabled" } else { "not enabled" };
        if self.providers.is_empty() {
            format!("Feature {} is {} on {} (no repository provides it)", self.feature, state, scope)
        } else {
            format!(
                "Feature {} is {} on {} (provided by {})",
                self.feature,
                state,
                scope,
                self.providers.join(", ")
            )
        }
    }
}

/// Whether a feature is enabled, and which repositories provide it.
pub fn repo_feature(
    registry: &RepositoryRegistry,
    active: &ActiveRepositories,
    feature: &str,
    platform: Option<&str>,
) -> Result<FeatureStatus> {
    let mut filter = RepoFilter::new();
    filter.platform = platform.map(str::to_string);
    let providers = registry
        .enumerate(&filter)
        .iter()
        .filter(|repo| repo.config().provides(feature))
        .map(|repo| format!("{}/{}", repo.platform(), repo.id()))
        .collect();
    Ok(FeatureStatus {
        feature: feature.to_string(),
        platform: platform.map(str::to_string),
        enabled: registry.feature_enabled(feature, platform, active),
        providers,
    })
}
