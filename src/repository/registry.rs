//! The merged repository registry.
//!
//! A registry is an owned value: it reads its two configuration layers once
//! in [`RepositoryRegistry::load`] and keeps the merged result until
//! [`RepositoryRegistry::reload`] is called. Nothing reloads implicitly.

use super::catalog::{Catalog, RepoConfig, RepoSources, RequiredLevel};
use super::{ActiveRepositories, RepoLayout, Repository};
use crate::Result;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Platforms whose repositories are all treated as optional, whatever their
/// configured level says.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequiredPolicy {
    optional_platforms: BTreeSet<String>,
}

impl RequiredPolicy {
    pub fn new<I, S>(optional_platforms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            optional_platforms: optional_platforms.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether repositories of `platform` are forced to optional.
    pub fn downgrades(&self, platform: &str) -> bool {
        self.optional_platforms.contains(platform)
    }

    pub fn optional_platforms(&self) -> impl Iterator<Item = &str> {
        self.optional_platforms.iter().map(String::as_str)
    }
}

/// Selection for [`RepositoryRegistry::enumerate`]. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoFilter {
    pub platform: Option<String>,
    /// Repository name (the mirror directory name, not the id)
    pub name: Option<String>,
}

impl RepoFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    fn matches(&self, repo: &Repository) -> bool {
        self.platform.as_deref().is_none_or(|p| p == repo.platform())
            && self.name.as_deref().is_none_or(|n| n == repo.name())
    }
}

/// Per-platform repositories merged from the catalog and the local override.
#[derive(Debug, Clone)]
pub struct RepositoryRegistry {
    sources: RepoSources,
    layout: Arc<RepoLayout>,
    policy: RequiredPolicy,
    catalog: Catalog,
}

impl RepositoryRegistry {
    /// Read and merge both layers.
    pub fn load(sources: RepoSources, layout: RepoLayout, policy: RequiredPolicy) -> Result<Self> {
        let catalog = sources.read()?;
        tracing::debug!(
            "Loaded {} repository platforms from {}",
            catalog.len(),
            sources.catalog
        );
        Ok(Self {
            sources,
            layout: Arc::new(layout),
            policy,
            catalog,
        })
    }

    /// Re-read both layers. On failure the previous state is kept.
    pub fn reload(&mut self) -> Result<()> {
        self.catalog = self.sources.read()?;
        Ok(())
    }

    pub fn sources(&self) -> &RepoSources {
        &self.sources
    }

    pub fn layout(&self) -> &RepoLayout {
        &self.layout
    }

    pub fn policy(&self) -> &RequiredPolicy {
        &self.policy
    }

    /// All platforms, sorted.
    pub fn platforms(&self) -> Vec<&str> {
        self.catalog.keys().map(String::as_str).collect()
    }

    /// Repository ids of a platform, sorted. Unknown platforms have none.
    pub fn repositories(&self, platform: &str) -> Vec<&str> {
        self.catalog
            .get(platform)
            .map(|p| p.repos.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Merged configuration of one repository, before policy is applied.
    pub fn config(&self, platform: &str, id: &str) -> Option<&RepoConfig> {
        self.catalog.get(platform)?.repos.get(id)
    }

    /// Build the repository `(platform, id)`, with policy applied.
    pub fn get(&self, platform: &str, id: &str) -> Option<Repository> {
        let config = self.config(platform, id)?;
        let mut repo = Repository::new(platform, id, config.clone(), self.layout.clone());
        if self.policy.downgrades(platform) {
            repo.set_required(RequiredLevel::Optional);
        }
        Some(repo)
    }

    /// Repositories matching `filter`, ordered by platform then id.
    pub fn enumerate(&self, filter: &RepoFilter) -> Vec<Repository> {
        self.catalog
            .iter()
            .filter(|(platform, _)| filter.platform.as_deref().is_none_or(|p| p == platform.as_str()))
            .flat_map(|(platform, repos)| {
                repos
                    .repos
                    .keys()
                    .filter_map(move |id| self.get(platform, id))
            })
            .filter(|repo| filter.matches(repo))
            .collect()
    }

    /// Every repository of every platform.
    pub fn enumerate_all(&self) -> Vec<Repository> {
        self.enumerate(&RepoFilter::default())
    }

    /// Whether `feature` is provided and enabled.
    ///
    /// For one platform: at least one repository declares the feature and
    /// every declaring repository is active. Without a platform: any
    /// platform qualifies.
    pub fn feature_enabled(
        &self,
        feature: &str,
        platform: Option<&str>,
        active: &ActiveRepositories,
    ) -> bool {
        match platform {
            Some(platform) => self.feature_enabled_on(feature, platform, active),
            None => self
                .catalog
                .keys()
                .any(|platform| self.feature_enabled_on(feature, platform, active)),
        }
    }

    fn feature_enabled_on(&self, feature: &str, platform: &str, active: &ActiveRepositories) -> bool {
        let Some(repos) = self.catalog.get(platform) else {
            return false;
        };
        let mut providers = repos
            .repos
            .iter()
            .filter(|(_, config)| config.provides(feature))
            .peekable();
        if providers.peek().is_none() {
            return false;
        }
        providers.all(|(id, _)| active.contains(platform, id))
    }
}
