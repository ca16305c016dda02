//! Software repositories nodes install from.
//!
//! Repositories come in three trust tiers, expressed by composing the
//! per-repository checks rather than by branching on the tier:
//! - remote (explicit `url`): trusted as configured
//! - mirrored and pinned (`integrity.tag` / `integrity.checksum`): the local
//!   mirror must exist and match the pins
//! - mirrored and unpinned: the local mirror must exist
//!
//! Local mirrors live under `<repos_root>/<platform>/repos/<name>/`, with
//! metadata in `repodata/repomd.xml` and the detached key in
//! `repodata/repomd.xml.key`.

pub mod catalog;
pub mod registry;
pub mod repomd;

pub use catalog::{
    CatalogSource, Integrity, PlatformRepos, RepoConfig, RepoSources, RequiredLevel,
};
pub use registry::{RepoFilter, RepositoryRegistry, RequiredPolicy};

use crate::backend::ConfigBackend;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Data bag listing the repositories enabled on nodes.
pub const ACTIVE_REPOSITORIES_DATA_BAG: &str = "crowbar/repositories";

/// Where local mirrors live and how nodes reach them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoLayout {
    /// Root of the per-platform repository trees (e.g. `/srv/tftpboot`)
    pub repos_root: PathBuf,
    /// Address of the admin node serving the mirrors
    pub admin_address: String,
    /// Port of the admin node's web server
    pub web_port: u16,
}

impl RepoLayout {
    pub fn new(repos_root: impl Into<PathBuf>, admin_address: impl Into<String>, web_port: u16) -> Self {
        Self {
            repos_root: repos_root.into(),
            admin_address: admin_address.into(),
            web_port,
        }
    }

    /// `host:port`, bracketing IPv6 addresses.
    fn authority(&self) -> String {
        if self.admin_address.contains(':') && !self.admin_address.starts_with('[') {
            format!("[{}]:{}", self.admin_address, self.web_port)
        } else {
            format!("{}:{}", self.admin_address, self.web_port)
        }
    }
}

/// Repositories currently enabled on nodes, as published in the
/// [`ACTIVE_REPOSITORIES_DATA_BAG`] data bag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveRepositories {
    enabled: BTreeMap<String, BTreeSet<String>>,
}

impl ActiveRepositories {
    /// Load the published set. Any failure means nothing is active.
    pub fn load(backend: &dyn ConfigBackend) -> Self {
        match backend.load_data_bag(ACTIVE_REPOSITORIES_DATA_BAG) {
            Ok(item) => {
                let enabled = item
                    .into_iter()
                    .filter_map(|(platform, repos)| {
                        repos
                            .as_object()
                            .map(|repos| (platform, repos.keys().cloned().collect()))
                    })
                    .collect();
                Self { enabled }
            }
            Err(e) => {
                tracing::debug!("No active repositories ({}): {}", ACTIVE_REPOSITORIES_DATA_BAG, e);
                Self::default()
            }
        }
    }

    /// Build from `(platform, id)` pairs.
    pub fn from_pairs<I, P, R>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (P, R)>,
        P: Into<String>,
        R: Into<String>,
    {
        let mut enabled: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (platform, id) in pairs {
            enabled.entry(platform.into()).or_default().insert(id.into());
        }
        Self { enabled }
    }

    pub fn contains(&self, platform: &str, id: &str) -> bool {
        self.enabled.get(platform).is_some_and(|ids| ids.contains(id))
    }

    pub fn is_empty(&self) -> bool {
        self.enabled.values().all(BTreeSet::is_empty)
    }
}

/// What nodes receive for an enabled repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataBagEntry {
    pub name: String,
    pub url: String,
    pub ask_on_error: bool,
}

/// One repository of one platform, with its merged configuration.
#[derive(Debug, Clone)]
pub struct Repository {
    platform: String,
    id: String,
    config: RepoConfig,
    layout: Arc<RepoLayout>,
}

impl Repository {
    pub fn new(platform: &str, id: &str, config: RepoConfig, layout: Arc<RepoLayout>) -> Self {
        Self {
            platform: platform.to_string(),
            id: id.to_string(),
            config,
            layout,
        }
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    /// Mirror directory name.
    pub fn name(&self) -> &str {
        self.config
            .name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.id)
    }

    pub fn required(&self) -> RequiredLevel {
        self.config.required.unwrap_or_default()
    }

    pub fn ask_on_error(&self) -> bool {
        self.config.ask_on_error.unwrap_or(false)
    }

    /// Whether the repository is reached at an explicit url.
    pub fn is_remote(&self) -> bool {
        self.config.url().is_some()
    }

    /// Remote, or a local mirror that exists and matches its pins.
    pub fn is_available(&self) -> bool {
        self.is_remote()
            || (self.check_directory() && self.check_repo_tag() && self.check_key_file())
    }

    /// Remote, or the local mirror directory exists.
    pub fn exists(&self) -> bool {
        self.is_remote() || self.check_directory()
    }

    /// Remote, or the local metadata carries the expected tag (if one is pinned).
    pub fn is_valid_repo(&self) -> bool {
        self.is_remote() || self.check_repo_tag()
    }

    /// Remote, or the local key file has the expected checksum (if one is pinned).
    pub fn is_valid_key_file(&self) -> bool {
        self.is_remote() || self.check_key_file()
    }

    /// Whether nodes currently have this repository enabled.
    pub fn is_active(&self, active: &ActiveRepositories) -> bool {
        active.contains(&self.platform, &self.id)
    }

    /// Explicit url, or the admin node mirror url.
    pub fn url(&self) -> String {
        match self.config.url() {
            Some(url) => url.to_string(),
            None => format!(
                "http://{}/{}/repos/{}/",
                self.layout.authority(),
                self.platform,
                self.name()
            ),
        }
    }

    /// Entry published to nodes for this repository.
    pub fn to_data_bag_entry(&self) -> DataBagEntry {
        DataBagEntry {
            name: self.name().to_string(),
            url: self.url(),
            ask_on_error: self.ask_on_error(),
        }
    }

    /// Local mirror directory.
    pub fn repo_path(&self) -> PathBuf {
        self.repos_path().join(self.name())
    }

    fn repos_path(&self) -> PathBuf {
        self.layout.repos_root.join(&self.platform).join("repos")
    }

    fn repodata_path(&self) -> PathBuf {
        self.repo_path().join("repodata")
    }

    pub(crate) fn set_required(&mut self, level: RequiredLevel) {
        self.config.required = Some(level);
    }

    fn check_directory(&self) -> bool {
        self.repo_path().is_dir()
    }

    fn check_repo_tag(&self) -> bool {
        let Some(expected) = self.config.integrity.tag() else {
            return true;
        };
        let path = self.repodata_path().join("repomd.xml");
        if !path.is_file() {
            return false;
        }
        match repomd::read_repo_tag(&path) {
            Ok(Some(tag)) => tag == expected,
            Ok(None) => false,
            Err(e) => {
                log_check_failure(&path, &e);
                false
            }
        }
    }

    fn check_key_file(&self) -> bool {
        let Some(expected) = self.config.integrity.checksum() else {
            return true;
        };
        let path = self.repodata_path().join("repomd.xml.key");
        if !path.is_file() {
            return false;
        }
        match repomd::file_checksum(&path) {
            Ok(actual) => repomd::checksum_matches(&actual, expected),
            Err(e) => {
                log_check_failure(&path, &e);
                false
            }
        }
    }
}

fn log_check_failure(path: &Path, e: &crate::Error) {
    tracing::debug!("Repository check failed on {}: {}", path.display(), e);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use serde_json::{Map, json};
    use std::fs;
    use tempfile::TempDir;

    const REPOMD_T: &str = "<repomd><tags><repo>T</repo></tags></repomd>";

    fn layout(root: &Path) -> Arc<RepoLayout> {
        Arc::new(RepoLayout::new(root, "192.168.124.10", 8091))
    }

    fn local_repo(root: &Path, tag: Option<&str>, checksum: Option<&str>) -> Repository {
        let config = RepoConfig {
            name: Some("SLES12-Pool".to_string()),
            integrity: Integrity {
                tag: tag.map(str::to_string),
                checksum: checksum.map(str::to_string),
            },
            ..Default::default()
        };
        Repository::new("suse-12.0", "SLES12-Pool", config, layout(root))
    }

    fn write_repodata(repo: &Repository, file: &str, contents: &str) {
        let dir = repo.repo_path().join("repodata");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(file), contents).unwrap();
    }

    #[test]
    fn test_remote_repo_is_available_without_directory() {
        let temp_dir = TempDir::new().unwrap();
        let config = RepoConfig {
            url: Some("http://mirror.example.com/sles12/".to_string()),
            integrity: Integrity {
                tag: Some("T".to_string()),
                checksum: Some("abc".to_string()),
            },
            ..Default::default()
        };
        let repo = Repository::new("suse-12.0", "SLES12-Pool", config, layout(temp_dir.path()));
        assert!(repo.is_remote());
        assert!(repo.exists());
        assert!(repo.is_valid_repo());
        assert!(repo.is_valid_key_file());
        assert!(repo.is_available());
        assert_eq!(repo.url(), "http://mirror.example.com/sles12/");
    }

    #[test]
    fn test_unpinned_local_repo_needs_directory() {
        let temp_dir = TempDir::new().unwrap();
        let repo = local_repo(temp_dir.path(), None, None);
        assert!(!repo.exists());
        assert!(!repo.is_available());
        assert!(repo.is_valid_repo());
        assert!(repo.is_valid_key_file());

        fs::create_dir_all(repo.repo_path()).unwrap();
        assert!(repo.exists());
        assert!(repo.is_available());
    }

    #[test]
    fn test_tag_check() {
        let temp_dir = TempDir::new().unwrap();
        let repo = local_repo(temp_dir.path(), Some("T"), None);
        fs::create_dir_all(repo.repo_path()).unwrap();

        // metadata missing
        assert!(!repo.is_valid_repo());
        assert!(!repo.is_available());

        write_repodata(&repo, "repomd.xml", REPOMD_T);
        assert!(repo.is_valid_repo());
        assert!(repo.is_available());

        write_repodata(&repo, "repomd.xml", "<repomd><tags><repo>OTHER</repo></tags></repomd>");
        assert!(!repo.is_valid_repo());
        assert!(!repo.is_available());
    }

    #[test]
    fn test_malformed_metadata_fails_check() {
        let temp_dir = TempDir::new().unwrap();
        let repo = local_repo(temp_dir.path(), Some("T"), None);
        write_repodata(&repo, "repomd.xml", "<repomd><tags></repo>");
        assert!(!repo.is_valid_repo());
        write_repodata(&repo, "repomd.xml", "<repomd/>");
        assert!(!repo.is_valid_repo());
    }

    #[test]
    fn test_key_file_check() {
        let temp_dir = TempDir::new().unwrap();
        let checksum = "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03";
        let repo = local_repo(temp_dir.path(), None, Some(checksum));
        fs::create_dir_all(repo.repo_path()).unwrap();
        assert!(!repo.is_valid_key_file());

        write_repodata(&repo, "repomd.xml.key", "hello\n");
        assert!(repo.is_valid_key_file());
        assert!(repo.is_available());

        write_repodata(&repo, "repomd.xml.key", "tampered\n");
        assert!(!repo.is_valid_key_file());
        assert!(!repo.is_available());
    }

    #[test]
    fn test_mirror_url() {
        let temp_dir = TempDir::new().unwrap();
        let repo = local_repo(temp_dir.path(), None, None);
        assert_eq!(repo.url(), "http://192.168.124.10:8091/suse-12.0/repos/SLES12-Pool/");

        let v6 = Repository::new(
            "suse-12.0",
            "SLES12-Pool",
            RepoConfig::default(),
            Arc::new(RepoLayout::new(temp_dir.path(), "fd00::1", 8091)),
        );
        assert_eq!(v6.url(), "http://[fd00::1]:8091/suse-12.0/repos/SLES12-Pool/");
    }

    #[test]
    fn test_name_and_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let repo = Repository::new("p", "repo-id", RepoConfig::default(), layout(temp_dir.path()));
        assert_eq!(repo.name(), "repo-id");
        assert_eq!(repo.required(), RequiredLevel::Optional);
        assert!(!repo.ask_on_error());
        assert_eq!(
            repo.to_data_bag_entry(),
            DataBagEntry {
                name: "repo-id".to_string(),
                url: "http://192.168.124.10:8091/p/repos/repo-id/".to_string(),
                ask_on_error: false,
            }
        );
    }

    #[test]
    fn test_active_repositories_from_data_bag() {
        let backend = MemoryBackend::new();
        let mut item = Map::new();
        item.insert("id".to_string(), json!("repositories"));
        item.insert("suse-12.0".to_string(), json!({"SLES12-Pool": {"url": "x"}}));
        backend.put_data_bag(ACTIVE_REPOSITORIES_DATA_BAG, item).unwrap();

        let active = ActiveRepositories::load(&backend);
        assert!(active.contains("suse-12.0", "SLES12-Pool"));
        assert!(!active.contains("suse-12.0", "SLES12-Updates"));
        assert!(!active.contains("id", "repositories"));
    }

    #[test]
    fn test_active_repositories_failure_is_empty() {
        let backend = MemoryBackend::new();
        assert!(ActiveRepositories::load(&backend).is_empty());
        backend.set_offline(true);
        assert!(ActiveRepositories::load(&backend).is_empty());
    }

    #[test]
    fn test_is_active() {
        let temp_dir = TempDir::new().unwrap();
        let repo = local_repo(temp_dir.path(), None, None);
        assert!(repo.is_active(&ActiveRepositories::from_pairs([("suse-12.0", "SLES12-Pool")])));
        assert!(!repo.is_active(&ActiveRepositories::from_pairs([("suse-11.3", "SLES12-Pool")])));
    }
}
