//! Repository catalog documents and the two-layer merge.
//!
//! Both the bundled catalog and the host-local override file share one
//! shape: `platform -> {repos: {id -> RepoConfig}}`.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// The catalog shipped with the crate.
pub const BUNDLED_CATALOG: &str = include_str!("../../config/repos.yml");

/// Default location of the host-local override file.
pub const DEFAULT_OVERRIDE_PATH: &str = "/etc/crowbar/repos.yml";

/// How strongly a deployment depends on a repository.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequiredLevel {
    Mandatory,
    Recommended,
    #[default]
    Optional,
}

impl RequiredLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mandatory => "mandatory",
            Self::Recommended => "recommended",
            Self::Optional => "optional",
        }
    }
}

impl fmt::Display for RequiredLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Expected repository metadata, pinning a mirrored repository to a release.
///
/// Unknown keys are rejected so a pin this crate cannot check (such as an
/// `md5` digest) never reads as "no pin".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Integrity {
    /// Expected `tags/repo` value of `repodata/repomd.xml`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    /// Expected SHA-256 (hex) of `repodata/repomd.xml.key`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl Integrity {
    /// Expected tag, ignoring blank values.
    pub fn tag(&self) -> Option<&str> {
        non_blank(self.tag.as_deref())
    }

    /// Expected checksum, ignoring blank values.
    pub fn checksum(&self) -> Option<&str> {
        non_blank(self.checksum.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.tag().is_none() && self.checksum().is_none()
    }
}

/// Configuration of one repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoConfig {
    /// Directory name of the local mirror (defaults to the repository id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Remote location; a repository with a url is not mirrored locally
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<RequiredLevel>,

    #[serde(default, alias = "askOnError", skip_serializing_if = "Option::is_none")]
    pub ask_on_error: Option<bool>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<String>,

    #[serde(default, alias = "repomd", skip_serializing_if = "Integrity::is_empty")]
    pub integrity: Integrity,
}

impl RepoConfig {
    /// Explicit url, ignoring blank values.
    pub fn url(&self) -> Option<&str> {
        non_blank(self.url.as_deref())
    }

    pub fn provides(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }

    /// Apply the fields a local override may change on a catalog repository.
    ///
    /// Everything else, in particular `integrity`, stays as the catalog says.
    pub fn apply_override(&mut self, local: &RepoConfig) {
        if let Some(url) = &local.url {
            self.url = Some(url.clone());
        }
        if let Some(ask_on_error) = local.ask_on_error {
            self.ask_on_error = Some(ask_on_error);
        }
    }
}

/// Repositories of one platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformRepos {
    #[serde(default)]
    pub repos: BTreeMap<String, RepoConfig>,
}

/// A whole catalog: platform -> repositories.
pub type Catalog = BTreeMap<String, PlatformRepos>;

/// Where the authoritative catalog comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogSource {
    /// The catalog compiled into the crate
    Bundled,
    /// A catalog file on disk
    File(PathBuf),
}

impl fmt::Display for CatalogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bundled => write!(f, "bundled"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// The two configuration layers a registry is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSources {
    pub catalog: CatalogSource,
    /// Optional host-local override file
    pub override_path: Option<PathBuf>,
}

impl Default for RepoSources {
    fn default() -> Self {
        Self {
            catalog: CatalogSource::Bundled,
            override_path: Some(PathBuf::from(DEFAULT_OVERRIDE_PATH)),
        }
    }
}

impl RepoSources {
    /// Read both layers and merge them.
    ///
    /// A broken catalog is an error. A missing, unreadable or unparseable
    /// override file is treated as no override.
    pub fn read(&self) -> Result<Catalog> {
        let mut catalog = match &self.catalog {
            CatalogSource::Bundled => parse_catalog(BUNDLED_CATALOG)?,
            CatalogSource::File(path) => parse_catalog(&fs::read_to_string(path)?)?,
        };
        if let Some(path) = &self.override_path {
            if let Some(local) = read_override(path) {
                merge(&mut catalog, local);
            }
        }
        Ok(catalog)
    }
}

/// Parse a catalog document. An empty document is an empty catalog.
pub fn parse_catalog(contents: &str) -> Result<Catalog> {
    if contents.trim().is_empty() {
        return Ok(Catalog::new());
    }
    let catalog: Option<Catalog> = serde_yaml::from_str(contents)?;
    Ok(catalog.unwrap_or_default())
}

/// Read the override file, swallowing every failure.
fn read_override(path: &Path) -> Option<Catalog> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!("Ignoring unreadable repository override {}: {}", path.display(), e);
            return None;
        }
    };
    match parse_catalog(&contents) {
        Ok(catalog) => Some(catalog),
        Err(e) => {
            tracing::warn!("Ignoring malformed repository override {}: {}", path.display(), e);
            None
        }
    }
}

/// Merge a local layer into the catalog.
///
/// - repository in both layers: only `url` and `ask_on_error` are taken from `local`
/// - repository only in `local`: adopted as is
/// - platform only in `local`: adopted as is
pub fn merge(catalog: &mut Catalog, local: Catalog) {
    for (platform, local_platform) in local {
        match catalog.get_mut(&platform) {
            Some(existing) => {
                for (id, repo) in local_platform.repos {
                    match existing.repos.get_mut(&id) {
                        Some(current) => current.apply_override(&repo),
                        None => {
                            existing.repos.insert(id, repo);
                        }
                    }
                }
            }
            None => {
                catalog.insert(platform, local_platform);
            }
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
