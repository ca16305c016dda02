//! Precedence resolution for settings.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. `CROWBAR_*` environment variables (see [`env_names`])
//! 2. The settings file (`--config`, `CROWBAR_CONFIG`, or
//!    `~/.config/crowbar/config.toml`)
//! 3. Built-in defaults
//!
//! Defaults may depend on other resolved values: the lock directory defaults
//! to `<data_dir>/locks` whichever source the data directory came from.

use crate::backend::{ConfigBackend, FileBackend};
use crate::barclamp::BarclampCatalog;
use crate::config::schema::{Settings, default_data_dir, default_settings_path};
use crate::lock::LockService;
use crate::repository::catalog::DEFAULT_OVERRIDE_PATH;
use crate::repository::{
    CatalogSource, RepoLayout, RepoSources, RepositoryRegistry, RequiredPolicy,
};
use crate::role::{RevisionPolicy, RoleRegistry};
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Environment variable naming the settings file.
pub const CONFIG_ENV: &str = "CROWBAR_CONFIG";

/// Environment variables overriding individual settings.
pub mod env_names {
    pub const DATA_DIR: &str = "CROWBAR_DATA_DIR";
    pub const LOCK_DIR: &str = "CROWBAR_LOCK_DIR";
    pub const LOCK_TIMEOUT: &str = "CROWBAR_LOCK_TIMEOUT";
    pub const REPOS_ROOT: &str = "CROWBAR_REPOS_ROOT";
    pub const REPOS_CATALOG: &str = "CROWBAR_REPOS_CATALOG";
    pub const REPOS_OVERRIDE: &str = "CROWBAR_REPOS_OVERRIDE";
    pub const ADMIN_ADDRESS: &str = "CROWBAR_ADMIN_ADDRESS";
    pub const WEB_PORT: &str = "CROWBAR_WEB_PORT";
    pub const REVISION_POLICY: &str = "CROWBAR_REVISION_POLICY";

    /// Every variable read during resolution, [`super::CONFIG_ENV`] included.
    pub const ALL: &[&str] = &[
        super::CONFIG_ENV,
        DATA_DIR,
        LOCK_DIR,
        LOCK_TIMEOUT,
        REPOS_ROOT,
        REPOS_CATALOG,
        REPOS_OVERRIDE,
        ADMIN_ADDRESS,
        WEB_PORT,
        REVISION_POLICY,
    ];
}

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_REPOS_ROOT: &str = "/srv/tftpboot";
pub const DEFAULT_ADMIN_ADDRESS: &str = "127.0.0.1";
pub const DEFAULT_WEB_PORT: u16 = 8091;

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Value from environment variable
    EnvVar(String),
    /// Value from the settings file
    File,
    /// Value from CLI flag
    CliFlag,
    /// Built-in default value
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::EnvVar(name) => write!(f, "env:{}", name),
            ValueSource::File => write!(f, "file"),
            ValueSource::CliFlag => write!(f, "cli"),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone)]
pub struct Resolved<T> {
    /// The resolved value
    pub value: T,
    /// Where the value came from
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    /// Create a new resolved value.
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// Fully resolved settings with source tracking.
#[derive(Debug, Clone)]
pub struct ResolvedSettings {
    /// Settings file consulted (it need not exist)
    pub config_path: Option<Resolved<PathBuf>>,
    pub data_dir: Resolved<PathBuf>,
    pub lock_dir: Resolved<PathBuf>,
    pub lock_timeout: Resolved<Duration>,
    pub repos_root: Resolved<PathBuf>,
    pub repos_catalog: Resolved<CatalogSource>,
    pub repos_override: Resolved<PathBuf>,
    pub admin_address: Resolved<String>,
    pub web_port: Resolved<u16>,
    pub revision_policy: Resolved<RevisionPolicy>,
    pub optional_platforms: Resolved<Vec<String>>,
}

impl ResolvedSettings {
    /// Resolve every setting from the environment, the settings file and defaults.
    ///
    /// `config_flag` is the settings file given on the command line, if any.
    pub fn resolve(config_flag: Option<&Path>) -> Result<Self> {
        let config_path = resolve_config_path(config_flag);
        let settings = match &config_path {
            Some(path) => Settings::load(&path.value)?,
            None => Settings::default(),
        };
        Self::from_settings(config_path, settings)
    }

    fn from_settings(config_path: Option<Resolved<PathBuf>>, settings: Settings) -> Result<Self> {
        use env_names::*;

        let data_dir = resolve_value(DATA_DIR, settings.data_dir, parse_path, default_data_dir)?;
        let data_root = data_dir.value.clone();
        let lock_dir = resolve_value(LOCK_DIR, settings.lock_dir, parse_path, || {
            Ok(data_root.join("locks"))
        })?;
        let lock_timeout = resolve_value(
            LOCK_TIMEOUT,
            settings.lock_timeout_secs.map(Duration::from_secs),
            |raw| parse_number::<u64>(LOCK_TIMEOUT, raw).map(Duration::from_secs),
            || Ok(DEFAULT_LOCK_TIMEOUT),
        )?;
        let repos_root = resolve_value(REPOS_ROOT, settings.repos_root, parse_path, || {
            Ok(PathBuf::from(DEFAULT_REPOS_ROOT))
        })?;
        let repos_catalog = resolve_value(
            REPOS_CATALOG,
            settings.repos_catalog.map(CatalogSource::File),
            |raw| Ok(CatalogSource::File(PathBuf::from(raw))),
            || Ok(CatalogSource::Bundled),
        )?;
        let repos_override = resolve_value(REPOS_OVERRIDE, settings.repos_override, parse_path, || {
            Ok(PathBuf::from(DEFAULT_OVERRIDE_PATH))
        })?;
        let admin_address = resolve_value(
            ADMIN_ADDRESS,
            settings.admin_address,
            |raw| Ok(raw.to_string()),
            || Ok(DEFAULT_ADMIN_ADDRESS.to_string()),
        )?;
        let web_port = resolve_value(
            WEB_PORT,
            settings.web_port,
            |raw| parse_number::<u16>(WEB_PORT, raw),
            || Ok(DEFAULT_WEB_PORT),
        )?;
        let file_policy = settings
            .revision_policy
            .as_deref()
            .map(|raw| parse_policy("revision_policy", raw))
            .transpose()?;
        let revision_policy = resolve_value(
            REVISION_POLICY,
            file_policy,
            |raw| parse_policy(REVISION_POLICY, raw),
            || Ok(RevisionPolicy::default()),
        )?;
        let optional_platforms = match settings.optional_platforms {
            Some(platforms) => Resolved::new(platforms, ValueSource::File),
            None => Resolved::new(Vec::new(), ValueSource::Default),
        };

        Ok(Self {
            config_path,
            data_dir,
            lock_dir,
            lock_timeout,
            repos_root,
            repos_catalog,
            repos_override,
            admin_address,
            web_port,
            revision_policy,
            optional_platforms,
        })
    }

    /// Open the file backend at the data directory.
    pub fn backend(&self) -> Result<Arc<FileBackend>> {
        let backend = FileBackend::open(&self.data_dir.value)?;
        tracing::debug!("Using {} backend at {}", backend.backend_type(), backend.location());
        Ok(Arc::new(backend))
    }

    /// Lock service shared by every process using the same lock directory.
    #[cfg(unix)]
    pub fn lock_service(&self) -> Arc<dyn LockService> {
        Arc::new(crate::lock::FileLockService::new(
            &self.lock_dir.value,
            self.lock_timeout.value,
        ))
    }

    /// Lock service for this process only; no cross-process locking here.
    #[cfg(not(unix))]
    pub fn lock_service(&self) -> Arc<dyn LockService> {
        Arc::new(crate::lock::MemoryLockService::new(self.lock_timeout.value))
    }

    /// Role registry on the file backend with the resolved revision policy.
    pub fn roles(&self) -> Result<RoleRegistry> {
        Ok(RoleRegistry::new(self.backend()?, self.lock_service())
            .with_policy(self.revision_policy.value))
    }

    pub fn repo_sources(&self) -> RepoSources {
        RepoSources {
            catalog: self.repos_catalog.value.clone(),
            override_path: Some(self.repos_override.value.clone()),
        }
    }

    pub fn repo_layout(&self) -> RepoLayout {
        RepoLayout::new(
            self.repos_root.value.clone(),
            self.admin_address.value.clone(),
            self.web_port.value,
        )
    }

    pub fn required_policy(&self) -> RequiredPolicy {
        RequiredPolicy::new(self.optional_platforms.value.iter().cloned())
    }

    /// Load the repository registry described by these settings.
    pub fn repositories(&self) -> Result<RepositoryRegistry> {
        RepositoryRegistry::load(self.repo_sources(), self.repo_layout(), self.required_policy())
    }

    pub fn barclamps(&self) -> Result<BarclampCatalog> {
        BarclampCatalog::bundled()
    }
}

/// Settings file: CLI flag > `CROWBAR_CONFIG` > default location.
fn resolve_config_path(config_flag: Option<&Path>) -> Option<Resolved<PathBuf>> {
    if let Some(path) = config_flag {
        return Some(Resolved::new(path.to_path_buf(), ValueSource::CliFlag));
    }
    if let Some(path) = env_value(CONFIG_ENV) {
        return Some(Resolved::new(
            PathBuf::from(path),
            ValueSource::EnvVar(CONFIG_ENV.to_string()),
        ));
    }
    default_settings_path().map(|path| Resolved::new(path, ValueSource::Default))
}

/// Resolve one value: environment > file > default.
fn resolve_value<T>(
    env: &str,
    file: Option<T>,
    parse: impl FnOnce(&str) -> Result<T>,
    default: impl FnOnce() -> Result<T>,
) -> Result<Resolved<T>> {
    if let Some(raw) = env_value(env) {
        return Ok(Resolved::new(parse(&raw)?, ValueSource::EnvVar(env.to_string())));
    }
    if let Some(value) = file {
        return Ok(Resolved::new(value, ValueSource::File));
    }
    Ok(Resolved::new(default()?, ValueSource::Default))
}

/// Non-empty value of an environment variable.
fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_path(raw: &str) -> Result<PathBuf> {
    Ok(PathBuf::from(raw))
}

fn parse_number<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::InvalidInput(format!("{}: not a valid number: {:?}", name, raw)))
}

fn parse_policy(name: &str, raw: &str) -> Result<RevisionPolicy> {
    RevisionPolicy::parse(raw).ok_or_else(|| {
        Error::InvalidInput(format!(
            "{}: expected \"warn\" or \"reject\", got {:?}",
            name, raw
        ))
    })
}
