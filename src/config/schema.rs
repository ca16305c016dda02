//! TOML schema of the settings file.
//!
//! ```toml
//! data_dir = "/var/lib/crowbar"
//! lock_dir = "/run/crowbar/locks"
//! lock_timeout_secs = 30
//! repos_root = "/srv/tftpboot"
//! repos_catalog = "/etc/crowbar/catalog.yml"   # omit for the bundled catalog
//! repos_override = "/etc/crowbar/repos.yml"
//! admin_address = "192.168.124.10"
//! web_port = 8091
//! revision_policy = "warn"                     # or "reject"
//! optional_platforms = ["suse-12.0"]
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Name of the settings file inside the config directory.
pub const SETTINGS_FILE_NAME: &str = "config.toml";

/// Contents of the settings file. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Root of the file backend
    pub data_dir: Option<PathBuf>,

    /// Directory holding the cross-process lock files
    pub lock_dir: Option<PathBuf>,

    /// How long a save waits for a role lock
    pub lock_timeout_secs: Option<u64>,

    /// Root of the local repository mirrors
    pub repos_root: Option<PathBuf>,

    /// Repository catalog file (defaults to the bundled catalog)
    pub repos_catalog: Option<PathBuf>,

    /// Host-local repository override file
    pub repos_override: Option<PathBuf>,

    /// Address of the admin node serving the mirrors
    pub admin_address: Option<String>,

    /// Port of the admin node's web server
    pub web_port: Option<u16>,

    /// "warn" or "reject"
    pub revision_policy: Option<String>,

    /// Platforms whose repositories are all optional
    pub optional_platforms: Option<Vec<String>>,
}

impl Settings {
    /// Parse a settings document.
    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Read a settings file. A missing file yields empty settings.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

/// `<config_dir>/crowbar/config.toml`, if the platform has a config directory.
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("crowbar").join(SETTINGS_FILE_NAME))
}

/// `<data_dir>/crowbar`.
pub fn default_data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|d| d.join("crowbar"))
        .ok_or_else(|| Error::Other("Could not determine data directory".to_string()))
}
