use super::{Output, json_string};
use crate::config::{Resolved, ResolvedSettings};
use crate::repository::CatalogSource;
use serde::Serialize;
use std::path::Path;

/// One resolved setting.
#[derive(Serialize)]
pub struct ConfigEntry {
    pub key: &'static str,
    pub value: String,
    pub source: String,
}

impl ConfigEntry {
    fn new<T>(key: &'static str, resolved: &Resolved<T>, render: impl Fn(&T) -> String) -> Self {
        Self {
            key,
            value: render(&resolved.value),
            source: resolved.source.to_string(),
        }
    }
}

#[derive(Serialize)]
pub struct ConfigShow {
    pub settings: Vec<ConfigEntry>,
}

impl Output for ConfigShow {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        let width = self.settings.iter().map(|e| e.key.len()).max().unwrap_or(0);
        self.settings
            .iter()
            .map(|e| format!("{:width$}  {}  ({})", e.key, e.value, e.source, width = width))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn path(p: &impl AsRef<Path>) -> String {
    p.as_ref().display().to_string()
}

/// Resolved settings with the source of each value.
pub fn config_show(settings: &ResolvedSettings) -> ConfigShow {
    let mut entries = Vec::new();
    if let Some(config_path) = &settings.config_path {
        entries.push(ConfigEntry::new("config", config_path, path));
    }
    entries.extend([
        ConfigEntry::new("data_dir", &settings.data_dir, path),
        ConfigEntry::new("lock_dir", &settings.lock_dir, path),
        ConfigEntry::new("lock_timeout_secs", &settings.lock_timeout, |t| {
            t.as_secs().to_string()
        }),
        ConfigEntry::new("repos_root", &settings.repos_root, path),
        ConfigEntry::new("repos_catalog", &settings.repos_catalog, CatalogSource::to_string),
        ConfigEntry::new("repos_override", &settings.repos_override, path),
        ConfigEntry::new("admin_address", &settings.admin_address, String::clone),
        ConfigEntry::new("web_port", &settings.web_port, u16::to_string),
        ConfigEntry::new("revision_policy", &settings.revision_policy, |p| {
            p.as_str().to_string()
        }),
        ConfigEntry::new("optional_platforms", &settings.optional_platforms, |p| {
            p.join(",")
        }),
    ]);
    ConfigShow { settings: entries }
}
