//! Command implementations for the Crowbar CLI.
//!
//! Each command takes the registries it works on and returns a result type
//! implementing [`Output`]. Commands are organized by area:
//! - `role` - role lookup, search, save, destroy and export
//! - `repo` - repository listing, validation checks and feature status
//! - `config` - resolved settings

mod config;
mod repo;
mod role;

pub use config::{ConfigEntry, ConfigShow, config_show};
pub use repo::{
    FeatureStatus, RepoCheck, RepoList, RepoSummary, repo_check, repo_feature, repo_list,
};
pub use role::{
    ActiveList, RoleDestroyed, RoleDetail, RoleExported, RoleList, RoleSaved, RoleShow,
    RoleSummary, role_active, role_destroy, role_export, role_list, role_save, role_show,
};

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    /// Serialize to JSON string.
    fn to_json(&self) -> String;

    /// Format for human-readable output.
    fn to_human(&self) -> String;
}

/// JSON rendering shared by every serializable result.
fn json_string<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!(r#"{{"error": "{}"}}"#, e))
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
