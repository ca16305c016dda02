//! Role records.
//!
//! A role is a named configuration record shared by barclamps. Each barclamp
//! owns one sub-mapping of `override_attributes` (keyed by the barclamp id),
//! and that sub-mapping carries the `crowbar-revision` counter used to
//! detect concurrent writers.
//!
//! Role names follow `<barclamp>-config-<instance>` for proposal roles; the
//! barclamp is derived from the first `-` separated segment, with a few
//! legacy names mapped through [`BARCLAMP_ALIASES`].

pub mod registry;

pub use registry::{ActiveProposal, RevisionPolicy, RevisionRace, RoleRegistry, SaveOutcome};

use crate::barclamp::BarclampCatalog;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Key of the per-barclamp revision counter.
pub const REVISION_KEY: &str = "crowbar-revision";

/// Role name prefixes that do not match the barclamp id they belong to.
pub const BARCLAMP_ALIASES: &[(&str, &str)] = &[
    ("switch_config", "network"),
    ("bmc", "ipmi"),
    ("nfs", "nfs_client"),
];

/// A role record as stored in the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    name: String,

    #[serde(default)]
    description: String,

    #[serde(default)]
    default_attributes: Map<String, Value>,

    #[serde(default)]
    override_attributes: Map<String, Value>,

    #[serde(default)]
    run_list: Vec<String>,

    /// Backend fields this crate does not interpret (json_class, env_run_lists, ...)
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl Role {
    /// Create an empty role.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            default_attributes: Map::new(),
            override_attributes: Map::new(),
            run_list: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Parse a raw backend record.
    ///
    /// Fails on records that are not objects, have mistyped fields, or lack a name.
    pub fn from_value(value: Value) -> Result<Self> {
        let role: Role = serde_json::from_value(value)?;
        if role.name.is_empty() {
            return Err(Error::InvalidInput("role record has an empty name".to_string()));
        }
        Ok(role)
    }

    /// Serialize back to a raw backend record.
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    pub fn run_list(&self) -> &[String] {
        &self.run_list
    }

    pub fn set_run_list(&mut self, run_list: Vec<String>) {
        self.run_list = run_list;
    }

    pub fn default_attributes(&self) -> &Map<String, Value> {
        &self.default_attributes
    }

    pub fn default_attributes_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.default_attributes
    }

    pub fn set_default_attributes(&mut self, attributes: Map<String, Value>) {
        self.default_attributes = attributes;
    }

    pub fn override_attributes(&self) -> &Map<String, Value> {
        &self.override_attributes
    }

    pub fn override_attributes_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.override_attributes
    }

    pub fn set_override_attributes(&mut self, attributes: Map<String, Value>) {
        self.override_attributes = attributes;
    }

    /// Barclamp owning this role, derived from the name.
    pub fn barclamp(&self) -> String {
        let prefix = self.name.split('-').next().unwrap_or_default();
        BARCLAMP_ALIASES
            .iter()
            .find(|(alias, _)| *alias == prefix)
            .map(|(_, barclamp)| barclamp.to_string())
            .unwrap_or_else(|| prefix.to_string())
    }

    /// Instance name: the role name without its `<barclamp>-config-` prefix.
    ///
    /// Names that do not carry the prefix (including aliased ones such as
    /// `bmc-config-default`) are returned whole.
    pub fn instance(&self) -> String {
        let prefix = format!("{}-config-", self.barclamp());
        self.name
            .strip_prefix(&prefix)
            .unwrap_or(&self.name)
            .to_string()
    }

    /// Proposal id, `<barclamp>_<instance>`.
    pub fn proposal(&self) -> String {
        format!("{}_{}", self.barclamp(), self.instance())
    }

    /// Current revision for this role's own barclamp.
    pub fn revision(&self) -> Option<u64> {
        self.revision_for(&self.barclamp())
    }

    /// Revision recorded under a given barclamp's sub-mapping.
    pub fn revision_for(&self, barclamp: &str) -> Option<u64> {
        self.override_attributes
            .get(barclamp)?
            .get(REVISION_KEY)?
            .as_u64()
    }

    /// Node assignment of the proposal (`override_attributes[barclamp]["elements"]`).
    pub fn elements(&self) -> Option<&Map<String, Value>> {
        self.override_attributes
            .get(&self.barclamp())?
            .get("elements")?
            .as_object()
    }

    /// Dashboard category of the owning barclamp.
    pub fn category<'a>(&self, catalog: &'a BarclampCatalog) -> Option<&'a str> {
        catalog.category(&self.barclamp())
    }

    /// Display name of the owning barclamp.
    pub fn display_name(&self, catalog: &BarclampCatalog) -> String {
        catalog.display_name(&self.barclamp())
    }

    /// Whether the owning barclamp allows several proposals.
    pub fn allows_multiple_proposals(&self, catalog: &BarclampCatalog) -> bool {
        catalog.allows_multiple_proposals(&self.barclamp())
    }

    /// Write the record as pretty JSON to `<dir>/role-<name>.json`.
    pub fn export(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("role-{}.json", self.name));
        fs::write(&path, serde_json::to_vec_pretty(self)?)?;
        Ok(path)
    }

    /// Advance the revision of `barclamp`: 0 on first save, previous + 1 after.
    ///
    /// Returns the prior revision so a failed save can restore it. A revision
    /// that cannot be advanced is left untouched and reported as invalid input.
    pub(crate) fn bump_revision(&mut self, barclamp: &str) -> Result<(Option<u64>, u64)> {
        let name = self.name.clone();
        self.with_barclamp_section(barclamp, |section| -> Result<(Option<u64>, u64)> {
            let prior = section.get(REVISION_KEY).and_then(Value::as_u64);
            let next = match prior {
                None => 0,
                Some(rev) => rev.checked_add(1).ok_or_else(|| {
                    Error::InvalidInput(format!(
                        "Revision of {} in role {} cannot be advanced past {}",
                        barclamp, name, rev
                    ))
                })?,
            };
            section.insert(REVISION_KEY.to_string(), Value::from(next));
            Ok((prior, next))
        })
    }

    /// Put back a revision saved by [`Role::bump_revision`].
    pub(crate) fn restore_revision(&mut self, barclamp: &str, prior: Option<u64>) {
        self.with_barclamp_section(barclamp, |section| match prior {
            Some(rev) => {
                section.insert(REVISION_KEY.to_string(), Value::from(rev));
            }
            None => {
                section.remove(REVISION_KEY);
            }
        })
    }

    /// Run `f` on the barclamp's override sub-mapping, creating it if missing.
    fn with_barclamp_section<R>(
        &mut self,
        barclamp: &str,
        f: impl FnOnce(&mut Map<String, Value>) -> R,
    ) -> R {
        let mut section = match self.override_attributes.remove(barclamp) {
            Some(Value::Object(map)) => map,
            Some(_) => {
                tracing::warn!(
                    "Replacing non-mapping override attributes for {} in role {}",
                    barclamp,
                    self.name
                );
                Map::new()
            }
            None => Map::new(),
        };
        let result = f(&mut section);
        self.override_attributes
            .insert(barclamp.to_string(), Value::Object(section));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_barclamp_and_instance() {
        let role = Role::new("nova-config-default");
        assert_eq!(role.barclamp(), "nova");
        assert_eq!(role.instance(), "default");
        assert_eq!(role.proposal(), "nova_default");
    }

    #[test]
    fn test_barclamp_aliases() {
        assert_eq!(Role::new("bmc-config-default").barclamp(), "ipmi");
        assert_eq!(Role::new("nfs-config-share").barclamp(), "nfs_client");
        assert_eq!(Role::new("switch_config-config-x").barclamp(), "network");
        // Aliased names keep their full name as instance
        assert_eq!(Role::new("bmc-config-default").instance(), "bmc-config-default");
    }

    #[test]
    fn test_non_proposal_role() {
        let role = Role::new("dns-server");
        assert_eq!(role.barclamp(), "dns");
        assert_eq!(role.instance(), "dns-server");
    }

    #[test]
    fn test_bump_revision() {
        let mut role = Role::new("dns-config-default");
        assert_eq!(role.revision(), None);
        assert_eq!(role.bump_revision("dns").unwrap(), (None, 0));
        assert_eq!(role.revision(), Some(0));
        assert_eq!(role.bump_revision("dns").unwrap(), (Some(0), 1));
        assert_eq!(role.revision(), Some(1));
    }

    #[test]
    fn test_bump_revision_at_max_is_refused() {
        let mut role = Role::new("dns-config-default");
        role.override_attributes_mut()
            .insert("dns".to_string(), json!({"crowbar-revision": u64::MAX}));
        assert!(matches!(role.bump_revision("dns"), Err(Error::InvalidInput(_))));
        assert_eq!(role.revision(), Some(u64::MAX));
    }

    #[test]
    fn test_restore_revision() {
        let mut role = Role::new("dns-config-default");
        let (prior, _) = role.bump_revision("dns").unwrap();
        role.restore_revision("dns", prior);
        assert_eq!(role.revision(), None);
        assert!(role.override_attributes()["dns"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_bump_replaces_non_mapping_section() {
        let mut role = Role::new("dns-config-default");
        role.override_attributes_mut().insert("dns".to_string(), json!("garbage"));
        assert_eq!(role.bump_revision("dns").unwrap(), (None, 0));
    }

    #[test]
    fn test_barclamp_sections_are_disjoint() {
        let mut role = Role::new("dns-config-default");
        role.bump_revision("dns").unwrap();
        role.bump_revision("dns").unwrap();
        role.bump_revision("ntp").unwrap();
        assert_eq!(role.revision_for("dns"), Some(1));
        assert_eq!(role.revision_for("ntp"), Some(0));
    }

    #[test]
    fn test_from_value_keeps_unknown_fields() {
        let raw = json!({
            "name": "dns-config-default",
            "json_class": "Chef::Role",
            "run_list": ["role[dns-server]"],
            "override_attributes": {"dns": {"crowbar-revision": 4, "elements": {"dns-server": ["d1"]}}}
        });
        let role = Role::from_value(raw.clone()).unwrap();
        assert_eq!(role.revision(), Some(4));
        assert_eq!(role.run_list(), ["role[dns-server]"]);
        assert_eq!(role.elements().unwrap()["dns-server"], json!(["d1"]));
        assert_eq!(role.to_value().unwrap()["json_class"], "Chef::Role");
    }

    #[test]
    fn test_from_value_rejects_malformed() {
        assert!(Role::from_value(json!({"description": "no name"})).is_err());
        assert!(Role::from_value(json!({"name": ""})).is_err());
        assert!(Role::from_value(json!({"name": "x", "run_list": "not a list"})).is_err());
        assert!(Role::from_value(json!(null)).is_err());
    }

    #[test]
    fn test_catalog_lookups() {
        let catalog = BarclampCatalog::bundled().unwrap();
        let role = Role::new("nova_dashboard-config-default");
        assert_eq!(role.category(&catalog), Some("openstack"));
        assert_eq!(role.display_name(&catalog), "Horizon");
        assert!(!role.allows_multiple_proposals(&catalog));
    }

    #[test]
    fn test_export() {
        let temp_dir = TempDir::new().unwrap();
        let mut role = Role::new("dns-config-default");
        role.set_description("DNS");
        let path = role.export(temp_dir.path()).unwrap();
        assert!(path.ends_with("role-dns-config-default.json"));
        let written: Value = serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
        assert_eq!(written["description"], "DNS");
    }
}
