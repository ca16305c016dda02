//! Barclamp catalog.
//!
//! Maps barclamp ids to the capabilities roles need to know about their
//! owning barclamp (category, display name, whether several proposals may
//! coexist). Lookups are plain table lookups; barclamps with custom behavior
//! register their own [`BarclampService`] implementation.

use crate::Result;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// The catalog shipped with the crate.
const BUNDLED_CATALOG: &str = include_str!("../config/barclamps.yml");

/// Category used for barclamps that do not declare one.
pub const DEFAULT_CATEGORY: &str = "barclamp";

/// Capabilities of one barclamp.
pub trait BarclampService: Send + Sync + fmt::Debug {
    /// Barclamp id (e.g. "nova").
    fn id(&self) -> &str;

    /// Dashboard category.
    fn category(&self) -> &str;

    /// Explicit display name, if the barclamp declares one.
    fn display_name(&self) -> Option<&str>;

    /// Whether more than one proposal of this barclamp may be deployed.
    fn allows_multiple_proposals(&self) -> bool;
}

/// A catalog-described barclamp.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogEntry {
    #[serde(skip)]
    pub id: String,

    #[serde(default)]
    pub display: Option<String>,

    #[serde(default)]
    pub category: Option<String>,

    #[serde(default)]
    pub allow_multiple_proposals: bool,
}

impl BarclampService for CatalogEntry {
    fn id(&self) -> &str {
        &self.id
    }

    fn category(&self) -> &str {
        self.category.as_deref().unwrap_or(DEFAULT_CATEGORY)
    }

    fn display_name(&self) -> Option<&str> {
        self.display.as_deref().filter(|d| !d.is_empty())
    }

    fn allows_multiple_proposals(&self) -> bool {
        self.allow_multiple_proposals
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    barclamps: BTreeMap<String, CatalogEntry>,
}

/// Registry of barclamps keyed by id.
#[derive(Debug, Clone, Default)]
pub struct BarclampCatalog {
    services: BTreeMap<String, Arc<dyn BarclampService>>,
}

impl BarclampCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the catalog bundled with the crate.
    pub fn bundled() -> Result<Self> {
        Self::from_yaml(BUNDLED_CATALOG)
    }

    /// Load a catalog file.
    pub fn load(path: &Path) -> Result<Self> {
        Self::from_yaml(&std::fs::read_to_string(path)?)
    }

    /// Parse a catalog document.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let file: CatalogFile = serde_yaml::from_str(contents)?;
        let mut catalog = Self::new();
        for (id, mut entry) in file.barclamps {
            entry.id = id;
            catalog.register(Arc::new(entry));
        }
        Ok(catalog)
    }

    /// Register (or replace) a barclamp.
    pub fn register(&mut self, service: Arc<dyn BarclampService>) {
        self.services.insert(service.id().to_string(), service);
    }

    /// Look up a barclamp.
    pub fn get(&self, id: &str) -> Option<&Arc<dyn BarclampService>> {
        self.services.get(id)
    }

    /// All registered ids, sorted.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    /// Category of a barclamp, if it is known.
    pub fn category(&self, id: &str) -> Option<&str> {
        self.get(id).map(|service| service.category())
    }

    /// Display name: the declared one, otherwise the title-cased id.
    pub fn display_name(&self, id: &str) -> String {
        self.get(id)
            .and_then(|service| service.display_name())
            .map(str::to_string)
            .unwrap_or_else(|| titlecase(id))
    }

    /// Whether the barclamp allows multiple proposals. Unknown barclamps do not.
    pub fn allows_multiple_proposals(&self, id: &str) -> bool {
        self.get(id)
            .is_some_and(|service| service.allows_multiple_proposals())
    }
}

/// Turn an identifier like `nova_dashboard` into `Nova Dashboard`.
pub fn titlecase(id: &str) -> String {
    id.split(['_', '-', ' '])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
