//! In-process backend.
//!
//! Holds role records and data bags in memory. The offline switch makes
//! every call fail as an unreachable backend would, which is how callers
//! exercise their transport-error paths.

use super::{ConfigBackend, SearchQuery, SearchResponse, record_name, split_data_bag};
use crate::{Error, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
struct Store {
    /// Role records keyed by row id; well-formed rows use the role name
    roles: BTreeMap<String, Value>,
    data_bags: BTreeMap<String, Map<String, Value>>,
}

/// In-memory [`ConfigBackend`].
#[derive(Debug, Default)]
pub struct MemoryBackend {
    store: Mutex<Store>,
    offline: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the backend becoming unreachable (or reachable again).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Insert a raw row under an arbitrary id, bypassing validation.
    ///
    /// Search returns it like any other row; it is how incomplete or
    /// malformed records written by other tools are represented.
    pub fn insert_raw(&self, id: &str, row: Value) -> Result<()> {
        self.lock()?.roles.insert(id.to_string(), row);
        Ok(())
    }

    /// Publish a data bag item.
    pub fn put_data_bag(&self, name: &str, item: Map<String, Value>) -> Result<()> {
        split_data_bag(name)?;
        self.lock()?.data_bags.insert(name.to_string(), item);
        Ok(())
    }

    /// Number of stored role rows.
    pub fn len(&self) -> usize {
        self.store.lock().map(|store| store.roles.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Transport("memory backend is offline".to_string()));
        }
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Store>> {
        self.store
            .lock()
            .map_err(|_| Error::Other("memory backend lock poisoned".to_string()))
    }
}

impl ConfigBackend for MemoryBackend {
    fn load_role(&self, name: &str) -> Result<Value> {
        self.check_online()?;
        self.lock()?
            .roles
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("role {}", name)))
    }

    fn search_roles(&self, query: Option<&str>) -> Result<SearchResponse> {
        self.check_online()?;
        let query = query.map(SearchQuery::parse).transpose()?;
        let store = self.lock()?;
        let rows = store
            .roles
            .values()
            .filter(|row| query.as_ref().is_none_or(|q| q.matches(row)))
            .cloned()
            .collect();
        Ok(SearchResponse::new(rows))
    }

    fn save_role(&self, record: &Value) -> Result<()> {
        self.check_online()?;
        let name = record_name(record)?.to_string();
        self.lock()?.roles.insert(name, record.clone());
        Ok(())
    }

    fn destroy_role(&self, name: &str) -> Result<()> {
        self.check_online()?;
        match self.lock()?.roles.remove(name) {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(format!("role {}", name))),
        }
    }

    fn load_data_bag(&self, name: &str) -> Result<Map<String, Value>> {
        self.check_online()?;
        split_data_bag(name)?;
        self.lock()?
            .data_bags
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("data bag {}", name)))
    }

    fn location(&self) -> String {
        "memory".to_string()
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_save_and_load() {
        let backend = MemoryBackend::new();
        backend.save_role(&json!({"name": "dns-config-default"})).unwrap();
        let loaded = backend.load_role("dns-config-default").unwrap();
        assert_eq!(loaded["name"], "dns-config-default");
        assert_eq!(backend.len(), 1);
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let backend = MemoryBackend::new();
        assert!(matches!(backend.load_role("missing"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_offline_is_transport_error() {
        let backend = MemoryBackend::new();
        backend.set_offline(true);
        assert!(matches!(backend.load_role("missing"), Err(Error::Transport(_))));
        assert!(matches!(backend.search_roles(None), Err(Error::Transport(_))));
        backend.set_offline(false);
        assert!(backend.search_roles(None).is_ok());
    }

    #[test]
    fn test_search_filters_and_keeps_order() {
        let backend = MemoryBackend::new();
        for name in ["nova-config-b", "dns-config-a", "nova-config-a"] {
            backend.save_role(&json!({"name": name})).unwrap();
        }
        let response = backend.search_roles(Some("name:nova\\-config\\-*")).unwrap();
        let names: Vec<_> = response.rows.iter().map(|r| r["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["nova-config-a", "nova-config-b"]);
        assert_eq!(response.total, 2);
    }

    #[test]
    fn test_destroy() {
        let backend = MemoryBackend::new();
        backend.save_role(&json!({"name": "a"})).unwrap();
        backend.destroy_role("a").unwrap();
        assert!(backend.is_empty());
        assert!(matches!(backend.destroy_role("a"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_data_bags() {
        let backend = MemoryBackend::new();
        let mut item = Map::new();
        item.insert("suse-12.0".to_string(), json!({"SLES12-Pool": {}}));
        backend.put_data_bag("crowbar/repositories", item).unwrap();
        let loaded = backend.load_data_bag("crowbar/repositories").unwrap();
        assert!(loaded.contains_key("suse-12.0"));
        assert!(matches!(backend.load_data_bag("crowbar/other"), Err(Error::NotFound(_))));
    }
}
