//! Configuration backend trait and implementations.
//!
//! The backend is the node/role database the orchestration platform drives.
//! Crowbar treats it as a black box reached through [`ConfigBackend`]:
//! - `FileBackend` - JSON documents under a data directory (default)
//! - `MemoryBackend` - in-process store, used for embedding and tests
//!
//! Role records cross this boundary as raw JSON so that callers can decide
//! how strictly to parse them (a single malformed search row must not fail
//! a whole search).

pub mod file;
pub mod memory;
pub mod query;

pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use query::{SearchQuery, escape_query};

use crate::Result;
use serde_json::{Map, Value};

/// Raw result of a backend search.
#[derive(Debug, Clone, Default)]
pub struct SearchResponse {
    /// Raw rows in backend order
    pub rows: Vec<Value>,
    /// Total number of matches reported by the backend
    pub total: usize,
}

impl SearchResponse {
    pub fn new(rows: Vec<Value>) -> Self {
        let total = rows.len();
        Self { rows, total }
    }
}

/// Trait for backends that persist role records and publish data bags.
///
/// `load_role` reports a missing record as [`crate::Error::NotFound`]; any
/// other failure (unreachable store, protocol fault) is
/// [`crate::Error::Transport`] or [`crate::Error::Io`].
pub trait ConfigBackend: Send + Sync {
    /// Load a single role record by name.
    fn load_role(&self, name: &str) -> Result<Value>;

    /// Search role records. `None` returns every role.
    fn search_roles(&self, query: Option<&str>) -> Result<SearchResponse>;

    /// Create or replace a role record (keyed by its `name` field).
    fn save_role(&self, record: &Value) -> Result<()>;

    /// Delete a role record.
    fn destroy_role(&self, name: &str) -> Result<()>;

    /// Load a flat data bag item, addressed as `<bag>/<item>`.
    fn load_data_bag(&self, name: &str) -> Result<Map<String, Value>>;

    /// Get the backend location description (for display purposes).
    fn location(&self) -> String;

    /// Get the backend type name.
    fn backend_type(&self) -> &'static str;
}

/// Extract the `name` field every role record is keyed by.
pub(crate) fn record_name(record: &Value) -> Result<&str> {
    record
        .get("name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| crate::Error::InvalidInput("role record has no name".to_string()))
}

/// Split a data bag address into bag and item.
pub(crate) fn split_data_bag(name: &str) -> Result<(&str, &str)> {
    match name.split_once('/') {
        Some((bag, item)) if !bag.is_empty() && !item.is_empty() && !item.contains('/') => {
            Ok((bag, item))
        }
        _ => Err(crate::Error::InvalidInput(format!(
            "data bag must be addressed as <bag>/<item>, got {}",
            name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_name() {
        assert_eq!(record_name(&json!({"name": "dns-config-default"})).unwrap(), "dns-config-default");
        assert!(record_name(&json!({"name": ""})).is_err());
        assert!(record_name(&json!({"description": "x"})).is_err());
    }

    #[test]
    fn test_split_data_bag() {
        assert_eq!(split_data_bag("crowbar/repositories").unwrap(), ("crowbar", "repositories"));
        assert!(split_data_bag("crowbar").is_err());
        assert!(split_data_bag("/repositories").is_err());
        assert!(split_data_bag("a/b/c").is_err());
    }

    #[test]
    fn test_search_response_total() {
        let response = SearchResponse::new(vec![json!({}), json!({})]);
        assert_eq!(response.total, 2);
    }
}
