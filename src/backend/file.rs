//! File-based backend.
//!
//! Layout under the data directory:
//! - `roles/<name>.json` - one JSON document per role
//! - `data_bags/<bag>/<item>.json` - flat data bag items
//!
//! Writes go to a temporary file in the target directory and are renamed
//! into place, so concurrent readers never observe a half-written record.

use super::{ConfigBackend, SearchQuery, SearchResponse, record_name, split_data_bag};
use crate::{Error, Result};
use serde_json::{Map, Value};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// [`ConfigBackend`] storing records as JSON files.
#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    /// Open (and create if needed) a backend rooted at `root`.
    pub fn open(root: &Path) -> Result<Self> {
        fs::create_dir_all(root.join("roles"))?;
        fs::create_dir_all(root.join("data_bags"))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Root directory of this backend.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn roles_dir(&self) -> PathBuf {
        self.root.join("roles")
    }

    fn role_path(&self, name: &str) -> Result<PathBuf> {
        check_component(name)?;
        Ok(self.roles_dir().join(format!("{}.json", name)))
    }

    /// Publish a data bag item.
    pub fn put_data_bag(&self, name: &str, item: &Map<String, Value>) -> Result<()> {
        let (bag, item_name) = split_data_bag(name)?;
        check_component(bag)?;
        check_component(item_name)?;
        let dir = self.root.join("data_bags").join(bag);
        fs::create_dir_all(&dir)?;
        let contents = serde_json::to_vec_pretty(item)?;
        write_atomic(&dir.join(format!("{}.json", item_name)), &contents)
    }
}

/// Reject names that would escape their directory.
fn check_component(name: &str) -> Result<()> {
    if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\', '\0']) {
        return Err(Error::InvalidInput(format!("invalid record name: {:?}", name)));
    }
    Ok(())
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::Other(format!("no parent directory for {}", path.display())))?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

fn read_json(path: &Path, what: &str) -> Result<Value> {
    match fs::read(path) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(Error::NotFound(what.to_string())),
        Err(e) => Err(Error::Io(e)),
    }
}

impl ConfigBackend for FileBackend {
    fn load_role(&self, name: &str) -> Result<Value> {
        read_json(&self.role_path(name)?, &format!("role {}", name))
    }

    fn search_roles(&self, query: Option<&str>) -> Result<SearchResponse> {
        let query = query.map(SearchQuery::parse).transpose()?;

        let mut paths: Vec<PathBuf> = fs::read_dir(self.roles_dir())?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut rows = Vec::new();
        for path in paths {
            let row = match fs::read(&path) {
                Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                    tracing::debug!("Unparseable role file {}: {}", path.display(), e);
                    Value::Null
                }),
                Err(e) => {
                    tracing::debug!("Unreadable role file {}: {}", path.display(), e);
                    Value::Null
                }
            };
            if query.as_ref().is_none_or(|q| q.matches(&row)) {
                rows.push(row);
            }
        }
        Ok(SearchResponse::new(rows))
    }

    fn save_role(&self, record: &Value) -> Result<()> {
        let path = self.role_path(record_name(record)?)?;
        let contents = serde_json::to_vec_pretty(record)?;
        write_atomic(&path, &contents)
    }

    fn destroy_role(&self, name: &str) -> Result<()> {
        match fs::remove_file(self.role_path(name)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("role {}", name)))
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn load_data_bag(&self, name: &str) -> Result<Map<String, Value>> {
        let (bag, item) = split_data_bag(name)?;
        check_component(bag)?;
        check_component(item)?;
        let path = self.root.join("data_bags").join(bag).join(format!("{}.json", item));
        match read_json(&path, &format!("data bag {}", name))? {
            Value::Object(map) => Ok(map),
            other => Err(Error::InvalidInput(format!(
                "data bag {} is not a mapping: {}",
                name, other
            ))),
        }
    }

    fn location(&self) -> String {
        self.root.display().to_string()
    }

    fn backend_type(&self) -> &'static str {
        "file"
    }
}
