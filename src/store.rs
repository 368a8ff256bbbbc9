//! Small JSON-file key-value store backing settings and image references

use crate::errors::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug)]
pub struct KeyValueStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl KeyValueStore {
    /// Load the store at `path`. A missing file is an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        debug!("Opened {} with {} entries", path.display(), entries.len());
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The in-memory entries only change once the file write succeeds.
    pub async fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let mut entries = self.entries.clone();
        entries.insert(key.into(), value.into());

        self.persist(&entries).await?;
        self.entries = entries;
        Ok(())
    }

    pub async fn remove(&mut self, key: &str) -> Result<Option<String>> {
        if !self.entries.contains_key(key) {
            return Ok(None);
        }

        let mut entries = self.entries.clone();
        let removed = entries.remove(key);

        self.persist(&entries).await?;
        self.entries = entries;
        Ok(removed)
    }

    /// Write to a sibling temp file, then rename over the target.
    async fn persist(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let contents = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");

        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
