//! Cache store - the `.cache` file of a workspace
//!
//! The file holds a JSON array of entries. Array order is insertion order and
//! also lookup priority: [`CacheStore::find_match`] returns the oldest
//! qualifying entry, never a newer one.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::cache::entry::CacheEntry;
use crate::core::error::{IoContext, MemoError, Result};
use crate::core::logging::operations;
use crate::core::model::{Meta, ResultItem, ResultSet};
use crate::core::paths::cache_file;
use crate::core::render::{RenderConfig, Renderer};
use crate::core::util::{short_id, truncate_string};
use crate::snapshot::SnapshotId;

/// Output bytes shown per entry by `cache list`
const LIST_EXCERPT_BYTES: usize = 200;

#[derive(Debug)]
pub struct CacheStore {
    path: PathBuf,
    entries: Vec<CacheEntry>,
}

impl CacheStore {
    /// Load the store of `work_dir`, creating an empty file if none exists
    pub fn load(work_dir: &Path) -> Result<Self> {
        let store = Self::read(work_dir)?;
        if !store.path.exists() {
            store.save()?;
        }
        Ok(store)
    }

    /// Load the store without creating anything; a missing file reads as empty
    pub fn read(work_dir: &Path) -> Result<Self> {
        let path = cache_file(work_dir);

        if !path.exists() {
            return Ok(Self {
                path,
                entries: Vec::new(),
            });
        }

        let content = fs::read_to_string(&path)
            .io_context(|| format!("Failed to read cache file: {}", path.display()))?;
        let entries: Vec<CacheEntry> = serde_json::from_str(&content)
            .map_err(|source| MemoError::CacheCorruption {
                path: path.clone(),
                source,
            })?;

        debug!(
            operation = operations::CACHE_LOAD,
            entries = entries.len(),
            path = %path.display(),
            "cache loaded"
        );
        Ok(Self { path, entries })
    }

    /// Rewrite the whole file from the in-memory list
    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_string(&self.entries).map_err(|e| {
            MemoError::io(
                "Failed to serialize cache",
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            )
        })?;
        fs::write(&self.path, json)
            .io_context(|| format!("Failed to write cache file: {}", self.path.display()))?;

        debug!(
            operation = operations::CACHE_SAVE,
            entries = self.entries.len(),
            "cache saved"
        );
        Ok(())
    }

    /// First entry, oldest first, for `command` whose input state `matches`
    pub fn find_match<F>(&self, command: &str, mut matches: F) -> Result<Option<&CacheEntry>>
    where
        F: FnMut(&SnapshotId) -> Result<bool>,
    {
        for entry in self.entries.iter().filter(|e| e.command == command) {
            if matches(&entry.input_state)? {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    /// Append an entry and persist it before returning
    pub fn append(&mut self, entry: CacheEntry) -> Result<()> {
        self.entries.push(entry);
        self.save()
    }

    pub fn entries(&self) -> &[CacheEntry] {
        &self.entries
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn entry_item(index: usize, entry: &CacheEntry) -> ResultItem {
    let (excerpt, truncated) = truncate_string(&entry.output, LIST_EXCERPT_BYTES);
    ResultItem::entry(excerpt)
        .with_meta(Meta {
            size: Some(entry.output.len() as u64),
            hash: None,
            truncated,
        })
        .with_data(serde_json::json!({
            "index": index,
            "command": entry.command,
            "input_state": short_id(entry.input_state.as_str()),
            "output_state": short_id(entry.output_state.as_str()),
        }))
}

/// Run the 'cache list' command
pub fn run_cache_list(root: &Path, render_config: RenderConfig) -> anyhow::Result<()> {
    let store = CacheStore::read(root)?;

    let result_set: ResultSet = store
        .entries()
        .iter()
        .enumerate()
        .map(|(i, entry)| entry_item(i, entry))
        .collect();
    Renderer::with_config(render_config).print(&result_set);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(cmd: &str, input: &str, output_state: &str, output: &str) -> CacheEntry {
        CacheEntry::new(
            cmd,
            SnapshotId::new(input),
            SnapshotId::new(output_state),
            output,
        )
    }

    #[test]
    fn test_load_creates_empty_file() {
        let temp = tempdir().unwrap();
        let store = CacheStore::load(temp.path()).unwrap();
        assert!(store.is_empty());
        assert_eq!(fs::read_to_string(temp.path().join(".cache")).unwrap(), "[]");
    }

    #[test]
    fn test_read_does_not_create_file() {
        let temp = tempdir().unwrap();
        let store = CacheStore::read(temp.path()).unwrap();
        assert!(store.is_empty());
        assert!(!temp.path().join(".cache").exists());
    }

    #[test]
    fn test_round_trip_preserves_order_and_empty_output() {
        let temp = tempdir().unwrap();
        let mut store = CacheStore::load(temp.path()).unwrap();
        store.append(entry("x lstart", "s0", "s1", "LSTART ok")).unwrap();
        store.append(entry("x dstart", "s1", "s2", "")).unwrap();
        store.append(entry("x lstart", "s5", "s6", "again")).unwrap();

        let reloaded = CacheStore::load(temp.path()).unwrap();
        assert_eq!(reloaded.entries(), store.entries());
        assert_eq!(reloaded.entries()[1].output, "");
    }

    #[test]
    fn test_reads_camel_case_wire_format() {
        let temp = tempdir().unwrap();
        fs::write(
            temp.path().join(".cache"),
            r#"[{"cmd": "x lapw0", "inState": "a", "outState": "b", "output": "LAPW0 END"}]"#,
        )
        .unwrap();

        let store = CacheStore::load(temp.path()).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.entries()[0].command, "x lapw0");
        assert_eq!(store.entries()[0].output_state, SnapshotId::new("b"));
    }

    #[test]
    fn test_corrupted_file_is_fatal() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join(".cache"), "{not json").unwrap();
        let err = CacheStore::load(temp.path()).unwrap_err();
        assert_eq!(err.code(), "CACHE_CORRUPTION");
        // File is left as is
        assert_eq!(
            fs::read_to_string(temp.path().join(".cache")).unwrap(),
            "{not json"
        );
    }

    #[test]
    fn test_find_match_prefers_oldest() {
        let temp = tempdir().unwrap();
        let mut store = CacheStore::load(temp.path()).unwrap();
        store.append(entry("x lstart", "old", "o1", "first")).unwrap();
        store.append(entry("x lstart", "new", "o2", "second")).unwrap();

        let found = store.find_match("x lstart", |_| Ok(true)).unwrap().unwrap();
        assert_eq!(found.output, "first");

        let found = store
            .find_match("x lstart", |id| Ok(id.as_str() == "new"))
            .unwrap()
            .unwrap();
        assert_eq!(found.output, "second");
    }

    #[test]
    fn test_find_match_filters_on_command() {
        let temp = tempdir().unwrap();
        let mut store = CacheStore::load(temp.path()).unwrap();
        store.append(entry("x lapw0", "s0", "s1", "")).unwrap();

        let mut probed = Vec::new();
        let found = store
            .find_match("x lapw1", |id| {
                probed.push(id.clone());
                Ok(true)
            })
            .unwrap();
        assert!(found.is_none());
        assert!(probed.is_empty());
    }

    #[test]
    fn test_find_match_propagates_predicate_error() {
        let temp = tempdir().unwrap();
        let mut store = CacheStore::load(temp.path()).unwrap();
        store.append(entry("x lapw0", "s0", "s1", "")).unwrap();

        let result = store.find_match("x lapw0", |_| {
            Err(MemoError::snapshot("cache.lookup", "backend gone"))
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_entry_item_truncates_output() {
        let long = "x".repeat(LIST_EXCERPT_BYTES + 50);
        let item = entry_item(3, &entry("x lapw1", "0123456789abcdef", "s1", &long));
        assert!(item.meta.truncated);
        assert_eq!(item.meta.size, Some(long.len() as u64));
        let data = item.data.unwrap();
        assert_eq!(data["index"], 3);
        assert_eq!(data["input_state"], "0123456789ab");
    }
}
