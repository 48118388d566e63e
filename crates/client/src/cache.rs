//! Best-effort local cache
//!
//! Panel layout preferences and a local copy of the workspace file tree are
//! kept as JSON files under the user's home directory, namespaced by fixed
//! keys. Nothing here is security-sensitive and everything is safe to lose:
//! read/write failures are logged and swallowed.

use std::fs;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

/// Key for the UI's panel layout preferences.
pub const PANEL_LAYOUT_KEY: &str = "panel_layout";

/// Key for the cached file tree of one workspace.
pub fn file_tree_key(workspace_id: &str) -> String {
    format!("file_tree.{workspace_id}")
}

/// A directory of JSON files, one per key.
pub struct LocalCache {
    dir: PathBuf,
}

impl LocalCache {
    /// Open the cache at `~/.pressdock/cache`. Returns None when the home
    /// directory is unavailable or the directory cannot be created.
    pub fn open_default() -> Option<Self> {
        let dir = dirs::home_dir()?.join(".pressdock").join("cache");
        if let Err(e) = fs::create_dir_all(&dir) {
            warn!(
                component = "cache",
                event = "cache.open_failed",
                error = %e,
                "Could not create cache directory"
            );
            return None;
        }
        Some(Self { dir })
    }

    /// Open at an explicit directory (tests use a temp dir).
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = self.path_for(key);
        let raw = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(
                    component = "cache",
                    event = "cache.parse_failed",
                    key = %key,
                    error = %e,
                    "Discarding unreadable cache entry"
                );
                None
            }
        }
    }

    /// Write a value; returns false on failure (logged, never fatal).
    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> bool {
        let path = self.path_for(key);
        let serialized = match serde_json::to_vec_pretty(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(
                    component = "cache",
                    event = "cache.serialize_failed",
                    key = %key,
                    error = %e,
                    "Could not serialize cache entry"
                );
                return false;
            }
        };
        if let Err(e) = fs::write(&path, serialized) {
            warn!(
                component = "cache",
                event = "cache.write_failed",
                key = %key,
                error = %e,
                "Could not write cache entry"
            );
            return false;
        }
        true
    }

    pub fn remove(&self, key: &str) {
        let _ = fs::remove_file(self.path_for(key));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pressdock_protocol::{FileEntry, FileKind, FileStatus};

    #[test]
    fn put_then_get_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalCache::at(dir.path());

        let entries = vec![FileEntry {
            path: "plugin/main.php".to_string(),
            kind: FileKind::File,
            content: Some("<?php".to_string()),
            status: FileStatus::Created,
            timestamp: 42,
        }];
        assert!(cache.put(&file_tree_key("ws-1"), &entries));

        let loaded: Vec<FileEntry> = cache.get(&file_tree_key("ws-1")).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].path, "plugin/main.php");
    }

    #[test]
    fn missing_key_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalCache::at(dir.path());
        assert!(cache.get::<Vec<String>>("nope").is_none());
    }

    #[test]
    fn corrupt_entry_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalCache::at(dir.path());
        fs::write(dir.path().join("panel_layout.json"), "not json").unwrap();
        assert!(cache.get::<Vec<String>>(PANEL_LAYOUT_KEY).is_none());
    }

    #[test]
    fn keys_are_sanitized_into_filenames() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalCache::at(dir.path());
        assert!(cache.put(&file_tree_key("ws/../etc"), &vec!["x"]));
        // the slash never reaches the filesystem
        assert!(dir.path().join("file_tree.ws_.._etc.json").exists());
    }

    #[test]
    fn remove_deletes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalCache::at(dir.path());
        cache.put(PANEL_LAYOUT_KEY, &vec![1, 2, 3]);
        cache.remove(PANEL_LAYOUT_KEY);
        assert!(cache.get::<Vec<i32>>(PANEL_LAYOUT_KEY).is_none());
    }
}
