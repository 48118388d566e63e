//! Workspace file state
//!
//! A flat map from normalized path to entry. Folders are addressed by
//! nested path segments, never by object identity, which keeps diffing for
//! new/updated/deleted detection trivial.

use std::collections::{BTreeMap, VecDeque};

use pressdock_protocol::{FileAction, FileEntry, FileKind, FileStatus};

/// How many recent file events the notification log retains.
const NOTIFICATION_CAP: usize = 100;

/// A recent file mutation, kept transiently for UI notification feeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNotification {
    pub path: String,
    pub action: FileAction,
    pub at_ms: u64,
}

/// Collapse a wire path into the canonical flat-map key: no leading slash,
/// no `.` segments, no empty segments.
pub fn normalize_path(path: &str) -> String {
    path.trim()
        .split('/')
        .filter(|seg| !seg.is_empty() && *seg != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// The live file set for one workspace.
#[derive(Debug, Default)]
pub struct FileMap {
    entries: BTreeMap<String, FileEntry>,
    notifications: VecDeque<FileNotification>,
}

impl FileMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a map from previously exported entries (snapshot, cache).
    /// No notifications are recorded.
    pub fn from_entries(entries: impl IntoIterator<Item = FileEntry>) -> Self {
        let mut map = Self::default();
        for mut entry in entries {
            entry.path = normalize_path(&entry.path);
            map.entries.insert(entry.path.clone(), entry);
        }
        map
    }

    pub fn get(&self, path: &str) -> Option<&FileEntry> {
        self.entries.get(&normalize_path(path))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(&normalize_path(path))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or update an entry. Existing content is preserved when the
    /// incoming mutation carries none.
    pub fn upsert(
        &mut self,
        path: &str,
        kind: FileKind,
        content: Option<String>,
        status: FileStatus,
        now_ms: u64,
    ) {
        let key = normalize_path(path);
        let action = if self.entries.contains_key(&key) {
            FileAction::Update
        } else {
            FileAction::Create
        };
        self.record(FileNotification {
            path: key.clone(),
            action,
            at_ms: now_ms,
        });

        match self.entries.get_mut(&key) {
            Some(existing) => {
                existing.kind = kind;
                if let Some(content) = content {
                    existing.content = Some(content);
                }
                existing.status = status;
                existing.timestamp = now_ms;
            }
            None => {
                self.entries.insert(
                    key.clone(),
                    FileEntry {
                        path: key,
                        kind,
                        content,
                        status,
                        timestamp: now_ms,
                    },
                );
            }
        }
    }

    /// Remove a path from the live set. Unknown paths are a no-op — the
    /// backend may broadcast deletes for files this client never saw.
    pub fn remove(&mut self, path: &str, now_ms: u64) -> Option<FileEntry> {
        let key = normalize_path(path);
        let removed = self.entries.remove(&key);
        if removed.is_some() {
            self.record(FileNotification {
                path: key,
                action: FileAction::Delete,
                at_ms: now_ms,
            });
        }
        removed
    }

    /// Promote an in-progress status to its terminal form. Idempotent; a
    /// late settle for a removed or already-terminal entry does nothing.
    pub fn settle(&mut self, path: &str, now_ms: u64) -> bool {
        let key = normalize_path(path);
        match self.entries.get_mut(&key) {
            Some(entry) if !entry.status.is_terminal() => {
                entry.status = entry.status.settled();
                entry.timestamp = now_ms;
                true
            }
            _ => false,
        }
    }

    /// Direct children of a folder prefix, in path order. An empty prefix
    /// lists the workspace root.
    pub fn children_of(&self, prefix: &str) -> Vec<&FileEntry> {
        let prefix = normalize_path(prefix);
        self.entries
            .values()
            .filter(|entry| {
                let rest = if prefix.is_empty() {
                    entry.path.as_str()
                } else {
                    match entry.path.strip_prefix(&prefix) {
                        Some(rest) if rest.starts_with('/') => &rest[1..],
                        _ => return false,
                    }
                };
                !rest.is_empty() && !rest.contains('/')
            })
            .collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries.values()
    }

    /// Flat path -> content map for file entries that carry content.
    pub fn to_content_map(&self) -> BTreeMap<String, String> {
        self.entries
            .values()
            .filter(|e| e.kind == FileKind::File)
            .filter_map(|e| e.content.clone().map(|c| (e.path.clone(), c)))
            .collect()
    }

    pub fn notifications(&self) -> impl Iterator<Item = &FileNotification> {
        self.notifications.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.notifications.clear();
    }

    fn record(&mut self, notification: FileNotification) {
        self.notifications.push_back(notification);
        while self.notifications.len() > NOTIFICATION_CAP {
            self.notifications.pop_front();
        }
    }
}
