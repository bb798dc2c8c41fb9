use crate::{is_note_file_name, Fingerprint, NotesError, Result};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::watch;

/// Snapshot of one note, used for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoteEntry {
    pub name: String,
    pub body: String,
}

/// A single mutation of the mirror. Only the synchronizer produces these, after the
/// filesystem change is confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum NoteChange {
    Set { name: String, body: String },
    Remove { name: String },
}

/// In-memory mirror of the backing directory: file name → note body.
///
/// Cloning yields another handle to the same mirror. Reads never touch the
/// filesystem. Every applied batch of mutations and its change notification
/// happen under one write lock, so readers see either the whole batch or none
/// of it.
#[derive(Clone)]
pub struct NoteStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    dir: PathBuf,
    notes: RwLock<HashMap<String, String>>,
    changes: watch::Sender<u64>,
}

impl NoteStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Arc::new(StoreInner {
                dir: dir.into(),
                notes: RwLock::new(HashMap::new()),
                changes,
            }),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    /// Rebuilds the mirror from the regular files of the backing directory.
    ///
    /// Returns the number of notes loaded. Files that cannot be read are skipped
    /// with a warning; a directory that cannot be listed is `StorageUnavailable`.
    pub fn load(&self) -> Result<usize> {
        let dir = self.dir();
        let entries = std::fs::read_dir(dir).map_err(|source| NotesError::StorageUnavailable {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut notes = HashMap::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Failed to read entry in {}: {err}", dir.display());
                    continue;
                }
            };
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if !file_type.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                debug!("Skipping non UTF-8 note name {:?}", entry.path());
                continue;
            };
            if !is_note_file_name(name) {
                continue;
            }
            match std::fs::read(entry.path()) {
                Ok(bytes) => {
                    notes.insert(name.to_string(), String::from_utf8_lossy(&bytes).into_owned());
                }
                Err(err) => warn!("Failed to read note {}: {err}", entry.path().display()),
            }
        }

        let count = notes.len();
        self.replace_all(notes);
        info!("Loaded {count} notes from {}", dir.display());
        Ok(count)
    }

    #[must_use]
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<String> {
        self.read_notes(|notes| notes.get(fingerprint.as_str()).cloned())
    }

    #[must_use]
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.read_notes(|notes| notes.contains_key(fingerprint.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read_notes(HashMap::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All notes sorted by name.
    #[must_use]
    pub fn entries(&self) -> Vec<NoteEntry> {
        let mut entries: Vec<NoteEntry> = self.read_notes(|notes| {
            notes
                .iter()
                .map(|(name, body)| NoteEntry {
                    name: name.clone(),
                    body: body.clone(),
                })
                .collect()
        });
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    /// Receiver for the "notes changed" signal. The value is a generation counter;
    /// subscribers re-read the store instead of interpreting it.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.changes.subscribe()
    }

    /// Number of change notifications emitted so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        *self.inner.changes.borrow()
    }

    /// Applies a batch and emits one notification if the mirror changed.
    pub(crate) fn apply(&self, changes: Vec<NoteChange>) -> bool {
        let mut notes = self.write_notes();
        let mut changed = false;
        for change in changes {
            changed |= match change {
                NoteChange::Set { name, body } => {
                    if notes.get(&name) == Some(&body) {
                        false
                    } else {
                        notes.insert(name, body);
                        true
                    }
                }
                NoteChange::Remove { name } => notes.remove(&name).is_some(),
            };
        }
        if changed {
            self.notify();
        }
        changed
    }

    /// Drops every entry, used when the backing directory itself disappears.
    pub(crate) fn clear(&self) -> bool {
        let mut notes = self.write_notes();
        if notes.is_empty() {
            return false;
        }
        notes.clear();
        self.notify();
        true
    }

    fn replace_all(&self, fresh: HashMap<String, String>) {
        let mut notes = self.write_notes();
        if *notes != fresh {
            *notes = fresh;
            self.notify();
        }
    }

    fn notify(&self) {
        self.inner.changes.send_modify(|generation| {
            *generation = generation.wrapping_add(1);
        });
    }

    fn read_notes<T>(&self, f: impl FnOnce(&HashMap<String, String>) -> T) -> T {
        let notes = self
            .inner
            .notes
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        f(&notes)
    }

    fn write_notes(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, String>> {
        self.inner
            .notes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for NoteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoteStore")
            .field("dir", &self.inner.dir)
            .field("notes", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn set(name: &str, body: &str) -> NoteChange {
        NoteChange::Set {
            name: name.to_string(),
            body: body.to_string(),
        }
    }

    #[test]
    fn load_reads_regular_files_only() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path();
        let fp = fingerprint("echo hello");
        fs::write(dir.join(fp.as_str()), "#### hello\n").unwrap();
        fs::create_dir(dir.join("nested")).unwrap();
        fs::write(dir.join("nested/inner"), "ignored").unwrap();
        fs::write(dir.join(".swap"), "ignored").unwrap();

        let store = NoteStore::new(dir);
        assert_eq!(store.load().unwrap(), 1);
        assert_eq!(store.get(&fp).as_deref(), Some("#### hello\n"));
        assert_eq!(
            store.entries(),
            vec![NoteEntry {
                name: fp.to_string(),
                body: "#### hello\n".to_string(),
            }]
        );
    }

    #[test]
    fn load_replaces_previous_mirror() {
        let temp = tempfile::tempdir().unwrap();
        let a = fingerprint("a");
        let b = fingerprint("b");
        fs::write(temp.path().join(a.as_str()), "A").unwrap();

        let store = NoteStore::new(temp.path());
        store.load().unwrap();
        fs::remove_file(temp.path().join(a.as_str())).unwrap();
        fs::write(temp.path().join(b.as_str()), "B").unwrap();
        store.load().unwrap();

        assert!(!store.contains(&a));
        assert_eq!(store.get(&b).as_deref(), Some("B"));
    }

    #[test]
    fn load_missing_dir_is_storage_unavailable() {
        let temp = tempfile::tempdir().unwrap();
        let store = NoteStore::new(temp.path().join("missing"));
        let err = store.load().unwrap_err();
        assert!(matches!(err, NotesError::StorageUnavailable { .. }));
        assert!(err.is_not_found());
        assert!(store.is_empty());
    }

    #[test]
    fn apply_notifies_once_per_effective_batch() {
        let store = NoteStore::new("unused");
        let mut rx = store.subscribe();
        assert_eq!(store.generation(), 0);

        assert!(store.apply(vec![set("a", "1"), set("b", "2")]));
        assert_eq!(store.generation(), 1);
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        assert!(!store.apply(vec![set("a", "1")]));
        assert_eq!(store.generation(), 1);
        assert!(!rx.has_changed().unwrap());

        assert!(store.apply(vec![NoteChange::Remove {
            name: "a".to_string()
        }]));
        assert_eq!(store.generation(), 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn removing_unknown_entry_is_silent() {
        let store = NoteStore::new("unused");
        assert!(!store.apply(vec![NoteChange::Remove {
            name: "nope".to_string()
        }]));
        assert_eq!(store.generation(), 0);
    }

    #[test]
    fn clear_drops_everything() {
        let store = NoteStore::new("unused");
        store.apply(vec![set("a", "1")]);
        assert!(store.clear());
        assert!(store.is_empty());
        assert!(!store.clear());
        assert_eq!(store.generation(), 2);
    }
}
