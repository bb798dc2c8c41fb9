use crate::{Fingerprint, NotesError, Result};
use std::path::{Path, PathBuf};

pub const DEFAULT_STORAGE_DIR: &str = ".mymy";

#[must_use]
pub fn storage_dir_for_root(root: &Path, storage_dir_name: &str) -> PathBuf {
    root.join(storage_dir_name)
}

#[must_use]
pub fn note_path(storage_dir: &Path, fingerprint: &Fingerprint) -> PathBuf {
    storage_dir.join(fingerprint.as_str())
}

/// Creates the backing directory (and parents) when absent.
pub fn ensure_storage_dir(storage_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(storage_dir).map_err(|source| NotesError::StorageUnavailable {
        path: storage_dir.to_path_buf(),
        source,
    })
}

/// Entries that can never be notes: editor swap/temp files and backups.
#[must_use]
pub fn is_note_file_name(name: &str) -> bool {
    !name.is_empty() && !name.starts_with('.') && !name.ends_with('~')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint;

    #[test]
    fn note_path_uses_fingerprint_as_file_name() {
        let dir = storage_dir_for_root(Path::new("project"), DEFAULT_STORAGE_DIR);
        let path = note_path(&dir, &fingerprint("echo hello"));
        assert_eq!(
            path,
            PathBuf::from("project/.mymy/2e26648e784ec7a0cf4d08534ddda41df35f1a30")
        );
    }

    #[test]
    fn swap_and_backup_files_are_not_notes() {
        assert!(is_note_file_name("2e26648e784ec7a0cf4d08534ddda41df35f1a30"));
        assert!(!is_note_file_name(".2e26648e784ec7a0cf4d08534ddda41df35f1a30.swp"));
        assert!(!is_note_file_name("2e26648e784ec7a0cf4d08534ddda41df35f1a30~"));
        assert!(!is_note_file_name(""));
    }

    #[test]
    fn ensure_storage_dir_creates_nested_dirs() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("a/b").join(DEFAULT_STORAGE_DIR);
        ensure_storage_dir(&dir).unwrap();
        assert!(dir.is_dir());
        ensure_storage_dir(&dir).unwrap();
    }
}
