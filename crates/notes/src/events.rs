use crate::is_note_file_name;
use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify::{Event, EventKind};
use std::path::{Path, PathBuf};

/// A filesystem transition on one note file, as seen by the synchronizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteEvent {
    /// File appeared; its content arrives with a following `Changed`.
    Added(PathBuf),
    /// File content may differ from the mirror and must be re-read.
    Changed(PathBuf),
    /// File is gone from the backing directory.
    Removed(PathBuf),
}

impl NoteEvent {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Added(path) | Self::Changed(path) | Self::Removed(path) => path,
        }
    }

    /// File name of the note, which is also its store key.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.path().file_name().and_then(|name| name.to_str())
    }
}

/// Maps a raw watch event onto note events for entries directly inside `dir`.
///
/// Renames are split by side: the source leaves the directory, the destination is
/// treated as changed because a moved-in file produces no write event of its own.
#[must_use]
pub fn classify(dir: &Path, event: &Event) -> Vec<NoteEvent> {
    let notes = |make: fn(PathBuf) -> NoteEvent| -> Vec<NoteEvent> {
        event
            .paths
            .iter()
            .filter(|path| is_note_entry(dir, path))
            .map(|path| make(path.clone()))
            .collect()
    };

    match event.kind {
        EventKind::Create(_) => notes(NoteEvent::Added),
        EventKind::Remove(_) => notes(NoteEvent::Removed),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => notes(NoteEvent::Removed),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => notes(NoteEvent::Changed),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut out = Vec::with_capacity(2);
            if let Some(from) = event.paths.first().filter(|p| is_note_entry(dir, p)) {
                out.push(NoteEvent::Removed(from.clone()));
            }
            if let Some(to) = event.paths.get(1).filter(|p| is_note_entry(dir, p)) {
                out.push(NoteEvent::Changed(to.clone()));
            }
            out
        }
        // Unknown rename side: the changed handler resolves it against the disk.
        EventKind::Modify(ModifyKind::Name(_)) => notes(NoteEvent::Changed),
        EventKind::Modify(_) => notes(NoteEvent::Changed),
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => notes(NoteEvent::Changed),
        EventKind::Access(_) => Vec::new(),
        EventKind::Any | EventKind::Other => notes(NoteEvent::Changed),
    }
}

/// True when the backend lost track of individual changes (queue overflow) and only
/// a full rescan of the directory can restore the mirror.
#[must_use]
pub fn needs_rescan(event: &Event) -> bool {
    event.need_rescan() || event.paths.is_empty()
}

/// True when the event concerns the backing directory itself rather than an entry.
#[must_use]
pub fn touches_dir(dir: &Path, event: &Event) -> bool {
    event.paths.iter().any(|path| path == dir)
}

fn is_note_entry(dir: &Path, path: &Path) -> bool {
    if path.parent() != Some(dir) {
        return false;
    }
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(is_note_file_name)
}
