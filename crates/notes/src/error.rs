use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, NotesError>;

#[derive(Error, Debug)]
pub enum NotesError {
    #[error("note storage unavailable at {}: {source}", path.display())]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("watch failure: {0}")]
    WatchFailure(String),

    #[error("note I/O error at {}: {source}", path.display())]
    NoteIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid fingerprint: {0:?}")]
    InvalidFingerprint(String),
}

impl NotesError {
    pub(crate) fn note_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::NoteIo {
            path: path.into(),
            source,
        }
    }

    /// True for I/O failures caused by the target file not existing.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NoteIo { source, .. } | Self::StorageUnavailable { source, .. } => {
                source.kind() == std::io::ErrorKind::NotFound
            }
            _ => false,
        }
    }
}
