use crate::{default_template, AnnotateError, EditorHost, Result, ViewPlacement};
use log::{debug, info};
use mymy_notes::{fingerprint, note_path, Fingerprint, NotesError};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// The note a lifecycle action resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteTarget {
    pub line: usize,
    pub fingerprint: Fingerprint,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedNote {
    pub target: NoteTarget,
    /// False when a note file already existed and was left untouched.
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedNote {
    pub target: NoteTarget,
    /// False when there was nothing to delete.
    pub existed: bool,
}

/// Create / open / delete operations on the note of a source line.
///
/// These only touch the filesystem. The note store catches up through the
/// synchronizer once the change lands on disk.
#[derive(Clone)]
pub struct NoteController {
    storage_dir: PathBuf,
    host: Arc<dyn EditorHost>,
}

impl NoteController {
    pub fn new(storage_dir: impl Into<PathBuf>, host: Arc<dyn EditorHost>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            host,
        }
    }

    #[must_use]
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Resolves `line` (or the cursor line) of the active document to its note.
    pub fn target(&self, line: Option<usize>) -> Result<NoteTarget> {
        let view = self
            .host
            .active_view()
            .ok_or(AnnotateError::NoActiveDocument)?;
        let line = line.unwrap_or(view.cursor_line);
        let text = self
            .host
            .line_text(&view.document, line)
            .ok_or_else(|| AnnotateError::LineOutOfRange {
                line,
                line_count: self.host.line_count(&view.document).unwrap_or(0),
            })?;
        let fingerprint = fingerprint(&text);
        Ok(NoteTarget {
            line,
            path: note_path(&self.storage_dir, &fingerprint),
            fingerprint,
        })
    }

    /// Writes the default template unless a note already exists, then opens the
    /// note beside the source.
    pub async fn create_note(&self, line: Option<usize>) -> Result<CreatedNote> {
        let target = self.target(line)?;
        tokio::fs::create_dir_all(&self.storage_dir)
            .await
            .map_err(|source| NotesError::StorageUnavailable {
                path: self.storage_dir.clone(),
                source,
            })?;

        let created = write_new(&target.path, &default_template(target.line)).await?;
        if created {
            info!(
                "Created note {} for line {}",
                target.fingerprint, target.line
            );
        } else {
            debug!("Note {} already exists", target.fingerprint);
        }

        self.host
            .open_file(&target.path, ViewPlacement::Beside)
            .await?;
        Ok(CreatedNote { target, created })
    }

    /// Opens the note file whether or not it exists.
    pub async fn open_note(&self, line: Option<usize>) -> Result<NoteTarget> {
        let target = self.target(line)?;
        self.host
            .open_file(&target.path, ViewPlacement::Beside)
            .await?;
        Ok(target)
    }

    /// Deletes the note file. A missing file is not an error.
    pub async fn delete_note(&self, line: Option<usize>) -> Result<DeletedNote> {
        let target = self.target(line)?;
        let existed = match tokio::fs::remove_file(&target.path).await {
            Ok(()) => true,
            Err(err) if err.kind() == ErrorKind::NotFound => false,
            Err(source) => {
                return Err(NotesError::NoteIo {
                    path: target.path,
                    source,
                }
                .into())
            }
        };
        if existed {
            info!(
                "Deleted note {} for line {}",
                target.fingerprint, target.line
            );
        }
        Ok(DeletedNote { target, existed })
    }
}

/// Creates `path` with `body`; returns false if the file already existed.
async fn write_new(path: &Path, body: &str) -> Result<bool> {
    let io_err = |source| NotesError::NoteIo {
        path: path.to_path_buf(),
        source,
    };
    let mut file = match tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
    {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::AlreadyExists => return Ok(false),
        Err(err) => return Err(io_err(err).into()),
    };
    file.write_all(body.as_bytes()).await.map_err(io_err)?;
    file.flush().await.map_err(io_err)?;
    Ok(true)
}
