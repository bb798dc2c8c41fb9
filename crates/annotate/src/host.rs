use crate::{Decoration, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Host-side identity of an open document (a path, URI, buffer id...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveView {
    pub document: DocumentId,
    /// Zero-based line of the primary cursor.
    pub cursor_line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewPlacement {
    Active,
    /// Secondary view region next to the source document.
    Beside,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    Info,
    Warning,
}

/// Capabilities the annotation core needs from an editor.
///
/// Lines are zero-based and their text never includes the line terminator.
#[async_trait]
pub trait EditorHost: Send + Sync {
    fn active_view(&self) -> Option<ActiveView>;

    fn line_count(&self, document: &DocumentId) -> Option<usize>;

    fn line_text(&self, document: &DocumentId, line: usize) -> Option<String>;

    /// Replaces every decoration previously set on `document`.
    fn set_decorations(&self, document: &DocumentId, decorations: Vec<Decoration>);

    async fn open_file(&self, path: &Path, placement: ViewPlacement) -> Result<()>;

    fn show_message(&self, level: MessageLevel, message: &str);
}
