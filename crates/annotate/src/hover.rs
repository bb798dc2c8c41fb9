use crate::{command_link, NoteAction};
use mymy_notes::{fingerprint, NoteStore};
use serde::Serialize;

pub const CREATE_PROMPT: &str = "📌 **Create a note for this line?**";

/// Markdown shown when hovering a line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HoverContent {
    pub markdown: String,
    /// Command links inside `markdown` must be enabled by the host.
    pub trusted: bool,
}

/// The note for `line_text` if one exists, otherwise a prompt linking to the
/// create action for `line`.
#[must_use]
pub fn hover_for_line(store: &NoteStore, line_text: &str, line: usize) -> HoverContent {
    let markdown = store.get(&fingerprint(line_text)).unwrap_or_else(|| {
        format!(
            "{CREATE_PROMPT}\n\n[📝 Create documentation]({})",
            command_link(NoteAction::Create, line)
        )
    });
    HoverContent {
        markdown,
        trusted: true,
    }
}
