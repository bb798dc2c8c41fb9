use crate::{DocumentId, EditorHost};
use log::debug;
use mymy_notes::{fingerprint, NoteStore};
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Maximum preview length in grapheme clusters.
    pub preview_chars: usize,
    pub marker: String,
    pub color: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            preview_chars: 60,
            marker: "📌".to_string(),
            color: "#888888".to_string(),
        }
    }
}

/// Inline marker placed after the last character of a line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decoration {
    pub line: usize,
    /// Position in characters; always the end of the line.
    pub column: usize,
    pub text: String,
    pub color: String,
}

/// First non-blank line of a note, trimmed and cut to `max_graphemes`.
#[must_use]
pub fn note_preview(body: &str, max_graphemes: usize) -> String {
    let first = body
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default();
    let max = max_graphemes.max(1);
    let mut graphemes = first.graphemes(true);
    let head: String = graphemes.by_ref().take(max).collect();
    if graphemes.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}

/// Computes the full decoration set for a document from the note store.
///
/// Every refresh recomputes all lines and replaces the host's set wholesale;
/// there is no incremental patching.
#[derive(Debug, Clone)]
pub struct AnnotationRenderer {
    store: NoteStore,
    config: RenderConfig,
}

impl AnnotationRenderer {
    #[must_use]
    pub fn new(store: NoteStore, config: RenderConfig) -> Self {
        Self { store, config }
    }

    #[must_use]
    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn decorate_lines<I, S>(&self, lines: I) -> Vec<Decoration>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        lines
            .into_iter()
            .enumerate()
            .filter_map(|(idx, line)| self.decorate_line(idx, line.as_ref()))
            .collect()
    }

    #[must_use]
    pub fn decorate_document(&self, host: &dyn EditorHost, document: &DocumentId) -> Vec<Decoration> {
        let line_count = host.line_count(document).unwrap_or(0);
        self.decorate_lines((0..line_count).map_while(|idx| host.line_text(document, idx)))
    }

    /// Recomputes and submits decorations for the active view.
    ///
    /// Returns the number of decorations submitted, or `None` without an active view.
    pub fn refresh(&self, host: &dyn EditorHost) -> Option<usize> {
        let view = host.active_view()?;
        let decorations = self.decorate_document(host, &view.document);
        let count = decorations.len();
        debug!("Applying {count} note decorations to {}", view.document);
        host.set_decorations(&view.document, decorations);
        Some(count)
    }

    fn decorate_line(&self, line: usize, text: &str) -> Option<Decoration> {
        let body = self.store.get(&fingerprint(text))?;
        Some(Decoration {
            line,
            column: text.chars().count(),
            text: format!(
                " {} {}",
                self.config.marker,
                note_preview(&body, self.config.preview_chars)
            ),
            color: self.config.color.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_uses_first_non_blank_line() {
        assert_eq!(note_preview("\n\n  #### title  \nmore", 60), "#### title");
        assert_eq!(note_preview("   \n", 60), "");
    }

    #[test]
    fn preview_truncates_by_grapheme() {
        assert_eq!(note_preview("abcdef", 3), "abc…");
        assert_eq!(note_preview("abc", 3), "abc");
        assert_eq!(note_preview("🗑️🗑️🗑️", 2), "🗑️🗑️…");
        assert_eq!(note_preview("日本語のメモ", 3), "日本語…");
    }
}
