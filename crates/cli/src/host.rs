use anyhow::{Context, Result};
use async_trait::async_trait;
use mymy_annotate::{
    ActiveView, AnnotateError, Decoration, DocumentId, EditorHost, MessageLevel, ViewPlacement,
};
use std::fmt::Write as _;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};

/// Editor host backed by one file on disk.
///
/// The file is the only "open" document; its lines are read once and again on
/// [`TerminalHost::reload`]. Decorations are kept for rendering, note files are
/// "opened" by printing their path or by launching an external editor.
pub struct TerminalHost {
    document: DocumentId,
    path: PathBuf,
    cursor_line: usize,
    lines: RwLock<Vec<String>>,
    decorations: Mutex<Vec<Decoration>>,
    editor: Option<String>,
    echo: bool,
}

impl TerminalHost {
    pub fn open(path: &Path, cursor_line: usize) -> Result<Self> {
        let lines = read_lines(path)?;
        Ok(Self {
            document: DocumentId::new(path.display().to_string()),
            path: path.to_path_buf(),
            cursor_line,
            lines: RwLock::new(lines),
            decorations: Mutex::new(Vec::new()),
            editor: None,
            echo: false,
        })
    }

    /// Launch `editor` (a command line such as `vim` or `code -w`) instead of
    /// printing note paths.
    #[must_use]
    pub fn with_editor(mut self, editor: Option<String>) -> Self {
        self.editor = editor.filter(|cmd| !cmd.trim().is_empty());
        self
    }

    /// Print the rendered document every time decorations change.
    #[must_use]
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn document(&self) -> &DocumentId {
        &self.document
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-reads the file after an external edit.
    pub fn reload(&self) -> Result<()> {
        let lines = read_lines(&self.path)?;
        *self.lines.write().unwrap_or_else(PoisonError::into_inner) = lines;
        Ok(())
    }

    pub fn decorations(&self) -> Vec<Decoration> {
        self.decorations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The document with each decoration appended to its line.
    pub fn render(&self) -> String {
        let lines = self.lines.read().unwrap_or_else(PoisonError::into_inner);
        let decorations = self.decorations();
        let mut out = String::new();
        for (idx, line) in lines.iter().enumerate() {
            out.push_str(line);
            for decoration in decorations.iter().filter(|d| d.line == idx) {
                out.push_str(&decoration.text);
            }
            out.push('\n');
        }
        out
    }

    async fn launch_editor(&self, command: &str, path: &Path) -> mymy_annotate::Result<()> {
        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| AnnotateError::Host("empty editor command".to_string()))?;
        let status = tokio::process::Command::new(program)
            .args(parts)
            .arg(path)
            .status()
            .await
            .map_err(|err| AnnotateError::Host(format!("failed to launch {program}: {err}")))?;
        if status.success() {
            Ok(())
        } else {
            Err(AnnotateError::Host(format!("{program} exited with {status}")))
        }
    }
}

#[async_trait]
impl EditorHost for TerminalHost {
    fn active_view(&self) -> Option<ActiveView> {
        Some(ActiveView {
            document: self.document.clone(),
            cursor_line: self.cursor_line,
        })
    }

    fn line_count(&self, document: &DocumentId) -> Option<usize> {
        (*document == self.document)
            .then(|| self.lines.read().unwrap_or_else(PoisonError::into_inner).len())
    }

    fn line_text(&self, document: &DocumentId, line: usize) -> Option<String> {
        if *document != self.document {
            return None;
        }
        self.lines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(line)
            .cloned()
    }

    fn set_decorations(&self, document: &DocumentId, decorations: Vec<Decoration>) {
        if *document != self.document {
            return;
        }
        *self
            .decorations
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = decorations;
        if self.echo {
            let mut frame = String::new();
            let _ = writeln!(frame, "── {} ──", self.document);
            frame.push_str(&self.render());
            let _ = print_stdout(&frame);
        }
    }

    async fn open_file(&self, path: &Path, _placement: ViewPlacement) -> mymy_annotate::Result<()> {
        match &self.editor {
            Some(command) => self.launch_editor(command, path).await,
            None => print_stdout(&format!("{}\n", path.display()))
                .map_err(|err| AnnotateError::Host(err.to_string())),
        }
    }

    fn show_message(&self, level: MessageLevel, message: &str) {
        let label = match level {
            MessageLevel::Info => "info",
            MessageLevel::Warning => "warning",
        };
        eprintln!("{label}: {message}");
    }
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes)
        .lines()
        .map(str::to_string)
        .collect())
}

/// Writes to stdout, treating a closed pipe as success.
pub fn print_stdout(text: &str) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    match stdout.write_all(text.as_bytes()).and_then(|()| stdout.flush()) {
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn host_for(text: &str) -> (TempDir, TerminalHost) {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("run.sh");
        std::fs::write(&path, text).unwrap();
        let host = TerminalHost::open(&path, 1).unwrap();
        (temp, host)
    }

    #[test]
    fn lines_exclude_terminators() {
        let (_temp, host) = host_for("a\r\nb\nc");
        let doc = host.document().clone();
        assert_eq!(host.line_count(&doc), Some(3));
        assert_eq!(host.line_text(&doc, 0).as_deref(), Some("a"));
        assert_eq!(host.line_text(&doc, 2).as_deref(), Some("c"));
        assert_eq!(host.line_text(&doc, 3), None);
        assert_eq!(host.active_view().unwrap().cursor_line, 1);
    }

    #[test]
    fn render_appends_decorations() {
        let (_temp, host) = host_for("one\ntwo\n");
        let doc = host.document().clone();
        host.set_decorations(
            &doc,
            vec![Decoration {
                line: 1,
                column: 3,
                text: " 📌 note".to_string(),
                color: "#888888".to_string(),
            }],
        );
        assert_eq!(host.render(), "one\ntwo 📌 note\n");

        host.set_decorations(&doc, Vec::new());
        assert_eq!(host.render(), "one\ntwo\n");
    }

    #[test]
    fn reload_picks_up_edits() {
        let (_temp, host) = host_for("old\n");
        std::fs::write(host.path(), "new\nlines\n").unwrap();
        host.reload().unwrap();
        let doc = host.document().clone();
        assert_eq!(host.line_text(&doc, 0).as_deref(), Some("new"));
        assert_eq!(host.line_count(&doc), Some(2));
    }
}
