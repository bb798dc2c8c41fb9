//! Editor-facing side of mymy: decorations, hover text, note actions and the
//! owned context that wires them to a host editor.
//!
//! The host is abstract ([`EditorHost`]); everything here is driven either by
//! host events pushed into [`NotesContext::run`] or by direct calls.

mod actions;
mod context;
mod error;
mod host;
mod hover;
mod lifecycle;
mod render;
mod template;

pub use actions::{command_link, parse_command_uri, ActionArgs, NoteAction, COMMAND_SCHEME};
pub use context::{HostEvent, NotesConfig, NotesContext};
pub use error::{AnnotateError, Result};
pub use host::{ActiveView, DocumentId, EditorHost, MessageLevel, ViewPlacement};
pub use hover::{hover_for_line, HoverContent, CREATE_PROMPT};
pub use lifecycle::{CreatedNote, DeletedNote, NoteController, NoteTarget};
pub use render::{note_preview, AnnotationRenderer, Decoration, RenderConfig};
pub use template::default_template;
