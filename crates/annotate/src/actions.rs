use crate::{AnnotateError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const COMMAND_SCHEME: &str = "command:";

/// User-triggerable note operations, addressable from markdown command links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteAction {
    Create,
    Edit,
    Delete,
}

impl NoteAction {
    pub const ALL: [Self; 3] = [Self::Create, Self::Edit, Self::Delete];

    #[must_use]
    pub const fn command_id(self) -> &'static str {
        match self {
            Self::Create => "mymy.createDocumentation",
            Self::Edit => "mymy.editDocumentation",
            Self::Delete => "mymy.deleteDocumentation",
        }
    }

    #[must_use]
    pub fn from_command_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.command_id() == id)
    }
}

impl fmt::Display for NoteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command_id())
    }
}

/// Structured argument carried by a command link. Without `line` the action
/// targets the cursor line of the active view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl ActionArgs {
    #[must_use]
    pub const fn line(line: usize) -> Self {
        Self { line: Some(line) }
    }
}

/// `command:<id>?<percent-encoded JSON args>` link for markdown.
#[must_use]
pub fn command_link(action: NoteAction, line: usize) -> String {
    let args = serde_json::to_string(&ActionArgs::line(line))
        .unwrap_or_else(|_| format!("{{\"line\":{line}}}"));
    format!(
        "{COMMAND_SCHEME}{}?{}",
        action.command_id(),
        urlencoding::encode(&args)
    )
}

pub fn parse_command_uri(uri: &str) -> Result<(NoteAction, ActionArgs)> {
    let rest = uri
        .trim()
        .strip_prefix(COMMAND_SCHEME)
        .ok_or_else(|| AnnotateError::InvalidAction(format!("not a command link: {uri}")))?;
    let (id, query) = rest.split_once('?').unwrap_or((rest, ""));
    let action = NoteAction::from_command_id(id)
        .ok_or_else(|| AnnotateError::InvalidAction(format!("unknown command: {id}")))?;

    if query.is_empty() {
        return Ok((action, ActionArgs::default()));
    }
    let decoded = urlencoding::decode(query)
        .map_err(|e| AnnotateError::InvalidAction(format!("bad argument encoding: {e}")))?;
    let args: ActionArgs = serde_json::from_str(&decoded)
        .map_err(|e| AnnotateError::InvalidAction(format!("bad arguments {decoded:?}: {e}")))?;
    Ok((action, args))
}
