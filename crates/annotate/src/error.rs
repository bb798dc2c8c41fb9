use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnnotateError>;

#[derive(Error, Debug)]
pub enum AnnotateError {
    #[error("no active document")]
    NoActiveDocument,

    #[error("line {line} is out of range (document has {line_count} lines)")]
    LineOutOfRange { line: usize, line_count: usize },

    #[error(transparent)]
    Notes(#[from] mymy_notes::NotesError),

    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error("host error: {0}")]
    Host(String),
}
