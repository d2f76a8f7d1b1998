use std::path::PathBuf;

/// Errors shared by the file backend and path utilities.
#[derive(Debug, thiserror::Error)]
pub enum UtilError {
    #[error("not found: {0}")]
    NotFound(PathBuf),

    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("operation unsupported by this backend: {0}")]
    Unsupported(&'static str),

    #[error("path escapes the repository root via '..': {0}")]
    PathEscapesRoot(PathBuf),

    #[error("operation cancelled")]
    Cancelled,

    #[error("could not parse date: {0}")]
    DateParse(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
