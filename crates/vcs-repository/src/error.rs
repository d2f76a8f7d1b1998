use std::path::PathBuf;

use bstr::BString;

/// Errors from repository discovery, initialization, and working-copy
/// operations.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("not a git repository (or any of the parent directories): {0}")]
    NotFound(PathBuf),

    #[error("invalid git directory: {path}: {reason}")]
    InvalidGitDir { path: PathBuf, reason: String },

    #[error("bare repository has no working tree")]
    BareNoWorkTree,

    #[error("unable to read HEAD: {0}")]
    InvalidHead(String),

    #[error("a {0} is already in progress")]
    TransformationInProgress(&'static str),

    #[error("no transformation is in progress")]
    NotInProgress,

    #[error("path not found in tree: {0}")]
    PathNotFoundInTree(BString),

    #[error(transparent)]
    Odb(#[from] vcs_odb::OdbError),

    #[error(transparent)]
    Ref(#[from] vcs_ref::RefError),

    #[error(transparent)]
    Index(#[from] vcs_index::IndexError),

    #[error(transparent)]
    Object(#[from] vcs_object::ObjectError),

    #[error(transparent)]
    Util(#[from] vcs_utils::UtilError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
