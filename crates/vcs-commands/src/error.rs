//! Errors a command builder's `call()` can return.

use bstr::BString;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("missing required argument: {0}")]
    MissingArgument(&'static str),

    #[error("ref not found: {0}")]
    RefNotFound(String),

    #[error("path not staged: {0}")]
    PathNotInIndex(BString),

    #[error("path not found in tree: {0}")]
    PathNotFoundInTree(BString),

    #[error("{0} is not a directory")]
    NotADirectory(BString),

    #[error("conflict at {0}")]
    Conflict(BString),

    #[error("no such remote: {0}")]
    RemoteNotFound(String),

    #[error("you have uncommitted changes")]
    UncommittedChanges,

    #[error("a {0} is already in progress")]
    TransformationInProgress(&'static str),

    #[error("no transformation is in progress")]
    NotInProgress,

    #[error("this command has already been called")]
    AlreadyCalled,

    #[error("this command has been closed")]
    Closed,

    #[error(transparent)]
    Repo(#[from] vcs_repository::RepoError),

    #[error(transparent)]
    Index(#[from] vcs_index::IndexError),

    #[error(transparent)]
    Odb(#[from] vcs_odb::OdbError),

    #[error(transparent)]
    Ref(#[from] vcs_ref::RefError),

    #[error(transparent)]
    Object(#[from] vcs_object::ObjectError),

    #[error(transparent)]
    RevWalk(#[from] vcs_revwalk::RevWalkError),

    #[error(transparent)]
    Diff(#[from] vcs_diff::DiffError),

    #[error(transparent)]
    Merge(#[from] vcs_merge::MergeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Guards a builder against being `call()`ed twice, without needing an
/// owned `self` for every method in the fluent chain.
#[derive(Debug, Default)]
pub(crate) struct CallGuard(bool);

impl CallGuard {
    pub(crate) fn check(&mut self) -> Result<(), CommandError> {
        if self.0 {
            return Err(CommandError::AlreadyCalled);
        }
        self.0 = true;
        Ok(())
    }
}
