use std::sync::Arc;

use vcs_hash::ObjectId;
use vcs_odb::ObjectDatabase;
use vcs_ref::{FilesRefStore, RefName, Reference};
use vcs_utils::FilesApi;

use crate::RepoError;

/// The object store and ref store bundle a working copy reads commit
/// history through. Corresponds to the `history` field of a [`crate::WorkingCopy`].
pub struct History {
    odb: ObjectDatabase,
    refs: FilesRefStore,
}

impl History {
    pub fn open(files: Arc<dyn FilesApi>) -> Result<Self, RepoError> {
        let odb = ObjectDatabase::open(files.clone(), "objects")?;
        let refs = FilesRefStore::new(files);
        Ok(Self { odb, refs })
    }

    pub fn odb(&self) -> &ObjectDatabase {
        &self.odb
    }

    pub fn refs(&self) -> &FilesRefStore {
        &self.refs
    }

    pub fn refs_mut(&mut self) -> &mut FilesRefStore {
        &mut self.refs
    }

    /// The object HEAD resolves to, or `None` on an unborn branch.
    pub fn head_oid(&self) -> Result<Option<ObjectId>, RepoError> {
        let head = RefName::new("HEAD")?;
        Ok(self.refs.resolve_to_oid(&head)?)
    }

    /// The branch HEAD names, if it is a symbolic ref into `refs/heads/`.
    /// `None` for a detached HEAD or one pointing outside `refs/heads/`.
    pub fn current_branch(&self) -> Result<Option<String>, RepoError> {
        let head = RefName::new("HEAD")?;
        match self.refs.resolve(&head)? {
            Some(Reference::Symbolic { target, .. }) if target.is_branch() => Ok(Some(target.short_name().to_string())),
            _ => Ok(None),
        }
    }

    /// Whether HEAD is symbolic but names a branch with no commits yet.
    pub fn is_unborn(&self) -> Result<bool, RepoError> {
        let head = RefName::new("HEAD")?;
        match self.refs.resolve(&head)? {
            Some(Reference::Symbolic { .. }) => Ok(self.head_oid()?.is_none()),
            _ => Ok(false),
        }
    }
}
