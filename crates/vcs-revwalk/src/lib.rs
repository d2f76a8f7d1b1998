//! Commit ancestry traversal and merge-base computation.
//!
//! Operates over a narrow `CommitSource` capability (read a commit, check
//! whether an id names one) rather than a full repository facade, so it
//! has no dependency on the working-copy/status layer above it.

mod merge_base;
mod walk;

pub use merge_base::{is_ancestor, merge_base, merge_base_one};
pub use walk::{RevWalk, SortOrder, WalkOptions};

use vcs_hash::ObjectId;
use vcs_object::{Commit, Object, ObjectType};
use vcs_odb::ObjectDatabase;

#[derive(Debug, thiserror::Error)]
pub enum RevWalkError {
    #[error("commit {0} not found")]
    CommitNotFound(ObjectId),
    #[error("{0} is not a commit")]
    NotACommit(ObjectId),
    #[error(transparent)]
    Odb(#[from] vcs_odb::OdbError),
    #[error(transparent)]
    Ref(#[from] vcs_ref::RefError),
}

/// Read a commit from the object database, erroring if the id is missing
/// or names a non-commit object.
fn read_commit(odb: &ObjectDatabase, id: &ObjectId) -> Result<Commit, RevWalkError> {
    let obj = odb.read(id)?.ok_or(RevWalkError::CommitNotFound(*id))?;
    match obj {
        Object::Commit(c) => Ok(c),
        _ => Err(RevWalkError::NotACommit(*id)),
    }
}

/// Whether `id` names a commit object, without fully decoding it.
fn is_commit(odb: &ObjectDatabase, id: &ObjectId) -> bool {
    matches!(odb.read_header(id), Ok(Some(info)) if info.object_type == ObjectType::Commit)
}
