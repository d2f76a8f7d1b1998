//! Index extensions: TREE, REUC, and unknown/raw passthrough.

pub mod resolve_undo;
pub mod tree;

use bstr::BString;
use vcs_hash::ObjectId;
use vcs_object::FileMode;

/// An extension this crate doesn't interpret, kept byte-for-byte so a
/// read/write round-trip doesn't drop it.
#[derive(Debug, Clone)]
pub struct RawExtension {
    pub signature: [u8; 4],
    pub data: Vec<u8>,
}

/// Resolve-undo extension (REUC): the pre-conflict stage-1/2/3 versions of
/// paths that have since been resolved, so a resolution can be undone.
#[derive(Debug, Clone)]
pub struct ResolveUndo {
    pub entries: Vec<ResolveUndoEntry>,
}

#[derive(Debug, Clone)]
pub struct ResolveUndoEntry {
    pub path: BString,
    /// [base, ours, theirs]
    pub modes: [Option<FileMode>; 3],
    pub ids: [Option<ObjectId>; 3],
}
