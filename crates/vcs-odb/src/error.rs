use vcs_hash::ObjectId;

#[derive(Debug, thiserror::Error)]
pub enum OdbError {
    #[error("object not found: {0}")]
    NotFound(ObjectId),

    #[error("ambiguous object name: {prefix} matches {count} objects")]
    Ambiguous { prefix: String, count: usize },

    #[error("corrupt object {oid}: {reason}")]
    Corrupt { oid: ObjectId, reason: String },

    #[error("delta batch already in progress")]
    BatchInProgress,

    #[error("no delta batch in progress")]
    NoBatch,

    #[error("delta chain too deep (>{max_depth}) resolving {id}")]
    ChainTooDeep { id: ObjectId, max_depth: usize },

    #[error(transparent)]
    Store(#[from] vcs_store::StoreError),

    #[error(transparent)]
    Pack(#[from] vcs_pack::PackError),

    #[error(transparent)]
    Object(#[from] vcs_object::ObjectError),

    #[error(transparent)]
    Hash(#[from] vcs_hash::HashError),

    #[error(transparent)]
    Backend(#[from] vcs_utils::UtilError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
