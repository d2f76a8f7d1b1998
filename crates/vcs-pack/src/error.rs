use vcs_hash::ObjectId;

/// Errors from delta computation, application, and pack I/O.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    #[error("invalid delta at offset {offset}: {reason}")]
    InvalidDelta { offset: u64, reason: String },

    #[error("delta base not found: {0}")]
    MissingBase(ObjectId),

    #[error("delta checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("delta chain too deep (>{max_depth} levels) resolving {id}")]
    ChainTooDeep { id: ObjectId, max_depth: usize },

    #[error("corrupt pack entry at offset {0}")]
    CorruptEntry(u64),

    #[error("invalid pack index: {0}")]
    InvalidIndex(String),

    #[error(transparent)]
    Object(#[from] vcs_object::ObjectError),

    #[error(transparent)]
    Hash(#[from] vcs_hash::HashError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
