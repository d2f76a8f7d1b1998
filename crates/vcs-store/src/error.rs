/// Errors from the raw object store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("key already exists and cannot be overwritten: {0}")]
    AlreadyExists(String),

    #[error("decompression error for {key}: {source}")]
    Decompress {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Backend(#[from] vcs_utils::UtilError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
