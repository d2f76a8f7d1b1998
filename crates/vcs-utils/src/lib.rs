//! Shared building blocks: path normalization, the `FilesApi` backend
//! contract, and cooperative cancellation.

pub mod cancel;
pub mod date;
mod error;
pub mod files;
pub mod path;

pub use bstr::{BStr, BString, ByteSlice, ByteVec};
pub use cancel::CancellationToken;
pub use date::{DateFormat, GitDate, Signature};
pub use error::UtilError;
pub use files::{ByteRange, EntryKind, FileHandle, FilesApi, FsFiles, Stat};
pub use path::GitPath;

pub type Result<T> = std::result::Result<T, UtilError>;
