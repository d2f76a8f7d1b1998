//! Object identifiers and content hashing.
//!
//! An [`ObjectId`] is the SHA-1 digest of an object's *framed bytes*
//! (`"<type> <size>\0<payload>"`). This crate has no notion of what an
//! object's type or payload mean — that belongs to `vcs-object`.

mod error;
pub mod hex;

mod hasher;
mod oid;

pub use error::HashError;
pub use hasher::Hasher;
pub use oid::{ObjectId, OID_LEN};
