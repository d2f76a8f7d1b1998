//! Delta computation/application and pack assembly.
//!
//! This crate owns the binary mechanics of the delta engine: the delta
//! instruction format (`delta` module), pack entry headers (`entry`),
//! delta-chain bookkeeping (`chain`), and assembling/reading whole packs
//! (`pack`). Policy — when to deltify, batch lifecycle, GC scheduling —
//! lives one layer up in `vcs-odb`, which is the only thing that talks to
//! the raw store directly.

pub mod chain;
pub mod delta;
pub mod entry;
pub mod pack;

mod error;
pub use error::PackError;

pub use chain::ChainInfo;
pub use delta::{apply_delta, compute_delta, DeltaOp};
pub use entry::{EntryHeader, PackEntryType};
pub use pack::{PackIndex, PackReader, PackWriter, RawEntry};

/// Default acceptance thresholds for `deltify` (spec §4.2).
pub mod defaults {
    pub const MAX_RATIO: f64 = 0.75;
    pub const MIN_SIZE: usize = 50;
}
