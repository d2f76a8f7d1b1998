//! Unified object database: loose + pack storage (L0/L1 unification), the
//! delta engine (compute/apply/chain-resolve, batch lifecycle), and GC
//! scheduling, all built over the structured object model in `vcs-object`.

mod database;
mod delta_engine;
mod error;
mod gc;

pub use database::{ObjectDatabase, ObjectInfo};
pub use delta_engine::{
    DeltaEngine, DEFAULT_MAX_CHAIN_DEPTH, DEFAULT_MAX_RATIO, DEFAULT_MIN_SIZE,
};
pub use error::OdbError;
pub use gc::{
    GcController, GcEvent, DEFAULT_CHAIN_DEPTH_THRESHOLD, DEFAULT_LOOSE_OBJECT_THRESHOLD,
    DEFAULT_MIN_INTERVAL, DEFAULT_QUICK_PACK_THRESHOLD, DEFAULT_WINDOW_SIZE,
};

pub use vcs_pack::ChainInfo;
