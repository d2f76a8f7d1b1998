//! Three-way content merge: diff `base` against `ours` and `theirs`, then
//! interleave non-overlapping changes and mark up the rest as conflicts.

mod content;

pub use content::merge_content;

use vcs_diff::{Algorithm, WhitespacePolicy};

/// How to resolve a chunk where both sides touched the same base region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeContentStrategy {
    /// Wrap the conflicting chunk in `<<<<<<< OURS / ======= / >>>>>>> THEIRS` markers.
    #[default]
    Conflict,
    /// Take our side, no markers.
    Ours,
    /// Take their side, no markers.
    Theirs,
    /// Concatenate ours then theirs, de-duplicated when identical.
    Union,
}

/// Options controlling [`merge_content`].
#[derive(Debug, Clone, Copy)]
pub struct MergeOptions {
    pub algorithm: Algorithm,
    pub whitespace: WhitespacePolicy,
    pub strategy: MergeContentStrategy,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self { algorithm: Algorithm::default(), whitespace: WhitespacePolicy::default(), strategy: MergeContentStrategy::default() }
    }
}

/// Result of a three-way content merge.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub bytes: Vec<u8>,
    pub has_conflicts: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error(transparent)]
    Diff(#[from] vcs_diff::DiffError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options() {
        let opts = MergeOptions::default();
        assert_eq!(opts.strategy, MergeContentStrategy::Conflict);
        assert_eq!(opts.algorithm, Algorithm::Histogram);
    }
}
