//! Diff algorithms: Myers and histogram.

pub mod histogram;
pub mod myers;

use crate::line::{prepare, Line};
use crate::{Algorithm, WhitespacePolicy};

/// An edit operation in the edit script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOp {
    /// Line present in both old and new (equal).
    Equal,
    /// Line inserted (present only in new).
    Insert,
    /// Line deleted (present only in old).
    Delete,
}

/// A single edit in the edit script, referencing lines by index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edit {
    /// The operation.
    pub op: EditOp,
    /// Index into the old sequence (meaningful for Equal and Delete).
    pub old_index: usize,
    /// Index into the new sequence (meaningful for Equal and Insert).
    pub new_index: usize,
}

/// Compute a line-level diff between two byte slices under the given
/// algorithm and whitespace policy.
pub fn diff_edits(old: &[u8], new: &[u8], algorithm: Algorithm, policy: WhitespacePolicy) -> Vec<Edit> {
    let (old_lines, new_lines) = prepare(old, new, policy);
    diff_lines(&old_lines, &new_lines, algorithm)
}

pub(crate) fn diff_lines(old: &[Line<'_>], new: &[Line<'_>], algorithm: Algorithm) -> Vec<Edit> {
    match algorithm {
        Algorithm::Myers => myers::diff(old, new),
        Algorithm::Histogram => histogram::diff(old, new),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn myers_and_histogram_agree_on_trivial_insert() {
        let a = diff_edits(b"a\nb\n", b"a\nx\nb\n", Algorithm::Myers, WhitespacePolicy::Exact);
        let h = diff_edits(b"a\nb\n", b"a\nx\nb\n", Algorithm::Histogram, WhitespacePolicy::Exact);
        let inserts_a = a.iter().filter(|e| e.op == EditOp::Insert).count();
        let inserts_h = h.iter().filter(|e| e.op == EditOp::Insert).count();
        assert_eq!(inserts_a, 1);
        assert_eq!(inserts_h, 1);
    }
}
