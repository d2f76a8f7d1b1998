//! Line-level diff engine.
//!
//! Diffs two byte streams as sequences of lines, under a choice of
//! algorithm ([`Algorithm::Myers`], [`Algorithm::Histogram`]) and
//! whitespace policy. The public entry point, [`diff`], coalesces the
//! raw per-line edit script into a sorted list of non-overlapping
//! [`EditRegion`]s.

pub mod algorithm;
pub mod line;

pub use algorithm::{Edit, EditOp};
pub use line::WhitespacePolicy;

/// Which diff algorithm to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Algorithm {
    /// Classic Myers O((N+M)*D) shortest-edit-script. Always succeeds.
    Myers,
    /// Recursive splitting on the rarest shared line. Default: handles
    /// repeated elements better than pure patience diff.
    #[default]
    Histogram,
}

/// Options controlling a [`diff`] call.
#[derive(Debug, Clone, Copy)]
pub struct DiffOptions {
    pub algorithm: Algorithm,
    pub whitespace: WhitespacePolicy,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self { algorithm: Algorithm::default(), whitespace: WhitespacePolicy::default() }
    }
}

/// The kind of change an [`EditRegion`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
    Insert,
    Delete,
    Replace,
}

/// A contiguous, non-overlapping region of change between two line
/// sequences, expressed as half-open line ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditRegion {
    pub kind: EditKind,
    pub begin_a: usize,
    pub end_a: usize,
    pub begin_b: usize,
    pub end_b: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    #[error("input is binary, line diff unsupported")]
    BinaryInput,
}

/// Diff `old` against `new`, returning a sorted list of non-overlapping
/// edit regions. Errors if either side looks binary (a NUL within the
/// first ~8 KiB).
pub fn diff(old: &[u8], new: &[u8], options: DiffOptions) -> Result<Vec<EditRegion>, DiffError> {
    if line::looks_binary(old) || line::looks_binary(new) {
        return Err(DiffError::BinaryInput);
    }
    let edits = algorithm::diff_edits(old, new, options.algorithm, options.whitespace);
    Ok(coalesce(&edits))
}

/// Merge consecutive non-equal edits into typed regions.
fn coalesce(edits: &[Edit]) -> Vec<EditRegion> {
    let mut regions = Vec::new();
    let mut i = 0;
    while i < edits.len() {
        if edits[i].op == EditOp::Equal {
            i += 1;
            continue;
        }
        let begin_a = edits[i].old_index;
        let begin_b = edits[i].new_index;
        let mut end_a = begin_a;
        let mut end_b = begin_b;
        let mut saw_delete = false;
        let mut saw_insert = false;

        while i < edits.len() && edits[i].op != EditOp::Equal {
            match edits[i].op {
                EditOp::Delete => {
                    end_a = edits[i].old_index + 1;
                    saw_delete = true;
                }
                EditOp::Insert => {
                    end_b = edits[i].new_index + 1;
                    saw_insert = true;
                }
                EditOp::Equal => unreachable!(),
            }
            i += 1;
        }

        let kind = match (saw_delete, saw_insert) {
            (true, true) => EditKind::Replace,
            (true, false) => EditKind::Delete,
            (false, true) => EditKind::Insert,
            (false, false) => unreachable!("a change region must touch at least one side"),
        };

        regions.push(EditRegion { kind, begin_a, end_a, begin_b, end_b });
    }
    regions
}
