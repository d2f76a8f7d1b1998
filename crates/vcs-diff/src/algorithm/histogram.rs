//! Histogram diff algorithm.
//!
//! Recursively splits on the rarest line shared by both sides, preferring
//! longer unique anchors. Falls back to Myers once `max_chain_length`
//! recursion levels are exceeded, matching C git's xdiff/xhistogram.c.

use std::collections::HashMap;

use super::{myers, Edit, EditOp};
use crate::line::{line_hash, Line};

/// Recursion depth at which a region is handed off to Myers instead of
/// being split further.
pub const DEFAULT_MAX_CHAIN_LENGTH: usize = 64;

/// Compute a diff using the histogram algorithm with the default chain limit.
pub fn diff(old: &[Line<'_>], new: &[Line<'_>]) -> Vec<Edit> {
    diff_with_limit(old, new, DEFAULT_MAX_CHAIN_LENGTH)
}

/// Compute a diff using the histogram algorithm, handing a region off to
/// Myers once recursion exceeds `max_chain_length`.
pub fn diff_with_limit(old: &[Line<'_>], new: &[Line<'_>], max_chain_length: usize) -> Vec<Edit> {
    if old.is_empty() && new.is_empty() {
        return Vec::new();
    }
    if old.is_empty() {
        return (0..new.len()).map(|i| Edit { op: EditOp::Insert, old_index: 0, new_index: i }).collect();
    }
    if new.is_empty() {
        return (0..old.len()).map(|i| Edit { op: EditOp::Delete, old_index: i, new_index: 0 }).collect();
    }

    let mut edits = Vec::new();
    recurse(old, new, 0, 0, &mut edits, 0, max_chain_length);
    edits
}

fn recurse(
    old: &[Line<'_>],
    new: &[Line<'_>],
    old_offset: usize,
    new_offset: usize,
    edits: &mut Vec<Edit>,
    depth: usize,
    max_chain_length: usize,
) {
    if old.is_empty() && new.is_empty() {
        return;
    }

    if depth >= max_chain_length {
        for mut e in myers::diff(old, new) {
            e.old_index += old_offset;
            e.new_index += new_offset;
            edits.push(e);
        }
        return;
    }

    if old.is_empty() {
        for i in 0..new.len() {
            edits.push(Edit { op: EditOp::Insert, old_index: old_offset, new_index: new_offset + i });
        }
        return;
    }
    if new.is_empty() {
        for i in 0..old.len() {
            edits.push(Edit { op: EditOp::Delete, old_index: old_offset + i, new_index: new_offset });
        }
        return;
    }

    let prefix_len = old.iter().zip(new.iter()).take_while(|(a, b)| a == b).count();
    let suffix_len =
        old[prefix_len..].iter().rev().zip(new[prefix_len..].iter().rev()).take_while(|(a, b)| a == b).count();

    for i in 0..prefix_len {
        edits.push(Edit { op: EditOp::Equal, old_index: old_offset + i, new_index: new_offset + i });
    }

    let old_mid = &old[prefix_len..old.len() - suffix_len];
    let new_mid = &new[prefix_len..new.len() - suffix_len];
    let mid_old_offset = old_offset + prefix_len;
    let mid_new_offset = new_offset + prefix_len;

    if old_mid.is_empty() && new_mid.is_empty() {
        // nothing between prefix and suffix
    } else if old_mid.is_empty() {
        for i in 0..new_mid.len() {
            edits.push(Edit { op: EditOp::Insert, old_index: mid_old_offset, new_index: mid_new_offset + i });
        }
    } else if new_mid.is_empty() {
        for i in 0..old_mid.len() {
            edits.push(Edit { op: EditOp::Delete, old_index: mid_old_offset + i, new_index: mid_new_offset });
        }
    } else {
        // Histogram of old_mid lines by hash, with occurrence counts.
        let mut histogram: HashMap<u64, (usize, Vec<usize>)> = HashMap::new();
        for (i, line) in old_mid.iter().enumerate() {
            let entry = histogram.entry(line_hash(line)).or_insert((0, Vec::new()));
            entry.0 += 1;
            entry.1.push(i);
        }

        let mut best_count = usize::MAX;
        let mut best_old_idx = None;
        let mut best_new_idx = None;

        for (j, line) in new_mid.iter().enumerate() {
            if let Some((count, indices)) = histogram.get(&line_hash(line)) {
                for &oi in indices {
                    if old_mid[oi] == *line && *count < best_count {
                        best_count = *count;
                        best_old_idx = Some(oi);
                        best_new_idx = Some(j);
                    }
                }
            }
        }

        if let (Some(oi), Some(ni)) = (best_old_idx, best_new_idx) {
            recurse(&old_mid[..oi], &new_mid[..ni], mid_old_offset, mid_new_offset, edits, depth + 1, max_chain_length);

            edits.push(Edit { op: EditOp::Equal, old_index: mid_old_offset + oi, new_index: mid_new_offset + ni });

            recurse(
                &old_mid[oi + 1..],
                &new_mid[ni + 1..],
                mid_old_offset + oi + 1,
                mid_new_offset + ni + 1,
                edits,
                depth + 1,
                max_chain_length,
            );
        } else {
            for i in 0..old_mid.len() {
                edits.push(Edit { op: EditOp::Delete, old_index: mid_old_offset + i, new_index: mid_new_offset });
            }
            for j in 0..new_mid.len() {
                edits.push(Edit { op: EditOp::Insert, old_index: mid_old_offset + old_mid.len(), new_index: mid_new_offset + j });
            }
        }
    }

    for i in 0..suffix_len {
        edits.push(Edit {
            op: EditOp::Equal,
            old_index: old.len() - suffix_len + old_offset + i,
            new_index: new.len() - suffix_len + new_offset + i,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::prepare;
    use crate::WhitespacePolicy;

    fn run(old: &[u8], new: &[u8]) -> Vec<Edit> {
        let (o, n) = prepare(old, new, WhitespacePolicy::Exact);
        diff(&o, &n)
    }

    #[test]
    fn identical() {
        let edits = run(b"a\nb\nc\n", b"a\nb\nc\n");
        assert!(edits.iter().all(|e| e.op == EditOp::Equal));
        assert_eq!(edits.len(), 3);
    }

    #[test]
    fn insert_line() {
        let edits = run(b"a\nc\n", b"a\nb\nc\n");
        assert_eq!(edits.iter().filter(|e| e.op == EditOp::Insert).count(), 1);
    }

    #[test]
    fn delete_line() {
        let edits = run(b"a\nb\nc\n", b"a\nc\n");
        assert_eq!(edits.iter().filter(|e| e.op == EditOp::Delete).count(), 1);
    }

    #[test]
    fn empty_inputs() {
        let (empty_o, empty_n) = prepare(b"", b"", WhitespacePolicy::Exact);
        assert!(diff(&empty_o, &empty_n).is_empty());
        let (empty_o, a_n) = prepare(b"", b"x\n", WhitespacePolicy::Exact);
        assert_eq!(diff(&empty_o, &a_n).len(), 1);
    }

    #[test]
    fn falls_back_to_myers_past_chain_limit() {
        let old: Vec<u8> = (0..20).flat_map(|i| format!("l{i}\n").into_bytes()).collect();
        let new: Vec<u8> = (0..20).flat_map(|i| format!("l{i}x\n").into_bytes()).collect();
        let (o, n) = prepare(&old, &new, WhitespacePolicy::Exact);
        let edits = diff_with_limit(&o, &n, 0);
        assert_eq!(edits.iter().filter(|e| e.op == EditOp::Delete).count(), 20);
        assert_eq!(edits.iter().filter(|e| e.op == EditOp::Insert).count(), 20);
    }
}
