//! Myers diff algorithm implementation.
//!
//! Implements Eugene Myers' O(ND) difference algorithm as described in
//! "An O(ND) Difference Algorithm and Its Variations" (1986). Always finds
//! the minimal edit script; this is the algorithm's whole appeal over
//! histogram's heuristic splitting.

use super::{Edit, EditOp};
use crate::line::Line;

/// Compute a diff using the Myers algorithm.
pub fn diff(old: &[Line<'_>], new: &[Line<'_>]) -> Vec<Edit> {
    if old.is_empty() && new.is_empty() {
        return Vec::new();
    }
    if old.is_empty() {
        return (0..new.len()).map(|i| Edit { op: EditOp::Insert, old_index: 0, new_index: i }).collect();
    }
    if new.is_empty() {
        return (0..old.len()).map(|i| Edit { op: EditOp::Delete, old_index: i, new_index: 0 }).collect();
    }

    // Trim common prefix and suffix before running the core algorithm.
    let prefix_len = old.iter().zip(new.iter()).take_while(|(a, b)| a == b).count();

    let suffix_len =
        old[prefix_len..].iter().rev().zip(new[prefix_len..].iter().rev()).take_while(|(a, b)| a == b).count();

    let old_trimmed = &old[prefix_len..old.len() - suffix_len];
    let new_trimmed = &new[prefix_len..new.len() - suffix_len];

    let inner_edits = myers_inner(old_trimmed, new_trimmed);

    let mut edits = Vec::with_capacity(old.len() + new.len());

    for i in 0..prefix_len {
        edits.push(Edit { op: EditOp::Equal, old_index: i, new_index: i });
    }

    for edit in inner_edits {
        edits.push(Edit { op: edit.op, old_index: edit.old_index + prefix_len, new_index: edit.new_index + prefix_len });
    }

    for i in 0..suffix_len {
        edits.push(Edit { op: EditOp::Equal, old_index: old.len() - suffix_len + i, new_index: new.len() - suffix_len + i });
    }

    edits
}

/// Core Myers algorithm on pre-trimmed sequences.
fn myers_inner(old: &[Line<'_>], new: &[Line<'_>]) -> Vec<Edit> {
    let n = old.len();
    let m = new.len();

    if n == 0 && m == 0 {
        return Vec::new();
    }
    if n == 0 {
        return (0..m).map(|j| Edit { op: EditOp::Insert, old_index: 0, new_index: j }).collect();
    }
    if m == 0 {
        return (0..n).map(|i| Edit { op: EditOp::Delete, old_index: i, new_index: 0 }).collect();
    }

    let max_d = n + m;
    let v_size = 2 * max_d + 1;
    let v_offset = max_d as isize;

    let mut trace: Vec<Vec<usize>> = Vec::new();
    let mut v = vec![0usize; v_size];

    'outer: for d in 0..=max_d {
        let mut v_copy = v.clone();

        let k_min = -(d as isize);
        let k_max = d as isize;

        let mut k = k_min;
        while k <= k_max {
            let idx = (k + v_offset) as usize;

            let mut x = if k == k_min || (k != k_max && v[((k - 1) + v_offset) as usize] < v[((k + 1) + v_offset) as usize]) {
                v[((k + 1) + v_offset) as usize]
            } else {
                v[((k - 1) + v_offset) as usize] + 1
            };

            let mut y = (x as isize - k) as usize;

            while x < n && y < m && old[x] == new[y] {
                x += 1;
                y += 1;
            }

            v_copy[idx] = x;

            if x >= n && y >= m {
                trace.push(v_copy);
                break 'outer;
            }

            k += 2;
        }

        trace.push(v_copy);
        v = trace.last().unwrap().clone();
    }

    backtrack(&trace, n, m, v_offset)
}

/// Backtrack through the trace to produce the edit script.
fn backtrack(trace: &[Vec<usize>], n: usize, m: usize, v_offset: isize) -> Vec<Edit> {
    let mut edits = Vec::new();
    let mut x = n;
    let mut y = m;

    for d in (0..trace.len()).rev() {
        let k = x as isize - y as isize;

        let prev_k = if d == 0 {
            k
        } else if k == -(d as isize)
            || (k != d as isize && trace[d - 1][((k - 1) + v_offset) as usize] < trace[d - 1][((k + 1) + v_offset) as usize])
        {
            k + 1
        } else {
            k - 1
        };

        let prev_x = if d == 0 { 0 } else { trace[d - 1][(prev_k + v_offset) as usize] };
        let prev_y = (prev_x as isize - prev_k) as usize;

        while x > prev_x && y > prev_y && x > 0 && y > 0 {
            x -= 1;
            y -= 1;
            edits.push(Edit { op: EditOp::Equal, old_index: x, new_index: y });
        }

        if d > 0 {
            if prev_k == k + 1 {
                if y > 0 {
                    y -= 1;
                    edits.push(Edit { op: EditOp::Insert, old_index: x, new_index: y });
                }
            } else if x > 0 {
                x -= 1;
                edits.push(Edit { op: EditOp::Delete, old_index: x, new_index: y });
            }
        }
    }

    edits.reverse();
    edits
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
    fn all_different() {
        let edits = run(b"a\nb\n", b"c\nd\n");
        let deletes = edits.iter().filter(|e| e.op == EditOp::Delete).count();
        let inserts = edits.iter().filter(|e| e.op == EditOp::Insert).count();
        assert_eq!(deletes, 2);
        assert_eq!(inserts, 2);
    }

    #[test]
    fn insert_at_end() {
        let edits = run(b"a\nb\n", b"a\nb\nc\n");
        let inserts = edits.iter().filter(|e| e.op == EditOp::Insert).count();
        let equals = edits.iter().filter(|e| e.op == EditOp::Equal).count();
        assert_eq!(inserts, 1);
        assert_eq!(equals, 2);
    }

    #[test]
    fn delete_from_middle() {
        let edits = run(b"a\nb\nc\n", b"a\nc\n");
        let deletes = edits.iter().filter(|e| e.op == EditOp::Delete).count();
        let equals = edits.iter().filter(|e| e.op == EditOp::Equal).count();
        assert_eq!(deletes, 1);
        assert_eq!(equals, 2);
    }

    #[test]
    fn empty_old() {
        let edits = run(b"", b"a\nb\n");
        assert_eq!(edits.len(), 2);
        assert!(edits.iter().all(|e| e.op == EditOp::Insert));
    }

    #[test]
    fn empty_new() {
        let edits = run(b"a\nb\n", b"");
        assert_eq!(edits.len(), 2);
        assert!(edits.iter().all(|e| e.op == EditOp::Delete));
    }

    #[test]
    fn both_empty() {
        assert!(run(b"", b"").is_empty());
    }
}
