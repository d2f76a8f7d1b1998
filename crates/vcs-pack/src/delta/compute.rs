//! Compute a delta that transforms a source byte string into a target one.
//!
//! Builds a hash table of fixed-size blocks from the source, then scans
//! the target for matching blocks. Matching regions become copy
//! instructions, non-matching regions become insert instructions.

use std::collections::HashMap;

use super::{encode_op, fossil_checksum, write_varint, DeltaOp};

/// Block size for the block index (must divide evenly for `build_block_index`).
const BLOCK_SIZE: usize = 16;

/// Compute `start(target.len())` + ops + `finish(checksum)` transforming
/// `source` into `target`.
pub fn compute_delta(source: &[u8], target: &[u8]) -> Vec<u8> {
    let mut delta = write_varint(target.len());

    if target.is_empty() {
        delta.extend_from_slice(&fossil_checksum(target).to_be_bytes());
        return delta;
    }

    let index = build_block_index(source);

    let mut tpos = 0;
    let mut pending_insert: Vec<u8> = Vec::new();

    while tpos < target.len() {
        let remaining = target.len() - tpos;

        if remaining >= BLOCK_SIZE {
            let block = &target[tpos..tpos + BLOCK_SIZE];
            if let Some(&src_offset) = index.get(block) {
                let match_len = extend_match(source, src_offset, target, tpos);
                flush_insert(&mut delta, &mut pending_insert);
                delta.extend_from_slice(&encode_op(&DeltaOp::Copy {
                    source_start: src_offset,
                    length: match_len,
                }));
                tpos += match_len;
                continue;
            }
        }

        pending_insert.push(target[tpos]);
        tpos += 1;

        // Keep inserts from growing unbounded; the varint length has no
        // hard cap but large single ops hurt locality of small edits.
        if pending_insert.len() == 4096 {
            flush_insert(&mut delta, &mut pending_insert);
        }
    }
    flush_insert(&mut delta, &mut pending_insert);

    delta.extend_from_slice(&fossil_checksum(target).to_be_bytes());
    delta
}

fn build_block_index(source: &[u8]) -> HashMap<&[u8], usize> {
    let mut index = HashMap::new();
    if source.len() < BLOCK_SIZE {
        return index;
    }
    for offset in (0..=source.len() - BLOCK_SIZE).step_by(BLOCK_SIZE) {
        let block = &source[offset..offset + BLOCK_SIZE];
        index.entry(block).or_insert(offset);
    }
    index
}

fn extend_match(source: &[u8], src_off: usize, target: &[u8], tgt_off: usize) -> usize {
    let max_len = std::cmp::min(source.len() - src_off, target.len() - tgt_off);
    let mut len = BLOCK_SIZE;
    while len < max_len && source[src_off + len] == target[tgt_off + len] {
        len += 1;
    }
    len
}

fn flush_insert(delta: &mut Vec<u8>, pending: &mut Vec<u8>) {
    if pending.is_empty() {
        return;
    }
    delta.extend_from_slice(&encode_op(&DeltaOp::Insert(std::mem::take(pending))));
}

/// Ratio of delta size to target size, as used by the deltify acceptance
/// rule (lower is better).
pub fn compression_ratio(delta: &[u8], target_len: usize) -> f64 {
    if target_len == 0 {
        return 0.0;
    }
    delta.len() as f64 / target_len as f64
}
