//! Apply a delta instruction stream to a base object, reproducing the target.

use super::{fossil_checksum, parse_delta, DeltaOp};
use crate::PackError;

/// Apply `delta` to `base`, verifying the target length and Fossil
/// checksum recorded by `finish`.
pub fn apply_delta(base: &[u8], delta: &[u8]) -> Result<Vec<u8>, PackError> {
    let (target_length, ops, expected_checksum) = parse_delta(delta)?;

    let mut output = Vec::with_capacity(target_length);
    for op in &ops {
        match op {
            DeltaOp::Copy { source_start, length } => {
                let end = source_start.checked_add(*length).ok_or_else(|| {
                    PackError::InvalidDelta {
                        offset: 0,
                        reason: "copy range overflow".into(),
                    }
                })?;
                if end > base.len() {
                    return Err(PackError::InvalidDelta {
                        offset: 0,
                        reason: format!(
                            "copy out of bounds: start={source_start}, length={length}, base_len={}",
                            base.len()
                        ),
                    });
                }
                output.extend_from_slice(&base[*source_start..end]);
            }
            DeltaOp::Insert(bytes) => output.extend_from_slice(bytes),
        }
    }

    if output.len() != target_length {
        return Err(PackError::InvalidDelta {
            offset: 0,
            reason: format!(
                "target size mismatch: delta says {target_length}, got {}",
                output.len()
            ),
        });
    }

    let actual_checksum = fossil_checksum(&output);
    if actual_checksum != expected_checksum {
        return Err(PackError::ChecksumMismatch {
            expected: expected_checksum,
            actual: actual_checksum,
        });
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::{encode_op, fossil_checksum, write_varint, DeltaOp};

    fn build_delta(target_len: usize, ops: &[DeltaOp], checksum: u32) -> Vec<u8> {
        let mut delta = write_varint(target_len);
        for op in ops {
            delta.extend_from_slice(&encode_op(op));
        }
        delta.extend_from_slice(&checksum.to_be_bytes());
        delta
    }

    #[test]
    fn apply_copy_only() {
        let base = b"Hello, World!";
        let ops = [
            DeltaOp::Copy { source_start: 0, length: 5 },
            DeltaOp::Copy { source_start: 7, length: 5 },
        ];
        let delta = build_delta(10, &ops, fossil_checksum(b"HelloWorld"));
        let result = apply_delta(base, &delta).unwrap();
        assert_eq!(result, b"HelloWorld");
    }

    #[test]
    fn apply_insert_only() {
        let ops = [DeltaOp::Insert(b"NEW".to_vec())];
        let delta = build_delta(3, &ops, fossil_checksum(b"NEW"));
        let result = apply_delta(b"unused base", &delta).unwrap();
        assert_eq!(result, b"NEW");
    }

    #[test]
    fn apply_mixed_instructions() {
        let base = b"ABCDEFGHIJ";
        let ops = [
            DeltaOp::Copy { source_start: 0, length: 3 },
            DeltaOp::Insert(b"xyz".to_vec()),
            DeltaOp::Copy { source_start: 7, length: 3 },
        ];
        let delta = build_delta(9, &ops, fossil_checksum(b"ABCxyzHIJ"));
        let result = apply_delta(base, &delta).unwrap();
        assert_eq!(result, b"ABCxyzHIJ");
    }

    #[test]
    fn copy_out_of_bounds_fails() {
        let base = b"short";
        let ops = [DeltaOp::Copy { source_start: 0, length: 100 }];
        let delta = build_delta(100, &ops, 0);
        assert!(apply_delta(base, &delta).is_err());
    }

    #[test]
    fn target_size_mismatch_fails() {
        let base = b"Hello";
        let ops = [DeltaOp::Copy { source_start: 0, length: 5 }];
        let delta = build_delta(10, &ops, fossil_checksum(b"Hello"));
        assert!(apply_delta(base, &delta).is_err());
    }

    #[test]
    fn checksum_mismatch_fails() {
        let base = b"Hello";
        let ops = [DeltaOp::Copy { source_start: 0, length: 5 }];
        let delta = build_delta(5, &ops, 0xdead_beef);
        let result = apply_delta(base, &delta);
        assert!(matches!(result, Err(PackError::ChecksumMismatch { .. })));
    }

    #[test]
    fn empty_delta_produces_empty_output() {
        let delta = build_delta(0, &[], fossil_checksum(b""));
        let result = apply_delta(b"anything", &delta).unwrap();
        assert!(result.is_empty());
    }
}
