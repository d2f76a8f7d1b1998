//! Three-way content merge using diff regions.

use vcs_diff::{diff, line::split_lines, DiffOptions, EditRegion};

use crate::{MergeContentStrategy, MergeError, MergeOptions, MergeOutcome};

/// Perform a three-way content merge of `base`, `ours`, and `theirs`.
///
/// Diffs `base`↔`ours` and `base`↔`theirs`, then walks `base` partitioning
/// it into stable regions (neither side touched) and chunks (at least one
/// side touched). Each chunk is classified only-ours, only-theirs,
/// same-edit, or conflict; conflicts are resolved per
/// [`MergeContentStrategy`].
pub fn merge_content(base: &[u8], ours: &[u8], theirs: &[u8], options: &MergeOptions) -> Result<MergeOutcome, MergeError> {
    if ours == theirs {
        return Ok(MergeOutcome { bytes: ours.to_vec(), has_conflicts: false });
    }
    if base == ours {
        return Ok(MergeOutcome { bytes: theirs.to_vec(), has_conflicts: false });
    }
    if base == theirs {
        return Ok(MergeOutcome { bytes: ours.to_vec(), has_conflicts: false });
    }

    let diff_opts = DiffOptions { algorithm: options.algorithm, whitespace: options.whitespace };
    let regions_ours = diff(base, ours, diff_opts)?;
    let regions_theirs = diff(base, theirs, diff_opts)?;

    let base_lines = split_lines(base);
    let ours_lines = split_lines(ours);
    let theirs_lines = split_lines(theirs);

    let mut output = Vec::new();
    let mut has_conflicts = false;
    let mut base_pos = 0;
    let (mut oi, mut ti) = (0, 0);

    while oi < regions_ours.len() || ti < regions_theirs.len() {
        let o = regions_ours.get(oi);
        let t = regions_theirs.get(ti);

        match (o, t) {
            (Some(o), Some(t)) if o.end_a < t.begin_a || (o.end_a == t.begin_a && o.begin_a < t.begin_a) => {
                emit_base(&mut output, &base_lines, base_pos, o.begin_a);
                emit_range(&mut output, &ours_lines, o.begin_b, o.end_b);
                base_pos = o.end_a;
                oi += 1;
            }
            (Some(o), Some(t)) if t.end_a < o.begin_a || (t.end_a == o.begin_a && t.begin_a < o.begin_a) => {
                emit_base(&mut output, &base_lines, base_pos, t.begin_a);
                emit_range(&mut output, &theirs_lines, t.begin_b, t.end_b);
                base_pos = t.end_a;
                ti += 1;
            }
            (Some(o), Some(t)) => {
                let overlap_start = o.begin_a.min(t.begin_a);
                let mut overlap_end = o.end_a.max(t.end_a);
                emit_base(&mut output, &base_lines, base_pos, overlap_start);

                // A region on one side can span two or more regions on the
                // other; keep absorbing whatever starts before the current
                // overlap end, growing it, until nothing more touches the
                // chunk.
                let mut oj = oi + 1;
                let mut tj = ti + 1;
                loop {
                    let mut grew = false;
                    while oj < regions_ours.len() && regions_ours[oj].begin_a < overlap_end {
                        overlap_end = overlap_end.max(regions_ours[oj].end_a);
                        oj += 1;
                        grew = true;
                    }
                    while tj < regions_theirs.len() && regions_theirs[tj].begin_a < overlap_end {
                        overlap_end = overlap_end.max(regions_theirs[tj].end_a);
                        tj += 1;
                        grew = true;
                    }
                    if !grew {
                        break;
                    }
                }

                let ours_content = project(&base_lines, &ours_lines, &regions_ours[oi..oj], overlap_start, overlap_end);
                let theirs_content = project(&base_lines, &theirs_lines, &regions_theirs[ti..tj], overlap_start, overlap_end);

                if ours_content == theirs_content {
                    output.extend_from_slice(&ours_content);
                } else {
                    emit_chunk(&mut output, &ours_content, &theirs_content, options.strategy, &mut has_conflicts);
                }

                base_pos = overlap_end;
                oi = oj;
                ti = tj;
            }
            (Some(o), None) => {
                emit_base(&mut output, &base_lines, base_pos, o.begin_a);
                emit_range(&mut output, &ours_lines, o.begin_b, o.end_b);
                base_pos = o.end_a;
                oi += 1;
            }
            (None, Some(t)) => {
                emit_base(&mut output, &base_lines, base_pos, t.begin_a);
                emit_range(&mut output, &theirs_lines, t.begin_b, t.end_b);
                base_pos = t.end_a;
                ti += 1;
            }
            (None, None) => unreachable!(),
        }
    }

    emit_base(&mut output, &base_lines, base_pos, base_lines.len());

    Ok(MergeOutcome { bytes: output, has_conflicts })
}

fn emit_chunk(output: &mut Vec<u8>, ours: &[u8], theirs: &[u8], strategy: MergeContentStrategy, has_conflicts: &mut bool) {
    match strategy {
        MergeContentStrategy::Ours => output.extend_from_slice(ours),
        MergeContentStrategy::Theirs => output.extend_from_slice(theirs),
        MergeContentStrategy::Union => {
            output.extend_from_slice(ours);
            if theirs != ours {
                output.extend_from_slice(theirs);
            }
        }
        MergeContentStrategy::Conflict => {
            *has_conflicts = true;
            output.extend_from_slice(b"<<<<<<< OURS\n");
            output.extend_from_slice(ours);
            output.extend_from_slice(b"=======\n");
            output.extend_from_slice(theirs);
            output.extend_from_slice(b">>>>>>> THEIRS\n");
        }
    }
}

fn emit_base(output: &mut Vec<u8>, base_lines: &[&[u8]], from: usize, to: usize) {
    emit_range(output, base_lines, from, to);
}

fn emit_range(output: &mut Vec<u8>, lines: &[&[u8]], from: usize, to: usize) {
    for line in &lines[from.min(lines.len())..to.min(lines.len())] {
        output.extend_from_slice(line);
    }
}

/// Reconstructs one side's content over base range `[from_a, to_a)`: each
/// region in `regions` (already known to lie entirely within that range)
/// contributes its own `begin_b..end_b` slice, and any gap between or
/// around them — untouched by this side — is copied from `base_lines`.
fn project(base_lines: &[&[u8]], side_lines: &[&[u8]], regions: &[EditRegion], from_a: usize, to_a: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let mut cursor = from_a;
    for region in regions {
        if region.begin_a > cursor {
            emit_base(&mut out, base_lines, cursor, region.begin_a);
        }
        emit_range(&mut out, side_lines, region.begin_b, region.end_b);
        cursor = region.end_a;
    }
    if cursor < to_a {
        emit_base(&mut out, base_lines, cursor, to_a);
    }
    out
}
