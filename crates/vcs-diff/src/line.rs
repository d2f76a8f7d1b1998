//! Line splitting, whitespace-aware comparison, and binary detection.

use bstr::BString;

/// How whitespace differences affect line comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WhitespacePolicy {
    /// Lines must match byte-for-byte.
    #[default]
    Exact,
    /// Ignore all whitespace anywhere in the line.
    IgnoreAllSpace,
    /// Ignore leading whitespace only.
    IgnoreLeadingSpace,
    /// Ignore trailing whitespace only.
    IgnoreTrailingSpace,
    /// Collapse runs of whitespace to a single space before comparing.
    IgnoreSpaceChange,
}

/// Number of leading bytes inspected for a NUL byte when deciding whether
/// input is binary (matches C git's `buffer_is_binary` heuristic).
const BINARY_SNIFF_LEN: usize = 8000;

/// True if `data` looks binary: a NUL in roughly the first 8 KiB.
pub fn looks_binary(data: &[u8]) -> bool {
    data[..data.len().min(BINARY_SNIFF_LEN)].contains(&0)
}

/// Split a byte slice into lines, each retaining its trailing `\n` (the
/// final line keeps whatever trailing bytes exist even without one).
pub fn split_lines(data: &[u8]) -> Vec<&[u8]> {
    if data.is_empty() {
        return Vec::new();
    }
    let mut lines = Vec::new();
    let mut start = 0;
    for (i, &byte) in data.iter().enumerate() {
        if byte == b'\n' {
            lines.push(&data[start..=i]);
            start = i + 1;
        }
    }
    if start < data.len() {
        lines.push(&data[start..]);
    }
    lines
}

/// Strip the line's trailing terminator (`\n`, or `\r\n`), if any.
fn strip_terminator(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Reduce `line` to the bytes that matter for comparison under `policy`.
/// The line terminator itself is never significant: two lines split by
/// [`split_lines`] are never compared across a terminator boundary, so its
/// presence or absence can't change the outcome either way.
pub fn normalize(line: &[u8], policy: WhitespacePolicy) -> Vec<u8> {
    let body = strip_terminator(line);
    match policy {
        WhitespacePolicy::Exact => body.to_vec(),
        WhitespacePolicy::IgnoreAllSpace => body.iter().copied().filter(|b| !b.is_ascii_whitespace()).collect(),
        WhitespacePolicy::IgnoreLeadingSpace => {
            let trimmed = body.iter().position(|b| !b.is_ascii_whitespace()).map(|i| &body[i..]).unwrap_or(&[]);
            trimmed.to_vec()
        }
        WhitespacePolicy::IgnoreTrailingSpace => {
            let end = body.iter().rposition(|b| !b.is_ascii_whitespace()).map(|i| i + 1).unwrap_or(0);
            body[..end].to_vec()
        }
        WhitespacePolicy::IgnoreSpaceChange => {
            let mut out = Vec::with_capacity(body.len());
            let mut in_run = false;
            for &b in body {
                if b.is_ascii_whitespace() {
                    if !in_run {
                        out.push(b' ');
                        in_run = true;
                    }
                } else {
                    out.push(b);
                    in_run = false;
                }
            }
            out
        }
    }
}

/// DJB2a (xor variant) hash, matching xdiff's line hashing approach.
fn djb2a(data: &[u8]) -> u64 {
    let mut hash: u64 = 5381;
    for &b in data {
        hash = hash.wrapping_mul(33) ^ (b as u64);
    }
    hash
}

/// A line prepared for comparison: the raw bytes plus the normalized form
/// (and its hash) computed once under the active [`WhitespacePolicy`].
///
/// Equality compares the normalized form, not `raw` — under a policy like
/// `IgnoreTrailingSpace`, two lines with different raw bytes can still be
/// the same line for diffing purposes. The hash is only a fast pre-check;
/// `norm` is always compared too, to stay safe against hash collisions.
#[derive(Debug, Clone)]
pub struct Line<'a> {
    pub raw: &'a [u8],
    norm: Vec<u8>,
    hash: u64,
}

impl<'a> Line<'a> {
    pub fn as_bstring(&self) -> BString {
        BString::from(self.raw)
    }
}

impl PartialEq for Line<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.norm == other.norm
    }
}
impl Eq for Line<'_> {}

/// Split and prepare both sides' lines for comparison under `policy`.
pub fn prepare<'a>(old: &'a [u8], new: &'a [u8], policy: WhitespacePolicy) -> (Vec<Line<'a>>, Vec<Line<'a>>) {
    let make = |data: &'a [u8]| -> Vec<Line<'a>> {
        split_lines(data)
            .into_iter()
            .map(|raw| {
                let norm = normalize(raw, policy);
                let hash = djb2a(&norm);
                Line { raw, norm, hash }
            })
            .collect()
    };
    (make(old), make(new))
}

pub(crate) fn line_hash(line: &Line<'_>) -> u64 {
    line.hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_preserve_terminators() {
        assert_eq!(split_lines(b"a\nb"), vec![b"a\n".as_slice(), b"b"]);
    }

    #[test]
    fn detects_binary() {
        assert!(looks_binary(b"abc\0def"));
        assert!(!looks_binary(b"abc def"));
    }

    #[test]
    fn ignore_all_space_matches() {
        let a = normalize(b"  foo  bar\n", WhitespacePolicy::IgnoreAllSpace);
        let b = normalize(b"foobar\n", WhitespacePolicy::IgnoreAllSpace);
        assert_eq!(a, b);
    }

    #[test]
    fn ignore_space_change_collapses_runs() {
        let a = normalize(b"foo   bar\n", WhitespacePolicy::IgnoreSpaceChange);
        let b = normalize(b"foo bar\n", WhitespacePolicy::IgnoreSpaceChange);
        assert_eq!(a, b);
    }

    #[test]
    fn ignore_trailing_space_strips_end_only() {
        let a = normalize(b"  foo  \n", WhitespacePolicy::IgnoreTrailingSpace);
        assert_eq!(a, b"  foo".to_vec());
    }

    #[test]
    fn exact_lines_compare_equal_by_hash() {
        let (old, new) = prepare(b"a\nb\n", b"a\nb\n", WhitespacePolicy::Exact);
        assert_eq!(old.len(), 2);
        assert!(old[0] == new[0]);
        assert!(old[1] == new[1]);
    }

    #[test]
    fn whitespace_policy_changes_equality() {
        let (old, new) = prepare(b"foo\n", b"foo  \n", WhitespacePolicy::Exact);
        assert!(old[0] != new[0]);
        let (old, new) = prepare(b"foo\n", b"foo  \n", WhitespacePolicy::IgnoreTrailingSpace);
        assert!(old[0] == new[0]);
    }
}
