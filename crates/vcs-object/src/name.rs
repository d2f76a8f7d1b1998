//! Revision expression parsing (`HEAD~3`, `v1.0^{commit}`, ...).
//!
//! Resolving these to an id needs an object database and ref store, which
//! live above this crate; this module only owns the parseable grammar.

use vcs_hash::ObjectId;

use crate::{ObjectError, ObjectType};

/// A parsed revision suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevisionSuffix {
    /// `^` or `^N` — Nth parent (default N=1).
    Parent(u32),
    /// `~N` — Nth first-parent ancestor (default N=1).
    Ancestor(u32),
    /// `^{type}` — peel to the given type.
    Peel(ObjectType),
    /// `^{}` — peel to the first non-tag object.
    PeelAny,
    /// `^{/regex}` — search commit messages.
    SearchMessage(String),
}

/// A parsed revision expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionExpr {
    /// The base reference (hex id, ref name, `HEAD`, etc.).
    pub base: String,
    pub suffixes: Vec<RevisionSuffix>,
}

/// Parse a revision expression into its base and suffix chain.
///
/// Examples: `"HEAD"` -> base `HEAD`, no suffixes. `"HEAD~3"` -> base
/// `HEAD`, suffixes `[Ancestor(3)]`. `"abc1234^{commit}"` -> base
/// `abc1234`, suffixes `[Peel(Commit)]`.
pub fn parse_revision(input: &str) -> Result<RevisionExpr, ObjectError> {
    let mut suffixes = Vec::new();
    let bytes = input.as_bytes();

    let base_end = find_suffix_start(bytes);
    let base = input[..base_end].to_string();
    let mut pos = base_end;

    while pos < bytes.len() {
        match bytes[pos] {
            b'^' => {
                pos += 1;
                if pos < bytes.len() && bytes[pos] == b'{' {
                    pos += 1;
                    let close = bytes[pos..]
                        .iter()
                        .position(|&b| b == b'}')
                        .ok_or_else(|| ObjectError::InvalidHeader("unclosed ^{".into()))?
                        + pos;
                    let inner = &input[pos..close];
                    let suffix = if inner.is_empty() {
                        RevisionSuffix::PeelAny
                    } else if let Some(pattern) = inner.strip_prefix('/') {
                        RevisionSuffix::SearchMessage(pattern.to_string())
                    } else {
                        let obj_type: ObjectType = inner.parse().map_err(|_| {
                            ObjectError::InvalidHeader(format!("invalid peel type: {inner}"))
                        })?;
                        RevisionSuffix::Peel(obj_type)
                    };
                    suffixes.push(suffix);
                    pos = close + 1;
                } else {
                    let (n, consumed) = parse_number(&bytes[pos..]);
                    suffixes.push(RevisionSuffix::Parent(n.unwrap_or(1)));
                    pos += consumed;
                }
            }
            b'~' => {
                pos += 1;
                let (n, consumed) = parse_number(&bytes[pos..]);
                suffixes.push(RevisionSuffix::Ancestor(n.unwrap_or(1)));
                pos += consumed;
            }
            other => {
                return Err(ObjectError::InvalidHeader(format!(
                    "unexpected character '{}' in revision",
                    other as char
                )));
            }
        }
    }

    Ok(RevisionExpr { base, suffixes })
}

pub fn resolve_hex(hex: &str) -> Result<ObjectId, ObjectError> {
    ObjectId::from_hex(hex).map_err(ObjectError::from)
}

/// Whether `s` looks like a hex id prefix (at least 4 hex digits).
pub fn is_hex_prefix(s: &str) -> bool {
    s.len() >= 4 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

fn find_suffix_start(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .position(|&b| b == b'^' || b == b'~')
        .unwrap_or(bytes.len())
}

fn parse_number(bytes: &[u8]) -> (Option<u32>, usize) {
    let mut n: u32 = 0;
    let mut i = 0;
    let mut has_digits = false;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        n = n * 10 + u32::from(bytes[i] - b'0');
        i += 1;
        has_digits = true;
    }
    if has_digits {
        (Some(n), i)
    } else {
        (None, 0)
    }
}
