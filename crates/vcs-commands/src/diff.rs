//! `DiffCommand`: compare two trees (or the index/working tree against a
//! tree) and report per-path changes, with an optional line-level diff.
//!
//! Rename/copy detection is a path-similarity heuristic layered on top of
//! the path-keyed add/delete/modify diff, not a primitive of `vcs-diff`
//! itself: a deleted path whose blob exactly matches an added path's blob
//! is a rename; an added path whose blob matches a path that's still
//! present unchanged elsewhere is a copy. Only exact content matches are
//! detected (no partial-similarity scoring) — a narrower rule than
//! upstream Git's `-M`/`-C` percentage thresholds, but grounded in the
//! same "same blob, different path" signal.

use std::collections::{BTreeMap, HashMap};

use bstr::{BString, ByteSlice};
use vcs_diff::{diff as diff_lines, DiffOptions, EditRegion};
use vcs_hash::ObjectId;
use vcs_object::{FileMode, Object};
use vcs_ref::RefName;
use vcs_repository::{flatten_tree, WorkingCopy};

use crate::error::{CallGuard, CommandError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffChangeKind {
    Add,
    Delete,
    Modify,
    Rename,
    Copy,
}

#[derive(Debug, Clone)]
pub struct DiffEntry {
    pub path: BString,
    pub kind: DiffChangeKind,
    /// For `Rename`/`Copy`, the path this entry's content came from.
    pub rename_from: Option<BString>,
    pub old_id: Option<ObjectId>,
    pub new_id: Option<ObjectId>,
    pub old_mode: Option<FileMode>,
    pub new_mode: Option<FileMode>,
    pub regions: Option<Vec<EditRegion>>,
}

enum Side {
    Tree(String),
    Index,
}

pub struct DiffCommand {
    old_side: Option<Side>,
    new_side: Option<Side>,
    path_filter: Option<BString>,
    with_content: bool,
    guard: CallGuard,
}

impl DiffCommand {
    pub fn new() -> Self {
        Self { old_side: None, new_side: None, path_filter: None, with_content: false, guard: CallGuard::default() }
    }

    pub fn set_old_tree(mut self, rev: impl Into<String>) -> Self {
        self.old_side = Some(Side::Tree(rev.into()));
        self
    }

    pub fn set_new_tree(mut self, rev: impl Into<String>) -> Self {
        self.new_side = Some(Side::Tree(rev.into()));
        self
    }

    /// Diff against the staging index rather than a committed tree.
    pub fn set_cached(mut self, cached: bool) -> Self {
        if cached {
            self.new_side = Some(Side::Index);
        }
        self
    }

    pub fn set_path_filter(mut self, path: impl Into<BString>) -> Self {
        self.path_filter = Some(path.into());
        self
    }

    pub fn set_with_content(mut self, with_content: bool) -> Self {
        self.with_content = with_content;
        self
    }

    pub fn call(mut self, wc: &mut WorkingCopy) -> Result<Vec<DiffEntry>, CommandError> {
        self.guard.check()?;

        let old_map = match &self.old_side {
            Some(Side::Tree(rev)) => resolve_tree_map(wc, rev)?,
            Some(Side::Index) => index_map(wc)?,
            None => match wc.history().head_oid()? {
                Some(head) => resolve_tree_map(wc, &head.to_hex())?,
                None => BTreeMap::new(),
            },
        };

        let new_map = match &self.new_side {
            Some(Side::Tree(rev)) => resolve_tree_map(wc, rev)?,
            Some(Side::Index) => index_map(wc)?,
            None => index_map(wc)?,
        };

        let mut paths: std::collections::BTreeSet<&BString> = old_map.keys().collect();
        paths.extend(new_map.keys());

        let mut entries = Vec::new();
        for path in paths {
            if let Some(prefix) = &self.path_filter {
                if path != prefix && !path.starts_with(format!("{prefix}/").as_bytes()) {
                    continue;
                }
            }

            let old = old_map.get(path);
            let new = new_map.get(path);
            let kind = match (old, new) {
                (None, Some(_)) => DiffChangeKind::Add,
                (Some(_), None) => DiffChangeKind::Delete,
                (Some((oid, omode)), Some((nid, nmode))) if oid == nid && omode == nmode => continue,
                _ => DiffChangeKind::Modify,
            };

            let regions = if self.with_content {
                let old_content = old.map(|(id, _)| read_blob(wc, id)).transpose()?.unwrap_or_default();
                let new_content = new.map(|(id, _)| read_blob(wc, id)).transpose()?.unwrap_or_default();
                diff_lines(&old_content, &new_content, DiffOptions::default()).ok()
            } else {
                None
            };

            entries.push(DiffEntry {
                path: path.clone(),
                kind,
                rename_from: None,
                old_id: old.map(|(id, _)| *id),
                new_id: new.map(|(id, _)| *id),
                old_mode: old.map(|(_, m)| *m),
                new_mode: new.map(|(_, m)| *m),
                regions,
            });
        }

        detect_renames_and_copies(&mut entries, &old_map, &new_map);
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }
}

/// Pairs up exact-content deletes/adds into renames, and folds in copies
/// from paths whose blob is still present unchanged elsewhere.
fn detect_renames_and_copies(
    entries: &mut Vec<DiffEntry>,
    old_map: &BTreeMap<BString, (ObjectId, FileMode)>,
    new_map: &BTreeMap<BString, (ObjectId, FileMode)>,
) {
    let mut deletes_by_id: HashMap<ObjectId, Vec<BString>> = HashMap::new();
    for entry in entries.iter() {
        if entry.kind == DiffChangeKind::Delete {
            if let Some(id) = entry.old_id {
                deletes_by_id.entry(id).or_default().push(entry.path.clone());
            }
        }
    }
    for paths in deletes_by_id.values_mut() {
        paths.sort();
    }

    let mut consumed_deletes: std::collections::HashSet<BString> = std::collections::HashSet::new();
    let mut renamed_sources: std::collections::HashSet<BString> = std::collections::HashSet::new();

    for entry in entries.iter_mut() {
        if entry.kind != DiffChangeKind::Add {
            continue;
        }
        let Some(id) = entry.new_id else { continue };

        let mut rename_source: Option<BString> = None;
        if let Some(candidates) = deletes_by_id.get(&id) {
            for candidate in candidates {
                if !consumed_deletes.contains(candidate) {
                    rename_source = Some(candidate.clone());
                    break;
                }
            }
        }
        if let Some(source) = rename_source {
            consumed_deletes.insert(source.clone());
            entry.old_mode = old_map.get(&source).map(|(_, m)| *m);
            entry.rename_from = Some(source);
            entry.old_id = Some(id);
            entry.kind = DiffChangeKind::Rename;
            continue;
        }

        let mut copy_source: Option<BString> = None;
        for (path, (oid, _)) in old_map.iter() {
            if *oid != id || renamed_sources.contains(path) {
                continue;
            }
            let still_present_unchanged = matches!(new_map.get(path), Some((nid, _)) if *nid == id);
            if still_present_unchanged {
                copy_source = Some(path.clone());
                break;
            }
        }
        if let Some(source) = copy_source {
            renamed_sources.insert(source.clone());
            entry.old_mode = old_map.get(&source).map(|(_, m)| *m);
            entry.rename_from = Some(source);
            entry.old_id = Some(id);
            entry.kind = DiffChangeKind::Copy;
        }
    }

    entries.retain(|e| !(e.kind == DiffChangeKind::Delete && consumed_deletes.contains(&e.path)));
}

fn read_blob(wc: &WorkingCopy, id: &ObjectId) -> Result<Vec<u8>, CommandError> {
    match wc.history().odb().read(id)? {
        Some(Object::Blob(content)) => Ok(content),
        _ => Ok(Vec::new()),
    }
}

fn resolve_tree_map(wc: &WorkingCopy, rev: &str) -> Result<BTreeMap<BString, (ObjectId, FileMode)>, CommandError> {
    let oid = resolve_commitish(wc, rev)?;
    let tree_id = match wc.history().odb().read(&oid)? {
        Some(Object::Commit(c)) => c.tree,
        Some(Object::Tree(_)) => oid,
        _ => return Err(CommandError::RefNotFound(rev.to_string())),
    };
    Ok(flatten_tree(wc.history().odb(), &tree_id)?)
}

fn index_map(wc: &mut WorkingCopy) -> Result<BTreeMap<BString, (ObjectId, FileMode)>, CommandError> {
    Ok(wc.checkout_mut().index()?.list_entries().map(|e| (e.path.clone(), (e.id, e.mode))).collect())
}

fn resolve_commitish(wc: &WorkingCopy, rev: &str) -> Result<ObjectId, CommandError> {
    let branch_ref = RefName::new(format!("refs/heads/{rev}"))?;
    if let Some(oid) = wc.history().refs().resolve_to_oid(&branch_ref)? {
        return Ok(oid);
    }
    if let Ok(oid) = wc.history().odb().resolve_prefix(rev) {
        return Ok(oid);
    }
    Err(CommandError::RefNotFound(rev.to_string()))
}

impl Default for DiffCommand {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcs_repository::WorkingCopy;

    fn init() -> (tempfile::TempDir, WorkingCopy) {
        let dir = tempfile::tempdir().unwrap();
        let wc = WorkingCopy::init(dir.path()).unwrap();
        (dir, wc)
    }

    #[test]
    fn moved_file_is_reported_as_a_rename() {
        let (dir, mut wc) = init();
        wc.require_worktree().unwrap().write(&BString::from("old.txt"), FileMode::Regular, b"same\n").unwrap();
        crate::add::AddCommand::new().add_path("old.txt").call(&mut wc).unwrap();
        crate::commit::CommitCommand::new().set_message("init").call(&mut wc).unwrap();

        wc.require_worktree().unwrap().remove(&BString::from("old.txt")).unwrap();
        wc.require_worktree().unwrap().write(&BString::from("new.txt"), FileMode::Regular, b"same\n").unwrap();
        crate::add::AddCommand::new().set_all(true).call(&mut wc).unwrap();

        let entries = DiffCommand::new().call(&mut wc).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, DiffChangeKind::Rename);
        assert_eq!(entries[0].path, BString::from("new.txt"));
        assert_eq!(entries[0].rename_from, Some(BString::from("old.txt")));
        let _ = dir;
    }

    #[test]
    fn duplicated_file_is_reported_as_a_copy() {
        let (dir, mut wc) = init();
        wc.require_worktree().unwrap().write(&BString::from("a.txt"), FileMode::Regular, b"same\n").unwrap();
        crate::add::AddCommand::new().add_path("a.txt").call(&mut wc).unwrap();
        crate::commit::CommitCommand::new().set_message("init").call(&mut wc).unwrap();

        wc.require_worktree().unwrap().write(&BString::from("b.txt"), FileMode::Regular, b"same\n").unwrap();
        crate::add::AddCommand::new().add_path("b.txt").call(&mut wc).unwrap();

        let entries = DiffCommand::new().call(&mut wc).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, DiffChangeKind::Copy);
        assert_eq!(entries[0].path, BString::from("b.txt"));
        assert_eq!(entries[0].rename_from, Some(BString::from("a.txt")));
        let _ = dir;
    }
}
