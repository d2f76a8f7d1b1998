//! `MergeCommand`: merge another branch/commit into the current one.
//!
//! Fast-forwards when possible; otherwise performs a per-path three-way
//! content merge, staging anything that can't auto-resolve as a stage
//! 1/2/3 conflict in the index rather than failing outright.

use bstr::BString;
use vcs_hash::ObjectId;
use vcs_index::{EntryFlags, IndexEntry, Stage, StatData};
use vcs_merge::{merge_content, MergeOptions};
use vcs_object::{Commit, FileMode, Object};
use vcs_ref::{RefName, RefStore};
use vcs_repository::{flatten_tree, WorkingCopy};
use vcs_revwalk::{is_ancestor, merge_base_one};

use crate::error::{CallGuard, CommandError};
use crate::identity;

#[derive(Debug, Clone)]
pub enum MergeOutcome {
    AlreadyUpToDate,
    FastForwarded { id: ObjectId },
    Merged { id: ObjectId, conflicts: Vec<BString> },
    Conflicted { conflicts: Vec<BString> },
}

pub struct MergeCommand {
    target: Option<String>,
    message: Option<BString>,
    allow_fast_forward: bool,
    guard: CallGuard,
}

impl MergeCommand {
    pub fn new() -> Self {
        Self { target: None, message: None, allow_fast_forward: true, guard: CallGuard::default() }
    }

    pub fn set_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn set_message(mut self, message: impl Into<BString>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn set_allow_fast_forward(mut self, allow: bool) -> Self {
        self.allow_fast_forward = allow;
        self
    }

    pub fn call(mut self, wc: &mut WorkingCopy) -> Result<MergeOutcome, CommandError> {
        self.guard.check()?;

        if wc.transform().is_in_progress() {
            return Err(CommandError::TransformationInProgress("merge"));
        }

        let target = self.target.ok_or(CommandError::MissingArgument("target"))?;
        let their_oid = resolve_commitish(wc, &target)?;
        let our_oid = wc.history().head_oid()?;

        let Some(our_oid) = our_oid else {
            // Unborn branch: merging onto it is just a fast-forward.
            fast_forward(wc, their_oid)?;
            return Ok(MergeOutcome::FastForwarded { id: their_oid });
        };

        if our_oid == their_oid {
            return Ok(MergeOutcome::AlreadyUpToDate);
        }

        if is_ancestor(wc.history().odb(), &their_oid, &our_oid)? {
            return Ok(MergeOutcome::AlreadyUpToDate);
        }

        if self.allow_fast_forward && is_ancestor(wc.history().odb(), &our_oid, &their_oid)? {
            fast_forward(wc, their_oid)?;
            return Ok(MergeOutcome::FastForwarded { id: their_oid });
        }

        let base_oid = merge_base_one(wc.history().odb(), &our_oid, &their_oid)?;
        let base_tree = base_oid.map(|id| commit_tree_of(wc, &id)).transpose()?;
        let our_tree = commit_tree_of(wc, &our_oid)?;
        let their_tree = commit_tree_of(wc, &their_oid)?;

        let base_map = match base_tree {
            Some(t) => flatten_tree(wc.history().odb(), &t)?,
            None => Default::default(),
        };
        let our_map = flatten_tree(wc.history().odb(), &our_tree)?;
        let their_map = flatten_tree(wc.history().odb(), &their_tree)?;

        let mut paths: std::collections::BTreeSet<BString> = base_map.keys().cloned().collect();
        paths.extend(our_map.keys().cloned());
        paths.extend(their_map.keys().cloned());

        let mut conflicts = Vec::new();
        for path in &paths {
            let base_entry = base_map.get(path);
            let our_entry = our_map.get(path);
            let their_entry = their_map.get(path);

            if our_entry.map(|(id, _)| id) == their_entry.map(|(id, _)| id) {
                continue;
            }
            if base_entry == our_entry {
                apply_side(wc, path, their_entry)?;
                continue;
            }
            if base_entry == their_entry {
                apply_side(wc, path, our_entry)?;
                continue;
            }

            match (our_entry, their_entry) {
                (Some((our_id, our_mode)), Some((their_id, _))) => {
                    let base_bytes = base_entry.map(|(id, _)| read_blob(wc, id)).transpose()?.unwrap_or_default();
                    let our_bytes = read_blob(wc, our_id)?;
                    let their_bytes = read_blob(wc, their_id)?;
                    let outcome = merge_content(&base_bytes, &our_bytes, &their_bytes, &MergeOptions::default())?;

                    if outcome.has_conflicts {
                        stage_conflict(wc, path, base_entry, our_entry, their_entry)?;
                        conflicts.push(path.clone());
                    } else {
                        let id = wc.history().odb().write(&Object::Blob(outcome.bytes.clone()))?;
                        stage_resolved(wc, path, *our_mode, id, outcome.bytes.len() as u64)?;
                    }
                }
                _ => {
                    stage_conflict(wc, path, base_entry, our_entry, their_entry)?;
                    conflicts.push(path.clone());
                }
            }
        }

        wc.checkout_mut().save()?;

        if !conflicts.is_empty() {
            wc.transform().begin_merge(&[their_oid], self.message.as_deref().map(|m| m.to_string()).unwrap_or_default().as_str())?;
            return Ok(MergeOutcome::Conflicted { conflicts });
        }

        let tree = wc.write_index_tree()?;
        let author = identity::default_author();
        let committer = identity::default_committer();
        let message = self.message.unwrap_or_else(|| BString::from(format!("Merge {target} into current branch")));
        let commit = Commit {
            tree,
            parents: vec![our_oid, their_oid],
            author,
            committer,
            encoding: None,
            gpgsig: None,
            extra_headers: Vec::new(),
            message,
        };
        let commit_id = wc.history().odb().write(&Object::Commit(commit))?;

        let branch = wc.history().current_branch()?;
        let target_ref = match &branch {
            Some(name) => RefName::new(format!("refs/heads/{name}"))?,
            None => RefName::new("HEAD")?,
        };
        wc.history().refs().write_ref(&target_ref, &commit_id)?;

        Ok(MergeOutcome::Merged { id: commit_id, conflicts: Vec::new() })
    }
}

fn fast_forward(wc: &mut WorkingCopy, their_oid: ObjectId) -> Result<(), CommandError> {
    let tree = commit_tree_of(wc, &their_oid)?;
    wc.read_index_tree(&tree)?;
    wc.checkout_mut().save()?;

    if let Some(worktree) = wc.worktree() {
        let map = flatten_tree(wc.history().odb(), &tree)?;
        for (path, (id, mode)) in &map {
            if let Some(Object::Blob(content)) = wc.history().odb().read(id)? {
                worktree.write(path, *mode, &content)?;
            }
        }
    }

    let branch = wc.history().current_branch()?;
    let target_ref = match &branch {
        Some(name) => RefName::new(format!("refs/heads/{name}"))?,
        None => RefName::new("HEAD")?,
    };
    wc.history().refs().write_ref(&target_ref, &their_oid)?;
    Ok(())
}

fn apply_side(wc: &mut WorkingCopy, path: &BString, side: Option<&(ObjectId, FileMode)>) -> Result<(), CommandError> {
    match side {
        Some((id, mode)) => {
            let content = read_blob(wc, id)?;
            if let Some(worktree) = wc.worktree() {
                worktree.write(path, *mode, &content)?;
            }
            wc.checkout_mut().index_mut()?.editor().update(path.clone(), *mode, *id, content.len() as u64, None).finish()?;
        }
        None => {
            if let Some(worktree) = wc.worktree() {
                let _ = worktree.remove(path);
            }
            wc.checkout_mut().index_mut()?.editor().delete(path.clone()).finish()?;
        }
    }
    Ok(())
}

fn stage_resolved(wc: &mut WorkingCopy, path: &BString, mode: FileMode, id: ObjectId, size: u64) -> Result<(), CommandError> {
    if let Some(Object::Blob(content)) = wc.history().odb().read(&id)? {
        if let Some(worktree) = wc.worktree() {
            worktree.write(path, mode, &content)?;
        }
    }
    wc.checkout_mut().index_mut()?.editor().update(path.clone(), mode, id, size, None).finish()?;
    Ok(())
}

fn stage_conflict(
    wc: &mut WorkingCopy,
    path: &BString,
    base: Option<&(ObjectId, FileMode)>,
    ours: Option<&(ObjectId, FileMode)>,
    theirs: Option<&(ObjectId, FileMode)>,
) -> Result<(), CommandError> {
    let mut editor = wc.checkout_mut().index_mut()?.editor().delete(path.clone());
    for (stage, slot) in [(Stage::Base, base), (Stage::Ours, ours), (Stage::Theirs, theirs)] {
        if let Some((id, mode)) = slot {
            let (id, mode, entry_path, edit_path) = (*id, *mode, path.clone(), path.clone());
            editor = editor.apply(edit_path, move |_| {
                Some(IndexEntry { path: entry_path, id, mode, stage, stat: StatData::default(), flags: EntryFlags::default() })
            });
        }
    }
    editor.finish()?;
    Ok(())
}

fn read_blob(wc: &WorkingCopy, id: &ObjectId) -> Result<Vec<u8>, CommandError> {
    match wc.history().odb().read(id)? {
        Some(Object::Blob(content)) => Ok(content),
        _ => Ok(Vec::new()),
    }
}

fn commit_tree_of(wc: &WorkingCopy, commit_id: &ObjectId) -> Result<ObjectId, CommandError> {
    match wc.history().odb().read(commit_id)? {
        Some(Object::Commit(c)) => Ok(c.tree),
        _ => Err(CommandError::RefNotFound(commit_id.to_hex())),
    }
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

impl Default for MergeCommand {
    fn default() -> Self {
        Self::new()
    }
}
