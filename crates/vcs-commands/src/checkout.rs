//! `CheckoutCommand`: move HEAD to a branch or commit (Branch mode), or
//! restore individual paths from a tree or the index (Paths mode).

use std::collections::BTreeMap;

use bstr::{BString, ByteSlice};
use vcs_hash::ObjectId;
use vcs_object::{FileMode, Object};
use vcs_ref::reflog::ReflogEntry;
use vcs_ref::{RefName, RefStore};
use vcs_repository::{flatten_tree, WorkingCopy};

use crate::error::{CallGuard, CommandError};
use crate::identity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutStatus {
    SwitchedBranch,
    Detached,
    PathsRestored,
}

#[derive(Debug, Clone, Default)]
pub struct CheckoutReport {
    pub status: Option<CheckoutStatus>,
    pub updated: Vec<BString>,
    pub removed: Vec<BString>,
    pub conflicts: Vec<BString>,
    pub branch: Option<String>,
}

pub struct CheckoutCommand {
    target: Option<String>,
    create: Option<String>,
    detach: bool,
    force: bool,
    paths: Vec<BString>,
    guard: CallGuard,
}

impl CheckoutCommand {
    pub fn new() -> Self {
        Self { target: None, create: None, detach: false, force: false, paths: Vec::new(), guard: CallGuard::default() }
    }

    pub fn set_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn set_create(mut self, branch_name: impl Into<String>) -> Self {
        self.create = Some(branch_name.into());
        self
    }

    pub fn set_detach(mut self, detach: bool) -> Self {
        self.detach = detach;
        self
    }

    pub fn set_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn add_path(mut self, path: impl Into<BString>) -> Self {
        self.paths.push(path.into());
        self
    }

    pub fn call(mut self, wc: &mut WorkingCopy) -> Result<CheckoutReport, CommandError> {
        self.guard.check()?;

        if !self.paths.is_empty() {
            return self.restore_paths(wc);
        }

        let target = self.target.clone().ok_or(CommandError::MissingArgument("target"))?;
        let resolved = resolve_target(wc, &target)?;

        if let Some(new_branch) = &self.create {
            let branch_ref = RefName::new(format!("refs/heads/{new_branch}"))?;
            if wc.history().refs().resolve(&branch_ref)?.is_some() {
                return Err(CommandError::Conflict(BString::from(new_branch.clone())));
            }
            wc.history().refs().write_ref(&branch_ref, &resolved)?;
        }

        let (conflicts, updated, removed) = detect_and_apply_checkout(wc, &resolved, self.force)?;
        if !conflicts.is_empty() {
            return Ok(CheckoutReport { status: None, updated: Vec::new(), removed: Vec::new(), conflicts, branch: None });
        }

        let old_head = wc.history().head_oid()?.unwrap_or(ObjectId::NULL);
        let old_label = wc.history().current_branch()?.unwrap_or_else(|| old_head.to_hex());
        let head_ref = RefName::new("HEAD")?;

        let (status, branch_name) = if let Some(new_branch) = &self.create {
            let branch_ref = RefName::new(format!("refs/heads/{new_branch}"))?;
            wc.history().refs().write_symbolic_ref(&head_ref, &branch_ref)?;
            (CheckoutStatus::SwitchedBranch, Some(new_branch.clone()))
        } else if self.detach {
            wc.history().refs().write_ref(&head_ref, &resolved)?;
            (CheckoutStatus::Detached, None)
        } else {
            let branch_ref = RefName::new(format!("refs/heads/{target}"))?;
            if wc.history().refs().resolve(&branch_ref)?.is_some() {
                wc.history().refs().write_symbolic_ref(&head_ref, &branch_ref)?;
                (CheckoutStatus::SwitchedBranch, Some(target.clone()))
            } else {
                wc.history().refs().write_ref(&head_ref, &resolved)?;
                (CheckoutStatus::Detached, None)
            }
        };

        let committer = identity::default_committer();
        wc.history().refs().append_reflog(
            &head_ref,
            &ReflogEntry {
                old_oid: old_head,
                new_oid: resolved,
                identity: committer,
                message: format!("checkout: moving from {old_label} to {target}").into(),
            },
        )?;

        Ok(CheckoutReport { status: Some(status), updated, removed, conflicts: Vec::new(), branch: branch_name })
    }

    fn restore_paths(self, wc: &mut WorkingCopy) -> Result<CheckoutReport, CommandError> {
        let source_tree = match &self.target {
            Some(t) => {
                let oid = resolve_target(wc, t)?;
                let tree_id = commit_tree_of(wc, &oid)?;
                flatten_tree(wc.history().odb(), &tree_id)?
            }
            None => BTreeMap::new(),
        };

        let mut updated = Vec::new();
        for path in &self.paths {
            let (id, mode) = if self.target.is_some() {
                *source_tree.get(path).ok_or_else(|| CommandError::PathNotFoundInTree(path.clone()))?
            } else {
                let entry = wc
                    .checkout_mut()
                    .index()?
                    .get_entry(path.as_bstr(), vcs_index::Stage::Normal)
                    .ok_or_else(|| CommandError::PathNotInIndex(path.clone()))?;
                (entry.id, entry.mode)
            };

            let obj = wc.history().odb().read(&id)?.ok_or_else(|| CommandError::PathNotFoundInTree(path.clone()))?;
            let content = match obj {
                Object::Blob(b) => b,
                _ => return Err(CommandError::PathNotFoundInTree(path.clone())),
            };
            wc.require_worktree()?.write(path, mode, &content)?;

            let stat = wc.require_worktree()?.stat(path)?;
            wc.checkout_mut().index_mut()?.editor().update(path.clone(), mode, id, stat.size, stat.last_modified).finish()?;
            updated.push(path.clone());
        }
        wc.checkout_mut().save()?;

        Ok(CheckoutReport { status: Some(CheckoutStatus::PathsRestored), updated, removed: Vec::new(), conflicts: Vec::new(), branch: None })
    }
}

fn resolve_target(wc: &WorkingCopy, target: &str) -> Result<ObjectId, CommandError> {
    let branch_ref = RefName::new(format!("refs/heads/{target}"))?;
    if let Some(oid) = wc.history().refs().resolve_to_oid(&branch_ref)? {
        return Ok(oid);
    }
    let tag_ref = RefName::new(format!("refs/tags/{target}"))?;
    if let Some(oid) = wc.history().refs().resolve_to_oid(&tag_ref)? {
        return Ok(oid);
    }
    if vcs_object::name::is_hex_prefix(target) {
        if let Ok(oid) = wc.history().odb().resolve_prefix(target) {
            return Ok(oid);
        }
    }
    Err(CommandError::RefNotFound(target.to_string()))
}

fn commit_tree_of(wc: &WorkingCopy, commit_id: &ObjectId) -> Result<ObjectId, CommandError> {
    match wc.history().odb().read(commit_id)? {
        Some(Object::Commit(c)) => Ok(c.tree),
        Some(Object::Tag(t)) => commit_tree_of(wc, &t.target),
        _ => Err(CommandError::RefNotFound(commit_id.to_hex())),
    }
}

/// Compares the current HEAD tree against `new_commit`'s tree, and applies
/// the result to the worktree and index unless a conflict is found.
///
/// A path conflicts only when a local change to it would be overwritten:
/// either it was staged (the index entry differs from the old tree) and the
/// new tree disagrees with what's staged, or it's unstaged (the worktree
/// copy differs from the index) and the new tree differs from the old one
/// — matching how a plain checkout refuses to clobber uncommitted edits but
/// doesn't mind touching files that are merely out of date.
fn detect_and_apply_checkout(
    wc: &mut WorkingCopy,
    new_commit: &ObjectId,
    force: bool,
) -> Result<(Vec<BString>, Vec<BString>, Vec<BString>), CommandError> {
    let new_tree = commit_tree_of(wc, new_commit)?;
    let new_map = flatten_tree(wc.history().odb(), &new_tree)?;

    let old_map = match wc.history().head_oid()? {
        Some(old_commit) => flatten_tree(wc.history().odb(), &commit_tree_of(wc, &old_commit)?)?,
        None => BTreeMap::new(),
    };

    let mut conflicts = Vec::new();
    if !force {
        for (path, (old_id, _)) in &old_map {
            let entry = wc.checkout_mut().index()?.get_entry(path.as_bstr(), vcs_index::Stage::Normal).cloned();
            let Some(entry) = entry else { continue };
            let new_id = new_map.get(path).map(|(id, _)| id);
            if entry.id != *old_id {
                if new_id != Some(&entry.id) {
                    conflicts.push(path.clone());
                }
                continue;
            }
            let Some(worktree) = wc.worktree() else { continue };
            let Ok(stat) = worktree.stat(path) else { continue };
            if !entry.stat.matches(&stat) && new_id != Some(old_id) {
                conflicts.push(path.clone());
            }
        }
        if !conflicts.is_empty() {
            return Ok((conflicts, Vec::new(), Vec::new()));
        }
    }

    let mut updated = Vec::new();
    let mut removed = Vec::new();

    if let Some(worktree) = wc.worktree() {
        for path in old_map.keys() {
            if !new_map.contains_key(path) {
                let _ = worktree.remove(path);
                removed.push(path.clone());
            }
        }
        for (path, (id, mode)) in &new_map {
            if old_map.get(path).map(|(i, _)| i) == Some(id) {
                continue;
            }
            if let Some(Object::Blob(content)) = wc.history().odb().read(id)? {
                worktree.write(path, *mode, &content)?;
                updated.push(path.clone());
            }
        }
    }

    wc.read_index_tree(&new_tree)?;
    wc.checkout_mut().save()?;

    Ok((Vec::new(), updated, removed))
}

impl Default for CheckoutCommand {
    fn default() -> Self {
        Self::new()
    }
}
