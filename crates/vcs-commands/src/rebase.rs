//! `RebaseCommand`: replay the commits unique to the current branch onto a
//! new base, one at a time, stopping at the first conflict.
//!
//! Drives [`vcs_repository::TransformStore`]'s rebase/sequencer state
//! directly rather than keeping its own progress tracking: `todo` lines are
//! `pick <hex-oid>`, one per commit still to replay, in the same shape a
//! real git rebase uses (though without the other insn verbs — this
//! workspace only ever picks).

use bstr::BString;
use vcs_hash::ObjectId;
use vcs_index::{EntryFlags, IndexEntry, Stage, StatData};
use vcs_merge::{merge_content, MergeOptions};
use vcs_object::{Commit, FileMode, Object};
use vcs_ref::{RefName, RefStore};
use vcs_repository::{flatten_tree, WorkingCopy};
use vcs_revwalk::{merge_base_one, RevWalk, SortOrder, WalkOptions};

use crate::error::{CallGuard, CommandError};
use crate::identity;

#[derive(Debug, Clone)]
pub enum RebaseOutcome {
    AlreadyUpToDate,
    Completed { new_head: ObjectId, replayed: usize },
    Stopped { picking: ObjectId, conflicts: Vec<BString> },
    Aborted,
}

enum Action {
    Start { onto: String },
    Continue,
    Skip,
    Abort,
}

pub struct RebaseCommand {
    action: Action,
    guard: CallGuard,
}

impl RebaseCommand {
    pub fn start(onto: impl Into<String>) -> Self {
        Self { action: Action::Start { onto: onto.into() }, guard: CallGuard::default() }
    }

    pub fn continue_rebase() -> Self {
        Self { action: Action::Continue, guard: CallGuard::default() }
    }

    pub fn skip() -> Self {
        Self { action: Action::Skip, guard: CallGuard::default() }
    }

    pub fn abort() -> Self {
        Self { action: Action::Abort, guard: CallGuard::default() }
    }

    pub fn call(mut self, wc: &mut WorkingCopy) -> Result<RebaseOutcome, CommandError> {
        self.guard.check()?;
        match self.action {
            Action::Start { onto } => start(wc, &onto),
            Action::Continue => continue_step(wc),
            Action::Skip => skip_step(wc),
            Action::Abort => abort(wc),
        }
    }
}

fn start(wc: &mut WorkingCopy, onto: &str) -> Result<RebaseOutcome, CommandError> {
    if wc.transform().is_in_progress() {
        return Err(CommandError::TransformationInProgress("rebase"));
    }

    let onto_oid = resolve_commitish(wc, onto)?;
    let orig_head = wc.history().head_oid()?.ok_or(CommandError::RefNotFound("HEAD".to_string()))?;

    if onto_oid == orig_head {
        return Ok(RebaseOutcome::AlreadyUpToDate);
    }

    let base = merge_base_one(wc.history().odb(), &onto_oid, &orig_head)?;
    if base == Some(orig_head) {
        return Ok(RebaseOutcome::AlreadyUpToDate);
    }

    let todo = commits_since(wc, base, orig_head)?;
    let head_name = wc.history().current_branch()?.unwrap_or_default();

    wc.transform().begin_rebase(&onto_oid, &orig_head, &head_name, false, todo)?;

    let head_ref = RefName::new("HEAD")?;
    wc.history().refs().write_ref(&head_ref, &onto_oid)?;
    let tree = commit_tree_of(wc, &onto_oid)?;
    wc.read_index_tree(&tree)?;
    sync_worktree_to(wc, &tree)?;
    wc.checkout_mut().save()?;

    drive(wc)
}

fn continue_step(wc: &mut WorkingCopy) -> Result<RebaseOutcome, CommandError> {
    if !wc.transform().current().map(|k| matches!(k, vcs_repository::TransformationKind::Rebase)).unwrap_or(false) {
        return Err(CommandError::NotInProgress);
    }
    if wc.checkout_mut().index()?.has_conflicts() {
        return Err(CommandError::UncommittedChanges);
    }

    let Some(line) = wc.transform().rebase_next_step() else {
        return finish(wc);
    };
    let picking = parse_pick(&line)?;
    finalize_pick(wc, picking)?;
    wc.transform().rebase_advance()?;

    drive(wc)
}

fn skip_step(wc: &mut WorkingCopy) -> Result<RebaseOutcome, CommandError> {
    if !wc.transform().is_rebase_in_progress() {
        return Err(CommandError::NotInProgress);
    }
    wc.transform().rebase_skip()?;
    drive(wc)
}

fn abort(wc: &mut WorkingCopy) -> Result<RebaseOutcome, CommandError> {
    if !wc.transform().is_rebase_in_progress() {
        return Err(CommandError::NotInProgress);
    }
    let orig_head = wc.transform().orig_head().ok_or(CommandError::NotInProgress)?;
    let head_name = {
        let state = wc.transform().read_rebase()?;
        state.map(|s| s.head_name).unwrap_or_default()
    };

    let branch_ref = if head_name.is_empty() {
        RefName::new("HEAD")?
    } else {
        RefName::new(format!("refs/heads/{head_name}"))?
    };
    wc.history().refs().write_ref(&branch_ref, &orig_head)?;
    if !head_name.is_empty() {
        wc.history().refs().write_symbolic_ref(&RefName::new("HEAD")?, &branch_ref)?;
    }

    let tree = commit_tree_of(wc, &orig_head)?;
    wc.read_index_tree(&tree)?;
    sync_worktree_to(wc, &tree)?;
    wc.checkout_mut().save()?;

    wc.transform().abort_rebase()?;
    Ok(RebaseOutcome::Aborted)
}

/// Repeatedly applies the next pending pick until one conflicts or the
/// sequencer runs dry.
fn drive(wc: &mut WorkingCopy) -> Result<RebaseOutcome, CommandError> {
    let mut replayed = 0usize;
    loop {
        let Some(line) = wc.transform().rebase_next_step() else {
            return finish(wc).map(|outcome| match outcome {
                RebaseOutcome::Completed { new_head, .. } => RebaseOutcome::Completed { new_head, replayed },
                other => other,
            });
        };
        let picking = parse_pick(&line)?;
        let conflicts = apply_pick(wc, picking)?;
        if !conflicts.is_empty() {
            return Ok(RebaseOutcome::Stopped { picking, conflicts });
        }
        finalize_pick(wc, picking)?;
        wc.transform().rebase_advance()?;
        replayed += 1;
    }
}

fn finish(wc: &mut WorkingCopy) -> Result<RebaseOutcome, CommandError> {
    let head_name = {
        let state = wc.transform().read_rebase()?;
        state.map(|s| s.head_name).unwrap_or_default()
    };
    let new_head = wc.history().head_oid()?.ok_or(CommandError::RefNotFound("HEAD".to_string()))?;

    if !head_name.is_empty() {
        let branch_ref = RefName::new(format!("refs/heads/{head_name}"))?;
        wc.history().refs().write_ref(&branch_ref, &new_head)?;
        wc.history().refs().write_symbolic_ref(&RefName::new("HEAD")?, &branch_ref)?;
    }
    wc.transform().complete_rebase()?;
    Ok(RebaseOutcome::Completed { new_head, replayed: 0 })
}

/// Three-way merges `picking`'s own change (base = its parent, theirs = its
/// tree) onto the current HEAD, staging conflicts like a merge would rather
/// than failing outright. Returns the paths left conflicted, if any.
fn apply_pick(wc: &mut WorkingCopy, picking: ObjectId) -> Result<Vec<BString>, CommandError> {
    let commit = read_commit(wc, &picking)?;
    let parent_tree = match commit.parents.first() {
        Some(p) => commit_tree_of(wc, p)?,
        None => ObjectId::NULL,
    };
    let base_map = if parent_tree == ObjectId::NULL {
        Default::default()
    } else {
        flatten_tree(wc.history().odb(), &parent_tree)?
    };
    let their_map = flatten_tree(wc.history().odb(), &commit.tree)?;

    let our_head = wc.history().head_oid()?.ok_or(CommandError::RefNotFound("HEAD".to_string()))?;
    let our_tree = commit_tree_of(wc, &our_head)?;
    let our_map = flatten_tree(wc.history().odb(), &our_tree)?;

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
                    let size = outcome.bytes.len() as u64;
                    stage_resolved(wc, path, *our_mode, id, size)?;
                }
            }
            _ => {
                stage_conflict(wc, path, base_entry, our_entry, their_entry)?;
                conflicts.push(path.clone());
            }
        }
    }

    wc.checkout_mut().save()?;
    Ok(conflicts)
}

/// Commits the currently-staged result (after [`apply_pick`] found no
/// conflicts, or after the caller resolved them) as a replay of `picking`,
/// carrying its author and message forward but stamping a fresh committer.
fn finalize_pick(wc: &mut WorkingCopy, picking: ObjectId) -> Result<ObjectId, CommandError> {
    let original = read_commit(wc, &picking)?;
    let parent = wc.history().head_oid()?.ok_or(CommandError::RefNotFound("HEAD".to_string()))?;
    let tree = wc.write_index_tree()?;

    let commit = Commit {
        tree,
        parents: vec![parent],
        author: original.author,
        committer: identity::default_committer(),
        encoding: None,
        gpgsig: None,
        extra_headers: Vec::new(),
        message: original.message,
    };
    let new_id = wc.history().odb().write(&Object::Commit(commit))?;
    let head_ref = RefName::new("HEAD")?;
    wc.history().refs().write_ref(&head_ref, &new_id)?;
    Ok(new_id)
}

fn sync_worktree_to(wc: &mut WorkingCopy, tree: &ObjectId) -> Result<(), CommandError> {
    if wc.worktree().is_none() {
        return Ok(());
    }
    let map = flatten_tree(wc.history().odb(), tree)?;
    for (path, (id, mode)) in &map {
        if let Some(Object::Blob(content)) = wc.history().odb().read(id)? {
            wc.require_worktree()?.write(path, *mode, &content)?;
        }
    }
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

fn read_commit(wc: &WorkingCopy, id: &ObjectId) -> Result<Commit, CommandError> {
    match wc.history().odb().read(id)? {
        Some(Object::Commit(c)) => Ok(c),
        _ => Err(CommandError::RefNotFound(id.to_hex())),
    }
}

fn commit_tree_of(wc: &WorkingCopy, commit_id: &ObjectId) -> Result<ObjectId, CommandError> {
    Ok(read_commit(wc, commit_id)?.tree)
}

fn parse_pick(line: &str) -> Result<ObjectId, CommandError> {
    let hex = line.strip_prefix("pick ").unwrap_or(line).trim();
    ObjectId::from_hex(hex).map_err(|_| CommandError::RefNotFound(hex.to_string()))
}

/// Every commit reachable from `head` but not from `base` (exclusive of
/// `base` itself), oldest first — the set a rebase replays.
fn commits_since(wc: &WorkingCopy, base: Option<ObjectId>, head: ObjectId) -> Result<Vec<String>, CommandError> {
    let odb = wc.history().odb();
    let mut walk = RevWalk::new(odb);
    walk.set_options(WalkOptions { sort: SortOrder::Chronological, first_parent_only: true, max_count: None, skip: None });
    walk.push(head)?;
    if let Some(base) = base {
        walk.hide(base)?;
    }
    let mut lines = Vec::new();
    for result in walk {
        lines.push(format!("pick {}", result?.to_hex()));
    }
    lines.reverse();
    Ok(lines)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::add::AddCommand;
    use crate::branch::BranchCommand;
    use crate::checkout::CheckoutCommand;
    use crate::commit::CommitCommand;

    fn init() -> (tempfile::TempDir, WorkingCopy) {
        let dir = tempfile::tempdir().unwrap();
        let wc = WorkingCopy::init(dir.path()).unwrap();
        (dir, wc)
    }

    #[test]
    fn rebasing_a_clean_feature_branch_replays_its_commit() {
        let (dir, mut wc) = init();
        wc.require_worktree().unwrap().write(&BString::from("a.txt"), FileMode::Regular, b"base\n").unwrap();
        AddCommand::new().set_all(true).call(&mut wc).unwrap();
        CommitCommand::new().set_message("base").call(&mut wc).unwrap();

        CheckoutCommand::new().set_create("feature").call(&mut wc).unwrap();
        wc.require_worktree().unwrap().write(&BString::from("b.txt"), FileMode::Regular, b"feature\n").unwrap();
        AddCommand::new().set_all(true).call(&mut wc).unwrap();
        CommitCommand::new().set_message("add b").call(&mut wc).unwrap();

        CheckoutCommand::new().set_target("main").call(&mut wc).unwrap();
        wc.require_worktree().unwrap().write(&BString::from("c.txt"), FileMode::Regular, b"main\n").unwrap();
        AddCommand::new().set_all(true).call(&mut wc).unwrap();
        CommitCommand::new().set_message("add c").call(&mut wc).unwrap();

        BranchCommand::create("replay").set_start_point("feature").call(&mut wc).unwrap();
        CheckoutCommand::new().set_target("replay").call(&mut wc).unwrap();

        let outcome = RebaseCommand::start("main").call(&mut wc).unwrap();
        assert!(matches!(outcome, RebaseOutcome::Completed { replayed: 1, .. }));
        assert_eq!(wc.require_worktree().unwrap().read(&BString::from("c.txt")).unwrap(), b"main\n");
        assert_eq!(wc.require_worktree().unwrap().read(&BString::from("b.txt")).unwrap(), b"feature\n");
        let _ = dir;
    }
}
