//! `StashCommand`: set aside the tracked changes in the working copy and
//! restore HEAD's tree, to be re-applied later.
//!
//! There is no splice-able reflog-stack API exposed at this layer, so this
//! keeps a single active stash under `refs/stash` rather than the
//! `stash@{N}` stack a full implementation would offer: pushing again while
//! one is already set aside is a [`CommandError::Conflict`] rather than
//! silently burying the older one.

use bstr::{BString, ByteSlice};
use vcs_hash::ObjectId;
use vcs_object::{Commit, FileMode, Object};
use vcs_ref::{RefName, RefStore};
use vcs_repository::{flatten_tree, WorkingCopy};

use crate::error::{CallGuard, CommandError};
use crate::identity;
use crate::reset::{ResetCommand, ResetMode};

#[derive(Debug, Clone)]
pub struct StashEntry {
    pub id: ObjectId,
    pub base: ObjectId,
    pub message: BString,
}

#[derive(Debug, Clone)]
pub enum StashOutcome {
    Pushed(StashEntry),
    NothingToStash,
    Popped(StashEntry),
    Applied(StashEntry),
    Conflicted(Vec<BString>),
    Dropped,
    NoStash,
    Current(Option<StashEntry>),
}

enum Action {
    Push,
    Pop,
    Apply,
    Drop,
    Current,
}

pub struct StashCommand {
    action: Action,
    message: Option<BString>,
    guard: CallGuard,
}

impl StashCommand {
    pub fn push() -> Self {
        Self { action: Action::Push, message: None, guard: CallGuard::default() }
    }

    pub fn pop() -> Self {
        Self { action: Action::Pop, message: None, guard: CallGuard::default() }
    }

    pub fn apply() -> Self {
        Self { action: Action::Apply, message: None, guard: CallGuard::default() }
    }

    pub fn drop() -> Self {
        Self { action: Action::Drop, message: None, guard: CallGuard::default() }
    }

    pub fn current() -> Self {
        Self { action: Action::Current, message: None, guard: CallGuard::default() }
    }

    pub fn set_message(mut self, message: impl Into<BString>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn call(mut self, wc: &mut WorkingCopy) -> Result<StashOutcome, CommandError> {
        self.guard.check()?;
        match self.action {
            Action::Push => push(wc, self.message),
            Action::Pop => unstash(wc, true),
            Action::Apply => unstash(wc, false),
            Action::Drop => drop_stash(wc),
            Action::Current => current(wc),
        }
    }
}

fn stash_ref() -> Result<RefName, CommandError> {
    Ok(RefName::new("refs/stash")?)
}

fn push(wc: &mut WorkingCopy, message: Option<BString>) -> Result<StashOutcome, CommandError> {
    let stash_ref = stash_ref()?;
    if wc.history().refs().resolve(&stash_ref)?.is_some() {
        return Err(CommandError::Conflict(BString::from("refs/stash")));
    }

    let head_oid = wc.history().head_oid()?.ok_or(CommandError::RefNotFound("HEAD".to_string()))?;
    let head_tree = commit_tree_of(wc, &head_oid)?;

    restage_tracked(wc)?;
    let stash_tree = wc.write_index_tree()?;

    if stash_tree == head_tree {
        return Ok(StashOutcome::NothingToStash);
    }

    let author = identity::default_author();
    let committer = identity::default_committer();
    let message = message.unwrap_or_else(|| BString::from("WIP on current branch"));
    let commit = Commit {
        tree: stash_tree,
        parents: vec![head_oid],
        author,
        committer,
        encoding: None,
        gpgsig: None,
        extra_headers: Vec::new(),
        message: message.clone(),
    };
    let stash_id = wc.history().odb().write(&Object::Commit(commit))?;
    wc.history().refs().write_ref(&stash_ref, &stash_id)?;

    ResetCommand::new().set_target(head_oid.to_hex()).set_mode(ResetMode::Hard).set_force(true).call(wc)?;

    Ok(StashOutcome::Pushed(StashEntry { id: stash_id, base: head_oid, message }))
}

fn unstash(wc: &mut WorkingCopy, pop: bool) -> Result<StashOutcome, CommandError> {
    let stash_ref = stash_ref()?;
    let Some(stash_id) = wc.history().refs().resolve_to_oid(&stash_ref)? else {
        return Ok(StashOutcome::NoStash);
    };
    let (base_oid, stash_tree, message) = match wc.history().odb().read(&stash_id)? {
        Some(Object::Commit(c)) => {
            let base = *c.parents.first().ok_or_else(|| CommandError::RefNotFound(stash_id.to_hex()))?;
            (base, c.tree, c.message)
        }
        _ => return Err(CommandError::RefNotFound(stash_id.to_hex())),
    };

    let our_oid = wc.history().head_oid()?.ok_or(CommandError::RefNotFound("HEAD".to_string()))?;
    let our_tree = commit_tree_of(wc, &our_oid)?;
    let base_tree = commit_tree_of(wc, &base_oid)?;

    let base_map = flatten_tree(wc.history().odb(), &base_tree)?;
    let our_map = flatten_tree(wc.history().odb(), &our_tree)?;
    let their_map = flatten_tree(wc.history().odb(), &stash_tree)?;

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
        conflicts.push(path.clone());
    }

    let entry = StashEntry { id: stash_id, base: base_oid, message };
    if !conflicts.is_empty() {
        return Ok(StashOutcome::Conflicted(conflicts));
    }

    wc.checkout_mut().save()?;

    if pop {
        wc.history().refs().delete_ref(&stash_ref)?;
        Ok(StashOutcome::Popped(entry))
    } else {
        Ok(StashOutcome::Applied(entry))
    }
}

fn drop_stash(wc: &mut WorkingCopy) -> Result<StashOutcome, CommandError> {
    let stash_ref = stash_ref()?;
    if wc.history().refs().resolve(&stash_ref)?.is_none() {
        return Ok(StashOutcome::NoStash);
    }
    wc.history().refs().delete_ref(&stash_ref)?;
    Ok(StashOutcome::Dropped)
}

fn current(wc: &mut WorkingCopy) -> Result<StashOutcome, CommandError> {
    let stash_ref = stash_ref()?;
    let Some(stash_id) = wc.history().refs().resolve_to_oid(&stash_ref)? else {
        return Ok(StashOutcome::Current(None));
    };
    match wc.history().odb().read(&stash_id)? {
        Some(Object::Commit(c)) => {
            let base = c.parents.first().copied().unwrap_or(ObjectId::NULL);
            Ok(StashOutcome::Current(Some(StashEntry { id: stash_id, base, message: c.message })))
        }
        _ => Ok(StashOutcome::Current(None)),
    }
}

/// Re-reads every tracked path against the worktree, updating the index for
/// anything whose content has changed since it was staged and dropping
/// anything that's been deleted. Mirrors [`crate::add::AddCommand`]'s
/// refresh loop, scoped to paths already tracked.
fn restage_tracked(wc: &mut WorkingCopy) -> Result<(), CommandError> {
    if wc.worktree().is_none() {
        return Ok(());
    }
    let paths: Vec<BString> = wc.checkout_mut().index()?.list_entries().map(|e| e.path.clone()).collect();
    for path in &paths {
        match wc.require_worktree()?.stat(path) {
            Ok(stat) => {
                let existing = wc.checkout_mut().index()?.get_entry(path.as_bstr(), vcs_index::Stage::Normal).cloned();
                if let Some(existing) = &existing {
                    if existing.stat.matches(&stat) {
                        continue;
                    }
                }
                let content = wc.require_worktree()?.read(path)?;
                let blob_id = wc.history().odb().write(&Object::Blob(content))?;
                let mode = existing.map(|e| e.mode).unwrap_or(FileMode::Regular);
                wc.checkout_mut().index_mut()?.editor().update(path.clone(), mode, blob_id, stat.size, stat.last_modified).finish()?;
            }
            Err(_) => {
                wc.checkout_mut().index_mut()?.editor().delete(path.clone()).finish()?;
            }
        }
    }
    wc.checkout_mut().save()?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::add::AddCommand;
    use crate::commit::CommitCommand;

    fn init() -> (tempfile::TempDir, WorkingCopy) {
        let dir = tempfile::tempdir().unwrap();
        let wc = WorkingCopy::init(dir.path()).unwrap();
        (dir, wc)
    }

    #[test]
    fn pushing_then_popping_restores_local_edit() {
        let (dir, mut wc) = init();
        wc.require_worktree().unwrap().write(&BString::from("a.txt"), FileMode::Regular, b"hi\n").unwrap();
        AddCommand::new().set_all(true).call(&mut wc).unwrap();
        CommitCommand::new().set_message("first").call(&mut wc).unwrap();

        wc.require_worktree().unwrap().write(&BString::from("a.txt"), FileMode::Regular, b"changed\n").unwrap();

        let pushed = StashCommand::push().call(&mut wc).unwrap();
        assert!(matches!(pushed, StashOutcome::Pushed(_)));
        assert_eq!(wc.require_worktree().unwrap().read(&BString::from("a.txt")).unwrap(), b"hi\n");

        let popped = StashCommand::pop().call(&mut wc).unwrap();
        assert!(matches!(popped, StashOutcome::Popped(_)));
        assert_eq!(wc.require_worktree().unwrap().read(&BString::from("a.txt")).unwrap(), b"changed\n");
        let _ = dir;
    }

    #[test]
    fn pushing_with_no_changes_is_a_no_op() {
        let (dir, mut wc) = init();
        wc.require_worktree().unwrap().write(&BString::from("a.txt"), FileMode::Regular, b"hi\n").unwrap();
        AddCommand::new().set_all(true).call(&mut wc).unwrap();
        CommitCommand::new().set_message("first").call(&mut wc).unwrap();

        let outcome = StashCommand::push().call(&mut wc).unwrap();
        assert!(matches!(outcome, StashOutcome::NothingToStash));
        let _ = dir;
    }
}
