//! `ResetCommand`: move the current branch (or HEAD) to a target commit,
//! optionally also replacing the index and/or working tree.

use vcs_hash::ObjectId;
use vcs_object::Object;
use vcs_ref::{RefName, RefStore};
use vcs_repository::{flatten_tree, WorkingCopy};

use crate::error::{CallGuard, CommandError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResetMode {
    /// Move the branch ref only; index and working tree untouched.
    Soft,
    /// Move the branch ref and reset the index to match; working tree
    /// untouched (the default, matching a plain `reset` with no mode flag).
    #[default]
    Mixed,
    /// Move the branch ref, reset the index, and overwrite the working
    /// tree to match the target commit. Requires [`ResetCommand::set_force`]
    /// since it discards uncommitted changes.
    Hard,
}

#[derive(Debug, Clone)]
pub struct ResetReport {
    pub id: ObjectId,
    pub mode: ResetMode,
}

pub struct ResetCommand {
    target: Option<String>,
    mode: ResetMode,
    force: bool,
    guard: CallGuard,
}

impl ResetCommand {
    pub fn new() -> Self {
        Self { target: None, mode: ResetMode::default(), force: false, guard: CallGuard::default() }
    }

    pub fn set_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn set_mode(mut self, mode: ResetMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn set_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn call(mut self, wc: &mut WorkingCopy) -> Result<ResetReport, CommandError> {
        self.guard.check()?;

        if self.mode == ResetMode::Hard && !self.force {
            return Err(CommandError::UncommittedChanges);
        }

        let target = self.target.ok_or(CommandError::MissingArgument("target"))?;
        let new_oid = resolve_commitish(wc, &target)?;

        let branch = wc.history().current_branch()?;
        let head_ref = match &branch {
            Some(name) => RefName::new(format!("refs/heads/{name}"))?,
            None => RefName::new("HEAD")?,
        };
        wc.history().refs().write_ref(&head_ref, &new_oid)?;

        if self.mode != ResetMode::Soft {
            let tree_id = commit_tree_of(wc, &new_oid)?;
            wc.read_index_tree(&tree_id)?;

            if self.mode == ResetMode::Hard {
                if let Some(worktree) = wc.worktree() {
                    let new_map = flatten_tree(wc.history().odb(), &tree_id)?;
                    for (path, (id, mode)) in &new_map {
                        if let Some(Object::Blob(content)) = wc.history().odb().read(id)? {
                            worktree.write(path, *mode, &content)?;
                        }
                    }
                }
            }
            wc.checkout_mut().save()?;
        }

        Ok(ResetReport { id: new_oid, mode: self.mode })
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

fn commit_tree_of(wc: &WorkingCopy, commit_id: &ObjectId) -> Result<ObjectId, CommandError> {
    match wc.history().odb().read(commit_id)? {
        Some(Object::Commit(c)) => Ok(c.tree),
        _ => Err(CommandError::RefNotFound(commit_id.to_hex())),
    }
}

impl Default for ResetCommand {
    fn default() -> Self {
        Self::new()
    }
}
