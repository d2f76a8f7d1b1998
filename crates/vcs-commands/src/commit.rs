//! `CommitCommand`: snapshot the index into a commit and advance HEAD.

use bstr::BString;
use vcs_hash::ObjectId;
use vcs_object::{Commit, Object};
use vcs_ref::reflog::ReflogEntry;
use vcs_ref::{RefName, RefStore, RefTransaction};
use vcs_repository::WorkingCopy;
use vcs_utils::Signature;

use crate::error::{CallGuard, CommandError};
use crate::identity;

#[derive(Debug, Clone)]
pub struct CommitReport {
    pub id: ObjectId,
    pub tree: ObjectId,
    pub parents: Vec<ObjectId>,
    pub branch: Option<String>,
}

pub struct CommitCommand {
    message: Option<BString>,
    author: Option<Signature>,
    committer: Option<Signature>,
    allow_empty: bool,
    guard: CallGuard,
}

impl CommitCommand {
    pub fn new() -> Self {
        Self { message: None, author: None, committer: None, allow_empty: false, guard: CallGuard::default() }
    }

    pub fn set_message(mut self, message: impl Into<BString>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn set_author(mut self, author: Signature) -> Self {
        self.author = Some(author);
        self
    }

    pub fn set_committer(mut self, committer: Signature) -> Self {
        self.committer = Some(committer);
        self
    }

    pub fn set_allow_empty(mut self, allow_empty: bool) -> Self {
        self.allow_empty = allow_empty;
        self
    }

    pub fn call(mut self, wc: &mut WorkingCopy) -> Result<CommitReport, CommandError> {
        self.guard.check()?;

        let message = self.message.ok_or(CommandError::MissingArgument("message"))?;

        if wc.checkout_mut().index()?.has_conflicts() {
            return Err(CommandError::Conflict(BString::from("unmerged paths")));
        }

        let tree = wc.write_index_tree()?;

        let is_unborn = wc.history().is_unborn()?;
        let head_oid = wc.history().head_oid()?;
        let parents: Vec<ObjectId> = head_oid.into_iter().collect();

        if !self.allow_empty {
            if let Some(parent_id) = parents.first() {
                if let Some(Object::Commit(parent)) = wc.history().odb().read(parent_id)? {
                    if parent.tree == tree {
                        return Err(CommandError::Conflict(BString::from("nothing to commit, working tree clean")));
                    }
                }
            } else if wc.checkout_mut().index()?.is_empty() {
                return Err(CommandError::Conflict(BString::from("nothing to commit, working tree clean")));
            }
        }

        let author = self.author.unwrap_or_else(identity::default_author);
        let committer = self.committer.unwrap_or_else(identity::default_committer);

        let commit = Commit {
            tree,
            parents: parents.clone(),
            author,
            committer: committer.clone(),
            encoding: None,
            gpgsig: None,
            extra_headers: Vec::new(),
            message: message.clone(),
        };
        let commit_id = wc.history().odb().write(&Object::Commit(commit))?;

        let head_name = RefName::new("HEAD")?;
        let branch = wc.history().current_branch()?;
        let reflog_message = format!("commit{}: {}", if is_unborn { " (initial)" } else { "" }, first_line(&message));

        let mut txn = RefTransaction::new();
        match (branch.as_ref(), head_oid) {
            (Some(name), Some(old)) => {
                let target = RefName::new(format!("refs/heads/{name}"))?;
                txn.update(target, old, commit_id, reflog_message.clone());
            }
            (Some(name), None) => {
                let target = RefName::new(format!("refs/heads/{name}"))?;
                txn.create(target, commit_id, reflog_message.clone());
            }
            (None, Some(old)) => {
                txn.update(head_name.clone(), old, commit_id, reflog_message.clone());
            }
            (None, None) => {
                txn.create(head_name.clone(), commit_id, reflog_message.clone());
            }
        }
        wc.history_mut().refs_mut().set_committer(committer.clone());
        wc.history().refs().commit_transaction(txn)?;

        // The transaction above updates the branch ref HEAD points at
        // symbolically, not HEAD itself; HEAD still needs its own reflog
        // entry since it moved from the caller's point of view.
        if branch.is_some() {
            wc.history().refs().append_reflog(
                &head_name,
                &ReflogEntry { old_oid: head_oid.unwrap_or(ObjectId::NULL), new_oid: commit_id, identity: committer, message: reflog_message.into() },
            )?;
        }

        Ok(CommitReport { id: commit_id, tree, parents, branch })
    }
}

fn first_line(message: &BString) -> String {
    message.to_string().lines().next().unwrap_or_default().to_string()
}

impl Default for CommitCommand {
    fn default() -> Self {
        Self::new()
    }
}
