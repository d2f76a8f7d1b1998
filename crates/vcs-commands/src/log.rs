//! `LogCommand`: walk commit ancestry, optionally filtered by path.

use bstr::BString;
use vcs_hash::ObjectId;
use vcs_object::{Commit, Object};
use vcs_ref::RefName;
use vcs_repository::{flatten_tree, WorkingCopy};
use vcs_revwalk::{RevWalk, SortOrder, WalkOptions};

use crate::error::{CallGuard, CommandError};

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub id: ObjectId,
    pub commit: Commit,
}

#[derive(Default)]
pub struct LogCommand {
    start_points: Vec<String>,
    max_count: Option<usize>,
    first_parent_only: bool,
    path_filter: Option<BString>,
    guard: CallGuard,
}

impl LogCommand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_start_point(mut self, rev: impl Into<String>) -> Self {
        self.start_points.push(rev.into());
        self
    }

    pub fn set_max_count(mut self, max_count: usize) -> Self {
        self.max_count = Some(max_count);
        self
    }

    pub fn set_first_parent_only(mut self, first_parent_only: bool) -> Self {
        self.first_parent_only = first_parent_only;
        self
    }

    pub fn set_path_filter(mut self, path: impl Into<BString>) -> Self {
        self.path_filter = Some(path.into());
        self
    }

    pub fn call(mut self, wc: &mut WorkingCopy) -> Result<Vec<LogEntry>, CommandError> {
        self.guard.check()?;

        let odb = wc.history().odb();
        let mut walk = RevWalk::new(odb);
        walk.set_options(WalkOptions { sort: SortOrder::Chronological, first_parent_only: self.first_parent_only, max_count: None, skip: None });

        if self.start_points.is_empty() {
            if let Some(oid) = wc.history().head_oid()? {
                walk.push(oid)?;
            }
        } else {
            for start in &self.start_points {
                let branch_ref = RefName::new(format!("refs/heads/{start}"))?;
                if let Some(oid) = wc.history().refs().resolve_to_oid(&branch_ref)? {
                    walk.push(oid)?;
                    continue;
                }
                if let Ok(oid) = odb.resolve_prefix(start) {
                    walk.push(oid)?;
                }
            }
        }

        let mut entries = Vec::new();
        for result in walk {
            let id = result?;
            let Some(Object::Commit(commit)) = odb.read(&id)? else { continue };

            if let Some(path) = &self.path_filter {
                if !touches_path(odb, &commit, path)? {
                    continue;
                }
            }

            entries.push(LogEntry { id, commit });
            if let Some(max) = self.max_count {
                if entries.len() >= max {
                    break;
                }
            }
        }

        Ok(entries)
    }
}

/// Whether `commit`'s tree differs from its first parent's tree at `path`
/// (or, for a root commit, whether `path` exists in its tree at all).
fn touches_path(odb: &vcs_odb::ObjectDatabase, commit: &Commit, path: &BString) -> Result<bool, CommandError> {
    let current = flatten_tree(odb, &commit.tree)?.get(path).map(|(id, _)| *id);
    let parent = match commit.parents.first() {
        Some(parent_id) => match odb.read(parent_id)? {
            Some(Object::Commit(parent)) => flatten_tree(odb, &parent.tree)?.get(path).map(|(id, _)| *id),
            _ => None,
        },
        None => None,
    };
    Ok(current != parent)
}
