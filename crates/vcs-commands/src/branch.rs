//! `BranchCommand`: create, delete, or list refs under `refs/heads/`.

use bstr::ByteSlice;
use vcs_hash::ObjectId;
use vcs_ref::{RefName, RefStore};
use vcs_repository::WorkingCopy;

use crate::error::{CallGuard, CommandError};

#[derive(Debug, Clone)]
pub struct BranchInfo {
    pub name: String,
    pub target: ObjectId,
}

enum Action {
    Create { name: String, start_point: Option<String>, force: bool },
    Delete { name: String, force: bool },
    List,
}

pub struct BranchCommand {
    action: Action,
    guard: CallGuard,
}

#[derive(Debug, Clone)]
pub enum BranchOutcome {
    Created(BranchInfo),
    Deleted(String),
    Listed(Vec<BranchInfo>),
}

impl BranchCommand {
    pub fn create(name: impl Into<String>) -> Self {
        Self { action: Action::Create { name: name.into(), start_point: None, force: false }, guard: CallGuard::default() }
    }

    pub fn delete(name: impl Into<String>) -> Self {
        Self { action: Action::Delete { name: name.into(), force: false }, guard: CallGuard::default() }
    }

    pub fn list() -> Self {
        Self { action: Action::List, guard: CallGuard::default() }
    }

    pub fn set_start_point(mut self, start_point: impl Into<String>) -> Self {
        if let Action::Create { start_point: sp, .. } = &mut self.action {
            *sp = Some(start_point.into());
        }
        self
    }

    pub fn set_force(mut self, force: bool) -> Self {
        match &mut self.action {
            Action::Create { force: f, .. } | Action::Delete { force: f, .. } => *f = force,
            Action::List => {}
        }
        self
    }

    pub fn call(mut self, wc: &mut WorkingCopy) -> Result<BranchOutcome, CommandError> {
        self.guard.check()?;

        match self.action {
            Action::Create { name, start_point, force } => {
                let target = RefName::new(format!("refs/heads/{name}"))?;
                let oid = match &start_point {
                    Some(sp) => resolve_commitish(wc, sp)?,
                    None => wc.history().head_oid()?.ok_or(CommandError::RefNotFound("HEAD".to_string()))?,
                };
                if !force && wc.history().refs().resolve(&target)?.is_some() {
                    return Err(CommandError::Conflict(name.clone().into()));
                }
                wc.history().refs().write_ref(&target, &oid)?;
                Ok(BranchOutcome::Created(BranchInfo { name, target: oid }))
            }
            Action::Delete { name, force } => {
                let target = RefName::new(format!("refs/heads/{name}"))?;
                if !force && wc.history().current_branch()?.as_deref() == Some(name.as_str()) {
                    return Err(CommandError::Conflict(name.clone().into()));
                }
                wc.history().refs().delete_ref(&target)?;
                Ok(BranchOutcome::Deleted(name))
            }
            Action::List => {
                let mut out = Vec::new();
                for r in wc.history().refs().iter(Some("refs/heads/"))? {
                    let r = r?;
                    if let Some(oid) = r.target_oid() {
                        out.push(BranchInfo { name: r.name().short_name().to_string_lossy().into_owned(), target: oid });
                    }
                }
                Ok(BranchOutcome::Listed(out))
            }
        }
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
