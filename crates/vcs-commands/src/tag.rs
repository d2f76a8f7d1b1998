//! `TagCommand`: create lightweight or annotated refs under `refs/tags/`.

use bstr::BString;
use vcs_hash::ObjectId;
use vcs_object::{Object, ObjectType, Tag};
use vcs_ref::{RefName, RefStore};
use vcs_repository::WorkingCopy;

use crate::error::{CallGuard, CommandError};
use crate::identity;

#[derive(Debug, Clone)]
pub struct TagReport {
    pub name: String,
    /// The tag object id for an annotated tag, or the target commit id
    /// directly for a lightweight one.
    pub id: ObjectId,
    pub annotated: bool,
}

pub struct TagCommand {
    name: Option<String>,
    target: Option<String>,
    message: Option<BString>,
    force: bool,
    guard: CallGuard,
}

impl TagCommand {
    pub fn new() -> Self {
        Self { name: None, target: None, message: None, force: false, guard: CallGuard::default() }
    }

    pub fn set_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn set_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Presence of a message makes this an annotated tag; omitting it
    /// produces a lightweight tag (a direct ref at the target commit).
    pub fn set_message(mut self, message: impl Into<BString>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn set_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn call(mut self, wc: &mut WorkingCopy) -> Result<TagReport, CommandError> {
        self.guard.check()?;

        let name = self.name.ok_or(CommandError::MissingArgument("name"))?;
        let target_ref = RefName::new(format!("refs/tags/{name}"))?;

        if !self.force && wc.history().refs().resolve(&target_ref)?.is_some() {
            return Err(CommandError::Conflict(name.clone().into()));
        }

        let commit_oid = match &self.target {
            Some(t) => resolve_commitish(wc, t)?,
            None => wc.history().head_oid()?.ok_or(CommandError::RefNotFound("HEAD".to_string()))?,
        };

        let (id, annotated) = if let Some(message) = self.message {
            let tag = Tag {
                target: commit_oid,
                target_type: ObjectType::Commit,
                tag_name: name.clone().into(),
                tagger: Some(identity::default_committer()),
                message,
                gpgsig: None,
            };
            (wc.history().odb().write(&Object::Tag(tag))?, true)
        } else {
            (commit_oid, false)
        };

        wc.history().refs().write_ref(&target_ref, &id)?;
        Ok(TagReport { name, id, annotated })
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

impl Default for TagCommand {
    fn default() -> Self {
        Self::new()
    }
}
