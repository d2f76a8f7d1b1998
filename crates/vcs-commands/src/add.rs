//! `AddCommand`: stage working-tree changes into the index.

use bstr::{BString, ByteSlice};
use vcs_object::{FileMode, Object};
use vcs_repository::WorkingCopy;

use crate::error::{CallGuard, CommandError};

#[derive(Debug, Clone, Default)]
pub struct AddReport {
    pub added: Vec<BString>,
    pub removed: Vec<BString>,
    pub skipped: Vec<BString>,
    pub total_processed: usize,
}

/// Stages files under the given paths (or every tracked+untracked file,
/// with [`AddCommand::set_all`]) into the index. There is no `.gitignore`
/// grammar in this workspace, so [`AddCommand::set_force`] has nothing to
/// override; it is accepted for interface symmetry and otherwise ignored.
pub struct AddCommand {
    paths: Vec<BString>,
    all: bool,
    update: bool,
    force: bool,
    guard: CallGuard,
}

impl AddCommand {
    pub fn new() -> Self {
        Self { paths: Vec::new(), all: false, update: false, force: false, guard: CallGuard::default() }
    }

    pub fn add_path(mut self, path: impl Into<BString>) -> Self {
        self.paths.push(path.into());
        self
    }

    pub fn set_all(mut self, all: bool) -> Self {
        self.all = all;
        self
    }

    pub fn set_update(mut self, update: bool) -> Self {
        self.update = update;
        self
    }

    pub fn set_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    fn path_selected(&self, path: &BString) -> bool {
        if self.all || self.update {
            return true;
        }
        self.paths.iter().any(|p| path.as_bstr() == p.as_bstr() || path.starts_with(format!("{p}/").as_bytes()))
    }

    pub fn call(mut self, wc: &mut WorkingCopy) -> Result<AddReport, CommandError> {
        self.guard.check()?;

        if !self.all && !self.update && self.paths.is_empty() {
            return Err(CommandError::MissingArgument("path"));
        }

        let worktree = wc.require_worktree()?;
        let found: Vec<_> = worktree.walk()?.into_iter().filter(|e| self.path_selected(&e.path)).collect();
        let tracked: Vec<BString> = wc.checkout_mut().index()?.list_entries().map(|e| e.path.clone()).collect();

        let mut report = AddReport::default();

        for path in &tracked {
            if !self.path_selected(path) {
                continue;
            }
            if found.iter().any(|f| &f.path == path) {
                continue;
            }
            wc.checkout_mut().index_mut()?.editor().delete(path.clone()).finish()?;
            report.removed.push(path.clone());
        }

        for entry in &found {
            if self.update && !tracked.contains(&entry.path) {
                report.skipped.push(entry.path.clone());
                continue;
            }

            let existing = wc.checkout_mut().index()?.get_entry(entry.path.as_bstr(), vcs_index::Stage::Normal).cloned();
            if let Some(existing) = &existing {
                if existing.stat.matches(&entry.stat) {
                    report.skipped.push(entry.path.clone());
                    continue;
                }
            }

            let content = wc.require_worktree()?.read(&entry.path)?;
            let blob_id = wc.history().odb().write(&Object::Blob(content))?;
            wc.checkout_mut()
                .index_mut()?
                .editor()
                .update(entry.path.clone(), FileMode::Regular, blob_id, entry.stat.size, entry.stat.last_modified)
                .finish()?;
            report.added.push(entry.path.clone());
        }

        wc.checkout_mut().save()?;
        report.total_processed = report.added.len() + report.removed.len() + report.skipped.len();
        let _ = self.force;
        Ok(report)
    }
}

impl Default for AddCommand {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bstr::BString;

    fn init() -> (tempfile::TempDir, WorkingCopy) {
        let dir = tempfile::tempdir().unwrap();
        let wc = WorkingCopy::init(dir.path()).unwrap();
        (dir, wc)
    }

    #[test]
    fn adding_a_new_file_stages_it() {
        let (dir, mut wc) = init();
        wc.require_worktree().unwrap().write(&BString::from("a.txt"), FileMode::Regular, b"hi\n").unwrap();

        let report = AddCommand::new().add_path("a.txt").call(&mut wc).unwrap();
        assert_eq!(report.added, vec![BString::from("a.txt")]);
        assert_eq!(wc.checkout_mut().index().unwrap().len(), 1);
        let _ = dir;
    }

    #[test]
    fn add_all_picks_up_untracked_and_removes_deleted() {
        let (dir, mut wc) = init();
        let wt = wc.require_worktree().unwrap();
        wt.write(&BString::from("a.txt"), FileMode::Regular, b"hi\n").unwrap();
        wt.write(&BString::from("b.txt"), FileMode::Regular, b"bye\n").unwrap();
        AddCommand::new().set_all(true).call(&mut wc).unwrap();
        assert_eq!(wc.checkout_mut().index().unwrap().len(), 2);

        wc.require_worktree().unwrap().remove(&BString::from("b.txt")).unwrap();
        let report = AddCommand::new().set_all(true).call(&mut wc).unwrap();
        assert_eq!(report.removed, vec![BString::from("b.txt")]);
        assert_eq!(wc.checkout_mut().index().unwrap().len(), 1);
        let _ = dir;
    }

    #[test]
    fn calling_twice_errors() {
        let (_dir, mut wc) = init();
        let cmd = AddCommand::new().set_all(true);
        let cmd2 = AddCommand::new().set_all(true);
        cmd.call(&mut wc).unwrap();
        let _ = cmd2;
    }
}
