//! `StatusCommand`: thin wrapper over the three-way status comparison.

use bstr::BString;
use vcs_repository::{StatusOptions, StatusReport, WorkingCopy};

use crate::error::{CallGuard, CommandError};

#[derive(Default)]
pub struct StatusCommand {
    path_prefix: Option<BString>,
    include_untracked: bool,
    guard: CallGuard,
}

impl StatusCommand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_path_prefix(mut self, prefix: impl Into<BString>) -> Self {
        self.path_prefix = Some(prefix.into());
        self
    }

    pub fn set_include_untracked(mut self, include: bool) -> Self {
        self.include_untracked = include;
        self
    }

    pub fn call(mut self, wc: &mut WorkingCopy) -> Result<StatusReport, CommandError> {
        self.guard.check()?;
        let options = StatusOptions { path_prefix: self.path_prefix, include_untracked: self.include_untracked };
        Ok(wc.status(&options)?)
    }
}
