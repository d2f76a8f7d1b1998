//! Author/committer identity resolution for commands that write commits.
//!
//! There is no config-file layer in this workspace, so identity comes from
//! the same `GIT_AUTHOR_*`/`GIT_COMMITTER_*` environment variables git
//! itself honors as overrides, falling back to a placeholder identity
//! when unset rather than failing the command.

use vcs_utils::{GitDate, Signature};

fn env_signature(name_var: &str, email_var: &str, date_var: &str) -> Signature {
    let name = std::env::var(name_var).unwrap_or_else(|_| "Unknown".to_string());
    let email = std::env::var(email_var).unwrap_or_else(|_| "unknown@localhost".to_string());
    let date = std::env::var(date_var).ok().and_then(|raw| GitDate::parse_raw(&raw).ok()).unwrap_or_else(GitDate::now);
    Signature { name: name.into(), email: email.into(), date }
}

pub fn default_author() -> Signature {
    env_signature("GIT_AUTHOR_NAME", "GIT_AUTHOR_EMAIL", "GIT_AUTHOR_DATE")
}

pub fn default_committer() -> Signature {
    env_signature("GIT_COMMITTER_NAME", "GIT_COMMITTER_EMAIL", "GIT_COMMITTER_DATE")
}
