//! `RemoteCommand`: manage name-to-URL mappings and their default fetch
//! refspec. No network I/O happens here — fetch/push transports are a
//! separate concern this command only records configuration for.
//!
//! There's no `git-config`-equivalent key/value store in this workspace, so
//! each remote is kept in its own small file under `<git-dir>/remotes/<name>`
//! (one `url = ...` line and one `fetch = ...` line) rather than as keys in
//! a shared config file — the format git itself used before it grew a
//! unified config, and a reasonable fit for a workspace with no config
//! layer of its own.

use std::fs;
use std::path::PathBuf;

use vcs_repository::WorkingCopy;

use crate::error::{CallGuard, CommandError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteInfo {
    pub name: String,
    pub url: String,
    pub fetch_refspec: String,
}

enum Action {
    Add { name: String, url: String },
    Remove { name: String },
    SetUrl { name: String, url: String },
    Show { name: String },
    List,
}

pub struct RemoteCommand {
    action: Action,
    guard: CallGuard,
}

impl RemoteCommand {
    pub fn add(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self { action: Action::Add { name: name.into(), url: url.into() }, guard: CallGuard::default() }
    }

    pub fn remove(name: impl Into<String>) -> Self {
        Self { action: Action::Remove { name: name.into() }, guard: CallGuard::default() }
    }

    pub fn set_url(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self { action: Action::SetUrl { name: name.into(), url: url.into() }, guard: CallGuard::default() }
    }

    pub fn show(name: impl Into<String>) -> Self {
        Self { action: Action::Show { name: name.into() }, guard: CallGuard::default() }
    }

    pub fn list() -> Self {
        Self { action: Action::List, guard: CallGuard::default() }
    }

    pub fn call(mut self, wc: &WorkingCopy) -> Result<RemoteOutcome, CommandError> {
        self.guard.check()?;
        let dir = remotes_dir(wc);
        match self.action {
            Action::Add { name, url } => {
                fs::create_dir_all(&dir)?;
                let path = dir.join(&name);
                if path.exists() {
                    return Err(CommandError::Conflict(name.into()));
                }
                let info = RemoteInfo { name: name.clone(), url, fetch_refspec: default_refspec(&name) };
                fs::write(&path, render(&info))?;
                Ok(RemoteOutcome::Added(info))
            }
            Action::Remove { name } => {
                let path = dir.join(&name);
                if !path.exists() {
                    return Err(CommandError::RemoteNotFound(name));
                }
                fs::remove_file(&path)?;
                Ok(RemoteOutcome::Removed(name))
            }
            Action::SetUrl { name, url } => {
                let path = dir.join(&name);
                if !path.exists() {
                    return Err(CommandError::RemoteNotFound(name));
                }
                let mut info = read_one(&path, &name)?;
                info.url = url;
                fs::write(&path, render(&info))?;
                Ok(RemoteOutcome::UrlSet(info))
            }
            Action::Show { name } => {
                let path = dir.join(&name);
                if !path.exists() {
                    return Err(CommandError::RemoteNotFound(name));
                }
                Ok(RemoteOutcome::Shown(read_one(&path, &name)?))
            }
            Action::List => {
                let mut out = Vec::new();
                if dir.is_dir() {
                    let mut names: Vec<_> = fs::read_dir(&dir)?
                        .filter_map(|e| e.ok())
                        .filter_map(|e| e.file_name().into_string().ok())
                        .collect();
                    names.sort();
                    for name in names {
                        out.push(read_one(&dir.join(&name), &name)?);
                    }
                }
                Ok(RemoteOutcome::Listed(out))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum RemoteOutcome {
    Added(RemoteInfo),
    Removed(String),
    UrlSet(RemoteInfo),
    Shown(RemoteInfo),
    Listed(Vec<RemoteInfo>),
}

fn remotes_dir(wc: &WorkingCopy) -> PathBuf {
    wc.git_dir().join("remotes")
}

fn default_refspec(name: &str) -> String {
    format!("+refs/heads/*:refs/remotes/{name}/*")
}

fn render(info: &RemoteInfo) -> String {
    format!("URL: {}\nFetch: {}\n", info.url, info.fetch_refspec)
}

fn read_one(path: &std::path::Path, name: &str) -> Result<RemoteInfo, CommandError> {
    let contents = fs::read_to_string(path)?;
    let mut url = String::new();
    let mut fetch_refspec = default_refspec(name);
    for line in contents.lines() {
        if let Some(rest) = line.strip_prefix("URL: ") {
            url = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix("Fetch: ") {
            fetch_refspec = rest.trim().to_string();
        }
    }
    Ok(RemoteInfo { name: name.to_string(), url, fetch_refspec })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init() -> (tempfile::TempDir, WorkingCopy) {
        let dir = tempfile::tempdir().unwrap();
        let wc = WorkingCopy::init(dir.path()).unwrap();
        (dir, wc)
    }

    #[test]
    fn adding_and_showing_a_remote_roundtrips_the_url() {
        let (dir, wc) = init();
        let added = RemoteCommand::add("origin", "https://example.com/repo.git").call(&wc).unwrap();
        assert!(matches!(added, RemoteOutcome::Added(_)));

        let shown = RemoteCommand::show("origin").call(&wc).unwrap();
        match shown {
            RemoteOutcome::Shown(info) => {
                assert_eq!(info.url, "https://example.com/repo.git");
                assert_eq!(info.fetch_refspec, "+refs/heads/*:refs/remotes/origin/*");
            }
            _ => panic!("expected Shown"),
        }
        let _ = dir;
    }

    #[test]
    fn removing_an_unknown_remote_errors() {
        let (dir, wc) = init();
        let err = RemoteCommand::remove("ghost").call(&wc);
        assert!(matches!(err, Err(CommandError::RemoteNotFound(_))));
        let _ = dir;
    }

    #[test]
    fn set_url_updates_existing_remote() {
        let (dir, wc) = init();
        RemoteCommand::add("origin", "https://old/repo.git").call(&wc).unwrap();
        RemoteCommand::set_url("origin", "https://new/repo.git").call(&wc).unwrap();
        let shown = RemoteCommand::show("origin").call(&wc).unwrap();
        match shown {
            RemoteOutcome::Shown(info) => assert_eq!(info.url, "https://new/repo.git"),
            _ => panic!("expected Shown"),
        }
        let _ = dir;
    }
}
