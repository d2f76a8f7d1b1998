use std::path::{Path, PathBuf};

use crate::env::EnvOverrides;
use crate::link;
use crate::{DiscoveredRepo, RepoError, RepositoryKind};

/// Discover a git directory by walking up from `start`.
///
/// 1. `GIT_DIR`, if set, is used directly.
/// 2. Otherwise walk up from `start`, at each level checking for a `.git/`
///    directory, a `.git` redirect file, or the directory itself being a
///    bare repository, stopping at a `GIT_CEILING_DIRECTORIES` entry.
pub fn discover_git_dir(start: &Path) -> Result<DiscoveredRepo, RepoError> {
    discover_git_dir_with_env(start, &EnvOverrides::from_env())
}

pub fn discover_git_dir_with_env(start: &Path, env: &EnvOverrides) -> Result<DiscoveredRepo, RepoError> {
    if let Some(ref git_dir) = env.git_dir {
        let git_dir = if git_dir.is_absolute() { git_dir.clone() } else { start.join(git_dir) };
        return open_git_dir(&git_dir);
    }

    let start = std::fs::canonicalize(start).map_err(|_| RepoError::NotFound(start.to_path_buf()))?;
    let ceilings: Vec<PathBuf> = env.ceiling_directories.iter().filter_map(|p| std::fs::canonicalize(p).ok()).collect();

    let mut current = start.clone();
    loop {
        if ceilings.contains(&current) {
            return Err(RepoError::NotFound(start));
        }

        let dot_git = current.join(".git");

        if dot_git.is_dir() {
            let common_dir = resolve_common_dir(&dot_git);
            return Ok(DiscoveredRepo { git_dir: dot_git, work_tree: Some(current), common_dir, kind: RepositoryKind::Normal });
        }

        if dot_git.is_file() {
            let target = parse_gitdir_file(&dot_git)?;
            let target = if target.is_absolute() { target } else { current.join(&target) };
            let target = std::fs::canonicalize(&target)
                .map_err(|e| RepoError::InvalidGitDir { path: dot_git.clone(), reason: format!("cannot resolve gitdir target: {e}") })?;
            return link::open_from_gitdir_redirect(&target, &current);
        }

        if is_git_dir(&current) {
            let common_dir = resolve_common_dir(&current);
            return Ok(DiscoveredRepo { git_dir: current, work_tree: None, common_dir, kind: RepositoryKind::Bare });
        }

        match current.parent() {
            Some(parent) if parent != current => current = parent.to_path_buf(),
            _ => return Err(RepoError::NotFound(start)),
        }
    }
}

/// Open a known git directory path directly.
pub fn open_git_dir(git_dir: &Path) -> Result<DiscoveredRepo, RepoError> {
    let git_dir = std::fs::canonicalize(git_dir).map_err(|_| RepoError::NotFound(git_dir.to_path_buf()))?;

    if !is_git_dir(&git_dir) {
        return Err(RepoError::InvalidGitDir { path: git_dir, reason: "missing HEAD, objects/, or refs/".to_string() });
    }

    let common_dir = resolve_common_dir(&git_dir);

    if git_dir.join("commondir").is_file() {
        let gitdir_file = git_dir.join("gitdir");
        let work_tree = if gitdir_file.is_file() {
            let wt = std::fs::read_to_string(&gitdir_file).map_err(|e| RepoError::InvalidGitDir { path: gitdir_file, reason: e.to_string() })?;
            PathBuf::from(wt.trim()).parent().map(|p| p.to_path_buf())
        } else {
            None
        };
        return Ok(DiscoveredRepo { git_dir, work_tree, common_dir, kind: RepositoryKind::LinkedWorktree });
    }

    if let Some(parent) = git_dir.parent() {
        if parent.join(".git") == git_dir {
            return Ok(DiscoveredRepo { work_tree: Some(parent.to_path_buf()), common_dir, git_dir, kind: RepositoryKind::Normal });
        }
    }

    Ok(DiscoveredRepo { common_dir: common_dir.clone(), git_dir, work_tree: None, kind: RepositoryKind::Bare })
}

fn is_git_dir(path: &Path) -> bool {
    path.join("HEAD").is_file() && path.join("objects").is_dir() && path.join("refs").is_dir()
}

fn parse_gitdir_file(path: &Path) -> Result<PathBuf, RepoError> {
    let content = std::fs::read_to_string(path).map_err(|e| RepoError::InvalidGitDir { path: path.to_path_buf(), reason: format!("cannot read .git file: {e}") })?;
    let content = content.trim();
    let target = content
        .strip_prefix("gitdir: ")
        .ok_or_else(|| RepoError::InvalidGitDir { path: path.to_path_buf(), reason: format!("expected 'gitdir: <path>', got: {content}") })?;
    Ok(PathBuf::from(target))
}

/// Resolve the common dir for a git directory: the target of a `commondir`
/// file, or the git dir itself.
fn resolve_common_dir(git_dir: &Path) -> PathBuf {
    let commondir_file = git_dir.join("commondir");
    if commondir_file.is_file() {
        if let Ok(content) = std::fs::read_to_string(&commondir_file) {
            let resolved = git_dir.join(content.trim());
            if let Ok(canonical) = std::fs::canonicalize(&resolved) {
                return canonical;
            }
            return resolved;
        }
    }
    git_dir.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovers_git_dir_from_nested_subdirectory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".git/objects")).unwrap();
        std::fs::create_dir_all(dir.path().join(".git/refs")).unwrap();
        std::fs::write(dir.path().join(".git/HEAD"), "ref: refs/heads/main\n").unwrap();
        let nested = dir.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();

        let found = discover_git_dir_with_env(&nested, &EnvOverrides::default()).unwrap();
        assert_eq!(found.kind, RepositoryKind::Normal);
        assert_eq!(found.work_tree.unwrap(), std::fs::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn errors_when_no_git_dir_found_above_ceiling() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("x/y");
        std::fs::create_dir_all(&nested).unwrap();
        let env = EnvOverrides { git_dir: None, ceiling_directories: vec![std::fs::canonicalize(dir.path()).unwrap()] };
        assert!(matches!(discover_git_dir_with_env(&nested, &env), Err(RepoError::NotFound(_))));
    }
}
