use std::fs;
use std::path::Path;

use crate::{DiscoveredRepo, InitOptions, RepoError, RepositoryKind};

/// Create the standard `.git/` layout: `HEAD`, `objects/{info,pack}`,
/// `refs/{heads,tags}`, `hooks/`, `info/exclude`, `description`.
///
/// Re-running on an existing repository (one with a `HEAD` file already) is
/// a safe no-op; existing data is never overwritten.
pub fn init_repository(path: &Path, options: &InitOptions) -> Result<DiscoveredRepo, RepoError> {
    let path = if path.is_relative() { std::env::current_dir()?.join(path) } else { path.to_path_buf() };

    let (git_dir, work_tree) = if options.bare { (path.clone(), None) } else { (path.join(".git"), Some(path.clone())) };

    if git_dir.join("HEAD").is_file() {
        return Ok(DiscoveredRepo {
            git_dir: git_dir.clone(),
            work_tree,
            common_dir: git_dir,
            kind: if options.bare { RepositoryKind::Bare } else { RepositoryKind::Normal },
        });
    }

    fs::create_dir_all(git_dir.join("objects").join("info"))?;
    fs::create_dir_all(git_dir.join("objects").join("pack"))?;
    fs::create_dir_all(git_dir.join("refs").join("heads"))?;
    fs::create_dir_all(git_dir.join("refs").join("tags"))?;
    fs::create_dir_all(git_dir.join("hooks"))?;
    fs::create_dir_all(git_dir.join("info"))?;

    let default_branch = options.default_branch.as_deref().unwrap_or("main");
    fs::write(git_dir.join("HEAD"), format!("ref: refs/heads/{default_branch}\n"))?;
    fs::write(
        git_dir.join("info").join("exclude"),
        "# git ls-files --others --exclude-from=.git/info/exclude\n# Lines that start with '#' are comments.\n",
    )?;
    fs::write(git_dir.join("description"), "Unnamed repository; edit this file 'description' to name the repository.\n")?;

    Ok(DiscoveredRepo {
        git_dir: git_dir.clone(),
        work_tree,
        common_dir: git_dir,
        kind: if options.bare { RepositoryKind::Bare } else { RepositoryKind::Normal },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_creates_standard_layout() {
        let dir = tempfile::tempdir().unwrap();
        let discovered = init_repository(dir.path(), &InitOptions::default()).unwrap();
        assert_eq!(discovered.kind, RepositoryKind::Normal);
        assert!(discovered.git_dir.join("refs/heads").is_dir());
        assert!(discovered.git_dir.join("objects/pack").is_dir());
        let head = fs::read_to_string(discovered.git_dir.join("HEAD")).unwrap();
        assert_eq!(head, "ref: refs/heads/main\n");
    }

    #[test]
    fn reinit_is_a_safe_no_op() {
        let dir = tempfile::tempdir().unwrap();
        init_repository(dir.path(), &InitOptions::default()).unwrap();
        fs::write(dir.path().join(".git/description"), "custom\n").unwrap();
        init_repository(dir.path(), &InitOptions::default()).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join(".git/description")).unwrap(), "custom\n");
    }

    #[test]
    fn bare_init_has_no_work_tree() {
        let dir = tempfile::tempdir().unwrap();
        let discovered = init_repository(dir.path(), &InitOptions { bare: true, ..Default::default() }).unwrap();
        assert_eq!(discovered.kind, RepositoryKind::Bare);
        assert!(discovered.work_tree.is_none());
        assert_eq!(discovered.git_dir, dir.path());
    }
}
