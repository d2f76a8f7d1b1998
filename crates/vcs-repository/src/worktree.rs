use std::sync::Arc;

use bstr::{BString, ByteSlice};
use vcs_object::FileMode;
use vcs_utils::{EntryKind, FilesApi, Stat};

use crate::RepoError;

/// The filesystem view a working copy reads and writes checked-out files
/// through. Corresponds to the optional `worktree` field of
/// [`crate::WorkingCopy`] — absent for a bare repository.
pub struct Worktree {
    files: Arc<dyn FilesApi>,
}

/// A single file found by [`Worktree::walk`], not yet compared against the
/// index or HEAD tree.
#[derive(Debug, Clone)]
pub struct WorktreeEntry {
    pub path: BString,
    pub stat: Stat,
}

impl Worktree {
    pub fn new(files: Arc<dyn FilesApi>) -> Self {
        Self { files }
    }

    pub fn files(&self) -> &dyn FilesApi {
        self.files.as_ref()
    }

    /// List every regular file under the work tree, skipping `.git`.
    pub fn walk(&self) -> Result<Vec<WorktreeEntry>, RepoError> {
        let mut out = Vec::new();
        self.walk_dir("", &mut out)?;
        Ok(out)
    }

    fn walk_dir(&self, path: &str, out: &mut Vec<WorktreeEntry>) -> Result<(), RepoError> {
        let entries = match self.files.list(path, false) {
            Ok(entries) => entries,
            Err(vcs_utils::UtilError::NotADirectory(_)) => return Ok(()),
            Err(vcs_utils::UtilError::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        for stat in entries {
            if stat.name == ".git" {
                continue;
            }
            match stat.kind {
                EntryKind::Dir => self.walk_dir(&stat.path, out)?,
                EntryKind::File => out.push(WorktreeEntry { path: BString::from(stat.path.clone()), stat }),
            }
        }
        Ok(())
    }

    pub fn read(&self, path: &BString) -> Result<Vec<u8>, RepoError> {
        use std::io::Read;
        let mut buf = Vec::new();
        self.files.read(path.to_str_lossy().as_ref(), Default::default())?.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// `mode` is accepted for interface symmetry with the index and tree
    /// codecs; `FilesApi` has no permission-bit or symlink concept, so
    /// executable/symlink modes are materialized as plain file content.
    pub fn write(&self, path: &BString, _mode: FileMode, content: &[u8]) -> Result<(), RepoError> {
        let mut cursor = std::io::Cursor::new(content.to_vec());
        self.files.write(path.to_str_lossy().as_ref(), &mut cursor)?;
        Ok(())
    }

    pub fn remove(&self, path: &BString) -> Result<(), RepoError> {
        self.files.remove(path.to_str_lossy().as_ref())?;
        Ok(())
    }

    pub fn stat(&self, path: &BString) -> Result<Stat, RepoError> {
        Ok(self.files.stat(path.to_str_lossy().as_ref())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worktree(dir: &std::path::Path) -> Worktree {
        Worktree::new(Arc::new(vcs_utils::FsFiles::new(dir)))
    }

    #[test]
    fn walk_skips_dot_git_and_finds_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git/HEAD"), "ref: refs/heads/main\n").unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("README.md"), "hello\n").unwrap();
        std::fs::write(dir.path().join("src/main.rs"), "fn main() {}\n").unwrap();

        let wt = worktree(dir.path());
        let mut paths: Vec<String> = wt.walk().unwrap().into_iter().map(|e| e.path.to_string()).collect();
        paths.sort();
        assert_eq!(paths, vec!["README.md".to_string(), "src/main.rs".to_string()]);
    }

    #[test]
    fn write_then_read_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let wt = worktree(dir.path());
        let path = BString::from("a.txt");
        wt.write(&path, FileMode::Regular, b"hi\n").unwrap();
        assert_eq!(wt.read(&path).unwrap(), b"hi\n");
    }
}
