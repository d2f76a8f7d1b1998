//! Three-way comparison of HEAD tree, staging index, and working tree.

use std::collections::BTreeMap;

use bstr::{BString, ByteSlice};
use vcs_hash::ObjectId;
use vcs_index::ConflictType;
use vcs_object::{FileMode, Object};
use vcs_odb::ObjectDatabase;

use crate::{Checkout, History, RepoError, Worktree};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    Unmodified,
    Added,
    Deleted,
    Modified,
    Conflicted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkTreeStatus {
    Unmodified,
    Modified,
    Deleted,
}

#[derive(Debug, Clone)]
pub struct StatusEntry {
    pub path: BString,
    pub index_status: IndexStatus,
    pub work_tree_status: Option<WorkTreeStatus>,
}

/// Filters applied while building a [`StatusReport`]. There is no
/// ignore-pattern matcher in this workspace (no `.gitignore` grammar is
/// in scope), so `include_untracked = false` is the only way to suppress
/// the untracked bucket; there is no separate `IGNORED` classification.
#[derive(Debug, Clone, Default)]
pub struct StatusOptions {
    pub path_prefix: Option<BString>,
    pub include_untracked: bool,
}

#[derive(Debug, Clone)]
pub struct StatusSummary {
    pub is_clean: bool,
    pub has_staged: bool,
    pub has_unstaged: bool,
    pub has_untracked: bool,
    pub has_conflicts: bool,
    pub branch: Option<String>,
    pub head: Option<ObjectId>,
}

#[derive(Debug, Clone)]
pub struct StatusReport {
    pub entries: Vec<StatusEntry>,
    pub untracked: Vec<BString>,
    pub summary: StatusSummary,
}

/// Recursively flatten a tree into `path → (id, mode)`, descending into
/// `Tree`-mode entries and recording everything else (blobs, symlinks,
/// gitlinks) as a leaf.
pub fn flatten_tree(odb: &ObjectDatabase, tree_id: &ObjectId) -> Result<BTreeMap<BString, (ObjectId, FileMode)>, RepoError> {
    let mut out = BTreeMap::new();
    flatten_tree_into(odb, tree_id, &BString::from(""), &mut out)?;
    Ok(out)
}

fn flatten_tree_into(
    odb: &ObjectDatabase,
    tree_id: &ObjectId,
    prefix: &BString,
    out: &mut BTreeMap<BString, (ObjectId, FileMode)>,
) -> Result<(), RepoError> {
    let obj = odb.read(tree_id)?.ok_or(RepoError::PathNotFoundInTree(prefix.clone()))?;
    let tree = match obj {
        Object::Tree(t) => t,
        _ => return Err(RepoError::PathNotFoundInTree(prefix.clone())),
    };
    for entry in &tree.entries {
        let path = if prefix.is_empty() { entry.name.clone() } else { BString::from(format!("{prefix}/{}", entry.name.to_str_lossy())) };
        if entry.mode.is_tree() {
            flatten_tree_into(odb, &entry.id, &path, out)?;
        } else {
            out.insert(path, (entry.id, entry.mode));
        }
    }
    Ok(())
}

/// Compute status for a working copy: the union of HEAD's tree, the
/// staging index, and (when present) the working tree.
///
/// `worktree` is `None` for a bare repository: every path is then judged
/// purely by HEAD-vs-index comparison, and `work_tree_status` is always
/// `None`.
pub fn calculate_status(
    history: &History,
    checkout: &mut Checkout,
    worktree: Option<&Worktree>,
    options: &StatusOptions,
) -> Result<StatusReport, RepoError> {
    let head_oid = history.head_oid()?;
    let head_map = match head_oid {
        Some(commit_id) => match history.odb().read(&commit_id)? {
            Some(Object::Commit(commit)) => flatten_tree(history.odb(), &commit.tree)?,
            _ => BTreeMap::new(),
        },
        None => BTreeMap::new(),
    };

    let index = checkout.index()?;
    let update_time = index.get_update_time();
    let conflicts: BTreeMap<BString, ConflictType> = index.get_conflict_paths().into_iter().map(|(p, t)| (p.to_owned(), t)).collect();

    let mut tracked_paths: std::collections::BTreeSet<BString> = head_map.keys().cloned().collect();
    tracked_paths.extend(index.list_entries().map(|e| e.path.clone()));

    let mut entries = Vec::new();
    for path in &tracked_paths {
        if let Some(prefix) = &options.path_prefix {
            if !path.starts_with(prefix.as_slice()) {
                continue;
            }
        }

        let index_entry = index.get_entry(path.as_bstr(), vcs_index::Stage::Normal);
        let index_status = if conflicts.contains_key(path) {
            IndexStatus::Conflicted
        } else {
            match (head_map.get(path), index_entry) {
                (None, Some(_)) => IndexStatus::Added,
                (Some(_), None) => IndexStatus::Deleted,
                (Some((head_id, head_mode)), Some(e)) => {
                    if *head_id == e.id && *head_mode == e.mode {
                        IndexStatus::Unmodified
                    } else {
                        IndexStatus::Modified
                    }
                }
                (None, None) => continue,
            }
        };

        let work_tree_status = match (worktree, index_entry) {
            (Some(wt), Some(e)) => Some(classify_work_tree(wt, path, e, update_time)?),
            (Some(_), None) => None,
            (None, _) => None,
        };

        entries.push(StatusEntry { path: path.clone(), index_status, work_tree_status });
    }
    entries.sort_by(|a, b| a.path.cmp(&b.path));

    let mut untracked = Vec::new();
    if let Some(wt) = worktree {
        for found in wt.walk()? {
            if tracked_paths.contains(&found.path) {
                continue;
            }
            if let Some(prefix) = &options.path_prefix {
                if !found.path.starts_with(prefix.as_slice()) {
                    continue;
                }
            }
            untracked.push(found.path);
        }
        untracked.sort();
    }
    if !options.include_untracked {
        untracked.clear();
    }

    let has_staged = entries.iter().any(|e| matches!(e.index_status, IndexStatus::Added | IndexStatus::Deleted | IndexStatus::Modified));
    let has_unstaged = entries.iter().any(|e| matches!(e.work_tree_status, Some(WorkTreeStatus::Modified | WorkTreeStatus::Deleted)));
    let has_conflicts = entries.iter().any(|e| e.index_status == IndexStatus::Conflicted);
    let has_untracked = !untracked.is_empty();

    Ok(StatusReport {
        entries,
        untracked,
        summary: StatusSummary {
            is_clean: !has_staged && !has_unstaged && !has_untracked && !has_conflicts,
            has_staged,
            has_unstaged,
            has_untracked,
            has_conflicts,
            branch: history.current_branch()?,
            head: head_oid,
        },
    })
}

fn classify_work_tree(
    worktree: &Worktree,
    path: &BString,
    entry: &vcs_index::IndexEntry,
    update_time: Option<std::time::SystemTime>,
) -> Result<WorkTreeStatus, RepoError> {
    let stat = match worktree.stat(path) {
        Ok(stat) => stat,
        Err(RepoError::Util(vcs_utils::UtilError::NotFound(_))) => return Ok(WorkTreeStatus::Deleted),
        Err(e) => return Err(e),
    };

    if !entry.stat.matches(&stat) {
        return Ok(WorkTreeStatus::Modified);
    }

    match (update_time, stat.last_modified) {
        (Some(update_time), Some(file_mtime)) if file_mtime >= update_time => Ok(WorkTreeStatus::Modified),
        _ => Ok(WorkTreeStatus::Unmodified),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vcs_utils::FilesApi;

    fn setup() -> (tempfile::TempDir, History, Checkout, Worktree, ObjectDatabase) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".git/objects")).unwrap();
        std::fs::write(dir.path().join(".git/HEAD"), "ref: refs/heads/main\n").unwrap();
        let git_files: Arc<dyn FilesApi> = Arc::new(vcs_utils::FsFiles::new(dir.path().join(".git")));
        let history = History::open(git_files.clone()).unwrap();
        let checkout = Checkout::new(git_files, "index");
        let wt_files: Arc<dyn FilesApi> = Arc::new(vcs_utils::FsFiles::new(dir.path()));
        let worktree = Worktree::new(wt_files);
        let odb = ObjectDatabase::open(Arc::new(vcs_utils::FsFiles::new(dir.path().join(".git"))), "objects").unwrap();
        (dir, history, checkout, worktree, odb)
    }

    #[test]
    fn untouched_repo_reports_clean_with_no_head() {
        let (_dir, history, mut checkout, worktree, _odb) = setup();
        let report = calculate_status(&history, &mut checkout, Some(&worktree), &StatusOptions::default()).unwrap();
        assert!(report.summary.is_clean);
        assert!(report.entries.is_empty());
    }

    #[test]
    fn new_file_written_then_staged_is_added_and_unmodified_in_worktree() {
        let (dir, history, mut checkout, worktree, odb) = setup();
        worktree.write(&BString::from("a.txt"), FileMode::Regular, b"hi\n").unwrap();
        let stat = worktree.stat(&BString::from("a.txt")).unwrap();
        let blob_id = odb.write(&Object::Blob(b"hi\n".to_vec())).unwrap();
        checkout
            .index_mut()
            .unwrap()
            .editor()
            .update(BString::from("a.txt"), FileMode::Regular, blob_id, stat.size, stat.last_modified)
            .finish()
            .unwrap();

        let report = calculate_status(&history, &mut checkout, Some(&worktree), &StatusOptions::default()).unwrap();
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].index_status, IndexStatus::Added);
        assert_eq!(report.entries[0].work_tree_status, Some(WorkTreeStatus::Unmodified));
        let _ = dir;
    }

    #[test]
    fn modifying_file_after_staging_reports_worktree_modified() {
        let (_dir, history, mut checkout, worktree, odb) = setup();
        worktree.write(&BString::from("a.txt"), FileMode::Regular, b"hi\n").unwrap();
        let stat = worktree.stat(&BString::from("a.txt")).unwrap();
        let blob_id = odb.write(&Object::Blob(b"hi\n".to_vec())).unwrap();
        checkout
            .index_mut()
            .unwrap()
            .editor()
            .update(BString::from("a.txt"), FileMode::Regular, blob_id, stat.size, stat.last_modified)
            .finish()
            .unwrap();

        worktree.write(&BString::from("a.txt"), FileMode::Regular, b"hi there\n").unwrap();
        let report = calculate_status(&history, &mut checkout, Some(&worktree), &StatusOptions::default()).unwrap();
        assert_eq!(report.entries[0].work_tree_status, Some(WorkTreeStatus::Modified));
    }

    #[test]
    fn untracked_file_is_reported_when_requested() {
        let (_dir, history, mut checkout, worktree, _odb) = setup();
        worktree.write(&BString::from("new.txt"), FileMode::Regular, b"x\n").unwrap();
        let report = calculate_status(&history, &mut checkout, Some(&worktree), &StatusOptions { include_untracked: true, ..Default::default() }).unwrap();
        assert_eq!(report.untracked, vec![BString::from("new.txt")]);
        assert!(report.summary.has_untracked);
    }
}
