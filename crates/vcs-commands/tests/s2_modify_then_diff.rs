//! S2. Modify then diff: status shows an unstaged modification, diffing
//! HEAD against the index (after staging) shows the new content.

use bstr::BString;
use vcs_object::Object;
use vcs_object::FileMode;
use vcs_repository::{IndexStatus, WorkTreeStatus, WorkingCopy};
use vcs_commands::{CommitCommand, DiffChangeKind, DiffCommand};

fn init() -> (tempfile::TempDir, WorkingCopy) {
    let dir = tempfile::tempdir().unwrap();
    let wc = WorkingCopy::init(dir.path()).unwrap();
    (dir, wc)
}

#[test]
fn modify_then_diff() {
    let (dir, mut wc) = init();
    wc.require_worktree().unwrap().write(&BString::from("README.md"), FileMode::Regular, b"hello\n").unwrap();
    vcs_commands::AddCommand::new().add_path("README.md").call(&mut wc).unwrap();
    CommitCommand::new().set_message("init").call(&mut wc).unwrap();

    wc.require_worktree().unwrap().write(&BString::from("README.md"), FileMode::Regular, b"hello\nworld\n").unwrap();

    let status = vcs_commands::StatusCommand::new().call(&mut wc).unwrap();
    assert_eq!(status.entries.len(), 1);
    assert_eq!(status.entries[0].index_status, IndexStatus::Unmodified);
    assert_eq!(status.entries[0].work_tree_status, Some(WorkTreeStatus::Modified));

    vcs_commands::AddCommand::new().add_path("README.md").call(&mut wc).unwrap();
    let old_blob = wc.history().odb().write(&Object::Blob(b"hello\n".to_vec())).unwrap();
    let new_blob = wc.history().odb().write(&Object::Blob(b"hello\nworld\n".to_vec())).unwrap();

    let diff = DiffCommand::new().call(&mut wc).unwrap();
    assert_eq!(diff.len(), 1);
    assert_eq!(diff[0].kind, DiffChangeKind::Modify);
    assert_eq!(diff[0].old_id, Some(old_blob));
    assert_eq!(diff[0].new_id, Some(new_blob));
    let _ = dir;
}
