//! S1. Initial commit: one tree entry, HEAD on `main` pointing at the commit.

use bstr::BString;
use vcs_object::{FileMode, Object};
use vcs_repository::WorkingCopy;
use vcs_commands::CommitCommand;

fn init() -> (tempfile::TempDir, WorkingCopy) {
    let dir = tempfile::tempdir().unwrap();
    let wc = WorkingCopy::init(dir.path()).unwrap();
    (dir, wc)
}

#[test]
fn initial_commit() {
    let (dir, mut wc) = init();
    wc.require_worktree().unwrap().write(&BString::from("README.md"), FileMode::Regular, b"hello\n").unwrap();
    vcs_commands::AddCommand::new().add_path("README.md").call(&mut wc).unwrap();
    let report = CommitCommand::new().set_message("init").call(&mut wc).unwrap();

    assert!(report.parents.is_empty());
    let Some(Object::Tree(tree)) = wc.history().odb().read(&report.tree).unwrap() else {
        panic!("expected a tree object");
    };
    assert_eq!(tree.entries.len(), 1);
    assert_eq!(tree.entries[0].name, BString::from("README.md"));
    assert_eq!(tree.entries[0].mode, FileMode::Regular);
    let expected_blob = wc.history().odb().write(&Object::Blob(b"hello\n".to_vec())).unwrap();
    assert_eq!(tree.entries[0].id, expected_blob);

    assert_eq!(wc.history().current_branch().unwrap().as_deref(), Some("main"));
    let head_ref = vcs_ref::RefName::new("refs/heads/main").unwrap();
    assert_eq!(wc.history().refs().resolve_to_oid(&head_ref).unwrap(), Some(report.id));
    let _ = dir;
}
