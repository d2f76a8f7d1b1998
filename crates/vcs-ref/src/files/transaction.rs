use std::io::Cursor;

use vcs_hash::ObjectId;
use vcs_utils::{date::Signature, FilesApi};

use crate::error::RefError;
use crate::files::loose;
use crate::files::packed::PackedRefs;
use crate::name::RefName;
use crate::reflog::{self, ReflogEntry};
use crate::store::{RefTransaction, RefUpdateAction};
use crate::Reference;

/// Commit a ref transaction atomically against the files backend.
///
/// Protocol:
/// 1. Read the current value of every ref being updated and verify its CAS
///    condition.
/// 2. Write new values to `.lock`-suffixed paths.
/// 3. Commit each lock by renaming it into place, or remove it (for
///    deletes).
/// 4. Append reflog entries.
///
/// If any CAS check in step 1 fails, no lock files are written and the
/// transaction has no effect.
pub(crate) fn commit_transaction(
    files: &dyn FilesApi,
    transaction: RefTransaction,
    committer: Option<&Signature>,
) -> Result<(), RefError> {
    if transaction.is_empty() {
        return Ok(());
    }

    let packed = PackedRefs::load(files)?;

    let mut current_oids: Vec<Option<ObjectId>> = Vec::with_capacity(transaction.updates().len());
    for update in transaction.updates() {
        let current = loose::read_loose_ref(files, &update.name)?;
        let current_oid = match &current {
            Some(Reference::Direct { target, .. }) => Some(*target),
            Some(Reference::Symbolic { target, .. }) => resolve_symref(files, target, &packed, 10)?,
            None => packed.find(&update.name).map(|pr| pr.oid),
        };
        verify_cas(&update.name, &update.action, current_oid.as_ref(), &current)?;
        current_oids.push(current_oid);
    }

    let mut lock_paths: Vec<String> = Vec::with_capacity(transaction.updates().len());
    for update in transaction.updates() {
        let path = loose::loose_ref_path(&update.name);
        let lock_path = format!("{path}.lock");
        match &update.action {
            RefUpdateAction::Create { new_target } | RefUpdateAction::Update { new_target, .. } => {
                let content = format!("{}\n", new_target.to_hex());
                files.write(&lock_path, &mut Cursor::new(content.into_bytes()))?;
            }
            RefUpdateAction::Delete { .. } => {}
            RefUpdateAction::SetSymbolic { target } => {
                let content = format!("ref: {target}\n");
                files.write(&lock_path, &mut Cursor::new(content.into_bytes()))?;
            }
        }
        lock_paths.push(lock_path);
    }

    let updates = transaction.updates;
    for (i, update) in updates.iter().enumerate() {
        let path = loose::loose_ref_path(&update.name);
        match &update.action {
            RefUpdateAction::Delete { .. } => {
                let _ = files.remove(&lock_paths[i]);
                loose::delete_loose_ref(files, &update.name)?;
            }
            _ => {
                files.rename(&lock_paths[i], &path)?;
            }
        }
    }

    if let Some(sig) = committer {
        for (i, update) in updates.iter().enumerate() {
            if let Some(msg) = &update.reflog_message {
                let (old_oid, new_oid) = match &update.action {
                    RefUpdateAction::Create { new_target } => (ObjectId::NULL, *new_target),
                    RefUpdateAction::Update { new_target, .. } => {
                        (current_oids[i].unwrap_or(ObjectId::NULL), *new_target)
                    }
                    RefUpdateAction::Delete { .. } => (current_oids[i].unwrap_or(ObjectId::NULL), ObjectId::NULL),
                    RefUpdateAction::SetSymbolic { .. } => continue,
                };

                let entry =
                    ReflogEntry { old_oid, new_oid, identity: sig.clone(), message: msg.as_str().into() };
                reflog::append_reflog_entry(files, &update.name, &entry)?;
            }
        }
    }

    Ok(())
}

fn verify_cas(
    name: &RefName,
    action: &RefUpdateAction,
    current_oid: Option<&ObjectId>,
    current_ref: &Option<Reference>,
) -> Result<(), RefError> {
    match action {
        RefUpdateAction::Create { .. } => {
            if current_ref.is_some() || current_oid.is_some() {
                return Err(RefError::AlreadyExists(name.to_string()));
            }
        }
        RefUpdateAction::Update { old_target, .. } => {
            let actual = current_oid.ok_or_else(|| RefError::NotFound(name.to_string()))?;
            if actual != old_target {
                return Err(RefError::CasFailed { name: name.to_string(), expected: *old_target, actual: *actual });
            }
        }
        RefUpdateAction::Delete { old_target } => {
            let actual = current_oid.ok_or_else(|| RefError::NotFound(name.to_string()))?;
            if actual != old_target {
                return Err(RefError::CasFailed { name: name.to_string(), expected: *old_target, actual: *actual });
            }
        }
        RefUpdateAction::SetSymbolic { .. } => {}
    }
    Ok(())
}

fn resolve_symref(
    files: &dyn FilesApi,
    name: &RefName,
    packed: &PackedRefs,
    max_depth: usize,
) -> Result<Option<ObjectId>, RefError> {
    if max_depth == 0 {
        return Err(RefError::SymrefLoop(name.to_string()));
    }
    match loose::read_loose_ref(files, name)? {
        Some(Reference::Direct { target, .. }) => Ok(Some(target)),
        Some(Reference::Symbolic { target, .. }) => resolve_symref(files, &target, packed, max_depth - 1),
        None => Ok(packed.find(name).map(|pr| pr.oid)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bstr::BString;
    use vcs_utils::date::GitDate;
    use vcs_utils::FsFiles;

    fn test_sig() -> Signature {
        Signature { name: BString::from("Test User"), email: BString::from("test@example.com"), date: GitDate::new(1234567890, 0) }
    }

    #[test]
    fn create_single_ref() {
        let dir = tempfile::tempdir().unwrap();
        let fs = FsFiles::new(dir.path());

        let mut tx = RefTransaction::new();
        let name = RefName::new("refs/heads/main").unwrap();
        let oid = ObjectId::from_hex("da39a3ee5e6b4b0d3255bfef95601890afd80709").unwrap();
        tx.create(name.clone(), oid, "branch: Created from HEAD");

        commit_transaction(&fs, tx, Some(&test_sig())).unwrap();

        let r = loose::read_loose_ref(&fs, &name).unwrap().unwrap();
        match r {
            Reference::Direct { target, .. } => assert_eq!(target, oid),
            _ => panic!("expected Direct ref"),
        }
    }

    #[test]
    fn update_ref_with_cas() {
        let dir = tempfile::tempdir().unwrap();
        let fs = FsFiles::new(dir.path());

        let name = RefName::new("refs/heads/main").unwrap();
        let old_oid = ObjectId::from_hex("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").unwrap();
        let new_oid = ObjectId::from_hex("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb").unwrap();

        loose::write_loose_ref(&fs, &name, &old_oid).unwrap();

        let mut tx = RefTransaction::new();
        tx.update(name.clone(), old_oid, new_oid, "commit: second commit");
        commit_transaction(&fs, tx, Some(&test_sig())).unwrap();

        let r = loose::read_loose_ref(&fs, &name).unwrap().unwrap();
        match r {
            Reference::Direct { target, .. } => assert_eq!(target, new_oid),
            _ => panic!("expected Direct ref"),
        }
    }

    #[test]
    fn update_ref_cas_failure() {
        let dir = tempfile::tempdir().unwrap();
        let fs = FsFiles::new(dir.path());

        let name = RefName::new("refs/heads/main").unwrap();
        let actual_oid = ObjectId::from_hex("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").unwrap();
        let wrong_old = ObjectId::from_hex("cccccccccccccccccccccccccccccccccccccccc").unwrap();
        let new_oid = ObjectId::from_hex("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb").unwrap();

        loose::write_loose_ref(&fs, &name, &actual_oid).unwrap();

        let mut tx = RefTransaction::new();
        tx.update(name, wrong_old, new_oid, "should fail");

        let result = commit_transaction(&fs, tx, Some(&test_sig()));
        assert!(matches!(result, Err(RefError::CasFailed { .. })));
    }

    #[test]
    fn delete_ref_transaction() {
        let dir = tempfile::tempdir().unwrap();
        let fs = FsFiles::new(dir.path());

        let name = RefName::new("refs/heads/main").unwrap();
        let oid = ObjectId::from_hex("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").unwrap();
        loose::write_loose_ref(&fs, &name, &oid).unwrap();

        let mut tx = RefTransaction::new();
        tx.delete(name.clone(), oid, "branch: deleted");
        commit_transaction(&fs, tx, Some(&test_sig())).unwrap();

        assert!(loose::read_loose_ref(&fs, &name).unwrap().is_none());
    }

    #[test]
    fn create_already_exists() {
        let dir = tempfile::tempdir().unwrap();
        let fs = FsFiles::new(dir.path());

        let name = RefName::new("refs/heads/main").unwrap();
        let oid = ObjectId::from_hex("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").unwrap();
        loose::write_loose_ref(&fs, &name, &oid).unwrap();

        let mut tx = RefTransaction::new();
        tx.create(name, oid, "should fail");

        let result = commit_transaction(&fs, tx, Some(&test_sig()));
        assert!(matches!(result, Err(RefError::AlreadyExists(_))));
    }

    #[test]
    fn set_symbolic_ref() {
        let dir = tempfile::tempdir().unwrap();
        let fs = FsFiles::new(dir.path());

        let name = RefName::new("HEAD").unwrap();
        let target = RefName::new("refs/heads/main").unwrap();

        let mut tx = RefTransaction::new();
        tx.set_symbolic(name.clone(), target.clone(), "checkout: moving to main");
        commit_transaction(&fs, tx, Some(&test_sig())).unwrap();

        let r = loose::read_loose_ref(&fs, &name).unwrap().unwrap();
        match r {
            Reference::Symbolic { target: found, .. } => assert_eq!(found, target),
            _ => panic!("expected Symbolic ref"),
        }
    }

    #[test]
    fn transaction_creates_reflog() {
        let dir = tempfile::tempdir().unwrap();
        let fs = FsFiles::new(dir.path());

        let name = RefName::new("refs/heads/main").unwrap();
        let oid = ObjectId::from_hex("da39a3ee5e6b4b0d3255bfef95601890afd80709").unwrap();

        let mut tx = RefTransaction::new();
        tx.create(name.clone(), oid, "branch: Created");
        commit_transaction(&fs, tx, Some(&test_sig())).unwrap();

        let entries = reflog::read_reflog(&fs, &name).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].old_oid.is_null());
        assert_eq!(entries[0].new_oid, oid);
        assert_eq!(entries[0].message, BString::from("branch: Created"));
    }
}
