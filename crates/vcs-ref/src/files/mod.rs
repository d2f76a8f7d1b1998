pub(crate) mod loose;
pub mod packed;
pub(crate) mod transaction;

use std::collections::HashSet;
use std::sync::Arc;

use vcs_hash::ObjectId;
use vcs_utils::date::Signature;
use vcs_utils::FilesApi;

use crate::error::RefError;
use crate::name::RefName;
use crate::reflog::{self, ReflogEntry};
use crate::store::{RefStore, RefTransaction};
use crate::Reference;

use self::packed::PackedRefs;

/// Maximum depth for following symbolic ref chains.
const MAX_SYMREF_DEPTH: usize = 10;

/// Files-backend ref store (loose refs + packed-refs), built over
/// [`FilesApi`] rather than the local filesystem directly.
///
/// Matches C git's files backend: loose refs take precedence over packed
/// refs, and updates go through lock-then-rename for atomicity.
pub struct FilesRefStore {
    files: Arc<dyn FilesApi>,
    committer: Option<Signature>,
}

impl FilesRefStore {
    pub fn new(files: Arc<dyn FilesApi>) -> Self {
        Self { files, committer: None }
    }

    /// Set the committer identity used for reflog entries.
    pub fn set_committer(&mut self, sig: Signature) {
        self.committer = Some(sig);
    }

    fn resolve_inner(&self, name: &RefName, depth: usize) -> Result<Option<ObjectId>, RefError> {
        if depth > MAX_SYMREF_DEPTH {
            return Err(RefError::SymrefLoop(name.to_string()));
        }

        match loose::read_loose_ref(self.files.as_ref(), name)? {
            Some(Reference::Direct { target, .. }) => Ok(Some(target)),
            Some(Reference::Symbolic { target, .. }) => self.resolve_inner(&target, depth + 1),
            None => {
                let packed = PackedRefs::load(self.files.as_ref())?;
                Ok(packed.find(name).map(|pr| pr.oid))
            }
        }
    }

    /// Write a single ref directly (non-transactional).
    pub fn write_ref(&self, name: &RefName, oid: &ObjectId) -> Result<(), RefError> {
        loose::write_loose_ref(self.files.as_ref(), name, oid)
    }

    /// Write a symbolic ref directly (non-transactional).
    pub fn write_symbolic_ref(&self, name: &RefName, target: &RefName) -> Result<(), RefError> {
        loose::write_symbolic_ref(self.files.as_ref(), name, target)
    }

    /// Delete a ref directly (non-transactional).
    pub fn delete_ref(&self, name: &RefName) -> Result<(), RefError> {
        loose::delete_loose_ref(self.files.as_ref(), name)
    }

    /// Commit a transaction atomically.
    pub fn commit_transaction(&self, transaction: RefTransaction) -> Result<(), RefError> {
        transaction::commit_transaction(self.files.as_ref(), transaction, self.committer.as_ref())
    }

    /// Load the packed-refs file.
    pub fn packed_refs(&self) -> Result<PackedRefs, RefError> {
        PackedRefs::load(self.files.as_ref())
    }

    /// Pack a loose ref into packed-refs and remove the loose file.
    pub fn pack_ref(&self, name: &RefName) -> Result<(), RefError> {
        let oid = match loose::read_loose_ref(self.files.as_ref(), name)? {
            Some(Reference::Direct { target, .. }) => target,
            Some(Reference::Symbolic { .. }) => {
                return Err(RefError::PackedRefs("cannot pack symbolic ref".into()));
            }
            None => return Err(RefError::NotFound(name.to_string())),
        };

        let mut packed = PackedRefs::load(self.files.as_ref())?;
        packed.upsert(name.clone(), oid, None);
        packed.write(self.files.as_ref())?;

        loose::delete_loose_ref(self.files.as_ref(), name)?;
        Ok(())
    }
}

impl RefStore for FilesRefStore {
    fn resolve(&self, name: &RefName) -> Result<Option<Reference>, RefError> {
        match loose::read_loose_ref(self.files.as_ref(), name)? {
            Some(r) => Ok(Some(r)),
            None => {
                let packed = PackedRefs::load(self.files.as_ref())?;
                Ok(packed.find(name).map(|pr| Reference::Direct { name: pr.name.clone(), target: pr.oid }))
            }
        }
    }

    fn resolve_to_oid(&self, name: &RefName) -> Result<Option<ObjectId>, RefError> {
        self.resolve_inner(name, 0)
    }

    fn iter(
        &self,
        prefix: Option<&str>,
    ) -> Result<Box<dyn Iterator<Item = Result<Reference, RefError>> + '_>, RefError> {
        let loose_refs = loose::enumerate_loose_refs(self.files.as_ref(), prefix)?;
        let mut loose_names: HashSet<String> = HashSet::new();

        let mut all_refs: Vec<Result<Reference, RefError>> = Vec::new();

        for name in &loose_refs {
            loose_names.insert(name.as_str().to_string());
            match loose::read_loose_ref(self.files.as_ref(), name) {
                Ok(Some(r)) => all_refs.push(Ok(r)),
                Ok(None) => {}
                Err(e) => all_refs.push(Err(e)),
            }
        }

        let packed = PackedRefs::load(self.files.as_ref())?;
        for pr in packed.refs() {
            if loose_names.contains(pr.name.as_str()) {
                continue;
            }
            if let Some(p) = prefix {
                if !pr.name.as_str().starts_with(p) {
                    continue;
                }
            }
            all_refs.push(Ok(Reference::Direct { name: pr.name.clone(), target: pr.oid }));
        }

        all_refs.sort_by(|a, b| {
            let name_a = match a {
                Ok(r) => r.name().clone(),
                Err(_) => RefName::new_unchecked(""),
            };
            let name_b = match b {
                Ok(r) => r.name().clone(),
                Err(_) => RefName::new_unchecked(""),
            };
            name_a.cmp(&name_b)
        });

        Ok(Box::new(all_refs.into_iter()))
    }

    fn reflog(&self, name: &RefName) -> Result<Vec<ReflogEntry>, RefError> {
        reflog::read_reflog(self.files.as_ref(), name)
    }

    fn append_reflog(&self, name: &RefName, entry: &ReflogEntry) -> Result<(), RefError> {
        reflog::append_reflog_entry(self.files.as_ref(), name, entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bstr::BString;
    use vcs_utils::date::GitDate;
    use vcs_utils::FsFiles;

    fn test_store(files: Arc<dyn FilesApi>) -> FilesRefStore {
        let mut store = FilesRefStore::new(files);
        store.set_committer(Signature {
            name: BString::from("Test User"),
            email: BString::from("test@example.com"),
            date: GitDate::new(1234567890, 0),
        });
        store
    }

    fn test_files() -> (tempfile::TempDir, Arc<dyn FilesApi>) {
        let dir = tempfile::tempdir().unwrap();
        let files: Arc<dyn FilesApi> = Arc::new(FsFiles::new(dir.path()));
        (dir, files)
    }

    #[test]
    fn resolve_direct_ref() {
        let (_dir, files) = test_files();
        let store = test_store(files.clone());

        let name = RefName::new("refs/heads/main").unwrap();
        let oid = ObjectId::from_hex("da39a3ee5e6b4b0d3255bfef95601890afd80709").unwrap();
        loose::write_loose_ref(files.as_ref(), &name, &oid).unwrap();

        let resolved = store.resolve_to_oid(&name).unwrap().unwrap();
        assert_eq!(resolved, oid);
    }

    #[test]
    fn resolve_symbolic_ref_chain() {
        let (_dir, files) = test_files();
        let store = test_store(files.clone());

        let main_name = RefName::new("refs/heads/main").unwrap();
        let oid = ObjectId::from_hex("da39a3ee5e6b4b0d3255bfef95601890afd80709").unwrap();
        loose::write_loose_ref(files.as_ref(), &main_name, &oid).unwrap();

        let head = RefName::new("HEAD").unwrap();
        loose::write_symbolic_ref(files.as_ref(), &head, &main_name).unwrap();

        let resolved = store.resolve_to_oid(&head).unwrap().unwrap();
        assert_eq!(resolved, oid);
    }

    #[test]
    fn resolve_detached_head() {
        let (_dir, files) = test_files();
        let store = test_store(files.clone());

        let head = RefName::new("HEAD").unwrap();
        let oid = ObjectId::from_hex("da39a3ee5e6b4b0d3255bfef95601890afd80709").unwrap();
        loose::write_loose_ref(files.as_ref(), &head, &oid).unwrap();

        let resolved = store.resolve_to_oid(&head).unwrap().unwrap();
        assert_eq!(resolved, oid);
    }

    #[test]
    fn resolve_nonexistent() {
        let (_dir, files) = test_files();
        let store = test_store(files);
        let name = RefName::new("refs/heads/nonexistent").unwrap();
        assert!(store.resolve_to_oid(&name).unwrap().is_none());
    }

    #[test]
    fn resolve_symref_loop_detected() {
        let (_dir, files) = test_files();
        let store = test_store(files.clone());

        let a = RefName::new("refs/heads/a").unwrap();
        let b = RefName::new("refs/heads/b").unwrap();
        loose::write_symbolic_ref(files.as_ref(), &a, &b).unwrap();
        loose::write_symbolic_ref(files.as_ref(), &b, &a).unwrap();

        let result = store.resolve_to_oid(&a);
        assert!(matches!(result, Err(RefError::SymrefLoop(_))));
    }

    #[test]
    fn loose_over_packed_precedence() {
        let (_dir, files) = test_files();
        let store = test_store(files.clone());

        let name = RefName::new("refs/heads/main").unwrap();
        let packed_oid = ObjectId::from_hex("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").unwrap();
        let loose_oid = ObjectId::from_hex("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb").unwrap();

        let mut packed = PackedRefs::load(files.as_ref()).unwrap();
        packed.upsert(name.clone(), packed_oid, None);
        packed.write(files.as_ref()).unwrap();

        loose::write_loose_ref(files.as_ref(), &name, &loose_oid).unwrap();

        let resolved = store.resolve_to_oid(&name).unwrap().unwrap();
        assert_eq!(resolved, loose_oid);
    }

    #[test]
    fn resolve_from_packed_when_no_loose() {
        let (_dir, files) = test_files();
        let store = test_store(files.clone());

        let name = RefName::new("refs/heads/main").unwrap();
        let oid = ObjectId::from_hex("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").unwrap();

        let mut packed = PackedRefs::load(files.as_ref()).unwrap();
        packed.upsert(name.clone(), oid, None);
        packed.write(files.as_ref()).unwrap();

        let resolved = store.resolve_to_oid(&name).unwrap().unwrap();
        assert_eq!(resolved, oid);
    }

    #[test]
    fn iterate_all_refs() {
        let (_dir, files) = test_files();
        let store = test_store(files.clone());

        let oid = ObjectId::from_hex("da39a3ee5e6b4b0d3255bfef95601890afd80709").unwrap();
        loose::write_loose_ref(files.as_ref(), &RefName::new("refs/heads/main").unwrap(), &oid).unwrap();
        loose::write_loose_ref(files.as_ref(), &RefName::new("refs/heads/feature").unwrap(), &oid).unwrap();
        loose::write_loose_ref(files.as_ref(), &RefName::new("refs/tags/v1.0").unwrap(), &oid).unwrap();

        let refs: Vec<_> = store.iter(None).unwrap().collect::<Result<_, _>>().unwrap();
        assert_eq!(refs.len(), 3);
        assert_eq!(refs[0].name().as_str(), "refs/heads/feature");
        assert_eq!(refs[1].name().as_str(), "refs/heads/main");
        assert_eq!(refs[2].name().as_str(), "refs/tags/v1.0");
    }

    #[test]
    fn iterate_with_prefix() {
        let (_dir, files) = test_files();
        let store = test_store(files.clone());

        let oid = ObjectId::from_hex("da39a3ee5e6b4b0d3255bfef95601890afd80709").unwrap();
        loose::write_loose_ref(files.as_ref(), &RefName::new("refs/heads/main").unwrap(), &oid).unwrap();
        loose::write_loose_ref(files.as_ref(), &RefName::new("refs/tags/v1.0").unwrap(), &oid).unwrap();

        let refs: Vec<_> = store.iter(Some("refs/heads/")).unwrap().collect::<Result<_, _>>().unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].name().as_str(), "refs/heads/main");
    }

    #[test]
    fn iterate_deduplicates_loose_and_packed() {
        let (_dir, files) = test_files();
        let store = test_store(files.clone());

        let name = RefName::new("refs/heads/main").unwrap();
        let oid = ObjectId::from_hex("da39a3ee5e6b4b0d3255bfef95601890afd80709").unwrap();

        loose::write_loose_ref(files.as_ref(), &name, &oid).unwrap();
        let mut packed = PackedRefs::load(files.as_ref()).unwrap();
        packed.upsert(name, ObjectId::from_hex("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").unwrap(), None);
        packed.write(files.as_ref()).unwrap();

        let refs: Vec<_> = store.iter(None).unwrap().collect::<Result<_, _>>().unwrap();
        assert_eq!(refs.len(), 1);
        match &refs[0] {
            Reference::Direct { target, .. } => assert_eq!(*target, oid),
            _ => panic!("expected Direct ref"),
        }
    }

    #[test]
    fn pack_ref_operation() {
        let (_dir, files) = test_files();
        let store = test_store(files.clone());

        let name = RefName::new("refs/heads/main").unwrap();
        let oid = ObjectId::from_hex("da39a3ee5e6b4b0d3255bfef95601890afd80709").unwrap();
        loose::write_loose_ref(files.as_ref(), &name, &oid).unwrap();

        store.pack_ref(&name).unwrap();

        assert!(!files.exists(&loose::loose_ref_path(&name)));

        let resolved = store.resolve_to_oid(&name).unwrap().unwrap();
        assert_eq!(resolved, oid);
    }

    #[test]
    fn transaction_with_reflog() {
        let (_dir, files) = test_files();
        let store = test_store(files);

        let name = RefName::new("refs/heads/main").unwrap();
        let oid = ObjectId::from_hex("da39a3ee5e6b4b0d3255bfef95601890afd80709").unwrap();

        let mut tx = RefTransaction::new();
        tx.create(name.clone(), oid, "branch: Created from HEAD");
        store.commit_transaction(tx).unwrap();

        let entries = store.reflog(&name).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].old_oid.is_null());
        assert_eq!(entries[0].new_oid, oid);
    }

    #[test]
    fn dangling_symref() {
        let (_dir, files) = test_files();
        let store = test_store(files.clone());

        let head = RefName::new("HEAD").unwrap();
        let target = RefName::new("refs/heads/main").unwrap();
        loose::write_symbolic_ref(files.as_ref(), &head, &target).unwrap();

        let reference = store.resolve(&head).unwrap().unwrap();
        assert!(reference.is_symbolic());

        assert!(store.resolve_to_oid(&head).unwrap().is_none());
    }
}
