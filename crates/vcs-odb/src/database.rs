//! Unified read/write access to objects across loose and pack storage.

use std::io::Cursor;
use std::sync::{Arc, Mutex, RwLock};

use vcs_hash::ObjectId;
use vcs_object::cache::ObjectCache;
use vcs_object::{Object, ObjectType};
use vcs_pack::{PackIndex, PackReader};
use vcs_store::{LooseStore, RawStore};
use vcs_utils::{ByteRange, FilesApi};

use crate::OdbError;

const MIN_ABBREV: usize = 4;

/// Lightweight object metadata (type + content size) without decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectInfo {
    pub object_type: ObjectType,
    pub size: usize,
}

struct LoadedPack {
    name: String,
    bytes: Vec<u8>,
    index: PackIndex,
}

/// Unified object database: loose objects plus any number of finalized
/// packs, searched loose-first (loose objects are assumed freshest).
pub struct ObjectDatabase {
    files: Arc<dyn FilesApi>,
    objects_root: String,
    loose: LooseStore,
    packs: RwLock<Vec<LoadedPack>>,
    cache: Mutex<ObjectCache>,
}

impl ObjectDatabase {
    /// Open (or initialize) the object database rooted at `objects_root`
    /// within `files` (typically `"<repo>/.git/objects"`).
    pub fn open(files: Arc<dyn FilesApi>, objects_root: impl Into<String>) -> Result<Self, OdbError> {
        let objects_root = objects_root.into();
        let loose = LooseStore::open(files.clone(), objects_root.clone());
        let packs = RwLock::new(Self::discover_packs(&files, &objects_root)?);
        Ok(Self {
            files,
            objects_root,
            loose,
            packs,
            cache: Mutex::new(ObjectCache::new(1024)),
        })
    }

    fn pack_dir(objects_root: &str) -> String {
        format!("{objects_root}/pack")
    }

    fn discover_packs(files: &Arc<dyn FilesApi>, objects_root: &str) -> Result<Vec<LoadedPack>, OdbError> {
        let pack_dir = Self::pack_dir(objects_root);
        if !files.exists(&pack_dir) {
            return Ok(Vec::new());
        }
        let mut packs = Vec::new();
        for stat in files.list(&pack_dir, false)? {
            if stat.kind != vcs_utils::EntryKind::File || !stat.path.ends_with(".pack") {
                continue;
            }
            let name = stat
                .path
                .rsplit('/')
                .next()
                .unwrap_or(&stat.path)
                .trim_end_matches(".pack")
                .to_string();
            let idx_path = format!("{pack_dir}/{name}.idx");
            if !files.exists(&idx_path) {
                continue;
            }
            let mut pack_bytes = Vec::new();
            std::io::Read::read_to_end(
                &mut *files.read(&stat.path, ByteRange::default())?,
                &mut pack_bytes,
            )?;
            let mut idx_bytes = Vec::new();
            std::io::Read::read_to_end(
                &mut *files.read(&idx_path, ByteRange::default())?,
                &mut idx_bytes,
            )?;
            let index = PackIndex::parse(&idx_bytes)?;
            packs.push(LoadedPack { name, bytes: pack_bytes, index });
        }
        // Newest-looking (highest name) pack first, matching the loose-then-recent-pack
        // search order used elsewhere in this module.
        packs.sort_by(|a, b| b.name.cmp(&a.name));
        Ok(packs)
    }

    /// Persist a new pack under `objects/pack/<name>.{pack,idx}` and make
    /// it searchable immediately.
    pub(crate) fn install_pack(&self, name: &str, bytes: Vec<u8>, index: PackIndex) -> Result<(), OdbError> {
        let pack_dir = Self::pack_dir(&self.objects_root);
        self.files.mkdir(&pack_dir)?;
        self.files
            .write(&format!("{pack_dir}/{name}.pack"), &mut Cursor::new(bytes.clone()))?;
        self.files
            .write(&format!("{pack_dir}/{name}.idx"), &mut Cursor::new(index.serialize()))?;
        self.packs.write().unwrap().insert(0, LoadedPack { name: name.to_string(), bytes, index });
        Ok(())
    }

    pub(crate) fn loose(&self) -> &LooseStore {
        &self.loose
    }

    pub(crate) fn files(&self) -> &Arc<dyn FilesApi> {
        &self.files
    }

    /// Read a full object by id, searching loose storage then packs.
    pub fn read(&self, id: &ObjectId) -> Result<Option<Object>, OdbError> {
        if let Some((object_type, content)) = self.resolve_bytes(id)? {
            return Ok(Some(Object::parse_content(object_type, &content)?));
        }
        Ok(None)
    }

    /// Read a cached object by id, populating the cache on a miss.
    pub fn read_cached(&self, id: &ObjectId) -> Result<Option<Object>, OdbError> {
        if let Some(obj) = self.cache.lock().unwrap().get(id) {
            return Ok(Some(obj.clone()));
        }
        let obj = self.read(id)?;
        if let Some(ref obj) = obj {
            self.cache.lock().unwrap().insert(*id, obj.clone());
        }
        Ok(obj)
    }

    pub fn read_header(&self, id: &ObjectId) -> Result<Option<ObjectInfo>, OdbError> {
        Ok(self
            .resolve_bytes(id)?
            .map(|(object_type, content)| ObjectInfo { object_type, size: content.len() }))
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        if self.loose.has(&id.to_hex()) {
            return true;
        }
        self.packs.read().unwrap().iter().any(|p| p.index.contains(id))
    }

    /// Whether `id` currently has a loose copy (as opposed to being only
    /// reachable through a pack). Used by GC to find repack candidates.
    pub fn is_loose(&self, id: &ObjectId) -> bool {
        self.loose.has(&id.to_hex())
    }

    /// Write a new object to loose storage. A no-op (returns the same id)
    /// if the object already exists anywhere.
    pub fn write(&self, obj: &Object) -> Result<ObjectId, OdbError> {
        let id = obj.compute_id()?;
        if !self.contains(&id) {
            self.loose
                .store(&id.to_hex(), &mut Cursor::new(obj.serialize()))?;
        }
        Ok(id)
    }

    pub fn write_raw(&self, object_type: ObjectType, content: &[u8]) -> Result<ObjectId, OdbError> {
        self.write(&Object::parse_content(object_type, content)?)
    }

    /// Resolve a delta chain (if any) down to the object's full bytes.
    /// Returns `(type, content, chain of ids walked including `id` itself,
    /// total compressed bytes read across the chain)`.
    pub(crate) fn resolve_chain(
        &self,
        id: &ObjectId,
    ) -> Result<Option<(ObjectType, Vec<u8>, Vec<ObjectId>, usize)>, OdbError> {
        if let Some(obj) = self.read_loose(id)? {
            let size = obj.serialize().len();
            return Ok(Some((obj.object_type(), obj.serialize_content(), vec![*id], size)));
        }

        let packs = self.packs.read().unwrap();
        for pack in packs.iter() {
            if !pack.index.contains(id) {
                continue;
            }
            let reader = PackReader::new(&pack.bytes, &pack.index);
            return self.resolve_in_pack(id, &reader, &packs).map(Some);
        }
        Ok(None)
    }

    fn resolve_in_pack(
        &self,
        id: &ObjectId,
        reader: &PackReader<'_>,
        all_packs: &[LoadedPack],
    ) -> Result<(ObjectType, Vec<u8>, Vec<ObjectId>, usize), OdbError> {
        let entry = reader.read(id)?;
        if let Some(object_type) = entry.entry_type.to_object_type() {
            let size = entry.data.len();
            return Ok((object_type, entry.data, vec![*id], size));
        }

        let base_id = entry
            .base
            .ok_or_else(|| OdbError::Corrupt { oid: *id, reason: "delta entry missing base".into() })?;
        let this_size = entry.data.len();

        // Base may be loose, in this same pack, or in another pack entirely.
        let (base_type, base_content, mut chain, base_size) = if let Some(obj) = self.read_loose(&base_id)? {
            (obj.object_type(), obj.serialize_content(), vec![base_id], obj.serialize().len())
        } else if reader.read(&base_id).is_ok() {
            self.resolve_in_pack(&base_id, reader, all_packs)?
        } else {
            let mut found = None;
            for other in all_packs {
                if other.index.contains(&base_id) {
                    let other_reader = PackReader::new(&other.bytes, &other.index);
                    found = Some(self.resolve_in_pack(&base_id, &other_reader, all_packs)?);
                    break;
                }
            }
            found.ok_or(OdbError::Corrupt { oid: *id, reason: format!("missing delta base {base_id}") })?
        };

        let content = vcs_pack::apply_delta(&base_content, &entry.data)?;
        chain.insert(0, *id);
        Ok((base_type, content, chain, this_size + base_size))
    }

    fn read_loose(&self, id: &ObjectId) -> Result<Option<Object>, OdbError> {
        let key = id.to_hex();
        if !self.loose.has(&key) {
            return Ok(None);
        }
        let mut bytes = Vec::new();
        std::io::Read::read_to_end(&mut *self.loose.load(&key, ByteRange::default())?, &mut bytes)?;
        Ok(Some(Object::parse(&bytes)?))
    }

    fn resolve_bytes(&self, id: &ObjectId) -> Result<Option<(ObjectType, Vec<u8>)>, OdbError> {
        Ok(self.resolve_chain(id)?.map(|(t, c, _, _)| (t, c)))
    }

    /// All object ids known to this database (loose and packed).
    pub fn iter_ids(&self) -> Result<Vec<ObjectId>, OdbError> {
        let mut ids: Vec<ObjectId> = self
            .loose
            .keys()?
            .into_iter()
            .filter_map(|k| ObjectId::from_hex(&k).ok())
            .collect();
        for pack in self.packs.read().unwrap().iter() {
            ids.extend(pack.index.ids().copied());
        }
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    /// Resolve a hex prefix to a full id. Errors if zero or more than one
    /// object matches.
    pub fn resolve_prefix(&self, prefix: &str) -> Result<ObjectId, OdbError> {
        if prefix.len() < MIN_ABBREV || !prefix.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(OdbError::Ambiguous { prefix: prefix.to_string(), count: 0 });
        }
        if prefix.len() == vcs_hash::OID_LEN * 2 {
            let id = ObjectId::from_hex(prefix)?;
            return if self.contains(&id) { Ok(id) } else { Err(OdbError::NotFound(id)) };
        }
        let matches: Vec<ObjectId> = self
            .iter_ids()?
            .into_iter()
            .filter(|id| id.starts_with_hex(prefix))
            .collect();
        match matches.len() {
            0 => Err(OdbError::NotFound(ObjectId::NULL)),
            1 => Ok(matches[0]),
            count => Err(OdbError::Ambiguous { prefix: prefix.to_string(), count }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcs_object::Blob;
    use vcs_utils::FsFiles;

    fn db() -> (tempfile::TempDir, ObjectDatabase) {
        let dir = tempfile::tempdir().unwrap();
        let files: Arc<dyn FilesApi> = Arc::new(FsFiles::new(dir.path()));
        let db = ObjectDatabase::open(files, "objects").unwrap();
        (dir, db)
    }

    #[test]
    fn write_then_read_roundtrips() {
        let (_dir, db) = db();
        let obj = Object::Blob(Blob::new(b"hello\n".to_vec()));
        let id = db.write(&obj).unwrap();
        assert_eq!(id.to_hex(), "ce013625030ba8dba906f756967f9e9ca394464a");
        let read_back = db.read(&id).unwrap().unwrap();
        assert_eq!(read_back, obj);
    }

    #[test]
    fn write_is_idempotent() {
        let (_dir, db) = db();
        let obj = Object::Blob(Blob::new(b"same\n".to_vec()));
        let id1 = db.write(&obj).unwrap();
        let id2 = db.write(&obj).unwrap();
        assert_eq!(id1, id2);
    }

    #[test]
    fn contains_and_missing() {
        let (_dir, db) = db();
        let obj = Object::Blob(Blob::new(b"x".to_vec()));
        let id = db.write(&obj).unwrap();
        assert!(db.contains(&id));
        assert!(!db.contains(&ObjectId::NULL));
    }

    #[test]
    fn resolve_prefix_unique() {
        let (_dir, db) = db();
        let obj = Object::Blob(Blob::new(b"hello\n".to_vec()));
        let id = db.write(&obj).unwrap();
        let resolved = db.resolve_prefix(&id.to_hex()[..8]).unwrap();
        assert_eq!(resolved, id);
    }

    #[test]
    fn resolve_prefix_short_is_ambiguous() {
        let (_dir, db) = db();
        assert!(matches!(db.resolve_prefix("abc"), Err(OdbError::Ambiguous { .. })));
    }

    #[test]
    fn iter_ids_includes_written_objects() {
        let (_dir, db) = db();
        let id1 = db.write(&Object::Blob(Blob::new(b"a".to_vec()))).unwrap();
        let id2 = db.write(&Object::Blob(Blob::new(b"b".to_vec()))).unwrap();
        let ids = db.iter_ids().unwrap();
        assert!(ids.contains(&id1));
        assert!(ids.contains(&id2));
    }
}
