//! Deltify/undeltify, batch lifecycle, and delta-chain inspection (spec L1).

use std::io::Cursor;
use std::sync::Mutex;

use vcs_hash::ObjectId;
use vcs_object::Object;
use vcs_pack::{ChainInfo, PackWriter};
use vcs_store::RawStore;

use crate::{ObjectDatabase, OdbError};

pub const DEFAULT_MAX_RATIO: f64 = vcs_pack::defaults::MAX_RATIO;
pub const DEFAULT_MIN_SIZE: usize = vcs_pack::defaults::MIN_SIZE;
pub const DEFAULT_MAX_CHAIN_DEPTH: usize = 50;

enum Batch {
    Idle,
    Open { writer: PackWriter, prune: Vec<ObjectId> },
}

/// Computes, stores, and resolves deltas over an [`ObjectDatabase`].
pub struct DeltaEngine<'a> {
    db: &'a ObjectDatabase,
    max_ratio: f64,
    min_size: usize,
    max_chain_depth: usize,
    batch: Mutex<Batch>,
}

impl<'a> DeltaEngine<'a> {
    pub fn new(db: &'a ObjectDatabase) -> Self {
        Self {
            db,
            max_ratio: DEFAULT_MAX_RATIO,
            min_size: DEFAULT_MIN_SIZE,
            max_chain_depth: DEFAULT_MAX_CHAIN_DEPTH,
            batch: Mutex::new(Batch::Idle),
        }
    }

    pub fn with_limits(mut self, max_ratio: f64, min_size: usize, max_chain_depth: usize) -> Self {
        self.max_ratio = max_ratio;
        self.min_size = min_size;
        self.max_chain_depth = max_chain_depth;
        self
    }

    pub fn start_batch(&self) -> Result<(), OdbError> {
        let mut batch = self.batch.lock().unwrap();
        if !matches!(*batch, Batch::Idle) {
            return Err(OdbError::BatchInProgress);
        }
        *batch = Batch::Open { writer: PackWriter::new(), prune: Vec::new() };
        Ok(())
    }

    /// Finalize the open batch's pack (if it produced any entries) and
    /// remove the loose copies of everything that became a delta.
    pub fn end_batch(&self) -> Result<(), OdbError> {
        let mut batch = self.batch.lock().unwrap();
        let (writer, prune) = match std::mem::replace(&mut *batch, Batch::Idle) {
            Batch::Idle => return Err(OdbError::NoBatch),
            Batch::Open { writer, prune } => (writer, prune),
        };
        if !writer.is_empty() {
            let (pack_bytes, index) = writer.finish();
            let name = format!("pack-{:x}", fossil_name_hash(&pack_bytes));
            self.db.install_pack(&name, pack_bytes, index)?;
        }
        for id in prune {
            let _ = self.db.loose().delete(&id.to_hex());
        }
        Ok(())
    }

    pub fn cancel_batch(&self) -> Result<(), OdbError> {
        let mut batch = self.batch.lock().unwrap();
        if matches!(*batch, Batch::Idle) {
            return Err(OdbError::NoBatch);
        }
        *batch = Batch::Idle;
        Ok(())
    }

    pub fn is_batch_open(&self) -> bool {
        !matches!(*self.batch.lock().unwrap(), Batch::Idle)
    }

    /// Compute a delta for `target` against the best of `candidates` and,
    /// if it is beneficial, store it in the open batch's pack. Returns
    /// whether deltification happened.
    pub fn deltify(&self, target: ObjectId, candidates: &[ObjectId]) -> Result<bool, OdbError> {
        let mut batch = self.batch.lock().unwrap();
        let (writer, prune) = match &mut *batch {
            Batch::Idle => return Err(OdbError::NoBatch),
            Batch::Open { writer, prune } => (writer, prune),
        };

        let target_obj = self.db.read(&target)?.ok_or(OdbError::NotFound(target))?;
        let target_bytes = target_obj.serialize_content();
        if target_bytes.len() < self.min_size {
            return Ok(false);
        }

        let mut best: Option<(ObjectId, Vec<u8>)> = None;
        for &candidate in candidates {
            if candidate == target {
                continue;
            }
            let info = self.chain_info(candidate)?;
            if info.depth + 1 > self.max_chain_depth {
                continue;
            }
            let Some(candidate_obj) = self.db.read(&candidate)? else { continue };
            let candidate_bytes = candidate_obj.serialize_content();
            let delta = vcs_pack::compute_delta(&candidate_bytes, &target_bytes);
            let ratio = delta.len() as f64 / target_bytes.len() as f64;
            if ratio > self.max_ratio {
                continue;
            }
            if !best.as_ref().is_some_and(|(_, best_delta)| delta.len() >= best_delta.len()) {
                best = Some((candidate, delta));
            }
        }

        let Some((base, delta)) = best else { return Ok(false) };
        writer.add_delta(target, base, target_bytes.len(), &delta)?;
        prune.push(target);
        Ok(true)
    }

    /// Resolve `id`'s full bytes and write them back to loose storage,
    /// dropping its place in any delta chain. A no-op for non-delta objects.
    pub fn undeltify(&self, id: ObjectId) -> Result<(), OdbError> {
        let Some((object_type, content, chain, _)) = self.db.resolve_chain(&id)? else {
            return Err(OdbError::NotFound(id));
        };
        if chain.len() <= 1 {
            return Ok(());
        }
        let obj = Object::parse_content(object_type, &content)?;
        self.db.loose().store(&id.to_hex(), &mut Cursor::new(obj.serialize()))?;
        Ok(())
    }

    /// Delta-chain depth, compressed size, and base chain for `id`.
    /// Non-delta (loose or undeltified) objects have depth 0.
    pub fn chain_info(&self, id: ObjectId) -> Result<ChainInfo, OdbError> {
        let Some((_, _, chain, compressed_size)) = self.db.resolve_chain(&id)? else {
            return Err(OdbError::NotFound(id));
        };
        Ok(ChainInfo { depth: chain.len() - 1, compressed_size, chain })
    }
}

/// A short content-derived name for a new pack file; collisions are
/// harmless since `install_pack` always appends rather than overwrites.
fn fossil_name_hash(bytes: &[u8]) -> u32 {
    vcs_pack::delta::fossil_checksum(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vcs_object::Blob;
    use vcs_utils::{FilesApi, FsFiles};

    fn db() -> (tempfile::TempDir, ObjectDatabase) {
        let dir = tempfile::tempdir().unwrap();
        let files: Arc<dyn FilesApi> = Arc::new(FsFiles::new(dir.path()));
        let db = ObjectDatabase::open(files, "objects").unwrap();
        (dir, db)
    }

    #[test]
    fn deltify_requires_open_batch() {
        let (_dir, db) = db();
        let engine = DeltaEngine::new(&db);
        let id = db.write(&Object::Blob(Blob::new(b"x".repeat(200)))).unwrap();
        assert!(matches!(engine.deltify(id, &[]), Err(OdbError::NoBatch)));
    }

    #[test]
    fn double_start_batch_errors() {
        let (_dir, db) = db();
        let engine = DeltaEngine::new(&db);
        engine.start_batch().unwrap();
        assert!(matches!(engine.start_batch(), Err(OdbError::BatchInProgress)));
    }

    #[test]
    fn end_batch_without_start_errors() {
        let (_dir, db) = db();
        let engine = DeltaEngine::new(&db);
        assert!(matches!(engine.end_batch(), Err(OdbError::NoBatch)));
    }

    #[test]
    fn small_targets_are_not_deltified() {
        let (_dir, db) = db();
        let engine = DeltaEngine::new(&db);
        let base = db.write(&Object::Blob(Blob::new(b"short".to_vec()))).unwrap();
        let target = db.write(&Object::Blob(Blob::new(b"tiny".to_vec()))).unwrap();
        engine.start_batch().unwrap();
        let deltified = engine.deltify(target, &[base]).unwrap();
        assert!(!deltified);
        engine.end_batch().unwrap();
    }

    #[test]
    fn deltify_against_similar_object_and_resolve() {
        let (_dir, db) = db();
        let engine = DeltaEngine::new(&db);
        let base_bytes = b"x".repeat(4096);
        let mut target_bytes = base_bytes.clone();
        target_bytes[2000] = b'Y';

        let base = db.write(&Object::Blob(Blob::new(base_bytes))).unwrap();
        let target = db.write(&Object::Blob(Blob::new(target_bytes.clone()))).unwrap();

        engine.start_batch().unwrap();
        let deltified = engine.deltify(target, &[base]).unwrap();
        assert!(deltified);
        engine.end_batch().unwrap();

        // Loose copy of the deltified target is gone...
        assert!(!db.loose().has(&target.to_hex()));
        // ...but the object still resolves to byte-identical content.
        let resolved = db.read(&target).unwrap().unwrap();
        assert_eq!(resolved.serialize_content(), target_bytes);

        let info = engine.chain_info(target).unwrap();
        assert_eq!(info.depth, 1);
        assert_eq!(info.base(), Some(&base));
    }

    #[test]
    fn undeltify_restores_loose_copy() {
        let (_dir, db) = db();
        let engine = DeltaEngine::new(&db);
        let base_bytes = b"x".repeat(4096);
        let mut target_bytes = base_bytes.clone();
        target_bytes[10] = b'Z';
        let base = db.write(&Object::Blob(Blob::new(base_bytes))).unwrap();
        let target = db.write(&Object::Blob(Blob::new(target_bytes.clone()))).unwrap();

        engine.start_batch().unwrap();
        assert!(engine.deltify(target, &[base]).unwrap());
        engine.end_batch().unwrap();
        assert_eq!(engine.chain_info(target).unwrap().depth, 1);

        engine.undeltify(target).unwrap();
        assert!(db.loose().has(&target.to_hex()));
        assert_eq!(engine.chain_info(target).unwrap().depth, 0);
    }

    #[test]
    fn cancel_batch_discards_pending_deltas() {
        let (_dir, db) = db();
        let engine = DeltaEngine::new(&db);
        let base_bytes = b"x".repeat(4096);
        let mut target_bytes = base_bytes.clone();
        target_bytes[0] = b'Q';
        let base = db.write(&Object::Blob(Blob::new(base_bytes))).unwrap();
        let target = db.write(&Object::Blob(Blob::new(target_bytes))).unwrap();

        engine.start_batch().unwrap();
        assert!(engine.deltify(target, &[base]).unwrap());
        engine.cancel_batch().unwrap();

        // Still loose, untouched by the cancelled batch.
        assert!(db.loose().has(&target.to_hex()));
        assert_eq!(engine.chain_info(target).unwrap().depth, 0);
    }
}
