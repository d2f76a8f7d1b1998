//! Repack scheduling and execution (spec L1 garbage collection).

use std::sync::Mutex;
use std::time::{Duration, Instant};

use vcs_hash::ObjectId;

use crate::delta_engine::DeltaEngine;
use crate::{ObjectDatabase, OdbError};

pub const DEFAULT_QUICK_PACK_THRESHOLD: usize = 5;
pub const DEFAULT_LOOSE_OBJECT_THRESHOLD: usize = 100;
pub const DEFAULT_CHAIN_DEPTH_THRESHOLD: usize = 50;
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_WINDOW_SIZE: usize = 10;

/// A phase boundary emitted by [`GcController::run_gc`] for progress
/// reporting. Purely informational; nothing downstream depends on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GcEvent {
    UndeltifyingOverDepth { count: usize },
    Deltifying { done: usize, total: usize },
    Pruning { count: usize },
}

/// Tracks how many objects have been written since the last repack and
/// decides when a repack is due.
pub struct GcController<'a> {
    db: &'a ObjectDatabase,
    quick_pack_threshold: usize,
    loose_object_threshold: usize,
    chain_depth_threshold: usize,
    min_interval: Duration,
    window_size: usize,
    state: Mutex<SchedulerState>,
}

struct SchedulerState {
    pending_since_pack: usize,
    last_run: Option<Instant>,
}

impl<'a> GcController<'a> {
    pub fn new(db: &'a ObjectDatabase) -> Self {
        Self {
            db,
            quick_pack_threshold: DEFAULT_QUICK_PACK_THRESHOLD,
            loose_object_threshold: DEFAULT_LOOSE_OBJECT_THRESHOLD,
            chain_depth_threshold: DEFAULT_CHAIN_DEPTH_THRESHOLD,
            min_interval: DEFAULT_MIN_INTERVAL,
            window_size: DEFAULT_WINDOW_SIZE,
            state: Mutex::new(SchedulerState { pending_since_pack: 0, last_run: None }),
        }
    }

    /// Record that `count` new objects were written; used by
    /// [`Self::should_quick_pack`] to decide when a light deltify pass
    /// over recent objects is worthwhile.
    pub fn note_objects_written(&self, count: usize) {
        self.state.lock().unwrap().pending_since_pack += count;
    }

    pub fn should_quick_pack(&self) -> bool {
        self.state.lock().unwrap().pending_since_pack >= self.quick_pack_threshold
    }

    /// Whether a full repack is due: the loose object count or a delta
    /// chain has grown past its threshold, and enough time has passed
    /// since the last run.
    pub fn maybe_run_gc(&self) -> Result<bool, OdbError> {
        if !self.due()? {
            return Ok(false);
        }
        self.run_gc(|_| {})?;
        Ok(true)
    }

    fn due(&self) -> Result<bool, OdbError> {
        let elapsed_ok = {
            let state = self.state.lock().unwrap();
            !state.last_run.is_some_and(|t| t.elapsed() < self.min_interval)
        };
        if !elapsed_ok {
            return Ok(false);
        }
        let ids = self.db.iter_ids()?;
        let loose_count = ids.iter().filter(|id| self.db.is_loose(id)).count();
        if loose_count >= self.loose_object_threshold {
            return Ok(true);
        }
        let engine = DeltaEngine::new(self.db);
        for id in &ids {
            if engine.chain_info(*id).map(|i| i.exceeds(self.chain_depth_threshold)).unwrap_or(false) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Force a repack now, ignoring `min_interval`. Runs the standard
    /// six-step algorithm: undeltify anything over depth, open a batch,
    /// slide a window of candidates over the loose set deltifying each
    /// against its window, close the batch, and record the run time.
    pub fn run_gc(&self, mut on_event: impl FnMut(GcEvent)) -> Result<(), OdbError> {
        let engine = DeltaEngine::new(self.db);
        let all_ids = self.db.iter_ids()?;

        let over_depth: Vec<ObjectId> = all_ids
            .iter()
            .copied()
            .filter(|id| {
                engine
                    .chain_info(*id)
                    .map(|i| i.exceeds(self.chain_depth_threshold))
                    .unwrap_or(false)
            })
            .collect();
        on_event(GcEvent::UndeltifyingOverDepth { count: over_depth.len() });
        for id in &over_depth {
            engine.undeltify(*id)?;
        }

        let loose_ids: Vec<ObjectId> = all_ids.into_iter().filter(|id| self.db.is_loose(id)).collect();
        engine.start_batch()?;
        for (i, &target) in loose_ids.iter().enumerate() {
            let window_start = i.saturating_sub(self.window_size);
            let candidates = &loose_ids[window_start..i];
            engine.deltify(target, candidates)?;
            on_event(GcEvent::Deltifying { done: i + 1, total: loose_ids.len() });
        }
        engine.end_batch()?;

        let mut state = self.state.lock().unwrap();
        state.pending_since_pack = 0;
        state.last_run = Some(Instant::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vcs_object::{Blob, Object};
    use vcs_utils::{FilesApi, FsFiles};

    fn db() -> (tempfile::TempDir, ObjectDatabase) {
        let dir = tempfile::tempdir().unwrap();
        let files: Arc<dyn FilesApi> = Arc::new(FsFiles::new(dir.path()));
        let db = ObjectDatabase::open(files, "objects").unwrap();
        (dir, db)
    }

    #[test]
    fn quick_pack_threshold_is_tracked() {
        let (_dir, db) = db();
        let gc = GcController::new(&db);
        assert!(!gc.should_quick_pack());
        gc.note_objects_written(DEFAULT_QUICK_PACK_THRESHOLD);
        assert!(gc.should_quick_pack());
    }

    #[test]
    fn run_gc_deltifies_similar_objects_and_resets_schedule() {
        let (_dir, db) = db();
        let base_bytes = b"x".repeat(4096);
        let mut variant = base_bytes.clone();
        variant[100] = b'A';
        db.write(&Object::Blob(Blob::new(base_bytes))).unwrap();
        db.write(&Object::Blob(Blob::new(variant))).unwrap();

        let gc = GcController::new(&db);
        let mut events = Vec::new();
        gc.run_gc(|e| events.push(e)).unwrap();
        assert!(!events.is_empty());
        assert!(!gc.should_quick_pack());
    }

    #[test]
    fn maybe_run_gc_is_noop_below_thresholds() {
        let (_dir, db) = db();
        db.write(&Object::Blob(Blob::new(b"small".to_vec()))).unwrap();
        let gc = GcController::new(&db);
        assert!(!gc.maybe_run_gc().unwrap());
    }
}
