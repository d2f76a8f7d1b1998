//! Conflict classification and the resolution store.
//!
//! Conflicts are never stored as their own record: a path is conflicted
//! simply by having entries at stage 1, 2, and/or 3. [`ConflictType`] is
//! derived from which stages are present and whether their ids/modes agree.

use std::collections::HashMap;
use std::io::{Cursor, Read};

use bstr::{BStr, BString, ByteSlice};
use vcs_hash::{Hasher, ObjectId};
use vcs_object::{Blob, FileMode, Object};
use vcs_odb::ObjectDatabase;
use vcs_utils::{ByteRange, FilesApi};

use crate::entry::{EntryFlags, StatData};
use crate::{Index, IndexEntry, IndexError, Stage};

/// The kind of conflict a path is in, derived from its staged entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictType {
    /// Both sides added the path; no common ancestor entry.
    AddAdd,
    /// Base and ours exist, theirs deleted it.
    ModifyDelete,
    /// Base and theirs exist, ours deleted it.
    DeleteModify,
    /// All three stages present with different ids.
    Content,
    /// All three stages present with the same id but differing modes.
    Mode,
}

/// How a path's conflict was resolved, recorded alongside the new blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStrategy {
    Ours,
    Theirs,
    Merged,
    Manual,
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub strategy: ResolutionStrategy,
    pub id: ObjectId,
    pub mode: FileMode,
}

/// Classify every conflicted path in `entries`.
pub(crate) fn conflict_paths(entries: &[IndexEntry]) -> Vec<(&BStr, ConflictType)> {
    let mut result = Vec::new();
    let mut i = 0;
    while i < entries.len() {
        let path = entries[i].path.as_bstr();
        let end = entries[i..].iter().position(|e| e.path.as_bstr() != path).map(|p| i + p).unwrap_or(entries.len());
        let group = &entries[i..end];

        if let Some(kind) = classify(group) {
            result.push((path, kind));
        }
        i = end;
    }
    result
}

fn classify(group: &[IndexEntry]) -> Option<ConflictType> {
    let base = group.iter().find(|e| e.stage == Stage::Base);
    let ours = group.iter().find(|e| e.stage == Stage::Ours);
    let theirs = group.iter().find(|e| e.stage == Stage::Theirs);

    match (base, ours, theirs) {
        (None, Some(_), Some(_)) => Some(ConflictType::AddAdd),
        (Some(_), Some(_), None) => Some(ConflictType::ModifyDelete),
        (Some(_), None, Some(_)) => Some(ConflictType::DeleteModify),
        (Some(_), Some(o), Some(t)) => {
            if o.id == t.id {
                if o.mode != t.mode { Some(ConflictType::Mode) } else { None }
            } else {
                Some(ConflictType::Content)
            }
        }
        _ => None,
    }
}

/// Replace every stage of `path` with a single resolved stage-0 entry.
pub(crate) fn mark_resolved(index: &mut Index, path: &BStr, resolution: Resolution) {
    let entries = index.raw_entries_mut();
    entries.retain(|e| e.path.as_bstr() != path);

    let pos = entries.binary_search_by(|e| e.path.as_bstr().cmp(path)).unwrap_or_else(|p| p);
    entries.insert(
        pos,
        IndexEntry {
            path: BString::from(path),
            id: resolution.id,
            mode: resolution.mode,
            stage: Stage::Normal,
            stat: StatData::default(),
            flags: EntryFlags::default(),
        },
    );
    let _ = resolution.strategy;
    index.invalidate_cache_tree(path);
}

/// Resolve `path` by taking whichever stage matches `side` (Ours or Theirs).
pub(crate) fn accept_side(index: &mut Index, path: &BStr, side: Stage) -> Result<(), IndexError> {
    let chosen = index
        .raw_entries()
        .iter()
        .find(|e| e.path.as_bstr() == path && e.stage == side)
        .map(|e| (e.id, e.mode))
        .ok_or_else(|| IndexError::InvalidEntry { offset: 0, reason: format!("{path} has no {side:?} stage to accept") })?;

    let strategy = if side == Stage::Ours { ResolutionStrategy::Ours } else { ResolutionStrategy::Theirs };
    mark_resolved(index, path, Resolution { strategy, id: chosen.0, mode: chosen.1 });
    Ok(())
}

/// Promote conflicted paths whose current worktree content no longer
/// contains conflict markers, writing the resolved content as a new blob.
pub fn mark_all_resolved(
    index: &mut Index,
    files: &dyn FilesApi,
    odb: &ObjectDatabase,
    worktree_path_of: impl Fn(&BStr) -> String,
) -> Result<(), IndexError> {
    let paths: Vec<BString> = conflict_paths(index.raw_entries()).into_iter().map(BString::from).collect();

    for path in paths {
        let wt_path = worktree_path_of(path.as_bstr());
        if !files.exists(&wt_path) {
            continue;
        }
        let mut bytes = Vec::new();
        files.read(&wt_path, ByteRange::default())?.read_to_end(&mut bytes).map_err(vcs_utils::UtilError::from)?;

        if has_conflict_markers(&bytes) {
            continue;
        }

        let mode = index
            .raw_entries()
            .iter()
            .find(|e| e.path.as_bstr() == path.as_bstr() && e.stage == Stage::Ours)
            .or_else(|| index.raw_entries().iter().find(|e| e.path.as_bstr() == path.as_bstr()))
            .map(|e| e.mode)
            .unwrap_or(FileMode::Regular);

        let id = odb.write(&Object::Blob(Blob::new(bytes)))?;
        mark_resolved(index, path.as_bstr(), Resolution { strategy: ResolutionStrategy::Merged, id, mode });
    }
    Ok(())
}

fn has_conflict_markers(bytes: &[u8]) -> bool {
    bytes.find(b"<<<<<<< ").is_some() || bytes.find(b"\n<<<<<<< ").is_some()
}

/// Remembers resolutions keyed by a hash of the pre-image conflict shape,
/// so an identical conflict seen again can reuse the same resolved bytes.
pub struct RerereCache {
    entries: HashMap<ObjectId, Vec<u8>>,
}

impl RerereCache {
    pub fn new() -> Self {
        Self { entries: HashMap::new() }
    }

    /// Hash the pre-image conflict text (e.g. the conflict-marked bytes
    /// that would be written to the worktree) into a shape key.
    pub fn shape_of(conflict_text: &[u8]) -> Result<ObjectId, IndexError> {
        Hasher::digest(conflict_text).map_err(|_| IndexError::InvalidHeader("rerere hash failed".into()))
    }

    /// Remember `resolved` as the answer for `shape`.
    pub fn record(&mut self, shape: ObjectId, resolved: Vec<u8>) {
        self.entries.insert(shape, resolved);
    }

    /// Look up a previously recorded resolution for `shape`.
    pub fn lookup(&self, shape: &ObjectId) -> Option<&[u8]> {
        self.entries.get(shape).map(|v| v.as_slice())
    }

    /// Load a cache from a `rr-cache`-style directory: one file per shape,
    /// named by hex id, holding the resolved bytes verbatim.
    pub fn load(files: &dyn FilesApi, dir: &str) -> Result<Self, IndexError> {
        let mut cache = Self::new();
        if !files.exists(dir) {
            return Ok(cache);
        }
        for stat in files.list(dir, false)? {
            if stat.kind != vcs_utils::EntryKind::File {
                continue;
            }
            let Ok(shape) = ObjectId::from_hex(&stat.name) else { continue };
            let mut bytes = Vec::new();
            files.read(&stat.path, ByteRange::default())?.read_to_end(&mut bytes).map_err(vcs_utils::UtilError::from)?;
            cache.entries.insert(shape, bytes);
        }
        Ok(cache)
    }

    /// Persist every recorded resolution under `dir`, one file per shape.
    pub fn save(&self, files: &dyn FilesApi, dir: &str) -> Result<(), IndexError> {
        files.mkdir(dir)?;
        for (shape, resolved) in &self.entries {
            let path = format!("{dir}/{}", shape.to_hex());
            files.write(&path, &mut Cursor::new(resolved.clone()))?;
        }
        Ok(())
    }
}

impl Default for RerereCache {
    fn default() -> Self {
        Self::new()
    }
}
