//! Staging index: the file that sits between the working copy and the
//! object database, tracking what's staged for the next commit.
//!
//! The on-disk format is wire-compatible with Git's index v2-v4. Reads and
//! writes go through [`vcs_utils::FilesApi`] rather than a memory-mapped
//! file, so the index can live on any backend the host provides.

pub mod conflict;
pub mod editor;
pub mod entry;
pub mod extensions;
mod read;
mod write;

use std::time::SystemTime;

use bstr::BStr;
use vcs_hash::ObjectId;
use vcs_odb::ObjectDatabase;
use vcs_utils::{ByteRange, FilesApi};

pub use conflict::{ConflictType, Resolution, ResolutionStrategy, RerereCache};
pub use editor::{Edit, IndexEditor};
pub use entry::{EntryFlags, IndexEntry, StatData};
pub use extensions::tree::CacheTree;
pub use extensions::{RawExtension, ResolveUndo};

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("invalid index header: {0}")]
    InvalidHeader(String),

    #[error("unsupported index version: {0}")]
    UnsupportedVersion(u32),

    #[error("index checksum mismatch")]
    ChecksumMismatch,

    #[error("invalid index entry at offset {offset}: {reason}")]
    InvalidEntry { offset: usize, reason: String },

    #[error("invalid extension '{sig}': {reason}")]
    InvalidExtension { sig: String, reason: String },

    #[error("tree {0} not found while expanding index")]
    MissingTree(ObjectId),

    #[error("object {0} is not a tree")]
    NotATree(ObjectId),

    #[error(transparent)]
    Odb(#[from] vcs_odb::OdbError),

    #[error(transparent)]
    Backend(#[from] vcs_utils::UtilError),
}

/// Merge stage for an index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Normal entry (stage 0).
    Normal,
    /// Common ancestor in a merge conflict (stage 1).
    Base,
    /// "Ours" side of a merge conflict (stage 2).
    Ours,
    /// "Theirs" side of a merge conflict (stage 3).
    Theirs,
}

impl Stage {
    pub fn as_u8(&self) -> u8 {
        match self {
            Stage::Normal => 0,
            Stage::Base => 1,
            Stage::Ours => 2,
            Stage::Theirs => 3,
        }
    }

    pub fn from_u8(n: u8) -> Result<Self, IndexError> {
        match n {
            0 => Ok(Stage::Normal),
            1 => Ok(Stage::Base),
            2 => Ok(Stage::Ours),
            3 => Ok(Stage::Theirs),
            _ => Err(IndexError::InvalidEntry { offset: 0, reason: format!("invalid stage: {n}") }),
        }
    }
}

/// The staging index: entries sorted by `(path, stage)`, plus cached
/// extensions.
pub struct Index {
    version: u32,
    entries: Vec<IndexEntry>,
    cache_tree: Option<CacheTree>,
    resolve_undo: Option<ResolveUndo>,
    unknown_extensions: Vec<RawExtension>,
    /// When this index was last read from or written to disk. `None` for
    /// an index that has never touched storage.
    update_time: Option<SystemTime>,
    _checksum: ObjectId,
}

impl Index {
    /// An empty index, as if freshly initialized.
    pub fn new() -> Self {
        Self {
            version: 2,
            entries: Vec::new(),
            cache_tree: None,
            resolve_undo: None,
            unknown_extensions: Vec::new(),
            update_time: None,
            _checksum: ObjectId::NULL,
        }
    }

    /// Read the index file at `path`, or return an empty index if it
    /// doesn't exist yet (matching a freshly initialized repository).
    pub fn read(files: &dyn FilesApi, path: &str) -> Result<Self, IndexError> {
        if !files.exists(path) {
            return Ok(Self::new());
        }
        let mut data = Vec::new();
        std::io::Read::read_to_end(&mut *files.read(path, ByteRange::default())?, &mut data)
            .map_err(vcs_utils::UtilError::from)?;
        let mut index = read::parse_index(&data)?;
        index.update_time = files.stat(path).ok().and_then(|s| s.last_modified);
        Ok(index)
    }

    /// Write the index file to `path` atomically and advance
    /// [`Index::update_time`] to now (best-effort: if the backend can't
    /// report the new mtime, the previous value is kept).
    pub fn write(&mut self, files: &dyn FilesApi, path: &str) -> Result<(), IndexError> {
        write::write_index(self, files, path)?;
        self.update_time = files.stat(path).ok().and_then(|s| s.last_modified);
        Ok(())
    }

    /// Whether the on-disk file at `path` has been modified since this
    /// index was last read or written (i.e. some other process touched it).
    pub fn is_outdated(&self, files: &dyn FilesApi, path: &str) -> bool {
        let Some(ours) = self.update_time else { return files.exists(path) };
        match files.stat(path) {
            Ok(stat) => stat.last_modified.map(|theirs| theirs > ours).unwrap_or(false),
            Err(_) => false,
        }
    }

    pub fn get_update_time(&self) -> Option<SystemTime> {
        self.update_time
    }

    /// Discard all entries and extensions, keeping the format version.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.cache_tree = None;
        self.resolve_undo = None;
        self.unknown_extensions.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at `path` and `stage`.
    pub fn get_entry(&self, path: &BStr, stage: Stage) -> Option<&IndexEntry> {
        self.entries.iter().find(|e| e.path[..] == path[..] && e.stage == stage)
    }

    /// Every entry at `path`, across all stages.
    pub fn get_entries(&self, path: &BStr) -> Vec<&IndexEntry> {
        self.entries.iter().filter(|e| e.path[..] == path[..]).collect()
    }

    /// All entries, in `(path, stage)` order.
    pub fn list_entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.iter()
    }

    /// Entries whose path starts with `prefix`.
    pub fn list_entries_under<'a>(&'a self, prefix: &'a BStr) -> impl Iterator<Item = &'a IndexEntry> {
        self.entries.iter().filter(move |e| e.path.starts_with(prefix.as_ref()))
    }

    /// Whether `path` has entries at any non-zero stage.
    pub fn has_conflicts_at(&self, path: &BStr) -> bool {
        self.entries.iter().any(|e| e.path[..] == path[..] && e.stage != Stage::Normal)
    }

    /// Whether the index has any conflicted path at all.
    pub fn has_conflicts(&self) -> bool {
        self.entries.iter().any(|e| e.stage != Stage::Normal)
    }

    /// All conflicted paths, each paired with its derived [`ConflictType`].
    pub fn get_conflict_paths(&self) -> Vec<(&BStr, ConflictType)> {
        conflict::conflict_paths(&self.entries)
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn cache_tree(&self) -> Option<&CacheTree> {
        self.cache_tree.as_ref()
    }

    pub fn cache_tree_mut(&mut self) -> Option<&mut CacheTree> {
        self.cache_tree.as_mut()
    }

    pub fn set_cache_tree(&mut self, tree: Option<CacheTree>) {
        self.cache_tree = tree;
    }

    pub fn resolve_undo(&self) -> Option<&ResolveUndo> {
        self.resolve_undo.as_ref()
    }

    pub fn set_resolve_undo(&mut self, reuc: Option<ResolveUndo>) {
        self.resolve_undo = reuc;
    }

    /// Rebuild the index from scratch: drop all entries and stage the given
    /// ones, sorted. Used when reconstructing a whole index state rather
    /// than incrementally editing it (see [`Index::editor`] for that).
    pub fn builder(&mut self, entries: impl IntoIterator<Item = IndexEntry>) {
        self.clear();
        self.entries.extend(entries);
        self.entries.sort_by(cmp_entries);
    }

    /// Start an incremental batch of adds/updates/deletes, applied
    /// atomically on [`IndexEditor::finish`].
    pub fn editor(&mut self) -> IndexEditor<'_> {
        IndexEditor::new(self)
    }

    /// Materialize the stage-0 entries as a tree hierarchy in `odb`,
    /// returning the root tree's id.
    pub fn write_tree(&self, odb: &ObjectDatabase) -> Result<ObjectId, IndexError> {
        write::write_tree_from_index(self, odb)
    }

    /// Replace the index with the flat, stage-0 expansion of tree `id`.
    pub fn read_tree(&mut self, odb: &ObjectDatabase, id: &ObjectId) -> Result<(), IndexError> {
        write::read_tree_into_index(self, odb, id)
    }

    /// Replace every stage of `path` with a single resolved stage-0 entry.
    pub fn mark_resolved(&mut self, path: &BStr, resolution: Resolution) {
        conflict::mark_resolved(self, path, resolution);
    }

    /// Resolve `path` by taking its stage-2 ("ours") content.
    pub fn accept_ours(&mut self, path: &BStr) -> Result<(), IndexError> {
        conflict::accept_side(self, path, Stage::Ours)
    }

    /// Resolve `path` by taking its stage-3 ("theirs") content.
    pub fn accept_theirs(&mut self, path: &BStr) -> Result<(), IndexError> {
        conflict::accept_side(self, path, Stage::Theirs)
    }

    /// Promote every conflicted path whose current worktree content no
    /// longer contains conflict markers, writing the resolved bytes as a
    /// new blob via `odb`.
    pub fn mark_all_resolved(
        &mut self,
        files: &dyn FilesApi,
        odb: &ObjectDatabase,
        worktree_path_of: impl Fn(&BStr) -> String,
    ) -> Result<(), IndexError> {
        conflict::mark_all_resolved(self, files, odb, worktree_path_of)
    }

    pub(crate) fn raw_entries_mut(&mut self) -> &mut Vec<IndexEntry> {
        &mut self.entries
    }

    pub(crate) fn raw_entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub(crate) fn invalidate_cache_tree(&mut self, path: &BStr) {
        if let Some(tree) = &mut self.cache_tree {
            tree.invalidate(path);
        }
    }

    pub(crate) fn set_update_time_now(&mut self) {
        self.update_time = Some(SystemTime::now());
    }
}

impl Default for Index {
    fn default() -> Self {
        Self::new()
    }
}

/// Sort order for entries: by path, then by stage.
pub(crate) fn cmp_entries(a: &IndexEntry, b: &IndexEntry) -> std::cmp::Ordering {
    a.path.cmp(&b.path).then(a.stage.as_u8().cmp(&b.stage.as_u8()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bstr::BString;
    use vcs_utils::FsFiles;

    fn entry(path: &str, id_byte: u8, stage: Stage) -> IndexEntry {
        IndexEntry {
            path: BString::from(path),
            id: ObjectId::from_bytes(&[id_byte; 20]).unwrap(),
            mode: vcs_object::FileMode::Regular,
            stage,
            stat: StatData::default(),
            flags: EntryFlags::default(),
        }
    }

    #[test]
    fn new_index_is_empty() {
        let idx = Index::new();
        assert!(idx.is_empty());
        assert_eq!(idx.version(), 2);
    }

    #[test]
    fn builder_sorts_entries() {
        let mut idx = Index::new();
        idx.builder(vec![entry("b.txt", 2, Stage::Normal), entry("a.txt", 1, Stage::Normal)]);
        let paths: Vec<_> = idx.list_entries().map(|e| e.path.to_string()).collect();
        assert_eq!(paths, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn write_then_read_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let fs = FsFiles::new(dir.path());

        let mut idx = Index::new();
        idx.builder(vec![entry("a.txt", 1, Stage::Normal), entry("dir/b.txt", 2, Stage::Normal)]);
        idx.write(&fs, "index").unwrap();

        let reread = Index::read(&fs, "index").unwrap();
        assert_eq!(reread.len(), 2);
        let paths: Vec<_> = reread.list_entries().map(|e| e.path.to_string()).collect();
        assert_eq!(paths, vec!["a.txt", "dir/b.txt"]);
    }

    #[test]
    fn read_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let fs = FsFiles::new(dir.path());
        let idx = Index::read(&fs, "index").unwrap();
        assert!(idx.is_empty());
    }

    #[test]
    fn list_entries_under_prefix() {
        let mut idx = Index::new();
        idx.builder(vec![
            entry("src/a.rs", 1, Stage::Normal),
            entry("src/b.rs", 2, Stage::Normal),
            entry("README.md", 3, Stage::Normal),
        ]);
        let under: Vec<_> = idx.list_entries_under(BStr::new("src/")).map(|e| e.path.to_string()).collect();
        assert_eq!(under, vec!["src/a.rs", "src/b.rs"]);
    }

    #[test]
    fn conflict_detection() {
        let mut idx = Index::new();
        idx.builder(vec![
            entry("a.txt", 1, Stage::Base),
            entry("a.txt", 2, Stage::Ours),
            entry("a.txt", 3, Stage::Theirs),
            entry("b.txt", 4, Stage::Normal),
        ]);
        assert!(idx.has_conflicts());
        let conflicts = idx.get_conflict_paths();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].0, BStr::new("a.txt"));
    }

    #[test]
    fn get_entries_all_stages() {
        let mut idx = Index::new();
        idx.builder(vec![entry("a.txt", 1, Stage::Base), entry("a.txt", 2, Stage::Ours)]);
        assert_eq!(idx.get_entries(BStr::new("a.txt")).len(), 2);
    }
}
