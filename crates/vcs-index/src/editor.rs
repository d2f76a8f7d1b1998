//! Incremental index editor: a batch of adds/updates/deletes applied
//! atomically on [`IndexEditor::finish`].

use std::time::SystemTime;

use bstr::{BStr, BString};
use vcs_hash::ObjectId;
use vcs_object::FileMode;

use crate::entry::{EntryFlags, StatData};
use crate::{cmp_entries, Index, IndexEntry, IndexError, Stage};

/// A single staged edit, queued until [`IndexEditor::finish`].
pub enum Edit {
    /// Stage `path` at the given mode/id/size/mtime (stage 0).
    Update { path: BString, mode: FileMode, id: ObjectId, size: u64, mtime: Option<SystemTime> },
    /// Remove every stage of `path`.
    Delete { path: BString },
    /// Replace the stage-0 entry at `path` with whatever `f` returns;
    /// returning `None` removes it. `f` sees the current entry, if any.
    Apply { path: BString, f: Box<dyn FnOnce(Option<&IndexEntry>) -> Option<IndexEntry>> },
}

/// A batch of edits against an [`Index`], applied all at once by
/// [`IndexEditor::finish`]. Nothing changes until `finish` is called.
pub struct IndexEditor<'a> {
    index: &'a mut Index,
    edits: Vec<Edit>,
}

impl<'a> IndexEditor<'a> {
    pub(crate) fn new(index: &'a mut Index) -> Self {
        Self { index, edits: Vec::new() }
    }

    pub fn update(mut self, path: impl Into<BString>, mode: FileMode, id: ObjectId, size: u64, mtime: Option<SystemTime>) -> Self {
        self.edits.push(Edit::Update { path: path.into(), mode, id, size, mtime });
        self
    }

    pub fn delete(mut self, path: impl Into<BString>) -> Self {
        self.edits.push(Edit::Delete { path: path.into() });
        self
    }

    pub fn apply(
        mut self,
        path: impl Into<BString>,
        f: impl FnOnce(Option<&IndexEntry>) -> Option<IndexEntry> + 'static,
    ) -> Self {
        self.edits.push(Edit::Apply { path: path.into(), f: Box::new(f) });
        self
    }

    /// Apply every queued edit, then resort and advance the index's
    /// update time. If any edit were to fail this would roll back none of
    /// the prior ones, so edits are restricted to operations that cannot
    /// fail (unlike `readTree`/`writeTree`, which touch the object store).
    pub fn finish(self) -> Result<(), IndexError> {
        let IndexEditor { index, edits } = self;

        for edit in edits {
            match edit {
                Edit::Update { path, mode, id, size, mtime } => {
                    let stat = stat_for(size, mtime);
                    let entries = index.raw_entries_mut();
                    entries.retain(|e| !(e.path == path && e.stage == Stage::Normal));
                    entries.push(IndexEntry { path: path.clone(), id, mode, stage: Stage::Normal, stat, flags: EntryFlags::default() });
                    index.invalidate_cache_tree(BStr::new(&path));
                }
                Edit::Delete { path } => {
                    let entries = index.raw_entries_mut();
                    entries.retain(|e| e.path != path);
                    index.invalidate_cache_tree(BStr::new(&path));
                }
                Edit::Apply { path, f } => {
                    let current = index.raw_entries().iter().find(|e| e.path == path && e.stage == Stage::Normal).cloned();
                    let next = f(current.as_ref());
                    let entries = index.raw_entries_mut();
                    entries.retain(|e| !(e.path == path && e.stage == Stage::Normal));
                    if let Some(entry) = next {
                        entries.push(entry);
                    }
                    index.invalidate_cache_tree(BStr::new(&path));
                }
            }
        }

        index.raw_entries_mut().sort_by(cmp_entries);
        index.set_update_time_now();
        Ok(())
    }
}

fn stat_for(size: u64, mtime: Option<SystemTime>) -> StatData {
    let (secs, nsecs) = mtime
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| (d.as_secs() as u32, d.subsec_nanos()))
        .unwrap_or((0, 0));
    StatData {
        ctime_secs: secs,
        ctime_nsecs: nsecs,
        mtime_secs: secs,
        mtime_nsecs: nsecs,
        dev: 0,
        ino: 0,
        uid: 0,
        gid: 0,
        size: size.min(u32::MAX as u64) as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bstr::BStr;

    fn id(byte: u8) -> ObjectId {
        ObjectId::from_bytes(&[byte; 20]).unwrap()
    }

    #[test]
    fn update_then_finish_stages_entry() {
        let mut idx = Index::new();
        idx.editor().update("a.txt", FileMode::Regular, id(1), 4, None).finish().unwrap();
        assert_eq!(idx.len(), 1);
        assert_eq!(idx.get_entry(BStr::new("a.txt"), Stage::Normal).unwrap().id, id(1));
    }

    #[test]
    fn delete_removes_entry() {
        let mut idx = Index::new();
        idx.editor().update("a.txt", FileMode::Regular, id(1), 4, None).finish().unwrap();
        idx.editor().delete("a.txt").finish().unwrap();
        assert!(idx.is_empty());
    }

    #[test]
    fn apply_can_transform_or_remove() {
        let mut idx = Index::new();
        idx.editor().update("a.txt", FileMode::Regular, id(1), 4, None).finish().unwrap();

        idx.editor()
            .apply("a.txt", |prev| prev.map(|e| IndexEntry { id: id(2), ..e.clone() }))
            .finish()
            .unwrap();
        assert_eq!(idx.get_entry(BStr::new("a.txt"), Stage::Normal).unwrap().id, id(2));

        idx.editor().apply("a.txt", |_| None).finish().unwrap();
        assert!(idx.is_empty());
    }

    #[test]
    fn batch_is_atomic_in_one_sort_pass() {
        let mut idx = Index::new();
        idx.editor()
            .update("b.txt", FileMode::Regular, id(2), 1, None)
            .update("a.txt", FileMode::Regular, id(1), 1, None)
            .finish()
            .unwrap();
        let paths: Vec<_> = idx.list_entries().map(|e| e.path.to_string()).collect();
        assert_eq!(paths, vec!["a.txt", "b.txt"]);
    }
}
