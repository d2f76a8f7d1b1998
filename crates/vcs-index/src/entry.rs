//! Index entry types: `IndexEntry`, `StatData`, `EntryFlags`.

use bstr::BString;
use vcs_hash::ObjectId;
use vcs_object::FileMode;

use crate::Stage;

/// A single entry in the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Path relative to the repository root.
    pub path: BString,
    /// Object id of the blob (or tree, for a gitlink).
    pub id: ObjectId,
    pub mode: FileMode,
    /// Merge stage (0 = normal, 1 = base, 2 = ours, 3 = theirs).
    pub stage: Stage,
    pub stat: StatData,
    pub flags: EntryFlags,
}

/// Cached file-system stat data, in the same shape as the on-disk cache
/// entry. `dev`/`ino`/`uid`/`gid` stay zero when the backing [`vcs_utils::FilesApi`]
/// doesn't expose them (anything but a local filesystem); [`StatData::matches`]
/// treats zero on either side as "unknown, don't compare".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatData {
    pub ctime_secs: u32,
    pub ctime_nsecs: u32,
    pub mtime_secs: u32,
    pub mtime_nsecs: u32,
    pub dev: u32,
    pub ino: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u32,
}

impl StatData {
    /// Build from a [`vcs_utils::Stat`]. `vcs_utils::Stat` carries only
    /// `last_modified`, so ctime and mtime are populated from the same
    /// timestamp and `dev`/`ino`/`uid`/`gid` are left at zero.
    pub fn from_stat(stat: &vcs_utils::Stat) -> Self {
        let (secs, nsecs) = stat
            .last_modified
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| (d.as_secs() as u32, d.subsec_nanos()))
            .unwrap_or((0, 0));
        Self {
            ctime_secs: secs,
            ctime_nsecs: nsecs,
            mtime_secs: secs,
            mtime_nsecs: nsecs,
            dev: 0,
            ino: 0,
            uid: 0,
            gid: 0,
            size: stat.size.min(u32::MAX as u64) as u32,
        }
    }

    /// Whether this cached stat data still matches `stat`, using the same
    /// heuristics as C git's `ie_match_stat`: a size or mtime mismatch is a
    /// definite change, while dev/ino/uid/gid are only compared when both
    /// sides have a nonzero value for them.
    pub fn matches(&self, stat: &vcs_utils::Stat) -> bool {
        let other = Self::from_stat(stat);

        if self.size != other.size {
            return false;
        }
        if self.mtime_secs != other.mtime_secs || self.mtime_nsecs != other.mtime_nsecs {
            return false;
        }
        if self.ctime_secs != other.ctime_secs || self.ctime_nsecs != other.ctime_nsecs {
            return false;
        }
        if self.ino != 0 && other.ino != 0 && self.ino != other.ino {
            return false;
        }
        if self.dev != 0 && other.dev != 0 && self.dev != other.dev {
            return false;
        }
        if self.uid != 0 && other.uid != 0 && self.uid != other.uid {
            return false;
        }
        if self.gid != 0 && other.gid != 0 && self.gid != other.gid {
            return false;
        }
        true
    }
}

/// Entry flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryFlags {
    /// CE_VALID: assume the entry is unchanged.
    pub assume_valid: bool,
    /// CE_INTENT_TO_ADD: placeholder for a staged-but-empty add.
    pub intent_to_add: bool,
    /// CE_SKIP_WORKTREE: the entry should not be checked out.
    pub skip_worktree: bool,
}

impl EntryFlags {
    /// Whether any extended flag is set, requiring the v3+ on-disk format.
    pub fn has_extended(&self) -> bool {
        self.intent_to_add || self.skip_worktree
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stat_data_default() {
        let stat = StatData::default();
        assert_eq!(stat.size, 0);
        assert_eq!(stat.mtime_secs, 0);
    }

    #[test]
    fn entry_flags_default() {
        let flags = EntryFlags::default();
        assert!(!flags.assume_valid);
        assert!(!flags.has_extended());
    }

    #[test]
    fn entry_flags_extended() {
        let flags = EntryFlags { intent_to_add: true, ..Default::default() };
        assert!(flags.has_extended());
    }

    #[test]
    fn matches_ignores_zero_inode() {
        let stat =
            vcs_utils::Stat { kind: vcs_utils::EntryKind::File, size: 4, last_modified: None, name: "a".into(), path: "a".into() };
        let data = StatData::from_stat(&stat);
        assert!(data.matches(&stat));
    }
}
