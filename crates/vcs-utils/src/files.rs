//! The `FilesApi` backend contract.
//!
//! This is the one external collaborator the store and worktree layers are
//! built against: a streaming, byte-range-aware filesystem abstraction.
//! Wire transports, browser File System Access bindings, and other backends
//! are expected to implement this trait; only a plain local-disk
//! implementation ([`FsFiles`]) lives here, for testing and as the default.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::path::validate_relative;
use crate::UtilError;

/// The kind of filesystem entry returned by [`FilesApi::stat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// Metadata about a path, as returned by `stat`/`list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub kind: EntryKind,
    pub size: u64,
    pub last_modified: Option<SystemTime>,
    pub name: String,
    pub path: String,
}

/// A byte range for a partial read; `end` is exclusive. `None` on either
/// side means "from the start" / "to the end".
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteRange {
    pub start: Option<u64>,
    pub end: Option<u64>,
}

/// An open file handle supporting randomly-positioned reads and writes.
pub trait FileHandle {
    fn size(&self) -> Result<u64, UtilError>;
    fn read_stream(&mut self, range: ByteRange) -> Result<Box<dyn Read + '_>, UtilError>;
    fn write_stream(&mut self, pos: u64) -> Result<Box<dyn Write + '_>, UtilError>;
    fn append(&mut self, data: &[u8]) -> Result<(), UtilError>;
    fn close(self: Box<Self>) -> Result<(), UtilError>;
}

/// The abstract file backend all storage and worktree code is written
/// against. Paths are forward-slash, relative to the backend's root, with
/// `.` segments collapsed and `..` rejected.
pub trait FilesApi: Send + Sync {
    fn read(&self, path: &str, range: ByteRange) -> Result<Box<dyn Read>, UtilError>;
    fn write(&self, path: &str, data: &mut dyn Read) -> Result<u64, UtilError>;
    fn stat(&self, path: &str) -> Result<Stat, UtilError>;
    fn exists(&self, path: &str) -> bool;
    fn list(&self, path: &str, recursive: bool) -> Result<Vec<Stat>, UtilError>;
    fn remove(&self, path: &str) -> Result<(), UtilError>;
    fn copy(&self, from: &str, to: &str) -> Result<(), UtilError>;
    fn rename(&self, from: &str, to: &str) -> Result<(), UtilError>;
    fn mkdir(&self, path: &str) -> Result<(), UtilError>;
    fn open(&self, path: &str) -> Result<Box<dyn FileHandle + '_>, UtilError>;
}

/// A [`FilesApi`] backed directly by the local filesystem, rooted at a
/// fixed directory.
pub struct FsFiles {
    root: PathBuf,
}

impl FsFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, UtilError> {
        validate_relative(path)?;
        Ok(self.root.join(path))
    }

    fn stat_of(&self, full: &Path, rel: &str) -> Result<Stat, UtilError> {
        let meta = std::fs::metadata(full)?;
        Ok(Stat {
            kind: if meta.is_dir() {
                EntryKind::Dir
            } else {
                EntryKind::File
            },
            size: meta.len(),
            last_modified: meta.modified().ok(),
            name: full
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            path: rel.to_string(),
        })
    }
}

struct FsFileHandle {
    file: std::fs::File,
}

impl FileHandle for FsFileHandle {
    fn size(&self) -> Result<u64, UtilError> {
        Ok(self.file.metadata()?.len())
    }

    fn read_stream(&mut self, range: ByteRange) -> Result<Box<dyn Read + '_>, UtilError> {
        use std::io::{Seek, SeekFrom};
        let start = range.start.unwrap_or(0);
        self.file.seek(SeekFrom::Start(start))?;
        let take = match range.end {
            Some(end) => end.saturating_sub(start),
            None => u64::MAX,
        };
        Ok(Box::new((&self.file).take(take)))
    }

    fn write_stream(&mut self, pos: u64) -> Result<Box<dyn Write + '_>, UtilError> {
        use std::io::{Seek, SeekFrom};
        self.file.seek(SeekFrom::Start(pos))?;
        Ok(Box::new(&self.file))
    }

    fn append(&mut self, data: &[u8]) -> Result<(), UtilError> {
        use std::io::{Seek, SeekFrom};
        self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(data)?;
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), UtilError> {
        Ok(())
    }
}

impl FilesApi for FsFiles {
    fn read(&self, path: &str, range: ByteRange) -> Result<Box<dyn Read>, UtilError> {
        use std::io::{Seek, SeekFrom};
        let full = self.resolve(path)?;
        let mut file = std::fs::File::open(&full).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                UtilError::NotFound(full.clone())
            } else {
                UtilError::Io(e)
            }
        })?;
        let start = range.start.unwrap_or(0);
        if start > 0 {
            file.seek(SeekFrom::Start(start))?;
        }
        let take = match range.end {
            Some(end) => end.saturating_sub(start),
            None => u64::MAX,
        };
        Ok(Box::new(file.take(take)))
    }

    fn write(&self, path: &str, data: &mut dyn Read) -> Result<u64, UtilError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::File::create(&full)?;
        let n = std::io::copy(data, &mut file)?;
        Ok(n)
    }

    fn stat(&self, path: &str) -> Result<Stat, UtilError> {
        let full = self.resolve(path)?;
        if !full.exists() {
            return Err(UtilError::NotFound(full));
        }
        self.stat_of(&full, path)
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).map(|p| p.exists()).unwrap_or(false)
    }

    fn list(&self, path: &str, recursive: bool) -> Result<Vec<Stat>, UtilError> {
        let full = self.resolve(path)?;
        if !full.is_dir() {
            return Err(UtilError::NotADirectory(full));
        }
        let mut out = Vec::new();
        self.list_into(&full, path, recursive, &mut out)?;
        Ok(out)
    }

    fn remove(&self, path: &str) -> Result<(), UtilError> {
        let full = self.resolve(path)?;
        if full.is_dir() {
            std::fs::remove_dir_all(full)?;
        } else {
            std::fs::remove_file(full)?;
        }
        Ok(())
    }

    fn copy(&self, from: &str, to: &str) -> Result<(), UtilError> {
        let from = self.resolve(from)?;
        let to = self.resolve(to)?;
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(from, to)?;
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> Result<(), UtilError> {
        let from = self.resolve(from)?;
        let to = self.resolve(to)?;
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::rename(from, to)?;
        Ok(())
    }

    fn mkdir(&self, path: &str) -> Result<(), UtilError> {
        std::fs::create_dir_all(self.resolve(path)?)?;
        Ok(())
    }

    fn open(&self, path: &str) -> Result<Box<dyn FileHandle + '_>, UtilError> {
        let full = self.resolve(path)?;
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(full)?;
        Ok(Box::new(FsFileHandle { file }))
    }
}

impl FsFiles {
    fn list_into(
        &self,
        full: &Path,
        rel: &str,
        recursive: bool,
        out: &mut Vec<Stat>,
    ) -> Result<(), UtilError> {
        for entry in std::fs::read_dir(full)? {
            let entry = entry?;
            let child_rel = if rel.is_empty() {
                entry.file_name().to_string_lossy().into_owned()
            } else {
                format!("{rel}/{}", entry.file_name().to_string_lossy())
            };
            let stat = self.stat_of(&entry.path(), &child_rel)?;
            let is_dir = stat.kind == EntryKind::Dir;
            out.push(stat);
            if recursive && is_dir {
                self.list_into(&entry.path(), &child_rel, recursive, out)?;
            }
        }
        Ok(())
    }
}
