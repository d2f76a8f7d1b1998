//! Content-addressed raw storage: `store`/`load`/`has`/`delete`/`size`/`keys`
//! over opaque string keys, backed by a [`vcs_utils::FilesApi`].
//!
//! This is the bottom layer of the object store. It has no notion of git
//! object types or framing — that is `vcs-object`'s and `vcs-odb`'s concern.
//! Each key is zlib-compressed on disk and fanned out two hex characters
//! deep, the same directory shape git uses for loose objects, though here
//! the key is an arbitrary opaque string rather than necessarily an id.

mod error;

use std::io::{Cursor, Read, Write};
use std::sync::Arc;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use vcs_utils::{ByteRange, FilesApi};

pub use error::StoreError;

/// A content-addressed byte store keyed by opaque strings.
pub trait RawStore: Send + Sync {
    /// Store `reader`'s full contents under `key`. Returns the number of
    /// uncompressed bytes stored. A no-op if the key already exists.
    fn store(&self, key: &str, reader: &mut dyn Read) -> Result<u64, StoreError>;

    /// Load the bytes stored under `key`, optionally a sub-range.
    fn load(&self, key: &str, range: ByteRange) -> Result<Box<dyn Read>, StoreError>;

    fn has(&self, key: &str) -> bool;

    fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// The uncompressed size of the value stored under `key`.
    fn size(&self, key: &str) -> Result<u64, StoreError>;

    /// All keys currently present.
    fn keys(&self) -> Result<Vec<String>, StoreError>;
}

/// A [`RawStore`] that zlib-compresses each value and fans it out under
/// `<root>/<first-two-chars>/<rest>`, matching git's loose-object layout.
pub struct LooseStore {
    files: Arc<dyn FilesApi>,
    root: String,
    compression_level: Compression,
}

impl LooseStore {
    pub fn open(files: Arc<dyn FilesApi>, root: impl Into<String>) -> Self {
        Self {
            files,
            root: root.into(),
            compression_level: Compression::default(),
        }
    }

    pub fn set_compression_level(&mut self, level: u32) {
        self.compression_level = Compression::new(level);
    }

    /// The fan-out path for `key`: `<root>/xx/yyyy...` when the key is at
    /// least two characters, or `<root>/key` otherwise.
    fn key_path(&self, key: &str) -> String {
        let rel = if key.len() >= 2 {
            format!("{}/{}", &key[..2], &key[2..])
        } else {
            key.to_string()
        };
        if self.root.is_empty() {
            rel
        } else {
            format!("{}/{}", self.root, rel)
        }
    }

    fn decompress_all(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.key_path(key);
        let mut compressed = Vec::new();
        self.files
            .read(&path, ByteRange::default())
            .map_err(|e| match e {
                vcs_utils::UtilError::NotFound(_) => StoreError::NotFound(key.to_string()),
                other => StoreError::Backend(other),
            })?
            .read_to_end(&mut compressed)?;

        let mut decoder = ZlibDecoder::new(&compressed[..]);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| StoreError::Decompress {
                key: key.to_string(),
                source: e,
            })?;
        Ok(out)
    }
}

impl RawStore for LooseStore {
    fn store(&self, key: &str, reader: &mut dyn Read) -> Result<u64, StoreError> {
        if self.has(key) {
            return self.size(key);
        }

        let mut raw = Vec::new();
        reader.read_to_end(&mut raw)?;
        let uncompressed_len = raw.len() as u64;

        let mut encoder = ZlibEncoder::new(Vec::new(), self.compression_level);
        encoder.write_all(&raw)?;
        let compressed = encoder.finish()?;

        let path = self.key_path(key);
        self.files.write(&path, &mut Cursor::new(compressed))?;
        Ok(uncompressed_len)
    }

    fn load(&self, key: &str, range: ByteRange) -> Result<Box<dyn Read>, StoreError> {
        let data = self.decompress_all(key)?;
        let start = range.start.unwrap_or(0) as usize;
        let end = range
            .end
            .map(|e| (e as usize).min(data.len()))
            .unwrap_or(data.len());
        let slice = if start >= data.len() || start >= end {
            Vec::new()
        } else {
            data[start..end].to_vec()
        };
        Ok(Box::new(Cursor::new(slice)))
    }

    fn has(&self, key: &str) -> bool {
        self.files.exists(&self.key_path(key))
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.files
            .remove(&self.key_path(key))
            .map_err(|e| match e {
                vcs_utils::UtilError::NotFound(_) => StoreError::NotFound(key.to_string()),
                other => StoreError::Backend(other),
            })
    }

    fn size(&self, key: &str) -> Result<u64, StoreError> {
        Ok(self.decompress_all(key)?.len() as u64)
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        if !self.files.exists(&self.root) {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for stat in self.files.list(&self.root, true)? {
            if stat.kind != vcs_utils::EntryKind::File {
                continue;
            }
            let rel = match self.root.is_empty() {
                true => stat.path.clone(),
                false => stat
                    .path
                    .strip_prefix(&format!("{}/", self.root))
                    .unwrap_or(&stat.path)
                    .to_string(),
            };
            // "xx/yyyy..." -> "xxyyyy..."; ignore anything that doesn't
            // match the fan-out shape (e.g. stray temp files).
            let mut parts = rel.splitn(2, '/');
            let (Some(prefix), Some(rest)) = (parts.next(), parts.next()) else {
                continue;
            };
            if prefix.len() != 2 || rest.is_empty() {
                continue;
            }
            out.push(format!("{prefix}{rest}"));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use vcs_utils::FsFiles;

    fn store() -> (TempDir, LooseStore) {
        let dir = tempfile::tempdir().unwrap();
        let files: Arc<dyn FilesApi> = Arc::new(FsFiles::new(dir.path()));
        let store = LooseStore::open(files, "objects");
        (dir, store)
    }

    #[test]
    fn store_then_load_roundtrips() {
        let (_dir, s) = store();
        let n = s.store("abcd1234", &mut Cursor::new(b"hello world".to_vec())).unwrap();
        assert_eq!(n, 11);
        let mut buf = Vec::new();
        s.load("abcd1234", ByteRange::default())
            .unwrap()
            .read_to_end(&mut buf)
            .unwrap();
        assert_eq!(buf, b"hello world");
    }

    #[test]
    fn store_is_idempotent() {
        let (_dir, s) = store();
        s.store("k", &mut Cursor::new(b"first".to_vec())).unwrap();
        // Second store under the same key is a no-op even with different bytes.
        s.store("k", &mut Cursor::new(b"second-longer".to_vec()))
            .unwrap();
        let mut buf = Vec::new();
        s.load("k", ByteRange::default())
            .unwrap()
            .read_to_end(&mut buf)
            .unwrap();
        assert_eq!(buf, b"first");
    }

    #[test]
    fn has_and_delete() {
        let (_dir, s) = store();
        assert!(!s.has("k"));
        s.store("k", &mut Cursor::new(b"x".to_vec())).unwrap();
        assert!(s.has("k"));
        s.delete("k").unwrap();
        assert!(!s.has("k"));
    }

    #[test]
    fn missing_key_errors() {
        let (_dir, s) = store();
        assert!(matches!(
            s.load("missing", ByteRange::default()),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(s.size("missing"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn ranged_load() {
        let (_dir, s) = store();
        s.store("k", &mut Cursor::new(b"0123456789".to_vec()))
            .unwrap();
        let mut buf = Vec::new();
        s.load(
            "k",
            ByteRange {
                start: Some(2),
                end: Some(5),
            },
        )
        .unwrap()
        .read_to_end(&mut buf)
        .unwrap();
        assert_eq!(buf, b"234");
    }

    #[test]
    fn keys_lists_fanned_out_entries() {
        let (_dir, s) = store();
        s.store("da39a3ee5e6b4b0d3255bfef95601890afd80709", &mut Cursor::new(b"a".to_vec()))
            .unwrap();
        s.store("0000000000000000000000000000000000000001", &mut Cursor::new(b"b".to_vec()))
            .unwrap();
        let mut keys = s.keys().unwrap();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                "0000000000000000000000000000000000000001".to_string(),
                "da39a3ee5e6b4b0d3255bfef95601890afd80709".to_string(),
            ]
        );
    }

    #[test]
    fn size_reports_uncompressed_length() {
        let (_dir, s) = store();
        s.store("k", &mut Cursor::new(b"0123456789".to_vec()))
            .unwrap();
        assert_eq!(s.size("k").unwrap(), 10);
    }
}
