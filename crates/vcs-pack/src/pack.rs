//! Pack file assembly, index lookup, and entry reading.
//!
//! A pack is a sequence of zlib-compressed entries, each prefixed with an
//! [`entry::EntryHeader`]. Entries are addressed by an accompanying
//! [`PackIndex`] mapping object id to byte offset, built alongside the
//! pack as entries are added.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use vcs_hash::ObjectId;
use vcs_object::ObjectType;

use crate::entry::{encode_entry_header, parse_entry_header, PackEntryType};
use crate::PackError;

const INDEX_MAGIC: &[u8; 4] = b"VPI1";

/// One (id, offset, crc32) row of a [`PackIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IndexRow {
    id: ObjectId,
    offset: u64,
    crc32: u32,
}

/// Maps object id to byte offset within a pack, sorted by id for binary
/// search (the same structure git's `.idx` files use, simplified: no
/// fan-out table).
#[derive(Debug, Clone, Default)]
pub struct PackIndex {
    rows: Vec<IndexRow>,
}

impl PackIndex {
    fn from_unsorted(mut rows: Vec<IndexRow>) -> Self {
        rows.sort_by_key(|r| r.id);
        Self { rows }
    }

    pub fn lookup(&self, id: &ObjectId) -> Option<u64> {
        self.rows
            .binary_search_by_key(id, |r| r.id)
            .ok()
            .map(|i| self.rows[i].offset)
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.lookup(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ObjectId> {
        self.rows.iter().map(|r| &r.id)
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + self.rows.len() * 32);
        buf.extend_from_slice(INDEX_MAGIC);
        buf.extend_from_slice(&(self.rows.len() as u32).to_be_bytes());
        for row in &self.rows {
            buf.extend_from_slice(row.id.as_bytes());
            buf.extend_from_slice(&row.offset.to_be_bytes());
            buf.extend_from_slice(&row.crc32.to_be_bytes());
        }
        buf
    }

    pub fn parse(data: &[u8]) -> Result<Self, PackError> {
        if data.len() < 8 || &data[..4] != INDEX_MAGIC {
            return Err(PackError::InvalidIndex("bad magic".into()));
        }
        let count = u32::from_be_bytes(data[4..8].try_into().unwrap()) as usize;
        const ROW_LEN: usize = 20 + 8 + 4;
        if data.len() != 8 + count * ROW_LEN {
            return Err(PackError::InvalidIndex("truncated index".into()));
        }
        let mut rows = Vec::with_capacity(count);
        let mut pos = 8;
        for _ in 0..count {
            let id = ObjectId::from_bytes(&data[pos..pos + 20])?;
            let offset = u64::from_be_bytes(data[pos + 20..pos + 28].try_into().unwrap());
            let crc32 = u32::from_be_bytes(data[pos + 28..pos + 32].try_into().unwrap());
            rows.push(IndexRow { id, offset, crc32 });
            pos += ROW_LEN;
        }
        // Index rows are written sorted by `finish`; a tampered index
        // could violate that, so re-validate rather than trust the file.
        if !rows.windows(2).all(|w| w[0].id < w[1].id) {
            return Err(PackError::InvalidIndex("rows not sorted by id".into()));
        }
        Ok(Self { rows })
    }
}

/// A single resolved entry read back out of a pack.
pub struct RawEntry {
    pub entry_type: PackEntryType,
    /// Decompressed bytes: object content for non-delta entries, the raw
    /// delta instruction stream for `RefDelta`.
    pub data: Vec<u8>,
    pub base: Option<ObjectId>,
}

/// Accumulates entries into a single pack buffer plus its index.
#[derive(Default)]
pub struct PackWriter {
    buf: Vec<u8>,
    rows: Vec<IndexRow>,
}

impl PackWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_object(
        &mut self,
        id: ObjectId,
        obj_type: ObjectType,
        content: &[u8],
    ) -> std::io::Result<()> {
        let offset = self.buf.len() as u64;
        let compressed = zlib_compress(content)?;
        let header = encode_entry_header(
            PackEntryType::from_object_type(obj_type),
            content.len() as u64,
            None,
        );
        let crc32 = crc32fast::hash(&compressed);
        self.buf.extend_from_slice(&header);
        self.buf.extend_from_slice(&compressed);
        self.rows.push(IndexRow { id, offset, crc32 });
        Ok(())
    }

    pub fn add_delta(
        &mut self,
        id: ObjectId,
        base: ObjectId,
        target_len: usize,
        delta: &[u8],
    ) -> std::io::Result<()> {
        let offset = self.buf.len() as u64;
        let compressed = zlib_compress(delta)?;
        let header =
            encode_entry_header(PackEntryType::RefDelta, target_len as u64, Some(base));
        let crc32 = crc32fast::hash(&compressed);
        self.buf.extend_from_slice(&header);
        self.buf.extend_from_slice(&compressed);
        self.rows.push(IndexRow { id, offset, crc32 });
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Finalize the pack, returning the pack bytes and a sorted index.
    pub fn finish(self) -> (Vec<u8>, PackIndex) {
        (self.buf, PackIndex::from_unsorted(self.rows))
    }
}

/// Reads entries back out of a finished pack buffer.
pub struct PackReader<'a> {
    pack: &'a [u8],
    index: &'a PackIndex,
}

impl<'a> PackReader<'a> {
    pub fn new(pack: &'a [u8], index: &'a PackIndex) -> Self {
        Self { pack, index }
    }

    pub fn read(&self, id: &ObjectId) -> Result<RawEntry, PackError> {
        let offset = self
            .index
            .lookup(id)
            .ok_or_else(|| PackError::MissingBase(*id))?;
        self.read_at(offset)
    }

    fn read_at(&self, offset: u64) -> Result<RawEntry, PackError> {
        let data = &self.pack[offset as usize..];
        let header = parse_entry_header(data, offset)?;
        let compressed = &data[header.header_size..];
        let mut decoder = ZlibDecoder::new(compressed);
        let mut out = Vec::with_capacity(header.uncompressed_size);
        decoder.read_to_end(&mut out)?;
        Ok(RawEntry {
            entry_type: header.entry_type,
            data: out,
            base: header.base,
        })
    }
}

fn zlib_compress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}
