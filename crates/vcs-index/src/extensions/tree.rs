//! Cache tree extension (TREE).
//!
//! Caches tree object ids for entry ranges so `writeTree` can skip
//! recomputing subtrees that haven't changed. Each node records the number
//! of index entries it covers and, if valid, the tree id. Touching an
//! entry invalidates its node and every ancestor (`entry_count = -1`).

use bstr::{BStr, BString, ByteSlice};
use vcs_hash::ObjectId;

use crate::IndexError;

#[derive(Debug, Clone)]
pub struct CacheTree {
    pub root: CacheTreeNode,
}

#[derive(Debug, Clone)]
pub struct CacheTreeNode {
    /// Name of this subtree (empty for the root).
    pub name: BString,
    /// Number of entries covered by this tree (-1 = invalid).
    pub entry_count: i32,
    /// Tree id, valid only when `entry_count >= 0`.
    pub id: Option<ObjectId>,
    pub children: Vec<CacheTreeNode>,
}

impl CacheTree {
    pub const SIGNATURE: &'static [u8; 4] = b"TREE";

    pub fn parse(data: &[u8]) -> Result<Self, IndexError> {
        let mut cursor = 0;
        if cursor < data.len() && data[cursor] == 0 {
            cursor += 1;
        }
        let root = Self::parse_entry(data, &mut cursor, b"")?;
        Ok(CacheTree { root })
    }

    fn parse_node(data: &[u8], cursor: &mut usize, name: &[u8]) -> Result<CacheTreeNode, IndexError> {
        Self::parse_entry(data, cursor, name)
    }

    fn parse_entry(data: &[u8], cursor: &mut usize, name: &[u8]) -> Result<CacheTreeNode, IndexError> {
        let entry_count_end = data[*cursor..]
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| IndexError::InvalidExtension { sig: "TREE".into(), reason: "missing entry count".into() })?
            + *cursor;

        let entry_count_str = std::str::from_utf8(&data[*cursor..entry_count_end])
            .map_err(|_| IndexError::InvalidExtension { sig: "TREE".into(), reason: "invalid entry count".into() })?;
        let entry_count: i32 = entry_count_str
            .parse()
            .map_err(|_| IndexError::InvalidExtension { sig: "TREE".into(), reason: format!("invalid entry count: {entry_count_str}") })?;
        *cursor = entry_count_end + 1;

        let subtree_count_end = data[*cursor..]
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| IndexError::InvalidExtension { sig: "TREE".into(), reason: "missing subtree count".into() })?
            + *cursor;

        let subtree_count_str = std::str::from_utf8(&data[*cursor..subtree_count_end])
            .map_err(|_| IndexError::InvalidExtension { sig: "TREE".into(), reason: "invalid subtree count".into() })?;
        let subtree_count: usize = subtree_count_str
            .parse()
            .map_err(|_| IndexError::InvalidExtension { sig: "TREE".into(), reason: format!("invalid subtree count: {subtree_count_str}") })?;
        *cursor = subtree_count_end + 1;

        let id = if entry_count >= 0 {
            if *cursor + vcs_hash::OID_LEN > data.len() {
                return Err(IndexError::InvalidExtension { sig: "TREE".into(), reason: "truncated object id".into() });
            }
            let id = ObjectId::from_bytes(&data[*cursor..*cursor + vcs_hash::OID_LEN])
                .map_err(|_| IndexError::InvalidExtension { sig: "TREE".into(), reason: "invalid object id".into() })?;
            *cursor += vcs_hash::OID_LEN;
            Some(id)
        } else {
            None
        };

        let mut children = Vec::with_capacity(subtree_count);
        for _ in 0..subtree_count {
            let name_end = data[*cursor..]
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| IndexError::InvalidExtension { sig: "TREE".into(), reason: "missing child name".into() })?
                + *cursor;
            let child_name = &data[*cursor..name_end];
            *cursor = name_end + 1;
            children.push(Self::parse_node(data, cursor, child_name)?);
        }

        Ok(CacheTreeNode { name: BString::from(name), entry_count, id, children })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        Self::serialize_node(&self.root, &mut buf, true);
        buf
    }

    fn serialize_node(node: &CacheTreeNode, buf: &mut Vec<u8>, is_root: bool) {
        if !is_root {
            buf.extend_from_slice(&node.name);
            buf.push(0);
        }
        buf.extend_from_slice(node.entry_count.to_string().as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(node.children.len().to_string().as_bytes());
        buf.push(b'\n');
        if node.entry_count >= 0 {
            if let Some(ref id) = node.id {
                buf.extend_from_slice(id.as_bytes());
            }
        }
        for child in &node.children {
            Self::serialize_node(child, buf, false);
        }
    }

    /// Invalidate the node for `path` and every ancestor.
    pub fn invalidate(&mut self, path: &BStr) {
        Self::invalidate_node(&mut self.root, path.as_bytes());
    }

    fn invalidate_node(node: &mut CacheTreeNode, path: &[u8]) -> bool {
        match path.iter().position(|&b| b == b'/') {
            Some(pos) => {
                let component = &path[..pos];
                let rest = &path[pos + 1..];
                for child in &mut node.children {
                    if child.name.as_bytes() == component && Self::invalidate_node(child, rest) {
                        node.entry_count = -1;
                        node.id = None;
                        return true;
                    }
                }
                false
            }
            None => {
                node.entry_count = -1;
                node.id = None;
                true
            }
        }
    }

    pub fn root_id(&self) -> Option<&ObjectId> {
        if self.root.entry_count >= 0 {
            self.root.id.as_ref()
        } else {
            None
        }
    }
}
