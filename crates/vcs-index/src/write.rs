//! Index file writing and tree materialization.

use std::io::Cursor;

use vcs_hash::{Hasher, ObjectId};
use vcs_object::{FileMode, Object, ObjectType, Tree, TreeEntry};
use vcs_odb::ObjectDatabase;
use vcs_utils::FilesApi;

use crate::entry::IndexEntry;
use crate::extensions::tree::CacheTree;
use crate::extensions::ResolveUndo;
use crate::{Index, IndexError, Stage};

const INDEX_SIGNATURE: &[u8; 4] = b"DIRC";

/// Write the index to `path` atomically (write to a `.lock` path, then rename).
pub fn write_index(index: &Index, files: &dyn FilesApi, path: &str) -> Result<(), IndexError> {
    let data = serialize_index(index)?;
    let lock_path = format!("{path}.lock");
    files.write(&lock_path, &mut Cursor::new(data))?;
    files.rename(&lock_path, path)?;
    Ok(())
}

fn serialize_index(index: &Index) -> Result<Vec<u8>, IndexError> {
    let mut buf = Vec::new();

    buf.extend_from_slice(INDEX_SIGNATURE);
    buf.extend_from_slice(&2u32.to_be_bytes());
    buf.extend_from_slice(&(index.entries.len() as u32).to_be_bytes());

    for entry in index.iter() {
        write_entry(&mut buf, entry);
    }

    if let Some(ref tree) = index.cache_tree {
        let tree_data = tree.serialize();
        buf.extend_from_slice(CacheTree::SIGNATURE);
        buf.extend_from_slice(&(tree_data.len() as u32).to_be_bytes());
        buf.extend_from_slice(&tree_data);
    }

    if let Some(ref reuc) = index.resolve_undo {
        let reuc_data = reuc.serialize();
        buf.extend_from_slice(ResolveUndo::SIGNATURE);
        buf.extend_from_slice(&(reuc_data.len() as u32).to_be_bytes());
        buf.extend_from_slice(&reuc_data);
    }

    for ext in &index.unknown_extensions {
        buf.extend_from_slice(&ext.signature);
        buf.extend_from_slice(&(ext.data.len() as u32).to_be_bytes());
        buf.extend_from_slice(&ext.data);
    }

    let checksum = Hasher::digest(&buf).map_err(|_| IndexError::InvalidHeader("checksum computation failed".into()))?;
    buf.extend_from_slice(checksum.as_bytes());

    Ok(buf)
}

/// Write a single v2 cache entry (no extended flags: this crate always
/// writes v2, matching the policy of never needing intent-to-add or
/// skip-worktree to survive a round trip through this writer).
fn write_entry(buf: &mut Vec<u8>, entry: &IndexEntry) {
    let entry_start = buf.len();

    buf.extend_from_slice(&entry.stat.ctime_secs.to_be_bytes());
    buf.extend_from_slice(&entry.stat.ctime_nsecs.to_be_bytes());
    buf.extend_from_slice(&entry.stat.mtime_secs.to_be_bytes());
    buf.extend_from_slice(&entry.stat.mtime_nsecs.to_be_bytes());
    buf.extend_from_slice(&entry.stat.dev.to_be_bytes());
    buf.extend_from_slice(&entry.stat.ino.to_be_bytes());
    buf.extend_from_slice(&entry.mode.raw().to_be_bytes());
    buf.extend_from_slice(&entry.stat.uid.to_be_bytes());
    buf.extend_from_slice(&entry.stat.gid.to_be_bytes());
    buf.extend_from_slice(&entry.stat.size.to_be_bytes());

    buf.extend_from_slice(entry.id.as_bytes());

    let name_len = std::cmp::min(entry.path.len(), 0xFFF) as u16;
    let mut flags: u16 = name_len;
    flags |= (entry.stage.as_u8() as u16) << 12;
    if entry.flags.assume_valid {
        flags |= 0x8000;
    }
    buf.extend_from_slice(&flags.to_be_bytes());

    buf.extend_from_slice(&entry.path);

    let entry_size = (40 + 20 + 2 + entry.path.len() + 8) & !7;
    let current_len = buf.len() - entry_start;
    let padding = entry_size - current_len;
    for _ in 0..padding {
        buf.push(0);
    }
}

/// Materialize the stage-0 entries of `index` as a tree hierarchy in `odb`,
/// returning the root tree's id.
pub fn write_tree_from_index(index: &Index, odb: &ObjectDatabase) -> Result<ObjectId, IndexError> {
    let entries: Vec<&IndexEntry> = index.iter().filter(|e| e.stage == Stage::Normal).collect();

    if entries.is_empty() {
        let tree = Tree::new();
        return Ok(odb.write_raw(ObjectType::Tree, &tree.serialize_content())?);
    }

    build_tree(&entries, b"", odb)
}

fn build_tree(entries: &[&IndexEntry], prefix: &[u8], odb: &ObjectDatabase) -> Result<ObjectId, IndexError> {
    let mut tree_entries: Vec<TreeEntry> = Vec::new();
    let mut i = 0;

    while i < entries.len() {
        let entry = entries[i];
        let path = &entry.path[prefix.len()..];

        if let Some(slash_pos) = path.iter().position(|&b| b == b'/') {
            let dir_name = &path[..slash_pos];
            let subtree_end = entries[i..]
                .iter()
                .position(|e| {
                    let p = &e.path[prefix.len()..];
                    !p.starts_with(dir_name) || (p.len() > slash_pos && p[slash_pos] != b'/')
                })
                .map(|pos| i + pos)
                .unwrap_or(entries.len());

            let subtree_entries = &entries[i..subtree_end];

            let mut new_prefix = prefix.to_vec();
            new_prefix.extend_from_slice(dir_name);
            new_prefix.push(b'/');

            let subtree_id = build_tree(subtree_entries, &new_prefix, odb)?;

            tree_entries.push(TreeEntry { mode: FileMode::Tree, name: dir_name.into(), id: subtree_id });
            i = subtree_end;
        } else {
            tree_entries.push(TreeEntry { mode: entry.mode, name: path.into(), id: entry.id });
            i += 1;
        }
    }

    let mut tree = Tree::new();
    tree.entries = tree_entries;
    tree.sort();
    Ok(odb.write_raw(ObjectType::Tree, &tree.serialize_content())?)
}

/// Replace the index contents with the flat expansion of the tree `id`,
/// recursively descending subtrees. All resulting entries land at stage 0.
pub fn read_tree_into_index(index: &mut Index, odb: &ObjectDatabase, id: &ObjectId) -> Result<(), IndexError> {
    index.entries.clear();
    index.cache_tree = None;
    index.resolve_undo = None;
    expand_tree(index, odb, id, b"")?;
    index.entries.sort_by(crate::cmp_entries);
    Ok(())
}

fn expand_tree(index: &mut Index, odb: &ObjectDatabase, id: &ObjectId, prefix: &[u8]) -> Result<(), IndexError> {
    let obj = odb.read(id)?.ok_or(IndexError::MissingTree(*id))?;
    let Object::Tree(tree) = obj else {
        return Err(IndexError::NotATree(*id));
    };

    for entry in tree.iter() {
        let mut path = prefix.to_vec();
        path.extend_from_slice(&entry.name);

        if entry.mode.is_tree() {
            path.push(b'/');
            expand_tree(index, odb, &entry.id, &path)?;
        } else {
            index.entries.push(IndexEntry {
                path: path.into(),
                id: entry.id,
                mode: entry.mode,
                stage: Stage::Normal,
                stat: Default::default(),
                flags: Default::default(),
            });
        }
    }
    Ok(())
}
