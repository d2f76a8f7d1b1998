use std::io::{Cursor, Read};

use bstr::ByteSlice;
use vcs_hash::ObjectId;
use vcs_utils::{ByteRange, EntryKind, FilesApi};

use crate::error::RefError;
use crate::name::RefName;
use crate::Reference;

/// Read a loose ref and return the Reference.
///
/// A loose ref is a file under `refs/` (or `HEAD`, etc.) containing either a
/// hex OID or `ref: <target-ref>`.
pub(crate) fn read_loose_ref(
    files: &dyn FilesApi,
    name: &RefName,
) -> Result<Option<Reference>, RefError> {
    let path = loose_ref_path(name);
    if !files.exists(&path) {
        return Ok(None);
    }

    let mut contents = Vec::new();
    files
        .read(&path, ByteRange::default())?
        .read_to_end(&mut contents)
        .map_err(vcs_utils::UtilError::from)?;

    let trimmed = contents.trim();

    if let Some(target_name) = trimmed.strip_prefix(b"ref: ") {
        let target_str = std::str::from_utf8(target_name.trim())
            .map_err(|_| RefError::Parse("invalid UTF-8 in symbolic ref target".into()))?;
        let target = RefName::new(target_str)?;
        Ok(Some(Reference::Symbolic { name: name.clone(), target }))
    } else {
        let hex = std::str::from_utf8(trimmed)
            .map_err(|_| RefError::Parse("invalid UTF-8 in ref OID".into()))?;
        let oid = ObjectId::from_hex(hex)?;
        Ok(Some(Reference::Direct { name: name.clone(), target: oid }))
    }
}

fn atomic_write(files: &dyn FilesApi, path: &str, content: &[u8]) -> Result<(), RefError> {
    let lock_path = format!("{path}.lock");
    files.write(&lock_path, &mut Cursor::new(content.to_vec()))?;
    files.rename(&lock_path, path)?;
    Ok(())
}

/// Write a loose ref atomically (write to a `.lock` path, then rename).
pub(crate) fn write_loose_ref(
    files: &dyn FilesApi,
    name: &RefName,
    oid: &ObjectId,
) -> Result<(), RefError> {
    check_dir_file_conflict(files, name)?;
    let path = loose_ref_path(name);
    let content = format!("{}\n", oid.to_hex());
    atomic_write(files, &path, content.as_bytes())
}

/// Write a symbolic ref atomically.
pub(crate) fn write_symbolic_ref(
    files: &dyn FilesApi,
    name: &RefName,
    target: &RefName,
) -> Result<(), RefError> {
    check_dir_file_conflict(files, name)?;
    let path = loose_ref_path(name);
    let content = format!("ref: {}\n", target);
    atomic_write(files, &path, content.as_bytes())
}

/// Delete a loose ref file, cleaning up now-empty parent directories under `refs/`.
pub(crate) fn delete_loose_ref(files: &dyn FilesApi, name: &RefName) -> Result<(), RefError> {
    let path = loose_ref_path(name);
    if !files.exists(&path) {
        return Ok(());
    }
    files.remove(&path)?;

    let mut dir = parent_dir(&path);
    while let Some(d) = dir {
        if d.is_empty() || d == "refs" {
            break;
        }
        let is_empty = files.list(&d, false).map(|entries| entries.is_empty()).unwrap_or(false);
        if is_empty {
            let _ = files.remove(&d);
            dir = parent_dir(&d);
        } else {
            break;
        }
    }
    Ok(())
}

fn parent_dir(path: &str) -> Option<String> {
    path.rsplit_once('/').map(|(parent, _)| parent.to_string())
}

/// Check for directory/file conflicts when creating a ref: e.g. creating
/// `refs/heads/a/b` when `refs/heads/a` already exists as a loose ref file,
/// or vice versa.
fn check_dir_file_conflict(files: &dyn FilesApi, name: &RefName) -> Result<(), RefError> {
    let ref_path = loose_ref_path(name);

    let mut current = String::new();
    let components: Vec<&str> = name.as_str().split('/').collect();
    for component in &components {
        if current.is_empty() {
            current = component.to_string();
        } else {
            current = format!("{current}/{component}");
        }
        if current == ref_path {
            break;
        }
        if let Ok(stat) = files.stat(&current) {
            if stat.kind == EntryKind::File {
                return Err(RefError::DirectoryConflict { name: name.to_string(), conflict: current });
            }
        }
    }

    if let Ok(stat) = files.stat(&ref_path) {
        if stat.kind == EntryKind::Dir {
            return Err(RefError::DirectoryConflict {
                name: name.to_string(),
                conflict: format!("{ref_path} (is a directory)"),
            });
        }
    }

    Ok(())
}

const SPECIAL_AT_ROOT: &[&str] = &[
    "HEAD",
    "MERGE_HEAD",
    "CHERRY_PICK_HEAD",
    "REVERT_HEAD",
    "BISECT_HEAD",
    "ORIG_HEAD",
    "FETCH_HEAD",
    "REBASE_HEAD",
];

/// Enumerate all loose refs under an optional prefix, sorted by name.
pub(crate) fn enumerate_loose_refs(
    files: &dyn FilesApi,
    prefix: Option<&str>,
) -> Result<Vec<RefName>, RefError> {
    let search_dir = match prefix {
        Some(p) => {
            let sub = p.strip_prefix("refs/").unwrap_or(p).trim_end_matches('/');
            if sub.is_empty() { "refs".to_string() } else { format!("refs/{sub}") }
        }
        None => "refs".to_string(),
    };

    let mut result = Vec::new();
    if files.exists(&search_dir) {
        if let Ok(stat) = files.stat(&search_dir) {
            if stat.kind == EntryKind::Dir {
                collect_loose_refs(files, &search_dir, prefix, &mut result)?;
            }
        }
    }

    if prefix.is_none() || prefix == Some("") {
        for special in SPECIAL_AT_ROOT {
            if files.exists(special) {
                if let Ok(stat) = files.stat(special) {
                    if stat.kind == EntryKind::File {
                        if let Ok(name) = RefName::new(*special) {
                            result.push(name);
                        }
                    }
                }
            }
        }
    }

    result.sort();
    Ok(result)
}

fn collect_loose_refs(
    files: &dyn FilesApi,
    dir: &str,
    prefix: Option<&str>,
    result: &mut Vec<RefName>,
) -> Result<(), RefError> {
    let entries = match files.list(dir, true) {
        Ok(e) => e,
        Err(vcs_utils::UtilError::NotFound(_)) => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    for entry in entries {
        if entry.kind != EntryKind::File {
            continue;
        }
        if entry.path.ends_with(".lock") {
            continue;
        }
        let Ok(name) = RefName::new(entry.path.as_str()) else { continue };
        if let Some(p) = prefix {
            if !name.as_str().starts_with(p) {
                continue;
            }
        }
        result.push(name);
    }
    Ok(())
}

/// The storage path for a loose ref.
pub(crate) fn loose_ref_path(name: &RefName) -> String {
    name.as_str().to_string()
}
