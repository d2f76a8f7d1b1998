use std::io::{Cursor, Read};

use bstr::{BStr, BString, ByteSlice, ByteVec};
use vcs_hash::ObjectId;
use vcs_utils::date::Signature;
use vcs_utils::{ByteRange, FilesApi};

use crate::error::RefError;
use crate::name::RefName;

/// A single reflog entry recording a ref value change.
///
/// Line format: `<old-oid> <new-oid> <identity> <timestamp> <tz>\t<message>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflogEntry {
    pub old_oid: ObjectId,
    pub new_oid: ObjectId,
    pub identity: Signature,
    pub message: BString,
}

impl ReflogEntry {
    pub fn parse(line: &BStr) -> Result<Self, RefError> {
        let line = line.as_bytes();
        if line.len() < 82 {
            return Err(RefError::Parse(format!("reflog line too short: {} bytes", line.len())));
        }

        let old_hex = std::str::from_utf8(&line[..40])
            .map_err(|_| RefError::Parse("invalid UTF-8 in old OID".into()))?;
        let old_oid = ObjectId::from_hex(old_hex)?;
        if line[40] != b' ' {
            return Err(RefError::Parse("expected space after old OID".into()));
        }

        let new_hex = std::str::from_utf8(&line[41..81])
            .map_err(|_| RefError::Parse("invalid UTF-8 in new OID".into()))?;
        let new_oid = ObjectId::from_hex(new_hex)?;
        if line[81] != b' ' {
            return Err(RefError::Parse("expected space after new OID".into()));
        }

        let rest = &line[82..];
        let (identity_part, message) = if let Some(tab_pos) = rest.find_byte(b'\t') {
            (&rest[..tab_pos], &rest[tab_pos + 1..])
        } else {
            (rest, &b""[..])
        };

        let identity = Signature::parse(identity_part.as_bstr())
            .map_err(|e| RefError::Parse(format!("invalid identity in reflog: {e}")))?;

        let message = if message.ends_with(b"\n") {
            &message[..message.len() - 1]
        } else {
            message
        };

        Ok(Self {
            old_oid,
            new_oid,
            identity,
            message: BString::from(message),
        })
    }

    pub fn to_bytes(&self) -> BString {
        let mut out = BString::new(Vec::with_capacity(256));
        out.push_str(self.old_oid.to_hex().as_bytes());
        out.push(b' ');
        out.push_str(self.new_oid.to_hex().as_bytes());
        out.push(b' ');
        out.push_str(self.identity.to_bytes());
        out.push(b'\t');
        out.push_str(&self.message);
        out
    }
}

fn reflog_path(name: &RefName) -> String {
    format!("logs/{}", name.as_str())
}

fn read_all(files: &dyn FilesApi, path: &str) -> Result<Vec<u8>, RefError> {
    if !files.exists(path) {
        return Ok(Vec::new());
    }
    let mut buf = Vec::new();
    files
        .read(path, ByteRange::default())?
        .read_to_end(&mut buf)
        .map_err(vcs_utils::UtilError::from)?;
    Ok(buf)
}

/// Read all reflog entries for a ref, newest first.
pub fn read_reflog(files: &dyn FilesApi, name: &RefName) -> Result<Vec<ReflogEntry>, RefError> {
    let contents = read_all(files, &reflog_path(name))?;
    let mut entries = Vec::new();
    for line in contents.lines() {
        if line.is_empty() {
            continue;
        }
        entries.push(ReflogEntry::parse(line.as_bstr())?);
    }
    entries.reverse();
    Ok(entries)
}

/// Append a reflog entry for a ref, creating the log file if needed.
pub fn append_reflog_entry(files: &dyn FilesApi, name: &RefName, entry: &ReflogEntry) -> Result<(), RefError> {
    let path = reflog_path(name);
    let mut existing = read_all(files, &path)?;
    let mut line = entry.to_bytes();
    line.push(b'\n');
    existing.extend_from_slice(&line);
    files.write(&path, &mut Cursor::new(existing))?;
    Ok(())
}

/// Resolve `@{N}` — the Nth previous value (0 = current).
pub fn resolve_at_n(files: &dyn FilesApi, name: &RefName, n: usize) -> Result<Option<ObjectId>, RefError> {
    let entries = read_reflog(files, name)?;
    Ok(entries.get(n).map(|e| e.new_oid))
}

/// Resolve `@{date}` — the last entry at or before `timestamp`.
pub fn resolve_at_date(files: &dyn FilesApi, name: &RefName, timestamp: i64) -> Result<Option<ObjectId>, RefError> {
    let contents = read_all(files, &reflog_path(name))?;
    let mut result = None;
    for line in contents.lines() {
        if line.is_empty() {
            continue;
        }
        let entry = ReflogEntry::parse(line.as_bstr())?;
        if entry.identity.date.timestamp <= timestamp {
            result = Some(entry.new_oid);
        } else {
            break;
        }
    }
    Ok(result)
}

/// Drop entries older than `expire_timestamp`, always keeping the tip entry.
/// Returns the number of entries removed.
pub fn expire_reflog(files: &dyn FilesApi, name: &RefName, expire_timestamp: i64) -> Result<usize, RefError> {
    let path = reflog_path(name);
    let contents = read_all(files, &path)?;
    if contents.is_empty() {
        return Ok(0);
    }

    let lines: Vec<&[u8]> = contents.split(|&b| b == b'\n').filter(|l| !l.is_empty()).collect();
    let total = lines.len();
    let mut kept = Vec::new();
    let mut removed = 0usize;
    for (i, line) in lines.iter().enumerate() {
        let entry = ReflogEntry::parse(line.as_bstr())?;
        let is_last = i == total - 1;
        if is_last || entry.identity.date.timestamp >= expire_timestamp {
            kept.push(entry);
        } else {
            removed += 1;
        }
    }

    let mut output = Vec::new();
    for entry in &kept {
        output.extend_from_slice(&entry.to_bytes());
        output.push(b'\n');
    }
    files.write(&path, &mut Cursor::new(output))?;
    Ok(removed)
}

/// Delete a specific reflog entry by index (0 = most recent).
pub fn delete_reflog_entry(files: &dyn FilesApi, name: &RefName, index: usize) -> Result<(), RefError> {
    let path = reflog_path(name);
    let contents = read_all(files, &path)?;
    if contents.is_empty() {
        return Err(RefError::NotFound(name.as_str().to_string()));
    }

    let mut entries: Vec<ReflogEntry> = Vec::new();
    for line in contents.split(|&b| b == b'\n').filter(|l| !l.is_empty()) {
        entries.push(ReflogEntry::parse(line.as_bstr())?);
    }
    if entries.is_empty() {
        return Err(RefError::NotFound(format!("{}@{{{}}}", name.as_str(), index)));
    }

    let file_index = entries
        .len()
        .checked_sub(1 + index)
        .ok_or_else(|| RefError::NotFound(format!("{}@{{{}}}", name.as_str(), index)))?;
    entries.remove(file_index);

    let mut output = Vec::new();
    for entry in &entries {
        output.extend_from_slice(&entry.to_bytes());
        output.push(b'\n');
    }
    files.write(&path, &mut Cursor::new(output))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcs_utils::date::GitDate;
    use vcs_utils::FsFiles;

    fn make_entry(old_hex: &str, new_hex: &str, msg: &str) -> ReflogEntry {
        ReflogEntry {
            old_oid: ObjectId::from_hex(old_hex).unwrap(),
            new_oid: ObjectId::from_hex(new_hex).unwrap(),
            identity: Signature {
                name: BString::from("Test User"),
                email: BString::from("test@example.com"),
                date: GitDate::new(1234567890, 0),
            },
            message: BString::from(msg),
        }
    }

    #[test]
    fn roundtrip() {
        let entry = make_entry(
            "0000000000000000000000000000000000000000",
            "da39a3ee5e6b4b0d3255bfef95601890afd80709",
            "commit (initial): first commit",
        );
        let bytes = entry.to_bytes();
        let parsed = ReflogEntry::parse(bytes.as_bstr()).unwrap();
        assert_eq!(parsed, entry);
    }

    #[test]
    fn parse_c_git_format() {
        let line = b"0000000000000000000000000000000000000000 da39a3ee5e6b4b0d3255bfef95601890afd80709 Test User <test@example.com> 1234567890 +0000\tcommit (initial): first commit";
        let entry = ReflogEntry::parse(BStr::new(line)).unwrap();
        assert!(entry.old_oid.is_null());
        assert_eq!(entry.identity.name, BString::from("Test User"));
        assert_eq!(entry.message, BString::from("commit (initial): first commit"));
    }

    #[test]
    fn write_and_read_reflog() {
        let dir = tempfile::tempdir().unwrap();
        let files = FsFiles::new(dir.path());
        let name = RefName::new("refs/heads/main").unwrap();

        let e1 = make_entry(
            "0000000000000000000000000000000000000000",
            "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
            "commit (initial): first",
        );
        let e2 = make_entry(
            "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
            "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb",
            "commit: second",
        );
        append_reflog_entry(&files, &name, &e1).unwrap();
        append_reflog_entry(&files, &name, &e2).unwrap();

        let entries = read_reflog(&files, &name).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, BString::from("commit: second"));
        assert_eq!(entries[1].message, BString::from("commit (initial): first"));
    }

    #[test]
    fn at_n_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let files = FsFiles::new(dir.path());
        let name = RefName::new("refs/heads/main").unwrap();

        let e1 = make_entry(
            "0000000000000000000000000000000000000000",
            "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
            "first",
        );
        let e2 = make_entry(
            "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
            "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb",
            "second",
        );
        append_reflog_entry(&files, &name, &e1).unwrap();
        append_reflog_entry(&files, &name, &e2).unwrap();

        assert_eq!(
            resolve_at_n(&files, &name, 0).unwrap().unwrap().to_hex(),
            "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"
        );
        assert_eq!(
            resolve_at_n(&files, &name, 1).unwrap().unwrap().to_hex(),
            "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
        );
        assert!(resolve_at_n(&files, &name, 2).unwrap().is_none());
    }

    #[test]
    fn expire_keeps_tip() {
        let dir = tempfile::tempdir().unwrap();
        let files = FsFiles::new(dir.path());
        let name = RefName::new("refs/heads/main").unwrap();

        let mut e1 = make_entry(
            "0000000000000000000000000000000000000000",
            "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
            "old",
        );
        e1.identity.date = GitDate::new(100, 0);
        let mut e2 = make_entry(
            "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
            "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb",
            "new",
        );
        e2.identity.date = GitDate::new(9999999999, 0);
        append_reflog_entry(&files, &name, &e1).unwrap();
        append_reflog_entry(&files, &name, &e2).unwrap();

        let removed = expire_reflog(&files, &name, 5000).unwrap();
        assert_eq!(removed, 1);
        let entries = read_reflog(&files, &name).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, BString::from("new"));
    }
}
