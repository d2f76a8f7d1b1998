//! Resolve-undo extension (REUC).
//!
//! Stores the pre-conflict stage-1/2/3 versions of resolved paths so a
//! resolution can be undone (`git checkout -m`-style).

use bstr::BString;
use vcs_hash::ObjectId;
use vcs_object::FileMode;

use crate::extensions::{ResolveUndo, ResolveUndoEntry};
use crate::IndexError;

impl ResolveUndo {
    pub const SIGNATURE: &'static [u8; 4] = b"REUC";

    pub fn parse(data: &[u8]) -> Result<Self, IndexError> {
        let mut entries = Vec::new();
        let mut cursor = 0;

        while cursor < data.len() {
            let nul_pos = data[cursor..]
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| IndexError::InvalidExtension { sig: "REUC".into(), reason: "missing NUL in path".into() })?;
            let path = BString::from(&data[cursor..cursor + nul_pos]);
            cursor += nul_pos + 1;

            let mut modes = [None; 3];
            for mode in &mut modes {
                let nul_pos = data[cursor..]
                    .iter()
                    .position(|&b| b == 0)
                    .ok_or_else(|| IndexError::InvalidExtension { sig: "REUC".into(), reason: "missing NUL in mode".into() })?;
                let mode_str = std::str::from_utf8(&data[cursor..cursor + nul_pos])
                    .map_err(|_| IndexError::InvalidExtension { sig: "REUC".into(), reason: "invalid mode encoding".into() })?;
                let raw = u32::from_str_radix(mode_str, 8)
                    .map_err(|_| IndexError::InvalidExtension { sig: "REUC".into(), reason: format!("invalid mode: {mode_str}") })?;
                if raw != 0 {
                    *mode = Some(FileMode::from_raw(raw));
                }
                cursor += nul_pos + 1;
            }

            let mut ids = [None; 3];
            for (i, id_slot) in ids.iter_mut().enumerate() {
                if modes[i].is_some() {
                    if cursor + vcs_hash::OID_LEN > data.len() {
                        return Err(IndexError::InvalidExtension { sig: "REUC".into(), reason: "truncated object id".into() });
                    }
                    let id = ObjectId::from_bytes(&data[cursor..cursor + vcs_hash::OID_LEN])
                        .map_err(|_| IndexError::InvalidExtension { sig: "REUC".into(), reason: "invalid object id".into() })?;
                    *id_slot = Some(id);
                    cursor += vcs_hash::OID_LEN;
                }
            }

            entries.push(ResolveUndoEntry { path, modes, ids });
        }

        Ok(ResolveUndo { entries })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        for entry in &self.entries {
            buf.extend_from_slice(&entry.path);
            buf.push(0);

            for mode in &entry.modes {
                let raw = mode.map(|m| m.raw()).unwrap_or(0);
                buf.extend_from_slice(format!("{raw:o}").as_bytes());
                buf.push(0);
            }

            for (i, id) in entry.ids.iter().enumerate() {
                if entry.modes[i].is_some() {
                    if let Some(id) = id {
                        buf.extend_from_slice(id.as_bytes());
                    }
                }
            }
        }
        buf
    }
}
