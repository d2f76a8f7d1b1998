use std::fmt;
use std::str::FromStr;

use crate::hex::{hex_decode, hex_to_string};
use crate::HashError;

/// The length in bytes of a SHA-1 digest.
pub const OID_LEN: usize = 20;

/// A content-addressed object identifier: the SHA-1 of an object's framed bytes.
///
/// `ObjectId`s are canonical and opaque to everything above the object store:
/// trees, commits and index entries reference objects by value, never by
/// their bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; OID_LEN]);

impl ObjectId {
    /// The all-zero OID, used as a sentinel for "no object" (e.g. a ref's
    /// old value before its first update).
    pub const NULL: Self = Self([0u8; OID_LEN]);

    /// Build an id from raw digest bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, HashError> {
        if bytes.len() != OID_LEN {
            return Err(HashError::InvalidHashLength {
                expected: OID_LEN,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; OID_LEN];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Build an id from an exact 40-character hex string.
    pub fn from_hex(hex: &str) -> Result<Self, HashError> {
        if hex.len() != OID_LEN * 2 {
            return Err(HashError::InvalidHexLength {
                expected: OID_LEN * 2,
                actual: hex.len(),
            });
        }
        let mut bytes = [0u8; OID_LEN];
        hex_decode(hex, &mut bytes)?;
        Ok(Self(bytes))
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; OID_LEN] {
        &self.0
    }

    /// Whether this is the all-zero sentinel id.
    pub fn is_null(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// Lowercase hex representation.
    pub fn to_hex(&self) -> String {
        hex_to_string(&self.0)
    }

    /// First byte of the digest, used to index fan-out tables.
    pub fn first_byte(&self) -> u8 {
        self.0[0]
    }

    /// Whether this id's hex form starts with `prefix` (case-insensitively).
    pub fn starts_with_hex(&self, prefix: &str) -> bool {
        self.to_hex().starts_with(&prefix.to_ascii_lowercase())
    }

    /// The loose-object path component: `"xx/yyyy..."`.
    pub fn loose_path(&self) -> String {
        let hex = self.to_hex();
        format!("{}/{}", &hex[..2], &hex[2..])
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", &self.to_hex()[..8])
    }
}

impl FromStr for ObjectId {
    type Err = HashError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const HEX: &str = "da39a3ee5e6b4b0d3255bfef95601890afd80709";

    #[test]
    fn from_hex_roundtrip() {
        let oid = ObjectId::from_hex(HEX).unwrap();
        assert_eq!(oid.to_string(), HEX);
        let parsed: ObjectId = HEX.parse().unwrap();
        assert_eq!(parsed, oid);
    }

    #[test]
    fn debug_shows_short_hash() {
        let oid = ObjectId::from_hex(HEX).unwrap();
        assert_eq!(format!("{:?}", oid), "ObjectId(da39a3ee)");
    }

    #[test]
    fn ordering_and_equality() {
        let a = ObjectId::from_hex("0000000000000000000000000000000000000001").unwrap();
        let b = ObjectId::from_hex("0000000000000000000000000000000000000002").unwrap();
        assert!(a < b);
        assert_eq!(a, a);
    }

    #[test]
    fn hashmap_key() {
        let oid = ObjectId::from_hex(HEX).unwrap();
        let mut map = HashMap::new();
        map.insert(oid, "value");
        assert_eq!(map.get(&oid), Some(&"value"));
    }

    #[test]
    fn null_oid() {
        assert!(ObjectId::NULL.is_null());
        assert!(!ObjectId::from_hex(HEX).unwrap().is_null());
    }

    #[test]
    fn invalid_hex_length() {
        assert!(ObjectId::from_hex("abcd").is_err());
    }

    #[test]
    fn invalid_hex_chars() {
        assert!(ObjectId::from_hex("zzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz").is_err());
    }

    #[test]
    fn case_insensitive_hex_decode() {
        let lower = ObjectId::from_hex(HEX).unwrap();
        let upper = ObjectId::from_hex(&HEX.to_ascii_uppercase()).unwrap();
        assert_eq!(lower, upper);
    }

    #[test]
    fn loose_path() {
        let oid = ObjectId::from_hex(HEX).unwrap();
        assert_eq!(oid.loose_path(), format!("da/{}", &HEX[2..]));
    }

    #[test]
    fn starts_with_hex_prefix() {
        let oid = ObjectId::from_hex(HEX).unwrap();
        assert!(oid.starts_with_hex("da39"));
        assert!(oid.starts_with_hex("DA39"));
        assert!(!oid.starts_with_hex("abcd"));
    }
}
