use crate::ObjectError;

/// Raw file content, stored and hashed exactly as given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub data: Vec<u8>,
}

impl Blob {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// A blob's content is simply its raw bytes; this can't fail, but
    /// returns `Result` to match the other codecs' signature.
    pub fn parse(content: &[u8]) -> Result<Self, ObjectError> {
        Ok(Self {
            data: content.to_vec(),
        })
    }

    pub fn serialize_content(&self) -> &[u8] {
        &self.data
    }
}
