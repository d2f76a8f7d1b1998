use bstr::{BStr, BString, ByteSlice};
use vcs_hash::ObjectId;
use vcs_utils::Signature;

use crate::ObjectError;

/// A commit object: a tree snapshot plus ancestry and authorship.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub tree: ObjectId,
    pub parents: Vec<ObjectId>,
    pub author: Signature,
    pub committer: Signature,
    pub encoding: Option<BString>,
    pub gpgsig: Option<BString>,
    pub extra_headers: Vec<(BString, BString)>,
    pub message: BString,
}

impl Commit {
    /// Parse commit content (no object header).
    pub fn parse(content: &[u8]) -> Result<Self, ObjectError> {
        let mut tree: Option<ObjectId> = None;
        let mut parents = Vec::new();
        let mut author: Option<Signature> = None;
        let mut committer: Option<Signature> = None;
        let mut encoding = None;
        let mut gpgsig: Option<BString> = None;
        let mut extra_headers = Vec::new();

        let mut pos = 0;

        loop {
            if pos >= content.len() {
                break;
            }
            if content[pos] == b'\n' {
                pos += 1;
                break;
            }

            let line_end = content[pos..]
                .iter()
                .position(|&b| b == b'\n')
                .map(|p| p + pos)
                .unwrap_or(content.len());
            let line = &content[pos..line_end];

            let space_pos = line.iter().position(|&b| b == b' ').ok_or_else(|| {
                ObjectError::InvalidHeader("commit header missing space".into())
            })?;
            let key = &line[..space_pos];
            let mut value = line[space_pos + 1..].to_vec();

            // Continuation lines (used by multi-line gpgsig and custom
            // headers) start with a single leading space on the next line.
            let mut next = line_end + 1;
            while next < content.len() && content[next] == b' ' {
                let cont_end = content[next..]
                    .iter()
                    .position(|&b| b == b'\n')
                    .map(|p| p + next)
                    .unwrap_or(content.len());
                value.push(b'\n');
                value.extend_from_slice(&content[next + 1..cont_end]);
                next = cont_end + 1;
            }

            match key {
                b"tree" => {
                    let hex = std::str::from_utf8(&value)
                        .map_err(|_| ObjectError::InvalidHeader("non-UTF8 tree id".into()))?;
                    tree = Some(ObjectId::from_hex(hex)?);
                }
                b"parent" => {
                    let hex = std::str::from_utf8(&value)
                        .map_err(|_| ObjectError::InvalidHeader("non-UTF8 parent id".into()))?;
                    parents.push(ObjectId::from_hex(hex)?);
                }
                b"author" => {
                    author = Some(parse_signature(&value)?);
                }
                b"committer" => {
                    committer = Some(parse_signature(&value)?);
                }
                b"encoding" => {
                    encoding = Some(BString::from(value));
                }
                b"gpgsig" => {
                    gpgsig = Some(BString::from(value));
                }
                _ => {
                    extra_headers.push((BString::from(key), BString::from(value)));
                }
            }

            pos = next;
        }

        let tree = tree.ok_or(ObjectError::MissingCommitField { field: "tree" })?;
        let author = author.ok_or(ObjectError::MissingCommitField { field: "author" })?;
        let committer =
            committer.ok_or(ObjectError::MissingCommitField { field: "committer" })?;
        let message = BString::from(&content[pos..]);

        Ok(Self {
            tree,
            parents,
            author,
            committer,
            encoding,
            gpgsig,
            extra_headers,
            message,
        })
    }

    /// Serialize commit content (no object header).
    pub fn serialize_content(&self) -> Vec<u8> {
        let mut out = Vec::new();

        out.extend_from_slice(b"tree ");
        out.extend_from_slice(self.tree.to_hex().as_bytes());
        out.push(b'\n');

        for parent in &self.parents {
            out.extend_from_slice(b"parent ");
            out.extend_from_slice(parent.to_hex().as_bytes());
            out.push(b'\n');
        }

        out.extend_from_slice(b"author ");
        out.extend_from_slice(&self.author.to_bytes());
        out.push(b'\n');

        out.extend_from_slice(b"committer ");
        out.extend_from_slice(&self.committer.to_bytes());
        out.push(b'\n');

        if let Some(ref enc) = self.encoding {
            out.extend_from_slice(b"encoding ");
            out.extend_from_slice(enc);
            out.push(b'\n');
        }

        if let Some(ref sig) = self.gpgsig {
            out.extend_from_slice(b"gpgsig ");
            write_continued(&mut out, sig);
            out.push(b'\n');
        }

        for (key, val) in &self.extra_headers {
            out.extend_from_slice(key);
            out.push(b' ');
            write_continued(&mut out, val);
            out.push(b'\n');
        }

        out.push(b'\n');
        out.extend_from_slice(&self.message);

        out
    }

    pub fn first_parent(&self) -> Option<&ObjectId> {
        self.parents.first()
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    /// The first line of the message.
    pub fn summary(&self) -> &BStr {
        let msg: &[u8] = self.message.as_ref();
        match msg.find_byte(b'\n') {
            Some(pos) => BStr::new(&msg[..pos]),
            None => BStr::new(msg),
        }
    }

    /// Everything after the first blank line in the message, if any.
    pub fn body(&self) -> Option<&BStr> {
        let msg: &[u8] = self.message.as_ref();
        msg.find(b"\n\n").map(|pos| BStr::new(&msg[pos + 2..]))
    }
}

/// Write `value`, re-inserting the leading-space continuation prefix on
/// each embedded newline.
fn write_continued(out: &mut Vec<u8>, value: &[u8]) {
    for (i, line) in value.split(|&b| b == b'\n').enumerate() {
        if i > 0 {
            out.push(b'\n');
            out.push(b' ');
        }
        out.extend_from_slice(line);
    }
}

fn parse_signature(data: &[u8]) -> Result<Signature, ObjectError> {
    Signature::parse(BStr::new(data)).map_err(|e| ObjectError::InvalidSignature(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_commit_bytes() -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"tree da39a3ee5e6b4b0d3255bfef95601890afd80709\n");
        out.extend_from_slice(b"parent 0000000000000000000000000000000000000001\n");
        out.extend_from_slice(b"author John Doe <john@example.com> 1234567890 +0000\n");
        out.extend_from_slice(b"committer Jane Doe <jane@example.com> 1234567890 +0000\n");
        out.extend_from_slice(b"\n");
        out.extend_from_slice(b"Initial commit\n");
        out
    }

    #[test]
    fn parse_commit() {
        let commit = Commit::parse(&sample_commit_bytes()).unwrap();
        assert_eq!(
            commit.tree.to_hex(),
            "da39a3ee5e6b4b0d3255bfef95601890afd80709"
        );
        assert_eq!(commit.parents.len(), 1);
        assert_eq!(commit.author.name.as_bytes(), b"John Doe");
        assert_eq!(commit.committer.email.as_bytes(), b"jane@example.com");
        assert_eq!(commit.message.as_bytes(), b"Initial commit\n");
    }

    #[test]
    fn parse_root_commit() {
        let mut data = Vec::new();
        data.extend_from_slice(b"tree da39a3ee5e6b4b0d3255bfef95601890afd80709\n");
        data.extend_from_slice(b"author A <a@b.com> 1000000000 +0000\n");
        data.extend_from_slice(b"committer A <a@b.com> 1000000000 +0000\n");
        data.extend_from_slice(b"\nroot\n");

        let commit = Commit::parse(&data).unwrap();
        assert!(commit.is_root());
        assert!(!commit.is_merge());
    }

    #[test]
    fn parse_merge_commit() {
        let mut data = Vec::new();
        data.extend_from_slice(b"tree da39a3ee5e6b4b0d3255bfef95601890afd80709\n");
        data.extend_from_slice(b"parent 0000000000000000000000000000000000000001\n");
        data.extend_from_slice(b"parent 0000000000000000000000000000000000000002\n");
        data.extend_from_slice(b"author A <a@b.com> 1000000000 +0000\n");
        data.extend_from_slice(b"committer A <a@b.com> 1000000000 +0000\n");
        data.extend_from_slice(b"\nMerge\n");

        let commit = Commit::parse(&data).unwrap();
        assert!(commit.is_merge());
        assert_eq!(commit.parents.len(), 2);
    }

    #[test]
    fn serialize_roundtrip() {
        let original_bytes = sample_commit_bytes();
        let commit = Commit::parse(&original_bytes).unwrap();
        let serialized = commit.serialize_content();
        assert_eq!(serialized, original_bytes);
    }

    #[test]
    fn summary_and_body() {
        let commit = Commit::parse(&sample_commit_bytes()).unwrap();
        assert_eq!(commit.summary().as_bytes(), b"Initial commit");
        assert_eq!(commit.body(), None);
    }

    #[test]
    fn summary_and_body_multi_paragraph() {
        let mut data = Vec::new();
        data.extend_from_slice(b"tree da39a3ee5e6b4b0d3255bfef95601890afd80709\n");
        data.extend_from_slice(b"author A <a@b.com> 1000000000 +0000\n");
        data.extend_from_slice(b"committer A <a@b.com> 1000000000 +0000\n");
        data.extend_from_slice(b"\nSummary line\n\nBody paragraph.\n");

        let commit = Commit::parse(&data).unwrap();
        assert_eq!(commit.summary().as_bytes(), b"Summary line");
        assert_eq!(commit.body().unwrap().as_bytes(), b"Body paragraph.\n");
    }

    #[test]
    fn commit_with_encoding() {
        let mut data = Vec::new();
        data.extend_from_slice(b"tree da39a3ee5e6b4b0d3255bfef95601890afd80709\n");
        data.extend_from_slice(b"author A <a@b.com> 1000000000 +0000\n");
        data.extend_from_slice(b"committer A <a@b.com> 1000000000 +0000\n");
        data.extend_from_slice(b"encoding ISO-8859-1\n");
        data.extend_from_slice(b"\nmessage\n");

        let commit = Commit::parse(&data).unwrap();
        assert_eq!(commit.encoding.as_ref().unwrap().as_bytes(), b"ISO-8859-1");

        let serialized = commit.serialize_content();
        assert_eq!(serialized, data);
    }

    #[test]
    fn commit_with_multiline_gpgsig() {
        let mut data = Vec::new();
        data.extend_from_slice(b"tree da39a3ee5e6b4b0d3255bfef95601890afd80709\n");
        data.extend_from_slice(b"author A <a@b.com> 1000000000 +0000\n");
        data.extend_from_slice(b"committer A <a@b.com> 1000000000 +0000\n");
        data.extend_from_slice(
            b"gpgsig -----BEGIN PGP SIGNATURE-----\n \n one\n two\n -----END PGP SIGNATURE-----\n",
        );
        data.extend_from_slice(b"\nsigned commit\n");

        let commit = Commit::parse(&data).unwrap();
        let sig = commit.gpgsig.as_ref().unwrap();
        assert!(sig.contains_str("one"));
        assert!(sig.contains_str("two"));

        let serialized = commit.serialize_content();
        assert_eq!(serialized, data);
    }

    #[test]
    fn missing_tree_errors() {
        let data = b"author A <a@b.com> 1000000000 +0000\ncommitter A <a@b.com> 1000000000 +0000\n\nmsg\n";
        assert!(Commit::parse(data).is_err());
    }
}
