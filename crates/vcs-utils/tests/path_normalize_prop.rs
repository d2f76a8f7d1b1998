//! Property: normalizing a path is idempotent, and never leaves a
//! backslash or trailing slash behind (except for the root path itself).

use proptest::prelude::*;
use vcs_utils::GitPath;

fn raw_path() -> impl Strategy<Value = String> {
    prop::collection::vec(prop_oneof![Just('/'), Just('\\'), Just('a'), Just('b')], 0..16)
        .prop_map(|chars| chars.into_iter().collect())
}

proptest! {
    #[test]
    fn normalize_is_idempotent(raw in raw_path()) {
        let once = GitPath::new(&raw);
        let twice = GitPath::new(once.as_bytes());
        prop_assert_eq!(once.as_bytes(), twice.as_bytes());
    }

    #[test]
    fn normalize_drops_backslashes_and_trailing_slash(raw in raw_path()) {
        let normalized = GitPath::new(&raw);
        let bytes = normalized.as_bytes();
        prop_assert!(!bytes.contains(&b'\\'));
        prop_assert!(bytes == b"/" || !bytes.ends_with(b"/"));
    }
}
