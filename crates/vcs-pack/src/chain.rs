use vcs_hash::ObjectId;

/// Delta-chain metadata for an object stored as a delta, retrievable for
/// inspection without materializing the full object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainInfo {
    /// Number of delta hops from `id` down to the full base object.
    pub depth: usize,
    /// Total compressed bytes across the chain.
    pub compressed_size: usize,
    /// `id` followed by each successive base, ending at the full object.
    pub chain: Vec<ObjectId>,
}

impl ChainInfo {
    pub fn base(&self) -> Option<&ObjectId> {
        self.chain.last()
    }

    pub fn exceeds(&self, max_depth: usize) -> bool {
        self.depth > max_depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u8) -> ObjectId {
        let mut bytes = [0u8; 20];
        bytes[19] = n;
        ObjectId::from_bytes(&bytes).unwrap()
    }

    #[test]
    fn exceeds_respects_limit() {
        let info = ChainInfo {
            depth: 3,
            compressed_size: 100,
            chain: vec![id(1), id(2), id(3), id(4)],
        };
        assert!(info.exceeds(2));
        assert!(!info.exceeds(3));
    }

    #[test]
    fn base_is_last_in_chain() {
        let info = ChainInfo {
            depth: 1,
            compressed_size: 10,
            chain: vec![id(1), id(2)],
        };
        assert_eq!(info.base(), Some(&id(2)));
    }
}
