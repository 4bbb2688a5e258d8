//! Merkle root construction for blocks.
//!
//! Behavior:
//! - An empty list of leaves yields the all-zero hash.
//! - Odd layers are padded by duplicating the last node before pairing.
//! - The reduction is performed in place to minimize allocations.
//! - A pair hashes as `hash256(left ‖ right)`.

use crate::types::hash::{HashBuilder, Uint256};

/// Utility to build merkle roots from leaf hashes.
pub struct MerkleTree;

impl MerkleTree {
    fn hash_pair(left: Uint256, right: Uint256) -> Uint256 {
        let mut h = HashBuilder::new();
        h.update(left.as_slice());
        h.update(right.as_slice());
        h.finalize()
    }

    /// Computes a merkle root from the provided leaf hashes.
    ///
    /// When a level has an odd number of nodes the last node is duplicated
    /// for hashing that pair. Returns the zero hash when `nodes` is empty.
    pub fn from_raw(mut nodes: Vec<Uint256>) -> Uint256 {
        if nodes.is_empty() {
            return Uint256::zero();
        }

        let mut len = nodes.len();
        while len > 1 {
            let mut write = 0;
            let mut read = 0;
            while read < len {
                let left = nodes[read];
                let right = if read + 1 < len {
                    nodes[read + 1]
                } else {
                    left
                };
                nodes[write] = Self::hash_pair(left, right);
                write += 1;
                read += 2;
            }
            len = write;
        }

        nodes[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::hash::hash256;

    fn leaf(data: &[u8]) -> Uint256 {
        hash256(data)
    }

    #[test]
    fn empty_returns_zero_hash() {
        assert_eq!(MerkleTree::from_raw(Vec::new()), Uint256::zero());
    }

    #[test]
    fn single_leaf_returns_leaf() {
        let a = leaf(b"a");
        assert_eq!(MerkleTree::from_raw(vec![a]), a);
    }

    #[test]
    fn even_leaves_match_manual_reduction() {
        let (a, b, c, d) = (leaf(b"a"), leaf(b"b"), leaf(b"c"), leaf(b"d"));
        let level1 = [MerkleTree::hash_pair(a, b), MerkleTree::hash_pair(c, d)];
        let expected = MerkleTree::hash_pair(level1[0], level1[1]);
        assert_eq!(MerkleTree::from_raw(vec![a, b, c, d]), expected);
    }

    #[test]
    fn odd_leaves_duplicate_last() {
        let (a, b, c) = (leaf(b"a"), leaf(b"b"), leaf(b"c"));
        let expected = MerkleTree::hash_pair(
            MerkleTree::hash_pair(a, b),
            MerkleTree::hash_pair(c, c),
        );
        assert_eq!(MerkleTree::from_raw(vec![a, b, c]), expected);
    }

    #[test]
    fn root_is_order_sensitive() {
        let (a, b) = (leaf(b"a"), leaf(b"b"));
        assert_ne!(
            MerkleTree::from_raw(vec![a, b]),
            MerkleTree::from_raw(vec![b, a])
        );
    }
}
