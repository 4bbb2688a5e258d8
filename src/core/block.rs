//! Blocks, headers and consensus data with their canonical codec.
//!
//! The hashable part of a header is `version | prev_hash | merkle_root |
//! timestamp | index | next_consensus`; the full header appends a one-byte
//! separator and the witness. A block body carries a varuint
//! `contents_count = len(transactions) + 1`, the consensus data and the
//! transactions. The merkle root is computed over the consensus data hash
//! followed by the transaction hashes.

use crate::core::transaction::{Transaction, Witness};
use crate::types::encoding::{
    read_var_uint, write_var_uint, Decode, DecodeError, Encode, EncodeSink,
};
use crate::types::hash::{HashBuilder, Uint160, Uint256};
use crate::types::merkle_tree::MerkleTree;
use std::cmp::Ordering;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlockError {
    #[error("transaction duplication is not allowed")]
    DuplicateTransactions,
    #[error("MerkleRoot mismatch")]
    MerkleRootMismatch,
}

/// The header fields shared by full and trimmed blocks.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Base {
    pub version: u32,
    pub prev_hash: Uint256,
    pub merkle_root: Uint256,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub index: u32,
    pub next_consensus: Uint160,
    pub witness: Witness,
}

impl Base {
    /// Writes the fields covered by the block hash, excluding the witness.
    pub fn encode_hashable<S: EncodeSink>(&self, out: &mut S) {
        self.version.encode(out);
        self.prev_hash.encode(out);
        self.merkle_root.encode(out);
        self.timestamp.encode(out);
        self.index.encode(out);
        self.next_consensus.encode(out);
    }

    fn decode_hashable(input: &mut &[u8]) -> Result<Base, DecodeError> {
        Ok(Base {
            version: u32::decode(input)?,
            prev_hash: Uint256::decode(input)?,
            merkle_root: Uint256::decode(input)?,
            timestamp: u64::decode(input)?,
            index: u32::decode(input)?,
            next_consensus: Uint160::decode(input)?,
            witness: Witness::default(),
        })
    }

    /// Hash identity of the header: hash256 of the hashable fields.
    pub fn hash(&self) -> Uint256 {
        let mut builder = HashBuilder::new();
        self.encode_hashable(&mut builder);
        builder.finalize()
    }
}

impl Encode for Base {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.encode_hashable(out);
        1u8.encode(out);
        self.witness.encode(out);
    }
}

impl Decode for Base {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let mut base = Base::decode_hashable(input)?;
        if u8::decode(input)? != 1 {
            return Err(DecodeError::Format("format error: padding must equal 1"));
        }
        base.witness = Witness::decode(input)?;
        Ok(base)
    }
}

/// Primary index and nonce the consensus round commits to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConsensusData {
    pub primary_index: u32,
    pub nonce: u64,
}

impl ConsensusData {
    pub fn hash(&self) -> Uint256 {
        let mut builder = HashBuilder::new();
        self.encode(&mut builder);
        builder.finalize()
    }
}

impl Encode for ConsensusData {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        write_var_uint(out, self.primary_index as u64);
        self.nonce.encode(out);
    }
}

impl Decode for ConsensusData {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let primary = read_var_uint(input)?;
        let primary_index =
            u32::try_from(primary).map_err(|_| DecodeError::Format("invalid primary index"))?;
        Ok(ConsensusData {
            primary_index,
            nonce: u64::decode(input)?,
        })
    }
}

/// One block in the chain.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Block {
    pub base: Base,
    pub consensus_data: ConsensusData,
    pub transactions: Vec<Transaction>,
    /// True if this block was created from trimmed data and carries
    /// hash-only transaction stubs.
    pub trimmed: bool,
}

impl Block {
    /// Returns the header of this block.
    pub fn header(&self) -> Base {
        self.base.clone()
    }

    pub fn hash(&self) -> Uint256 {
        self.base.hash()
    }

    fn compute_merkle_root(&self) -> Uint256 {
        let mut hashes = Vec::with_capacity(self.transactions.len() + 1);
        hashes.push(self.consensus_data.hash());
        for tx in &self.transactions {
            hashes.push(tx.hash());
        }
        MerkleTree::from_raw(hashes)
    }

    /// Recomputes and stores the merkle root over the current contents.
    pub fn rebuild_merkle_root(&mut self) {
        self.base.merkle_root = self.compute_merkle_root();
    }

    /// Verifies the integrity of the block: unique transaction hashes and a
    /// merkle root matching the contents.
    pub fn verify(&self) -> Result<(), BlockError> {
        let mut seen = HashSet::new();
        for tx in &self.transactions {
            if !seen.insert(tx.hash()) {
                return Err(BlockError::DuplicateTransactions);
            }
        }
        if self.base.merkle_root != self.compute_merkle_root() {
            return Err(BlockError::MerkleRootMismatch);
        }
        Ok(())
    }

    /// Orders pending blocks by index.
    pub fn compare(&self, other: &Block) -> Ordering {
        self.base.index.cmp(&other.base.index)
    }

    /// Serializes the trimmed on-disk form: header, witness, content
    /// hashes, and the consensus data object at the tail (legacy layout).
    pub fn trim(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.base.encode_hashable(&mut out);
        1u8.encode(&mut out);
        self.base.witness.encode(&mut out);

        write_var_uint(&mut out, self.transactions.len() as u64 + 1);
        self.consensus_data.hash().encode(&mut out);
        for tx in &self.transactions {
            tx.hash().encode(&mut out);
        }
        self.consensus_data.encode(&mut out);
        out
    }

    /// Rebuilds a block from its trimmed form. Transactions come back as
    /// hash-only stubs and the block is flagged as trimmed.
    pub fn from_trimmed_bytes(data: &[u8]) -> Result<Block, DecodeError> {
        let input = &mut &data[..];
        let base = Base::decode(input)?;

        let mut block = Block {
            base,
            consensus_data: ConsensusData::default(),
            transactions: Vec::new(),
            trimmed: true,
        };

        let content_count = read_var_uint(input)?;
        if content_count > 0 {
            let _consensus_data_hash = Uint256::decode(input)?;
            let tx_count = content_count - 1;
            for _ in 0..tx_count {
                let hash = Uint256::decode(input)?;
                block.transactions.push(Transaction::new_trimmed(hash));
            }
            block.consensus_data = ConsensusData::decode(input)?;
        }

        Ok(block)
    }
}

impl Encode for Block {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.base.encode(out);
        write_var_uint(out, self.transactions.len() as u64 + 1);
        self.consensus_data.encode(out);
        for tx in &self.transactions {
            tx.encode(out);
        }
    }
}

impl Decode for Block {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let base = Base::decode(input)?;
        let contents_count = read_var_uint(input)?;
        if contents_count == 0 {
            return Err(DecodeError::Format("invalid block format"));
        }
        let consensus_data = ConsensusData::decode(input)?;
        let tx_count = contents_count - 1;
        let mut transactions = Vec::with_capacity(tx_count.min(0x10000) as usize);
        for _ in 0..tx_count {
            transactions.push(Transaction::decode(input)?);
        }

        let block = Block {
            base,
            consensus_data,
            transactions,
            trimmed: false,
        };
        // A decoded block is re-verified before it is accepted.
        block.verify().map_err(|e| match e {
            BlockError::DuplicateTransactions => {
                DecodeError::Format("transaction duplication is not allowed")
            }
            BlockError::MerkleRootMismatch => DecodeError::Format("MerkleRoot mismatch"),
        })?;
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::bytes::Bytes;
    use crate::types::fixed8::Fixed8;
    use crate::types::hash::hash160;
    use crate::utils::test_utils::utils::random_u256;

    fn sample_tx(data: u8) -> Transaction {
        let mut tx = Transaction::new(Bytes::new(vec![data]), Fixed8::zero());
        tx.sender = hash160(&[data]);
        tx
    }

    fn sample_block(index: u32, txs: Vec<Transaction>) -> Block {
        let mut block = Block {
            base: Base {
                version: 0,
                prev_hash: random_u256(),
                merkle_root: Uint256::zero(),
                timestamp: 1_468_595_301_000,
                index,
                next_consensus: hash160(b"consensus"),
                witness: Witness {
                    invocation: Bytes::default(),
                    verification: Bytes::new(vec![0x11]),
                },
            },
            consensus_data: ConsensusData {
                primary_index: 0,
                nonce: 2_083_236_893,
            },
            transactions: txs,
            trimmed: false,
        };
        block.rebuild_merkle_root();
        block
    }

    // ==================== Header ====================

    #[test]
    fn header_hash_excludes_witness() {
        let mut block = sample_block(1, vec![]);
        let before = block.hash();
        block.base.witness.invocation = Bytes::new(vec![9, 9, 9]);
        assert_eq!(block.hash(), before);
    }

    #[test]
    fn header_hash_covers_hashable_fields() {
        let mut block = sample_block(1, vec![]);
        let before = block.hash();
        block.base.index += 1;
        assert_ne!(block.hash(), before);
    }

    #[test]
    fn base_roundtrip() {
        let block = sample_block(7, vec![]);
        let encoded = block.base.to_bytes();
        assert_eq!(Base::from_bytes(&encoded).unwrap(), block.base);
    }

    #[test]
    fn base_rejects_bad_separator() {
        let block = sample_block(7, vec![]);
        let mut encoded = block.base.to_bytes();
        // The separator byte sits right after the hashable fields.
        let sep = 4 + 32 + 32 + 8 + 4 + 20;
        assert_eq!(encoded[sep], 1);
        encoded[sep] = 0;
        assert_eq!(
            Base::from_bytes(&encoded),
            Err(DecodeError::Format("format error: padding must equal 1"))
        );
    }

    // ==================== Consensus data ====================

    #[test]
    fn consensus_data_roundtrip() {
        let cd = ConsensusData {
            primary_index: 3,
            nonce: 0xDEADBEEF,
        };
        let encoded = cd.to_bytes();
        assert_eq!(ConsensusData::from_bytes(&encoded).unwrap(), cd);
    }

    #[test]
    fn consensus_data_hash_is_stable() {
        let cd = ConsensusData {
            primary_index: 0,
            nonce: 1,
        };
        assert_eq!(cd.hash(), cd.hash());
        assert_ne!(
            cd.hash(),
            ConsensusData {
                primary_index: 0,
                nonce: 2
            }
            .hash()
        );
    }

    // ==================== Verify ====================

    #[test]
    fn verify_accepts_consistent_block() {
        let block = sample_block(1, vec![sample_tx(1), sample_tx(2)]);
        assert!(block.verify().is_ok());
    }

    #[test]
    fn verify_rejects_duplicate_transactions() {
        let tx = sample_tx(1);
        let block = sample_block(1, vec![tx.clone(), tx]);
        assert_eq!(block.verify(), Err(BlockError::DuplicateTransactions));
    }

    #[test]
    fn verify_rejects_tampered_merkle_root() {
        let mut block = sample_block(1, vec![sample_tx(1)]);
        block.base.merkle_root = random_u256();
        assert_eq!(block.verify(), Err(BlockError::MerkleRootMismatch));
    }

    #[test]
    fn merkle_root_includes_consensus_data() {
        let mut block = sample_block(1, vec![]);
        let before = block.base.merkle_root;
        block.consensus_data.nonce += 1;
        block.rebuild_merkle_root();
        assert_ne!(block.base.merkle_root, before);
    }

    // ==================== Codec ====================

    #[test]
    fn roundtrip_verifies() {
        let block = sample_block(5, vec![sample_tx(1), sample_tx(2), sample_tx(3)]);
        let encoded = block.to_bytes();
        let decoded = Block::from_bytes(&encoded).unwrap();
        assert_eq!(decoded, block);
        assert!(decoded.verify().is_ok());
    }

    #[test]
    fn roundtrip_empty_block() {
        let block = sample_block(0, vec![]);
        let decoded = Block::from_bytes(&block.to_bytes()).unwrap();
        assert_eq!(decoded, block);
    }

    #[test]
    fn zero_contents_count_rejected() {
        let block = sample_block(1, vec![]);
        let mut encoded = Vec::new();
        block.base.encode(&mut encoded);
        write_var_uint(&mut encoded, 0);
        assert_eq!(
            Block::from_bytes(&encoded),
            Err(DecodeError::Format("invalid block format"))
        );
    }

    #[test]
    fn decode_rejects_merkle_mismatch() {
        let mut block = sample_block(1, vec![sample_tx(1)]);
        block.base.merkle_root = random_u256();
        let encoded = block.to_bytes();
        assert_eq!(
            Block::from_bytes(&encoded),
            Err(DecodeError::Format("MerkleRoot mismatch"))
        );
    }

    #[test]
    fn decode_fails_on_truncated_input() {
        let block = sample_block(1, vec![sample_tx(1)]);
        let encoded = block.to_bytes();
        for cut in [0, 10, encoded.len() / 2, encoded.len() - 1] {
            assert!(Block::from_bytes(&encoded[..cut]).is_err());
        }
    }

    #[test]
    fn encoding_is_deterministic() {
        let block = sample_block(2, vec![sample_tx(1)]);
        assert_eq!(block.to_bytes(), block.to_bytes());
    }

    // ==================== Trimmed form ====================

    #[test]
    fn trimmed_roundtrip_preserves_base_and_tx_hashes() {
        let block = sample_block(9, vec![sample_tx(1), sample_tx(2)]);
        let trimmed = Block::from_trimmed_bytes(&block.trim()).unwrap();

        assert!(trimmed.trimmed);
        assert_eq!(trimmed.base, block.base);
        assert_eq!(trimmed.consensus_data, block.consensus_data);
        assert_eq!(trimmed.transactions.len(), 2);
        for (stub, tx) in trimmed.transactions.iter().zip(&block.transactions) {
            assert!(stub.is_trimmed());
            assert_eq!(stub.hash(), tx.hash());
        }
    }

    #[test]
    fn trimmed_block_verifies() {
        let block = sample_block(9, vec![sample_tx(1), sample_tx(2)]);
        let trimmed = Block::from_trimmed_bytes(&block.trim()).unwrap();
        assert!(trimmed.verify().is_ok());
    }

    // ==================== Ordering ====================

    #[test]
    fn compare_orders_by_index() {
        let five = sample_block(5, vec![]);
        let three = sample_block(3, vec![]);
        assert_eq!(five.compare(&three), Ordering::Greater);
        assert_eq!(three.compare(&five), Ordering::Less);
        assert_eq!(five.compare(&sample_block(5, vec![])), Ordering::Equal);
    }
}
