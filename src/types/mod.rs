//! Fundamental wire types shared across the node.
//!
//! - `encoding`: deterministic binary serialization traits and varint helpers
//! - `bytes`: reference-counted byte buffers for scripts and payloads
//! - `hash`: `Uint160`/`Uint256` digests and the chain hash functions
//! - `fixed8`: 10⁻⁸ fixed-point scalar for fees and balances
//! - `merkle_tree`: merkle root construction over transaction hashes

pub mod bytes;
pub mod encoding;
pub mod fixed8;
pub mod hash;
pub mod merkle_tree;
