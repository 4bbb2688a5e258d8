//! Fixed-size digests and the chain hash functions.
//!
//! `hash256(x) = SHA256(SHA256(x))` identifies blocks and transactions;
//! `hash160(x) = RIPEMD160(SHA256(x))` identifies scripts and accounts.
//! Both digest types display as hex in reversed (little-endian) byte order,
//! which is the order clients see.

use crate::types::encoding::{read_bytes, Decode, DecodeError, Encode, EncodeSink};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};
use std::fmt;

/// Length of a 256-bit digest in bytes.
pub const UINT256_SIZE: usize = 32;
/// Length of a 160-bit digest in bytes.
pub const UINT160_SIZE: usize = 20;

/// 256-bit digest identifying blocks and transactions.
///
/// `Copy` on purpose: hashes are passed around constantly during block
/// validation and are cheaper to copy than to reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Hash, Ord, PartialOrd)]
pub struct Uint256(pub [u8; UINT256_SIZE]);

/// 160-bit digest identifying scripts, contracts and accounts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Hash, Ord, PartialOrd)]
pub struct Uint160(pub [u8; UINT160_SIZE]);

macro_rules! digest_common {
    ($t:ident, $len:expr) => {
        impl $t {
            /// The all-zero digest, used as a sentinel for genesis links.
            pub const fn zero() -> $t {
                $t([0u8; $len])
            }

            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|&b| b == 0)
            }

            pub const fn as_slice(&self) -> &[u8] {
                &self.0
            }

            pub fn to_vec(self) -> Vec<u8> {
                self.0.to_vec()
            }

            /// Creates a digest from a byte slice of exactly the right length.
            pub fn from_slice(slice: &[u8]) -> Option<$t> {
                if slice.len() != $len {
                    return None;
                }
                let mut bytes = [0u8; $len];
                bytes.copy_from_slice(slice);
                Some($t(bytes))
            }
        }

        impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let mut reversed = self.0;
                reversed.reverse();
                write!(f, "{}", hex::encode(reversed))
            }
        }

        impl Encode for $t {
            fn encode<S: EncodeSink>(&self, out: &mut S) {
                out.write(&self.0);
            }
        }

        impl Decode for $t {
            fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
                let bytes = read_bytes(input, $len)?;
                Ok($t(bytes.try_into().unwrap()))
            }
        }
    };
}

digest_common!(Uint256, UINT256_SIZE);
digest_common!(Uint160, UINT160_SIZE);

/// Computes `SHA256(SHA256(data))`.
pub fn hash256(data: &[u8]) -> Uint256 {
    let first = Sha256::digest(data);
    Uint256(Sha256::digest(first).into())
}

/// Computes `RIPEMD160(SHA256(data))`.
pub fn hash160(data: &[u8]) -> Uint160 {
    let first = Sha256::digest(data);
    Uint160(Ripemd160::digest(first).into())
}

/// Incremental double-SHA256 builder.
///
/// Implements [`EncodeSink`], so hashable encodings stream straight into the
/// digest without an intermediate buffer.
pub struct HashBuilder {
    hasher: Sha256,
}

impl HashBuilder {
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Consumes the builder and returns the double-SHA256 digest.
    pub fn finalize(self) -> Uint256 {
        Uint256(Sha256::digest(self.hasher.finalize()).into())
    }
}

impl Default for HashBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EncodeSink for HashBuilder {
    fn write(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }
}
