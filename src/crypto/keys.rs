//! Compressed secp256r1 public keys.
//!
//! The core never signs or verifies anything itself; it only embeds encoded
//! points into standard verification scripts (signature and multisig
//! contracts) and derives the consensus address from them.

use crate::types::encoding::{read_bytes, Decode, DecodeError, Encode, EncodeSink};
use std::fmt;
use thiserror::Error;

/// Length of a SEC1 compressed point.
pub const PUBLIC_KEY_SIZE: usize = 33;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("public key must be {PUBLIC_KEY_SIZE} bytes, got {0}")]
    InvalidLength(usize),
    #[error("bytes do not encode a point on the curve")]
    NotOnCurve,
}

/// A validated SEC1 compressed secp256r1 public key.
///
/// Stored in its 33-byte encoded form; construction verifies the bytes
/// decode to a point on the curve. Ordering is by encoded bytes, which is
/// the order multisig redeem scripts list their keys in.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PublicKey {
    bytes: [u8; PUBLIC_KEY_SIZE],
}

impl PublicKey {
    /// Parses and validates a compressed point.
    pub fn from_bytes(bytes: &[u8]) -> Result<PublicKey, KeyError> {
        if bytes.len() != PUBLIC_KEY_SIZE {
            return Err(KeyError::InvalidLength(bytes.len()));
        }
        p256::PublicKey::from_sec1_bytes(bytes).map_err(|_| KeyError::NotOnCurve)?;
        Ok(PublicKey {
            bytes: bytes.try_into().unwrap(),
        })
    }

    /// Parses a hex-encoded compressed point.
    pub fn from_hex(s: &str) -> Result<PublicKey, KeyError> {
        let bytes = hex::decode(s).map_err(|_| KeyError::NotOnCurve)?;
        Self::from_bytes(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.bytes
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.bytes))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.bytes))
    }
}

impl Encode for PublicKey {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(&self.bytes);
    }
}

impl Decode for PublicKey {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let bytes = read_bytes(input, PUBLIC_KEY_SIZE)?;
        PublicKey::from_bytes(bytes).map_err(|_| DecodeError::InvalidValue)
    }
}
