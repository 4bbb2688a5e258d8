//! Transactions, witnesses and attributes with their canonical codec.

use crate::types::bytes::Bytes;
use crate::types::encoding::{
    read_bytes, read_var_bytes_max, read_var_uint, write_var_bytes, Decode, DecodeError, Encode,
    EncodeSink,
};
use crate::types::fixed8::Fixed8;
use crate::types::hash::{hash160, HashBuilder, Uint160, Uint256};

/// Maximum number of attributes on a transaction.
pub const MAX_TRANSACTION_ATTRIBUTES: usize = 16;
/// Maximum number of witnesses on a transaction.
pub const MAX_TRANSACTION_WITNESSES: usize = 16;
/// Maximum length of variable-length attribute data.
pub const MAX_ATTRIBUTE_DATA: usize = 65535;

macro_rules! attr_usages {
    ($($name:ident = $value:expr;)*) => {
        /// One-byte attribute usage enumeration. The values are wire-level
        /// sentinels and must never change.
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum AttrUsage {
            $($name = $value,)*
        }

        impl TryFrom<u8> for AttrUsage {
            type Error = u8;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok(AttrUsage::$name),)*
                    other => Err(other),
                }
            }
        }
    };
}

attr_usages! {
    ContractHash = 0x00;
    Ecdh02 = 0x02;
    Ecdh03 = 0x03;
    Vote = 0x30;
    CertUrl = 0x80;
    DescriptionUrl = 0x81;
    Description = 0x90;
    Hash1 = 0xA1;
    Hash2 = 0xA2;
    Hash3 = 0xA3;
    Hash4 = 0xA4;
    Hash5 = 0xA5;
    Hash6 = 0xA6;
    Hash7 = 0xA7;
    Hash8 = 0xA8;
    Hash9 = 0xA9;
    Hash10 = 0xAA;
    Hash11 = 0xAB;
    Hash12 = 0xAC;
    Hash13 = 0xAD;
    Hash14 = 0xAE;
    Hash15 = 0xAF;
    Remark = 0xF0;
    Remark1 = 0xF1;
    Remark2 = 0xF2;
    Remark3 = 0xF3;
    Remark4 = 0xF4;
    Remark5 = 0xF5;
    Remark6 = 0xF6;
    Remark7 = 0xF7;
    Remark8 = 0xF8;
    Remark9 = 0xF9;
    Remark10 = 0xFA;
    Remark11 = 0xFB;
    Remark12 = 0xFC;
    Remark13 = 0xFD;
    Remark14 = 0xFE;
    Remark15 = 0xFF;
}

impl AttrUsage {
    /// Usages in the 32-byte class carry a fixed-length hash slot instead
    /// of a length-prefixed payload.
    pub fn is_fixed32(self) -> bool {
        matches!(self, AttrUsage::ContractHash | AttrUsage::Vote)
            || matches!(self, AttrUsage::Ecdh02 | AttrUsage::Ecdh03)
            || (AttrUsage::Hash1 as u8..=AttrUsage::Hash15 as u8).contains(&(self as u8))
    }
}

/// A usage-tagged transaction attribute. The core preserves the data but
/// attaches no semantics beyond the wire length rules.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attribute {
    pub usage: AttrUsage,
    pub data: Vec<u8>,
}

impl Encode for Attribute {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(&[self.usage as u8]);
        if self.usage.is_fixed32() {
            out.write(&self.data);
        } else {
            write_var_bytes(out, &self.data);
        }
    }
}

impl Decode for Attribute {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let byte = u8::decode(input)?;
        let usage =
            AttrUsage::try_from(byte).map_err(|_| DecodeError::Format("invalid attribute usage"))?;
        let data = if usage.is_fixed32() {
            read_bytes(input, 32)?.to_vec()
        } else {
            read_var_bytes_max(input, MAX_ATTRIBUTE_DATA)?
        };
        Ok(Attribute { usage, data })
    }
}

/// Invocation and verification scripts authorizing a transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Witness {
    pub invocation: Bytes,
    pub verification: Bytes,
}

impl Witness {
    /// The identity of a witness is the hash160 of its verification script.
    pub fn script_hash(&self) -> Uint160 {
        hash160(&self.verification)
    }
}

impl Encode for Witness {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.invocation.encode(out);
        self.verification.encode(out);
    }
}

impl Decode for Witness {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Witness {
            invocation: Bytes::decode(input)?,
            verification: Bytes::decode(input)?,
        })
    }
}

/// A transaction. The hash covers the signed part only, which is everything
/// before the witnesses.
#[derive(Clone, Debug, PartialEq)]
pub struct Transaction {
    pub version: u8,
    pub nonce: u32,
    pub sender: Uint160,
    pub sys_fee: Fixed8,
    pub net_fee: Fixed8,
    pub valid_until_block: u32,
    pub attributes: Vec<Attribute>,
    pub script: Bytes,
    pub witnesses: Vec<Witness>,
    /// Set only on trimmed stubs, where the full signed part is not
    /// available and the hash is taken from storage.
    stub_hash: Option<Uint256>,
}

impl Transaction {
    /// Creates a transaction around the given script, charging `gas` as
    /// its system fee.
    pub fn new(script: Bytes, gas: Fixed8) -> Transaction {
        Transaction {
            version: 0,
            nonce: 0,
            sender: Uint160::zero(),
            sys_fee: gas,
            net_fee: Fixed8::zero(),
            valid_until_block: 0,
            attributes: Vec::new(),
            script,
            witnesses: Vec::new(),
            stub_hash: None,
        }
    }

    /// Creates the placeholder transaction a trimmed block carries: only
    /// the hash is meaningful.
    pub fn new_trimmed(hash: Uint256) -> Transaction {
        let mut tx = Transaction::new(Bytes::default(), Fixed8::zero());
        tx.stub_hash = Some(hash);
        tx
    }

    pub fn is_trimmed(&self) -> bool {
        self.stub_hash.is_some()
    }

    /// Hash256 of the signed part.
    pub fn hash(&self) -> Uint256 {
        if let Some(hash) = self.stub_hash {
            return hash;
        }
        let mut builder = HashBuilder::new();
        self.encode_signed(&mut builder);
        builder.finalize()
    }

    /// Encodes the pre-witness fields, i.e. the part signatures cover.
    pub fn encode_signed<S: EncodeSink>(&self, out: &mut S) {
        self.version.encode(out);
        self.nonce.encode(out);
        self.sender.encode(out);
        self.sys_fee.encode(out);
        self.net_fee.encode(out);
        self.valid_until_block.encode(out);
        self.attributes.encode(out);
        self.script.encode(out);
    }
}

impl Encode for Transaction {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.encode_signed(out);
        self.witnesses.encode(out);
    }
}

impl Decode for Transaction {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let version = u8::decode(input)?;
        let nonce = u32::decode(input)?;
        let sender = Uint160::decode(input)?;
        let sys_fee = Fixed8::decode(input)?;
        let net_fee = Fixed8::decode(input)?;
        let valid_until_block = u32::decode(input)?;

        let attr_count = read_var_uint(input)?;
        if attr_count > MAX_TRANSACTION_ATTRIBUTES as u64 {
            return Err(DecodeError::Format("too many attributes"));
        }
        let mut attributes = Vec::with_capacity(attr_count as usize);
        for _ in 0..attr_count {
            attributes.push(Attribute::decode(input)?);
        }

        let script = Bytes::decode(input)?;
        if script.is_empty() {
            return Err(DecodeError::Format("transaction has no script"));
        }

        let witness_count = read_var_uint(input)?;
        if witness_count > MAX_TRANSACTION_WITNESSES as u64 {
            return Err(DecodeError::Format("too many witnesses"));
        }
        let mut witnesses = Vec::with_capacity(witness_count as usize);
        for _ in 0..witness_count {
            witnesses.push(Witness::decode(input)?);
        }

        Ok(Transaction {
            version,
            nonce,
            sender,
            sys_fee,
            net_fee,
            valid_until_block,
            attributes,
            script,
            witnesses,
            stub_hash: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::hash::{hash160, hash256};

    fn sample_tx() -> Transaction {
        let mut tx = Transaction::new(Bytes::new(vec![0x11]), Fixed8::from_int64(1));
        tx.nonce = 42;
        tx.sender = hash160(b"sender");
        tx.net_fee = Fixed8(1234);
        tx.valid_until_block = 100;
        tx.attributes = vec![
            Attribute {
                usage: AttrUsage::Description,
                data: b"hello".to_vec(),
            },
            Attribute {
                usage: AttrUsage::Hash1,
                data: hash256(b"slot").to_vec(),
            },
        ];
        tx.witnesses = vec![Witness {
            invocation: Bytes::new(vec![1, 2]),
            verification: Bytes::new(vec![3, 4]),
        }];
        tx
    }

    #[test]
    fn roundtrip() {
        let tx = sample_tx();
        let encoded = tx.to_bytes();
        let decoded = Transaction::from_bytes(&encoded).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(decoded.hash(), tx.hash());
    }

    #[test]
    fn hash_ignores_witnesses() {
        let mut tx = sample_tx();
        let before = tx.hash();
        tx.witnesses.clear();
        assert_eq!(tx.hash(), before);
    }

    #[test]
    fn hash_covers_signed_fields() {
        let mut tx = sample_tx();
        let before = tx.hash();
        tx.nonce += 1;
        assert_ne!(tx.hash(), before);
    }

    #[test]
    fn empty_script_rejected() {
        let mut tx = sample_tx();
        tx.script = Bytes::default();
        let encoded = tx.to_bytes();
        assert_eq!(
            Transaction::from_bytes(&encoded),
            Err(DecodeError::Format("transaction has no script"))
        );
    }

    #[test]
    fn attribute_count_bounded() {
        let mut tx = sample_tx();
        tx.attributes = (0..MAX_TRANSACTION_ATTRIBUTES + 1)
            .map(|_| Attribute {
                usage: AttrUsage::Remark,
                data: vec![],
            })
            .collect();
        let encoded = tx.to_bytes();
        assert_eq!(
            Transaction::from_bytes(&encoded),
            Err(DecodeError::Format("too many attributes"))
        );
    }

    #[test]
    fn trimmed_stub_reports_fixed_hash() {
        let hash = hash256(b"trimmed");
        let tx = Transaction::new_trimmed(hash);
        assert!(tx.is_trimmed());
        assert_eq!(tx.hash(), hash);
    }

    // ==================== Attributes ====================

    #[test]
    fn fixed32_usages() {
        assert!(AttrUsage::ContractHash.is_fixed32());
        assert!(AttrUsage::Vote.is_fixed32());
        assert!(AttrUsage::Hash1.is_fixed32());
        assert!(AttrUsage::Hash15.is_fixed32());
        assert!(AttrUsage::Ecdh02.is_fixed32());
        assert!(!AttrUsage::Description.is_fixed32());
        assert!(!AttrUsage::Remark15.is_fixed32());
    }

    #[test]
    fn usage_byte_values() {
        assert_eq!(AttrUsage::ContractHash as u8, 0);
        assert_eq!(AttrUsage::Vote as u8, 48);
        assert_eq!(AttrUsage::CertUrl as u8, 128);
        assert_eq!(AttrUsage::DescriptionUrl as u8, 129);
        assert_eq!(AttrUsage::Description as u8, 144);
        assert_eq!(AttrUsage::Hash1 as u8, 161);
        assert_eq!(AttrUsage::Hash15 as u8, 175);
        assert_eq!(AttrUsage::Remark as u8, 240);
        assert_eq!(AttrUsage::Remark15 as u8, 255);
    }

    #[test]
    fn fixed32_attribute_wire_form() {
        let attr = Attribute {
            usage: AttrUsage::Vote,
            data: hash256(b"v").to_vec(),
        };
        let encoded = attr.to_bytes();
        // Usage byte plus raw 32 bytes, no length prefix.
        assert_eq!(encoded.len(), 33);
        assert_eq!(Attribute::from_bytes(&encoded).unwrap(), attr);
    }

    #[test]
    fn var_attribute_wire_form() {
        let attr = Attribute {
            usage: AttrUsage::Remark3,
            data: b"note".to_vec(),
        };
        let encoded = attr.to_bytes();
        assert_eq!(encoded.len(), 1 + 1 + 4);
        assert_eq!(Attribute::from_bytes(&encoded).unwrap(), attr);
    }

    #[test]
    fn unknown_usage_rejected() {
        assert_eq!(
            Attribute::from_bytes(&[0x01, 0x00]),
            Err(DecodeError::Format("invalid attribute usage"))
        );
    }

    // ==================== Witness ====================

    #[test]
    fn witness_script_hash_is_hash160_of_verification() {
        let w = Witness {
            invocation: Bytes::new(vec![1]),
            verification: Bytes::new(vec![2, 3]),
        };
        assert_eq!(w.script_hash(), hash160(&[2, 3]));
    }

    #[test]
    fn witness_roundtrip() {
        let w = Witness {
            invocation: Bytes::new(vec![1, 2, 3]),
            verification: Bytes::new(vec![4]),
        };
        let encoded = w.to_bytes();
        assert_eq!(Witness::from_bytes(&encoded).unwrap(), w);
    }
}
