//! On-chain state objects: contract state, manifests, storage items and
//! accounts.
//!
//! Manifests travel as varbytes-wrapped JSON documents; everything else
//! uses the binary codec.

use crate::types::bytes::Bytes;
use crate::types::encoding::{
    read_var_bytes, read_var_bytes_max, write_var_bytes, Decode, DecodeError, Encode, EncodeSink,
};
use crate::types::fixed8::Fixed8;
use crate::types::hash::{hash160, Uint160, Uint256};
use crate::virtual_machine::stack_item::StackItem;
use serde::de::{SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Maximum size of a serialized contract manifest.
pub const MAX_MANIFEST_SIZE: usize = 2048;

/// Feature flags of a deployed contract.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Features {
    pub storage: bool,
    pub payable: bool,
}

/// Target of a call permission: any contract, or one specific script hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PermissionContract {
    Wildcard,
    Hash(Uint160),
}

impl PermissionContract {
    fn matches(&self, hash: &Uint160) -> bool {
        match self {
            PermissionContract::Wildcard => true,
            PermissionContract::Hash(allowed) => allowed == hash,
        }
    }
}

impl Serialize for PermissionContract {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PermissionContract::Wildcard => serializer.serialize_str("*"),
            PermissionContract::Hash(hash) => serializer.serialize_str(&format!("0x{hash}")),
        }
    }
}

impl<'de> Deserialize<'de> for PermissionContract {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        if value == "*" {
            return Ok(PermissionContract::Wildcard);
        }
        let trimmed = value.strip_prefix("0x").unwrap_or(&value);
        let mut bytes = hex::decode(trimmed)
            .map_err(|_| serde::de::Error::custom("invalid contract hash"))?;
        bytes.reverse();
        Uint160::from_slice(&bytes)
            .map(PermissionContract::Hash)
            .ok_or_else(|| serde::de::Error::custom("invalid contract hash length"))
    }
}

/// Methods covered by a permission: all of them, or a fixed list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WildcardMethods {
    Wildcard,
    List(Vec<String>),
}

impl WildcardMethods {
    fn contains(&self, method: &str) -> bool {
        match self {
            WildcardMethods::Wildcard => true,
            WildcardMethods::List(methods) => methods.iter().any(|m| m == method),
        }
    }
}

impl Serialize for WildcardMethods {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            WildcardMethods::Wildcard => serializer.serialize_str("*"),
            WildcardMethods::List(methods) => methods.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for WildcardMethods {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MethodsVisitor;

        impl<'de> Visitor<'de> for MethodsVisitor {
            type Value = WildcardMethods;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("\"*\" or a list of method names")
            }

            fn visit_str<E: serde::de::Error>(self, value: &str) -> Result<Self::Value, E> {
                if value == "*" {
                    Ok(WildcardMethods::Wildcard)
                } else {
                    Err(E::custom("only \"*\" is a valid method string"))
                }
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut methods = Vec::new();
                while let Some(method) = seq.next_element::<String>()? {
                    methods.push(method);
                }
                Ok(WildcardMethods::List(methods))
            }
        }

        deserializer.deserialize_any(MethodsVisitor)
    }
}

/// One entry of a manifest permission list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Permission {
    pub contract: PermissionContract,
    pub methods: WildcardMethods,
}

/// Declarative metadata of a deployed contract.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub features: Features,
    pub permissions: Vec<Permission>,
}

impl Manifest {
    /// A manifest with the given features that may call anything.
    pub fn new(features: Features) -> Manifest {
        Manifest {
            features,
            permissions: vec![Permission {
                contract: PermissionContract::Wildcard,
                methods: WildcardMethods::Wildcard,
            }],
        }
    }

    /// Returns true if a contract carrying this manifest may call `method`
    /// on the contract identified by `callee_hash`.
    pub fn can_call(&self, callee_hash: &Uint160, method: &str) -> bool {
        self.permissions
            .iter()
            .any(|p| p.contract.matches(callee_hash) && p.methods.contains(method))
    }
}

impl Encode for Manifest {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        let json = serde_json::to_vec(self).expect("manifest serialization is infallible");
        write_var_bytes(out, &json);
    }
}

impl Decode for Manifest {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let json = read_var_bytes_max(input, MAX_MANIFEST_SIZE)?;
        serde_json::from_slice(&json).map_err(|_| DecodeError::Format("invalid manifest"))
    }
}

/// State of a deployed contract.
#[derive(Clone, Debug, PartialEq)]
pub struct Contract {
    /// Stable numeric id, preserved across migrations.
    pub id: i32,
    pub script: Bytes,
    pub manifest: Manifest,
}

impl Contract {
    /// Creates contract state for a fresh deployment.
    ///
    /// The id is derived from the script hash, which keeps it deterministic
    /// without a deployment counter; migration copies it to the new state.
    pub fn new(script: Bytes, manifest: Manifest) -> Contract {
        let hash = hash160(&script);
        Contract {
            id: i32::from_le_bytes(hash.0[..4].try_into().unwrap()),
            script,
            manifest,
        }
    }

    pub fn script_hash(&self) -> Uint160 {
        hash160(&self.script)
    }

    pub fn has_storage(&self) -> bool {
        self.manifest.features.storage
    }

    pub fn is_payable(&self) -> bool {
        self.manifest.features.payable
    }
}

/// A single contract storage entry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StorageItem {
    pub value: Vec<u8>,
    /// Constant items can never be overwritten or deleted.
    pub is_const: bool,
}

impl Encode for StorageItem {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        write_var_bytes(out, &self.value);
        self.is_const.encode(out);
    }
}

impl Decode for StorageItem {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(StorageItem {
            value: read_var_bytes(input)?,
            is_const: bool::decode(input)?,
        })
    }
}

/// Account state: a script hash and its per-asset balances.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Account {
    pub script_hash: Uint160,
    pub balances: BTreeMap<Uint256, Fixed8>,
}

impl Account {
    pub fn new(script_hash: Uint160) -> Account {
        Account {
            script_hash,
            balances: BTreeMap::new(),
        }
    }

    /// Balance of the given asset; zero when the asset is absent.
    pub fn balance(&self, asset_id: &Uint256) -> Fixed8 {
        self.balances.get(asset_id).copied().unwrap_or_default()
    }
}

/// A notification emitted by a running script, drained by the host when the
/// invocation returns.
#[derive(Clone, Debug)]
pub struct NotificationEvent {
    pub script_hash: Uint160,
    pub item: StackItem,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::hash::hash160;

    fn contract_hash(seed: &[u8]) -> Uint160 {
        hash160(seed)
    }

    // ==================== Manifest ====================

    #[test]
    fn default_manifest_allows_everything() {
        let m = Manifest::new(Features::default());
        assert!(m.can_call(&contract_hash(b"x"), "anything"));
    }

    #[test]
    fn hash_permission_limits_target() {
        let allowed = contract_hash(b"allowed");
        let m = Manifest {
            features: Features::default(),
            permissions: vec![Permission {
                contract: PermissionContract::Hash(allowed),
                methods: WildcardMethods::Wildcard,
            }],
        };
        assert!(m.can_call(&allowed, "transfer"));
        assert!(!m.can_call(&contract_hash(b"other"), "transfer"));
    }

    #[test]
    fn method_list_limits_methods() {
        let m = Manifest {
            features: Features::default(),
            permissions: vec![Permission {
                contract: PermissionContract::Wildcard,
                methods: WildcardMethods::List(vec!["transfer".into()]),
            }],
        };
        let target = contract_hash(b"t");
        assert!(m.can_call(&target, "transfer"));
        assert!(!m.can_call(&target, "mint"));
    }

    #[test]
    fn empty_permissions_deny_all() {
        let m = Manifest {
            features: Features::default(),
            permissions: vec![],
        };
        assert!(!m.can_call(&contract_hash(b"t"), "transfer"));
    }

    #[test]
    fn manifest_json_roundtrip() {
        let m = Manifest {
            features: Features {
                storage: true,
                payable: false,
            },
            permissions: vec![
                Permission {
                    contract: PermissionContract::Hash(contract_hash(b"callee")),
                    methods: WildcardMethods::List(vec!["a".into(), "b".into()]),
                },
                Permission {
                    contract: PermissionContract::Wildcard,
                    methods: WildcardMethods::Wildcard,
                },
            ],
        };
        let encoded = m.to_bytes();
        assert_eq!(Manifest::from_bytes(&encoded).unwrap(), m);
    }

    #[test]
    fn manifest_wire_form_is_json() {
        let m = Manifest::new(Features::default());
        let encoded = m.to_bytes();
        // varbytes prefix, then a JSON document.
        let json = &encoded[1..];
        assert_eq!(json[0], b'{');
        assert!(serde_json::from_slice::<Manifest>(json).is_ok());
    }

    #[test]
    fn oversized_manifest_rejected() {
        let m = Manifest {
            features: Features::default(),
            permissions: (0..200)
                .map(|i| Permission {
                    contract: PermissionContract::Hash(contract_hash(&[i as u8])),
                    methods: WildcardMethods::Wildcard,
                })
                .collect(),
        };
        let encoded = m.to_bytes();
        assert!(Manifest::from_bytes(&encoded).is_err());
    }

    // ==================== Contract ====================

    #[test]
    fn contract_id_is_deterministic() {
        let script = Bytes::new(vec![1, 2, 3]);
        let a = Contract::new(script.clone(), Manifest::new(Features::default()));
        let b = Contract::new(script, Manifest::new(Features::default()));
        assert_eq!(a.id, b.id);
        assert_eq!(a.script_hash(), b.script_hash());
    }

    #[test]
    fn feature_accessors() {
        let c = Contract::new(
            Bytes::new(vec![1]),
            Manifest::new(Features {
                storage: true,
                payable: false,
            }),
        );
        assert!(c.has_storage());
        assert!(!c.is_payable());
    }

    // ==================== StorageItem / Account ====================

    #[test]
    fn storage_item_roundtrip() {
        let item = StorageItem {
            value: b"payload".to_vec(),
            is_const: true,
        };
        let encoded = item.to_bytes();
        assert_eq!(StorageItem::from_bytes(&encoded).unwrap(), item);
    }

    #[test]
    fn missing_asset_balance_is_zero() {
        let account = Account::new(contract_hash(b"acc"));
        assert_eq!(account.balance(&Uint256::zero()), Fixed8::zero());
    }
}
