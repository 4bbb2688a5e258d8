//! Binary codec for runtime stack items.
//!
//! This codec is separate from the object codecs: it backs
//! `Runtime.Serialize`/`Runtime.Deserialize` and notification sanity checks.
//! Containers are written with a varuint length; the encoder tracks
//! container identities and fails on re-entry, so recursive structures
//! (which can be built at runtime) never reach the wire. Interop handles
//! are never serializable.

use crate::types::encoding::{read_var_bytes, read_var_uint, write_var_bytes, write_var_uint,
    DecodeError, EncodeSink,
};
use crate::virtual_machine::stack_item::{big_int_from_bytes, big_int_to_bytes, StackItem};
use std::collections::HashSet;
use std::rc::Rc;
use thiserror::Error;

// Wire tags of the serialized item types.
const TAG_BOOLEAN: u8 = 0x20;
const TAG_INTEGER: u8 = 0x21;
const TAG_BYTE_ARRAY: u8 = 0x28;
const TAG_BUFFER: u8 = 0x30;
const TAG_ARRAY: u8 = 0x40;
const TAG_STRUCT: u8 = 0x41;
const TAG_MAP: u8 = 0x48;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ItemSerializationError {
    #[error("recursive structures can't be serialized")]
    Recursive,
    #[error("interop item can't be serialized")]
    Interop,
}

/// Encodes the given item into a byte buffer.
pub fn serialize_item(item: &StackItem) -> Result<Vec<u8>, ItemSerializationError> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    serialize_item_to(item, &mut out, &mut seen)?;
    Ok(out)
}

fn serialize_item_to(
    item: &StackItem,
    out: &mut Vec<u8>,
    seen: &mut HashSet<usize>,
) -> Result<(), ItemSerializationError> {
    match item {
        StackItem::ByteArray(bytes) => {
            out.write(&[TAG_BYTE_ARRAY]);
            write_var_bytes(out, bytes);
        }
        StackItem::Buffer(bytes) => {
            out.write(&[TAG_BUFFER]);
            write_var_bytes(out, &bytes.borrow());
        }
        StackItem::Bool(v) => {
            out.write(&[TAG_BOOLEAN, *v as u8]);
        }
        StackItem::Integer(n) => {
            out.write(&[TAG_INTEGER]);
            write_var_bytes(out, &big_int_to_bytes(n));
        }
        StackItem::Interop(_) => return Err(ItemSerializationError::Interop),
        StackItem::Array(items) | StackItem::Struct(items) => {
            if !seen.insert(Rc::as_ptr(items) as usize) {
                return Err(ItemSerializationError::Recursive);
            }
            let tag = if matches!(item, StackItem::Array(_)) {
                TAG_ARRAY
            } else {
                TAG_STRUCT
            };
            out.write(&[tag]);
            let items = items.borrow();
            write_var_uint(out, items.len() as u64);
            for element in items.iter() {
                serialize_item_to(element, out, seen)?;
            }
        }
        StackItem::Map(entries) => {
            if !seen.insert(Rc::as_ptr(entries) as usize) {
                return Err(ItemSerializationError::Recursive);
            }
            out.write(&[TAG_MAP]);
            let entries = entries.borrow();
            write_var_uint(out, entries.len() as u64);
            for (key, value) in entries.iter() {
                serialize_item_to(key, out, seen)?;
                serialize_item_to(value, out, seen)?;
            }
        }
    }
    Ok(())
}

/// Decodes an item from a byte slice, requiring all bytes to be consumed.
pub fn deserialize_item(data: &[u8]) -> Result<StackItem, DecodeError> {
    let mut input = data;
    let item = decode_item(&mut input)?;
    if !input.is_empty() {
        return Err(DecodeError::InvalidValue);
    }
    Ok(item)
}

/// Decodes a single item from the cursor.
pub fn decode_item(input: &mut &[u8]) -> Result<StackItem, DecodeError> {
    let tag = crate::types::encoding::read_bytes(input, 1)?[0];
    match tag {
        TAG_BYTE_ARRAY => Ok(StackItem::ByteArray(read_var_bytes(input)?)),
        TAG_BUFFER => Ok(StackItem::new_buffer(read_var_bytes(input)?)),
        TAG_BOOLEAN => {
            let byte = crate::types::encoding::read_bytes(input, 1)?[0];
            Ok(StackItem::Bool(byte != 0))
        }
        TAG_INTEGER => Ok(StackItem::Integer(big_int_from_bytes(&read_var_bytes(
            input,
        )?))),
        TAG_ARRAY | TAG_STRUCT => {
            let size = read_var_uint(input)?;
            let mut items = Vec::with_capacity(size.min(0x10000) as usize);
            for _ in 0..size {
                items.push(decode_item(input)?);
            }
            if tag == TAG_ARRAY {
                Ok(StackItem::new_array(items))
            } else {
                Ok(StackItem::new_struct(items))
            }
        }
        TAG_MAP => {
            let size = read_var_uint(input)?;
            let mut entries = Vec::with_capacity(size.min(0x10000) as usize);
            for _ in 0..size {
                let key = decode_item(input)?;
                if !key.is_valid_map_key() {
                    return Err(DecodeError::Format("invalid map key type"));
                }
                let value = decode_item(input)?;
                entries.push((key, value));
            }
            Ok(StackItem::new_map(entries))
        }
        _ => Err(DecodeError::Format("unknown type")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;

    fn roundtrip(item: &StackItem) -> StackItem {
        let bytes = serialize_item(item).expect("serialize");
        let decoded = deserialize_item(&bytes).expect("deserialize");
        // The codec is canonical, so re-encoding must reproduce the bytes.
        assert_eq!(serialize_item(&decoded).unwrap(), bytes);
        decoded
    }

    #[test]
    fn byte_array_roundtrip() {
        let decoded = roundtrip(&StackItem::ByteArray(vec![1, 2, 3]));
        assert_eq!(decoded, StackItem::ByteArray(vec![1, 2, 3]));
    }

    #[test]
    fn buffer_roundtrip() {
        let decoded = roundtrip(&StackItem::new_buffer(vec![9, 8]));
        assert!(matches!(decoded, StackItem::Buffer(_)));
        assert_eq!(decoded.try_bytes().unwrap(), vec![9, 8]);
    }

    #[test]
    fn bool_roundtrip() {
        assert_eq!(roundtrip(&StackItem::Bool(true)), StackItem::Bool(true));
        assert_eq!(roundtrip(&StackItem::Bool(false)), StackItem::Bool(false));
    }

    #[test]
    fn integer_roundtrip() {
        for v in [0i64, 1, -1, 128, -128, i64::MAX] {
            let item = StackItem::Integer(BigInt::from(v));
            assert_eq!(roundtrip(&item), item);
        }
    }

    #[test]
    fn nested_containers_roundtrip() {
        let item = StackItem::new_array(vec![
            StackItem::from(7i64),
            StackItem::new_struct(vec![StackItem::Bool(true)]),
            StackItem::new_map(vec![(
                StackItem::ByteArray(b"key".to_vec()),
                StackItem::from(1i64),
            )]),
        ]);
        let decoded = roundtrip(&item);
        let StackItem::Array(items) = decoded else {
            panic!("expected array");
        };
        assert_eq!(items.borrow().len(), 3);
    }

    #[test]
    fn struct_roundtrip_is_structurally_equal() {
        let item = StackItem::new_struct(vec![StackItem::from(1i64), StackItem::Bool(false)]);
        assert_eq!(roundtrip(&item), item);
    }

    #[test]
    fn interop_never_serializes() {
        let item = StackItem::new_interop(1u8);
        assert_eq!(serialize_item(&item), Err(ItemSerializationError::Interop));
    }

    #[test]
    fn cyclic_array_fails() {
        let inner = StackItem::new_array(vec![]);
        let outer = StackItem::new_array(vec![inner.clone()]);
        if let (StackItem::Array(inner_rc), StackItem::Array(_)) = (&inner, &outer) {
            inner_rc.borrow_mut().push(outer.clone());
        }
        assert_eq!(
            serialize_item(&outer),
            Err(ItemSerializationError::Recursive)
        );
    }

    #[test]
    fn self_referencing_map_fails() {
        let map = StackItem::new_map(vec![]);
        if let StackItem::Map(entries) = &map {
            entries
                .borrow_mut()
                .push((StackItem::ByteArray(vec![1]), map.clone()));
        }
        assert_eq!(serialize_item(&map), Err(ItemSerializationError::Recursive));
    }

    #[test]
    fn unknown_tag_rejected() {
        assert_eq!(
            deserialize_item(&[0x77]),
            Err(DecodeError::Format("unknown type"))
        );
    }

    #[test]
    fn map_with_container_key_rejected() {
        // TAG_MAP, one entry, key is an empty array.
        let bytes = [TAG_MAP, 1, TAG_ARRAY, 0, TAG_BOOLEAN, 1];
        assert_eq!(
            deserialize_item(&bytes),
            Err(DecodeError::Format("invalid map key type"))
        );
    }

    #[test]
    fn truncated_input_rejected() {
        let bytes = serialize_item(&StackItem::ByteArray(vec![1, 2, 3])).unwrap();
        assert!(deserialize_item(&bytes[..bytes.len() - 1]).is_err());
    }
}
