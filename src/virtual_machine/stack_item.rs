//! Runtime value model of the virtual machine.
//!
//! Values are a tagged variant. Containers (arrays, structs, maps, buffers)
//! are reference-counted so that identity comparison and cycle detection are
//! pointer-based, while structs compare structurally and primitives compare
//! by value:
//!
//! | Variant   | Payload                    | Equality      |
//! |-----------|----------------------------|---------------|
//! | ByteArray | byte sequence              | by bytes      |
//! | Buffer    | mutable byte sequence      | by identity   |
//! | Bool      | bit                        | by value      |
//! | Integer   | arbitrary-precision signed | by value      |
//! | Array     | item sequence              | by identity   |
//! | Struct    | item sequence              | by structure  |
//! | Map       | ordered key/value pairs    | by identity   |
//! | Interop   | opaque host handle         | by pointer    |

use crate::types::hash::{Uint160, Uint256};
use num_bigint::{BigInt, Sign};
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// Maximum size of an integer item in bytes.
pub const MAX_BIG_INTEGER_BYTES: usize = 32;

/// Errors raised by item coercions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ItemError {
    #[error("{0} item cannot be converted to bytes")]
    NotBytes(&'static str),
    #[error("{0} item cannot be converted to an integer")]
    NotAnInteger(&'static str),
    #[error("integer is too big")]
    IntegerOverflow,
    #[error("{0} is not a valid map key type")]
    InvalidMapKey(&'static str),
}

/// Opaque handle into the host, compared by pointer.
///
/// Interop services wrap host objects (blocks, transactions, storage
/// contexts, iterators) in these handles and downcast them back on pop.
#[derive(Clone)]
pub struct InteropItem(Rc<RefCell<dyn Any>>);

impl InteropItem {
    pub fn new<T: Any>(value: T) -> Self {
        Self(Rc::new(RefCell::new(value)))
    }

    /// Returns true if the handle holds a value of type `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.0.borrow().is::<T>()
    }

    /// Runs `f` against the held value if it has type `T`.
    pub fn with<T: Any, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let borrowed = self.0.borrow();
        borrowed.downcast_ref::<T>().map(f)
    }

    /// Runs `f` against the held value mutably if it has type `T`.
    pub fn with_mut<T: Any, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut borrowed = self.0.borrow_mut();
        borrowed.downcast_mut::<T>().map(f)
    }

    pub fn ptr_eq(&self, other: &InteropItem) -> bool {
        std::ptr::eq(
            Rc::as_ptr(&self.0) as *const u8,
            Rc::as_ptr(&other.0) as *const u8,
        )
    }
}

impl fmt::Debug for InteropItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InteropItem({:p})", Rc::as_ptr(&self.0))
    }
}

/// A value on the evaluation stack.
#[derive(Clone, Debug)]
pub enum StackItem {
    ByteArray(Vec<u8>),
    Buffer(Rc<RefCell<Vec<u8>>>),
    Bool(bool),
    Integer(BigInt),
    Array(Rc<RefCell<Vec<StackItem>>>),
    Struct(Rc<RefCell<Vec<StackItem>>>),
    Map(Rc<RefCell<Vec<(StackItem, StackItem)>>>),
    Interop(InteropItem),
}

/// Encodes an integer in the canonical stack-item form: minimal
/// two's-complement little-endian, with zero as the empty payload.
pub fn big_int_to_bytes(value: &BigInt) -> Vec<u8> {
    if value.sign() == Sign::NoSign {
        Vec::new()
    } else {
        value.to_signed_bytes_le()
    }
}

/// Decodes an integer from its canonical stack-item form.
pub fn big_int_from_bytes(data: &[u8]) -> BigInt {
    BigInt::from_signed_bytes_le(data)
}

impl StackItem {
    pub fn new_array(items: Vec<StackItem>) -> StackItem {
        StackItem::Array(Rc::new(RefCell::new(items)))
    }

    pub fn new_struct(items: Vec<StackItem>) -> StackItem {
        StackItem::Struct(Rc::new(RefCell::new(items)))
    }

    pub fn new_map(entries: Vec<(StackItem, StackItem)>) -> StackItem {
        StackItem::Map(Rc::new(RefCell::new(entries)))
    }

    pub fn new_buffer(data: Vec<u8>) -> StackItem {
        StackItem::Buffer(Rc::new(RefCell::new(data)))
    }

    pub fn new_interop<T: Any>(value: T) -> StackItem {
        StackItem::Interop(InteropItem::new(value))
    }

    /// Returns the variant name for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            StackItem::ByteArray(_) => "ByteArray",
            StackItem::Buffer(_) => "Buffer",
            StackItem::Bool(_) => "Boolean",
            StackItem::Integer(_) => "Integer",
            StackItem::Array(_) => "Array",
            StackItem::Struct(_) => "Struct",
            StackItem::Map(_) => "Map",
            StackItem::Interop(_) => "Interop",
        }
    }

    /// Coerces the item to bytes.
    ///
    /// Booleans become a single `1`/`0` byte, integers their canonical
    /// signed form, byte arrays and buffers pass through. Containers and
    /// interop handles have no byte form.
    pub fn try_bytes(&self) -> Result<Vec<u8>, ItemError> {
        match self {
            StackItem::ByteArray(b) => Ok(b.clone()),
            StackItem::Buffer(b) => Ok(b.borrow().clone()),
            StackItem::Bool(v) => Ok(vec![*v as u8]),
            StackItem::Integer(n) => Ok(big_int_to_bytes(n)),
            other => Err(ItemError::NotBytes(other.type_name())),
        }
    }

    /// Coerces the item to an integer.
    ///
    /// Byte sequences are read as canonical signed little-endian and may
    /// not exceed [`MAX_BIG_INTEGER_BYTES`].
    pub fn try_big_int(&self) -> Result<BigInt, ItemError> {
        match self {
            StackItem::Integer(n) => Ok(n.clone()),
            StackItem::Bool(v) => Ok(BigInt::from(*v as u8)),
            StackItem::ByteArray(b) => bytes_to_big_int(b),
            StackItem::Buffer(b) => bytes_to_big_int(&b.borrow()),
            other => Err(ItemError::NotAnInteger(other.type_name())),
        }
    }

    /// Coerces the item to a boolean. Total: containers and interop handles
    /// are truthy, byte sequences are true when any byte is nonzero.
    pub fn to_bool(&self) -> bool {
        match self {
            StackItem::Bool(v) => *v,
            StackItem::Integer(n) => n.sign() != Sign::NoSign,
            StackItem::ByteArray(b) => b.iter().any(|&x| x != 0),
            StackItem::Buffer(b) => b.borrow().iter().any(|&x| x != 0),
            StackItem::Array(_) | StackItem::Struct(_) | StackItem::Map(_) => true,
            StackItem::Interop(_) => true,
        }
    }

    /// Returns the interop handle if this item is one.
    pub fn as_interop(&self) -> Option<&InteropItem> {
        match self {
            StackItem::Interop(handle) => Some(handle),
            _ => None,
        }
    }

    /// Map keys must be primitive: byte array, boolean or integer.
    pub fn is_valid_map_key(&self) -> bool {
        matches!(
            self,
            StackItem::ByteArray(_) | StackItem::Bool(_) | StackItem::Integer(_)
        )
    }
}

fn bytes_to_big_int(bytes: &[u8]) -> Result<BigInt, ItemError> {
    if bytes.len() > MAX_BIG_INTEGER_BYTES {
        return Err(ItemError::IntegerOverflow);
    }
    Ok(big_int_from_bytes(bytes))
}

impl PartialEq for StackItem {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (StackItem::ByteArray(a), StackItem::ByteArray(b)) => a == b,
            (StackItem::Buffer(a), StackItem::Buffer(b)) => Rc::ptr_eq(a, b),
            (StackItem::Bool(a), StackItem::Bool(b)) => a == b,
            (StackItem::Integer(a), StackItem::Integer(b)) => a == b,
            (StackItem::Array(a), StackItem::Array(b)) => Rc::ptr_eq(a, b),
            (StackItem::Map(a), StackItem::Map(b)) => Rc::ptr_eq(a, b),
            (StackItem::Struct(a), StackItem::Struct(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y)
            }
            (StackItem::Interop(a), StackItem::Interop(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<bool> for StackItem {
    fn from(v: bool) -> Self {
        StackItem::Bool(v)
    }
}

impl From<BigInt> for StackItem {
    fn from(v: BigInt) -> Self {
        StackItem::Integer(v)
    }
}

macro_rules! from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for StackItem {
                fn from(v: $t) -> Self {
                    StackItem::Integer(BigInt::from(v))
                }
            }
        )*
    };
}

from_int!(u8, u32, u64, usize, i32, i64);

impl From<Vec<u8>> for StackItem {
    fn from(v: Vec<u8>) -> Self {
        StackItem::ByteArray(v)
    }
}

impl From<&[u8]> for StackItem {
    fn from(v: &[u8]) -> Self {
        StackItem::ByteArray(v.to_vec())
    }
}

impl From<Vec<StackItem>> for StackItem {
    fn from(v: Vec<StackItem>) -> Self {
        StackItem::new_array(v)
    }
}

impl From<Uint160> for StackItem {
    fn from(v: Uint160) -> Self {
        StackItem::ByteArray(v.to_vec())
    }
}

impl From<Uint256> for StackItem {
    fn from(v: Uint256) -> Self {
        StackItem::ByteArray(v.to_vec())
    }
}
