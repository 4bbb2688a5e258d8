//! The interop host surface.
//!
//! A script reaches the host exclusively through named services dispatched
//! on `SYSCALL`. Each invocation gets one [`Context`]: the trigger, the
//! block and transaction being processed, a DAO overlay for its writes, a
//! logger and a notification buffer. The [`Interops`] registry maps 4-byte
//! service ids to handlers; it is built per node or per VM, never global.
//!
//! Writes stay provisional inside the overlay until the host commits them;
//! the core itself never persists anything.

use crate::core::block::{Base, Block};
use crate::core::dao::{Dao, OverlayDao};
use crate::core::state::{Account, Contract, NotificationEvent};
use crate::core::transaction::{Attribute, Transaction, Witness};
use crate::types::encoding::DecodeError;
use crate::types::hash::{Uint160, Uint256};
use crate::utils::log::Logger;
use crate::virtual_machine::script::interop_name_to_id;
use crate::virtual_machine::serialization::ItemSerializationError;
use crate::virtual_machine::stack_item::ItemError;
use crate::virtual_machine::vm::{Element, SyscallHandler, Vm};
use crate::virtual_machine::VMError;
use num_traits::ToPrimitive;
use std::collections::HashMap;
use thiserror::Error;

mod blockchain;
mod contract;
mod runtime;
mod storage;

pub use contract::{MAX_CONTRACT_SCRIPT_SIZE, STORAGE_PRICE};
pub use storage::MAX_STORAGE_KEY_LEN;

/// Maximum length of a contract description in a manifest.
pub const MAX_CONTRACT_DESCRIPTION_LEN: usize = 65536;
/// Maximum number of parameters a contract method may declare.
pub const MAX_CONTRACT_PARAMETERS_NUM: usize = 252;
/// Maximum length of contract metadata strings.
pub const MAX_CONTRACT_STRING_LEN: usize = 252;

/// The reason a script is running. Immutable for a given invocation.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    /// Witness verification.
    Verification = 0x00,
    /// Internal system processing.
    System = 0x01,
    /// Regular application execution.
    Application = 0x10,
    /// Post-application execution.
    ApplicationR = 0x11,
}

impl Trigger {
    /// True for the triggers under which state mutation is allowed.
    pub fn is_application(self) -> bool {
        matches!(self, Trigger::Application | Trigger::ApplicationR)
    }
}

/// Handle to a contract's storage, issued to running scripts.
///
/// The read-only flag only ever transitions one way: a writable context can
/// be downgraded via `Neo.StorageContext.AsReadOnly`, never re-widened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StorageContext {
    pub script_hash: Uint160,
    pub read_only: bool,
}

/// Errors surfaced by interop services; each faults the executing VM.
#[derive(Debug, Error, PartialEq)]
pub enum InteropError {
    #[error("bad block index")]
    BadBlockIndex,
    #[error("invalid block hash length")]
    InvalidBlockHash,
    #[error("invalid hash")]
    InvalidHash,
    #[error("invalid contract hash")]
    InvalidContractHash,
    #[error("value is not a header or block")]
    NotAHeader,
    #[error("value is not a block")]
    NotABlock,
    #[error("value is not a transaction")]
    NotATransaction,
    #[error("value is not a witness")]
    NotAWitness,
    #[error("value is not an attribute")]
    NotAnAttribute,
    #[error("value is not an account state")]
    NotAnAccount,
    #[error("value is not a contract state")]
    NotAContract,
    #[error("value is not a storage context")]
    NotAStorageContext,
    #[error("value is not an iterator")]
    NotAnIterator,
    #[error("transaction not found")]
    TransactionNotFound,
    #[error("too many transactions")]
    TooManyTransactions,
    #[error("too many attributes")]
    TooManyAttributes,
    #[error("too many witnesses")]
    TooManyWitnesses,
    #[error("wrong transaction index")]
    WrongTransactionIndex,
    #[error("no contract found")]
    NoContractFound,
    #[error("contract {0} can't use storage")]
    NoStorageSupport(Uint160),
    // The wording is shared by every storage mutation, delete or not.
    #[error("can't delete when the trigger is not application")]
    WrongTriggerForWrite,
    #[error("can't create contract when not triggered by an application")]
    WrongTriggerForCreate,
    #[error("can't destroy contract when not triggered by application")]
    WrongTriggerForDestroy,
    #[error("StorageContext is read only")]
    ReadOnlyContext,
    #[error("key is too big")]
    OversizedKey,
    #[error("storage item is constant")]
    ConstantItem,
    #[error("storage item exists and is read-only")]
    ConstItemExists,
    #[error("the script is too big")]
    OversizedScript,
    #[error("manifest is too big")]
    OversizedManifest,
    #[error("gas limit exceeded")]
    GasLimitExceeded,
    #[error("contract already exists")]
    ContractExists,
    #[error("contract doesn't exist")]
    ContractMissing,
    #[error("invalid script len")]
    InvalidScriptLen,
    #[error("the script is the same")]
    SameScript,
    #[error("contract not found")]
    ContractNotFound,
    #[error("disallowed method call")]
    DisallowedMethodCall,
    #[error("non-existent contract")]
    NonExistentContract,
    #[error("contract was not created in this transaction")]
    NotCreatedInThisTransaction,
    #[error("no header available for the current tip")]
    NoHeader,
    #[error(transparent)]
    Item(#[from] ItemError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Serialization(#[from] ItemSerializationError),
    #[error("{0}")]
    Vm(String),
}

impl From<VMError> for InteropError {
    fn from(e: VMError) -> Self {
        InteropError::Vm(e.to_string())
    }
}

/// Per-invocation host state the VM reads through syscalls.
///
/// Created once per script invocation and discarded on completion. DAO
/// changes stay provisional in the overlay; notifications accumulate in
/// emission order.
pub struct Context<'a> {
    pub trigger: Trigger,
    pub block: Option<Block>,
    pub tx: Option<Transaction>,
    pub dao: OverlayDao<'a>,
    pub log: Logger,
    pub notifications: Vec<NotificationEvent>,
}

impl<'a> Context<'a> {
    pub fn new(
        trigger: Trigger,
        block: Option<Block>,
        tx: Option<Transaction>,
        lower: &'a dyn Dao,
        log: Logger,
    ) -> Context<'a> {
        Context {
            trigger,
            block,
            tx,
            dao: OverlayDao::new(lower),
            log,
            notifications: Vec::new(),
        }
    }

    /// Hands the accumulated notifications to the host.
    pub fn drain_notifications(&mut self) -> Vec<NotificationEvent> {
        std::mem::take(&mut self.notifications)
    }
}

/// Handler signature every interop service implements.
pub type ServiceFn = fn(&mut Context, &mut Vm) -> Result<(), InteropError>;

/// One registered service.
pub struct Service {
    pub name: &'static str,
    func: ServiceFn,
}

/// The service registry, keyed by 4-byte wire id.
pub struct Interops {
    services: HashMap<u32, Service>,
}

impl Interops {
    /// Builds the full core catalogue.
    pub fn new() -> Interops {
        let mut interops = Interops {
            services: HashMap::new(),
        };
        blockchain::register(&mut interops);
        runtime::register(&mut interops);
        storage::register(&mut interops);
        contract::register(&mut interops);
        interops
    }

    pub(crate) fn register(&mut self, name: &'static str, func: ServiceFn) {
        let id = interop_name_to_id(name.as_bytes());
        self.services.insert(id, Service { name, func });
    }

    pub fn get(&self, id: u32) -> Option<&Service> {
        self.services.get(&id)
    }

    /// Runs the VM to completion against this registry and the given
    /// context.
    pub fn execute(&self, vm: &mut Vm, ctx: &mut Context) -> Result<(), VMError> {
        let mut dispatcher = Dispatcher {
            ctx,
            interops: self,
        };
        vm.run(&mut dispatcher)
    }
}

impl Default for Interops {
    fn default() -> Self {
        Self::new()
    }
}

/// Connects a VM run to the registry and a context.
pub struct Dispatcher<'a, 'b> {
    pub ctx: &'a mut Context<'b>,
    pub interops: &'a Interops,
}

impl SyscallHandler for Dispatcher<'_, '_> {
    fn on_syscall(&mut self, id: u32, vm: &mut Vm) -> Result<(), VMError> {
        let service = self
            .interops
            .get(id)
            .ok_or(VMError::UnknownSyscall(id))?;
        (service.func)(self.ctx, vm).map_err(|e| VMError::Interop(e.to_string()))
    }
}

// ---- shared argument helpers ----

fn pop_typed<T: 'static + Clone>(vm: &mut Vm, err: InteropError) -> Result<T, InteropError> {
    let element = vm.estack().pop()?;
    element
        .item()
        .as_interop()
        .and_then(|handle| handle.with(|value: &T| value.clone()))
        .ok_or(err)
}

/// Pops a header, transparently accepting a block in its place.
pub(crate) fn pop_header(vm: &mut Vm) -> Result<Base, InteropError> {
    let element = vm.estack().pop()?;
    let handle = element
        .item()
        .as_interop()
        .ok_or(InteropError::NotAHeader)?;
    if let Some(header) = handle.with(|header: &Base| header.clone()) {
        return Ok(header);
    }
    handle
        .with(|block: &Block| block.header())
        .ok_or(InteropError::NotAHeader)
}

pub(crate) fn pop_block(vm: &mut Vm) -> Result<Block, InteropError> {
    pop_typed(vm, InteropError::NotABlock)
}

pub(crate) fn pop_transaction(vm: &mut Vm) -> Result<Transaction, InteropError> {
    pop_typed(vm, InteropError::NotATransaction)
}

pub(crate) fn pop_witness(vm: &mut Vm) -> Result<Witness, InteropError> {
    pop_typed(vm, InteropError::NotAWitness)
}

pub(crate) fn pop_attribute(vm: &mut Vm) -> Result<Attribute, InteropError> {
    pop_typed(vm, InteropError::NotAnAttribute)
}

pub(crate) fn pop_account(vm: &mut Vm) -> Result<Account, InteropError> {
    pop_typed(vm, InteropError::NotAnAccount)
}

pub(crate) fn pop_contract(vm: &mut Vm) -> Result<Contract, InteropError> {
    pop_typed(vm, InteropError::NotAContract)
}

pub(crate) fn pop_storage_context(vm: &mut Vm) -> Result<StorageContext, InteropError> {
    pop_typed(vm, InteropError::NotAStorageContext)
}

pub(crate) fn pop_uint160(vm: &mut Vm) -> Result<Uint160, InteropError> {
    let bytes = vm.estack().pop()?.bytes()?;
    Uint160::from_slice(&bytes).ok_or(InteropError::InvalidHash)
}

pub(crate) fn pop_uint256(vm: &mut Vm) -> Result<Uint256, InteropError> {
    let bytes = vm.estack().pop()?.bytes()?;
    Uint256::from_slice(&bytes).ok_or(InteropError::InvalidHash)
}

/// Resolves a block reference from the stack: a numeric height of up to
/// 4 bytes, or a full 32-byte hash.
pub(crate) fn block_hash_from_element(
    dao: &dyn Dao,
    element: &Element,
) -> Result<Uint256, InteropError> {
    let bytes = element.bytes()?;
    if bytes.len() <= 4 {
        let height = element.big_int()?;
        let height = height
            .to_i64()
            .filter(|v| (0..=u32::MAX as i64).contains(v))
            .ok_or(InteropError::BadBlockIndex)?;
        // An unknown height falls through as the zero hash, which no block
        // answers to; the accessor then reports "not found" its own way.
        Ok(dao
            .get_header_hash(height as u32)
            .unwrap_or_else(Uint256::zero))
    } else {
        Uint256::from_slice(&bytes).ok_or(InteropError::InvalidBlockHash)
    }
}
