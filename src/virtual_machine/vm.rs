//! The execution engine.
//!
//! The engine owns two stacks: the evaluation stack of [`Element`] values
//! and the invocation stack of script contexts, each bound to the hash160
//! of its script. Execution is strictly sequential; the only suspension
//! point is a `SYSCALL`, which hands control to the [`SyscallHandler`]
//! supplied by the host for the duration of one service call. Gas metering
//! is the single fairness mechanism: each executed instruction is charged
//! through the optional price getter and the budget is enforced by
//! [`Vm::add_gas`].

use crate::types::bytes::Bytes;
use crate::types::fixed8::Fixed8;
use crate::types::hash::{hash160, Uint160};
use crate::virtual_machine::opcode::Opcode;
use crate::virtual_machine::stack_item::StackItem;
use crate::virtual_machine::VMError;
use num_bigint::BigInt;
use std::cell::RefCell;
use std::rc::Rc;

/// Bound on host-to-VM list hand-offs (block transactions, attributes,
/// witnesses).
pub const MAX_ARRAY_SIZE: usize = 1024;

/// Host hook invoked for every `SYSCALL` instruction.
pub trait SyscallHandler {
    /// Executes the service with the given 4-byte id against the VM.
    fn on_syscall(&mut self, id: u32, vm: &mut Vm) -> Result<(), VMError>;
}

/// Returns the gas price of one opcode, in 10⁻⁸ units.
pub type PriceGetter = fn(Opcode) -> Fixed8;

/// A value on the evaluation stack, with coercing views over the wrapped
/// stack item.
#[derive(Clone, Debug)]
pub struct Element {
    item: StackItem,
}

impl Element {
    pub fn new(item: StackItem) -> Element {
        Element { item }
    }

    /// Borrows the wrapped item.
    pub fn item(&self) -> &StackItem {
        &self.item
    }

    /// Takes the wrapped item.
    pub fn into_item(self) -> StackItem {
        self.item
    }

    /// Byte view of the item; fails for containers and interop handles.
    pub fn bytes(&self) -> Result<Vec<u8>, VMError> {
        Ok(self.item.try_bytes()?)
    }

    /// Integer view of the item.
    pub fn big_int(&self) -> Result<BigInt, VMError> {
        Ok(self.item.try_big_int()?)
    }

    /// Boolean view of the item. Total.
    pub fn bool_value(&self) -> bool {
        self.item.to_bool()
    }
}

/// The evaluation stack.
#[derive(Default)]
pub struct Estack {
    items: Vec<Element>,
}

impl Estack {
    pub fn push(&mut self, element: Element) {
        self.items.push(element);
    }

    /// Pushes any value convertible to a stack item.
    pub fn push_val(&mut self, value: impl Into<StackItem>) {
        self.items.push(Element::new(value.into()));
    }

    pub fn pop(&mut self) -> Result<Element, VMError> {
        self.items.pop().ok_or(VMError::StackUnderflow)
    }

    /// Borrows the element `depth` positions below the top.
    pub fn peek(&self, depth: usize) -> Result<&Element, VMError> {
        let len = self.items.len();
        if depth >= len {
            return Err(VMError::StackUnderflow);
        }
        Ok(&self.items[len - 1 - depth])
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// One invocation stack frame: a loaded script and its identity.
struct ScriptContext {
    script: Bytes,
    script_hash: Uint160,
    ip: usize,
}

/// Restartable iterator over a map stack item, handed to scripts as an
/// interop value by `Storage.Find`.
pub struct MapIterator {
    entries: Rc<RefCell<Vec<(StackItem, StackItem)>>>,
    index: Option<usize>,
}

impl MapIterator {
    /// Wraps a map item; returns `None` for any other variant.
    pub fn new(map: &StackItem) -> Option<MapIterator> {
        match map {
            StackItem::Map(entries) => Some(MapIterator {
                entries: Rc::clone(entries),
                index: None,
            }),
            _ => None,
        }
    }

    /// Advances to the next entry, returning false when exhausted.
    pub fn advance(&mut self) -> bool {
        let next = self.index.map_or(0, |i| i + 1);
        self.index = Some(next);
        next < self.entries.borrow().len()
    }

    /// Key of the current entry, if positioned on one.
    pub fn key(&self) -> Option<StackItem> {
        let index = self.index?;
        self.entries.borrow().get(index).map(|(k, _)| k.clone())
    }

    /// Value of the current entry, if positioned on one.
    pub fn value(&self) -> Option<StackItem> {
        let index = self.index?;
        self.entries.borrow().get(index).map(|(_, v)| v.clone())
    }
}

/// Wraps a map stack item as an iterator interop value.
pub fn new_map_iterator(map: &StackItem) -> Option<StackItem> {
    MapIterator::new(map).map(StackItem::new_interop)
}

/// The virtual machine.
pub struct Vm {
    estack: Estack,
    istack: Vec<ScriptContext>,
    gas_consumed: i64,
    gas_limit: Option<i64>,
    price_getter: Option<PriceGetter>,
}

impl Vm {
    pub fn new() -> Vm {
        Vm {
            estack: Estack::default(),
            istack: Vec::new(),
            gas_consumed: 0,
            gas_limit: None,
            price_getter: None,
        }
    }

    /// Sets the gas budget for this invocation.
    pub fn set_gas_limit(&mut self, limit: Fixed8) {
        self.gas_limit = Some(limit.raw());
    }

    /// Installs the per-opcode price source consulted on every instruction.
    pub fn set_price_getter(&mut self, getter: PriceGetter) {
        self.price_getter = Some(getter);
    }

    /// Charges `amount` of gas; returns false once the budget is exceeded.
    pub fn add_gas(&mut self, amount: Fixed8) -> bool {
        self.gas_consumed += amount.raw();
        match self.gas_limit {
            Some(limit) => self.gas_consumed <= limit,
            None => true,
        }
    }

    pub fn gas_consumed(&self) -> Fixed8 {
        Fixed8(self.gas_consumed)
    }

    /// Pushes a new invocation frame bound to `hash160(script)`.
    pub fn load_script(&mut self, script: Bytes) {
        let script_hash = hash160(&script);
        self.istack.push(ScriptContext {
            script,
            script_hash,
            ip: 0,
        });
    }

    pub fn estack(&mut self) -> &mut Estack {
        &mut self.estack
    }

    pub fn istack_len(&self) -> usize {
        self.istack.len()
    }

    /// Script hash of the executing context.
    pub fn current_script_hash(&self) -> Result<Uint160, VMError> {
        self.context_script_hash(0)
    }

    /// Script hash at `depth` frames below the executing context
    /// (0 = executing, 1 = calling, `len - 1` = entry).
    pub fn context_script_hash(&self, depth: usize) -> Result<Uint160, VMError> {
        let len = self.istack.len();
        if depth >= len {
            return Err(VMError::InvalidContextDepth(depth));
        }
        Ok(self.istack[len - 1 - depth].script_hash)
    }

    /// Pushes the script hash at the given invocation depth onto the
    /// evaluation stack.
    pub fn push_context_script_hash(&mut self, depth: usize) -> Result<(), VMError> {
        let hash = self.context_script_hash(depth)?;
        self.estack.push_val(hash);
        Ok(())
    }

    /// Executes loaded scripts to completion.
    pub fn run<H: SyscallHandler>(&mut self, handler: &mut H) -> Result<(), VMError> {
        while !self.istack.is_empty() {
            self.step(handler)?;
        }
        Ok(())
    }

    fn step<H: SyscallHandler>(&mut self, handler: &mut H) -> Result<(), VMError> {
        let context = self.istack.last_mut().ok_or(VMError::NoScript)?;
        if context.ip >= context.script.len() {
            // Running off the end of a script is an implicit return.
            self.istack.pop();
            return Ok(());
        }

        let offset = context.ip;
        let byte = context.script[offset];
        context.ip += 1;
        let op = Opcode::try_from(byte).map_err(|opcode| VMError::InvalidInstruction {
            opcode,
            offset,
        })?;

        if let Some(getter) = self.price_getter {
            if !self.add_gas(getter(op)) {
                return Err(VMError::GasLimitExceeded);
            }
        }

        self.exec(op, handler)
    }

    /// Reads `count` operand bytes at the current instruction pointer.
    fn read_exact(&mut self, count: usize) -> Result<Vec<u8>, VMError> {
        let context = self.istack.last_mut().ok_or(VMError::NoScript)?;
        let end = context
            .ip
            .checked_add(count)
            .ok_or(VMError::UnexpectedEndOfScript)?;
        let slice = context
            .script
            .get(context.ip..end)
            .ok_or(VMError::UnexpectedEndOfScript)?
            .to_vec();
        context.ip = end;
        Ok(slice)
    }

    fn exec<H: SyscallHandler>(&mut self, op: Opcode, handler: &mut H) -> Result<(), VMError> {
        if let Some(value) = op.push_value() {
            self.estack.push_val(value);
            return Ok(());
        }

        match op {
            Opcode::PushInt8 => self.op_push_int(1),
            Opcode::PushInt16 => self.op_push_int(2),
            Opcode::PushInt32 => self.op_push_int(4),
            Opcode::PushInt64 => self.op_push_int(8),
            Opcode::PushInt128 => self.op_push_int(16),
            Opcode::PushInt256 => self.op_push_int(32),
            // Null has no dedicated runtime variant; the empty byte string
            // stands in for it.
            Opcode::PushNull => {
                self.estack.push_val(Vec::<u8>::new());
                Ok(())
            }
            Opcode::PushData1 => {
                let len = self.read_exact(1)?[0] as usize;
                self.op_push_data(len)
            }
            Opcode::PushData2 => {
                let bytes = self.read_exact(2)?;
                self.op_push_data(u16::from_le_bytes(bytes.try_into().unwrap()) as usize)
            }
            Opcode::PushData4 => {
                let bytes = self.read_exact(4)?;
                self.op_push_data(u32::from_le_bytes(bytes.try_into().unwrap()) as usize)
            }
            Opcode::Nop => Ok(()),
            Opcode::Ret => {
                self.istack.pop();
                Ok(())
            }
            Opcode::Syscall => {
                let bytes = self.read_exact(4)?;
                let id = u32::from_le_bytes(bytes.try_into().unwrap());
                handler.on_syscall(id, self)
            }
            Opcode::Drop => self.estack.pop().map(|_| ()),
            Opcode::Dup => {
                let top = self.estack.peek(0)?.clone();
                self.estack.push(top);
                Ok(())
            }
            Opcode::Swap => {
                let a = self.estack.pop()?;
                let b = self.estack.pop()?;
                self.estack.push(a);
                self.estack.push(b);
                Ok(())
            }
            Opcode::Sign => self.op_unary(|n| {
                BigInt::from(match n.sign() {
                    num_bigint::Sign::Minus => -1,
                    num_bigint::Sign::NoSign => 0,
                    num_bigint::Sign::Plus => 1,
                })
            }),
            Opcode::Abs => self.op_unary(|n| n.magnitude().clone().into()),
            Opcode::Negate => self.op_unary(|n| -n),
            Opcode::Inc => self.op_unary(|n| n + 1),
            Opcode::Dec => self.op_unary(|n| n - 1),
            Opcode::Add => self.op_binary(|a, b| Ok(a + b)),
            Opcode::Sub => self.op_binary(|a, b| Ok(a - b)),
            Opcode::Mul => self.op_binary(|a, b| Ok(a * b)),
            Opcode::Div => self.op_binary(|a, b| {
                if b == BigInt::from(0) {
                    Err(VMError::DivisionByZero)
                } else {
                    Ok(a / b)
                }
            }),
            Opcode::Mod => self.op_binary(|a, b| {
                if b == BigInt::from(0) {
                    Err(VMError::DivisionByZero)
                } else {
                    Ok(a % b)
                }
            }),
            // Small pushes are handled above via push_value.
            _ => unreachable!("opcode {:?} has no handler", op),
        }
    }

    fn op_push_int(&mut self, width: usize) -> Result<(), VMError> {
        let bytes = self.read_exact(width)?;
        self.estack
            .push_val(BigInt::from_signed_bytes_le(&bytes));
        Ok(())
    }

    fn op_push_data(&mut self, len: usize) -> Result<(), VMError> {
        let data = self.read_exact(len)?;
        self.estack.push_val(data);
        Ok(())
    }

    fn op_unary(&mut self, f: impl FnOnce(BigInt) -> BigInt) -> Result<(), VMError> {
        let value = self.estack.pop()?.big_int()?;
        self.estack.push_val(f(value));
        Ok(())
    }

    fn op_binary(
        &mut self,
        f: impl FnOnce(BigInt, BigInt) -> Result<BigInt, VMError>,
    ) -> Result<(), VMError> {
        let b = self.estack.pop()?.big_int()?;
        let a = self.estack.pop()?.big_int()?;
        self.estack.push_val(f(a, b)?);
        Ok(())
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}
