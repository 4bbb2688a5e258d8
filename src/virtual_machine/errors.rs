use crate::virtual_machine::stack_item::ItemError;
use thiserror::Error;

/// Errors that fault VM execution.
#[derive(Debug, Error)]
pub enum VMError {
    /// Unknown opcode encountered in the script.
    #[error("invalid instruction {opcode:#04x} at offset {offset}")]
    InvalidInstruction { opcode: u8, offset: usize },
    /// Script ended while reading an instruction operand.
    #[error("unexpected end of script")]
    UnexpectedEndOfScript,
    /// An operation required more items than the evaluation stack holds.
    #[error("evaluation stack is empty")]
    StackUnderflow,
    /// No script context is loaded.
    #[error("no script loaded")]
    NoScript,
    /// Invocation stack offset out of range.
    #[error("invocation stack has no context at depth {0}")]
    InvalidContextDepth(usize),
    /// Division or modulo by zero.
    #[error("division by zero")]
    DivisionByZero,
    /// The gas budget was exhausted.
    #[error("gas limit exceeded")]
    GasLimitExceeded,
    /// `SYSCALL` with an id no registered service answers to.
    #[error("unknown interop service {0:#010x}")]
    UnknownSyscall(u32),
    /// An interop service faulted; carries its diagnostic.
    #[error("{0}")]
    Interop(String),
    /// A stack item refused a coercion.
    #[error(transparent)]
    Item(#[from] ItemError),
}
