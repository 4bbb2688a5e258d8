//! Stack-based virtual machine for contract execution.
//!
//! # Architecture
//!
//! - **Evaluation stack**: [`vm::Element`] values wrapping runtime
//!   [`stack_item::StackItem`]s
//! - **Invocation stack**: one frame per loaded script, each bound to the
//!   hash160 of its script
//! - **Execution model**: sequential opcode execution; `SYSCALL` dispatches
//!   to host interop services by 4-byte id
//!
//! # Modules
//!
//! - [`vm`]: the execution engine
//! - [`stack_item`]: the runtime value model
//! - [`serialization`]: the binary codec for runtime values
//! - [`opcode`]: the instruction set
//! - [`script`]: standard-contract recognition and script emission

pub mod opcode;
pub mod script;
pub mod serialization;
pub mod stack_item;
pub mod vm;

mod errors;

pub use errors::VMError;
