//! Chain model and execution host: blocks, transactions, on-chain state,
//! the DAO view, interop services, fees and genesis construction.

pub mod block;
pub mod dao;
pub mod fee;
pub mod genesis;
pub mod interop;
pub mod state;
pub mod transaction;
