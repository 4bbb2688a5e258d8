//! Deterministic genesis block construction.

use crate::core::block::{Base, Block, ConsensusData};
use crate::core::transaction::{Transaction, Witness};
use crate::crypto::keys::PublicKey;
use crate::types::bytes::Bytes;
use crate::types::fixed8::Fixed8;
use crate::types::hash::{hash160, Uint160, Uint256};
use crate::virtual_machine::opcode::Opcode;
use crate::virtual_machine::script::{create_multi_sig_redeem_script, emit_syscall, ScriptError};

/// 2016-07-15T15:08:21Z in milliseconds since the Unix epoch.
pub const GENESIS_TIMESTAMP_MS: u64 = 1_468_595_301_000;

/// The consensus nonce every deployment of the chain starts from.
pub const GENESIS_CONSENSUS_NONCE: u64 = 2_083_236_893;

/// Service deployed by the single genesis transaction.
pub const NATIVE_DEPLOY_SERVICE: &str = "Neo.Native.Deploy";

/// Derives the consensus address for a validator set: the hash160 of the
/// m-of-n redeem script with `m = n - (n-1)/3`.
pub fn next_consensus_address(validators: &[PublicKey]) -> Result<Uint160, ScriptError> {
    let n = validators.len();
    if n == 0 {
        return Err(ScriptError::InvalidMultisigParams { m: 0, n: 0 });
    }
    let m = n - (n - 1) / 3;
    let script = create_multi_sig_redeem_script(m, validators)?;
    Ok(hash160(&script))
}

// The genesis transaction: a bare syscall deploying the native contracts,
// witnessed by the trivial {PUSH1} script.
fn native_deploy_transaction() -> Transaction {
    let mut script = Vec::new();
    emit_syscall(&mut script, NATIVE_DEPLOY_SERVICE);

    let mut tx = Transaction::new(Bytes::new(script), Fixed8::zero());
    tx.sender = hash160(&[Opcode::Push1 as u8]);
    tx.witnesses = vec![trivial_witness()];
    tx
}

fn trivial_witness() -> Witness {
    Witness {
        invocation: Bytes::default(),
        verification: Bytes::new(vec![Opcode::Push1 as u8]),
    }
}

/// Builds the block at index 0 for the given standby validators. The result
/// is fully deterministic in the validator set.
pub fn genesis_block(validators: &[PublicKey]) -> Result<Block, ScriptError> {
    let next_consensus = next_consensus_address(validators)?;

    let base = Base {
        version: 0,
        prev_hash: Uint256::zero(),
        merkle_root: Uint256::zero(),
        timestamp: GENESIS_TIMESTAMP_MS,
        index: 0,
        next_consensus,
        witness: trivial_witness(),
    };

    let mut block = Block {
        base,
        consensus_data: ConsensusData {
            primary_index: 0,
            nonce: GENESIS_CONSENSUS_NONCE,
        },
        transactions: vec![native_deploy_transaction()],
        trimmed: false,
    };
    block.rebuild_merkle_root();
    Ok(block)
}
