//! Opcode prices and network-fee computation for standard contracts.

use crate::types::encoding::{var_bytes_size, var_size};
use crate::types::fixed8::Fixed8;
use crate::virtual_machine::opcode::Opcode;
use crate::virtual_machine::script::{is_signature_contract, parse_multi_sig_contract};

/// Price of one ECDSA verification, in 10⁻⁸ units.
pub const ECDSA_VERIFY_INTEROP_PRICE: Fixed8 = Fixed8(100_000);

/// Size of one encoded signature push in an invocation script:
/// `PUSHDATA1`, a length byte and 64 signature bytes.
const SIGNATURE_PUSH_SIZE: usize = 66;

// Static per-opcode prices in 10⁻⁸ units. Constant pushes are free.
fn price_one(op: Opcode) -> i64 {
    match op {
        Opcode::PushM1 => 0,
        Opcode::Push0
        | Opcode::Push1
        | Opcode::Push2
        | Opcode::Push3
        | Opcode::Push4
        | Opcode::Push5
        | Opcode::Push6
        | Opcode::Push7
        | Opcode::Push8
        | Opcode::Push9
        | Opcode::Push10
        | Opcode::Push11
        | Opcode::Push12
        | Opcode::Push13
        | Opcode::Push14
        | Opcode::Push15
        | Opcode::Push16 => 0,
        Opcode::PushInt8 | Opcode::PushInt16 | Opcode::PushInt32 | Opcode::PushInt64 => 30,
        Opcode::PushInt128 | Opcode::PushInt256 => 120,
        Opcode::PushNull => 30,
        Opcode::PushData1 => 180,
        Opcode::PushData2 => 13_000,
        Opcode::PushData4 => 110_000,
        Opcode::Nop => 30,
        Opcode::Ret | Opcode::Syscall => 0,
        Opcode::Drop | Opcode::Dup | Opcode::Swap => 60,
        Opcode::Sign | Opcode::Abs | Opcode::Negate | Opcode::Inc | Opcode::Dec => 100,
        Opcode::Add | Opcode::Sub => 210,
        Opcode::Mul => 300,
        Opcode::Div | Opcode::Mod => 500,
    }
}

/// Sums the prices of the given opcodes.
pub fn opcode_price(ops: &[Opcode]) -> Fixed8 {
    Fixed8(ops.iter().map(|&op| price_one(op)).sum())
}

// Fee for pushing `count` signatures or keys: the data pushes plus the
// opcode that pushes the count itself.
fn multisig_push_fee(count: usize) -> Fixed8 {
    let count_push = Opcode::for_small_int(count as i64).unwrap_or(if count <= i8::MAX as usize {
        Opcode::PushInt8
    } else {
        Opcode::PushInt16
    });
    opcode_price(&[Opcode::PushData1]).mul_int(count as i64) + opcode_price(&[count_push])
}

/// Network fee and witness size for a verification script.
///
/// Signature contracts price one signature push and one verification;
/// m-of-n multisig contracts price `m` signature pushes, `n` key pushes
/// and `n` verifications. Unknown script shapes cost nothing here: their
/// fee is the caller's problem.
pub fn calculate_network_fee(script: &[u8]) -> (Fixed8, usize) {
    let mut net_fee = Fixed8::zero();
    let mut size = 0usize;

    if is_signature_contract(script) {
        size += 67 + var_bytes_size(script);
        net_fee += opcode_price(&[Opcode::PushData1, Opcode::PushNull]);
        net_fee += ECDSA_VERIFY_INTEROP_PRICE;
    } else if let Some((m, pubs)) = parse_multi_sig_contract(script) {
        let n = pubs.len();
        let size_inv = SIGNATURE_PUSH_SIZE * m;
        size += var_size(size_inv as u64) + size_inv + var_bytes_size(script);
        net_fee += multisig_push_fee(m) + multisig_push_fee(n);
        net_fee += opcode_price(&[Opcode::PushNull]);
        net_fee += ECDSA_VERIFY_INTEROP_PRICE.mul_int(n as i64);
    }

    (net_fee, size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::utils::test_key;
    use crate::virtual_machine::script::{
        create_multi_sig_redeem_script, create_signature_redeem_script,
    };

    #[test]
    fn opcode_price_sums_variadically() {
        let single = opcode_price(&[Opcode::PushData1]);
        let pair = opcode_price(&[Opcode::PushData1, Opcode::PushNull]);
        assert_eq!(pair, single + opcode_price(&[Opcode::PushNull]));
    }

    #[test]
    fn small_pushes_are_free() {
        assert_eq!(opcode_price(&[Opcode::Push1]), Fixed8::zero());
        assert_eq!(opcode_price(&[Opcode::Push16]), Fixed8::zero());
        assert_eq!(opcode_price(&[Opcode::PushM1]), Fixed8::zero());
    }

    #[test]
    fn signature_contract_fee() {
        let script = create_signature_redeem_script(&test_key(1));
        let (fee, size) = calculate_network_fee(&script);
        assert_eq!(size, 67 + var_bytes_size(&script));
        assert_eq!(
            fee,
            opcode_price(&[Opcode::PushData1, Opcode::PushNull]) + ECDSA_VERIFY_INTEROP_PRICE
        );
    }

    #[test]
    fn two_of_three_multisig_fee() {
        let keys = vec![test_key(1), test_key(2), test_key(3)];
        let script = create_multi_sig_redeem_script(2, &keys).unwrap();
        let (fee, size) = calculate_network_fee(&script);

        // size: var-prefixed invocation of two 66-byte signature pushes,
        // plus the var-prefixed verification script.
        assert_eq!(size, var_size(132) + 132 + var_bytes_size(&script));

        let expected = opcode_price(&[Opcode::PushData1]).mul_int(2)
            + opcode_price(&[Opcode::PushData1]).mul_int(3)
            + opcode_price(&[Opcode::PushNull])
            + ECDSA_VERIFY_INTEROP_PRICE.mul_int(3);
        assert_eq!(fee, expected);
    }

    #[test]
    fn unknown_script_shape_costs_nothing() {
        let (fee, size) = calculate_network_fee(&[0x01, 0x02, 0x03]);
        assert_eq!(fee, Fixed8::zero());
        assert_eq!(size, 0);
    }

    #[test]
    fn ecdsa_price_constant() {
        assert_eq!(ECDSA_VERIFY_INTEROP_PRICE, Fixed8(100_000));
    }
}
