//! Script emission and standard-contract recognition.
//!
//! A *standard* contract is a verification script matching one of two byte
//! templates: single-signature (one key, one ECDSA check) or m-of-n
//! multisig. The fee calculator depends on recognizing these shapes, and
//! the genesis block derives its consensus address from a multisig redeem
//! script built here.

use crate::crypto::keys::{PublicKey, PUBLIC_KEY_SIZE};
use crate::virtual_machine::opcode::Opcode;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Name of the single-signature verification service.
pub const ECDSA_VERIFY: &str = "Neo.Crypto.ECDsaVerify";
/// Name of the multisig verification service.
pub const ECDSA_CHECK_MULTISIG: &str = "Neo.Crypto.ECDsaCheckMultiSig";

/// Upper bound on keys in a multisig redeem script.
pub const MAX_MULTISIG_KEYS: usize = 1024;

const SIGNATURE_CONTRACT_LEN: usize = 41;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScriptError {
    #[error("invalid multisig parameters: m={m}, n={n}")]
    InvalidMultisigParams { m: usize, n: usize },
}

/// Returns the 4-byte service id of an interop name: the little-endian
/// prefix of its SHA256 digest. This is what `SYSCALL` carries on the wire.
pub fn interop_name_to_id(name: &[u8]) -> u32 {
    let digest = Sha256::digest(name);
    u32::from_le_bytes(digest[..4].try_into().unwrap())
}

/// Appends a bare opcode.
pub fn emit_opcode(out: &mut Vec<u8>, op: Opcode) {
    out.push(op as u8);
}

/// Appends a `SYSCALL` with the id of the named service.
pub fn emit_syscall(out: &mut Vec<u8>, name: &str) {
    emit_opcode(out, Opcode::Syscall);
    out.extend_from_slice(&interop_name_to_id(name.as_bytes()).to_le_bytes());
}

/// Appends the shortest push of an integer constant.
pub fn emit_push_int(out: &mut Vec<u8>, value: i64) {
    if value == -1 {
        emit_opcode(out, Opcode::PushM1);
    } else if (0..=16).contains(&value) {
        out.push(Opcode::Push0 as u8 + value as u8);
    } else if i8::try_from(value).is_ok() {
        emit_opcode(out, Opcode::PushInt8);
        out.push(value as i8 as u8);
    } else if i16::try_from(value).is_ok() {
        emit_opcode(out, Opcode::PushInt16);
        out.extend_from_slice(&(value as i16).to_le_bytes());
    } else if i32::try_from(value).is_ok() {
        emit_opcode(out, Opcode::PushInt32);
        out.extend_from_slice(&(value as i32).to_le_bytes());
    } else {
        emit_opcode(out, Opcode::PushInt64);
        out.extend_from_slice(&value.to_le_bytes());
    }
}

/// Appends a data push sized by the payload length.
pub fn emit_push_data(out: &mut Vec<u8>, data: &[u8]) {
    if data.len() < 0x100 {
        emit_opcode(out, Opcode::PushData1);
        out.push(data.len() as u8);
    } else if data.len() < 0x10000 {
        emit_opcode(out, Opcode::PushData2);
        out.extend_from_slice(&(data.len() as u16).to_le_bytes());
    } else {
        emit_opcode(out, Opcode::PushData4);
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    }
    out.extend_from_slice(data);
}

/// Builds the verification script for a single key.
pub fn create_signature_redeem_script(key: &PublicKey) -> Vec<u8> {
    let mut script = Vec::with_capacity(SIGNATURE_CONTRACT_LEN);
    emit_push_data(&mut script, key.as_bytes());
    emit_opcode(&mut script, Opcode::PushNull);
    emit_syscall(&mut script, ECDSA_VERIFY);
    script
}

/// Builds the m-of-n verification script over the given keys.
///
/// Keys are sorted by their encoded form so that the same key set always
/// yields the same script hash.
pub fn create_multi_sig_redeem_script(
    m: usize,
    keys: &[PublicKey],
) -> Result<Vec<u8>, ScriptError> {
    let n = keys.len();
    if m == 0 || m > n || n > MAX_MULTISIG_KEYS {
        return Err(ScriptError::InvalidMultisigParams { m, n });
    }

    let mut sorted = keys.to_vec();
    sorted.sort();

    let mut script = Vec::new();
    emit_push_int(&mut script, m as i64);
    for key in &sorted {
        emit_push_data(&mut script, key.as_bytes());
    }
    emit_push_int(&mut script, n as i64);
    emit_opcode(&mut script, Opcode::PushNull);
    emit_syscall(&mut script, ECDSA_CHECK_MULTISIG);
    Ok(script)
}

/// Returns true if the script matches the single-signature template.
pub fn is_signature_contract(script: &[u8]) -> bool {
    script.len() == SIGNATURE_CONTRACT_LEN
        && script[0] == Opcode::PushData1 as u8
        && script[1] as usize == PUBLIC_KEY_SIZE
        && script[35] == Opcode::PushNull as u8
        && script[36] == Opcode::Syscall as u8
        && u32::from_le_bytes(script[37..41].try_into().unwrap())
            == interop_name_to_id(ECDSA_VERIFY.as_bytes())
}

// Reads a small integer push at the cursor, returning (value, bytes consumed).
fn read_push_int(script: &[u8]) -> Option<(usize, usize)> {
    let op = Opcode::try_from(*script.first()?).ok()?;
    if let Some(v) = op.push_value() {
        return usize::try_from(v).ok().map(|v| (v, 1));
    }
    match op {
        Opcode::PushInt8 => {
            let v = *script.get(1)? as i8;
            usize::try_from(v).ok().map(|v| (v, 2))
        }
        Opcode::PushInt16 => {
            let v = i16::from_le_bytes(script.get(1..3)?.try_into().unwrap());
            usize::try_from(v).ok().map(|v| (v, 3))
        }
        _ => None,
    }
}

/// Recognizes an m-of-n multisig verification script.
///
/// Returns the required signature count and the encoded public keys in
/// script order, or `None` when the script is not of that shape.
pub fn parse_multi_sig_contract(script: &[u8]) -> Option<(usize, Vec<Vec<u8>>)> {
    let (m, mut pos) = read_push_int(script)?;
    if m == 0 {
        return None;
    }

    let mut keys = Vec::new();
    while script.get(pos) == Some(&(Opcode::PushData1 as u8))
        && script.get(pos + 1) == Some(&(PUBLIC_KEY_SIZE as u8))
    {
        let key = script.get(pos + 2..pos + 2 + PUBLIC_KEY_SIZE)?;
        keys.push(key.to_vec());
        pos += 2 + PUBLIC_KEY_SIZE;
    }

    let n = keys.len();
    if m > n || n > MAX_MULTISIG_KEYS {
        return None;
    }

    let (declared_n, consumed) = read_push_int(&script[pos..])?;
    if declared_n != n {
        return None;
    }
    pos += consumed;

    if script.get(pos) != Some(&(Opcode::PushNull as u8))
        || script.get(pos + 1) != Some(&(Opcode::Syscall as u8))
    {
        return None;
    }
    let id = u32::from_le_bytes(script.get(pos + 2..pos + 6)?.try_into().unwrap());
    if id != interop_name_to_id(ECDSA_CHECK_MULTISIG.as_bytes()) || script.len() != pos + 6 {
        return None;
    }

    Some((m, keys))
}

/// Returns true if the script is signature-shaped or multisig-shaped.
pub fn is_standard_contract(script: &[u8]) -> bool {
    is_signature_contract(script) || parse_multi_sig_contract(script).is_some()
}
