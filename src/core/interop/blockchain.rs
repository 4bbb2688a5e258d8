//! Chain, header, block, transaction and account introspection services.
//!
//! The block/header/contract accessors swallow "not found" and push an
//! empty byte array instead of faulting; clients of the historical chain
//! depend on that. Transaction lookups fault on a missing hash.

use crate::core::dao::Dao;
use crate::core::interop::{
    block_hash_from_element, pop_account, pop_attribute, pop_block, pop_header, pop_transaction,
    pop_uint160, pop_uint256, pop_witness, Context, InteropError, Interops,
};
use crate::virtual_machine::script::is_standard_contract;
use crate::virtual_machine::stack_item::StackItem;
use crate::virtual_machine::vm::{Vm, MAX_ARRAY_SIZE};
use num_traits::ToPrimitive;

pub(super) fn register(interops: &mut Interops) {
    interops.register("Neo.Blockchain.GetHeight", bc_get_height);
    interops.register("Neo.Blockchain.GetHeader", bc_get_header);
    interops.register("Neo.Blockchain.GetBlock", bc_get_block);
    interops.register("Neo.Blockchain.GetTransaction", bc_get_transaction);
    interops.register(
        "Neo.Blockchain.GetTransactionHeight",
        bc_get_transaction_height,
    );
    interops.register("Neo.Blockchain.GetContract", bc_get_contract);
    interops.register("Neo.Blockchain.GetAccount", bc_get_account);
    interops.register("Neo.Header.GetVersion", header_get_version);
    interops.register("Neo.Header.GetHash", header_get_hash);
    interops.register("Neo.Header.GetPrevHash", header_get_prev_hash);
    interops.register("Neo.Header.GetIndex", header_get_index);
    interops.register("Neo.Header.GetTimestamp", header_get_timestamp);
    interops.register("Neo.Header.GetMerkleRoot", header_get_merkle_root);
    interops.register("Neo.Header.GetNextConsensus", header_get_next_consensus);
    interops.register("Neo.Block.GetTransactionCount", block_get_transaction_count);
    interops.register("Neo.Block.GetTransactions", block_get_transactions);
    interops.register("Neo.Block.GetTransaction", block_get_transaction);
    interops.register("Neo.Transaction.GetHash", tx_get_hash);
    interops.register("Neo.Transaction.GetAttributes", tx_get_attributes);
    interops.register("Neo.Transaction.GetWitnesses", tx_get_witnesses);
    interops.register("Neo.Attribute.GetUsage", attr_get_usage);
    interops.register("Neo.Attribute.GetData", attr_get_data);
    interops.register(
        "Neo.Witness.GetVerificationScript",
        witness_get_verification_script,
    );
    interops.register("Neo.Account.GetBalance", account_get_balance);
    interops.register("Neo.Account.GetScriptHash", account_get_script_hash);
    interops.register("Neo.Account.IsStandard", account_is_standard);
}

fn bc_get_height(ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    vm.estack().push_val(ctx.dao.block_height());
    Ok(())
}

fn bc_get_block(ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let element = vm.estack().pop()?;
    let hash = block_hash_from_element(&ctx.dao, &element)?;
    match ctx.dao.get_block(&hash) {
        Some(block) => vm.estack().push_val(StackItem::new_interop(block)),
        None => vm.estack().push_val(Vec::<u8>::new()),
    }
    Ok(())
}

fn bc_get_header(ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let element = vm.estack().pop()?;
    let hash = block_hash_from_element(&ctx.dao, &element)?;
    match ctx.dao.get_header(&hash) {
        Some(header) => vm.estack().push_val(StackItem::new_interop(header)),
        None => vm.estack().push_val(Vec::<u8>::new()),
    }
    Ok(())
}

fn bc_get_transaction(ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let hash = pop_uint256(vm)?;
    let (tx, _) = ctx
        .dao
        .get_transaction(&hash)
        .ok_or(InteropError::TransactionNotFound)?;
    vm.estack().push_val(StackItem::new_interop(tx));
    Ok(())
}

fn bc_get_transaction_height(ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let hash = pop_uint256(vm)?;
    let (_, height) = ctx
        .dao
        .get_transaction(&hash)
        .ok_or(InteropError::TransactionNotFound)?;
    vm.estack().push_val(height);
    Ok(())
}

fn bc_get_contract(ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let hash = pop_uint160(vm)?;
    match ctx.dao.get_contract_state(&hash) {
        Some(contract) => vm.estack().push_val(StackItem::new_interop(contract)),
        None => vm.estack().push_val(Vec::<u8>::new()),
    }
    Ok(())
}

fn bc_get_account(ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let hash = pop_uint160(vm)?;
    let account = ctx.dao.get_account_state_or_new(&hash);
    vm.estack().push_val(StackItem::new_interop(account));
    Ok(())
}

fn header_get_version(_ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let header = pop_header(vm)?;
    vm.estack().push_val(header.version);
    Ok(())
}

fn header_get_hash(_ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let header = pop_header(vm)?;
    vm.estack().push_val(header.hash());
    Ok(())
}

fn header_get_prev_hash(_ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let header = pop_header(vm)?;
    vm.estack().push_val(header.prev_hash);
    Ok(())
}

fn header_get_index(_ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let header = pop_header(vm)?;
    vm.estack().push_val(header.index);
    Ok(())
}

fn header_get_timestamp(_ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let header = pop_header(vm)?;
    vm.estack().push_val(header.timestamp);
    Ok(())
}

fn header_get_merkle_root(_ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let header = pop_header(vm)?;
    vm.estack().push_val(header.merkle_root);
    Ok(())
}

fn header_get_next_consensus(_ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let header = pop_header(vm)?;
    vm.estack().push_val(header.next_consensus);
    Ok(())
}

fn block_get_transaction_count(_ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let block = pop_block(vm)?;
    vm.estack().push_val(block.transactions.len());
    Ok(())
}

fn block_get_transactions(_ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let block = pop_block(vm)?;
    if block.transactions.len() > MAX_ARRAY_SIZE {
        return Err(InteropError::TooManyTransactions);
    }
    let txs: Vec<StackItem> = block
        .transactions
        .into_iter()
        .map(StackItem::new_interop)
        .collect();
    vm.estack().push_val(txs);
    Ok(())
}

fn block_get_transaction(_ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let block = pop_block(vm)?;
    let index = vm.estack().pop()?.big_int()?;
    let index = index
        .to_i64()
        .filter(|i| (0..block.transactions.len() as i64).contains(i))
        .ok_or(InteropError::WrongTransactionIndex)?;
    let tx = block.transactions[index as usize].clone();
    vm.estack().push_val(StackItem::new_interop(tx));
    Ok(())
}

fn tx_get_hash(_ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let tx = pop_transaction(vm)?;
    vm.estack().push_val(tx.hash());
    Ok(())
}

fn tx_get_attributes(_ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let tx = pop_transaction(vm)?;
    if tx.attributes.len() > MAX_ARRAY_SIZE {
        return Err(InteropError::TooManyAttributes);
    }
    let attrs: Vec<StackItem> = tx
        .attributes
        .into_iter()
        .map(StackItem::new_interop)
        .collect();
    vm.estack().push_val(attrs);
    Ok(())
}

fn tx_get_witnesses(_ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let tx = pop_transaction(vm)?;
    if tx.witnesses.len() > MAX_ARRAY_SIZE {
        return Err(InteropError::TooManyWitnesses);
    }
    let witnesses: Vec<StackItem> = tx
        .witnesses
        .into_iter()
        .map(StackItem::new_interop)
        .collect();
    vm.estack().push_val(witnesses);
    Ok(())
}

fn attr_get_usage(_ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let attr = pop_attribute(vm)?;
    vm.estack().push_val(attr.usage as u8);
    Ok(())
}

fn attr_get_data(_ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let attr = pop_attribute(vm)?;
    vm.estack().push_val(attr.data);
    Ok(())
}

fn witness_get_verification_script(_ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let witness = pop_witness(vm)?;
    // The pushed bytes are a copy; VM code must never alias host memory.
    vm.estack().push_val(witness.verification.to_vec());
    Ok(())
}

fn account_get_balance(_ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let account = pop_account(vm)?;
    let asset_id = pop_uint256(vm)?;
    vm.estack().push_val(account.balance(&asset_id).raw());
    Ok(())
}

fn account_get_script_hash(_ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let account = pop_account(vm)?;
    vm.estack().push_val(account.script_hash);
    Ok(())
}

fn account_is_standard(ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let hash = pop_uint160(vm)?;
    let standard = match ctx.dao.get_contract_state(&hash) {
        Some(contract) => is_standard_contract(&contract.script),
        None => true,
    };
    vm.estack().push_val(standard);
    Ok(())
}
