//! Contract lifecycle services: deploy, migrate, destroy, call.

use crate::core::dao::Dao;
use crate::core::interop::{
    pop_contract, Context, InteropError, Interops, StorageContext,
};
use crate::core::state::{Contract, Manifest, MAX_MANIFEST_SIZE};
use crate::types::bytes::Bytes;
use crate::types::encoding::Decode;
use crate::types::fixed8::Fixed8;
use crate::types::hash::Uint160;
use crate::virtual_machine::stack_item::StackItem;
use crate::virtual_machine::vm::Vm;

/// Maximum script size accepted at deployment.
pub const MAX_CONTRACT_SCRIPT_SIZE: usize = 1024 * 1024;

/// Gas charged per byte of deployed script and manifest, in 10⁻⁸ units.
pub const STORAGE_PRICE: i64 = 100_000;

pub(super) fn register(interops: &mut Interops) {
    interops.register("Neo.Contract.Create", contract_create);
    interops.register("Neo.Contract.Migrate", contract_migrate);
    interops.register("Neo.Contract.Destroy", contract_destroy);
    interops.register("Neo.Contract.GetScript", contract_get_script);
    interops.register("Neo.Contract.IsPayable", contract_is_payable);
    interops.register("Neo.Contract.GetStorageContext", contract_get_storage_context);
    interops.register("System.Contract.Call", contract_call);
    interops.register("System.Contract.CallEx", contract_call_ex);
}

// Pops script and manifest off the stack, runs the deployment checks and
// charges the deployment gas.
fn contract_state_from_vm(ctx: &mut Context, vm: &mut Vm) -> Result<Contract, InteropError> {
    if ctx.trigger != super::Trigger::Application {
        return Err(InteropError::WrongTriggerForCreate);
    }
    let script = vm.estack().pop()?.bytes()?;
    if script.len() > MAX_CONTRACT_SCRIPT_SIZE {
        return Err(InteropError::OversizedScript);
    }
    let manifest_bytes = vm.estack().pop()?.bytes()?;
    if manifest_bytes.len() > MAX_MANIFEST_SIZE {
        return Err(InteropError::OversizedManifest);
    }
    if !vm.add_gas(Fixed8(
        STORAGE_PRICE * (script.len() + manifest_bytes.len()) as i64,
    )) {
        return Err(InteropError::GasLimitExceeded);
    }
    let manifest = Manifest::from_bytes(&manifest_bytes)?;
    Ok(Contract::new(Bytes::new(script), manifest))
}

fn contract_create(ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let contract = contract_state_from_vm(ctx, vm)?;
    if ctx.dao.get_contract_state(&contract.script_hash()).is_some() {
        return Err(InteropError::ContractExists);
    }
    ctx.dao.put_contract_state(contract.clone());
    vm.estack().push_val(StackItem::new_interop(contract));
    Ok(())
}

fn contract_get_script(_ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let contract = pop_contract(vm)?;
    vm.estack().push_val(contract.script.to_vec());
    Ok(())
}

fn contract_is_payable(_ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let contract = pop_contract(vm)?;
    vm.estack().push_val(contract.is_payable());
    Ok(())
}

// Removes a contract and every one of its storage items.
fn destroy_by_hash(ctx: &mut Context, hash: &Uint160) {
    let Some(contract) = ctx.dao.get_contract_state(hash) else {
        return;
    };
    ctx.dao.delete_contract_state(hash);
    if contract.has_storage() {
        for key in ctx.dao.get_storage_items(hash).into_keys() {
            ctx.dao.delete_storage_item(hash, &key);
        }
    }
}

fn contract_destroy(ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    if ctx.trigger != super::Trigger::Application {
        return Err(InteropError::WrongTriggerForDestroy);
    }
    let hash = vm.current_script_hash()?;
    destroy_by_hash(ctx, &hash);
    Ok(())
}

fn contract_migrate(ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let old_hash = vm.current_script_hash()?;
    let old = ctx
        .dao
        .get_contract_state(&old_hash)
        .ok_or(InteropError::ContractMissing)?;

    let mut contract = contract_state_from_vm(ctx, vm)?;
    if contract.script.is_empty() {
        return Err(InteropError::InvalidScriptLen);
    }
    let new_hash = contract.script_hash();
    if new_hash == old_hash {
        return Err(InteropError::SameScript);
    }
    if ctx.dao.get_contract_state(&new_hash).is_some() {
        return Err(InteropError::ContractExists);
    }
    contract.id = old.id;
    ctx.dao.put_contract_state(contract.clone());

    if old.has_storage() {
        // TODO rehome items by contract id instead of script hash.
        for (key, mut item) in ctx.dao.get_storage_items(&old_hash) {
            item.is_const = false;
            ctx.dao.put_storage_item(&new_hash, &key, item);
        }
    }
    destroy_by_hash(ctx, &old_hash);

    vm.estack().push_val(StackItem::new_interop(contract));
    Ok(())
}

fn contract_get_storage_context(ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let contract = pop_contract(vm)?;
    let hash = contract.script_hash();
    if ctx.dao.get_contract_state(&hash).is_none() {
        return Err(InteropError::NonExistentContract);
    }
    // A writable context is only handed out for contracts created within
    // this very transaction: the lower view must not know the hash yet.
    if ctx.dao.parent().get_contract_state(&hash).is_some() {
        return Err(InteropError::NotCreatedInThisTransaction);
    }
    vm.estack().push_val(StackItem::new_interop(StorageContext {
        script_hash: hash,
        read_only: false,
    }));
    Ok(())
}

fn contract_call(ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let hash_bytes = vm.estack().pop()?.bytes()?;
    let method = vm.estack().pop()?.into_item();
    let args = vm.estack().pop()?.into_item();
    contract_call_internal(ctx, vm, &hash_bytes, method, args)
}

fn contract_call_ex(ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let hash_bytes = vm.estack().pop()?.bytes()?;
    let method = vm.estack().pop()?.into_item();
    let args = vm.estack().pop()?.into_item();
    let _flags = vm.estack().pop()?.big_int()?;
    contract_call_internal(ctx, vm, &hash_bytes, method, args)
}

fn contract_call_internal(
    ctx: &mut Context,
    vm: &mut Vm,
    hash_bytes: &[u8],
    method: StackItem,
    args: StackItem,
) -> Result<(), InteropError> {
    let hash = Uint160::from_slice(hash_bytes).ok_or(InteropError::InvalidContractHash)?;
    let callee = ctx
        .dao
        .get_contract_state(&hash)
        .ok_or(InteropError::ContractNotFound)?;
    let method_bytes = method.try_bytes()?;

    // An entry invocation has no deployed caller and skips the manifest
    // check entirely.
    if let Some(caller) = ctx.dao.get_contract_state(&vm.current_script_hash()?) {
        let method_name = String::from_utf8_lossy(&method_bytes);
        if !caller.manifest.can_call(&hash, &method_name) {
            return Err(InteropError::DisallowedMethodCall);
        }
    }

    vm.load_script(callee.script.clone());
    vm.estack().push_val(args);
    vm.estack().push_val(method);
    Ok(())
}
