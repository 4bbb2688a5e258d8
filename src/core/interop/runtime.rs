//! Execution-engine and runtime services: container introspection, script
//! hashes, trigger, time, logging, notifications and item serialization.

use crate::core::dao::Dao;
use crate::core::interop::{Context, InteropError, Interops};
use crate::core::state::NotificationEvent;
use crate::virtual_machine::serialization::{deserialize_item, serialize_item};
use crate::virtual_machine::stack_item::StackItem;
use crate::virtual_machine::vm::{MapIterator, Vm};

pub(super) fn register(interops: &mut Interops) {
    interops.register(
        "System.ExecutionEngine.GetScriptContainer",
        engine_get_script_container,
    );
    interops.register(
        "System.ExecutionEngine.GetExecutingScriptHash",
        engine_get_executing_script_hash,
    );
    interops.register(
        "System.ExecutionEngine.GetCallingScriptHash",
        engine_get_calling_script_hash,
    );
    interops.register(
        "System.ExecutionEngine.GetEntryScriptHash",
        engine_get_entry_script_hash,
    );
    interops.register("Neo.Runtime.Platform", runtime_platform);
    interops.register("Neo.Runtime.GetTrigger", runtime_get_trigger);
    interops.register("Neo.Runtime.GetTime", runtime_get_time);
    interops.register("Neo.Runtime.Log", runtime_log);
    interops.register("Neo.Runtime.Notify", runtime_notify);
    interops.register("Neo.Runtime.Serialize", runtime_serialize);
    interops.register("Neo.Runtime.Deserialize", runtime_deserialize);
    interops.register("Neo.Enumerator.Next", enumerator_next);
    interops.register("Neo.Enumerator.Value", enumerator_value);
    interops.register("Neo.Iterator.Key", iterator_key);
}

fn engine_get_script_container(ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    // An absent container still yields an interop handle; downstream
    // accessors then fail their type check the ordinary way.
    match &ctx.tx {
        Some(tx) => vm.estack().push_val(StackItem::new_interop(tx.clone())),
        None => vm.estack().push_val(StackItem::new_interop(())),
    }
    Ok(())
}

fn engine_get_executing_script_hash(_ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    Ok(vm.push_context_script_hash(0)?)
}

fn engine_get_calling_script_hash(_ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    Ok(vm.push_context_script_hash(1)?)
}

fn engine_get_entry_script_hash(_ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    Ok(vm.push_context_script_hash(vm.istack_len().saturating_sub(1))?)
}

fn runtime_platform(_ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    vm.estack().push_val(b"NEO".to_vec());
    Ok(())
}

fn runtime_get_trigger(ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    vm.estack().push_val(ctx.trigger as u8);
    Ok(())
}

fn runtime_get_time(ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let timestamp = match &ctx.block {
        Some(block) => block.base.timestamp,
        None => {
            let tip = ctx
                .dao
                .current_header_hash()
                .ok_or(InteropError::NoHeader)?;
            ctx.dao
                .get_header(&tip)
                .ok_or(InteropError::NoHeader)?
                .timestamp
        }
    };
    vm.estack().push_val(timestamp);
    Ok(())
}

fn runtime_log(ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let message = vm.estack().pop()?.bytes()?;
    let script = vm.current_script_hash()?;
    ctx.log.info(&format!(
        "runtime log script={} logs={:?}",
        script,
        String::from_utf8_lossy(&message)
    ));
    Ok(())
}

fn runtime_notify(ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    // The item can be just about anything, but it has to be serializable:
    // anything else is either a broken recursive structure or an interop
    // handle that is useless outside the host. Faulting would break blocks
    // already on the chain, so the notification is replaced instead.
    let mut item = vm.estack().pop()?.into_item();
    if let Err(e) = serialize_item(&item) {
        item = StackItem::ByteArray(format!("bad notification: {e}").into_bytes());
    }
    let script_hash = vm.current_script_hash()?;
    ctx.notifications.push(NotificationEvent { script_hash, item });
    Ok(())
}

fn runtime_serialize(_ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let item = vm.estack().pop()?.into_item();
    let bytes = serialize_item(&item)?;
    vm.estack().push_val(bytes);
    Ok(())
}

fn runtime_deserialize(_ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let bytes = vm.estack().pop()?.bytes()?;
    let item = deserialize_item(&bytes)?;
    vm.estack().push_val(item);
    Ok(())
}

fn enumerator_next(_ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let element = vm.estack().pop()?;
    let advanced = element
        .item()
        .as_interop()
        .and_then(|handle| handle.with_mut(MapIterator::advance))
        .ok_or(InteropError::NotAnIterator)?;
    vm.estack().push_val(advanced);
    Ok(())
}

fn enumerator_value(_ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let element = vm.estack().pop()?;
    let value = element
        .item()
        .as_interop()
        .and_then(|handle| handle.with(|iter: &MapIterator| iter.value()))
        .ok_or(InteropError::NotAnIterator)?
        .ok_or(InteropError::NotAnIterator)?;
    vm.estack().push_val(value);
    Ok(())
}

fn iterator_key(_ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let element = vm.estack().pop()?;
    let key = element
        .item()
        .as_interop()
        .and_then(|handle| handle.with(|iter: &MapIterator| iter.key()))
        .ok_or(InteropError::NotAnIterator)?
        .ok_or(InteropError::NotAnIterator)?;
    vm.estack().push_val(key);
    Ok(())
}
