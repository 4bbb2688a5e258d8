//! Per-contract key/value storage services.
//!
//! Every mutating call enforces the same preconditions: an application
//! trigger, a writable context, a deployed contract with the storage
//! feature, a bounded key, and no constant item in the way.

use crate::core::dao::Dao;
use crate::core::interop::{
    pop_storage_context, Context, InteropError, Interops, StorageContext,
};
use crate::core::state::StorageItem;
use crate::virtual_machine::stack_item::StackItem;
use crate::virtual_machine::vm::{new_map_iterator, Vm};
use num_traits::ToPrimitive;

/// Maximum length of a storage key.
pub const MAX_STORAGE_KEY_LEN: usize = 1024;

pub(super) fn register(interops: &mut Interops) {
    interops.register("Neo.Storage.GetContext", storage_get_context);
    interops.register("Neo.Storage.GetReadOnlyContext", storage_get_read_only_context);
    interops.register("Neo.StorageContext.AsReadOnly", storage_context_as_read_only);
    interops.register("Neo.Storage.Get", storage_get);
    interops.register("Neo.Storage.Put", storage_put);
    interops.register("Neo.Storage.PutEx", storage_put_ex);
    interops.register("Neo.Storage.Delete", storage_delete);
    interops.register("Neo.Storage.Find", storage_find);
}

fn check_storage_context(ctx: &Context, stc: &StorageContext) -> Result<(), InteropError> {
    let contract = ctx
        .dao
        .get_contract_state(&stc.script_hash)
        .ok_or(InteropError::NoContractFound)?;
    if !contract.has_storage() {
        return Err(InteropError::NoStorageSupport(stc.script_hash));
    }
    Ok(())
}

fn storage_get_context(_ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let context = StorageContext {
        script_hash: vm.current_script_hash()?,
        read_only: false,
    };
    vm.estack().push_val(StackItem::new_interop(context));
    Ok(())
}

fn storage_get_read_only_context(_ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let context = StorageContext {
        script_hash: vm.current_script_hash()?,
        read_only: true,
    };
    vm.estack().push_val(StackItem::new_interop(context));
    Ok(())
}

fn storage_context_as_read_only(_ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let mut stc = pop_storage_context(vm)?;
    if !stc.read_only {
        stc = StorageContext {
            script_hash: stc.script_hash,
            read_only: true,
        };
    }
    vm.estack().push_val(StackItem::new_interop(stc));
    Ok(())
}

fn storage_get(ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let stc = pop_storage_context(vm)?;
    check_storage_context(ctx, &stc)?;
    let key = vm.estack().pop()?.bytes()?;
    match ctx.dao.get_storage_item(&stc.script_hash, &key) {
        Some(item) => vm.estack().push_val(item.value),
        None => vm.estack().push_val(Vec::<u8>::new()),
    }
    Ok(())
}

fn put_with_context_and_flags(
    ctx: &mut Context,
    stc: &StorageContext,
    key: &[u8],
    value: Vec<u8>,
    is_const: bool,
) -> Result<(), InteropError> {
    if !ctx.trigger.is_application() {
        return Err(InteropError::WrongTriggerForWrite);
    }
    if key.len() > MAX_STORAGE_KEY_LEN {
        return Err(InteropError::OversizedKey);
    }
    if stc.read_only {
        return Err(InteropError::ReadOnlyContext);
    }
    check_storage_context(ctx, stc)?;

    if let Some(existing) = ctx.dao.get_storage_item(&stc.script_hash, key) {
        if existing.is_const {
            return Err(InteropError::ConstItemExists);
        }
    }
    ctx.dao
        .put_storage_item(&stc.script_hash, key, StorageItem { value, is_const });
    Ok(())
}

// Unified body of Put and PutEx; the latter carries a flags argument whose
// bit 0 marks the item constant.
fn storage_put_internal(ctx: &mut Context, vm: &mut Vm, get_flag: bool) -> Result<(), InteropError> {
    let stc = pop_storage_context(vm)?;
    let key = vm.estack().pop()?.bytes()?;
    let value = vm.estack().pop()?.bytes()?;
    let flag = if get_flag {
        vm.estack().pop()?.big_int()?.to_i64().unwrap_or(0)
    } else {
        0
    };
    put_with_context_and_flags(ctx, &stc, &key, value, flag == 1)
}

fn storage_put(ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    storage_put_internal(ctx, vm, false)
}

fn storage_put_ex(ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    storage_put_internal(ctx, vm, true)
}

fn storage_delete(ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    if !ctx.trigger.is_application() {
        return Err(InteropError::WrongTriggerForWrite);
    }
    let stc = pop_storage_context(vm)?;
    if stc.read_only {
        return Err(InteropError::ReadOnlyContext);
    }
    check_storage_context(ctx, &stc)?;

    let key = vm.estack().pop()?.bytes()?;
    if let Some(existing) = ctx.dao.get_storage_item(&stc.script_hash, &key) {
        if existing.is_const {
            return Err(InteropError::ConstantItem);
        }
    }
    ctx.dao.delete_storage_item(&stc.script_hash, &key);
    Ok(())
}

fn storage_find(ctx: &mut Context, vm: &mut Vm) -> Result<(), InteropError> {
    let stc = pop_storage_context(vm)?;
    check_storage_context(ctx, &stc)?;
    let prefix = vm.estack().pop()?.bytes()?;

    let found = ctx
        .dao
        .get_storage_items_with_prefix(&stc.script_hash, &prefix);
    let mut entries: Vec<(Vec<u8>, Vec<u8>)> = found
        .into_iter()
        .map(|(suffix, item)| {
            let mut key = prefix.clone();
            key.extend_from_slice(&suffix);
            (key, item.value)
        })
        .collect();
    // Iteration order of find results is key byte order, ascending.
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let map = StackItem::new_map(
        entries
            .into_iter()
            .map(|(key, value)| (StackItem::ByteArray(key), StackItem::ByteArray(value)))
            .collect(),
    );
    let iterator = new_map_iterator(&map).ok_or(InteropError::NotAnIterator)?;
    vm.estack().push_val(iterator);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dao::{Dao, MemDao};
    use crate::core::interop::Trigger;
    use crate::core::state::{Contract, Features, Manifest};
    use crate::types::bytes::Bytes;
    use crate::utils::log::Logger;
    use crate::utils::test_utils::utils::random_u160;
    use crate::virtual_machine::vm::MapIterator;

    // Deploys a storage-enabled contract and returns a VM whose executing
    // script is that contract.
    fn deployed_vm(dao: &mut MemDao) -> (Vm, StorageContext) {
        let contract = Contract::new(
            Bytes::new(vec![0x40]),
            Manifest::new(Features {
                storage: true,
                payable: false,
            }),
        );
        let hash = contract.script_hash();
        dao.put_contract_state(contract);

        let mut vm = Vm::new();
        vm.load_script(Bytes::new(vec![0x40]));
        (
            vm,
            StorageContext {
                script_hash: hash,
                read_only: false,
            },
        )
    }

    fn ctx_with<'a>(dao: &'a MemDao, trigger: Trigger) -> Context<'a> {
        Context::new(trigger, None, None, dao, Logger::new("test"))
    }

    fn put(ctx: &mut Context, vm: &mut Vm, stc: StorageContext, key: &[u8], value: &[u8]) {
        vm.estack().push_val(value.to_vec());
        vm.estack().push_val(key.to_vec());
        vm.estack().push_val(StackItem::new_interop(stc));
        storage_put(ctx, vm).expect("put failed");
    }

    fn get(ctx: &mut Context, vm: &mut Vm, stc: StorageContext, key: &[u8]) -> Vec<u8> {
        vm.estack().push_val(key.to_vec());
        vm.estack().push_val(StackItem::new_interop(stc));
        storage_get(ctx, vm).expect("get failed");
        vm.estack().pop().unwrap().bytes().unwrap()
    }

    #[test]
    fn context_binds_executing_script() {
        let mut dao = MemDao::new();
        let (mut vm, stc) = deployed_vm(&mut dao);
        let mut ctx = ctx_with(&dao, Trigger::Application);

        storage_get_context(&mut ctx, &mut vm).unwrap();
        let element = vm.estack().pop().unwrap();
        let issued = element
            .item()
            .as_interop()
            .unwrap()
            .with(|c: &StorageContext| *c)
            .unwrap();
        assert_eq!(issued.script_hash, stc.script_hash);
        assert!(!issued.read_only);

        storage_get_read_only_context(&mut ctx, &mut vm).unwrap();
        let element = vm.estack().pop().unwrap();
        let issued = element
            .item()
            .as_interop()
            .unwrap()
            .with(|c: &StorageContext| *c)
            .unwrap();
        assert!(issued.read_only);
    }

    #[test]
    fn put_get_delete_roundtrip() {
        let mut dao = MemDao::new();
        let (mut vm, stc) = deployed_vm(&mut dao);
        let mut ctx = ctx_with(&dao, Trigger::Application);

        put(&mut ctx, &mut vm, stc, b"k", b"v");
        assert_eq!(get(&mut ctx, &mut vm, stc, b"k"), b"v");

        vm.estack().push_val(b"k".to_vec());
        vm.estack().push_val(StackItem::new_interop(stc));
        storage_delete(&mut ctx, &mut vm).unwrap();

        // A deleted key reads back as the empty byte array, not a fault.
        assert_eq!(get(&mut ctx, &mut vm, stc, b"k"), b"");
    }

    #[test]
    fn const_item_resists_overwrite_and_delete() {
        let mut dao = MemDao::new();
        let (mut vm, stc) = deployed_vm(&mut dao);
        let mut ctx = ctx_with(&dao, Trigger::Application);

        // PutEx with flag bit 0 set marks the item constant.
        vm.estack().push_val(1i64);
        vm.estack().push_val(b"v".to_vec());
        vm.estack().push_val(b"k".to_vec());
        vm.estack().push_val(StackItem::new_interop(stc));
        storage_put_ex(&mut ctx, &mut vm).unwrap();

        vm.estack().push_val(b"w".to_vec());
        vm.estack().push_val(b"k".to_vec());
        vm.estack().push_val(StackItem::new_interop(stc));
        assert_eq!(
            storage_put(&mut ctx, &mut vm),
            Err(InteropError::ConstItemExists)
        );

        vm.estack().push_val(b"k".to_vec());
        vm.estack().push_val(StackItem::new_interop(stc));
        assert_eq!(
            storage_delete(&mut ctx, &mut vm),
            Err(InteropError::ConstantItem)
        );

        assert_eq!(get(&mut ctx, &mut vm, stc, b"k"), b"v");
    }

    #[test]
    fn writes_require_application_trigger() {
        let mut dao = MemDao::new();
        let (mut vm, stc) = deployed_vm(&mut dao);
        let mut ctx = ctx_with(&dao, Trigger::Verification);

        vm.estack().push_val(b"v".to_vec());
        vm.estack().push_val(b"k".to_vec());
        vm.estack().push_val(StackItem::new_interop(stc));
        assert_eq!(
            storage_put(&mut ctx, &mut vm),
            Err(InteropError::WrongTriggerForWrite)
        );

        assert_eq!(
            storage_delete(&mut ctx, &mut vm),
            Err(InteropError::WrongTriggerForWrite)
        );
    }

    #[test]
    fn post_application_trigger_can_write() {
        let mut dao = MemDao::new();
        let (mut vm, stc) = deployed_vm(&mut dao);
        let mut ctx = ctx_with(&dao, Trigger::ApplicationR);
        put(&mut ctx, &mut vm, stc, b"k", b"v");
        assert_eq!(get(&mut ctx, &mut vm, stc, b"k"), b"v");
    }

    #[test]
    fn read_only_context_rejects_writes() {
        let mut dao = MemDao::new();
        let (mut vm, stc) = deployed_vm(&mut dao);
        let mut ctx = ctx_with(&dao, Trigger::Application);
        let ro = StorageContext {
            read_only: true,
            ..stc
        };

        vm.estack().push_val(b"v".to_vec());
        vm.estack().push_val(b"k".to_vec());
        vm.estack().push_val(StackItem::new_interop(ro));
        assert_eq!(
            storage_put(&mut ctx, &mut vm),
            Err(InteropError::ReadOnlyContext)
        );
    }

    #[test]
    fn as_read_only_is_a_one_way_downgrade() {
        let mut dao = MemDao::new();
        let (mut vm, stc) = deployed_vm(&mut dao);
        let mut ctx = ctx_with(&dao, Trigger::Application);

        vm.estack().push_val(StackItem::new_interop(stc));
        storage_context_as_read_only(&mut ctx, &mut vm).unwrap();
        let element = vm.estack().pop().unwrap();
        let downgraded = element
            .item()
            .as_interop()
            .unwrap()
            .with(|c: &StorageContext| *c)
            .unwrap();
        assert!(downgraded.read_only);

        // Downgrading again keeps it read-only.
        vm.estack().push_val(StackItem::new_interop(downgraded));
        storage_context_as_read_only(&mut ctx, &mut vm).unwrap();
        let element = vm.estack().pop().unwrap();
        let again = element
            .item()
            .as_interop()
            .unwrap()
            .with(|c: &StorageContext| *c)
            .unwrap();
        assert!(again.read_only);
    }

    #[test]
    fn oversized_key_rejected() {
        let mut dao = MemDao::new();
        let (mut vm, stc) = deployed_vm(&mut dao);
        let mut ctx = ctx_with(&dao, Trigger::Application);

        vm.estack().push_val(b"v".to_vec());
        vm.estack().push_val(vec![0u8; MAX_STORAGE_KEY_LEN + 1]);
        vm.estack().push_val(StackItem::new_interop(stc));
        assert_eq!(
            storage_put(&mut ctx, &mut vm),
            Err(InteropError::OversizedKey)
        );
    }

    #[test]
    fn storage_requires_deployed_contract_with_feature() {
        let mut dao = MemDao::new();
        // Contract exists but has no storage feature.
        let contract = Contract::new(Bytes::new(vec![0x41]), Manifest::new(Features::default()));
        let no_storage = contract.script_hash();
        dao.put_contract_state(contract);
        let mut ctx = ctx_with(&dao, Trigger::Application);
        let mut vm = Vm::new();

        vm.estack().push_val(b"k".to_vec());
        vm.estack().push_val(StackItem::new_interop(StorageContext {
            script_hash: no_storage,
            read_only: false,
        }));
        assert_eq!(
            storage_get(&mut ctx, &mut vm),
            Err(InteropError::NoStorageSupport(no_storage))
        );

        // No contract at all.
        let absent = random_u160();
        vm.estack().push_val(b"k".to_vec());
        vm.estack().push_val(StackItem::new_interop(StorageContext {
            script_hash: absent,
            read_only: false,
        }));
        assert_eq!(
            storage_get(&mut ctx, &mut vm),
            Err(InteropError::NoContractFound)
        );
    }

    #[test]
    fn find_returns_sorted_full_keys() {
        let mut dao = MemDao::new();
        let (mut vm, stc) = deployed_vm(&mut dao);
        let mut ctx = ctx_with(&dao, Trigger::Application);

        put(&mut ctx, &mut vm, stc, b"p\x03", b"3");
        put(&mut ctx, &mut vm, stc, b"p\x01", b"1");
        put(&mut ctx, &mut vm, stc, b"p\x02", b"2");
        put(&mut ctx, &mut vm, stc, b"q\x01", b"x");

        vm.estack().push_val(b"p".to_vec());
        vm.estack().push_val(StackItem::new_interop(stc));
        storage_find(&mut ctx, &mut vm).unwrap();

        let element = vm.estack().pop().unwrap();
        let handle = element.item().as_interop().unwrap();
        let mut keys = Vec::new();
        let mut values = Vec::new();
        handle
            .with_mut(|iter: &mut MapIterator| {
                while iter.advance() {
                    keys.push(iter.key().unwrap().try_bytes().unwrap());
                    values.push(iter.value().unwrap().try_bytes().unwrap());
                }
            })
            .unwrap();

        assert_eq!(keys, vec![b"p\x01".to_vec(), b"p\x02".to_vec(), b"p\x03".to_vec()]);
        assert_eq!(values, vec![b"1".to_vec(), b"2".to_vec(), b"3".to_vec()]);
    }

    #[test]
    fn overlay_keeps_writes_provisional() {
        let mut dao = MemDao::new();
        let (mut vm, stc) = deployed_vm(&mut dao);

        let changes = {
            let mut ctx = ctx_with(&dao, Trigger::Application);
            put(&mut ctx, &mut vm, stc, b"k", b"v");
            // The lower view has no such key until the host commits.
            assert!(ctx
                .dao
                .parent()
                .get_storage_item(&stc.script_hash, b"k")
                .is_none());
            ctx.dao.into_changes()
        };

        dao.apply(changes);
        assert_eq!(
            dao.get_storage_item(&stc.script_hash, b"k").unwrap().value,
            b"v"
        );
    }
}
