//! The transactional key/value view the execution core reads and writes.
//!
//! [`Dao`] is the seam between the core and whatever storage engine the
//! host runs on. [`MemDao`] is the in-memory reference implementation;
//! [`OverlayDao`] buffers the writes of one invocation on top of a parent
//! view, so the host can commit or discard them as a unit. The parent is
//! also the "lower" view the contract lifecycle consults to decide whether
//! a contract was created within the current transaction.

use crate::core::block::{Base, Block};
use crate::core::state::{Account, Contract, StorageItem};
use crate::core::transaction::Transaction;
use crate::types::hash::{Uint160, Uint256};
use std::collections::BTreeMap;

/// The abstract state view consumed by the interop layer.
///
/// Implementations are not required to be thread-safe: an invocation owns
/// its overlay exclusively.
pub trait Dao {
    fn get_contract_state(&self, hash: &Uint160) -> Option<Contract>;
    fn put_contract_state(&mut self, contract: Contract);
    fn delete_contract_state(&mut self, hash: &Uint160);

    fn get_storage_item(&self, hash: &Uint160, key: &[u8]) -> Option<StorageItem>;
    fn put_storage_item(&mut self, hash: &Uint160, key: &[u8], item: StorageItem);
    fn delete_storage_item(&mut self, hash: &Uint160, key: &[u8]);
    /// All storage entries of a contract, keyed by full key.
    fn get_storage_items(&self, hash: &Uint160) -> BTreeMap<Vec<u8>, StorageItem>;
    /// Entries whose key starts with `prefix`, keyed by the suffix after it.
    fn get_storage_items_with_prefix(
        &self,
        hash: &Uint160,
        prefix: &[u8],
    ) -> BTreeMap<Vec<u8>, StorageItem>;

    /// The account state at `hash`, or a fresh empty one.
    fn get_account_state_or_new(&self, hash: &Uint160) -> Account;

    /// A stored transaction and the height of its block.
    fn get_transaction(&self, hash: &Uint256) -> Option<(Transaction, u32)>;

    fn block_height(&self) -> u32;
    fn get_header_hash(&self, height: u32) -> Option<Uint256>;
    fn current_header_hash(&self) -> Option<Uint256>;
    fn get_block(&self, hash: &Uint256) -> Option<Block>;
    fn get_header(&self, hash: &Uint256) -> Option<Base>;
}

/// In-memory DAO backing tests and light-weight hosts.
#[derive(Default)]
pub struct MemDao {
    contracts: BTreeMap<Uint160, Contract>,
    storage: BTreeMap<Uint160, BTreeMap<Vec<u8>, StorageItem>>,
    accounts: BTreeMap<Uint160, Account>,
    transactions: BTreeMap<Uint256, (Transaction, u32)>,
    blocks: BTreeMap<Uint256, Block>,
    header_hashes: Vec<Uint256>,
}

impl MemDao {
    pub fn new() -> MemDao {
        MemDao::default()
    }

    /// Indexes a finished block: header hash by height, transactions by
    /// hash, the block itself by its hash.
    pub fn store_block(&mut self, block: Block) {
        let hash = block.hash();
        let index = block.base.index as usize;
        if self.header_hashes.len() <= index {
            self.header_hashes.resize(index + 1, Uint256::zero());
        }
        self.header_hashes[index] = hash;
        for tx in &block.transactions {
            self.transactions
                .insert(tx.hash(), (tx.clone(), block.base.index));
        }
        self.blocks.insert(hash, block);
    }

    pub fn put_account_state(&mut self, account: Account) {
        self.accounts.insert(account.script_hash, account);
    }

    /// Applies the buffered changes of a committed invocation.
    pub fn apply(&mut self, changes: DaoChanges) {
        for (hash, contract) in changes.contracts {
            match contract {
                Some(contract) => self.contracts.insert(hash, contract),
                None => self.contracts.remove(&hash),
            };
        }
        for (hash, key, item) in changes.storage {
            let entries = self.storage.entry(hash).or_default();
            match item {
                Some(item) => entries.insert(key, item),
                None => entries.remove(&key),
            };
        }
    }
}

impl Dao for MemDao {
    fn get_contract_state(&self, hash: &Uint160) -> Option<Contract> {
        self.contracts.get(hash).cloned()
    }

    fn put_contract_state(&mut self, contract: Contract) {
        self.contracts.insert(contract.script_hash(), contract);
    }

    fn delete_contract_state(&mut self, hash: &Uint160) {
        self.contracts.remove(hash);
    }

    fn get_storage_item(&self, hash: &Uint160, key: &[u8]) -> Option<StorageItem> {
        self.storage.get(hash)?.get(key).cloned()
    }

    fn put_storage_item(&mut self, hash: &Uint160, key: &[u8], item: StorageItem) {
        self.storage
            .entry(*hash)
            .or_default()
            .insert(key.to_vec(), item);
    }

    fn delete_storage_item(&mut self, hash: &Uint160, key: &[u8]) {
        if let Some(entries) = self.storage.get_mut(hash) {
            entries.remove(key);
        }
    }

    fn get_storage_items(&self, hash: &Uint160) -> BTreeMap<Vec<u8>, StorageItem> {
        self.storage.get(hash).cloned().unwrap_or_default()
    }

    fn get_storage_items_with_prefix(
        &self,
        hash: &Uint160,
        prefix: &[u8],
    ) -> BTreeMap<Vec<u8>, StorageItem> {
        let Some(entries) = self.storage.get(hash) else {
            return BTreeMap::new();
        };
        entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, item)| (key[prefix.len()..].to_vec(), item.clone()))
            .collect()
    }

    fn get_account_state_or_new(&self, hash: &Uint160) -> Account {
        self.accounts
            .get(hash)
            .cloned()
            .unwrap_or_else(|| Account::new(*hash))
    }

    fn get_transaction(&self, hash: &Uint256) -> Option<(Transaction, u32)> {
        self.transactions.get(hash).cloned()
    }

    fn block_height(&self) -> u32 {
        self.header_hashes.len().saturating_sub(1) as u32
    }

    fn get_header_hash(&self, height: u32) -> Option<Uint256> {
        self.header_hashes.get(height as usize).copied()
    }

    fn current_header_hash(&self) -> Option<Uint256> {
        self.header_hashes.last().copied()
    }

    fn get_block(&self, hash: &Uint256) -> Option<Block> {
        self.blocks.get(hash).cloned()
    }

    fn get_header(&self, hash: &Uint256) -> Option<Base> {
        self.blocks.get(hash).map(Block::header)
    }
}

/// The buffered contract and storage writes of one invocation. `None`
/// values are deletions.
#[derive(Debug, Default)]
pub struct DaoChanges {
    pub contracts: Vec<(Uint160, Option<Contract>)>,
    pub storage: Vec<(Uint160, Vec<u8>, Option<StorageItem>)>,
}

/// Buffered view over a parent DAO.
///
/// Contract and storage mutations land in the overlay; reads fall through
/// to the parent for anything not written here. Chain queries (blocks,
/// headers, transactions, accounts) always come from the parent, which the
/// core never mutates.
pub struct OverlayDao<'a> {
    parent: &'a dyn Dao,
    contracts: BTreeMap<Uint160, Option<Contract>>,
    storage: BTreeMap<Uint160, BTreeMap<Vec<u8>, Option<StorageItem>>>,
}

impl<'a> OverlayDao<'a> {
    pub fn new(parent: &'a dyn Dao) -> OverlayDao<'a> {
        OverlayDao {
            parent,
            contracts: BTreeMap::new(),
            storage: BTreeMap::new(),
        }
    }

    /// The lower view: state as it was before this invocation.
    pub fn parent(&self) -> &dyn Dao {
        self.parent
    }

    /// Consumes the overlay into its pending changes, for the host to
    /// commit. Discarding the overlay instead drops them.
    pub fn into_changes(self) -> DaoChanges {
        DaoChanges {
            contracts: self.contracts.into_iter().collect(),
            storage: self
                .storage
                .into_iter()
                .flat_map(|(hash, entries)| {
                    entries
                        .into_iter()
                        .map(move |(key, item)| (hash, key, item))
                })
                .collect(),
        }
    }
}

impl Dao for OverlayDao<'_> {
    fn get_contract_state(&self, hash: &Uint160) -> Option<Contract> {
        match self.contracts.get(hash) {
            Some(entry) => entry.clone(),
            None => self.parent.get_contract_state(hash),
        }
    }

    fn put_contract_state(&mut self, contract: Contract) {
        self.contracts
            .insert(contract.script_hash(), Some(contract));
    }

    fn delete_contract_state(&mut self, hash: &Uint160) {
        self.contracts.insert(*hash, None);
    }

    fn get_storage_item(&self, hash: &Uint160, key: &[u8]) -> Option<StorageItem> {
        if let Some(entries) = self.storage.get(hash) {
            if let Some(entry) = entries.get(key) {
                return entry.clone();
            }
        }
        self.parent.get_storage_item(hash, key)
    }

    fn put_storage_item(&mut self, hash: &Uint160, key: &[u8], item: StorageItem) {
        self.storage
            .entry(*hash)
            .or_default()
            .insert(key.to_vec(), Some(item));
    }

    fn delete_storage_item(&mut self, hash: &Uint160, key: &[u8]) {
        self.storage
            .entry(*hash)
            .or_default()
            .insert(key.to_vec(), None);
    }

    fn get_storage_items(&self, hash: &Uint160) -> BTreeMap<Vec<u8>, StorageItem> {
        let mut items = self.parent.get_storage_items(hash);
        if let Some(entries) = self.storage.get(hash) {
            for (key, entry) in entries {
                match entry {
                    Some(item) => {
                        items.insert(key.clone(), item.clone());
                    }
                    None => {
                        items.remove(key);
                    }
                }
            }
        }
        items
    }

    fn get_storage_items_with_prefix(
        &self,
        hash: &Uint160,
        prefix: &[u8],
    ) -> BTreeMap<Vec<u8>, StorageItem> {
        self.get_storage_items(hash)
            .into_iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, item)| (key[prefix.len()..].to_vec(), item))
            .collect()
    }

    fn get_account_state_or_new(&self, hash: &Uint160) -> Account {
        self.parent.get_account_state_or_new(hash)
    }

    fn get_transaction(&self, hash: &Uint256) -> Option<(Transaction, u32)> {
        self.parent.get_transaction(hash)
    }

    fn block_height(&self) -> u32 {
        self.parent.block_height()
    }

    fn get_header_hash(&self, height: u32) -> Option<Uint256> {
        self.parent.get_header_hash(height)
    }

    fn current_header_hash(&self) -> Option<Uint256> {
        self.parent.current_header_hash()
    }

    fn get_block(&self, hash: &Uint256) -> Option<Block> {
        self.parent.get_block(hash)
    }

    fn get_header(&self, hash: &Uint256) -> Option<Base> {
        self.parent.get_header(hash)
    }
}
