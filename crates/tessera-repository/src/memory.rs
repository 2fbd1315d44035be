//! In-memory repository built from a base state and a stack of overlay layers

use std::collections::{BTreeMap, HashMap, HashSet};

use bytes::Bytes;
use tessera_crypto::EMPTY_CODE_HASH;
use tessera_primitives::{Address, H256, U256};

use crate::error::{RepositoryError, RepositoryResult};
use crate::traits::{AccountInfo, Repository, Snapshot};

/// Changes recorded since one snapshot.
#[derive(Debug, Default, Clone)]
struct Overlay {
    /// Touched accounts (None = deleted)
    accounts: HashMap<Address, Option<AccountInfo>>,
    /// Storage rows written in this layer
    storage: HashMap<(Address, H256), H256>,
    /// Accounts whose storage was cleared in this layer, before the rows above
    wiped: HashSet<Address>,
}

/// Flattened view of one account, used to compare whole states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountDump {
    /// Account balance
    pub balance: U256,
    /// Account nonce
    pub nonce: u64,
    /// Contract code
    pub code: Bytes,
    /// Nonzero storage rows
    pub storage: BTreeMap<H256, H256>,
}

/// Repository held entirely in memory.
///
/// `start_tracking` pushes an empty overlay. Reads consult overlays from the
/// innermost outwards and fall through to the base maps. `rollback` drops the
/// innermost overlay; `commit` folds it into the one beneath.
#[derive(Debug, Default, Clone)]
pub struct MemoryRepository {
    accounts: HashMap<Address, AccountInfo>,
    storage: HashMap<Address, HashMap<H256, H256>>,
    layers: Vec<Overlay>,
}

impl MemoryRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Install an account, replacing whatever was at the address
    pub fn insert_account(&mut self, address: Address, info: AccountInfo) {
        self.wipe_storage(&address);
        self.write_account(address, Some(info));
    }

    /// Number of outstanding snapshots
    pub fn tracking_depth(&self) -> usize {
        self.layers.len()
    }

    /// Every account with its nonzero storage, in address order
    pub fn dump(&self) -> BTreeMap<Address, AccountDump> {
        let mut addresses: HashSet<Address> = self.accounts.keys().copied().collect();
        for layer in &self.layers {
            addresses.extend(layer.accounts.keys().copied());
        }

        let mut out = BTreeMap::new();
        for address in addresses {
            let Some(info) = self.account(&address) else {
                continue;
            };
            out.insert(
                address,
                AccountDump {
                    balance: info.balance,
                    nonce: info.nonce,
                    code: info.code.clone(),
                    storage: self.storage_of(&address),
                },
            );
        }
        out
    }

    fn storage_of(&self, address: &Address) -> BTreeMap<H256, H256> {
        let mut rows: BTreeMap<H256, H256> = self
            .storage
            .get(address)
            .map(|slots| slots.iter().map(|(k, v)| (*k, *v)).collect())
            .unwrap_or_default();
        for layer in &self.layers {
            if layer.wiped.contains(address) {
                rows.clear();
            }
            for ((owner, key), value) in &layer.storage {
                if owner == address {
                    rows.insert(*key, *value);
                }
            }
        }
        rows.retain(|_, value| !value.is_zero());
        rows
    }

    fn account(&self, address: &Address) -> Option<&AccountInfo> {
        for layer in self.layers.iter().rev() {
            if let Some(entry) = layer.accounts.get(address) {
                return entry.as_ref();
            }
        }
        self.accounts.get(address)
    }

    fn slot(&self, address: &Address, key: &H256) -> H256 {
        for layer in self.layers.iter().rev() {
            if let Some(value) = layer.storage.get(&(*address, *key)) {
                return *value;
            }
            if layer.wiped.contains(address) {
                return H256::ZERO;
            }
        }
        self.storage
            .get(address)
            .and_then(|slots| slots.get(key))
            .copied()
            .unwrap_or(H256::ZERO)
    }

    fn write_account(&mut self, address: Address, info: Option<AccountInfo>) {
        match self.layers.last_mut() {
            Some(layer) => {
                layer.accounts.insert(address, info);
            }
            None => match info {
                Some(info) => {
                    self.accounts.insert(address, info);
                }
                None => {
                    self.accounts.remove(&address);
                }
            },
        }
    }

    fn write_slot(&mut self, address: Address, key: H256, value: H256) {
        match self.layers.last_mut() {
            Some(layer) => {
                layer.storage.insert((address, key), value);
            }
            None => {
                let slots = self.storage.entry(address).or_default();
                if value.is_zero() {
                    slots.remove(&key);
                } else {
                    slots.insert(key, value);
                }
            }
        }
    }

    fn wipe_storage(&mut self, address: &Address) {
        match self.layers.last_mut() {
            Some(layer) => {
                layer.storage.retain(|(owner, _), _| owner != address);
                layer.wiped.insert(*address);
            }
            None => {
                self.storage.remove(address);
            }
        }
    }

    fn modify<R>(
        &mut self,
        address: &Address,
        f: impl FnOnce(&mut AccountInfo) -> RepositoryResult<R>,
    ) -> RepositoryResult<R> {
        let mut info = self.account(address).cloned().unwrap_or_default();
        let out = f(&mut info)?;
        self.write_account(*address, Some(info));
        Ok(out)
    }

    fn merge(&mut self, overlay: Overlay) {
        for address in &overlay.wiped {
            self.wipe_storage(address);
        }
        for (address, info) in overlay.accounts {
            self.write_account(address, info);
        }
        for ((address, key), value) in overlay.storage {
            self.write_slot(address, key, value);
        }
    }

    fn check_innermost(&self, snapshot: &Snapshot) -> RepositoryResult<()> {
        let depth = self.layers.len();
        if depth == 0 {
            return Err(RepositoryError::NoSnapshot);
        }
        if snapshot.depth() != depth {
            return Err(RepositoryError::SnapshotOrder {
                expected: depth,
                got: snapshot.depth(),
            });
        }
        Ok(())
    }
}

impl Repository for MemoryRepository {
    fn account_exists(&self, address: &Address) -> RepositoryResult<bool> {
        Ok(self.account(address).is_some())
    }

    fn create_account(&mut self, address: &Address) -> RepositoryResult<()> {
        let balance = self.account(address).map(|a| a.balance).unwrap_or_default();
        self.wipe_storage(address);
        self.write_account(*address, Some(AccountInfo::new().with_balance(balance)));
        Ok(())
    }

    fn delete_account(&mut self, address: &Address) -> RepositoryResult<()> {
        self.wipe_storage(address);
        self.write_account(*address, None);
        Ok(())
    }

    fn get_balance(&self, address: &Address) -> RepositoryResult<U256> {
        Ok(self.account(address).map(|a| a.balance).unwrap_or_default())
    }

    fn add_balance(&mut self, address: &Address, amount: U256) -> RepositoryResult<U256> {
        self.modify(address, |account| {
            account.balance = account.balance.saturating_add(amount);
            Ok(account.balance)
        })
    }

    fn sub_balance(&mut self, address: &Address, amount: U256) -> RepositoryResult<U256> {
        self.modify(address, |account| {
            account.balance = account.balance.checked_sub(amount).ok_or(
                RepositoryError::InsufficientBalance {
                    address: *address,
                    balance: account.balance,
                    amount,
                },
            )?;
            Ok(account.balance)
        })
    }

    fn get_nonce(&self, address: &Address) -> RepositoryResult<u64> {
        Ok(self.account(address).map(|a| a.nonce).unwrap_or(0))
    }

    fn increase_nonce(&mut self, address: &Address) -> RepositoryResult<u64> {
        self.modify(address, |account| {
            account.nonce = account
                .nonce
                .checked_add(1)
                .ok_or(RepositoryError::NonceOverflow(*address))?;
            Ok(account.nonce)
        })
    }

    fn get_code(&self, address: &Address) -> RepositoryResult<Bytes> {
        Ok(self.account(address).map(|a| a.code.clone()).unwrap_or_default())
    }

    fn save_code(&mut self, address: &Address, code: Bytes) -> RepositoryResult<()> {
        self.modify(address, |account| {
            account.set_code(code);
            Ok(())
        })
    }

    fn get_code_hash(&self, address: &Address) -> RepositoryResult<H256> {
        Ok(self.account(address).map(|a| a.code_hash).unwrap_or(EMPTY_CODE_HASH))
    }

    fn get_storage_value(&self, address: &Address, key: &H256) -> RepositoryResult<H256> {
        Ok(self.slot(address, key))
    }

    fn add_storage_row(&mut self, address: &Address, key: H256, value: H256) -> RepositoryResult<()> {
        if self.account(address).is_none() {
            self.write_account(*address, Some(AccountInfo::new()));
        }
        self.write_slot(*address, key, value);
        Ok(())
    }

    fn start_tracking(&mut self) -> Snapshot {
        self.layers.push(Overlay::default());
        tracing::trace!("snapshot {} opened", self.layers.len());
        Snapshot::new(self.layers.len())
    }

    fn commit(&mut self, snapshot: Snapshot) -> RepositoryResult<()> {
        self.check_innermost(&snapshot)?;
        if let Some(overlay) = self.layers.pop() {
            tracing::trace!(
                "snapshot {} committed ({} accounts, {} rows)",
                snapshot.depth(),
                overlay.accounts.len(),
                overlay.storage.len()
            );
            self.merge(overlay);
        }
        Ok(())
    }

    fn rollback(&mut self, snapshot: Snapshot) -> RepositoryResult<()> {
        self.check_innermost(&snapshot)?;
        self.layers.pop();
        tracing::trace!("snapshot {} rolled back", snapshot.depth());
        Ok(())
    }
}
