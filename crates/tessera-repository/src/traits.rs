//! Repository contract consumed by the VM

use bytes::Bytes;
use tessera_crypto::{keccak256, EMPTY_CODE_HASH};
use tessera_primitives::{Address, H256, U256};

use crate::error::RepositoryResult;

/// Account data
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountInfo {
    /// Account balance
    pub balance: U256,
    /// Account nonce
    pub nonce: u64,
    /// Contract code (empty for externally owned accounts)
    pub code: Bytes,
    /// keccak256 of `code`
    pub code_hash: H256,
}

impl AccountInfo {
    /// Create a new empty account
    pub fn new() -> Self {
        Self {
            balance: U256::zero(),
            nonce: 0,
            code: Bytes::new(),
            code_hash: EMPTY_CODE_HASH,
        }
    }

    /// Set the balance
    pub fn with_balance(mut self, balance: U256) -> Self {
        self.balance = balance;
        self
    }

    /// Set the code and its hash
    pub fn with_code(mut self, code: impl Into<Bytes>) -> Self {
        self.set_code(code.into());
        self
    }

    /// Replace the code and recompute its hash
    pub fn set_code(&mut self, code: Bytes) {
        self.code_hash = if code.is_empty() {
            EMPTY_CODE_HASH
        } else {
            keccak256(&code)
        };
        self.code = code;
    }

    /// Check if account is empty (EIP-161)
    pub fn is_empty(&self) -> bool {
        self.nonce == 0 && self.balance.is_zero() && self.code_hash == EMPTY_CODE_HASH
    }

    /// Check if account has code
    pub fn has_code(&self) -> bool {
        self.code_hash != EMPTY_CODE_HASH
    }
}

impl Default for AccountInfo {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for one outstanding restore point.
///
/// Snapshots nest LIFO. The handle is consumed by exactly one of
/// [`Repository::commit`] or [`Repository::rollback`].
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a snapshot must be committed or rolled back"]
pub struct Snapshot(usize);

impl Snapshot {
    /// Wrap a nesting depth (1 for the outermost snapshot).
    pub fn new(depth: usize) -> Self {
        Snapshot(depth)
    }

    /// Nesting depth of this snapshot
    pub fn depth(&self) -> usize {
        self.0
    }
}

/// Account and storage access with nested snapshots.
///
/// Reading an account that does not exist yields zero balance, zero nonce,
/// empty code and zero storage. Writing to one creates it.
pub trait Repository {
    /// Check if account exists
    fn account_exists(&self, address: &Address) -> RepositoryResult<bool>;

    /// Create an account, resetting nonce, code and storage.
    ///
    /// A balance already held at the address is kept.
    fn create_account(&mut self, address: &Address) -> RepositoryResult<()>;

    /// Remove an account together with its storage
    fn delete_account(&mut self, address: &Address) -> RepositoryResult<()>;

    /// Get account balance
    fn get_balance(&self, address: &Address) -> RepositoryResult<U256>;

    /// Credit an account, returning the new balance
    fn add_balance(&mut self, address: &Address, amount: U256) -> RepositoryResult<U256>;

    /// Debit an account, returning the new balance.
    ///
    /// Fails with `InsufficientBalance` instead of going negative.
    fn sub_balance(&mut self, address: &Address, amount: U256) -> RepositoryResult<U256>;

    /// Get account nonce
    fn get_nonce(&self, address: &Address) -> RepositoryResult<u64>;

    /// Increment the nonce, returning the new value
    fn increase_nonce(&mut self, address: &Address) -> RepositoryResult<u64>;

    /// Get contract code
    fn get_code(&self, address: &Address) -> RepositoryResult<Bytes>;

    /// Store contract code
    fn save_code(&mut self, address: &Address, code: Bytes) -> RepositoryResult<()>;

    /// Get code hash
    fn get_code_hash(&self, address: &Address) -> RepositoryResult<H256>;

    /// Get storage value; absent keys read as zero
    fn get_storage_value(&self, address: &Address, key: &H256) -> RepositoryResult<H256>;

    /// Set storage value; writing zero removes the row
    fn add_storage_row(&mut self, address: &Address, key: H256, value: H256) -> RepositoryResult<()>;

    /// Open a restore point
    fn start_tracking(&mut self) -> Snapshot;

    /// Keep every change made since `snapshot`, folding it into the enclosing one
    fn commit(&mut self, snapshot: Snapshot) -> RepositoryResult<()>;

    /// Discard every change made since `snapshot`
    fn rollback(&mut self, snapshot: Snapshot) -> RepositoryResult<()>;

    /// Move `value` between accounts
    fn transfer(&mut self, from: &Address, to: &Address, value: U256) -> RepositoryResult<()> {
        if value.is_zero() {
            return Ok(());
        }
        self.sub_balance(from, value)?;
        self.add_balance(to, value)?;
        Ok(())
    }

    /// Check if account is missing or empty (EIP-161)
    fn is_empty(&self, address: &Address) -> RepositoryResult<bool> {
        if !self.account_exists(address)? {
            return Ok(true);
        }
        Ok(self.get_nonce(address)? == 0
            && self.get_balance(address)?.is_zero()
            && self.get_code_hash(address)? == EMPTY_CODE_HASH)
    }
}
