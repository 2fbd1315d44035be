//! Repository error types

use thiserror::Error;
use tessera_primitives::{Address, U256};

/// Repository errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// Balance would go negative
    #[error("insufficient balance for {address}: have {balance}, need {amount}")]
    InsufficientBalance {
        /// Debited account
        address: Address,
        /// Balance before the debit
        balance: U256,
        /// Requested debit
        amount: U256,
    },

    /// Nonce would exceed u64
    #[error("nonce overflow for {0}")]
    NonceOverflow(Address),

    /// Commit or rollback of a snapshot that is not the innermost one
    #[error("snapshot out of order: innermost is {expected}, got {got}")]
    SnapshotOrder {
        /// Innermost outstanding snapshot
        expected: usize,
        /// Snapshot passed in
        got: usize,
    },

    /// Commit or rollback with no outstanding snapshot
    #[error("no outstanding snapshot")]
    NoSnapshot,

    /// Failure inside a backing store
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result type for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;
