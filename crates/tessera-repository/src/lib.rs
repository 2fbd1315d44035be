//! # tessera-repository
//!
//! The account/storage view consumed by the Tessera VM.
//!
//! - [`Repository`]: account, balance, nonce, code and storage access plus
//!   nested snapshots (`start_tracking` / `commit` / `rollback`)
//! - [`MemoryRepository`]: in-memory implementation built from overlay layers

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod traits;
mod memory;

pub use error::{RepositoryError, RepositoryResult};
pub use traits::{AccountInfo, Repository, Snapshot};
pub use memory::{AccountDump, MemoryRepository};
