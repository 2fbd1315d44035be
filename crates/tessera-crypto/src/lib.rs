//! # tessera-crypto
//!
//! Hashing primitives used by the Tessera VM.
//!
//! - Keccak-256 hashing
//! - CREATE / CREATE2 contract address derivation

#![warn(missing_docs)]
#![warn(clippy::all)]

mod hash;
mod address;

pub use hash::{keccak256, EMPTY_CODE_HASH};
pub use address::{create_address, create2_address};
