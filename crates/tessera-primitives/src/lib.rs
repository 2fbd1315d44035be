//! # tessera-primitives
//!
//! Fixed-size value types shared by every Tessera crate.
//!
//! This crate provides:
//! - [`Address`]: 20-byte account address
//! - [`H256`]: 32-byte hash, storage key and storage value
//! - [`U256`]: re-exported from `primitive-types`, used for balances
//! - [`PrimitiveError`]: hex and length errors when parsing the above
//!
//! With the `rlp` feature both fixed-size types encode as RLP byte strings.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod address;
mod error;
mod hash;

pub use address::Address;
pub use error::PrimitiveError;
pub use hash::H256;

pub use primitive_types::U256;
