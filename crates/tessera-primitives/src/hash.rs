//! 32-byte values: hashes, storage keys and storage values

use std::fmt;

use primitive_types::U256;

use crate::error::{fixed_from_hex, fixed_from_slice, PrimitiveError};

/// Big-endian 32-byte value.
///
/// Byte order matches numeric order, so `Ord` sorts storage slots the same
/// way as the words they came from.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct H256([u8; 32]);

impl H256 {
    /// Width in bytes
    pub const LEN: usize = 32;

    /// The all-zero value; also the content of every unwritten slot
    pub const ZERO: H256 = H256([0u8; 32]);

    /// Wrap raw bytes
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        H256(bytes)
    }

    /// Copy from a slice of exactly 32 bytes
    pub fn from_slice(slice: &[u8]) -> Result<Self, PrimitiveError> {
        fixed_from_slice(slice).map(H256)
    }

    /// Parse 64 hex digits, with or without a `0x` prefix
    pub fn from_hex(s: &str) -> Result<Self, PrimitiveError> {
        fixed_from_hex(s).map(H256)
    }

    /// Slot number `value`
    pub fn from_low_u64_be(value: u64) -> Self {
        Self::from_u256(U256::from(value))
    }

    /// Big-endian bytes of `value`
    pub fn from_u256(value: U256) -> Self {
        let mut bytes = [0u8; 32];
        value.to_big_endian(&mut bytes);
        H256(bytes)
    }

    /// Numeric value
    pub fn to_u256(&self) -> U256 {
        U256::from_big_endian(&self.0)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// True for [`H256::ZERO`]
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Lowercase `0x`-prefixed hex
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "H256({})", self.to_hex())
    }
}

impl fmt::Display for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<[u8; 32]> for H256 {
    fn from(bytes: [u8; 32]) -> Self {
        H256(bytes)
    }
}

impl From<U256> for H256 {
    fn from(value: U256) -> Self {
        H256::from_u256(value)
    }
}

impl From<H256> for U256 {
    fn from(value: H256) -> Self {
        value.to_u256()
    }
}

impl AsRef<[u8]> for H256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(feature = "rlp")]
impl rlp::Encodable for H256 {
    fn rlp_append(&self, s: &mut rlp::RlpStream) {
        s.encoder().encode_value(&self.0);
    }
}
