//! Account addresses

use std::fmt;

use crate::error::{fixed_from_hex, fixed_from_slice, PrimitiveError};

/// 20-byte account address.
///
/// On the VM stack an address occupies the low-order 20 bytes of a word;
/// [`Address::from_word`] and [`Address::to_word`] convert between the two.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address([u8; 20]);

impl Address {
    /// Width in bytes
    pub const LEN: usize = 20;

    /// The all-zero address
    pub const ZERO: Address = Address([0u8; 20]);

    /// Wrap raw bytes
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Address(bytes)
    }

    /// Copy from a slice of exactly 20 bytes
    pub fn from_slice(slice: &[u8]) -> Result<Self, PrimitiveError> {
        fixed_from_slice(slice).map(Address)
    }

    /// Parse 40 hex digits, with or without a `0x` prefix
    pub fn from_hex(s: &str) -> Result<Self, PrimitiveError> {
        fixed_from_hex(s).map(Address)
    }

    /// Small numeric address, handy for fixtures
    pub fn from_low_u64_be(value: u64) -> Self {
        let mut bytes = [0u8; 20];
        bytes[12..].copy_from_slice(&value.to_be_bytes());
        Address(bytes)
    }

    /// Truncate a big-endian word to its low 20 bytes
    pub fn from_word(word: &[u8; 32]) -> Self {
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&word[12..]);
        Address(bytes)
    }

    /// Zero-extend to a big-endian word
    pub fn to_word(&self) -> [u8; 32] {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(&self.0);
        word
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// True for [`Address::ZERO`]
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Lowercase `0x`-prefixed hex
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Address(bytes)
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(feature = "rlp")]
impl rlp::Encodable for Address {
    fn rlp_append(&self, s: &mut rlp::RlpStream) {
        s.encoder().encode_value(&self.0);
    }
}
