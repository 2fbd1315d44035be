//! Parse errors for fixed-width values

use thiserror::Error;

/// Failure to read an [`Address`](crate::Address) or [`H256`](crate::H256)
/// from text or bytes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrimitiveError {
    /// Input is not hex
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    /// Input has the wrong number of bytes
    #[error("expected {expected} bytes, got {got}")]
    InvalidLength {
        /// Width of the target type
        expected: usize,
        /// Bytes supplied
        got: usize,
    },
}

/// Copy `slice` into an array of exactly `N` bytes
pub(crate) fn fixed_from_slice<const N: usize>(slice: &[u8]) -> Result<[u8; N], PrimitiveError> {
    <[u8; N]>::try_from(slice).map_err(|_| PrimitiveError::InvalidLength {
        expected: N,
        got: slice.len(),
    })
}

/// Decode `0x`-prefixed or bare hex into exactly `N` bytes
pub(crate) fn fixed_from_hex<const N: usize>(s: &str) -> Result<[u8; N], PrimitiveError> {
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    let bytes = hex::decode(digits).map_err(|e| PrimitiveError::InvalidHex(e.to_string()))?;
    fixed_from_slice(&bytes)
}
