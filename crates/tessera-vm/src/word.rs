//! 256-bit machine word

use std::fmt;
use std::ops::{BitAnd, BitOr, BitXor, Not};

use primitive_types::{U256, U512};
use tessera_primitives::{Address, H256};

/// 256-bit unsigned machine word.
///
/// Arithmetic wraps modulo 2^256. Signed operations read the word as
/// two's complement.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Word(U256);

impl Word {
    /// 0
    pub const ZERO: Word = Word(U256([0; 4]));
    /// 1
    pub const ONE: Word = Word(U256([1, 0, 0, 0]));
    /// 2^256 - 1
    pub const MAX: Word = Word(U256([u64::MAX; 4]));

    /// Wrap a U256
    pub const fn new(value: U256) -> Self {
        Word(value)
    }

    /// Inner U256
    pub fn as_u256(&self) -> U256 {
        self.0
    }

    /// From a u64
    pub fn from_u64(value: u64) -> Self {
        Word(U256::from(value))
    }

    /// From a usize
    pub fn from_usize(value: usize) -> Self {
        Word(U256::from(value))
    }

    /// 1 for true, 0 for false
    pub fn from_bool(value: bool) -> Self {
        if value {
            Self::ONE
        } else {
            Self::ZERO
        }
    }

    /// Decode 32 big-endian bytes
    pub fn from_be_bytes(bytes: &[u8; 32]) -> Self {
        Word(U256::from_big_endian(bytes))
    }

    /// Decode up to 32 big-endian bytes, treating missing leading bytes as zero
    pub fn from_be_slice(bytes: &[u8]) -> Self {
        let take = bytes.len().min(32);
        Word(U256::from_big_endian(&bytes[bytes.len() - take..]))
    }

    /// Encode as 32 big-endian bytes
    pub fn to_be_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        self.0.to_big_endian(&mut out);
        out
    }

    /// Reinterpret a storage slot
    pub fn from_h256(value: &H256) -> Self {
        Self::from_be_bytes(value.as_bytes())
    }

    /// Reinterpret as a storage slot
    pub fn to_h256(&self) -> H256 {
        H256::from_bytes(self.to_be_bytes())
    }

    /// Left-pad an address
    pub fn from_address(address: &Address) -> Self {
        Self::from_be_bytes(&address.to_word())
    }

    /// Low-order 20 bytes as an address
    pub fn to_address(&self) -> Address {
        Address::from_word(&self.to_be_bytes())
    }

    /// True if zero
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Low 64 bits, discarding the rest
    pub fn low_u64(&self) -> u64 {
        self.0.low_u64()
    }

    /// Value as u64, or `None` if it does not fit
    pub fn to_u64(&self) -> Option<u64> {
        if self.0.bits() > 64 {
            None
        } else {
            Some(self.0.low_u64())
        }
    }

    /// Value as u64, clamped to `u64::MAX`
    pub fn saturating_u64(&self) -> u64 {
        self.to_u64().unwrap_or(u64::MAX)
    }

    /// Value as usize, or `None` if it does not fit
    pub fn to_usize(&self) -> Option<usize> {
        self.to_u64().and_then(|v| usize::try_from(v).ok())
    }

    /// Number of significant bytes (0 for zero)
    pub fn byte_len(&self) -> u64 {
        (self.0.bits() as u64).div_ceil(8)
    }

    /// Sign bit set
    pub fn is_negative(&self) -> bool {
        self.0.bit(255)
    }

    // ==================== Unsigned arithmetic ====================

    /// a + b mod 2^256
    pub fn wrapping_add(self, other: Word) -> Word {
        Word(self.0.overflowing_add(other.0).0)
    }

    /// a - b mod 2^256
    pub fn wrapping_sub(self, other: Word) -> Word {
        Word(self.0.overflowing_sub(other.0).0)
    }

    /// a * b mod 2^256
    pub fn wrapping_mul(self, other: Word) -> Word {
        Word(self.0.overflowing_mul(other.0).0)
    }

    /// a / b, zero when b is zero
    pub fn div_or_zero(self, other: Word) -> Word {
        if other.is_zero() {
            return Word::ZERO;
        }
        Word(self.0 / other.0)
    }

    /// a % b, zero when b is zero
    pub fn rem_or_zero(self, other: Word) -> Word {
        if other.is_zero() {
            return Word::ZERO;
        }
        Word(self.0 % other.0)
    }

    /// (a + b) % n without intermediate overflow, zero when n is zero
    pub fn addmod(self, other: Word, modulus: Word) -> Word {
        if modulus.is_zero() {
            return Word::ZERO;
        }
        let sum = U512::from(self.0) + U512::from(other.0);
        Word(truncate(sum % U512::from(modulus.0)))
    }

    /// (a * b) % n without intermediate overflow, zero when n is zero
    pub fn mulmod(self, other: Word, modulus: Word) -> Word {
        if modulus.is_zero() {
            return Word::ZERO;
        }
        let product = self.0.full_mul(other.0);
        Word(truncate(product % U512::from(modulus.0)))
    }

    /// base^exp mod 2^256
    pub fn wrapping_pow(self, exponent: Word) -> Word {
        let mut base = self.0;
        let mut exp = exponent.0;
        let mut result = U256::one();
        while !exp.is_zero() {
            if exp.bit(0) {
                result = result.overflowing_mul(base).0;
            }
            base = base.overflowing_mul(base).0;
            exp = exp >> 1;
        }
        Word(result)
    }

    // ==================== Signed arithmetic ====================

    /// Two's complement negation
    pub fn negate(self) -> Word {
        Word((!self.0).overflowing_add(U256::one()).0)
    }

    fn abs(self) -> U256 {
        if self.is_negative() {
            self.negate().0
        } else {
            self.0
        }
    }

    /// Signed division, zero when b is zero. MIN / -1 wraps to MIN.
    pub fn sdiv(self, other: Word) -> Word {
        if other.is_zero() {
            return Word::ZERO;
        }
        let quotient = Word(self.abs() / other.abs());
        if self.is_negative() != other.is_negative() {
            quotient.negate()
        } else {
            quotient
        }
    }

    /// Signed remainder taking the dividend's sign, zero when b is zero
    pub fn smod(self, other: Word) -> Word {
        if other.is_zero() {
            return Word::ZERO;
        }
        let remainder = Word(self.abs() % other.abs());
        if self.is_negative() {
            remainder.negate()
        } else {
            remainder
        }
    }

    /// Signed less-than
    pub fn slt(&self, other: &Word) -> bool {
        match (self.is_negative(), other.is_negative()) {
            (true, false) => true,
            (false, true) => false,
            _ => self.0 < other.0,
        }
    }

    /// Signed greater-than
    pub fn sgt(&self, other: &Word) -> bool {
        other.slt(self)
    }

    /// Extend the sign of the low `byte_index + 1` bytes
    pub fn sign_extend(self, byte_index: Word) -> Word {
        let Some(index) = byte_index.to_u64().filter(|i| *i < 31) else {
            return self;
        };
        let sign_bit = (index * 8 + 7) as usize;
        let mask = (U256::one() << sign_bit) - U256::one();
        if self.0.bit(sign_bit) {
            Word(self.0 | !mask)
        } else {
            Word(self.0 & mask)
        }
    }

    // ==================== Bytes and shifts ====================

    /// Byte `index` counted from the most significant end, zero past 31
    pub fn byte(self, index: Word) -> Word {
        match index.to_usize().filter(|i| *i < 32) {
            Some(i) => Word::from_u64(self.to_be_bytes()[i] as u64),
            None => Word::ZERO,
        }
    }

    /// value << shift, zero for shifts of 256 or more
    pub fn shift_left(self, shift: Word) -> Word {
        match shift.to_usize().filter(|s| *s < 256) {
            Some(s) => Word(self.0 << s),
            None => Word::ZERO,
        }
    }

    /// Logical value >> shift, zero for shifts of 256 or more
    pub fn shift_right(self, shift: Word) -> Word {
        match shift.to_usize().filter(|s| *s < 256) {
            Some(s) => Word(self.0 >> s),
            None => Word::ZERO,
        }
    }

    /// Arithmetic value >> shift, filling with the sign bit
    pub fn arithmetic_shift_right(self, shift: Word) -> Word {
        let negative = self.is_negative();
        match shift.to_usize().filter(|s| *s < 256) {
            Some(0) => self,
            Some(s) if negative => Word((self.0 >> s) | (U256::MAX << (256 - s))),
            Some(s) => Word(self.0 >> s),
            None if negative => Word::MAX,
            None => Word::ZERO,
        }
    }
}

/// Low 256 bits of a 512-bit value
fn truncate(value: U512) -> U256 {
    let mut bytes = [0u8; 64];
    value.to_little_endian(&mut bytes);
    U256::from_little_endian(&bytes[..32])
}

impl BitAnd for Word {
    type Output = Word;

    fn bitand(self, rhs: Word) -> Word {
        Word(self.0 & rhs.0)
    }
}

impl BitOr for Word {
    type Output = Word;

    fn bitor(self, rhs: Word) -> Word {
        Word(self.0 | rhs.0)
    }
}

impl BitXor for Word {
    type Output = Word;

    fn bitxor(self, rhs: Word) -> Word {
        Word(self.0 ^ rhs.0)
    }
}

impl Not for Word {
    type Output = Word;

    fn not(self) -> Word {
        Word(!self.0)
    }
}

impl From<U256> for Word {
    fn from(value: U256) -> Self {
        Word(value)
    }
}

impl From<Word> for U256 {
    fn from(value: Word) -> Self {
        value.0
    }
}

impl From<u64> for Word {
    fn from(value: u64) -> Self {
        Word::from_u64(value)
    }
}

impl fmt::Debug for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Word({:#x})", self.0)
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
