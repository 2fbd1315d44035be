//! Linear byte-addressable memory

use crate::word::Word;

/// Round a byte length up to whole 32-byte words
pub fn to_word_size(len: usize) -> usize {
    len.div_ceil(32)
}

/// Byte-addressable memory that only grows, in 32-byte steps.
///
/// Growth is priced by the gas model; callers charge for it through
/// [`Program::expand_memory`](crate::Program::expand_memory) before any access.
/// Every accessor still extends on its own so an access is never out of range.
#[derive(Clone, Debug, Default)]
pub struct Memory {
    data: Vec<u8>,
}

impl Memory {
    /// Create new empty memory
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Current size in bytes (always a multiple of 32)
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Size memory must reach to cover `[offset, offset + len)`, rounded up to
    /// a word boundary. A zero-length range needs no growth. `None` on overflow.
    pub fn required_size(&self, offset: usize, len: usize) -> Option<usize> {
        if len == 0 {
            return Some(self.data.len());
        }
        let end = offset.checked_add(len)?;
        let aligned = to_word_size(end).checked_mul(32)?;
        Some(aligned.max(self.data.len()))
    }

    /// Grow to cover `[offset, offset + len)`
    pub fn expand(&mut self, offset: usize, len: usize) {
        if let Some(size) = self.required_size(offset, len) {
            if size > self.data.len() {
                self.data.resize(size, 0);
            }
        }
    }

    /// Load a 32-byte word
    pub fn load_word(&mut self, offset: usize) -> Word {
        self.expand(offset, 32);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&self.data[offset..offset + 32]);
        Word::from_be_bytes(&bytes)
    }

    /// Store a 32-byte word
    pub fn store_word(&mut self, offset: usize, value: Word) {
        self.expand(offset, 32);
        self.data[offset..offset + 32].copy_from_slice(&value.to_be_bytes());
    }

    /// Store a single byte
    pub fn store_byte(&mut self, offset: usize, value: u8) {
        self.expand(offset, 1);
        self.data[offset] = value;
    }

    /// Read `len` bytes, growing memory to cover them
    pub fn load_slice(&mut self, offset: usize, len: usize) -> Vec<u8> {
        if len == 0 {
            return Vec::new();
        }
        self.expand(offset, len);
        self.data[offset..offset + len].to_vec()
    }

    /// Write `data` starting at `offset`
    pub fn store_slice(&mut self, offset: usize, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.expand(offset, data.len());
        self.data[offset..offset + data.len()].copy_from_slice(data);
    }

    /// Write `len` bytes taken from `source` at `source_offset`, zero-filling
    /// whatever lies past the end of `source`
    pub fn store_padded(&mut self, offset: usize, len: usize, source: &[u8], source_offset: usize) {
        if len == 0 {
            return;
        }
        self.expand(offset, len);
        let target = &mut self.data[offset..offset + len];
        let available = source.len().saturating_sub(source_offset).min(len);
        if available > 0 {
            target[..available].copy_from_slice(&source[source_offset..source_offset + available]);
        }
        target[available..].fill(0);
    }

    /// Copy `len` bytes from `src` to `dest`; ranges may overlap
    pub fn copy_within(&mut self, dest: usize, src: usize, len: usize) {
        if len == 0 {
            return;
        }
        self.expand(dest.max(src), len);
        self.data.copy_within(src..src + len, dest);
    }

    /// Get raw data slice
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}
