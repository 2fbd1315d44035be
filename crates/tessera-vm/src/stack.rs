//! Operand stack

use crate::error::{EvmError, EvmResult};
use crate::word::Word;

/// Maximum number of words on the stack
pub const STACK_LIMIT: usize = 1024;

/// Bounded LIFO of words
#[derive(Clone, Debug)]
pub struct Stack {
    data: Vec<Word>,
}

impl Stack {
    /// Create a new empty stack
    pub fn new() -> Self {
        Self {
            data: Vec::with_capacity(32),
        }
    }

    /// Push a value onto the stack
    pub fn push(&mut self, value: Word) -> EvmResult<()> {
        if self.data.len() >= STACK_LIMIT {
            return Err(EvmError::StackOverflow);
        }
        self.data.push(value);
        Ok(())
    }

    /// Pop a value from the stack
    pub fn pop(&mut self) -> EvmResult<Word> {
        self.data.pop().ok_or(EvmError::StackUnderflow)
    }

    /// Pop `N` values, top of stack first
    pub fn pop_n<const N: usize>(&mut self) -> EvmResult<[Word; N]> {
        self.require(N)?;
        let mut out = [Word::ZERO; N];
        for slot in out.iter_mut() {
            *slot = self.pop()?;
        }
        Ok(out)
    }

    /// Value at `depth` (0 = top)
    pub fn peek(&self, depth: usize) -> EvmResult<Word> {
        if depth >= self.data.len() {
            return Err(EvmError::StackUnderflow);
        }
        Ok(self.data[self.data.len() - 1 - depth])
    }

    /// Fail with StackUnderflow unless at least `n` items are present
    pub fn require(&self, n: usize) -> EvmResult<()> {
        if self.data.len() < n {
            return Err(EvmError::StackUnderflow);
        }
        Ok(())
    }

    /// Swap top with item at depth (1 = second item)
    pub fn swap(&mut self, depth: usize) -> EvmResult<()> {
        if depth == 0 || depth >= self.data.len() {
            return Err(EvmError::StackUnderflow);
        }
        let len = self.data.len();
        self.data.swap(len - 1, len - 1 - depth);
        Ok(())
    }

    /// Duplicate item at depth to top (1 = top)
    pub fn dup(&mut self, depth: usize) -> EvmResult<()> {
        if depth == 0 || depth > self.data.len() {
            return Err(EvmError::StackUnderflow);
        }
        let value = self.data[self.data.len() - depth];
        self.push(value)
    }

    /// Get current stack size
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if stack is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Items bottom to top
    pub fn as_slice(&self) -> &[Word] {
        &self.data
    }
}

impl Default for Stack {
    fn default() -> Self {
        Self::new()
    }
}
