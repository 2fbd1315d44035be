//! Per-frame execution context

use std::collections::BTreeSet;

use bytes::Bytes;
use tessera_primitives::Address;

use crate::context::CallContext;
use crate::error::{EvmError, EvmResult};
use crate::gas::GasSchedule;
use crate::memory::Memory;
use crate::opcode::Opcode;
use crate::result::Log;
use crate::stack::Stack;
use crate::word::Word;

/// Valid jump destinations of a code blob
#[derive(Clone, Debug, Default)]
pub struct JumpTable(Vec<bool>);

impl JumpTable {
    /// Scan `code` forward, marking JUMPDEST bytes that are not PUSH immediates
    pub fn analyze(code: &[u8]) -> Self {
        let mut valid = vec![false; code.len()];
        let mut i = 0;
        while i < code.len() {
            let opcode = Opcode::decode(code[i]);
            if opcode == Opcode::JUMPDEST {
                valid[i] = true;
            }
            i += 1 + opcode.immediate_len();
        }
        JumpTable(valid)
    }

    /// True if `dest` is a JUMPDEST outside PUSH data
    pub fn is_valid(&self, dest: usize) -> bool {
        self.0.get(dest).copied().unwrap_or(false)
    }
}

/// Mutable state of one executing frame.
///
/// Owns the code being run, its operand stack and memory, the gas meter and
/// everything the frame accumulates for its parent: logs, refunds and
/// self-destruct marks. A parent folds these in with [`Program::absorb`] only
/// when the child succeeds.
#[derive(Clone, Debug)]
pub struct Program {
    code: Bytes,
    jump_table: JumpTable,
    pc: usize,
    pub(crate) stack: Stack,
    pub(crate) memory: Memory,
    gas_limit: u64,
    gas_remaining: u64,
    refund: u64,
    logs: Vec<Log>,
    selfdestructs: BTreeSet<Address>,
    return_data: Bytes,
    context: CallContext,
}

impl Program {
    /// Fresh frame running `code` with `gas_limit` gas
    pub fn new(code: Bytes, context: CallContext, gas_limit: u64) -> Self {
        let jump_table = JumpTable::analyze(&code);
        Self {
            code,
            jump_table,
            pc: 0,
            stack: Stack::new(),
            memory: Memory::new(),
            gas_limit,
            gas_remaining: gas_limit,
            refund: 0,
            logs: Vec::new(),
            selfdestructs: BTreeSet::new(),
            return_data: Bytes::new(),
            context,
        }
    }

    /// Code being executed
    pub fn code(&self) -> &Bytes {
        &self.code
    }

    /// Program counter
    pub fn pc(&self) -> usize {
        self.pc
    }

    /// Move the program counter forward by `n` bytes
    pub(crate) fn advance(&mut self, n: usize) {
        self.pc = self.pc.saturating_add(n);
    }

    /// Jump to `dest`, which must be a valid JUMPDEST
    pub(crate) fn jump(&mut self, dest: Word) -> EvmResult<()> {
        let dest = dest.to_usize().unwrap_or(usize::MAX);
        if !self.jump_table.is_valid(dest) {
            return Err(EvmError::InvalidJumpDestination(dest));
        }
        self.pc = dest;
        Ok(())
    }

    /// True if `dest` is a valid jump destination
    pub fn is_valid_jump(&self, dest: usize) -> bool {
        self.jump_table.is_valid(dest)
    }

    /// Immediate of a `len`-byte PUSH at the current pc. Bytes past the end
    /// of the code read as zero.
    pub fn read_immediate(&self, len: usize) -> Word {
        let mut bytes = [0u8; 32];
        let start = self.pc.saturating_add(1).min(self.code.len());
        let end = start.saturating_add(len).min(self.code.len());
        bytes[..end - start].copy_from_slice(&self.code[start..end]);
        Word::from_be_slice(&bytes[..len.min(32)])
    }

    /// Operand stack
    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    /// Memory
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Gas left
    pub fn gas_remaining(&self) -> u64 {
        self.gas_remaining
    }

    /// Gas consumed so far
    pub fn gas_used(&self) -> u64 {
        self.gas_limit.saturating_sub(self.gas_remaining)
    }

    /// Deduct `amount`, failing with OutOfGas if not enough remains
    pub fn use_gas(&mut self, amount: u64) -> EvmResult<()> {
        if self.gas_remaining < amount {
            self.gas_remaining = 0;
            return Err(EvmError::OutOfGas);
        }
        self.gas_remaining -= amount;
        Ok(())
    }

    /// Credit back gas a child frame left unused
    pub fn return_gas(&mut self, amount: u64) {
        self.gas_remaining = self.gas_remaining.saturating_add(amount);
    }

    /// Charge for and perform memory growth covering `[offset, offset + len)`.
    ///
    /// Returns the range as native integers. A zero length never grows memory
    /// and yields `(0, 0)` whatever the offset. Offsets or lengths that cannot
    /// be addressed are out of gas.
    pub fn expand_memory(
        &mut self,
        offset: Word,
        len: Word,
        schedule: &GasSchedule,
    ) -> EvmResult<(usize, usize)> {
        if len.is_zero() {
            return Ok((0, 0));
        }
        let offset = offset.to_usize().ok_or(EvmError::OutOfGas)?;
        let len = len.to_usize().ok_or(EvmError::OutOfGas)?;
        let new_size = self
            .memory
            .required_size(offset, len)
            .ok_or(EvmError::OutOfGas)?;
        self.use_gas(schedule.memory_expansion_cost(self.memory.size(), new_size))?;
        self.memory.expand(offset, len);
        Ok((offset, len))
    }

    /// Accumulated refund
    pub fn refund(&self) -> u64 {
        self.refund
    }

    /// Add to the refund counter
    pub fn add_refund(&mut self, amount: u64) {
        self.refund = self.refund.saturating_add(amount);
    }

    /// Logs emitted by this frame and its successful children
    pub fn logs(&self) -> &[Log] {
        &self.logs
    }

    /// Append a log entry
    pub fn add_log(&mut self, log: Log) {
        self.logs.push(log);
    }

    /// Accounts marked for deletion
    pub fn selfdestructs(&self) -> &BTreeSet<Address> {
        &self.selfdestructs
    }

    /// Mark `address` for deletion. True the first time it is marked.
    pub fn mark_selfdestruct(&mut self, address: Address) -> bool {
        self.selfdestructs.insert(address)
    }

    /// Output of the most recent child frame
    pub fn return_data(&self) -> &Bytes {
        &self.return_data
    }

    /// Replace the return-data buffer
    pub fn set_return_data(&mut self, data: Bytes) {
        self.return_data = data;
    }

    /// Invocation context
    pub fn context(&self) -> &CallContext {
        &self.context
    }

    /// Fold in the effects of a successful child frame
    pub fn absorb(&mut self, logs: Vec<Log>, selfdestructs: BTreeSet<Address>, refund: u64) {
        self.logs.extend(logs);
        self.selfdestructs.extend(selfdestructs);
        self.add_refund(refund);
    }

    /// Take out everything the frame accumulated for its parent
    pub fn take_effects(&mut self) -> (Vec<Log>, BTreeSet<Address>, u64) {
        (
            std::mem::take(&mut self.logs),
            std::mem::take(&mut self.selfdestructs),
            std::mem::replace(&mut self.refund, 0),
        )
    }
}
