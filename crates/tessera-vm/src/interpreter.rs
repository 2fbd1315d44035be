//! Bytecode interpreter

use bytes::Bytes;
use tessera_crypto::keccak256;
use tessera_primitives::{Address, U256};
use tessera_repository::Repository;

use crate::config::VmConfig;
use crate::context::{CallKind, CreateKind, Environment};
use crate::error::{EvmError, EvmResult};
use crate::gas::{all_but_one_64th, call_gas_limit};
use crate::opcode::Opcode;
use crate::program::Program;
use crate::result::Log;
use crate::stack::STACK_LIMIT;
use crate::word::Word;

/// Message call a frame wants to make
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    /// Call flavour
    pub kind: CallKind,
    /// Account named on the stack; its code runs in the child
    pub target: Address,
    /// Value operand (zero for DELEGATECALL and STATICCALL)
    pub value: U256,
    /// Call data copied out of memory
    pub input: Bytes,
    /// Gas handed to the child, stipend included
    pub gas: u64,
    /// Memory window receiving the child's output
    pub ret_offset: usize,
    /// Size of the output window
    pub ret_len: usize,
}

/// Contract creation a frame wants to make
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    /// CREATE or CREATE2
    pub kind: CreateKind,
    /// Endowment
    pub value: U256,
    /// Init code copied out of memory
    pub init_code: Bytes,
    /// Gas handed to the child
    pub gas: u64,
}

/// Why the interpreter stopped running a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interrupt {
    /// STOP, RETURN, SELFDESTRUCT or end of code
    Return(Bytes),
    /// REVERT with its payload
    Revert(Bytes),
    /// Suspended on a message call; pc already points past the CALL
    Call(CallRequest),
    /// Suspended on a creation; pc already points past the CREATE
    Create(CreateRequest),
}

enum Flow {
    Next,
    Jumped,
    Stop(Interrupt),
}

/// Executes opcodes against a [`Program`].
///
/// Holds only configuration; the frame state, the repository and the
/// environment are passed in on every call. Nested calls are not run here:
/// the interpreter suspends with [`Interrupt::Call`] or [`Interrupt::Create`]
/// and the orchestrator resumes the frame once the child is done.
#[derive(Debug, Clone, Default)]
pub struct Interpreter {
    config: VmConfig,
}

impl Interpreter {
    /// Create an interpreter with `config`
    pub fn new(config: VmConfig) -> Self {
        Self { config }
    }

    /// Configuration in use
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Run until the frame ends or suspends
    pub fn run<R: Repository>(
        &self,
        program: &mut Program,
        repo: &mut R,
        env: &Environment,
    ) -> EvmResult<Interrupt> {
        loop {
            if let Some(interrupt) = self.step(program, repo, env)? {
                return Ok(interrupt);
            }
        }
    }

    /// Execute one instruction
    pub fn step<R: Repository>(
        &self,
        program: &mut Program,
        repo: &mut R,
        env: &Environment,
    ) -> EvmResult<Option<Interrupt>> {
        let Some(&byte) = program.code().get(program.pc()) else {
            return Ok(Some(Interrupt::Return(Bytes::new())));
        };
        let opcode = Opcode::decode(byte);

        tracing::trace!(
            "pc={} op={} gas={} depth={}",
            program.pc(),
            opcode,
            program.gas_remaining(),
            program.context().depth
        );

        program.stack.require(opcode.inputs())?;
        if program.stack.len() - opcode.inputs() + opcode.outputs() > STACK_LIMIT {
            return Err(EvmError::StackOverflow);
        }
        program.use_gas(self.config.schedule.static_cost(opcode))?;
        if program.context().is_static && opcode.is_state_changing() {
            return Err(EvmError::StaticCallViolation);
        }

        match self.execute(opcode, program, repo, env)? {
            Flow::Next => {
                program.advance(1 + opcode.immediate_len());
                Ok(None)
            }
            Flow::Jumped => Ok(None),
            Flow::Stop(interrupt) => {
                program.advance(1 + opcode.immediate_len());
                Ok(Some(interrupt))
            }
        }
    }

    fn execute<R: Repository>(
        &self,
        opcode: Opcode,
        program: &mut Program,
        repo: &mut R,
        env: &Environment,
    ) -> EvmResult<Flow> {
        let schedule = &self.config.schedule;
        let stack = &mut program.stack;

        match opcode {
            Opcode::STOP => return Ok(Flow::Stop(Interrupt::Return(Bytes::new()))),

            // ==================== Arithmetic ====================
            Opcode::ADD => {
                let [a, b] = stack.pop_n()?;
                stack.push(a.wrapping_add(b))?;
            }
            Opcode::MUL => {
                let [a, b] = stack.pop_n()?;
                stack.push(a.wrapping_mul(b))?;
            }
            Opcode::SUB => {
                let [a, b] = stack.pop_n()?;
                stack.push(a.wrapping_sub(b))?;
            }
            Opcode::DIV => {
                let [a, b] = stack.pop_n()?;
                stack.push(a.div_or_zero(b))?;
            }
            Opcode::SDIV => {
                let [a, b] = stack.pop_n()?;
                stack.push(a.sdiv(b))?;
            }
            Opcode::MOD => {
                let [a, b] = stack.pop_n()?;
                stack.push(a.rem_or_zero(b))?;
            }
            Opcode::SMOD => {
                let [a, b] = stack.pop_n()?;
                stack.push(a.smod(b))?;
            }
            Opcode::ADDMOD => {
                let [a, b, n] = stack.pop_n()?;
                stack.push(a.addmod(b, n))?;
            }
            Opcode::MULMOD => {
                let [a, b, n] = stack.pop_n()?;
                stack.push(a.mulmod(b, n))?;
            }
            Opcode::EXP => {
                let [base, exponent] = stack.pop_n()?;
                program.use_gas(schedule.exp_cost(exponent))?;
                program.stack.push(base.wrapping_pow(exponent))?;
            }
            Opcode::SIGNEXTEND => {
                let [byte_index, value] = stack.pop_n()?;
                stack.push(value.sign_extend(byte_index))?;
            }

            // ==================== Comparison and bitwise ====================
            Opcode::LT => {
                let [a, b] = stack.pop_n()?;
                stack.push(Word::from_bool(a < b))?;
            }
            Opcode::GT => {
                let [a, b] = stack.pop_n()?;
                stack.push(Word::from_bool(a > b))?;
            }
            Opcode::SLT => {
                let [a, b] = stack.pop_n()?;
                stack.push(Word::from_bool(a.slt(&b)))?;
            }
            Opcode::SGT => {
                let [a, b] = stack.pop_n()?;
                stack.push(Word::from_bool(a.sgt(&b)))?;
            }
            Opcode::EQ => {
                let [a, b] = stack.pop_n()?;
                stack.push(Word::from_bool(a == b))?;
            }
            Opcode::ISZERO => {
                let a = stack.pop()?;
                stack.push(Word::from_bool(a.is_zero()))?;
            }
            Opcode::AND => {
                let [a, b] = stack.pop_n()?;
                stack.push(a & b)?;
            }
            Opcode::OR => {
                let [a, b] = stack.pop_n()?;
                stack.push(a | b)?;
            }
            Opcode::XOR => {
                let [a, b] = stack.pop_n()?;
                stack.push(a ^ b)?;
            }
            Opcode::NOT => {
                let a = stack.pop()?;
                stack.push(!a)?;
            }
            Opcode::BYTE => {
                let [index, value] = stack.pop_n()?;
                stack.push(value.byte(index))?;
            }
            Opcode::SHL => {
                let [shift, value] = stack.pop_n()?;
                stack.push(value.shift_left(shift))?;
            }
            Opcode::SHR => {
                let [shift, value] = stack.pop_n()?;
                stack.push(value.shift_right(shift))?;
            }
            Opcode::SAR => {
                let [shift, value] = stack.pop_n()?;
                stack.push(value.arithmetic_shift_right(shift))?;
            }

            Opcode::KECCAK256 => {
                let [offset, len] = stack.pop_n()?;
                let (offset, len) = program.expand_memory(offset, len, schedule)?;
                program.use_gas(schedule.keccak256_word_cost(len))?;
                let data = program.memory.load_slice(offset, len);
                program.stack.push(Word::from_h256(&keccak256(&data)))?;
            }

            // ==================== Environment ====================
            Opcode::ADDRESS => {
                let address = program.context().address;
                program.stack.push(Word::from_address(&address))?;
            }
            Opcode::BALANCE => {
                let address = stack.pop()?.to_address();
                stack.push(Word::new(repo.get_balance(&address)?))?;
            }
            Opcode::ORIGIN => stack.push(Word::from_address(&env.tx.origin))?,
            Opcode::CALLER => {
                let caller = program.context().caller;
                program.stack.push(Word::from_address(&caller))?;
            }
            Opcode::CALLVALUE => {
                let value = program.context().value;
                program.stack.push(Word::new(value))?;
            }
            Opcode::CALLDATALOAD => {
                let offset = program.stack.pop()?.to_usize().unwrap_or(usize::MAX);
                let data = &program.context().data;
                let mut bytes = [0u8; 32];
                if offset < data.len() {
                    let n = (data.len() - offset).min(32);
                    bytes[..n].copy_from_slice(&data[offset..offset + n]);
                }
                program.stack.push(Word::from_be_bytes(&bytes))?;
            }
            Opcode::CALLDATASIZE => {
                let len = program.context().data.len();
                program.stack.push(Word::from_usize(len))?;
            }
            Opcode::CALLDATACOPY => {
                let [dest, offset, len] = stack.pop_n()?;
                let data = program.context().data.clone();
                self.copy_to_memory(program, dest, len, &data, offset)?;
            }
            Opcode::CODESIZE => {
                let len = program.code().len();
                program.stack.push(Word::from_usize(len))?;
            }
            Opcode::CODECOPY => {
                let [dest, offset, len] = stack.pop_n()?;
                let code = program.code().clone();
                self.copy_to_memory(program, dest, len, &code, offset)?;
            }
            Opcode::GASPRICE => stack.push(Word::new(env.tx.gas_price))?,
            Opcode::EXTCODESIZE => {
                let address = stack.pop()?.to_address();
                stack.push(Word::from_usize(repo.get_code(&address)?.len()))?;
            }
            Opcode::EXTCODECOPY => {
                let [address, dest, offset, len] = stack.pop_n()?;
                let code = repo.get_code(&address.to_address())?;
                self.copy_to_memory(program, dest, len, &code, offset)?;
            }
            Opcode::RETURNDATASIZE => {
                let len = program.return_data().len();
                program.stack.push(Word::from_usize(len))?;
            }
            Opcode::RETURNDATACOPY => {
                let [dest, offset, len] = stack.pop_n()?;
                let available = program.return_data().len();
                let in_bounds = match (offset.to_usize(), len.to_usize()) {
                    (Some(o), Some(l)) => o.checked_add(l).is_some_and(|end| end <= available),
                    _ => false,
                };
                if !in_bounds {
                    return Err(EvmError::ReturnDataOutOfBounds);
                }
                let data = program.return_data().clone();
                self.copy_to_memory(program, dest, len, &data, offset)?;
            }
            Opcode::EXTCODEHASH => {
                let address = stack.pop()?.to_address();
                let hash = if repo.is_empty(&address)? {
                    Word::ZERO
                } else {
                    Word::from_h256(&repo.get_code_hash(&address)?)
                };
                stack.push(hash)?;
            }

            // ==================== Block ====================
            Opcode::BLOCKHASH => {
                let number = stack.pop()?;
                let hash = match number.to_u64() {
                    Some(n) => Word::from_h256(&env.block.block_hash(n)),
                    None => Word::ZERO,
                };
                stack.push(hash)?;
            }
            Opcode::COINBASE => stack.push(Word::from_address(&env.block.coinbase))?,
            Opcode::TIMESTAMP => stack.push(Word::from_u64(env.block.timestamp))?,
            Opcode::NUMBER => stack.push(Word::from_u64(env.block.number))?,
            Opcode::DIFFICULTY => stack.push(Word::new(env.block.difficulty))?,
            Opcode::GASLIMIT => stack.push(Word::from_u64(env.block.gas_limit))?,
            Opcode::CHAINID => stack.push(Word::from_u64(env.block.chain_id))?,
            Opcode::SELFBALANCE => {
                let balance = repo.get_balance(&program.context().address)?;
                program.stack.push(Word::new(balance))?;
            }
            Opcode::BASEFEE => stack.push(Word::new(env.block.base_fee))?,

            // ==================== Stack, memory, storage, flow ====================
            Opcode::POP => {
                stack.pop()?;
            }
            Opcode::MLOAD => {
                let offset = stack.pop()?;
                let (offset, _) = program.expand_memory(offset, Word::from_u64(32), schedule)?;
                let value = program.memory.load_word(offset);
                program.stack.push(value)?;
            }
            Opcode::MSTORE => {
                let [offset, value] = stack.pop_n()?;
                let (offset, _) = program.expand_memory(offset, Word::from_u64(32), schedule)?;
                program.memory.store_word(offset, value);
            }
            Opcode::MSTORE8 => {
                let [offset, value] = stack.pop_n()?;
                let (offset, _) = program.expand_memory(offset, Word::ONE, schedule)?;
                program.memory.store_byte(offset, value.low_u64() as u8);
            }
            Opcode::SLOAD => {
                let key = program.stack.pop()?;
                let value = repo.get_storage_value(&program.context().address, &key.to_h256())?;
                program.stack.push(Word::from_h256(&value))?;
            }
            Opcode::SSTORE => {
                let [key, value] = stack.pop_n()?;
                let address = program.context().address;
                let current = Word::from_h256(&repo.get_storage_value(&address, &key.to_h256())?);
                let cost = schedule.sstore_cost(current, value);
                program.use_gas(cost.gas)?;
                program.add_refund(cost.refund);
                repo.add_storage_row(&address, key.to_h256(), value.to_h256())?;
            }
            Opcode::JUMP => {
                let dest = stack.pop()?;
                program.jump(dest)?;
                return Ok(Flow::Jumped);
            }
            Opcode::JUMPI => {
                let [dest, condition] = stack.pop_n()?;
                if !condition.is_zero() {
                    program.jump(dest)?;
                    return Ok(Flow::Jumped);
                }
            }
            Opcode::PC => {
                let pc = program.pc();
                program.stack.push(Word::from_usize(pc))?;
            }
            Opcode::MSIZE => {
                let size = program.memory.size();
                program.stack.push(Word::from_usize(size))?;
            }
            Opcode::GAS => {
                let gas = program.gas_remaining();
                program.stack.push(Word::from_u64(gas))?;
            }
            Opcode::JUMPDEST => {}
            Opcode::MCOPY => {
                let [dest, src, len] = stack.pop_n()?;
                let (src, _) = program.expand_memory(src, len, schedule)?;
                let (dest, len) = program.expand_memory(dest, len, schedule)?;
                program.use_gas(schedule.copy_cost(len))?;
                program.memory.copy_within(dest, src, len);
            }

            Opcode::PUSH(n) => {
                let value = program.read_immediate(n as usize);
                program.stack.push(value)?;
            }
            Opcode::DUP(n) => stack.dup(n as usize)?,
            Opcode::SWAP(n) => stack.swap(n as usize)?,
            Opcode::LOG(n) => {
                let [offset, len] = stack.pop_n()?;
                let mut topics = Vec::with_capacity(n as usize);
                for _ in 0..n {
                    topics.push(stack.pop()?.to_h256());
                }
                let (offset, len) = program.expand_memory(offset, len, schedule)?;
                program.use_gas(schedule.log_data_cost(len))?;
                let data = Bytes::from(program.memory.load_slice(offset, len));
                let address = program.context().address;
                program.add_log(Log { address, topics, data });
            }

            // ==================== System ====================
            Opcode::CREATE => {
                let [value, offset, len] = stack.pop_n()?;
                let request = self.prepare_create(program, CreateKind::Create, value, offset, len)?;
                return Ok(Flow::Stop(request));
            }
            Opcode::CREATE2 => {
                let [value, offset, len, salt] = stack.pop_n()?;
                let kind = CreateKind::Create2 {
                    salt: salt.to_h256(),
                };
                let request = self.prepare_create(program, kind, value, offset, len)?;
                return Ok(Flow::Stop(request));
            }
            Opcode::CALL => return self.prepare_call(CallKind::Call, program, repo).map(Flow::Stop),
            Opcode::CALLCODE => {
                return self.prepare_call(CallKind::CallCode, program, repo).map(Flow::Stop)
            }
            Opcode::DELEGATECALL => {
                return self.prepare_call(CallKind::DelegateCall, program, repo).map(Flow::Stop)
            }
            Opcode::STATICCALL => {
                return self.prepare_call(CallKind::StaticCall, program, repo).map(Flow::Stop)
            }
            Opcode::RETURN => {
                let [offset, len] = stack.pop_n()?;
                let (offset, len) = program.expand_memory(offset, len, schedule)?;
                let data = Bytes::from(program.memory.load_slice(offset, len));
                return Ok(Flow::Stop(Interrupt::Return(data)));
            }
            Opcode::REVERT => {
                let [offset, len] = stack.pop_n()?;
                let (offset, len) = program.expand_memory(offset, len, schedule)?;
                let data = Bytes::from(program.memory.load_slice(offset, len));
                return Ok(Flow::Stop(Interrupt::Revert(data)));
            }
            Opcode::INVALID => return Err(EvmError::InvalidOpcode(opcode.byte())),
            Opcode::SELFDESTRUCT => {
                let beneficiary = stack.pop()?.to_address();
                let address = program.context().address;
                let balance = repo.get_balance(&address)?;
                if !balance.is_zero() && repo.is_empty(&beneficiary)? {
                    program.use_gas(schedule.selfdestruct_new_account)?;
                }
                if program.mark_selfdestruct(address) {
                    program.add_refund(schedule.selfdestruct_refund);
                }
                repo.transfer(&address, &beneficiary, balance)?;
                tracing::debug!("selfdestruct {} -> {} ({})", address, beneficiary, balance);
                return Ok(Flow::Stop(Interrupt::Return(Bytes::new())));
            }

            Opcode::UNDEFINED(byte) => return Err(EvmError::InvalidOpcode(byte)),
        }

        Ok(Flow::Next)
    }

    /// Charge for and copy `len` bytes of `source` at `source_offset` into memory at `dest`
    fn copy_to_memory(
        &self,
        program: &mut Program,
        dest: Word,
        len: Word,
        source: &[u8],
        source_offset: Word,
    ) -> EvmResult<()> {
        let schedule = &self.config.schedule;
        let (dest, len) = program.expand_memory(dest, len, schedule)?;
        program.use_gas(schedule.copy_cost(len))?;
        let source_offset = source_offset.to_usize().unwrap_or(usize::MAX);
        program.memory.store_padded(dest, len, source, source_offset);
        Ok(())
    }

    /// Pop CALL-family operands, charge everything but the child's own gas
    /// and build the request
    fn prepare_call<R: Repository>(
        &self,
        kind: CallKind,
        program: &mut Program,
        repo: &R,
    ) -> EvmResult<Interrupt> {
        let schedule = &self.config.schedule;
        let (gas, target, value, in_offset, in_len, out_offset, out_len) = match kind {
            CallKind::Call | CallKind::CallCode => {
                let [gas, target, value, in_offset, in_len, out_offset, out_len] =
                    program.stack.pop_n()?;
                (gas, target, value, in_offset, in_len, out_offset, out_len)
            }
            CallKind::DelegateCall | CallKind::StaticCall => {
                let [gas, target, in_offset, in_len, out_offset, out_len] = program.stack.pop_n()?;
                (gas, target, Word::ZERO, in_offset, in_len, out_offset, out_len)
            }
        };
        let target = target.to_address();
        let transfers_value = !value.is_zero();
        if kind == CallKind::Call && transfers_value && program.context().is_static {
            return Err(EvmError::StaticCallViolation);
        }

        let (in_offset, in_len) = program.expand_memory(in_offset, in_len, schedule)?;
        let (ret_offset, ret_len) = program.expand_memory(out_offset, out_len, schedule)?;

        let creates_account = kind == CallKind::Call && transfers_value && repo.is_empty(&target)?;
        program.use_gas(schedule.call_extra_cost(transfers_value, creates_account))?;

        let forwarded = call_gas_limit(gas, program.gas_remaining());
        program.use_gas(forwarded)?;
        let stipend = if transfers_value { schedule.call_stipend } else { 0 };

        let input = Bytes::from(program.memory.load_slice(in_offset, in_len));
        Ok(Interrupt::Call(CallRequest {
            kind,
            target,
            value: value.as_u256(),
            input,
            gas: forwarded.saturating_add(stipend),
            ret_offset,
            ret_len,
        }))
    }

    /// Charge a CREATE or CREATE2 and hand all but a 64th of the rest to the child
    fn prepare_create(
        &self,
        program: &mut Program,
        kind: CreateKind,
        value: Word,
        offset: Word,
        len: Word,
    ) -> EvmResult<Interrupt> {
        let schedule = &self.config.schedule;
        let limit = self.config.max_init_code_size;
        match len.to_usize() {
            Some(size) if size <= limit => {}
            size => {
                return Err(EvmError::InitCodeSizeExceeded {
                    size: size.unwrap_or(usize::MAX),
                    limit,
                })
            }
        }

        let (offset, len) = program.expand_memory(offset, len, schedule)?;
        let is_create2 = matches!(kind, CreateKind::Create2 { .. });
        program.use_gas(schedule.create_extra_cost(len, is_create2))?;
        let init_code = Bytes::from(program.memory.load_slice(offset, len));

        let gas = all_but_one_64th(program.gas_remaining());
        program.use_gas(gas)?;
        Ok(Interrupt::Create(CreateRequest {
            kind,
            value: value.as_u256(),
            init_code,
            gas,
        }))
    }
}
