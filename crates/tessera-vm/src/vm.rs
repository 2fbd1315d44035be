//! Call and create orchestration.
//!
//! [`Vm`] runs a transaction as an explicit stack of frames. Each frame owns
//! a [`Program`] and the repository snapshot opened when it was entered. When
//! the interpreter suspends a frame on CALL or CREATE the orchestrator pushes
//! the child; when a frame ends its snapshot is committed or rolled back and
//! the parent resumes with the outcome on its stack.

use std::collections::BTreeSet;

use bytes::Bytes;
use tessera_crypto::{create2_address, create_address, EMPTY_CODE_HASH};
use tessera_primitives::{Address, U256};
use tessera_repository::{Repository, Snapshot};

use crate::config::VmConfig;
use crate::context::{CallContext, CallKind, CallMessage, CreateKind, CreateMessage, Environment};
use crate::error::{EvmError, EvmResult};
use crate::interpreter::{CallRequest, CreateRequest, Interpreter, Interrupt};
use crate::program::Program;
use crate::result::{ExecutionResult, Log, Outcome};
use crate::word::Word;

/// Where a finished frame's output goes
#[derive(Debug, Clone, Copy)]
enum FrameKind {
    Call { ret_offset: usize, ret_len: usize },
    Create { address: Address },
}

struct Frame {
    program: Program,
    snapshot: Snapshot,
    kind: FrameKind,
}

/// What a finished frame hands back to its parent
struct FrameExit {
    outcome: Outcome,
    output: Bytes,
    gas_left: u64,
    logs: Vec<Log>,
    selfdestructs: BTreeSet<Address>,
    refund: u64,
}

/// Transaction-level virtual machine
#[derive(Debug, Clone, Default)]
pub struct Vm {
    interpreter: Interpreter,
}

impl Vm {
    /// Create a VM, rejecting invalid configuration
    pub fn new(config: VmConfig) -> EvmResult<Self> {
        config.validate()?;
        Ok(Self {
            interpreter: Interpreter::new(config),
        })
    }

    /// Configuration in use
    pub fn config(&self) -> &VmConfig {
        self.interpreter.config()
    }

    /// Execute a message-call transaction.
    ///
    /// Consensus failures are reported in the result's [`Outcome`]; `Err` is
    /// reserved for repository and internal errors, after which every
    /// snapshot this call opened has been rolled back.
    pub fn call<R: Repository>(
        &self,
        repo: &mut R,
        env: &Environment,
        message: CallMessage,
    ) -> EvmResult<ExecutionResult> {
        tracing::debug!(
            "call {} -> {} value={} gas={}",
            message.caller,
            message.to,
            message.value,
            message.gas_limit
        );
        if repo.get_balance(&message.caller)? < message.value {
            return Ok(rejected(EvmError::InsufficientBalance, 0));
        }

        let (snapshot, code) = open_snapshot(repo, |repo| {
            credit(repo, &message.caller, &message.to, message.value)?;
            Ok(repo.get_code(&message.to)?)
        })?;
        let context = CallContext::new(message.to, message.caller, message.value, message.data);
        let root = Frame {
            program: Program::new(code, context, message.gas_limit),
            snapshot,
            kind: FrameKind::Call {
                ret_offset: 0,
                ret_len: 0,
            },
        };

        let exit = self.execute(repo, env, root)?;
        self.finalize(repo, message.gas_limit, exit, None)
    }

    /// Execute a contract-creation transaction.
    ///
    /// The creator's nonce is incremented once, whatever the outcome, unless
    /// the transaction is rejected up front for its balance or init code size.
    pub fn create<R: Repository>(
        &self,
        repo: &mut R,
        env: &Environment,
        message: CreateMessage,
    ) -> EvmResult<ExecutionResult> {
        tracing::debug!(
            "create from {} value={} init_code={} bytes gas={}",
            message.caller,
            message.value,
            message.init_code.len(),
            message.gas_limit
        );
        let limit = self.config().max_init_code_size;
        if message.init_code.len() > limit {
            let err = EvmError::InitCodeSizeExceeded {
                size: message.init_code.len(),
                limit,
            };
            return Ok(rejected(err, 0));
        }
        if repo.get_balance(&message.caller)? < message.value {
            return Ok(rejected(EvmError::InsufficientBalance, 0));
        }

        let nonce = repo.get_nonce(&message.caller)?;
        let address = match message.salt {
            None => create_address(&message.caller, nonce),
            Some(salt) => create2_address(&message.caller, &salt, &message.init_code),
        };
        repo.increase_nonce(&message.caller)?;
        if collides(repo, &address)? {
            tracing::debug!("create collision at {}", address);
            return Ok(rejected(EvmError::CreateCollision, message.gas_limit));
        }

        let root = self.open_create_frame(
            repo,
            message.caller,
            address,
            message.value,
            message.init_code,
            message.gas_limit,
            0,
        )?;
        let exit = self.execute(repo, env, root)?;
        self.finalize(repo, message.gas_limit, exit, Some(address))
    }

    /// Run `root` and every frame it spawns to completion
    fn execute<R: Repository>(
        &self,
        repo: &mut R,
        env: &Environment,
        root: Frame,
    ) -> EvmResult<FrameExit> {
        let mut frames = vec![root];
        match self.drive(&mut frames, repo, env) {
            Ok(exit) => Ok(exit),
            Err(err) => {
                tracing::warn!("aborting {} frames: {}", frames.len(), err);
                while let Some(frame) = frames.pop() {
                    if let Err(rollback_err) = repo.rollback(frame.snapshot) {
                        tracing::warn!("rollback during abort failed: {}", rollback_err);
                    }
                }
                Err(err)
            }
        }
    }

    fn drive<R: Repository>(
        &self,
        frames: &mut Vec<Frame>,
        repo: &mut R,
        env: &Environment,
    ) -> EvmResult<FrameExit> {
        loop {
            let frame = frames.last_mut().ok_or_else(empty_frame_stack)?;
            let (outcome, output) = match self.interpreter.run(&mut frame.program, repo, env) {
                Ok(Interrupt::Call(request)) => {
                    self.begin_call(frames, repo, request)?;
                    continue;
                }
                Ok(Interrupt::Create(request)) => {
                    self.begin_create(frames, repo, request)?;
                    continue;
                }
                Ok(Interrupt::Return(output)) => (Outcome::Success, output),
                Ok(Interrupt::Revert(output)) => (Outcome::Revert, output),
                Err(err) if err.is_exceptional_halt() => (Outcome::Halt(err), Bytes::new()),
                Err(err) => return Err(err),
            };

            let frame = frames.pop().ok_or_else(empty_frame_stack)?;
            let kind = frame.kind;
            let exit = self.finish_frame(repo, frame, outcome, output)?;
            match frames.last_mut() {
                Some(parent) => resume(&mut parent.program, kind, exit)?,
                None => return Ok(exit),
            }
        }
    }

    /// Enter a CALL-family child, or fail it on the spot
    fn begin_call<R: Repository>(
        &self,
        frames: &mut Vec<Frame>,
        repo: &mut R,
        request: CallRequest,
    ) -> EvmResult<()> {
        let parent = frames.last_mut().ok_or_else(empty_frame_stack)?;
        let current = parent.program.context();
        let depth = current.depth + 1;
        let from = current.address;
        let is_static = current.is_static || request.kind == CallKind::StaticCall;
        let (address, caller, value) = match request.kind {
            CallKind::Call | CallKind::StaticCall => (request.target, current.address, request.value),
            CallKind::CallCode => (current.address, current.address, request.value),
            CallKind::DelegateCall => (current.address, current.caller, current.value),
        };
        let transfers = matches!(request.kind, CallKind::Call | CallKind::CallCode);

        if depth > self.config().max_call_depth {
            tracing::debug!("{}", EvmError::CallDepthExceeded(self.config().max_call_depth));
            return reject(&mut parent.program, request.gas);
        }
        if transfers && repo.get_balance(&from)? < value {
            tracing::debug!("call from {} lacks balance for {}", from, value);
            return reject(&mut parent.program, request.gas);
        }

        let (snapshot, code) = open_snapshot(repo, |repo| {
            if transfers {
                credit(repo, &from, &address, value)?;
            }
            Ok(repo.get_code(&request.target)?)
        })?;
        let context = CallContext {
            address,
            code_address: request.target,
            caller,
            value,
            data: request.input,
            is_static,
            depth,
        };
        tracing::debug!(
            "enter {:?} {} code={} depth={} gas={}",
            request.kind,
            address,
            request.target,
            depth,
            request.gas
        );
        frames.push(Frame {
            program: Program::new(code, context, request.gas),
            snapshot,
            kind: FrameKind::Call {
                ret_offset: request.ret_offset,
                ret_len: request.ret_len,
            },
        });
        Ok(())
    }

    /// Enter a CREATE or CREATE2 child, or fail it on the spot
    fn begin_create<R: Repository>(
        &self,
        frames: &mut Vec<Frame>,
        repo: &mut R,
        request: CreateRequest,
    ) -> EvmResult<()> {
        let parent = frames.last_mut().ok_or_else(empty_frame_stack)?;
        let creator = parent.program.context().address;
        let depth = parent.program.context().depth + 1;

        if depth > self.config().max_call_depth {
            tracing::debug!("{}", EvmError::CallDepthExceeded(self.config().max_call_depth));
            return reject(&mut parent.program, request.gas);
        }
        if repo.get_balance(&creator)? < request.value {
            tracing::debug!("create from {} lacks balance for {}", creator, request.value);
            return reject(&mut parent.program, request.gas);
        }
        let nonce = repo.get_nonce(&creator)?;
        if nonce == u64::MAX {
            return reject(&mut parent.program, request.gas);
        }

        let address = match request.kind {
            CreateKind::Create => create_address(&creator, nonce),
            CreateKind::Create2 { salt } => create2_address(&creator, &salt, &request.init_code),
        };
        repo.increase_nonce(&creator)?;
        if collides(repo, &address)? {
            // the forwarded gas is consumed
            tracing::debug!("create collision at {}", address);
            parent.program.set_return_data(Bytes::new());
            parent.program.stack.push(Word::ZERO)?;
            return Ok(());
        }

        let frame = self.open_create_frame(
            repo,
            creator,
            address,
            request.value,
            request.init_code,
            request.gas,
            depth,
        )?;
        frames.push(frame);
        Ok(())
    }

    /// Snapshot, create the account with nonce 1, move the endowment and
    /// build the frame running the init code
    #[allow(clippy::too_many_arguments)]
    fn open_create_frame<R: Repository>(
        &self,
        repo: &mut R,
        creator: Address,
        address: Address,
        value: U256,
        init_code: Bytes,
        gas: u64,
        depth: usize,
    ) -> EvmResult<Frame> {
        let (snapshot, ()) = open_snapshot(repo, |repo| {
            repo.create_account(&address)?;
            repo.increase_nonce(&address)?;
            repo.transfer(&creator, &address, value)?;
            Ok(())
        })?;
        let context = CallContext {
            address,
            code_address: address,
            caller: creator,
            value,
            data: Bytes::new(),
            is_static: false,
            depth,
        };
        tracing::debug!("enter create {} depth={} gas={}", address, depth, gas);
        Ok(Frame {
            program: Program::new(init_code, context, gas),
            snapshot,
            kind: FrameKind::Create { address },
        })
    }

    /// Close a frame's snapshot and collect what it hands to its parent
    fn finish_frame<R: Repository>(
        &self,
        repo: &mut R,
        frame: Frame,
        outcome: Outcome,
        output: Bytes,
    ) -> EvmResult<FrameExit> {
        let Frame {
            mut program,
            snapshot,
            kind,
        } = frame;

        let (outcome, output) = match (outcome, kind) {
            (Outcome::Success, FrameKind::Create { address }) => {
                match self.deposit_code(repo, &mut program, &address, output) {
                    Ok(code) => (Outcome::Success, code),
                    Err(err) if err.is_exceptional_halt() => (Outcome::Halt(err), Bytes::new()),
                    Err(err) => {
                        repo.rollback(snapshot)?;
                        return Err(err);
                    }
                }
            }
            (outcome, _) => (outcome, output),
        };

        let depth = program.context().depth;
        let address = program.context().address;
        if outcome == Outcome::Success {
            repo.commit(snapshot)?;
            let (logs, selfdestructs, refund) = program.take_effects();
            tracing::debug!(
                "exit {} depth={} success gas_left={}",
                address,
                depth,
                program.gas_remaining()
            );
            return Ok(FrameExit {
                outcome,
                output,
                gas_left: program.gas_remaining(),
                logs,
                selfdestructs,
                refund,
            });
        }

        repo.rollback(snapshot)?;
        let gas_left = match outcome {
            Outcome::Halt(_) => 0,
            _ => program.gas_remaining(),
        };
        tracing::debug!(
            "exit {} depth={} {:?} gas_left={}, rolled back",
            address,
            depth,
            outcome,
            gas_left
        );
        Ok(FrameExit {
            outcome,
            output,
            gas_left,
            logs: Vec::new(),
            selfdestructs: BTreeSet::new(),
            refund: 0,
        })
    }

    /// Validate and pay for the code a creation returned, then install it
    fn deposit_code<R: Repository>(
        &self,
        repo: &mut R,
        program: &mut Program,
        address: &Address,
        code: Bytes,
    ) -> EvmResult<Bytes> {
        let limit = self.config().max_code_size;
        if code.len() > limit {
            return Err(EvmError::CodeSizeExceeded {
                size: code.len(),
                limit,
            });
        }
        if code.first() == Some(&0xef) {
            return Err(EvmError::InvalidCode);
        }
        program.use_gas(self.config().schedule.code_deposit_cost(code.len()))?;
        repo.save_code(address, code.clone())?;
        Ok(code)
    }

    /// Apply refunds and deletions of a finished transaction
    fn finalize<R: Repository>(
        &self,
        repo: &mut R,
        gas_limit: u64,
        exit: FrameExit,
        created: Option<Address>,
    ) -> EvmResult<ExecutionResult> {
        let gas_used = gas_limit.saturating_sub(exit.gas_left);
        let success = exit.outcome == Outcome::Success;
        let gas_refunded = if success {
            self.config().schedule.capped_refund(gas_used, exit.refund)
        } else {
            0
        };
        if success {
            for address in &exit.selfdestructs {
                repo.delete_account(address)?;
            }
        }
        tracing::debug!(
            "transaction finished: {:?} gas_used={} refunded={}",
            exit.outcome,
            gas_used,
            gas_refunded
        );
        Ok(ExecutionResult {
            outcome: exit.outcome,
            gas_used: gas_used - gas_refunded,
            gas_refunded,
            output: exit.output,
            logs: exit.logs,
            deleted_accounts: exit.selfdestructs,
            created_address: if success { created } else { None },
        })
    }
}

/// Hand a finished child's outcome to the suspended parent
fn resume(parent: &mut Program, kind: FrameKind, exit: FrameExit) -> EvmResult<()> {
    parent.return_gas(exit.gas_left);
    let success = exit.outcome == Outcome::Success;
    if success {
        parent.absorb(exit.logs, exit.selfdestructs, exit.refund);
    }
    match kind {
        FrameKind::Call {
            ret_offset,
            ret_len,
        } => {
            let n = ret_len.min(exit.output.len());
            parent.memory.store_slice(ret_offset, &exit.output[..n]);
            parent.set_return_data(exit.output);
            parent.stack.push(Word::from_bool(success))
        }
        FrameKind::Create { address } => {
            let return_data = match exit.outcome {
                Outcome::Revert => exit.output,
                _ => Bytes::new(),
            };
            parent.set_return_data(return_data);
            let result = if success {
                Word::from_address(&address)
            } else {
                Word::ZERO
            };
            parent.stack.push(result)
        }
    }
}

/// Fail a child before it starts: its gas goes back, the parent sees 0
fn reject(parent: &mut Program, gas: u64) -> EvmResult<()> {
    parent.return_gas(gas);
    parent.set_return_data(Bytes::new());
    parent.stack.push(Word::ZERO)
}

/// Open a snapshot and run `setup` inside it, rolling back if setup fails
fn open_snapshot<R, T>(
    repo: &mut R,
    setup: impl FnOnce(&mut R) -> EvmResult<T>,
) -> EvmResult<(Snapshot, T)>
where
    R: Repository,
{
    let snapshot = repo.start_tracking();
    match setup(repo) {
        Ok(value) => Ok((snapshot, value)),
        Err(err) => {
            repo.rollback(snapshot)?;
            Err(err)
        }
    }
}

/// Move `value` into `to`, creating it if it does not exist yet
fn credit<R: Repository>(repo: &mut R, from: &Address, to: &Address, value: U256) -> EvmResult<()> {
    if value.is_zero() {
        return Ok(());
    }
    if !repo.account_exists(to)? {
        repo.create_account(to)?;
    }
    repo.transfer(from, to, value)?;
    Ok(())
}

/// An address is taken once it has code or a nonzero nonce
fn collides<R: Repository>(repo: &R, address: &Address) -> EvmResult<bool> {
    Ok(repo.get_nonce(address)? != 0 || repo.get_code_hash(address)? != EMPTY_CODE_HASH)
}

fn rejected(err: EvmError, gas_used: u64) -> ExecutionResult {
    ExecutionResult {
        outcome: Outcome::Halt(err),
        gas_used,
        gas_refunded: 0,
        output: Bytes::new(),
        logs: Vec::new(),
        deleted_accounts: BTreeSet::new(),
        created_address: None,
    }
}

fn empty_frame_stack() -> EvmError {
    EvmError::Internal("frame stack is empty".into())
}
