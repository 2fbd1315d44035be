//! # tessera-vm
//!
//! Deterministic EVM-style virtual machine.
//!
//! This crate provides:
//! - 256-bit [`Word`] arithmetic, the bounded [`Stack`] and linear [`Memory`]
//! - The [`GasSchedule`] cost model
//! - The [`Interpreter`], which runs one frame until it ends or suspends
//! - The [`Vm`] orchestrator, which runs nested calls and creations on an
//!   explicit frame stack over any [`Repository`](tessera_repository::Repository)

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod context;
mod error;
mod gas;
mod interpreter;
mod memory;
mod opcode;
mod program;
mod result;
mod stack;
mod vm;
mod word;

pub use config::{AllocAccount, Prestate, VmConfig};
pub use context::{
    BlockContext, CallContext, CallKind, CallMessage, CreateKind, CreateMessage, Environment,
    TxContext,
};
pub use error::{EvmError, EvmResult};
pub use gas::{all_but_one_64th, call_gas_limit, GasSchedule, SstoreCost};
pub use interpreter::{CallRequest, CreateRequest, Interpreter, Interrupt};
pub use memory::{to_word_size, Memory};
pub use opcode::Opcode;
pub use program::{JumpTable, Program};
pub use result::{ExecutionResult, Log, Outcome};
pub use stack::{Stack, STACK_LIMIT};
pub use vm::Vm;
pub use word::Word;
