//! Execution results

use std::collections::BTreeSet;

use bytes::Bytes;
use tessera_primitives::{Address, H256};

use crate::error::EvmError;

/// Log entry emitted by LOG opcodes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Log {
    /// Contract address that emitted the log
    pub address: Address,
    /// Log topics (0-4)
    pub topics: Vec<H256>,
    /// Log data
    pub data: Bytes,
}

/// How a frame or transaction ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// STOP, RETURN, SELFDESTRUCT or running off the end of the code
    Success,
    /// REVERT: state rolled back, unused gas returned, output kept
    Revert,
    /// Exceptional halt: state rolled back, all gas consumed
    Halt(EvmError),
}

/// Result of a top-level call or creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// How execution ended
    pub outcome: Outcome,
    /// Gas used after the refund is applied
    pub gas_used: u64,
    /// Refund applied to `gas_used`
    pub gas_refunded: u64,
    /// Return data (or revert data)
    pub output: Bytes,
    /// Logs emitted, in execution order (empty unless successful)
    pub logs: Vec<Log>,
    /// Accounts removed by SELFDESTRUCT (empty unless successful)
    pub deleted_accounts: BTreeSet<Address>,
    /// Address of the deployed contract for successful creations
    pub created_address: Option<Address>,
}

impl ExecutionResult {
    /// Check if execution succeeded
    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    /// Check if execution reverted
    pub fn is_revert(&self) -> bool {
        self.outcome == Outcome::Revert
    }

    /// The exceptional halt, if any
    pub fn halt_reason(&self) -> Option<&EvmError> {
        match &self.outcome {
            Outcome::Halt(err) => Some(err),
            _ => None,
        }
    }
}
