//! VM error types

use tessera_repository::RepositoryError;
use thiserror::Error;

/// VM execution errors.
///
/// Everything except `Repository`, `Config` and `Internal` is an exceptional
/// halt: it ends the current frame, discards its state changes and consumes
/// all of its gas. Revert is not an error and never appears here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvmError {
    /// Out of gas
    #[error("out of gas")]
    OutOfGas,

    /// Stack underflow
    #[error("stack underflow")]
    StackUnderflow,

    /// Stack overflow
    #[error("stack overflow (max 1024)")]
    StackOverflow,

    /// Jump target is not a JUMPDEST outside PUSH data
    #[error("invalid jump destination: {0}")]
    InvalidJumpDestination(usize),

    /// Undefined or designated-invalid instruction
    #[error("invalid opcode: 0x{0:02x}")]
    InvalidOpcode(u8),

    /// Write in static context
    #[error("state modification in static context")]
    StaticCallViolation,

    /// RETURNDATACOPY past the end of the return data buffer
    #[error("return data out of bounds")]
    ReturnDataOutOfBounds,

    /// Contract creation collision
    #[error("contract address collision")]
    CreateCollision,

    /// Deployed code larger than the configured limit
    #[error("code size {size} exceeds limit {limit}")]
    CodeSizeExceeded {
        /// Size of the returned code
        size: usize,
        /// Configured maximum
        limit: usize,
    },

    /// Init code larger than the configured limit
    #[error("init code size {size} exceeds limit {limit}")]
    InitCodeSizeExceeded {
        /// Size of the init code
        size: usize,
        /// Configured maximum
        limit: usize,
    },

    /// Deployed code starting with the reserved 0xEF byte
    #[error("deployed code starts with 0xef")]
    InvalidCode,

    /// Call depth exceeded
    #[error("call depth exceeded (max {0})")]
    CallDepthExceeded(usize),

    /// Insufficient balance for transfer
    #[error("insufficient balance")]
    InsufficientBalance,

    /// Repository failure
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Invalid configuration
    #[error("invalid config: {0}")]
    Config(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl EvmError {
    /// True for halts that are part of execution semantics, false for
    /// failures of the host (repository, configuration, internal invariants).
    pub fn is_exceptional_halt(&self) -> bool {
        !matches!(
            self,
            EvmError::Repository(_) | EvmError::Config(_) | EvmError::Internal(_)
        )
    }
}

/// Result type for VM operations
pub type EvmResult<T> = Result<T, EvmError>;
