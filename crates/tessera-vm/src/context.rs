//! Invocation environment and per-frame call context

use std::collections::BTreeMap;

use bytes::Bytes;
use tessera_primitives::{Address, H256, U256};

/// Message-call flavours
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Run the callee's code on the callee's state, transferring value
    Call,
    /// Run the callee's code on the caller's state, transferring value to the caller itself
    CallCode,
    /// Run the callee's code on the caller's state, keeping caller and value
    DelegateCall,
    /// Like `Call` without value, forbidding any state change
    StaticCall,
}

/// Contract-creation flavours
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateKind {
    /// Address from sender and nonce
    Create,
    /// Address from sender, salt and init code hash
    Create2 {
        /// User-chosen salt
        salt: H256,
    },
}

/// What one frame sees of its own invocation
#[derive(Clone, Debug, Default)]
pub struct CallContext {
    /// Account whose storage and balance the code acts on
    pub address: Address,
    /// Account the executing code was loaded from
    pub code_address: Address,
    /// Caller address
    pub caller: Address,
    /// Call value
    pub value: U256,
    /// Call data (empty for init code)
    pub data: Bytes,
    /// Whether this is a static call (no state modifications)
    pub is_static: bool,
    /// Nesting level, 0 for the transaction's own frame
    pub depth: usize,
}

impl CallContext {
    /// Context of a top-level message call
    pub fn new(address: Address, caller: Address, value: U256, data: Bytes) -> Self {
        Self {
            address,
            code_address: address,
            caller,
            value,
            data,
            is_static: false,
            depth: 0,
        }
    }
}

/// Block environment information
#[derive(Clone, Debug)]
pub struct BlockContext {
    /// Block number
    pub number: u64,
    /// Block timestamp
    pub timestamp: u64,
    /// Block gas limit
    pub gas_limit: u64,
    /// Block coinbase (miner/validator)
    pub coinbase: Address,
    /// Block difficulty
    pub difficulty: U256,
    /// Chain ID
    pub chain_id: u64,
    /// Base fee
    pub base_fee: U256,
    /// Hashes of recent blocks by number, served by BLOCKHASH
    pub block_hashes: BTreeMap<u64, H256>,
}

impl BlockContext {
    /// Hash of block `number` if it is one of the 256 blocks before the current one
    pub fn block_hash(&self, number: u64) -> H256 {
        if number >= self.number || self.number - number > 256 {
            return H256::ZERO;
        }
        self.block_hashes.get(&number).copied().unwrap_or(H256::ZERO)
    }
}

impl Default for BlockContext {
    fn default() -> Self {
        Self {
            number: 0,
            timestamp: 0,
            gas_limit: 30_000_000,
            coinbase: Address::ZERO,
            difficulty: U256::zero(),
            chain_id: 1,
            base_fee: U256::zero(),
            block_hashes: BTreeMap::new(),
        }
    }
}

/// Transaction environment information
#[derive(Clone, Debug, Default)]
pub struct TxContext {
    /// Transaction origin (original sender)
    pub origin: Address,
    /// Gas price
    pub gas_price: U256,
}

/// Block and transaction environment shared by every frame
#[derive(Clone, Debug, Default)]
pub struct Environment {
    /// Block context
    pub block: BlockContext,
    /// Transaction context
    pub tx: TxContext,
}

/// A top-level message call
#[derive(Clone, Debug, Default)]
pub struct CallMessage {
    /// Sender; pays the value
    pub caller: Address,
    /// Callee
    pub to: Address,
    /// Value moved from caller to callee
    pub value: U256,
    /// Call data
    pub data: Bytes,
    /// Gas available to the call
    pub gas_limit: u64,
}

/// A top-level contract creation
#[derive(Clone, Debug, Default)]
pub struct CreateMessage {
    /// Sender; pays the value and supplies the nonce
    pub caller: Address,
    /// Endowment of the new contract
    pub value: U256,
    /// Init code
    pub init_code: Bytes,
    /// Gas available to the creation
    pub gas_limit: u64,
    /// CREATE2 salt; `None` derives the address from the nonce
    pub salt: Option<H256>,
}
