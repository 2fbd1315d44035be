//! VM configuration and prestate loading

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tessera_primitives::{Address, H256, U256};
use tessera_repository::Repository;

use crate::error::{EvmError, EvmResult};
use crate::gas::GasSchedule;

/// Limits and prices fixed for the lifetime of a [`Vm`](crate::Vm)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmConfig {
    /// Gas prices
    #[serde(default)]
    pub schedule: GasSchedule,
    /// Deepest frame allowed; a call from this depth fails
    #[serde(default = "default_max_call_depth")]
    pub max_call_depth: usize,
    /// Largest deployable code in bytes
    #[serde(default = "default_max_code_size")]
    pub max_code_size: usize,
    /// Largest init code in bytes
    #[serde(default = "default_max_init_code_size")]
    pub max_init_code_size: usize,
}

fn default_max_call_depth() -> usize {
    1024
}

fn default_max_code_size() -> usize {
    24_576
}

fn default_max_init_code_size() -> usize {
    2 * default_max_code_size()
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            schedule: GasSchedule::default(),
            max_call_depth: default_max_call_depth(),
            max_code_size: default_max_code_size(),
            max_init_code_size: default_max_init_code_size(),
        }
    }
}

impl VmConfig {
    /// Parse from JSON; absent fields take their defaults
    pub fn from_json_str(json: &str) -> EvmResult<Self> {
        let config: VmConfig =
            serde_json::from_str(json).map_err(|e| EvmError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject limits the VM cannot run with
    pub fn validate(&self) -> EvmResult<()> {
        if self.max_call_depth == 0 {
            return Err(EvmError::Config("max_call_depth must be positive".into()));
        }
        if self.max_init_code_size < self.max_code_size {
            return Err(EvmError::Config(
                "max_init_code_size must be at least max_code_size".into(),
            ));
        }
        if self.schedule.quad_coeff_div == 0 || self.schedule.max_refund_quotient == 0 {
            return Err(EvmError::Config("gas schedule divisors must be nonzero".into()));
        }
        Ok(())
    }
}

/// One account of a prestate, in JSON-friendly form
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AllocAccount {
    /// Balance as hex (0x-prefixed) or decimal string
    #[serde(default)]
    pub balance: String,
    /// Account nonce
    #[serde(default)]
    pub nonce: u64,
    /// Contract code (hex string)
    #[serde(default)]
    pub code: Option<String>,
    /// Storage (slot -> value mapping, hex strings)
    #[serde(default)]
    pub storage: BTreeMap<String, String>,
}

impl AllocAccount {
    /// Parse balance from hex or decimal string
    pub fn parse_balance(&self) -> EvmResult<U256> {
        let s = self.balance.trim();
        if s.is_empty() {
            return Ok(U256::zero());
        }
        let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => U256::from_str_radix(hex, 16).map_err(|e| e.to_string()),
            None => U256::from_dec_str(s).map_err(|e| e.to_string()),
        };
        parsed.map_err(|e| EvmError::Config(format!("balance {:?}: {}", s, e)))
    }

    /// Parse code from hex string
    pub fn parse_code(&self) -> EvmResult<Bytes> {
        match &self.code {
            Some(code) => decode_hex(code).map(Bytes::from),
            None => Ok(Bytes::new()),
        }
    }

    /// Parse storage entries; short values are left-padded
    pub fn parse_storage(&self) -> EvmResult<BTreeMap<H256, H256>> {
        let mut rows = BTreeMap::new();
        for (key, value) in &self.storage {
            rows.insert(parse_slot(key)?, parse_slot(value)?);
        }
        Ok(rows)
    }
}

/// Accounts to install before execution, keyed by hex address
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Prestate {
    /// Account allocations
    #[serde(default)]
    pub alloc: BTreeMap<String, AllocAccount>,
}

impl Prestate {
    /// Parse from JSON
    pub fn from_json_str(json: &str) -> EvmResult<Self> {
        serde_json::from_str(json).map_err(|e| EvmError::Config(e.to_string()))
    }

    /// Write every allocation into `repo`
    pub fn apply<R: Repository>(&self, repo: &mut R) -> EvmResult<()> {
        for (address, account) in &self.alloc {
            let address = Address::from_hex(address.trim())
                .map_err(|e| EvmError::Config(format!("address {:?}: {}", address, e)))?;
            repo.create_account(&address)?;
            repo.add_balance(&address, account.parse_balance()?)?;
            for _ in 0..account.nonce {
                repo.increase_nonce(&address)?;
            }
            let code = account.parse_code()?;
            if !code.is_empty() {
                repo.save_code(&address, code)?;
            }
            for (key, value) in account.parse_storage()? {
                repo.add_storage_row(&address, key, value)?;
            }
            tracing::debug!("prestate: installed {}", address);
        }
        Ok(())
    }
}

fn decode_hex(s: &str) -> EvmResult<Vec<u8>> {
    let s = s.trim();
    let s = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(s).map_err(|e| EvmError::Config(format!("hex {:?}: {}", s, e)))
}

fn parse_slot(s: &str) -> EvmResult<H256> {
    let bytes = decode_hex(s)?;
    if bytes.len() > 32 {
        return Err(EvmError::Config(format!("slot {:?} longer than 32 bytes", s)));
    }
    let mut word = [0u8; 32];
    word[32 - bytes.len()..].copy_from_slice(&bytes);
    Ok(H256::from_bytes(word))
}
