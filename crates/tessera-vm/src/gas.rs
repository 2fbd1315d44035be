//! Gas cost model

use serde::{Deserialize, Serialize};

use crate::memory::to_word_size;
use crate::opcode::Opcode;
use crate::word::Word;

/// Gas prices for every metered operation.
///
/// The schedule is immutable once a [`Vm`](crate::Vm) is built. Every field
/// has a default, so a JSON config only needs the prices it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasSchedule {
    /// Base tier
    pub base: u64,
    /// Very low tier
    pub verylow: u64,
    /// Low tier
    pub low: u64,
    /// Mid tier
    pub mid: u64,
    /// High tier
    pub high: u64,
    /// JUMPDEST
    pub jumpdest: u64,
    /// EXP base
    pub exp: u64,
    /// EXP per significant exponent byte
    pub exp_byte: u64,
    /// KECCAK256 base
    pub keccak256: u64,
    /// KECCAK256 per word hashed
    pub keccak256_word: u64,
    /// Per word copied by the *COPY family
    pub copy: u64,
    /// Linear memory coefficient per word
    pub memory: u64,
    /// Divisor of the quadratic memory term
    pub quad_coeff_div: u64,
    /// BALANCE
    pub balance: u64,
    /// EXTCODESIZE and EXTCODECOPY base
    pub extcode: u64,
    /// EXTCODEHASH
    pub extcodehash: u64,
    /// BLOCKHASH
    pub blockhash: u64,
    /// SLOAD
    pub sload: u64,
    /// SSTORE zero to nonzero
    pub sstore_set: u64,
    /// SSTORE for every other transition
    pub sstore_reset: u64,
    /// Refund for SSTORE nonzero to zero
    pub sstore_clear_refund: u64,
    /// LOG base
    pub log: u64,
    /// LOG per topic
    pub log_topic: u64,
    /// LOG per data byte
    pub log_data: u64,
    /// CREATE and CREATE2 base
    pub create: u64,
    /// Per word of init code
    pub initcode_word: u64,
    /// Per byte of deployed code
    pub code_deposit: u64,
    /// CALL-family base
    pub call: u64,
    /// Surcharge for a nonzero value transfer
    pub call_value: u64,
    /// Surcharge for transferring value into a nonexistent account
    pub call_new_account: u64,
    /// Free gas handed to the callee of a value transfer
    pub call_stipend: u64,
    /// SELFDESTRUCT base
    pub selfdestruct: u64,
    /// SELFDESTRUCT surcharge when the beneficiary is created
    pub selfdestruct_new_account: u64,
    /// Refund for the first SELFDESTRUCT of an account
    pub selfdestruct_refund: u64,
    /// Refund is capped at gas used divided by this
    pub max_refund_quotient: u64,
}

impl Default for GasSchedule {
    fn default() -> Self {
        Self {
            base: 2,
            verylow: 3,
            low: 5,
            mid: 8,
            high: 10,
            jumpdest: 1,
            exp: 10,
            exp_byte: 50,
            keccak256: 30,
            keccak256_word: 6,
            copy: 3,
            memory: 3,
            quad_coeff_div: 512,
            balance: 400,
            extcode: 700,
            extcodehash: 400,
            blockhash: 20,
            sload: 200,
            sstore_set: 20_000,
            sstore_reset: 5_000,
            sstore_clear_refund: 15_000,
            log: 375,
            log_topic: 375,
            log_data: 8,
            create: 32_000,
            initcode_word: 2,
            code_deposit: 200,
            call: 700,
            call_value: 9_000,
            call_new_account: 25_000,
            call_stipend: 2_300,
            selfdestruct: 5_000,
            selfdestruct_new_account: 25_000,
            selfdestruct_refund: 24_000,
            max_refund_quotient: 2,
        }
    }
}

/// Price and refund of one SSTORE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SstoreCost {
    /// Gas charged
    pub gas: u64,
    /// Refund credited at the end of the transaction
    pub refund: u64,
}

impl GasSchedule {
    /// Fixed cost charged before an opcode runs
    pub fn static_cost(&self, opcode: Opcode) -> u64 {
        match opcode {
            Opcode::STOP | Opcode::RETURN | Opcode::REVERT | Opcode::SSTORE => 0,
            Opcode::INVALID | Opcode::UNDEFINED(_) => 0,

            Opcode::ADDRESS | Opcode::ORIGIN | Opcode::CALLER | Opcode::CALLVALUE
            | Opcode::CALLDATASIZE | Opcode::CODESIZE | Opcode::GASPRICE | Opcode::COINBASE
            | Opcode::TIMESTAMP | Opcode::NUMBER | Opcode::DIFFICULTY | Opcode::GASLIMIT
            | Opcode::CHAINID | Opcode::RETURNDATASIZE | Opcode::POP | Opcode::PC
            | Opcode::MSIZE | Opcode::GAS | Opcode::BASEFEE | Opcode::PUSH(0) => self.base,

            Opcode::ADD | Opcode::SUB | Opcode::NOT | Opcode::LT | Opcode::GT | Opcode::SLT
            | Opcode::SGT | Opcode::EQ | Opcode::ISZERO | Opcode::AND | Opcode::OR
            | Opcode::XOR | Opcode::BYTE | Opcode::SHL | Opcode::SHR | Opcode::SAR
            | Opcode::CALLDATALOAD | Opcode::MLOAD | Opcode::MSTORE | Opcode::MSTORE8
            | Opcode::CALLDATACOPY | Opcode::CODECOPY | Opcode::RETURNDATACOPY
            | Opcode::MCOPY | Opcode::PUSH(_) | Opcode::DUP(_) | Opcode::SWAP(_) => self.verylow,

            Opcode::MUL | Opcode::DIV | Opcode::SDIV | Opcode::MOD | Opcode::SMOD
            | Opcode::SIGNEXTEND | Opcode::SELFBALANCE => self.low,

            Opcode::ADDMOD | Opcode::MULMOD | Opcode::JUMP => self.mid,
            Opcode::JUMPI => self.high,
            Opcode::JUMPDEST => self.jumpdest,
            Opcode::EXP => self.exp,
            Opcode::KECCAK256 => self.keccak256,
            Opcode::BALANCE => self.balance,
            Opcode::EXTCODESIZE | Opcode::EXTCODECOPY => self.extcode,
            Opcode::EXTCODEHASH => self.extcodehash,
            Opcode::BLOCKHASH => self.blockhash,
            Opcode::SLOAD => self.sload,
            Opcode::LOG(n) => self
                .log
                .saturating_add(self.log_topic.saturating_mul(n as u64)),
            Opcode::CREATE | Opcode::CREATE2 => self.create,
            Opcode::CALL | Opcode::CALLCODE | Opcode::DELEGATECALL | Opcode::STATICCALL => {
                self.call
            }
            Opcode::SELFDESTRUCT => self.selfdestruct,
        }
    }

    /// Total cost of `words` words of memory: `memory * w + w^2 / quad_coeff_div`
    pub fn memory_cost(&self, words: u64) -> u64 {
        let linear = self.memory.saturating_mul(words);
        let quadratic = words.saturating_mul(words) / self.quad_coeff_div.max(1);
        linear.saturating_add(quadratic)
    }

    /// Charge for growing memory from `current_size` to `new_size` bytes
    pub fn memory_expansion_cost(&self, current_size: usize, new_size: usize) -> u64 {
        if new_size <= current_size {
            return 0;
        }
        let new_cost = self.memory_cost(to_word_size(new_size) as u64);
        let old_cost = self.memory_cost(to_word_size(current_size) as u64);
        new_cost.saturating_sub(old_cost)
    }

    /// Per-word charge for copying `len` bytes
    pub fn copy_cost(&self, len: usize) -> u64 {
        self.copy.saturating_mul(to_word_size(len) as u64)
    }

    /// Per-word charge for hashing `len` bytes
    pub fn keccak256_word_cost(&self, len: usize) -> u64 {
        self.keccak256_word.saturating_mul(to_word_size(len) as u64)
    }

    /// Dynamic part of EXP
    pub fn exp_cost(&self, exponent: Word) -> u64 {
        self.exp_byte.saturating_mul(exponent.byte_len())
    }

    /// Dynamic part of LOG
    pub fn log_data_cost(&self, len: usize) -> u64 {
        self.log_data.saturating_mul(len as u64)
    }

    /// SSTORE price given the slot's current and new values
    pub fn sstore_cost(&self, current: Word, new: Word) -> SstoreCost {
        if current.is_zero() && !new.is_zero() {
            return SstoreCost {
                gas: self.sstore_set,
                refund: 0,
            };
        }
        let refund = if !current.is_zero() && new.is_zero() {
            self.sstore_clear_refund
        } else {
            0
        };
        SstoreCost {
            gas: self.sstore_reset,
            refund,
        }
    }

    /// Surcharges a CALL-family opcode pays on top of its static cost
    pub fn call_extra_cost(&self, transfers_value: bool, creates_account: bool) -> u64 {
        let mut gas = 0u64;
        if transfers_value {
            gas = gas.saturating_add(self.call_value);
        }
        if creates_account {
            gas = gas.saturating_add(self.call_new_account);
        }
        gas
    }

    /// Dynamic part of CREATE (`is_create2 = false`) or CREATE2
    pub fn create_extra_cost(&self, init_code_len: usize, is_create2: bool) -> u64 {
        let mut gas = self.initcode_word.saturating_mul(to_word_size(init_code_len) as u64);
        if is_create2 {
            gas = gas.saturating_add(self.keccak256_word_cost(init_code_len));
        }
        gas
    }

    /// Price of storing `len` bytes of deployed code
    pub fn code_deposit_cost(&self, len: usize) -> u64 {
        self.code_deposit.saturating_mul(len as u64)
    }

    /// Refund actually granted against `gas_used`
    pub fn capped_refund(&self, gas_used: u64, refund: u64) -> u64 {
        refund.min(gas_used / self.max_refund_quotient.max(1))
    }
}

/// Gas that may be handed to a child frame out of `available`: all but one 64th
pub fn all_but_one_64th(available: u64) -> u64 {
    available - available / 64
}

/// Gas forwarded to a callee.
///
/// `requested` is the stack operand. Values wider than 64 bits saturate to
/// `u64::MAX` before the all-but-one-64th cap applies, so an oversized
/// request forwards the cap instead of failing.
pub fn call_gas_limit(requested: Word, available: u64) -> u64 {
    requested.saturating_u64().min(all_but_one_64th(available))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule() -> GasSchedule {
        GasSchedule::default()
    }

    #[test]
    fn test_static_cost_tiers() {
        let s = schedule();
        assert_eq!(s.static_cost(Opcode::STOP), 0);
        assert_eq!(s.static_cost(Opcode::ADD), 3);
        assert_eq!(s.static_cost(Opcode::MUL), 5);
        assert_eq!(s.static_cost(Opcode::JUMP), 8);
        assert_eq!(s.static_cost(Opcode::JUMPI), 10);
        assert_eq!(s.static_cost(Opcode::PUSH(0)), 2);
        assert_eq!(s.static_cost(Opcode::PUSH(1)), 3);
        assert_eq!(s.static_cost(Opcode::PUSH(32)), 3);
        assert_eq!(s.static_cost(Opcode::SLOAD), 200);
        assert_eq!(s.static_cost(Opcode::CALL), 700);
        assert_eq!(s.static_cost(Opcode::LOG(2)), 375 + 2 * 375);
        assert_eq!(s.static_cost(Opcode::CREATE), 32_000);
    }

    #[test]
    fn test_memory_cost_formula() {
        let s = schedule();
        assert_eq!(s.memory_cost(0), 0);
        assert_eq!(s.memory_cost(1), 3);
        assert_eq!(s.memory_cost(32), 3 * 32 + 1024 / 512);
        // 3w + w^2/512 truncates
        assert_eq!(s.memory_cost(100), 300 + 10_000 / 512);
        assert_eq!(s.memory_cost(u64::MAX), u64::MAX);
    }

    #[test]
    fn test_memory_expansion_cost() {
        let s = schedule();
        assert_eq!(s.memory_expansion_cost(0, 32), 3);
        assert_eq!(s.memory_expansion_cost(32, 32), 0);
        assert_eq!(s.memory_expansion_cost(64, 32), 0);
        assert_eq!(s.memory_expansion_cost(32, 64), 3);
        assert_eq!(s.memory_expansion_cost(0, 1024), s.memory_cost(32));
    }

    #[test]
    fn test_sstore_tiers() {
        let s = schedule();
        let zero = Word::ZERO;
        let one = Word::ONE;
        let two = Word::from_u64(2);

        assert_eq!(s.sstore_cost(zero, one), SstoreCost { gas: 20_000, refund: 0 });
        assert_eq!(s.sstore_cost(one, two), SstoreCost { gas: 5_000, refund: 0 });
        assert_eq!(s.sstore_cost(one, zero), SstoreCost { gas: 5_000, refund: 15_000 });
        assert_eq!(s.sstore_cost(zero, zero), SstoreCost { gas: 5_000, refund: 0 });
    }

    #[test]
    fn test_call_extra_cost() {
        let s = schedule();
        assert_eq!(s.call_extra_cost(false, false), 0);
        assert_eq!(s.call_extra_cost(true, false), 9_000);
        assert_eq!(s.call_extra_cost(true, true), 34_000);
    }

    #[test]
    fn test_extreme_prices_saturate() {
        let s = GasSchedule {
            exp_byte: u64::MAX,
            log: u64::MAX,
            log_topic: u64::MAX,
            call_value: u64::MAX,
            call_new_account: u64::MAX,
            ..schedule()
        };
        assert_eq!(s.exp_cost(Word::from_u64(0x0100)), u64::MAX);
        assert_eq!(s.static_cost(Opcode::LOG(4)), u64::MAX);
        assert_eq!(s.call_extra_cost(true, true), u64::MAX);
    }

    #[test]
    fn test_all_but_one_64th() {
        assert_eq!(all_but_one_64th(64_000), 63_000);
        assert_eq!(all_but_one_64th(63), 63);
        assert_eq!(all_but_one_64th(0), 0);
    }

    #[test]
    fn test_call_gas_limit() {
        assert_eq!(call_gas_limit(Word::from_u64(1_000), 64_000), 1_000);
        assert_eq!(call_gas_limit(Word::from_u64(100_000), 64_000), 63_000);
        // requests wider than 64 bits saturate and take the cap
        assert_eq!(call_gas_limit(Word::MAX, 64_000), 63_000);
    }

    #[test]
    fn test_exp_and_copy_costs() {
        let s = schedule();
        assert_eq!(s.exp_cost(Word::ZERO), 0);
        assert_eq!(s.exp_cost(Word::from_u64(0x100)), 100);
        assert_eq!(s.copy_cost(0), 0);
        assert_eq!(s.copy_cost(33), 6);
        assert_eq!(s.keccak256_word_cost(64), 12);
    }

    #[test]
    fn test_create_costs() {
        let s = schedule();
        assert_eq!(s.create_extra_cost(64, false), 4);
        assert_eq!(s.create_extra_cost(64, true), 4 + 12);
        assert_eq!(s.code_deposit_cost(10), 2_000);
    }

    #[test]
    fn test_capped_refund() {
        let s = schedule();
        assert_eq!(s.capped_refund(50_000, 15_000), 15_000);
        assert_eq!(s.capped_refund(20_000, 15_000), 10_000);
        assert_eq!(s.capped_refund(0, 15_000), 0);
    }

    #[test]
    fn test_schedule_partial_json() {
        let s: GasSchedule = serde_json::from_str(r#"{ "sload": 800, "call": 40 }"#).unwrap();
        assert_eq!(s.sload, 800);
        assert_eq!(s.call, 40);
        assert_eq!(s.sstore_set, 20_000);
    }
}
