//! Instruction set

use std::fmt;

/// One decoded instruction byte.
///
/// Every byte decodes to exactly one variant; bytes with no assigned
/// instruction decode to `UNDEFINED`. The sized families carry their size:
/// `PUSH(n)` has an `n`-byte immediate (0..=32), `DUP(n)` and `SWAP(n)` reach
/// `n` items deep (1..=16), `LOG(n)` takes `n` topics (0..=4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Opcode {
    // Stop and Arithmetic
    STOP,
    ADD,
    MUL,
    SUB,
    DIV,
    SDIV,
    MOD,
    SMOD,
    ADDMOD,
    MULMOD,
    EXP,
    SIGNEXTEND,

    // Comparison & Bitwise Logic
    LT,
    GT,
    SLT,
    SGT,
    EQ,
    ISZERO,
    AND,
    OR,
    XOR,
    NOT,
    BYTE,
    SHL,
    SHR,
    SAR,

    KECCAK256,

    // Environmental Information
    ADDRESS,
    BALANCE,
    ORIGIN,
    CALLER,
    CALLVALUE,
    CALLDATALOAD,
    CALLDATASIZE,
    CALLDATACOPY,
    CODESIZE,
    CODECOPY,
    GASPRICE,
    EXTCODESIZE,
    EXTCODECOPY,
    RETURNDATASIZE,
    RETURNDATACOPY,
    EXTCODEHASH,

    // Block Information
    BLOCKHASH,
    COINBASE,
    TIMESTAMP,
    NUMBER,
    DIFFICULTY,
    GASLIMIT,
    CHAINID,
    SELFBALANCE,
    BASEFEE,

    // Stack, Memory, Storage and Flow
    POP,
    MLOAD,
    MSTORE,
    MSTORE8,
    SLOAD,
    SSTORE,
    JUMP,
    JUMPI,
    PC,
    MSIZE,
    GAS,
    JUMPDEST,
    MCOPY,

    PUSH(u8),
    DUP(u8),
    SWAP(u8),
    LOG(u8),

    // System
    CREATE,
    CALL,
    CALLCODE,
    RETURN,
    DELEGATECALL,
    CREATE2,
    STATICCALL,
    REVERT,
    INVALID,
    SELFDESTRUCT,

    UNDEFINED(u8),
}

impl Opcode {
    /// Decode one byte. Total: unassigned bytes give `UNDEFINED(byte)`.
    pub const fn decode(byte: u8) -> Self {
        match byte {
            0x00 => Self::STOP,
            0x01 => Self::ADD,
            0x02 => Self::MUL,
            0x03 => Self::SUB,
            0x04 => Self::DIV,
            0x05 => Self::SDIV,
            0x06 => Self::MOD,
            0x07 => Self::SMOD,
            0x08 => Self::ADDMOD,
            0x09 => Self::MULMOD,
            0x0A => Self::EXP,
            0x0B => Self::SIGNEXTEND,
            0x10 => Self::LT,
            0x11 => Self::GT,
            0x12 => Self::SLT,
            0x13 => Self::SGT,
            0x14 => Self::EQ,
            0x15 => Self::ISZERO,
            0x16 => Self::AND,
            0x17 => Self::OR,
            0x18 => Self::XOR,
            0x19 => Self::NOT,
            0x1A => Self::BYTE,
            0x1B => Self::SHL,
            0x1C => Self::SHR,
            0x1D => Self::SAR,
            0x20 => Self::KECCAK256,
            0x30 => Self::ADDRESS,
            0x31 => Self::BALANCE,
            0x32 => Self::ORIGIN,
            0x33 => Self::CALLER,
            0x34 => Self::CALLVALUE,
            0x35 => Self::CALLDATALOAD,
            0x36 => Self::CALLDATASIZE,
            0x37 => Self::CALLDATACOPY,
            0x38 => Self::CODESIZE,
            0x39 => Self::CODECOPY,
            0x3A => Self::GASPRICE,
            0x3B => Self::EXTCODESIZE,
            0x3C => Self::EXTCODECOPY,
            0x3D => Self::RETURNDATASIZE,
            0x3E => Self::RETURNDATACOPY,
            0x3F => Self::EXTCODEHASH,
            0x40 => Self::BLOCKHASH,
            0x41 => Self::COINBASE,
            0x42 => Self::TIMESTAMP,
            0x43 => Self::NUMBER,
            0x44 => Self::DIFFICULTY,
            0x45 => Self::GASLIMIT,
            0x46 => Self::CHAINID,
            0x47 => Self::SELFBALANCE,
            0x48 => Self::BASEFEE,
            0x50 => Self::POP,
            0x51 => Self::MLOAD,
            0x52 => Self::MSTORE,
            0x53 => Self::MSTORE8,
            0x54 => Self::SLOAD,
            0x55 => Self::SSTORE,
            0x56 => Self::JUMP,
            0x57 => Self::JUMPI,
            0x58 => Self::PC,
            0x59 => Self::MSIZE,
            0x5A => Self::GAS,
            0x5B => Self::JUMPDEST,
            0x5E => Self::MCOPY,
            0x5F..=0x7F => Self::PUSH(byte - 0x5F),
            0x80..=0x8F => Self::DUP(byte - 0x7F),
            0x90..=0x9F => Self::SWAP(byte - 0x8F),
            0xA0..=0xA4 => Self::LOG(byte - 0xA0),
            0xF0 => Self::CREATE,
            0xF1 => Self::CALL,
            0xF2 => Self::CALLCODE,
            0xF3 => Self::RETURN,
            0xF4 => Self::DELEGATECALL,
            0xF5 => Self::CREATE2,
            0xFA => Self::STATICCALL,
            0xFD => Self::REVERT,
            0xFE => Self::INVALID,
            0xFF => Self::SELFDESTRUCT,
            other => Self::UNDEFINED(other),
        }
    }

    /// Encode back to the instruction byte
    pub const fn byte(self) -> u8 {
        match self {
            Self::STOP => 0x00,
            Self::ADD => 0x01,
            Self::MUL => 0x02,
            Self::SUB => 0x03,
            Self::DIV => 0x04,
            Self::SDIV => 0x05,
            Self::MOD => 0x06,
            Self::SMOD => 0x07,
            Self::ADDMOD => 0x08,
            Self::MULMOD => 0x09,
            Self::EXP => 0x0A,
            Self::SIGNEXTEND => 0x0B,
            Self::LT => 0x10,
            Self::GT => 0x11,
            Self::SLT => 0x12,
            Self::SGT => 0x13,
            Self::EQ => 0x14,
            Self::ISZERO => 0x15,
            Self::AND => 0x16,
            Self::OR => 0x17,
            Self::XOR => 0x18,
            Self::NOT => 0x19,
            Self::BYTE => 0x1A,
            Self::SHL => 0x1B,
            Self::SHR => 0x1C,
            Self::SAR => 0x1D,
            Self::KECCAK256 => 0x20,
            Self::ADDRESS => 0x30,
            Self::BALANCE => 0x31,
            Self::ORIGIN => 0x32,
            Self::CALLER => 0x33,
            Self::CALLVALUE => 0x34,
            Self::CALLDATALOAD => 0x35,
            Self::CALLDATASIZE => 0x36,
            Self::CALLDATACOPY => 0x37,
            Self::CODESIZE => 0x38,
            Self::CODECOPY => 0x39,
            Self::GASPRICE => 0x3A,
            Self::EXTCODESIZE => 0x3B,
            Self::EXTCODECOPY => 0x3C,
            Self::RETURNDATASIZE => 0x3D,
            Self::RETURNDATACOPY => 0x3E,
            Self::EXTCODEHASH => 0x3F,
            Self::BLOCKHASH => 0x40,
            Self::COINBASE => 0x41,
            Self::TIMESTAMP => 0x42,
            Self::NUMBER => 0x43,
            Self::DIFFICULTY => 0x44,
            Self::GASLIMIT => 0x45,
            Self::CHAINID => 0x46,
            Self::SELFBALANCE => 0x47,
            Self::BASEFEE => 0x48,
            Self::POP => 0x50,
            Self::MLOAD => 0x51,
            Self::MSTORE => 0x52,
            Self::MSTORE8 => 0x53,
            Self::SLOAD => 0x54,
            Self::SSTORE => 0x55,
            Self::JUMP => 0x56,
            Self::JUMPI => 0x57,
            Self::PC => 0x58,
            Self::MSIZE => 0x59,
            Self::GAS => 0x5A,
            Self::JUMPDEST => 0x5B,
            Self::MCOPY => 0x5E,
            Self::PUSH(n) => 0x5F + n,
            Self::DUP(n) => 0x7F + n,
            Self::SWAP(n) => 0x8F + n,
            Self::LOG(n) => 0xA0 + n,
            Self::CREATE => 0xF0,
            Self::CALL => 0xF1,
            Self::CALLCODE => 0xF2,
            Self::RETURN => 0xF3,
            Self::DELEGATECALL => 0xF4,
            Self::CREATE2 => 0xF5,
            Self::STATICCALL => 0xFA,
            Self::REVERT => 0xFD,
            Self::INVALID => 0xFE,
            Self::SELFDESTRUCT => 0xFF,
            Self::UNDEFINED(byte) => byte,
        }
    }

    /// Number of immediate bytes following the opcode
    pub const fn immediate_len(self) -> usize {
        match self {
            Self::PUSH(n) => n as usize,
            _ => 0,
        }
    }

    /// Stack items consumed
    pub const fn inputs(self) -> usize {
        match self {
            Self::STOP | Self::JUMPDEST | Self::PUSH(_) | Self::INVALID | Self::UNDEFINED(_) => 0,
            Self::ADDRESS | Self::ORIGIN | Self::CALLER | Self::CALLVALUE | Self::CALLDATASIZE
            | Self::CODESIZE | Self::GASPRICE | Self::RETURNDATASIZE | Self::COINBASE
            | Self::TIMESTAMP | Self::NUMBER | Self::DIFFICULTY | Self::GASLIMIT | Self::CHAINID
            | Self::SELFBALANCE | Self::BASEFEE | Self::PC | Self::MSIZE | Self::GAS => 0,
            Self::ISZERO | Self::NOT | Self::BALANCE | Self::CALLDATALOAD | Self::EXTCODESIZE
            | Self::EXTCODEHASH | Self::BLOCKHASH | Self::POP | Self::MLOAD | Self::SLOAD
            | Self::JUMP | Self::SELFDESTRUCT => 1,
            Self::ADD | Self::MUL | Self::SUB | Self::DIV | Self::SDIV | Self::MOD | Self::SMOD
            | Self::EXP | Self::SIGNEXTEND | Self::LT | Self::GT | Self::SLT | Self::SGT
            | Self::EQ | Self::AND | Self::OR | Self::XOR | Self::BYTE | Self::SHL | Self::SHR
            | Self::SAR | Self::KECCAK256 | Self::MSTORE | Self::MSTORE8 | Self::SSTORE
            | Self::JUMPI | Self::RETURN | Self::REVERT => 2,
            Self::ADDMOD | Self::MULMOD | Self::CALLDATACOPY | Self::CODECOPY
            | Self::RETURNDATACOPY | Self::MCOPY | Self::CREATE => 3,
            Self::EXTCODECOPY | Self::CREATE2 => 4,
            Self::DELEGATECALL | Self::STATICCALL => 6,
            Self::CALL | Self::CALLCODE => 7,
            Self::DUP(n) => n as usize,
            Self::SWAP(n) => n as usize + 1,
            Self::LOG(n) => n as usize + 2,
        }
    }

    /// Stack items produced
    pub const fn outputs(self) -> usize {
        match self {
            Self::STOP | Self::CALLDATACOPY | Self::CODECOPY | Self::EXTCODECOPY
            | Self::RETURNDATACOPY | Self::POP | Self::MSTORE | Self::MSTORE8 | Self::SSTORE
            | Self::JUMP | Self::JUMPI | Self::JUMPDEST | Self::MCOPY | Self::LOG(_)
            | Self::RETURN | Self::REVERT | Self::INVALID | Self::SELFDESTRUCT
            | Self::UNDEFINED(_) => 0,
            Self::DUP(n) => n as usize + 1,
            Self::SWAP(n) => n as usize + 1,
            _ => 1,
        }
    }

    /// True for opcodes that change state and are forbidden under STATICCALL.
    /// CALL is checked separately since only a nonzero value is forbidden.
    pub const fn is_state_changing(self) -> bool {
        matches!(
            self,
            Self::SSTORE | Self::LOG(_) | Self::CREATE | Self::CREATE2 | Self::SELFDESTRUCT
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PUSH(n) => write!(f, "PUSH{}", n),
            Self::DUP(n) => write!(f, "DUP{}", n),
            Self::SWAP(n) => write!(f, "SWAP{}", n),
            Self::LOG(n) => write!(f, "LOG{}", n),
            Self::UNDEFINED(byte) => write!(f, "UNDEFINED(0x{:02x})", byte),
            other => write!(f, "{:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_encode_every_byte() {
        for byte in 0..=u8::MAX {
            assert_eq!(Opcode::decode(byte).byte(), byte);
        }
    }

    #[test]
    fn test_sized_families() {
        assert_eq!(Opcode::decode(0x5F), Opcode::PUSH(0));
        assert_eq!(Opcode::decode(0x60), Opcode::PUSH(1));
        assert_eq!(Opcode::decode(0x7F), Opcode::PUSH(32));
        assert_eq!(Opcode::decode(0x80), Opcode::DUP(1));
        assert_eq!(Opcode::decode(0x8F), Opcode::DUP(16));
        assert_eq!(Opcode::decode(0x90), Opcode::SWAP(1));
        assert_eq!(Opcode::decode(0x9F), Opcode::SWAP(16));
        assert_eq!(Opcode::decode(0xA0), Opcode::LOG(0));
        assert_eq!(Opcode::decode(0xA4), Opcode::LOG(4));
    }

    #[test]
    fn test_undefined_bytes() {
        for byte in [0x0C, 0x1F, 0x21, 0x49, 0x5C, 0x5D, 0xA5, 0xEF, 0xF6, 0xFB] {
            assert_eq!(Opcode::decode(byte), Opcode::UNDEFINED(byte));
        }
        // 0xFE is the designated invalid instruction, not an unassigned byte
        assert_eq!(Opcode::decode(0xFE), Opcode::INVALID);
    }

    #[test]
    fn test_immediate_len() {
        assert_eq!(Opcode::PUSH(0).immediate_len(), 0);
        assert_eq!(Opcode::PUSH(1).immediate_len(), 1);
        assert_eq!(Opcode::PUSH(32).immediate_len(), 32);
        assert_eq!(Opcode::ADD.immediate_len(), 0);
    }

    #[test]
    fn test_stack_arity() {
        assert_eq!((Opcode::ADD.inputs(), Opcode::ADD.outputs()), (2, 1));
        assert_eq!((Opcode::CALL.inputs(), Opcode::CALL.outputs()), (7, 1));
        assert_eq!((Opcode::DUP(3).inputs(), Opcode::DUP(3).outputs()), (3, 4));
        assert_eq!((Opcode::SWAP(2).inputs(), Opcode::SWAP(2).outputs()), (3, 3));
        assert_eq!((Opcode::LOG(4).inputs(), Opcode::LOG(4).outputs()), (6, 0));
        assert_eq!(Opcode::PUSH(5).outputs(), 1);
    }

    #[test]
    fn test_display() {
        assert_eq!(Opcode::PUSH(2).to_string(), "PUSH2");
        assert_eq!(Opcode::SSTORE.to_string(), "SSTORE");
        assert_eq!(Opcode::UNDEFINED(0xef).to_string(), "UNDEFINED(0xef)");
    }

    #[test]
    fn test_state_changing() {
        assert!(Opcode::SSTORE.is_state_changing());
        assert!(Opcode::LOG(2).is_state_changing());
        assert!(!Opcode::SLOAD.is_state_changing());
        assert!(!Opcode::CALL.is_state_changing());
    }
}
