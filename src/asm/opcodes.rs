//! The EVM opcodes the code generator emits.

pub const STOP: u8 = 0x00;
pub const ADD: u8 = 0x01;
pub const MUL: u8 = 0x02;
pub const SUB: u8 = 0x03;
pub const DIV: u8 = 0x04;
pub const MOD: u8 = 0x06;

pub const LT: u8 = 0x10;
pub const GT: u8 = 0x11;
pub const EQ: u8 = 0x14;
pub const ISZERO: u8 = 0x15;
pub const SHR: u8 = 0x1c;

pub const KECCAK256: u8 = 0x20;

pub const CALLER: u8 = 0x33;
pub const CALLVALUE: u8 = 0x34;
pub const CALLDATALOAD: u8 = 0x35;
pub const CALLDATASIZE: u8 = 0x36;
pub const CODESIZE: u8 = 0x38;
pub const CODECOPY: u8 = 0x39;

pub const POP: u8 = 0x50;
pub const MLOAD: u8 = 0x51;
pub const MSTORE: u8 = 0x52;
pub const SLOAD: u8 = 0x54;
pub const SSTORE: u8 = 0x55;
pub const JUMP: u8 = 0x56;
pub const JUMPI: u8 = 0x57;
pub const JUMPDEST: u8 = 0x5b;
pub const PUSH0: u8 = 0x5f;
pub const PUSH1: u8 = 0x60;
pub const PUSH2: u8 = 0x61;

pub const DUP1: u8 = 0x80;
pub const DUP2: u8 = 0x81;
pub const DUP3: u8 = 0x82;
pub const SWAP1: u8 = 0x90;
pub const SWAP2: u8 = 0x91;

pub const LOG0: u8 = 0xa0;
pub const LOG4: u8 = 0xa4;

pub const RETURN: u8 = 0xf3;
pub const REVERT: u8 = 0xfd;

/// Returns the DUP opcode for the given depth (1-16).
#[must_use]
pub const fn dup(n: u8) -> u8 {
    debug_assert!(n >= 1 && n <= 16);
    DUP1 + n - 1
}

/// Returns the LOG opcode for the given topic count (0-4).
#[must_use]
pub const fn log(topics: u8) -> u8 {
    debug_assert!(topics <= 4);
    LOG0 + topics
}
