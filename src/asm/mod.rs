//! Single-pass assembler with symbolic labels.
//!
//! Every label reference is pushed with a fixed 2-byte immediate, so the size
//! of every instruction is known up front and one sizing pass resolves all
//! offsets.

pub mod opcodes;

use std::collections::HashMap;

use alloy_primitives::U256;
use thiserror::Error;

use crate::config::EvmVersion;

/// A label identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    /// A raw opcode with no operands.
    Op(u8),
    /// Push an immediate value, sized to its magnitude.
    Push(U256),
    /// Push a label's absolute offset as a PUSH2.
    PushLabel(Label),
    /// Marks a position. Emits nothing; jump targets add their own JUMPDEST.
    Label(Label),
    /// Raw bytes copied verbatim.
    Data(Vec<u8>),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AsmError {
    #[error("label {0} is referenced but never defined")]
    UnresolvedLabel(Label),

    #[error("label {0} is defined more than once")]
    DuplicateLabel(Label),

    #[error("label {label} resolves to offset {offset}, beyond PUSH2 range")]
    OffsetTooLarge { label: Label, offset: usize },
}

/// Hands out fresh labels. One generator per binary.
#[derive(Debug, Default)]
pub struct LabelGen {
    next: u32,
}

impl LabelGen {
    pub fn fresh(&mut self) -> Label {
        let label = Label(self.next);
        self.next += 1;
        label
    }
}

/// An instruction stream under construction.
#[derive(Debug, Default, Clone)]
pub struct CodeBuffer {
    instructions: Vec<Instruction>,
}

impl CodeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn op(&mut self, opcode: u8) -> &mut Self {
        self.instructions.push(Instruction::Op(opcode));
        self
    }

    pub fn ops(&mut self, opcodes: &[u8]) -> &mut Self {
        for &opcode in opcodes {
            self.op(opcode);
        }
        self
    }

    pub fn push(&mut self, value: U256) -> &mut Self {
        self.instructions.push(Instruction::Push(value));
        self
    }

    /// Pushes a small constant such as a memory offset or a size.
    pub fn push_int(&mut self, value: usize) -> &mut Self {
        self.push(U256::from(value))
    }

    pub fn push_label(&mut self, label: Label) -> &mut Self {
        self.instructions.push(Instruction::PushLabel(label));
        self
    }

    /// Defines `label` here without a JUMPDEST.
    pub fn mark(&mut self, label: Label) -> &mut Self {
        self.instructions.push(Instruction::Label(label));
        self
    }

    /// Defines `label` here as a jump target.
    pub fn jumpdest(&mut self, label: Label) -> &mut Self {
        self.mark(label).op(opcodes::JUMPDEST)
    }

    pub fn jump(&mut self, label: Label) -> &mut Self {
        self.push_label(label).op(opcodes::JUMP)
    }

    /// Jumps to `label` if the top of the stack is non-zero, consuming it.
    pub fn jump_if(&mut self, label: Label) -> &mut Self {
        self.push_label(label).op(opcodes::JUMPI)
    }

    pub fn data(&mut self, bytes: Vec<u8>) -> &mut Self {
        self.instructions.push(Instruction::Data(bytes));
        self
    }

    pub fn append(&mut self, other: CodeBuffer) -> &mut Self {
        self.instructions.extend(other.instructions);
        self
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Whether `opcode` appears as an instruction (push immediates and data excluded).
    pub fn contains_op(&self, opcode: u8) -> bool {
        self.instructions
            .iter()
            .any(|inst| matches!(inst, Instruction::Op(op) if *op == opcode))
    }
}

#[derive(Debug, Clone)]
pub struct AssembledCode {
    pub bytecode: Vec<u8>,
    pub label_offsets: HashMap<Label, usize>,
}

impl AssembledCode {
    pub fn offset(&self, label: Label) -> Option<usize> {
        self.label_offsets.get(&label).copied()
    }
}

/// Resolves labels and emits bytecode.
pub fn assemble(instructions: &[Instruction], evm: EvmVersion) -> Result<AssembledCode, AsmError> {
    let mut offset = 0usize;
    let mut label_offsets = HashMap::new();

    for inst in instructions {
        match inst {
            Instruction::Op(_) => offset += 1,
            Instruction::Push(value) => offset += 1 + push_width(*value, evm),
            Instruction::PushLabel(_) => offset += 3,
            Instruction::Label(label) => {
                if label_offsets.insert(*label, offset).is_some() {
                    return Err(AsmError::DuplicateLabel(*label));
                }
            }
            Instruction::Data(bytes) => offset += bytes.len(),
        }
    }

    let mut bytecode = Vec::with_capacity(offset);
    for inst in instructions {
        match inst {
            Instruction::Op(opcode) => bytecode.push(*opcode),
            Instruction::Push(value) => emit_push(&mut bytecode, *value, push_width(*value, evm)),
            Instruction::PushLabel(label) => {
                let target = *label_offsets
                    .get(label)
                    .ok_or(AsmError::UnresolvedLabel(*label))?;
                if target > 0xFFFF {
                    return Err(AsmError::OffsetTooLarge {
                        label: *label,
                        offset: target,
                    });
                }
                emit_push(&mut bytecode, U256::from(target), 2);
            }
            Instruction::Label(_) => {}
            Instruction::Data(bytes) => bytecode.extend_from_slice(bytes),
        }
    }

    Ok(AssembledCode {
        bytecode,
        label_offsets,
    })
}

/// Number of immediate bytes needed to push `value`.
fn push_width(value: U256, evm: EvmVersion) -> usize {
    if value.is_zero() {
        return if evm.has_push0() { 0 } else { 1 };
    }
    value.byte_len()
}

fn emit_push(bytecode: &mut Vec<u8>, value: U256, width: usize) {
    if width == 0 {
        bytecode.push(opcodes::PUSH0);
        return;
    }

    // PUSH1 = 0x60 ... PUSH32 = 0x7f
    bytecode.push(opcodes::PUSH1 + (width as u8 - 1));
    let bytes = value.to_be_bytes::<32>();
    bytecode.extend_from_slice(&bytes[32 - width..]);
}
