use alloy_primitives::U256;

use super::{local_offset, BodyCompiler, Trap};
use crate::asm::opcodes::*;
use crate::extractor::{Accessor, ArithOp, CompareOp, Expr, ExprKind, LogicalOp, StoragePath};

/// What the caller does with a sequence element slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Access {
    /// No bounds check on the slot itself.
    Read,
    /// Out-of-range indices panic.
    Write,
}

impl BodyCompiler<'_> {
    pub(super) fn expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Literal(value) => {
                self.code.push(*value);
            }
            ExprKind::Local(id) => {
                self.code.push_int(local_offset(*id)).op(MLOAD);
            }
            ExprKind::Storage(path) => self.storage_read(path),
            ExprKind::Length(path) => {
                self.slot(path, Access::Read);
                self.code.op(SLOAD);
            }
            ExprKind::Arith {
                op,
                lhs,
                rhs,
                checked,
            } => {
                self.expr(lhs);
                self.expr(rhs);
                self.arith(*op, *checked);
            }
            ExprKind::Compare { op, lhs, rhs } => {
                self.expr(lhs);
                self.expr(rhs);
                // Stack: [lhs, rhs]. LT and GT compare top against second.
                match op {
                    CompareOp::Eq => self.code.op(EQ),
                    CompareOp::Ne => self.code.ops(&[EQ, ISZERO]),
                    CompareOp::Lt => self.code.ops(&[SWAP1, LT]),
                    CompareOp::Gt => self.code.ops(&[SWAP1, GT]),
                    CompareOp::Le => self.code.ops(&[SWAP1, GT, ISZERO]),
                    CompareOp::Ge => self.code.ops(&[SWAP1, LT, ISZERO]),
                };
            }
            ExprKind::Logical { op, lhs, rhs } => {
                let end = self.unit.fresh();
                self.expr(lhs);
                self.code.op(DUP1);
                if *op == LogicalOp::And {
                    self.code.op(ISZERO);
                }
                self.code.jump_if(end).op(POP);
                self.expr(rhs);
                self.code.jumpdest(end);
            }
            ExprKind::Not(inner) => {
                self.expr(inner);
                self.code.op(ISZERO);
            }
            ExprKind::Caller => {
                self.code.op(CALLER);
            }
            ExprKind::CallValue => {
                self.code.op(CALLVALUE);
            }
        }
    }

    /// Applies `op` to `[lhs, rhs]`, leaving the result.
    fn arith(&mut self, op: ArithOp, checked: bool) {
        match (op, checked) {
            (ArithOp::Add, true) => {
                let overflow = self.unit.trap(Trap::Overflow);
                // sum < lhs means the addition wrapped.
                self.code.ops(&[DUP2, ADD, SWAP1, DUP2, LT]).jump_if(overflow);
            }
            (ArithOp::Add, false) => {
                self.code.op(ADD);
            }
            (ArithOp::Sub, true) => {
                let underflow = self.unit.trap(Trap::Overflow);
                self.code.ops(&[DUP1, DUP3, LT]).jump_if(underflow).ops(&[SWAP1, SUB]);
            }
            (ArithOp::Sub, false) => {
                self.code.ops(&[SWAP1, SUB]);
            }
            (ArithOp::Mul, true) => {
                let overflow = self.unit.trap(Trap::Overflow);
                let done = self.unit.fresh();
                // [a, b, a*b]; a != 0 && (a*b)/a != b means the product wrapped.
                self.code
                    .ops(&[DUP2, DUP2, MUL, DUP3, ISZERO])
                    .jump_if(done)
                    .ops(&[DUP3, DUP2, DIV, DUP3, EQ, ISZERO])
                    .jump_if(overflow)
                    .jumpdest(done)
                    .ops(&[SWAP2, POP, POP]);
            }
            (ArithOp::Mul, false) => {
                self.code.op(MUL);
            }
            (ArithOp::Div, _) | (ArithOp::Rem, _) => {
                let division = self.unit.trap(Trap::DivisionByZero);
                let opcode = if op == ArithOp::Div { DIV } else { MOD };
                self.code
                    .ops(&[DUP1, ISZERO])
                    .jump_if(division)
                    .ops(&[SWAP1, opcode]);
            }
        }
    }

    fn storage_read(&mut self, path: &StoragePath) {
        match path.accessors.split_last() {
            Some((Accessor::Index(index), keys)) => {
                self.key_slots(path, keys);
                self.sequence_read(index);
            }
            _ => {
                self.slot(path, Access::Read);
                self.code.op(SLOAD);
            }
        }
    }

    /// Leaves the slot addressed by `path`.
    ///
    /// A trailing sequence index is bounds-checked against the stored length
    /// when writing; reads go through [`Self::storage_read`] instead.
    pub(super) fn slot(&mut self, path: &StoragePath, access: Access) {
        match path.accessors.split_last() {
            Some((Accessor::Index(index), keys)) => {
                self.key_slots(path, keys);
                self.sequence_slot(index, access);
            }
            _ => self.key_slots(path, &path.accessors),
        }
    }

    /// Pushes the field's base slot and folds `accessors` into it.
    fn key_slots(&mut self, path: &StoragePath, accessors: &[Accessor]) {
        self.code.push(self.layout.slot(path.field));
        for accessor in accessors {
            match accessor {
                Accessor::Key(key) => {
                    self.expr(key);
                    // keccak256(key ++ slot)
                    self.code
                        .push_int(0)
                        .op(MSTORE)
                        .push_int(0x20)
                        .op(MSTORE)
                        .push_int(0x40)
                        .push_int(0)
                        .op(KECCAK256);
                }
                Accessor::Index(index) => self.sequence_slot(index, Access::Read),
            }
        }
    }

    /// Turns `[base]` into `[keccak256(base) + index]`.
    fn sequence_slot(&mut self, index: &Expr, access: Access) {
        self.expr(index);
        // [base, index]
        if access == Access::Write {
            let out_of_bounds = self.unit.trap(Trap::IndexOutOfBounds);
            self.code
                .ops(&[DUP2, SLOAD, DUP2, LT, ISZERO])
                .jump_if(out_of_bounds);
        }
        self.element_slot();
    }

    /// `[base, index]` to `[keccak256(base) + index]`.
    pub(super) fn element_slot(&mut self) {
        self.code
            .op(SWAP1)
            .push_int(0)
            .op(MSTORE)
            .push_int(0x20)
            .push_int(0)
            .ops(&[KECCAK256, ADD]);
    }

    /// Turns `[base]` into the element value, or zero past the end.
    fn sequence_read(&mut self, index: &Expr) {
        let in_bounds = self.unit.fresh();
        let done = self.unit.fresh();

        self.expr(index);
        self.code
            .ops(&[DUP2, SLOAD, DUP2, LT])
            .jump_if(in_bounds)
            .ops(&[POP, POP])
            .push(U256::ZERO)
            .jump(done)
            .jumpdest(in_bounds);
        self.element_slot();
        self.code.op(SLOAD).jumpdest(done);
    }
}
