//! Expression and statement compilation.
//!
//! Statements leave the stack empty. Expressions leave exactly one word.
//! Locals live in memory at `0x80 + 32 * id`, the first two words of memory
//! are hashing scratch, and reverts and logs stage their payload right after
//! the locals of the method being compiled.

mod expr;
mod stmt;

use std::collections::BTreeMap;

use alloy_primitives::U256;
use tracing::debug;

use crate::asm::{opcodes, CodeBuffer, Label, LabelGen};
use crate::error::CompileError;
use crate::extractor::{
    Accessor, ContractModel, Expr, ExprKind, LocalId, MethodId, Place, Stmt, StoragePath,
    Visibility,
};
use crate::layout::{SlotRecipe, StorageLayout};

/// Start of the local variable area in memory.
pub const LOCALS_START: usize = 0x80;

/// `bytes4(keccak256("Panic(uint256)"))`
pub const PANIC_SELECTOR: u32 = 0x4e48_7b71;
/// `bytes4(keccak256("Error(string)"))`
pub const ERROR_SELECTOR: u32 = 0x08c3_79a0;

pub fn local_offset(id: LocalId) -> usize {
    LOCALS_START + 32 * id.0
}

/// Shared failure exits. Each one is emitted once per binary, and only if used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Trap {
    /// Revert with empty data.
    Abort,
    Overflow,
    DivisionByZero,
    IndexOutOfBounds,
}

impl Trap {
    pub fn panic_code(self) -> Option<u8> {
        match self {
            Trap::Abort => None,
            Trap::Overflow => Some(0x11),
            Trap::DivisionByZero => Some(0x12),
            Trap::IndexOutOfBounds => Some(0x32),
        }
    }
}

/// Labels and trap blocks of one binary under construction.
#[derive(Debug, Default)]
pub struct CodeUnit {
    labels: LabelGen,
    traps: BTreeMap<Trap, Label>,
}

impl CodeUnit {
    pub fn fresh(&mut self) -> Label {
        self.labels.fresh()
    }

    /// Jump target that fails with `trap`.
    pub fn trap(&mut self, trap: Trap) -> Label {
        if let Some(label) = self.traps.get(&trap) {
            return *label;
        }
        let label = self.labels.fresh();
        self.traps.insert(trap, label);
        label
    }

    /// Emits the body of every trap requested so far.
    pub fn emit_traps(&self, code: &mut CodeBuffer) {
        for (trap, label) in &self.traps {
            code.jumpdest(*label);
            match trap.panic_code() {
                None => {
                    code.push_int(0).op(opcodes::DUP1).op(opcodes::REVERT);
                }
                Some(panic) => {
                    code.push(U256::from(PANIC_SELECTOR) << 224usize)
                        .push_int(0)
                        .op(opcodes::MSTORE)
                        .push_int(panic as usize)
                        .push_int(4)
                        .op(opcodes::MSTORE)
                        .push_int(0x24)
                        .push_int(0)
                        .op(opcodes::REVERT);
                }
            }
        }
    }
}

/// Compiled body of one method. Execution falls off the end into `exit`.
#[derive(Debug)]
pub struct MethodCode {
    pub method: MethodId,
    pub body: CodeBuffer,
    /// Where `return` jumps. The caller places it right after `body`.
    pub exit: Label,
}

pub(crate) struct BodyCompiler<'a> {
    model: &'a ContractModel,
    layout: &'a StorageLayout,
    unit: &'a mut CodeUnit,
    code: CodeBuffer,
    /// Memory offset where revert and log payloads are staged.
    payload: usize,
    exit: Label,
}

impl<'a> BodyCompiler<'a> {
    fn new(
        model: &'a ContractModel,
        layout: &'a StorageLayout,
        unit: &'a mut CodeUnit,
        locals: usize,
    ) -> Self {
        let exit = unit.fresh();
        Self {
            model,
            layout,
            unit,
            code: CodeBuffer::new(),
            payload: LOCALS_START + 32 * locals,
            exit,
        }
    }
}

/// Compiles the body of `id`. A returned value is left in memory word 0.
pub fn compile_method(
    model: &ContractModel,
    layout: &StorageLayout,
    unit: &mut CodeUnit,
    id: MethodId,
) -> Result<MethodCode, CompileError> {
    let method = model.method(id);
    check_storage_paths(&model.name, &method.name, layout, &method.body)?;

    let mut compiler = BodyCompiler::new(model, layout, unit, method.locals.len());

    compiler.block(&method.body);
    if method.return_type.is_some() {
        // Falling off the end returns the zero value.
        compiler.code.push_int(0).push_int(0).op(opcodes::MSTORE);
    }

    let BodyCompiler { code, exit, .. } = compiler;

    if method.visibility == Visibility::ReadOnly {
        verify_read_only(&model.name, &method.name, &code)?;
    }

    debug!(
        contract = %model.name,
        method = %method.name,
        instructions = code.instructions().len(),
        "compiled method body"
    );

    Ok(MethodCode {
        method: id,
        body: code,
        exit,
    })
}

/// Stores every field initializer, in declaration order.
pub fn compile_initializers(
    model: &ContractModel,
    layout: &StorageLayout,
    unit: &mut CodeUnit,
) -> CodeBuffer {
    let mut compiler = BodyCompiler::new(model, layout, unit, 0);

    for (i, field) in model.fields.iter().enumerate() {
        if let Some(value) = &field.initial_value {
            compiler.expr(value);
            compiler
                .code
                .push(layout.slot(crate::extractor::FieldId(i)))
                .op(opcodes::SSTORE);
        }
    }

    compiler.code
}

/// Rejects a body whose storage paths do not follow the slot recipes of the
/// layout. Scalar reads and writes must end on a direct slot. Length reads,
/// pushes and list iteration must end on a sequence.
fn check_storage_paths(
    contract: &str,
    method: &str,
    layout: &StorageLayout,
    body: &[Stmt],
) -> Result<(), CompileError> {
    let mut result = Ok(());
    for stmt in body {
        stmt.walk(&mut |stmt| {
            if result.is_ok() {
                result = check_stmt(layout, stmt);
            }
        });
    }
    result.map_err(|field: String| {
        CompileError::Internal(format!(
            "`{}::{}` addresses field `{}` in a way its storage layout does not allow",
            contract, method, field
        ))
    })
}

fn check_stmt(layout: &StorageLayout, stmt: &Stmt) -> Result<(), String> {
    match stmt {
        Stmt::Assign { place, value } => {
            if let Place::Storage(path) = place {
                check_path(layout, path, false)?;
            }
            check_expr(layout, value)
        }
        Stmt::Push { list, value } => {
            check_path(layout, list, true)?;
            check_expr(layout, value)
        }
        Stmt::ForEach { list, .. } => check_path(layout, list, true),
        Stmt::If { cond, .. } | Stmt::Require { cond, .. } => check_expr(layout, cond),
        Stmt::ForRange { count, .. } => check_expr(layout, count),
        Stmt::Return(Some(value)) => check_expr(layout, value),
        Stmt::Emit { args, .. } => args.iter().try_for_each(|arg| check_expr(layout, arg)),
        Stmt::Return(None) | Stmt::Fail(_) => Ok(()),
    }
}

fn check_expr(layout: &StorageLayout, expr: &Expr) -> Result<(), String> {
    match &expr.kind {
        ExprKind::Storage(path) => check_path(layout, path, false),
        ExprKind::Length(path) => check_path(layout, path, true),
        ExprKind::Arith { lhs, rhs, .. }
        | ExprKind::Compare { lhs, rhs, .. }
        | ExprKind::Logical { lhs, rhs, .. } => {
            check_expr(layout, lhs)?;
            check_expr(layout, rhs)
        }
        ExprKind::Not(inner) => check_expr(layout, inner),
        ExprKind::Literal(_) | ExprKind::Local(_) | ExprKind::Caller | ExprKind::CallValue => {
            Ok(())
        }
    }
}

fn check_path(layout: &StorageLayout, path: &StoragePath, sequence: bool) -> Result<(), String> {
    for accessor in &path.accessors {
        match accessor {
            Accessor::Key(key) | Accessor::Index(key) => check_expr(layout, key)?,
        }
    }
    let fits = match layout.resolve(path) {
        Some(SlotRecipe::Sequence) => sequence,
        Some(SlotRecipe::Direct) => !sequence,
        Some(SlotRecipe::Mapping { .. }) | None => false,
    };
    if fits {
        Ok(())
    } else {
        Err(layout.field(path.field).name.clone())
    }
}

/// Rejects a read-only body that writes storage or emits logs.
fn verify_read_only(contract: &str, method: &str, code: &CodeBuffer) -> Result<(), CompileError> {
    let writes = code.contains_op(opcodes::SSTORE)
        || (opcodes::LOG0..=opcodes::LOG4).any(|op| code.contains_op(op));
    if writes {
        return Err(CompileError::Internal(format!(
            "read-only method `{}::{}` compiled to a state-changing instruction",
            contract, method
        )));
    }
    Ok(())
}
