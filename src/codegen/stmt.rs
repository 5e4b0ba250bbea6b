use alloy_primitives::U256;

use super::expr::Access;
use super::{local_offset, BodyCompiler, Trap, ERROR_SELECTOR};
use crate::asm::opcodes::*;
use crate::extractor::{Expr, EventId, LocalId, Place, Stmt, StoragePath};

impl BodyCompiler<'_> {
    pub(super) fn block(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Assign { place, value } => {
                self.expr(value);
                match place {
                    Place::Local(id) => self.store_local(*id),
                    Place::Storage(path) => {
                        self.slot(path, Access::Write);
                        self.code.op(SSTORE);
                    }
                }
            }
            Stmt::Push { list, value } => self.push_element(list, value),
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let otherwise = self.unit.fresh();
                self.expr(cond);
                self.code.op(ISZERO).jump_if(otherwise);
                self.block(then_branch);
                if else_branch.is_empty() {
                    self.code.jumpdest(otherwise);
                } else {
                    let end = self.unit.fresh();
                    self.code.jump(end).jumpdest(otherwise);
                    self.block(else_branch);
                    self.code.jumpdest(end);
                }
            }
            Stmt::ForRange {
                var,
                counter,
                bound,
                count,
                body,
            } => {
                self.expr(count);
                self.store_local(*bound);
                self.counted_loop(*counter, *bound, |this| {
                    this.load_local(*counter);
                    this.store_local(*var);
                    this.block(body);
                });
            }
            Stmt::ForEach {
                var,
                counter,
                bound,
                base,
                list,
                body,
            } => {
                // The length is read once; elements pushed by the body are not visited.
                self.slot(list, Access::Read);
                self.code.op(DUP1).op(SLOAD);
                self.store_local(*bound);
                self.code
                    .push_int(0)
                    .op(MSTORE)
                    .push_int(0x20)
                    .push_int(0)
                    .op(KECCAK256);
                self.store_local(*base);
                self.counted_loop(*counter, *bound, |this| {
                    this.load_local(*base);
                    this.load_local(*counter);
                    this.code.ops(&[ADD, SLOAD]);
                    this.store_local(*var);
                    this.block(body);
                });
            }
            Stmt::Return(value) => {
                if let Some(value) = value {
                    self.expr(value);
                    self.code.push_int(0).op(MSTORE);
                }
                self.code.jump(self.exit);
            }
            Stmt::Fail(reason) => self.revert_with_reason(reason),
            Stmt::Require { cond, reason } => {
                let ok = self.unit.fresh();
                self.expr(cond);
                self.code.jump_if(ok);
                self.revert_with_reason(reason);
                self.code.jumpdest(ok);
            }
            Stmt::Emit { event, args } => self.emit(*event, args),
        }
    }

    fn load_local(&mut self, id: LocalId) {
        self.code.push_int(local_offset(id)).op(MLOAD);
    }

    fn store_local(&mut self, id: LocalId) {
        self.code.push_int(local_offset(id)).op(MSTORE);
    }

    /// Runs `body` while `counter < bound`, starting from zero.
    fn counted_loop(&mut self, counter: LocalId, bound: LocalId, body: impl FnOnce(&mut Self)) {
        let top = self.unit.fresh();
        let end = self.unit.fresh();

        self.code.push_int(0);
        self.store_local(counter);
        self.code.jumpdest(top);
        self.load_local(bound);
        self.load_local(counter);
        self.code.ops(&[LT, ISZERO]).jump_if(end);

        body(self);

        // counter < bound here, so the increment cannot wrap.
        self.code.push_int(1);
        self.load_local(counter);
        self.code.op(ADD);
        self.store_local(counter);
        self.code.jump(top).jumpdest(end);
    }

    /// `list.push(value)`: bump the stored length, then write at the old length.
    fn push_element(&mut self, list: &StoragePath, value: &Expr) {
        let overflow = self.unit.trap(Trap::Overflow);

        self.expr(value);
        self.slot(list, Access::Read);
        // [value, base, len, len + 1]
        self.code
            .ops(&[DUP1, SLOAD, DUP1])
            .push_int(1)
            .ops(&[ADD, DUP1, ISZERO])
            .jump_if(overflow)
            .ops(&[DUP3, SSTORE]);
        // [value, base, len]
        self.element_slot();
        self.code.op(SSTORE);
    }

    /// Reverts with `Error(reason)`, staging the payload after the locals.
    fn revert_with_reason(&mut self, reason: &str) {
        let at = self.payload;
        let bytes = reason.as_bytes();

        self.code
            .push(U256::from(ERROR_SELECTOR) << 224usize)
            .push_int(at)
            .op(MSTORE)
            .push_int(0x20)
            .push_int(at + 4)
            .op(MSTORE)
            .push_int(bytes.len())
            .push_int(at + 36)
            .op(MSTORE);

        for (i, chunk) in bytes.chunks(32).enumerate() {
            let mut word = [0u8; 32];
            word[..chunk.len()].copy_from_slice(chunk);
            self.code
                .push(U256::from_be_bytes(word))
                .push_int(at + 68 + 32 * i)
                .op(MSTORE);
        }

        let size = 68 + bytes.len().div_ceil(32) * 32;
        self.code.push_int(size).push_int(at).op(REVERT);
    }

    /// Non-indexed arguments are ABI words in the log data; indexed ones become topics.
    ///
    /// Arguments are evaluated left to right. Topic values wait in memory
    /// right after the log data until every argument has been computed.
    fn emit(&mut self, id: EventId, args: &[Expr]) {
        let model = self.model;
        let event = model.event(id);
        let topic0 = crate::abi::event_topic(event);

        let data_words = event.params.iter().filter(|param| !param.indexed).count();
        let topics_at = self.payload + 32 * data_words;

        let mut data = 0;
        let mut topics = 0;
        for (param, arg) in event.params.iter().zip(args) {
            self.expr(arg);
            if param.indexed {
                self.code.push_int(topics_at + 32 * topics).op(MSTORE);
                topics += 1;
            } else {
                self.code.push_int(self.payload + 32 * data).op(MSTORE);
                data += 1;
            }
        }

        for i in (0..topics).rev() {
            self.code.push_int(topics_at + 32 * i).op(MLOAD);
        }

        self.code
            .push(U256::from_be_bytes(topic0.0))
            .push_int(32 * data_words)
            .push_int(self.payload)
            .op(log(topics as u8 + 1));
    }
}
