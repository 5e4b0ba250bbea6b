//! Selectors, the dispatch table, argument decoding and the JSON interface.
//!
//! Reference: <https://docs.soliditylang.org/en/develop/abi-spec.html>

use std::collections::{BTreeMap, HashMap};

use alloy_primitives::{hex, keccak256, Selector, B256, U256};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::asm::{opcodes, CodeBuffer, Label};
use crate::codegen::{local_offset, CodeUnit, Trap, LOCALS_START};
use crate::error::CompileError;
use crate::extractor::{ContractModel, EventDecl, MethodDecl, MethodId, Type, Visibility};

/// Formats `name(type1,type2)` from canonical ABI type names.
pub fn signature<'a>(name: &str, params: impl IntoIterator<Item = &'a Type>) -> String {
    let types = params
        .into_iter()
        .map(|ty| ty.abi_name().unwrap_or("?"))
        .collect::<Vec<_>>();
    format!("{}({})", name, types.join(","))
}

pub fn method_signature(method: &MethodDecl) -> String {
    signature(&method.name, method.params.iter().map(|p| &p.ty))
}

pub fn event_signature(event: &EventDecl) -> String {
    signature(&event.name, event.params.iter().map(|p| &p.ty))
}

/// First four bytes of the signature hash. The return type is not part of it.
pub fn selector(signature: &str) -> Selector {
    Selector::from_slice(&keccak256(signature.as_bytes())[..4])
}

/// Topic 0 of every log emitted for `event`.
pub fn event_topic(event: &EventDecl) -> B256 {
    keccak256(event_signature(event).as_bytes())
}

#[derive(Debug, Clone)]
pub struct DispatchEntry {
    pub selector: Selector,
    pub signature: String,
    pub method: MethodId,
    /// Where the dispatcher jumps, with the selector still on the stack.
    pub entry: Label,
}

/// Selector routing for every externally callable method.
#[derive(Debug, Clone)]
pub struct DispatchTable {
    entries: Vec<DispatchEntry>,
}

impl DispatchTable {
    /// Computes selectors for all non-constructor methods, failing on a collision.
    pub fn build(model: &ContractModel, unit: &mut CodeUnit) -> Result<Self, CompileError> {
        let entries = model
            .external_methods()
            .map(|(id, method)| {
                let signature = method_signature(method);
                let selector = selector(&signature);
                debug!(contract = %model.name, %signature, %selector, "computed selector");
                DispatchEntry {
                    selector,
                    signature,
                    method: id,
                    entry: unit.fresh(),
                }
            })
            .collect();
        Self::from_entries(&model.name, entries)
    }

    fn from_entries(contract: &str, entries: Vec<DispatchEntry>) -> Result<Self, CompileError> {
        let mut seen: HashMap<Selector, &DispatchEntry> = HashMap::new();
        for entry in &entries {
            if let Some(prev) = seen.insert(entry.selector, entry) {
                return Err(CompileError::SelectorCollision {
                    contract: contract.to_string(),
                    first: prev.signature.clone(),
                    second: entry.signature.clone(),
                    selector: hex::encode(entry.selector),
                });
            }
        }
        Ok(Self { entries })
    }

    pub fn entry(&self, method: MethodId) -> Option<&DispatchEntry> {
        self.entries.iter().find(|e| e.method == method)
    }

    /// `signature -> selector hex`, as written to artifact metadata.
    pub fn method_identifiers(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .map(|e| (e.signature.clone(), hex::encode(e.selector)))
            .collect()
    }

    /// Runtime prologue: route on the first four calldata bytes, or abort.
    pub fn emit_dispatcher(&self, unit: &mut CodeUnit, code: &mut CodeBuffer) {
        let abort = unit.trap(Trap::Abort);

        code.push_int(4)
            .op(opcodes::CALLDATASIZE)
            .op(opcodes::LT)
            .jump_if(abort)
            .push_int(0)
            .op(opcodes::CALLDATALOAD)
            .push_int(0xe0)
            .op(opcodes::SHR);

        for entry in &self.entries {
            code.op(opcodes::dup(1))
                .push(U256::from_be_slice(entry.selector.as_slice()))
                .op(opcodes::EQ)
                .jump_if(entry.entry);
        }

        code.jump(abort);
    }
}

/// Entry stub of an external method: drop the selector, check and copy arguments into locals.
pub fn emit_decoder(method: &MethodDecl, entry: Label, unit: &mut CodeUnit, code: &mut CodeBuffer) {
    let abort = unit.trap(Trap::Abort);

    code.jumpdest(entry).op(opcodes::POP);
    if !method.params.is_empty() {
        code.push_int(4 + 32 * method.params.len())
            .op(opcodes::CALLDATASIZE)
            .op(opcodes::LT)
            .jump_if(abort);
    }

    for (i, param) in method.params.iter().enumerate() {
        code.push_int(4 + 32 * i).op(opcodes::CALLDATALOAD);
        emit_word_check(&param.ty, abort, code);
        code.push_int(local_offset(param.local)).op(opcodes::MSTORE);
    }
}

/// Leaves `[word]` on the stack, aborting if it is not a clean value of `ty`.
fn emit_word_check(ty: &Type, abort: Label, code: &mut CodeBuffer) {
    match ty {
        Type::Address => {
            code.op(opcodes::DUP1)
                .push_int(160)
                .op(opcodes::SHR)
                .jump_if(abort);
        }
        Type::Boolean => {
            code.op(opcodes::DUP1).push_int(1).op(opcodes::LT).jump_if(abort);
        }
        _ => {}
    }
}

/// Exit stub: return memory word 0 for methods with a return type, otherwise stop.
pub fn emit_encoder(method: &MethodDecl, exit: Label, code: &mut CodeBuffer) {
    code.jumpdest(exit);
    match method.return_type {
        Some(_) => {
            code.push_int(32).push_int(0).op(opcodes::RETURN);
        }
        None => {
            code.op(opcodes::STOP);
        }
    }
}

/// Copies constructor arguments, appended after `code_end`, into the parameter locals.
pub fn emit_constructor_decoder(
    method: &MethodDecl,
    code_end: Label,
    unit: &mut CodeUnit,
    code: &mut CodeBuffer,
) {
    if method.params.is_empty() {
        return;
    }
    let abort = unit.trap(Trap::Abort);
    let size = 32 * method.params.len();

    code.push_int(size)
        .push_label(code_end)
        .op(opcodes::ADD)
        .op(opcodes::CODESIZE)
        .op(opcodes::LT)
        .jump_if(abort);

    code.push_int(size)
        .push_int(size)
        .op(opcodes::CODESIZE)
        .op(opcodes::SUB)
        .push_int(LOCALS_START)
        .op(opcodes::CODECOPY);

    for param in &method.params {
        if matches!(param.ty, Type::Address | Type::Boolean) {
            code.push_int(local_offset(param.local)).op(opcodes::MLOAD);
            emit_word_check(&param.ty, abort, code);
            code.op(opcodes::POP);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateMutability {
    View,
    Nonpayable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiParam {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiEventParam {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub indexed: bool,
}

/// One entry of the JSON interface descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AbiItem {
    Constructor {
        inputs: Vec<AbiParam>,
        #[serde(rename = "stateMutability")]
        state_mutability: StateMutability,
    },
    Function {
        name: String,
        inputs: Vec<AbiParam>,
        outputs: Vec<AbiParam>,
        #[serde(rename = "stateMutability")]
        state_mutability: StateMutability,
    },
    Event {
        name: String,
        inputs: Vec<AbiEventParam>,
        anonymous: bool,
    },
}

fn abi_type(ty: &Type) -> String {
    ty.abi_name().unwrap_or("?").to_string()
}

fn params_abi(method: &MethodDecl) -> Vec<AbiParam> {
    method
        .params
        .iter()
        .map(|p| AbiParam {
            name: p.name.clone(),
            ty: abi_type(&p.ty),
        })
        .collect()
}

/// The interface descriptor: constructor, methods and events in declaration order.
pub fn interface(model: &ContractModel) -> Vec<AbiItem> {
    let mut items = Vec::new();

    if let Some(id) = model.constructor() {
        items.push(AbiItem::Constructor {
            inputs: params_abi(model.method(id)),
            state_mutability: StateMutability::Nonpayable,
        });
    }

    for (_, method) in model.external_methods() {
        items.push(AbiItem::Function {
            name: method.name.clone(),
            inputs: params_abi(method),
            outputs: method
                .return_type
                .iter()
                .map(|ty| AbiParam {
                    name: String::new(),
                    ty: abi_type(ty),
                })
                .collect(),
            state_mutability: match method.visibility {
                Visibility::ReadOnly => StateMutability::View,
                Visibility::Mutating => StateMutability::Nonpayable,
            },
        });
    }

    for event in &model.events {
        items.push(AbiItem::Event {
            name: event.name.clone(),
            inputs: event
                .params
                .iter()
                .map(|p| AbiEventParam {
                    name: p.name.clone(),
                    ty: abi_type(&p.ty),
                    indexed: p.indexed,
                })
                .collect(),
            anonymous: false,
        });
    }

    items
}
