//! Compiled contracts run on the reference interpreter.

use alloy_primitives::U256;
use anyhow::{ensure, Result};

use super::interpreter::{
    account, calldata, immediate_len, panic_code, revert_reason, word, Context, Evm, Outcome,
};
use crate::asm::opcodes;
use crate::layout::{mapping_slot, sequence_element_slot};
use crate::{compile, compile_single, CompiledContract, CompilerConfig, EvmVersion};

const TOKEN: &str = r#"
    contract Token {
        field owner: address;
        field total: uint = 1_000;
        field balances: map<address, uint>;
        field allowances: map<address, map<address, uint>>;
        field holders: list<address>;

        event Transfer(indexed from: address, indexed to: address, amount: uint);
        event Approval(indexed holder: address, spender: address, amount: uint);

        constructor(supply: uint) {
            owner = sender();
            total += supply;
            balances[sender()] = supply;
            holders.push(sender());
        }

        @readonly
        fn totalSupply() -> uint {
            return total;
        }

        @readonly
        fn balanceOf(who: address) -> uint {
            return balances[who];
        }

        @readonly
        fn allowance(holder: address, spender: address) -> uint {
            return allowances[holder][spender];
        }

        @readonly
        fn isOwner(who: address) -> bool {
            return who == owner;
        }

        @mutating
        fn transfer(to: address, amount: uint) -> bool {
            require(balances[sender()] >= amount, "insufficient balance");
            balances[sender()] -= amount;
            if balances[to] == 0 {
                holders.push(to);
            }
            balances[to] += amount;
            emit Transfer(sender(), to, amount);
            return true;
        }

        @mutating
        fn approve(spender: address, amount: uint) {
            allowances[sender()][spender] = amount;
            emit Approval(sender(), spender, amount);
        }

        @mutating
        fn burnAll() {
            total = 0;
            fail("burning is disabled");
        }

        @readonly
        fn holderCount() -> uint {
            return holders.length;
        }
    }
"#;

const ARITHMETIC: &str = r#"
    contract Arithmetic {
        @readonly fn add(a: uint, b: uint) -> uint { return a + b; }
        @readonly fn sub(a: uint, b: uint) -> uint { return a - b; }
        @readonly fn mul(a: uint, b: uint) -> uint { return a * b; }
        @readonly fn div(a: uint, b: uint) -> uint { return a / b; }
        @readonly fn rem(a: uint, b: uint) -> uint { return a % b; }
        @readonly fn wrappingAdd(a: uint, b: uint) -> uint { unchecked { return a + b; } }
        @readonly fn wrappingSub(a: uint, b: uint) -> uint { unchecked { return a - b; } }
        @readonly fn atMost(a: uint, b: uint) -> bool { return a <= b; }
        @readonly fn above(a: uint, b: uint) -> bool { return a > b; }
        @readonly fn safeRatio(a: uint, b: uint) -> bool { return b != 0 && a / b > 1; }
        @readonly fn either(a: bool, b: bool) -> bool { return a || !b; }
        @readonly fn implicitZero() -> uint { }
    }
"#;

const SEQUENCES: &str = r#"
    contract Sequences {
        field items: list<uint>;
        field limit: uint = 3;

        @mutating fn add(item: uint) { items.push(item); }
        @mutating fn set(i: uint, item: uint) { items[i] = item; }
        @readonly fn at(i: uint) -> uint { return items[i]; }
        @readonly fn count() -> uint { return items.length; }

        @readonly
        fn sum() -> uint {
            let total = 0;
            for item in items {
                total += item;
            }
            return total;
        }

        @readonly
        fn contains(needle: uint) -> bool {
            for item in items {
                if item == needle {
                    return true;
                }
            }
            return false;
        }

        @readonly
        fn triangle(n: uint) -> uint {
            let acc = 0;
            for i in range(n) {
                acc += i;
            }
            return acc;
        }

        @mutating
        fn doubleAll() {
            for i in range(items.length) {
                items[i] = items[i] * 2;
            }
        }

        @mutating
        fn capped(item: uint) {
            require(items.length < limit, "the list is full and cannot take any more items");
            items.push(item);
        }
    }
"#;

fn deployer() -> Context {
    Context {
        caller: account(1),
        value: U256::ZERO,
    }
}

fn from(n: u64) -> Context {
    Context {
        caller: account(n),
        value: U256::ZERO,
    }
}

fn deploy_with(source: &str, args: &[U256], config: &CompilerConfig) -> Result<(CompiledContract, Evm)> {
    let contract = compile_single(source, config)?;
    let mut evm = Evm::new(config.evm_version);
    let outcome = evm.deploy(&contract.deployment, args, deployer());
    ensure!(
        matches!(outcome, Outcome::Return(_)),
        "deployment of {} failed: {:?}",
        contract.name,
        outcome
    );
    Ok((contract, evm))
}

fn deploy(source: &str, args: &[U256]) -> Result<(CompiledContract, Evm)> {
    deploy_with(source, args, &CompilerConfig::default())
}

fn call(evm: &mut Evm, signature: &str, args: &[U256], ctx: Context) -> Outcome {
    evm.call(&calldata(signature, args), ctx)
}

fn returned(outcome: Outcome) -> Result<U256> {
    outcome
        .word()
        .ok_or_else(|| anyhow::anyhow!("expected a single return word, got {:?}", outcome))
}

fn panicked(outcome: &Outcome) -> Option<u64> {
    match outcome {
        Outcome::Revert(data) => panic_code(data),
        _ => None,
    }
}

/// Walks `code` instruction by instruction, skipping push immediates.
fn opcodes_of(code: &[u8]) -> Vec<u8> {
    let mut ops = Vec::new();
    let mut pc = 0;
    while pc < code.len() {
        ops.push(code[pc]);
        pc += 1 + immediate_len(code[pc]);
    }
    ops
}

#[test]
fn test_deployment_installs_runtime() -> Result<()> {
    let (contract, evm) = deploy(TOKEN, &[word(500)])?;
    assert_eq!(evm.code, contract.runtime);
    assert!(contract.deployment.len() > contract.runtime.len());
    assert!(contract.deployment.ends_with(&contract.runtime));
    Ok(())
}

#[test]
fn test_constructor_and_initializers() -> Result<()> {
    let (contract, mut evm) = deploy(TOKEN, &[word(500)])?;

    // The initializer runs before the constructor body.
    assert_eq!(returned(call(&mut evm, "totalSupply()", &[], from(9)))?, word(1_500));
    assert_eq!(returned(call(&mut evm, "balanceOf(address)", &[account(1)], from(9)))?, word(500));
    assert_eq!(returned(call(&mut evm, "isOwner(address)", &[account(1)], from(9)))?, word(1));
    assert_eq!(returned(call(&mut evm, "isOwner(address)", &[account(2)], from(9)))?, word(0));
    assert_eq!(returned(call(&mut evm, "holderCount()", &[], from(9)))?, word(1));

    let slots: Vec<_> = contract.layout.fields().iter().map(|f| f.slot).collect();
    assert_eq!(slots, [word(0), word(1), word(2), word(3), word(4)]);
    assert_eq!(evm.sload(word(0)), account(1));
    assert_eq!(evm.sload(mapping_slot(account(1), word(2))), word(500));
    assert_eq!(evm.sload(word(4)), word(1));
    assert_eq!(evm.sload(sequence_element_slot(word(4), word(0))), account(1));
    Ok(())
}

#[test]
fn test_constructor_is_not_reachable_after_deployment() -> Result<()> {
    let (contract, mut evm) = deploy(TOKEN, &[word(500)])?;
    assert!(!contract.dispatch.method_identifiers().keys().any(|sig| sig.starts_with("constructor")));

    let outcome = call(&mut evm, "constructor(uint256)", &[word(1)], from(2));
    assert_eq!(outcome, Outcome::Revert(Vec::new()));
    assert_eq!(returned(call(&mut evm, "totalSupply()", &[], from(2)))?, word(1_500));
    Ok(())
}

#[test]
fn test_deployment_without_constructor_arguments_reverts() -> Result<()> {
    let contract = compile_single(TOKEN, &CompilerConfig::default())?;
    let mut evm = Evm::new(EvmVersion::Shanghai);
    let outcome = evm.deploy(&contract.deployment, &[], deployer());
    assert_eq!(outcome, Outcome::Revert(Vec::new()));
    assert!(evm.storage.is_empty());
    Ok(())
}

#[test]
fn test_transfer_moves_balance_and_logs() -> Result<()> {
    let (contract, mut evm) = deploy(TOKEN, &[word(500)])?;

    let outcome = call(&mut evm, "transfer(address,uint256)", &[account(2), word(120)], from(1));
    assert_eq!(returned(outcome)?, word(1));

    assert_eq!(returned(call(&mut evm, "balanceOf(address)", &[account(1)], from(1)))?, word(380));
    assert_eq!(returned(call(&mut evm, "balanceOf(address)", &[account(2)], from(1)))?, word(120));
    assert_eq!(returned(call(&mut evm, "holderCount()", &[], from(1)))?, word(2));

    assert_eq!(evm.logs.len(), 1);
    let log = &evm.logs[0];
    let transfer = contract.model.events.iter().find(|e| e.name == "Transfer").unwrap();
    assert_eq!(log.topics[0], U256::from_be_bytes(crate::abi::event_topic(transfer).0));
    assert_eq!(
        log.topics[0],
        U256::from_be_bytes(alloy_primitives::hex!(
            "ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        ))
    );
    assert_eq!(&log.topics[1..], &[account(1), account(2)]);
    assert_eq!(log.data, word(120).to_be_bytes::<32>().to_vec());
    Ok(())
}

#[test]
fn test_event_data_keeps_declaration_order() -> Result<()> {
    let (_, mut evm) = deploy(TOKEN, &[word(500)])?;
    let outcome = call(&mut evm, "approve(address,uint256)", &[account(3), word(77)], from(1));
    assert_eq!(outcome, Outcome::Stop);

    let log = &evm.logs[0];
    assert_eq!(log.topics.len(), 2);
    assert_eq!(log.topics[1], account(1));
    let mut data = account(3).to_be_bytes::<32>().to_vec();
    data.extend_from_slice(&word(77).to_be_bytes::<32>());
    assert_eq!(log.data, data);
    Ok(())
}

#[test]
fn test_event_arguments_evaluate_left_to_right() -> Result<()> {
    let source = r#"
        contract Meter {
            event Reading(indexed ratio: uint, next: uint, indexed by: address);

            @mutating
            fn record(x: uint, y: uint) {
                emit Reading(x / y, x + 1, sender());
            }
        }
    "#;
    let (_, mut evm) = deploy(source, &[])?;

    // Both the topic and the data argument fail. The leftmost one decides the panic.
    let outcome = call(&mut evm, "record(uint256,uint256)", &[U256::MAX, word(0)], from(2));
    assert_eq!(panicked(&outcome), Some(0x12));

    assert_eq!(call(&mut evm, "record(uint256,uint256)", &[word(10), word(4)], from(2)), Outcome::Stop);
    let log = &evm.logs[0];
    assert_eq!(&log.topics[1..], &[word(2), account(2)]);
    assert_eq!(log.data, word(11).to_be_bytes::<32>().to_vec());
    Ok(())
}

#[test]
fn test_nested_mapping() -> Result<()> {
    let (_, mut evm) = deploy(TOKEN, &[word(500)])?;
    call(&mut evm, "approve(address,uint256)", &[account(3), word(77)], from(1));

    let allowance = call(&mut evm, "allowance(address,address)", &[account(1), account(3)], from(5));
    assert_eq!(returned(allowance)?, word(77));
    let reversed = call(&mut evm, "allowance(address,address)", &[account(3), account(1)], from(5));
    assert_eq!(returned(reversed)?, word(0));

    let slot = mapping_slot(account(3), mapping_slot(account(1), word(3)));
    assert_eq!(evm.sload(slot), word(77));
    Ok(())
}

#[test]
fn test_unset_mapping_entries_read_zero() -> Result<()> {
    let (_, mut evm) = deploy(TOKEN, &[word(500)])?;
    let outcome = call(&mut evm, "balanceOf(address)", &[account(42)], from(1));
    assert_eq!(returned(outcome)?, word(0));
    Ok(())
}

#[test]
fn test_require_reverts_with_reason_and_rolls_back() -> Result<()> {
    let (_, mut evm) = deploy(TOKEN, &[word(500)])?;
    let before = evm.storage.clone();

    let outcome = call(&mut evm, "transfer(address,uint256)", &[account(2), word(501)], from(1));
    match &outcome {
        Outcome::Revert(data) => {
            assert_eq!(revert_reason(data).as_deref(), Some("insufficient balance"));
            assert_eq!(data.len(), 4 + 32 + 32 + 32);
        }
        other => panic!("expected a revert, got {:?}", other),
    }
    assert_eq!(evm.storage, before);
    assert!(evm.logs.is_empty());
    Ok(())
}

#[test]
fn test_fail_discards_earlier_writes() -> Result<()> {
    let (_, mut evm) = deploy(TOKEN, &[word(500)])?;
    let outcome = call(&mut evm, "burnAll()", &[], from(1));
    match &outcome {
        Outcome::Revert(data) => assert_eq!(revert_reason(data).as_deref(), Some("burning is disabled")),
        other => panic!("expected a revert, got {:?}", other),
    }
    assert_eq!(returned(call(&mut evm, "totalSupply()", &[], from(1)))?, word(1_500));
    Ok(())
}

#[test]
fn test_long_revert_reason_spans_words() -> Result<()> {
    let (_, mut evm) = deploy(SEQUENCES, &[])?;
    for item in 0..3 {
        assert_eq!(call(&mut evm, "capped(uint256)", &[word(item)], from(1)), Outcome::Stop);
    }
    let outcome = call(&mut evm, "capped(uint256)", &[word(9)], from(1));
    let reason = "the list is full and cannot take any more items";
    match &outcome {
        Outcome::Revert(data) => {
            assert_eq!(revert_reason(data).as_deref(), Some(reason));
            assert_eq!(data.len(), 68 + 64);
        }
        other => panic!("expected a revert, got {:?}", other),
    }
    Ok(())
}

#[test]
fn test_unknown_selector_and_short_calldata_revert_empty() -> Result<()> {
    let (_, mut evm) = deploy(TOKEN, &[word(500)])?;

    assert_eq!(call(&mut evm, "mint(uint256)", &[word(1)], from(1)), Outcome::Revert(Vec::new()));
    assert_eq!(evm.call(&[0x70, 0xa0], from(1)), Outcome::Revert(Vec::new()));
    assert_eq!(evm.call(&[], from(1)), Outcome::Revert(Vec::new()));

    // Selector of balanceOf(address) without its argument.
    let truncated = calldata("balanceOf(address)", &[]);
    assert_eq!(evm.call(&truncated, from(1)), Outcome::Revert(Vec::new()));
    Ok(())
}

#[test]
fn test_dirty_arguments_are_rejected() -> Result<()> {
    let (_, mut evm) = deploy(TOKEN, &[word(500)])?;

    let dirty_address = account(2) | (U256::from(1) << 200usize);
    let outcome = call(&mut evm, "transfer(address,uint256)", &[dirty_address, word(1)], from(1));
    assert_eq!(outcome, Outcome::Revert(Vec::new()));

    let (_, mut evm) = deploy(ARITHMETIC, &[])?;
    let outcome = call(&mut evm, "either(bool,bool)", &[word(2), word(0)], from(1));
    assert_eq!(outcome, Outcome::Revert(Vec::new()));
    Ok(())
}

#[test]
fn test_checked_arithmetic_panics() -> Result<()> {
    let (_, mut evm) = deploy(ARITHMETIC, &[])?;
    let max = U256::MAX;

    assert_eq!(returned(call(&mut evm, "add(uint256,uint256)", &[word(2), word(3)], from(1)))?, word(5));
    assert_eq!(panicked(&call(&mut evm, "add(uint256,uint256)", &[max, word(1)], from(1))), Some(0x11));
    assert_eq!(panicked(&call(&mut evm, "sub(uint256,uint256)", &[word(1), word(2)], from(1))), Some(0x11));
    assert_eq!(returned(call(&mut evm, "sub(uint256,uint256)", &[word(9), word(2)], from(1)))?, word(7));
    assert_eq!(panicked(&call(&mut evm, "mul(uint256,uint256)", &[max, word(2)], from(1))), Some(0x11));
    assert_eq!(returned(call(&mut evm, "mul(uint256,uint256)", &[word(0), max], from(1)))?, word(0));
    assert_eq!(panicked(&call(&mut evm, "div(uint256,uint256)", &[word(1), word(0)], from(1))), Some(0x12));
    assert_eq!(returned(call(&mut evm, "div(uint256,uint256)", &[word(7), word(2)], from(1)))?, word(3));
    assert_eq!(panicked(&call(&mut evm, "rem(uint256,uint256)", &[word(1), word(0)], from(1))), Some(0x12));
    assert_eq!(returned(call(&mut evm, "rem(uint256,uint256)", &[word(7), word(2)], from(1)))?, word(1));
    Ok(())
}

#[test]
fn test_unchecked_arithmetic_wraps() -> Result<()> {
    let (_, mut evm) = deploy(ARITHMETIC, &[])?;
    let outcome = call(&mut evm, "wrappingAdd(uint256,uint256)", &[U256::MAX, word(2)], from(1));
    assert_eq!(returned(outcome)?, word(1));
    let outcome = call(&mut evm, "wrappingSub(uint256,uint256)", &[word(0), word(1)], from(1));
    assert_eq!(returned(outcome)?, U256::MAX);
    Ok(())
}

#[test]
fn test_comparisons_and_logic() -> Result<()> {
    let (_, mut evm) = deploy(ARITHMETIC, &[])?;
    let cases = [
        ("atMost(uint256,uint256)", [word(3), word(3)], 1),
        ("atMost(uint256,uint256)", [word(4), word(3)], 0),
        ("above(uint256,uint256)", [word(4), word(3)], 1),
        ("above(uint256,uint256)", [word(3), word(3)], 0),
        ("either(bool,bool)", [word(0), word(0)], 1),
        ("either(bool,bool)", [word(0), word(1)], 0),
        ("either(bool,bool)", [word(1), word(1)], 1),
        ("safeRatio(uint256,uint256)", [word(9), word(2)], 1),
        ("safeRatio(uint256,uint256)", [word(3), word(2)], 0),
    ];
    for (signature, args, expected) in cases {
        let outcome = call(&mut evm, signature, &args, from(1));
        assert_eq!(returned(outcome)?, word(expected), "{} {:?}", signature, args);
    }
    Ok(())
}

#[test]
fn test_logical_and_short_circuits() -> Result<()> {
    let (_, mut evm) = deploy(ARITHMETIC, &[])?;
    // `a / b` would panic if evaluated.
    let outcome = call(&mut evm, "safeRatio(uint256,uint256)", &[word(9), word(0)], from(1));
    assert_eq!(returned(outcome)?, word(0));
    Ok(())
}

#[test]
fn test_falling_off_the_end_returns_zero() -> Result<()> {
    let (_, mut evm) = deploy(ARITHMETIC, &[])?;
    assert_eq!(returned(call(&mut evm, "implicitZero()", &[], from(1)))?, word(0));
    Ok(())
}

#[test]
fn test_sequence_push_read_and_length() -> Result<()> {
    let (_, mut evm) = deploy(SEQUENCES, &[])?;
    for item in [4, 5, 6] {
        assert_eq!(call(&mut evm, "add(uint256)", &[word(item)], from(1)), Outcome::Stop);
    }

    assert_eq!(returned(call(&mut evm, "count()", &[], from(1)))?, word(3));
    assert_eq!(returned(call(&mut evm, "at(uint256)", &[word(1)], from(1)))?, word(5));
    assert_eq!(evm.sload(word(0)), word(3));
    assert_eq!(evm.sload(sequence_element_slot(word(0), word(2))), word(6));

    // Reads past the end see zero.
    assert_eq!(returned(call(&mut evm, "at(uint256)", &[word(3)], from(1)))?, word(0));
    Ok(())
}

#[test]
fn test_sequence_write_past_length_panics() -> Result<()> {
    let (_, mut evm) = deploy(SEQUENCES, &[])?;
    call(&mut evm, "add(uint256)", &[word(4)], from(1));

    assert_eq!(call(&mut evm, "set(uint256,uint256)", &[word(0), word(8)], from(1)), Outcome::Stop);
    assert_eq!(returned(call(&mut evm, "at(uint256)", &[word(0)], from(1)))?, word(8));

    let outcome = call(&mut evm, "set(uint256,uint256)", &[word(1), word(8)], from(1));
    assert_eq!(panicked(&outcome), Some(0x32));
    assert_eq!(returned(call(&mut evm, "count()", &[], from(1)))?, word(1));
    Ok(())
}

#[test]
fn test_loops() -> Result<()> {
    let (_, mut evm) = deploy(SEQUENCES, &[])?;
    assert_eq!(returned(call(&mut evm, "sum()", &[], from(1)))?, word(0));

    for item in [10, 20, 30] {
        call(&mut evm, "add(uint256)", &[word(item)], from(1));
    }
    assert_eq!(returned(call(&mut evm, "sum()", &[], from(1)))?, word(60));
    assert_eq!(returned(call(&mut evm, "contains(uint256)", &[word(20)], from(1)))?, word(1));
    assert_eq!(returned(call(&mut evm, "contains(uint256)", &[word(25)], from(1)))?, word(0));
    assert_eq!(returned(call(&mut evm, "triangle(uint256)", &[word(5)], from(1)))?, word(10));
    assert_eq!(returned(call(&mut evm, "triangle(uint256)", &[word(0)], from(1)))?, word(0));

    assert_eq!(call(&mut evm, "doubleAll()", &[], from(1)), Outcome::Stop);
    assert_eq!(returned(call(&mut evm, "sum()", &[], from(1)))?, word(120));
    Ok(())
}

#[test]
fn test_paris_target_avoids_push0() -> Result<()> {
    let config = CompilerConfig {
        evm_version: EvmVersion::Paris,
        ..CompilerConfig::default()
    };
    let (contract, mut evm) = deploy_with(TOKEN, &[word(500)], &config)?;

    assert!(!opcodes_of(&contract.runtime).contains(&opcodes::PUSH0));
    assert!(!opcodes_of(&contract.deployment[..contract.deployment.len() - contract.runtime.len()])
        .contains(&opcodes::PUSH0));

    let outcome = call(&mut evm, "transfer(address,uint256)", &[account(2), word(5)], from(1));
    assert_eq!(returned(outcome)?, word(1));
    match call(&mut evm, "burnAll()", &[], from(1)) {
        Outcome::Revert(data) => assert_eq!(revert_reason(&data).as_deref(), Some("burning is disabled")),
        other => panic!("expected a revert, got {:?}", other),
    }
    Ok(())
}

#[test]
fn test_runtime_uses_only_generated_opcodes() -> Result<()> {
    use opcodes::*;

    let generated = |op: u8| {
        matches!(
            op,
            STOP | ADD | MUL | SUB | DIV | MOD | LT | GT | EQ | ISZERO | SHR | KECCAK256
                | CALLER | CALLVALUE | CALLDATALOAD | CALLDATASIZE | CODESIZE | CODECOPY
                | POP | MLOAD | MSTORE | SLOAD | SSTORE | JUMP | JUMPI | JUMPDEST | PUSH0
                | DUP1 | DUP2 | DUP3 | SWAP1 | SWAP2 | RETURN | REVERT
        ) || (PUSH1..=0x7f).contains(&op)
            || (LOG0..=LOG4).contains(&op)
    };
    for source in [TOKEN, ARITHMETIC, SEQUENCES] {
        let contract = compile_single(source, &CompilerConfig::default())?;
        for op in opcodes_of(&contract.runtime) {
            assert!(generated(op), "{} emits 0x{:02x}", contract.name, op);
        }
    }
    Ok(())
}

#[test]
fn test_shanghai_target_uses_push0() -> Result<()> {
    let contract = compile_single(TOKEN, &CompilerConfig::default())?;
    assert!(opcodes_of(&contract.runtime).contains(&opcodes::PUSH0));
    Ok(())
}

#[test]
fn test_compilation_is_deterministic() -> Result<()> {
    let config = CompilerConfig::default();
    let first = compile_single(TOKEN, &config)?;
    let second = compile_single(TOKEN, &config)?;
    assert_eq!(first.deployment, second.deployment);
    assert_eq!(first.runtime, second.runtime);
    assert_eq!(first.interface, second.interface);

    let source = format!("{}\n{}\n{}", TOKEN, ARITHMETIC, SEQUENCES);
    let all = compile(&source, &config)?;
    let names: Vec<_> = all.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["Token", "Arithmetic", "Sequences"]);
    assert_eq!(all[0].runtime, first.runtime);
    Ok(())
}

#[test]
fn test_layout_ignores_methods() -> Result<()> {
    let bare = "contract T { field a: uint; field m: map<address, uint>; field l: list<bool>; }";
    let extended = r#"
        contract T {
            field a: uint;
            @mutating fn bump() { a += 1; }
            field m: map<address, uint>;
            @readonly fn get(k: address) -> uint { return m[k]; }
            field l: list<bool>;
        }
    "#;
    let config = CompilerConfig::default();
    let bare = compile_single(bare, &config)?;
    let extended = compile_single(extended, &config)?;
    assert_eq!(bare.layout, extended.layout);
    Ok(())
}

#[test]
fn test_appending_a_field_keeps_existing_slots() -> Result<()> {
    let before = r#"
        contract Vault {
            field a: uint;
            field m: map<address, uint>;

            @mutating
            fn store(value: uint) {
                a = value;
                m[sender()] = value + 1;
            }
        }
    "#;
    let after = r#"
        contract Vault {
            field a: uint;
            field m: map<address, uint>;
            field extra: list<uint>;

            @readonly
            fn mine() -> uint {
                return a + m[sender()];
            }

            @readonly
            fn extraCount() -> uint {
                return extra.length;
            }
        }
    "#;
    let config = CompilerConfig::default();
    let (old, mut evm) = deploy(before, &[])?;
    let new = compile_single(after, &config)?;
    assert_eq!(old.layout.fields(), &new.layout.fields()[..2]);
    assert_eq!(new.layout.fields()[2].slot, U256::from(2));

    assert_eq!(call(&mut evm, "store(uint256)", &[word(40)], from(5)), Outcome::Stop);

    // The new code reads what the old code wrote.
    evm.code = new.runtime.clone();
    assert_eq!(returned(call(&mut evm, "mine()", &[], from(5)))?, word(81));
    assert_eq!(returned(call(&mut evm, "extraCount()", &[], from(5)))?, word(0));
    Ok(())
}

#[test]
fn test_readonly_bodies_never_write_state() -> Result<()> {
    use crate::codegen::{self, CodeUnit};
    use crate::extractor::Visibility;

    let contract = compile_single(TOKEN, &CompilerConfig::default())?;
    let mut unit = CodeUnit::default();
    for (id, method) in contract.model.external_methods() {
        let compiled = codegen::compile_method(&contract.model, &contract.layout, &mut unit, id)?;
        let writes = compiled.body.contains_op(opcodes::SSTORE)
            || (opcodes::LOG0..=opcodes::LOG4).any(|op| compiled.body.contains_op(op));
        assert_eq!(writes, method.visibility == Visibility::Mutating, "{}", method.name);
    }
    Ok(())
}

#[test]
fn test_call_value_is_accepted() -> Result<()> {
    let source = r#"
        contract Vault {
            field deposits: map<address, uint>;
            @mutating fn deposit() { deposits[sender()] += value(); }
            @readonly fn depositOf(who: address) -> uint { return deposits[who]; }
        }
    "#;
    let (_, mut evm) = deploy(source, &[])?;
    let ctx = Context {
        caller: account(7),
        value: word(250),
    };
    assert_eq!(call(&mut evm, "deposit()", &[], ctx), Outcome::Stop);
    assert_eq!(call(&mut evm, "deposit()", &[], ctx), Outcome::Stop);
    assert_eq!(returned(call(&mut evm, "depositOf(address)", &[account(7)], from(1)))?, word(500));
    Ok(())
}

#[test]
fn test_return_inside_constructor_still_deploys() -> Result<()> {
    let source = r#"
        contract Early {
            field a: uint;
            constructor(skip: bool) {
                if skip {
                    return;
                }
                a = 1;
            }
            @readonly fn get() -> uint { return a; }
        }
    "#;
    let (_, mut evm) = deploy(source, &[word(1)])?;
    assert_eq!(returned(call(&mut evm, "get()", &[], from(1)))?, word(0));

    let (_, mut evm) = deploy(source, &[word(0)])?;
    assert_eq!(returned(call(&mut evm, "get()", &[], from(1)))?, word(1));
    Ok(())
}

#[test]
fn test_initializers_may_read_the_environment() -> Result<()> {
    let source = r#"
        contract Registry {
            field creator: address = sender();
            field seed: uint = value();
            field enabled: bool = 3 > 2 && !false;
            @readonly fn getCreator() -> address { return creator; }
        }
    "#;
    let contract = compile_single(source, &CompilerConfig::default())?;
    let mut evm = Evm::new(EvmVersion::Shanghai);
    let ctx = Context {
        caller: account(4),
        value: word(9),
    };
    assert!(matches!(evm.deploy(&contract.deployment, &[], ctx), Outcome::Return(_)));

    assert_eq!(returned(call(&mut evm, "getCreator()", &[], from(1)))?, account(4));
    assert_eq!(evm.sload(word(1)), word(9));
    assert_eq!(evm.sload(word(2)), word(1));
    Ok(())
}
