mod execution;

use super::extractor::{self, ast::*, Type, Visibility};
use super::parser;
use super::{compile, compile_single, CompileError, CompilerConfig};
use anyhow::Result;

/// Compiles `source` and returns the message of the structural error it must produce.
fn structural_error(source: &str) -> String {
    match compile_single(source, &CompilerConfig::default()) {
        Err(CompileError::Structural { message, .. }) => message,
        Err(other) => panic!("expected a structural error, got: {}", other),
        Ok(contract) => panic!("`{}` compiled but should have been rejected", contract.name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_contract() -> Result<()> {
        let source = r#"
            contract Counter {
                field count: uint;

                @mutating
                fn increment() {
                    count += 1;
                }
            }
        "#;
        let contract = parser::parse(source)?;
        assert_eq!(contract.name, "Counter");
        assert_eq!(contract.fields.len(), 1);
        assert_eq!(contract.functions.len(), 1);
        assert_eq!(contract.functions[0].markers, vec!["mutating".to_string()]);
        Ok(())
    }

    #[test]
    fn test_parse_field_types() -> Result<()> {
        let source = r#"
            contract Test {
                field count: uint256;
                field flag: bool = true;
                field owner: address;
                field balances: map<address, uint>;
                field allowances: map<address, map<address, uint>>;
                field holders: list<address>;
            }
        "#;
        let contract = parser::parse(source)?;
        assert_eq!(contract.fields.len(), 6);
        assert_eq!(contract.fields[0].var_type, TypeName::Named("uint256".to_string()));
        assert!(contract.fields[1].initial_value.is_some());
        assert!(matches!(contract.fields[4].var_type, TypeName::Mapping(_, ref v) if matches!(**v, TypeName::Mapping(..))));
        assert!(matches!(contract.fields[5].var_type, TypeName::Sequence(_)));
        Ok(())
    }

    #[test]
    fn test_parse_event() -> Result<()> {
        let source = r#"
            contract Test {
                event Transfer(indexed from: address, indexed to: address, amount: uint);
            }
        "#;
        let contract = parser::parse(source)?;
        let event = &contract.events[0];
        assert_eq!(event.name, "Transfer");
        assert_eq!(event.params.len(), 3);
        assert!(event.params[0].indexed);
        assert!(event.params[1].indexed);
        assert!(!event.params[2].indexed);
        Ok(())
    }

    #[test]
    fn test_parse_multiple_contracts_in_order() -> Result<()> {
        let source = r#"
            contract First {}
            // comments between contracts are fine
            contract Second {}
        "#;
        let contracts = parser::parse_all(source)?;
        let names: Vec<_> = contracts.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["First", "Second"]);
        Ok(())
    }

    #[test]
    fn test_identifiers_may_start_with_keywords() -> Result<()> {
        let source = r#"
            contract Test {
                field letter: uint;
                field format: uint;

                @mutating
                fn iffy() {
                    letter = 1;
                    format = letter;
                }
            }
        "#;
        let contract = parser::parse(source)?;
        assert_eq!(contract.fields[0].name, "letter");
        assert_eq!(contract.functions[0].name, "iffy");
        assert_eq!(contract.functions[0].body.len(), 2);
        Ok(())
    }

    #[test]
    fn test_keywords_need_a_word_boundary() -> Result<()> {
        let message = structural_error(
            "contract T { @readonly fn f(x: uint, returnx: uint) -> uint { returnx; } }",
        );
        assert!(message.contains("`returnx` has no effect"), "{}", message);

        let message = structural_error("contract T { event E(); @mutating fn f() { emitE(); } }");
        assert!(message.contains("`emitE()` has no effect"), "{}", message);

        let err = compile_single(
            "contract T { @mutating fn f(flag: bool) { ifflag { } } }",
            &CompilerConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::Syntax(_)), "{}", err);

        // Spaced out, the same words are statements again.
        let source = r#"
            contract T {
                field returned: uint;
                event E(value: uint);

                @mutating
                fn f(x: uint) -> uint {
                    for item in range(x) { returned += item; }
                    emit E(x);
                    return x;
                }
            }
        "#;
        let contract = parser::parse(source)?;
        let body = &contract.functions[0].body;
        assert!(matches!(body[0], Statement::ForRange(..)));
        assert!(matches!(body[1], Statement::Emit(..)));
        assert!(matches!(body[2], Statement::Return(Some(_))));
        Ok(())
    }

    #[test]
    fn test_syntax_error_is_reported() {
        let err = compile_single("contract Broken { field x uint; }", &CompilerConfig::default()).unwrap_err();
        assert!(matches!(err, CompileError::Syntax(_)));
        assert!(!err.is_internal());
    }

    #[test]
    fn test_extract_model() -> Result<()> {
        let source = r#"
            contract Test {
                field total: uint = 2 * 50;
                field owner: address;

                constructor(initial: uint) {
                    owner = sender();
                    total += initial;
                }

                @readonly
                fn getTotal() -> uint {
                    return total;
                }

                @mutating
                fn reset(to: uint) {
                    let previous = total;
                    total = to;
                    require(previous != to, "unchanged");
                }
            }
        "#;
        let model = extractor::extract(parser::parse(source)?)?;
        assert_eq!(model.fields[0].ty, Type::Integer);
        assert_eq!(model.fields[1].ty, Type::Address);
        assert!(model.constructor().is_some());

        let external: Vec<_> = model.external_methods().map(|(_, m)| m.name.as_str()).collect();
        assert_eq!(external, ["getTotal", "reset"]);

        let (_, get_total) = model.external_methods().next().unwrap();
        assert_eq!(get_total.visibility, Visibility::ReadOnly);
        assert_eq!(get_total.return_type, Some(Type::Integer));

        let (_, reset) = model.external_methods().nth(1).unwrap();
        assert_eq!(reset.params.len(), 1);
        assert_eq!(reset.locals.len(), 2);
        Ok(())
    }

    #[test]
    fn test_initializer_is_folded() -> Result<()> {
        let source = "contract T { field limit: uint = (1 + 2) * 10; }";
        let model = extractor::extract(parser::parse(source)?)?;
        let value = model.fields[0].initial_value.as_ref().unwrap();
        assert!(matches!(value.kind, extractor::ExprKind::Literal(v) if v == alloy_primitives::U256::from(30)));
        Ok(())
    }

    #[test]
    fn test_rejects_while_loops() {
        let message = structural_error(
            "contract T { field n: uint; @mutating fn spin() { while n < 10 { n += 1; } } }",
        );
        assert!(message.contains("`while`"), "{}", message);
        assert!(message.starts_with("in `spin`"), "{}", message);
    }

    #[test]
    fn test_rejects_text_values() {
        let message = structural_error("contract T { field name: text; }");
        assert!(message.contains("`text`"), "{}", message);

        let message = structural_error(r#"contract T { @readonly fn f() -> uint { let s = "hi"; return 0; } }"#);
        assert!(message.contains("string literals"), "{}", message);
    }

    #[test]
    fn test_rejects_duplicate_declarations() {
        let message = structural_error("contract T { field a: uint; field a: bool; }");
        assert!(message.contains("duplicate field `a`"), "{}", message);

        let message = structural_error("contract T { event E(); event E(x: uint); }");
        assert!(message.contains("duplicate event `E`"), "{}", message);

        let message = structural_error(
            "contract T { @mutating fn f() {} @readonly fn f() -> uint { return 1; } }",
        );
        assert!(message.contains("duplicate method `f`"), "{}", message);

        let message = structural_error("contract T { constructor() {} constructor(a: uint) {} }");
        assert!(message.contains("more than one constructor"), "{}", message);

        let message = structural_error("contract T { event E(a: uint, a: bool); }");
        assert!(message.contains("parameter `a` twice"), "{}", message);
    }

    #[test]
    fn test_rejects_duplicate_contracts() {
        let err = compile("contract A {} contract A {}", &CompilerConfig::default()).unwrap_err();
        match err {
            CompileError::Structural { contract, message } => {
                assert_eq!(contract, "A");
                assert!(message.contains("more than once"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_initializer_cannot_reference_state() {
        let message = structural_error("contract T { field a: uint = 1; field b: uint = a + 1; }");
        assert!(message.contains("cannot refer to `a`"), "{}", message);
    }

    #[test]
    fn test_initializer_overflow_is_rejected() {
        let max = alloy_primitives::U256::MAX;
        let message = structural_error(&format!("contract T {{ field a: uint = {} + 1; }}", max));
        assert!(message.contains("overflows"), "{}", message);

        let message = structural_error("contract T { field a: uint = 1 / 0; }");
        assert!(message.contains("divides by zero"), "{}", message);
    }

    #[test]
    fn test_initializer_on_mapping_is_rejected() {
        let message = structural_error("contract T { field m: map<address, uint> = 1; }");
        assert!(message.contains("cannot have an initializer"), "{}", message);
    }

    #[test]
    fn test_visibility_markers() {
        let message = structural_error("contract T { fn f() {} }");
        assert!(message.contains("needs a visibility marker"), "{}", message);

        let message = structural_error("contract T { @readonly @mutating fn f() {} }");
        assert!(message.contains("more than one visibility marker"), "{}", message);

        let message = structural_error("contract T { @payable fn f() {} }");
        assert!(message.contains("unknown marker `@payable`"), "{}", message);
    }

    #[test]
    fn test_readonly_methods_cannot_change_state() {
        let message = structural_error("contract T { field n: uint; @readonly fn f() { n = 1; } }");
        assert!(message.contains("cannot write to storage"), "{}", message);

        let message = structural_error("contract T { field l: list<uint>; @readonly fn f() { l.push(1); } }");
        assert!(message.contains("cannot write to storage"), "{}", message);

        let message = structural_error("contract T { event E(); @readonly fn f() { emit E(); } }");
        assert!(message.contains("cannot emit events"), "{}", message);
    }

    #[test]
    fn test_return_rules() {
        let message = structural_error("contract T { @readonly fn f() -> uint { return; } }");
        assert!(message.contains("`return;` in a method returning `uint`"), "{}", message);

        let message = structural_error("contract T { @mutating fn f() { return 1; } }");
        assert!(message.contains("without a return type"), "{}", message);

        let message = structural_error("contract T { constructor() { return 1; } }");
        assert!(message.contains("constructor cannot return a value"), "{}", message);

        let message = structural_error("contract T { @readonly fn f() -> bool { return 1; } }");
        assert!(message.contains("expected `bool`, found `uint`"), "{}", message);
    }

    #[test]
    fn test_rejects_unsupported_nesting() {
        let message = structural_error("contract T { field l: list<map<address, uint>>; }");
        assert!(message.contains("list elements"), "{}", message);

        let message = structural_error("contract T { field l: list<list<uint>>; }");
        assert!(message.contains("list elements"), "{}", message);

        let message = structural_error("contract T { field m: map<list<uint>, uint>; }");
        assert!(message.contains("mapping key"), "{}", message);

        let message = structural_error("contract T { @mutating fn f(m: map<address, uint>) {} }");
        assert!(message.contains("parameter cannot have type"), "{}", message);
    }

    #[test]
    fn test_rejects_too_many_indexed_parameters() {
        let message = structural_error(
            "contract T { event E(indexed a: uint, indexed b: uint, indexed c: uint, indexed d: uint); }",
        );
        assert!(message.contains("more than 3 indexed"), "{}", message);
    }

    #[test]
    fn test_rejects_shadowing() {
        let message = structural_error("contract T { field n: uint; @mutating fn f() { let n = 1; } }");
        assert!(message.contains("shadows a field"), "{}", message);

        let message = structural_error("contract T { @mutating fn f(a: uint) { let a = 1; } }");
        assert!(message.contains("already bound"), "{}", message);

        let message = structural_error(
            "contract T { @readonly fn f(n: uint) -> uint { for n in range(3) {} return 0; } }",
        );
        assert!(message.contains("already bound"), "{}", message);
    }

    #[test]
    fn test_let_binding_is_scoped_to_its_block() {
        let source = r#"
            contract T {
                @readonly
                fn f(flag: bool) -> uint {
                    if flag {
                        let x = 1;
                        return x;
                    } else {
                        let x = 2;
                        return x;
                    }
                }
            }
        "#;
        assert!(compile_single(source, &CompilerConfig::default()).is_ok());

        let message = structural_error(
            "contract T { @readonly fn f(flag: bool) -> uint { if flag { let x = 1; } return x; } }",
        );
        assert!(message.contains("unknown name `x`"), "{}", message);
    }

    #[test]
    fn test_rejects_meaningless_expressions() {
        let message = structural_error("contract T { field n: uint; @mutating fn f() { n + 1; } }");
        assert!(message.contains("has no effect"), "{}", message);

        let message = structural_error("contract T { @mutating fn f() { let x = now(); } }");
        assert!(message.contains("unknown function `now`"), "{}", message);

        let message = structural_error("contract T { @mutating fn f() { let x = sender(1); } }");
        assert!(message.contains("takes no arguments"), "{}", message);

        let message = structural_error(
            "contract T { field m: map<address, uint>; @readonly fn f() -> uint { return m; } }",
        );
        assert!(message.contains("as a whole"), "{}", message);

        let message = structural_error("contract T { field n: uint; @readonly fn f() -> uint { return n.length; } }");
        assert!(message.contains("`.length` needs a list"), "{}", message);
    }

    #[test]
    fn test_type_mismatches() {
        let message = structural_error(
            "contract T { field owner: address; @mutating fn f(n: uint) { owner = n; } }",
        );
        assert!(message.contains("expected `address`, found `uint`"), "{}", message);

        let message = structural_error("contract T { @readonly fn f(a: bool) -> uint { return a + 1; } }");
        assert!(message.contains("expected `uint`, found `bool`"), "{}", message);

        // Small integer literals stand in for addresses.
        let source = "contract T { field owner: address; @mutating fn clear() { owner = 0; } }";
        assert!(compile_single(source, &CompilerConfig::default()).is_ok());
    }

    #[test]
    fn test_unknown_event_and_arity() {
        let message = structural_error("contract T { @mutating fn f() { emit Missing(); } }");
        assert!(message.contains("unknown event `Missing`"), "{}", message);

        let message = structural_error("contract T { event E(a: uint); @mutating fn f() { emit E(); } }");
        assert!(message.contains("takes 1 arguments, 0 given"), "{}", message);
    }
}
