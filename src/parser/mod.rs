use pest::Parser;
use pest_derive::Parser;
use tracing::{debug, trace};

use crate::error::CompileError;
use crate::extractor::ast::*;

#[derive(Parser)]
#[grammar = "parser/contract.pest"]
pub struct ContractParser;

type Pair<'i> = pest::iterators::Pair<'i, Rule>;
type Result<T> = std::result::Result<T, CompileError>;

/// Parses a source that must contain exactly one contract.
pub fn parse(source: &str) -> Result<Contract> {
    let pairs = ContractParser::parse(Rule::contract, source)?;

    for pair in pairs {
        for item in pair.into_inner() {
            if item.as_rule() == Rule::contract_definition {
                return parse_contract_definition(item);
            }
        }
    }

    Err(malformed("contract definition"))
}

/// Parses every contract in a source file, in source order.
pub fn parse_all(source: &str) -> Result<Vec<Contract>> {
    let pairs = ContractParser::parse(Rule::source_file, source)?;

    let mut contracts = Vec::new();
    for pair in pairs {
        for item in pair.into_inner() {
            if item.as_rule() == Rule::contract_definition {
                contracts.push(parse_contract_definition(item)?);
            }
        }
    }

    debug!(count = contracts.len(), "parsed contracts");
    Ok(contracts)
}

fn malformed(what: &str) -> CompileError {
    CompileError::Internal(format!("malformed parse tree: missing {}", what))
}

fn next_pair<'i>(pairs: &mut pest::iterators::Pairs<'i, Rule>, what: &str) -> Result<Pair<'i>> {
    pairs.next().ok_or_else(|| malformed(what))
}

fn parse_contract_definition(pair: Pair<'_>) -> Result<Contract> {
    let mut inner = pair.into_inner();
    let name = next_pair(&mut inner, "contract name")?.as_str().to_string();
    trace!(contract = %name, "parsing contract body");

    let mut contract = Contract {
        name,
        fields: Vec::new(),
        functions: Vec::new(),
        events: Vec::new(),
    };

    for item in inner {
        match item.as_rule() {
            Rule::field_declaration => contract.fields.push(parse_field(item)?),
            Rule::event_definition => contract.events.push(parse_event(item)?),
            Rule::constructor_definition => contract.functions.push(parse_constructor(item)?),
            Rule::method_definition => contract.functions.push(parse_method(item)?),
            _ => {}
        }
    }

    Ok(contract)
}

fn parse_field(pair: Pair<'_>) -> Result<StateVariable> {
    let mut inner = pair.into_inner();
    let name = next_pair(&mut inner, "field name")?.as_str().to_string();
    let var_type = parse_type(next_pair(&mut inner, "field type")?)?;
    let initial_value = match inner.next() {
        Some(expr) => Some(parse_expression(expr)?),
        None => None,
    };
    trace!(field = %name, ty = %var_type, "found field declaration");

    Ok(StateVariable {
        name,
        var_type,
        initial_value,
    })
}

fn parse_event(pair: Pair<'_>) -> Result<Event> {
    let mut inner = pair.into_inner();
    let name = next_pair(&mut inner, "event name")?.as_str().to_string();

    let mut params = Vec::new();
    if let Some(list) = inner.next() {
        for param in list.into_inner() {
            let mut indexed = false;
            let mut tokens = param.into_inner().peekable();
            if tokens.peek().map(|p| p.as_rule()) == Some(Rule::indexed_modifier) {
                indexed = true;
                tokens.next();
            }
            let param_name = tokens
                .next()
                .ok_or_else(|| malformed("event parameter name"))?
                .as_str()
                .to_string();
            let type_pair = tokens
                .next()
                .ok_or_else(|| malformed("event parameter type"))?;
            let param_type = parse_type(type_pair)?;
            params.push(EventParameter {
                name: param_name,
                param_type,
                indexed,
            });
        }
    }

    Ok(Event { name, params })
}

fn parse_constructor(pair: Pair<'_>) -> Result<Function> {
    let mut function = Function {
        name: "constructor".to_string(),
        kind: FunctionKind::Constructor,
        markers: Vec::new(),
        params: Vec::new(),
        return_type: None,
        body: Vec::new(),
    };

    for item in pair.into_inner() {
        match item.as_rule() {
            Rule::parameter_list => function.params = parse_parameters(item)?,
            Rule::block => function.body = parse_block(item)?,
            _ => {}
        }
    }

    Ok(function)
}

fn parse_method(pair: Pair<'_>) -> Result<Function> {
    let mut function = Function {
        name: String::new(),
        kind: FunctionKind::Method,
        markers: Vec::new(),
        params: Vec::new(),
        return_type: None,
        body: Vec::new(),
    };

    for item in pair.into_inner() {
        match item.as_rule() {
            Rule::marker => {
                let marker = item.into_inner().next().ok_or_else(|| malformed("marker name"))?;
                function.markers.push(marker.as_str().to_string());
            }
            Rule::identifier => {
                function.name = item.as_str().to_string();
                trace!(method = %function.name, "found method definition");
            }
            Rule::parameter_list => function.params = parse_parameters(item)?,
            Rule::return_type => {
                let ty = item.into_inner().next().ok_or_else(|| malformed("return type"))?;
                function.return_type = Some(parse_type(ty)?);
            }
            Rule::block => function.body = parse_block(item)?,
            _ => {}
        }
    }

    if function.name.is_empty() {
        return Err(malformed("method name"));
    }

    Ok(function)
}

fn parse_parameters(pair: Pair<'_>) -> Result<Vec<Parameter>> {
    let mut params = Vec::new();

    for param in pair.into_inner() {
        let mut inner = param.into_inner();
        let name = next_pair(&mut inner, "parameter name")?.as_str().to_string();
        let param_type = parse_type(next_pair(&mut inner, "parameter type")?)?;
        params.push(Parameter { name, param_type });
    }

    Ok(params)
}

fn parse_type(pair: Pair<'_>) -> Result<TypeName> {
    let inner = match pair.as_rule() {
        Rule::type_name => pair.into_inner().next().ok_or_else(|| malformed("type"))?,
        _ => pair,
    };

    match inner.as_rule() {
        Rule::named_type => Ok(TypeName::Named(inner.as_str().to_string())),
        Rule::mapping_type => {
            let mut parts = inner.into_inner();
            let key = parse_type(next_pair(&mut parts, "mapping key type")?)?;
            let value = parse_type(next_pair(&mut parts, "mapping value type")?)?;
            Ok(TypeName::Mapping(Box::new(key), Box::new(value)))
        }
        Rule::sequence_type => {
            let mut parts = inner.into_inner();
            let element = parse_type(next_pair(&mut parts, "sequence element type")?)?;
            Ok(TypeName::Sequence(Box::new(element)))
        }
        other => Err(CompileError::Internal(format!("unexpected type rule {:?}", other))),
    }
}

fn parse_block(pair: Pair<'_>) -> Result<Vec<Statement>> {
    pair.into_inner().map(parse_statement).collect()
}

fn parse_statement(pair: Pair<'_>) -> Result<Statement> {
    trace!(rule = ?pair.as_rule(), "parsing statement");
    let rule = pair.as_rule();
    let mut inner = pair.into_inner();

    let statement = match rule {
        Rule::assignment_statement => {
            let place = parse_place(next_pair(&mut inner, "assignment target")?)?;
            let op = match next_pair(&mut inner, "assignment operator")?.as_str() {
                "+=" => AssignOp::AddAssign,
                "-=" => AssignOp::SubAssign,
                "*=" => AssignOp::MulAssign,
                _ => AssignOp::Assign,
            };
            let value = parse_expression(next_pair(&mut inner, "assigned value")?)?;
            Statement::Assignment(place, op, value)
        }
        Rule::push_statement => {
            let place = parse_place(next_pair(&mut inner, "push target")?)?;
            let value = parse_expression(next_pair(&mut inner, "pushed value")?)?;
            Statement::Push(place, value)
        }
        Rule::let_statement => {
            let name = next_pair(&mut inner, "local name")?.as_str().to_string();
            let mut declared = None;
            let mut value = None;
            for item in inner {
                match item.as_rule() {
                    Rule::type_name => declared = Some(parse_type(item)?),
                    _ => value = Some(parse_expression(item)?),
                }
            }
            Statement::Let(name, declared, value.ok_or_else(|| malformed("local initializer"))?)
        }
        Rule::if_statement => {
            let cond = parse_expression(next_pair(&mut inner, "if condition")?)?;
            let then_branch = parse_block(next_pair(&mut inner, "if body")?)?;
            let else_branch = match inner.next() {
                Some(clause) => {
                    let branch = clause.into_inner().next().ok_or_else(|| malformed("else body"))?;
                    match branch.as_rule() {
                        Rule::if_statement => vec![parse_statement(branch)?],
                        _ => parse_block(branch)?,
                    }
                }
                None => Vec::new(),
            };
            Statement::If(cond, then_branch, else_branch)
        }
        Rule::for_statement => {
            let var = next_pair(&mut inner, "loop variable")?.as_str().to_string();
            let source = next_pair(&mut inner, "loop source")?;
            let body = parse_block(next_pair(&mut inner, "loop body")?)?;
            match source.as_rule() {
                Rule::range_call => {
                    let count = source.into_inner().next().ok_or_else(|| malformed("range count"))?;
                    Statement::ForRange(var, parse_expression(count)?, body)
                }
                _ => Statement::ForEach(var, parse_place(source)?, body),
            }
        }
        Rule::while_statement => {
            let cond = parse_expression(next_pair(&mut inner, "while condition")?)?;
            let body = parse_block(next_pair(&mut inner, "while body")?)?;
            Statement::While(cond, body)
        }
        Rule::return_statement => match inner.next() {
            Some(expr) => Statement::Return(Some(parse_expression(expr)?)),
            None => Statement::Return(None),
        },
        Rule::emit_statement => {
            let event = next_pair(&mut inner, "event name")?.as_str().to_string();
            let args = match inner.next() {
                Some(list) => parse_arguments(list)?,
                None => Vec::new(),
            };
            Statement::Emit(event, args)
        }
        Rule::fail_statement => {
            Statement::Fail(parse_string(next_pair(&mut inner, "failure reason")?)?)
        }
        Rule::require_statement => {
            let cond = parse_expression(next_pair(&mut inner, "require condition")?)?;
            let reason = parse_string(next_pair(&mut inner, "require reason")?)?;
            Statement::Require(cond, reason)
        }
        Rule::unchecked_block => {
            Statement::Unchecked(parse_block(next_pair(&mut inner, "unchecked body")?)?)
        }
        Rule::expression_statement => {
            Statement::Expression(parse_expression(next_pair(&mut inner, "expression")?)?)
        }
        other => {
            return Err(CompileError::Internal(format!(
                "unexpected statement rule {:?}",
                other
            )))
        }
    };

    Ok(statement)
}

fn parse_place(pair: Pair<'_>) -> Result<Place> {
    let mut inner = pair.into_inner();
    let name = next_pair(&mut inner, "place name")?.as_str().to_string();

    let mut indices = Vec::new();
    for suffix in inner {
        let index = suffix.into_inner().next().ok_or_else(|| malformed("index expression"))?;
        indices.push(parse_expression(index)?);
    }

    Ok(Place { name, indices })
}

fn parse_arguments(pair: Pair<'_>) -> Result<Vec<Expression>> {
    pair.into_inner().map(parse_expression).collect()
}

fn parse_expression(pair: Pair<'_>) -> Result<Expression> {
    match pair.as_rule() {
        Rule::expression => {
            let inner = pair.into_inner().next().ok_or_else(|| malformed("expression"))?;
            parse_expression(inner)
        }
        Rule::or_expr
        | Rule::and_expr
        | Rule::comparison
        | Rule::additive
        | Rule::multiplicative => {
            let mut pairs = pair.into_inner();

            // Fold left-associatively: first operand, then (operator, operand) pairs.
            let first = next_pair(&mut pairs, "operand")?;
            let mut expr = parse_expression(first)?;

            while let Some(op_pair) = pairs.next() {
                let op = BinaryOperator::from_symbol(op_pair.as_str()).ok_or_else(|| {
                    CompileError::Internal(format!("unknown operator `{}`", op_pair.as_str()))
                })?;
                let rhs = next_pair(&mut pairs, "right operand")?;
                expr = Expression::BinaryOp(Box::new(expr), op, Box::new(parse_expression(rhs)?));
            }
            Ok(expr)
        }
        Rule::unary => {
            let mut negations = 0;
            let mut operand = None;
            for item in pair.into_inner() {
                match item.as_rule() {
                    Rule::not_op => negations += 1,
                    _ => operand = Some(parse_expression(item)?),
                }
            }
            let mut expr = operand.ok_or_else(|| malformed("unary operand"))?;
            for _ in 0..negations {
                expr = Expression::Not(Box::new(expr));
            }
            Ok(expr)
        }
        Rule::postfix => {
            let mut inner = pair.into_inner();
            let mut expr = parse_expression(next_pair(&mut inner, "postfix operand")?)?;
            for suffix in inner {
                expr = match suffix.as_rule() {
                    Rule::index_suffix => {
                        let index = suffix.into_inner().next().ok_or_else(|| malformed("index"))?;
                        Expression::Index(Box::new(expr), Box::new(parse_expression(index)?))
                    }
                    _ => Expression::Length(Box::new(expr)),
                };
            }
            Ok(expr)
        }
        Rule::call_expression => {
            let mut inner = pair.into_inner();
            let name = next_pair(&mut inner, "callee")?.as_str().to_string();
            let args = match inner.next() {
                Some(list) => parse_arguments(list)?,
                None => Vec::new(),
            };
            Ok(Expression::Call(name, args))
        }
        Rule::identifier => Ok(Expression::Identifier(pair.as_str().to_string())),
        Rule::bool_literal => Ok(Expression::Literal(Literal::Bool(pair.as_str() == "true"))),
        Rule::hex_literal => Ok(Expression::Literal(Literal::Hex(pair.as_str()[2..].to_string()))),
        Rule::decimal_literal => {
            let digits = pair.as_str().replace('_', "");
            Ok(Expression::Literal(Literal::Integer(digits)))
        }
        Rule::string_literal => Ok(Expression::Literal(Literal::Text(parse_string(pair)?))),
        other => Err(CompileError::Internal(format!("unexpected expression rule {:?}", other))),
    }
}

fn parse_string(pair: Pair<'_>) -> Result<String> {
    let content = pair.into_inner().next().map(|p| p.as_str()).unwrap_or("");

    let mut out = String::with_capacity(content.len());
    let mut chars = content.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    Ok(out)
}
