use std::collections::HashMap;

use alloy_primitives::U256;
use tracing::{debug, trace};

use super::ast;
use super::model::*;
use crate::error::CompileError;

type Result<T> = std::result::Result<T, CompileError>;

/// Turns a parsed contract into a resolved, type-checked [`ContractModel`].
pub fn extract(contract: ast::Contract) -> Result<ContractModel> {
    let mut cx = ContractContext {
        contract: contract.name.clone(),
        field_index: HashMap::new(),
        field_types: Vec::new(),
        event_index: HashMap::new(),
        events: Vec::new(),
    };

    for field in &contract.fields {
        if cx.field_index.contains_key(&field.name) {
            return Err(cx.error(format!("duplicate field `{}`", field.name)));
        }
        let ty = cx.resolve_storage_type(&field.var_type)?;
        cx.field_index.insert(field.name.clone(), FieldId(cx.field_types.len()));
        cx.field_types.push(ty);
    }

    for event in &contract.events {
        let decl = cx.resolve_event(event)?;
        cx.event_index.insert(decl.name.clone(), EventId(cx.events.len()));
        cx.events.push(decl);
    }

    let mut fields = Vec::with_capacity(contract.fields.len());
    for (field, ty) in contract.fields.iter().zip(cx.field_types.clone()) {
        let initial_value = match &field.initial_value {
            Some(expr) => Some(cx.resolve_initializer(&field.name, &ty, expr)?),
            None => None,
        };
        fields.push(FieldDecl {
            name: field.name.clone(),
            ty,
            initial_value,
        });
    }

    let mut methods: Vec<MethodDecl> = Vec::with_capacity(contract.functions.len());
    let mut has_constructor = false;
    for function in &contract.functions {
        if function.kind == ast::FunctionKind::Constructor {
            if has_constructor {
                return Err(cx.error("more than one constructor"));
            }
            has_constructor = true;
        } else if methods.iter().any(|m| m.name == function.name) {
            return Err(cx.error(format!("duplicate method `{}`", function.name)));
        }
        methods.push(cx.resolve_method(function)?);
    }

    debug!(
        contract = %cx.contract,
        fields = fields.len(),
        methods = methods.len(),
        events = cx.events.len(),
        "extracted contract model"
    );

    Ok(ContractModel {
        name: contract.name,
        fields,
        methods,
        events: cx.events,
    })
}

struct ContractContext {
    contract: String,
    field_index: HashMap<String, FieldId>,
    field_types: Vec<Type>,
    event_index: HashMap<String, EventId>,
    events: Vec<EventDecl>,
}

impl ContractContext {
    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::structural(self.contract.clone(), message)
    }

    fn resolve_named(&self, name: &str) -> Result<Type> {
        match name {
            "uint" | "uint256" => Ok(Type::Integer),
            "address" => Ok(Type::Address),
            "bool" => Ok(Type::Boolean),
            "text" => Err(self.error("`text` values are not supported")),
            other => Err(self.error(format!("unknown type `{}`", other))),
        }
    }

    /// Types that may appear as a field: scalars, mappings and sequences.
    fn resolve_storage_type(&self, name: &ast::TypeName) -> Result<Type> {
        match name {
            ast::TypeName::Named(n) => self.resolve_named(n),
            ast::TypeName::Mapping(key, value) => {
                let key = self.resolve_value_type(key, "mapping key")?;
                let value = self.resolve_storage_type(value)?;
                Ok(Type::Mapping(Box::new(key), Box::new(value)))
            }
            ast::TypeName::Sequence(element) => {
                if !matches!(**element, ast::TypeName::Named(_)) {
                    return Err(self.error(format!(
                        "`{}` is not supported: list elements must be uint, address or bool",
                        name
                    )));
                }
                let element = self.resolve_named_scalar(element)?;
                Ok(Type::Sequence(Box::new(element)))
            }
        }
    }

    fn resolve_named_scalar(&self, name: &ast::TypeName) -> Result<Type> {
        match name {
            ast::TypeName::Named(n) => self.resolve_named(n),
            _ => Err(self.error(format!("expected a value type, found `{}`", name))),
        }
    }

    /// Types that fit on the stack: parameters, returns, locals, keys, event params.
    fn resolve_value_type(&self, name: &ast::TypeName, position: &str) -> Result<Type> {
        match name {
            ast::TypeName::Named(n) => self.resolve_named(n),
            _ => Err(self.error(format!(
                "{} cannot have type `{}`; only uint, address and bool are allowed",
                position, name
            ))),
        }
    }

    fn resolve_event(&self, event: &ast::Event) -> Result<EventDecl> {
        if self.event_index.contains_key(&event.name) {
            return Err(self.error(format!("duplicate event `{}`", event.name)));
        }

        let mut params: Vec<EventParam> = Vec::with_capacity(event.params.len());
        for param in &event.params {
            if params.iter().any(|p| p.name == param.name) {
                return Err(self.error(format!(
                    "event `{}` declares parameter `{}` twice",
                    event.name, param.name
                )));
            }
            let ty = self.resolve_value_type(&param.param_type, "event parameter")?;
            params.push(EventParam {
                name: param.name.clone(),
                ty,
                indexed: param.indexed,
            });
        }

        if params.iter().filter(|p| p.indexed).count() > 3 {
            return Err(self.error(format!(
                "event `{}` has more than 3 indexed parameters",
                event.name
            )));
        }

        Ok(EventDecl {
            name: event.name.clone(),
            params,
        })
    }

    fn resolve_initializer(&self, field: &str, ty: &Type, expr: &ast::Expression) -> Result<Expr> {
        if !ty.is_scalar() {
            return Err(self.error(format!(
                "field `{}` of type `{}` cannot have an initializer",
                field, ty
            )));
        }

        let mut body = BodyResolver::new(self, Scope::Initializer(field.to_string()));
        let value = body.resolve_expr(expr)?;
        let value = body.coerce(value, ty)?;
        let folded = fold_constant(value)
            .map_err(|reason| self.error(format!("initializer of field `{}` {}", field, reason)))?;
        trace!(field, "resolved field initializer");
        Ok(folded)
    }

    fn resolve_method(&self, function: &ast::Function) -> Result<MethodDecl> {
        let kind = match function.kind {
            ast::FunctionKind::Constructor => MethodKind::Constructor,
            ast::FunctionKind::Method => MethodKind::External,
        };
        let visibility = match kind {
            MethodKind::Constructor => Visibility::Mutating,
            MethodKind::External => self.resolve_markers(function)?,
        };
        let return_type = match &function.return_type {
            Some(ty) => Some(self.resolve_value_type(ty, "return value")?),
            None => None,
        };

        let mut body = BodyResolver::new(
            self,
            Scope::Method {
                name: function.name.clone(),
                kind,
                visibility,
                return_type: return_type.clone(),
            },
        );

        let mut params = Vec::with_capacity(function.params.len());
        for param in &function.params {
            let ty = self.resolve_value_type(&param.param_type, "parameter")?;
            let local = body.declare(&param.name, ty.clone())?;
            params.push(ParamDecl {
                name: param.name.clone(),
                ty,
                local,
            });
        }

        let statements = body.resolve_block(&function.body)?;
        trace!(method = %function.name, locals = body.locals.len(), "resolved method body");

        Ok(MethodDecl {
            name: function.name.clone(),
            kind,
            visibility,
            params,
            return_type,
            locals: body.locals,
            body: statements,
        })
    }

    fn resolve_markers(&self, function: &ast::Function) -> Result<Visibility> {
        let mut visibility = None;
        for marker in &function.markers {
            let tagged = match marker.as_str() {
                "readonly" => Visibility::ReadOnly,
                "mutating" => Visibility::Mutating,
                other => {
                    return Err(self.error(format!(
                        "method `{}` has unknown marker `@{}`",
                        function.name, other
                    )))
                }
            };
            if visibility.replace(tagged).is_some() {
                return Err(self.error(format!(
                    "method `{}` has more than one visibility marker",
                    function.name
                )));
            }
        }
        visibility.ok_or_else(|| {
            self.error(format!(
                "method `{}` needs a visibility marker (`@readonly` or `@mutating`)",
                function.name
            ))
        })
    }
}

enum Scope {
    /// A field initializer: contract state is not visible.
    Initializer(String),
    Method {
        name: String,
        kind: MethodKind,
        visibility: Visibility,
        return_type: Option<Type>,
    },
}

struct BodyResolver<'a> {
    cx: &'a ContractContext,
    scope: Scope,
    locals: Vec<LocalDecl>,
    bindings: Vec<HashMap<String, LocalId>>,
    unchecked: usize,
}

impl<'a> BodyResolver<'a> {
    fn new(cx: &'a ContractContext, scope: Scope) -> Self {
        Self {
            cx,
            scope,
            locals: Vec::new(),
            bindings: vec![HashMap::new()],
            unchecked: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        let message = message.into();
        match &self.scope {
            Scope::Method { name, .. } => self.cx.error(format!("in `{}`: {}", name, message)),
            Scope::Initializer(_) => self.cx.error(message),
        }
    }

    fn lookup(&self, name: &str) -> Option<LocalId> {
        self.bindings.iter().rev().find_map(|scope| scope.get(name).copied())
    }

    fn declare(&mut self, name: &str, ty: Type) -> Result<LocalId> {
        if self.cx.field_index.contains_key(name) {
            return Err(self.error(format!("local `{}` shadows a field", name)));
        }
        if self.lookup(name).is_some() {
            return Err(self.error(format!("`{}` is already bound in this scope", name)));
        }
        let id = self.hidden(name, ty);
        if let Some(scope) = self.bindings.last_mut() {
            scope.insert(name.to_string(), id);
        }
        Ok(id)
    }

    /// Allocates a local that no source name can refer to.
    fn hidden(&mut self, name: &str, ty: Type) -> LocalId {
        let id = LocalId(self.locals.len());
        self.locals.push(LocalDecl {
            name: name.to_string(),
            ty,
        });
        id
    }

    fn visibility(&self) -> Visibility {
        match &self.scope {
            Scope::Method { visibility, .. } => *visibility,
            Scope::Initializer(_) => Visibility::Mutating,
        }
    }

    fn require_mutating(&self, what: &str) -> Result<()> {
        match self.visibility() {
            Visibility::Mutating => Ok(()),
            Visibility::ReadOnly => Err(self.error(format!(
                "@readonly methods cannot {}",
                what
            ))),
        }
    }

    fn resolve_block(&mut self, statements: &[ast::Statement]) -> Result<Vec<Stmt>> {
        self.bindings.push(HashMap::new());
        let mut out = Vec::with_capacity(statements.len());
        for statement in statements {
            self.resolve_statement(statement, &mut out)?;
        }
        self.bindings.pop();
        Ok(out)
    }

    fn resolve_statement(&mut self, statement: &ast::Statement, out: &mut Vec<Stmt>) -> Result<()> {
        match statement {
            ast::Statement::Let(name, declared, value) => {
                let value = self.resolve_expr(value)?;
                let value = match declared {
                    Some(ty) => {
                        let ty = self.cx.resolve_value_type(ty, "local")?;
                        self.coerce(value, &ty)?
                    }
                    None => value,
                };
                let local = self.declare(name, value.ty.clone())?;
                out.push(Stmt::Assign {
                    place: Place::Local(local),
                    value,
                });
            }
            ast::Statement::Assignment(place, op, value) => {
                let (place, ty) = self.resolve_place(place)?;
                if matches!(place, Place::Storage(_)) {
                    self.require_mutating("write to storage")?;
                }
                let value = self.resolve_expr(value)?;
                let value = match op {
                    ast::AssignOp::Assign => self.coerce(value, &ty)?,
                    compound => {
                        let op = match compound {
                            ast::AssignOp::AddAssign => ArithOp::Add,
                            ast::AssignOp::SubAssign => ArithOp::Sub,
                            _ => ArithOp::Mul,
                        };
                        let current = Expr {
                            kind: match &place {
                                Place::Local(id) => ExprKind::Local(*id),
                                Place::Storage(path) => ExprKind::Storage(path.clone()),
                            },
                            ty: ty.clone(),
                        };
                        self.arithmetic(op, current, value)?
                    }
                };
                out.push(Stmt::Assign { place, value });
            }
            ast::Statement::Push(place, value) => {
                self.require_mutating("write to storage")?;
                let (list, ty) = self.resolve_storage_place(place)?;
                let element = match ty {
                    Type::Sequence(element) => *element,
                    other => {
                        return Err(self.error(format!(
                            "`push` needs a list, `{}` has type `{}`",
                            place.name, other
                        )))
                    }
                };
                let value = self.resolve_expr(value)?;
                let value = self.coerce(value, &element)?;
                out.push(Stmt::Push { list, value });
            }
            ast::Statement::If(cond, then_branch, else_branch) => {
                let cond = self.resolve_condition(cond)?;
                let then_branch = self.resolve_block(then_branch)?;
                let else_branch = self.resolve_block(else_branch)?;
                out.push(Stmt::If {
                    cond,
                    then_branch,
                    else_branch,
                });
            }
            ast::Statement::ForRange(var, count, body) => {
                let count = self.resolve_expr(count)?;
                let count = self.expect(count, &Type::Integer)?;
                self.bindings.push(HashMap::new());
                let var = self.declare(var, Type::Integer)?;
                let counter = self.hidden("$counter", Type::Integer);
                let bound = self.hidden("$bound", Type::Integer);
                let body = self.resolve_block(body);
                self.bindings.pop();
                out.push(Stmt::ForRange {
                    var,
                    counter,
                    bound,
                    count,
                    body: body?,
                });
            }
            ast::Statement::ForEach(var, source, body) => {
                let (list, ty) = self.resolve_storage_place(source)?;
                let element = match ty {
                    Type::Sequence(element) => *element,
                    other => {
                        return Err(self.error(format!(
                            "`for .. in` needs a list, `{}` has type `{}`",
                            source.name, other
                        )))
                    }
                };
                self.bindings.push(HashMap::new());
                let var = self.declare(var, element)?;
                let counter = self.hidden("$counter", Type::Integer);
                let bound = self.hidden("$bound", Type::Integer);
                let base = self.hidden("$base", Type::Integer);
                let body = self.resolve_block(body);
                self.bindings.pop();
                out.push(Stmt::ForEach {
                    var,
                    counter,
                    bound,
                    base,
                    list,
                    body: body?,
                });
            }
            ast::Statement::While(..) => {
                return Err(self.error(
                    "`while` loops are unbounded and not supported; use `for i in range(n)`",
                ))
            }
            ast::Statement::Return(value) => {
                let stmt = self.resolve_return(value.as_ref())?;
                out.push(stmt);
            }
            ast::Statement::Emit(name, args) => {
                self.require_mutating("emit events")?;
                let cx = self.cx;
                let id = *cx
                    .event_index
                    .get(name)
                    .ok_or_else(|| self.error(format!("unknown event `{}`", name)))?;
                let event = &cx.events[id.0];
                if event.params.len() != args.len() {
                    return Err(self.error(format!(
                        "event `{}` takes {} arguments, {} given",
                        name,
                        event.params.len(),
                        args.len()
                    )));
                }
                let mut resolved = Vec::with_capacity(args.len());
                for (arg, param) in args.iter().zip(&event.params) {
                    let arg = self.resolve_expr(arg)?;
                    resolved.push(self.coerce(arg, &param.ty)?);
                }
                out.push(Stmt::Emit {
                    event: id,
                    args: resolved,
                });
            }
            ast::Statement::Fail(reason) => out.push(Stmt::Fail(reason.clone())),
            ast::Statement::Require(cond, reason) => {
                let cond = self.resolve_condition(cond)?;
                out.push(Stmt::Require {
                    cond,
                    reason: reason.clone(),
                });
            }
            ast::Statement::Unchecked(body) => {
                self.unchecked += 1;
                let body = self.resolve_block(body);
                self.unchecked -= 1;
                out.extend(body?);
            }
            ast::Statement::Expression(expr) => {
                return Err(self.error(format!(
                    "expression `{}` has no effect as a statement",
                    expr
                )))
            }
        }
        Ok(())
    }

    fn resolve_return(&mut self, value: Option<&ast::Expression>) -> Result<Stmt> {
        let (kind, return_type) = match &self.scope {
            Scope::Method {
                kind, return_type, ..
            } => (*kind, return_type.clone()),
            Scope::Initializer(_) => return Err(self.error("`return` outside a method")),
        };

        match (value, return_type) {
            (Some(_), _) if kind == MethodKind::Constructor => {
                Err(self.error("the constructor cannot return a value"))
            }
            (Some(expr), Some(ty)) => {
                let value = self.resolve_expr(expr)?;
                Ok(Stmt::Return(Some(self.coerce(value, &ty)?)))
            }
            (Some(_), None) => {
                Err(self.error("cannot return a value from a method without a return type"))
            }
            (None, Some(ty)) => {
                Err(self.error(format!("`return;` in a method returning `{}`", ty)))
            }
            (None, None) => Ok(Stmt::Return(None)),
        }
    }

    fn resolve_condition(&mut self, cond: &ast::Expression) -> Result<Expr> {
        let cond = self.resolve_expr(cond)?;
        self.expect(cond, &Type::Boolean)
    }

    /// Resolves an assignment target.
    fn resolve_place(&mut self, place: &ast::Place) -> Result<(Place, Type)> {
        if let Some(id) = self.lookup(&place.name) {
            if !place.indices.is_empty() {
                return Err(self.error(format!("local `{}` cannot be indexed", place.name)));
            }
            return Ok((Place::Local(id), self.locals[id.0].ty.clone()));
        }

        let (path, ty) = self.resolve_storage_place(place)?;
        if !ty.is_scalar() {
            return Err(self.error(format!(
                "cannot assign to `{}` of type `{}` as a whole",
                place.name, ty
            )));
        }
        Ok((Place::Storage(path), ty))
    }

    /// Resolves a place that must name a field, keeping whatever type it ends on.
    fn resolve_storage_place(&mut self, place: &ast::Place) -> Result<(StoragePath, Type)> {
        let (mut path, mut ty) = self.field_root(&place.name)?;
        for index in &place.indices {
            ty = self.index_path(&mut path, ty, index)?;
        }
        Ok((path, ty))
    }

    fn field_root(&self, name: &str) -> Result<(StoragePath, Type)> {
        if let Scope::Initializer(field) = &self.scope {
            return Err(self.error(format!(
                "initializer of field `{}` cannot refer to `{}`",
                field, name
            )));
        }
        if self.lookup(name).is_some() {
            return Err(self.error(format!("local `{}` cannot be indexed", name)));
        }
        let id = *self
            .cx
            .field_index
            .get(name)
            .ok_or_else(|| self.error(format!("unknown name `{}`", name)))?;
        Ok((
            StoragePath {
                field: id,
                accessors: Vec::new(),
            },
            self.cx.field_types[id.0].clone(),
        ))
    }

    fn index_path(
        &mut self,
        path: &mut StoragePath,
        ty: Type,
        index: &ast::Expression,
    ) -> Result<Type> {
        match ty {
            Type::Mapping(key, value) => {
                let index = self.resolve_expr(index)?;
                path.accessors.push(Accessor::Key(self.coerce(index, &key)?));
                Ok(*value)
            }
            Type::Sequence(element) => {
                let index = self.resolve_expr(index)?;
                path.accessors.push(Accessor::Index(self.expect(index, &Type::Integer)?));
                Ok(*element)
            }
            other => Err(self.error(format!("a value of type `{}` cannot be indexed", other))),
        }
    }

    fn storage_access(&mut self, expr: &ast::Expression) -> Result<(StoragePath, Type)> {
        match expr {
            ast::Expression::Identifier(name) => self.field_root(name),
            ast::Expression::Index(base, index) => {
                let (mut path, ty) = self.storage_access(base)?;
                let ty = self.index_path(&mut path, ty, index)?;
                Ok((path, ty))
            }
            other => Err(self.error(format!("`{}` cannot be indexed", other))),
        }
    }

    fn resolve_expr(&mut self, expr: &ast::Expression) -> Result<Expr> {
        match expr {
            ast::Expression::Literal(literal) => self.resolve_literal(literal),
            ast::Expression::Identifier(name) => {
                if let Some(id) = self.lookup(name) {
                    return Ok(Expr {
                        kind: ExprKind::Local(id),
                        ty: self.locals[id.0].ty.clone(),
                    });
                }
                let (path, ty) = self.field_root(name)?;
                self.storage_read(name, path, ty)
            }
            ast::Expression::Index(..) => {
                let (path, ty) = self.storage_access(expr)?;
                self.storage_read(&expr.to_string(), path, ty)
            }
            ast::Expression::Length(base) => {
                let (path, ty) = self.storage_access(base)?;
                match ty {
                    Type::Sequence(_) => Ok(Expr {
                        kind: ExprKind::Length(path),
                        ty: Type::Integer,
                    }),
                    other => Err(self.error(format!(
                        "`.length` needs a list, `{}` has type `{}`",
                        base, other
                    ))),
                }
            }
            ast::Expression::Not(inner) => {
                let inner = self.resolve_expr(inner)?;
                let inner = self.expect(inner, &Type::Boolean)?;
                Ok(Expr {
                    kind: ExprKind::Not(Box::new(inner)),
                    ty: Type::Boolean,
                })
            }
            ast::Expression::BinaryOp(lhs, op, rhs) => {
                let lhs = self.resolve_expr(lhs)?;
                let rhs = self.resolve_expr(rhs)?;
                self.binary(*op, lhs, rhs)
            }
            ast::Expression::Call(name, args) => {
                let kind = match name.as_str() {
                    "sender" => (ExprKind::Caller, Type::Address),
                    "value" => (ExprKind::CallValue, Type::Integer),
                    other => return Err(self.error(format!("unknown function `{}`", other))),
                };
                if !args.is_empty() {
                    return Err(self.error(format!("`{}()` takes no arguments", name)));
                }
                Ok(Expr {
                    kind: kind.0,
                    ty: kind.1,
                })
            }
        }
    }

    fn storage_read(&self, what: &str, path: StoragePath, ty: Type) -> Result<Expr> {
        if !ty.is_scalar() {
            return Err(self.error(format!(
                "cannot read `{}` of type `{}` as a whole",
                what, ty
            )));
        }
        Ok(Expr {
            kind: ExprKind::Storage(path),
            ty,
        })
    }

    fn resolve_literal(&self, literal: &ast::Literal) -> Result<Expr> {
        let (value, ty) = match literal {
            ast::Literal::Integer(digits) => {
                let value = U256::from_str_radix(digits, 10).map_err(|_| {
                    self.error(format!("integer literal `{}` does not fit in 256 bits", digits))
                })?;
                (value, Type::Integer)
            }
            ast::Literal::Hex(digits) => {
                let value = U256::from_str_radix(digits, 16).map_err(|_| {
                    self.error(format!("hex literal `0x{}` does not fit in 256 bits", digits))
                })?;
                let ty = if digits.len() == 40 {
                    Type::Address
                } else {
                    Type::Integer
                };
                (value, ty)
            }
            ast::Literal::Bool(b) => (U256::from(*b as u8), Type::Boolean),
            ast::Literal::Text(_) => {
                return Err(self.error(
                    "string literals are only allowed as `fail` and `require` reasons",
                ))
            }
        };
        Ok(Expr {
            kind: ExprKind::Literal(value),
            ty,
        })
    }

    fn binary(&self, op: ast::BinaryOperator, lhs: Expr, rhs: Expr) -> Result<Expr> {
        use ast::BinaryOperator as B;

        match op {
            B::Add => self.arithmetic(ArithOp::Add, lhs, rhs),
            B::Sub => self.arithmetic(ArithOp::Sub, lhs, rhs),
            B::Mul => self.arithmetic(ArithOp::Mul, lhs, rhs),
            B::Div => self.arithmetic(ArithOp::Div, lhs, rhs),
            B::Rem => self.arithmetic(ArithOp::Rem, lhs, rhs),
            B::Lt | B::Le | B::Gt | B::Ge => {
                let lhs = self.expect(lhs, &Type::Integer)?;
                let rhs = self.expect(rhs, &Type::Integer)?;
                let op = match op {
                    B::Lt => CompareOp::Lt,
                    B::Le => CompareOp::Le,
                    B::Gt => CompareOp::Gt,
                    _ => CompareOp::Ge,
                };
                Ok(compare(op, lhs, rhs))
            }
            B::Eq | B::Ne => {
                let (lhs, rhs) = if lhs.ty == rhs.ty {
                    (lhs, rhs)
                } else if lhs.ty == Type::Address {
                    let rhs = self.coerce(rhs, &Type::Address)?;
                    (lhs, rhs)
                } else {
                    let lhs = self.coerce(lhs, &rhs.ty)?;
                    (lhs, rhs)
                };
                let op = if op == B::Eq { CompareOp::Eq } else { CompareOp::Ne };
                Ok(compare(op, lhs, rhs))
            }
            B::And | B::Or => {
                let lhs = self.expect(lhs, &Type::Boolean)?;
                let rhs = self.expect(rhs, &Type::Boolean)?;
                let op = if op == B::And { LogicalOp::And } else { LogicalOp::Or };
                Ok(Expr {
                    kind: ExprKind::Logical {
                        op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    },
                    ty: Type::Boolean,
                })
            }
        }
    }

    fn arithmetic(&self, op: ArithOp, lhs: Expr, rhs: Expr) -> Result<Expr> {
        let lhs = self.expect(lhs, &Type::Integer)?;
        let rhs = self.expect(rhs, &Type::Integer)?;
        Ok(Expr {
            kind: ExprKind::Arith {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                checked: self.unchecked == 0,
            },
            ty: Type::Integer,
        })
    }

    fn expect(&self, expr: Expr, ty: &Type) -> Result<Expr> {
        if &expr.ty == ty {
            Ok(expr)
        } else {
            Err(self.error(format!("expected `{}`, found `{}`", ty, expr.ty)))
        }
    }

    /// Like [`Self::expect`], but lets small integer literals stand in for addresses.
    fn coerce(&self, expr: Expr, ty: &Type) -> Result<Expr> {
        if &expr.ty == ty {
            return Ok(expr);
        }
        match (&expr.kind, &expr.ty, ty) {
            (ExprKind::Literal(value), Type::Integer, Type::Address) if value.bit_len() <= 160 => {
                Ok(Expr {
                    kind: expr.kind,
                    ty: Type::Address,
                })
            }
            _ => Err(self.error(format!("expected `{}`, found `{}`", ty, expr.ty))),
        }
    }
}

fn compare(op: CompareOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr {
        kind: ExprKind::Compare {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        ty: Type::Boolean,
    }
}

/// Evaluates every operator whose operands are all literals.
fn fold_constant(expr: Expr) -> std::result::Result<Expr, String> {
    let Expr { kind, ty } = expr;
    let kind = match kind {
        ExprKind::Arith {
            op,
            lhs,
            rhs,
            checked,
        } => {
            let lhs = fold_constant(*lhs)?;
            let rhs = fold_constant(*rhs)?;
            match (&lhs.kind, &rhs.kind) {
                (ExprKind::Literal(a), ExprKind::Literal(b)) => {
                    ExprKind::Literal(eval_arith(op, *a, *b, checked)?)
                }
                _ => ExprKind::Arith {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                    checked,
                },
            }
        }
        ExprKind::Compare { op, lhs, rhs } => {
            let lhs = fold_constant(*lhs)?;
            let rhs = fold_constant(*rhs)?;
            match (&lhs.kind, &rhs.kind) {
                (ExprKind::Literal(a), ExprKind::Literal(b)) => {
                    let holds = match op {
                        CompareOp::Eq => a == b,
                        CompareOp::Ne => a != b,
                        CompareOp::Lt => a < b,
                        CompareOp::Le => a <= b,
                        CompareOp::Gt => a > b,
                        CompareOp::Ge => a >= b,
                    };
                    ExprKind::Literal(U256::from(holds as u8))
                }
                _ => ExprKind::Compare {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
            }
        }
        ExprKind::Logical { op, lhs, rhs } => {
            let lhs = fold_constant(*lhs)?;
            let rhs = fold_constant(*rhs)?;
            match (&lhs.kind, &rhs.kind) {
                (ExprKind::Literal(a), ExprKind::Literal(b)) => {
                    let holds = match op {
                        LogicalOp::And => !a.is_zero() && !b.is_zero(),
                        LogicalOp::Or => !a.is_zero() || !b.is_zero(),
                    };
                    ExprKind::Literal(U256::from(holds as u8))
                }
                _ => ExprKind::Logical {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
            }
        }
        ExprKind::Not(inner) => {
            let inner = fold_constant(*inner)?;
            match inner.kind {
                ExprKind::Literal(v) => ExprKind::Literal(U256::from(v.is_zero() as u8)),
                _ => ExprKind::Not(Box::new(inner)),
            }
        }
        other => other,
    };
    Ok(Expr { kind, ty })
}

fn eval_arith(op: ArithOp, a: U256, b: U256, checked: bool) -> std::result::Result<U256, String> {
    let result = match (op, checked) {
        (ArithOp::Add, true) => a.checked_add(b),
        (ArithOp::Add, false) => Some(a.wrapping_add(b)),
        (ArithOp::Sub, true) => a.checked_sub(b),
        (ArithOp::Sub, false) => Some(a.wrapping_sub(b)),
        (ArithOp::Mul, true) => a.checked_mul(b),
        (ArithOp::Mul, false) => Some(a.wrapping_mul(b)),
        (ArithOp::Div, _) => a.checked_div(b),
        (ArithOp::Rem, _) => a.checked_rem(b),
    };
    result.ok_or_else(|| match op {
        ArithOp::Div | ArithOp::Rem => "divides by zero".to_string(),
        ArithOp::Sub => "underflows".to_string(),
        _ => "overflows".to_string(),
    })
}
