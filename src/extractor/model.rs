//! The structural model of one contract.
//!
//! Every name has been resolved to an integer handle by the time a model
//! exists; later stages never look anything up by string.

use alloy_primitives::U256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// 256-bit unsigned integer.
    Integer,
    /// 20-byte account address.
    Address,
    Boolean,
    /// Dynamic-length bytes. Parsed, never compiled.
    Text,
    Mapping(Box<Type>, Box<Type>),
    Sequence(Box<Type>),
}

impl Type {
    /// Value types that fit in one stack word.
    pub fn is_scalar(&self) -> bool {
        matches!(self, Type::Integer | Type::Address | Type::Boolean)
    }

    /// Canonical ABI name, only defined for scalars.
    pub fn abi_name(&self) -> Option<&'static str> {
        match self {
            Type::Integer => Some("uint256"),
            Type::Address => Some("address"),
            Type::Boolean => Some("bool"),
            _ => None,
        }
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Integer => write!(f, "uint"),
            Type::Address => write!(f, "address"),
            Type::Boolean => write!(f, "bool"),
            Type::Text => write!(f, "text"),
            Type::Mapping(key, value) => write!(f, "map<{}, {}>", key, value),
            Type::Sequence(element) => write!(f, "list<{}>", element),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContractModel {
    pub name: String,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<MethodDecl>,
    pub events: Vec<EventDecl>,
}

impl ContractModel {
    pub fn field(&self, id: FieldId) -> &FieldDecl {
        &self.fields[id.0]
    }

    pub fn method(&self, id: MethodId) -> &MethodDecl {
        &self.methods[id.0]
    }

    pub fn event(&self, id: EventId) -> &EventDecl {
        &self.events[id.0]
    }

    pub fn constructor(&self) -> Option<MethodId> {
        self.methods
            .iter()
            .position(|m| m.kind == MethodKind::Constructor)
            .map(MethodId)
    }

    /// Methods reachable through the dispatch table, in declaration order.
    pub fn external_methods(&self) -> impl Iterator<Item = (MethodId, &MethodDecl)> {
        self.methods
            .iter()
            .enumerate()
            .filter(|(_, m)| m.kind == MethodKind::External)
            .map(|(i, m)| (MethodId(i), m))
    }
}

#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: String,
    pub ty: Type,
    pub initial_value: Option<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    ReadOnly,
    Mutating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Constructor,
    External,
}

#[derive(Debug, Clone)]
pub struct MethodDecl {
    pub name: String,
    pub kind: MethodKind,
    pub visibility: Visibility,
    /// Parameters own locals `0..params.len()`.
    pub params: Vec<ParamDecl>,
    pub return_type: Option<Type>,
    pub locals: Vec<LocalDecl>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct ParamDecl {
    pub name: String,
    pub ty: Type,
    pub local: LocalId,
}

#[derive(Debug, Clone)]
pub struct LocalDecl {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone)]
pub struct EventDecl {
    pub name: String,
    pub params: Vec<EventParam>,
}

#[derive(Debug, Clone)]
pub struct EventParam {
    pub name: String,
    pub ty: Type,
    pub indexed: bool,
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Type,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Literal(U256),
    Local(LocalId),
    /// Read of a scalar stored at the end of a storage path.
    Storage(StoragePath),
    /// Current length of the sequence at a storage path.
    Length(StoragePath),
    Arith {
        op: ArithOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        checked: bool,
    },
    Compare {
        op: CompareOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Not(Box<Expr>),
    Caller,
    CallValue,
}

/// A field followed by mapping keys and sequence indices.
#[derive(Debug, Clone)]
pub struct StoragePath {
    pub field: FieldId,
    pub accessors: Vec<Accessor>,
}

#[derive(Debug, Clone)]
pub enum Accessor {
    Key(Expr),
    Index(Expr),
}

#[derive(Debug, Clone)]
pub enum Place {
    Local(LocalId),
    Storage(StoragePath),
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Assign {
        place: Place,
        value: Expr,
    },
    Push {
        list: StoragePath,
        value: Expr,
    },
    If {
        cond: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Vec<Stmt>,
    },
    /// `for var in range(count)`. `counter` and `bound` are hidden locals, so
    /// assigning `var` in the body cannot extend the loop.
    ForRange {
        var: LocalId,
        counter: LocalId,
        bound: LocalId,
        count: Expr,
        body: Vec<Stmt>,
    },
    /// `for var in list`. The length is read once, before the first iteration.
    ForEach {
        var: LocalId,
        counter: LocalId,
        bound: LocalId,
        base: LocalId,
        list: StoragePath,
        body: Vec<Stmt>,
    },
    Return(Option<Expr>),
    Fail(String),
    Require {
        cond: Expr,
        reason: String,
    },
    Emit {
        event: EventId,
        args: Vec<Expr>,
    },
}

impl Stmt {
    /// Calls `f` on this statement and every statement nested inside it.
    pub fn walk(&self, f: &mut impl FnMut(&Stmt)) {
        f(self);
        match self {
            Stmt::If {
                then_branch,
                else_branch,
                ..
            } => {
                for stmt in then_branch.iter().chain(else_branch) {
                    stmt.walk(f);
                }
            }
            Stmt::ForRange { body, .. } | Stmt::ForEach { body, .. } => {
                for stmt in body {
                    stmt.walk(f);
                }
            }
            _ => {}
        }
    }
}
