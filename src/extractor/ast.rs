//! Surface syntax tree produced by the parser.
//!
//! Names are still plain strings here; the extractor resolves them into the
//! handle-based [`ContractModel`](super::model::ContractModel).

#[derive(Debug, Clone)]
pub struct Contract {
    pub name: String,
    pub fields: Vec<StateVariable>,
    pub functions: Vec<Function>,
    pub events: Vec<Event>,
}

#[derive(Debug, Clone)]
pub struct StateVariable {
    pub name: String,
    pub var_type: TypeName,
    pub initial_value: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeName {
    Named(String),
    Mapping(Box<TypeName>, Box<TypeName>),
    Sequence(Box<TypeName>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Constructor,
    Method,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub kind: FunctionKind,
    /// Raw `@marker` names, validated by the extractor.
    pub markers: Vec<String>,
    pub params: Vec<Parameter>,
    pub return_type: Option<TypeName>,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub param_type: TypeName,
}

#[derive(Debug, Clone)]
pub struct Event {
    pub name: String,
    pub params: Vec<EventParameter>,
}

#[derive(Debug, Clone)]
pub struct EventParameter {
    pub name: String,
    pub param_type: TypeName,
    pub indexed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
}

#[derive(Debug, Clone)]
pub enum Statement {
    Let(String, Option<TypeName>, Expression),
    Assignment(Place, AssignOp, Expression),
    Push(Place, Expression),
    If(Expression, Vec<Statement>, Vec<Statement>),
    ForRange(String, Expression, Vec<Statement>),
    ForEach(String, Place, Vec<Statement>),
    While(Expression, Vec<Statement>),
    Return(Option<Expression>),
    Emit(String, Vec<Expression>),
    Fail(String),
    Require(Expression, String),
    Unchecked(Vec<Statement>),
    Expression(Expression),
}

/// An assignable location: a name followed by zero or more `[index]` suffixes.
#[derive(Debug, Clone)]
pub struct Place {
    pub name: String,
    pub indices: Vec<Expression>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOperator {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "+" => Self::Add,
            "-" => Self::Sub,
            "*" => Self::Mul,
            "/" => Self::Div,
            "%" => Self::Rem,
            "==" => Self::Eq,
            "!=" => Self::Ne,
            "<" => Self::Lt,
            "<=" => Self::Le,
            ">" => Self::Gt,
            ">=" => Self::Ge,
            "&&" => Self::And,
            "||" => Self::Or,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => "&&",
            Self::Or => "||",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    /// Decimal digits with `_` separators removed.
    Integer(String),
    /// Hex digits without the `0x` prefix.
    Hex(String),
    Bool(bool),
    Text(String),
}

#[derive(Debug, Clone)]
pub enum Expression {
    Literal(Literal),
    Identifier(String),
    BinaryOp(Box<Expression>, BinaryOperator, Box<Expression>),
    Not(Box<Expression>),
    Index(Box<Expression>, Box<Expression>),
    Length(Box<Expression>),
    Call(String, Vec<Expression>),
}

impl std::fmt::Display for TypeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeName::Named(name) => write!(f, "{}", name),
            TypeName::Mapping(key, value) => write!(f, "map<{}, {}>", key, value),
            TypeName::Sequence(element) => write!(f, "list<{}>", element),
        }
    }
}

impl std::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expression::Literal(Literal::Integer(digits)) => write!(f, "{}", digits),
            Expression::Literal(Literal::Hex(digits)) => write!(f, "0x{}", digits),
            Expression::Literal(Literal::Bool(value)) => write!(f, "{}", value),
            Expression::Literal(Literal::Text(text)) => write!(f, "\"{}\"", text),
            Expression::Identifier(name) => write!(f, "{}", name),
            Expression::BinaryOp(left, op, right) => {
                write!(f, "({} {} {})", left, op.symbol(), right)
            }
            Expression::Not(inner) => write!(f, "!{}", inner),
            Expression::Index(base, index) => write!(f, "{}[{}]", base, index),
            Expression::Length(base) => write!(f, "{}.length", base),
            Expression::Call(name, args) => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}
