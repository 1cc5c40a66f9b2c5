use serde::Serialize;

pub use crate::lexer::SourceSpan;

/// Unique within one parse. Children are numbered before their parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub u32);

/// Issues node ids for a single parser.
#[derive(Debug, Default)]
pub struct NodeIds {
    next: u32,
}

impl NodeIds {
    pub fn next(&mut self) -> NodeId {
        let id = NodeId(self.next);
        self.next += 1;
        id
    }
}

/// A node together with its id and the source bytes it covers.
#[derive(Debug, Clone, Serialize)]
pub struct Src<T: PartialEq> {
    pub id: NodeId,
    pub span: SourceSpan,
    pub node: T,
}

// Trees compare by shape only, so the same program parsed twice is equal.
impl<T: PartialEq> PartialEq for Src<T> {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node
    }
}

pub type Program = Vec<Src<Stmt>>;

#[derive(PartialEq, Debug, Clone, Serialize)]
pub enum Stmt {
    VariableDecl {
        var_type: String,
        name: String,
        initializer: Option<Src<Expr>>,
    },
    If {
        condition: Src<Expr>,
        then_branch: Box<Src<Stmt>>,
        else_branch: Option<Box<Src<Stmt>>>,
    },
    While {
        condition: Src<Expr>,
        body: Box<Src<Stmt>>,
    },
    Return {
        value: Option<Src<Expr>>,
    },
    /// Top level expression, the result is thrown away.
    Expression(Src<Expr>),
}

#[derive(PartialEq, Debug, Clone, Copy, Serialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(PartialEq, Debug, Clone, Copy, Serialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Neq,
    Lt,
    Gt,
    Lte,
    Gte,
}

impl BinaryOp {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        let op = match symbol {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::Neq,
            "<" => BinaryOp::Lt,
            ">" => BinaryOp::Gt,
            "<=" => BinaryOp::Lte,
            ">=" => BinaryOp::Gte,
            _ => return None,
        };
        Some(op)
    }
}

#[derive(PartialEq, Debug, Clone, Serialize)]
pub enum Literal {
    /// Digits as written, converted when compiled.
    Number(String),
    /// String contents without quotes.
    Str(String),
}

#[derive(PartialEq, Debug, Clone, Serialize)]
pub enum Expr {
    Binary(BinaryOp, Box<Src<Expr>>, Box<Src<Expr>>),
    Unary(UnaryOp, Box<Src<Expr>>),
    Literal(Literal),
    Identifier(String),
    /// A token that could not start an expression. Parsing carries on past it.
    Error { message: String },
}

impl Src<Expr> {
    /// Whether this expression or any sub-expression failed to parse.
    pub fn has_errors(&self) -> bool {
        match &self.node {
            Expr::Error { .. } => true,
            Expr::Binary(_, lhs, rhs) => lhs.has_errors() || rhs.has_errors(),
            Expr::Unary(_, arg) => arg.has_errors(),
            Expr::Literal(_) | Expr::Identifier(_) => false,
        }
    }
}

impl Src<Stmt> {
    pub fn has_errors(&self) -> bool {
        match &self.node {
            Stmt::VariableDecl { initializer, .. } => {
                initializer.as_ref().map_or(false, |e| e.has_errors())
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                condition.has_errors()
                    || then_branch.has_errors()
                    || else_branch.as_ref().map_or(false, |s| s.has_errors())
            }
            Stmt::While { condition, body } => condition.has_errors() || body.has_errors(),
            Stmt::Return { value } => value.as_ref().map_or(false, |e| e.has_errors()),
            Stmt::Expression(expr) => expr.has_errors(),
        }
    }
}

// Precedence, lowest first. All binary levels are left associative,
// unary is prefix and right recursive.
//
// expression     = comparison
// comparison     = additive (("<" | ">" | "==" | "!=" | "<=" | ">=") additive)*
// additive       = multiplicative (("+" | "-") multiplicative)*
// multiplicative = unary (("*" | "/") unary)*
// unary          = ("-" | "!") unary | primary
// primary        = literal | identifier | "(" expression ")"?
