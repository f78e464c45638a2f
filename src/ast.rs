// Abstract Syntax Tree for math and condition expressions
// Produced by the parser, walked by the default math evaluator

use serde::{Deserialize, Serialize};

/// AST Node types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AstNode {
    /// String literal (e.g., "prod", 'eu')
    String(String),

    /// Number literal
    Number(f64),

    /// Boolean literal
    Boolean(bool),

    /// Null literal
    Null,

    /// Binding reference such as `value`, `$value` or `stack.n`
    /// The optional `$` prefix is dropped by the lexer
    Path(Vec<String>),

    /// Binary operation
    Binary {
        op: BinaryOp,
        lhs: Box<AstNode>,
        rhs: Box<AstNode>,
    },

    /// Unary operation
    Unary { op: UnaryOp, operand: Box<AstNode> },

    /// `condition ? then : else`
    Conditional {
        condition: Box<AstNode>,
        then_branch: Box<AstNode>,
        else_branch: Box<AstNode>,
    },

    /// Call of one of the built-in numeric functions
    Function { name: String, args: Vec<AstNode> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,

    // Comparison
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,

    // Logical
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Negate,

    Not,
}

impl AstNode {
    pub fn string(s: impl Into<String>) -> Self {
        AstNode::String(s.into())
    }

    pub fn number(n: f64) -> Self {
        AstNode::Number(n)
    }

    pub fn boolean(b: bool) -> Self {
        AstNode::Boolean(b)
    }

    pub fn path(segments: &[&str]) -> Self {
        AstNode::Path(segments.iter().map(|s| s.to_string()).collect())
    }

    pub fn binary(op: BinaryOp, lhs: AstNode, rhs: AstNode) -> Self {
        AstNode::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Power => "^",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::LessThan => "<",
            BinaryOp::LessThanOrEqual => "<=",
            BinaryOp::GreaterThan => ">",
            BinaryOp::GreaterThanOrEqual => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }
}
