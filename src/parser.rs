// Math / condition expression parser
//
// `tokenize` turns the source into positioned tokens in a single pass and
// `Parser` climbs operator precedence over the resulting slice.

use std::fmt;
use std::str::CharIndices;

use crate::ast::{AstNode, BinaryOp, UnaryOp};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParserError {
    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("unexpected {found} at offset {offset}")]
    UnexpectedToken { found: String, offset: usize },

    #[error("expression ends early")]
    UnexpectedEnd,

    #[error("malformed number '{0}'")]
    InvalidNumber(String),

    #[error("string opened at offset {0} is never closed")]
    UnterminatedString(usize),

    #[error("unknown escape '\\{ch}' at offset {offset}")]
    InvalidEscape { ch: char, offset: usize },

    #[error("expected {expected} at offset {offset}, found {found}")]
    Expected {
        expected: &'static str,
        found: String,
        offset: usize,
    },
}

/// Operator symbols. `and`, `or` and `not` lex to the same operators as `&&`,
/// `||` and `!`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
}

const TERNARY_BP: u8 = 1;
const PREFIX_BP: u8 = 12;

impl Op {
    /// Left and right binding power of the infix form plus the node it builds.
    /// Higher binds tighter; `^` is right-associative.
    fn infix(self) -> Option<(u8, u8, BinaryOp)> {
        Some(match self {
            Op::Or => (2, 3, BinaryOp::Or),
            Op::And => (4, 5, BinaryOp::And),
            Op::Eq => (6, 7, BinaryOp::Equal),
            Op::Ne => (6, 7, BinaryOp::NotEqual),
            Op::Lt => (6, 7, BinaryOp::LessThan),
            Op::Le => (6, 7, BinaryOp::LessThanOrEqual),
            Op::Gt => (6, 7, BinaryOp::GreaterThan),
            Op::Ge => (6, 7, BinaryOp::GreaterThanOrEqual),
            Op::Add => (8, 9, BinaryOp::Add),
            Op::Sub => (8, 9, BinaryOp::Subtract),
            Op::Mul => (10, 11, BinaryOp::Multiply),
            Op::Div => (10, 11, BinaryOp::Divide),
            Op::Rem => (10, 11, BinaryOp::Modulo),
            Op::Pow => (13, 12, BinaryOp::Power),
            Op::Not => return None,
        })
    }

    fn symbol(self) -> &'static str {
        match self {
            Op::Not => "!",
            other => other.infix().map_or("?", |(_, _, op)| op.symbol()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Text(String),
    Bool(bool),
    Null,
    /// A binding or function name; a leading `$` has been dropped.
    Name(String),
    Op(Op),
    LParen,
    RParen,
    Comma,
    Dot,
    Question,
    Colon,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "number {}", n),
            Token::Text(s) => write!(f, "string '{}'", s),
            Token::Bool(b) => write!(f, "'{}'", b),
            Token::Null => f.write_str("'null'"),
            Token::Name(name) => write!(f, "name '{}'", name),
            Token::Op(op) => write!(f, "'{}'", op.symbol()),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
            Token::Comma => f.write_str("','"),
            Token::Dot => f.write_str("'.'"),
            Token::Question => f.write_str("'?'"),
            Token::Colon => f.write_str("':'"),
        }
    }
}

/// A token and the byte offset it starts at.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

struct Scanner<'a> {
    src: &'a str,
    chars: CharIndices<'a>,
}

impl<'a> Scanner<'a> {
    fn peek_nth(&self, n: usize) -> Option<char> {
        self.chars.clone().nth(n).map(|(_, c)| c)
    }

    fn offset(&self) -> usize {
        self.chars.clone().next().map_or(self.src.len(), |(i, _)| i)
    }

    fn bump(&mut self) -> Option<char> {
        self.chars.next().map(|(_, c)| c)
    }

    fn eat(&mut self, expected: char) -> bool {
        let hit = self.peek_nth(0) == Some(expected);
        if hit {
            self.bump();
        }
        hit
    }

    fn eat_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.offset();
        while self.peek_nth(0).is_some_and(&pred) {
            self.bump();
        }
        &self.src[start..self.offset()]
    }

    fn number(&mut self) -> Result<f64, ParserError> {
        let start = self.offset();
        self.eat_while(|c| c.is_ascii_digit());
        if self.peek_nth(0) == Some('.') && self.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            self.eat_while(|c| c.is_ascii_digit());
        }
        if matches!(self.peek_nth(0), Some('e' | 'E')) {
            let digit_at = if matches!(self.peek_nth(1), Some('+' | '-')) { 2 } else { 1 };
            if self.peek_nth(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                for _ in 0..digit_at {
                    self.bump();
                }
                self.eat_while(|c| c.is_ascii_digit());
            }
        }
        let text = &self.src[start..self.offset()];
        text.parse()
            .map_err(|_| ParserError::InvalidNumber(text.to_string()))
    }

    /// Body of a quoted string; the opening quote at `start` is already consumed.
    fn quoted(&mut self, quote: char, start: usize) -> Result<String, ParserError> {
        let mut out = String::new();
        loop {
            let offset = self.offset();
            match self.bump() {
                None => return Err(ParserError::UnterminatedString(start)),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(c @ ('"' | '\'' | '\\')) => out.push(c),
                    Some(ch) => return Err(ParserError::InvalidEscape { ch, offset }),
                    None => return Err(ParserError::UnterminatedString(start)),
                },
                Some(c) => out.push(c),
            }
        }
    }
}

/// Split an expression into tokens.
///
/// Right after a `.` any run of word characters is a path segment, so `stack.0.n`
/// yields names `stack`, `0` and `n`.
pub fn tokenize(src: &str) -> Result<Vec<Spanned>, ParserError> {
    let mut scanner = Scanner {
        src,
        chars: src.char_indices(),
    };
    let mut tokens: Vec<Spanned> = Vec::new();

    loop {
        scanner.eat_while(char::is_whitespace);
        let offset = scanner.offset();
        let Some(ch) = scanner.peek_nth(0) else {
            break;
        };
        let after_dot = matches!(tokens.last(), Some(Spanned { token: Token::Dot, .. }));

        let token = if after_dot && is_word(ch) {
            Token::Name(scanner.eat_while(is_word).to_string())
        } else if ch.is_ascii_digit() {
            Token::Number(scanner.number()?)
        } else if ch == '$' {
            scanner.bump();
            let name = scanner.eat_while(is_word);
            if name.is_empty() {
                return Err(ParserError::UnexpectedChar { ch, offset });
            }
            Token::Name(name.to_string())
        } else if ch.is_alphabetic() || ch == '_' {
            match scanner.eat_while(is_word) {
                "true" => Token::Bool(true),
                "false" => Token::Bool(false),
                "null" => Token::Null,
                "and" => Token::Op(Op::And),
                "or" => Token::Op(Op::Or),
                "not" => Token::Op(Op::Not),
                word => Token::Name(word.to_string()),
            }
        } else {
            scanner.bump();
            match ch {
                '"' | '\'' => Token::Text(scanner.quoted(ch, offset)?),
                '+' => Token::Op(Op::Add),
                '-' => Token::Op(Op::Sub),
                '*' => Token::Op(Op::Mul),
                '/' => Token::Op(Op::Div),
                '%' => Token::Op(Op::Rem),
                '^' => Token::Op(Op::Pow),
                '=' => {
                    scanner.eat('=');
                    Token::Op(Op::Eq)
                }
                '!' if scanner.eat('=') => Token::Op(Op::Ne),
                '!' => Token::Op(Op::Not),
                '<' if scanner.eat('=') => Token::Op(Op::Le),
                '<' => Token::Op(Op::Lt),
                '>' if scanner.eat('=') => Token::Op(Op::Ge),
                '>' => Token::Op(Op::Gt),
                '&' if scanner.eat('&') => Token::Op(Op::And),
                '|' if scanner.eat('|') => Token::Op(Op::Or),
                '(' => Token::LParen,
                ')' => Token::RParen,
                ',' => Token::Comma,
                '.' => Token::Dot,
                '?' => Token::Question,
                ':' => Token::Colon,
                _ => return Err(ParserError::UnexpectedChar { ch, offset }),
            }
        };
        tokens.push(Spanned { token, offset });
    }

    Ok(tokens)
}

/// Precedence-climbing parser over a token slice.
pub struct Parser<'t> {
    tokens: &'t [Spanned],
    pos: usize,
}

impl<'t> Parser<'t> {
    pub fn new(tokens: &'t [Spanned]) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn next(&mut self) -> Option<&'t Spanned> {
        let spanned = self.tokens.get(self.pos);
        if spanned.is_some() {
            self.pos += 1;
        }
        spanned
    }

    fn expect(&mut self, want: &Token, label: &'static str) -> Result<(), ParserError> {
        match self.next() {
            Some(spanned) if &spanned.token == want => Ok(()),
            Some(spanned) => Err(ParserError::Expected {
                expected: label,
                found: spanned.token.to_string(),
                offset: spanned.offset,
            }),
            None => Err(ParserError::UnexpectedEnd),
        }
    }

    /// Parse operators binding at least as tightly as `min_bp`.
    pub fn expression(&mut self, min_bp: u8) -> Result<AstNode, ParserError> {
        let mut lhs = self.operand()?;

        loop {
            match self.peek() {
                Some(Token::Question) if min_bp <= TERNARY_BP => {
                    self.pos += 1;
                    let then_branch = self.expression(0)?;
                    self.expect(&Token::Colon, "':'")?;
                    let else_branch = self.expression(TERNARY_BP)?;
                    lhs = AstNode::Conditional {
                        condition: Box::new(lhs),
                        then_branch: Box::new(then_branch),
                        else_branch: Box::new(else_branch),
                    };
                }
                Some(Token::Op(op)) => {
                    let Some((left, right, binary)) = op.infix() else {
                        break;
                    };
                    if left < min_bp {
                        break;
                    }
                    self.pos += 1;
                    let rhs = self.expression(right)?;
                    lhs = AstNode::binary(binary, lhs, rhs);
                }
                _ => break,
            }
        }

        Ok(lhs)
    }

    fn operand(&mut self) -> Result<AstNode, ParserError> {
        let spanned = self.next().ok_or(ParserError::UnexpectedEnd)?;
        match &spanned.token {
            Token::Number(n) => Ok(AstNode::Number(*n)),
            Token::Text(s) => Ok(AstNode::String(s.clone())),
            Token::Bool(b) => Ok(AstNode::Boolean(*b)),
            Token::Null => Ok(AstNode::Null),
            Token::Name(name) => self.name(name.clone()),
            Token::Op(Op::Sub) => Ok(AstNode::Unary {
                op: UnaryOp::Negate,
                operand: Box::new(self.expression(PREFIX_BP)?),
            }),
            Token::Op(Op::Not) => Ok(AstNode::Unary {
                op: UnaryOp::Not,
                operand: Box::new(self.expression(PREFIX_BP)?),
            }),
            Token::LParen => {
                let inner = self.expression(0)?;
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            other => Err(ParserError::UnexpectedToken {
                found: other.to_string(),
                offset: spanned.offset,
            }),
        }
    }

    /// A dotted binding path, or a call when the name is followed by `(`.
    fn name(&mut self, first: String) -> Result<AstNode, ParserError> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            return self.call(first);
        }
        let mut segments = vec![first];
        while self.peek() == Some(&Token::Dot) {
            self.pos += 1;
            match self.next() {
                Some(Spanned {
                    token: Token::Name(segment),
                    ..
                }) => segments.push(segment.clone()),
                Some(other) => {
                    return Err(ParserError::Expected {
                        expected: "path segment",
                        found: other.token.to_string(),
                        offset: other.offset,
                    })
                }
                None => return Err(ParserError::UnexpectedEnd),
            }
        }
        Ok(AstNode::Path(segments))
    }

    fn call(&mut self, name: String) -> Result<AstNode, ParserError> {
        let mut args = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            args.push(self.expression(0)?);
            while self.peek() == Some(&Token::Comma) {
                self.pos += 1;
                args.push(self.expression(0)?);
            }
        }
        self.expect(&Token::RParen, "')'")?;
        Ok(AstNode::Function { name, args })
    }
}

/// Parse a whole expression; trailing tokens are an error.
pub fn parse(expression: &str) -> Result<AstNode, ParserError> {
    let tokens = tokenize(expression)?;
    let mut parser = Parser::new(&tokens);
    let ast = parser.expression(0)?;
    match parser.next() {
        None => Ok(ast),
        Some(extra) => Err(ParserError::Expected {
            expected: "end of expression",
            found: extra.token.to_string(),
            offset: extra.offset,
        }),
    }
}
