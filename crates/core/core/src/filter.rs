//! Filter strings for collection queries.
//!
//! The syntax follows the usual BaaS convention:
//!
//! ```text
//! status = 'open' && (priority = 'high' || priority = 'urgent')
//! amount_cents >= 1000 && tenant_id != null
//! name ~ 'academy'            // case-insensitive contains
//! affected_tenants ?= 'ten_1' // array contains
//! ```

use chrono::{DateTime, FixedOffset};
use serde_json::Value;
use std::cmp::Ordering;
use std::str::FromStr;

use crate::error::{OwnerError, OwnerResult};

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
    NotLike,
    AnyEq,
}

/// A parsed filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every record (blank filter).
    All,
    /// `path op literal`.
    Compare {
        path: Vec<String>,
        op: Op,
        value: Value,
    },
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    /// Parses a filter string. Blank input yields [`Filter::All`].
    pub fn parse(input: &str) -> OwnerResult<Self> {
        let tokens = lex(input)?;
        if tokens.is_empty() {
            return Ok(Filter::All);
        }

        let mut parser = Parser {
            tokens,
            pos: 0,
            end: input.len(),
            depth: 0,
            terms: 0,
        };
        let filter = parser.expr()?;
        if let Some((_, offset)) = parser.tokens.get(parser.pos) {
            return Err(invalid(*offset, "unexpected trailing input"));
        }
        Ok(filter)
    }

    /// Evaluates the filter against a record.
    pub fn matches(&self, record: &Value) -> bool {
        match self {
            Filter::All => true,
            Filter::Compare { path, op, value } => compare(lookup(record, path), *op, value),
            Filter::And(a, b) => a.matches(record) && b.matches(record),
            Filter::Or(a, b) => a.matches(record) || b.matches(record),
            Filter::Not(inner) => !inner.matches(record),
        }
    }

    /// Combines two filters with `&&`, dropping [`Filter::All`] sides.
    pub fn and(self, other: Filter) -> Filter {
        match (self, other) {
            (Filter::All, f) | (f, Filter::All) => f,
            (a, b) => Filter::And(Box::new(a), Box::new(b)),
        }
    }
}

impl FromStr for Filter {
    type Err = OwnerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Quotes arbitrary text as a filter string literal.
pub fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Joins filter fragments with `&&`, skipping empty ones.
pub fn all_of<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    parts
        .into_iter()
        .filter(|p| !p.as_ref().trim().is_empty())
        .map(|p| format!("({})", p.as_ref()))
        .collect::<Vec<_>>()
        .join(" && ")
}

fn invalid(offset: usize, reason: impl Into<String>) -> OwnerError {
    OwnerError::InvalidFilter {
        offset,
        reason: reason.into(),
    }
}

// ==================== Lexer ====================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Literal(Value),
    Op(Op),
    And,
    Or,
    Not,
    LParen,
    RParen,
}

fn lex(input: &str) -> OwnerResult<Vec<(Token, usize)>> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (offset, c) = chars[i];
        let next = chars.get(i + 1).map(|(_, c)| *c);

        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push((Token::LParen, offset));
                i += 1;
            }
            ')' => {
                tokens.push((Token::RParen, offset));
                i += 1;
            }
            '&' if next == Some('&') => {
                tokens.push((Token::And, offset));
                i += 2;
            }
            '|' if next == Some('|') => {
                tokens.push((Token::Or, offset));
                i += 2;
            }
            '!' => match next {
                Some('=') => {
                    tokens.push((Token::Op(Op::Ne), offset));
                    i += 2;
                }
                Some('~') => {
                    tokens.push((Token::Op(Op::NotLike), offset));
                    i += 2;
                }
                _ => {
                    tokens.push((Token::Not, offset));
                    i += 1;
                }
            },
            '=' => {
                tokens.push((Token::Op(Op::Eq), offset));
                i += 1;
            }
            '~' => {
                tokens.push((Token::Op(Op::Like), offset));
                i += 1;
            }
            '?' if next == Some('=') => {
                tokens.push((Token::Op(Op::AnyEq), offset));
                i += 2;
            }
            '>' | '<' => {
                let or_equal = next == Some('=');
                let op = match (c, or_equal) {
                    ('>', true) => Op::Ge,
                    ('>', false) => Op::Gt,
                    ('<', true) => Op::Le,
                    _ => Op::Lt,
                };
                tokens.push((Token::Op(op), offset));
                i += if or_equal { 2 } else { 1 };
            }
            '\'' | '"' => {
                let quote_char = c;
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(invalid(offset, "unterminated string")),
                        Some((_, '\\')) => {
                            let (_, escaped) = chars
                                .get(i + 1)
                                .ok_or_else(|| invalid(offset, "unterminated string"))?;
                            text.push(*escaped);
                            i += 2;
                        }
                        Some((_, ch)) if *ch == quote_char => {
                            i += 1;
                            break;
                        }
                        Some((_, ch)) => {
                            text.push(*ch);
                            i += 1;
                        }
                    }
                }
                tokens.push((Token::Literal(Value::String(text)), offset));
            }
            c if c.is_ascii_digit() || (c == '-' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].1.is_ascii_digit() || chars[i].1 == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().map(|(_, c)| *c).collect();
                let number = parse_number(&text).ok_or_else(|| invalid(offset, "invalid number"))?;
                tokens.push((Token::Literal(number), offset));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].1.is_ascii_alphanumeric() || chars[i].1 == '_' || chars[i].1 == '.')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().map(|(_, c)| *c).collect();
                let token = match word.as_str() {
                    "true" => Token::Literal(Value::Bool(true)),
                    "false" => Token::Literal(Value::Bool(false)),
                    "null" => Token::Literal(Value::Null),
                    _ => Token::Ident(word),
                };
                tokens.push((token, offset));
            }
            other => return Err(invalid(offset, format!("unexpected character '{}'", other))),
        }
    }

    Ok(tokens)
}

fn parse_number(text: &str) -> Option<Value> {
    if let Ok(n) = text.parse::<i64>() {
        return Some(Value::from(n));
    }
    text.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
}

// ==================== Parser ====================

/// Deepest nesting of `!` and parentheses a filter may use.
pub const MAX_FILTER_DEPTH: usize = 64;

/// Most comparisons a single filter may hold.
pub const MAX_FILTER_TERMS: usize = 256;

/// Recursive descent over the token list. Nesting and length are capped so
/// that parsing, evaluation and drop of the tree stay within a small stack.
struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    end: usize,
    depth: usize,
    terms: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|(_, o)| *o).unwrap_or(self.end)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        self.pos += 1;
        token
    }

    fn expr(&mut self) -> OwnerResult<Filter> {
        let mut left = self.and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.and()?;
            left = Filter::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> OwnerResult<Filter> {
        let mut left = self.unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.unary()?;
            left = Filter::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> OwnerResult<Filter> {
        if !matches!(self.peek(), Some(Token::Not | Token::LParen)) {
            return self.comparison();
        }
        if self.depth >= MAX_FILTER_DEPTH {
            return Err(invalid(
                self.offset(),
                format!("filter nests deeper than {} levels", MAX_FILTER_DEPTH),
            ));
        }

        self.depth += 1;
        let nested = self.nested();
        self.depth -= 1;
        nested
    }

    fn nested(&mut self) -> OwnerResult<Filter> {
        if self.next() == Some(Token::Not) {
            return Ok(Filter::Not(Box::new(self.unary()?)));
        }
        let inner = self.expr()?;
        let offset = self.offset();
        match self.next() {
            Some(Token::RParen) => Ok(inner),
            _ => Err(invalid(offset, "expected ')'")),
        }
    }

    fn comparison(&mut self) -> OwnerResult<Filter> {
        let offset = self.offset();
        if self.terms >= MAX_FILTER_TERMS {
            return Err(invalid(
                offset,
                format!("filter has more than {} comparisons", MAX_FILTER_TERMS),
            ));
        }
        self.terms += 1;

        let path = match self.next() {
            Some(Token::Ident(name)) => name.split('.').map(str::to_string).collect(),
            _ => return Err(invalid(offset, "expected field name")),
        };

        let offset = self.offset();
        let op = match self.next() {
            Some(Token::Op(op)) => op,
            _ => return Err(invalid(offset, "expected comparison operator")),
        };

        let offset = self.offset();
        let value = match self.next() {
            Some(Token::Literal(value)) => value,
            _ => return Err(invalid(offset, "expected literal value")),
        };

        Ok(Filter::Compare { path, op, value })
    }
}

// ==================== Evaluation ====================

fn lookup<'a>(record: &'a Value, path: &[String]) -> &'a Value {
    let mut current = record;
    for key in path {
        match current.get(key.as_str()) {
            Some(value) => current = value,
            None => return &Value::Null,
        }
    }
    current
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Orders two JSON values of the same scalar kind.
pub(crate) fn order(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => match (timestamp(x), timestamp(y)) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => Some(x.cmp(y)),
        },
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Timestamps compare as instants, whatever their fractional precision.
fn timestamp(s: &str) -> Option<DateTime<FixedOffset>> {
    if s.len() < 20 || s.as_bytes().get(4) != Some(&b'-') {
        return None;
    }
    DateTime::parse_from_rfc3339(s).ok()
}

fn like(field: &Value, needle: &Value) -> bool {
    match (field, needle) {
        (Value::String(haystack), Value::String(needle)) => {
            haystack.to_lowercase().contains(&needle.to_lowercase())
        }
        _ => false,
    }
}

fn compare(field: &Value, op: Op, literal: &Value) -> bool {
    match op {
        Op::Eq => values_equal(field, literal),
        Op::Ne => !values_equal(field, literal),
        Op::Gt => order(field, literal) == Some(Ordering::Greater),
        Op::Ge => matches!(order(field, literal), Some(Ordering::Greater | Ordering::Equal)),
        Op::Lt => order(field, literal) == Some(Ordering::Less),
        Op::Le => matches!(order(field, literal), Some(Ordering::Less | Ordering::Equal)),
        Op::Like => like(field, literal),
        Op::NotLike => !like(field, literal),
        Op::AnyEq => field
            .as_array()
            .is_some_and(|items| items.iter().any(|item| values_equal(item, literal))),
    }
}
