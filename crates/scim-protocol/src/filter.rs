//! SCIM filter parsing and evaluation (RFC 7644 §3.4.2.2).
//!
//! Recursive-descent parser over the full filter grammar, precedence
//! `or` < `and` < `not` < grouping/comparison, producing a [`FilterExpr`]
//! AST evaluated against the generic attribute-map form of a resource.

use serde_json::Value;

use crate::error::{ScimError, ScimErrorKind, ScimResult};
use crate::path::{self, AttrPath};

/// A parsed filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    /// `path op literal`
    Compare {
        path: AttrPath,
        op: CompareOp,
        value: Value,
    },
    /// `path pr`
    Present(AttrPath),
    And(Box<FilterExpr>, Box<FilterExpr>),
    Or(Box<FilterExpr>, Box<FilterExpr>),
    Not(Box<FilterExpr>),
    /// A parenthesized sub-expression.
    Group(Box<FilterExpr>),
}

/// Comparison operators carrying a literal (`pr` is [`FilterExpr::Present`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Co,
    Sw,
    Ew,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    fn parse(word: &str) -> Option<Self> {
        match word.to_ascii_lowercase().as_str() {
            "eq" => Some(Self::Eq),
            "ne" => Some(Self::Ne),
            "co" => Some(Self::Co),
            "sw" => Some(Self::Sw),
            "ew" => Some(Self::Ew),
            "gt" => Some(Self::Gt),
            "ge" => Some(Self::Ge),
            "lt" => Some(Self::Lt),
            "le" => Some(Self::Le),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    /// Attribute path or keyword; bracketed sub-filters are carried whole.
    Word(String),
    Str(String),
    Number(f64),
    LParen,
    RParen,
}

/// Parse a filter string. Empty input means "match everything" and parses to
/// `None`; any grammar violation is an `invalidFilter` error.
pub fn parse_filter(input: &str) -> ScimResult<Option<FilterExpr>> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(ScimError::invalid_filter(format!(
            "unexpected trailing input in filter: {input}"
        )));
    }
    Ok(Some(expr))
}

fn tokenize(input: &str) -> ScimResult<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '"' => {
                let (s, next) = lex_string(&chars, i)?;
                tokens.push(Token::Str(s));
                i = next;
            }
            c if c.is_ascii_digit() || c == '-' => {
                let start = i;
                i += 1;
                while i < chars.len()
                    && (chars[i].is_ascii_digit() || matches!(chars[i], '.' | 'e' | 'E' | '+' | '-'))
                {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text.parse::<f64>().map_err(|_| {
                    ScimError::invalid_filter(format!("invalid number literal: {text}"))
                })?;
                tokens.push(Token::Number(n));
            }
            c if is_word_char(c) => {
                let start = i;
                while i < chars.len() {
                    if is_word_char(chars[i]) || matches!(chars[i], '.' | ':') {
                        i += 1;
                    } else if chars[i] == '[' {
                        // Carry an embedded value filter along with the path.
                        let mut depth = 0usize;
                        let mut in_string = false;
                        while i < chars.len() {
                            let b = chars[i];
                            if in_string {
                                if b == '\\' {
                                    i += 1;
                                } else if b == '"' {
                                    in_string = false;
                                }
                            } else {
                                match b {
                                    '"' => in_string = true,
                                    '[' => depth += 1,
                                    ']' => {
                                        depth -= 1;
                                        if depth == 0 {
                                            break;
                                        }
                                    }
                                    _ => {}
                                }
                            }
                            i += 1;
                        }
                        if i >= chars.len() {
                            return Err(ScimError::invalid_filter(
                                "unclosed bracket in filter path",
                            ));
                        }
                        i += 1;
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Word(chars[start..i].iter().collect()));
            }
            other => {
                return Err(ScimError::invalid_filter(format!(
                    "unexpected character '{other}' in filter"
                )));
            }
        }
    }

    Ok(tokens)
}

fn lex_string(chars: &[char], open: usize) -> ScimResult<(String, usize)> {
    let mut out = String::new();
    let mut i = open + 1;
    while i < chars.len() {
        match chars[i] {
            '"' => return Ok((out, i + 1)),
            '\\' => {
                i += 1;
                match chars.get(i) {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some(c) => out.push(*c),
                    None => break,
                }
                i += 1;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Err(ScimError::invalid_filter("unterminated string literal"))
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '$'
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword))
    }

    fn parse_or(&mut self) -> ScimResult<FilterExpr> {
        let mut left = self.parse_and()?;
        while self.peek_keyword("or") {
            self.pos += 1;
            let right = self.parse_and()?;
            left = FilterExpr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ScimResult<FilterExpr> {
        let mut left = self.parse_not()?;
        while self.peek_keyword("and") {
            self.pos += 1;
            let right = self.parse_not()?;
            left = FilterExpr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> ScimResult<FilterExpr> {
        if self.peek_keyword("not") {
            self.pos += 1;
            let operand = self.parse_primary()?;
            return Ok(FilterExpr::Not(Box::new(operand)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> ScimResult<FilterExpr> {
        match self.next() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(FilterExpr::Group(Box::new(inner))),
                    _ => Err(ScimError::invalid_filter("expected ')' in filter")),
                }
            }
            Some(Token::Word(word)) => self.parse_comparison(&word),
            _ => Err(ScimError::invalid_filter("expected filter expression")),
        }
    }

    fn parse_comparison(&mut self, path_text: &str) -> ScimResult<FilterExpr> {
        let path = path::parse_path(path_text)
            .map_err(|e| ScimError::with_detail(ScimErrorKind::InvalidFilter, e.detail))?;

        let op_word = match self.next() {
            Some(Token::Word(w)) => w,
            _ => {
                return Err(ScimError::invalid_filter(format!(
                    "expected operator after attribute: {path_text}"
                )));
            }
        };

        if op_word.eq_ignore_ascii_case("pr") {
            return Ok(FilterExpr::Present(path));
        }

        let op = CompareOp::parse(&op_word).ok_or_else(|| {
            ScimError::invalid_filter(format!("unknown operator: {op_word}"))
        })?;

        let value = match self.next() {
            Some(Token::Str(s)) => Value::String(s),
            Some(Token::Number(n)) => serde_json::Number::from_f64(n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("true") => Value::Bool(true),
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("false") => Value::Bool(false),
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("null") => Value::Null,
            _ => {
                return Err(ScimError::invalid_filter(format!(
                    "operator '{op_word}' requires a comparison value"
                )));
            }
        };

        Ok(FilterExpr::Compare { path, op, value })
    }
}

/// Evaluate a filter against a resource snapshot.
pub fn matches_filter(resource: &Value, filter: &FilterExpr) -> bool {
    match filter {
        FilterExpr::Compare { path, op, value } => {
            let resolved = path::resolve(resource, path);
            match op {
                CompareOp::Eq => resolved.map(|v| values_equal(v, value)).unwrap_or(false),
                CompareOp::Ne => resolved.map(|v| !values_equal(v, value)).unwrap_or(true),
                CompareOp::Co => string_pair(resolved, value)
                    .map(|(a, b)| a.contains(&b))
                    .unwrap_or(false),
                CompareOp::Sw => string_pair(resolved, value)
                    .map(|(a, b)| a.starts_with(&b))
                    .unwrap_or(false),
                CompareOp::Ew => string_pair(resolved, value)
                    .map(|(a, b)| a.ends_with(&b))
                    .unwrap_or(false),
                CompareOp::Gt => number_pair(resolved, value).map(|(a, b)| a > b).unwrap_or(false),
                CompareOp::Ge => number_pair(resolved, value).map(|(a, b)| a >= b).unwrap_or(false),
                CompareOp::Lt => number_pair(resolved, value).map(|(a, b)| a < b).unwrap_or(false),
                CompareOp::Le => number_pair(resolved, value).map(|(a, b)| a <= b).unwrap_or(false),
            }
        }
        FilterExpr::Present(attr) => path::resolve(resource, attr)
            .map(is_present)
            .unwrap_or(false),
        FilterExpr::And(left, right) => {
            matches_filter(resource, left) && matches_filter(resource, right)
        }
        FilterExpr::Or(left, right) => {
            matches_filter(resource, left) || matches_filter(resource, right)
        }
        FilterExpr::Not(inner) => !matches_filter(resource, inner),
        FilterExpr::Group(inner) => matches_filter(resource, inner),
    }
}

/// Equality with SCIM coercions: strings compare case-insensitively, a
/// boolean against a string literal coerces the string, numbers compare
/// numerically, everything else falls back to deep equality.
fn values_equal(actual: &Value, literal: &Value) -> bool {
    match (actual, literal) {
        (Value::String(a), Value::String(b)) => a.eq_ignore_ascii_case(b),
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Bool(a), Value::String(s)) => parse_bool(s).map(|b| *a == b).unwrap_or(false),
        (Value::String(s), Value::Bool(b)) => parse_bool(s).map(|a| a == *b).unwrap_or(false),
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
        _ => actual == literal,
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    if s.eq_ignore_ascii_case("true") {
        Some(true)
    } else if s.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn string_pair(resolved: Option<&Value>, literal: &Value) -> Option<(String, String)> {
    let a = resolved?.as_str()?;
    let b = literal.as_str()?;
    Some((a.to_lowercase(), b.to_lowercase()))
}

fn number_pair(resolved: Option<&Value>, literal: &Value) -> Option<(f64, f64)> {
    Some((as_number(resolved?)?, as_number(literal)?))
}

/// Numeric coercion: numbers directly, numeric strings parsed.
pub(crate) fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}

/// Presence per SCIM `pr`: set and not the type's zero value.
pub(crate) fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
