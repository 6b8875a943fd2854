//! Token-level parser for the values inside the router's device script.
//!
//! Standalone quoted arrays (the WAN document) go through `json5`; this
//! parser exists for what a JSON5 reader cannot see: values embedded in
//! statements, array elisions, `new Array(...)` and references to
//! already-bound variables. Every token consumed is charged against an
//! [`EvalLimits`] budget so a corrupt payload cannot run unbounded.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use serde_json::{Map, Number, Value};

use crate::error::DecodeError;

/// Maximum nesting of arrays, objects and argument lists.
pub const MAX_DEPTH: usize = 64;

/// Largest array a script may create, by `new Array(n)` or by index
/// assignment.
pub const MAX_ARRAY_LEN: usize = 1 << 24;

/// Bounds applied to a single parse or script evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalLimits {
    /// Maximum number of tokens (and allocated array slots) processed.
    pub max_steps: u64,
    /// Wall-clock budget for the whole evaluation.
    pub max_duration: Duration,
}

impl Default for EvalLimits {
    fn default() -> Self {
        Self {
            max_steps: 1_000_000,
            max_duration: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Ident(String),
    Str(String),
    Num(Number),
    Punct(char),
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(name) => write!(f, "identifier '{}'", name),
            Token::Str(_) => write!(f, "string"),
            Token::Num(n) => write!(f, "number {}", n),
            Token::Punct(c) => write!(f, "'{}'", c),
            Token::Eof => write!(f, "end of input"),
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn peek_char(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_char_at(&self, n: usize) -> Option<char> {
        self.src[self.pos..].chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_trivia(&mut self) -> Result<(), DecodeError> {
        loop {
            match self.peek_char() {
                Some(c) if c.is_whitespace() || c == '\u{feff}' => {
                    self.bump();
                }
                Some('/') if self.peek_char_at(1) == Some('/') => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                Some('/') if self.peek_char_at(1) == Some('*') => {
                    let start = self.pos;
                    self.pos += 2;
                    match self.src[self.pos..].find("*/") {
                        Some(end) => self.pos += end + 2,
                        None => {
                            return Err(DecodeError::format(format!(
                                "unterminated comment at offset {}",
                                start
                            )));
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, DecodeError> {
        self.skip_trivia()?;
        let start = self.pos;

        let Some(c) = self.peek_char() else {
            return Ok(Token::Eof);
        };

        match c {
            '\'' | '"' => self.string(c),
            c if c.is_ascii_digit() => self.number(),
            '.' if self.peek_char_at(1).is_some_and(|d| d.is_ascii_digit()) => self.number(),
            c if is_ident_start(c) => {
                while self.peek_char().is_some_and(is_ident_continue) {
                    self.bump();
                }
                Ok(Token::Ident(self.src[start..self.pos].to_string()))
            }
            c => {
                self.bump();
                Ok(Token::Punct(c))
            }
        }
    }

    fn string(&mut self, quote: char) -> Result<Token, DecodeError> {
        let start = self.pos;
        self.bump();
        let mut out = String::new();

        loop {
            let unterminated =
                || DecodeError::format(format!("unterminated string at offset {}", start));

            match self.bump().ok_or_else(unterminated)? {
                c if c == quote => return Ok(Token::Str(out)),
                '\\' => self.escape(&mut out, start)?,
                '\n' | '\r' => return Err(unterminated()),
                c => out.push(c),
            }
        }
    }

    fn escape(&mut self, out: &mut String, start: usize) -> Result<(), DecodeError> {
        let c = self.bump().ok_or_else(|| {
            DecodeError::format(format!("unterminated string at offset {}", start))
        })?;

        match c {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' => out.push('\0'),
            'x' => {
                let code = self.hex_digits(2, start)?;
                out.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
            }
            'u' => {
                let high = self.hex_digits(4, start)?;
                let mut decoded = char::from_u32(high);

                // Surrogate pair written as two consecutive escapes
                if (0xD800..0xDC00).contains(&high) && self.src[self.pos..].starts_with("\\u") {
                    let save = self.pos;
                    self.pos += 2;
                    let low = self.hex_digits(4, start)?;
                    if (0xDC00..0xE000).contains(&low) {
                        decoded = char::from_u32(0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00));
                    } else {
                        self.pos = save;
                    }
                }

                out.push(decoded.unwrap_or(char::REPLACEMENT_CHARACTER));
            }
            // Line continuation
            '\r' => {
                if self.peek_char() == Some('\n') {
                    self.bump();
                }
            }
            '\n' => {}
            other => out.push(other),
        }

        Ok(())
    }

    fn hex_digits(&mut self, count: usize, start: usize) -> Result<u32, DecodeError> {
        let invalid = || DecodeError::format(format!("invalid escape in string at offset {}", start));

        let end = self.pos + count;
        let digits = self
            .src
            .get(self.pos..end)
            .filter(|d| d.chars().all(|c| c.is_ascii_hexdigit()))
            .ok_or_else(invalid)?;
        let code = u32::from_str_radix(digits, 16).map_err(|_| invalid())?;
        self.pos = end;
        Ok(code)
    }

    fn number(&mut self) -> Result<Token, DecodeError> {
        let start = self.pos;

        while self
            .peek_char()
            .is_some_and(|c| c.is_ascii_digit() || c == '.')
        {
            self.bump();
        }
        if matches!(self.peek_char(), Some('e' | 'E')) {
            self.bump();
            if matches!(self.peek_char(), Some('+' | '-')) {
                self.bump();
            }
            while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }

        number_from_str(&self.src[start..self.pos]).map(Token::Num)
    }
}

fn number_from_str(text: &str) -> Result<Number, DecodeError> {
    if text.bytes().all(|b| b.is_ascii_digit())
        && let Ok(value) = text.parse::<u64>()
    {
        return Ok(value.into());
    }

    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .ok_or_else(|| DecodeError::format(format!("invalid number literal '{}'", text)))
}

fn negate(n: &Number) -> Result<Number, DecodeError> {
    if let Some(value) = n.as_u64()
        && let Ok(value) = i64::try_from(value)
    {
        return Ok((-value).into());
    }

    n.as_f64()
        .and_then(|value| Number::from_f64(-value))
        .ok_or_else(|| DecodeError::format(format!("cannot negate {}", n)))
}

struct Budget {
    used: u64,
    next_clock_check: u64,
    max_steps: u64,
    deadline: Option<Instant>,
}

impl Budget {
    const CLOCK_INTERVAL: u64 = 256;

    fn new(limits: EvalLimits) -> Self {
        Self {
            used: 0,
            next_clock_check: Self::CLOCK_INTERVAL,
            max_steps: limits.max_steps,
            deadline: Instant::now().checked_add(limits.max_duration),
        }
    }

    fn charge(&mut self, steps: u64) -> Result<(), DecodeError> {
        self.used = self.used.saturating_add(steps);
        if self.used > self.max_steps {
            return Err(DecodeError::timeout(format!(
                "exceeded {} evaluation steps",
                self.max_steps
            )));
        }

        if self.used >= self.next_clock_check {
            self.next_clock_check = self.used.saturating_add(Self::CLOCK_INTERVAL);
            if let Some(deadline) = self.deadline
                && Instant::now() > deadline
            {
                return Err(DecodeError::timeout(format!(
                    "evaluation ran past its deadline after {} steps",
                    self.used
                )));
            }
        }

        Ok(())
    }
}

/// Token-level parser driven by the script evaluator.
pub(crate) struct Parser<'a> {
    lexer: Lexer<'a>,
    peeked: Option<Token>,
    budget: Budget,
    depth: usize,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(src: &'a str, limits: EvalLimits) -> Self {
        Self {
            lexer: Lexer { src, pos: 0 },
            peeked: None,
            budget: Budget::new(limits),
            depth: 0,
        }
    }

    /// Charge extra steps, e.g. for preallocated array slots.
    pub(crate) fn charge(&mut self, steps: u64) -> Result<(), DecodeError> {
        self.budget.charge(steps)
    }

    fn fetch(&mut self) -> Result<Token, DecodeError> {
        self.budget.charge(1)?;
        self.lexer.next_token()
    }

    pub(crate) fn peek(&mut self) -> Result<&Token, DecodeError> {
        if self.peeked.is_none() {
            let token = self.fetch()?;
            self.peeked = Some(token);
        }
        Ok(self.peeked.get_or_insert(Token::Eof))
    }

    pub(crate) fn next(&mut self) -> Result<Token, DecodeError> {
        match self.peeked.take() {
            Some(token) => Ok(token),
            None => self.fetch(),
        }
    }

    pub(crate) fn eat_punct(&mut self, c: char) -> Result<bool, DecodeError> {
        let hit = matches!(self.peek()?, Token::Punct(p) if *p == c);
        if hit {
            self.peeked = None;
        }
        Ok(hit)
    }

    pub(crate) fn expect_punct(&mut self, c: char) -> Result<(), DecodeError> {
        match self.next()? {
            Token::Punct(p) if p == c => Ok(()),
            other => Err(self.unexpected(&other, &format!("'{}'", c))),
        }
    }

    pub(crate) fn expect_ident(&mut self) -> Result<String, DecodeError> {
        match self.next()? {
            Token::Ident(name) => Ok(name),
            other => Err(self.unexpected(&other, "an identifier")),
        }
    }

    pub(crate) fn unexpected(&self, token: &Token, expected: &str) -> DecodeError {
        DecodeError::format(format!(
            "unexpected {} near offset {}, expected {}",
            token, self.lexer.pos, expected
        ))
    }

    fn enter(&mut self) -> Result<(), DecodeError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(DecodeError::format(format!(
                "nesting deeper than {} levels",
                MAX_DEPTH
            )));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Parse one value, resolving bare identifiers against `scope`.
    pub(crate) fn parse_value(
        &mut self,
        scope: &HashMap<String, Value>,
    ) -> Result<Value, DecodeError> {
        match self.next()? {
            Token::Str(s) => Ok(Value::String(s)),
            Token::Num(n) => Ok(Value::Number(n)),
            Token::Punct(sign @ ('-' | '+')) => match self.next()? {
                Token::Num(n) if sign == '-' => Ok(Value::Number(negate(&n)?)),
                Token::Num(n) => Ok(Value::Number(n)),
                other => Err(self.unexpected(&other, "a number")),
            },
            Token::Punct('[') => self.parse_array(scope),
            Token::Punct('{') => self.parse_object(scope),
            Token::Ident(ident) => match ident.as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                "null" | "undefined" => Ok(Value::Null),
                "new" => self.parse_constructor(scope),
                name => scope.get(name).cloned().ok_or_else(|| {
                    DecodeError::structure(format!("reference to undefined variable '{}'", name))
                }),
            },
            other => Err(self.unexpected(&other, "a value")),
        }
    }

    fn parse_array(&mut self, scope: &HashMap<String, Value>) -> Result<Value, DecodeError> {
        self.enter()?;
        let mut items = Vec::new();

        loop {
            if self.eat_punct(']')? {
                break;
            }
            // Elided element: `[a,,b]`
            if self.eat_punct(',')? {
                items.push(Value::Null);
                continue;
            }
            items.push(self.parse_value(scope)?);
            if self.eat_punct(',')? {
                continue;
            }
            self.expect_punct(']')?;
            break;
        }

        self.leave();
        Ok(Value::Array(items))
    }

    fn parse_object(&mut self, scope: &HashMap<String, Value>) -> Result<Value, DecodeError> {
        self.enter()?;
        let mut fields = Map::new();

        loop {
            if self.eat_punct('}')? {
                break;
            }
            let key = match self.next()? {
                Token::Ident(key) | Token::Str(key) => key,
                Token::Num(n) => n.to_string(),
                other => return Err(self.unexpected(&other, "an object key")),
            };
            self.expect_punct(':')?;
            let value = self.parse_value(scope)?;
            fields.insert(key, value);

            if self.eat_punct(',')? {
                continue;
            }
            self.expect_punct('}')?;
            break;
        }

        self.leave();
        Ok(Value::Object(fields))
    }

    fn parse_constructor(&mut self, scope: &HashMap<String, Value>) -> Result<Value, DecodeError> {
        let name = self.expect_ident()?;
        let args = if self.eat_punct('(')? {
            self.parse_arguments(scope)?
        } else {
            Vec::new()
        };

        match (name.as_str(), args.as_slice()) {
            ("Array", [Value::Number(len)]) => {
                let len = len
                    .as_u64()
                    .and_then(|n| usize::try_from(n).ok())
                    .filter(|n| *n <= MAX_ARRAY_LEN)
                    .ok_or_else(|| DecodeError::format(format!("invalid array length {}", len)))?;
                self.charge(len as u64)?;
                Ok(Value::Array(vec![Value::Null; len]))
            }
            ("Array", _) => Ok(Value::Array(args)),
            ("Object", []) => Ok(Value::Object(Map::new())),
            (other, _) => Err(DecodeError::structure(format!(
                "unsupported constructor '{}'",
                other
            ))),
        }
    }

    /// Parse a call argument list. The opening `(` must already be consumed.
    pub(crate) fn parse_arguments(
        &mut self,
        scope: &HashMap<String, Value>,
    ) -> Result<Vec<Value>, DecodeError> {
        self.enter()?;
        let mut args = Vec::new();

        while !self.eat_punct(')')? {
            args.push(self.parse_value(scope)?);
            if self.eat_punct(',')? {
                continue;
            }
            self.expect_punct(')')?;
            break;
        }

        self.leave();
        Ok(args)
    }

    /// Skip a brace-delimited block. The opening `{` must already be consumed.
    pub(crate) fn skip_block(&mut self) -> Result<(), DecodeError> {
        let mut open = 1usize;
        while open > 0 {
            match self.next()? {
                Token::Punct('{') => open += 1,
                Token::Punct('}') => open -= 1,
                Token::Eof => {
                    return Err(DecodeError::format("unterminated block"));
                }
                _ => {}
            }
        }
        Ok(())
    }
}
