//! Evaluation of the data-only scripts the router serves instead of JSON.
//!
//! Only the statements these scripts actually contain are understood:
//!
//! - `var`/`let`/`const` declarations, optionally comma-separated
//! - `name = value;` and `name[index] = value;`
//! - `function name(...) { ... }` declarations (the body is skipped and the
//!   function becomes a no-op)
//! - calls to known functions as statements (arguments are evaluated and
//!   discarded)
//!
//! Anything else fails the evaluation. A [`ScriptContext`] is meant to be
//! created for a single payload and dropped afterwards.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracing::trace;

use crate::error::DecodeError;
use crate::literal::{EvalLimits, MAX_ARRAY_LEN, Parser, Token};

/// Global bindings and callable no-op functions of one evaluation.
#[derive(Debug, Default)]
pub struct ScriptContext {
    globals: HashMap<String, Value>,
    functions: HashSet<String>,
    limits: EvalLimits,
}

impl ScriptContext {
    /// Create an empty context.
    pub fn new(limits: EvalLimits) -> Self {
        Self {
            globals: HashMap::new(),
            functions: HashSet::new(),
            limits,
        }
    }

    /// Register a function that the script may call and that does nothing.
    pub fn with_stub(mut self, name: impl Into<String>) -> Self {
        self.functions.insert(name.into());
        self
    }

    /// Look up a global binding.
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Remove a global binding and return it.
    pub fn take_global(&mut self, name: &str) -> Option<Value> {
        self.globals.remove(name)
    }

    /// Evaluate a script, updating the global bindings.
    ///
    /// The step and time budget from [`EvalLimits`] applies to this call.
    pub fn eval(&mut self, src: &str) -> Result<(), DecodeError> {
        let mut parser = Parser::new(src, self.limits);
        let mut statements = 0usize;

        loop {
            match parser.next()? {
                Token::Eof => break,
                Token::Punct(';') => continue,
                Token::Ident(word) => match word.as_str() {
                    "var" | "let" | "const" => self.declaration(&mut parser)?,
                    "function" => self.function(&mut parser)?,
                    _ => self.assignment_or_call(&mut parser, word)?,
                },
                other => return Err(parser.unexpected(&other, "a statement")),
            }
            parser.eat_punct(';')?;
            statements += 1;
        }

        trace!(
            statements,
            globals = self.globals.len(),
            "Script evaluated"
        );
        Ok(())
    }

    fn declaration(&mut self, parser: &mut Parser<'_>) -> Result<(), DecodeError> {
        loop {
            let name = parser.expect_ident()?;
            if parser.eat_punct('=')? {
                let value = parser.parse_value(&self.globals)?;
                self.globals.insert(name, value);
            } else {
                self.globals.entry(name).or_insert(Value::Null);
            }

            if !parser.eat_punct(',')? {
                return Ok(());
            }
        }
    }

    fn function(&mut self, parser: &mut Parser<'_>) -> Result<(), DecodeError> {
        let name = parser.expect_ident()?;
        parser.expect_punct('(')?;
        while !parser.eat_punct(')')? {
            match parser.next()? {
                Token::Ident(_) | Token::Punct(',') => {}
                other => return Err(parser.unexpected(&other, "a parameter name")),
            }
        }
        parser.expect_punct('{')?;
        parser.skip_block()?;

        trace!(function = %name, "Declared no-op function");
        self.functions.insert(name);
        Ok(())
    }

    fn assignment_or_call(
        &mut self,
        parser: &mut Parser<'_>,
        name: String,
    ) -> Result<(), DecodeError> {
        if parser.eat_punct('(')? {
            if !self.functions.contains(&name) {
                return Err(DecodeError::structure(format!(
                    "call to undefined function '{}'",
                    name
                )));
            }
            parser.parse_arguments(&self.globals)?;
            return Ok(());
        }

        if parser.eat_punct('[')? {
            let index = parser.parse_value(&self.globals)?;
            parser.expect_punct(']')?;
            parser.expect_punct('=')?;
            let value = parser.parse_value(&self.globals)?;
            return self.assign_index(parser, &name, index, value);
        }

        parser.expect_punct('=')?;
        let value = parser.parse_value(&self.globals)?;
        self.globals.insert(name, value);
        Ok(())
    }

    fn assign_index(
        &mut self,
        parser: &mut Parser<'_>,
        name: &str,
        index: Value,
        value: Value,
    ) -> Result<(), DecodeError> {
        let target = self.globals.get_mut(name).ok_or_else(|| {
            DecodeError::structure(format!("assignment to undefined variable '{}'", name))
        })?;

        match (target, index) {
            (Value::Array(items), Value::Number(n)) => {
                let index = n.as_u64().ok_or_else(|| {
                    DecodeError::format(format!("invalid array index {} for '{}'", n, name))
                })?;
                let slot = usize::try_from(index)
                    .ok()
                    .filter(|slot| *slot < MAX_ARRAY_LEN)
                    .ok_or_else(|| {
                        DecodeError::format(format!(
                            "array index {} out of range for '{}'",
                            index, name
                        ))
                    })?;
                if slot >= items.len() {
                    parser.charge((slot - items.len() + 1) as u64)?;
                    items.resize(slot + 1, Value::Null);
                }
                items[slot] = value;
            }
            (Value::Object(fields), Value::String(key)) => {
                fields.insert(key, value);
            }
            (Value::Object(fields), Value::Number(key)) => {
                fields.insert(key.to_string(), value);
            }
            _ => {
                return Err(DecodeError::structure(format!(
                    "unsupported indexed assignment to '{}'",
                    name
                )));
            }
        }

        Ok(())
    }
}
