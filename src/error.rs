//! The error type shared by every stage of the pipeline.
//!
//! All failures are categorized by a keyword drawn from a fixed set
//! (`error:`, `argument-error:`, `syntax-error:`, `macro-error:`,
//! `io-error:`, `http-error:`, `interrupt:`) and carry a payload of
//! detail values. Evaluation-time errors gain an `[in name]` suffix
//! naming the closure they surfaced from.

use crate::symbol::{wk, SymbolId};
use crate::value::Value;
use std::fmt;

#[derive(Debug, Clone)]
pub struct Error {
    /// Keyword categorizing the error.
    pub key: SymbolId,
    /// Detail values; the first is usually a rendered message string.
    pub data: Vec<Value>,
    /// Name of the code object the error surfaced from, if any.
    pub context: Option<String>,
}

impl Error {
    pub fn new(key: SymbolId, message: impl Into<String>) -> Error {
        Error {
            key,
            data: vec![Value::string(message.into())],
            context: None,
        }
    }

    pub fn with_data(key: SymbolId, data: Vec<Value>) -> Error {
        Error {
            key,
            data,
            context: None,
        }
    }

    pub fn generic(message: impl Into<String>) -> Error {
        Error::new(wk::ERROR, message)
    }

    pub fn argument(message: impl Into<String>) -> Error {
        Error::new(wk::ARGUMENT_ERROR, message)
    }

    pub fn syntax(message: impl Into<String>) -> Error {
        Error::new(wk::SYNTAX_ERROR, message)
    }

    pub fn macro_error(message: impl Into<String>) -> Error {
        Error::new(wk::MACRO_ERROR, message)
    }

    pub fn io(message: impl Into<String>) -> Error {
        Error::new(wk::IO_ERROR, message)
    }

    pub fn interrupt() -> Error {
        Error::new(wk::INTERRUPT, "Interrupt")
    }

    /// Wrong number of arguments to `name` (expected `expected`, got
    /// `got`).
    pub fn argc(name: &str, expected: &str, got: usize) -> Error {
        Error::argument(format!(
            "Wrong number of arguments to {} (expected {}, got {})",
            name, expected, got
        ))
    }

    /// Argument `num` is not of the expected type.
    pub fn arg_type(expected: &str, num: usize) -> Error {
        Error::argument(format!(
            "Argument {} is not of type <{}>",
            num, expected
        ))
    }

    /// Attach the name of the enclosing code object. The innermost
    /// name wins; outer frames do not overwrite it.
    pub fn in_function(mut self, name: &str) -> Error {
        if self.context.is_none() && !name.is_empty() {
            self.context = Some(name.to_string());
        }
        self
    }

    pub fn is_interrupt(&self) -> bool {
        self.key == wk::INTERRUPT
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = wk::error_key_text(self.key).unwrap_or("error:");
        write!(f, "{}", key)?;
        for value in &self.data {
            match value {
                Value::String(s) => write!(f, " {}", s)?,
                other => write!(f, " {:?}", other)?,
            }
        }
        if let Some(context) = &self.context {
            write!(f, " [in {}]", context)?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}
