//! # Sable - a Scheme-family Lisp interpreter
//!
//! Sable evaluates s-expressions through a four-stage pipeline:
//!
//! 1. **Reader** - parse s-expressions from text
//! 2. **Expander** - rewrite surface forms into a small core language
//! 3. **Compiler** - single-pass emit into stack bytecode with
//!    lexical addressing
//! 4. **VM** - a stack-based interpreter with heap-allocated call
//!    frames and proper tail calls
//!
//! ## Quick Start
//!
//! ```
//! use sable::{eval_str, register_primitives, SymbolTable, VM};
//!
//! let mut vm = VM::new();
//! let mut symbols = SymbolTable::new();
//! register_primitives(&mut vm, &mut symbols);
//!
//! let result = eval_str(&mut vm, &mut symbols, "(+ 1 2 3)").unwrap();
//! assert_eq!(result, sable::Value::number(6.0));
//! ```

pub mod compiler;
pub mod error;
pub mod expander;
pub mod pipeline;
pub mod primitives;
pub mod reader;
pub mod repl;
pub mod symbol;
pub mod value;
pub mod vm;
pub mod writer;

pub use compiler::{compile, Code, Opcode};
pub use error::Error;
pub use expander::macroexpand;
pub use pipeline::{eval_str, eval_value};
pub use primitives::register_primitives;
pub use reader::{read_all, read_str};
pub use symbol::{SymbolId, SymbolTable};
pub use value::Value;
pub use vm::VM;
