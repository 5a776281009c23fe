//! Shared test harness.

use sable::{register_primitives, Error, SymbolTable, Value, VM};

/// Stateful eval that preserves the symbol table and globals across
/// calls (needed for macros and definitions).
pub struct Interp {
    pub vm: VM,
    pub symbols: SymbolTable,
}

impl Interp {
    pub fn new() -> Self {
        let mut vm = VM::new();
        let mut symbols = SymbolTable::new();
        register_primitives(&mut vm, &mut symbols);
        Interp { vm, symbols }
    }

    pub fn eval(&mut self, input: &str) -> Result<Value, Error> {
        sable::eval_str(&mut self.vm, &mut self.symbols, input)
    }

    /// Evaluate, panicking on error.
    pub fn eval_ok(&mut self, input: &str) -> Value {
        match self.eval(input) {
            Ok(value) => value,
            Err(err) => panic!("eval of {:?} failed: {}", input, err),
        }
    }

    /// Evaluate and render the result canonically.
    pub fn eval_to_string(&mut self, input: &str) -> String {
        let value = self.eval_ok(input);
        sable::writer::write(&value, &self.symbols)
    }
}

impl Default for Interp {
    fn default() -> Self {
        Self::new()
    }
}
