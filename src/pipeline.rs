//! The evaluation pipeline: read → macro-expand → compile → execute.
//!
//! Also implements `use`: a module named `m` resolves to `m.sbl` on
//! the VM's search path (the current directory plus any `SABLE_PATH`
//! entries the driver added) and is evaluated once per VM.

use crate::compiler;
use crate::error::Error;
use crate::expander;
use crate::reader;
use crate::symbol::{SymbolId, SymbolTable};
use crate::value::Value;
use crate::vm::VM;
use std::fs;
use std::path::PathBuf;

/// Evaluate a single already-read expression.
pub fn eval_value(
    vm: &mut VM,
    symbols: &mut SymbolTable,
    expr: &Value,
) -> Result<Value, Error> {
    let expanded = expander::macroexpand(symbols, vm, expr)?;
    let code = compiler::compile(symbols, &expanded)?;
    vm.execute(&code, symbols)
}

/// Evaluate every datum in the source text, returning the last value.
pub fn eval_str(vm: &mut VM, symbols: &mut SymbolTable, source: &str) -> Result<Value, Error> {
    let data = reader::read_all(source, symbols)?;
    let mut result = Value::Null;
    for expr in data {
        result = eval_value(vm, symbols, &expr)?;
    }
    Ok(result)
}

/// Load the module a `use` names, once per VM.
pub fn use_module(vm: &mut VM, symbols: &mut SymbolTable, sym: SymbolId) -> Result<(), Error> {
    if vm.is_module_loaded(sym) {
        return Ok(());
    }
    let name = symbols.name(sym).to_string();
    let path = find_module(vm, &name)
        .ok_or_else(|| Error::io(format!("Module not found: {}", name)))?;
    let source = fs::read_to_string(&path)
        .map_err(|err| Error::io(format!("Cannot read {}: {}", path.display(), err)))?;
    // mark before evaluating so circular uses terminate
    vm.mark_module_loaded(sym);
    eval_str(vm, symbols, &source)?;
    Ok(())
}

fn find_module(vm: &VM, name: &str) -> Option<PathBuf> {
    for dir in &vm.module_search_paths {
        let candidate = dir.join(format!("{}.sbl", name));
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}
