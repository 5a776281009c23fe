//! The stack-based bytecode virtual machine.
//!
//! Executes a `Code` object against a fixed-size operand stack that
//! grows downward: `sp` starts at the top and decrements on push.
//! Calls build heap-allocated frames; tail calls build a frame whose
//! `previous` is the current frame's previous, so self-recursion in
//! tail position runs in constant frame count. `apply` splices its
//! list argument onto the stack and re-dispatches in an inner loop,
//! never by recursion.

pub mod frame;

use crate::compiler::code::{Code, Opcode};
use crate::error::Error;
use crate::symbol::{SymbolId, SymbolTable};
use crate::value::{new_struct, struct_get, Function, Value};
use frame::{build_frame, Frame};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const DEFAULT_STACK_SIZE: usize = 1000;

pub struct VM {
    pub globals: FxHashMap<SymbolId, Value>,
    pub stack_size: usize,
    /// Instrumented execution: one trace event per instruction.
    pub trace: bool,
    pub module_search_paths: Vec<PathBuf>,
    loaded_modules: FxHashSet<SymbolId>,
    interrupt: Arc<AtomicBool>,
}

impl VM {
    pub fn new() -> Self {
        VM::with_stack_size(DEFAULT_STACK_SIZE)
    }

    pub fn with_stack_size(stack_size: usize) -> Self {
        VM {
            globals: FxHashMap::default(),
            stack_size,
            trace: false,
            module_search_paths: vec![PathBuf::from(".")],
            loaded_modules: FxHashSet::default(),
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn def_global(&mut self, sym: SymbolId, value: Value) {
        self.globals.insert(sym, value);
    }

    pub fn get_global(&self, sym: SymbolId) -> Option<&Value> {
        self.globals.get(&sym)
    }

    pub fn undef_global(&mut self, sym: SymbolId) {
        self.globals.remove(&sym);
    }

    /// The host-owned interrupt flag; set it (e.g. from a signal
    /// handler) to abort the current evaluation.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        self.interrupt.clone()
    }

    fn check_interrupt(&self) -> bool {
        self.interrupt.swap(false, Ordering::Relaxed)
    }

    pub fn add_module_search_path(&mut self, path: PathBuf) {
        self.module_search_paths.push(path);
    }

    pub fn is_module_loaded(&self, sym: SymbolId) -> bool {
        self.loaded_modules.contains(&sym)
    }

    pub fn mark_module_loaded(&mut self, sym: SymbolId) {
        self.loaded_modules.insert(sym);
    }

    /// Execute a code object to completion.
    pub fn execute(&mut self, code: &Rc<Code>, symbols: &mut SymbolTable) -> Result<Value, Error> {
        self.run(code.clone(), Frame::root(&[]), symbols)
    }

    /// Call a closure with arguments, as macro expansion does.
    pub fn exec_closure(
        &mut self,
        closure: &crate::value::Closure,
        args: &[Value],
        symbols: &mut SymbolTable,
    ) -> Result<Value, Error> {
        let frame = build_frame(None, None, closure, args, symbols)?;
        self.run(closure.code.clone(), frame, symbols)
    }

    fn run(
        &mut self,
        code: Rc<Code>,
        env: Rc<Frame>,
        symbols: &mut SymbolTable,
    ) -> Result<Value, Error> {
        let mut stack: Vec<Value> = vec![Value::Null; self.stack_size];
        let mut sp = self.stack_size;
        let mut code = code;
        let mut env = env;
        let mut pc = 0usize;
        if code.ops.is_empty() {
            return Err(Error::generic("No code to execute"));
        }
        loop {
            let op = match Opcode::from_i32(code.ops[pc]) {
                Some(op) => op,
                None => {
                    return Err(add_context(
                        &env,
                        Error::generic(format!("Bad instruction: {}", code.ops[pc])),
                    ))
                }
            };
            if self.trace {
                trace_instruction(pc, op, &code, &stack, sp, symbols);
            }
            match op {
                Opcode::Literal => {
                    sp -= 1;
                    stack[sp] = code.constants[code.ops[pc + 1] as usize].clone();
                    pc += 2;
                }
                Opcode::Local => {
                    let i = code.ops[pc + 1] as usize;
                    let j = code.ops[pc + 2] as usize;
                    sp -= 1;
                    stack[sp] = Frame::lookup(&env, i, j);
                    pc += 3;
                }
                Opcode::SetLocal => {
                    let i = code.ops[pc + 1] as usize;
                    let j = code.ops[pc + 2] as usize;
                    Frame::assign(&env, i, j, stack[sp].clone());
                    pc += 3;
                }
                Opcode::Global => {
                    let sym = constant_symbol(&code, pc + 1);
                    match self.globals.get(&sym) {
                        Some(value) => {
                            sp -= 1;
                            stack[sp] = value.clone();
                            pc += 2;
                        }
                        None => {
                            return Err(add_context(
                                &env,
                                Error::generic(format!(
                                    "Undefined symbol: {}",
                                    symbols.name(sym)
                                )),
                            ))
                        }
                    }
                }
                Opcode::DefGlobal => {
                    let sym = constant_symbol(&code, pc + 1);
                    self.globals.insert(sym, stack[sp].clone());
                    pc += 2;
                }
                Opcode::SetGlobal => {
                    let sym = constant_symbol(&code, pc + 1);
                    if !self.globals.contains_key(&sym) {
                        return Err(add_context(
                            &env,
                            Error::generic(format!("Undefined symbol: {}", symbols.name(sym))),
                        ));
                    }
                    self.globals.insert(sym, stack[sp].clone());
                    pc += 2;
                }
                Opcode::UndefGlobal => {
                    let sym = constant_symbol(&code, pc + 1);
                    self.globals.remove(&sym);
                    pc += 2;
                }
                Opcode::DefMacro => {
                    let sym = constant_symbol(&code, pc + 1);
                    symbols.def_macro(sym, stack[sp].clone());
                    stack[sp] = Value::Symbol(sym);
                    pc += 2;
                }
                Opcode::Use => {
                    let sym = constant_symbol(&code, pc + 1);
                    crate::pipeline::use_module(self, symbols, sym)
                        .map_err(|err| add_context(&env, err))?;
                    sp -= 1;
                    stack[sp] = Value::Symbol(sym);
                    pc += 2;
                }
                Opcode::Pop => {
                    sp += 1;
                    pc += 1;
                }
                Opcode::Jump => {
                    pc = (pc as i64 + code.ops[pc + 1] as i64) as usize;
                }
                Opcode::JumpFalse => {
                    let condition = stack[sp].clone();
                    sp += 1;
                    if condition.is_false() {
                        pc = (pc as i64 + code.ops[pc + 1] as i64) as usize;
                    } else {
                        pc += 2;
                    }
                }
                Opcode::Vector => {
                    let n = code.ops[pc + 1] as usize;
                    let elements = stack[sp..sp + n].to_vec();
                    sp = sp + n - 1;
                    stack[sp] = Value::vector(elements);
                    pc += 2;
                }
                Opcode::Struct => {
                    let n = code.ops[pc + 1] as usize;
                    let elements = stack[sp..sp + n].to_vec();
                    let value = new_struct(symbols, &elements)
                        .map_err(|err| add_context(&env, err))?;
                    sp = sp + n - 1;
                    stack[sp] = value;
                    pc += 2;
                }
                Opcode::Closure => {
                    let child = match &code.constants[code.ops[pc + 1] as usize] {
                        Value::Code(child) => child.clone(),
                        other => {
                            return Err(add_context(
                                &env,
                                Error::generic(format!(
                                    "Bad closure constant: {:?}",
                                    other
                                )),
                            ))
                        }
                    };
                    sp -= 1;
                    stack[sp] = Value::closure(child, env.clone());
                    pc += 2;
                }
                Opcode::Return => {
                    if self.check_interrupt() {
                        return Err(add_context(&env, Error::interrupt()));
                    }
                    match &env.previous {
                        None => return Ok(stack[sp].clone()),
                        Some(previous) => {
                            let (resume_code, resume_pc) =
                                env.resume.clone().expect("frame with caller lacks resume");
                            let previous = previous.clone();
                            code = resume_code;
                            pc = resume_pc;
                            env = previous;
                        }
                    }
                }
                Opcode::Call => {
                    let mut fun = stack[sp].clone();
                    sp += 1;
                    let mut argc = code.ops[pc + 1] as usize;
                    let saved_pc = pc + 2;
                    loop {
                        match fun {
                            Value::Function(Function::Primitive(ref prim)) => {
                                let result = (prim.fun)(symbols, &stack[sp..sp + argc])
                                    .map_err(|err| add_context(&env, err))?;
                                sp = sp + argc - 1;
                                stack[sp] = result;
                                pc = saved_pc;
                                break;
                            }
                            Value::Function(Function::Closure(ref closure)) => {
                                if self.check_interrupt() {
                                    return Err(add_context(&env, Error::interrupt()));
                                }
                                let frame = build_frame(
                                    Some(env.clone()),
                                    Some((code.clone(), saved_pc)),
                                    closure,
                                    &stack[sp..sp + argc],
                                    symbols,
                                )
                                .map_err(|err| add_context(&env, err))?;
                                sp += argc;
                                code = closure.code.clone();
                                env = frame;
                                pc = 0;
                                break;
                            }
                            Value::Function(Function::Apply) => {
                                let (spliced_fun, spliced_argc) =
                                    splice_apply(&mut stack, &mut sp, argc)
                                        .map_err(|err| add_context(&env, err))?;
                                fun = spliced_fun;
                                argc = spliced_argc;
                                continue;
                            }
                            Value::Function(Function::CallCC) => {
                                return Err(add_context(
                                    &env,
                                    Error::generic("call/cc is not supported"),
                                ))
                            }
                            Value::Keyword(id) => {
                                if argc != 1 {
                                    return Err(add_context(
                                        &env,
                                        Error::argc(symbols.name(id), "1", argc),
                                    ));
                                }
                                let arg = stack[sp].clone();
                                let value = struct_get(symbols, &arg, &Value::Keyword(id))
                                    .map_err(|err| add_context(&env, err))?;
                                stack[sp] = value;
                                pc = saved_pc;
                                break;
                            }
                            ref other => {
                                return Err(add_context(
                                    &env,
                                    Error::generic(format!(
                                        "Not a function: {}",
                                        crate::writer::write(other, symbols)
                                    )),
                                ))
                            }
                        }
                    }
                }
                Opcode::TailCall => {
                    if self.check_interrupt() {
                        return Err(add_context(&env, Error::interrupt()));
                    }
                    let mut fun = stack[sp].clone();
                    sp += 1;
                    let mut argc = code.ops[pc + 1] as usize;
                    loop {
                        match fun {
                            Value::Function(Function::Primitive(ref prim)) => {
                                let result = (prim.fun)(symbols, &stack[sp..sp + argc])
                                    .map_err(|err| add_context(&env, err))?;
                                sp = sp + argc - 1;
                                stack[sp] = result;
                                match &env.previous {
                                    None => return Ok(stack[sp].clone()),
                                    Some(previous) => {
                                        let (resume_code, resume_pc) = env
                                            .resume
                                            .clone()
                                            .expect("frame with caller lacks resume");
                                        let previous = previous.clone();
                                        code = resume_code;
                                        pc = resume_pc;
                                        env = previous;
                                    }
                                }
                                break;
                            }
                            Value::Function(Function::Closure(ref closure)) => {
                                // reuse the current frame's return linkage
                                let frame = build_frame(
                                    env.previous.clone(),
                                    env.resume.clone(),
                                    closure,
                                    &stack[sp..sp + argc],
                                    symbols,
                                )
                                .map_err(|err| add_context(&env, err))?;
                                sp += argc;
                                code = closure.code.clone();
                                env = frame;
                                pc = 0;
                                break;
                            }
                            Value::Function(Function::Apply) => {
                                let (spliced_fun, spliced_argc) =
                                    splice_apply(&mut stack, &mut sp, argc)
                                        .map_err(|err| add_context(&env, err))?;
                                fun = spliced_fun;
                                argc = spliced_argc;
                                continue;
                            }
                            Value::Function(Function::CallCC) => {
                                return Err(add_context(
                                    &env,
                                    Error::generic("call/cc is not supported"),
                                ))
                            }
                            Value::Keyword(id) => {
                                if argc != 1 {
                                    return Err(add_context(
                                        &env,
                                        Error::argc(symbols.name(id), "1", argc),
                                    ));
                                }
                                let arg = stack[sp].clone();
                                let value = struct_get(symbols, &arg, &Value::Keyword(id))
                                    .map_err(|err| add_context(&env, err))?;
                                stack[sp] = value;
                                match &env.previous {
                                    None => return Ok(stack[sp].clone()),
                                    Some(previous) => {
                                        let (resume_code, resume_pc) = env
                                            .resume
                                            .clone()
                                            .expect("frame with caller lacks resume");
                                        let previous = previous.clone();
                                        code = resume_code;
                                        pc = resume_pc;
                                        env = previous;
                                    }
                                }
                                break;
                            }
                            ref other => {
                                return Err(add_context(
                                    &env,
                                    Error::generic(format!(
                                        "Not a function: {}",
                                        crate::writer::write(other, symbols)
                                    )),
                                ))
                            }
                        }
                    }
                }
            }
        }
    }
}

impl Default for VM {
    fn default() -> Self {
        Self::new()
    }
}

/// Splice an `apply` call: `(f a₁ … aₖ list)` becomes a direct call
/// to `f` with the list's elements appended to the explicit
/// arguments. Returns `f` and the new argc.
fn splice_apply(
    stack: &mut [Value],
    sp: &mut usize,
    argc: usize,
) -> Result<(Value, usize), Error> {
    if argc < 2 {
        return Err(Error::argc("apply", "2+", argc));
    }
    let fun = stack[*sp].clone();
    let list_arg = stack[*sp + argc - 1].clone();
    if !list_arg.is_list() {
        return Err(Error::arg_type("list", argc));
    }
    let mut spliced: SmallVec<[Value; 16]> = SmallVec::new();
    for i in 1..argc - 1 {
        spliced.push(stack[*sp + i].clone());
    }
    let mut tail = list_arg;
    while let Value::Pair(p) = tail {
        spliced.push(p.car.clone());
        tail = p.cdr.clone();
    }
    *sp += argc;
    let new_argc = spliced.len();
    *sp -= new_argc;
    for (i, value) in spliced.iter().enumerate() {
        stack[*sp + i] = value.clone();
    }
    Ok((fun, new_argc))
}

fn constant_symbol(code: &Code, operand_at: usize) -> SymbolId {
    match &code.constants[code.ops[operand_at] as usize] {
        Value::Symbol(id) => *id,
        other => panic!("expected symbol constant, got {:?}", other),
    }
}

fn add_context(env: &Frame, err: Error) -> Error {
    err.in_function(env.context_name())
}

/// One `(pc, op, args, stack)` line per instruction when tracing.
fn trace_instruction(
    pc: usize,
    op: Opcode,
    code: &Code,
    stack: &[Value],
    sp: usize,
    symbols: &SymbolTable,
) {
    let args = match op {
        Opcode::Literal
        | Opcode::Global
        | Opcode::DefGlobal
        | Opcode::SetGlobal
        | Opcode::UndefGlobal
        | Opcode::DefMacro
        | Opcode::Use
        | Opcode::Closure => crate::writer::write(
            &code.constants[code.ops[pc + 1] as usize],
            symbols,
        ),
        Opcode::Local | Opcode::SetLocal => {
            format!("{}, {}", code.ops[pc + 1], code.ops[pc + 2])
        }
        Opcode::Jump
        | Opcode::JumpFalse
        | Opcode::Call
        | Opcode::TailCall
        | Opcode::Vector
        | Opcode::Struct => format!("{}", code.ops[pc + 1]),
        Opcode::Return | Opcode::Pop => String::new(),
    };
    let mut shown = String::from("[");
    for value in &stack[sp..] {
        shown.push(' ');
        shown.push_str(&crate::writer::write(value, symbols));
    }
    shown.push_str(" ]");
    tracing::trace!(pc, op = op.name(), args = %args, stack = %shown);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::code::Code;

    #[test]
    fn test_literal_return() {
        let mut symbols = SymbolTable::new();
        let mut code = Code::new(0, None, None, "");
        code.emit_literal(Value::number(42.0));
        code.emit_return();
        let mut vm = VM::new();
        let result = vm.execute(&Rc::new(code), &mut symbols).unwrap();
        assert_eq!(result, Value::number(42.0));
    }

    #[test]
    fn test_undefined_global_errors() {
        let mut symbols = SymbolTable::new();
        let sym = symbols.intern("nowhere");
        let mut code = Code::new(0, None, None, "");
        code.emit_global(Value::Symbol(sym));
        code.emit_return();
        let mut vm = VM::new();
        let err = vm.execute(&Rc::new(code), &mut symbols).unwrap_err();
        assert!(err.to_string().contains("Undefined symbol"));
    }

    #[test]
    fn test_interrupt_aborts() {
        let mut symbols = SymbolTable::new();
        let mut code = Code::new(0, None, None, "");
        code.emit_literal(Value::Null);
        code.emit_return();
        let mut vm = VM::new();
        vm.interrupt_flag().store(true, Ordering::Relaxed);
        let err = vm.execute(&Rc::new(code), &mut symbols).unwrap_err();
        assert!(err.is_interrupt());
    }
}
