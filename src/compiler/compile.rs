//! Single-pass compiler from core forms to bytecode.
//!
//! Every expression is compiled in a `(is_tail, ignore_result)`
//! context: a tail-position call becomes `tailcall`, an ignored value
//! is followed by `pop`, and each finished `Code` ends with `return`.
//! Symbol references resolve against a compile-time environment (a
//! list of parameter lists, innermost first) to a `(frame, slot)`
//! pair, falling back to a `global` reference.

use crate::compiler::code::Code;
use crate::error::Error;
use crate::symbol::{wk, SymbolId, SymbolTable};
use crate::value::{cadr, caddr, cdddr, cddr, StructKey, Value};
use std::rc::Rc;

/// Compile-time lexical environment: parameter lists, innermost first.
type LexicalEnv = Vec<Vec<SymbolId>>;

/// Compile a core expression to a code object ending in `return`.
pub fn compile(symbols: &mut SymbolTable, expr: &Value) -> Result<Rc<Code>, Error> {
    let mut code = Code::new(0, None, None, "");
    let env: LexicalEnv = Vec::new();
    compile_expr(&mut code, symbols, &env, expr, false, false, "")?;
    code.emit_return();
    Ok(Rc::new(code))
}

/// Resolve a symbol to `(frames out, slot index)`.
fn calculate_location(sym: SymbolId, env: &LexicalEnv) -> Option<(usize, usize)> {
    for (i, frame) in env.iter().enumerate() {
        for (j, param) in frame.iter().enumerate() {
            if *param == sym {
                return Some((i, j));
            }
        }
    }
    None
}

fn syntax_error(symbols: &SymbolTable, expr: &Value) -> Error {
    Error::syntax(crate::writer::write(expr, symbols))
}

fn compile_expr(
    code: &mut Code,
    symbols: &mut SymbolTable,
    env: &LexicalEnv,
    expr: &Value,
    is_tail: bool,
    ignore_result: bool,
    context: &str,
) -> Result<(), Error> {
    match expr {
        Value::Symbol(sym) => {
            if let Some((i, j)) = calculate_location(*sym, env) {
                code.emit_local(i, j);
            } else {
                code.emit_global(Value::Symbol(*sym));
            }
            if ignore_result {
                code.emit_pop();
            } else if is_tail {
                code.emit_return();
            }
            Ok(())
        }
        Value::Pair(_) => {
            let len = expr.length();
            if len < 0 {
                return Err(syntax_error(symbols, expr));
            }
            let head = expr.car();
            match head.as_symbol() {
                Some(wk::QUOTE) => {
                    // (quote <datum>)
                    if len != 2 {
                        return Err(syntax_error(symbols, expr));
                    }
                    if !ignore_result {
                        code.emit_literal(cadr(expr));
                        if is_tail {
                            code.emit_return();
                        }
                    }
                    Ok(())
                }
                Some(wk::BEGIN) => {
                    // (begin <expr> ...)
                    compile_sequence(code, symbols, env, &expr.cdr(), is_tail, ignore_result, context)
                }
                Some(wk::IF) => {
                    // (if <pred> <consequent>)
                    // (if <pred> <consequent> <antecedent>)
                    if len == 3 || len == 4 {
                        compile_if_else(
                            code,
                            symbols,
                            env,
                            &cadr(expr),
                            &caddr(expr),
                            &cdddr(expr),
                            is_tail,
                            ignore_result,
                            context,
                        )
                    } else {
                        Err(syntax_error(symbols, expr))
                    }
                }
                Some(wk::DEFINE) => {
                    // (define <name> <val>)
                    if len < 3 {
                        return Err(syntax_error(symbols, expr));
                    }
                    let mut sym = cadr(expr);
                    let mut val = caddr(expr);
                    if sym.as_symbol().is_none() {
                        if sym.is_pair() && sym.length() >= 1 {
                            let args = sym.cdr();
                            sym = sym.car();
                            val = crate::value::list(vec![
                                Value::Symbol(wk::LAMBDA),
                                args,
                                val,
                            ]);
                        } else {
                            return Err(syntax_error(symbols, expr));
                        }
                    }
                    let id = match sym.as_symbol() {
                        Some(id) => id,
                        None => return Err(syntax_error(symbols, expr)),
                    };
                    let name = symbols.name(id).to_string();
                    compile_expr(code, symbols, env, &val, false, false, &name)?;
                    code.emit_def_global(sym);
                    if ignore_result {
                        code.emit_pop();
                    } else if is_tail {
                        code.emit_return();
                    }
                    Ok(())
                }
                Some(wk::DEFINE_MACRO) => {
                    // (define-macro <name> <expander>)
                    if len != 3 {
                        return Err(syntax_error(symbols, expr));
                    }
                    let sym = cadr(expr);
                    let id = match sym.as_symbol() {
                        Some(id) => id,
                        None => return Err(syntax_error(symbols, expr)),
                    };
                    let name = symbols.name(id).to_string();
                    compile_expr(code, symbols, env, &caddr(expr), false, false, &name)?;
                    code.emit_def_macro(sym);
                    if ignore_result {
                        code.emit_pop();
                    } else if is_tail {
                        code.emit_return();
                    }
                    Ok(())
                }
                Some(wk::UNDEFINE) => {
                    // (undefine <name>)
                    if len != 2 {
                        return Err(syntax_error(symbols, expr));
                    }
                    let sym = cadr(expr);
                    if sym.as_symbol().is_none() {
                        return Err(syntax_error(symbols, expr));
                    }
                    code.emit_undef_global(sym.clone());
                    if !ignore_result {
                        code.emit_literal(sym);
                        if is_tail {
                            code.emit_return();
                        }
                    }
                    Ok(())
                }
                Some(wk::LAMBDA) => {
                    // (lambda (sym ...) <expr> ...)
                    // (lambda (sym ... . rest) <expr> ...)
                    // (lambda (sym ... [opt default] ...) <expr> ...)
                    // (lambda (sym ... {key: default ...}) <expr> ...)
                    // (lambda sym <expr> ...)
                    if len < 3 {
                        return Err(syntax_error(symbols, expr));
                    }
                    let args = cadr(expr);
                    let body = cddr(expr);
                    compile_lambda(code, symbols, env, &args, &body, is_tail, ignore_result, context)
                }
                Some(wk::SET_BANG) => {
                    // (set! <sym> <val>)
                    if len != 3 {
                        return Err(syntax_error(symbols, expr));
                    }
                    let sym = cadr(expr);
                    let id = match sym.as_symbol() {
                        Some(id) => id,
                        None => return Err(syntax_error(symbols, expr)),
                    };
                    compile_expr(code, symbols, env, &caddr(expr), false, false, context)?;
                    if let Some((i, j)) = calculate_location(id, env) {
                        code.emit_set_local(i, j);
                    } else {
                        code.emit_set_global(sym);
                    }
                    if ignore_result {
                        code.emit_pop();
                    } else if is_tail {
                        code.emit_return();
                    }
                    Ok(())
                }
                Some(wk::LAP) => {
                    // (lap <instruction> ...)
                    code.load_ops(symbols, expr.cdr())
                }
                Some(wk::USE) => {
                    // (use <module>)
                    if expr.cdr().length() != 1 {
                        return Err(syntax_error(symbols, expr));
                    }
                    let sym = cadr(expr);
                    if sym.as_symbol().is_none() {
                        return Err(syntax_error(symbols, expr));
                    }
                    code.emit_use(sym);
                    if ignore_result {
                        code.emit_pop();
                    } else if is_tail {
                        code.emit_return();
                    }
                    Ok(())
                }
                _ => {
                    // (<fn> <arg> ...)
                    compile_funcall(
                        code,
                        symbols,
                        env,
                        &head,
                        &expr.cdr(),
                        is_tail,
                        ignore_result,
                        context,
                    )
                }
            }
        }
        Value::Vector(elements) => {
            // vector literal: elements are evaluated, in reverse so the
            // stack reads left-to-right when the opcode collects them
            let elements = elements.borrow().clone();
            let n = elements.len();
            for element in elements.iter().rev() {
                compile_expr(code, symbols, env, element, false, false, context)?;
            }
            code.emit_vector(n);
            if ignore_result {
                code.emit_pop();
            } else if is_tail {
                code.emit_return();
            }
            Ok(())
        }
        Value::Struct(bindings) => {
            // struct literal: keys are literal data, values are evaluated
            let flat: Vec<(StructKey, Value)> = bindings
                .borrow()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            let n = flat.len() * 2;
            for (key, value) in flat.iter().rev() {
                compile_expr(code, symbols, env, value, false, false, context)?;
                code.emit_literal(key.to_value());
            }
            code.emit_struct(n);
            if ignore_result {
                code.emit_pop();
            } else if is_tail {
                code.emit_return();
            }
            Ok(())
        }
        _ => {
            if !ignore_result {
                code.emit_literal(expr.clone());
                if is_tail {
                    code.emit_return();
                }
            }
            Ok(())
        }
    }
}

fn compile_sequence(
    code: &mut Code,
    symbols: &mut SymbolTable,
    env: &LexicalEnv,
    exprs: &Value,
    is_tail: bool,
    ignore_result: bool,
    context: &str,
) -> Result<(), Error> {
    if !exprs.is_pair() {
        return Err(syntax_error(
            symbols,
            &crate::value::cons(Value::Symbol(wk::BEGIN), exprs.clone()),
        ));
    }
    let mut exprs = exprs.clone();
    while exprs.cdr().is_pair() {
        compile_expr(code, symbols, env, &exprs.car(), false, true, context)?;
        exprs = exprs.cdr();
    }
    compile_expr(code, symbols, env, &exprs.car(), is_tail, ignore_result, context)
}

#[allow(clippy::too_many_arguments)]
fn compile_funcall(
    code: &mut Code,
    symbols: &mut SymbolTable,
    env: &LexicalEnv,
    func: &Value,
    args: &Value,
    is_tail: bool,
    ignore_result: bool,
    context: &str,
) -> Result<(), Error> {
    let argv = match args.list_to_vec() {
        Some(argv) => argv,
        None => {
            return Err(syntax_error(
                symbols,
                &crate::value::cons(func.clone(), args.clone()),
            ))
        }
    };
    // args are compiled in reverse so the first argument lands on top
    for arg in argv.iter().rev() {
        compile_expr(code, symbols, env, arg, false, false, context)?;
    }
    compile_expr(code, symbols, env, func, false, false, context)?;
    if is_tail {
        code.emit_tail_call(argv.len());
    } else {
        code.emit_call(argv.len());
        if ignore_result {
            code.emit_pop();
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn compile_if_else(
    code: &mut Code,
    symbols: &mut SymbolTable,
    env: &LexicalEnv,
    predicate: &Value,
    consequent: &Value,
    antecedent_optional: &Value,
    is_tail: bool,
    ignore_result: bool,
    context: &str,
) -> Result<(), Error> {
    let antecedent = if antecedent_optional.is_pair() {
        antecedent_optional.car()
    } else {
        Value::Null
    };
    compile_expr(code, symbols, env, predicate, false, false, context)?;
    let loc1 = code.emit_jump_false(0);
    compile_expr(code, symbols, env, consequent, is_tail, ignore_result, context)?;
    let loc2 = if is_tail { 0 } else { code.emit_jump(0) };
    code.set_jump_location(loc1);
    compile_expr(code, symbols, env, &antecedent, is_tail, ignore_result, context)?;
    if !is_tail {
        code.set_jump_location(loc2);
    }
    Ok(())
}

/// Parse a parameter list into slots and the defaults/keys descriptor,
/// then compile the body into a fresh code object.
#[allow(clippy::too_many_arguments)]
fn compile_lambda(
    code: &mut Code,
    symbols: &mut SymbolTable,
    env: &LexicalEnv,
    args: &Value,
    body: &Value,
    is_tail: bool,
    ignore_result: bool,
    context: &str,
) -> Result<(), Error> {
    let mut argc = 0usize;
    let mut syms: Vec<SymbolId> = Vec::new();
    let mut defaults: Option<Vec<Value>> = None;
    let mut keys: Option<Vec<Value>> = None;
    let mut tmp = args.clone();
    while let Value::Pair(p) = tmp.clone() {
        let param = p.car.clone();
        match &param {
            Value::Vector(_) => {
                // optional parameters: [sym default] or [sym], through
                // the end of the parameter list
                let mut dvec = Vec::new();
                let mut rest = tmp.clone();
                while let Value::Pair(q) = rest {
                    match &q.car {
                        Value::Vector(items) => {
                            collect_optionals(&items.borrow(), &mut syms, &mut dvec)
                                .map_err(|_| syntax_error(symbols, args))?;
                        }
                        _ => return Err(syntax_error(symbols, args)),
                    }
                    rest = q.cdr.clone();
                }
                defaults = Some(dvec);
                tmp = Value::EmptyList;
                break;
            }
            Value::Struct(bindings) => {
                // keyword parameters, must be the final element
                if !matches!(p.cdr, Value::EmptyList) {
                    return Err(syntax_error(symbols, args));
                }
                let mut dvec = Vec::new();
                let mut kvec = Vec::new();
                for (key, default) in bindings.borrow().iter() {
                    match key {
                        StructKey::Atom(id) => {
                            syms.push(*id);
                            kvec.push(Value::Symbol(*id));
                            dvec.push(default.clone());
                        }
                        _ => return Err(syntax_error(symbols, args)),
                    }
                }
                defaults = Some(dvec);
                keys = Some(kvec);
                tmp = Value::EmptyList;
                break;
            }
            Value::Symbol(id) => {
                argc += 1;
                syms.push(*id);
                tmp = p.cdr.clone();
            }
            _ => return Err(syntax_error(symbols, args)),
        }
    }
    match tmp {
        Value::EmptyList => {}
        Value::Symbol(id) => {
            // rest parameter: bound but not counted in argc
            syms.push(id);
            defaults = Some(Vec::new());
        }
        _ => return Err(syntax_error(symbols, args)),
    }
    let mut new_env = vec![syms];
    new_env.extend(env.iter().cloned());
    let mut lambda_code = Code::new(argc, defaults, keys, context);
    compile_sequence(&mut lambda_code, symbols, &new_env, body, true, false, context)?;
    if !ignore_result {
        code.emit_closure(Rc::new(lambda_code));
        if is_tail {
            code.emit_return();
        }
    }
    Ok(())
}

/// One `[…]` optional-parameter group: either `[sym default]`, or a
/// run of `sym` / `(sym default)` elements.
fn collect_optionals(
    items: &[Value],
    syms: &mut Vec<SymbolId>,
    defaults: &mut Vec<Value>,
) -> Result<(), ()> {
    if items.len() == 2 {
        if let (Value::Symbol(id), default) = (&items[0], &items[1]) {
            if !matches!(default, Value::Symbol(_) | Value::Pair(_)) {
                syms.push(*id);
                defaults.push(default.clone());
                return Ok(());
            }
        }
    }
    for item in items {
        match item {
            Value::Symbol(id) => {
                syms.push(*id);
                defaults.push(Value::Null);
            }
            Value::Pair(_) => {
                let id = item.car().as_symbol().ok_or(())?;
                syms.push(id);
                defaults.push(cadr(item));
            }
            _ => return Err(()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::code::Opcode;

    fn num(n: f64) -> Value {
        Value::number(n)
    }

    #[test]
    fn test_literal_ends_with_return() {
        let mut symbols = SymbolTable::new();
        let code = compile(&mut symbols, &num(42.0)).unwrap();
        assert_eq!(*code.ops.last().unwrap(), Opcode::Return as i32);
    }

    #[test]
    fn test_symbol_compiles_to_global() {
        let mut symbols = SymbolTable::new();
        let sym = symbols.intern("x");
        let code = compile(&mut symbols, &Value::Symbol(sym)).unwrap();
        assert_eq!(code.ops[0], Opcode::Global as i32);
    }

    #[test]
    fn test_lambda_body_call_is_tail() {
        let mut symbols = SymbolTable::new();
        let f = symbols.intern("f");
        let x = symbols.intern("x");
        // (lambda (x) (f x))
        let expr = crate::value::list(vec![
            Value::Symbol(wk::LAMBDA),
            crate::value::list(vec![Value::Symbol(x)]),
            crate::value::list(vec![Value::Symbol(f), Value::Symbol(x)]),
        ]);
        let code = compile(&mut symbols, &expr).unwrap();
        let inner = match &code.constants[code.ops[1] as usize] {
            Value::Code(inner) => inner.clone(),
            other => panic!("expected code constant, got {:?}", other),
        };
        assert!(inner.ops.contains(&(Opcode::TailCall as i32)));
        assert!(!inner.ops.contains(&(Opcode::Call as i32)));
    }

    #[test]
    fn test_lexical_addressing() {
        let mut symbols = SymbolTable::new();
        let x = symbols.intern("x");
        // (lambda (x) x)
        let expr = crate::value::list(vec![
            Value::Symbol(wk::LAMBDA),
            crate::value::list(vec![Value::Symbol(x)]),
            Value::Symbol(x),
        ]);
        let code = compile(&mut symbols, &expr).unwrap();
        let inner = match &code.constants[code.ops[1] as usize] {
            Value::Code(inner) => inner.clone(),
            other => panic!("expected code constant, got {:?}", other),
        };
        assert_eq!(inner.ops[0], Opcode::Local as i32);
        assert_eq!(inner.ops[1], 0);
        assert_eq!(inner.ops[2], 0);
    }

    #[test]
    fn test_empty_begin_is_syntax_error() {
        let mut symbols = SymbolTable::new();
        let expr = crate::value::list(vec![Value::Symbol(wk::BEGIN)]);
        assert!(compile(&mut symbols, &expr).is_err());
    }

    #[test]
    fn test_set_of_unresolved_emits_setglobal() {
        let mut symbols = SymbolTable::new();
        let x = symbols.intern("x");
        let expr = crate::value::list(vec![
            Value::Symbol(wk::SET_BANG),
            Value::Symbol(x),
            num(1.0),
        ]);
        let code = compile(&mut symbols, &expr).unwrap();
        assert!(code.ops.contains(&(Opcode::SetGlobal as i32)));
    }
}
