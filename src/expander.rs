//! The macro expander.
//!
//! Rewrites arbitrary surface expressions into the core language the
//! compiler understands: `quote`, `begin`, `if`, `define`,
//! `define-macro`, `undefine`, `lambda`, `set!`, `lap`, `use`, and
//! application. `let`, named `let`, `letrec`, `cond`, `do`, and
//! `quasiquote` are rewritten here; user macros are looked up in the
//! macro table and their output is re-expanded, bounded by a depth
//! limit so a macro that rewrites to itself cannot loop forever.

use crate::error::Error;
use crate::symbol::{wk, Macro, SymbolId, SymbolTable};
use crate::value::{caar, cadr, caddr, cdddr, cddr, cons, list, Function, Value};
use crate::vm::VM;

/// Bound on user-macro re-expansion.
const MACRO_EXPANSION_LIMIT: usize = 1024;

/// Expand an expression into the core language.
pub fn macroexpand(symbols: &mut SymbolTable, vm: &mut VM, expr: &Value) -> Result<Value, Error> {
    expand_object(symbols, vm, expr, 0)
}

fn expand_object(
    symbols: &mut SymbolTable,
    vm: &mut VM,
    expr: &Value,
    depth: usize,
) -> Result<Value, Error> {
    match expr {
        Value::Pair(_) => expand_list(symbols, vm, expr, depth),
        _ => Ok(expr.clone()),
    }
}

fn expand_list(
    symbols: &mut SymbolTable,
    vm: &mut VM,
    expr: &Value,
    depth: usize,
) -> Result<Value, Error> {
    let head = expr.car();
    let new_head = if let Some(sym) = head.as_symbol() {
        if let Some(result) = expand_primitive(symbols, vm, sym, expr, depth)? {
            return Ok(result);
        }
        head
    } else if head.is_pair() {
        expand_list(symbols, vm, &head, depth)?
    } else {
        head
    };
    let tail = expand_sequence(symbols, vm, &expr.cdr(), depth)?;
    Ok(cons(new_head, tail))
}

/// Expand each element of a (possibly improper) list, preserving the
/// tail.
fn expand_sequence(
    symbols: &mut SymbolTable,
    vm: &mut VM,
    seq: &Value,
    depth: usize,
) -> Result<Value, Error> {
    let mut items = Vec::new();
    let mut current = seq.clone();
    while let Value::Pair(p) = current {
        items.push(expand_object(symbols, vm, &p.car, depth)?);
        current = p.cdr.clone();
    }
    let mut result = current;
    for item in items.into_iter().rev() {
        result = cons(item, result);
    }
    Ok(result)
}

/// Dispatch on a core or builtin surface form. Returns None when the
/// head is an ordinary function position.
fn expand_primitive(
    symbols: &mut SymbolTable,
    vm: &mut VM,
    sym: SymbolId,
    expr: &Value,
    depth: usize,
) -> Result<Option<Value>, Error> {
    match sym {
        wk::QUOTE | wk::LAP | wk::USE => Ok(Some(expr.clone())),
        wk::BEGIN => {
            let tail = expand_sequence(symbols, vm, &expr.cdr(), depth)?;
            Ok(Some(cons(expr.car(), tail)))
        }
        wk::IF => expand_if(symbols, vm, expr, depth).map(Some),
        wk::DEFINE | wk::DEFINE_MACRO => expand_define(symbols, vm, expr, depth).map(Some),
        wk::UNDEFINE => expand_undefine(symbols, expr).map(Some),
        wk::LAMBDA => expand_lambda(symbols, vm, expr, depth).map(Some),
        wk::SET_BANG => expand_set(symbols, vm, expr, depth).map(Some),
        wk::LET => expand_let(symbols, vm, expr, depth).map(Some),
        wk::LETREC => expand_letrec(symbols, vm, expr, depth).map(Some),
        wk::COND => expand_cond(symbols, vm, expr, depth).map(Some),
        wk::DO => expand_do(symbols, vm, expr, depth).map(Some),
        wk::QUASIQUOTE => expand_quasiquote(symbols, vm, expr, depth).map(Some),
        _ => {
            let mac = symbols.get_macro(sym).cloned();
            match mac {
                Some(mac) => expand_macro(symbols, vm, &mac, expr, depth).map(Some),
                None => Ok(None),
            }
        }
    }
}

/// Invoke a user macro on the form's argument list and re-expand its
/// output.
fn expand_macro(
    symbols: &mut SymbolTable,
    vm: &mut VM,
    mac: &Macro,
    expr: &Value,
    depth: usize,
) -> Result<Value, Error> {
    if depth >= MACRO_EXPANSION_LIMIT {
        return Err(Error::macro_error(format!(
            "Too many expansions of macro '{}'",
            symbols.name(mac.name)
        )));
    }
    let args = expr.cdr();
    let expanded = match &mac.expander {
        Value::Function(Function::Closure(clo)) => {
            if clo.code.argc != 1 {
                return Err(Error::macro_error("Bad macro expander function"));
            }
            let clo = clo.clone();
            vm.exec_closure(&clo, &[args], symbols).map_err(|err| {
                Error::macro_error(format!(
                    "macro error in '{}': {}",
                    symbols.name(mac.name),
                    err
                ))
            })?
        }
        Value::Function(Function::Primitive(prim)) => {
            (prim.fun)(symbols, &[args]).map_err(|err| {
                Error::macro_error(format!(
                    "macro error in '{}': {}",
                    symbols.name(mac.name),
                    err
                ))
            })?
        }
        _ => return Err(Error::macro_error("Bad macro expander function")),
    };
    expand_object(symbols, vm, &expanded, depth + 1)
}

fn syntax_error(symbols: &SymbolTable, expr: &Value) -> Error {
    Error::syntax(crate::writer::write(expr, symbols))
}

/// `if` with two operands gets a `null` alternate.
fn expand_if(
    symbols: &mut SymbolTable,
    vm: &mut VM,
    expr: &Value,
    depth: usize,
) -> Result<Value, Error> {
    match expr.length() {
        4 => {
            let tail = expand_sequence(symbols, vm, &expr.cdr(), depth)?;
            Ok(cons(expr.car(), tail))
        }
        3 => {
            let operands = list(vec![cadr(expr), caddr(expr), Value::Null]);
            let tail = expand_sequence(symbols, vm, &operands, depth)?;
            Ok(cons(expr.car(), tail))
        }
        _ => Err(syntax_error(symbols, expr)),
    }
}

fn expand_undefine(symbols: &SymbolTable, expr: &Value) -> Result<Value, Error> {
    if expr.length() != 2 || cadr(expr).as_symbol().is_none() {
        return Err(syntax_error(symbols, expr));
    }
    Ok(expr.clone())
}

/// `(define (f a …) body…)` → `(define f (lambda (a …) body…))`;
/// a plain `(define x e)` expands its value.
fn expand_define(
    symbols: &mut SymbolTable,
    vm: &mut VM,
    expr: &Value,
    depth: usize,
) -> Result<Value, Error> {
    let len = expr.length();
    if len < 3 {
        return Err(syntax_error(symbols, expr));
    }
    let name = cadr(expr);
    if name.as_symbol().is_some() {
        if len > 3 {
            return Err(syntax_error(symbols, expr));
        }
        let body = caddr(expr);
        if !body.is_pair() {
            return Ok(expr.clone());
        }
        let val = expand_list(symbols, vm, &body, depth)?;
        Ok(list(vec![expr.car(), name, val]))
    } else if name.is_pair() {
        let args = name.cdr();
        let fname = name.car();
        let body = expand_sequence(symbols, vm, &cddr(expr), depth)?;
        let lambda = expand_lambda(
            symbols,
            vm,
            &cons(Value::Symbol(wk::LAMBDA), cons(args, body)),
            depth,
        )?;
        Ok(list(vec![expr.car(), fname, lambda]))
    } else {
        Err(syntax_error(symbols, expr))
    }
}

/// Internal defines at the head of a lambda body are collected into a
/// surrounding `letrec`.
fn expand_lambda(
    symbols: &mut SymbolTable,
    vm: &mut VM,
    expr: &Value,
    depth: usize,
) -> Result<Value, Error> {
    if expr.length() < 3 {
        return Err(syntax_error(symbols, expr));
    }
    let body = expand_sequence(symbols, vm, &cddr(expr), depth)?;
    if caar(&body).as_symbol() == Some(wk::DEFINE) {
        let mut bindings = Vec::new();
        let mut tmp = body;
        while caar(&tmp).as_symbol() == Some(wk::DEFINE) {
            let def = expand_define(symbols, vm, &tmp.car(), depth)?;
            bindings.push(def.cdr());
            tmp = tmp.cdr();
        }
        let letrec = cons(
            Value::Symbol(wk::LETREC),
            cons(list(bindings), tmp),
        );
        let rewritten = expand_list(symbols, vm, &letrec, depth)?;
        return Ok(list(vec![expr.car(), cadr(expr), rewritten]));
    }
    let args = cadr(expr);
    Ok(cons(expr.car(), cons(args, body)))
}

fn expand_set(
    symbols: &mut SymbolTable,
    vm: &mut VM,
    expr: &Value,
    depth: usize,
) -> Result<Value, Error> {
    if expr.length() != 3 {
        return Err(syntax_error(symbols, expr));
    }
    let mut val = caddr(expr);
    if val.is_pair() {
        val = expand_list(symbols, vm, &val, depth)?;
    }
    Ok(list(vec![expr.car(), cadr(expr), val]))
}

fn crack_let_bindings(
    symbols: &mut SymbolTable,
    vm: &mut VM,
    bindings: &Value,
    depth: usize,
) -> Result<Option<(Vec<Value>, Vec<Value>)>, Error> {
    let mut names = Vec::new();
    let mut values = Vec::new();
    let mut current = bindings.clone();
    loop {
        match current {
            Value::EmptyList => return Ok(Some((names, values))),
            Value::Pair(ref p) => {
                let binding = p.car.clone();
                let name = binding.car();
                if name.as_symbol().is_none() {
                    return Ok(None);
                }
                let init = binding.cdr();
                if !init.is_pair() {
                    return Ok(None);
                }
                names.push(name);
                values.push(expand_object(symbols, vm, &init.car(), depth)?);
                current = p.cdr.clone();
            }
            _ => return Ok(None),
        }
    }
}

/// `(let ((x e) …) body…)` → `((lambda (x …) body…) e …)`
fn expand_let(
    symbols: &mut SymbolTable,
    vm: &mut VM,
    expr: &Value,
    depth: usize,
) -> Result<Value, Error> {
    if cadr(expr).as_symbol().is_some() {
        return expand_named_let(symbols, vm, expr, depth);
    }
    let bindings = cadr(expr);
    if !bindings.is_list() {
        return Err(syntax_error(symbols, expr));
    }
    let (names, values) = match crack_let_bindings(symbols, vm, &bindings, depth)? {
        Some(cracked) => cracked,
        None => return Err(syntax_error(symbols, expr)),
    };
    let body = cddr(expr);
    if !body.is_pair() {
        return Err(syntax_error(symbols, expr));
    }
    let lambda = cons(Value::Symbol(wk::LAMBDA), cons(list(names), body));
    let code = expand_list(symbols, vm, &lambda, depth)?;
    Ok(cons(code, list(values)))
}

/// `(let name ((x e) …) body…)` →
/// `(letrec ((name (lambda (x …) body…))) (name e …))`
fn expand_named_let(
    symbols: &mut SymbolTable,
    vm: &mut VM,
    expr: &Value,
    depth: usize,
) -> Result<Value, Error> {
    let name = cadr(expr);
    let bindings = caddr(expr);
    if !bindings.is_list() {
        return Err(syntax_error(symbols, expr));
    }
    let (names, values) = match crack_let_bindings(symbols, vm, &bindings, depth)? {
        Some(cracked) => cracked,
        None => return Err(syntax_error(symbols, expr)),
    };
    let body = cdddr(expr);
    let lambda = cons(Value::Symbol(wk::LAMBDA), cons(list(names), body));
    let rewritten = list(vec![
        Value::Symbol(wk::LETREC),
        list(vec![list(vec![name.clone(), lambda])]),
        cons(name, list(values)),
    ]);
    expand_list(symbols, vm, &rewritten, depth)
}

fn crack_letrec_bindings(
    bindings: &Value,
    tail: &Value,
) -> Result<Option<(Vec<Value>, Value)>, Error> {
    let mut names = Vec::new();
    let mut inits = Vec::new();
    let mut current = bindings.clone();
    loop {
        match current {
            Value::EmptyList => break,
            Value::Pair(ref p) => {
                let binding = p.car.clone();
                if !binding.is_pair() {
                    return Ok(None);
                }
                let name = binding.car();
                if name.as_symbol().is_none() {
                    return Ok(None);
                }
                if !binding.cdr().is_pair() {
                    return Ok(None);
                }
                names.push(name);
                inits.push(cons(Value::Symbol(wk::SET_BANG), binding));
                current = p.cdr.clone();
            }
            _ => return Ok(None),
        }
    }
    let mut body = tail.clone();
    for init in inits.into_iter().rev() {
        body = cons(init, body);
    }
    Ok(Some((names, body)))
}

/// `(letrec ((x e) …) body…)` →
/// `((lambda (x …) (set! x e) … body…) null …)`
fn expand_letrec(
    symbols: &mut SymbolTable,
    vm: &mut VM,
    expr: &Value,
    depth: usize,
) -> Result<Value, Error> {
    let body = cddr(expr);
    if !body.is_pair() {
        return Err(syntax_error(symbols, expr));
    }
    let bindings = cadr(expr);
    if !bindings.is_list() {
        return Err(syntax_error(symbols, expr));
    }
    let (names, full_body) = match crack_letrec_bindings(&bindings, &body)? {
        Some(cracked) => cracked,
        None => return Err(syntax_error(symbols, expr)),
    };
    let count = names.len();
    let lambda = cons(Value::Symbol(wk::LAMBDA), cons(list(names), full_body));
    let code = expand_list(symbols, vm, &lambda, depth)?;
    Ok(cons(code, list(vec![Value::Null; count])))
}

/// `cond` becomes a right-associated `if` chain; `(p => f)` binds the
/// tested value to a gensym temporary and applies `f` when truthy.
fn expand_cond(
    symbols: &mut SymbolTable,
    vm: &mut VM,
    expr: &Value,
    depth: usize,
) -> Result<Value, Error> {
    let len = expr.length();
    if len < 2 {
        return Err(syntax_error(symbols, expr));
    }
    if len == 2 {
        let clause = cadr(expr);
        if !clause.is_pair() {
            return Err(syntax_error(symbols, expr));
        }
        let rewritten = if clause.car().as_symbol() == Some(wk::ELSE) {
            cons(Value::Symbol(wk::BEGIN), clause.cdr())
        } else {
            let body = cons(Value::Symbol(wk::BEGIN), clause.cdr());
            list(vec![Value::Symbol(wk::IF), clause.car(), body])
        };
        return expand_object(symbols, vm, &rewritten, depth);
    }
    let result = next_cond_clause(symbols, vm, expr, &expr.cdr(), (len - 1) as usize, depth)?;
    Ok(result)
}

/// Rewrite one clause, threading the rest of the chain as the
/// alternate.
fn cond_clause_to_if(
    symbols: &mut SymbolTable,
    expr: &Value,
    clause: &Value,
    alternate: Option<Value>,
) -> Result<Value, Error> {
    if cadr(clause).as_symbol() == Some(wk::ARROW) {
        if clause.length() != 3 {
            return Err(syntax_error(symbols, expr));
        }
        let tmp = Value::Symbol(symbols.gensym("cond"));
        let applied = list(vec![caddr(clause), tmp.clone()]);
        let inner = match alternate {
            Some(alt) => list(vec![Value::Symbol(wk::IF), tmp.clone(), applied, alt]),
            None => list(vec![Value::Symbol(wk::IF), tmp.clone(), applied]),
        };
        Ok(list(vec![
            Value::Symbol(wk::LET),
            list(vec![list(vec![tmp, clause.car()])]),
            inner,
        ]))
    } else {
        let body = cons(Value::Symbol(wk::BEGIN), clause.cdr());
        match alternate {
            Some(alt) => Ok(list(vec![Value::Symbol(wk::IF), clause.car(), body, alt])),
            None => Ok(list(vec![Value::Symbol(wk::IF), clause.car(), body])),
        }
    }
}

fn next_cond_clause(
    symbols: &mut SymbolTable,
    vm: &mut VM,
    expr: &Value,
    clauses: &Value,
    count: usize,
    depth: usize,
) -> Result<Value, Error> {
    let clause0 = clauses.car();
    let rest = clauses.cdr();
    let clause1 = rest.car();
    let result = if count == 2 {
        if !clause1.is_pair() {
            return Err(syntax_error(symbols, expr));
        }
        let tail = if clause1.car().as_symbol() == Some(wk::ELSE) {
            cons(Value::Symbol(wk::BEGIN), clause1.cdr())
        } else {
            cond_clause_to_if(symbols, expr, &clause1, None)?
        };
        cond_clause_to_if(symbols, expr, &clause0, Some(tail))?
    } else {
        let tail = next_cond_clause(symbols, vm, expr, &rest, count - 1, depth)?;
        cond_clause_to_if(symbols, expr, &clause0, Some(tail))?
    };
    expand_object(symbols, vm, &result, depth)
}

fn crack_do_bindings(
    symbols: &mut SymbolTable,
    vm: &mut VM,
    bindings: &Value,
    depth: usize,
) -> Result<Option<(Vec<Value>, Vec<Value>, Vec<Value>)>, Error> {
    let mut names = Vec::new();
    let mut inits = Vec::new();
    let mut steps = Vec::new();
    let mut current = bindings.clone();
    while let Value::Pair(p) = current {
        let binding = p.car.clone();
        if !binding.is_pair() {
            return Ok(None);
        }
        let name = binding.car();
        if name.as_symbol().is_none() {
            return Ok(None);
        }
        if !binding.cdr().is_pair() {
            return Ok(None);
        }
        let init = expand_object(symbols, vm, &cadr(&binding), depth)?;
        let step = if cddr(&binding).is_pair() {
            expand_object(symbols, vm, &caddr(&binding), depth)?
        } else {
            name.clone()
        };
        names.push(name);
        inits.push(init);
        steps.push(step);
        current = p.cdr.clone();
    }
    Ok(Some((names, inits, steps)))
}

/// `(do ((v init step) …) (test exit…) body…)` expands to a
/// `letrec`-defined named loop.
fn expand_do(
    symbols: &mut SymbolTable,
    vm: &mut VM,
    expr: &Value,
    depth: usize,
) -> Result<Value, Error> {
    if expr.length() < 3 {
        return Err(syntax_error(symbols, expr));
    }
    let bindings = cadr(expr);
    if !bindings.is_list() {
        return Err(syntax_error(symbols, expr));
    }
    let (names, inits, steps) = match crack_do_bindings(symbols, vm, &bindings, depth)? {
        Some(cracked) => cracked,
        None => return Err(syntax_error(symbols, expr)),
    };
    let exit_clause = caddr(expr);
    if !exit_clause.is_pair() {
        return Err(syntax_error(symbols, expr));
    }
    let exit_pred = exit_clause.car();
    let exit_exprs = if cddr(&exit_clause).is_pair() {
        cons(Value::Symbol(wk::BEGIN), exit_clause.cdr())
    } else {
        cadr(&exit_clause)
    };
    let loop_sym = Value::Symbol(symbols.gensym("loop"));
    let recur = cons(loop_sym.clone(), list(steps));
    let full_body = if cdddr(expr).is_pair() {
        let body = cons(Value::Symbol(wk::BEGIN), cdddr(expr));
        list(vec![Value::Symbol(wk::BEGIN), body, recur])
    } else {
        recur
    };
    let if_expr = list(vec![Value::Symbol(wk::IF), exit_pred, exit_exprs, full_body]);
    let lambda = list(vec![Value::Symbol(wk::LAMBDA), list(names), if_expr]);
    let rewritten = list(vec![
        Value::Symbol(wk::LETREC),
        list(vec![list(vec![loop_sym.clone(), lambda])]),
        cons(loop_sym, list(inits)),
    ]);
    expand_object(symbols, vm, &rewritten, depth)
}

fn expand_quasiquote(
    symbols: &mut SymbolTable,
    vm: &mut VM,
    expr: &Value,
    depth: usize,
) -> Result<Value, Error> {
    if expr.length() != 2 {
        return Err(syntax_error(symbols, expr));
    }
    expand_qq(symbols, vm, &cadr(expr), depth)
}

fn expand_qq(
    symbols: &mut SymbolTable,
    vm: &mut VM,
    expr: &Value,
    depth: usize,
) -> Result<Value, Error> {
    match expr {
        Value::Pair(p) => {
            if !matches!(p.cdr, Value::EmptyList) {
                if p.car.as_symbol() == Some(wk::UNQUOTE) {
                    if cddr(expr).is_pair() {
                        return Err(syntax_error(symbols, expr));
                    }
                    return expand_object(symbols, vm, &cadr(expr), depth);
                }
                if p.car.as_symbol() == Some(wk::UNQUOTE_SPLICING) {
                    return Err(Error::syntax(
                        "unquote-splicing can only occur in the context of a list",
                    ));
                }
            }
            let skeleton = expand_qq_list(symbols, vm, expr, depth)?;
            expand_object(symbols, vm, &skeleton, depth)
        }
        Value::Symbol(_) => Ok(list(vec![Value::Symbol(wk::QUOTE), expr.clone()])),
        _ => Ok(expr.clone()),
    }
}

/// Build the `(concat …)` skeleton for a quasiquoted list.
fn expand_qq_list(
    symbols: &mut SymbolTable,
    vm: &mut VM,
    lst: &Value,
    depth: usize,
) -> Result<Value, Error> {
    let mut parts = vec![Value::Symbol(wk::CONCAT)];
    let mut current = lst.clone();
    while let Value::Pair(p) = current.clone() {
        let item = p.car.clone();
        if item.is_pair() {
            if item.car().as_symbol() == Some(wk::QUASIQUOTE) {
                return Err(Error::syntax("nested quasiquote not supported"));
            }
            if item.car().as_symbol() == Some(wk::UNQUOTE) && item.length() == 2 {
                let tmp = expand_object(symbols, vm, &cadr(&item), depth)?;
                parts.push(list(vec![Value::Symbol(wk::LIST), tmp]));
            } else if item.car().as_symbol() == Some(wk::UNQUOTE_SPLICING) && item.length() == 2 {
                let tmp = expand_object(symbols, vm, &cadr(&item), depth)?;
                parts.push(tmp);
            } else {
                let tmp = expand_qq_list(symbols, vm, &item, depth)?;
                parts.push(list(vec![Value::Symbol(wk::LIST), tmp]));
            }
        } else {
            parts.push(list(vec![
                Value::Symbol(wk::QUOTE),
                list(vec![item]),
            ]));
        }
        current = p.cdr.clone();
    }
    if !matches!(current, Value::EmptyList) {
        // improper tail becomes the final concat argument
        parts.push(list(vec![Value::Symbol(wk::QUOTE), current]));
    }
    Ok(list(parts))
}
