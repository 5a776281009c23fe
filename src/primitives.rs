//! The built-in primitive library.
//!
//! Primitives receive the symbol table and their argument slice, and
//! return a value or an error; the VM collapses the arguments and
//! pushes the result. Each primitive checks its own arity and types.

use crate::error::Error;
use crate::reader;
use crate::symbol::{wk, SymbolTable};
use crate::value::{
    cons, equal, identical, list, list_from_slice, new_struct, struct_get, struct_put, Function,
    StructKey, Value,
};
use crate::vm::VM;
use crate::writer;

fn register_fn(
    vm: &mut VM,
    symbols: &mut SymbolTable,
    name: &str,
    signature: &'static str,
    fun: crate::value::PrimCallable,
) {
    let sym = symbols.intern(name);
    vm.def_global(sym, Value::primitive(name, signature, fun));
}

pub fn register_primitives(vm: &mut VM, symbols: &mut SymbolTable) {
    // Arithmetic
    register_fn(vm, symbols, "+", "(<number>*)", prim_add);
    register_fn(vm, symbols, "-", "(<number>+)", prim_sub);
    register_fn(vm, symbols, "*", "(<number>*)", prim_mul);
    register_fn(vm, symbols, "/", "(<number>+)", prim_div);
    register_fn(vm, symbols, "quotient", "(<number> <number>)", prim_quotient);
    register_fn(vm, symbols, "remainder", "(<number> <number>)", prim_remainder);
    register_fn(vm, symbols, "modulo", "(<number> <number>)", prim_modulo);

    // Comparisons
    register_fn(vm, symbols, "=", "(<number> <number>+)", prim_num_eq);
    register_fn(vm, symbols, "<", "(<number> <number>+)", prim_lt);
    register_fn(vm, symbols, "<=", "(<number> <number>+)", prim_le);
    register_fn(vm, symbols, ">", "(<number> <number>+)", prim_gt);
    register_fn(vm, symbols, ">=", "(<number> <number>+)", prim_ge);
    register_fn(vm, symbols, "zero?", "(<number>)", prim_zero_p);
    register_fn(vm, symbols, "abs", "(<number>)", prim_abs);
    register_fn(vm, symbols, "min", "(<number>+)", prim_min);
    register_fn(vm, symbols, "max", "(<number>+)", prim_max);

    // Lists
    register_fn(vm, symbols, "cons", "(<any> <any>)", prim_cons);
    register_fn(vm, symbols, "car", "(<list>)", prim_car);
    register_fn(vm, symbols, "cdr", "(<list>)", prim_cdr);
    register_fn(vm, symbols, "cadr", "(<list>)", prim_cadr);
    register_fn(vm, symbols, "cddr", "(<list>)", prim_cddr);
    register_fn(vm, symbols, "caddr", "(<list>)", prim_caddr);
    register_fn(vm, symbols, "list", "(<any>*)", prim_list);
    register_fn(vm, symbols, "length", "(<list>)", prim_length);
    register_fn(vm, symbols, "reverse", "(<list>)", prim_reverse);
    register_fn(vm, symbols, "append", "(<list>*)", prim_concat);
    register_fn(vm, symbols, "concat", "(<list>*)", prim_concat);
    register_fn(vm, symbols, "list->vector", "(<list>)", prim_list_to_vector);

    // Vectors
    register_fn(vm, symbols, "vector", "(<any>*)", prim_vector);
    register_fn(vm, symbols, "make-vector", "(<number> <any>)", prim_make_vector);
    register_fn(vm, symbols, "vector-ref", "(<vector> <number>)", prim_vector_ref);
    register_fn(vm, symbols, "vector-set!", "(<vector> <number> <any>)", prim_vector_set);
    register_fn(vm, symbols, "vector-length", "(<vector>)", prim_vector_length);
    register_fn(vm, symbols, "vector->list", "(<vector>)", prim_vector_to_list);

    // Structs
    register_fn(vm, symbols, "struct", "(<any>*)", prim_struct);
    register_fn(vm, symbols, "get", "(<struct> <any>)", prim_get);
    register_fn(vm, symbols, "put!", "(<struct> <any> <any>)", prim_put);
    register_fn(vm, symbols, "has?", "(<struct> <any>)", prim_has);
    register_fn(vm, symbols, "keys", "(<struct>)", prim_keys);
    register_fn(vm, symbols, "values", "(<struct>)", prim_values);

    // Predicates
    register_fn(vm, symbols, "type", "(<any>)", prim_type);
    register_fn(vm, symbols, "null?", "(<any>)", prim_null_p);
    register_fn(vm, symbols, "boolean?", "(<any>)", prim_boolean_p);
    register_fn(vm, symbols, "character?", "(<any>)", prim_character_p);
    register_fn(vm, symbols, "number?", "(<any>)", prim_number_p);
    register_fn(vm, symbols, "string?", "(<any>)", prim_string_p);
    register_fn(vm, symbols, "symbol?", "(<any>)", prim_symbol_p);
    register_fn(vm, symbols, "keyword?", "(<any>)", prim_keyword_p);
    register_fn(vm, symbols, "type?", "(<any>)", prim_type_p);
    register_fn(vm, symbols, "list?", "(<any>)", prim_list_p);
    register_fn(vm, symbols, "pair?", "(<any>)", prim_pair_p);
    register_fn(vm, symbols, "empty?", "(<any>)", prim_empty_p);
    register_fn(vm, symbols, "vector?", "(<any>)", prim_vector_p);
    register_fn(vm, symbols, "struct?", "(<any>)", prim_struct_p);
    register_fn(vm, symbols, "function?", "(<any>)", prim_function_p);
    register_fn(vm, symbols, "equal?", "(<any> <any>)", prim_equal_p);
    register_fn(vm, symbols, "identical?", "(<any> <any>)", prim_identical_p);
    register_fn(vm, symbols, "not", "(<any>)", prim_not);

    // Strings and atoms
    register_fn(vm, symbols, "string", "(<any>*)", prim_string);
    register_fn(vm, symbols, "string-length", "(<string>)", prim_string_length);
    register_fn(vm, symbols, "number->string", "(<number>)", prim_number_to_string);
    register_fn(vm, symbols, "to-string", "(<any>)", prim_to_string);
    register_fn(vm, symbols, "intern", "(<string>)", prim_intern);
    register_fn(vm, symbols, "gensym", "()", prim_gensym);
    register_fn(vm, symbols, "instance", "(<type> <any>)", prim_instance);

    // I/O and meta
    register_fn(vm, symbols, "display", "(<any>)", prim_display);
    register_fn(vm, symbols, "print", "(<any>*)", prim_print);
    register_fn(vm, symbols, "println", "(<any>*)", prim_println);
    register_fn(vm, symbols, "newline", "()", prim_newline);
    register_fn(vm, symbols, "write", "(<any>)", prim_write);
    register_fn(vm, symbols, "json", "(<any>)", prim_json);
    register_fn(vm, symbols, "read", "(<string>)", prim_read);
    register_fn(vm, symbols, "error", "(<any>+)", prim_error);

    // Builtin instruction values
    let apply = symbols.intern("apply");
    vm.def_global(apply, Value::Function(Function::Apply));
    let callcc = symbols.intern("call/cc");
    vm.def_global(callcc, Value::Function(Function::CallCC));
}

fn argc_error(name: &str, expected: &str, got: usize) -> Result<Value, Error> {
    Err(Error::argc(name, expected, got))
}

fn numbers(args: &[Value]) -> Result<Vec<f64>, Error> {
    let mut out = Vec::with_capacity(args.len());
    for (i, arg) in args.iter().enumerate() {
        match arg {
            Value::Number(n) => out.push(*n),
            _ => return Err(Error::arg_type("number", i + 1)),
        }
    }
    Ok(out)
}

// ── Arithmetic ──────────────────────────────────────────────────────

fn prim_add(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    let nums = numbers(args)?;
    Ok(Value::number(nums.iter().sum()))
}

fn prim_sub(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    let nums = numbers(args)?;
    match nums.split_first() {
        None => argc_error("-", "1+", 0),
        Some((first, [])) => Ok(Value::number(-first)),
        Some((first, rest)) => Ok(Value::number(rest.iter().fold(*first, |acc, n| acc - n))),
    }
}

fn prim_mul(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    let nums = numbers(args)?;
    Ok(Value::number(nums.iter().product()))
}

fn prim_div(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    let nums = numbers(args)?;
    match nums.split_first() {
        None => argc_error("/", "1+", 0),
        Some((first, [])) => Ok(Value::number(1.0 / first)),
        Some((first, rest)) => Ok(Value::number(rest.iter().fold(*first, |acc, n| acc / n))),
    }
}

fn prim_quotient(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    if args.len() != 2 {
        return argc_error("quotient", "2", args.len());
    }
    let nums = numbers(args)?;
    if nums[1] == 0.0 {
        return Err(Error::argument("Division by zero"));
    }
    Ok(Value::number((nums[0] / nums[1]).trunc()))
}

fn prim_remainder(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    if args.len() != 2 {
        return argc_error("remainder", "2", args.len());
    }
    let nums = numbers(args)?;
    if nums[1] == 0.0 {
        return Err(Error::argument("Division by zero"));
    }
    Ok(Value::number(nums[0] % nums[1]))
}

fn prim_modulo(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    if args.len() != 2 {
        return argc_error("modulo", "2", args.len());
    }
    let nums = numbers(args)?;
    if nums[1] == 0.0 {
        return Err(Error::argument("Division by zero"));
    }
    Ok(Value::number(nums[0].rem_euclid(nums[1])))
}

// ── Comparisons ─────────────────────────────────────────────────────

fn chain(
    name: &str,
    args: &[Value],
    test: fn(f64, f64) -> bool,
) -> Result<Value, Error> {
    if args.len() < 2 {
        return argc_error(name, "2+", args.len());
    }
    let nums = numbers(args)?;
    Ok(Value::boolean(nums.windows(2).all(|w| test(w[0], w[1]))))
}

fn prim_num_eq(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    chain("=", args, |a, b| a == b)
}

fn prim_lt(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    chain("<", args, |a, b| a < b)
}

fn prim_le(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    chain("<=", args, |a, b| a <= b)
}

fn prim_gt(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    chain(">", args, |a, b| a > b)
}

fn prim_ge(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    chain(">=", args, |a, b| a >= b)
}

fn prim_zero_p(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    if args.len() != 1 {
        return argc_error("zero?", "1", args.len());
    }
    Ok(Value::boolean(args[0].as_number()? == 0.0))
}

fn prim_abs(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    if args.len() != 1 {
        return argc_error("abs", "1", args.len());
    }
    Ok(Value::number(args[0].as_number()?.abs()))
}

fn prim_min(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    let nums = numbers(args)?;
    match nums.split_first() {
        None => argc_error("min", "1+", 0),
        Some((first, rest)) => Ok(Value::number(rest.iter().fold(*first, |a, b| a.min(*b)))),
    }
}

fn prim_max(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    let nums = numbers(args)?;
    match nums.split_first() {
        None => argc_error("max", "1+", 0),
        Some((first, rest)) => Ok(Value::number(rest.iter().fold(*first, |a, b| a.max(*b)))),
    }
}

// ── Lists ───────────────────────────────────────────────────────────

fn prim_cons(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    if args.len() != 2 {
        return argc_error("cons", "2", args.len());
    }
    Ok(cons(args[0].clone(), args[1].clone()))
}

fn pair_arg<'a>(name: &str, args: &'a [Value]) -> Result<&'a Value, Error> {
    if args.len() != 1 {
        return Err(Error::argc(name, "1", args.len()));
    }
    match &args[0] {
        Value::Pair(_) => Ok(&args[0]),
        _ => Err(Error::arg_type("list", 1)),
    }
}

fn prim_car(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    Ok(pair_arg("car", args)?.car())
}

fn prim_cdr(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    Ok(pair_arg("cdr", args)?.cdr())
}

fn prim_cadr(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    Ok(crate::value::cadr(pair_arg("cadr", args)?))
}

fn prim_cddr(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    Ok(crate::value::cddr(pair_arg("cddr", args)?))
}

fn prim_caddr(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    Ok(crate::value::caddr(pair_arg("caddr", args)?))
}

fn prim_list(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    Ok(list_from_slice(args))
}

fn prim_length(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    if args.len() != 1 {
        return argc_error("length", "1", args.len());
    }
    match args[0].length() {
        n if n >= 0 => Ok(Value::number(n as f64)),
        _ => Err(Error::arg_type("list", 1)),
    }
}

fn prim_reverse(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    if args.len() != 1 {
        return argc_error("reverse", "1", args.len());
    }
    let mut elements = args[0]
        .list_to_vec()
        .ok_or_else(|| Error::arg_type("list", 1))?;
    elements.reverse();
    Ok(list(elements))
}

/// Append lists; the final argument becomes the tail, so an improper
/// final argument yields an improper result.
fn prim_concat(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    match args.split_last() {
        None => Ok(Value::EmptyList),
        Some((last, init)) => {
            let mut result = last.clone();
            for arg in init.iter().rev() {
                let elements = arg
                    .list_to_vec()
                    .ok_or_else(|| Error::arg_type("list", 1))?;
                for element in elements.into_iter().rev() {
                    result = cons(element, result);
                }
            }
            Ok(result)
        }
    }
}

fn prim_list_to_vector(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    if args.len() != 1 {
        return argc_error("list->vector", "1", args.len());
    }
    let elements = args[0]
        .list_to_vec()
        .ok_or_else(|| Error::arg_type("list", 1))?;
    Ok(Value::vector(elements))
}

// ── Vectors ─────────────────────────────────────────────────────────

fn prim_vector(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::vector(args.to_vec()))
}

fn prim_make_vector(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    if args.is_empty() || args.len() > 2 {
        return argc_error("make-vector", "1-2", args.len());
    }
    let size = args[0].as_number()? as usize;
    let init = args.get(1).cloned().unwrap_or(Value::Null);
    Ok(Value::vector(vec![init; size]))
}

fn vector_arg<'a>(
    name: &str,
    args: &'a [Value],
    count: usize,
) -> Result<&'a std::rc::Rc<std::cell::RefCell<Vec<Value>>>, Error> {
    if args.len() != count {
        return Err(Error::argc(name, &count.to_string(), args.len()));
    }
    match &args[0] {
        Value::Vector(v) => Ok(v),
        _ => Err(Error::arg_type("vector", 1)),
    }
}

fn prim_vector_ref(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    let v = vector_arg("vector-ref", args, 2)?;
    let index = args[1].as_number()? as usize;
    v.borrow()
        .get(index)
        .cloned()
        .ok_or_else(|| Error::argument(format!("vector-ref index out of range: {}", index)))
}

fn prim_vector_set(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    let v = vector_arg("vector-set!", args, 3)?;
    let index = args[1].as_number()? as usize;
    let mut elements = v.borrow_mut();
    if index >= elements.len() {
        return Err(Error::argument(format!(
            "vector-set! index out of range: {}",
            index
        )));
    }
    elements[index] = args[2].clone();
    Ok(args[0].clone())
}

fn prim_vector_length(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    let v = vector_arg("vector-length", args, 1)?;
    let len = v.borrow().len();
    Ok(Value::number(len as f64))
}

fn prim_vector_to_list(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    let v = vector_arg("vector->list", args, 1)?;
    let elements = v.borrow().clone();
    Ok(list(elements))
}

// ── Structs ─────────────────────────────────────────────────────────

fn prim_struct(symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    new_struct(symbols, args)
}

fn prim_get(symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    if args.len() != 2 {
        return argc_error("get", "2", args.len());
    }
    struct_get(symbols, &args[0], &args[1])
}

fn prim_put(symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    if args.len() != 3 {
        return argc_error("put!", "3", args.len());
    }
    struct_put(symbols, &args[0], &args[1], args[2].clone())
}

fn prim_has(symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    if args.len() != 2 {
        return argc_error("has?", "2", args.len());
    }
    match &args[0] {
        Value::Struct(bindings) => {
            let key = StructKey::from_value(symbols, &args[1])?;
            Ok(Value::boolean(bindings.borrow().contains_key(&key)))
        }
        _ => Err(Error::arg_type("struct", 1)),
    }
}

fn prim_keys(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    if args.len() != 1 {
        return argc_error("keys", "1", args.len());
    }
    match &args[0] {
        Value::Struct(bindings) => Ok(list(
            bindings.borrow().keys().map(|k| k.to_value()).collect(),
        )),
        _ => Err(Error::arg_type("struct", 1)),
    }
}

fn prim_values(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    if args.len() != 1 {
        return argc_error("values", "1", args.len());
    }
    match &args[0] {
        Value::Struct(bindings) => Ok(list(bindings.borrow().values().cloned().collect())),
        _ => Err(Error::arg_type("struct", 1)),
    }
}

// ── Predicates ──────────────────────────────────────────────────────

fn prim_type(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    if args.len() != 1 {
        return argc_error("type", "1", args.len());
    }
    Ok(Value::Type(args[0].type_of()))
}

fn predicate(
    name: &str,
    args: &[Value],
    test: fn(&Value) -> bool,
) -> Result<Value, Error> {
    if args.len() != 1 {
        return Err(Error::argc(name, "1", args.len()));
    }
    Ok(Value::boolean(test(&args[0])))
}

fn prim_null_p(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    predicate("null?", args, |v| matches!(v, Value::Null))
}

fn prim_boolean_p(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    predicate("boolean?", args, |v| matches!(v, Value::Boolean(_)))
}

fn prim_character_p(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    predicate("character?", args, |v| matches!(v, Value::Character(_)))
}

fn prim_number_p(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    predicate("number?", args, |v| matches!(v, Value::Number(_)))
}

fn prim_string_p(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    predicate("string?", args, |v| matches!(v, Value::String(_)))
}

fn prim_symbol_p(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    predicate("symbol?", args, |v| matches!(v, Value::Symbol(_)))
}

fn prim_keyword_p(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    predicate("keyword?", args, |v| matches!(v, Value::Keyword(_)))
}

fn prim_type_p(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    predicate("type?", args, |v| matches!(v, Value::Type(_)))
}

fn prim_list_p(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    predicate("list?", args, |v| v.is_list())
}

fn prim_pair_p(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    predicate("pair?", args, |v| v.is_pair())
}

fn prim_empty_p(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    predicate("empty?", args, |v| matches!(v, Value::EmptyList))
}

fn prim_vector_p(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    predicate("vector?", args, |v| matches!(v, Value::Vector(_)))
}

fn prim_struct_p(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    predicate("struct?", args, |v| matches!(v, Value::Struct(_)))
}

fn prim_function_p(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    predicate("function?", args, |v| matches!(v, Value::Function(_)))
}

fn prim_equal_p(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    if args.len() != 2 {
        return argc_error("equal?", "2", args.len());
    }
    Ok(Value::boolean(equal(&args[0], &args[1])))
}

fn prim_identical_p(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    if args.len() != 2 {
        return argc_error("identical?", "2", args.len());
    }
    Ok(Value::boolean(identical(&args[0], &args[1])))
}

fn prim_not(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    if args.len() != 1 {
        return argc_error("not", "1", args.len());
    }
    Ok(Value::boolean(args[0].is_false()))
}

// ── Strings and atoms ───────────────────────────────────────────────

fn prim_string(symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    let mut out = String::new();
    for arg in args {
        out.push_str(&writer::display(arg, symbols));
    }
    Ok(Value::string(out))
}

fn prim_string_length(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    if args.len() != 1 {
        return argc_error("string-length", "1", args.len());
    }
    match &args[0] {
        Value::String(s) => Ok(Value::number(s.chars().count() as f64)),
        _ => Err(Error::arg_type("string", 1)),
    }
}

fn prim_number_to_string(symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    if args.len() != 1 {
        return argc_error("number->string", "1", args.len());
    }
    args[0].as_number()?;
    Ok(Value::string(writer::write(&args[0], symbols)))
}

fn prim_to_string(symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    if args.len() != 1 {
        return argc_error("to-string", "1", args.len());
    }
    Ok(Value::string(writer::write(&args[0], symbols)))
}

fn prim_intern(symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    if args.len() != 1 {
        return argc_error("intern", "1", args.len());
    }
    match &args[0] {
        Value::String(s) => Ok(symbols.intern_value(s)),
        _ => Err(Error::arg_type("string", 1)),
    }
}

fn prim_gensym(symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    let prefix = match args.first() {
        None => "g".to_string(),
        Some(Value::String(s)) => s.to_string(),
        Some(_) => return Err(Error::arg_type("string", 1)),
    };
    Ok(Value::Symbol(symbols.gensym(&prefix)))
}

fn prim_instance(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    if args.len() != 2 {
        return argc_error("instance", "2", args.len());
    }
    match &args[0] {
        Value::Type(tag) => {
            // a primitive type tag wraps nothing
            if (wk::NULL_TYPE.0..=wk::ANY_TYPE.0).contains(&tag.0) {
                Ok(args[1].clone())
            } else {
                Ok(Value::instance(*tag, args[1].clone()))
            }
        }
        _ => Err(Error::arg_type("type", 1)),
    }
}

// ── I/O and meta ────────────────────────────────────────────────────

fn prim_display(symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    if args.len() != 1 {
        return argc_error("display", "1", args.len());
    }
    print!("{}", writer::display(&args[0], symbols));
    Ok(Value::Null)
}

fn prim_print(symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    for arg in args {
        print!("{}", writer::display(arg, symbols));
    }
    Ok(Value::Null)
}

fn prim_println(symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    for arg in args {
        print!("{}", writer::display(arg, symbols));
    }
    println!();
    Ok(Value::Null)
}

fn prim_newline(_symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    if !args.is_empty() {
        return argc_error("newline", "0", args.len());
    }
    println!();
    Ok(Value::Null)
}

fn prim_write(symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    if args.len() != 1 {
        return argc_error("write", "1", args.len());
    }
    Ok(Value::string(writer::write(&args[0], symbols)))
}

fn prim_json(symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    if args.len() != 1 {
        return argc_error("json", "1", args.len());
    }
    writer::to_json(&args[0], symbols).map(Value::string)
}

fn prim_read(symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    if args.len() != 1 {
        return argc_error("read", "1", args.len());
    }
    match &args[0] {
        Value::String(s) => {
            let text = s.to_string();
            reader::read_str(&text, symbols)
        }
        _ => Err(Error::arg_type("string", 1)),
    }
}

/// Raise an error value. A leading keyword selects the category;
/// everything else becomes the message.
fn prim_error(symbols: &mut SymbolTable, args: &[Value]) -> Result<Value, Error> {
    let (key, rest) = match args.first() {
        Some(Value::Keyword(id)) => (*id, &args[1..]),
        _ => (wk::ERROR, args),
    };
    let message: String = rest
        .iter()
        .map(|v| writer::display(v, symbols))
        .collect::<Vec<_>>()
        .join("");
    Err(Error::new(key, message))
}
