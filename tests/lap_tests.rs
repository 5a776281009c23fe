// The textual bytecode form: decompiling a Code object and loading
// it back must preserve behavior.

mod common;

use common::Interp;
use sable::compiler::code::load_func;
use sable::{compile, macroexpand, read_str, Value};
use std::rc::Rc;

fn num(n: f64) -> Value {
    Value::number(n)
}

/// Compile a source form, decompile it, re-read and re-load it, and
/// execute both; results must agree.
fn roundtrip_exec(interp: &mut Interp, source: &str) -> (Value, Value) {
    let expr = read_str(source, &mut interp.symbols).unwrap();
    let expanded = macroexpand(&mut interp.symbols, &mut interp.vm, &expr).unwrap();
    let code = compile(&mut interp.symbols, &expanded).unwrap();
    let direct = interp.vm.execute(&code, &mut interp.symbols).unwrap();

    let text = code.decompile(&interp.symbols, false);
    let form = read_str(&text, &mut interp.symbols).unwrap();
    let reloaded = load_func(&mut interp.symbols, &form).unwrap();
    let replayed = interp
        .vm
        .execute(&Rc::new(reloaded), &mut interp.symbols)
        .unwrap();
    (direct, replayed)
}

#[test]
fn test_roundtrip_arithmetic() {
    let mut interp = Interp::new();
    let (direct, replayed) = roundtrip_exec(&mut interp, "(+ 1 (* 2 3))");
    assert_eq!(direct, num(7.0));
    assert_eq!(replayed, num(7.0));
}

#[test]
fn test_roundtrip_conditional() {
    let mut interp = Interp::new();
    let (direct, replayed) = roundtrip_exec(&mut interp, "(if (< 1 2) 'yes 'no)");
    assert_eq!(direct, replayed);
}

#[test]
fn test_roundtrip_closure() {
    let mut interp = Interp::new();
    let (direct, replayed) = roundtrip_exec(&mut interp, "((lambda (x y) (+ x y)) 3 4)");
    assert_eq!(direct, num(7.0));
    assert_eq!(replayed, num(7.0));
}

#[test]
fn test_roundtrip_vector_and_struct() {
    let mut interp = Interp::new();
    let (direct, replayed) = roundtrip_exec(&mut interp, "(vector-ref [10 20 30] 2)");
    assert_eq!(direct, num(30.0));
    assert_eq!(replayed, num(30.0));
    let (direct, replayed) = roundtrip_exec(&mut interp, "(get {x: 1} 'x)");
    assert_eq!(direct, num(1.0));
    assert_eq!(replayed, num(1.0));
}

#[test]
fn test_decompile_shape() {
    let mut interp = Interp::new();
    let expr = read_str("(lambda (a b) a)", &mut interp.symbols).unwrap();
    let code = compile(&mut interp.symbols, &expr).unwrap();
    let text = code.decompile(&interp.symbols, false);
    assert!(text.starts_with("(func (\"\" 0 null null)"), "got: {}", text);
    assert!(text.contains("(closure (func"), "got: {}", text);
    assert!(text.ends_with("(return))"), "got: {}", text);
}

#[test]
fn test_decompile_records_parameter_descriptor() {
    let mut interp = Interp::new();
    let expr = read_str("(lambda (a . r) a)", &mut interp.symbols).unwrap();
    let code = compile(&mut interp.symbols, &expr).unwrap();
    let text = code.decompile(&interp.symbols, false);
    // rest parameter: defaults present but empty
    assert!(text.contains("(func (\"\" 1 [] null)"), "got: {}", text);
}

#[test]
fn test_lap_special_form() {
    let mut interp = Interp::new();
    assert_eq!(interp.eval_ok("(lap (literal 42) (return))"), num(42.0));
}

#[test]
fn test_lap_jump() {
    let mut interp = Interp::new();
    // jumpfalse over the consequent: (if #f 1 2) written by hand
    let result = interp.eval_ok(
        "(lap (literal #f) (jumpfalse 5) (literal 1) (return) (literal 2) (return))",
    );
    assert_eq!(result, num(2.0));
}

#[test]
fn test_lap_globals() {
    let mut interp = Interp::new();
    assert_eq!(
        interp.eval_ok("(lap (literal 2) (literal 3) (global +) (call 2) (return))"),
        num(5.0)
    );
}
