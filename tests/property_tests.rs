// Property tests over the value model, the writer/reader pair, and
// the compiler.

mod common;

use common::Interp;
use proptest::prelude::*;
use sable::compiler::code::Opcode;
use sable::value::{cons, equal, list};
use sable::{compile, read_str, writer, SymbolTable, Value};

/// Abstract value description, independent of any symbol table.
#[derive(Debug, Clone)]
enum Shape {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    Char(char),
    Sym(usize),
    Keyword(usize),
    EmptyList,
    List(Vec<Shape>),
    Dotted(Vec<Shape>, Box<Shape>),
    Vector(Vec<Shape>),
    Struct(Vec<(usize, Shape)>),
}

const SYMBOL_POOL: &[&str] = &[
    "alpha", "beta", "gamma", "delta", "x", "y", "zap", "foo-bar", "p?", "set-x!",
];

fn build(shape: &Shape, symbols: &mut SymbolTable) -> Value {
    match shape {
        Shape::Null => Value::Null,
        Shape::Bool(b) => Value::boolean(*b),
        Shape::Num(n) => Value::number(*n),
        Shape::Str(s) => Value::string(s.clone()),
        Shape::Char(c) => Value::Character(*c),
        Shape::Sym(i) => Value::Symbol(symbols.intern(SYMBOL_POOL[i % SYMBOL_POOL.len()])),
        Shape::Keyword(i) => {
            let text = format!("{}:", SYMBOL_POOL[i % SYMBOL_POOL.len()]);
            symbols.intern_value(&text)
        }
        Shape::EmptyList => Value::EmptyList,
        Shape::List(items) => list(items.iter().map(|s| build(s, symbols)).collect()),
        Shape::Dotted(items, tail) => {
            let mut result = build(tail, symbols);
            for item in items.iter().rev() {
                result = cons(build(item, symbols), result);
            }
            result
        }
        Shape::Vector(items) => {
            Value::vector(items.iter().map(|s| build(s, symbols)).collect())
        }
        Shape::Struct(entries) => {
            let mut flat = Vec::new();
            for (key, val) in entries {
                flat.push(Value::Symbol(
                    symbols.intern(SYMBOL_POOL[key % SYMBOL_POOL.len()]),
                ));
                flat.push(build(val, symbols));
            }
            sable::value::new_struct(symbols, &flat).unwrap()
        }
    }
}

/// Leaf values whose canonical text reads back unchanged. Numbers are
/// finite (NaN and infinities have no reader form).
fn arb_leaf() -> impl Strategy<Value = Shape> {
    prop_oneof![
        1 => Just(Shape::Null),
        1 => Just(Shape::EmptyList),
        1 => any::<bool>().prop_map(Shape::Bool),
        6 => (-1e9f64..1e9).prop_map(Shape::Num),
        2 => (0i64..10000).prop_map(|n| Shape::Num(n as f64)),
        3 => (0usize..SYMBOL_POOL.len()).prop_map(Shape::Sym),
        2 => (0usize..SYMBOL_POOL.len()).prop_map(Shape::Keyword),
        2 => "[a-zA-Z0-9 _.!-]{0,12}".prop_map(Shape::Str),
        1 => prop::char::range('a', 'z').prop_map(Shape::Char),
        1 => Just(Shape::Char(' ')),
        1 => Just(Shape::Char('\n')),
    ]
}

fn arb_shape() -> impl Strategy<Value = Shape> {
    arb_leaf().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            4 => prop::collection::vec(inner.clone(), 0..4).prop_map(Shape::List),
            1 => (prop::collection::vec(inner.clone(), 1..3), arb_leaf())
                .prop_filter("dotted tail must not read as a list", |(_, tail)| {
                    !matches!(tail, Shape::EmptyList | Shape::List(_))
                })
                .prop_map(|(items, tail)| Shape::Dotted(items, Box::new(tail))),
            3 => prop::collection::vec(inner.clone(), 0..4).prop_map(Shape::Vector),
            2 => prop::collection::vec(((0usize..SYMBOL_POOL.len()), inner), 0..3)
                .prop_map(Shape::Struct),
        ]
    })
}

proptest! {
    #[test]
    fn prop_intern_identity(text in "[a-z][a-z0-9-]{0,16}") {
        let mut symbols = SymbolTable::new();
        let a = symbols.intern(&text);
        let b = symbols.intern(&text);
        prop_assert_eq!(a, b);
        prop_assert_eq!(symbols.name(a), text.as_str());
    }

    #[test]
    fn prop_write_read_roundtrip(shape in arb_shape()) {
        let mut symbols = SymbolTable::new();
        let value = build(&shape, &mut symbols);
        let written = writer::write(&value, &symbols);
        let read_back = read_str(&written, &mut symbols).unwrap();
        prop_assert!(
            equal(&value, &read_back),
            "wrote {} which read back as {}",
            written,
            writer::write(&read_back, &symbols)
        );
    }

    #[test]
    fn prop_equal_reflexive(shape in arb_shape()) {
        let mut symbols = SymbolTable::new();
        let value = build(&shape, &mut symbols);
        prop_assert!(equal(&value, &value));
    }

    #[test]
    fn prop_equal_symmetric(a in arb_shape(), b in arb_shape()) {
        let mut symbols = SymbolTable::new();
        let va = build(&a, &mut symbols);
        let vb = build(&b, &mut symbols);
        prop_assert_eq!(equal(&va, &vb), equal(&vb, &va));
    }

    #[test]
    fn prop_compile_ends_with_return(shape in arb_shape()) {
        let mut symbols = SymbolTable::new();
        let value = build(&shape, &mut symbols);
        // quoting makes any datum a compilable core expression
        let expr = list(vec![
            Value::Symbol(sable::symbol::wk::QUOTE),
            value,
        ]);
        let code = compile(&mut symbols, &expr).unwrap();
        prop_assert_eq!(*code.ops.last().unwrap(), Opcode::Return as i32);
    }

    #[test]
    fn prop_identical_implies_equal(shape in arb_shape()) {
        let mut symbols = SymbolTable::new();
        let value = build(&shape, &mut symbols);
        let alias = value.clone();
        prop_assert!(sable::value::identical(&value, &alias));
        prop_assert!(equal(&value, &alias));
    }

    #[test]
    fn prop_arithmetic_agrees_with_host(a in -1000i64..1000, b in -1000i64..1000) {
        let mut interp = Interp::new();
        let result = interp.eval_ok(&format!("(+ {} {})", a, b));
        prop_assert!(equal(&result, &Value::number((a + b) as f64)));
    }

    #[test]
    fn prop_deep_tail_recursion_is_flat(depth in 1u32..20_000) {
        let mut interp = Interp::new();
        interp.eval_ok("(define (spin n) (if (= n 0) 'done (spin (- n 1))))");
        let result = interp.eval_to_string(&format!("(spin {})", depth));
        prop_assert_eq!(result, "done");
    }
}

#[test]
fn test_deep_tail_recursion_at_full_depth() {
    let mut interp = Interp::new();
    interp.eval_ok("(define (spin n) (if (= n 0) 'done (spin (- n 1))))");
    assert_eq!(interp.eval_to_string("(spin 1000000)"), "done");
}
