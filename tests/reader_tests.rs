// Reader/writer contract: literal forms, sugar, canonical output,
// and the JSON mode.

mod common;

use common::Interp;
use sable::{read_str, writer, Value};

/// Read a form and write it back canonically.
fn roundtrip(interp: &mut Interp, input: &str) -> String {
    let value = read_str(input, &mut interp.symbols).unwrap();
    writer::write(&value, &interp.symbols)
}

#[test]
fn test_canonical_forms_roundtrip() {
    let mut interp = Interp::new();
    for form in [
        "1",
        "2.5",
        "-3",
        "()",
        "(1 2 3)",
        "(1 . 2)",
        "(1 2 . 3)",
        "foo",
        "foo:",
        "<point>",
        "\"hello\\nworld\"",
        "[1 [2] 3]",
        "true",
        "false",
        "null",
        "'x",
        "#\\a",
        "#\\space",
        "(a (b (c)))",
    ] {
        assert_eq!(roundtrip(&mut interp, form), form);
    }
}

#[test]
fn test_read_of_write_is_equal() {
    let mut interp = Interp::new();
    let forms = [
        "(define (f x) (+ x 1))",
        "{x 1 y (2 3)}",
        "[#\\a \"s\" 4.25]",
        "'(quoted (list))",
    ];
    for form in forms {
        let first = read_str(form, &mut interp.symbols).unwrap();
        let written = writer::write(&first, &interp.symbols);
        let second = read_str(&written, &mut interp.symbols).unwrap();
        assert_eq!(first, second, "form: {}", form);
    }
}

#[test]
fn test_number_formats() {
    let mut interp = Interp::new();
    assert_eq!(roundtrip(&mut interp, "1.0"), "1");
    assert_eq!(roundtrip(&mut interp, "1e3"), "1000");
    assert_eq!(roundtrip(&mut interp, "+5"), "5");
}

#[test]
fn test_scheme_vector_spelling() {
    let mut interp = Interp::new();
    assert_eq!(roundtrip(&mut interp, "#(1 2)"), "[1 2]");
}

#[test]
fn test_comments_and_commas() {
    let mut interp = Interp::new();
    let value = read_str("(1, 2, ; comment\n 3)", &mut interp.symbols).unwrap();
    assert_eq!(writer::write(&value, &interp.symbols), "(1 2 3)");
}

#[test]
fn test_read_all_stream() {
    let mut interp = Interp::new();
    let values = sable::read_all("1 2 (3)", &mut interp.symbols).unwrap();
    assert_eq!(values.len(), 3);
}

#[test]
fn test_character_spellings() {
    let mut interp = Interp::new();
    assert_eq!(roundtrip(&mut interp, "#\\newline"), "#\\newline");
    assert_eq!(roundtrip(&mut interp, "#\\x0041"), "#\\A");
    assert_eq!(roundtrip(&mut interp, "#\\x263A"), "#\\x263A");
}

#[test]
fn test_reader_errors_are_syntax_errors() {
    let mut interp = Interp::new();
    for bad in ["(", ")", "\"open", "#\\badname", "#q", "(1 . 2 3)", "{x}"] {
        let err = read_str(bad, &mut interp.symbols).unwrap_err();
        assert!(
            err.to_string().starts_with("syntax-error:"),
            "{} gave {}",
            bad,
            err
        );
    }
}

#[test]
fn test_json_mode() {
    let mut interp = Interp::new();
    let value = interp.eval_ok("{x: 1.5 y: [true false null \"s\"]}");
    let json = writer::to_json(&value, &interp.symbols).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed["x"], serde_json::json!(1.5));
    assert_eq!(parsed["y"][0], serde_json::json!(true));
    assert_eq!(parsed["y"][2], serde_json::Value::Null);
}

#[test]
fn test_json_rejections() {
    let mut interp = Interp::new();
    for form in ["'sym", "'(1 2)", "#\\a"] {
        let value = interp.eval_ok(form);
        assert!(
            writer::to_json(&value, &interp.symbols).is_err(),
            "expected rejection: {}",
            form
        );
    }
}

#[test]
fn test_json_primitive() {
    let mut interp = Interp::new();
    assert_eq!(interp.eval_ok("(json [1.5 true])"), Value::string("[1.5,true]"));
    assert!(interp.eval("(json 'sym)").is_err());
}

#[test]
fn test_read_primitive() {
    let mut interp = Interp::new();
    assert_eq!(interp.eval_ok("(car (read \"(10 20)\"))"), Value::number(10.0));
}

#[test]
fn test_write_primitive_escapes() {
    let mut interp = Interp::new();
    assert_eq!(
        interp.eval_ok("(write \"a\\nb\")"),
        Value::string("\"a\\nb\"")
    );
}
