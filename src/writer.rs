//! Canonical rendering of values, plus the JSON output mode.
//!
//! The canonical form matches the reader grammar: quote sugar for
//! `(quote x)`, vectors in `[…]`, structs in `{k v …}`, numbers
//! without trailing zeros, escaped strings, named characters, and
//! `true`/`false`/`null` spellings. JSON mode maps booleans and null
//! to the JSON literals, comma-separates vector and struct elements,
//! and rejects everything JSON cannot express.

use crate::error::Error;
use crate::symbol::{wk, SymbolTable};
use crate::value::{Function, StructKey, Value};

/// Render a value in canonical, reader-compatible form.
pub fn write(value: &Value, symbols: &SymbolTable) -> String {
    let mut out = String::new();
    write_value(&mut out, value, symbols);
    out
}

/// Like [`write`], but strings and characters render raw, for user
/// output.
pub fn display(value: &Value, symbols: &SymbolTable) -> String {
    match value {
        Value::String(s) => s.to_string(),
        Value::Character(c) => c.to_string(),
        _ => write(value, symbols),
    }
}

fn write_value(out: &mut String, value: &Value, symbols: &SymbolTable) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Boolean(true) => out.push_str("true"),
        Value::Boolean(false) => out.push_str("false"),
        Value::Number(n) => out.push_str(&format_number(*n)),
        Value::Character(c) => out.push_str(&write_character(*c)),
        Value::String(s) => encode_string(out, s),
        Value::Blob(b) => out.push_str(&format!("#[blob {} bytes]", b.len())),
        Value::Symbol(id) | Value::Keyword(id) | Value::Type(id) => {
            out.push_str(symbols.name(*id))
        }
        Value::EmptyList => out.push_str("()"),
        Value::Pair(p) => {
            // 'x sugar for (quote x)
            if p.car.as_symbol() == Some(wk::QUOTE) {
                if let Value::Pair(q) = &p.cdr {
                    if matches!(q.cdr, Value::EmptyList) {
                        out.push('\'');
                        write_value(out, &q.car, symbols);
                        return;
                    }
                }
            }
            out.push('(');
            write_value(out, &p.car, symbols);
            let mut tail = p.cdr.clone();
            loop {
                match tail {
                    Value::EmptyList => break,
                    Value::Pair(q) => {
                        out.push(' ');
                        write_value(out, &q.car, symbols);
                        tail = q.cdr.clone();
                    }
                    other => {
                        out.push_str(" . ");
                        write_value(out, &other, symbols);
                        break;
                    }
                }
            }
            out.push(')');
        }
        Value::Vector(elements) => {
            out.push('[');
            for (i, element) in elements.borrow().iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                write_value(out, element, symbols);
            }
            out.push(']');
        }
        Value::Struct(bindings) => {
            out.push('{');
            for (i, (key, val)) in bindings.borrow().iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                write_value(out, &key.to_value(), symbols);
                out.push(' ');
                write_value(out, val, symbols);
            }
            out.push('}');
        }
        Value::Function(Function::Closure(c)) => {
            if c.code.name.is_empty() {
                out.push_str(&format!("#[function {}]", c.code.signature()));
            } else {
                out.push_str(&format!("#[function {} {}]", c.code.name, c.code.signature()));
            }
        }
        Value::Function(Function::Primitive(p)) => {
            out.push_str(&format!("#[primitive-function {} {}]", p.name, p.signature))
        }
        Value::Function(Function::Apply) => {
            out.push_str("#[function apply (<function> <any>* <list>)]")
        }
        Value::Function(Function::CallCC) => out.push_str("#[function callcc (<function>)]"),
        Value::Code(code) => out.push_str(&code.decompile(symbols, false)),
        Value::Error(err) => out.push_str(&format!("#<error> {}", err)),
        Value::Instance(inst) => {
            out.push_str(&format!("#{}", symbols.name(inst.tag)));
            write_value(out, &inst.value, symbols);
        }
    }
}

/// Shortest decimal form without trailing zeros.
fn format_number(n: f64) -> String {
    format!("{}", n)
}

fn encode_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('"');
}

fn write_character(c: char) -> String {
    match c {
        '\0' => "#\\null".to_string(),
        '\u{7}' => "#\\alarm".to_string(),
        '\u{8}' => "#\\backspace".to_string(),
        '\t' => "#\\tab".to_string(),
        '\n' => "#\\newline".to_string(),
        '\r' => "#\\return".to_string(),
        '\u{1b}' => "#\\escape".to_string(),
        ' ' => "#\\space".to_string(),
        '\u{7f}' => "#\\delete".to_string(),
        c if (c as u32) < 127 => format!("#\\{}", c),
        c => format!("#\\x{:04X}", c as u32),
    }
}

/// Render a value as JSON, or an error if it cannot be expressed.
pub fn to_json(value: &Value, symbols: &SymbolTable) -> Result<String, Error> {
    json_value(value, symbols).map(|j| j.to_string())
}

fn json_value(value: &Value, symbols: &SymbolTable) -> Result<serde_json::Value, Error> {
    match value {
        Value::Null => Ok(serde_json::Value::Null),
        Value::Boolean(b) => Ok(serde_json::Value::Bool(*b)),
        Value::Number(n) => serde_json::Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .ok_or_else(|| Error::generic(format!("number cannot be described in JSON: {}", n))),
        Value::String(s) => Ok(serde_json::Value::String(s.to_string())),
        Value::Vector(elements) => {
            let mut array = Vec::new();
            for element in elements.borrow().iter() {
                array.push(json_value(element, symbols)?);
            }
            Ok(serde_json::Value::Array(array))
        }
        Value::Struct(bindings) => {
            let mut object = serde_json::Map::new();
            for (key, val) in bindings.borrow().iter() {
                let name = match key {
                    StructKey::Atom(id) => symbols.name(*id).to_string(),
                    StructKey::Str(s) => s.to_string(),
                    StructKey::Num(bits) => format_number(f64::from_bits(*bits)),
                    StructKey::Char(c) => c.to_string(),
                };
                object.insert(name, json_value(val, symbols)?);
            }
            Ok(serde_json::Value::Object(object))
        }
        Value::Symbol(_) | Value::Keyword(_) | Value::Type(_) => Err(Error::generic(format!(
            "symbol cannot be described in JSON: {}",
            write(value, symbols)
        ))),
        Value::Pair(_) | Value::EmptyList => Err(Error::generic(format!(
            "pair cannot be described in JSON: {}",
            write(value, symbols)
        ))),
        Value::Character(_) => Err(Error::generic(format!(
            "character cannot be described in JSON: {}",
            write(value, symbols)
        ))),
        Value::Code(_) => Err(Error::generic("code cannot be described in JSON")),
        _ => Err(Error::generic(format!(
            "data cannot be described in JSON: {}",
            write(value, symbols)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{cons, list};

    #[test]
    fn test_numbers_without_trailing_zeros() {
        assert_eq!(format_number(1.0), "1");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(-3.0), "-3");
    }

    #[test]
    fn test_quote_sugar() {
        let mut symbols = SymbolTable::new();
        let x = symbols.intern("x");
        let quoted = list(vec![Value::Symbol(wk::QUOTE), Value::Symbol(x)]);
        assert_eq!(write(&quoted, &symbols), "'x");
    }

    #[test]
    fn test_dotted_pair() {
        let symbols = SymbolTable::new();
        let pair = cons(Value::number(1.0), Value::number(2.0));
        assert_eq!(write(&pair, &symbols), "(1 . 2)");
    }

    #[test]
    fn test_json_rejects_symbols() {
        let mut symbols = SymbolTable::new();
        let x = symbols.intern("x");
        assert!(to_json(&Value::Symbol(x), &symbols).is_err());
    }

    #[test]
    fn test_json_vector() {
        let symbols = SymbolTable::new();
        let v = Value::vector(vec![Value::number(1.0), Value::TRUE, Value::Null]);
        assert_eq!(to_json(&v, &symbols).unwrap(), "[1.0,true,null]");
    }
}
