//! The s-expression reader: text to values.
//!
//! Whitespace separates tokens and a bare comma is a separator too;
//! comments run from `;` to end of line. Lists read with an optional
//! dotted tail, `[…]` reads a vector, `{…}` a struct, `'x` quotes,
//! `` `x `` quasiquotes, `,x`/`,@x` unquote and splice. `#t`, `#f`,
//! `#\name` characters, and `#(…)` vectors are the reader macros.
//! The atoms `true`, `false`, and `null` read as literals; an atom
//! with a trailing `:` reads as a self-evaluating keyword.

use crate::error::Error;
use crate::symbol::{wk, SymbolTable};
use crate::value::{cons, list, new_struct, Value};

/// Read the first datum from a string; Null when the input is empty.
pub fn read_str(input: &str, symbols: &mut SymbolTable) -> Result<Value, Error> {
    let mut reader = Reader::new(input);
    Ok(reader.read_value(symbols)?.unwrap_or(Value::Null))
}

/// Read every datum from a string.
pub fn read_all(input: &str, symbols: &mut SymbolTable) -> Result<Vec<Value>, Error> {
    let mut reader = Reader::new(input);
    let mut values = Vec::new();
    while let Some(value) = reader.read_value(symbols)? {
        values.push(value);
    }
    Ok(values)
}

fn is_delimiter(c: char) -> bool {
    matches!(
        c,
        '(' | ')' | '[' | ']' | '{' | '}' | '"' | '\'' | ';' | '`' | ','
    )
}

/// A comma acts as whitespace unless it introduces `,x` or `,@x`.
fn comma_is_separator(next: Option<char>) -> bool {
    match next {
        None => true,
        Some(c) => c.is_whitespace() || matches!(c, ')' | ']' | '}' | ',' | ';'),
    }
}

pub struct Reader<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    col: usize,
}

impl<'a> Reader<'a> {
    pub fn new(input: &'a str) -> Self {
        Reader {
            input,
            bytes: input.as_bytes(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn current(&self) -> Option<char> {
        if self.pos >= self.bytes.len() {
            return None;
        }
        let byte = self.bytes[self.pos];
        if byte < 128 {
            Some(byte as char)
        } else {
            self.input[self.pos..].chars().next()
        }
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.current();
        if let Some(ch) = c {
            if ch == '\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
            self.pos += ch.len_utf8();
        }
        c
    }

    fn peek(&self, offset: usize) -> Option<char> {
        let mut chars = self.input[self.pos..].chars();
        for _ in 0..offset {
            chars.next()?;
        }
        chars.next()
    }

    fn err(&self, message: impl Into<String>) -> Error {
        Error::syntax(format!(
            "{} at {}:{}",
            message.into(),
            self.line,
            self.col
        ))
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.current() {
            if c.is_whitespace() {
                self.advance();
            } else if c == ';' {
                while let Some(c) = self.advance() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    /// Read the next datum, or None at end of input.
    pub fn read_value(&mut self, symbols: &mut SymbolTable) -> Result<Option<Value>, Error> {
        loop {
            self.skip_whitespace();
            let c = match self.current() {
                None => return Ok(None),
                Some(c) => c,
            };
            return match c {
                '(' => {
                    self.advance();
                    self.read_list(symbols).map(Some)
                }
                '[' => {
                    self.advance();
                    let (items, _) = self.read_sequence(']', false, symbols)?;
                    Ok(Some(Value::vector(items)))
                }
                '{' => {
                    self.advance();
                    let (items, _) = self.read_sequence('}', false, symbols)?;
                    if items.len() % 2 != 0 {
                        return Err(self.err("Struct literal requires key/value pairs"));
                    }
                    new_struct(symbols, &items)
                        .map(Some)
                        .map_err(|err| self.err(err.to_string()))
                }
                ')' | ']' | '}' => Err(self.err(format!("Unexpected '{}'", c))),
                '"' => {
                    self.advance();
                    self.read_string().map(Some)
                }
                '\'' => {
                    self.advance();
                    let datum = self.require_value(symbols)?;
                    Ok(Some(list(vec![Value::Symbol(wk::QUOTE), datum])))
                }
                '`' => {
                    self.advance();
                    let datum = self.require_value(symbols)?;
                    Ok(Some(list(vec![Value::Symbol(wk::QUASIQUOTE), datum])))
                }
                ',' => {
                    // a bare comma is a separator; `,x` unquotes and
                    // `,@x` splices
                    match self.peek(1) {
                        Some('@') => {
                            self.advance();
                            self.advance();
                            let datum = self.require_value(symbols)?;
                            Ok(Some(list(vec![
                                Value::Symbol(wk::UNQUOTE_SPLICING),
                                datum,
                            ])))
                        }
                        next if comma_is_separator(next) => {
                            self.advance();
                            continue;
                        }
                        _ => {
                            self.advance();
                            let datum = self.require_value(symbols)?;
                            Ok(Some(list(vec![Value::Symbol(wk::UNQUOTE), datum])))
                        }
                    }
                }
                '#' => {
                    self.advance();
                    self.read_reader_macro(symbols).map(Some)
                }
                _ => self.read_atom(symbols).map(Some),
            };
        }
    }

    fn require_value(&mut self, symbols: &mut SymbolTable) -> Result<Value, Error> {
        self.read_value(symbols)?
            .ok_or_else(|| self.err("Unexpected end of input"))
    }

    fn read_list(&mut self, symbols: &mut SymbolTable) -> Result<Value, Error> {
        let (items, tail) = self.read_sequence(')', true, symbols)?;
        let mut result = tail.unwrap_or(Value::EmptyList);
        for item in items.into_iter().rev() {
            result = cons(item, result);
        }
        Ok(result)
    }

    /// Read elements up to `end`; when `allow_dot`, a `.` introduces
    /// the tail of a dotted pair.
    fn read_sequence(
        &mut self,
        end: char,
        allow_dot: bool,
        symbols: &mut SymbolTable,
    ) -> Result<(Vec<Value>, Option<Value>), Error> {
        let mut items = Vec::new();
        let mut tail: Option<Value> = None;
        loop {
            self.skip_whitespace();
            let c = match self.current() {
                None => return Err(self.err(format!("Unterminated sequence, expected '{}'", end))),
                Some(c) => c,
            };
            if c == end {
                self.advance();
                return Ok((items, tail));
            }
            if c == ',' && comma_is_separator(self.peek(1)) {
                self.advance();
                continue;
            }
            if tail.is_some() {
                return Err(self.err("Object beyond tail of dotted pair"));
            }
            if allow_dot
                && c == '.'
                && self
                    .peek(1)
                    .map(|n| n.is_whitespace() || is_delimiter(n))
                    .unwrap_or(true)
            {
                self.advance();
                tail = Some(self.require_value(symbols)?);
                continue;
            }
            items.push(self.require_value(symbols)?);
        }
    }

    fn read_string(&mut self) -> Result<Value, Error> {
        let mut s = String::new();
        loop {
            match self.advance() {
                None => return Err(self.err("Unterminated string")),
                Some('"') => return Ok(Value::string(s)),
                Some('\\') => match self.advance() {
                    None => return Err(self.err("Unterminated string escape")),
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some('r') => s.push('\r'),
                    Some('f') => s.push('\u{c}'),
                    Some('b') => s.push('\u{8}'),
                    Some('0') => s.push('\0'),
                    Some('u') => {
                        let mut hex = String::new();
                        for _ in 0..4 {
                            match self.advance() {
                                Some(c) => hex.push(c),
                                None => return Err(self.err("Unterminated string escape")),
                            }
                        }
                        let scalar = u32::from_str_radix(&hex, 16)
                            .ok()
                            .and_then(char::from_u32)
                            .ok_or_else(|| self.err(format!("Bad unicode escape: \\u{}", hex)))?;
                        s.push(scalar);
                    }
                    Some(c) => s.push(c),
                },
                Some(c) => s.push(c),
            }
        }
    }

    fn read_reader_macro(&mut self, symbols: &mut SymbolTable) -> Result<Value, Error> {
        match self.current() {
            None => Err(self.err("Unexpected end of input after '#'")),
            Some('t') => {
                self.advance();
                Ok(Value::TRUE)
            }
            Some('f') => {
                self.advance();
                Ok(Value::FALSE)
            }
            Some('(') => {
                self.advance();
                let (items, _) = self.read_sequence(')', false, symbols)?;
                Ok(Value::vector(items))
            }
            Some('\\') => {
                self.advance();
                self.read_character()
            }
            Some(c) => Err(self.err(format!("Bad reader macro: #{}", c))),
        }
    }

    fn read_character(&mut self) -> Result<Value, Error> {
        let first = match self.advance() {
            None => return Err(self.err("Unexpected end of character literal")),
            Some(c) => c,
        };
        let next_ends = self
            .current()
            .map(|n| n.is_whitespace() || is_delimiter(n))
            .unwrap_or(true);
        if next_ends || !first.is_alphanumeric() {
            return Ok(Value::Character(first));
        }
        let mut name = String::new();
        name.push(first);
        while let Some(c) = self.current() {
            if c.is_whitespace() || is_delimiter(c) {
                break;
            }
            name.push(c);
            self.advance();
        }
        named_character(&name).map(Value::Character).map_err(|msg| self.err(msg))
    }

    fn read_atom(&mut self, symbols: &mut SymbolTable) -> Result<Value, Error> {
        let start = self.pos;
        while let Some(c) = self.current() {
            if c.is_whitespace() || is_delimiter(c) {
                break;
            }
            self.advance();
        }
        let text = &self.input[start..self.pos];
        match text {
            "true" => return Ok(Value::TRUE),
            "false" => return Ok(Value::FALSE),
            "null" => return Ok(Value::Null),
            _ => {}
        }
        if let Some(n) = parse_number(text) {
            return Ok(Value::number(n));
        }
        Ok(symbols.intern_value(text))
    }
}

fn parse_number(text: &str) -> Option<f64> {
    let mut chars = text.chars();
    let first = chars.next()?;
    let numeric_start = match first {
        '0'..='9' => true,
        '+' | '-' | '.' => matches!(chars.next(), Some('0'..='9') | Some('.')),
        _ => false,
    };
    if !numeric_start {
        return None;
    }
    text.parse::<f64>().ok()
}

fn named_character(name: &str) -> Result<char, String> {
    match name {
        "null" => Ok('\0'),
        "alarm" => Ok('\u{7}'),
        "backspace" => Ok('\u{8}'),
        "tab" => Ok('\t'),
        "newline" => Ok('\n'),
        "return" => Ok('\r'),
        "escape" => Ok('\u{1b}'),
        "space" => Ok(' '),
        "delete" => Ok('\u{7f}'),
        _ => {
            if let Some(hex) = name.strip_prefix('x') {
                u32::from_str_radix(hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| format!("bad named character: #\\{}", name))
            } else {
                Err(format!("bad named character: #\\{}", name))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::cadr;

    fn read(input: &str) -> (Value, SymbolTable) {
        let mut symbols = SymbolTable::new();
        let value = read_str(input, &mut symbols).unwrap();
        (value, symbols)
    }

    #[test]
    fn test_read_number() {
        let (v, _) = read("42");
        assert_eq!(v, Value::number(42.0));
        let (v, _) = read("-2.5");
        assert_eq!(v, Value::number(-2.5));
    }

    #[test]
    fn test_read_list() {
        let (v, _) = read("(1 2 3)");
        assert_eq!(v.length(), 3);
        assert_eq!(v.car(), Value::number(1.0));
    }

    #[test]
    fn test_read_dotted_pair() {
        let (v, _) = read("(1 . 2)");
        assert!(v.is_pair());
        assert_eq!(v.cdr(), Value::number(2.0));
    }

    #[test]
    fn test_read_quote_sugar() {
        let (v, _) = read("'x");
        assert_eq!(v.car().as_symbol(), Some(wk::QUOTE));
    }

    #[test]
    fn test_read_booleans_and_null() {
        assert_eq!(read("#t").0, Value::TRUE);
        assert_eq!(read("true").0, Value::TRUE);
        assert_eq!(read("#f").0, Value::FALSE);
        assert_eq!(read("null").0, Value::Null);
        assert_eq!(read("()").0, Value::EmptyList);
    }

    #[test]
    fn test_read_characters() {
        assert_eq!(read("#\\a").0, Value::Character('a'));
        assert_eq!(read("#\\space").0, Value::Character(' '));
        assert_eq!(read("#\\newline").0, Value::Character('\n'));
        assert_eq!(read("#\\x0041").0, Value::Character('A'));
    }

    #[test]
    fn test_read_string_escapes() {
        let (v, _) = read(r#""a\nb\"c""#);
        assert_eq!(v, Value::string("a\nb\"c"));
    }

    #[test]
    fn test_read_vector_and_struct() {
        let (v, _) = read("[1 2 3]");
        assert!(matches!(v, Value::Vector(_)));
        let (v, _) = read("{x 1, y 2}");
        assert!(matches!(v, Value::Struct(_)));
    }

    #[test]
    fn test_read_keyword_atom() {
        let (v, mut symbols) = read("y:");
        let kw = symbols.intern("y:");
        assert_eq!(v, Value::Keyword(kw));
    }

    #[test]
    fn test_read_quasiquote_sugar() {
        let (v, _) = read("`(a ,(f) ,@(g) 5)");
        assert_eq!(v.car().as_symbol(), Some(wk::QUASIQUOTE));
        let body = cadr(&v);
        assert_eq!(body.length(), 4);
        assert_eq!(cadr(&body).car().as_symbol(), Some(wk::UNQUOTE));
        assert_eq!(caddr_sym(&body), Some(wk::UNQUOTE_SPLICING));
    }

    fn caddr_sym(v: &Value) -> Option<crate::symbol::SymbolId> {
        crate::value::caddr(v).car().as_symbol()
    }

    #[test]
    fn test_comment_and_comma_whitespace() {
        let (v, _) = read("; heading\n(1, 2)");
        assert_eq!(v.length(), 2);
    }

    #[test]
    fn test_unbalanced_errors() {
        let mut symbols = SymbolTable::new();
        assert!(read_str("(1 2", &mut symbols).is_err());
        assert!(read_str(")", &mut symbols).is_err());
    }
}
