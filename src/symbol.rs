//! Symbol interning and the macro table.
//!
//! Every symbol, keyword, and type atom in the system is interned here:
//! equal text always yields the same `SymbolId`, so identity comparison
//! is integer comparison. The table is bootstrapped with the well-known
//! symbols in a fixed order, which makes their ids compile-time
//! constants (see [`wk`]).

use crate::value::Value;
use rustc_hash::FxHashMap;
use std::rc::Rc;

/// Symbol ID for interned symbols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(pub u32);

/// The kind of atom a piece of interned text denotes.
///
/// A keyword is a symbol whose text ends in `:`; a type is a symbol
/// whose text is bracketed `<...>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Symbol,
    Keyword,
    Type,
}

pub fn classify(text: &str) -> SymbolKind {
    if text.len() > 1 && text.ends_with(':') {
        SymbolKind::Keyword
    } else if text.len() > 2 && text.starts_with('<') && text.ends_with('>') {
        SymbolKind::Type
    } else {
        SymbolKind::Symbol
    }
}

/// A registered macro: the name and its expander function
/// (a closure of one argument, or a primitive).
#[derive(Clone)]
pub struct Macro {
    pub name: SymbolId,
    pub expander: Value,
}

/// Well-known symbols, interned at table construction in this exact
/// order. Their ids are stable across every `SymbolTable`.
pub mod wk {
    use super::SymbolId;

    pub const QUOTE: SymbolId = SymbolId(0);
    pub const BEGIN: SymbolId = SymbolId(1);
    pub const IF: SymbolId = SymbolId(2);
    pub const DEFINE: SymbolId = SymbolId(3);
    pub const DEFINE_MACRO: SymbolId = SymbolId(4);
    pub const UNDEFINE: SymbolId = SymbolId(5);
    pub const LAMBDA: SymbolId = SymbolId(6);
    pub const SET_BANG: SymbolId = SymbolId(7);
    pub const LAP: SymbolId = SymbolId(8);
    pub const USE: SymbolId = SymbolId(9);
    pub const LET: SymbolId = SymbolId(10);
    pub const LETREC: SymbolId = SymbolId(11);
    pub const COND: SymbolId = SymbolId(12);
    pub const DO: SymbolId = SymbolId(13);
    pub const QUASIQUOTE: SymbolId = SymbolId(14);
    pub const UNQUOTE: SymbolId = SymbolId(15);
    pub const UNQUOTE_SPLICING: SymbolId = SymbolId(16);
    pub const ELSE: SymbolId = SymbolId(17);
    pub const ARROW: SymbolId = SymbolId(18);
    pub const CONCAT: SymbolId = SymbolId(19);
    pub const LIST: SymbolId = SymbolId(20);
    pub const FUNC: SymbolId = SymbolId(21);

    pub const ERROR: SymbolId = SymbolId(22);
    pub const ARGUMENT_ERROR: SymbolId = SymbolId(23);
    pub const SYNTAX_ERROR: SymbolId = SymbolId(24);
    pub const MACRO_ERROR: SymbolId = SymbolId(25);
    pub const IO_ERROR: SymbolId = SymbolId(26);
    pub const HTTP_ERROR: SymbolId = SymbolId(27);
    pub const INTERRUPT: SymbolId = SymbolId(28);

    pub const NULL_TYPE: SymbolId = SymbolId(29);
    pub const BOOLEAN_TYPE: SymbolId = SymbolId(30);
    pub const CHARACTER_TYPE: SymbolId = SymbolId(31);
    pub const NUMBER_TYPE: SymbolId = SymbolId(32);
    pub const STRING_TYPE: SymbolId = SymbolId(33);
    pub const BLOB_TYPE: SymbolId = SymbolId(34);
    pub const SYMBOL_TYPE: SymbolId = SymbolId(35);
    pub const KEYWORD_TYPE: SymbolId = SymbolId(36);
    pub const TYPE_TYPE: SymbolId = SymbolId(37);
    pub const LIST_TYPE: SymbolId = SymbolId(38);
    pub const VECTOR_TYPE: SymbolId = SymbolId(39);
    pub const STRUCT_TYPE: SymbolId = SymbolId(40);
    pub const FUNCTION_TYPE: SymbolId = SymbolId(41);
    pub const CODE_TYPE: SymbolId = SymbolId(42);
    pub const ERROR_TYPE: SymbolId = SymbolId(43);
    pub const ANY_TYPE: SymbolId = SymbolId(44);

    pub(super) const BOOTSTRAP: &[&str] = &[
        "quote",
        "begin",
        "if",
        "define",
        "define-macro",
        "undefine",
        "lambda",
        "set!",
        "lap",
        "use",
        "let",
        "letrec",
        "cond",
        "do",
        "quasiquote",
        "unquote",
        "unquote-splicing",
        "else",
        "=>",
        "concat",
        "list",
        "func",
        "error:",
        "argument-error:",
        "syntax-error:",
        "macro-error:",
        "io-error:",
        "http-error:",
        "interrupt:",
        "<null>",
        "<boolean>",
        "<character>",
        "<number>",
        "<string>",
        "<blob>",
        "<symbol>",
        "<keyword>",
        "<type>",
        "<list>",
        "<vector>",
        "<struct>",
        "<function>",
        "<code>",
        "<error>",
        "<any>",
    ];

    /// Static text for the fixed error keywords, so an error can be
    /// rendered without a symbol table in hand.
    pub fn error_key_text(id: SymbolId) -> Option<&'static str> {
        match id {
            ERROR => Some("error:"),
            ARGUMENT_ERROR => Some("argument-error:"),
            SYNTAX_ERROR => Some("syntax-error:"),
            MACRO_ERROR => Some("macro-error:"),
            IO_ERROR => Some("io-error:"),
            HTTP_ERROR => Some("http-error:"),
            INTERRUPT => Some("interrupt:"),
            _ => None,
        }
    }
}

/// Symbol interning table plus the global macro table.
///
/// Uses `Rc<str>` for symbol text so the map key and the id-indexed
/// names vector share one allocation.
pub struct SymbolTable {
    map: FxHashMap<Rc<str>, SymbolId>,
    names: Vec<Rc<str>>,
    macros: FxHashMap<SymbolId, Macro>,
    gensym_counter: u64,
}

impl SymbolTable {
    pub fn new() -> Self {
        let mut table = SymbolTable {
            map: FxHashMap::default(),
            names: Vec::new(),
            macros: FxHashMap::default(),
            gensym_counter: 0,
        };
        for (i, text) in wk::BOOTSTRAP.iter().enumerate() {
            let id = table.intern(text);
            debug_assert_eq!(id.0 as usize, i);
        }
        table
    }

    /// Intern a piece of text, returning its id. Equal text always
    /// returns the same id.
    pub fn intern(&mut self, text: &str) -> SymbolId {
        if let Some(&id) = self.map.get(text) {
            return id;
        }
        let id = SymbolId(self.names.len() as u32);
        let shared: Rc<str> = Rc::from(text);
        self.names.push(shared.clone());
        self.map.insert(shared, id);
        id
    }

    /// Intern text and wrap it in the `Value` variant its shape
    /// dictates (symbol, keyword, or type).
    pub fn intern_value(&mut self, text: &str) -> Value {
        let id = self.intern(text);
        match classify(text) {
            SymbolKind::Symbol => Value::Symbol(id),
            SymbolKind::Keyword => Value::Keyword(id),
            SymbolKind::Type => Value::Type(id),
        }
    }

    /// The text of an interned id.
    pub fn name(&self, id: SymbolId) -> &str {
        &self.names[id.0 as usize]
    }

    pub fn kind(&self, id: SymbolId) -> SymbolKind {
        classify(self.name(id))
    }

    /// The symbol twin of a keyword: `x:` → `x`. Symbols map to
    /// themselves. Struct lookups canonicalize through this.
    pub fn keyword_to_symbol(&mut self, id: SymbolId) -> SymbolId {
        let text = self.name(id);
        if text.len() > 1 && text.ends_with(':') {
            let base = text[..text.len() - 1].to_string();
            self.intern(&base)
        } else {
            id
        }
    }

    /// Mint a fresh symbol that cannot collide with read input.
    pub fn gensym(&mut self, prefix: &str) -> SymbolId {
        self.gensym_counter += 1;
        let text = format!("__{}_{}__", prefix, self.gensym_counter);
        self.intern(&text)
    }

    pub fn def_macro(&mut self, name: SymbolId, expander: Value) {
        self.macros.insert(name, Macro { name, expander });
    }

    pub fn get_macro(&self, name: SymbolId) -> Option<&Macro> {
        self.macros.get(&name)
    }

    pub fn is_macro(&self, name: SymbolId) -> bool {
        self.macros.contains_key(&name)
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}
