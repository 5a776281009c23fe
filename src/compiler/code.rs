//! Compiled code objects and the opcode set.
//!
//! A `Code` carries a name, the parameter descriptor (argc plus the
//! optional defaults and keys vectors), an append-only constant pool,
//! and the opcode stream. Operands are stored as whole `i32` words;
//! nothing is packed. The textual `lap` form round-trips through
//! [`Code::decompile`] and [`Code::load_ops`].

use crate::error::Error;
use crate::symbol::{wk, SymbolTable};
use crate::value::Value;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Opcode {
    Literal = 1,
    Local,
    JumpFalse,
    Jump,
    TailCall,
    Call,
    Return,
    Closure,
    Pop,
    Global,
    DefGlobal,
    SetLocal,
    Use,
    DefMacro,
    Vector,
    Struct,
    UndefGlobal,
    SetGlobal,
}

impl Opcode {
    pub fn from_i32(op: i32) -> Option<Opcode> {
        match op {
            1 => Some(Opcode::Literal),
            2 => Some(Opcode::Local),
            3 => Some(Opcode::JumpFalse),
            4 => Some(Opcode::Jump),
            5 => Some(Opcode::TailCall),
            6 => Some(Opcode::Call),
            7 => Some(Opcode::Return),
            8 => Some(Opcode::Closure),
            9 => Some(Opcode::Pop),
            10 => Some(Opcode::Global),
            11 => Some(Opcode::DefGlobal),
            12 => Some(Opcode::SetLocal),
            13 => Some(Opcode::Use),
            14 => Some(Opcode::DefMacro),
            15 => Some(Opcode::Vector),
            16 => Some(Opcode::Struct),
            17 => Some(Opcode::UndefGlobal),
            18 => Some(Opcode::SetGlobal),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Opcode::Literal => "literal",
            Opcode::Local => "local",
            Opcode::JumpFalse => "jumpfalse",
            Opcode::Jump => "jump",
            Opcode::TailCall => "tailcall",
            Opcode::Call => "call",
            Opcode::Return => "return",
            Opcode::Closure => "closure",
            Opcode::Pop => "pop",
            Opcode::Global => "global",
            Opcode::DefGlobal => "defglobal",
            Opcode::SetLocal => "setlocal",
            Opcode::Use => "use",
            Opcode::DefMacro => "defmacro",
            Opcode::Vector => "vector",
            Opcode::Struct => "struct",
            Opcode::UndefGlobal => "undefglobal",
            Opcode::SetGlobal => "setglobal",
        }
    }
}

/// Compiled bytecode with its constant pool and parameter descriptor.
///
/// `defaults` is None for plain procedures, empty for a rest
/// parameter, and non-empty for optional or keyword parameters;
/// `keys` is set only for keyword parameters.
#[derive(Debug, Clone)]
pub struct Code {
    pub name: String,
    pub argc: usize,
    pub defaults: Option<Vec<Value>>,
    pub keys: Option<Vec<Value>>,
    pub ops: Vec<i32>,
    pub constants: Vec<Value>,
}

impl Code {
    pub fn new(
        argc: usize,
        defaults: Option<Vec<Value>>,
        keys: Option<Vec<Value>>,
        name: &str,
    ) -> Code {
        Code {
            name: name.to_string(),
            argc,
            defaults,
            keys,
            ops: Vec::new(),
            constants: Vec::new(),
        }
    }

    /// Add a constant, reusing an existing Equal slot.
    pub fn put_constant(&mut self, value: Value) -> i32 {
        for (i, c) in self.constants.iter().enumerate() {
            if c == &value {
                return i as i32;
            }
        }
        self.constants.push(value);
        (self.constants.len() - 1) as i32
    }

    pub fn emit_literal(&mut self, value: Value) {
        let idx = self.put_constant(value);
        self.ops.push(Opcode::Literal as i32);
        self.ops.push(idx);
    }

    pub fn emit_global(&mut self, sym: Value) {
        let idx = self.put_constant(sym);
        self.ops.push(Opcode::Global as i32);
        self.ops.push(idx);
    }

    pub fn emit_call(&mut self, argc: usize) {
        self.ops.push(Opcode::Call as i32);
        self.ops.push(argc as i32);
    }

    pub fn emit_tail_call(&mut self, argc: usize) {
        self.ops.push(Opcode::TailCall as i32);
        self.ops.push(argc as i32);
    }

    pub fn emit_return(&mut self) {
        self.ops.push(Opcode::Return as i32);
    }

    pub fn emit_pop(&mut self) {
        self.ops.push(Opcode::Pop as i32);
    }

    pub fn emit_local(&mut self, i: usize, j: usize) {
        self.ops.push(Opcode::Local as i32);
        self.ops.push(i as i32);
        self.ops.push(j as i32);
    }

    pub fn emit_set_local(&mut self, i: usize, j: usize) {
        self.ops.push(Opcode::SetLocal as i32);
        self.ops.push(i as i32);
        self.ops.push(j as i32);
    }

    pub fn emit_def_global(&mut self, sym: Value) {
        let idx = self.put_constant(sym);
        self.ops.push(Opcode::DefGlobal as i32);
        self.ops.push(idx);
    }

    pub fn emit_set_global(&mut self, sym: Value) {
        let idx = self.put_constant(sym);
        self.ops.push(Opcode::SetGlobal as i32);
        self.ops.push(idx);
    }

    pub fn emit_undef_global(&mut self, sym: Value) {
        let idx = self.put_constant(sym);
        self.ops.push(Opcode::UndefGlobal as i32);
        self.ops.push(idx);
    }

    pub fn emit_def_macro(&mut self, sym: Value) {
        let idx = self.put_constant(sym);
        self.ops.push(Opcode::DefMacro as i32);
        self.ops.push(idx);
    }

    pub fn emit_closure(&mut self, code: Rc<Code>) {
        let idx = self.put_constant(Value::Code(code));
        self.ops.push(Opcode::Closure as i32);
        self.ops.push(idx);
    }

    pub fn emit_use(&mut self, sym: Value) {
        let idx = self.put_constant(sym);
        self.ops.push(Opcode::Use as i32);
        self.ops.push(idx);
    }

    pub fn emit_vector(&mut self, n: usize) {
        self.ops.push(Opcode::Vector as i32);
        self.ops.push(n as i32);
    }

    pub fn emit_struct(&mut self, n: usize) {
        self.ops.push(Opcode::Struct as i32);
        self.ops.push(n as i32);
    }

    /// Emit a conditional jump and return the operand slot for
    /// back-patching with [`Code::set_jump_location`].
    pub fn emit_jump_false(&mut self, offset: i32) -> usize {
        self.ops.push(Opcode::JumpFalse as i32);
        let loc = self.ops.len();
        self.ops.push(offset);
        loc
    }

    pub fn emit_jump(&mut self, offset: i32) -> usize {
        self.ops.push(Opcode::Jump as i32);
        let loc = self.ops.len();
        self.ops.push(offset);
        loc
    }

    /// Patch the jump whose operand lives at `loc` to target the
    /// current end of the stream. Execution adds the operand to the
    /// opcode position, which sits one slot before `loc`.
    pub fn set_jump_location(&mut self, loc: usize) {
        self.ops[loc] = (self.ops.len() - loc + 1) as i32;
    }

    /// Human-readable parameter signature.
    pub fn signature(&self) -> String {
        let mut parts: Vec<String> = vec!["<any>".to_string(); self.argc];
        match (&self.defaults, &self.keys) {
            (Some(defaults), None) if defaults.is_empty() => parts.push("<any>*".to_string()),
            (Some(defaults), None) => {
                for _ in defaults {
                    parts.push("[<any>]".to_string());
                }
            }
            (Some(defaults), Some(_)) => {
                for _ in defaults {
                    parts.push("{<any>}".to_string());
                }
            }
            _ => {}
        }
        format!("({})", parts.join(" "))
    }

    // ── Textual bytecode (lap) ──────────────────────────────────────

    /// Render the round-trippable `(func (…) (op …)…)` form.
    pub fn decompile(&self, symbols: &SymbolTable, pretty: bool) -> String {
        let mut out = String::new();
        self.decompile_into(&mut out, symbols, "", pretty);
        out
    }

    fn write_header(&self, out: &mut String, symbols: &SymbolTable) {
        out.push_str("(func (");
        out.push_str(&format!("{:?}", self.name));
        out.push_str(&format!(" {}", self.argc));
        match &self.defaults {
            Some(defaults) => {
                out.push_str(" ");
                out.push_str(&crate::writer::write(
                    &Value::vector(defaults.clone()),
                    symbols,
                ));
            }
            None => out.push_str(" null"),
        }
        match &self.keys {
            Some(keys) => {
                out.push_str(" ");
                out.push_str(&crate::writer::write(&Value::vector(keys.clone()), symbols));
            }
            None => out.push_str(" null"),
        }
        out.push(')');
    }

    fn decompile_into(&self, out: &mut String, symbols: &SymbolTable, indent: &str, pretty: bool) {
        let indent_amount = "   ";
        out.push_str(indent);
        self.write_header(out, symbols);
        let inner = format!("{}{}", indent, indent_amount);
        let begin = if pretty {
            format!("\n{}", inner)
        } else {
            " ".to_string()
        };
        let mut offset = 0;
        while offset < self.ops.len() {
            let op = Opcode::from_i32(self.ops[offset]).expect("bad opcode in code object");
            out.push_str(&begin);
            match op {
                Opcode::Literal
                | Opcode::Global
                | Opcode::DefGlobal
                | Opcode::SetGlobal
                | Opcode::UndefGlobal
                | Opcode::DefMacro
                | Opcode::Use => {
                    let datum = &self.constants[self.ops[offset + 1] as usize];
                    out.push_str(&format!(
                        "({} {})",
                        op.name(),
                        crate::writer::write(datum, symbols)
                    ));
                    offset += 2;
                }
                Opcode::Local | Opcode::SetLocal => {
                    out.push_str(&format!(
                        "({} {} {})",
                        op.name(),
                        self.ops[offset + 1],
                        self.ops[offset + 2]
                    ));
                    offset += 3;
                }
                Opcode::Jump
                | Opcode::JumpFalse
                | Opcode::Call
                | Opcode::TailCall
                | Opcode::Vector
                | Opcode::Struct => {
                    out.push_str(&format!("({} {})", op.name(), self.ops[offset + 1]));
                    offset += 2;
                }
                Opcode::Return | Opcode::Pop => {
                    out.push_str(&format!("({})", op.name()));
                    offset += 1;
                }
                Opcode::Closure => {
                    out.push_str("(closure");
                    if pretty {
                        out.push('\n');
                    } else {
                        out.push(' ');
                    }
                    let child = match &self.constants[self.ops[offset + 1] as usize] {
                        Value::Code(code) => code.clone(),
                        _ => panic!("closure constant is not code"),
                    };
                    let child_indent = if pretty {
                        format!("{}{}", inner, indent_amount)
                    } else {
                        String::new()
                    };
                    child.decompile_into(out, symbols, &child_indent, pretty);
                    out.push(')');
                    offset += 2;
                }
            }
        }
        out.push(')');
    }

    /// Load instructions from their textual list form, the body of a
    /// `(lap …)` special form or of a decompiled `(func …)`.
    pub fn load_ops(&mut self, symbols: &mut SymbolTable, mut lst: Value) -> Result<(), Error> {
        while !matches!(lst, Value::EmptyList) {
            let instr = lst.car();
            let op = instr
                .car()
                .as_symbol()
                .ok_or_else(|| Error::syntax("Bad instruction"))?;
            let opname = symbols.name(op).to_string();
            match opname.as_str() {
                "literal" => self.emit_literal(crate::value::cadr(&instr)),
                "global" => self.emit_global(crate::value::cadr(&instr)),
                "defglobal" => self.emit_def_global(crate::value::cadr(&instr)),
                "setglobal" => self.emit_set_global(crate::value::cadr(&instr)),
                "undefglobal" => self.emit_undef_global(crate::value::cadr(&instr)),
                "defmacro" => self.emit_def_macro(crate::value::cadr(&instr)),
                "use" => self.emit_use(crate::value::cadr(&instr)),
                "local" => {
                    let i = operand(&instr, 1)?;
                    let j = operand(&instr, 2)?;
                    self.emit_local(i, j);
                }
                "setlocal" => {
                    let i = operand(&instr, 1)?;
                    let j = operand(&instr, 2)?;
                    self.emit_set_local(i, j);
                }
                "jump" => {
                    let offset = operand(&instr, 1)? as i32;
                    self.emit_jump(offset);
                }
                "jumpfalse" => {
                    let offset = operand(&instr, 1)? as i32;
                    self.emit_jump_false(offset);
                }
                "call" => {
                    let argc = operand(&instr, 1)?;
                    self.emit_call(argc);
                }
                "tailcall" => {
                    let argc = operand(&instr, 1)?;
                    self.emit_tail_call(argc);
                }
                "return" => self.emit_return(),
                "pop" => self.emit_pop(),
                "vector" => {
                    let n = operand(&instr, 1)?;
                    self.emit_vector(n);
                }
                "struct" => {
                    let n = operand(&instr, 1)?;
                    self.emit_struct(n);
                }
                "closure" => {
                    let child = load_func(symbols, &crate::value::cadr(&instr))?;
                    self.emit_closure(Rc::new(child));
                }
                _ => return Err(Error::syntax(format!("Bad instruction: {}", opname))),
            }
            lst = lst.cdr();
        }
        Ok(())
    }
}

fn operand(instr: &Value, n: usize) -> Result<usize, Error> {
    let mut v = instr.clone();
    for _ in 0..n {
        v = v.cdr();
    }
    match v.car() {
        Value::Number(x) if x >= 0.0 => Ok(x as usize),
        _ => Err(Error::syntax("Bad instruction operand")),
    }
}

/// Parse a `(func ("<name>" <argc> <defaults> <keys>) (op …)…)` list
/// into a fresh Code object.
pub fn load_func(symbols: &mut SymbolTable, form: &Value) -> Result<Code, Error> {
    if form.car().as_symbol() != Some(wk::FUNC) {
        return Err(Error::syntax("Bad argument for a closure"));
    }
    let header = crate::value::cadr(form);
    if header.length() != 4 {
        return Err(Error::syntax("Bad lap format"));
    }
    let name = match header.car() {
        Value::String(s) => s.to_string(),
        _ => return Err(Error::syntax("Bad lap format")),
    };
    let argc = match crate::value::cadr(&header) {
        Value::Number(n) if n >= 0.0 => n as usize,
        _ => return Err(Error::syntax("Bad lap format")),
    };
    let defaults = parse_optional_vec(&crate::value::caddr(&header))?;
    let keys = parse_optional_vec(&crate::value::cdddr(&header).car())?;
    let mut code = Code::new(argc, defaults, keys, &name);
    code.load_ops(symbols, crate::value::cddr(form))?;
    Ok(code)
}

fn parse_optional_vec(v: &Value) -> Result<Option<Vec<Value>>, Error> {
    match v {
        Value::Null => Ok(None),
        Value::Vector(elements) => Ok(Some(elements.borrow().clone())),
        _ => Err(Error::syntax("Bad lap format")),
    }
}
