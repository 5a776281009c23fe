//! Call frames and arity enforcement.
//!
//! A frame is both the activation record of a call and the
//! environment record closures capture: `previous` links the caller
//! chain, `locals` links the lexically enclosing frame, and
//! `elements` holds the parameter slots. Frames are heap-allocated so
//! a closure may outlive the call that created it; they are shared,
//! never copied.

use crate::compiler::code::Code;
use crate::error::Error;
use crate::symbol::SymbolTable;
use crate::value::{list_from_slice, Closure, Value};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug)]
pub struct Frame {
    /// Caller frame; None for the root frame.
    pub previous: Option<Rc<Frame>>,
    /// Lexically enclosing frame for closure lookups.
    pub locals: Option<Rc<Frame>>,
    /// This frame's parameter slots.
    pub elements: RefCell<Vec<Value>>,
    /// The code executing in this frame; None for the root frame.
    pub code: Option<Rc<Code>>,
    /// Where to resume the caller: its code and pc.
    pub resume: Option<(Rc<Code>, usize)>,
}

impl Frame {
    /// The frame a top-level execution starts in.
    pub fn root(args: &[Value]) -> Rc<Frame> {
        Rc::new(Frame {
            previous: None,
            locals: None,
            elements: RefCell::new(args.to_vec()),
            code: None,
            resume: None,
        })
    }

    /// Read slot `j` of the frame `i` hops out along the `locals`
    /// chain.
    pub fn lookup(frame: &Rc<Frame>, i: usize, j: usize) -> Value {
        let mut env = frame.clone();
        for _ in 0..i {
            env = env.locals.clone().expect("local reference outran frame chain");
        }
        let value = env.elements.borrow()[j].clone();
        value
    }

    /// Assign slot `j` of the frame `i` hops out.
    pub fn assign(frame: &Rc<Frame>, i: usize, j: usize, value: Value) {
        let mut env = frame.clone();
        for _ in 0..i {
            env = env.locals.clone().expect("local reference outran frame chain");
        }
        env.elements.borrow_mut()[j] = value;
    }

    /// The name of the code running in this frame, for error context.
    pub fn context_name(&self) -> &str {
        match &self.code {
            Some(code) => &code.name,
            None => "",
        }
    }
}

/// Build the frame for a closure call, enforcing the parameter
/// descriptor against the supplied arguments.
pub fn build_frame(
    previous: Option<Rc<Frame>>,
    resume: Option<(Rc<Code>, usize)>,
    fun: &Closure,
    args: &[Value],
    symbols: &mut SymbolTable,
) -> Result<Rc<Frame>, Error> {
    let code = &fun.code;
    let argc = args.len();
    let expected = code.argc;
    let fname = if code.name.is_empty() {
        "anonymous function"
    } else {
        code.name.as_str()
    };
    let elements = match &code.defaults {
        None => {
            if argc != expected {
                return Err(Error::argc(fname, &expected.to_string(), argc));
            }
            args.to_vec()
        }
        Some(defaults) => {
            let rest = defaults.is_empty();
            let extra = if rest { 1 } else { defaults.len() };
            if argc < expected {
                return Err(Error::argc(fname, &format!("at least {}", expected), argc));
            }
            let total = expected + extra;
            let mut elements: Vec<Value> = Vec::with_capacity(total);
            if rest {
                elements.extend_from_slice(&args[..expected]);
                elements.push(list_from_slice(&args[expected..]));
            } else if let Some(keys) = &code.keys {
                let bindings = &args[expected..];
                if bindings.len() % 2 != 0 {
                    return Err(Error::argument(format!(
                        "Bad keyword argument(s) to {}",
                        fname
                    )));
                }
                elements.extend_from_slice(&args[..expected]);
                elements.extend_from_slice(defaults);
                for pair in bindings.chunks(2) {
                    let key = match &pair[0] {
                        Value::Symbol(id) => *id,
                        Value::Keyword(id) => symbols.keyword_to_symbol(*id),
                        other => {
                            return Err(Error::argument(format!(
                                "Bad keyword argument: {}",
                                crate::writer::write(other, symbols)
                            )))
                        }
                    };
                    let slot = keys.iter().position(|k| k.as_symbol() == Some(key));
                    match slot {
                        Some(j) => elements[expected + j] = pair[1].clone(),
                        None => {
                            return Err(Error::argument(format!(
                                "Undefined keyword argument: {}",
                                symbols.name(key)
                            )))
                        }
                    }
                }
            } else {
                // optional: argc may fall anywhere in [expected, total]
                if argc > total {
                    return Err(Error::argc(
                        fname,
                        &format!("{} to {}", expected, total),
                        argc,
                    ));
                }
                elements.extend_from_slice(args);
                for i in argc..total {
                    elements.push(defaults[i - expected].clone());
                }
            }
            elements
        }
    };
    Ok(Rc::new(Frame {
        previous,
        locals: Some(fun.frame.clone()),
        elements: RefCell::new(elements),
        code: Some(code.clone()),
        resume,
    }))
}
