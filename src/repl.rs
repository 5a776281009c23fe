//! REPL (Read-Eval-Print Loop) with readline support.
//!
//! Command history persists to `~/.sable_history`; values print in
//! canonical form, errors with their keyword category.

use crate::pipeline;
use crate::symbol::SymbolTable;
use crate::vm::VM;
use crate::writer;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

const HISTORY_FILE: &str = ".sable_history";

pub struct Repl {
    editor: DefaultEditor,
}

impl Repl {
    pub fn new() -> rustyline::Result<Self> {
        let mut editor = DefaultEditor::new()?;
        let _ = editor.load_history(&Self::history_file_path());
        Ok(Repl { editor })
    }

    fn history_file_path() -> String {
        match std::env::var("HOME") {
            Ok(home) => format!("{}/{}", home, HISTORY_FILE),
            Err(_) => HISTORY_FILE.to_string(),
        }
    }

    fn save_history(&mut self) {
        let _ = self.editor.save_history(&Self::history_file_path());
    }

    /// Run the interactive loop until EOF or `(exit)`.
    pub fn run(&mut self, vm: &mut VM, symbols: &mut SymbolTable) {
        println!("sable v{}", env!("CARGO_PKG_VERSION"));
        println!("Type (exit) to quit");
        loop {
            let line = match self.editor.readline("? ") {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) => continue,
                Err(_) => break,
            };
            let input = line.trim();
            if input.is_empty() {
                continue;
            }
            let _ = self.editor.add_history_entry(input);
            if input == "(exit)" || input == "exit" {
                break;
            }
            match pipeline::eval_str(vm, symbols, input) {
                Ok(value) => println!("= {}", writer::write(&value, symbols)),
                Err(err) => println!("*** {}", err),
            }
        }
        self.save_history();
    }
}
