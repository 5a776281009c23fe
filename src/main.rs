use sable::repl::Repl;
use sable::{eval_str, register_primitives, writer, SymbolTable, VM};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let mut trace = false;
    let mut expr: Option<String> = None;
    let mut files: Vec<String> = Vec::new();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--trace" => trace = true,
            "-e" => match args.next() {
                Some(e) => expr = Some(e),
                None => {
                    eprintln!("-e requires an expression");
                    return ExitCode::FAILURE;
                }
            },
            "-h" | "--help" => {
                println!("usage: sable [--trace] [-e EXPR] [file ...]");
                return ExitCode::SUCCESS;
            }
            _ => files.push(arg),
        }
    }

    let filter = if trace {
        EnvFilter::new("trace")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut vm = VM::new();
    vm.trace = trace;
    if let Ok(path) = std::env::var("SABLE_PATH") {
        for dir in path.split(':').filter(|d| !d.is_empty()) {
            vm.add_module_search_path(PathBuf::from(dir));
        }
    }
    let mut symbols = SymbolTable::new();
    register_primitives(&mut vm, &mut symbols);

    if let Some(expr) = expr {
        return match eval_str(&mut vm, &mut symbols, &expr) {
            Ok(value) => {
                println!("{}", writer::write(&value, &symbols));
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("{}", err);
                ExitCode::FAILURE
            }
        };
    }

    if !files.is_empty() {
        for file in &files {
            let source = match std::fs::read_to_string(file) {
                Ok(source) => source,
                Err(err) => {
                    eprintln!("{}: {}", file, err);
                    return ExitCode::FAILURE;
                }
            };
            if let Err(err) = eval_str(&mut vm, &mut symbols, &source) {
                eprintln!("{}", err);
                return ExitCode::FAILURE;
            }
        }
        return ExitCode::SUCCESS;
    }

    match Repl::new() {
        Ok(mut repl) => {
            repl.run(&mut vm, &mut symbols);
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("cannot start repl: {}", err);
            ExitCode::FAILURE
        }
    }
}
