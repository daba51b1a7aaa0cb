// File: src/main.rs
//
// Entry point: no arguments launches the REPL, one argument runs that file
// and exits with clox's conventional 65 (compile error) / 70 (runtime
// error) codes, and anything else is a usage error. This mirrors the
// reference implementation's `main()` exactly rather than exposing the
// subcommand surface (run/repl/test/bench/profile) the teacher crate had.

mod builtins;
mod bytecode;
mod compiler;
mod errors;
mod lexer;
mod memory;
mod repl;
mod table;
mod value;
mod vm;

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser as ClapParser;

use vm::InterpretResult;

#[derive(ClapParser)]
#[command(name = "nah", about = "A small dynamically-typed scripting language", version)]
struct Cli {
    /// Path to a script to run. Omit to start the REPL.
    path: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.path {
        None => run_repl(),
        Some(path) => run_file(&path),
    }
}

fn run_repl() -> ExitCode {
    match repl::Repl::new() {
        Ok(mut session) => {
            if let Err(err) = session.run() {
                eprintln!("{err}");
                return ExitCode::from(74);
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(74)
        }
    }
}

fn run_file(path: &PathBuf) -> ExitCode {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("Could not read file \"{}\": {err}", path.display());
            return ExitCode::from(74);
        }
    };

    let mut machine = vm::Vm::with_std_natives();

    match machine.interpret(&source) {
        InterpretResult::Ok => ExitCode::SUCCESS,
        InterpretResult::CompileError => ExitCode::from(65),
        InterpretResult::RuntimeError => ExitCode::from(70),
    }
}
