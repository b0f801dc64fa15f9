// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Lox CLI entry point.
//!
//! With a script argument the file is compiled and executed, mapping
//! interpreter results to the conventional exit codes (65 for compile
//! errors, 70 for runtime errors, 74 for unreadable files). Without
//! arguments a line-edited REPL starts.

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::EnvFilter;

use lox_vm::{InterpretError, Vm};

/// Bytecode interpreter for the Lox language.
#[derive(Parser)]
#[command(name = "lox", version = lox_vm::VERSION, about)]
struct Args {
    /// Script to run; starts a REPL when omitted.
    script: Option<PathBuf>,

    /// Run a full garbage collection on every allocation.
    #[arg(long)]
    gc_stress: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    match args.script {
        Some(path) => run_file(&path, args.gc_stress),
        None => repl(args.gc_stress),
    }
}

fn run_file(path: &Path, gc_stress: bool) -> ExitCode {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(error) => {
            eprintln!("Could not read \"{}\": {error}", path.display());
            return ExitCode::from(74);
        }
    };

    let mut vm = Vm::new(io::stdout(), io::stderr());
    vm.set_gc_stress(gc_stress);

    match vm.interpret(&source) {
        Ok(()) => ExitCode::SUCCESS,
        Err(InterpretError::Compile) => ExitCode::from(65),
        Err(InterpretError::Runtime) => ExitCode::from(70),
    }
}

fn repl(gc_stress: bool) -> ExitCode {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(error) => {
            eprintln!("Could not start REPL: {error}");
            return ExitCode::FAILURE;
        }
    };

    let mut vm = Vm::new(io::stdout(), io::stderr());
    vm.set_gc_stress(gc_stress);

    loop {
        match editor.readline("> ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(&line);
                // Errors were already reported; the REPL keeps going.
                let _ = vm.interpret(&line);
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(error) => {
                eprintln!("Could not read line: {error}");
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}
