// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! VM execution tests.
//!
//! Shared helpers: `run` interprets source on a fresh VM with captured
//! output; `run_output` expects success and returns stdout;
//! `run_error` expects a runtime error and returns stderr.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod closure_test;
mod gc_test;

use super::*;

/// A VM writing into byte buffers.
type TestVm = Vm<Vec<u8>, Vec<u8>>;

fn new_vm() -> TestVm {
    Vm::new(Vec::new(), Vec::new())
}

fn run(source: &str) -> (TestVm, Result<(), InterpretError>) {
    let mut vm = new_vm();
    let result = vm.interpret(source);
    (vm, result)
}

fn stdout(vm: &TestVm) -> String {
    String::from_utf8_lossy(vm.output()).into_owned()
}

fn stderr(vm: &TestVm) -> String {
    String::from_utf8_lossy(vm.error_output()).into_owned()
}

/// Interpret successfully and return what the program printed.
fn run_output(source: &str) -> String {
    let (vm, result) = run(source);
    assert_eq!(result, Ok(()), "stderr: {}", stderr(&vm));
    stdout(&vm)
}

/// Interpret expecting a runtime error; returns the error output.
fn run_error(source: &str) -> String {
    let (vm, result) = run(source);
    assert_eq!(result, Err(InterpretError::Runtime));
    // Runtime errors always reset the stack.
    assert_eq!(vm.stack_depth(), 0);
    stderr(&vm)
}
