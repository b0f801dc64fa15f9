// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Test harness: a VM with captured output.

#![allow(dead_code, reason = "shared across integration test binaries")]

use lox_vm::{InterpretError, Vm};

/// A VM writing program output and diagnostics into byte buffers.
pub struct TestVm {
    vm: Vm<Vec<u8>, Vec<u8>>,
}

impl TestVm {
    /// Create a fresh VM.
    #[must_use]
    pub fn new() -> Self {
        Self {
            vm: Vm::new(Vec::new(), Vec::new()),
        }
    }

    /// Create a fresh VM with GC stress mode on.
    #[must_use]
    pub fn stressed() -> Self {
        let mut vm = Vm::new(Vec::new(), Vec::new());
        vm.set_gc_stress(true);
        Self { vm }
    }

    /// Interpret source.
    ///
    /// # Errors
    ///
    /// Propagates the interpreter result.
    pub fn run(&mut self, source: &str) -> Result<(), InterpretError> {
        self.vm.interpret(source)
    }

    /// Everything the program printed so far.
    #[must_use]
    pub fn output(&self) -> String {
        String::from_utf8_lossy(self.vm.output()).into_owned()
    }

    /// Everything reported to the error sink so far.
    #[must_use]
    pub fn errors(&self) -> String {
        String::from_utf8_lossy(self.vm.error_output()).into_owned()
    }

    /// The underlying VM.
    #[must_use]
    pub fn vm(&self) -> &Vm<Vec<u8>, Vec<u8>> {
        &self.vm
    }

    /// The underlying VM, mutably.
    pub fn vm_mut(&mut self) -> &mut Vm<Vec<u8>, Vec<u8>> {
        &mut self.vm
    }
}

impl Default for TestVm {
    fn default() -> Self {
        Self::new()
    }
}

/// Run a program on a fresh VM and return its stdout.
///
/// # Panics
///
/// Panics if the program does not run cleanly.
#[must_use]
pub fn run_program(source: &str) -> String {
    let mut vm = TestVm::new();
    let result = vm.run(source);
    assert_eq!(result, Ok(()), "errors: {}", vm.errors());
    vm.output()
}

/// Run a program under GC stress and return its stdout.
///
/// # Panics
///
/// Panics if the program does not run cleanly.
#[must_use]
pub fn run_program_stressed(source: &str) -> String {
    let mut vm = TestVm::stressed();
    let result = vm.run(source);
    assert_eq!(result, Ok(()), "errors: {}", vm.errors());
    vm.output()
}
