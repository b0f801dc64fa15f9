// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Printer for Lox values.
//!
//! Converts values to the textual representation the language observes:
//! `print` statements, REPL echoes and error messages all go through
//! here.

use crate::heap::Heap;
use crate::value::{ObjRef, Object, Value};

/// Format a Lox number.
///
/// Integral values print without a decimal point (C's `%g` behaviour for
/// the magnitudes Lox programs use); everything else uses the shortest
/// round-trip representation.
#[must_use]
pub fn format_number(n: f64) -> String {
    if n == n.trunc() && n.abs() < 1e15 {
        format!("{n:.0}")
    } else {
        format!("{n}")
    }
}

/// Print a value to a string.
#[must_use]
pub fn print_value(value: Value, heap: &Heap) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_number(n),
        Value::Object(reference) => print_object(reference, heap),
    }
}

fn print_object(reference: ObjRef, heap: &Heap) -> String {
    match heap.object(reference) {
        Object::String(s) => s.chars.clone(),
        Object::Function(f) => print_function(f.name, heap),
        Object::Native(_) => "<native fn>".to_string(),
        Object::Closure(c) => {
            let function = heap.function(c.function);
            print_function(function.name, heap)
        }
        Object::Upvalue(_) => "upvalue".to_string(),
        Object::Class(c) => heap.string(c.name).chars.clone(),
        Object::Instance(i) => {
            let class = heap.class(i.class);
            format!("{} instance", heap.string(class.name).chars)
        }
        Object::BoundMethod(b) => {
            let closure = heap.closure(b.method);
            let function = heap.function(closure.function);
            print_function(function.name, heap)
        }
    }
}

fn print_function(name: Option<ObjRef>, heap: &Heap) -> String {
    match name {
        Some(name) => format!("<fn {}>", heap.string(name).chars),
        None => "<script>".to_string(),
    }
}
