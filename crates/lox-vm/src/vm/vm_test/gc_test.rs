// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Garbage collection under real programs.

use super::{InterpretError, new_vm, stdout};

/// Interpret with stress collection (collect on every allocation).
fn run_stressed(source: &str) -> String {
    let mut vm = new_vm();
    vm.set_gc_stress(true);
    let result = vm.interpret(source);
    assert_eq!(result, Ok(()), "source: {source}");
    stdout(&vm)
}

#[test]
fn stress_collection_does_not_change_arithmetic() {
    assert_eq!(run_stressed("print 1 + 2;"), "3\n");
}

#[test]
fn stress_collection_does_not_change_concatenation() {
    assert_eq!(
        run_stressed("var a = \"foo\"; var b = \"bar\"; print a + b;"),
        "foobar\n"
    );
}

#[test]
fn stress_collection_does_not_change_closures() {
    assert_eq!(
        run_stressed(
            "fun make(x) { fun g() { return x; } return g; } var f = make(7); print f();"
        ),
        "7\n"
    );
}

#[test]
fn stress_collection_does_not_change_inheritance() {
    assert_eq!(
        run_stressed("class P { greet() { print \"hi\"; } } class C < P {} C().greet();"),
        "hi\n"
    );
}

#[test]
fn stress_collection_does_not_change_initializers() {
    assert_eq!(
        run_stressed("class A { init(n) { this.n = n; } } var a = A(5); print a.n;"),
        "5\n"
    );
}

#[test]
fn stress_collection_does_not_change_recursion() {
    assert_eq!(
        run_stressed(
            "fun fib(n) { if (n < 2) return n; return fib(n - 2) + fib(n - 1); } print fib(10);"
        ),
        "55\n"
    );
}

#[test]
fn collection_is_idempotent_on_a_live_vm() {
    let mut vm = new_vm();
    assert_eq!(
        vm.interpret("var keep = \"rooted\"; fun f() { return keep; }"),
        Ok(())
    );

    vm.collect_garbage();
    let bytes = vm.heap().bytes_allocated();
    let objects = vm.heap().object_count();

    vm.collect_garbage();
    assert_eq!(vm.heap().bytes_allocated(), bytes);
    assert_eq!(vm.heap().object_count(), objects);
}

#[test]
fn globals_survive_collection() {
    let mut vm = new_vm();
    assert_eq!(vm.interpret("var kept = \"value\";"), Ok(()));

    vm.collect_garbage();

    assert_eq!(vm.interpret("print kept;"), Ok(()));
    assert_eq!(stdout(&vm), "value\n");
}

#[test]
fn discarded_strings_stay_bounded() {
    let mut vm = new_vm();

    // Builds and discards thousands of intermediate strings; the
    // threshold collector must reclaim them as it goes.
    let result = vm.interpret(
        "var s = \"\";\n\
         for (var i = 0; i < 2000; i = i + 1) {\n\
           s = s + \"xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx\";\n\
         }\n\
         print \"done\";",
    );
    assert_eq!(result, Ok(()));
    assert_eq!(stdout(&vm), "done\n");

    // Far more than the final string was allocated in total.
    assert!(vm.heap().bytes_allocated() < 4 * 1024 * 1024);
}

#[test]
fn interned_strings_vanish_once_unreferenced() {
    let mut vm = new_vm();
    assert_eq!(
        vm.interpret("{ var transient = \"ephemeral-string\"; }"),
        Ok(())
    );

    vm.collect_garbage();

    let survivors = vm
        .heap()
        .strings()
        .iter()
        .filter(|&(key, _)| vm.heap().string(key).chars == "ephemeral-string")
        .count();
    assert_eq!(survivors, 0);
}

#[test]
fn cyclic_object_graphs_are_collected() {
    let mut vm = new_vm();
    // instance -> field -> instance cycle, unreachable afterwards.
    assert_eq!(
        vm.interpret(
            "{\n\
               class Node {}\n\
               var a = Node();\n\
               var b = Node();\n\
               a.other = b;\n\
               b.other = a;\n\
             }"
        ),
        Ok(())
    );

    vm.collect_garbage();
    let before = vm.heap().object_count();
    vm.collect_garbage();
    assert_eq!(vm.heap().object_count(), before);
}

#[test]
fn runtime_errors_reset_gc_roots() {
    let mut vm = new_vm();
    // The concatenated string exists only on f's stack window.
    assert_eq!(
        vm.interpret("fun f() { var local = \"de\" + \"ad\"; return nil + local; } f();"),
        Err(InterpretError::Runtime)
    );

    // The reset stack no longer roots the call's temporaries.
    vm.collect_garbage();
    let survivors = vm
        .heap()
        .strings()
        .iter()
        .filter(|&(key, _)| vm.heap().string(key).chars == "dead")
        .count();
    assert_eq!(survivors, 0);
}
