// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Closures and upvalue capture semantics.

use super::run_output;

#[test]
fn closure_returns_a_captured_parameter() {
    assert_eq!(
        run_output("fun make(x) { fun g() { return x; } return g; } var f = make(7); print f();"),
        "7\n"
    );
}

#[test]
fn counter_keeps_private_state() {
    assert_eq!(
        run_output(
            "fun counter() {\n\
               var count = 0;\n\
               fun next() { count = count + 1; return count; }\n\
               return next;\n\
             }\n\
             var c = counter();\n\
             print c();\n\
             print c();\n\
             print c();"
        ),
        "1\n2\n3\n"
    );
}

#[test]
fn two_counters_are_independent() {
    assert_eq!(
        run_output(
            "fun counter() {\n\
               var count = 0;\n\
               fun next() { count = count + 1; return count; }\n\
               return next;\n\
             }\n\
             var a = counter();\n\
             var b = counter();\n\
             print a();\n\
             print a();\n\
             print b();"
        ),
        "1\n2\n1\n"
    );
}

#[test]
fn closures_share_one_upvalue_per_variable() {
    assert_eq!(
        run_output(
            "var getter; var setter;\n\
             {\n\
               var shared = \"initial\";\n\
               fun get() { return shared; }\n\
               fun set(v) { shared = v; }\n\
               getter = get;\n\
               setter = set;\n\
             }\n\
             setter(\"updated\");\n\
             print getter();"
        ),
        "updated\n"
    );
}

#[test]
fn upvalue_closes_over_the_variable_not_its_value() {
    assert_eq!(
        run_output(
            "var f;\n\
             {\n\
               var x = 1;\n\
               fun capture() { return x; }\n\
               f = capture;\n\
               x = 2;\n\
             }\n\
             print f();"
        ),
        "2\n"
    );
}

#[test]
fn loop_variable_capture_per_iteration() {
    assert_eq!(
        run_output(
            "var first; var second;\n\
             for (var i = 0; i < 2; i = i + 1) {\n\
               var captured = i;\n\
               fun get() { return captured; }\n\
               if (i == 0) first = get;\n\
               else second = get;\n\
             }\n\
             print first();\n\
             print second();"
        ),
        "0\n1\n"
    );
}

#[test]
fn nested_closures_capture_through_intermediates() {
    assert_eq!(
        run_output(
            "fun outer() {\n\
               var x = \"value\";\n\
               fun middle() {\n\
                 fun inner() { return x; }\n\
                 return inner;\n\
               }\n\
               return middle;\n\
             }\n\
             print outer()()();"
        ),
        "value\n"
    );
}
