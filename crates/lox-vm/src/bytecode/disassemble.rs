// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Disassembler for bytecode chunks.
//!
//! Renders chunks to a human-readable listing. Used by tests and by the
//! compiler's debug logging.

use core::fmt::Write;

use super::{Chunk, op};
use crate::heap::Heap;
use crate::value::print_value;

/// Disassemble a whole chunk under a heading.
#[must_use]
pub fn disassemble(chunk: &Chunk, name: &str, heap: &Heap) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "== {name} ==");

    let mut offset = 0;
    while offset < chunk.code.len() {
        offset = disassemble_instruction(chunk, offset, heap, &mut out);
    }

    out
}

/// Disassemble the instruction at `offset`, returning the next offset.
pub fn disassemble_instruction(
    chunk: &Chunk,
    offset: usize,
    heap: &Heap,
    out: &mut String,
) -> usize {
    let _ = write!(out, "{offset:04} ");
    if offset > 0 && chunk.lines[offset] == chunk.lines[offset - 1] {
        let _ = write!(out, "   | ");
    } else {
        let _ = write!(out, "{:4} ", chunk.lines[offset]);
    }

    let instruction = chunk.code[offset];
    match instruction {
        op::CONSTANT => constant_instruction("CONSTANT", chunk, offset, heap, out),
        op::NIL => simple_instruction("NIL", offset, out),
        op::TRUE => simple_instruction("TRUE", offset, out),
        op::FALSE => simple_instruction("FALSE", offset, out),
        op::POP => simple_instruction("POP", offset, out),
        op::GET_LOCAL => byte_instruction("GET_LOCAL", chunk, offset, out),
        op::SET_LOCAL => byte_instruction("SET_LOCAL", chunk, offset, out),
        op::GET_GLOBAL => constant_instruction("GET_GLOBAL", chunk, offset, heap, out),
        op::DEFINE_GLOBAL => constant_instruction("DEFINE_GLOBAL", chunk, offset, heap, out),
        op::SET_GLOBAL => constant_instruction("SET_GLOBAL", chunk, offset, heap, out),
        op::GET_UPVALUE => byte_instruction("GET_UPVALUE", chunk, offset, out),
        op::SET_UPVALUE => byte_instruction("SET_UPVALUE", chunk, offset, out),
        op::GET_PROPERTY => constant_instruction("GET_PROPERTY", chunk, offset, heap, out),
        op::SET_PROPERTY => constant_instruction("SET_PROPERTY", chunk, offset, heap, out),
        op::GET_SUPER => constant_instruction("GET_SUPER", chunk, offset, heap, out),
        op::EQUAL => simple_instruction("EQUAL", offset, out),
        op::GREATER => simple_instruction("GREATER", offset, out),
        op::LESS => simple_instruction("LESS", offset, out),
        op::ADD => simple_instruction("ADD", offset, out),
        op::SUBTRACT => simple_instruction("SUBTRACT", offset, out),
        op::MULTIPLY => simple_instruction("MULTIPLY", offset, out),
        op::DIVIDE => simple_instruction("DIVIDE", offset, out),
        op::NOT => simple_instruction("NOT", offset, out),
        op::NEGATE => simple_instruction("NEGATE", offset, out),
        op::PRINT => simple_instruction("PRINT", offset, out),
        op::JUMP => jump_instruction("JUMP", 1, chunk, offset, out),
        op::JUMP_IF_FALSE => jump_instruction("JUMP_IF_FALSE", 1, chunk, offset, out),
        op::LOOP => jump_instruction("LOOP", -1, chunk, offset, out),
        op::CALL => byte_instruction("CALL", chunk, offset, out),
        op::INVOKE => invoke_instruction("INVOKE", chunk, offset, heap, out),
        op::SUPER_INVOKE => invoke_instruction("SUPER_INVOKE", chunk, offset, heap, out),
        op::CLOSURE => closure_instruction(chunk, offset, heap, out),
        op::CLOSE_UPVALUE => simple_instruction("CLOSE_UPVALUE", offset, out),
        op::RETURN => simple_instruction("RETURN", offset, out),
        op::CLASS => constant_instruction("CLASS", chunk, offset, heap, out),
        op::INHERIT => simple_instruction("INHERIT", offset, out),
        op::METHOD => constant_instruction("METHOD", chunk, offset, heap, out),
        unknown => {
            let _ = writeln!(out, "Unknown opcode {unknown}");
            offset + 1
        }
    }
}

fn simple_instruction(name: &str, offset: usize, out: &mut String) -> usize {
    let _ = writeln!(out, "{name}");
    offset + 1
}

fn byte_instruction(name: &str, chunk: &Chunk, offset: usize, out: &mut String) -> usize {
    let slot = chunk.code[offset + 1];
    let _ = writeln!(out, "{name:<16} {slot:4}");
    offset + 2
}

fn constant_instruction(
    name: &str,
    chunk: &Chunk,
    offset: usize,
    heap: &Heap,
    out: &mut String,
) -> usize {
    let constant = chunk.code[offset + 1];
    let value = chunk.constants[constant as usize];
    let _ = writeln!(out, "{name:<16} {constant:4} '{}'", print_value(value, heap));
    offset + 2
}

fn invoke_instruction(
    name: &str,
    chunk: &Chunk,
    offset: usize,
    heap: &Heap,
    out: &mut String,
) -> usize {
    let constant = chunk.code[offset + 1];
    let arg_count = chunk.code[offset + 2];
    let value = chunk.constants[constant as usize];
    let _ = writeln!(
        out,
        "{name:<16} ({arg_count} args) {constant:4} '{}'",
        print_value(value, heap)
    );
    offset + 3
}

fn jump_instruction(name: &str, sign: i64, chunk: &Chunk, offset: usize, out: &mut String) -> usize {
    let jump = u16::from_be_bytes([chunk.code[offset + 1], chunk.code[offset + 2]]);
    let target = offset as i64 + 3 + sign * i64::from(jump);
    let _ = writeln!(out, "{name:<16} {offset:4} -> {target}");
    offset + 3
}

fn closure_instruction(chunk: &Chunk, offset: usize, heap: &Heap, out: &mut String) -> usize {
    let mut offset = offset + 1;
    let constant = chunk.code[offset];
    offset += 1;
    let value = chunk.constants[constant as usize];
    let _ = writeln!(out, "{:<16} {constant:4} {}", "CLOSURE", print_value(value, heap));

    let upvalue_count = heap.function_upvalue_count(value);
    for _ in 0..upvalue_count {
        let is_local = chunk.code[offset];
        let index = chunk.code[offset + 1];
        let kind = if is_local == 0 { "upvalue" } else { "local" };
        let _ = writeln!(out, "{:04}      |                     {kind} {index}", offset);
        offset += 2;
    }

    offset
}
