// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Bytecode virtual machine for Lox.
//!
//! The VM executes compiled chunks on an operand stack with a fixed
//! budget of call frames. All runtime state lives in [`Vm`]: the stack,
//! frames, globals, the open-upvalue list and the heap. Output is
//! written to injected sinks so tests can capture what a program
//! prints.
//!
//! Runtime errors print their message and a stack trace to the error
//! sink, reset the stack and surface [`InterpretError::Runtime`];
//! compile errors are reported by the compiler and surface
//! [`InterpretError::Compile`] with no VM state change.

#[cfg(test)]
mod vm_test;

use core::fmt;
use std::io::Write;
use std::time::Instant;

use crate::bytecode::{Chunk, op};
use crate::compiler;
use crate::heap::{GcRoots, Heap};
use crate::table::Table;
use crate::value::{
    BoundMethod, Class, Closure, Instance, Native, ObjRef, Object, Upvalue, Value, print_value,
};

/// Maximum number of nested call frames.
pub const FRAMES_MAX: usize = 64;

/// Maximum operand stack depth.
pub const STACK_MAX: usize = FRAMES_MAX * 256;

/// An activation record: the callee closure, its instruction pointer and
/// the base of its stack window (slot 0 is the callee or receiver).
#[derive(Debug, Clone, Copy)]
pub struct CallFrame {
    /// The closure being executed.
    pub closure: ObjRef,
    /// Offset of the next byte to execute in the function's chunk.
    pub ip: usize,
    /// Stack index of the frame's first slot.
    pub slots: usize,
}

/// Why `interpret` failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpretError {
    /// The compiler rejected the source; diagnostics were written to the
    /// error sink.
    Compile,
    /// A runtime error was reported and the stack was reset.
    Runtime,
}

impl fmt::Display for InterpretError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compile => write!(f, "compile error"),
            Self::Runtime => write!(f, "runtime error"),
        }
    }
}

/// Host state handed to native functions.
#[derive(Debug, Clone, Copy)]
pub struct NativeContext {
    /// When the VM was constructed.
    pub started: Instant,
}

/// A host-supplied native function.
pub type NativeFn = fn(&NativeContext, &[Value]) -> Value;

/// The `clock()` builtin: seconds since the VM started.
fn clock_native(context: &NativeContext, _args: &[Value]) -> Value {
    Value::Number(context.started.elapsed().as_secs_f64())
}

/// Build a [`GcRoots`] view of the VM's reachable state.
///
/// A macro so the field borrows stay disjoint from `self.heap` at the
/// allocation call sites.
macro_rules! gc_roots {
    ($vm:expr) => {
        GcRoots {
            stack: &$vm.stack,
            frames: &$vm.frames,
            open_upvalues: &$vm.open_upvalues,
            globals: Some(&$vm.globals),
            init_string: Some($vm.init_string),
            compiler_functions: &[],
        }
    };
}

/// The Lox virtual machine.
///
/// Generic over its output and error sinks; the CLI passes stdout and
/// stderr, tests pass byte buffers.
pub struct Vm<Out: Write, Err: Write> {
    heap: Heap,
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    globals: Table,
    /// Open upvalues, sorted by descending stack slot.
    open_upvalues: Vec<ObjRef>,
    /// The interned `"init"` string.
    init_string: ObjRef,
    started: Instant,
    out: Out,
    err: Err,
}

impl<Out: Write, Err: Write> Vm<Out, Err> {
    /// Create a VM writing program output to `out` and diagnostics to
    /// `err`, with the `clock` native defined.
    pub fn new(out: Out, err: Err) -> Self {
        let mut heap = Heap::new();
        let init_string = heap.copy_string("init", &GcRoots::default());

        let mut vm = Self {
            heap,
            stack: Vec::with_capacity(STACK_MAX),
            frames: Vec::with_capacity(FRAMES_MAX),
            globals: Table::new(),
            open_upvalues: Vec::new(),
            init_string,
            started: Instant::now(),
            out,
            err,
        };
        vm.define_native("clock", clock_native);
        vm
    }

    /// Toggle GC stress mode (collect on every allocation).
    pub fn set_gc_stress(&mut self, stress: bool) {
        self.heap.set_stress(stress);
    }

    /// The heap (for inspection in tests and the disassembler).
    #[must_use]
    pub const fn heap(&self) -> &Heap {
        &self.heap
    }

    /// The program output sink.
    #[must_use]
    pub const fn output(&self) -> &Out {
        &self.out
    }

    /// The diagnostics sink.
    #[must_use]
    pub const fn error_output(&self) -> &Err {
        &self.err
    }

    /// Current operand stack depth.
    #[must_use]
    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// Run a full garbage collection with the VM's roots.
    pub fn collect_garbage(&mut self) {
        let roots = gc_roots!(self);
        self.heap.collect(&roots);
    }

    /// Compile and execute Lox source.
    ///
    /// # Errors
    ///
    /// [`InterpretError::Compile`] if compilation fails (diagnostics are
    /// written to the error sink), [`InterpretError::Runtime`] if a
    /// runtime error was reported.
    pub fn interpret(&mut self, source: &str) -> Result<(), InterpretError> {
        let function =
            match compiler::compile(source, &mut self.heap, &self.globals, self.init_string) {
                Ok(function) => function,
                Err(error) => {
                    for diagnostic in &error.diagnostics {
                        let _ = writeln!(self.err, "{diagnostic}");
                    }
                    return Err(InterpretError::Compile);
                }
            };

        // Keep the fresh function rooted while its closure is allocated.
        self.push(Value::Object(function));
        let roots = gc_roots!(self);
        let closure = self.heap.alloc(
            Object::Closure(Closure {
                function,
                upvalues: Vec::new(),
            }),
            &roots,
        );
        self.pop();
        self.push(Value::Object(closure));
        self.call(closure, 0)?;

        self.run()
    }

    // ------------------------------------------------------------------
    // Stack and frame primitives
    // ------------------------------------------------------------------

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().expect("operand stack underflow")
    }

    fn peek(&self, distance: usize) -> Value {
        self.stack[self.stack.len() - 1 - distance]
    }

    fn frame(&self) -> &CallFrame {
        self.frames.last().expect("no active call frame")
    }

    fn frame_mut(&mut self) -> &mut CallFrame {
        self.frames.last_mut().expect("no active call frame")
    }

    fn chunk(&self) -> &Chunk {
        let frame = self.frame();
        let closure = self.heap.closure(frame.closure);
        &self.heap.function(closure.function).chunk
    }

    fn read_byte(&mut self) -> u8 {
        let ip = self.frame().ip;
        let byte = self.chunk().code[ip];
        self.frame_mut().ip = ip + 1;
        byte
    }

    fn read_short(&mut self) -> u16 {
        let high = self.read_byte();
        let low = self.read_byte();
        u16::from_be_bytes([high, low])
    }

    fn read_constant(&mut self) -> Value {
        let index = self.read_byte() as usize;
        self.chunk().constants[index]
    }

    fn read_string_constant(&mut self) -> ObjRef {
        match self.read_constant() {
            Value::Object(name) => name,
            _ => unreachable!("name constant must be an interned string"),
        }
    }

    fn reset_stack(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.open_upvalues.clear();
    }

    /// Report a runtime error: print the message and a stack trace to
    /// the error sink, then reset the stack.
    fn runtime_error(&mut self, message: &str) -> InterpretError {
        let _ = writeln!(self.err, "{message}");

        for frame in self.frames.iter().rev() {
            let closure = self.heap.closure(frame.closure);
            let function = self.heap.function(closure.function);
            let line = function.chunk.lines[frame.ip.saturating_sub(1)];
            match function.name {
                Some(name) => {
                    let _ = writeln!(
                        self.err,
                        "[line {line}] in {}()",
                        self.heap.string(name).chars
                    );
                }
                None => {
                    let _ = writeln!(self.err, "[line {line}] in script");
                }
            }
        }

        self.reset_stack();
        InterpretError::Runtime
    }

    // ------------------------------------------------------------------
    // Calls and methods
    // ------------------------------------------------------------------

    fn define_native(&mut self, name: &str, function: NativeFn) {
        // Both objects stay stack-rooted until the table insert is done.
        let roots = gc_roots!(self);
        let name_ref = self.heap.copy_string(name, &roots);
        self.push(Value::Object(name_ref));

        let roots = gc_roots!(self);
        let native = self.heap.alloc(Object::Native(Native { function }), &roots);
        self.push(Value::Object(native));

        let hash = self.heap.string(name_ref).hash;
        self.globals.set(name_ref, hash, Value::Object(native));

        self.pop();
        self.pop();
    }

    fn call(&mut self, closure: ObjRef, arg_count: usize) -> Result<(), InterpretError> {
        let function = self.heap.closure(closure).function;
        let arity = self.heap.function(function).arity as usize;
        if arg_count != arity {
            return Err(self.runtime_error(&format!(
                "Expected {arity} arguments but got {arg_count}"
            )));
        }

        if self.frames.len() == FRAMES_MAX {
            return Err(self.runtime_error("Stack overflow."));
        }

        self.frames.push(CallFrame {
            closure,
            ip: 0,
            slots: self.stack.len() - arg_count - 1,
        });
        Ok(())
    }

    fn call_value(&mut self, callee: Value, arg_count: usize) -> Result<(), InterpretError> {
        if let Value::Object(reference) = callee {
            match self.heap.object(reference) {
                Object::BoundMethod(bound) => {
                    let receiver = bound.receiver;
                    let method = bound.method;
                    let base = self.stack.len() - arg_count - 1;
                    self.stack[base] = receiver;
                    return self.call(method, arg_count);
                }
                Object::Closure(_) => return self.call(reference, arg_count),
                Object::Class(_) => {
                    let base = self.stack.len() - arg_count - 1;
                    let roots = gc_roots!(self);
                    let instance = self
                        .heap
                        .alloc(Object::Instance(Instance::new(reference)), &roots);
                    self.stack[base] = Value::Object(instance);

                    let hash = self.heap.string(self.init_string).hash;
                    let initializer = self
                        .heap
                        .class(reference)
                        .methods
                        .get(self.init_string, hash);
                    return match initializer {
                        Some(Value::Object(init_closure)) => self.call(init_closure, arg_count),
                        Some(_) => unreachable!("class initializer must be a closure"),
                        None if arg_count != 0 => Err(self.runtime_error(&format!(
                            "Expected 0 arguments but got {arg_count}"
                        ))),
                        None => Ok(()),
                    };
                }
                Object::Native(native) => {
                    let function = native.function;
                    let arg_start = self.stack.len() - arg_count;
                    let context = NativeContext {
                        started: self.started,
                    };
                    let result = function(&context, &self.stack[arg_start..]);
                    self.stack.truncate(arg_start - 1);
                    self.push(result);
                    return Ok(());
                }
                _ => {}
            }
        }
        Err(self.runtime_error("Can only call functions and classes."))
    }

    fn invoke(&mut self, name: ObjRef, arg_count: usize) -> Result<(), InterpretError> {
        let receiver = self.peek(arg_count);

        let instance_ref = match receiver {
            Value::Object(reference)
                if matches!(self.heap.object(reference), Object::Instance(_)) =>
            {
                reference
            }
            _ => return Err(self.runtime_error("Only instances have methods.")),
        };

        let hash = self.heap.string(name).hash;
        let instance = self.heap.instance(instance_ref);
        let class = instance.class;

        // A field shadowing the method name becomes the callee.
        if let Some(field) = instance.fields.get(name, hash) {
            let base = self.stack.len() - arg_count - 1;
            self.stack[base] = field;
            return self.call_value(field, arg_count);
        }

        self.invoke_from_class(class, name, arg_count)
    }

    fn invoke_from_class(
        &mut self,
        class: ObjRef,
        name: ObjRef,
        arg_count: usize,
    ) -> Result<(), InterpretError> {
        let hash = self.heap.string(name).hash;
        let Some(method) = self.heap.class(class).methods.get(name, hash) else {
            let name_chars = self.heap.string(name).chars.clone();
            return Err(self.runtime_error(&format!("Undefined property '{name_chars}'.")));
        };

        match method {
            Value::Object(closure) => self.call(closure, arg_count),
            _ => unreachable!("class method must be a closure"),
        }
    }

    fn bind_method(&mut self, class: ObjRef, name: ObjRef) -> Result<(), InterpretError> {
        let hash = self.heap.string(name).hash;
        let Some(method) = self.heap.class(class).methods.get(name, hash) else {
            let name_chars = self.heap.string(name).chars.clone();
            return Err(self.runtime_error(&format!("Undefined property '{name_chars}'.")));
        };
        let Value::Object(method_ref) = method else {
            unreachable!("class method must be a closure");
        };

        let receiver = self.peek(0);
        let roots = gc_roots!(self);
        let bound = self.heap.alloc(
            Object::BoundMethod(BoundMethod {
                receiver,
                method: method_ref,
            }),
            &roots,
        );

        self.pop();
        self.push(Value::Object(bound));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Upvalues
    // ------------------------------------------------------------------

    /// Stack slot of an upvalue on the open list.
    fn open_slot(&self, upvalue: ObjRef) -> usize {
        match *self.heap.upvalue(upvalue) {
            Upvalue::Open(slot) => slot,
            Upvalue::Closed(_) => unreachable!("closed upvalue on the open list"),
        }
    }

    /// Reuse or create the open upvalue for `slot`, keeping the open
    /// list sorted by descending stack slot.
    fn capture_upvalue(&mut self, slot: usize) -> ObjRef {
        let mut index = 0;
        while index < self.open_upvalues.len() {
            let existing_slot = self.open_slot(self.open_upvalues[index]);
            if existing_slot > slot {
                index += 1;
                continue;
            }
            if existing_slot == slot {
                return self.open_upvalues[index];
            }
            break;
        }

        let roots = gc_roots!(self);
        let created = self.heap.alloc(Object::Upvalue(Upvalue::Open(slot)), &roots);
        self.open_upvalues.insert(index, created);
        created
    }

    /// Close every open upvalue at or above `min_slot`: copy the stack
    /// value into the upvalue and unlink it from the open list.
    fn close_upvalues(&mut self, min_slot: usize) {
        while let Some(&upvalue) = self.open_upvalues.first() {
            let slot = self.open_slot(upvalue);
            if slot < min_slot {
                break;
            }

            let value = self.stack[slot];
            *self.heap.upvalue_mut(upvalue) = Upvalue::Closed(value);
            self.open_upvalues.remove(0);
        }
    }

    // ------------------------------------------------------------------
    // Binary operand helpers
    // ------------------------------------------------------------------

    fn numeric_operands(&mut self) -> Result<(f64, f64), InterpretError> {
        let (Value::Number(b), Value::Number(a)) = (self.peek(0), self.peek(1)) else {
            return Err(self.runtime_error("Operands must be numbers."));
        };
        self.pop();
        self.pop();
        Ok((a, b))
    }

    // ------------------------------------------------------------------
    // Dispatch loop
    // ------------------------------------------------------------------

    #[expect(clippy::too_many_lines, reason = "one arm per opcode")]
    fn run(&mut self) -> Result<(), InterpretError> {
        loop {
            let instruction = self.read_byte();
            match instruction {
                op::CONSTANT => {
                    let constant = self.read_constant();
                    self.push(constant);
                }
                op::NIL => self.push(Value::Nil),
                op::TRUE => self.push(Value::Bool(true)),
                op::FALSE => self.push(Value::Bool(false)),

                op::POP => {
                    self.pop();
                }

                op::GET_LOCAL => {
                    let slot = self.read_byte() as usize;
                    let base = self.frame().slots;
                    self.push(self.stack[base + slot]);
                }
                op::SET_LOCAL => {
                    let slot = self.read_byte() as usize;
                    let base = self.frame().slots;
                    self.stack[base + slot] = self.peek(0);
                }

                op::GET_GLOBAL => {
                    let name = self.read_string_constant();
                    let hash = self.heap.string(name).hash;
                    let Some(value) = self.globals.get(name, hash) else {
                        let name_chars = self.heap.string(name).chars.clone();
                        return Err(
                            self.runtime_error(&format!("Undefined variable '{name_chars}'."))
                        );
                    };
                    self.push(value);
                }
                op::DEFINE_GLOBAL => {
                    let name = self.read_string_constant();
                    let hash = self.heap.string(name).hash;
                    let value = self.peek(0);
                    self.globals.set(name, hash, value);
                    self.pop();
                }
                op::SET_GLOBAL => {
                    let name = self.read_string_constant();
                    let hash = self.heap.string(name).hash;
                    let value = self.peek(0);
                    if self.globals.set(name, hash, value) {
                        // Assignment must not create a new global.
                        self.globals.delete(name, hash);
                        let name_chars = self.heap.string(name).chars.clone();
                        return Err(
                            self.runtime_error(&format!("Undefined variable '{name_chars}'."))
                        );
                    }
                }

                op::GET_UPVALUE => {
                    let slot = self.read_byte() as usize;
                    let closure = self.frame().closure;
                    let upvalue = self.heap.closure(closure).upvalues[slot];
                    let value = match *self.heap.upvalue(upvalue) {
                        Upvalue::Open(stack_slot) => self.stack[stack_slot],
                        Upvalue::Closed(value) => value,
                    };
                    self.push(value);
                }
                op::SET_UPVALUE => {
                    let slot = self.read_byte() as usize;
                    let closure = self.frame().closure;
                    let upvalue = self.heap.closure(closure).upvalues[slot];
                    let value = self.peek(0);
                    match self.heap.upvalue_mut(upvalue) {
                        Upvalue::Open(stack_slot) => {
                            let stack_slot = *stack_slot;
                            self.stack[stack_slot] = value;
                        }
                        Upvalue::Closed(closed) => *closed = value,
                    }
                }

                op::GET_PROPERTY => {
                    let receiver = self.peek(0);
                    let instance_ref = match receiver {
                        Value::Object(reference)
                            if matches!(self.heap.object(reference), Object::Instance(_)) =>
                        {
                            reference
                        }
                        _ => return Err(self.runtime_error("Only instances have properties.")),
                    };

                    let name = self.read_string_constant();
                    let hash = self.heap.string(name).hash;
                    let instance = self.heap.instance(instance_ref);
                    let class = instance.class;

                    if let Some(value) = instance.fields.get(name, hash) {
                        self.pop(); // instance
                        self.push(value);
                    } else {
                        self.bind_method(class, name)?;
                    }
                }
                op::SET_PROPERTY => {
                    let target = self.peek(1);
                    let instance_ref = match target {
                        Value::Object(reference)
                            if matches!(self.heap.object(reference), Object::Instance(_)) =>
                        {
                            reference
                        }
                        _ => return Err(self.runtime_error("Only instances have fields.")),
                    };

                    let name = self.read_string_constant();
                    let hash = self.heap.string(name).hash;
                    let value = self.peek(0);
                    self.heap
                        .instance_mut(instance_ref)
                        .fields
                        .set(name, hash, value);

                    // Leave the assigned value on top.
                    let value = self.pop();
                    self.pop(); // instance
                    self.push(value);
                }
                op::GET_SUPER => {
                    let name = self.read_string_constant();
                    let Value::Object(superclass) = self.pop() else {
                        unreachable!("superclass slot must hold a class");
                    };
                    self.bind_method(superclass, name)?;
                }

                op::EQUAL => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(a == b));
                }
                op::GREATER => {
                    let (a, b) = self.numeric_operands()?;
                    self.push(Value::Bool(a > b));
                }
                op::LESS => {
                    let (a, b) = self.numeric_operands()?;
                    self.push(Value::Bool(a < b));
                }
                op::ADD => {
                    let b = self.peek(0);
                    let a = self.peek(1);
                    if let (Some(a_chars), Some(b_chars)) =
                        (self.heap.read_string(a), self.heap.read_string(b))
                    {
                        let combined = format!("{a_chars}{b_chars}");
                        // Operands stay stack-rooted across the
                        // interning allocation.
                        let roots = gc_roots!(self);
                        let result = self.heap.take_string(combined, &roots);
                        self.pop();
                        self.pop();
                        self.push(Value::Object(result));
                    } else if let (Value::Number(a), Value::Number(b)) = (a, b) {
                        self.pop();
                        self.pop();
                        self.push(Value::Number(a + b));
                    } else {
                        return Err(
                            self.runtime_error("Operands must be two numbers or two strings.")
                        );
                    }
                }
                op::SUBTRACT => {
                    let (a, b) = self.numeric_operands()?;
                    self.push(Value::Number(a - b));
                }
                op::MULTIPLY => {
                    let (a, b) = self.numeric_operands()?;
                    self.push(Value::Number(a * b));
                }
                op::DIVIDE => {
                    let (a, b) = self.numeric_operands()?;
                    self.push(Value::Number(a / b));
                }

                op::NOT => {
                    let value = self.pop();
                    self.push(Value::Bool(value.is_falsey()));
                }
                op::NEGATE => {
                    let Value::Number(n) = self.peek(0) else {
                        return Err(self.runtime_error("Operand must be a number."));
                    };
                    self.pop();
                    self.push(Value::Number(-n));
                }

                op::PRINT => {
                    let value = self.pop();
                    let text = print_value(value, &self.heap);
                    let _ = writeln!(self.out, "{text}");
                }

                op::JUMP => {
                    let offset = self.read_short() as usize;
                    self.frame_mut().ip += offset;
                }
                op::JUMP_IF_FALSE => {
                    let offset = self.read_short() as usize;
                    if self.peek(0).is_falsey() {
                        self.frame_mut().ip += offset;
                    }
                }
                op::LOOP => {
                    let offset = self.read_short() as usize;
                    self.frame_mut().ip -= offset;
                }

                op::CALL => {
                    let arg_count = self.read_byte() as usize;
                    let callee = self.peek(arg_count);
                    self.call_value(callee, arg_count)?;
                }
                op::INVOKE => {
                    let name = self.read_string_constant();
                    let arg_count = self.read_byte() as usize;
                    self.invoke(name, arg_count)?;
                }
                op::SUPER_INVOKE => {
                    let name = self.read_string_constant();
                    let arg_count = self.read_byte() as usize;
                    let Value::Object(superclass) = self.pop() else {
                        unreachable!("superclass slot must hold a class");
                    };
                    self.invoke_from_class(superclass, name, arg_count)?;
                }

                op::CLOSURE => {
                    let Value::Object(function) = self.read_constant() else {
                        unreachable!("CLOSURE operand must be a function constant");
                    };
                    let upvalue_count = self.heap.function(function).upvalue_count as usize;

                    let roots = gc_roots!(self);
                    let closure = self.heap.alloc(
                        Object::Closure(Closure {
                            function,
                            upvalues: Vec::with_capacity(upvalue_count),
                        }),
                        &roots,
                    );
                    // Rooted on the stack while upvalues are captured.
                    self.push(Value::Object(closure));

                    for _ in 0..upvalue_count {
                        let is_local = self.read_byte() != 0;
                        let index = self.read_byte() as usize;
                        let captured = if is_local {
                            let base = self.frame().slots;
                            self.capture_upvalue(base + index)
                        } else {
                            let enclosing = self.frame().closure;
                            self.heap.closure(enclosing).upvalues[index]
                        };
                        self.heap.closure_mut(closure).upvalues.push(captured);
                    }
                }
                op::CLOSE_UPVALUE => {
                    self.close_upvalues(self.stack.len() - 1);
                    self.pop();
                }

                op::RETURN => {
                    let result = self.pop();
                    let frame = self.frames.pop().expect("no active call frame");
                    self.close_upvalues(frame.slots);

                    if self.frames.is_empty() {
                        // Pop the script closure.
                        self.pop();
                        return Ok(());
                    }

                    self.stack.truncate(frame.slots);
                    self.push(result);
                }

                op::CLASS => {
                    let name = self.read_string_constant();
                    let roots = gc_roots!(self);
                    let class = self.heap.alloc(Object::Class(Class::new(name)), &roots);
                    self.push(Value::Object(class));
                }
                op::INHERIT => {
                    let superclass = self.peek(1);
                    let super_ref = match superclass {
                        Value::Object(reference)
                            if matches!(self.heap.object(reference), Object::Class(_)) =>
                        {
                            reference
                        }
                        _ => return Err(self.runtime_error("Superclass must be a class.")),
                    };
                    let Value::Object(sub_ref) = self.peek(0) else {
                        unreachable!("subclass must be on the stack");
                    };

                    // Method inheritance is a shallow copy at
                    // class-definition time.
                    let methods = self.heap.class(super_ref).methods.clone();
                    self.heap.class_mut(sub_ref).methods.add_all(&methods);
                    self.pop(); // subclass
                }
                op::METHOD => {
                    let name = self.read_string_constant();
                    let hash = self.heap.string(name).hash;
                    let method = self.peek(0);
                    let Value::Object(class_ref) = self.peek(1) else {
                        unreachable!("class must be on the stack");
                    };
                    self.heap.class_mut(class_ref).methods.set(name, hash, method);
                    self.pop();
                }

                unknown => {
                    return Err(self.runtime_error(&format!("Unknown opcode {unknown}.")));
                }
            }
        }
    }
}
