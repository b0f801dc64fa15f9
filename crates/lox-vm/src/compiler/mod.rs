// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Single-pass compiler from Lox source to bytecode.
//!
//! The compiler drives the scanner directly and emits into the chunk of
//! the function being compiled, using a Pratt parser for expressions.
//! Functions open nested compiler states; resolving a variable walks the
//! enclosing states to produce local, upvalue or global accesses.
//!
//! Every function under compilation is already a heap object, so the
//! open-compiler chain is handed to the heap as GC roots: a collection
//! triggered mid-compilation keeps emitted constants alive through the
//! functions' chunks.
//!
//! ## Error handling
//!
//! Errors are collected as [`Diagnostic`]s with panic-mode recovery: the
//! parser synchronises at statement boundaries and keeps going, then
//! fails compilation if anything was recorded.


use core::fmt;

use crate::bytecode::{Chunk, disassemble, op};
use crate::heap::{GcRoots, Heap};
use crate::scanner::{Scanner, Token, TokenKind};
use crate::table::Table;
use crate::value::{Function, ObjRef, Object, Value};

/// Maximum number of locals in one function (slots are a single byte).
const MAX_LOCALS: usize = 256;

/// Maximum number of upvalues in one function (slots are a single byte).
const MAX_UPVALUES: usize = 256;

/// A single compile diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Source line the offending token starts on.
    pub line: u32,
    /// Location suffix: empty, ` at end`, or ` at '<lexeme>'`.
    pub location: String,
    /// What went wrong.
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[line {}] Error{}: {}", self.line, self.location, self.message)
    }
}

/// Compilation failure: every diagnostic collected while parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    /// The collected diagnostics, in source order.
    pub diagnostics: Vec<Diagnostic>,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, diagnostic) in self.diagnostics.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{diagnostic}")?;
        }
        Ok(())
    }
}

/// What kind of function a compiler state is producing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FunctionKind {
    /// The implicit top-level function.
    Script,
    /// A `fun` declaration.
    Function,
    /// A class method.
    Method,
    /// A class `init` method (returns its receiver).
    Initializer,
}

/// A local variable slot.
#[derive(Debug)]
struct Local<'src> {
    name: &'src str,
    /// Scope depth, `None` while declared but not yet initialized.
    depth: Option<u32>,
    /// Whether some closure captures this local.
    is_captured: bool,
}

/// An upvalue recorded while compiling a function.
#[derive(Debug, Clone, Copy)]
struct CompilerUpvalue {
    /// Slot in the enclosing function (local or upvalue index).
    index: u8,
    /// Whether `index` refers to an enclosing local (vs. upvalue).
    is_local: bool,
}

/// Per-function compiler state.
struct FunctionCompiler<'src> {
    /// The function object being filled in.
    function: ObjRef,
    kind: FunctionKind,
    locals: Vec<Local<'src>>,
    scope_depth: u32,
    upvalues: Vec<CompilerUpvalue>,
}

/// Per-class compiler state, for `this`/`super` validation.
struct ClassCompiler {
    has_superclass: bool,
}

/// Operator precedence, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    None,
    Assignment,
    Or,
    And,
    Equality,
    Comparison,
    Term,
    Factor,
    Unary,
    Call,
    Primary,
}

impl Precedence {
    /// The next-higher precedence level.
    const fn next(self) -> Self {
        match self {
            Self::None => Self::Assignment,
            Self::Assignment => Self::Or,
            Self::Or => Self::And,
            Self::And => Self::Equality,
            Self::Equality => Self::Comparison,
            Self::Comparison => Self::Term,
            Self::Term => Self::Factor,
            Self::Factor => Self::Unary,
            Self::Unary => Self::Call,
            Self::Call | Self::Primary => Self::Primary,
        }
    }
}

type ParseFn<'src, 'ctx> = fn(&mut Parser<'src, 'ctx>, bool);

/// Pratt parser table row.
struct ParseRule<'src, 'ctx> {
    prefix: Option<ParseFn<'src, 'ctx>>,
    infix: Option<ParseFn<'src, 'ctx>>,
    precedence: Precedence,
}

/// Look up the parse rule for a token kind.
fn rule_for<'src, 'ctx>(kind: TokenKind) -> ParseRule<'src, 'ctx> {
    let (prefix, infix, precedence): (
        Option<ParseFn<'src, 'ctx>>,
        Option<ParseFn<'src, 'ctx>>,
        Precedence,
    ) = match kind {
        TokenKind::LeftParen => (
            Some(Parser::grouping),
            Some(Parser::call),
            Precedence::Call,
        ),
        TokenKind::Dot => (None, Some(Parser::dot), Precedence::Call),
        TokenKind::Minus => (Some(Parser::unary), Some(Parser::binary), Precedence::Term),
        TokenKind::Plus => (None, Some(Parser::binary), Precedence::Term),
        TokenKind::Slash | TokenKind::Star => (None, Some(Parser::binary), Precedence::Factor),
        TokenKind::Bang => (Some(Parser::unary), None, Precedence::None),
        TokenKind::BangEqual | TokenKind::EqualEqual => {
            (None, Some(Parser::binary), Precedence::Equality)
        }
        TokenKind::Greater
        | TokenKind::GreaterEqual
        | TokenKind::Less
        | TokenKind::LessEqual => (None, Some(Parser::binary), Precedence::Comparison),
        TokenKind::Identifier => (Some(Parser::variable), None, Precedence::None),
        TokenKind::String => (Some(Parser::string), None, Precedence::None),
        TokenKind::Number => (Some(Parser::number), None, Precedence::None),
        TokenKind::And => (None, Some(Parser::and_operator), Precedence::And),
        TokenKind::Or => (None, Some(Parser::or_operator), Precedence::Or),
        TokenKind::False | TokenKind::Nil | TokenKind::True => {
            (Some(Parser::literal), None, Precedence::None)
        }
        TokenKind::Super => (Some(Parser::super_expression), None, Precedence::None),
        TokenKind::This => (Some(Parser::this_expression), None, Precedence::None),
        _ => (None, None, Precedence::None),
    };
    ParseRule {
        prefix,
        infix,
        precedence,
    }
}

/// Compile Lox source into a top-level function.
///
/// `globals` and `init_string` join the compiler's in-progress function
/// chain as GC roots for collections triggered while compiling.
///
/// # Errors
///
/// Returns every diagnostic collected while parsing.
pub fn compile(
    source: &str,
    heap: &mut Heap,
    globals: &Table,
    init_string: ObjRef,
) -> Result<ObjRef, CompileError> {
    let mut parser = Parser::new(source, heap, globals, init_string);
    parser.push_compiler(FunctionKind::Script);
    parser.advance();

    while !parser.matches(TokenKind::Eof) {
        parser.declaration();
    }

    let (function, _upvalues) = parser.end_compiler();
    if parser.diagnostics.is_empty() {
        Ok(function)
    } else {
        Err(CompileError {
            diagnostics: parser.diagnostics,
        })
    }
}

/// Build the GC root set for an allocation during compilation.
fn compile_roots<'a>(
    function_stack: &'a [ObjRef],
    globals: &'a Table,
    init_string: ObjRef,
) -> GcRoots<'a> {
    GcRoots {
        globals: Some(globals),
        init_string: Some(init_string),
        compiler_functions: function_stack,
        ..GcRoots::default()
    }
}

/// Parser and emitter state.
struct Parser<'src, 'ctx> {
    scanner: Scanner<'src>,
    current: Token<'src>,
    previous: Token<'src>,
    panic_mode: bool,
    diagnostics: Vec<Diagnostic>,
    heap: &'ctx mut Heap,
    globals: &'ctx Table,
    init_string: ObjRef,
    /// Nested function compilers, innermost last.
    compilers: Vec<FunctionCompiler<'src>>,
    /// Functions of the open compilers, kept as a slice for GC roots.
    function_stack: Vec<ObjRef>,
    /// Nested class declarations, innermost last.
    class_compilers: Vec<ClassCompiler>,
}

impl<'src, 'ctx> Parser<'src, 'ctx> {
    fn new(
        source: &'src str,
        heap: &'ctx mut Heap,
        globals: &'ctx Table,
        init_string: ObjRef,
    ) -> Self {
        let placeholder = Token {
            kind: TokenKind::Eof,
            lexeme: "",
            line: 0,
        };
        Self {
            scanner: Scanner::new(source),
            current: placeholder,
            previous: placeholder,
            panic_mode: false,
            diagnostics: Vec::new(),
            heap,
            globals,
            init_string,
            compilers: Vec::new(),
            function_stack: Vec::new(),
            class_compilers: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Compiler stack
    // ------------------------------------------------------------------

    fn push_compiler(&mut self, kind: FunctionKind) {
        let roots = compile_roots(&self.function_stack, self.globals, self.init_string);
        let function = self.heap.alloc(Object::Function(Function::new()), &roots);
        self.function_stack.push(function);

        // Slot 0 holds the callee; methods use it for `this`.
        let slot_zero = if matches!(kind, FunctionKind::Method | FunctionKind::Initializer) {
            "this"
        } else {
            ""
        };
        let mut locals = Vec::with_capacity(8);
        locals.push(Local {
            name: slot_zero,
            depth: Some(0),
            is_captured: false,
        });

        self.compilers.push(FunctionCompiler {
            function,
            kind,
            locals,
            scope_depth: 0,
            upvalues: Vec::new(),
        });

        if kind != FunctionKind::Script {
            let roots = compile_roots(&self.function_stack, self.globals, self.init_string);
            let name = self.heap.copy_string(self.previous.lexeme, &roots);
            self.heap.function_mut(function).name = Some(name);
        }
    }

    fn end_compiler(&mut self) -> (ObjRef, Vec<CompilerUpvalue>) {
        self.emit_return();

        let compiler = self.compilers.pop().expect("no open compiler");
        self.function_stack.pop();
        self.heap.function_mut(compiler.function).upvalue_count = compiler.upvalues.len() as u8;

        if self.diagnostics.is_empty()
            && tracing::enabled!(target: "compiler", tracing::Level::DEBUG)
        {
            let function = self.heap.function(compiler.function);
            let name = function.name.map_or_else(
                || "<script>".to_string(),
                |name| self.heap.string(name).chars.clone(),
            );
            let listing = disassemble(&function.chunk, &name, self.heap);
            tracing::debug!(target: "compiler", "\n{listing}");
        }

        (compiler.function, compiler.upvalues)
    }

    fn compiler(&self) -> &FunctionCompiler<'src> {
        self.compilers.last().expect("no open compiler")
    }

    fn compiler_mut(&mut self) -> &mut FunctionCompiler<'src> {
        self.compilers.last_mut().expect("no open compiler")
    }

    // ------------------------------------------------------------------
    // Token handling and diagnostics
    // ------------------------------------------------------------------

    fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.scanner.scan_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            let message = self.current.lexeme;
            self.error_at_current(message);
        }
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.current.kind == kind {
            self.advance();
            return;
        }
        self.error_at_current(message);
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    fn error(&mut self, message: &str) {
        self.error_at(self.previous, message);
    }

    fn error_at_current(&mut self, message: &str) {
        self.error_at(self.current, message);
    }

    fn error_at(&mut self, token: Token<'src>, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;

        let location = match token.kind {
            TokenKind::Eof => " at end".to_string(),
            // The lexeme of an error token is its message, not source text.
            TokenKind::Error => String::new(),
            _ => format!(" at '{}'", token.lexeme),
        };
        self.diagnostics.push(Diagnostic {
            line: token.line,
            location,
            message: message.to_string(),
        });
    }

    fn synchronize(&mut self) {
        self.panic_mode = false;

        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::Class
                | TokenKind::Fun
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Return => return,
                _ => {}
            }
            self.advance();
        }
    }

    // ------------------------------------------------------------------
    // Emission
    // ------------------------------------------------------------------

    fn current_chunk_mut(&mut self) -> &mut Chunk {
        let function = self.compiler().function;
        &mut self.heap.function_mut(function).chunk
    }

    fn emit_byte(&mut self, byte: u8) {
        let line = self.previous.line;
        self.current_chunk_mut().write(byte, line);
    }

    fn emit_bytes(&mut self, first: u8, second: u8) {
        self.emit_byte(first);
        self.emit_byte(second);
    }

    fn emit_return(&mut self) {
        if self.compiler().kind == FunctionKind::Initializer {
            self.emit_bytes(op::GET_LOCAL, 0);
        } else {
            self.emit_byte(op::NIL);
        }
        self.emit_byte(op::RETURN);
    }

    fn make_constant(&mut self, value: Value) -> u8 {
        let function = self.compiler().function;
        match self.heap.function_mut(function).chunk.add_constant(value) {
            Some(index) => index,
            None => {
                self.error("Too many constants in one chunk.");
                0
            }
        }
    }

    fn emit_constant(&mut self, value: Value) {
        let index = self.make_constant(value);
        self.emit_bytes(op::CONSTANT, index);
    }

    fn emit_jump(&mut self, instruction: u8) -> usize {
        self.emit_byte(instruction);
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        self.current_chunk_mut().len() - 2
    }

    fn patch_jump(&mut self, offset: usize) {
        // -2 to step over the operand bytes themselves.
        let jump = self.current_chunk_mut().len() - offset - 2;
        if jump > usize::from(u16::MAX) {
            self.error("Too much code to jump over.");
        }

        let bytes = (jump as u16).to_be_bytes();
        let chunk = self.current_chunk_mut();
        chunk.code[offset] = bytes[0];
        chunk.code[offset + 1] = bytes[1];
    }

    fn emit_loop(&mut self, loop_start: usize) {
        self.emit_byte(op::LOOP);

        let offset = self.current_chunk_mut().len() - loop_start + 2;
        if offset > usize::from(u16::MAX) {
            self.error("Loop body too large.");
        }

        let bytes = (offset as u16).to_be_bytes();
        self.emit_byte(bytes[0]);
        self.emit_byte(bytes[1]);
    }

    fn identifier_constant(&mut self, name: &str) -> u8 {
        let roots = compile_roots(&self.function_stack, self.globals, self.init_string);
        let string = self.heap.copy_string(name, &roots);
        self.make_constant(Value::Object(string))
    }

    // ------------------------------------------------------------------
    // Declarations and statements
    // ------------------------------------------------------------------

    fn declaration(&mut self) {
        if self.matches(TokenKind::Class) {
            self.class_declaration();
        } else if self.matches(TokenKind::Fun) {
            self.fun_declaration();
        } else if self.matches(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.statement();
        }

        if self.panic_mode {
            self.synchronize();
        }
    }

    fn class_declaration(&mut self) {
        self.consume(TokenKind::Identifier, "Expect class name.");
        let class_name = self.previous;
        let name_constant = self.identifier_constant(class_name.lexeme);
        self.declare_variable();

        self.emit_bytes(op::CLASS, name_constant);
        self.define_variable(name_constant);

        self.class_compilers.push(ClassCompiler {
            has_superclass: false,
        });

        if self.matches(TokenKind::Less) {
            self.consume(TokenKind::Identifier, "Expect superclass name.");
            self.variable(false);

            if class_name.lexeme == self.previous.lexeme {
                self.error("A class can't inherit from itself.");
            }

            // The superclass stays on the stack as the `super` local.
            self.begin_scope();
            self.add_local("super");
            self.define_variable(0);

            self.named_variable(class_name.lexeme, false);
            self.emit_byte(op::INHERIT);
            self.class_compilers
                .last_mut()
                .expect("class compiler just pushed")
                .has_superclass = true;
        }

        self.named_variable(class_name.lexeme, false);
        self.consume(TokenKind::LeftBrace, "Expect '{' before class body.");
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.method();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after class body.");
        self.emit_byte(op::POP);

        let has_superclass = self
            .class_compilers
            .last()
            .expect("class compiler still open")
            .has_superclass;
        if has_superclass {
            self.end_scope();
        }
        self.class_compilers.pop();
    }

    fn method(&mut self) {
        self.consume(TokenKind::Identifier, "Expect method name.");
        let constant = self.identifier_constant(self.previous.lexeme);

        let kind = if self.previous.lexeme == "init" {
            FunctionKind::Initializer
        } else {
            FunctionKind::Method
        };
        self.function(kind);

        self.emit_bytes(op::METHOD, constant);
    }

    fn fun_declaration(&mut self) {
        let global = self.parse_variable("Expect function name.");
        // Functions may refer to themselves recursively.
        self.mark_initialized();
        self.function(FunctionKind::Function);
        self.define_variable(global);
    }

    fn function(&mut self, kind: FunctionKind) {
        self.push_compiler(kind);
        self.begin_scope();

        self.consume(TokenKind::LeftParen, "Expect '(' after function name.");
        if !self.check(TokenKind::RightParen) {
            loop {
                let function = self.compiler().function;
                let arity = self.heap.function(function).arity;
                if arity == u8::MAX {
                    self.error_at_current("Can't have more than 255 parameters.");
                }
                self.heap.function_mut(function).arity = arity.saturating_add(1);

                let constant = self.parse_variable("Expect parameter name.");
                self.define_variable(constant);

                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after parameters.");
        self.consume(TokenKind::LeftBrace, "Expect '{' before function body.");
        self.block();

        let (function, upvalues) = self.end_compiler();
        let constant = self.make_constant(Value::Object(function));
        self.emit_bytes(op::CLOSURE, constant);
        for upvalue in upvalues {
            self.emit_byte(u8::from(upvalue.is_local));
            self.emit_byte(upvalue.index);
        }
    }

    fn var_declaration(&mut self) {
        let global = self.parse_variable("Expect variable name.");

        if self.matches(TokenKind::Equal) {
            self.expression();
        } else {
            self.emit_byte(op::NIL);
        }
        self.consume(
            TokenKind::Semicolon,
            "Expect ';' after variable declaration.",
        );

        self.define_variable(global);
    }

    fn statement(&mut self) {
        if self.matches(TokenKind::Print) {
            self.print_statement();
        } else if self.matches(TokenKind::For) {
            self.for_statement();
        } else if self.matches(TokenKind::If) {
            self.if_statement();
        } else if self.matches(TokenKind::Return) {
            self.return_statement();
        } else if self.matches(TokenKind::While) {
            self.while_statement();
        } else if self.matches(TokenKind::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after value.");
        self.emit_byte(op::PRINT);
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.");
        self.emit_byte(op::POP);
    }

    fn if_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let then_jump = self.emit_jump(op::JUMP_IF_FALSE);
        self.emit_byte(op::POP);
        self.statement();
        let else_jump = self.emit_jump(op::JUMP);

        self.patch_jump(then_jump);
        self.emit_byte(op::POP);

        if self.matches(TokenKind::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.current_chunk_mut().len();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let exit_jump = self.emit_jump(op::JUMP_IF_FALSE);
        self.emit_byte(op::POP);
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit_byte(op::POP);
    }

    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'for'.");

        if self.matches(TokenKind::Semicolon) {
            // No initializer.
        } else if self.matches(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.current_chunk_mut().len();

        let exit_jump = if self.matches(TokenKind::Semicolon) {
            None
        } else {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after loop condition.");
            let exit = self.emit_jump(op::JUMP_IF_FALSE);
            self.emit_byte(op::POP);
            Some(exit)
        };

        if !self.matches(TokenKind::RightParen) {
            let body_jump = self.emit_jump(op::JUMP);
            let increment_start = self.current_chunk_mut().len();
            self.expression();
            self.emit_byte(op::POP);
            self.consume(TokenKind::RightParen, "Expect ')' after for clauses.");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        }

        self.statement();
        self.emit_loop(loop_start);

        if let Some(exit) = exit_jump {
            self.patch_jump(exit);
            self.emit_byte(op::POP);
        }

        self.end_scope();
    }

    fn return_statement(&mut self) {
        if self.compiler().kind == FunctionKind::Script {
            self.error("Can't return from top-level code.");
        }

        if self.matches(TokenKind::Semicolon) {
            self.emit_return();
        } else {
            if self.compiler().kind == FunctionKind::Initializer {
                self.error("Can't return a value from an initializer.");
            }
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after return value.");
            self.emit_byte(op::RETURN);
        }
    }

    fn block(&mut self) {
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after block.");
    }

    fn begin_scope(&mut self) {
        self.compiler_mut().scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.compiler_mut().scope_depth -= 1;

        loop {
            let scope_depth = self.compiler().scope_depth;
            let Some(local) = self.compiler().locals.last() else {
                break;
            };
            if local.depth.is_none_or(|depth| depth <= scope_depth) {
                break;
            }

            if local.is_captured {
                self.emit_byte(op::CLOSE_UPVALUE);
            } else {
                self.emit_byte(op::POP);
            }
            self.compiler_mut().locals.pop();
        }
    }

    // ------------------------------------------------------------------
    // Variables
    // ------------------------------------------------------------------

    fn parse_variable(&mut self, message: &str) -> u8 {
        self.consume(TokenKind::Identifier, message);

        self.declare_variable();
        if self.compiler().scope_depth > 0 {
            return 0;
        }

        self.identifier_constant(self.previous.lexeme)
    }

    fn declare_variable(&mut self) {
        if self.compiler().scope_depth == 0 {
            return;
        }

        let name = self.previous.lexeme;
        let scope_depth = self.compiler().scope_depth;
        let mut duplicate = false;
        for local in self.compiler().locals.iter().rev() {
            if local.depth.is_some_and(|depth| depth < scope_depth) {
                break;
            }
            if local.name == name {
                duplicate = true;
                break;
            }
        }
        if duplicate {
            self.error("Already a variable with this name in this scope.");
        }

        self.add_local(name);
    }

    fn add_local(&mut self, name: &'src str) {
        if self.compiler().locals.len() >= MAX_LOCALS {
            self.error("Too many local variables in function.");
            return;
        }
        self.compiler_mut().locals.push(Local {
            name,
            depth: None,
            is_captured: false,
        });
    }

    fn mark_initialized(&mut self) {
        let scope_depth = self.compiler().scope_depth;
        if scope_depth == 0 {
            return;
        }
        if let Some(local) = self.compiler_mut().locals.last_mut() {
            local.depth = Some(scope_depth);
        }
    }

    fn define_variable(&mut self, global: u8) {
        if self.compiler().scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit_bytes(op::DEFINE_GLOBAL, global);
    }

    fn resolve_local(&mut self, compiler_index: usize, name: &str) -> Option<u8> {
        let found = self.compilers[compiler_index]
            .locals
            .iter()
            .rposition(|local| local.name == name);

        let index = found?;
        if self.compilers[compiler_index].locals[index].depth.is_none() {
            self.error("Can't read local variable in its own initializer.");
        }
        Some(index as u8)
    }

    fn resolve_upvalue(&mut self, compiler_index: usize, name: &str) -> Option<u8> {
        if compiler_index == 0 {
            return None;
        }

        if let Some(local) = self.resolve_local(compiler_index - 1, name) {
            self.compilers[compiler_index - 1].locals[local as usize].is_captured = true;
            return Some(self.add_upvalue(compiler_index, local, true));
        }

        if let Some(upvalue) = self.resolve_upvalue(compiler_index - 1, name) {
            return Some(self.add_upvalue(compiler_index, upvalue, false));
        }

        None
    }

    fn add_upvalue(&mut self, compiler_index: usize, index: u8, is_local: bool) -> u8 {
        let existing = self.compilers[compiler_index]
            .upvalues
            .iter()
            .position(|upvalue| upvalue.index == index && upvalue.is_local == is_local);
        if let Some(i) = existing {
            return i as u8;
        }

        if self.compilers[compiler_index].upvalues.len() >= MAX_UPVALUES {
            self.error("Too many closure variables in function.");
            return 0;
        }

        self.compilers[compiler_index]
            .upvalues
            .push(CompilerUpvalue { index, is_local });
        (self.compilers[compiler_index].upvalues.len() - 1) as u8
    }

    fn named_variable(&mut self, name: &'src str, can_assign: bool) {
        let innermost = self.compilers.len() - 1;
        let (get_op, set_op, arg) = if let Some(slot) = self.resolve_local(innermost, name) {
            (op::GET_LOCAL, op::SET_LOCAL, slot)
        } else if let Some(slot) = self.resolve_upvalue(innermost, name) {
            (op::GET_UPVALUE, op::SET_UPVALUE, slot)
        } else {
            let constant = self.identifier_constant(name);
            (op::GET_GLOBAL, op::SET_GLOBAL, constant)
        };

        if can_assign && self.matches(TokenKind::Equal) {
            self.expression();
            self.emit_bytes(set_op, arg);
        } else {
            self.emit_bytes(get_op, arg);
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let Some(prefix) = rule_for(self.previous.kind).prefix else {
            self.error("Expect expression.");
            return;
        };

        let can_assign = precedence <= Precedence::Assignment;
        prefix(self, can_assign);

        while precedence <= rule_for(self.current.kind).precedence {
            self.advance();
            if let Some(infix) = rule_for(self.previous.kind).infix {
                infix(self, can_assign);
            }
        }

        if can_assign && self.matches(TokenKind::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    fn grouping(&mut self, _can_assign: bool) {
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after expression.");
    }

    fn number(&mut self, _can_assign: bool) {
        let value: f64 = self.previous.lexeme.parse().unwrap_or(0.0);
        self.emit_constant(Value::Number(value));
    }

    fn string(&mut self, _can_assign: bool) {
        let lexeme = self.previous.lexeme;
        // Strip the surrounding quotes.
        let chars = &lexeme[1..lexeme.len() - 1];
        let roots = compile_roots(&self.function_stack, self.globals, self.init_string);
        let string = self.heap.copy_string(chars, &roots);
        self.emit_constant(Value::Object(string));
    }

    fn literal(&mut self, _can_assign: bool) {
        match self.previous.kind {
            TokenKind::False => self.emit_byte(op::FALSE),
            TokenKind::Nil => self.emit_byte(op::NIL),
            TokenKind::True => self.emit_byte(op::TRUE),
            _ => unreachable!("literal rule on non-literal token"),
        }
    }

    fn variable(&mut self, can_assign: bool) {
        self.named_variable(self.previous.lexeme, can_assign);
    }

    fn this_expression(&mut self, _can_assign: bool) {
        if self.class_compilers.is_empty() {
            self.error("Can't use 'this' outside of a class.");
            return;
        }
        self.variable(false);
    }

    fn super_expression(&mut self, _can_assign: bool) {
        match self.class_compilers.last() {
            None => self.error("Can't use 'super' outside of a class."),
            Some(class) if !class.has_superclass => {
                self.error("Can't use 'super' in a class with no superclass.");
            }
            Some(_) => {}
        }

        self.consume(TokenKind::Dot, "Expect '.' after 'super'.");
        self.consume(TokenKind::Identifier, "Expect superclass method name.");
        let name = self.identifier_constant(self.previous.lexeme);

        self.named_variable("this", false);
        if self.matches(TokenKind::LeftParen) {
            let arg_count = self.argument_list();
            self.named_variable("super", false);
            self.emit_bytes(op::SUPER_INVOKE, name);
            self.emit_byte(arg_count);
        } else {
            self.named_variable("super", false);
            self.emit_bytes(op::GET_SUPER, name);
        }
    }

    fn unary(&mut self, _can_assign: bool) {
        let operator = self.previous.kind;

        self.parse_precedence(Precedence::Unary);

        match operator {
            TokenKind::Bang => self.emit_byte(op::NOT),
            TokenKind::Minus => self.emit_byte(op::NEGATE),
            _ => unreachable!("unary rule on non-unary token"),
        }
    }

    fn binary(&mut self, _can_assign: bool) {
        let operator = self.previous.kind;
        let rule = rule_for(operator);
        self.parse_precedence(rule.precedence.next());

        match operator {
            TokenKind::BangEqual => self.emit_bytes(op::EQUAL, op::NOT),
            TokenKind::EqualEqual => self.emit_byte(op::EQUAL),
            TokenKind::Greater => self.emit_byte(op::GREATER),
            TokenKind::GreaterEqual => self.emit_bytes(op::LESS, op::NOT),
            TokenKind::Less => self.emit_byte(op::LESS),
            TokenKind::LessEqual => self.emit_bytes(op::GREATER, op::NOT),
            TokenKind::Plus => self.emit_byte(op::ADD),
            TokenKind::Minus => self.emit_byte(op::SUBTRACT),
            TokenKind::Star => self.emit_byte(op::MULTIPLY),
            TokenKind::Slash => self.emit_byte(op::DIVIDE),
            _ => unreachable!("binary rule on non-binary token"),
        }
    }

    fn and_operator(&mut self, _can_assign: bool) {
        let end_jump = self.emit_jump(op::JUMP_IF_FALSE);

        self.emit_byte(op::POP);
        self.parse_precedence(Precedence::And);

        self.patch_jump(end_jump);
    }

    fn or_operator(&mut self, _can_assign: bool) {
        let else_jump = self.emit_jump(op::JUMP_IF_FALSE);
        let end_jump = self.emit_jump(op::JUMP);

        self.patch_jump(else_jump);
        self.emit_byte(op::POP);

        self.parse_precedence(Precedence::Or);
        self.patch_jump(end_jump);
    }

    fn call(&mut self, _can_assign: bool) {
        let arg_count = self.argument_list();
        self.emit_bytes(op::CALL, arg_count);
    }

    fn dot(&mut self, can_assign: bool) {
        self.consume(TokenKind::Identifier, "Expect property name after '.'.");
        let name = self.identifier_constant(self.previous.lexeme);

        if can_assign && self.matches(TokenKind::Equal) {
            self.expression();
            self.emit_bytes(op::SET_PROPERTY, name);
        } else if self.matches(TokenKind::LeftParen) {
            let arg_count = self.argument_list();
            self.emit_bytes(op::INVOKE, name);
            self.emit_byte(arg_count);
        } else {
            self.emit_bytes(op::GET_PROPERTY, name);
        }
    }

    fn argument_list(&mut self) -> u8 {
        let mut arg_count: u8 = 0;
        if !self.check(TokenKind::RightParen) {
            loop {
                self.expression();
                if arg_count == u8::MAX {
                    self.error("Can't have more than 255 arguments.");
                }
                arg_count = arg_count.saturating_add(1);

                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after arguments.");
        arg_count
    }
}
