// File: src/compiler.rs
//
// One-pass Pratt compiler: scans tokens on demand and emits bytecode
// directly, with no intermediate AST. A stack of `FunctionScope`s tracks
// locals/upvalues for the function currently being compiled and its
// enclosing functions, mirroring the reference compiler's linked list of
// `Compiler` structs but addressed by index instead of a raw `enclosing`
// pointer (see SPEC_FULL.md §4.3's Rust realization note).

use crate::bytecode::OpCode;
use crate::lexer::{Scanner, Token, TokenKind};
use crate::memory::Heap;
use crate::table::Table;
use crate::value::{Obj, ObjFunction, ObjRef, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
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
    fn next(self) -> Precedence {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call | Precedence::Primary => Precedence::Primary,
        }
    }
}

fn precedence_of(kind: TokenKind) -> Precedence {
    use TokenKind::*;
    match kind {
        Minus | Plus => Precedence::Term,
        Slash | Star => Precedence::Factor,
        BangEqual | EqualEqual => Precedence::Equality,
        Greater | GreaterEqual | Less | LessEqual => Precedence::Comparison,
        And => Precedence::And,
        Or => Precedence::Or,
        LeftParen => Precedence::Call,
        _ => Precedence::None,
    }
}

struct Local<'src> {
    name: &'src str,
    depth: i32,
    is_captured: bool,
}

struct UpvalueDesc {
    index: u8,
    is_local: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FunctionKind {
    Function,
    Script,
}

/// Compile-time bookkeeping for one function (or the top-level script).
/// The function object itself lives on the heap from the moment this scope
/// is pushed, so it can be filled in incrementally as the body compiles.
struct FunctionScope<'src> {
    function_ref: ObjRef,
    kind: FunctionKind,
    locals: Vec<Local<'src>>,
    upvalues: Vec<UpvalueDesc>,
    scope_depth: i32,
}

pub struct Compiler<'src, 'h, 'g> {
    scanner: Scanner<'src>,
    current: Token<'src>,
    previous: Token<'src>,
    had_error: bool,
    panic_mode: bool,
    scopes: Vec<FunctionScope<'src>>,
    heap: &'h mut Heap,
    globals: &'g Table,
}

/// Compiles `source` to a top-level script function, or `None` if any
/// compile-time error was reported. Diagnostics are written to stderr in
/// the exact wire format consumers depend on: `[line L] Error[ at
/// <lexeme>|at end]: <message>`.
///
/// `globals` is the VM's global table, passed through so a GC cycle
/// triggered mid-compile (e.g. a source file with many string/function
/// constants) still treats previously-defined globals as roots — see
/// SPEC_FULL.md §4.5's Mark-roots list and DESIGN.md's Open Question #2.
pub fn compile(source: &str, heap: &mut Heap, globals: &Table) -> Option<ObjRef> {
    let mut compiler = Compiler::new(source, heap, globals);
    compiler.advance();
    while !compiler.match_token(TokenKind::Eof) {
        compiler.declaration();
    }
    let (function_ref, _upvalues) = compiler.end_function();
    if compiler.had_error {
        None
    } else {
        Some(function_ref)
    }
}

impl<'src, 'h, 'g> Compiler<'src, 'h, 'g> {
    fn new(source: &'src str, heap: &'h mut Heap, globals: &'g Table) -> Self {
        let placeholder = Token { kind: TokenKind::Error, lexeme: "", line: 0 };
        let mut compiler = Compiler {
            scanner: Scanner::new(source),
            current: placeholder,
            previous: placeholder,
            had_error: false,
            panic_mode: false,
            scopes: Vec::new(),
            heap,
            globals,
        };
        compiler.push_scope(FunctionKind::Script, None);
        compiler
    }

    /// Runs a collection if the heap's byte threshold says it's due,
    /// rooting every function currently being compiled (this one and all
    /// its enclosing functions) plus the VM's globals. Must be called
    /// before starting an allocation sequence whose intermediate objects
    /// aren't yet reachable from `self.scopes` or `self.globals` — see
    /// `Heap::alloc`'s allocation-safety note.
    fn maybe_collect(&mut self) {
        if !self.heap.should_collect() {
            return;
        }
        let compiler_roots: Vec<ObjRef> = self.scopes.iter().map(|scope| scope.function_ref).collect();
        self.heap.collect_garbage(&[], &[], &[], self.globals, &compiler_roots);
    }

    // ---- token stream plumbing -------------------------------------

    fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.scanner.scan_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            let message = self.current.lexeme.to_string();
            self.error_at_current(&message);
        }
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.current.kind == kind {
            self.advance();
        } else {
            self.error_at_current(message);
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    fn error_at(&mut self, token: Token<'src>, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;
        let location = match token.kind {
            TokenKind::Eof => " at end".to_string(),
            TokenKind::Error => String::new(),
            _ => format!(" at '{}'", token.lexeme),
        };
        eprintln!("[line {}] Error{}: {}", token.line, location, message);
    }

    fn error(&mut self, message: &str) {
        self.error_at(self.previous, message);
    }

    fn error_at_current(&mut self, message: &str) {
        self.error_at(self.current, message);
    }

    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            if matches!(
                self.current.kind,
                TokenKind::Class
                    | TokenKind::Fun
                    | TokenKind::Var
                    | TokenKind::For
                    | TokenKind::If
                    | TokenKind::While
                    | TokenKind::Print
                    | TokenKind::Return
            ) {
                return;
            }
            self.advance();
        }
    }

    // ---- scope / function-chain plumbing -----------------------------

    fn current_scope(&self) -> &FunctionScope<'src> {
        self.scopes.last().unwrap()
    }

    fn current_scope_mut(&mut self) -> &mut FunctionScope<'src> {
        self.scopes.last_mut().unwrap()
    }

    fn current_function_ref(&self) -> ObjRef {
        self.current_scope().function_ref
    }

    fn current_chunk(&mut self) -> &mut crate::bytecode::Chunk {
        let r = self.current_function_ref();
        &mut self.heap.as_function_mut(r).unwrap().chunk
    }

    /// Allocates the function object for a new scope immediately, the way
    /// the reference compiler allocates `Function` at `initCompiler` time
    /// rather than only once the body finishes.
    fn push_scope(&mut self, kind: FunctionKind, name: Option<&str>) {
        self.maybe_collect();
        let function_ref = self.heap.alloc(Obj::Function(ObjFunction::new()));
        if let Some(name) = name {
            let name_ref = self.heap.intern(name);
            self.heap.as_function_mut(function_ref).unwrap().name = Some(name_ref);
        }
        self.scopes.push(FunctionScope {
            function_ref,
            kind,
            locals: vec![Local { name: "", depth: 0, is_captured: false }],
            upvalues: Vec::new(),
            scope_depth: 0,
        });
    }

    fn end_function(&mut self) -> (ObjRef, Vec<UpvalueDesc>) {
        self.emit_return();
        let scope = self.scopes.pop().unwrap();
        (scope.function_ref, scope.upvalues)
    }

    fn begin_scope(&mut self) {
        self.current_scope_mut().scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.current_scope_mut().scope_depth -= 1;
        let depth = self.current_scope().scope_depth;
        loop {
            let keep_popping =
                matches!(self.current_scope().locals.last(), Some(local) if local.depth > depth);
            if !keep_popping {
                break;
            }
            let is_captured = self.current_scope().locals.last().unwrap().is_captured;
            if is_captured {
                self.emit_op(OpCode::CloseUpvalue);
            } else {
                self.emit_op(OpCode::Pop);
            }
            self.current_scope_mut().locals.pop();
        }
    }

    // ---- bytecode emission --------------------------------------------

    fn emit_byte(&mut self, byte: u8) {
        let line = self.previous.line;
        self.current_chunk().write(byte, line);
    }

    fn emit_op(&mut self, op: OpCode) {
        self.emit_byte(op as u8);
    }

    fn emit_two(&mut self, op: OpCode, byte: u8) {
        self.emit_op(op);
        self.emit_byte(byte);
    }

    fn emit_return(&mut self) {
        self.emit_op(OpCode::Nil);
        self.emit_op(OpCode::Return);
    }

    fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_op(op);
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        self.current_chunk().count() - 2
    }

    fn patch_jump(&mut self, offset: usize) {
        if let Err(message) = self.current_chunk().patch_jump(offset) {
            self.error(&message);
        }
    }

    fn emit_loop(&mut self, loop_start: usize) {
        self.emit_op(OpCode::Loop);
        let offset = self.current_chunk().count() - loop_start + 2;
        if offset > u16::MAX as usize {
            self.error("Loop body too large.");
        }
        let bytes = (offset as u16).to_be_bytes();
        self.emit_byte(bytes[0]);
        self.emit_byte(bytes[1]);
    }

    fn emit_constant(&mut self, value: Value) {
        let index = self.current_chunk().add_constant(value);
        self.emit_constant_index(index);
    }

    fn emit_constant_index(&mut self, index: usize) {
        if index <= u8::MAX as usize {
            self.emit_two(OpCode::Const, index as u8);
        } else if index <= 0xFF_FFFF {
            self.emit_op(OpCode::ConstLong);
            let bytes = (index as u32).to_le_bytes();
            self.emit_byte(bytes[0]);
            self.emit_byte(bytes[1]);
            self.emit_byte(bytes[2]);
        } else {
            self.error("Too many constants in one chunk.");
        }
    }

    fn emit_closure(&mut self, constant_index: usize) {
        if constant_index > u8::MAX as usize {
            self.error("Too many constants in one chunk.");
            return;
        }
        self.emit_two(OpCode::Closure, constant_index as u8);
    }

    fn identifier_constant(&mut self, name: &str) -> u8 {
        self.maybe_collect();
        let r = self.heap.intern(name);
        let index = self.current_chunk().add_constant(Value::Object(r));
        if index > u8::MAX as usize {
            self.error("Too many constants in one chunk.");
            0
        } else {
            index as u8
        }
    }

    // ---- variables ------------------------------------------------------

    fn parse_variable(&mut self, error_message: &str) -> u8 {
        self.consume(TokenKind::Identifier, error_message);
        self.declare_variable();
        if self.current_scope().scope_depth > 0 {
            return 0;
        }
        let name = self.previous.lexeme;
        self.identifier_constant(name)
    }

    fn declare_variable(&mut self) {
        if self.current_scope().scope_depth == 0 {
            return;
        }
        let name = self.previous.lexeme;
        let depth = self.current_scope().scope_depth;
        let mut duplicate = false;
        for local in self.current_scope().locals.iter().rev() {
            if local.depth != -1 && local.depth < depth {
                break;
            }
            if local.name == name {
                duplicate = true;
                break;
            }
        }
        if duplicate {
            self.error("Already a variable with this name in this scope.");
            return;
        }
        self.add_local(name);
    }

    fn add_local(&mut self, name: &'src str) {
        if self.current_scope().locals.len() >= 256 {
            self.error("Too many local variables in function.");
            return;
        }
        self.current_scope_mut().locals.push(Local { name, depth: -1, is_captured: false });
    }

    fn mark_initialized(&mut self) {
        if self.current_scope().scope_depth == 0 {
            return;
        }
        let depth = self.current_scope().scope_depth;
        self.current_scope_mut().locals.last_mut().unwrap().depth = depth;
    }

    fn define_variable(&mut self, global: u8) {
        if self.current_scope().scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit_two(OpCode::DefineGlobal, global);
    }

    fn resolve_local(&mut self, scope_index: usize, name: &str) -> Option<u8> {
        let found = self.scopes[scope_index]
            .locals
            .iter()
            .enumerate()
            .rev()
            .find(|(_, local)| local.name == name)
            .map(|(i, local)| (i as u8, local.depth));
        match found {
            Some((slot, depth)) => {
                if depth == -1 {
                    self.error("Cannot read local variable in its own initializer.");
                }
                Some(slot)
            }
            None => None,
        }
    }

    fn resolve_upvalue(&mut self, scope_index: usize, name: &str) -> Option<u8> {
        if scope_index == 0 {
            return None;
        }
        let enclosing = scope_index - 1;
        if let Some(local_slot) = self.resolve_local(enclosing, name) {
            self.scopes[enclosing].locals[local_slot as usize].is_captured = true;
            return Some(self.add_upvalue(scope_index, local_slot, true));
        }
        if let Some(upvalue_slot) = self.resolve_upvalue(enclosing, name) {
            return Some(self.add_upvalue(scope_index, upvalue_slot, false));
        }
        None
    }

    fn add_upvalue(&mut self, scope_index: usize, index: u8, is_local: bool) -> u8 {
        if let Some(existing) = self.scopes[scope_index]
            .upvalues
            .iter()
            .position(|uv| uv.index == index && uv.is_local == is_local)
        {
            return existing as u8;
        }
        if self.scopes[scope_index].upvalues.len() >= 256 {
            self.error("Too many closure variables.");
            return 0;
        }
        self.scopes[scope_index].upvalues.push(UpvalueDesc { index, is_local });
        (self.scopes[scope_index].upvalues.len() - 1) as u8
    }

    fn named_variable(&mut self, name: &'src str, can_assign: bool) {
        let scope_index = self.scopes.len() - 1;
        let (get_op, set_op, arg) = if let Some(slot) = self.resolve_local(scope_index, name) {
            (OpCode::GetLocal, OpCode::SetLocal, slot)
        } else if let Some(slot) = self.resolve_upvalue(scope_index, name) {
            (OpCode::GetUpvalue, OpCode::SetUpvalue, slot)
        } else {
            let constant = self.identifier_constant(name);
            (OpCode::GetGlobal, OpCode::SetGlobal, constant)
        };
        if can_assign && self.match_token(TokenKind::Equal) {
            self.expression();
            self.emit_two(set_op, arg);
        } else {
            self.emit_two(get_op, arg);
        }
    }

    // ---- declarations / statements --------------------------------------

    fn declaration(&mut self) {
        if self.match_token(TokenKind::Fun) {
            self.fun_declaration();
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.statement();
        }
        if self.panic_mode {
            self.synchronize();
        }
    }

    fn fun_declaration(&mut self) {
        let global = self.parse_variable("Expect function name.");
        self.mark_initialized();
        self.function(FunctionKind::Function);
        self.define_variable(global);
    }

    fn function(&mut self, kind: FunctionKind) {
        let name = self.previous.lexeme.to_string();
        self.push_scope(kind, Some(&name));
        self.begin_scope();

        self.consume(TokenKind::LeftParen, "Expect '(' after function name.");
        if !self.check(TokenKind::RightParen) {
            loop {
                let function_ref = self.current_function_ref();
                let arity = self.heap.as_function(function_ref).unwrap().arity;
                if arity == 255 {
                    self.error_at_current("Can't have more than 255 parameters.");
                } else {
                    self.heap.as_function_mut(function_ref).unwrap().arity = arity + 1;
                }
                let constant = self.parse_variable("Expect parameter name.");
                self.define_variable(constant);
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after parameters.");
        self.consume(TokenKind::LeftBrace, "Expect '{' before function body.");
        self.block();

        let (function_ref, upvalues) = self.end_function();
        self.heap.as_function_mut(function_ref).unwrap().upvalue_count = upvalues.len() as u8;

        let const_index = self.current_chunk().add_constant(Value::Object(function_ref));
        self.emit_closure(const_index);
        for upvalue in &upvalues {
            self.emit_byte(if upvalue.is_local { 1 } else { 0 });
            self.emit_byte(upvalue.index);
        }
    }

    fn var_declaration(&mut self) {
        let global = self.parse_variable("Expect variable name.");
        if self.match_token(TokenKind::Equal) {
            self.expression();
        } else {
            self.emit_op(OpCode::Nil);
        }
        self.consume(TokenKind::Semicolon, "Expect ';' after variable declaration.");
        self.define_variable(global);
    }

    fn statement(&mut self) {
        if self.match_token(TokenKind::Print) {
            self.print_statement();
        } else if self.match_token(TokenKind::If) {
            self.if_statement();
        } else if self.match_token(TokenKind::While) {
            self.while_statement();
        } else if self.match_token(TokenKind::For) {
            self.for_statement();
        } else if self.match_token(TokenKind::Return) {
            self.return_statement();
        } else if self.match_token(TokenKind::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn block(&mut self) {
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after block.");
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after value.");
        self.emit_op(OpCode::Print);
    }

    fn if_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let then_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();

        let else_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(then_jump);
        self.emit_op(OpCode::Pop);

        if self.match_token(TokenKind::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.current_chunk().count();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit_op(OpCode::Pop);
    }

    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'for'.");

        if self.match_token(TokenKind::Semicolon) {
            // no initializer
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.current_chunk().count();
        let mut exit_jump: Option<usize> = None;
        if !self.match_token(TokenKind::Semicolon) {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after loop condition.");
            exit_jump = Some(self.emit_jump(OpCode::JumpIfFalse));
            self.emit_op(OpCode::Pop);
        }

        if !self.match_token(TokenKind::RightParen) {
            let body_jump = self.emit_jump(OpCode::Jump);
            let increment_start = self.current_chunk().count();
            self.expression();
            self.emit_op(OpCode::Pop);
            self.consume(TokenKind::RightParen, "Expect ')' after for clauses.");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        }

        self.statement();
        self.emit_loop(loop_start);

        if let Some(exit_jump) = exit_jump {
            self.patch_jump(exit_jump);
            self.emit_op(OpCode::Pop);
        }
        self.end_scope();
    }

    fn return_statement(&mut self) {
        if self.current_scope().kind == FunctionKind::Script {
            self.error("Cannot return from top-level code.");
        }
        if self.match_token(TokenKind::Semicolon) {
            self.emit_return();
        } else {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after return value.");
            self.emit_op(OpCode::Return);
        }
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.");
        self.emit_op(OpCode::Pop);
    }

    // ---- expressions (Pratt core) ----------------------------------------

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let can_assign = precedence <= Precedence::Assignment;
        if !self.prefix(self.previous.kind, can_assign) {
            self.error("Expect expression.");
            return;
        }

        while precedence <= precedence_of(self.current.kind) {
            self.advance();
            self.infix(self.previous.kind);
        }

        if can_assign && self.match_token(TokenKind::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    fn prefix(&mut self, kind: TokenKind, can_assign: bool) -> bool {
        use TokenKind::*;
        match kind {
            LeftParen => self.grouping(),
            Minus | Bang => self.unary(),
            Number => self.number(),
            String => self.string(),
            Nah | True | False => self.literal(kind),
            Identifier => self.variable(can_assign),
            _ => return false,
        }
        true
    }

    fn infix(&mut self, kind: TokenKind) {
        use TokenKind::*;
        match kind {
            Minus | Plus | Slash | Star | BangEqual | EqualEqual | Greater | GreaterEqual
            | Less | LessEqual => self.binary(kind),
            And => self.and(),
            Or => self.or(),
            LeftParen => self.call(),
            _ => {}
        }
    }

    fn grouping(&mut self) {
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after expression.");
    }

    fn unary(&mut self) {
        let kind = self.previous.kind;
        self.parse_precedence(Precedence::Unary);
        match kind {
            TokenKind::Minus => self.emit_op(OpCode::Negate),
            TokenKind::Bang => self.emit_op(OpCode::Not),
            _ => unreachable!(),
        }
    }

    fn binary(&mut self, kind: TokenKind) {
        self.parse_precedence(precedence_of(kind).next());
        match kind {
            TokenKind::Plus => self.emit_op(OpCode::Add),
            TokenKind::Minus => self.emit_op(OpCode::Sub),
            TokenKind::Star => self.emit_op(OpCode::Mul),
            TokenKind::Slash => self.emit_op(OpCode::Div),
            TokenKind::BangEqual => {
                self.emit_op(OpCode::Equal);
                self.emit_op(OpCode::Not);
            }
            TokenKind::EqualEqual => self.emit_op(OpCode::Equal),
            TokenKind::Greater => self.emit_op(OpCode::Greater),
            TokenKind::GreaterEqual => {
                self.emit_op(OpCode::Less);
                self.emit_op(OpCode::Not);
            }
            TokenKind::Less => self.emit_op(OpCode::Less),
            TokenKind::LessEqual => {
                self.emit_op(OpCode::Greater);
                self.emit_op(OpCode::Not);
            }
            _ => unreachable!(),
        }
    }

    fn and(&mut self) {
        let end_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::And);
        self.patch_jump(end_jump);
    }

    fn or(&mut self) {
        let else_jump = self.emit_jump(OpCode::JumpIfFalse);
        let end_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(else_jump);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::Or);
        self.patch_jump(end_jump);
    }

    fn call(&mut self) {
        let argc = self.argument_list();
        self.emit_two(OpCode::Call, argc);
    }

    fn argument_list(&mut self) -> u8 {
        let mut count: u16 = 0;
        if !self.check(TokenKind::RightParen) {
            loop {
                self.expression();
                if count == 255 {
                    self.error("Can't have more than 255 arguments.");
                }
                count += 1;
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after arguments.");
        count as u8
    }

    fn number(&mut self) {
        let value: f64 = self.previous.lexeme.parse().expect("scanner only emits valid numbers");
        self.emit_constant(Value::Number(value));
    }

    fn string(&mut self) {
        self.maybe_collect();
        let lexeme = self.previous.lexeme;
        let content = &lexeme[1..lexeme.len() - 1];
        let r = self.heap.intern(content);
        self.emit_constant(Value::Object(r));
    }

    fn literal(&mut self, kind: TokenKind) {
        match kind {
            TokenKind::Nah => self.emit_op(OpCode::Nil),
            TokenKind::True => self.emit_op(OpCode::True),
            TokenKind::False => self.emit_op(OpCode::False),
            _ => unreachable!(),
        }
    }

    fn variable(&mut self, can_assign: bool) {
        let name = self.previous.lexeme;
        self.named_variable(name, can_assign);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::OpCode;

    fn compile_ok(source: &str) -> (ObjRef, Heap) {
        let mut heap = Heap::new();
        let globals = Table::new();
        let result = compile(source, &mut heap, &globals);
        (result.expect("expected successful compile"), heap)
    }

    #[test]
    fn compiles_trivial_expression_statement() {
        let (function_ref, heap) = compile_ok("1 + 2;");
        let chunk = &heap.as_function(function_ref).unwrap().chunk;
        assert_eq!(chunk.code[0], OpCode::Const as u8);
        assert!(chunk.code.contains(&(OpCode::Add as u8)));
        assert!(chunk.code.contains(&(OpCode::Pop as u8)));
    }

    #[test]
    fn return_at_top_level_is_a_compile_error() {
        let mut heap = Heap::new();
        let globals = Table::new();
        assert!(compile("return 1;", &mut heap, &globals).is_none());
    }

    #[test]
    fn reading_local_in_its_own_initializer_is_a_compile_error() {
        let mut heap = Heap::new();
        let globals = Table::new();
        assert!(compile("{ var a = a; }", &mut heap, &globals).is_none());
    }

    #[test]
    fn duplicate_local_in_same_scope_is_a_compile_error() {
        let mut heap = Heap::new();
        let globals = Table::new();
        assert!(compile("{ var a = 1; var a = 2; }", &mut heap, &globals).is_none());
    }

    #[test]
    fn closure_over_enclosing_local_emits_upvalue_ops() {
        let (function_ref, heap) = compile_ok(
            "fun outer() { var x = 1; fun inner() { return x; } return inner; }",
        );
        let chunk = &heap.as_function(function_ref).unwrap().chunk;
        // the outer closure is wrapped at top level
        assert!(chunk.code.contains(&(OpCode::Closure as u8)));
    }

    #[test]
    fn unterminated_grouping_is_a_compile_error() {
        let mut heap = Heap::new();
        let globals = Table::new();
        assert!(compile("print (1 + 2;", &mut heap, &globals).is_none());
    }

    #[test]
    fn compiling_under_forced_gc_stress_still_succeeds() {
        let mut heap = Heap::new();
        heap.set_stress_gc(true);
        let globals = Table::new();
        let result = compile(
            "fun outer() { var x = 1; fun inner() { return x; } return inner; } print outer()();",
            &mut heap,
            &globals,
        );
        assert!(result.is_some());
    }
}
