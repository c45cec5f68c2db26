//! Translation of a parsed module into stack-machine assembly.
//!
//! Two passes: the first distributes storage slots over the variable table
//! (negative offsets for the top-level program, per-frame positive offsets
//! for function locals), the second walks the tree post-order and emits the
//! instruction text. The tree itself stays untouched; everything the
//! emitter needs to remember lives in the symbol tables.

use slog::{o, trace, Discard, Logger};

use std::fmt;

use crate::source::Module;
use crate::tree::{NodeId, NodeKind, Op};

/// Internal failures of the code generator. Every variant indicates a
/// defect in a prior stage; user input can never trigger these.
#[derive(Clone, Debug, PartialEq)]
pub enum CodegenError {
    /// A node kind that cannot occur at this position of a well-formed
    /// tree, e.g. a stray `Else`.
    UnreachableNodeKind { kind: NodeKind },
    /// A node payload indexing past the symbol tables.
    InvalidTableIndex { kind: NodeKind, payload: i64 },
    /// A node missing a required child, or a variable that never received
    /// a storage slot.
    MalformedNode { kind: NodeKind },
}

impl fmt::Display for CodegenError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CodegenError::UnreachableNodeKind { kind } => {
                write!(f, "internal error: {:?} node in an impossible position", kind)
            }
            CodegenError::InvalidTableIndex { kind, payload } => write!(
                f,
                "internal error: {:?} node indexes a missing table entry ({})",
                kind, payload,
            ),
            CodegenError::MalformedNode { kind } => {
                write!(f, "internal error: malformed {:?} node", kind)
            }
        }
    }
}

impl std::error::Error for CodegenError {}

/// Compile a module into assembly text.
pub fn generate(module: Module) -> Result<String, CodegenError> {
    generate_with_logger(module, None)
}

pub fn generate_with_logger<L>(mut module: Module, logger: L) -> Result<String, CodegenError>
where
    L: Into<Option<Logger>>,
{
    let logger = logger
        .into()
        .unwrap_or_else(|| Logger::root(Discard, o!()))
        .new(o!("stage" => "codegen"));

    let main_slots = assign_slots(&mut module)?;
    trace!(logger, "slots assigned"; "main_slots" => main_slots);

    let mut emitter = Emitter {
        module: &module,
        out: String::new(),
        next_label: 0,
        logger,
    };
    emitter.program(main_slots)?;

    Ok(emitter.out)
}

/// Pass 1: walk the top-level chain, give every function's parameters and
/// locals positive slots private to its frame, and every top-level variable
/// a negative slot in the global area. Returns the global slot count.
fn assign_slots(module: &mut Module) -> Result<i64, CodegenError> {
    let mut cursor = module.tree.left(module.tree.root());

    while let Some(cell) = cursor {
        match module.tree.left(cell) {
            Some(item) if module.tree.kind(item) == NodeKind::FuncDecl => {
                assign_function_slots(module, item)?;
                cursor = module.tree.right(cell);
            }
            _ => break,
        }
    }

    let mut count = 0;
    if let Some(main) = cursor {
        count_declarations(module, main, &mut count, true)?;
    }

    Ok(count)
}

fn assign_function_slots(module: &mut Module, func: NodeId) -> Result<(), CodegenError> {
    let payload = module.tree.payload(func);
    let arg_slots = module
        .funcs
        .get(payload as usize)
        .ok_or(CodegenError::InvalidTableIndex {
            kind: NodeKind::FuncDecl,
            payload,
        })?
        .arg_slots
        .clone();

    let mut count = 0;
    for index in arg_slots {
        count += 1;
        module
            .vars
            .get_mut(index)
            .ok_or(CodegenError::InvalidTableIndex {
                kind: NodeKind::FuncDecl,
                payload: index as i64,
            })?
            .frame_slot = count;
    }

    if let Some(body) = module.tree.right(func) {
        count_declarations(module, body, &mut count, false)?;
    }

    module
        .funcs
        .get_mut(payload as usize)
        .expect("validated above")
        .local_count = count as usize;

    Ok(())
}

fn count_declarations(
    module: &mut Module,
    node: NodeId,
    count: &mut i64,
    top_level: bool,
) -> Result<(), CodegenError> {
    if module.tree.kind(node) == NodeKind::VarDecl {
        let payload = module.tree.payload(node);
        *count += 1;
        let slot = if top_level { -*count } else { *count };
        module
            .vars
            .get_mut(payload as usize)
            .ok_or(CodegenError::InvalidTableIndex {
                kind: NodeKind::VarDecl,
                payload,
            })?
            .frame_slot = slot;
    }

    if let Some(left) = module.tree.left(node) {
        count_declarations(module, left, count, top_level)?;
    }
    if let Some(right) = module.tree.right(node) {
        count_declarations(module, right, count, top_level)?;
    }

    Ok(())
}

struct Emitter<'a> {
    module: &'a Module,
    out: String,
    next_label: usize,
    logger: Logger,
}

impl<'a> Emitter<'a> {
    fn line(&mut self, text: &str) {
        self.out.push_str(text);
        self.out.push('\n');
    }

    /// Labels are handed out in pairs and never reused.
    fn fresh_labels(&mut self) -> (usize, usize) {
        let first = self.next_label;
        self.next_label += 2;
        (first, first + 1)
    }

    fn left_of(&self, node: NodeId) -> Result<NodeId, CodegenError> {
        self.module
            .tree
            .left(node)
            .ok_or(CodegenError::MalformedNode {
                kind: self.module.tree.kind(node),
            })
    }

    fn right_of(&self, node: NodeId) -> Result<NodeId, CodegenError> {
        self.module
            .tree
            .right(node)
            .ok_or(CodegenError::MalformedNode {
                kind: self.module.tree.kind(node),
            })
    }

    fn slot_of(&self, kind: NodeKind, payload: i64) -> Result<i64, CodegenError> {
        let slot = self
            .module
            .vars
            .get(payload as usize)
            .ok_or(CodegenError::InvalidTableIndex { kind, payload })?
            .frame_slot;

        if slot == 0 {
            // A variable the slot pass never saw a declaration for.
            return Err(CodegenError::MalformedNode { kind });
        }

        Ok(slot)
    }

    fn push_var(&mut self, kind: NodeKind, payload: i64) -> Result<(), CodegenError> {
        let slot = self.slot_of(kind, payload)?;
        if slot > 0 {
            self.line(&format!("PUSH [rdx+{}]", slot));
        } else {
            self.line(&format!("PUSH [{}]", -slot));
        }
        Ok(())
    }

    fn pop_var(&mut self, kind: NodeKind, payload: i64) -> Result<(), CodegenError> {
        let slot = self.slot_of(kind, payload)?;
        if slot > 0 {
            self.line(&format!("POP [rdx+{}]", slot));
        } else {
            self.line(&format!("POP [{}]", -slot));
        }
        Ok(())
    }

    fn program(&mut self, main_slots: i64) -> Result<(), CodegenError> {
        self.line("PUSH 0");
        self.line("POP rdx");
        self.line(&format!("PUSH {}", main_slots));
        self.line("POP rcx");
        self.line("JMP main");

        let mut cursor = self.module.tree.left(self.module.tree.root());
        while let Some(cell) = cursor {
            match self.module.tree.left(cell) {
                Some(item) if self.module.tree.kind(item) == NodeKind::FuncDecl => {
                    self.function(item)?;
                    cursor = self.module.tree.right(cell);
                }
                _ => break,
            }
        }

        self.line("main:");
        if let Some(main) = cursor {
            self.emit(main)?;
        }
        self.line("HLT");

        Ok(())
    }

    fn function(&mut self, node: NodeId) -> Result<(), CodegenError> {
        let payload = self.module.tree.payload(node);
        let func = self
            .module
            .funcs
            .get(payload as usize)
            .ok_or(CodegenError::InvalidTableIndex {
                kind: NodeKind::FuncDecl,
                payload,
            })?;
        let arity = func.arity();
        let frame = func.local_count;

        trace!(self.logger, "emit function";
            "name" => %func.name, "arity" => arity, "frame" => frame);

        self.line(&format!("f{}:", payload));
        self.line(&format!("PUSH {}", frame));
        self.line("POP rcx");
        for slot in 1..=arity {
            self.line(&format!("POP [rdx+{}]", slot));
        }

        let body = self.right_of(node)?;
        self.emit(body)
    }

    fn emit(&mut self, node: NodeId) -> Result<(), CodegenError> {
        let kind = self.module.tree.kind(node);
        let payload = self.module.tree.payload(node);

        match kind {
            NodeKind::Fic => {
                if let Some(left) = self.module.tree.left(node) {
                    self.emit(left)?;
                    // Expression statements leave a value behind; drop it.
                    if matches!(
                        self.module.tree.kind(left),
                        NodeKind::Op | NodeKind::Number | NodeKind::Var | NodeKind::Call
                    ) {
                        self.line("POP rax");
                    }
                }
                if let Some(right) = self.module.tree.right(node) {
                    self.emit(right)?;
                }
                Ok(())
            }

            NodeKind::Number => {
                self.line(&format!("PUSH {}", payload));
                Ok(())
            }

            NodeKind::Var => self.push_var(kind, payload),

            NodeKind::VarDecl => {
                self.line("PUSH 0");
                self.pop_var(kind, payload)
            }

            NodeKind::If => {
                let condition = self.left_of(node)?;
                let decision = self.right_of(node)?;
                if self.module.tree.kind(decision) != NodeKind::Else {
                    return Err(CodegenError::MalformedNode { kind });
                }

                self.emit(condition)?;

                let (skip, done) = self.fresh_labels();
                self.line("PUSH 0");
                self.line(&format!("JE l{}", skip));

                if let Some(then_branch) = self.module.tree.left(decision) {
                    self.emit(then_branch)?;
                }
                self.line(&format!("JMP l{}", done));
                self.line(&format!("l{}:", skip));

                if let Some(else_branch) = self.module.tree.right(decision) {
                    self.emit(else_branch)?;
                }
                self.line(&format!("l{}:", done));

                Ok(())
            }

            NodeKind::While => {
                let condition = self.left_of(node)?;
                let body = self.right_of(node)?;

                let (again, done) = self.fresh_labels();
                self.line(&format!("l{}:", again));
                self.emit(condition)?;
                self.line("PUSH 0");
                self.line(&format!("JE l{}", done));
                self.emit(body)?;
                self.line(&format!("JMP l{}", again));
                self.line(&format!("l{}:", done));

                Ok(())
            }

            NodeKind::Op => {
                let op = Op::from_payload(payload)
                    .ok_or(CodegenError::MalformedNode { kind })?;
                self.operator(node, op)
            }

            NodeKind::Call => self.call(node),

            NodeKind::Return => {
                let value = self.left_of(node)?;
                self.emit(value)?;
                // The parent links locate the enclosing function; a return
                // with none is a return from the top-level body, which is
                // its own frame and stops the machine instead.
                match self.module.tree.enclosing(node, NodeKind::FuncDecl) {
                    Some(_) => self.line("RET"),
                    None => self.line("HLT"),
                }
                Ok(())
            }

            NodeKind::Else | NodeKind::FuncDecl => {
                Err(CodegenError::UnreachableNodeKind { kind })
            }
        }
    }

    fn operator(&mut self, node: NodeId, op: Op) -> Result<(), CodegenError> {
        match op {
            Op::Assign => {
                let target = self.left_of(node)?;
                if self.module.tree.kind(target) != NodeKind::Var {
                    return Err(CodegenError::MalformedNode { kind: NodeKind::Op });
                }
                let value = self.right_of(node)?;
                self.emit(value)?;

                // Keep a copy on the stack: assignment is an expression
                // yielding the assigned value.
                self.line("POP rax");
                self.line("PUSH rax");
                self.line("PUSH rax");

                let payload = self.module.tree.payload(target);
                self.pop_var(NodeKind::Var, payload)
            }

            Op::In => {
                self.line("IN");
                Ok(())
            }

            Op::Out => {
                let operand = self.left_of(node)?;
                self.emit(operand)?;
                self.line("POP rax");
                self.line("PUSH rax");
                self.line("PUSH rax");
                self.line("OUT");
                Ok(())
            }

            Op::Sqrt => {
                let operand = self.left_of(node)?;
                self.emit(operand)?;
                self.line("SQRT");
                Ok(())
            }

            Op::Add | Op::Sub | Op::Mul | Op::Div => {
                let lhs = self.left_of(node)?;
                let rhs = self.right_of(node)?;
                self.emit(lhs)?;
                self.emit(rhs)?;
                let mnemonic = match op {
                    Op::Add => "ADD",
                    Op::Sub => "SUB",
                    Op::Mul => "MUL",
                    Op::Div => "DIV",
                    _ => unreachable!(),
                };
                self.line(mnemonic);
                Ok(())
            }

            Op::Equal | Op::NotEqual | Op::Less | Op::LessEq | Op::Greater | Op::GreaterEq => {
                let lhs = self.left_of(node)?;
                let rhs = self.right_of(node)?;
                self.emit(lhs)?;
                self.emit(rhs)?;

                // There is no boolean opcode; a comparison branches and
                // pushes 0 or 1 depending on which label it reaches.
                let jump = match op {
                    Op::Equal => "JE",
                    Op::NotEqual => "JNE",
                    Op::Less => "JB",
                    Op::LessEq => "JBE",
                    Op::Greater => "JA",
                    Op::GreaterEq => "JAE",
                    _ => unreachable!(),
                };

                let (hit, done) = self.fresh_labels();
                self.line(&format!("{} l{}", jump, hit));
                self.line("PUSH 0");
                self.line(&format!("JMP l{}", done));
                self.line(&format!("l{}:", hit));
                self.line("PUSH 1");
                self.line(&format!("l{}:", done));

                Ok(())
            }

            Op::And | Op::Or => {
                let lhs = self.left_of(node)?;
                let rhs = self.right_of(node)?;
                self.emit(lhs)?;
                self.emit(rhs)?;

                // Zero-test both operands against the same label; which
                // label the fall-through reaches decides the pushed truth
                // value. No short-circuiting: both sides are evaluated.
                let (hit, done) = self.fresh_labels();
                let (jump, fall, jumped) = match op {
                    Op::And => ("JE", 1, 0),
                    Op::Or => ("JNE", 0, 1),
                    _ => unreachable!(),
                };

                self.line("POP rax");
                self.line("PUSH 0");
                self.line(&format!("{} l{}", jump, hit));
                self.line("PUSH 0");
                self.line("PUSH rax");
                self.line(&format!("{} l{}", jump, hit));
                self.line(&format!("PUSH {}", fall));
                self.line(&format!("JMP l{}", done));
                self.line(&format!("l{}:", hit));
                self.line(&format!("PUSH {}", jumped));
                self.line(&format!("l{}:", done));

                Ok(())
            }
        }
    }

    /// The caller saves its frame-size register, pushes the arguments in
    /// reverse source order (the callee pops them back into declaration
    /// order), advances the frame base past its own locals, and undoes all
    /// of it around the return value.
    fn call(&mut self, node: NodeId) -> Result<(), CodegenError> {
        let payload = self.module.tree.payload(node);
        if self.module.funcs.get(payload as usize).is_none() {
            return Err(CodegenError::InvalidTableIndex {
                kind: NodeKind::Call,
                payload,
            });
        }

        self.line("PUSH rcx");

        if let Some(arguments) = self.module.tree.left(node) {
            self.push_arguments(arguments)?;
        }

        self.line("PUSH rdx");
        self.line("PUSH 1");
        self.line("PUSH rcx");
        self.line("ADD");
        self.line("ADD");
        self.line("POP rdx");
        self.line(&format!("CALL f{}", payload));
        self.line("POP rax");
        self.line("POP rcx");
        self.line("PUSH rdx");
        self.line("PUSH rcx");
        self.line("PUSH 1");
        self.line("ADD");
        self.line("SUB");
        self.line("POP rdx");
        self.line("PUSH rax");

        Ok(())
    }

    fn push_arguments(&mut self, cell: NodeId) -> Result<(), CodegenError> {
        if self.module.tree.kind(cell) != NodeKind::Fic {
            return Err(CodegenError::MalformedNode { kind: NodeKind::Call });
        }

        if let Some(rest) = self.module.tree.right(cell) {
            self.push_arguments(rest)?;
        }

        if let Some(argument) = self.module.tree.left(cell) {
            self.emit(argument)?;
        }

        Ok(())
    }
}
