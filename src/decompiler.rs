//! Rendering a module back into source text.
//!
//! The walk mirrors the parser's grammar top-down and exists to close the
//! loop for round-trip testing: re-scanning and re-parsing the output must
//! reproduce the tree. Text is produced in scan order and mirrored once at
//! the end, the same trick in reverse that the scanner uses.

use itertools::Itertools;
use lazy_static::lazy_static;

use std::collections::HashMap;

use crate::numeral;
use crate::source::Module;
use crate::tree::{NodeId, NodeKind, Op};

lazy_static! {
    /// Scan-order spellings of the operators.
    static ref OP_SPELLING: HashMap<Op, &'static str> = {
        let mut table = HashMap::new();
        table.insert(Op::Assign, "-");
        table.insert(Op::Or, "+");
        table.insert(Op::And, "*");
        table.insert(Op::Equal, "\"");
        table.insert(Op::NotEqual, "=");
        table.insert(Op::Less, ",");
        table.insert(Op::LessEq, ";");
        table.insert(Op::Greater, ".");
        table.insert(Op::GreaterEq, ":");
        table.insert(Op::Add, "(");
        table.insert(Op::Sub, ")");
        table.insert(Op::Mul, "[");
        table.insert(Op::Div, "]");
        table.insert(Op::Sqrt, "%");
        table.insert(Op::In, "?");
        table.insert(Op::Out, "!");
        table
    };
}

/// Render the module as on-disk source text.
pub fn decompile(module: &Module) -> String {
    let mut writer = Writer {
        module,
        out: String::new(),
    };

    let mut cursor = module.tree.left(module.tree.root());
    while let Some(cell) = cursor {
        match module.tree.left(cell) {
            Some(item) if module.tree.kind(item) == NodeKind::FuncDecl => {
                writer.func_decl(item);
                cursor = module.tree.right(cell);
            }
            _ => break,
        }
    }

    writer.out.push_str("/\n");
    if let Some(main) = cursor {
        writer.statements(main);
    }
    writer.out.push_str("\\\n");

    // The on-disk format is the mirror image of the scan order.
    writer.out.chars().rev().collect()
}

struct Writer<'a> {
    module: &'a Module,
    out: String,
}

impl<'a> Writer<'a> {
    fn var_name(&self, payload: i64) -> &str {
        self.module
            .vars
            .get(payload as usize)
            .map(|v| v.name.as_str())
            .unwrap_or("_")
    }

    fn func_decl(&mut self, node: NodeId) {
        let payload = self.module.tree.payload(node);
        let (name, params) = match self.module.funcs.get(payload as usize) {
            Some(func) => (func.name.as_str(), func.arg_slots.as_slice()),
            None => ("_", &[][..]),
        };

        self.out.push('^');
        self.out.push_str(name);
        self.out.push_str(" {");
        for slot in params {
            self.out.push_str(
                self.module
                    .vars
                    .get(*slot)
                    .map(|v| v.name.as_str())
                    .unwrap_or("_"),
            );
            self.out.push(' ');
        }
        self.out.push_str("}\n/\n");

        if let Some(body) = self.module.tree.right(node) {
            self.statements(body);
        }
        self.out.push_str("\\\n");
    }

    /// Walk a statement chain. Every statement carries its own terminator,
    /// so the childless chain tail needs no special casing.
    fn statements(&mut self, chain: NodeId) {
        let mut cursor = Some(chain);
        while let Some(cell) = cursor {
            if let Some(item) = self.module.tree.left(cell) {
                self.statement(item);
            }
            cursor = self.module.tree.right(cell);
        }
    }

    fn statement(&mut self, node: NodeId) {
        match self.module.tree.kind(node) {
            NodeKind::VarDecl => {
                self.out.push_str("~~~~");
                let name = self.var_name(self.module.tree.payload(node)).to_string();
                self.out.push_str(&name);
                self.out.push_str(" ,.\n");
            }

            NodeKind::Return => {
                self.out.push_str("> {");
                if let Some(value) = self.module.tree.left(node) {
                    self.expression(value);
                }
                self.out.push_str("} ,.\n");
            }

            NodeKind::If => {
                self.out.push_str("69\n/\n");
                let decision = self.module.tree.right(node);
                let then_branch = decision.and_then(|d| self.module.tree.left(d));
                let else_branch = decision.and_then(|d| self.module.tree.right(d));

                if let Some(then_branch) = then_branch {
                    self.statements(then_branch);
                }
                self.out.push_str("\\\n{");
                if let Some(condition) = self.module.tree.left(node) {
                    self.expression(condition);
                }
                self.out.push_str("}\n");

                if let Some(else_branch) = else_branch {
                    self.out.push_str("79\n/\n");
                    self.statements(else_branch);
                    self.out.push_str("\\\n");
                }
            }

            NodeKind::While => {
                self.out.push_str("88888888 {");
                if let Some(condition) = self.module.tree.left(node) {
                    self.expression(condition);
                }
                self.out.push_str("}\n/\n");
                if let Some(body) = self.module.tree.right(node) {
                    self.statements(body);
                }
                self.out.push_str("\\\n");
            }

            // A nested block statement.
            NodeKind::Fic => {
                self.out.push_str("/\n");
                self.statements(node);
                self.out.push_str("\\\n");
            }

            // Expression statements terminate with the separator.
            _ => {
                self.expression(node);
                self.out.push_str(" ,.\n");
            }
        }
    }

    fn expression(&mut self, node: NodeId) {
        match self.module.tree.kind(node) {
            NodeKind::Number => {
                let value = self.module.tree.payload(node);
                if value < 0 {
                    // Negative literals have no spelling of their own; they
                    // are rendered as a bracketed subtraction from zero and
                    // re-parse as exactly that.
                    self.out.push_str("{| ) ");
                    self.out.push_str(&numeral::encode(value.unsigned_abs()));
                    self.out.push('}');
                } else {
                    self.out.push_str(&numeral::encode(value as u64));
                }
            }

            NodeKind::Var => {
                let name = self.var_name(self.module.tree.payload(node)).to_string();
                self.out.push_str(&name);
            }

            NodeKind::Op => {
                let op = Op::from_payload(self.module.tree.payload(node));
                match op {
                    Some(Op::In) => self.out.push_str(" ? "),
                    Some(op @ Op::Sqrt) | Some(op @ Op::Out) => {
                        self.out.push_str(OP_SPELLING[&op]);
                        self.out.push_str(" {");
                        if let Some(operand) = self.module.tree.left(node) {
                            self.expression(operand);
                        }
                        self.out.push('}');
                    }
                    Some(op) => {
                        if let Some(lhs) = self.module.tree.left(node) {
                            self.operand(lhs, op.precedence());
                        }
                        self.out.push(' ');
                        self.out.push_str(OP_SPELLING[&op]);
                        self.out.push(' ');
                        if let Some(rhs) = self.module.tree.right(node) {
                            self.operand(rhs, op.precedence());
                        }
                    }
                    None => {}
                }
            }

            NodeKind::Call => {
                let payload = self.module.tree.payload(node);
                let name = self
                    .module
                    .funcs
                    .get(payload as usize)
                    .map(|f| f.name.as_str())
                    .unwrap_or("_")
                    .to_string();

                self.out.push('<');
                self.out.push_str(&name);
                self.out.push_str(" {");

                let mut arguments = Vec::new();
                let mut cursor = self.module.tree.left(node);
                while let Some(cell) = cursor {
                    if let Some(item) = self.module.tree.left(cell) {
                        let mut nested = Writer {
                            module: self.module,
                            out: String::new(),
                        };
                        nested.expression(item);
                        arguments.push(nested.out);
                    }
                    cursor = self.module.tree.right(cell);
                }
                self.out.push_str(&arguments.iter().join(" & "));

                self.out.push('}');
            }

            // Statement-shaped kinds never reach expression position in a
            // verified tree.
            _ => {}
        }
    }

    /// Bracket a binary operand only when its own operator binds strictly
    /// weaker than the surrounding one; this is exactly the condition under
    /// which re-parsing would otherwise change the shape.
    fn operand(&mut self, node: NodeId, parent_precedence: u8) {
        let needs_brackets = self.module.tree.kind(node) == NodeKind::Op
            && Op::from_payload(self.module.tree.payload(node))
                .map(|op| op.precedence() < parent_precedence)
                .unwrap_or(false);

        if needs_brackets {
            self.out.push('{');
            self.expression(node);
            self.out.push('}');
        } else {
            self.expression(node);
        }
    }
}
