//! The persisted tree format: a plain-text snapshot of a parsed module
//! (variable names, function signatures, and the tree itself) used to hand
//! a program between pipeline runs. File I/O stays with the caller.

mod parser;
mod writer;

pub use parser::{ParseError, TreefileErrorKind};
pub use writer::save;

use parser::{parse_treefile, RawNode};

use crate::source::Module;
use crate::symbol_table::{FuncTable, VarTable};
use crate::tree::{NodeId, NodeKind, Op, Tree};

/// Load a module from the text format. The result upholds the same
/// structural invariants as a freshly parsed module: kinds, operator codes
/// and table indices are validated, parents re-linked, and the tree
/// verified.
pub fn load(text: &str) -> Result<Module, ParseError> {
    let raw = parse_treefile(text)?;

    let mut vars = VarTable::new();
    for name in &raw.vars {
        vars.declare(name);
    }

    let mut funcs = FuncTable::new();
    for function in &raw.funcs {
        let index = funcs.declare(&function.name).map_err(|_| {
            ParseError::from_kind(
                String::new(),
                TreefileErrorKind::DuplicateFunction(function.name.clone()),
            )
        })?;

        for arg in &function.args {
            // Argument lists are stored by name; an unknown name grows the
            // table instead of failing.
            let existing = vars.iter().position(|v| v.name == *arg);
            let slot = match existing {
                Some(slot) => slot,
                None => vars.declare(arg),
            };
            funcs
                .get_mut(index)
                .expect("just declared")
                .arg_slots
                .push(slot);
        }
    }

    let mut tree = Tree::new();
    let top = build(&mut tree, &raw.tree, vars.len(), funcs.len())?;
    let root = tree.root();
    tree.link_left(root, top);

    tree.verify().map_err(|violation| {
        ParseError::from_kind(String::new(), TreefileErrorKind::Corrupt(violation))
    })?;

    Ok(Module { tree, vars, funcs })
}

fn build(
    tree: &mut Tree,
    raw: &RawNode,
    var_count: usize,
    func_count: usize,
) -> Result<NodeId, ParseError> {
    let fail = |kind: TreefileErrorKind| ParseError::from_kind(String::new(), kind);

    let kind = NodeKind::from_tag(raw.kind)
        .ok_or_else(|| fail(TreefileErrorKind::UnknownKind(raw.kind)))?;

    let in_range = |count: usize| raw.payload >= 0 && (raw.payload as usize) < count;
    match kind {
        NodeKind::Var | NodeKind::VarDecl if !in_range(var_count) => {
            return Err(fail(TreefileErrorKind::IndexOutOfRange {
                tag: raw.kind,
                payload: raw.payload,
            }));
        }
        NodeKind::FuncDecl | NodeKind::Call if !in_range(func_count) => {
            return Err(fail(TreefileErrorKind::IndexOutOfRange {
                tag: raw.kind,
                payload: raw.payload,
            }));
        }
        NodeKind::Op if Op::from_payload(raw.payload).is_none() => {
            return Err(fail(TreefileErrorKind::UnknownOperator(raw.payload)));
        }
        _ => {}
    }

    let id = tree.alloc(kind, raw.payload);

    if let Some(left) = &raw.left {
        let child = build(tree, left, var_count, func_count)?;
        tree.link_left(id, child);
    }
    if let Some(right) = &raw.right {
        let child = build(tree, right, var_count, func_count)?;
        tree.link_right(id, child);
    }

    Ok(id)
}
