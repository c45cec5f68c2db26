//! Serializer for the persisted tree format.

use std::fmt::Write;

use crate::source::Module;
use crate::tree::NodeId;

/// Render a module into the three-section text format read back by
/// [super::load].
pub fn save(module: &Module) -> String {
    let mut out = String::new();

    writeln!(out, "{}", module.vars.len()).expect("writing to a string");
    for variable in module.vars.iter() {
        out.push_str(&variable.name);
        out.push(' ');
    }
    out.push('\n');

    writeln!(out, "{}", module.funcs.len()).expect("writing to a string");
    for function in module.funcs.iter() {
        write!(out, "{} {}", function.name, function.arity()).expect("writing to a string");
        for slot in &function.arg_slots {
            out.push(' ');
            out.push_str(
                module
                    .vars
                    .get(*slot)
                    .map(|v| v.name.as_str())
                    .unwrap_or("_"),
            );
        }
        out.push('\n');
    }

    match module.tree.left(module.tree.root()) {
        Some(top) => write_node(&mut out, module, top),
        None => out.push_str("{ 0 0 }"),
    }
    out.push('\n');

    out
}

fn write_node(out: &mut String, module: &Module, id: NodeId) {
    let node = module.tree.node(id);

    write!(out, "{{ {} {} ", node.kind.tag(), node.payload).expect("writing to a string");
    if let Some(left) = node.left {
        write_node(out, module, left);
        out.push(' ');
    }
    if let Some(right) = node.right {
        write_node(out, module, right);
        out.push(' ');
    }
    out.push('}');
}
