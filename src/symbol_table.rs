//! Symbol tables built during scanning and frozen afterwards.
//!
//! Both tables only ever grow; lexical scoping is expressed through
//! per-entry visibility flags and a stack of high-water marks, so indices
//! stay stable across scope exits and can be stored in node payloads.

use edit_distance::edit_distance;

/// A declared variable.
#[derive(Clone, Debug)]
pub struct Variable {
    pub name: String,
    /// Cleared in bulk when the declaring scope closes.
    pub visible: bool,
    /// Storage slot, assigned by the code generator's first pass.
    /// Positive offsets are relative to the owning function's frame base,
    /// negative offsets address the fixed global area.
    pub frame_slot: i64,
}

/// A declared function.
#[derive(Clone, Debug)]
pub struct Function {
    pub name: String,
    /// Variable-table indices of the parameters, in declaration order.
    pub arg_slots: Vec<usize>,
    /// Frame size in slots: parameters plus body-local declarations.
    /// Recorded by the code generator's first pass.
    pub local_count: usize,
}

impl Function {
    pub fn arity(&self) -> usize {
        self.arg_slots.len()
    }
}

/// Ordered, append-only variable table.
#[derive(Clone, Debug, Default)]
pub struct VarTable {
    entries: Vec<Variable>,
}

impl VarTable {
    pub fn new() -> VarTable {
        VarTable::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Variable> {
        self.entries.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Variable> {
        self.entries.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.entries.iter()
    }

    /// Append a new entry. The caller is responsible for the
    /// duplicate-in-scope check; the table itself permits shadowing.
    pub fn declare(&mut self, name: &str) -> usize {
        self.entries.push(Variable {
            name: name.to_string(),
            visible: true,
            frame_slot: 0,
        });

        self.entries.len() - 1
    }

    /// Find the *last* visible entry with a matching name, so an inner
    /// declaration shadows an outer one.
    pub fn lookup_visible(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .rposition(|v| v.visible && v.name == name)
    }

    /// True if `name` was already declared at or after `mark` and is still
    /// visible, i.e. a re-declaration within the same scope.
    pub fn declared_since(&self, name: &str, mark: usize) -> bool {
        self.entries[mark..]
            .iter()
            .any(|v| v.visible && v.name == name)
    }

    /// Hide every entry declared at or after `mark`.
    pub fn hide_from(&mut self, mark: usize) {
        for entry in &mut self.entries[mark..] {
            entry.visible = false;
        }
    }

    pub fn visible_names(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|v| v.visible)
            .map(|v| v.name.as_str())
    }
}

/// Ordered, append-only function table. Function names never shadow.
#[derive(Clone, Debug, Default)]
pub struct FuncTable {
    entries: Vec<Function>,
}

impl FuncTable {
    pub fn new() -> FuncTable {
        FuncTable::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Function> {
        self.entries.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Function> {
        self.entries.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Function> {
        self.entries.iter()
    }

    /// Append a new function. Returns `Err` with the existing index if the
    /// name is already taken.
    pub fn declare(&mut self, name: &str) -> Result<usize, usize> {
        if let Some(existing) = self.lookup(name) {
            return Err(existing);
        }

        self.entries.push(Function {
            name: name.to_string(),
            arg_slots: Vec::new(),
            local_count: 0,
        });

        Ok(self.entries.len() - 1)
    }

    /// Exact-name lookup.
    pub fn lookup(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|f| f.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|f| f.name.as_str())
    }
}

#[derive(Clone, Copy, Debug)]
struct Mark {
    base: usize,
    /// Set on the extra mark a function declaration pushes over its
    /// parameters; popped together with the function body's own mark.
    function: bool,
}

/// Stack of variable-table high-water marks, one per open scope area.
#[derive(Clone, Debug, Default)]
pub struct ScopeStack {
    marks: Vec<Mark>,
}

impl ScopeStack {
    pub fn new() -> ScopeStack {
        ScopeStack::default()
    }

    pub fn depth(&self) -> usize {
        self.marks.len()
    }

    /// Variable-table size the innermost scope opened at; re-declarations
    /// above this mark are duplicates.
    pub fn innermost_base(&self) -> usize {
        self.marks.last().map(|m| m.base).unwrap_or(0)
    }

    pub fn open(&mut self, base: usize) {
        self.marks.push(Mark { base, function: false });
    }

    pub fn open_function(&mut self, base: usize) {
        self.marks.push(Mark { base, function: true });
    }

    /// Close the innermost scope, hiding everything declared inside it.
    /// When the closed scope was a function body sitting directly on the
    /// function's parameter mark, the parameter region is closed too.
    /// Returns `false` if no scope was open.
    pub fn close(&mut self, vars: &mut VarTable) -> bool {
        let mark = match self.marks.pop() {
            Some(mark) => mark,
            None => return false,
        };

        vars.hide_from(mark.base);

        if let Some(top) = self.marks.last() {
            if top.function {
                let base = top.base;
                self.marks.pop();
                vars.hide_from(base);
            }
        }

        true
    }
}

/// Suggest the closest known name for a typo, if any is close enough.
pub fn suggest<'a>(name: &str, candidates: impl Iterator<Item = &'a str>) -> Option<String> {
    candidates
        .map(|c| (edit_distance(name, c), c))
        .filter(|(d, _)| *d <= 2 && *d < name.len())
        .min_by_key(|(d, _)| *d)
        .map(|(_, c)| c.to_string())
}
