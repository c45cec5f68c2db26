//! Frontend for the source language: scanning and parsing.

pub mod parser;
pub mod token;

pub use parser::{parse, SyntaxError};
pub use token::{scan, LexError, Span, Token, TokenSeq};

use slog::{debug, o, Discard, Logger};

use crate::symbol_table::{FuncTable, VarTable};
use crate::tree::Tree;

/// A parsed program: the syntax tree plus the symbol tables describing its
/// variables and functions. The single artifact every backend consumes.
#[derive(Clone, Debug)]
pub struct Module {
    pub tree: Tree,
    pub vars: VarTable,
    pub funcs: FuncTable,
}

impl Module {
    /// Scan and parse a source text.
    pub fn parse(source: &str) -> Result<Module, crate::Error> {
        Module::parse_with_logger(source, None)
    }

    pub fn parse_with_logger<L>(source: &str, logger: L) -> Result<Module, crate::Error>
    where
        L: Into<Option<Logger>>,
    {
        let logger = logger
            .into()
            .unwrap_or_else(|| Logger::root(Discard, o!()))
            .new(o!("stage" => "frontend"));

        let seq = token::scan(source)?;
        debug!(logger, "scanned";
            "tokens" => seq.tokens.len(),
            "variables" => seq.vars.len(),
            "functions" => seq.funcs.len(),
        );

        let module = parser::parse(seq)?;
        module.tree.verify()?;
        debug!(logger, "parsed"; "nodes" => module.tree.len());

        Ok(module)
    }

    /// Translate the program into stack-machine assembly.
    pub fn compile(self) -> Result<String, crate::Error> {
        self.compile_with_logger(None)
    }

    pub fn compile_with_logger<L>(self, logger: L) -> Result<String, crate::Error>
    where
        L: Into<Option<Logger>>,
    {
        Ok(crate::codegen::generate_with_logger(self, logger)?)
    }

    /// Render the program back into source text.
    pub fn restore(&self) -> String {
        crate::decompiler::decompile(self)
    }

    /// Serialize into the persisted tree format.
    pub fn save(&self) -> String {
        crate::treefile::save(self)
    }

    /// Load a module from the persisted tree format.
    pub fn load(text: &str) -> Result<Module, crate::Error> {
        Ok(crate::treefile::load(text)?)
    }
}
