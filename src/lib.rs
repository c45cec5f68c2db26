//! A crate for working with programs written in the Tern language, a small
//! deliberately obfuscated teaching language: sources are stored mirrored
//! (the scanner reads them right to left), keywords are spelled with digit
//! strings, and number literals use a sparse base-3 notation.
//!
//! Currently this crate provides the functionality to:
//! - Scan and parse Tern source text into a syntax tree.
//! - Compile a parsed program into assembly for a small stack machine.
//! - Restore source text from a syntax tree (the decompiler).
//! - Read and write tree files, the plain-text snapshot format used to
//!   hand a parsed program between pipeline runs.
//!
//! The pipeline is strictly linear and synchronous: the scanner and parser
//! run once and produce a [source::Module] (the tree plus its symbol
//! tables), which the code generator and the decompiler then each traverse
//! on their own. Every stage fails fast on the first error; there is no
//! partial-result recovery.
//!
//! # Example
//! ```
//! use tern::source::Module;
//!
//! // Sources are mirrored on disk. Written in scan order, this program
//! // declares a global, stores the number 3 in it and prints it.
//! let logical = r"/ ~~~~x ,. x - |1 ,. ! {x} ,. \";
//! let on_disk: String = logical.chars().rev().collect();
//!
//! let module = Module::parse(&on_disk)
//!     .expect("the program is well-formed");
//!
//! let assembly = module.compile()
//!     .expect("code generation does not fail on a verified tree");
//!
//! assert!(assembly.contains("OUT"));
//! ```
//!
//! # Executables
//!
//! ## `ternc`
//!
//! Compiles a source file to stack-machine assembly, or with `--emit tree`
//! to a tree file. Behind the `ternc` feature.
//!
//! ## `ternrev`
//!
//! Restores source text from a tree file. Behind the `ternrev` feature.

pub mod codegen;
pub mod decompiler;
pub mod error;
pub mod numeral;
pub mod source;
pub mod symbol_table;
pub mod tree;
pub mod treefile;

pub use error::Error;
