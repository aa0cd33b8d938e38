//! tr Language
//!
//! Umbrella crate over the parser, checker and compiler.

pub use tr_checker as checker;
pub use tr_compiler as compiler;
pub use tr_parser as parser;

pub use tr_checker::{check, type_check, Diagnostic, Severity, Strictness};
pub use tr_compiler::{compile_file, compile_with_diagnostics, CompilerConfig, IncrementalCompiler};
pub use tr_parser::{parse_to_ir, Program};
