//! # strata-driver
//!
//! The compiler driver (§4.6): ties the lexer, parser, and semantic
//! analyzer together into one compilation session. Owns the arenas, atom
//! table, type table, and diagnostic sink, resolves `#load`/`#import`
//! directives across files, and runs the frontend to a fixed point.

pub mod compiler;
pub mod options;

pub use compiler::Compiler;
pub use options::BuildOptions;
