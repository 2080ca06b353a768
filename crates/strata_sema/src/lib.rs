//! # strata-sema
//!
//! Name resolution, type inference, and polymorphic instantiation: takes the
//! untyped AST `strata-syntax` produces and fills in every `type_ref` cell,
//! reporting diagnostics for anything that does not type-check.

pub mod analyzer;
pub mod copier;

pub use analyzer::Analyzer;
pub use copier::Copier;
