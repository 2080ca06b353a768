#![cfg_attr(docsrs, feature(doc_cfg))]

//! # strata-base
//!
//! Structural primitives shared by every frontend crate in Strata.
//!
//! - [`Arena`] — bump allocation for stable AST references
//! - [`AtomTable`]/[`Atom`] — identifier interning for O(1) equality
//! - [`TextSpan`]/[`FileId`] — source location tracking
//! - [`Diagnostic`]/[`DiagnosticKind`]/[`DiagnosticSink`] — error reporting
//!
//! # Design principles
//!
//! This crate has **no knowledge of lexical grammar, type rules, or I/O**.
//! It provides only generic, reusable infrastructure that the lexer, type
//! table, semantic analyzer, and driver crates build upon.
//!
//! # Example
//!
//! ```
//! use strata_base::{Arena, AtomTable, FileId, TextSpan};
//!
//! let arena: Arena<&str> = Arena::new();
//! let mut atoms = AtomTable::new();
//!
//! let hello = atoms.intern("hello");
//! let span = TextSpan::new(FileId(0), 0, 5);
//!
//! let allocated = arena.alloc("hello");
//! assert_eq!(*allocated, "hello");
//! ```

pub mod arena;
pub mod error;
pub mod intern;
pub mod span;

pub use arena::Arena;
pub use error::{Diagnostic, DiagnosticKind, DiagnosticSink};
pub use intern::{Atom, AtomEq, AtomTable};
pub use span::{FileId, TextSpan};
