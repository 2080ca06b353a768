//! Diagnostics: the kinds of errors the frontend can report, and the sink
//! that accumulates them across a compiler instance's lifetime.
//!
//! Every diagnostic carries a [`TextSpan`] indicating where in the source
//! text it occurred, and renders as `file:line:col: kind: message`.
//!
//! # Example
//!
//! ```
//! use strata_base::{Diagnostic, DiagnosticKind, DiagnosticSink, FileId, TextSpan};
//!
//! let mut sink = DiagnosticSink::new();
//! sink.push(Diagnostic::new(
//!     DiagnosticKind::NameError,
//!     "unresolved identifier 'foo'",
//!     TextSpan::new(FileId(0), 10, 3),
//! ));
//!
//! assert!(sink.has_errors());
//! let rendered = sink.diagnostics()[0].render("main.strata", "let x = foo;");
//! assert!(rendered.starts_with("main.strata:1:"));
//! ```

use crate::span::TextSpan;
use std::fmt;

/// The kind of a reported diagnostic.
///
/// `InternalError` is the only kind that aborts the compiler instance;
/// every other kind is recorded and analysis continues where it can.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// Malformed literal, unterminated string, unknown escape.
    LexError,
    /// Unexpected token, missing delimiter.
    ParseError,
    /// Unresolved identifier, duplicate declaration in one scope.
    NameError,
    /// Mismatch, non-coercible operand, wrong arity, field not found.
    TypeError,
    /// Cannot bind a polymorph placeholder, or conflicting bindings.
    PolymorphError,
    /// Mutually recursive declaration chain makes no progress.
    CycleError,
    /// Type too large, or a misaligned explicit layout.
    LayoutError,
    /// Assertion violation; fatal for the compiler instance.
    InternalError,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiagnosticKind::LexError => "lex error",
            DiagnosticKind::ParseError => "parse error",
            DiagnosticKind::NameError => "name error",
            DiagnosticKind::TypeError => "type error",
            DiagnosticKind::PolymorphError => "polymorph error",
            DiagnosticKind::CycleError => "cycle error",
            DiagnosticKind::LayoutError => "layout error",
            DiagnosticKind::InternalError => "internal error",
        };
        f.write_str(s)
    }
}

impl DiagnosticKind {
    /// Returns `true` for [`DiagnosticKind::InternalError`], the only kind
    /// that must abort the instance rather than allow analysis to continue.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DiagnosticKind::InternalError)
    }
}

/// A single reported problem: its kind, a human-readable message, and the
/// span of source text it points at.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub span: TextSpan,
}

impl Diagnostic {
    /// Creates a diagnostic with the given kind, message, and source location.
    pub fn new(kind: DiagnosticKind, message: impl Into<String>, span: TextSpan) -> Self {
        Self {
            kind,
            message: message.into(),
            span,
        }
    }

    /// Renders this diagnostic as `file:line:col: kind: message`.
    ///
    /// `file_name` is whatever the caller wants shown for `self.span.file`
    /// (the atom table and file table live in the driver, not here);
    /// `source` must be the full text of that file, used to derive line
    /// and column from the byte offset.
    pub fn render(&self, file_name: &str, source: &str) -> String {
        let (line, col) = self.span.line_col(source);
        format!("{file_name}:{line}:{col}: {}: {}", self.kind, self.message)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Diagnostic {}

/// Accumulates diagnostics for a single compiler instance.
///
/// The semantic analyzer appends to the sink rather than returning early on
/// the first error, so a single compilation can surface many independent
/// problems at once.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a diagnostic.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Returns `true` if at least one diagnostic has been recorded.
    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    /// Returns `true` if any recorded diagnostic is fatal.
    pub fn has_fatal_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.kind.is_fatal())
    }

    /// Returns the number of recorded diagnostics.
    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    /// Returns `true` if no diagnostics have been recorded.
    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Returns the recorded diagnostics in report order.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Removes and returns all recorded diagnostics.
    pub fn drain(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::FileId;

    #[test]
    fn diagnostic_renders_file_line_col_kind_message() {
        let d = Diagnostic::new(DiagnosticKind::TypeError, "mismatch", TextSpan::new(FileId(0), 4, 1));
        let rendered = d.render("main.strata", "let x = 1;\n");
        assert_eq!(rendered, "main.strata:1:5: type error: mismatch");
    }

    #[test]
    fn sink_starts_empty() {
        let sink = DiagnosticSink::new();
        assert!(!sink.has_errors());
        assert!(sink.is_empty());
    }

    #[test]
    fn sink_accumulates_multiple_diagnostics() {
        let mut sink = DiagnosticSink::new();
        sink.push(Diagnostic::new(DiagnosticKind::LexError, "a", TextSpan::default()));
        sink.push(Diagnostic::new(DiagnosticKind::ParseError, "b", TextSpan::default()));
        assert_eq!(sink.len(), 2);
        assert!(sink.has_errors());
    }

    #[test]
    fn internal_error_is_fatal() {
        let mut sink = DiagnosticSink::new();
        sink.push(Diagnostic::new(DiagnosticKind::InternalError, "assertion failed", TextSpan::default()));
        assert!(sink.has_fatal_errors());
    }

    #[test]
    fn non_fatal_kinds_do_not_set_has_fatal_errors() {
        let mut sink = DiagnosticSink::new();
        sink.push(Diagnostic::new(DiagnosticKind::TypeError, "mismatch", TextSpan::default()));
        assert!(!sink.has_fatal_errors());
    }

    #[test]
    fn drain_empties_the_sink() {
        let mut sink = DiagnosticSink::new();
        sink.push(Diagnostic::new(DiagnosticKind::NameError, "x", TextSpan::default()));
        let drained = sink.drain();
        assert_eq!(drained.len(), 1);
        assert!(sink.is_empty());
    }
}
