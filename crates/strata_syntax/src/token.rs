//! Token kinds produced by the lexer.

use strata_base::{Atom, TextSpan};

/// Radix an integer literal was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Radix {
    Decimal,
    Hexadecimal,
}

/// A multi-character operator. Single-char punctuation is kept as its
/// literal codepoint in [`TokenKind::Punct`] instead of living here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompoundOp {
    Arrow,   // ->
    Shl,     // <<
    Shr,     // >>
    DotDot,  // ..
    DotDotLt, // ..<
    EqEq,    // ==
    NotEq,   // !=
    Le,      // <=
    Ge,      // >=
    AndAnd,  // &&
    OrOr,    // ||
    XorXor,  // ^^
    PlusEq, MinusEq, StarEq, SlashEq, PercentEq, AndEq, OrEq, XorEq,
}

/// Reserved identifiers with grammatical meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Var, Let, Func, Struct, Union, Enum, TypeAlias, Library, Framework,
    If, Else, While, For, Switch, Case, Break, Continue, Return, In,
    Null, True, False,
}

impl Keyword {
    pub fn from_str(s: &str) -> Option<Keyword> {
        use Keyword::*;
        Some(match s {
            "var" => Var,
            "let" => Let,
            "func" => Func,
            "struct" => Struct,
            "union" => Union,
            "enum" => Enum,
            "typealias" => TypeAlias,
            "library" => Library,
            "framework" => Framework,
            "if" => If,
            "else" => Else,
            "while" => While,
            "for" => For,
            "switch" => Switch,
            "case" => Case,
            "break" => Break,
            "continue" => Continue,
            "return" => Return,
            "in" => In,
            "null" => Null,
            "true" => True,
            "false" => False,
            _ => return None,
        })
    }
}

/// A recognized `@tag` compile-time annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileTimeTag {
    CFunction,
    Metaprogram,
    Export,
}

impl CompileTimeTag {
    pub fn from_str(s: &str) -> Option<CompileTimeTag> {
        Some(match s {
            "c_function" => CompileTimeTag::CFunction,
            "metaprogram" => CompileTimeTag::Metaprogram,
            "export" => CompileTimeTag::Export,
            _ => return None,
        })
    }
}

/// The payload of a token, independent of its source location.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// A single-char punctuation mark kept as its literal codepoint, e.g. `(`, `;`, `,`.
    Punct(char),
    Op(CompoundOp),
    Keyword(Keyword),
    Identifier(Atom),
    Integer { value: u64, radix: Radix },
    Float(f64),
    /// A decoded string literal; escapes are already resolved and delimiters stripped.
    String(String),
    CompileTimeTag(CompileTimeTag),
    /// Emitted in place of a token the lexer could not make sense of, so the
    /// parser sees a well-formed stream even after a lex error.
    Error,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: TextSpan,
}

impl Token {
    pub fn new(kind: TokenKind, span: TextSpan) -> Self {
        Self { kind, span }
    }

    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }
}
