//! Abstract syntax tree.
//!
//! Nodes are allocated from a [`strata_base::Arena`] and never freed until
//! the owning compiler instance tears down; the copier (in `strata-sema`)
//! produces new nodes in the same arena to monomorphize polymorphic
//! functions while leaving the originals valid as templates (§3.6).
//!
//! Every node carries a `type_ref` slot and a `substitution` slot, both
//! filled in after construction by the semantic analyzer — hence `Cell`
//! rather than plain fields, since the surrounding tree is built once and
//! then read through shared `&'a Node` references.

use std::cell::Cell;

use strata_base::{Atom, TextSpan};
use strata_types::TypeRef;

/// A parsed-but-unresolved type expression, as written in source.
///
/// Resolved to a [`TypeRef`] by the semantic analyzer; `$T`-style
/// placeholders are represented here as [`TypeExpr::Polymorph`].
#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr<'a> {
    Named(Atom),
    Polymorph(Atom),
    Pointer(&'a TypeExpr<'a>),
    Array { element: &'a TypeExpr<'a>, count: Option<&'a Node<'a>>, dynamic: bool },
    Function { params: &'a [&'a TypeExpr<'a>], ret: &'a TypeExpr<'a>, is_c_function: bool, is_c_varargs: bool },
    /// A named type applied to type arguments, e.g. `Pair<int32, bool>`.
    Generic { name: Atom, args: &'a [&'a TypeExpr<'a>] },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Var,
    Let,
    StructMember,
    EnumMember,
    Argument,
}

/// Per-declaration progress, driven by the driver's work-list (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclState {
    Parsed,
    TypeChecking,
    /// Re-queued for a later pass after `TypeChecking` made no progress this pass.
    Deferred,
    Resolved,
    Errored,
}

#[derive(Debug)]
pub struct DeclarationData<'a> {
    pub kind: DeclKind,
    pub name: Atom,
    pub type_expr: Option<&'a TypeExpr<'a>>,
    pub initializer: Option<&'a Node<'a>>,
    pub is_readonly_variable: bool,
    pub state: Cell<DeclState>,
}

#[derive(Debug)]
pub struct ScopeData<'a> {
    /// Declarations visible for lookup in this scope: a subset of
    /// `statements` plus entries spliced in via `ScopeExpansion`.
    pub declarations: std::cell::RefCell<Vec<&'a Node<'a>>>,
    /// All statements, in source order.
    pub statements: std::cell::RefCell<Vec<&'a Node<'a>>>,
}

impl<'a> ScopeData<'a> {
    pub fn new() -> Self {
        ScopeData { declarations: Default::default(), statements: Default::default() }
    }
}

impl<'a> Default for ScopeData<'a> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct FunctionData<'a> {
    pub name: Atom,
    pub poly_params: &'a [Atom],
    pub params: &'a [&'a Node<'a>],
    pub return_type: Option<&'a TypeExpr<'a>>,
    pub body: Option<&'a Node<'a>>,
    pub is_c_function: bool,
    pub is_c_varargs: bool,
    pub state: Cell<DeclState>,
}

impl<'a> FunctionData<'a> {
    pub fn is_polymorphic(&self) -> bool {
        !self.poly_params.is_empty()
    }
}

#[derive(Debug)]
pub struct StructData<'a> {
    pub name: Atom,
    pub poly_params: &'a [Atom],
    pub members: &'a [&'a Node<'a>],
    pub is_union: bool,
    pub parent: Option<&'a TypeExpr<'a>>,
    pub state: Cell<DeclState>,
}

#[derive(Debug)]
pub struct EnumData<'a> {
    pub name: Atom,
    pub base: Option<&'a TypeExpr<'a>>,
    pub members: &'a [&'a Node<'a>],
    pub state: Cell<DeclState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
    /// Pointer dereference; both prefix `*` and `<<` lex to this.
    Deref,
    AddressOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add, Sub, Mul, Div, Mod,
    BitAnd, BitOr, BitXor, Shl, Shr,
    Eq, Ne, Lt, Le, Gt, Ge,
    And, Or, Xor,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Integer(u64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFlowKind {
    Break,
    Continue,
}

#[derive(Debug)]
pub enum ForKind<'a> {
    /// `for v in a..b` / `for v in a..<b`.
    Range { var: Atom, start: &'a Node<'a>, end: &'a Node<'a>, inclusive: bool },
    /// `for i, v in iterable`.
    IndexValue { index_var: Atom, value_var: Atom, iterable: &'a Node<'a> },
}

#[derive(Debug)]
pub enum NodeKind<'a> {
    Scope(ScopeData<'a>),
    /// Splices another scope's declarations/statements into this point.
    ScopeExpansion(&'a Node<'a>),
    Declaration(DeclarationData<'a>),
    Function(FunctionData<'a>),
    Struct(StructData<'a>),
    Enum(EnumData<'a>),
    TypeAlias { name: Atom, target: &'a TypeExpr<'a> },
    TypeInstantiation(&'a TypeExpr<'a>),
    Identifier(Atom),
    Literal(LiteralValue),
    Unary { op: UnaryOp, operand: &'a Node<'a> },
    Binary { op: BinaryOp, left: &'a Node<'a>, right: &'a Node<'a> },
    Assign { target: &'a Node<'a>, op: Option<BinaryOp>, value: &'a Node<'a> },
    /// Member access `a.field`; `element_path_index` is filled by the analyzer.
    Dereference { object: &'a Node<'a>, field: Atom, element_path_index: Cell<Option<u32>> },
    ArrayDereference { array: &'a Node<'a>, index: &'a Node<'a> },
    Cast { target: &'a TypeExpr<'a>, expr: &'a Node<'a> },
    FunctionCall { callee: &'a Node<'a>, args: &'a [&'a Node<'a>] },
    If { cond: &'a Node<'a>, then_branch: &'a Node<'a>, else_branch: Option<&'a Node<'a>> },
    While { cond: &'a Node<'a>, body: &'a Node<'a> },
    For { kind: ForKind<'a>, body: &'a Node<'a> },
    Switch { subject: &'a Node<'a>, cases: &'a [&'a Node<'a>] },
    Case { values: &'a [&'a Node<'a>], body: &'a Node<'a> },
    Return(Option<&'a Node<'a>>),
    ControlFlow { kind: ControlFlowKind, target_statement: Cell<Option<&'a Node<'a>>> },
    TupleExpression(&'a [&'a Node<'a>]),
    Load(String),
    Import(String),
    StaticIf { cond: &'a Node<'a>, then_branch: &'a Node<'a>, else_branch: Option<&'a Node<'a>> },
    Library(String),
}

/// A single AST node: its source span, kind-specific payload, resolved
/// type, and substitution chain.
#[derive(Debug)]
pub struct Node<'a> {
    pub span: TextSpan,
    pub kind: NodeKind<'a>,
    pub type_ref: Cell<Option<TypeRef>>,
    pub substitution: Cell<Option<&'a Node<'a>>>,
}

impl<'a> Node<'a> {
    pub fn new(span: TextSpan, kind: NodeKind<'a>) -> Self {
        Node { span, kind, type_ref: Cell::new(None), substitution: Cell::new(None) }
    }

    /// Follows the substitution chain to its end. Terminates by construction
    /// (§8): each substitution points to a node produced earlier or a literal.
    pub fn resolved(&'a self) -> &'a Node<'a> {
        let mut current = self;
        while let Some(next) = current.substitution.get() {
            current = next;
        }
        current
    }

    pub fn as_scope(&self) -> Option<&ScopeData<'a>> {
        match &self.kind {
            NodeKind::Scope(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_declaration(&self) -> Option<&DeclarationData<'a>> {
        match &self.kind {
            NodeKind::Declaration(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionData<'a>> {
        match &self.kind {
            NodeKind::Function(f) => Some(f),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_base::{Arena, FileId};

    #[test]
    fn substitution_chain_resolves_to_final_node() {
        let arena: Arena<Node> = Arena::new();
        let span = TextSpan::new(FileId(0), 0, 1);
        let literal = arena.alloc(Node::new(span, NodeKind::Literal(LiteralValue::Integer(11))));
        let ident = arena.alloc(Node::new(span, NodeKind::Identifier(Atom::default())));
        ident.substitution.set(Some(literal));
        assert!(matches!(ident.resolved().kind, NodeKind::Literal(LiteralValue::Integer(11))));
    }

    #[test]
    fn scope_starts_with_no_statements() {
        let scope = ScopeData::default();
        assert!(scope.statements.borrow().is_empty());
        assert!(scope.declarations.borrow().is_empty());
    }
}
