//! Recursive-descent / precedence-climbing parser.
//!
//! Consumes a token stream and builds an AST rooted at a top-level
//! [`ast::Node`] of kind `Scope`, appending declarations and statements as
//! it goes (§4.2). On an unexpected token the parser reports a diagnostic
//! and recovers by skipping to the next `;`, `}`, or a top-level keyword,
//! so a single syntax error does not abort the whole file.

use strata_base::{Arena, Atom, AtomTable, Diagnostic, DiagnosticKind, FileId, TextSpan};

use crate::ast::{
    BinaryOp, ControlFlowKind, DeclKind, DeclState, DeclarationData, EnumData, ForKind, FunctionData, LiteralValue,
    Node, NodeKind, ScopeData, StructData, TypeExpr, UnaryOp,
};
use crate::token::{CompoundOp, Keyword, Radix, Token, TokenKind};

/// Bundles the arenas the parser needs beyond the primary node/type arenas:
/// one per slice element type, since [`Arena`] is monomorphic per `T`.
pub struct SliceArenas<'a> {
    pub node_slices: Arena<&'a Node<'a>>,
    pub type_slices: Arena<&'a TypeExpr<'a>>,
    pub atom_slices: Arena<Atom>,
}

impl<'a> SliceArenas<'a> {
    pub fn new() -> Self {
        SliceArenas { node_slices: Arena::new(), type_slices: Arena::new(), atom_slices: Arena::new() }
    }
}

impl<'a> Default for SliceArenas<'a> {
    fn default() -> Self {
        Self::new()
    }
}

pub fn parse<'a>(
    tokens: &'a [Token],
    file: FileId,
    node_arena: &'a Arena<Node<'a>>,
    type_arena: &'a Arena<TypeExpr<'a>>,
    slices: &'a SliceArenas<'a>,
    atoms: &mut AtomTable,
) -> (&'a Node<'a>, Vec<Diagnostic>) {
    let mut parser = Parser {
        tokens,
        pos: 0,
        file,
        node_arena,
        type_arena,
        slices,
        atoms,
        diagnostics: Vec::new(),
    };
    let root = parser.parse_top_level_scope();
    (root, parser.diagnostics)
}

struct Parser<'a, 'atoms> {
    tokens: &'a [Token],
    pos: usize,
    file: FileId,
    node_arena: &'a Arena<Node<'a>>,
    type_arena: &'a Arena<TypeExpr<'a>>,
    slices: &'a SliceArenas<'a>,
    atoms: &'atoms mut AtomTable,
    diagnostics: Vec<Diagnostic>,
}

impl<'a, 'atoms> Parser<'a, 'atoms> {
    fn cur(&self) -> &'a Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn kind(&self) -> &TokenKind {
        &self.cur().kind
    }

    fn span(&self) -> TextSpan {
        self.cur().span
    }

    fn at_eof(&self) -> bool {
        self.cur().is_eof()
    }

    fn bump(&mut self) -> &'a Token {
        let tok = self.cur();
        if !self.at_eof() {
            self.pos += 1;
        }
        tok
    }

    fn check_punct(&self, c: char) -> bool {
        matches!(self.kind(), TokenKind::Punct(p) if *p == c)
    }

    fn check_kw(&self, kw: Keyword) -> bool {
        matches!(self.kind(), TokenKind::Keyword(k) if *k == kw)
    }

    fn eat_punct(&mut self, c: char) -> bool {
        if self.check_punct(c) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, c: char) {
        if !self.eat_punct(c) {
            self.error(format!("expected '{c}'"));
        }
    }

    fn error(&mut self, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::new(DiagnosticKind::ParseError, message, self.span()));
    }

    /// Skips to the next `;`, `}`, or a token that starts a top-level statement.
    fn synchronize(&mut self) {
        while !self.at_eof() {
            if self.eat_punct(';') {
                return;
            }
            if self.check_punct('}') {
                return;
            }
            if matches!(
                self.kind(),
                TokenKind::Keyword(Keyword::Var | Keyword::Let | Keyword::Func | Keyword::Struct | Keyword::Enum)
            ) {
                return;
            }
            self.bump();
        }
    }

    fn alloc(&self, span: TextSpan, kind: NodeKind<'a>) -> &'a Node<'a> {
        self.node_arena.alloc(Node::new(span, kind))
    }

    fn expect_ident(&mut self) -> Atom {
        match self.kind() {
            TokenKind::Identifier(a) => {
                let a = *a;
                self.bump();
                a
            }
            _ => {
                self.error("expected identifier");
                Atom::default()
            }
        }
    }

    // ---- top level -------------------------------------------------

    fn parse_top_level_scope(&mut self) -> &'a Node<'a> {
        let start = self.span();
        let scope = ScopeData::new();
        while !self.at_eof() {
            let stmt = self.parse_statement();
            scope.statements.borrow_mut().push(stmt);
            if is_declaration(stmt) {
                scope.declarations.borrow_mut().push(stmt);
            }
        }
        self.alloc(start, NodeKind::Scope(scope))
    }

    fn parse_scope_until_rbrace(&mut self) -> &'a Node<'a> {
        let start = self.span();
        self.expect_punct('{');
        let scope = ScopeData::new();
        while !self.check_punct('}') && !self.at_eof() {
            let stmt = self.parse_statement();
            scope.statements.borrow_mut().push(stmt);
            if is_declaration(stmt) {
                scope.declarations.borrow_mut().push(stmt);
            }
        }
        self.expect_punct('}');
        self.alloc(start, NodeKind::Scope(scope))
    }

    fn parse_statement(&mut self) -> &'a Node<'a> {
        let result = match self.kind().clone() {
            TokenKind::Keyword(Keyword::Var) => self.parse_var_or_let(DeclKind::Var),
            TokenKind::Keyword(Keyword::Let) => self.parse_var_or_let(DeclKind::Let),
            TokenKind::Keyword(Keyword::Func) => self.parse_function(),
            TokenKind::Keyword(Keyword::Struct) => self.parse_struct(false),
            TokenKind::Keyword(Keyword::Union) => self.parse_struct(true),
            TokenKind::Keyword(Keyword::Enum) => self.parse_enum(),
            TokenKind::Keyword(Keyword::TypeAlias) => self.parse_typealias(),
            TokenKind::Keyword(Keyword::Library) => self.parse_library_or_framework(),
            TokenKind::Keyword(Keyword::Framework) => self.parse_library_or_framework(),
            TokenKind::Keyword(Keyword::If) => self.parse_if(),
            TokenKind::Keyword(Keyword::While) => self.parse_while(),
            TokenKind::Keyword(Keyword::For) => self.parse_for(),
            TokenKind::Keyword(Keyword::Switch) => self.parse_switch(),
            TokenKind::Keyword(Keyword::Return) => self.parse_return(),
            TokenKind::Keyword(Keyword::Break) => self.parse_control_flow(ControlFlowKind::Break),
            TokenKind::Keyword(Keyword::Continue) => self.parse_control_flow(ControlFlowKind::Continue),
            TokenKind::Punct('#') => self.parse_directive(),
            _ => self.parse_expr_statement(),
        };
        result
    }

    // ---- declarations -----------------------------------------------

    fn parse_var_or_let(&mut self, decl_kind: DeclKind) -> &'a Node<'a> {
        let start = self.span();
        self.bump(); // var | let
        let name = self.expect_ident();
        let type_expr = if self.eat_punct(':') { Some(self.parse_type_expr()) } else { None };
        let initializer = if self.eat_punct('=') { Some(self.parse_expr()) } else { None };
        self.expect_punct(';');
        let span = start.merge(self.prev_span());
        self.alloc(
            span,
            NodeKind::Declaration(DeclarationData {
                kind: decl_kind,
                name,
                type_expr,
                initializer,
                is_readonly_variable: decl_kind == DeclKind::Let && initializer.is_none(),
                state: std::cell::Cell::new(DeclState::Parsed),
            }),
        )
    }

    fn prev_span(&self) -> TextSpan {
        self.tokens[self.pos.saturating_sub(1).min(self.tokens.len() - 1)].span
    }

    fn parse_function(&mut self) -> &'a Node<'a> {
        let start = self.span();
        self.bump(); // func
        let name = self.expect_ident();

        let mut poly_params = Vec::new();
        if self.eat_punct('<') {
            loop {
                poly_params.push(self.expect_ident());
                if !self.eat_punct(',') {
                    break;
                }
            }
            self.expect_punct('>');
        }

        self.expect_punct('(');
        let mut params = Vec::new();
        let mut inferred_poly_params = Vec::new();
        while !self.check_punct(')') && !self.at_eof() {
            let pstart = self.span();
            let pname = self.expect_ident();
            self.expect_punct(':');
            let ptype = self.parse_type_expr();
            collect_polymorph_names(ptype, &mut inferred_poly_params);
            let span = pstart.merge(self.prev_span());
            params.push(&*self.alloc(
                span,
                NodeKind::Declaration(DeclarationData {
                    kind: DeclKind::Argument,
                    name: pname,
                    type_expr: Some(ptype),
                    initializer: None,
                    is_readonly_variable: false,
                    state: std::cell::Cell::new(DeclState::Parsed),
                }),
            ));
            if !self.eat_punct(',') {
                break;
            }
        }
        self.expect_punct(')');

        let return_type = if matches!(self.kind(), TokenKind::Op(CompoundOp::Arrow)) {
            self.bump();
            Some(self.parse_type_expr())
        } else {
            None
        };

        // A parameter whose annotated type contains `$T` marks the function polymorphic
        // even without an explicit `<T>` list; fold in any names not already declared there.
        for name in inferred_poly_params {
            if !poly_params.contains(&name) {
                poly_params.push(name);
            }
        }

        let body = if self.check_punct('{') { Some(self.parse_scope_until_rbrace()) } else {
            self.expect_punct(';');
            None
        };

        let span = start.merge(self.prev_span());
        self.alloc(
            span,
            NodeKind::Function(FunctionData {
                name,
                poly_params: self.atom_slice(poly_params),
                params: self.node_slice(params),
                return_type,
                body,
                is_c_function: false,
                is_c_varargs: false,
                state: std::cell::Cell::new(DeclState::Parsed),
            }),
        )
    }

    fn atom_slice(&self, items: Vec<Atom>) -> &'a [Atom] {
        self.slices.atom_slices.alloc_slice(items)
    }

    fn node_slice(&self, items: Vec<&'a Node<'a>>) -> &'a [&'a Node<'a>] {
        self.slices.node_slices.alloc_slice(items)
    }

    fn type_slice(&self, items: Vec<&'a TypeExpr<'a>>) -> &'a [&'a TypeExpr<'a>] {
        self.slices.type_slices.alloc_slice(items)
    }

    fn parse_struct(&mut self, is_union: bool) -> &'a Node<'a> {
        let start = self.span();
        self.bump(); // struct | union
        let name = self.expect_ident();
        let mut poly_params = Vec::new();
        if self.eat_punct('<') {
            loop {
                poly_params.push(self.expect_ident());
                if !self.eat_punct(',') {
                    break;
                }
            }
            self.expect_punct('>');
        }
        let parent = if self.eat_punct(':') { Some(self.parse_type_expr()) } else { None };
        self.expect_punct('{');
        let mut members = Vec::new();
        while !self.check_punct('}') && !self.at_eof() {
            let mstart = self.span();
            let mname = self.expect_ident();
            self.expect_punct(':');
            let mtype = self.parse_type_expr();
            self.expect_punct(';');
            let span = mstart.merge(self.prev_span());
            members.push(&*self.alloc(
                span,
                NodeKind::Declaration(DeclarationData {
                    kind: DeclKind::StructMember,
                    name: mname,
                    type_expr: Some(mtype),
                    initializer: None,
                    is_readonly_variable: false,
                    state: std::cell::Cell::new(DeclState::Parsed),
                }),
            ));
        }
        self.expect_punct('}');
        let span = start.merge(self.prev_span());
        self.alloc(
            span,
            NodeKind::Struct(StructData {
                name,
                poly_params: self.atom_slice(poly_params),
                members: self.node_slice(members),
                is_union,
                parent,
                state: std::cell::Cell::new(DeclState::Parsed),
            }),
        )
    }

    fn parse_enum(&mut self) -> &'a Node<'a> {
        let start = self.span();
        self.bump(); // enum
        let name = self.expect_ident();
        let base = if self.eat_punct(':') { Some(self.parse_type_expr()) } else { None };
        self.expect_punct('{');
        let mut members = Vec::new();
        while !self.check_punct('}') && !self.at_eof() {
            let mstart = self.span();
            let mname = self.expect_ident();
            let initializer = if self.eat_punct('=') { Some(self.parse_expr()) } else { None };
            if !self.eat_punct(',') {
                // trailing member without comma is fine before '}'
            }
            let span = mstart.merge(self.prev_span());
            members.push(&*self.alloc(
                span,
                NodeKind::Declaration(DeclarationData {
                    kind: DeclKind::EnumMember,
                    name: mname,
                    type_expr: None,
                    initializer,
                    is_readonly_variable: true,
                    state: std::cell::Cell::new(DeclState::Parsed),
                }),
            ));
        }
        self.expect_punct('}');
        let span = start.merge(self.prev_span());
        self.alloc(
            span,
            NodeKind::Enum(EnumData { name, base, members: self.node_slice(members), state: std::cell::Cell::new(DeclState::Parsed) }),
        )
    }

    fn parse_typealias(&mut self) -> &'a Node<'a> {
        let start = self.span();
        self.bump(); // typealias
        let name = self.expect_ident();
        self.expect_punct('=');
        let target = self.parse_type_expr();
        self.expect_punct(';');
        let span = start.merge(self.prev_span());
        self.alloc(span, NodeKind::TypeAlias { name, target })
    }

    fn parse_library_or_framework(&mut self) -> &'a Node<'a> {
        let start = self.span();
        self.bump();
        let path = self.expect_string();
        self.expect_punct(';');
        let span = start.merge(self.prev_span());
        self.alloc(span, NodeKind::Library(path))
    }

    fn expect_string(&mut self) -> String {
        match self.kind().clone() {
            TokenKind::String(s) => {
                self.bump();
                s
            }
            _ => {
                self.error("expected string literal");
                String::new()
            }
        }
    }

    fn parse_directive(&mut self) -> &'a Node<'a> {
        let start = self.span();
        self.bump(); // '#'

        if self.check_kw(Keyword::If) {
            self.bump();
            let cond = self.parse_expr();
            let then_branch = self.parse_scope_until_rbrace();
            let else_branch = if self.check_kw(Keyword::Else) {
                self.bump();
                Some(self.parse_scope_until_rbrace())
            } else {
                None
            };
            let span = start.merge(self.prev_span());
            return self.alloc(span, NodeKind::StaticIf { cond, then_branch, else_branch });
        }

        let name_atom = self.expect_ident();
        let name = self.atoms.resolve(name_atom).to_string();
        match name.as_str() {
            "load" => {
                let path = self.expect_string();
                self.expect_punct(';');
                let span = start.merge(self.prev_span());
                self.alloc(span, NodeKind::Load(path))
            }
            "import" => {
                let path = self.expect_string();
                self.expect_punct(';');
                let span = start.merge(self.prev_span());
                self.alloc(span, NodeKind::Import(path))
            }
            other => {
                self.error(format!("unknown directive '#{other}'"));
                self.synchronize();
                let span = start.merge(self.prev_span());
                self.alloc(span, NodeKind::Literal(LiteralValue::Null))
            }
        }
    }

    // ---- statements ---------------------------------------------------

    fn parse_if(&mut self) -> &'a Node<'a> {
        let start = self.span();
        self.bump(); // if
        let cond = self.parse_expr();
        let then_branch = self.parse_scope_until_rbrace();
        let else_branch = if self.check_kw(Keyword::Else) {
            self.bump();
            if self.check_kw(Keyword::If) {
                Some(self.parse_if())
            } else {
                Some(self.parse_scope_until_rbrace())
            }
        } else {
            None
        };
        let span = start.merge(self.prev_span());
        self.alloc(span, NodeKind::If { cond, then_branch, else_branch })
    }

    fn parse_while(&mut self) -> &'a Node<'a> {
        let start = self.span();
        self.bump(); // while
        let cond = self.parse_expr();
        let body = self.parse_scope_until_rbrace();
        let span = start.merge(self.prev_span());
        self.alloc(span, NodeKind::While { cond, body })
    }

    fn parse_for(&mut self) -> &'a Node<'a> {
        let start = self.span();
        self.bump(); // for
        let first = self.expect_ident();
        let kind = if self.eat_punct(',') {
            let value_var = self.expect_ident();
            self.expect_kw(Keyword::In);
            let iterable = self.parse_expr();
            ForKind::IndexValue { index_var: first, value_var, iterable }
        } else {
            self.expect_kw(Keyword::In);
            let range_start = self.parse_expr();
            let inclusive = if matches!(self.kind(), TokenKind::Op(CompoundOp::DotDotLt)) {
                self.bump();
                false
            } else if matches!(self.kind(), TokenKind::Op(CompoundOp::DotDot)) {
                self.bump();
                true
            } else {
                self.error("expected '..' or '..<' in for-range");
                true
            };
            let end = self.parse_expr();
            ForKind::Range { var: first, start: range_start, end, inclusive }
        };
        let body = self.parse_scope_until_rbrace();
        let span = start.merge(self.prev_span());
        self.alloc(span, NodeKind::For { kind, body })
    }

    fn expect_kw(&mut self, kw: Keyword) {
        if self.check_kw(kw) {
            self.bump();
        } else {
            self.error(format!("expected keyword {kw:?}"));
        }
    }

    fn parse_switch(&mut self) -> &'a Node<'a> {
        let start = self.span();
        self.bump(); // switch
        let subject = self.parse_expr();
        self.expect_punct('{');
        let mut cases = Vec::new();
        while self.check_kw(Keyword::Case) && !self.at_eof() {
            let cstart = self.span();
            self.bump(); // case
            let mut values = Vec::new();
            loop {
                values.push(self.parse_expr());
                if !self.eat_punct(',') {
                    break;
                }
            }
            self.expect_punct(':');
            let body = self.parse_scope_until_rbrace();
            let span = cstart.merge(self.prev_span());
            cases.push(&*self.alloc(span, NodeKind::Case { values: self.node_slice(values), body }));
        }
        self.expect_punct('}');
        let span = start.merge(self.prev_span());
        self.alloc(span, NodeKind::Switch { subject, cases: self.node_slice(cases) })
    }

    fn parse_return(&mut self) -> &'a Node<'a> {
        let start = self.span();
        self.bump(); // return
        let value = if self.check_punct(';') { None } else { Some(self.parse_expr()) };
        self.expect_punct(';');
        let span = start.merge(self.prev_span());
        self.alloc(span, NodeKind::Return(value))
    }

    fn parse_control_flow(&mut self, kind: ControlFlowKind) -> &'a Node<'a> {
        let start = self.span();
        self.bump();
        self.expect_punct(';');
        let span = start.merge(self.prev_span());
        self.alloc(span, NodeKind::ControlFlow { kind, target_statement: std::cell::Cell::new(None) })
    }

    fn parse_expr_statement(&mut self) -> &'a Node<'a> {
        let start = self.span();
        let expr = self.parse_expr();
        let result = if let Some(op) = self.compound_assign_op() {
            self.bump();
            let value = self.parse_expr();
            let span = start.merge(self.prev_span());
            self.alloc(span, NodeKind::Assign { target: expr, op, value })
        } else {
            expr
        };
        self.expect_punct(';');
        result
    }

    fn compound_assign_op(&self) -> Option<Option<BinaryOp>> {
        if self.check_punct('=') {
            return Some(None);
        }
        let op = match self.kind() {
            TokenKind::Op(CompoundOp::PlusEq) => BinaryOp::Add,
            TokenKind::Op(CompoundOp::MinusEq) => BinaryOp::Sub,
            TokenKind::Op(CompoundOp::StarEq) => BinaryOp::Mul,
            TokenKind::Op(CompoundOp::SlashEq) => BinaryOp::Div,
            TokenKind::Op(CompoundOp::PercentEq) => BinaryOp::Mod,
            TokenKind::Op(CompoundOp::AndEq) => BinaryOp::BitAnd,
            TokenKind::Op(CompoundOp::OrEq) => BinaryOp::BitOr,
            TokenKind::Op(CompoundOp::XorEq) => BinaryOp::BitXor,
            _ => return None,
        };
        Some(Some(op))
    }

    // ---- expressions: precedence climbing ------------------------------
    // lowest -> highest: || ^^ ; && ; | ^ & ; == != ; < <= > >= ; << >> ; + - ; * / %

    fn parse_expr(&mut self) -> &'a Node<'a> {
        self.parse_or_xor()
    }

    fn parse_or_xor(&mut self) -> &'a Node<'a> {
        let mut left = self.parse_and();
        loop {
            let op = match self.kind() {
                TokenKind::Op(CompoundOp::OrOr) => BinaryOp::Or,
                TokenKind::Op(CompoundOp::XorXor) => BinaryOp::Xor,
                _ => break,
            };
            self.bump();
            let right = self.parse_and();
            left = self.binary(op, left, right);
        }
        left
    }

    fn parse_and(&mut self) -> &'a Node<'a> {
        let mut left = self.parse_bitwise();
        while matches!(self.kind(), TokenKind::Op(CompoundOp::AndAnd)) {
            self.bump();
            let right = self.parse_bitwise();
            left = self.binary(BinaryOp::And, left, right);
        }
        left
    }

    fn parse_bitwise(&mut self) -> &'a Node<'a> {
        let mut left = self.parse_equality();
        loop {
            let op = match self.kind() {
                TokenKind::Punct('|') => BinaryOp::BitOr,
                TokenKind::Punct('^') => BinaryOp::BitXor,
                TokenKind::Punct('&') => BinaryOp::BitAnd,
                _ => break,
            };
            self.bump();
            let right = self.parse_equality();
            left = self.binary(op, left, right);
        }
        left
    }

    fn parse_equality(&mut self) -> &'a Node<'a> {
        let mut left = self.parse_relational();
        loop {
            let op = match self.kind() {
                TokenKind::Op(CompoundOp::EqEq) => BinaryOp::Eq,
                TokenKind::Op(CompoundOp::NotEq) => BinaryOp::Ne,
                _ => break,
            };
            self.bump();
            let right = self.parse_relational();
            left = self.binary(op, left, right);
        }
        left
    }

    fn parse_relational(&mut self) -> &'a Node<'a> {
        let mut left = self.parse_shift();
        loop {
            let op = match self.kind() {
                TokenKind::Punct('<') => BinaryOp::Lt,
                TokenKind::Punct('>') => BinaryOp::Gt,
                TokenKind::Op(CompoundOp::Le) => BinaryOp::Le,
                TokenKind::Op(CompoundOp::Ge) => BinaryOp::Ge,
                _ => break,
            };
            self.bump();
            let right = self.parse_shift();
            left = self.binary(op, left, right);
        }
        left
    }

    fn parse_shift(&mut self) -> &'a Node<'a> {
        let mut left = self.parse_additive();
        loop {
            let op = match self.kind() {
                TokenKind::Op(CompoundOp::Shl) => BinaryOp::Shl,
                TokenKind::Op(CompoundOp::Shr) => BinaryOp::Shr,
                _ => break,
            };
            self.bump();
            let right = self.parse_additive();
            left = self.binary(op, left, right);
        }
        left
    }

    fn parse_additive(&mut self) -> &'a Node<'a> {
        let mut left = self.parse_multiplicative();
        loop {
            let op = match self.kind() {
                TokenKind::Punct('+') => BinaryOp::Add,
                TokenKind::Punct('-') => BinaryOp::Sub,
                _ => break,
            };
            self.bump();
            let right = self.parse_multiplicative();
            left = self.binary(op, left, right);
        }
        left
    }

    fn parse_multiplicative(&mut self) -> &'a Node<'a> {
        let mut left = self.parse_unary();
        loop {
            let op = match self.kind() {
                TokenKind::Punct('*') => BinaryOp::Mul,
                TokenKind::Punct('/') => BinaryOp::Div,
                TokenKind::Punct('%') => BinaryOp::Mod,
                _ => break,
            };
            self.bump();
            let right = self.parse_unary();
            left = self.binary(op, left, right);
        }
        left
    }

    fn binary(&self, op: BinaryOp, left: &'a Node<'a>, right: &'a Node<'a>) -> &'a Node<'a> {
        let span = left.span.merge(right.span);
        self.alloc(span, NodeKind::Binary { op, left, right })
    }

    fn parse_unary(&mut self) -> &'a Node<'a> {
        let start = self.span();
        let op = match self.kind() {
            TokenKind::Punct('-') => Some(UnaryOp::Neg),
            TokenKind::Punct('!') => Some(UnaryOp::Not),
            TokenKind::Punct('~') => Some(UnaryOp::BitNot),
            TokenKind::Punct('*') => Some(UnaryOp::Deref),
            TokenKind::Op(CompoundOp::Shl) => Some(UnaryOp::Deref),
            TokenKind::Punct('&') => Some(UnaryOp::AddressOf),
            _ => None,
        };
        if let Some(op) = op {
            self.bump();
            let operand = self.parse_unary();
            let span = start.merge(operand.span);
            return self.alloc(span, NodeKind::Unary { op, operand });
        }
        self.parse_cast()
    }

    fn parse_cast(&mut self) -> &'a Node<'a> {
        // `cast(T, expr)` is parsed as a call-shaped form recognized by name at the primary level.
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> &'a Node<'a> {
        let mut expr = self.parse_primary();
        loop {
            if self.eat_punct('.') {
                let field = self.expect_ident();
                let span = expr.span.merge(self.prev_span());
                expr = self.alloc(span, NodeKind::Dereference { object: expr, field, element_path_index: std::cell::Cell::new(None) });
            } else if self.eat_punct('[') {
                let index = self.parse_expr();
                self.expect_punct(']');
                let span = expr.span.merge(self.prev_span());
                expr = self.alloc(span, NodeKind::ArrayDereference { array: expr, index });
            } else if self.eat_punct('(') {
                let mut args = Vec::new();
                while !self.check_punct(')') && !self.at_eof() {
                    args.push(self.parse_expr());
                    if !self.eat_punct(',') {
                        break;
                    }
                }
                self.expect_punct(')');
                let span = expr.span.merge(self.prev_span());
                expr = self.alloc(span, NodeKind::FunctionCall { callee: expr, args: self.node_slice(args) });
            } else {
                break;
            }
        }
        expr
    }

    fn parse_primary(&mut self) -> &'a Node<'a> {
        let start = self.span();
        match self.kind().clone() {
            TokenKind::Integer { value, radix: _ } => {
                self.bump();
                self.alloc(start, NodeKind::Literal(LiteralValue::Integer(value)))
            }
            TokenKind::Float(value) => {
                self.bump();
                self.alloc(start, NodeKind::Literal(LiteralValue::Float(value)))
            }
            TokenKind::String(s) => {
                self.bump();
                self.alloc(start, NodeKind::Literal(LiteralValue::Str(s)))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.bump();
                self.alloc(start, NodeKind::Literal(LiteralValue::Bool(true)))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.bump();
                self.alloc(start, NodeKind::Literal(LiteralValue::Bool(false)))
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.bump();
                self.alloc(start, NodeKind::Literal(LiteralValue::Null))
            }
            TokenKind::Identifier(a) => {
                self.bump();
                self.alloc(start, NodeKind::Identifier(a))
            }
            TokenKind::Punct('(') => {
                self.bump();
                let first = self.parse_expr();
                if self.eat_punct(',') {
                    let mut items = vec![first];
                    loop {
                        if self.check_punct(')') {
                            break;
                        }
                        items.push(self.parse_expr());
                        if !self.eat_punct(',') {
                            break;
                        }
                    }
                    self.expect_punct(')');
                    let span = start.merge(self.prev_span());
                    self.alloc(span, NodeKind::TupleExpression(self.node_slice(items)))
                } else {
                    self.expect_punct(')');
                    first
                }
            }
            _ => {
                self.error("unexpected token in expression");
                self.bump();
                self.alloc(start, NodeKind::Literal(LiteralValue::Null))
            }
        }
    }

    // ---- type expressions ----------------------------------------------

    fn parse_type_expr(&mut self) -> &'a TypeExpr<'a> {
        if self.eat_punct('*') {
            let of = self.parse_type_expr();
            return self.type_arena.alloc(TypeExpr::Pointer(of));
        }
        if self.eat_punct('$') {
            let name = self.expect_ident();
            return self.type_arena.alloc(TypeExpr::Polymorph(name));
        }
        if self.eat_punct('[') {
            let count = if !self.check_punct(']') { Some(self.parse_expr()) } else { None };
            let dynamic = count.is_none();
            self.expect_punct(']');
            let element = self.parse_type_expr();
            return self.type_arena.alloc(TypeExpr::Array { element, count, dynamic });
        }
        let name = self.expect_ident();
        if self.eat_punct('<') {
            let mut args = Vec::new();
            loop {
                args.push(&*self.parse_type_expr());
                if !self.eat_punct(',') {
                    break;
                }
            }
            self.expect_punct('>');
            return self.type_arena.alloc(TypeExpr::Generic { name, args: self.type_slice(args) });
        }
        self.type_arena.alloc(TypeExpr::Named(name))
    }
}

fn contains_polymorph(t: &TypeExpr<'_>) -> bool {
    match t {
        TypeExpr::Polymorph(_) => true,
        TypeExpr::Named(_) => false,
        TypeExpr::Pointer(of) => contains_polymorph(of),
        TypeExpr::Array { element, .. } => contains_polymorph(element),
        TypeExpr::Function { params, ret, .. } => params.iter().any(|p| contains_polymorph(p)) || contains_polymorph(ret),
        TypeExpr::Generic { args, .. } => args.iter().any(|a| contains_polymorph(a)),
    }
}

fn collect_polymorph_names(t: &TypeExpr<'_>, out: &mut Vec<Atom>) {
    match t {
        TypeExpr::Polymorph(name) => {
            if !out.contains(name) {
                out.push(*name);
            }
        }
        TypeExpr::Named(_) => {}
        TypeExpr::Pointer(of) => collect_polymorph_names(of, out),
        TypeExpr::Array { element, .. } => collect_polymorph_names(element, out),
        TypeExpr::Function { params, ret, .. } => {
            for p in *params {
                collect_polymorph_names(p, out);
            }
            collect_polymorph_names(ret, out);
        }
        TypeExpr::Generic { args, .. } => {
            for a in *args {
                collect_polymorph_names(a, out);
            }
        }
    }
}

fn is_declaration(node: &Node<'_>) -> bool {
    matches!(
        node.kind,
        NodeKind::Declaration(_) | NodeKind::Function(_) | NodeKind::Struct(_) | NodeKind::Enum(_) | NodeKind::TypeAlias { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn parse_source<'a>(
        src: &str,
        node_arena: &'a Arena<Node<'a>>,
        type_arena: &'a Arena<TypeExpr<'a>>,
        slices: &'a SliceArenas<'a>,
        atoms: &mut AtomTable,
    ) -> (&'a Node<'a>, Vec<Diagnostic>, Vec<Token>) {
        let (tokens, lex_diags) = lex(src, FileId(0), atoms);
        assert!(lex_diags.is_empty(), "{lex_diags:?}");
        let tokens_static: &'a [Token] = Box::leak(tokens.clone().into_boxed_slice());
        let (root, diags) = parse(tokens_static, FileId(0), node_arena, type_arena, slices, atoms);
        (root, diags, tokens)
    }

    #[test]
    fn parses_function_declaration() {
        let node_arena: Arena<Node> = Arena::new();
        let type_arena: Arena<TypeExpr> = Arena::new();
        let slices: SliceArenas = SliceArenas::new();
        let mut atoms = AtomTable::new();
        let (root, diags, _) = parse_source(
            "func add(a: int32, b: int32) -> int32 { return a + b; }",
            &node_arena,
            &type_arena,
            &slices,
            &mut atoms,
        );
        assert!(diags.is_empty(), "{diags:?}");
        let scope = root.as_scope().unwrap();
        assert_eq!(scope.statements.borrow().len(), 1);
        let func = scope.statements.borrow()[0].as_function().unwrap();
        assert_eq!(func.params.len(), 2);
    }

    #[test]
    fn parses_let_with_constant_expression() {
        let node_arena: Arena<Node> = Arena::new();
        let type_arena: Arena<TypeExpr> = Arena::new();
        let slices: SliceArenas = SliceArenas::new();
        let mut atoms = AtomTable::new();
        let (root, diags, _) = parse_source("let X = 3 + 4 * 2;", &node_arena, &type_arena, &slices, &mut atoms);
        assert!(diags.is_empty(), "{diags:?}");
        let scope = root.as_scope().unwrap();
        let decl = scope.statements.borrow()[0].as_declaration().unwrap();
        assert!(matches!(decl.initializer.unwrap().kind, NodeKind::Binary { .. }));
    }

    #[test]
    fn parses_struct_with_members() {
        let node_arena: Arena<Node> = Arena::new();
        let type_arena: Arena<TypeExpr> = Arena::new();
        let slices: SliceArenas = SliceArenas::new();
        let mut atoms = AtomTable::new();
        let (root, diags, _) = parse_source("struct S { a: int32; b: int64; }", &node_arena, &type_arena, &slices, &mut atoms);
        assert!(diags.is_empty(), "{diags:?}");
        let scope = root.as_scope().unwrap();
        let stmt = scope.statements.borrow()[0];
        if let NodeKind::Struct(s) = &stmt.kind {
            assert_eq!(s.members.len(), 2);
        } else {
            panic!("expected struct");
        }
    }

    #[test]
    fn parses_for_range_loop() {
        let node_arena: Arena<Node> = Arena::new();
        let type_arena: Arena<TypeExpr> = Arena::new();
        let slices: SliceArenas = SliceArenas::new();
        let mut atoms = AtomTable::new();
        let (root, diags, _) = parse_source("for i in 0..10 { }", &node_arena, &type_arena, &slices, &mut atoms);
        assert!(diags.is_empty(), "{diags:?}");
        let scope = root.as_scope().unwrap();
        assert!(matches!(scope.statements.borrow()[0].kind, NodeKind::For { .. }));
    }

    #[test]
    fn unexpected_token_reports_parse_error_and_recovers() {
        let node_arena: Arena<Node> = Arena::new();
        let type_arena: Arena<TypeExpr> = Arena::new();
        let slices: SliceArenas = SliceArenas::new();
        let mut atoms = AtomTable::new();
        let (_, diags, _) = parse_source("let x = ; let y = 1;", &node_arena, &type_arena, &slices, &mut atoms);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, DiagnosticKind::ParseError);
    }

    #[test]
    fn parses_polymorphic_function_parameter() {
        let node_arena: Arena<Node> = Arena::new();
        let type_arena: Arena<TypeExpr> = Arena::new();
        let slices: SliceArenas = SliceArenas::new();
        let mut atoms = AtomTable::new();
        let (root, diags, _) =
            parse_source("func id<T>(x: $T) -> $T { return x; }", &node_arena, &type_arena, &slices, &mut atoms);
        assert!(diags.is_empty(), "{diags:?}");
        let scope = root.as_scope().unwrap();
        let func = scope.statements.borrow()[0].as_function().unwrap();
        assert!(func.is_polymorphic());
    }
}
