//! AST copier: deep-copies a declaration subtree into fresh arena nodes so a
//! polymorphic function or generic struct can be instantiated once per
//! distinct set of concrete type bindings (§4.4, §9). The copy produced here
//! is itself only syntax — re-running the analyzer's declaration checks over
//! it, with the right bindings active, is what gives the copy concrete types.

use std::cell::Cell;
use std::collections::HashMap;

use strata_base::{Arena, Atom};
use strata_syntax::ast::{
    DeclState, DeclarationData, EnumData, ForKind, FunctionData, Node, NodeKind, ScopeData, StructData, TypeExpr,
};
use strata_syntax::parser::SliceArenas;
use strata_types::{TypeId, TypeInfo, TypeTable};

pub struct Copier<'a> {
    node_arena: &'a Arena<Node<'a>>,
    slices: &'a SliceArenas<'a>,
}

impl<'a> Copier<'a> {
    pub fn new(node_arena: &'a Arena<Node<'a>>, slices: &'a SliceArenas<'a>) -> Self {
        Copier { node_arena, slices }
    }

    fn alloc(&self, span: strata_base::TextSpan, kind: NodeKind<'a>) -> &'a Node<'a> {
        self.node_arena.alloc(Node::new(span, kind))
    }

    fn copy_node_slice(&self, items: &[&'a Node<'a>]) -> &'a [&'a Node<'a>] {
        let copied: Vec<&'a Node<'a>> = items.iter().map(|n| self.copy(n)).collect();
        self.slices.node_slices.alloc_slice(copied)
    }

    /// Deep-copies a single node. Every copy starts with unset `type_ref` /
    /// `substitution` slots and a fresh `DeclState::Parsed` for declarations,
    /// so the analyzer re-checks the copy from scratch under new bindings.
    pub fn copy(&self, node: &'a Node<'a>) -> &'a Node<'a> {
        let kind = match &node.kind {
            NodeKind::Scope(s) => return self.copy_scope(node, s),
            NodeKind::ScopeExpansion(target) => NodeKind::ScopeExpansion(self.copy(target)),
            NodeKind::Declaration(d) => NodeKind::Declaration(self.copy_declaration(d)),
            NodeKind::Function(f) => NodeKind::Function(self.copy_function(f)),
            NodeKind::Struct(s) => NodeKind::Struct(self.copy_struct(s)),
            NodeKind::Enum(e) => NodeKind::Enum(self.copy_enum(e)),
            NodeKind::TypeAlias { name, target } => NodeKind::TypeAlias { name: *name, target },
            NodeKind::TypeInstantiation(t) => NodeKind::TypeInstantiation(t),
            NodeKind::Identifier(a) => NodeKind::Identifier(*a),
            NodeKind::Literal(l) => NodeKind::Literal(l.clone()),
            NodeKind::Unary { op, operand } => NodeKind::Unary { op: *op, operand: self.copy(operand) },
            NodeKind::Binary { op, left, right } => {
                NodeKind::Binary { op: *op, left: self.copy(left), right: self.copy(right) }
            }
            NodeKind::Assign { target, op, value } => {
                NodeKind::Assign { target: self.copy(target), op: *op, value: self.copy(value) }
            }
            NodeKind::Dereference { object, field, .. } => NodeKind::Dereference {
                object: self.copy(object),
                field: *field,
                element_path_index: Cell::new(None),
            },
            NodeKind::ArrayDereference { array, index } => {
                NodeKind::ArrayDereference { array: self.copy(array), index: self.copy(index) }
            }
            NodeKind::Cast { target, expr } => NodeKind::Cast { target, expr: self.copy(expr) },
            NodeKind::FunctionCall { callee, args } => {
                NodeKind::FunctionCall { callee: self.copy(callee), args: self.copy_node_slice(args) }
            }
            NodeKind::If { cond, then_branch, else_branch } => NodeKind::If {
                cond: self.copy(cond),
                then_branch: self.copy(then_branch),
                else_branch: else_branch.map(|b| self.copy(b)),
            },
            NodeKind::While { cond, body } => NodeKind::While { cond: self.copy(cond), body: self.copy(body) },
            NodeKind::For { kind, body } => NodeKind::For { kind: self.copy_for_kind(kind), body: self.copy(body) },
            NodeKind::Switch { subject, cases } => {
                NodeKind::Switch { subject: self.copy(subject), cases: self.copy_node_slice(cases) }
            }
            NodeKind::Case { values, body } => {
                NodeKind::Case { values: self.copy_node_slice(values), body: self.copy(body) }
            }
            NodeKind::Return(v) => NodeKind::Return(v.map(|e| self.copy(e))),
            NodeKind::ControlFlow { kind, .. } => {
                NodeKind::ControlFlow { kind: *kind, target_statement: Cell::new(None) }
            }
            NodeKind::TupleExpression(items) => NodeKind::TupleExpression(self.copy_node_slice(items)),
            NodeKind::Load(s) => NodeKind::Load(s.clone()),
            NodeKind::Import(s) => NodeKind::Import(s.clone()),
            NodeKind::StaticIf { cond, then_branch, else_branch } => NodeKind::StaticIf {
                cond: self.copy(cond),
                then_branch: self.copy(then_branch),
                else_branch: else_branch.map(|b| self.copy(b)),
            },
            NodeKind::Library(s) => NodeKind::Library(s.clone()),
        };
        self.alloc(node.span, kind)
    }

    fn copy_scope(&self, original: &'a Node<'a>, s: &ScopeData<'a>) -> &'a Node<'a> {
        let new_scope = ScopeData::new();
        for stmt in s.statements.borrow().iter() {
            let copied = self.copy(stmt);
            new_scope.statements.borrow_mut().push(copied);
            if is_declaration_like(&copied.kind) {
                new_scope.declarations.borrow_mut().push(copied);
            }
        }
        self.alloc(original.span, NodeKind::Scope(new_scope))
    }

    fn copy_declaration(&self, d: &DeclarationData<'a>) -> DeclarationData<'a> {
        DeclarationData {
            kind: d.kind,
            name: d.name,
            type_expr: d.type_expr,
            initializer: d.initializer.map(|e| self.copy(e)),
            is_readonly_variable: d.is_readonly_variable,
            state: Cell::new(DeclState::Parsed),
        }
    }

    fn copy_function(&self, f: &FunctionData<'a>) -> FunctionData<'a> {
        let params: Vec<&'a Node<'a>> = f.params.iter().map(|p| self.copy(p)).collect();
        FunctionData {
            name: f.name,
            poly_params: f.poly_params,
            params: self.slices.node_slices.alloc_slice(params),
            return_type: f.return_type,
            body: f.body.map(|b| self.copy(b)),
            is_c_function: f.is_c_function,
            is_c_varargs: f.is_c_varargs,
            state: Cell::new(DeclState::Parsed),
        }
    }

    fn copy_struct(&self, s: &StructData<'a>) -> StructData<'a> {
        let members: Vec<&'a Node<'a>> = s.members.iter().map(|m| self.copy(m)).collect();
        StructData {
            name: s.name,
            poly_params: s.poly_params,
            members: self.slices.node_slices.alloc_slice(members),
            is_union: s.is_union,
            parent: s.parent,
            state: Cell::new(DeclState::Parsed),
        }
    }

    fn copy_enum(&self, e: &EnumData<'a>) -> EnumData<'a> {
        let members: Vec<&'a Node<'a>> = e.members.iter().map(|m| self.copy(m)).collect();
        EnumData {
            name: e.name,
            base: e.base,
            members: self.slices.node_slices.alloc_slice(members),
            state: Cell::new(DeclState::Parsed),
        }
    }

    fn copy_for_kind(&self, k: &ForKind<'a>) -> ForKind<'a> {
        match k {
            ForKind::Range { var, start, end, inclusive } => {
                ForKind::Range { var: *var, start: self.copy(start), end: self.copy(end), inclusive: *inclusive }
            }
            ForKind::IndexValue { index_var, value_var, iterable } => {
                ForKind::IndexValue { index_var: *index_var, value_var: *value_var, iterable: self.copy(iterable) }
            }
        }
    }

    /// Lockstep-matches an unresolved type pattern (as written on a
    /// polymorphic parameter) against a concrete argument type, recording
    /// each `$T` it encounters into `bindings`. Returns `false` on a shape
    /// mismatch (e.g. a pointer pattern against a non-pointer argument) or a
    /// conflicting re-binding of the same placeholder name.
    pub fn try_to_fill_polymorphic_type_aliases(
        &self,
        pattern: &TypeExpr<'_>,
        concrete: TypeId,
        table: &TypeTable,
        bindings: &mut HashMap<Atom, TypeId>,
    ) -> bool {
        match pattern {
            TypeExpr::Polymorph(name) => match bindings.get(name) {
                Some(&existing) => existing == concrete,
                None => {
                    bindings.insert(*name, concrete);
                    true
                }
            },
            TypeExpr::Named(_) => true,
            TypeExpr::Pointer(of) => match table.get(concrete) {
                TypeInfo::Pointer { of: inner } => self.try_to_fill_polymorphic_type_aliases(of, *inner, table, bindings),
                _ => false,
            },
            TypeExpr::Array { element, .. } => match table.get(concrete) {
                TypeInfo::Array { element: inner, .. } => {
                    self.try_to_fill_polymorphic_type_aliases(element, *inner, table, bindings)
                }
                _ => false,
            },
            TypeExpr::Function { params, ret, .. } => match table.get(concrete) {
                TypeInfo::Function { params: inner_params, ret: inner_ret, .. } => {
                    if inner_params.len() != params.len() {
                        return false;
                    }
                    for (p, ip) in params.iter().zip(inner_params.iter()) {
                        if !self.try_to_fill_polymorphic_type_aliases(p, *ip, table, bindings) {
                            return false;
                        }
                    }
                    self.try_to_fill_polymorphic_type_aliases(ret, *inner_ret, table, bindings)
                }
                _ => false,
            },
            // Explicit type arguments (`Pair<int32, bool>`) are resolved by
            // the caller directly; a generic pattern never arises from
            // inference over a call argument's type.
            TypeExpr::Generic { .. } => matches!(table.get(concrete), TypeInfo::Struct { .. }),
        }
    }
}

fn is_declaration_like(kind: &NodeKind<'_>) -> bool {
    matches!(
        kind,
        NodeKind::Declaration(_) | NodeKind::Function(_) | NodeKind::Struct(_) | NodeKind::Enum(_) | NodeKind::TypeAlias { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_base::{FileId, TextSpan};
    use strata_syntax::ast::LiteralValue;
    use strata_types::Target;

    #[test]
    fn copy_produces_structurally_equal_but_distinct_nodes() {
        let node_arena: Arena<Node> = Arena::new();
        let slices: SliceArenas = SliceArenas::new();
        let copier = Copier::new(&node_arena, &slices);
        let span = TextSpan::new(FileId(0), 0, 1);
        let lit = node_arena.alloc(Node::new(span, NodeKind::Literal(LiteralValue::Integer(7))));
        let copy = copier.copy(lit);
        assert!(!std::ptr::eq(lit, copy));
        assert!(matches!(copy.kind, NodeKind::Literal(LiteralValue::Integer(7))));
    }

    #[test]
    fn fills_polymorph_binding_from_pointer_pattern() {
        let node_arena: Arena<Node> = Arena::new();
        let slices: SliceArenas = SliceArenas::new();
        let type_arena: Arena<TypeExpr> = Arena::new();
        let copier = Copier::new(&node_arena, &slices);
        let mut table = TypeTable::new(Target::default());
        let i32_ty = table.intern(TypeInfo::Integer { bits: 32, signed: true });
        let ptr_ty = table.intern(TypeInfo::Pointer { of: i32_ty });
        let placeholder = type_arena.alloc(TypeExpr::Polymorph(Atom::default()));
        let pattern = type_arena.alloc(TypeExpr::Pointer(placeholder));
        let mut bindings = HashMap::new();
        assert!(copier.try_to_fill_polymorphic_type_aliases(pattern, ptr_ty, &table, &mut bindings));
        assert_eq!(bindings.get(&Atom::default()), Some(&i32_ty));
    }

    #[test]
    fn pointer_pattern_rejects_non_pointer_argument() {
        let node_arena: Arena<Node> = Arena::new();
        let slices: SliceArenas = SliceArenas::new();
        let type_arena: Arena<TypeExpr> = Arena::new();
        let copier = Copier::new(&node_arena, &slices);
        let mut table = TypeTable::new(Target::default());
        let i32_ty = table.intern(TypeInfo::Integer { bits: 32, signed: true });
        let placeholder = type_arena.alloc(TypeExpr::Polymorph(Atom::default()));
        let pattern = type_arena.alloc(TypeExpr::Pointer(placeholder));
        let mut bindings = HashMap::new();
        assert!(!copier.try_to_fill_polymorphic_type_aliases(pattern, i32_ty, &table, &mut bindings));
    }
}
