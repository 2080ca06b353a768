//! Semantic analyzer: name resolution, type inference, implicit coercion,
//! control-flow target resolution, and polymorphic instantiation (§4.5).
//!
//! Declarations are driven through a small work-list keyed by
//! [`DeclState`]: every pass attempts every still-unresolved declaration,
//! and a declaration blocked on a forward reference is deferred rather than
//! reported as an error. A pass that makes no progress at all means the
//! remaining declarations form a cycle, which is reported once as a
//! `CycleError` rather than retried forever.

use std::cell::Cell;
use std::collections::{HashMap, HashSet};

use strata_base::{Arena, Atom, AtomTable, Diagnostic, DiagnosticKind, DiagnosticSink, TextSpan};
use strata_syntax::ast::{
    BinaryOp, ControlFlowKind, DeclKind, DeclState, DeclarationData, EnumData, ForKind, FunctionData, LiteralValue,
    Node, NodeKind, StructData, TypeExpr, UnaryOp,
};
use strata_syntax::parser::SliceArenas;
use strata_types::{TypeId, TypeInfo, TypeRef, TypeTable};

use crate::copier::Copier;

/// A type name referenced a declaration that exists but has not finished
/// checking yet; the caller should retry this declaration on a later pass
/// instead of reporting an error.
struct Defer;

type TyResult = Result<TypeRef, Defer>;

pub struct Analyzer<'a> {
    node_arena: &'a Arena<Node<'a>>,
    copier: Copier<'a>,
    types: TypeTable,
    diagnostics: DiagnosticSink,

    scopes: Vec<HashMap<Atom, &'a Node<'a>>>,
    named_types: HashMap<Atom, TypeRef>,
    declared_names: HashSet<Atom>,
    templates: HashMap<Atom, &'a Node<'a>>,
    functions: HashMap<Atom, &'a Node<'a>>,

    struct_monomorphs: HashMap<(usize, Vec<TypeId>), TypeRef>,
    fn_monomorphs: HashMap<(usize, Vec<TypeId>), &'a Node<'a>>,
    binding_stack: Vec<HashMap<Atom, TypeId>>,
    loop_stack: Vec<&'a Node<'a>>,
    current_return_type: Option<TypeId>,

    poison: TypeId,
    int32_ty: TypeId,
    bool_ty: TypeId,
    float64_ty: TypeId,
    string_ty: TypeId,
    uint64_ty: TypeId,
    type_type: TypeId,
    ptr_void_ty: TypeId,
}

impl<'a> Analyzer<'a> {
    pub fn new(
        node_arena: &'a Arena<Node<'a>>,
        slices: &'a SliceArenas<'a>,
        mut types: TypeTable,
        atoms: &mut AtomTable,
    ) -> Self {
        let poison = types.intern(TypeInfo::Void);
        let int32_ty = types.intern(TypeInfo::Integer { bits: 32, signed: true });
        let bool_ty = types.intern(TypeInfo::Bool);
        let float64_ty = types.intern(TypeInfo::Float { bits: 64 });
        let string_ty = types.intern(TypeInfo::String);
        let uint64_ty = types.intern(TypeInfo::Integer { bits: 64, signed: false });
        let type_type = types.intern(TypeInfo::Type);
        let ptr_void_ty = types.intern(TypeInfo::Pointer { of: poison });

        let builtins: [(&str, TypeId); 12] = [
            ("void", poison),
            ("bool", bool_ty),
            ("string", string_ty),
            ("int8", types.intern(TypeInfo::Integer { bits: 8, signed: true })),
            ("int16", types.intern(TypeInfo::Integer { bits: 16, signed: true })),
            ("int32", int32_ty),
            ("int64", types.intern(TypeInfo::Integer { bits: 64, signed: true })),
            ("uint8", types.intern(TypeInfo::Integer { bits: 8, signed: false })),
            ("uint16", types.intern(TypeInfo::Integer { bits: 16, signed: false })),
            ("uint32", types.intern(TypeInfo::Integer { bits: 32, signed: false })),
            ("uint64", uint64_ty),
            ("float32", types.intern(TypeInfo::Float { bits: 32 })),
        ];
        let mut named_types = HashMap::new();
        for (text, id) in builtins {
            named_types.insert(atoms.intern(text), TypeRef::Concrete(id));
        }
        named_types.insert(atoms.intern("float64"), TypeRef::Concrete(float64_ty));

        Analyzer {
            node_arena,
            copier: Copier::new(node_arena, slices),
            types,
            diagnostics: DiagnosticSink::new(),
            scopes: vec![HashMap::new()],
            named_types,
            declared_names: HashSet::new(),
            templates: HashMap::new(),
            functions: HashMap::new(),
            struct_monomorphs: HashMap::new(),
            fn_monomorphs: HashMap::new(),
            binding_stack: Vec::new(),
            loop_stack: Vec::new(),
            current_return_type: None,
            poison,
            int32_ty,
            bool_ty,
            float64_ty,
            string_ty,
            uint64_ty,
            type_type,
            ptr_void_ty,
        }
    }

    pub fn into_parts(self) -> (TypeTable, DiagnosticSink) {
        (self.types, self.diagnostics)
    }

    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    pub fn diagnostics(&self) -> &DiagnosticSink {
        &self.diagnostics
    }

    fn error(&mut self, span: TextSpan, kind: DiagnosticKind, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::new(kind, message, span));
    }

    /// Entry point: checks every declaration reachable from `root`, then the
    /// top-level statements (constant `let`s with side-effect-free
    /// initializers, `#if` directives, and the like).
    pub fn run(&mut self, root: &'a Node<'a>, atoms: &mut AtomTable) {
        let scope = root.as_scope().expect("analyzer root must be a Scope node");
        let decls: Vec<&'a Node<'a>> = type_or_function_decls(&scope.declarations.borrow());
        for d in &decls {
            self.hoist(d);
        }
        self.run_worklist(&decls, atoms);
        for stmt in scope.statements.borrow().iter() {
            if !is_type_or_function_decl(stmt) {
                self.check_statement(stmt, atoms);
            }
        }
    }

    fn hoist(&mut self, node: &'a Node<'a>) {
        match &node.kind {
            NodeKind::Function(f) => {
                self.functions.insert(f.name, node);
                self.declared_names.insert(f.name);
            }
            NodeKind::Struct(s) => {
                self.declared_names.insert(s.name);
                if !s.poly_params.is_empty() {
                    self.templates.insert(s.name, node);
                }
            }
            NodeKind::Enum(e) => {
                self.declared_names.insert(e.name);
            }
            NodeKind::TypeAlias { name, .. } => {
                self.declared_names.insert(*name);
            }
            _ => {}
        }
    }

    fn run_worklist(&mut self, decls: &[&'a Node<'a>], atoms: &mut AtomTable) {
        let mut pending: Vec<&'a Node<'a>> = decls.to_vec();
        loop {
            let mut progressed = false;
            let mut still_pending = Vec::new();
            for decl in pending {
                if self.try_check_declaration(decl, atoms) {
                    progressed = true;
                } else {
                    still_pending.push(decl);
                }
            }
            pending = still_pending;
            if pending.is_empty() || !progressed {
                break;
            }
        }
        for decl in pending {
            self.mark_cycle_error(decl, atoms);
        }
    }

    fn mark_cycle_error(&mut self, decl: &'a Node<'a>, atoms: &mut AtomTable) {
        let (name, state) = match &decl.kind {
            NodeKind::Struct(s) => (s.name, &s.state),
            NodeKind::Enum(e) => (e.name, &e.state),
            NodeKind::Function(f) => (f.name, &f.state),
            NodeKind::Declaration(d) => (d.name, &d.state),
            _ => return,
        };
        state.set(DeclState::Errored);
        let message = format!("'{}' could not be resolved; its declaration forms a cycle", atoms.resolve(name));
        self.error(decl.span, DiagnosticKind::CycleError, message);
    }

    fn try_check_declaration(&mut self, node: &'a Node<'a>, atoms: &mut AtomTable) -> bool {
        if let Some(state) = decl_state_cell(node) {
            if matches!(state.get(), DeclState::Resolved | DeclState::Errored) {
                return true;
            }
            state.set(DeclState::TypeChecking);
        }
        let result = match &node.kind {
            NodeKind::Struct(s) => self.check_struct(node, s, atoms),
            NodeKind::Enum(e) => self.check_enum(node, e, atoms),
            NodeKind::TypeAlias { name, target } => self.check_typealias(node, *name, target, atoms),
            NodeKind::Function(f) => self.check_function(node, f, atoms),
            NodeKind::Declaration(d) => self.check_var_or_let(node, d, atoms),
            _ => return true,
        };
        if let Some(state) = decl_state_cell(node) {
            if result.is_err() {
                state.set(DeclState::Deferred);
            }
        }
        result.is_ok()
    }

    // ---- type-expression resolution ------------------------------------

    fn resolve_type_expr(&mut self, t: &TypeExpr<'_>, span: TextSpan, atoms: &mut AtomTable) -> TyResult {
        match t {
            TypeExpr::Named(name) => {
                if let Some(&r) = self.named_types.get(name) {
                    return Ok(r);
                }
                if self.declared_names.contains(name) {
                    return Err(Defer);
                }
                self.error(span, DiagnosticKind::NameError, format!("unknown type '{}'", atoms.resolve(*name)));
                Ok(TypeRef::Concrete(self.poison))
            }
            TypeExpr::Polymorph(name) => {
                if let Some(scope) = self.binding_stack.last() {
                    if let Some(&id) = scope.get(name) {
                        return Ok(TypeRef::Concrete(id));
                    }
                }
                Ok(TypeRef::Placeholder(self.types.placeholder(*name)))
            }
            TypeExpr::Pointer(of) => {
                let inner = self.concrete_or_poison(self.resolve_type_expr(of, span, atoms)?);
                Ok(TypeRef::Concrete(self.types.intern(TypeInfo::Pointer { of: inner })))
            }
            TypeExpr::Array { element, count, dynamic } => {
                let inner = self.concrete_or_poison(self.resolve_type_expr(element, span, atoms)?);
                let count_val = if *dynamic { -1 } else { count.and_then(|c| self.eval_const_int(c)).unwrap_or(0) };
                Ok(TypeRef::Concrete(self.types.intern(TypeInfo::Array {
                    element: inner,
                    count: count_val,
                    dynamic: *dynamic,
                })))
            }
            TypeExpr::Function { params, ret, is_c_function, is_c_varargs } => {
                let mut param_ids = Vec::with_capacity(params.len());
                for p in *params {
                    param_ids.push(self.concrete_or_poison(self.resolve_type_expr(p, span, atoms)?));
                }
                let ret_id = self.concrete_or_poison(self.resolve_type_expr(ret, span, atoms)?);
                Ok(TypeRef::Concrete(self.types.intern(TypeInfo::Function {
                    params: param_ids,
                    ret: ret_id,
                    is_c_function: *is_c_function,
                    is_c_varargs: *is_c_varargs,
                })))
            }
            TypeExpr::Generic { name, args } => self.instantiate_generic_struct(*name, args, span, atoms),
        }
    }

    fn concrete_or_poison(&self, r: TypeRef) -> TypeId {
        match r {
            TypeRef::Concrete(id) => id,
            TypeRef::Alias(a) => self.types.get_underlying_final_type(TypeRef::Alias(a)),
            TypeRef::Placeholder(_) => self.poison,
        }
    }

    fn instantiate_generic_struct(&mut self, name: Atom, args: &[&TypeExpr<'_>], span: TextSpan, atoms: &mut AtomTable) -> TyResult {
        let Some(&template) = self.templates.get(&name) else {
            self.error(span, DiagnosticKind::NameError, format!("unknown generic type '{}'", atoms.resolve(name)));
            return Ok(TypeRef::Concrete(self.poison));
        };
        let mut arg_ids = Vec::with_capacity(args.len());
        for a in args {
            arg_ids.push(self.concrete_or_poison(self.resolve_type_expr(a, span, atoms)?));
        }
        let poly_params: Vec<Atom> = match &template.kind {
            NodeKind::Struct(s) => s.poly_params.to_vec(),
            _ => Vec::new(),
        };
        if poly_params.len() != arg_ids.len() {
            self.error(span, DiagnosticKind::TypeError, "generic type-argument count mismatch");
            return Ok(TypeRef::Concrete(self.poison));
        }
        let key = (template as *const Node<'a> as usize, arg_ids.clone());
        if let Some(&cached) = self.struct_monomorphs.get(&key) {
            return Ok(cached);
        }
        let bindings: HashMap<Atom, TypeId> = poly_params.into_iter().zip(arg_ids).collect();
        let copy = self.copier.copy(template);
        self.binding_stack.push(bindings);
        let result = match &copy.kind {
            NodeKind::Struct(s) => self.check_struct(copy, s, atoms),
            _ => Err(Defer),
        };
        self.binding_stack.pop();
        if let Ok(tyref) = result {
            self.struct_monomorphs.insert(key, tyref);
        }
        result
    }

    // ---- declarations ----------------------------------------------------

    fn check_struct(&mut self, node: &'a Node<'a>, s: &StructData<'a>, atoms: &mut AtomTable) -> TyResult {
        if !s.poly_params.is_empty() && self.binding_stack.is_empty() {
            s.state.set(DeclState::Resolved);
            self.templates.insert(s.name, node);
            return Ok(TypeRef::Concrete(self.poison));
        }
        let parent_ty = match s.parent {
            Some(p) => Some(self.concrete_or_poison(self.resolve_type_expr(p, node.span, atoms)?)),
            None => None,
        };
        let mut own_members = Vec::with_capacity(s.members.len());
        for m in s.members {
            if let NodeKind::Declaration(d) = &m.kind {
                let te = d.type_expr.expect("struct member always has a type annotation");
                let ty = self.concrete_or_poison(self.resolve_type_expr(te, m.span, atoms)?);
                own_members.push((d.name, ty));
                m.type_ref.set(Some(TypeRef::Concrete(ty)));
            }
        }
        let id = self.types.declare_struct(s.name, own_members, s.is_union, parent_ty);
        if self.binding_stack.is_empty() {
            self.named_types.insert(s.name, TypeRef::Concrete(id));
        }
        s.state.set(DeclState::Resolved);
        node.type_ref.set(Some(TypeRef::Concrete(id)));
        Ok(TypeRef::Concrete(id))
    }

    fn check_enum(&mut self, node: &'a Node<'a>, e: &EnumData<'a>, atoms: &mut AtomTable) -> TyResult {
        let base_id = match e.base {
            Some(te) => self.concrete_or_poison(self.resolve_type_expr(te, node.span, atoms)?),
            None => self.int32_ty,
        };
        for m in e.members {
            if let NodeKind::Declaration(_) = &m.kind {
                m.type_ref.set(Some(TypeRef::Concrete(base_id)));
            }
        }
        let id = self.types.declare_enum(e.name, base_id);
        self.named_types.insert(e.name, TypeRef::Concrete(id));
        e.state.set(DeclState::Resolved);
        node.type_ref.set(Some(TypeRef::Concrete(id)));
        Ok(TypeRef::Concrete(id))
    }

    fn check_typealias(&mut self, node: &'a Node<'a>, name: Atom, target: &TypeExpr<'_>, atoms: &mut AtomTable) -> TyResult {
        let target_ref = self.resolve_type_expr(target, node.span, atoms)?;
        let alias_id = self.types.declare_alias(name, target_ref);
        self.named_types.insert(name, TypeRef::Alias(alias_id));
        node.type_ref.set(Some(TypeRef::Alias(alias_id)));
        Ok(TypeRef::Alias(alias_id))
    }

    fn check_function(&mut self, node: &'a Node<'a>, f: &FunctionData<'a>, atoms: &mut AtomTable) -> TyResult {
        if f.is_polymorphic() && self.binding_stack.is_empty() {
            f.state.set(DeclState::Resolved);
            self.functions.insert(f.name, node);
            return Ok(TypeRef::Concrete(self.poison));
        }
        self.push_scope();
        let mut param_ids = Vec::with_capacity(f.params.len());
        for p in f.params {
            if let NodeKind::Declaration(d) = &p.kind {
                let te = d.type_expr.expect("parameter always has a type annotation");
                let ty = self.concrete_or_poison(self.resolve_type_expr(te, p.span, atoms)?);
                p.type_ref.set(Some(TypeRef::Concrete(ty)));
                param_ids.push(ty);
                self.bind(d.name, p);
            }
        }
        let ret_id = match f.return_type {
            Some(te) => self.concrete_or_poison(self.resolve_type_expr(te, node.span, atoms)?),
            None => self.poison,
        };
        if let Some(body) = f.body {
            let saved_return = self.current_return_type.replace(ret_id);
            self.check_scope_body(body, atoms);
            self.current_return_type = saved_return;
        }
        self.pop_scope();
        let fn_ty = self.types.intern(TypeInfo::Function {
            params: param_ids,
            ret: ret_id,
            is_c_function: f.is_c_function,
            is_c_varargs: f.is_c_varargs,
        });
        if self.binding_stack.is_empty() {
            self.functions.insert(f.name, node);
        }
        f.state.set(DeclState::Resolved);
        node.type_ref.set(Some(TypeRef::Concrete(fn_ty)));
        Ok(TypeRef::Concrete(fn_ty))
    }

    fn check_var_or_let(&mut self, node: &'a Node<'a>, d: &DeclarationData<'a>, atoms: &mut AtomTable) -> TyResult {
        let declared = match d.type_expr {
            Some(te) => Some(self.resolve_type_expr(te, node.span, atoms)?),
            None => None,
        };
        let declared_id = declared.map(|r| self.concrete_or_poison(r));
        let inferred = d.initializer.map(|init| self.check_expr(init, declared_id, atoms));
        let ty = match (declared_id, inferred) {
            (Some(t), _) => t,
            (None, Some(t)) => t,
            (None, None) => {
                self.error(node.span, DiagnosticKind::TypeError, "declaration needs a type annotation or initializer");
                self.poison
            }
        };
        node.type_ref.set(Some(TypeRef::Concrete(ty)));
        d.state.set(DeclState::Resolved);
        Ok(TypeRef::Concrete(ty))
    }

    // ---- statements --------------------------------------------------------

    fn check_scope_body(&mut self, scope: &'a Node<'a>, atoms: &mut AtomTable) {
        let Some(s) = scope.as_scope() else { return };
        let decls = type_or_function_decls(&s.declarations.borrow());
        for d in &decls {
            self.hoist(d);
        }
        self.run_worklist(&decls, atoms);
        for stmt in s.statements.borrow().iter() {
            if !is_type_or_function_decl(stmt) {
                self.check_statement(stmt, atoms);
            }
        }
    }

    fn check_statement(&mut self, node: &'a Node<'a>, atoms: &mut AtomTable) {
        match &node.kind {
            NodeKind::Declaration(d) => {
                if self.check_var_or_let(node, d, atoms).is_ok() {
                    self.bind(d.name, node);
                }
            }
            NodeKind::Scope(_) => {
                self.push_scope();
                self.check_scope_body(node, atoms);
                self.pop_scope();
            }
            NodeKind::If { cond, then_branch, else_branch } => {
                self.check_expr(cond, Some(self.bool_ty), atoms);
                self.push_scope();
                self.check_scope_body(then_branch, atoms);
                self.pop_scope();
                if let Some(e) = else_branch {
                    self.push_scope();
                    self.check_scope_body(e, atoms);
                    self.pop_scope();
                }
            }
            NodeKind::While { cond, body } => {
                self.check_expr(cond, Some(self.bool_ty), atoms);
                self.loop_stack.push(node);
                self.push_scope();
                self.check_scope_body(body, atoms);
                self.pop_scope();
                self.loop_stack.pop();
            }
            NodeKind::For { kind, body } => {
                self.push_scope();
                match kind {
                    ForKind::Range { var, start, end, .. } => {
                        self.check_expr(start, Some(self.int32_ty), atoms);
                        self.check_expr(end, Some(self.int32_ty), atoms);
                        self.bind_synthetic(*var, self.int32_ty);
                    }
                    ForKind::IndexValue { index_var, value_var, iterable } => {
                        let it_ty = self.check_expr(iterable, None, atoms);
                        let elem = match self.types.get(it_ty) {
                            TypeInfo::Array { element, .. } => *element,
                            _ => self.poison,
                        };
                        self.bind_synthetic(*index_var, self.int32_ty);
                        self.bind_synthetic(*value_var, elem);
                    }
                }
                self.loop_stack.push(node);
                self.check_scope_body(body, atoms);
                self.loop_stack.pop();
                self.pop_scope();
            }
            NodeKind::Switch { subject, cases } => {
                let sub_ty = self.check_expr(subject, None, atoms);
                for case in *cases {
                    if let NodeKind::Case { values, body } = &case.kind {
                        for v in *values {
                            self.check_expr(v, Some(sub_ty), atoms);
                        }
                        self.push_scope();
                        self.check_scope_body(body, atoms);
                        self.pop_scope();
                    }
                }
            }
            NodeKind::Return(value) => {
                let expected = self.current_return_type;
                let vty = value.map(|v| self.check_expr(v, expected, atoms));
                if let (Some(exp), Some(vt)) = (expected, vty) {
                    if exp != vt && self.common_arith_type(exp, vt) != Some(exp) {
                        self.error(node.span, DiagnosticKind::TypeError, "return value type does not match declared return type");
                    }
                }
            }
            NodeKind::ControlFlow { target_statement, kind } => {
                if self.loop_stack.is_empty() {
                    let action = if *kind == ControlFlowKind::Break { "break" } else { "continue" };
                    self.error(node.span, DiagnosticKind::TypeError, format!("'{action}' outside of a loop"));
                }
                target_statement.set(self.loop_stack.last().copied());
            }
            NodeKind::StaticIf { cond, then_branch, else_branch } => {
                let take_then = self.eval_const_bool(cond).unwrap_or(true);
                self.push_scope();
                if take_then {
                    self.check_scope_body(then_branch, atoms);
                } else if let Some(e) = else_branch {
                    self.check_scope_body(e, atoms);
                }
                self.pop_scope();
            }
            NodeKind::Function(_) | NodeKind::Struct(_) | NodeKind::Enum(_) | NodeKind::TypeAlias { .. } => {
                let _ = self.try_check_declaration(node, atoms);
            }
            NodeKind::Load(_) | NodeKind::Import(_) | NodeKind::Library(_) => {
                // Module loading and linkage are the driver's responsibility.
            }
            NodeKind::ScopeExpansion(target) => {
                self.check_scope_body(target, atoms);
            }
            _ => {
                self.check_expr(node, None, atoms);
            }
        }
    }

    // ---- expressions --------------------------------------------------------

    fn check_expr(&mut self, node: &'a Node<'a>, expected: Option<TypeId>, atoms: &mut AtomTable) -> TypeId {
        let ty = match &node.kind {
            NodeKind::Literal(lit) => self.check_literal(lit, expected),
            NodeKind::Identifier(name) => self.check_identifier(node, *name, atoms),
            NodeKind::Unary { op, operand } => self.check_unary(node.span, *op, operand, atoms),
            NodeKind::Binary { op, left, right } => self.check_binary(node.span, *op, left, right, atoms),
            NodeKind::Assign { target, op, value } => self.check_assign(node.span, target, *op, value, atoms),
            NodeKind::Dereference { object, field, element_path_index } => {
                self.check_member(node.span, object, *field, element_path_index, atoms)
            }
            NodeKind::ArrayDereference { array, index } => self.check_index(node.span, array, index, atoms),
            NodeKind::Cast { target, expr } => self.check_cast(node.span, target, expr, atoms),
            NodeKind::FunctionCall { callee, args } => self.check_call(node, callee, args, atoms),
            NodeKind::TupleExpression(items) => {
                for it in *items {
                    self.check_expr(it, None, atoms);
                }
                self.poison
            }
            NodeKind::TypeInstantiation(_) => self.type_type,
            _ => self.poison,
        };
        node.type_ref.set(Some(TypeRef::Concrete(ty)));
        ty
    }

    fn check_literal(&mut self, lit: &LiteralValue, expected: Option<TypeId>) -> TypeId {
        match lit {
            LiteralValue::Integer(_) => expected.filter(|&t| self.types.get(t).is_integer()).unwrap_or(self.int32_ty),
            LiteralValue::Float(_) => expected.filter(|&t| self.types.get(t).is_float()).unwrap_or(self.float64_ty),
            LiteralValue::Str(_) => self.string_ty,
            LiteralValue::Bool(_) => self.bool_ty,
            LiteralValue::Null => expected.filter(|&t| self.types.get(t).is_pointer()).unwrap_or(self.ptr_void_ty),
        }
    }

    fn check_identifier(&mut self, node: &'a Node<'a>, name: Atom, atoms: &mut AtomTable) -> TypeId {
        if let Some(decl_node) = self.lookup_value(name) {
            node.substitution.set(Some(decl_node));
            return type_id_of(decl_node).unwrap_or(self.poison);
        }
        if let Some(&func_node) = self.functions.get(&name) {
            node.substitution.set(Some(func_node));
            return type_id_of(func_node).unwrap_or(self.poison);
        }
        self.error(node.span, DiagnosticKind::NameError, format!("undefined name '{}'", atoms.resolve(name)));
        self.poison
    }

    fn check_unary(&mut self, span: TextSpan, op: UnaryOp, operand: &'a Node<'a>, atoms: &mut AtomTable) -> TypeId {
        let ty = self.check_expr(operand, None, atoms);
        match op {
            UnaryOp::Neg | UnaryOp::BitNot => ty,
            UnaryOp::Not => self.bool_ty,
            UnaryOp::AddressOf => {
                if let NodeKind::Identifier(_) = &operand.kind {
                    if let Some(decl) = operand.substitution.get().and_then(Node::as_declaration) {
                        if decl.kind == DeclKind::Let && !decl.is_readonly_variable {
                            self.error(
                                span,
                                DiagnosticKind::TypeError,
                                "cannot take the address of a constant 'let' (it has no storage; its uses are substituted with its value)",
                            );
                        }
                    }
                }
                self.types.intern(TypeInfo::Pointer { of: ty })
            }
            UnaryOp::Deref => match self.types.get(ty) {
                TypeInfo::Pointer { of } => *of,
                _ => {
                    self.error(span, DiagnosticKind::TypeError, "dereference of a non-pointer type");
                    self.poison
                }
            },
        }
    }

    fn check_binary(&mut self, span: TextSpan, op: BinaryOp, left: &'a Node<'a>, right: &'a Node<'a>, atoms: &mut AtomTable) -> TypeId {
        let lt = self.check_expr(left, None, atoms);
        let rt = self.check_expr(right, Some(lt), atoms);
        match op {
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge | BinaryOp::And
            | BinaryOp::Or | BinaryOp::Xor => self.bool_ty,
            _ => self.common_arith_type(lt, rt).unwrap_or_else(|| {
                self.error(span, DiagnosticKind::TypeError, "operand types are not compatible");
                self.poison
            }),
        }
    }

    fn common_arith_type(&self, a: TypeId, b: TypeId) -> Option<TypeId> {
        if a == b {
            return Some(a);
        }
        match (self.types.get(a), self.types.get(b)) {
            (TypeInfo::Integer { bits: ab, .. }, TypeInfo::Integer { bits: bb, .. }) => Some(if ab >= bb { a } else { b }),
            (TypeInfo::Float { bits: ab }, TypeInfo::Float { bits: bb }) => Some(if ab >= bb { a } else { b }),
            (TypeInfo::Float { .. }, TypeInfo::Integer { .. }) => Some(a),
            (TypeInfo::Integer { .. }, TypeInfo::Float { .. }) => Some(b),
            (TypeInfo::Pointer { .. }, TypeInfo::Integer { .. }) => Some(a),
            _ => None,
        }
    }

    fn check_assign(&mut self, span: TextSpan, target: &'a Node<'a>, op: Option<BinaryOp>, value: &'a Node<'a>, atoms: &mut AtomTable) -> TypeId {
        let tty = self.check_expr(target, None, atoms);
        let vty = self.check_expr(value, Some(tty), atoms);
        let compatible = self.common_arith_type(tty, vty) == Some(tty);
        if op.is_some() && self.common_arith_type(tty, vty).is_none() {
            self.error(span, DiagnosticKind::TypeError, "compound assignment operand types are not compatible");
        } else if op.is_none() && !compatible {
            self.error(span, DiagnosticKind::TypeError, "assignment value type does not match target type");
        }
        tty
    }

    fn check_member(
        &mut self,
        span: TextSpan,
        object: &'a Node<'a>,
        field: Atom,
        path: &Cell<Option<u32>>,
        atoms: &mut AtomTable,
    ) -> TypeId {
        let obj_ty = self.check_expr(object, None, atoms);
        let struct_id = match self.types.get(obj_ty) {
            TypeInfo::Pointer { of } => *of,
            _ => obj_ty,
        };
        match self.types.get(struct_id) {
            TypeInfo::Struct { members, .. } => match members.iter().find(|m| m.name == field) {
                Some(m) => {
                    path.set(Some(m.element_index));
                    m.ty
                }
                None => {
                    self.error(span, DiagnosticKind::NameError, format!("no member '{}'", atoms.resolve(field)));
                    self.poison
                }
            },
            _ => {
                self.error(span, DiagnosticKind::TypeError, "member access on a non-struct type");
                self.poison
            }
        }
    }

    fn check_index(&mut self, span: TextSpan, array: &'a Node<'a>, index: &'a Node<'a>, atoms: &mut AtomTable) -> TypeId {
        let arr_ty = self.check_expr(array, None, atoms);
        self.check_expr(index, Some(self.int32_ty), atoms);
        match self.types.get(arr_ty) {
            TypeInfo::Array { element, .. } => *element,
            TypeInfo::Pointer { of } => *of,
            _ => {
                self.error(span, DiagnosticKind::TypeError, "indexing a non-array, non-pointer type");
                self.poison
            }
        }
    }

    fn check_cast(&mut self, span: TextSpan, target: &TypeExpr<'_>, expr: &'a Node<'a>, atoms: &mut AtomTable) -> TypeId {
        self.check_expr(expr, None, atoms);
        match self.resolve_type_expr(target, span, atoms) {
            Ok(r) => self.concrete_or_poison(r),
            Err(_) => self.poison,
        }
    }

    fn check_call(&mut self, node: &'a Node<'a>, callee: &'a Node<'a>, args: &'a [&'a Node<'a>], atoms: &mut AtomTable) -> TypeId {
        if let NodeKind::Identifier(name) = &callee.kind {
            if let Some(intrinsic) = builtin_intrinsic_name(atoms, *name) {
                return self.check_intrinsic_call(node, intrinsic, args, atoms);
            }
            if let Some(&func_node) = self.functions.get(name) {
                return self.check_function_call(node, func_node, args, atoms);
            }
        }
        let callee_ty = self.check_expr(callee, None, atoms);
        for a in args {
            self.check_expr(a, None, atoms);
        }
        match self.types.get(callee_ty) {
            TypeInfo::Function { ret, .. } => *ret,
            _ => {
                self.error(node.span, DiagnosticKind::TypeError, "call target is not a function");
                self.poison
            }
        }
    }

    fn check_function_call(&mut self, node: &'a Node<'a>, func_node: &'a Node<'a>, args: &'a [&'a Node<'a>], atoms: &mut AtomTable) -> TypeId {
        let NodeKind::Function(f) = &func_node.kind else { return self.poison };
        if args.len() != f.params.len() {
            self.error(node.span, DiagnosticKind::TypeError, "function call argument count mismatch");
        }
        if !f.is_polymorphic() {
            for a in args {
                self.check_expr(a, None, atoms);
            }
            let ret = match func_node.type_ref.get() {
                Some(TypeRef::Concrete(fid)) => match self.types.get(fid) {
                    TypeInfo::Function { ret, .. } => *ret,
                    _ => self.poison,
                },
                _ => self.poison,
            };
            return ret;
        }

        let arg_types: Vec<TypeId> = args.iter().map(|a| self.check_expr(a, None, atoms)).collect();
        let mut bindings = HashMap::new();
        for (p, &arg_ty) in f.params.iter().zip(arg_types.iter()) {
            if let NodeKind::Declaration(d) = &p.kind {
                if let Some(te) = d.type_expr {
                    self.copier.try_to_fill_polymorphic_type_aliases(te, arg_ty, &self.types, &mut bindings);
                }
            }
        }
        let ordered: Vec<TypeId> = f.poly_params.iter().map(|p| *bindings.get(p).unwrap_or(&self.poison)).collect();
        let key = (func_node as *const Node<'a> as usize, ordered.clone());
        let instantiated = if let Some(&cached) = self.fn_monomorphs.get(&key) {
            cached
        } else {
            let copy = self.copier.copy(func_node);
            let bound: HashMap<Atom, TypeId> = f.poly_params.iter().copied().zip(ordered).collect();
            self.binding_stack.push(bound);
            let result = match &copy.kind {
                NodeKind::Function(cf) => self.check_function(copy, cf, atoms),
                _ => Err(Defer),
            };
            self.binding_stack.pop();
            let _ = result;
            self.fn_monomorphs.insert(key, copy);
            copy
        };
        node.substitution.set(Some(instantiated));
        match instantiated.type_ref.get() {
            Some(TypeRef::Concrete(fid)) => match self.types.get(fid) {
                TypeInfo::Function { ret, .. } => *ret,
                _ => self.poison,
            },
            _ => self.poison,
        }
    }

    fn check_intrinsic_call(&mut self, node: &'a Node<'a>, name: &'static str, args: &'a [&'a Node<'a>], atoms: &mut AtomTable) -> TypeId {
        let Some(&arg) = args.first() else {
            self.error(node.span, DiagnosticKind::TypeError, format!("'{name}' expects a type argument"));
            return self.poison;
        };
        let NodeKind::TypeInstantiation(te) = &arg.kind else {
            self.error(node.span, DiagnosticKind::TypeError, format!("'{name}' expects a type argument"));
            return self.poison;
        };
        let Ok(resolved) = self.resolve_type_expr(te, node.span, atoms) else {
            return self.poison;
        };
        let tid = self.concrete_or_poison(resolved);
        if name == "typeof" {
            return self.type_type;
        }
        let value = match name {
            "sizeof" => self.types.size_of(tid),
            "alignof" => self.types.alignment_of(tid),
            _ => self.types.stride_of(tid),
        };
        let lit = self.node_arena.alloc(Node::new(node.span, NodeKind::Literal(LiteralValue::Integer(value))));
        lit.type_ref.set(Some(TypeRef::Concrete(self.uint64_ty)));
        node.substitution.set(Some(lit));
        self.uint64_ty
    }

    // ---- constant folding -----------------------------------------------

    fn eval_const_int(&mut self, expr: &'a Node<'a>) -> Option<i64> {
        match &expr.kind {
            NodeKind::Literal(LiteralValue::Integer(v)) => Some(*v as i64),
            NodeKind::Unary { op: UnaryOp::Neg, operand } => self.eval_const_int(operand).map(|v| -v),
            NodeKind::Identifier(name) => {
                let decl = self.lookup_value(*name)?;
                match &decl.kind {
                    NodeKind::Declaration(d) => d.initializer.and_then(|i| self.eval_const_int(i)),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn eval_const_bool(&mut self, expr: &'a Node<'a>) -> Option<bool> {
        match &expr.kind {
            NodeKind::Literal(LiteralValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    // ---- scope helpers ------------------------------------------------------

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn bind(&mut self, name: Atom, node: &'a Node<'a>) {
        self.scopes.last_mut().expect("at least one scope is always active").insert(name, node);
    }

    fn bind_synthetic(&mut self, name: Atom, ty: TypeId) {
        let node = self.node_arena.alloc(Node::new(TextSpan::default(), NodeKind::Identifier(name)));
        node.type_ref.set(Some(TypeRef::Concrete(ty)));
        self.bind(name, node);
    }

    fn lookup_value(&self, name: Atom) -> Option<&'a Node<'a>> {
        for scope in self.scopes.iter().rev() {
            if let Some(&n) = scope.get(&name) {
                return Some(n);
            }
        }
        None
    }
}

fn type_id_of(node: &Node<'_>) -> Option<TypeId> {
    match node.type_ref.get() {
        Some(TypeRef::Concrete(id)) => Some(id),
        _ => None,
    }
}

fn decl_state_cell<'a>(node: &'a Node<'a>) -> Option<&'a Cell<DeclState>> {
    match &node.kind {
        NodeKind::Struct(s) => Some(&s.state),
        NodeKind::Enum(e) => Some(&e.state),
        NodeKind::Function(f) => Some(&f.state),
        NodeKind::Declaration(d) => Some(&d.state),
        _ => None,
    }
}

fn is_type_or_function_decl(node: &Node<'_>) -> bool {
    matches!(node.kind, NodeKind::Function(_) | NodeKind::Struct(_) | NodeKind::Enum(_) | NodeKind::TypeAlias { .. })
}

/// Flattens a scope's `declarations`, following `ScopeExpansion` entries
/// (spliced in by `#import`) through to the type/function declarations they
/// expose, without re-walking the imported scope's own statements.
fn type_or_function_decls<'a>(decls: &[&'a Node<'a>]) -> Vec<&'a Node<'a>> {
    let mut out = Vec::new();
    collect_type_or_function_decls(decls, &mut out);
    out
}

fn collect_type_or_function_decls<'a>(decls: &[&'a Node<'a>], out: &mut Vec<&'a Node<'a>>) {
    for &d in decls {
        match &d.kind {
            NodeKind::ScopeExpansion(target) => {
                if let Some(scope) = target.as_scope() {
                    collect_type_or_function_decls(&scope.declarations.borrow(), out);
                }
            }
            _ if is_type_or_function_decl(d) => out.push(d),
            _ => {}
        }
    }
}

fn builtin_intrinsic_name(atoms: &AtomTable, name: Atom) -> Option<&'static str> {
    match atoms.resolve(name) {
        "sizeof" => Some("sizeof"),
        "alignof" => Some("alignof"),
        "strideof" => Some("strideof"),
        "typeof" => Some("typeof"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_base::{AtomTable, FileId};
    use strata_syntax::{lex, parse};
    use strata_types::Target;

    fn analyze_source(src: &str) -> (TypeTable, DiagnosticSink) {
        let node_arena: Arena<Node> = Arena::new();
        let type_arena: Arena<TypeExpr> = Arena::new();
        let slices: SliceArenas = SliceArenas::new();
        let mut atoms = AtomTable::new();
        let (tokens, lex_diags) = lex(src, FileId(0), &mut atoms);
        assert!(lex_diags.is_empty(), "{lex_diags:?}");
        let tokens: &[_] = Box::leak(tokens.into_boxed_slice());
        let (root, parse_diags) = parse(tokens, FileId(0), &node_arena, &type_arena, &slices, &mut atoms);
        assert!(parse_diags.is_empty(), "{parse_diags:?}");
        let mut analyzer = Analyzer::new(&node_arena, &slices, TypeTable::new(Target::default()), &mut atoms);
        analyzer.run(root, &mut atoms);
        analyzer.into_parts()
    }

    #[test]
    fn infers_let_type_from_initializer() {
        let (_, diags) = analyze_source("let x = 3 + 4;");
        assert!(diags.diagnostics().is_empty(), "{:?}", diags.diagnostics());
    }

    #[test]
    fn reports_name_error_for_unknown_identifier() {
        let (_, diags) = analyze_source("let x = y;");
        assert!(diags.diagnostics().iter().any(|d| d.kind == DiagnosticKind::NameError));
    }

    #[test]
    fn struct_layout_matches_declared_members() {
        let node_arena: Arena<Node> = Arena::new();
        let type_arena: Arena<TypeExpr> = Arena::new();
        let slices: SliceArenas = SliceArenas::new();
        let mut atoms = AtomTable::new();
        let src = "struct S { a: int32; b: int64; }";
        let (tokens, lex_diags) = lex(src, FileId(0), &mut atoms);
        assert!(lex_diags.is_empty());
        let tokens: &[_] = Box::leak(tokens.into_boxed_slice());
        let (root, parse_diags) = parse(tokens, FileId(0), &node_arena, &type_arena, &slices, &mut atoms);
        assert!(parse_diags.is_empty());
        let mut analyzer = Analyzer::new(&node_arena, &slices, TypeTable::new(Target::default()), &mut atoms);
        analyzer.run(root, &mut atoms);
        assert!(analyzer.diagnostics().is_empty(), "{:?}", analyzer.diagnostics().diagnostics());

        let scope = root.as_scope().unwrap();
        let struct_node = scope
            .declarations
            .borrow()
            .iter()
            .find(|d| matches!(d.kind, NodeKind::Struct(_)))
            .copied()
            .expect("struct declaration should be hoisted");
        let id = match struct_node.type_ref.get() {
            Some(TypeRef::Concrete(id)) => id,
            other => panic!("expected a concrete struct type, got {other:?}"),
        };
        assert_eq!(analyzer.types().size_of(id), 16);
    }

    #[test]
    fn forward_reference_between_structs_resolves() {
        let (_, diags) = analyze_source("struct B { next: *A; } struct A { value: int32; }");
        assert!(diags.diagnostics().is_empty(), "{:?}", diags.diagnostics());
    }

    #[test]
    fn undeclared_type_name_is_a_name_error() {
        let (_, diags) = analyze_source("struct S { a: Bogus; }");
        assert!(diags.diagnostics().iter().any(|d| d.kind == DiagnosticKind::NameError));
    }

    #[test]
    fn polymorphic_function_call_monomorphizes_per_argument_type() {
        let (_, diags) = analyze_source("func id(x: $T) -> $T { return x; } let a = id(1); let b = id(true);");
        assert!(diags.diagnostics().is_empty(), "{:?}", diags.diagnostics());
    }

    #[test]
    fn break_outside_loop_is_reported() {
        let (_, diags) = analyze_source("func f() { break; }");
        assert!(!diags.diagnostics().is_empty());
    }

    #[test]
    fn address_of_a_folded_let_constant_is_a_type_error() {
        let (_, diags) = analyze_source("let x = 3; var p = &x;");
        assert!(diags.diagnostics().iter().any(|d| d.kind == DiagnosticKind::TypeError), "{:?}", diags.diagnostics());
    }

    #[test]
    fn address_of_a_readonly_global_with_no_initializer_is_allowed() {
        let (_, diags) = analyze_source("let x: int32; var p = &x;");
        assert!(diags.diagnostics().is_empty(), "{:?}", diags.diagnostics());
    }
}
