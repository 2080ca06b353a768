//! The compiler driver (§4.6): owns the arena, atom table, type table, and
//! diagnostic sink for one compilation, and sequences loading, directive
//! resolution, and type checking to a fixed point.
//!
//! Mirrors the rest of the frontend in borrowing its arenas from the caller
//! rather than owning them — `Node<'a>` and `TypeExpr<'a>` share the one
//! lifetime `'a` with every other component (`Analyzer<'a>`, `Copier<'a>`),
//! so a `Compiler<'a>` is built the same way a test builds an `Analyzer`:
//! arenas first, in the caller's own stack frame, for as long as the whole
//! compilation needs to live.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use strata_base::{Arena, AtomTable, Diagnostic, DiagnosticKind, DiagnosticSink, FileId, TextSpan};
use strata_sema::Analyzer;
use strata_syntax::ast::{DeclKind, DeclarationData, LiteralValue, Node, NodeKind, ScopeData, TypeExpr};
use strata_syntax::parser::SliceArenas;
use strata_syntax::{lex, parse, Token};
use strata_types::{Target, TypeTable};

use crate::options::BuildOptions;

struct LoadedFile {
    name: String,
    source: String,
}

/// One compiler instance. Not `Send`/`Sync`: the core is single-threaded
/// cooperative (§5), and two instances must not share an arena.
pub struct Compiler<'a> {
    node_arena: &'a Arena<Node<'a>>,
    type_arena: &'a Arena<TypeExpr<'a>>,
    token_arena: &'a Arena<Token>,
    slices: &'a SliceArenas<'a>,
    atoms: AtomTable,
    types: TypeTable,
    diagnostics: DiagnosticSink,
    program_root: &'a Node<'a>,
    files: Vec<LoadedFile>,
    module_search_paths: Vec<String>,
    library_search_paths: Vec<String>,
    precompiled_objects: Vec<String>,
    /// Canonical path -> the scope produced the first time it was loaded, so
    /// a repeated `#import` of the same module reuses one `ScopeExpansion`
    /// rather than re-parsing and re-checking it.
    imported: HashMap<PathBuf, &'a Node<'a>>,
    options: BuildOptions,
}

impl<'a> Compiler<'a> {
    pub fn new(
        node_arena: &'a Arena<Node<'a>>,
        type_arena: &'a Arena<TypeExpr<'a>>,
        token_arena: &'a Arena<Token>,
        slices: &'a SliceArenas<'a>,
        options: BuildOptions,
    ) -> Self {
        let atoms = AtomTable::new();
        let program_root = node_arena.alloc(Node::new(TextSpan::default(), NodeKind::Scope(ScopeData::new())));
        let target = Target::default();
        Compiler {
            node_arena,
            type_arena,
            token_arena,
            slices,
            atoms,
            types: TypeTable::new(target),
            diagnostics: DiagnosticSink::new(),
            program_root,
            files: Vec::new(),
            module_search_paths: Vec::new(),
            library_search_paths: Vec::new(),
            precompiled_objects: Vec::new(),
            imported: HashMap::new(),
            options,
        }
    }

    pub fn diagnostics(&self) -> &DiagnosticSink {
        &self.diagnostics
    }

    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// The merged program: every loaded file's declarations and statements,
    /// in load order, plus `ScopeExpansion` entries for each `#import`.
    pub fn program_root(&self) -> &'a Node<'a> {
        self.program_root
    }

    pub fn add_module_search_path(&mut self, path: impl Into<String>) {
        self.module_search_paths.push(path.into());
    }

    pub fn add_library_search_path(&mut self, path: impl Into<String>) {
        self.library_search_paths.push(path.into());
    }

    pub fn add_precompiled_object(&mut self, path: impl Into<String>) {
        self.precompiled_objects.push(path.into());
    }

    /// Injects `NAME` or `NAME=VALUE` as a compile-time constant in the
    /// preload scope, ahead of every loaded file's declarations.
    ///
    /// A bare `NAME` preloads as the boolean `true` (presence check); `VALUE`
    /// is parsed as an integer if every byte is an ASCII digit, else kept as
    /// a string.
    pub fn add_preload_definition(&mut self, def: &str) {
        let (name, literal) = match def.split_once('=') {
            Some((name, value)) => (name, parse_preload_value(value)),
            None => (def, LiteralValue::Bool(true)),
        };
        let atom = self.atoms.intern(name);
        let initializer = self.node_arena.alloc(Node::new(TextSpan::default(), NodeKind::Literal(literal)));
        let decl = DeclarationData {
            kind: DeclKind::Let,
            name: atom,
            type_expr: None,
            initializer: Some(initializer),
            is_readonly_variable: false,
            state: std::cell::Cell::new(strata_syntax::ast::DeclState::Parsed),
        };
        let node = self.node_arena.alloc(Node::new(TextSpan::default(), NodeKind::Declaration(decl)));
        let scope = self.program_root.as_scope().expect("program root is always a Scope");
        scope.declarations.borrow_mut().push(node);
        scope.statements.borrow_mut().push(node);
    }

    /// Loads, lexes, and parses a file from disk, resolves its `#load` and
    /// `#import` directives, and splices it into the program root.
    pub fn load_file(&mut self, path: &str) -> Result<(), ()> {
        let resolved = self.resolve_module_path(path)?;
        let root = self.load_and_resolve(&resolved)?;
        splice_textual_include(self.program_root.as_scope().unwrap(), root);
        Ok(())
    }

    /// Loads source text that was never on disk, under a synthetic file
    /// name, and splices it into the program root the same way as a file.
    pub fn load_string(&mut self, source: &str, virtual_name: &str) -> Result<(), ()> {
        let root = self.parse_source(source, virtual_name.to_string())?;
        splice_textual_include(self.program_root.as_scope().unwrap(), root);
        Ok(())
    }

    /// Runs the semantic analyzer over the merged program to a fixed point.
    /// Returns `true` if no diagnostic has been reported across the whole
    /// session (loading included).
    pub fn typecheck_program(&mut self) -> bool {
        let types = std::mem::take(&mut self.types);
        let mut analyzer = Analyzer::new(self.node_arena, self.slices, types, &mut self.atoms);
        analyzer.run(self.program_root, &mut self.atoms);
        let (types, diags) = analyzer.into_parts();
        self.types = types;
        for d in diags.diagnostics() {
            self.diagnostics.push(d.clone());
        }
        !self.diagnostics.has_errors()
    }

    /// Renders every recorded diagnostic as `file:line:col: kind: message`,
    /// looking each one's source text up by its span's `FileId`.
    pub fn render_diagnostics(&self) -> Vec<String> {
        self.diagnostics
            .diagnostics()
            .iter()
            .map(|d| match self.files.get(d.span.file.0 as usize) {
                Some(f) => d.render(&f.name, &f.source),
                None => format!("<preload>: {}: {}", d.kind, d.message),
            })
            .collect()
    }

    fn load_and_resolve(&mut self, path: &Path) -> Result<&'a Node<'a>, ()> {
        let source = fs::read_to_string(path).map_err(|e| {
            self.diagnostics.push(Diagnostic::new(
                DiagnosticKind::InternalError,
                format!("could not read '{}': {e}", path.display()),
                TextSpan::default(),
            ));
        })?;
        self.parse_source(&source, path.display().to_string())
    }

    fn parse_source(&mut self, source: &str, name: String) -> Result<&'a Node<'a>, ()> {
        let file = FileId(self.files.len() as u32);
        self.files.push(LoadedFile { name, source: source.to_string() });

        let (tokens, lex_diags) = lex(source, file, &mut self.atoms);
        for d in &lex_diags {
            self.diagnostics.push(d.clone());
        }
        let tokens: &'a [Token] = self.token_arena.alloc_slice(tokens);
        let (root, parse_diags) = parse(tokens, file, self.node_arena, self.type_arena, self.slices, &mut self.atoms);
        for d in &parse_diags {
            self.diagnostics.push(d.clone());
        }
        self.resolve_directives(root)?;
        Ok(root)
    }

    fn resolve_directives(&mut self, root: &'a Node<'a>) -> Result<(), ()> {
        let scope = root.as_scope().expect("parse() always returns a Scope node");
        let statements: Vec<&'a Node<'a>> = scope.statements.borrow().clone();
        for stmt in statements {
            match &stmt.kind {
                NodeKind::Load(path) => {
                    let resolved = self.resolve_module_path(path)?;
                    let included = self.load_and_resolve(&resolved)?;
                    splice_textual_include(scope, included);
                }
                NodeKind::Import(path) => {
                    let resolved = self.resolve_module_path(path)?;
                    let imported = match self.imported.get(&resolved) {
                        Some(&cached) => cached,
                        None => {
                            let loaded = self.load_and_resolve(&resolved)?;
                            self.imported.insert(resolved, loaded);
                            loaded
                        }
                    };
                    let expansion = self.node_arena.alloc(Node::new(stmt.span, NodeKind::ScopeExpansion(imported)));
                    scope.declarations.borrow_mut().push(expansion);
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn resolve_module_path(&mut self, raw: &str) -> Result<PathBuf, ()> {
        let direct = Path::new(raw);
        if direct.is_file() {
            return Ok(direct.to_path_buf());
        }
        for search_path in &self.module_search_paths {
            let candidate = Path::new(search_path).join(raw);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
        self.diagnostics.push(Diagnostic::new(
            DiagnosticKind::InternalError,
            format!("module '{raw}' not found on any search path"),
            TextSpan::default(),
        ));
        Err(())
    }
}

fn splice_textual_include<'a>(target: &ScopeData<'a>, included_root: &'a Node<'a>) {
    if let Some(included) = included_root.as_scope() {
        for &stmt in included.statements.borrow().iter() {
            target.statements.borrow_mut().push(stmt);
        }
        for &decl in included.declarations.borrow().iter() {
            target.declarations.borrow_mut().push(decl);
        }
    }
}

fn parse_preload_value(value: &str) -> LiteralValue {
    if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(parsed) = value.parse::<u64>() {
            return LiteralValue::Integer(parsed);
        }
    }
    LiteralValue::Str(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn new_compiler<'a>(
        node_arena: &'a Arena<Node<'a>>,
        type_arena: &'a Arena<TypeExpr<'a>>,
        token_arena: &'a Arena<Token>,
        slices: &'a SliceArenas<'a>,
    ) -> Compiler<'a> {
        Compiler::new(node_arena, type_arena, token_arena, slices, BuildOptions::default())
    }

    #[test]
    fn load_string_and_typecheck_a_clean_program() {
        let node_arena = Arena::new();
        let type_arena = Arena::new();
        let token_arena = Arena::new();
        let slices = SliceArenas::new();
        let mut compiler = new_compiler(&node_arena, &type_arena, &token_arena, &slices);

        compiler.load_string("let x: int32 = 1;", "main").unwrap();
        assert!(compiler.typecheck_program());
        assert!(compiler.diagnostics().is_empty());
    }

    #[test]
    fn typecheck_reports_name_error_through_diagnostics() {
        let node_arena = Arena::new();
        let type_arena = Arena::new();
        let token_arena = Arena::new();
        let slices = SliceArenas::new();
        let mut compiler = new_compiler(&node_arena, &type_arena, &token_arena, &slices);

        compiler.load_string("let x: int32 = y;", "main").unwrap();
        assert!(!compiler.typecheck_program());
        assert!(!compiler.render_diagnostics().is_empty());
    }

    #[test]
    fn preload_definition_is_visible_as_a_constant() {
        let node_arena = Arena::new();
        let type_arena = Arena::new();
        let token_arena = Arena::new();
        let slices = SliceArenas::new();
        let mut compiler = new_compiler(&node_arena, &type_arena, &token_arena, &slices);

        compiler.add_preload_definition("DEBUG=1");
        compiler.load_string("let x: int32 = DEBUG;", "main").unwrap();
        assert!(compiler.typecheck_program());
    }

    #[test]
    fn load_splices_a_hash_load_file_textually() {
        let dir = tempfile::tempdir().unwrap();
        let included_path = dir.path().join("point.strata");
        let mut included = fs::File::create(&included_path).unwrap();
        writeln!(included, "struct Point {{ x: int32; y: int32; }}").unwrap();

        let main_path = dir.path().join("main.strata");
        let mut main = fs::File::create(&main_path).unwrap();
        writeln!(main, "#load \"{}\";", included_path.display()).unwrap();
        writeln!(main, "let p: Point;").unwrap();

        let node_arena = Arena::new();
        let type_arena = Arena::new();
        let token_arena = Arena::new();
        let slices = SliceArenas::new();
        let mut compiler = new_compiler(&node_arena, &type_arena, &token_arena, &slices);

        compiler.load_file(main_path.to_str().unwrap()).unwrap();
        assert!(compiler.typecheck_program(), "{:?}", compiler.render_diagnostics());
    }

    #[test]
    fn import_exposes_declarations_without_duplicating_statements() {
        let dir = tempfile::tempdir().unwrap();
        let lib_path = dir.path().join("lib.strata");
        let mut lib = fs::File::create(&lib_path).unwrap();
        writeln!(lib, "func double(n: int32) -> int32 {{ return n * 2; }}").unwrap();

        let main_path = dir.path().join("main.strata");
        let mut main = fs::File::create(&main_path).unwrap();
        writeln!(main, "#import \"{}\";", lib_path.display()).unwrap();
        writeln!(main, "let x: int32 = double(21);").unwrap();

        let node_arena = Arena::new();
        let type_arena = Arena::new();
        let token_arena = Arena::new();
        let slices = SliceArenas::new();
        let mut compiler = new_compiler(&node_arena, &type_arena, &token_arena, &slices);

        compiler.load_file(main_path.to_str().unwrap()).unwrap();
        assert!(compiler.typecheck_program(), "{:?}", compiler.render_diagnostics());
    }

    #[test]
    fn unresolvable_module_path_reports_a_diagnostic_and_fails_the_load() {
        let node_arena = Arena::new();
        let type_arena = Arena::new();
        let token_arena = Arena::new();
        let slices = SliceArenas::new();
        let mut compiler = new_compiler(&node_arena, &type_arena, &token_arena, &slices);

        let result = compiler.load_file("does/not/exist.strata");
        assert!(result.is_err());
        assert!(compiler.diagnostics().has_errors());
    }
}
