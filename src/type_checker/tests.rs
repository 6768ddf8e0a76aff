//! Unit tests for the compilation session and module bookkeeping.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::ast::tree::{Ast, NodeKind};
use crate::errors::errors::{CompileError, ErrorImpl};
use crate::symbols::scope::ResolvedSymbol;
use crate::symbols::symbol_table::Symbol;
use crate::type_checker::annotator::AstTypeAnnotator;
use crate::type_checker::session::{CompilationSession, LoadedModule, ModuleLoader, NullLoader};
use crate::Position;

struct MapLoader {
    modules: HashMap<PathBuf, fn() -> Ast>,
}

impl ModuleLoader for MapLoader {
    fn exists(&self, path: &Path) -> bool {
        self.modules.contains_key(path)
    }

    fn load(&mut self, path: &Path) -> Result<LoadedModule, CompileError> {
        match self.modules.get(path) {
            Some(build) => Ok(LoadedModule {
                sourcecode: String::new(),
                ast: build(),
                num_errors: 0,
            }),
            None => Err(CompileError::fatal(
                ErrorImpl::ModuleNotFound {
                    path: path.display().to_string(),
                },
                Position::null(),
            )),
        }
    }
}

fn empty_module() -> Ast {
    let mut ast = Ast::new();
    let root = ast.with_children(NodeKind::ModuleStart, "", Position::new(1, 0), vec![]);
    ast.set_root(root);
    ast
}

#[test]
fn test_relative_import_resolution() {
    let session = CompilationSession::without_imports();
    let importer = Path::new("/src/pkg/main.es");

    assert_eq!(
        session.resolve_import(importer, ".sibling"),
        Some(PathBuf::from("/src/pkg/sibling.es"))
    );
    assert_eq!(
        session.resolve_import(importer, "..up.helper"),
        Some(PathBuf::from("/src/up/helper.es"))
    );
    // a path of only dots resolves to nothing
    assert_eq!(session.resolve_import(importer, ".."), None);
}

#[test]
fn test_search_path_import_resolution() {
    let mut modules: HashMap<PathBuf, fn() -> Ast> = HashMap::new();
    modules.insert(PathBuf::from("/lib/net/sockets.es"), empty_module);
    let session = CompilationSession::new(
        vec![PathBuf::from("/other"), PathBuf::from("/lib")],
        Box::new(MapLoader { modules }),
    );

    assert_eq!(
        session.resolve_import(Path::new("/src/main.es"), "net.sockets"),
        Some(PathBuf::from("/lib/net/sockets.es"))
    );
    assert_eq!(
        session.resolve_import(Path::new("/src/main.es"), "net.missing"),
        None
    );
}

#[test]
fn test_processing_stack() {
    let mut session = CompilationSession::without_imports();
    let path = PathBuf::from("/src/a.es");

    assert!(!session.is_processing(&path));
    session.begin_module(path.clone());
    assert!(session.is_processing(&path));
    session.end_module(&path);
    assert!(!session.is_processing(&path));
}

#[test]
fn test_null_loader() {
    let loader = NullLoader;
    assert!(!loader.exists(Path::new("/anything.es")));

    let mut loader = NullLoader;
    assert!(loader.load(Path::new("/anything.es")).is_err());
}

#[test]
fn test_empty_module_seeds_elementary_types() {
    let mut session = CompilationSession::without_imports();
    let mut annotator =
        AstTypeAnnotator::new(&mut session, empty_module(), "/test/empty.es", "");
    annotator.walk_ast().expect("empty module should annotate");

    let module = annotator.into_annotated();
    let scope = module.module_scope.expect("module scope exists");
    for name in ["int8", "uint64", "bool", "void", "float32", "byte", "word"] {
        assert!(
            module.scopes.get(scope).find_symbol(name).is_some(),
            "{} should be seeded",
            name
        );
    }

    // word is an alias of uint64, not a distinct type
    let word = match module.scopes.get(scope).find_symbol("word") {
        Some(Symbol::Type(ty)) => *ty,
        other => panic!("expected type symbol, found {:?}", other),
    };
    let uint64 = session.types.lookup_elementary("uint64").unwrap();
    assert!(session.types.is_equivalent_to(word, uint64, false));
}

#[test]
fn test_module_name_validation() {
    let mut ast = Ast::new();
    let root = ast.with_children(NodeKind::ModuleStart, "", Position::new(1, 0), vec![]);
    ast.set_root(root);

    // the fallback module name comes from the filename, and '2bad' is not
    // importable
    let mut session = CompilationSession::without_imports();
    let mut annotator = AstTypeAnnotator::new(&mut session, ast, "/test/2bad.es", "");
    let error = annotator.walk_ast().unwrap_err();
    assert_eq!(error.get_error_name(), "InvalidModuleName");
    assert!(error.is_fatal());
}

#[test]
fn test_module_statement_overrides_filename() {
    let mut ast = Ast::new();
    let module_name = ast.leaf(NodeKind::Module, "fixed", Position::new(1, 0));
    let root = ast.with_children(
        NodeKind::ModuleStart,
        "",
        Position::new(1, 0),
        vec![module_name],
    );
    ast.set_root(root);

    let mut session = CompilationSession::without_imports();
    let mut annotator = AstTypeAnnotator::new(&mut session, ast, "/test/2bad.es", "");
    annotator.walk_ast().expect("explicit module name is valid");
    assert_eq!(annotator.into_annotated().info.module_name, "fixed");
}

#[test]
fn test_scope_chain_resolution_smoke() {
    // a module with nothing but the seeded table still resolves through
    // the chain helper
    let mut session = CompilationSession::without_imports();
    let mut annotator =
        AstTypeAnnotator::new(&mut session, empty_module(), "/test/empty.es", "");
    annotator.walk_ast().unwrap();
    let module = annotator.into_annotated();
    let scope = module.module_scope.unwrap();

    let resolved =
        crate::symbols::scope::resolve_in_chain(&module.scopes, &[scope], "float64");
    assert!(matches!(resolved, Some(ResolvedSymbol::Type(_))));
}
