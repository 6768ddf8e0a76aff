use std::path::{Path, PathBuf};

use crate::ast::tree::Ast;
use crate::errors::errors::{CompileError, ErrorImpl};
use crate::symbols::function::FunctionArena;
use crate::types::estype::TypeStore;
use crate::Position;

/// A module delivered by the external parser.
pub struct LoadedModule {
    pub sourcecode: String,
    pub ast: Ast,
    /// Parse errors the frontend already reported for this module. A
    /// non-zero count makes importing the module a fatal error.
    pub num_errors: usize,
}

/// The interface the annotator needs from the external parser frontend.
pub trait ModuleLoader {
    /// True if a module file exists at `path`.
    fn exists(&self, path: &Path) -> bool;
    /// Reads and parses the module at `path`.
    fn load(&mut self, path: &Path) -> Result<LoadedModule, CompileError>;
}

/// Loader used when a compilation has no importable modules.
pub struct NullLoader;

impl ModuleLoader for NullLoader {
    fn exists(&self, _path: &Path) -> bool {
        false
    }

    fn load(&mut self, path: &Path) -> Result<LoadedModule, CompileError> {
        Err(CompileError::fatal(
            ErrorImpl::ModuleNotFound {
                path: path.display().to_string(),
            },
            Position::null(),
        ))
    }
}

/// State shared by every module annotated in one compilation run.
///
/// Owns the type and function arenas (so symbols imported across modules
/// stay valid) and the stack of modules currently being processed, which
/// guards against import cycles. The stack is pushed on entry to a module
/// walk and popped on every exit path, including errors.
pub struct CompilationSession {
    pub types: TypeStore,
    pub functions: FunctionArena,
    search_paths: Vec<PathBuf>,
    modules_processing: Vec<PathBuf>,
    loader: Box<dyn ModuleLoader>,
}

impl CompilationSession {
    pub fn new(search_paths: Vec<PathBuf>, loader: Box<dyn ModuleLoader>) -> Self {
        CompilationSession {
            types: TypeStore::new(),
            functions: FunctionArena::new(),
            search_paths,
            modules_processing: Vec::new(),
            loader,
        }
    }

    /// A session for annotating a single module without imports.
    pub fn without_imports() -> Self {
        CompilationSession::new(Vec::new(), Box::new(NullLoader))
    }

    pub fn is_processing(&self, path: &Path) -> bool {
        self.modules_processing.iter().any(|p| p == path)
    }

    pub(crate) fn begin_module(&mut self, path: PathBuf) {
        self.modules_processing.push(path);
    }

    pub(crate) fn end_module(&mut self, path: &Path) {
        if let Some(idx) = self.modules_processing.iter().rposition(|p| p == path) {
            self.modules_processing.remove(idx);
        }
    }

    pub fn module_exists(&self, path: &Path) -> bool {
        self.loader.exists(path)
    }

    pub fn load_module(&mut self, path: &Path) -> Result<LoadedModule, CompileError> {
        self.loader.load(path)
    }

    /// Maps an import statement's dotted module path to a file path.
    ///
    /// A leading dot makes the import relative to the importing file's
    /// directory; every further leading dot walks one directory up.
    /// Absolute imports try each search path in order and pick the first
    /// existing file.
    pub fn resolve_import(&self, importer: &Path, module_path: &str) -> Option<PathBuf> {
        if module_path.starts_with('.') {
            let mut segments: Vec<&str> = module_path.split('.').collect();
            if segments.first() == Some(&"") {
                segments.remove(0);
            }

            let mut dir = importer.parent()?.to_path_buf();
            let mut idx = 0;
            while idx < segments.len() && segments[idx].is_empty() {
                dir = dir.parent()?.to_path_buf();
                idx += 1;
            }
            if idx >= segments.len() {
                return None;
            }

            for segment in &segments[idx..] {
                dir.push(segment);
            }
            dir.set_extension("es");
            Some(dir)
        } else {
            for search_path in &self.search_paths {
                let mut candidate = search_path.clone();
                for segment in module_path.split('.') {
                    candidate.push(segment);
                }
                candidate.set_extension("es");
                if self.loader.exists(&candidate) {
                    return Some(candidate);
                }
            }
            None
        }
    }
}
