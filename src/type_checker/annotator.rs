use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use log::{debug, error};
use regex::Regex;

use crate::ast::tree::{Ast, IntegerAttrs, NodeId, NodeKind};
use crate::errors::errors::{CompileError, ErrorImpl};
use crate::render_source_context;
use crate::symbols::function::{ESFunction, FuncId};
use crate::symbols::scope::{resolve_in_chain, ResolvedSymbol, ScopeArena, ScopeId};
use crate::symbols::symbol_table::Symbol;
use crate::symbols::variable::{ESVariable, Linkage, Mangling};
use crate::types::estype::{TypeId, TypeKind};
use crate::types::rules::{can_explicitly_cast, can_implicitly_cast};
use crate::Position;

use super::session::CompilationSession;

lazy_static! {
    static ref MODULE_NAME: Regex = Regex::new("^[a-zA-Z_][a-zA-Z_0-9]*$").unwrap();
}

/// Context threaded through the recursive visits: the enclosing function
/// (for return checking) and whether a loop encloses the current node
/// (for break / continue validity).
#[derive(Debug, Clone, Copy, Default)]
struct VisitContext {
    function: Option<FuncId>,
    in_loop: bool,
}

/// Module-level facts collected while annotating, consumed by the code
/// generator and by build tooling.
#[derive(Debug, Default)]
pub struct ModuleInfo {
    pub package_name: String,
    pub module_name: String,
    pub dependencies: Vec<PathBuf>,
    pub ctors: Vec<FuncId>,
    pub dtors: Vec<FuncId>,
}

/// A fully annotated module: the mutated tree, the scope tables attached
/// to its nodes, and the collected module facts.
pub struct AnnotatedModule {
    pub ast: Ast,
    pub scopes: ScopeArena,
    pub module_scope: Option<ScopeId>,
    pub info: ModuleInfo,
}

/// Unpacked shape of a function definition node.
struct DefFuncParts {
    modifiers: Vec<(NodeId, NodeId)>,
    name: NodeId,
    return_type_name: NodeId,
    params: Vec<(NodeId, NodeId)>,
    block: Option<NodeId>,
}

/// The type annotation pass.
///
/// Walks one module's tree, attaching a resolved type to every expression
/// node, registering symbols for declarations, resolving overloaded calls
/// and inserting implicit-cast nodes. Imported modules are annotated
/// recursively by fresh annotator instances sharing the session.
pub struct AstTypeAnnotator<'s> {
    session: &'s mut CompilationSession,
    ast: Ast,
    filename: PathBuf,
    source_lines: Vec<String>,
    scopes: ScopeArena,
    scope_stack: Vec<ScopeId>,
    module_scope: Option<ScopeId>,
    diagnostics: Vec<CompileError>,
    num_errors: usize,
    info: ModuleInfo,
}

impl<'s> AstTypeAnnotator<'s> {
    pub fn new(
        session: &'s mut CompilationSession,
        ast: Ast,
        filename: impl Into<PathBuf>,
        sourcecode: &str,
    ) -> Self {
        let filename = filename.into();
        debug_assert!(filename.is_absolute());

        AstTypeAnnotator {
            session,
            ast,
            filename,
            source_lines: sourcecode.lines().map(str::to_string).collect(),
            scopes: ScopeArena::new(),
            scope_stack: Vec::new(),
            module_scope: None,
            diagnostics: Vec::new(),
            num_errors: 0,
            info: ModuleInfo::default(),
        }
    }

    /// Annotates the whole module.
    ///
    /// Recoverable diagnostics are collected (see [`Self::diagnostics`])
    /// and reported once as the aggregate fatal error; a structural problem
    /// aborts immediately. The modules-in-progress stack is popped on every
    /// exit path.
    pub fn walk_ast(&mut self) -> Result<(), CompileError> {
        let root = match self.ast.root() {
            Some(root) if self.ast.kind(root) == NodeKind::ModuleStart => root,
            _ => return Err(CompileError::fatal(ErrorImpl::NotAModule, Position::null())),
        };

        self.session.begin_module(self.filename.clone());
        let result = self.on_module_start(root);
        self.session.end_module(&self.filename);
        result
    }

    /// Every recoverable diagnostic reported so far, one per error site.
    pub fn diagnostics(&self) -> &[CompileError] {
        &self.diagnostics
    }

    pub fn into_annotated(self) -> AnnotatedModule {
        AnnotatedModule {
            ast: self.ast,
            scopes: self.scopes,
            module_scope: self.module_scope,
            info: self.info,
        }
    }

    // ------------------------------------------------------------------
    // error helpers
    // ------------------------------------------------------------------

    fn error_at(&self, error_impl: ErrorImpl, position: Position) -> CompileError {
        let inline = error_impl.to_string();
        CompileError::recoverable(error_impl, position)
            .with_context(render_source_context(&self.source_lines, &position, &inline))
    }

    fn error(&self, error_impl: ErrorImpl, node: NodeId) -> CompileError {
        self.error_at(error_impl, self.ast.position(node))
    }

    fn fatal(&self, error_impl: ErrorImpl, node: NodeId) -> CompileError {
        let position = self.ast.position(node);
        let inline = error_impl.to_string();
        CompileError::fatal(error_impl, position)
            .with_context(render_source_context(&self.source_lines, &position, &inline))
    }

    fn internal(&self, node: NodeId, message: &str) -> CompileError {
        CompileError::fatal(
            ErrorImpl::Internal {
                message: message.to_string(),
            },
            self.ast.position(node),
        )
    }

    /// Logs a diagnostic and bumps the module error counter.
    fn report(&mut self, compile_error: CompileError) {
        error!("{}: {}", self.filename.display(), compile_error);
        self.num_errors += 1;
        self.diagnostics.push(compile_error);
    }

    fn aggregate_error(&self, node: NodeId) -> CompileError {
        CompileError::fatal(
            ErrorImpl::ErrorsOccurred {
                count: self.num_errors,
            },
            self.ast.position(node),
        )
    }

    // ------------------------------------------------------------------
    // tree and scope helpers
    // ------------------------------------------------------------------

    fn child(&self, node: NodeId, index: usize) -> Result<NodeId, CompileError> {
        self.ast
            .node(node)
            .children
            .get(index)
            .copied()
            .ok_or_else(|| self.internal(node, "node is missing an expected child"))
    }

    fn node_type(&self, node: NodeId) -> Result<TypeId, CompileError> {
        self.ast
            .node(node)
            .es_type
            .ok_or_else(|| self.internal(node, "expression carries no type"))
    }

    fn set_type(&mut self, node: NodeId, es_type: TypeId) {
        self.ast.node_mut(node).es_type = Some(es_type);
    }

    fn builtin_type(&self, name: &str) -> TypeId {
        self.session
            .types
            .lookup_elementary(name)
            .expect("elementary types are seeded at session construction")
    }

    fn describe(&self, es_type: TypeId) -> String {
        self.session.types.describe(es_type)
    }

    fn equivalent(&self, a: TypeId, b: TypeId) -> bool {
        self.session.types.is_equivalent_to(a, b, false)
    }

    fn push_scope(&mut self, node: NodeId) -> ScopeId {
        let scope = self.scopes.add();
        self.ast.node_mut(node).scope = Some(scope);
        self.scope_stack.push(scope);
        scope
    }

    fn pop_scope(&mut self) {
        self.scope_stack.pop();
    }

    // ------------------------------------------------------------------
    // symbol resolution over the scope chain
    // ------------------------------------------------------------------

    fn find_symbol(&self, name: &str) -> Option<ResolvedSymbol> {
        resolve_in_chain(&self.scopes, &self.scope_stack, name)
    }

    fn find_type_by_name(&self, name: &str, node: NodeId) -> Result<TypeId, CompileError> {
        match self.find_symbol(name) {
            Some(ResolvedSymbol::Type(es_type)) => Ok(es_type),
            Some(_) => Err(self.error(
                ErrorImpl::SymbolKindMismatch {
                    name: name.to_string(),
                    expected: "type",
                },
                node,
            )),
            None => Err(self.error(
                ErrorImpl::UndefinedSymbol {
                    name: name.to_string(),
                },
                node,
            )),
        }
    }

    fn find_variable(&self, name: &str, node: NodeId) -> Result<ESVariable, CompileError> {
        match self.find_variable_may_fail(name, node)? {
            Some(variable) => Ok(variable),
            None => Err(self.error(
                ErrorImpl::UndefinedSymbol {
                    name: name.to_string(),
                },
                node,
            )),
        }
    }

    /// `None` when the name is unbound; still an error when it is bound to
    /// something other than a variable.
    fn find_variable_may_fail(
        &self,
        name: &str,
        node: NodeId,
    ) -> Result<Option<ESVariable>, CompileError> {
        match self.find_symbol(name) {
            None => Ok(None),
            Some(ResolvedSymbol::Variable(variable)) => Ok(Some(variable)),
            Some(_) => Err(self.error(
                ErrorImpl::SymbolKindMismatch {
                    name: name.to_string(),
                    expected: "variable",
                },
                node,
            )),
        }
    }

    fn find_functions_may_fail(&self, name: &str) -> Option<Vec<FuncId>> {
        match self.find_symbol(name) {
            Some(ResolvedSymbol::Functions(ids)) => Some(ids),
            _ => None,
        }
    }

    /// Inserts into the innermost table after checking the whole chain for
    /// a conflicting binding; only functions may pile onto functions.
    fn add_symbol(
        &mut self,
        name: &str,
        symbol: Symbol,
        position: Position,
    ) -> Result<(), CompileError> {
        if let Some(previous) = self.find_symbol(name) {
            let overloading =
                matches!(previous, ResolvedSymbol::Functions(_)) && symbol.is_functions();
            if !overloading {
                return Err(self.error_at(
                    ErrorImpl::SymbolAlreadyDefined {
                        name: name.to_string(),
                    },
                    position,
                ));
            }
        }

        let scope = match self.scope_stack.last() {
            Some(&scope) => scope,
            None => {
                return Err(CompileError::fatal(
                    ErrorImpl::Internal {
                        message: "no open scope".to_string(),
                    },
                    position,
                ))
            }
        };
        if let Err(error_impl) = self.scopes.get_mut(scope).add_symbol(name, symbol) {
            return Err(self.error_at(error_impl, position));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // implicit conversions
    // ------------------------------------------------------------------

    /// The literal-narrowing exception: an integer constant may convert to
    /// a narrower type of its own signedness when its value fits, judged by
    /// the tracked minimal width rather than the promoted type.
    fn literal_narrowing_allowed(&self, expr: NodeId, target: TypeId) -> bool {
        let node = self.ast.node(expr);
        if node.kind != NodeKind::IntegerConstant {
            return false;
        }
        let attrs = match node.integer_attrs {
            Some(attrs) => attrs,
            None => return false,
        };

        let target_name = match self.session.types.get(target).kind() {
            TypeKind::Elementary(name) => name.as_str(),
            _ => return false,
        };
        let target_bits = if attrs.signed {
            match target_name {
                "int8" => 8,
                "int16" => 16,
                "int32" => 32,
                "int64" => 64,
                _ => return false,
            }
        } else {
            match target_name {
                "uint8" => 8,
                "uint16" => 16,
                "uint32" => 32,
                "uint64" => 64,
                _ => return false,
            }
        };

        attrs.min_bits <= target_bits
    }

    fn can_convert_expression(&self, expr: NodeId, target: TypeId) -> bool {
        let es_type = match self.ast.node(expr).es_type {
            Some(es_type) => es_type,
            None => return false,
        };
        can_implicitly_cast(&self.session.types, es_type, target)
            || self.literal_narrowing_allowed(expr, target)
    }

    /// Rewrites `expr` in place into an implicit-cast node wrapping a copy
    /// of itself, like the parser would have produced for an explicit cast.
    fn insert_implicit_cast(
        &mut self,
        expr: NodeId,
        to: TypeId,
        to_name: Option<&str>,
    ) -> Result<(), CompileError> {
        let to_text = match to_name {
            Some(name) => name.to_string(),
            None => self.describe(to),
        };

        if !self.can_convert_expression(expr, to) {
            return Err(self.error(ErrorImpl::NoImplicitCast { to: to_text }, expr));
        }

        let position = self.ast.position(expr);
        let inner = self.ast.node(expr).clone();
        let inner = self.ast.add(inner);
        let type_name = self.ast.leaf(NodeKind::Name, &to_text, position);

        let node = self.ast.node_mut(expr);
        node.kind = NodeKind::ImplicitCast;
        node.text = "IMPLICITCAST".to_string();
        node.children = vec![inner, type_name];
        node.es_type = Some(to);
        Ok(())
    }

    /// Coerces a binary operator's operands to a common type: first tries
    /// casting the left operand to the right operand's type, then the
    /// reverse.
    fn coerce_operands(&mut self, arg1: NodeId, arg2: NodeId) -> Result<(), CompileError> {
        let t1 = self.node_type(arg1)?;
        let t2 = self.node_type(arg2)?;
        if self.equivalent(t1, t2) {
            return Ok(());
        }

        if self.can_convert_expression(arg1, t2) {
            self.insert_implicit_cast(arg1, t2, None)
        } else if self.can_convert_expression(arg2, t1) {
            self.insert_implicit_cast(arg2, t1, None)
        } else {
            Err(self.error(
                ErrorImpl::OperandsNotCoercible {
                    lhs: self.describe(t1),
                    rhs: self.describe(t2),
                },
                arg1,
            ))
        }
    }

    fn coerce_condition_to_bool(&mut self, expr: NodeId) -> Result<(), CompileError> {
        let bool_type = self.builtin_type("bool");
        let es_type = self.node_type(expr)?;
        if self.equivalent(es_type, bool_type) {
            return Ok(());
        }
        if !self.can_convert_expression(expr, bool_type) {
            return Err(self.error(
                ErrorImpl::ConditionNotBoolean {
                    found: self.describe(es_type),
                },
                expr,
            ));
        }
        self.insert_implicit_cast(expr, bool_type, Some("bool"))
    }

    // ------------------------------------------------------------------
    // dispatch
    // ------------------------------------------------------------------

    fn dispatch(&mut self, node: NodeId, ctx: VisitContext) -> Result<(), CompileError> {
        let kind = self.ast.kind(node);
        match kind {
            NodeKind::ModuleStart => self.on_module_start(node),
            NodeKind::ImportAll => self.on_import_all(node),
            NodeKind::Struct => self.on_def_struct(node, ctx),
            NodeKind::Alias => self.on_alias(node, ctx),
            NodeKind::Typedef => self.on_typedef(node, ctx),
            NodeKind::DefFunc => self.on_def_function(node, ctx),
            NodeKind::Block => self.on_block(node, ctx),
            NodeKind::Pass => Ok(()),
            NodeKind::Return => self.on_return(node, ctx),
            NodeKind::Assert => self.on_assert(node, ctx),
            NodeKind::If => self.on_if(node, ctx),
            NodeKind::For => self.on_for(node, ctx),
            NodeKind::While => self.on_while(node, ctx),
            NodeKind::Break | NodeKind::Continue => self.on_break_or_continue(node, ctx),
            NodeKind::IntegerConstant => self.on_integer_constant(node),
            NodeKind::FloatConstant => self.on_float_constant(node),
            NodeKind::StringConstant => self.on_string_constant(node),
            NodeKind::BooleanConstant => self.on_boolean_constant(node),
            NodeKind::NoneConstant => self.on_none_constant(node),
            NodeKind::CallFunc => self.on_call_func(node, ctx),
            NodeKind::Variable => self.on_variable(node),
            NodeKind::DefVar => self.on_def_variable(node, ctx),
            NodeKind::Assign => self.on_assign(node, ctx),
            NodeKind::ListAssign => self.on_list_assign(node, ctx),
            NodeKind::Cast | NodeKind::ImplicitCast => self.on_cast(node, ctx),
            NodeKind::TypeName => self.on_type_name(node),
            NodeKind::FunctionTypeName => self.on_function_type_name(node, ctx),
            NodeKind::Dereference => self.on_dereference(node, ctx),
            NodeKind::MemberAccess => self.on_member_access(node, ctx),
            NodeKind::AddressOf => self.on_address_of(node, ctx),
            NodeKind::New => self.on_new(node, ctx),
            other if other.is_basic_operator() => self.on_basic_operator(node, ctx),
            _ => Err(self.internal(node, "no handler for node kind")),
        }
    }

    // ------------------------------------------------------------------
    // module-level passes
    // ------------------------------------------------------------------

    fn on_module_start(&mut self, node: NodeId) -> Result<(), CompileError> {
        let mut package_name = String::new();
        let mut module_name: Option<String> = None;
        let mut statements = Vec::new();

        for child in self.ast.children(node) {
            match self.ast.kind(child) {
                NodeKind::Package => package_name = self.ast.text(child).to_string(),
                NodeKind::Module => module_name = Some(self.ast.text(child).to_string()),
                _ => statements.push(child),
            }
        }

        // fall back to the filename, without its extension
        let module_name = module_name.unwrap_or_else(|| {
            self.filename
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default()
        });
        if !MODULE_NAME.is_match(&module_name) {
            return Err(self.fatal(ErrorImpl::InvalidModuleName { name: module_name }, node));
        }

        debug!(
            "annotating module {} ({})",
            module_name,
            self.filename.display()
        );
        self.info.package_name = package_name;
        self.info.module_name = module_name;

        // seed the module's symbol table with the elementary types
        let module_scope = self.push_scope(node);
        self.module_scope = Some(module_scope);
        let elementary: Vec<(String, TypeId)> =
            self.session.types.elementary_types().to_vec();
        let position = self.ast.position(node);
        for (name, es_type) in elementary {
            if let Err(error_impl) = self
                .scopes
                .get_mut(module_scope)
                .add_symbol(&name, Symbol::Type(es_type))
            {
                return Err(CompileError::fatal(error_impl, position));
            }
        }

        let ctx = VisitContext::default();
        let mut stop = false;

        // imports
        self.run_pass(&statements, &mut stop, |kind| kind == NodeKind::ImportAll, ctx);

        // global structs, aliases, typedefs, resolved before any body
        if !stop {
            self.run_pass(
                &statements,
                &mut stop,
                |kind| {
                    matches!(
                        kind,
                        NodeKind::Struct | NodeKind::Alias | NodeKind::Typedef
                    )
                },
                ctx,
            );
        }

        // function prototypes, enabling forward references
        if !stop {
            for &statement in &statements {
                if self.ast.kind(statement) != NodeKind::DefFunc {
                    continue;
                }
                let outcome = self
                    .unpack_def_func(statement)
                    .and_then(|parts| self.on_func_prototype(statement, parts, ctx));
                if let Err(compile_error) = outcome {
                    let is_fatal = compile_error.is_fatal();
                    self.report(compile_error);
                    if is_fatal {
                        stop = true;
                        break;
                    }
                }
            }
        }

        if stop || self.num_errors > 0 {
            return Err(self.aggregate_error(node));
        }

        // annotate the whole tree; imports and type declarations are done
        for &statement in &statements {
            if matches!(
                self.ast.kind(statement),
                NodeKind::ImportAll | NodeKind::Struct | NodeKind::Alias | NodeKind::Typedef
            ) {
                continue;
            }
            if let Err(compile_error) = self.dispatch(statement, ctx) {
                let is_fatal = compile_error.is_fatal();
                self.report(compile_error);
                if is_fatal {
                    break;
                }
            }
        }

        if self.num_errors > 0 {
            return Err(self.aggregate_error(node));
        }
        Ok(())
    }

    fn run_pass(
        &mut self,
        statements: &[NodeId],
        stop: &mut bool,
        select: impl Fn(NodeKind) -> bool,
        ctx: VisitContext,
    ) {
        for &statement in statements {
            if !select(self.ast.kind(statement)) {
                continue;
            }
            if let Err(compile_error) = self.dispatch(statement, ctx) {
                let is_fatal = compile_error.is_fatal();
                self.report(compile_error);
                if is_fatal {
                    *stop = true;
                    break;
                }
            }
        }
    }

    fn on_import_all(&mut self, node: NodeId) -> Result<(), CompileError> {
        let module_path = self.ast.text(node).to_string();

        let to_import = self
            .session
            .resolve_import(&self.filename, &module_path)
            .ok_or_else(|| {
                self.error(
                    ErrorImpl::ModuleNotFound {
                        path: module_path.clone(),
                    },
                    node,
                )
            })?;
        if !self.session.module_exists(&to_import) {
            return Err(self.error(
                ErrorImpl::ModuleNotFound {
                    path: to_import.display().to_string(),
                },
                node,
            ));
        }

        // prevent infinite recursion
        if self.session.is_processing(&to_import) {
            return Err(self.fatal(
                ErrorImpl::ImportCycle {
                    path: to_import.display().to_string(),
                },
                node,
            ));
        }

        self.info.dependencies.push(to_import.clone());

        let loaded = self.session.load_module(&to_import)?;
        if loaded.num_errors > 0 {
            return Err(self.fatal(
                ErrorImpl::ModuleContainsErrors {
                    path: to_import.display().to_string(),
                },
                node,
            ));
        }

        debug!("importing module {}", to_import.display());

        // another annotator translates the imported module, recursing if
        // necessary; its symbols are then inserted into our module
        let mut sub =
            AstTypeAnnotator::new(&mut *self.session, loaded.ast, &to_import, &loaded.sourcecode);
        sub.walk_ast()?;
        let annotated = sub.into_annotated();

        let module_scope = match annotated.module_scope {
            Some(scope) => scope,
            None => return Err(self.internal(node, "imported module has no symbol table")),
        };

        // functions and variables are re-exported; type definitions stay
        // module-local
        let mut imported: Vec<(String, Symbol)> = Vec::new();
        for (name, symbol) in annotated.scopes.get(module_scope).all_symbols() {
            match symbol {
                Symbol::Functions(ids) => {
                    for &id in ids {
                        imported.push((name.clone(), Symbol::Functions(vec![id])));
                    }
                }
                Symbol::Variable(variable) => {
                    imported.push((name.clone(), Symbol::Variable(variable.clone())));
                }
                Symbol::Type(_) => {}
            }
        }

        let position = self.ast.position(node);
        for (name, symbol) in imported {
            self.add_symbol(&name, symbol, position)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // type declarations
    // ------------------------------------------------------------------

    fn on_def_struct(&mut self, node: NodeId, ctx: VisitContext) -> Result<(), CompileError> {
        let children = self.ast.children(node);
        let name_node = self.child(node, 0)?;
        let name = self.ast.text(name_node).to_string();
        if children.len() % 2 != 1 {
            return Err(self.internal(node, "malformed struct definition"));
        }

        // structs can refer to themselves through pointers, so the name is
        // registered as a placeholder before the members are checked
        let struct_type = self.session.types.declare_struct(&name);
        self.add_symbol(&name, Symbol::Type(struct_type), self.ast.position(name_node))?;

        let mut member_names: Vec<String> = Vec::new();
        let mut member_types: Vec<TypeId> = Vec::new();
        for pair in children[1..].chunks(2) {
            let member_name_node = pair[0];
            let member_type_node = pair[1];

            self.dispatch(member_type_node, ctx)?;
            let member_type = self.node_type(member_type_node)?;

            let member_name = self.ast.text(member_name_node).to_string();
            if member_names.contains(&member_name) {
                return Err(self.error(
                    ErrorImpl::DuplicateStructMember { name: member_name },
                    member_name_node,
                ));
            }
            member_names.push(member_name);
            member_types.push(member_type);
        }

        let members = member_names.into_iter().zip(member_types).collect();
        self.session.types.complete_struct(struct_type, members);
        self.set_type(node, struct_type);
        Ok(())
    }

    fn on_alias(&mut self, node: NodeId, ctx: VisitContext) -> Result<(), CompileError> {
        let name_node = self.child(node, 0)?;
        let type_name_node = self.child(node, 1)?;

        self.dispatch(type_name_node, ctx)?;
        let es_type = self.node_type(type_name_node)?;

        let name = self.ast.text(name_node).to_string();
        self.add_symbol(&name, Symbol::Type(es_type), self.ast.position(name_node))
    }

    fn on_typedef(&mut self, node: NodeId, ctx: VisitContext) -> Result<(), CompileError> {
        let name_node = self.child(node, 0)?;
        let type_name_node = self.child(node, 1)?;

        self.dispatch(type_name_node, ctx)?;
        let base = self.node_type(type_name_node)?;

        let name = self.ast.text(name_node).to_string();
        let es_type = self.session.types.derive_typedef(base, &name);
        self.add_symbol(&name, Symbol::Type(es_type), self.ast.position(name_node))
    }

    // ------------------------------------------------------------------
    // functions
    // ------------------------------------------------------------------

    fn unpack_def_func(&self, node: NodeId) -> Result<DefFuncParts, CompileError> {
        let children = self.ast.children(node);
        if !(4..=5).contains(&children.len())
            || self.ast.kind(children[0]) != NodeKind::DefFuncModifiers
            || self.ast.kind(children[1]) != NodeKind::Name
            || self.ast.kind(children[3]) != NodeKind::DefFuncArgs
        {
            return Err(self.internal(node, "malformed function definition"));
        }

        let modifier_nodes = self.ast.children(children[0]);
        if modifier_nodes.len() % 2 != 0 {
            return Err(self.internal(node, "malformed function modifiers"));
        }
        let modifiers = modifier_nodes
            .chunks(2)
            .map(|pair| (pair[0], pair[1]))
            .collect();

        let arg_nodes = self.ast.children(children[3]);
        if arg_nodes.len() % 2 != 0 {
            return Err(self.internal(node, "malformed function argument list"));
        }
        let params = arg_nodes.chunks(2).map(|pair| (pair[0], pair[1])).collect();

        Ok(DefFuncParts {
            modifiers,
            name: children[1],
            return_type_name: children[2],
            params,
            block: children.get(4).copied(),
        })
    }

    fn on_func_prototype(
        &mut self,
        node: NodeId,
        parts: DefFuncParts,
        ctx: VisitContext,
    ) -> Result<(), CompileError> {
        // create the type of the function
        self.dispatch(parts.return_type_name, ctx)?;
        let return_type = self.node_type(parts.return_type_name)?;

        let mut param_names = Vec::new();
        let mut param_types = Vec::new();
        for &(param_name, param_type_name) in &parts.params {
            param_names.push(self.ast.text(param_name).to_string());
            self.dispatch(param_type_name, ctx)?;
            param_types.push(self.node_type(param_type_name)?);
        }

        let function_type = self
            .session
            .types
            .create_function(&[return_type], &param_types);

        let mut linkage = Linkage::Default;
        let mut mangling = Mangling::Default;
        for &(key_node, value_node) in &parts.modifiers {
            let key = self.ast.text(key_node).to_string();
            let value = self.ast.text(value_node).to_string();
            if key == "linkage" {
                linkage = match Linkage::from_modifier(&value) {
                    Some(linkage) => linkage,
                    None => {
                        return Err(self
                            .error(ErrorImpl::InvalidModifierValue { key, value }, value_node));
                    }
                };
            } else if key == "mangling" {
                mangling = match Mangling::from_modifier(&value) {
                    Some(mangling) => mangling,
                    None => {
                        return Err(self
                            .error(ErrorImpl::InvalidModifierValue { key, value }, value_node));
                    }
                };
            } else {
                return Err(self.error(ErrorImpl::UnknownFunctionModifier { key }, key_node));
            }
        }

        let name = self.ast.text(parts.name).to_string();

        // overload sets are keyed by name; the full signature must stay
        // unique inside the set
        if let Some(existing) = self.find_functions_may_fail(&name) {
            for id in existing {
                let existing_type = self.session.functions.get(id).es_type;
                if self
                    .session
                    .types
                    .is_equivalent_to(existing_type, function_type, false)
                {
                    return Err(
                        self.error(ErrorImpl::DuplicateFunctionSignature { name }, parts.name)
                    );
                }
            }
        }

        let es_function = ESFunction::new(
            &name,
            &self.info.package_name,
            &self.info.module_name,
            function_type,
            param_names,
            mangling,
            linkage,
        );
        let func_id = self.session.functions.add(es_function);
        self.ast.node_mut(node).es_function = Some(func_id);
        self.set_type(node, function_type);

        if name == "ctor" || name == "dtor" {
            // module ctors / dtors must have the signature 'def Xtor() as void'
            let void = self.builtin_type("void");
            let expected = self.session.types.create_function(&[void], &[]);
            if !self
                .session
                .types
                .is_equivalent_to(function_type, expected, true)
            {
                return Err(self.error(ErrorImpl::InvalidXtorSignature, parts.name));
            }
            if name == "ctor" {
                self.info.ctors.push(func_id);
            } else {
                self.info.dtors.push(func_id);
            }
        }

        self.add_symbol(
            &name,
            Symbol::Functions(vec![func_id]),
            self.ast.position(parts.name),
        )
    }

    fn on_def_function(&mut self, node: NodeId, _ctx: VisitContext) -> Result<(), CompileError> {
        let parts = self.unpack_def_func(node)?;
        let block = match parts.block {
            // only a prototype: all work was done in the pre-pass
            None => return Ok(()),
            Some(block) => block,
        };
        let func_id = match self.ast.node(node).es_function {
            Some(func_id) => func_id,
            // the prototype pass already reported this function
            None => return Ok(()),
        };

        let function_type = self.session.functions.get(func_id).es_type;
        let param_types = self.session.types.function_parameter_types(function_type);

        self.push_scope(node);
        let mut result = Ok(());
        for (&(param_name_node, _), &param_type) in parts.params.iter().zip(param_types.iter()) {
            let param_name = self.ast.text(param_name_node).to_string();
            let variable = ESVariable::new(
                &param_name,
                &self.info.package_name,
                &self.info.module_name,
                param_type,
            );
            if let Err(compile_error) = self.add_symbol(
                &param_name,
                Symbol::Variable(variable),
                self.ast.position(param_name_node),
            ) {
                result = Err(compile_error);
                break;
            }
        }

        if result.is_ok() {
            let ctx = VisitContext {
                function: Some(func_id),
                in_loop: false,
            };
            result = self.dispatch(block, ctx);
        }
        self.pop_scope();
        result
    }

    // ------------------------------------------------------------------
    // statements
    // ------------------------------------------------------------------

    fn on_block(&mut self, node: NodeId, ctx: VisitContext) -> Result<(), CompileError> {
        self.push_scope(node);
        let mut result = Ok(());
        for child in self.ast.children(node) {
            if let Err(compile_error) = self.dispatch(child, ctx) {
                result = Err(compile_error);
                break;
            }
        }
        self.pop_scope();
        result
    }

    fn on_return(&mut self, node: NodeId, ctx: VisitContext) -> Result<(), CompileError> {
        let func_id = match ctx.function {
            Some(func_id) => func_id,
            None => return Err(self.fatal(ErrorImpl::ReturnOutsideFunction, node)),
        };

        let function_type = self.session.functions.get(func_id).es_type;
        let return_types = self.session.types.function_return_types(function_type);
        // the type system carries an arity, only single-value returns are
        // implemented so far
        let return_type = match return_types.first() {
            Some(&return_type) => return_type,
            None => return Err(self.internal(node, "function type without return type")),
        };

        let expressions = self.ast.children(node);

        if self.session.types.is_void(return_type) {
            if !expressions.is_empty() {
                return Err(self.error(ErrorImpl::VoidFunctionReturnsValue, node));
            }
            return Ok(());
        }

        if expressions.len() != 1 {
            return Err(self.error(
                ErrorImpl::ReturnArityMismatch {
                    expected: 1,
                    received: expressions.len(),
                },
                node,
            ));
        }

        let expression = expressions[0];
        self.dispatch(expression, ctx)?;
        let es_type = self.node_type(expression)?;
        if !self.equivalent(es_type, return_type) {
            self.insert_implicit_cast(expression, return_type, None)?;
        }
        Ok(())
    }

    fn on_assert(&mut self, node: NodeId, ctx: VisitContext) -> Result<(), CompileError> {
        let expression = self.child(node, 0)?;
        self.dispatch(expression, ctx)?;
        self.coerce_condition_to_bool(expression)
    }

    fn on_if(&mut self, node: NodeId, ctx: VisitContext) -> Result<(), CompileError> {
        let children = self.ast.children(node);
        let pairs = children.len() / 2;
        let else_block = if children.len() % 2 == 1 {
            children.last().copied()
        } else {
            None
        };

        for i in 0..pairs {
            self.dispatch(children[2 * i], ctx)?;
        }
        for i in 0..pairs {
            self.coerce_condition_to_bool(children[2 * i])?;
        }
        for i in 0..pairs {
            self.dispatch(children[2 * i + 1], ctx)?;
        }
        if let Some(else_block) = else_block {
            self.dispatch(else_block, ctx)?;
        }
        Ok(())
    }

    fn on_for(&mut self, node: NodeId, ctx: VisitContext) -> Result<(), CompileError> {
        let variable_name = self.child(node, 0)?;
        let range = self.child(node, 1)?;
        let block = self.child(node, 2)?;
        if self.ast.kind(range) != NodeKind::Range {
            return Err(self.internal(node, "for loop without range"));
        }

        let range_children = self.ast.children(range);
        let (start, stop, step) = match range_children.len() {
            1 => (None, range_children[0], None),
            2 => (Some(range_children[0]), range_children[1], None),
            3 => (
                Some(range_children[0]),
                range_children[1],
                Some(range_children[2]),
            ),
            _ => return Err(self.internal(range, "malformed range")),
        };

        // the loop introduces its own scope holding the induction variable
        self.push_scope(node);
        let result = self.on_for_inner(variable_name, start, stop, step, block, ctx);
        self.pop_scope();
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn on_for_inner(
        &mut self,
        variable_name: NodeId,
        start: Option<NodeId>,
        stop: NodeId,
        step: Option<NodeId>,
        block: NodeId,
        ctx: VisitContext,
    ) -> Result<(), CompileError> {
        for expression in [start, Some(stop), step].into_iter().flatten() {
            self.dispatch(expression, ctx)?;
        }

        let int32 = self.builtin_type("int32");
        let mut bad_node = None;
        for expression in [start, Some(stop), step].into_iter().flatten() {
            if !self.equivalent(self.node_type(expression)?, int32) {
                bad_node = Some(expression);
            }
        }
        if let Some(bad_node) = bad_node {
            return Err(self.error(ErrorImpl::NonIntRange, bad_node));
        }

        // reusing an outer loop variable is legal but type-constrained
        let name = self.ast.text(variable_name).to_string();
        match self.find_variable_may_fail(&name, variable_name)? {
            Some(variable) => {
                let es_type = variable.es_type(&mut self.session.types);
                if !self.equivalent(es_type, int32) {
                    return Err(
                        self.error(ErrorImpl::LoopVariableNotInt32 { name }, variable_name)
                    );
                }
            }
            None => {
                let variable = ESVariable::new(
                    &name,
                    &self.info.package_name,
                    &self.info.module_name,
                    int32,
                );
                self.add_symbol(
                    &name,
                    Symbol::Variable(variable),
                    self.ast.position(variable_name),
                )?;
            }
        }

        self.dispatch(block, VisitContext { in_loop: true, ..ctx })
    }

    fn on_while(&mut self, node: NodeId, ctx: VisitContext) -> Result<(), CompileError> {
        let expression = self.child(node, 0)?;
        let block = self.child(node, 1)?;

        self.dispatch(expression, ctx)?;
        self.coerce_condition_to_bool(expression)?;

        self.dispatch(block, VisitContext { in_loop: true, ..ctx })
    }

    fn on_break_or_continue(&mut self, node: NodeId, ctx: VisitContext) -> Result<(), CompileError> {
        if !ctx.in_loop {
            return Err(self.error(ErrorImpl::InvalidBreakOrContinue, node));
        }
        Ok(())
    }

    fn on_def_variable(&mut self, node: NodeId, ctx: VisitContext) -> Result<(), CompileError> {
        let variable_name = self.child(node, 0)?;
        let type_name = self.child(node, 1)?;

        self.dispatch(type_name, ctx)?;
        let es_type = self.node_type(type_name)?;

        let name = self.ast.text(variable_name).to_string();
        let variable = ESVariable::new(
            &name,
            &self.info.package_name,
            &self.info.module_name,
            es_type,
        );
        self.add_symbol(
            &name,
            Symbol::Variable(variable),
            self.ast.position(variable_name),
        )
    }

    fn on_assign(&mut self, node: NodeId, ctx: VisitContext) -> Result<(), CompileError> {
        let assignee = self.child(node, 0)?;
        let expression = self.child(node, 1)?;

        self.dispatch(expression, ctx)?;
        self.assign_to(assignee, expression, ctx)
    }

    /// List assignment evaluates and types all expressions before any name
    /// binds, so `a, b = b, a` checks with the pre-assignment types.
    fn on_list_assign(&mut self, node: NodeId, ctx: VisitContext) -> Result<(), CompileError> {
        let assignee_list = self.child(node, 0)?;
        let expression_list = self.child(node, 1)?;
        let assignees = self.ast.children(assignee_list);
        let expressions = self.ast.children(expression_list);

        if assignees.len() != expressions.len() {
            return Err(self.error(
                ErrorImpl::ListAssignArityMismatch {
                    assignees: assignees.len(),
                    expressions: expressions.len(),
                },
                node,
            ));
        }

        for &expression in &expressions {
            self.dispatch(expression, ctx)?;
        }
        for (&assignee, &expression) in assignees.iter().zip(expressions.iter()) {
            self.assign_to(assignee, expression, ctx)?;
        }
        Ok(())
    }

    fn assign_to(
        &mut self,
        assignee: NodeId,
        expression: NodeId,
        ctx: VisitContext,
    ) -> Result<(), CompileError> {
        let expression_type = self.node_type(expression)?;

        match self.ast.kind(assignee) {
            NodeKind::Variable => {
                let name_node = self.child(assignee, 0)?;
                let name = self.ast.text(name_node).to_string();

                match self.find_variable_may_fail(&name, name_node)? {
                    None => {
                        // assignment to an undeclared name declares it with
                        // the expression's type
                        let variable = ESVariable::new(
                            &name,
                            &self.info.package_name,
                            &self.info.module_name,
                            expression_type,
                        );
                        self.set_type(assignee, expression_type);
                        self.add_symbol(
                            &name,
                            Symbol::Variable(variable),
                            self.ast.position(name_node),
                        )?;
                    }
                    Some(variable) => {
                        let variable_type = variable.es_type(&mut self.session.types);
                        self.set_type(assignee, variable_type);
                        if !self.equivalent(variable_type, expression_type) {
                            self.insert_implicit_cast(expression, variable_type, None)?;
                        }
                    }
                }
                Ok(())
            }
            NodeKind::Dereference | NodeKind::MemberAccess => {
                self.dispatch(assignee, ctx)?;
                let target_type = self.node_type(assignee)?;
                if !self.equivalent(target_type, expression_type) {
                    self.insert_implicit_cast(expression, target_type, None)?;
                }
                Ok(())
            }
            _ => Err(self.error(ErrorImpl::InvalidAssignmentTarget, assignee)),
        }
    }

    // ------------------------------------------------------------------
    // literals
    // ------------------------------------------------------------------

    fn on_integer_constant(&mut self, node: NodeId) -> Result<(), CompileError> {
        let raw = self.ast.text(node).replace('_', "");

        // everything after the last (hex) digit is the suffix
        let mut suffix = String::new();
        for ch in raw.chars().rev() {
            if ch.to_ascii_lowercase().is_ascii_hexdigit() {
                break;
            }
            suffix.insert(0, ch);
        }
        let body = raw[..raw.len() - suffix.len()].to_lowercase();

        let parsed = if let Some(hex) = body.strip_prefix("0x") {
            u128::from_str_radix(hex, 16)
        } else if let Some(bin) = body.strip_prefix("0b") {
            u128::from_str_radix(bin, 2)
        } else if body.len() > 1 && body.starts_with('0') {
            u128::from_str_radix(&body[1..], 8)
        } else {
            body.parse::<u128>()
        };
        let value = match parsed {
            Ok(value) => value,
            Err(_) => {
                return Err(self.error(ErrorImpl::NumberParse { token: raw }, node));
            }
        };

        let (signed, width_suffix) = match suffix.strip_prefix('u') {
            Some(rest) => (false, rest.to_string()),
            None => (true, suffix),
        };

        let min_bits: u8 = if signed {
            if value <= i8::MAX as u128 {
                8
            } else if value <= i16::MAX as u128 {
                16
            } else if value <= i32::MAX as u128 {
                32
            } else if value <= i64::MAX as u128 {
                64
            } else {
                return Err(self.error(ErrorImpl::SignedConstantTooLarge, node));
            }
        } else if value < (1u128 << 8) {
            8
        } else if value < (1u128 << 16) {
            16
        } else if value < (1u128 << 32) {
            32
        } else if value <= u64::MAX as u128 {
            64
        } else {
            return Err(self.error(ErrorImpl::UnsignedConstantTooLarge, node));
        };

        // enforce a default type: unsuffixed constants promote to at least
        // 32 bits, suffixed ones must fit the requested width
        let bits: u8 = match width_suffix.as_str() {
            "" => min_bits.max(32),
            "hh" => {
                if min_bits > 8 {
                    return Err(self.error(ErrorImpl::ConstantOverflowsSuffix, node));
                }
                8
            }
            "h" => {
                if min_bits > 16 {
                    return Err(self.error(ErrorImpl::ConstantOverflowsSuffix, node));
                }
                16
            }
            "l" => 64,
            _ => {
                return Err(self.error(
                    ErrorImpl::UnknownIntegerSuffix {
                        suffix: width_suffix,
                    },
                    node,
                ));
            }
        };

        self.ast.node_mut(node).integer_attrs = Some(IntegerAttrs {
            signed,
            min_bits,
            bits,
        });

        let type_name = if signed {
            format!("int{}", bits)
        } else {
            format!("uint{}", bits)
        };
        let es_type = self.builtin_type(&type_name);
        self.set_type(node, es_type);
        Ok(())
    }

    fn on_float_constant(&mut self, node: NodeId) -> Result<(), CompileError> {
        let es_type = if self.ast.text(node).ends_with('f') {
            self.builtin_type("float32")
        } else {
            self.builtin_type("float64")
        };
        self.set_type(node, es_type);
        Ok(())
    }

    fn on_string_constant(&mut self, node: NodeId) -> Result<(), CompileError> {
        let text = self.ast.text(node).to_string();

        let quote = match text.find(|c| c == '"' || c == '\'') {
            Some(index) => index,
            None => return Err(self.error(ErrorImpl::UnsupportedStringPrefix, node)),
        };
        let prefix = &text[..quote];
        if quote != 2 || prefix != "ar" {
            return Err(self.error(ErrorImpl::UnsupportedStringPrefix, node));
        }

        for (index, ch) in text[quote..].chars().enumerate() {
            if !ch.is_ascii() {
                return Err(self.error(ErrorImpl::NonAsciiString { index }, node));
            }
        }

        let byte = self.builtin_type("byte");
        let es_type = self.session.types.derive_pointer(byte);
        self.set_type(node, es_type);
        Ok(())
    }

    fn on_boolean_constant(&mut self, node: NodeId) -> Result<(), CompileError> {
        let es_type = self.builtin_type("bool");
        self.set_type(node, es_type);
        Ok(())
    }

    fn on_none_constant(&mut self, node: NodeId) -> Result<(), CompileError> {
        let es_type = self.session.types.none_type();
        self.set_type(node, es_type);
        Ok(())
    }

    // ------------------------------------------------------------------
    // expressions
    // ------------------------------------------------------------------

    fn on_basic_operator(&mut self, node: NodeId, ctx: VisitContext) -> Result<(), CompileError> {
        let children = self.ast.children(node);
        let op = self.ast.kind(node);
        let arg1 = match children.first() {
            Some(&arg1) => arg1,
            None => return Err(self.internal(node, "operator without operands")),
        };
        let arg2 = children.get(1).copied();

        self.dispatch(arg1, ctx)?;
        if let Some(arg2) = arg2 {
            self.dispatch(arg2, ctx)?;
        }

        let bool_type = self.builtin_type("bool");

        match op {
            NodeKind::And | NodeKind::Or | NodeKind::Xor => {
                let arg2 =
                    arg2.ok_or_else(|| self.internal(node, "boolean operator needs 2 operands"))?;
                for arg in [arg1, arg2] {
                    if !self.equivalent(self.node_type(arg)?, bool_type) {
                        self.insert_implicit_cast(arg, bool_type, Some("bool"))?;
                    }
                }
                self.set_type(node, bool_type);
            }
            NodeKind::Not => {
                if !self.equivalent(self.node_type(arg1)?, bool_type) {
                    self.insert_implicit_cast(arg1, bool_type, Some("bool"))?;
                }
                self.set_type(node, bool_type);
            }
            NodeKind::Plus | NodeKind::Minus if arg2.is_none() => {
                // unary sign: passes the operand's type through
                let es_type = self.node_type(arg1)?;
                self.set_type(node, es_type);
            }
            NodeKind::Plus
            | NodeKind::Minus
            | NodeKind::Star
            | NodeKind::Slash
            | NodeKind::DoubleSlash
            | NodeKind::Percent => {
                let arg2 = arg2
                    .ok_or_else(|| self.internal(node, "arithmetic operator needs 2 operands"))?;
                if !self.equivalent(self.node_type(arg1)?, self.node_type(arg2)?) {
                    self.coerce_operands(arg1, arg2)?;
                }
                let es_type = self.node_type(arg1)?;
                self.set_type(node, es_type);
            }
            NodeKind::DoubleStar => {
                // lowered to powi: the base must be floating point, the
                // exponent int32
                let arg2 =
                    arg2.ok_or_else(|| self.internal(node, "power operator needs 2 operands"))?;
                let int32 = self.builtin_type("int32");
                let float32 = self.builtin_type("float32");
                let float64 = self.builtin_type("float64");

                if !self.equivalent(self.node_type(arg2)?, int32) {
                    self.insert_implicit_cast(arg2, int32, Some("int32"))?;
                }
                if !self.session.types.is_floating_point(self.node_type(arg1)?) {
                    self.insert_implicit_cast(arg1, float64, Some("float64"))?;
                }

                let base_type = self.node_type(arg1)?;
                if self.equivalent(base_type, float32) {
                    self.set_type(node, float32);
                } else {
                    self.set_type(node, float64);
                }
            }
            comparison if comparison.is_comparison() => {
                let arg2 =
                    arg2.ok_or_else(|| self.internal(node, "comparison needs 2 operands"))?;
                if !self.equivalent(self.node_type(arg1)?, self.node_type(arg2)?) {
                    self.coerce_operands(arg1, arg2)?;
                }
                self.set_type(node, bool_type);
            }
            _ => return Err(self.internal(node, "operator not implemented")),
        }
        Ok(())
    }

    fn on_call_func(&mut self, node: NodeId, ctx: VisitContext) -> Result<(), CompileError> {
        let children = self.ast.children(node);
        let callee_name_node = match children.first() {
            Some(&callee) => callee,
            None => return Err(self.internal(node, "call without callee")),
        };
        let expressions: Vec<NodeId> = children[1..].to_vec();

        for &expression in &expressions {
            self.dispatch(expression, ctx)?;
        }

        let name = self.ast.text(callee_name_node).to_string();

        // the callee is either a function or a variable holding a function
        // pointer; the pointer case synthesizes a one-candidate overload set
        let mut candidates = match self.find_functions_may_fail(&name) {
            Some(ids) => ids,
            None => {
                let variable = match self.find_variable_may_fail(&name, callee_name_node)? {
                    Some(variable) => variable,
                    None => {
                        return Err(
                            self.error(ErrorImpl::NoSuchFunction { name }, callee_name_node)
                        );
                    }
                };
                let variable_type = variable.es_type(&mut self.session.types);
                let pointee = self.session.types.dereference(variable_type);
                let function_type = match pointee {
                    Some(pointee) if self.session.types.is_function(pointee) => pointee,
                    _ => {
                        return Err(
                            self.error(ErrorImpl::NotAFunctionPointer { name }, callee_name_node)
                        );
                    }
                };
                let num_params = self
                    .session
                    .types
                    .function_parameter_types(function_type)
                    .len();
                let param_names = (0..num_params).map(|i| format!("_{}", i)).collect();
                let synthesized = ESFunction::new(
                    "__funcptr",
                    "__funcptr",
                    "__funcptr",
                    function_type,
                    param_names,
                    Mangling::Default,
                    Linkage::Default,
                );
                vec![self.session.functions.add(synthesized)]
            }
        };

        // overload resolution: arity filter first
        candidates.retain(|&id| {
            let function_type = self.session.functions.get(id).es_type;
            self.session
                .types
                .function_parameter_types(function_type)
                .len()
                == expressions.len()
        });
        if candidates.is_empty() {
            return Err(self.error(ErrorImpl::NoMatchingArity { name }, callee_name_node));
        }

        let argument_types: Vec<TypeId> = expressions
            .iter()
            .map(|&expression| self.node_type(expression))
            .collect::<Result<_, _>>()?;

        // a perfect match needs no implicit conversions and wins outright
        let exact = candidates.iter().copied().find(|&id| {
            let function_type = self.session.functions.get(id).es_type;
            self.session
                .types
                .function_parameter_types(function_type)
                .iter()
                .zip(argument_types.iter())
                .all(|(&param, &arg)| self.session.types.is_equivalent_to(param, arg, false))
        });

        let callee = match exact {
            Some(callee) => callee,
            None => {
                // sort out candidates where at least one argument has no
                // implicit conversion to the parameter type
                let good: Vec<FuncId> = candidates
                    .iter()
                    .copied()
                    .filter(|&id| {
                        let function_type = self.session.functions.get(id).es_type;
                        self.session
                            .types
                            .function_parameter_types(function_type)
                            .iter()
                            .zip(expressions.iter())
                            .all(|(&param, &expression)| {
                                self.can_convert_expression(expression, param)
                            })
                    })
                    .collect();

                if good.is_empty() {
                    return Err(self.error(ErrorImpl::NoMatchingOverload { name }, callee_name_node));
                }
                if good.len() > 1 {
                    let candidates = good
                        .iter()
                        .map(|&id| self.session.functions.get(id).describe(&self.session.types))
                        .collect::<Vec<_>>()
                        .join("\n");
                    return Err(self.error(
                        ErrorImpl::AmbiguousCall { name, candidates },
                        callee_name_node,
                    ));
                }
                good[0]
            }
        };

        // convert the arguments to the parameter types
        let param_types = {
            let function_type = self.session.functions.get(callee).es_type;
            self.session.types.function_parameter_types(function_type)
        };
        for (&param, &expression) in param_types.iter().zip(expressions.iter()) {
            let argument_type = self.node_type(expression)?;
            if !self.equivalent(param, argument_type) {
                self.insert_implicit_cast(expression, param, None)?;
            }
        }

        let return_types = {
            let function_type = self.session.functions.get(callee).es_type;
            self.session.types.function_return_types(function_type)
        };
        let return_type = match return_types.first() {
            Some(&return_type) => return_type,
            None => return Err(self.internal(node, "function type without return type")),
        };
        self.set_type(node, return_type);
        self.ast.node_mut(node).es_function = Some(callee);
        Ok(())
    }

    fn on_variable(&mut self, node: NodeId) -> Result<(), CompileError> {
        let name_node = self.child(node, 0)?;
        let name = self.ast.text(name_node).to_string();

        // a function name used as a value takes the function's address
        if let Some(functions) = self.find_functions_may_fail(&name) {
            if functions.len() > 1 {
                return Err(self.error(ErrorImpl::AddressOfOverloadedFunction, name_node));
            }
            let function_type = self.session.functions.get(functions[0]).es_type;
            let es_type = self.session.types.derive_pointer(function_type);
            self.set_type(node, es_type);
            return Ok(());
        }

        let variable = self.find_variable(&name, name_node)?;
        let es_type = variable.es_type(&mut self.session.types);
        self.set_type(node, es_type);
        Ok(())
    }

    // ------------------------------------------------------------------
    // type expressions and casts
    // ------------------------------------------------------------------

    fn on_cast(&mut self, node: NodeId, ctx: VisitContext) -> Result<(), CompileError> {
        let expression = self.child(node, 0)?;
        let type_name = self.child(node, 1)?;

        self.dispatch(expression, ctx)?;
        self.dispatch(type_name, ctx)?;

        let source = self.node_type(expression)?;
        let target = self.node_type(type_name)?;

        // explicit casts may narrow and reinterpret where implicit ones can
        // not, but the categories must still line up
        if !can_explicitly_cast(&self.session.types, source, target) {
            return Err(self.error(
                ErrorImpl::InvalidExplicitCast {
                    from: self.describe(source),
                    to: self.describe(target),
                },
                node,
            ));
        }

        self.set_type(node, target);
        Ok(())
    }

    fn on_type_name(&mut self, node: NodeId) -> Result<(), CompileError> {
        let children = self.ast.children(node);
        let base_name_node = self.child(node, 0)?;
        let name = self.ast.text(base_name_node).to_string();
        let base = self.find_type_by_name(&name, base_name_node)?;

        if children.len() == 1 {
            if self.session.types.is_incomplete_struct(base) {
                // a struct holding itself by value would be infinite
                return Err(self.error(ErrorImpl::SelfReferentialStruct, node));
            }
            self.set_type(node, base);
            return Ok(());
        }

        let mut es_type = if self.session.types.is_incomplete_struct(base) {
            self.session.types.create_self_pointer()
        } else {
            base
        };

        for &suffix in &children[1..] {
            match self.ast.kind(suffix) {
                NodeKind::Star => {
                    es_type = self.session.types.derive_pointer(es_type);
                }
                NodeKind::DoubleStar => {
                    es_type = self.session.types.derive_pointer(es_type);
                    es_type = self.session.types.derive_pointer(es_type);
                }
                _ => return Err(self.error(ErrorImpl::UnsupportedTypeConstructor, suffix)),
            }
        }

        self.set_type(node, es_type);
        Ok(())
    }

    fn on_function_type_name(&mut self, node: NodeId, ctx: VisitContext) -> Result<(), CompileError> {
        let children = self.ast.children(node);
        if children.is_empty() {
            return Err(self.internal(node, "malformed function type"));
        }

        let mut types = Vec::with_capacity(children.len());
        for &child in &children {
            self.dispatch(child, ctx)?;
            types.push(self.node_type(child)?);
        }

        // the return type is written last; the value is a function pointer
        let (&return_type, param_types) = match types.split_last() {
            Some(split) => split,
            None => return Err(self.internal(node, "malformed function type")),
        };
        let function_type = self
            .session
            .types
            .create_function(&[return_type], param_types);
        let es_type = self.session.types.derive_pointer(function_type);
        self.set_type(node, es_type);
        Ok(())
    }

    // ------------------------------------------------------------------
    // pointers, members, allocation
    // ------------------------------------------------------------------

    fn on_dereference(&mut self, node: NodeId, ctx: VisitContext) -> Result<(), CompileError> {
        let expression = self.child(node, 0)?;
        let index = self.ast.children(node).get(1).copied();

        self.dispatch(expression, ctx)?;
        let es_type = self.node_type(expression)?;

        if let Some(pointee) = self.session.types.dereference(es_type) {
            if let Some(index) = index {
                self.dispatch(index, ctx)?;
            }
            self.set_type(node, pointee);
            return Ok(());
        }

        if self.session.types.is_struct(es_type) {
            let index = match index {
                Some(index) => index,
                None => return Err(self.internal(node, "struct access without member")),
            };
            if self.ast.kind(index) != NodeKind::Name {
                return Err(self.error(
                    ErrorImpl::Unsupported {
                        feature: "computed struct member access".to_string(),
                    },
                    index,
                ));
            }
            let member = self.ast.text(index).to_string();
            return match self.session.types.struct_member_type_by_name(es_type, &member) {
                Some(member_type) => {
                    self.set_type(node, member_type);
                    Ok(())
                }
                None => Err(self.error(ErrorImpl::NoSuchMember { name: member }, index)),
            };
        }

        Err(self.error(
            ErrorImpl::CannotDereference {
                found: self.describe(es_type),
            },
            expression,
        ))
    }

    fn on_member_access(&mut self, node: NodeId, ctx: VisitContext) -> Result<(), CompileError> {
        let expression = self.child(node, 0)?;
        let member_name_node = self.child(node, 1)?;

        self.dispatch(expression, ctx)?;
        let es_type = self.node_type(expression)?;

        if !self.session.types.is_struct(es_type) {
            return Err(self.error(
                ErrorImpl::NotAStruct {
                    found: self.describe(es_type),
                },
                expression,
            ));
        }

        let member = self.ast.text(member_name_node).to_string();
        match self.session.types.struct_member_type_by_name(es_type, &member) {
            Some(member_type) => {
                self.set_type(node, member_type);
                Ok(())
            }
            None => Err(self.error(ErrorImpl::NoSuchMember { name: member }, member_name_node)),
        }
    }

    fn on_address_of(&mut self, node: NodeId, ctx: VisitContext) -> Result<(), CompileError> {
        let expression = self.child(node, 0)?;
        self.dispatch(expression, ctx)?;
        let es_type = self.node_type(expression)?;
        let es_type = self.session.types.derive_pointer(es_type);
        self.set_type(node, es_type);
        Ok(())
    }

    fn on_new(&mut self, node: NodeId, ctx: VisitContext) -> Result<(), CompileError> {
        let type_name = self.child(node, 0)?;
        let count = self.ast.children(node).get(1).copied();

        self.dispatch(type_name, ctx)?;
        let es_type = self.node_type(type_name)?;
        let es_type = self.session.types.derive_pointer(es_type);
        self.set_type(node, es_type);

        if let Some(count) = count {
            self.dispatch(count, ctx)?;
        }
        Ok(())
    }
}
