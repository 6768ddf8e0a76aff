use crate::types::estype::TypeId;

use super::function::FuncId;
use super::symbol_table::{Symbol, SymbolTable};
use super::variable::ESVariable;

/// Handle to one scope's symbol table inside a [`ScopeArena`].
///
/// Nodes that introduce a scope record their handle so the tables outlive
/// the walk and remain available to the code generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u32);

impl ScopeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Owns every symbol table created while annotating one module.
#[derive(Debug, Default)]
pub struct ScopeArena {
    scopes: Vec<SymbolTable>,
}

impl ScopeArena {
    pub fn new() -> Self {
        ScopeArena::default()
    }

    pub fn add(&mut self) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(SymbolTable::new());
        id
    }

    pub fn get(&self, id: ScopeId) -> &SymbolTable {
        &self.scopes[id.index()]
    }

    pub fn get_mut(&mut self, id: ScopeId) -> &mut SymbolTable {
        &mut self.scopes[id.index()]
    }
}

/// Result of resolving a name through a scope chain.
#[derive(Debug, Clone)]
pub enum ResolvedSymbol {
    Type(TypeId),
    Variable(ESVariable),
    Functions(Vec<FuncId>),
}

/// Resolves `name` through the chain of open scopes, innermost first.
///
/// Function bindings from several scopes concatenate into one overload
/// set; the first non-function binding ends the search and is returned as
/// found, so a variable or type hides any outer overload set of the same
/// name.
pub fn resolve_in_chain(
    scopes: &ScopeArena,
    chain: &[ScopeId],
    name: &str,
) -> Option<ResolvedSymbol> {
    let mut functions: Vec<FuncId> = Vec::new();

    for &scope in chain.iter().rev() {
        match scopes.get(scope).find_symbol(name) {
            Some(Symbol::Functions(ids)) => functions.extend(ids.iter().copied()),
            Some(Symbol::Type(ty)) => return Some(ResolvedSymbol::Type(*ty)),
            Some(Symbol::Variable(var)) => return Some(ResolvedSymbol::Variable(var.clone())),
            None => continue,
        }
    }

    if functions.is_empty() {
        None
    } else {
        Some(ResolvedSymbol::Functions(functions))
    }
}
