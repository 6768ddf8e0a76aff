use std::collections::HashMap;

use crate::errors::errors::ErrorImpl;
use crate::types::estype::TypeId;

use super::function::FuncId;
use super::variable::ESVariable;

/// A binding in a symbol table: a type, a variable, or a non-empty overload
/// set of functions.
#[derive(Debug, Clone)]
pub enum Symbol {
    Type(TypeId),
    Variable(ESVariable),
    Functions(Vec<FuncId>),
}

impl Symbol {
    pub fn is_functions(&self) -> bool {
        matches!(self, Symbol::Functions(_))
    }
}

/// Maps names to symbols within one scope; aliases map names to names and
/// are resolved transitively before lookup.
///
/// A name may be rebound only when both the previous and the new binding
/// are functions: the overload set accumulates. Any other redefinition is
/// rejected.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: HashMap<String, Symbol>,
    aliases: HashMap<String, String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    /// Resolves aliases, then returns the name the symbol is stored under,
    /// if any.
    pub fn find_base_name<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        let mut name = name;
        while let Some(target) = self.aliases.get(name) {
            name = target.as_str();
        }
        if self.symbols.contains_key(name) {
            Some(name)
        } else {
            None
        }
    }

    pub fn find_symbol(&self, name: &str) -> Option<&Symbol> {
        let base = self.find_base_name(name)?;
        self.symbols.get(base)
    }

    pub fn add_symbol(&mut self, name: &str, symbol: Symbol) -> Result<(), ErrorImpl> {
        match symbol {
            Symbol::Functions(ids) => {
                match self.find_base_name(name).map(str::to_string) {
                    Some(base) => match self.symbols.get_mut(&base) {
                        Some(Symbol::Functions(existing)) => existing.extend(ids),
                        _ => {
                            return Err(ErrorImpl::SymbolAlreadyDefined {
                                name: name.to_string(),
                            })
                        }
                    },
                    None => {
                        self.symbols.insert(name.to_string(), Symbol::Functions(ids));
                    }
                }
                Ok(())
            }
            other => {
                if self.find_base_name(name).is_some() {
                    return Err(ErrorImpl::SymbolAlreadyDefined {
                        name: name.to_string(),
                    });
                }
                self.symbols.insert(name.to_string(), other);
                Ok(())
            }
        }
    }

    pub fn add_alias(&mut self, old_name: &str, new_name: &str) -> Result<(), ErrorImpl> {
        if !self.symbols.contains_key(old_name) && !self.aliases.contains_key(old_name) {
            return Err(ErrorImpl::UndefinedSymbol {
                name: old_name.to_string(),
            });
        }
        if self.find_base_name(new_name).is_some() {
            return Err(ErrorImpl::SymbolAlreadyDefined {
                name: new_name.to_string(),
            });
        }
        self.aliases.insert(new_name.to_string(), old_name.to_string());
        Ok(())
    }

    pub fn all_symbols(&self) -> impl Iterator<Item = (&String, &Symbol)> {
        self.symbols.iter()
    }
}
