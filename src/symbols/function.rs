use crate::types::estype::{TypeId, TypeStore};

use super::variable::{Linkage, Mangling};

/// Handle into the session-wide [`FunctionArena`].
///
/// Call sites and definitions carry this handle as their resolved-function
/// annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(u32);

impl FuncId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A named callable. Several ESFunctions may share a name (an overload
/// set); the full signature distinguishes them.
#[derive(Debug, Clone)]
pub struct ESFunction {
    pub name: String,
    pub package: String,
    pub module: String,
    pub es_type: TypeId,
    pub parameter_names: Vec<String>,
    pub mangling: Mangling,
    pub linkage: Linkage,
}

impl ESFunction {
    pub fn new(
        name: &str,
        package: &str,
        module: &str,
        es_type: TypeId,
        parameter_names: Vec<String>,
        mangling: Mangling,
        linkage: Linkage,
    ) -> Self {
        ESFunction {
            name: name.to_string(),
            package: package.to_string(),
            module: module.to_string(),
            es_type,
            parameter_names,
            mangling,
            linkage,
        }
    }

    pub fn mangled_name(&self, store: &TypeStore) -> String {
        match self.mangling {
            Mangling::C => self.name.clone(),
            Mangling::Default => format!(
                "__ESF_{}{}{}{}__{}{}_{}",
                self.package.len(),
                self.package,
                self.module.len(),
                self.module,
                self.name.len(),
                self.name,
                store.mangle(self.es_type)
            ),
        }
    }

    /// Rendering used by "ambiguous call" diagnostics.
    pub fn describe(&self, store: &TypeStore) -> String {
        format!(
            "{} ({}, {}): {}; linkage={:?} mangling={:?}",
            self.name,
            self.package,
            self.module,
            store.describe(self.es_type),
            self.linkage,
            self.mangling
        )
    }
}

/// Arena owning every function created during a compilation session.
///
/// Shared session-wide so imported overload sets stay valid in the
/// importing module.
#[derive(Debug, Default)]
pub struct FunctionArena {
    functions: Vec<ESFunction>,
}

impl FunctionArena {
    pub fn new() -> Self {
        FunctionArena::default()
    }

    pub fn add(&mut self, function: ESFunction) -> FuncId {
        let id = FuncId(self.functions.len() as u32);
        self.functions.push(function);
        id
    }

    pub fn get(&self, id: FuncId) -> &ESFunction {
        &self.functions[id.index()]
    }
}
