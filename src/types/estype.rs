use std::collections::HashMap;

/// Handle into the [`TypeStore`] arena.
///
/// Types are compared with [`TypeStore::is_equivalent_to`], never through
/// handle equality: distinct handles may describe equivalent types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(u32);

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The tagged payload of a type node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    Elementary(String),
    Pointer,
    Struct {
        name: String,
        member_names: Vec<String>,
    },
    Function {
        num_returns: usize,
    },
    Typedef(String),
    Const,
    Invariant,
    /// Placeholder for a recursive reference inside the struct currently
    /// under construction; rewritten to a real pointer-to-self when the
    /// members are queried.
    SelfPointer,
}

/// One node of the type DAG: a payload plus zero or more operand types.
///
/// Represents types of data, not variables. Never constructed directly;
/// use the factory operations on [`TypeStore`].
#[derive(Debug, Clone)]
pub struct ESType {
    parents: Vec<TypeId>,
    kind: TypeKind,
}

impl ESType {
    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    pub fn parents(&self) -> &[TypeId] {
        &self.parents
    }
}

/// Arena owning every type created during a compilation session.
///
/// Elementary types are seeded once at construction and shared by every
/// module; all derivation operations append new nodes and return handles.
/// The only in-place mutation is [`TypeStore::complete_struct`], which
/// patches the placeholder registered by [`TypeStore::declare_struct`].
#[derive(Debug)]
pub struct TypeStore {
    types: Vec<ESType>,
    elementary: Vec<(String, TypeId)>,
    elementary_by_name: HashMap<String, TypeId>,
    none_type: TypeId,
}

impl TypeStore {
    pub fn new() -> Self {
        let mut store = TypeStore {
            types: Vec::new(),
            elementary: Vec::new(),
            elementary_by_name: HashMap::new(),
            none_type: TypeId(0),
        };

        for bits in [8u32, 16, 32, 64] {
            store.seed_elementary(&format!("int{}", bits));
            store.seed_elementary(&format!("uint{}", bits));
        }
        store.seed_elementary("bool");
        store.seed_elementary("void");
        store.seed_elementary("float32");
        store.seed_elementary("float64");

        // derived names: byte breaks structural equivalence on purpose,
        // word / sword are plain aliases of the pointer-sized integers
        let uint8 = store.elementary_by_name["uint8"];
        let byte = store.derive_typedef(uint8, "byte");
        store.register_elementary("byte", byte);
        let word = store.elementary_by_name["uint64"];
        store.register_elementary("word", word);
        let sword = store.elementary_by_name["int64"];
        store.register_elementary("sword", sword);

        // the type of the 'none' literal; internal, never exposed as a
        // named symbol
        store.none_type = store.add(ESType {
            parents: vec![],
            kind: TypeKind::Elementary("none".to_string()),
        });

        store
    }

    fn seed_elementary(&mut self, name: &str) {
        let id = self.add(ESType {
            parents: vec![],
            kind: TypeKind::Elementary(name.to_string()),
        });
        self.register_elementary(name, id);
    }

    fn register_elementary(&mut self, name: &str, id: TypeId) {
        self.elementary.push((name.to_string(), id));
        self.elementary_by_name.insert(name.to_string(), id);
    }

    fn add(&mut self, t: ESType) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(t);
        id
    }

    pub fn get(&self, id: TypeId) -> &ESType {
        &self.types[id.index()]
    }

    /// All named elementary types (including `byte`, `word`, `sword`),
    /// in seeding order. Module symbol tables are initialised from this.
    pub fn elementary_types(&self) -> &[(String, TypeId)] {
        &self.elementary
    }

    pub fn lookup_elementary(&self, name: &str) -> Option<TypeId> {
        self.elementary_by_name.get(name).copied()
    }

    /// The internal type of the `none` literal.
    pub fn none_type(&self) -> TypeId {
        self.none_type
    }

    pub fn derive_pointer(&mut self, base: TypeId) -> TypeId {
        self.add(ESType {
            parents: vec![base],
            kind: TypeKind::Pointer,
        })
    }

    /// The pointee of a pointer type, or `None` if `id` is not a
    /// dereferencable pointer (the `none` literal type has no pointee).
    pub fn dereference(&self, id: TypeId) -> Option<TypeId> {
        let t = self.get(self.skip_typedefs(id));
        match t.kind {
            TypeKind::Pointer => Some(t.parents[0]),
            _ => None,
        }
    }

    /// Removes unnecessary const nodes on construction:
    /// `const(const(X)) = const(X)`, `const(invariant(X)) = invariant(X)`.
    pub fn derive_const(&mut self, base: TypeId) -> TypeId {
        match self.get(base).kind {
            TypeKind::Const | TypeKind::Invariant => base,
            _ => self.add(ESType {
                parents: vec![base],
                kind: TypeKind::Const,
            }),
        }
    }

    /// Everything referenced by an invariant is also invariant.
    ///
    /// `invariant(invariant(X)) = invariant(X)`, and both qualifier
    /// compositions collapse to the invariant one:
    /// `invariant(const(X)) = invariant(X)`.
    pub fn derive_invariant(&mut self, base: TypeId) -> TypeId {
        let base = match self.get(base).kind {
            TypeKind::Const => self.get(base).parents[0],
            _ => base,
        };
        match self.get(base).kind {
            TypeKind::Invariant => base,
            _ => self.add(ESType {
                parents: vec![base],
                kind: TypeKind::Invariant,
            }),
        }
    }

    /// Typedefs break structural equivalence.
    pub fn derive_typedef(&mut self, base: TypeId, name: &str) -> TypeId {
        self.add(ESType {
            parents: vec![base],
            kind: TypeKind::Typedef(name.to_string()),
        })
    }

    /// First phase of struct construction: a named, memberless placeholder
    /// that recursive member references can resolve.
    pub fn declare_struct(&mut self, name: &str) -> TypeId {
        self.add(ESType {
            parents: vec![],
            kind: TypeKind::Struct {
                name: name.to_string(),
                member_names: vec![],
            },
        })
    }

    /// Second phase: patches the placeholder with the final member list.
    pub fn complete_struct(&mut self, id: TypeId, members: Vec<(String, TypeId)>) {
        let name = match &self.get(id).kind {
            TypeKind::Struct { name, .. } => name.clone(),
            _ => return,
        };
        let (member_names, member_types): (Vec<String>, Vec<TypeId>) = members.into_iter().unzip();
        self.types[id.index()] = ESType {
            parents: member_types,
            kind: TypeKind::Struct { name, member_names },
        };
    }

    /// A fresh struct type in one step; used where no self reference is
    /// possible (tests, synthesized types).
    pub fn create_struct(&mut self, name: &str, members: Vec<(String, TypeId)>) -> TypeId {
        let id = self.declare_struct(name);
        self.complete_struct(id, members);
        id
    }

    /// A function type: the return types followed by the parameter types.
    /// At least one return type is required; void functions return `void`.
    pub fn create_function(&mut self, return_types: &[TypeId], param_types: &[TypeId]) -> TypeId {
        debug_assert!(!return_types.is_empty());
        let mut parents = Vec::with_capacity(return_types.len() + param_types.len());
        parents.extend_from_slice(return_types);
        parents.extend_from_slice(param_types);
        self.add(ESType {
            parents,
            kind: TypeKind::Function {
                num_returns: return_types.len(),
            },
        })
    }

    /// Only valid inside the member list of a struct under construction.
    pub fn create_self_pointer(&mut self) -> TypeId {
        self.add(ESType {
            parents: vec![],
            kind: TypeKind::SelfPointer,
        })
    }

    fn skip_typedefs(&self, id: TypeId) -> TypeId {
        let mut t = id;
        while let TypeKind::Typedef(_) = self.get(t).kind {
            t = self.get(t).parents[0];
        }
        t
    }

    /// The equivalence predicate. With `structural` set, typedef chains on
    /// both sides are unwrapped first and struct names are ignored; without
    /// it, payloads must match exactly. Operands are compared pairwise with
    /// the same flag; differing operand counts are never equivalent.
    pub fn is_equivalent_to(&self, a: TypeId, b: TypeId, structural: bool) -> bool {
        let (t1, t2) = if structural {
            (self.skip_typedefs(a), self.skip_typedefs(b))
        } else {
            (a, b)
        };

        let n1 = self.get(t1);
        let n2 = self.get(t2);

        let both_structs = matches!(n1.kind, TypeKind::Struct { .. })
            && matches!(n2.kind, TypeKind::Struct { .. });
        if !(structural && both_structs) && n1.kind != n2.kind {
            return false;
        }

        if n1.parents.len() != n2.parents.len() {
            return false;
        }

        n1.parents
            .iter()
            .zip(n2.parents.iter())
            .all(|(&p1, &p2)| self.is_equivalent_to(p1, p2, structural))
    }

    pub fn is_function(&self, id: TypeId) -> bool {
        matches!(
            self.get(self.skip_typedefs(id)).kind,
            TypeKind::Function { .. }
        )
    }

    /// Pointer-ness as the conversion rules see it: the `none` literal
    /// type counts as a pointer.
    pub fn is_pointer(&self, id: TypeId) -> bool {
        let t = self.get(self.skip_typedefs(id));
        match &t.kind {
            TypeKind::Pointer => true,
            TypeKind::Elementary(name) => name == "none",
            _ => false,
        }
    }

    pub fn is_struct(&self, id: TypeId) -> bool {
        matches!(
            self.get(self.skip_typedefs(id)).kind,
            TypeKind::Struct { .. }
        )
    }

    /// True for a struct placeholder whose members have not been patched in
    /// yet; such a type may only be referenced behind a pointer.
    pub fn is_incomplete_struct(&self, id: TypeId) -> bool {
        let t = self.get(self.skip_typedefs(id));
        matches!(t.kind, TypeKind::Struct { .. }) && t.parents.is_empty()
    }

    pub fn is_self_pointer(&self, id: TypeId) -> bool {
        let mut t = id;
        while let TypeKind::Pointer = self.get(t).kind {
            t = self.get(t).parents[0];
        }
        matches!(self.get(t).kind, TypeKind::SelfPointer)
    }

    fn is_elementary_named(&self, id: TypeId, name: &str) -> bool {
        match &self.get(self.skip_typedefs(id)).kind {
            TypeKind::Elementary(n) => n == name,
            _ => false,
        }
    }

    pub fn is_boolean(&self, id: TypeId) -> bool {
        self.is_elementary_named(id, "bool")
    }

    pub fn is_void(&self, id: TypeId) -> bool {
        self.is_elementary_named(id, "void")
    }

    pub fn is_none(&self, id: TypeId) -> bool {
        matches!(&self.get(id).kind, TypeKind::Elementary(n) if n == "none")
    }

    pub fn is_signed_integer(&self, id: TypeId) -> bool {
        match &self.get(self.skip_typedefs(id)).kind {
            TypeKind::Elementary(n) => matches!(n.as_str(), "int8" | "int16" | "int32" | "int64"),
            _ => false,
        }
    }

    pub fn is_unsigned_integer(&self, id: TypeId) -> bool {
        match &self.get(self.skip_typedefs(id)).kind {
            TypeKind::Elementary(n) => {
                matches!(n.as_str(), "uint8" | "uint16" | "uint32" | "uint64")
            }
            _ => false,
        }
    }

    pub fn is_floating_point(&self, id: TypeId) -> bool {
        match &self.get(self.skip_typedefs(id)).kind {
            TypeKind::Elementary(n) => matches!(n.as_str(), "float32" | "float64"),
            _ => false,
        }
    }

    pub fn function_return_types(&self, id: TypeId) -> Vec<TypeId> {
        let t = self.get(self.skip_typedefs(id));
        match t.kind {
            TypeKind::Function { num_returns } => t.parents[..num_returns].to_vec(),
            _ => vec![],
        }
    }

    pub fn function_parameter_types(&self, id: TypeId) -> Vec<TypeId> {
        let t = self.get(self.skip_typedefs(id));
        match t.kind {
            TypeKind::Function { num_returns } => t.parents[num_returns..].to_vec(),
            _ => vec![],
        }
    }

    /// The struct's members with every self-pointer operand rewritten to a
    /// real (possibly multiply-indirected) pointer to the struct itself.
    pub fn struct_members(&mut self, id: TypeId) -> Vec<(String, TypeId)> {
        let resolved = self.skip_typedefs(id);
        let (member_names, member_types) = match &self.get(resolved).kind {
            TypeKind::Struct { member_names, .. } => {
                (member_names.clone(), self.get(resolved).parents.to_vec())
            }
            _ => return vec![],
        };

        let mut members = Vec::with_capacity(member_types.len());
        for (name, member) in member_names.into_iter().zip(member_types) {
            let member = if self.is_self_pointer(member) {
                let mut rewritten = resolved;
                let mut p = member;
                while let TypeKind::Pointer = self.get(p).kind {
                    rewritten = self.derive_pointer(rewritten);
                    p = self.get(p).parents[0];
                }
                rewritten
            } else {
                member
            };
            members.push((name, member));
        }
        members
    }

    pub fn struct_member_index_by_name(&self, id: TypeId, name: &str) -> Option<usize> {
        match &self.get(self.skip_typedefs(id)).kind {
            TypeKind::Struct { member_names, .. } => member_names.iter().position(|m| m == name),
            _ => None,
        }
    }

    pub fn struct_member_type_by_name(&mut self, id: TypeId, name: &str) -> Option<TypeId> {
        let idx = self.struct_member_index_by_name(id, name)?;
        Some(self.struct_members(id)[idx].1)
    }

    /// Default name mangling for a type, used when building the mangled
    /// names of functions and globals. Const and invariant qualifiers do not
    /// change a symbol's machine-level type and are mangled transparently.
    pub fn mangle(&self, id: TypeId) -> String {
        let t = self.get(id);
        match &t.kind {
            TypeKind::Elementary(name) => name.clone(),
            TypeKind::Function { num_returns } => {
                let mut s = Vec::new();
                for &ret in &t.parents[..*num_returns] {
                    s.push(format!("R{}", self.mangle(ret)));
                }
                for &param in &t.parents[*num_returns..] {
                    s.push(format!("A{}", self.mangle(param)));
                }
                s.join("_")
            }
            TypeKind::Pointer => format!("P{}", self.mangle(t.parents[0])),
            TypeKind::Struct { name, .. } => format!("S{}{}", name.len(), name),
            TypeKind::Typedef(name) => format!("T{}{}", name.len(), name),
            TypeKind::Const | TypeKind::Invariant => self.mangle(t.parents[0]),
            TypeKind::SelfPointer => "Z".to_string(),
        }
    }

    /// Human-readable rendering for diagnostics.
    pub fn describe(&self, id: TypeId) -> String {
        let t = self.get(id);
        match &t.kind {
            TypeKind::Elementary(name) => name.clone(),
            TypeKind::Pointer => format!("{}*", self.describe(t.parents[0])),
            TypeKind::Const => format!("const {}", self.describe(t.parents[0])),
            TypeKind::Invariant => format!("invariant {}", self.describe(t.parents[0])),
            TypeKind::Typedef(name) => name.clone(),
            TypeKind::SelfPointer => "<self>".to_string(),
            TypeKind::Struct { name, .. } => format!("struct {}", name),
            TypeKind::Function { num_returns } => {
                let params: Vec<String> = t.parents[*num_returns..]
                    .iter()
                    .map(|&p| self.describe(p))
                    .collect();
                let rets: Vec<String> = t.parents[..*num_returns]
                    .iter()
                    .map(|&r| self.describe(r))
                    .collect();
                format!("({}) as {}", params.join(", "), rets.join(", "))
            }
        }
    }
}

impl Default for TypeStore {
    fn default() -> Self {
        TypeStore::new()
    }
}
