//! The static conversion rules of the type system.
//!
//! The implicit-conversion table is a fixed widening lattice: conversions
//! never lose integer precision (no narrowing without an explicit cast),
//! every numeric type converts to bool, and integers widen into the
//! floating point types.

use std::collections::HashMap;

use lazy_static::lazy_static;

use super::estype::{TypeId, TypeKind, TypeStore};

lazy_static! {
    /// elementary source type -> elementary targets it implicitly converts to.
    ///
    /// float32 has 23 bits mantissa, float64 has 53: converting a wide
    /// integer in can lose low bits, but the result is nearly always used
    /// as a floating point number, so the conversion stays implicit.
    static ref IMPLICIT_CONVERSIONS: HashMap<&'static str, Vec<&'static str>> = {
        let mut m = HashMap::new();
        m.insert("bool", vec!["int8", "int16", "int32", "int64"]);
        m.insert("int8", vec!["bool", "int16", "int32", "int64", "float32", "float64"]);
        m.insert("int16", vec!["bool", "int32", "int64", "float32", "float64"]);
        m.insert("int32", vec!["bool", "int64", "float32", "float64"]);
        m.insert("int64", vec!["bool", "float32", "float64"]);
        m.insert("uint8", vec!["bool", "uint16", "uint32", "uint64", "float32", "float64"]);
        m.insert("uint16", vec!["bool", "uint32", "uint64", "float32", "float64"]);
        m.insert("uint32", vec!["bool", "uint64", "float32", "float64"]);
        m.insert("uint64", vec!["bool", "float32", "float64"]);
        m.insert("float32", vec!["bool", "float64"]);
        m.insert("float64", vec!["bool"]);
        m
    };
}

fn is_void_pointer(store: &TypeStore, id: TypeId) -> bool {
    let t = store.get(id);
    match t.kind() {
        TypeKind::Pointer => store.is_void(t.parents()[0]),
        _ => false,
    }
}

/// Whether `from` converts to `to` without an explicit cast.
///
/// Holds for equivalent types, for any pointer to `void*`, for the `none`
/// literal type to any pointer, and along the static widening table. The
/// table is keyed on direct elementary payloads: a typedef like `byte`
/// deliberately takes part in no implicit conversions.
pub fn can_implicitly_cast(store: &TypeStore, from: TypeId, to: TypeId) -> bool {
    // obviously, if the types are equal we could cast
    if store.is_equivalent_to(from, to, false) {
        return true;
    }

    // any pointer can be implicitly cast to void*
    if store.is_pointer(from) && is_void_pointer(store, to) {
        return true;
    }

    // none can be implicitly cast to any pointer type
    if store.is_pointer(to) && store.is_none(from) {
        return true;
    }

    // check default implicit conversion rules
    let from_name = match store.get(from).kind() {
        TypeKind::Elementary(name) => name.as_str(),
        _ => return false,
    };
    let to_name = match store.get(to).kind() {
        TypeKind::Elementary(name) => name.as_str(),
        _ => return false,
    };

    IMPLICIT_CONVERSIONS
        .get(from_name)
        .map(|targets| targets.contains(&to_name))
        .unwrap_or(false)
}

/// Whether an explicit cast from `from` to `to` is accepted.
///
/// Mirrors the category checks of the lowering stage: everything the
/// implicit rules allow, plus value-preserving or truncating conversions
/// between the elementary categories, plus pointer reinterpretation.
pub fn can_explicitly_cast(store: &TypeStore, from: TypeId, to: TypeId) -> bool {
    if can_implicitly_cast(store, from, to) {
        return true;
    }

    // may be really the same or only structurally
    if store.is_equivalent_to(from, to, true) {
        return true;
    }

    if store.is_boolean(to) {
        return store.is_signed_integer(from)
            || store.is_unsigned_integer(from)
            || store.is_floating_point(from);
    }
    if store.is_signed_integer(to) {
        return store.is_boolean(from)
            || store.is_signed_integer(from)
            || store.is_floating_point(from);
    }
    if store.is_unsigned_integer(to) {
        return store.is_unsigned_integer(from) || store.is_signed_integer(from);
    }
    if store.is_floating_point(to) {
        return store.is_signed_integer(from) || store.is_unsigned_integer(from);
    }
    if store.is_pointer(to) && !store.is_none(to) {
        return store.is_pointer(from);
    }

    false
}
