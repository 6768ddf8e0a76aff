//! The ES type representation and the type system rules.
//!
//! - `estype`: the arena-backed ESType DAG (elementary, pointer, struct,
//!   function, typedef, const/invariant qualifiers, self pointers) with its
//!   construction and equivalence operations
//! - `rules`: the static implicit-conversion lattice and the explicit-cast
//!   legality check

pub mod estype;
pub mod rules;
