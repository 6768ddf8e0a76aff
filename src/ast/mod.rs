//! AST (Abstract Syntax Tree) module.
//!
//! Defines the tree shape produced by the external parser and consumed by
//! the type annotator: arena-stored nodes carrying a kind tag, a lexeme,
//! ordered children and a source position, plus the annotation slots the
//! type checker fills in.

pub mod tree;
