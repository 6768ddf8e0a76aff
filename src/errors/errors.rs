use std::fmt::Display;

use thiserror::Error;

use crate::Position;

/// How far an error unwinds.
///
/// A recoverable error aborts only the top-level statement (or pre-pass
/// step) that raised it; the module passes log it and continue with the next
/// item. A fatal error stops processing of the current module immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Recoverable,
    Fatal,
}

/// A single diagnostic raised during annotation.
#[derive(Debug, Clone)]
pub struct CompileError {
    internal_error: ErrorImpl,
    severity: Severity,
    position: Position,
    context: Option<String>,
}

impl CompileError {
    pub fn recoverable(error_impl: ErrorImpl, position: Position) -> Self {
        CompileError {
            internal_error: error_impl,
            severity: Severity::Recoverable,
            position,
            context: None,
        }
    }

    pub fn fatal(error_impl: ErrorImpl, position: Position) -> Self {
        CompileError {
            internal_error: error_impl,
            severity: Severity::Fatal,
            position,
            context: None,
        }
    }

    /// Attaches rendered source context (numbered lines plus caret marker).
    pub fn with_context(mut self, context: String) -> Self {
        if !context.is_empty() {
            self.context = Some(context);
        }
        self
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }

    pub fn get_position(&self) -> &Position {
        &self.position
    }

    pub fn error(&self) -> &ErrorImpl {
        &self.internal_error
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    pub fn get_error_name(&self) -> &str {
        match &self.internal_error {
            ErrorImpl::UndefinedSymbol { .. } => "UndefinedSymbol",
            ErrorImpl::SymbolKindMismatch { .. } => "SymbolKindMismatch",
            ErrorImpl::SymbolAlreadyDefined { .. } => "SymbolAlreadyDefined",
            ErrorImpl::DuplicateFunctionSignature { .. } => "DuplicateFunctionSignature",
            ErrorImpl::OperandsNotCoercible { .. } => "OperandsNotCoercible",
            ErrorImpl::NoImplicitCast { .. } => "NoImplicitCast",
            ErrorImpl::InvalidExplicitCast { .. } => "InvalidExplicitCast",
            ErrorImpl::NumberParse { .. } => "NumberParse",
            ErrorImpl::SignedConstantTooLarge => "SignedConstantTooLarge",
            ErrorImpl::UnsignedConstantTooLarge => "UnsignedConstantTooLarge",
            ErrorImpl::ConstantOverflowsSuffix => "ConstantOverflowsSuffix",
            ErrorImpl::UnknownIntegerSuffix { .. } => "UnknownIntegerSuffix",
            ErrorImpl::UnsupportedStringPrefix => "UnsupportedStringPrefix",
            ErrorImpl::NonAsciiString { .. } => "NonAsciiString",
            ErrorImpl::UnknownFunctionModifier { .. } => "UnknownFunctionModifier",
            ErrorImpl::InvalidModifierValue { .. } => "InvalidModifierValue",
            ErrorImpl::InvalidXtorSignature => "InvalidXtorSignature",
            ErrorImpl::NoSuchFunction { .. } => "NoSuchFunction",
            ErrorImpl::NotAFunctionPointer { .. } => "NotAFunctionPointer",
            ErrorImpl::NoMatchingArity { .. } => "NoMatchingArity",
            ErrorImpl::NoMatchingOverload { .. } => "NoMatchingOverload",
            ErrorImpl::AmbiguousCall { .. } => "AmbiguousCall",
            ErrorImpl::AddressOfOverloadedFunction => "AddressOfOverloadedFunction",
            ErrorImpl::ConditionNotBoolean { .. } => "ConditionNotBoolean",
            ErrorImpl::InvalidBreakOrContinue => "InvalidBreakOrContinue",
            ErrorImpl::ReturnOutsideFunction => "ReturnOutsideFunction",
            ErrorImpl::VoidFunctionReturnsValue => "VoidFunctionReturnsValue",
            ErrorImpl::ReturnArityMismatch { .. } => "ReturnArityMismatch",
            ErrorImpl::NonIntRange => "NonIntRange",
            ErrorImpl::LoopVariableNotInt32 { .. } => "LoopVariableNotInt32",
            ErrorImpl::SelfReferentialStruct => "SelfReferentialStruct",
            ErrorImpl::DuplicateStructMember { .. } => "DuplicateStructMember",
            ErrorImpl::UnsupportedTypeConstructor => "UnsupportedTypeConstructor",
            ErrorImpl::NoSuchMember { .. } => "NoSuchMember",
            ErrorImpl::NotAStruct { .. } => "NotAStruct",
            ErrorImpl::CannotDereference { .. } => "CannotDereference",
            ErrorImpl::InvalidAssignmentTarget => "InvalidAssignmentTarget",
            ErrorImpl::ListAssignArityMismatch { .. } => "ListAssignArityMismatch",
            ErrorImpl::ModuleNotFound { .. } => "ModuleNotFound",
            ErrorImpl::ImportCycle { .. } => "ImportCycle",
            ErrorImpl::ModuleContainsErrors { .. } => "ModuleContainsErrors",
            ErrorImpl::InvalidModuleName { .. } => "InvalidModuleName",
            ErrorImpl::NotAModule => "NotAModule",
            ErrorImpl::Unsupported { .. } => "Unsupported",
            ErrorImpl::ErrorsOccurred { .. } => "ErrorsOccurred",
            ErrorImpl::Internal { .. } => "Internal",
        }
    }
}

impl Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.internal_error)
    }
}

impl std::error::Error for CompileError {}

#[derive(Error, Debug, Clone)]
pub enum ErrorImpl {
    #[error("could not find symbol: {name:?}")]
    UndefinedSymbol { name: String },
    #[error("symbol did not match expected kind: {name:?} is not a {expected}")]
    SymbolKindMismatch { name: String, expected: &'static str },
    #[error("symbol already defined: {name:?}")]
    SymbolAlreadyDefined { name: String },
    #[error("function {name:?} is already defined with an identical signature")]
    DuplicateFunctionSignature { name: String },
    #[error("operands can not be coerced: lhs: {lhs}; rhs: {rhs}")]
    OperandsNotCoercible { lhs: String, rhs: String },
    #[error("no implicit cast to {to} available")]
    NoImplicitCast { to: String },
    #[error("no cast from {from} to {to} available")]
    InvalidExplicitCast { from: String, to: String },
    #[error("error parsing number: {token:?}")]
    NumberParse { token: String },
    #[error("constant can not be represented by an int64")]
    SignedConstantTooLarge,
    #[error("constant can not be represented by an uint64")]
    UnsignedConstantTooLarge,
    #[error("constant can not be represented in the requested type")]
    ConstantOverflowsSuffix,
    #[error("unknown integer suffix: {suffix:?}")]
    UnknownIntegerSuffix { suffix: String },
    #[error("the only supported strings are ASCII raw strings with prefix 'ar'")]
    UnsupportedStringPrefix,
    #[error("string contains non ASCII character at index {index}")]
    NonAsciiString { index: usize },
    #[error("unknown function modifier: {key:?}")]
    UnknownFunctionModifier { key: String },
    #[error("invalid value for function modifier {key:?}: {value:?}")]
    InvalidModifierValue { key: String, value: String },
    #[error("a module ctor / dtor must have the type 'def Xtor() as void'")]
    InvalidXtorSignature,
    #[error("no function with this name found: {name:?}")]
    NoSuchFunction { name: String },
    #[error("not a function pointer: {name:?}")]
    NotAFunctionPointer { name: String },
    #[error("no function with the right number of arguments found: {name:?}")]
    NoMatchingArity { name: String },
    #[error("no function with matching arguments found: {name:?}")]
    NoMatchingOverload { name: String },
    #[error("function call is ambiguous: {name:?}\nmatches:\n{candidates}")]
    AmbiguousCall { name: String, candidates: String },
    #[error("taking the address of an overloaded function is not implemented, yet")]
    AddressOfOverloadedFunction,
    #[error("expression is of incompatible type. expected bool, found {found}")]
    ConditionNotBoolean { found: String },
    #[error("may only be used inside for, while and similar constructs")]
    InvalidBreakOrContinue,
    #[error("a 'return' statement must be inside a function body")]
    ReturnOutsideFunction,
    #[error("function is declared as void: can't return anything")]
    VoidFunctionReturnsValue,
    #[error("expected {expected} return expression(s), found {received}")]
    ReturnArityMismatch { expected: usize, received: usize },
    #[error("range expressions are currently only implemented for int32")]
    NonIntRange,
    #[error("loop variable {name:?} must be of type int32 until support for other types is implemented")]
    LoopVariableNotInt32 { name: String },
    #[error("structs can not contain themself. Use a pointer")]
    SelfReferentialStruct,
    #[error("struct member name already used: {name:?}")]
    DuplicateStructMember { name: String },
    #[error("type constructors are not supported")]
    UnsupportedTypeConstructor,
    #[error("struct has no member named {name:?}")]
    NoSuchMember { name: String },
    #[error("expected a struct type, found {found}")]
    NotAStruct { found: String },
    #[error("can only dereference pointers, found {found}")]
    CannotDereference { found: String },
    #[error("invalid assignment target")]
    InvalidAssignmentTarget,
    #[error("assignment count mismatch: {assignees} assignee(s), {expressions} expression(s)")]
    ListAssignArityMismatch { assignees: usize, expressions: usize },
    #[error("can not find module: file does not exist: {path}")]
    ModuleNotFound { path: String },
    #[error("module caused infinite recursion. Remove any circular imports to fix this problem: {path}")]
    ImportCycle { path: String },
    #[error("module contains errors: {path}")]
    ModuleContainsErrors { path: String },
    #[error("invalid module name: {name:?}. Module filenames should begin with an alpha character or underscore, otherwise it's not possible to import them. To disable this error set a valid module name using the 'module' statement")]
    InvalidModuleName { name: String },
    #[error("expected a module root node")]
    NotAModule,
    #[error("not supported: {feature}")]
    Unsupported { feature: String },
    #[error("errors occurred during compilation: aborting ({count} error(s))")]
    ErrorsOccurred { count: usize },
    #[error("internal error: {message}")]
    Internal { message: String },
}
