//! Type-checker services over a loaded [`Program`].
//!
//! The schema builder and the call locator only ever see types through the
//! [`TypeHost`] trait; [`Checker`] is the implementation backed by the
//! in-tree syntax front end.
pub mod checker;
pub mod program;
pub mod scope;
pub mod types;

pub use checker::Checker;
pub use program::{normalize, prelude_source, relative_path, LoadError, Program, SourceFile};
pub use scope::{LocalScope, LocalValue};
pub use types::{
    DeclRef, FileId, FnTypeParam, Intrinsic, LiteralValue, PrimitiveKind, TupleMember, TypeArena, TypeId, TypeKind,
};

use crate::syntax::{Expr, TypeNode};

// ————————————————————————————————————————————————————————————————————————————
// ERRORS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("Cannot find name '{0}'")]
    UnresolvedName(String),
    #[error("Cannot find module '{0}'")]
    UnresolvedModule(String),
    #[error("Module '{module}' has no exported member '{name}'")]
    MissingExport { module: String, name: String },
    #[error("'{0}' only refers to a value, but is being used as a type here")]
    NotAType(String),
    #[error("Generic type '{name}' requires {expected} type argument(s), but {got} were given")]
    Arity { name: String, expected: usize, got: usize },
    #[error("Type '{0}' recursively references itself as a base type")]
    CircularBase(String),
    #[error("Type '{0}' has no object members")]
    NotAnObject(String),
    #[error("Type '{0}' is not an enum")]
    NotAnEnum(String),
}

// ————————————————————————————————————————————————————————————————————————————
// QUERY RESULTS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Property,
    Method,
    /// Index signatures and computed keys.
    Index,
    Call,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub name: String,
    pub optional: bool,
    pub kind: MemberKind,
    pub ty: TypeId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnumInit {
    Absent,
    Str(String),
    Num(f64),
    /// Any other initializer, as source text.
    Other(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumMemberInfo {
    pub name: String,
    pub init: EnumInit,
}

/// What an assignment target name refers to.
#[derive(Debug, Clone, Copy)]
pub enum VarLookup<'p> {
    Annotated(&'p TypeNode),
    Unannotated,
    /// Bound, but not to a variable declared in this file.
    NotAVariable,
    Unresolved,
}

/// The questions the schema builder and the call locator ask about types.
///
/// `'p` is the lifetime of the parsed program; annotations handed back by
/// the host borrow from it.
pub trait TypeHost<'p> {
    fn kind(&self, ty: TypeId) -> TypeKind;

    /// Human-readable name, used for definition naming and error messages.
    fn display(&self, ty: TypeId) -> String;

    /// One step of alias expansion. Non-alias types are returned unchanged.
    fn alias_target(&mut self, ty: TypeId) -> Result<TypeId, HostError>;

    /// Members of an interface, object literal, or an alias of either, with
    /// inherited members first and own members overriding by name.
    fn members(&mut self, ty: TypeId) -> Result<Vec<Member>, HostError>;

    fn enum_members(&self, ty: TypeId) -> Result<Vec<EnumMemberInfo>, HostError>;

    fn resolve_annotation(
        &mut self,
        file: FileId,
        node: &'p TypeNode,
        scope: &LocalScope<'p>,
    ) -> Result<TypeId, HostError>;

    /// Best-effort static type of an expression; `None` when unknown.
    fn type_of_expr(&mut self, file: FileId, expr: &'p Expr, scope: &LocalScope<'p>) -> Option<TypeId>;

    /// Static type of a module-level value binding, imports included.
    fn binding_type(&mut self, file: FileId, name: &str) -> Option<TypeId>;

    fn variable_annotation(&mut self, file: FileId, name: &str, scope: &LocalScope<'p>) -> VarLookup<'p>;
}
