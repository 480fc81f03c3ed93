//! Interned structural types.
use indexmap::IndexSet;
use ordered_float::OrderedFloat;

use crate::syntax::NodeId;

pub type FileId = usize;

/// Handle into a [`TypeArena`]. Two handles are equal iff the types are the
/// same identity: same declaration and same type arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A top-level declaration, or an object type literal node, in some file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeclRef {
    pub file: FileId,
    pub node: NodeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    String,
    Number,
    Boolean,
}

impl PrimitiveKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    Any,
    Unknown,
    Never,
    Void,
    Null,
    Undefined,
    Object,
    BigInt,
    Symbol,
}

impl Intrinsic {
    pub fn name(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Unknown => "unknown",
            Self::Never => "never",
            Self::Void => "void",
            Self::Null => "null",
            Self::Undefined => "undefined",
            Self::Object => "object",
            Self::BigInt => "bigint",
            Self::Symbol => "symbol",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LiteralValue {
    Str(String),
    Num(OrderedFloat<f64>),
    Bool(bool),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TupleMember {
    pub ty: TypeId,
    pub optional: bool,
    pub rest: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FnTypeParam {
    pub name: String,
    pub default: Option<TypeId>,
}

/// Type parameter bindings in effect where an object type literal was written.
pub type Subst = Vec<(String, TypeId)>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Primitive(PrimitiveKind),
    Intrinsic(Intrinsic),
    Literal(LiteralValue),
    Enum(DeclRef),
    Interface { decl: DeclRef, args: Vec<TypeId> },
    /// Resolved lazily; the target is not part of the identity.
    Alias { decl: DeclRef, args: Vec<TypeId> },
    ObjectLiteral { decl: DeclRef, subst: Subst },
    Array(TypeId),
    Tuple(Vec<TupleMember>),
    Union(Vec<TypeId>),
    Intersection(Vec<TypeId>),
    Function { type_params: Vec<FnTypeParam>, ret: Option<TypeId> },
    TypeParam(String),
    /// Type syntax the checker does not model; carries the source text.
    Opaque(String),
}

#[derive(Debug, Default)]
pub struct TypeArena {
    kinds: IndexSet<TypeKind>,
}

impl TypeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, kind: TypeKind) -> TypeId {
        let (index, _) = self.kinds.insert_full(kind);
        TypeId(index as u32)
    }

    pub fn kind(&self, id: TypeId) -> &TypeKind {
        &self.kinds[id.index()]
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_structural() {
        let mut arena = TypeArena::new();
        let num = arena.intern(TypeKind::Primitive(PrimitiveKind::Number));
        let decl = DeclRef { file: 0, node: 3 };
        let a = arena.intern(TypeKind::Interface { decl, args: vec![num] });
        let b = arena.intern(TypeKind::Interface { decl, args: vec![num] });
        let str_ = arena.intern(TypeKind::Primitive(PrimitiveKind::String));
        let c = arena.intern(TypeKind::Interface { decl, args: vec![str_] });
        assert_eq!(a, b);
        assert_ne!(a, c, "each instantiation is its own identity");
        assert_eq!(arena.len(), 4);
    }
}
