//! Maps a resolved type to the schema shape it is built as.
use crate::host::{Intrinsic, LiteralValue, PrimitiveKind, TupleMember, TypeHost, TypeId, TypeKind};

#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Primitive(PrimitiveKind),
    Enum,
    /// Nominal object type; goes through the registry.
    Interface,
    /// Anonymous object type; inlined wherever it appears.
    InlineObject,
    Array(TypeId),
    Tuple(Vec<TupleMember>),
    Union(Vec<TypeId>),
    Intersection(Vec<TypeId>),
    Alias,
    Unsupported(String),
}

impl Shape {
    pub fn is_nominal(&self) -> bool {
        matches!(self, Shape::Enum | Shape::Interface)
    }
}

pub fn classify<'p, H: TypeHost<'p> + ?Sized>(host: &H, ty: TypeId) -> Shape {
    match host.kind(ty) {
        TypeKind::Primitive(kind) => Shape::Primitive(kind),
        TypeKind::Enum(_) => Shape::Enum,
        TypeKind::Interface { .. } => Shape::Interface,
        TypeKind::ObjectLiteral { .. } => Shape::InlineObject,
        TypeKind::Alias { .. } => Shape::Alias,
        TypeKind::Array(elem) => Shape::Array(elem),
        TypeKind::Tuple(members) => Shape::Tuple(members),
        TypeKind::Union(branches) => Shape::Union(branches),
        TypeKind::Intersection(parts) => Shape::Intersection(parts),
        TypeKind::Literal(value) => Shape::Unsupported(match value {
            LiteralValue::Str(_) => "string literal types are not supported".into(),
            LiteralValue::Num(_) => "numeric literal types are not supported".into(),
            LiteralValue::Bool(_) => "boolean literal types are not supported".into(),
        }),
        TypeKind::Intrinsic(Intrinsic::Any) | TypeKind::Intrinsic(Intrinsic::Unknown) => {
            Shape::Unsupported("cannot validate against an unconstrained type".into())
        }
        TypeKind::Intrinsic(kind) => Shape::Unsupported(format!("'{}' is not supported", kind.name())),
        TypeKind::Function { .. } => Shape::Unsupported("function types are not supported".into()),
        TypeKind::TypeParam(name) => Shape::Unsupported(format!("type parameter '{name}' is not resolved")),
        TypeKind::Opaque(_) => Shape::Unsupported("this kind of type is not supported".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::host::{Checker, Program};

    fn shape_of(source: &str, name: &str) -> Shape {
        let program = Program::from_sources(vec![("src/a.ts", source.to_string())], &Config::default());
        let mut checker = Checker::new(&program);
        let ty = checker.named_type(0, name).unwrap();
        let target = checker.alias_target(ty).unwrap();
        classify(&checker, target)
    }

    #[test]
    fn nominal_and_structural_shapes() {
        let src = "interface I { a: string }\nenum E { A }\ntype A = I;\ntype B = E;\ntype C = { a: number };\ntype D = I[];";
        assert_eq!(shape_of(src, "A"), Shape::Interface);
        assert_eq!(shape_of(src, "B"), Shape::Enum);
        assert_eq!(shape_of(src, "C"), Shape::InlineObject);
        assert!(matches!(shape_of(src, "D"), Shape::Array(_)));
        assert!(Shape::Enum.is_nominal());
        assert!(!Shape::InlineObject.is_nominal());
    }

    #[test]
    fn unsupported_shapes_carry_a_reason() {
        let src = "type A = 'x';\ntype B = any;\ntype C = () => void;\ntype D = null;";
        for name in ["A", "B", "C", "D"] {
            assert!(matches!(shape_of(src, name), Shape::Unsupported(_)), "{name}");
        }
    }
}
