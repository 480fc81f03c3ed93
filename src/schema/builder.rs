//! Recursive type → schema conversion over a [`TypeHost`].
use crate::host::{EnumInit, HostError, MemberKind, TypeHost, TypeId, TypeKind};

use super::classify::{classify, Shape};
use super::node::{EnumValue, Property, SchemaNode};
use super::registry::{EntryState, SchemaRegistry};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error(transparent)]
    Host(#[from] HostError),
    #[error("Type '{ty}' cannot be validated: {reason}")]
    Unsupported { ty: String, reason: String },
    #[error("Enum '{name}': cannot have automatically indexed member '{member}' after a string member")]
    EnumAutoIncrement { name: String, member: String },
    #[error("Enum '{name}': initializer of member '{member}' must be a string or number literal, found `{init}`")]
    EnumInitializer { name: String, member: String, init: String },
    #[error("In member '{member}' of '{ty}': {source}")]
    Member { ty: String, member: String, source: Box<SchemaError> },
}

pub struct SchemaBuilder<'a, H: ?Sized> {
    host: &'a mut H,
    registry: &'a mut SchemaRegistry,
    /// Aliases currently being expanded, innermost last.
    unwrapping: Vec<TypeId>,
}

impl<'a, 'p, H: TypeHost<'p> + ?Sized> SchemaBuilder<'a, H> {
    pub fn new(host: &'a mut H, registry: &'a mut SchemaRegistry) -> Self {
        Self { host, registry, unwrapping: Vec::new() }
    }

    /// Nominal types come back as [`SchemaNode::Ref`]; everything else inline.
    pub fn build(&mut self, ty: TypeId) -> Result<SchemaNode, SchemaError> {
        match classify(&*self.host, ty) {
            Shape::Primitive(kind) => Ok(SchemaNode::Primitive(kind)),
            Shape::Enum | Shape::Interface => self.nominal(ty),
            Shape::InlineObject => self.object(ty),
            Shape::Array(element) => Ok(SchemaNode::Array(Box::new(self.build(element)?))),
            Shape::Tuple(members) => {
                let mut elements = Vec::with_capacity(members.len());
                let mut required = 0;
                let mut rest = None;
                for member in members {
                    if member.rest {
                        rest = Some(Box::new(self.rest_element(member.ty)?));
                        continue;
                    }
                    if !member.optional && required == elements.len() {
                        required += 1;
                    }
                    elements.push(self.build(member.ty)?);
                }
                Ok(SchemaNode::Tuple { elements, required, rest })
            }
            Shape::Union(branches) => Ok(SchemaNode::Union(self.build_all(&branches)?)),
            Shape::Intersection(parts) => Ok(SchemaNode::Intersection(self.build_all(&parts)?)),
            Shape::Alias => self.alias(ty),
            Shape::Unsupported(reason) => Err(SchemaError::Unsupported { ty: self.host.display(ty), reason }),
        }
    }

    fn build_all(&mut self, tys: &[TypeId]) -> Result<Vec<SchemaNode>, SchemaError> {
        tys.iter().map(|ty| self.build(*ty)).collect()
    }

    /// Lookup, else reserve an id before building the body so that
    /// self-references resolve to it.
    fn nominal(&mut self, ty: TypeId) -> Result<SchemaNode, SchemaError> {
        if let Some(entry) = self.registry.lookup(ty) {
            return match &entry.state {
                EntryState::Failed(err) => Err(err.clone()),
                EntryState::Reserved | EntryState::Built(_) => Ok(SchemaNode::Ref(entry.id)),
            };
        }
        let display = self.host.display(ty);
        let id = self.registry.reserve(ty, &display);
        let body = match self.host.kind(ty) {
            TypeKind::Enum(_) => self.enumeration(ty),
            TypeKind::Alias { .. } => self.host.alias_target(ty).map_err(SchemaError::from).and_then(|t| self.build(t)),
            _ => self.object(ty),
        };
        match body {
            Ok(node) => {
                self.registry.complete(ty, node);
                Ok(SchemaNode::Ref(id))
            }
            Err(err) => {
                self.registry.fail(ty, err.clone());
                Err(err)
            }
        }
    }

    /// Aliases are transparent, except that an alias of an object literal is
    /// nominal and an alias met again while expanding becomes a definition.
    fn alias(&mut self, ty: TypeId) -> Result<SchemaNode, SchemaError> {
        if self.registry.lookup(ty).is_some() || self.unwrapping.contains(&ty) {
            return self.nominal(ty);
        }
        let target = self.host.alias_target(ty)?;
        if matches!(self.host.kind(target), TypeKind::ObjectLiteral { .. }) {
            return self.nominal(ty);
        }
        self.unwrapping.push(ty);
        let result = self.build(target);
        self.unwrapping.pop();
        let node = result?;
        match self.registry.lookup(ty) {
            Some(entry) => Ok(SchemaNode::Ref(entry.id)),
            None => Ok(node),
        }
    }

    fn object(&mut self, ty: TypeId) -> Result<SchemaNode, SchemaError> {
        let members = self.host.members(ty)?;
        let mut properties = Vec::with_capacity(members.len());
        for member in members {
            let reason = match member.kind {
                MemberKind::Property => None,
                MemberKind::Method => Some("methods cannot be validated"),
                MemberKind::Index => Some("index signatures and computed keys are not supported"),
                MemberKind::Call => Some("call signatures cannot be validated"),
            };
            let schema = match reason {
                Some(reason) => Err(SchemaError::Unsupported { ty: member.name.clone(), reason: reason.into() }),
                None => self.build(member.ty),
            };
            let schema = schema.map_err(|source| SchemaError::Member {
                ty: self.host.display(ty),
                member: member.name.clone(),
                source: Box::new(source),
            })?;
            properties.push(Property { name: member.name, required: !member.optional, schema });
        }
        Ok(SchemaNode::Interface(properties))
    }

    /// String members reset the counter; numeric members set it.
    fn enumeration(&mut self, ty: TypeId) -> Result<SchemaNode, SchemaError> {
        let name = self.host.display(ty);
        let mut counter = Some(0.0_f64);
        let mut values = Vec::new();
        for member in self.host.enum_members(ty)? {
            let value = match member.init {
                EnumInit::Str(s) => {
                    counter = None;
                    EnumValue::Str(s)
                }
                EnumInit::Num(n) => {
                    counter = Some(n);
                    EnumValue::Num(n)
                }
                EnumInit::Absent => match counter {
                    Some(n) => EnumValue::Num(n),
                    None => return Err(SchemaError::EnumAutoIncrement { name, member: member.name }),
                },
                EnumInit::Other(init) => {
                    return Err(SchemaError::EnumInitializer { name, member: member.name, init });
                }
            };
            if let Some(n) = counter.as_mut() {
                *n += 1.0;
            }
            values.push(value);
        }
        Ok(SchemaNode::OneOf(values))
    }

    fn rest_element(&mut self, ty: TypeId) -> Result<SchemaNode, SchemaError> {
        let ty = self.host.alias_target(ty)?;
        match self.host.kind(ty) {
            TypeKind::Array(element) => self.build(element),
            _ => Err(SchemaError::Unsupported {
                ty: self.host.display(ty),
                reason: "a tuple rest element must be an array".into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::Config;
    use crate::host::{Checker, Program};
    use crate::schema::DefinitionId;

    fn program(source: &str) -> Program {
        Program::from_sources(vec![("src/a.ts", source.to_string())], &Config::default())
    }

    fn build(checker: &mut Checker<'_>, registry: &mut SchemaRegistry, name: &str) -> Result<SchemaNode, SchemaError> {
        let ty = checker.named_type(0, name).map_err(SchemaError::from)?;
        SchemaBuilder::new(checker, registry).build(ty)
    }

    fn definition(registry: &SchemaRegistry, name: &str) -> serde_json::Value {
        registry.root_schema("root")["definitions"][name].clone()
    }

    #[test]
    fn mixed_enum_follows_the_auto_increment_rule() {
        let program = program("enum Mixed { String1 = 'Coke', Flag1 = 29, String2 = 'Pepsi', Flag2 = 24, Flag3 }");
        let mut checker = Checker::new(&program);
        let mut registry = SchemaRegistry::new();
        assert_eq!(build(&mut checker, &mut registry, "Mixed"), Ok(SchemaNode::Ref(DefinitionId(0))));
        assert_eq!(definition(&registry, "Mixed"), json!({ "enum": ["Coke", 29, "Pepsi", 24, 25] }));
    }

    #[test]
    fn numeric_reset_after_string_is_allowed() {
        let program = program("enum NonInitializedEnum { TWELVE, A = '5', B = 4, A1, C }");
        let mut checker = Checker::new(&program);
        let mut registry = SchemaRegistry::new();
        build(&mut checker, &mut registry, "NonInitializedEnum").unwrap();
        assert_eq!(definition(&registry, "NonInitializedEnum"), json!({ "enum": [0, "5", 4, 5, 6] }));
    }

    #[test]
    fn auto_increment_after_string_is_an_error() {
        let program = program("enum Bad { A = 'a', B }");
        let mut checker = Checker::new(&program);
        let mut registry = SchemaRegistry::new();
        let err = build(&mut checker, &mut registry, "Bad").unwrap_err();
        assert_eq!(err, SchemaError::EnumAutoIncrement { name: "Bad".into(), member: "B".into() });
        let ty = checker.named_type(0, "Bad").unwrap();
        assert!(matches!(registry.lookup(ty).map(|e| &e.state), Some(EntryState::Failed(_))));
        // Later requests re-report the stored failure.
        assert_eq!(build(&mut checker, &mut registry, "Bad").unwrap_err(), err);
    }

    #[test]
    fn repeated_builds_share_one_definition() {
        let program = program("enum E { A, B }\ninterface X { e: E; f: E[] }");
        let mut checker = Checker::new(&program);
        let mut registry = SchemaRegistry::new();
        let e1 = build(&mut checker, &mut registry, "E").unwrap();
        build(&mut checker, &mut registry, "X").unwrap();
        let e2 = build(&mut checker, &mut registry, "E").unwrap();
        assert_eq!(e1, e2);
        assert_eq!(registry.len(), 2);
        assert_eq!(
            definition(&registry, "X")["properties"],
            json!({ "e": { "$ref": "#/definitions/E" }, "f": { "type": "array", "items": { "$ref": "#/definitions/E" } } })
        );
    }

    #[test]
    fn self_referencing_interfaces_terminate_with_a_ref() {
        let program = program("interface Node { value: number; children: Node[]; parent?: Node }");
        let mut checker = Checker::new(&program);
        let mut registry = SchemaRegistry::new();
        build(&mut checker, &mut registry, "Node").unwrap();
        assert_eq!(
            definition(&registry, "Node"),
            json!({
                "type": "object",
                "properties": {
                    "value": { "type": "number" },
                    "children": { "type": "array", "items": { "$ref": "#/definitions/Node" } },
                    "parent": { "$ref": "#/definitions/Node" },
                },
                "required": ["value", "children"],
            })
        );
    }

    #[test]
    fn mutually_recursive_interfaces_terminate() {
        let program = program("interface A { b?: B }\ninterface B { a: A }");
        let mut checker = Checker::new(&program);
        let mut registry = SchemaRegistry::new();
        build(&mut checker, &mut registry, "A").unwrap();
        assert_eq!(definition(&registry, "B")["properties"]["a"], json!({ "$ref": "#/definitions/A" }));
    }

    #[test]
    fn recursive_aliases_are_promoted_to_definitions() {
        let program = program("type Json = string | number | Json[];\ntype P = { next?: P };");
        let mut checker = Checker::new(&program);
        let mut registry = SchemaRegistry::new();
        assert!(matches!(build(&mut checker, &mut registry, "Json"), Ok(SchemaNode::Ref(_))));
        assert_eq!(
            definition(&registry, "Json"),
            json!({ "anyOf": [
                { "type": "string" },
                { "type": "number" },
                { "type": "array", "items": { "$ref": "#/definitions/Json" } },
            ] })
        );
        build(&mut checker, &mut registry, "P").unwrap();
        assert_eq!(definition(&registry, "P")["properties"]["next"], json!({ "$ref": "#/definitions/P" }));
    }

    #[test]
    fn generic_instantiations_are_separate_definitions() {
        let program = program(
            "interface GenericType<T> { value: T }\n\
             interface ComplexInterface<T> { inner: T }\n\
             type A = ComplexInterface<GenericType<number>>;\n\
             type B = GenericType<string>;",
        );
        let mut checker = Checker::new(&program);
        let mut registry = SchemaRegistry::new();
        build(&mut checker, &mut registry, "A").unwrap();
        build(&mut checker, &mut registry, "B").unwrap();
        let names: Vec<_> = registry.entries().map(|e| e.name.clone()).collect();
        assert_eq!(names, ["ComplexInterface_GenericType_number", "GenericType_number", "GenericType_string"]);
    }

    #[test]
    fn plain_aliases_and_inline_objects_are_inlined() {
        let program = program("type Names = string[];\ninterface I { meta: { tag: string; n?: number } }");
        let mut checker = Checker::new(&program);
        let mut registry = SchemaRegistry::new();
        let names = build(&mut checker, &mut registry, "Names").unwrap();
        assert_eq!(names, SchemaNode::Array(Box::new(SchemaNode::Primitive(crate::host::PrimitiveKind::String))));
        assert!(registry.is_empty());
        build(&mut checker, &mut registry, "I").unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(definition(&registry, "I")["properties"]["meta"]["required"], json!(["tag"]));
    }

    #[test]
    fn unsupported_members_name_their_path() {
        let program = program("interface I { ok: string; bad: 'literal' }");
        let mut checker = Checker::new(&program);
        let mut registry = SchemaRegistry::new();
        let err = build(&mut checker, &mut registry, "I").unwrap_err();
        assert!(matches!(err, SchemaError::Member { ref member, .. } if member == "bad"), "{err}");
    }

    #[test]
    fn tuples_count_leading_required_elements() {
        let program = program("type T = [number, string?, ...boolean[]];");
        let mut checker = Checker::new(&program);
        let mut registry = SchemaRegistry::new();
        let node = build(&mut checker, &mut registry, "T").unwrap();
        let SchemaNode::Tuple { elements, required, rest } = node else { panic!("expected a tuple") };
        assert_eq!((elements.len(), required), (2, 1));
        assert!(rest.is_some());
    }
}
