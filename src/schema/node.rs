//! Schema nodes and their JSON Schema (draft-07) lowering.
use serde_json::{json, Map, Value};

use crate::host::PrimitiveKind;

/// Position of a definition in the registry, assigned in first-seen order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DefinitionId(pub u32);

impl DefinitionId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnumValue {
    Str(String),
    Num(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub required: bool,
    pub schema: SchemaNode,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    Primitive(PrimitiveKind),
    /// Enum values in declaration order.
    OneOf(Vec<EnumValue>),
    /// Properties in declaration order, inherited first.
    Interface(Vec<Property>),
    Array(Box<SchemaNode>),
    Ref(DefinitionId),
    /// Branches in source order; never deduplicated.
    Union(Vec<SchemaNode>),
    Tuple {
        elements: Vec<SchemaNode>,
        /// Leading elements that must be present.
        required: usize,
        rest: Option<Box<SchemaNode>>,
    },
    Intersection(Vec<SchemaNode>),
}

impl SchemaNode {
    /// Lowers to JSON Schema. `reference` renders the `$ref` string of a
    /// definition, which differs between the root document and call sites.
    pub fn to_json(&self, reference: &dyn Fn(DefinitionId) -> String) -> Value {
        match self {
            SchemaNode::Primitive(kind) => json!({ "type": kind.name() }),
            SchemaNode::OneOf(values) => {
                let values = values
                    .iter()
                    .map(|value| match value {
                        EnumValue::Str(s) => Value::from(s.clone()),
                        EnumValue::Num(n) => number_value(*n),
                    })
                    .collect::<Vec<_>>();
                json!({ "enum": values })
            }
            SchemaNode::Interface(properties) => {
                let mut props = Map::new();
                let mut required = Vec::new();
                for property in properties {
                    props.insert(property.name.clone(), property.schema.to_json(reference));
                    if property.required {
                        required.push(Value::from(property.name.clone()));
                    }
                }
                let mut o = json!({ "type": "object", "properties": props });
                if !required.is_empty() {
                    o["required"] = Value::Array(required);
                }
                o
            }
            SchemaNode::Array(element) => json!({ "type": "array", "items": element.to_json(reference) }),
            SchemaNode::Ref(id) => json!({ "$ref": reference(*id) }),
            SchemaNode::Union(branches) => json!({ "anyOf": lower_all(branches, reference) }),
            SchemaNode::Tuple { elements, required, rest } => {
                let mut o = json!({
                    "type": "array",
                    "items": lower_all(elements, reference),
                    "minItems": *required,
                });
                match rest {
                    Some(rest) => o["additionalItems"] = rest.to_json(reference),
                    None => o["maxItems"] = Value::from(elements.len()),
                }
                o
            }
            SchemaNode::Intersection(parts) => json!({ "allOf": lower_all(parts, reference) }),
        }
    }

    /// Definitions this node points at directly or through its children.
    pub fn refs(&self) -> Vec<DefinitionId> {
        let mut out = Vec::new();
        self.collect_refs(&mut out);
        out
    }

    fn collect_refs(&self, out: &mut Vec<DefinitionId>) {
        match self {
            SchemaNode::Ref(id) => out.push(*id),
            SchemaNode::Primitive(_) | SchemaNode::OneOf(_) => {}
            SchemaNode::Interface(properties) => properties.iter().for_each(|p| p.schema.collect_refs(out)),
            SchemaNode::Array(element) => element.collect_refs(out),
            SchemaNode::Union(nodes) | SchemaNode::Intersection(nodes) => nodes.iter().for_each(|n| n.collect_refs(out)),
            SchemaNode::Tuple { elements, rest, .. } => {
                elements.iter().for_each(|n| n.collect_refs(out));
                if let Some(rest) = rest {
                    rest.collect_refs(out);
                }
            }
        }
    }
}

fn lower_all(nodes: &[SchemaNode], reference: &dyn Fn(DefinitionId) -> String) -> Vec<Value> {
    nodes.iter().map(|node| node.to_json(reference)).collect()
}

/// Integral values serialize as JSON integers.
fn number_value(n: f64) -> Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9.0e15 {
        Value::from(n as i64)
    } else {
        Value::from(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(id: DefinitionId) -> String {
        format!("#/definitions/D{}", id.0)
    }

    #[test]
    fn interface_lists_required_properties_only() {
        let node = SchemaNode::Interface(vec![
            Property { name: "a".into(), required: true, schema: SchemaNode::Primitive(PrimitiveKind::String) },
            Property { name: "b".into(), required: false, schema: SchemaNode::Ref(DefinitionId(2)) },
        ]);
        assert_eq!(
            node.to_json(&local),
            json!({
                "type": "object",
                "properties": { "a": { "type": "string" }, "b": { "$ref": "#/definitions/D2" } },
                "required": ["a"],
            })
        );
    }

    #[test]
    fn enum_numbers_are_integers_when_integral() {
        let node = SchemaNode::OneOf(vec![EnumValue::Str("Coke".into()), EnumValue::Num(29.0), EnumValue::Num(0.5)]);
        assert_eq!(node.to_json(&local), json!({ "enum": ["Coke", 29, 0.5] }));
    }

    #[test]
    fn tuples_bound_their_length_unless_they_have_a_rest() {
        let fixed = SchemaNode::Tuple {
            elements: vec![SchemaNode::Primitive(PrimitiveKind::Number)],
            required: 1,
            rest: None,
        };
        assert_eq!(
            fixed.to_json(&local),
            json!({ "type": "array", "items": [{ "type": "number" }], "minItems": 1, "maxItems": 1 })
        );
        let open = SchemaNode::Tuple {
            elements: vec![],
            required: 0,
            rest: Some(Box::new(SchemaNode::Primitive(PrimitiveKind::Boolean))),
        };
        assert_eq!(open.to_json(&local)["additionalItems"], json!({ "type": "boolean" }));
    }

    #[test]
    fn refs_are_collected_through_children() {
        let node = SchemaNode::Union(vec![
            SchemaNode::Array(Box::new(SchemaNode::Ref(DefinitionId(1)))),
            SchemaNode::Intersection(vec![SchemaNode::Ref(DefinitionId(0))]),
        ]);
        assert_eq!(node.refs(), [DefinitionId(1), DefinitionId(0)]);
    }
}
