//! Identity-keyed store of nominal definitions.
use std::collections::HashSet;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};

use crate::host::TypeId;

use super::builder::SchemaError;
use super::node::{DefinitionId, SchemaNode};

pub const DRAFT_07: &str = "http://json-schema.org/draft-07/schema#";

static NAME_SANITIZER: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_$]+").expect("static pattern"));

#[derive(Debug, Clone, PartialEq)]
pub enum EntryState {
    /// Id assigned, body still being built. References resolve to the id.
    Reserved,
    Built(SchemaNode),
    Failed(SchemaError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub id: DefinitionId,
    pub name: String,
    pub state: EntryState,
}

/// One per compilation. Ids are positions in first-seen order and never change.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    entries: IndexMap<TypeId, Entry>,
    names: HashSet<String>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup(&self, ty: TypeId) -> Option<&Entry> {
        self.entries.get(&ty)
    }

    pub fn entry(&self, id: DefinitionId) -> Option<&Entry> {
        self.entries.get_index(id.index()).map(|(_, entry)| entry)
    }

    /// Entries in id order.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    /// Returns the existing id for `ty`, or assigns the next one.
    pub fn reserve(&mut self, ty: TypeId, display: &str) -> DefinitionId {
        if let Some(entry) = self.entries.get(&ty) {
            return entry.id;
        }
        let id = DefinitionId(self.entries.len() as u32);
        let base = sanitize(display);
        let mut name = base.clone();
        let mut suffix = id.0;
        while !self.names.insert(name.clone()) {
            name = format!("{base}_{suffix}");
            suffix += 1;
        }
        tracing::debug!(id = id.0, %name, "reserved definition");
        self.entries.insert(ty, Entry { id, name, state: EntryState::Reserved });
        id
    }

    pub fn complete(&mut self, ty: TypeId, node: SchemaNode) {
        if let Some(entry) = self.entries.get_mut(&ty) {
            entry.state = EntryState::Built(node);
        }
    }

    pub fn fail(&mut self, ty: TypeId, error: SchemaError) {
        if let Some(entry) = self.entries.get_mut(&ty) {
            entry.state = EntryState::Failed(error);
        }
    }

    pub fn name(&self, id: DefinitionId) -> &str {
        self.entry(id).map(|entry| entry.name.as_str()).unwrap_or("")
    }

    /// `$ref` string for `id` under `prefix`, e.g. `root#/definitions/`.
    pub fn reference(&self, id: DefinitionId, prefix: &str) -> String {
        format!("{prefix}{}", self.name(id))
    }

    /// The literal embedded as a call's trailing argument. Nested refs are
    /// absolute so the value stands on its own outside the root document.
    pub fn call_argument(&self, node: &SchemaNode, root_id: &str) -> Value {
        let prefix = format!("{root_id}#/definitions/");
        node.to_json(&|id| self.reference(id, &prefix))
    }

    /// Freezes the registry into the root schema document.
    pub fn root_schema(&self, root_id: &str) -> Value {
        let local = |id: DefinitionId| self.reference(id, "#/definitions/");
        let mut definitions = Map::new();
        for entry in self.entries.values() {
            match &entry.state {
                EntryState::Built(node) => {
                    definitions.insert(entry.name.clone(), node.to_json(&local));
                }
                state => tracing::warn!(name = %entry.name, ?state, "skipping unfinished definition"),
            }
        }
        json!({
            "$id": root_id,
            "$schema": DRAFT_07,
            "definitions": definitions,
        })
    }
}

/// `ComplexInterface<GenericType<number>>` → `ComplexInterface_GenericType_number`.
pub fn sanitize(display: &str) -> String {
    let name = NAME_SANITIZER.replace_all(display, "_");
    let name = name.trim_matches('_');
    if name.is_empty() { "Definition".into() } else { name.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{PrimitiveKind, TypeArena, TypeKind};

    fn ids(n: usize) -> Vec<TypeId> {
        let mut arena = TypeArena::new();
        (0..n).map(|i| arena.intern(TypeKind::TypeParam(format!("T{i}")))).collect()
    }

    #[test]
    fn names_are_sanitized() {
        assert_eq!(sanitize("ComplexInterface<GenericType<number>>"), "ComplexInterface_GenericType_number");
        assert_eq!(sanitize("Pair<string, number[]>"), "Pair_string_number");
        assert_eq!(sanitize("$Money"), "$Money");
    }

    #[test]
    fn reserve_is_idempotent_and_ordered() {
        let tys = ids(2);
        let mut registry = SchemaRegistry::new();
        let a = registry.reserve(tys[0], "A");
        let b = registry.reserve(tys[1], "B");
        assert_eq!(registry.reserve(tys[0], "A"), a);
        assert_eq!((a, b), (DefinitionId(0), DefinitionId(1)));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn colliding_names_get_the_id_appended() {
        let tys = ids(2);
        let mut registry = SchemaRegistry::new();
        registry.reserve(tys[0], "Box<A>");
        let second = registry.reserve(tys[1], "Box_A");
        assert_eq!(registry.name(second), "Box_A_1");
    }

    #[test]
    fn suffixed_names_never_reuse_a_taken_name() {
        let tys = ids(3);
        let mut registry = SchemaRegistry::new();
        let first = registry.reserve(tys[0], "User");
        let second = registry.reserve(tys[1], "User_2");
        let third = registry.reserve(tys[2], "User");
        let names = [registry.name(first), registry.name(second), registry.name(third)];
        assert_eq!(names, ["User", "User_2", "User_3"]);
        for (ty, id) in tys.iter().zip([first, second, third]) {
            registry.complete(*ty, SchemaNode::Primitive(PrimitiveKind::Number));
            assert_eq!(registry.lookup(*ty).map(|e| e.id), Some(id));
        }
        assert_eq!(registry.root_schema("root")["definitions"].as_object().unwrap().len(), 3);
    }

    #[test]
    fn root_schema_lists_definitions_in_id_order() {
        let tys = ids(2);
        let mut registry = SchemaRegistry::new();
        let a = registry.reserve(tys[0], "A");
        registry.reserve(tys[1], "B");
        registry.complete(tys[1], SchemaNode::Array(Box::new(SchemaNode::Ref(a))));
        registry.complete(tys[0], SchemaNode::Primitive(PrimitiveKind::Number));
        let root = registry.root_schema("root");
        assert_eq!(root["$id"], "root");
        assert_eq!(root["$schema"], DRAFT_07);
        let names: Vec<_> = root["definitions"].as_object().unwrap().keys().cloned().collect();
        assert_eq!(names, ["A", "B"]);
        assert_eq!(root["definitions"]["B"]["items"], json!({ "$ref": "#/definitions/A" }));
    }

    #[test]
    fn call_arguments_use_absolute_references() {
        let tys = ids(1);
        let mut registry = SchemaRegistry::new();
        let a = registry.reserve(tys[0], "A");
        let node = SchemaNode::Array(Box::new(SchemaNode::Ref(a)));
        assert_eq!(
            registry.call_argument(&node, "root"),
            json!({ "type": "array", "items": { "$ref": "root#/definitions/A" } })
        );
    }
}
