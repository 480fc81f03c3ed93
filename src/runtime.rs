//! Rust-side reference runtime for the generated module.
//!
//! Mirrors `assertIsType` / `isType` over a frozen root schema so that call
//! arguments produced by the rewriter can be checked end to end without a
//! JavaScript engine. Matching is delegated to the `jsonschema` crate.
use std::path::Path;

use jsonschema::{Draft, Validator};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::schema::DRAFT_07;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("failed to read root schema {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("root schema is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("root schema must be an object with a string `$id` and a `definitions` object")]
    Malformed,
}

/// One schema violation: JSON pointer into the value plus the engine's message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub instance_path: String,
    pub message: String,
}

/// What `assertIsType` throws. Serializes with `validationError: true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct ValidationError {
    pub validation_error: bool,
    pub message: String,
    pub errors: Vec<ValidationIssue>,
}

impl ValidationError {
    fn new(raw: &Value, errors: Vec<ValidationIssue>) -> Self {
        let text = if errors.is_empty() {
            "No errors".to_string()
        } else {
            errors.iter().map(|e| format!("data{} {}", e.instance_path, e.message)).collect::<Vec<_>>().join(", ")
        };
        let detail = serde_json::to_string_pretty(&errors).unwrap_or_default();
        let message = format!("Validation Failure: {text}\n{detail}\nPassed in value:\n{raw}");
        Self { validation_error: true, message, errors }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeValidator {
    root_id: String,
    definitions: Map<String, Value>,
}

impl RuntimeValidator {
    pub fn new(root: &Value) -> Result<Self, RuntimeError> {
        let root_id = root.get("$id").and_then(Value::as_str).ok_or(RuntimeError::Malformed)?;
        let definitions = root.get("definitions").and_then(Value::as_object).ok_or(RuntimeError::Malformed)?;
        Ok(Self { root_id: root_id.to_string(), definitions: definitions.clone() })
    }

    /// Loads a `runTimeValidations.schema.json` dump.
    pub fn from_path(path: &Path) -> Result<Self, RuntimeError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| RuntimeError::Read { path: path.display().to_string(), source })?;
        let root: Value = serde_json::from_str(&text)?;
        Self::new(&root)
    }

    pub fn definition_names(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    /// Returns `raw` unchanged when it matches `reference`.
    pub fn assert_is_type(&self, raw: Value, reference: &Value) -> Result<Value, ValidationError> {
        let validator = self.compile(reference).map_err(|message| {
            let issue = ValidationIssue { instance_path: String::new(), message };
            ValidationError::new(&raw, vec![issue])
        })?;
        let errors: Vec<ValidationIssue> = validator
            .iter_errors(&raw)
            .map(|err| ValidationIssue { instance_path: err.instance_path.to_string(), message: err.to_string() })
            .collect();
        if errors.is_empty() {
            Ok(raw)
        } else {
            Err(ValidationError::new(&raw, errors))
        }
    }

    pub fn is_type(&self, raw: &Value, reference: &Value) -> bool {
        match self.compile(reference) {
            Ok(validator) => validator.is_valid(raw),
            Err(message) => {
                tracing::warn!(%message, "schema reference does not compile");
                false
            }
        }
    }

    /// Embeds `reference` in a document carrying every definition, with refs
    /// into the root document made local.
    fn compile(&self, reference: &Value) -> Result<Validator, String> {
        let mut schema = match reference {
            Value::Object(map) => map.clone(),
            other => return Err(format!("schema reference must be an object, found {other}")),
        };
        schema.remove("$id");
        let mut schema = Value::Object(schema);
        let prefix = format!("{}#", self.root_id);
        localize_refs(&mut schema, &prefix);
        let mut definitions = Value::Object(self.definitions.clone());
        localize_refs(&mut definitions, &prefix);
        schema["$schema"] = Value::from(DRAFT_07);
        schema["definitions"] = definitions;
        jsonschema::options().with_draft(Draft::Draft7).build(&schema).map_err(|e| e.to_string())
    }
}

fn localize_refs(value: &mut Value, prefix: &str) {
    match value {
        Value::Object(map) => {
            for (key, item) in map.iter_mut() {
                match item {
                    Value::String(target) if key == "$ref" => {
                        if let Some(rest) = target.strip_prefix(prefix) {
                            *target = format!("#{rest}");
                        }
                    }
                    item => localize_refs(item, prefix),
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|item| localize_refs(item, prefix)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validator() -> RuntimeValidator {
        RuntimeValidator::new(&json!({
            "$id": "root",
            "$schema": DRAFT_07,
            "definitions": {
                "User": {
                    "type": "object",
                    "properties": { "name": { "type": "string" }, "friends": { "type": "array", "items": { "$ref": "#/definitions/User" } } },
                    "required": ["name"],
                },
            },
        }))
        .unwrap()
    }

    #[test]
    fn references_resolve_into_the_root_definitions() {
        let v = validator();
        let reference = json!({ "$ref": "root#/definitions/User" });
        let user = json!({ "name": "a", "friends": [{ "name": "b" }] });
        assert_eq!(v.assert_is_type(user.clone(), &reference).unwrap(), user);
        assert!(!v.is_type(&json!({ "friends": [] }), &reference));
        assert!(!v.is_type(&json!({ "name": "a", "friends": [{ "name": 1 }] }), &reference));
    }

    #[test]
    fn inline_arguments_with_absolute_refs_validate() {
        let v = validator();
        let reference = json!({ "type": "array", "items": { "$ref": "root#/definitions/User" } });
        assert!(v.is_type(&json!([{ "name": "a" }]), &reference));
        assert!(!v.is_type(&json!([{}]), &reference));
    }

    #[test]
    fn failures_carry_the_generated_message_layout() {
        let v = validator();
        let err = v.assert_is_type(json!({ "name": 3 }), &json!({ "$ref": "root#/definitions/User" })).unwrap_err();
        assert!(err.validation_error);
        assert!(err.message.starts_with("Validation Failure: data/name "), "{}", err.message);
        assert!(err.message.ends_with("\nPassed in value:\n{\"name\":3}"), "{}", err.message);
        assert_eq!(err.errors[0].instance_path, "/name");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["validationError"], true);
        assert_eq!(json["errors"][0]["instancePath"], "/name");
    }

    #[test]
    fn malformed_roots_are_rejected() {
        assert!(matches!(RuntimeValidator::new(&json!({ "definitions": {} })), Err(RuntimeError::Malformed)));
        assert!(!validator().is_type(&json!(1), &json!("not a schema")));
    }
}
