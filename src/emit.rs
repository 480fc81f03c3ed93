//! Runtime module emitter: the generated TypeScript module that validates
//! values against the root schema, and the schema dump next to it.
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::config::Config;
use crate::diagnostics::Diagnostics;

#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    #[error("refusing to emit, {count} error(s) found:\n{0}", count = .0.len())]
    Diagnostics(Diagnostics),
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize the root schema: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub fn module_file_name(config: &Config) -> String {
    format!("{}.ts", config.generated_module)
}

pub fn schema_file_name(config: &Config) -> String {
    format!("{}.schema.json", config.generated_module)
}

/// Source of the runtime module. Every configured assertion and guard name
/// is exported, aliasing `assertIsType` and `isType` respectively.
pub fn runtime_module(config: &Config, root_schema: &Value) -> Result<String, EmitError> {
    let schema = serde_json::to_string_pretty(root_schema)?;
    let mut out = String::new();
    out.push_str("// Generated by tsaudit. Do not edit.\n");
    out.push_str("import Ajv from 'ajv';\n\n");
    let _ = writeln!(out, "const rootSchema = {schema};\n");
    out.push_str(RUNTIME_BODY);
    let mut aliases = String::new();
    for name in config.assertion_functions.iter().filter(|name| *name != "assertIsType") {
        let _ = writeln!(aliases, "export const {name} = assertIsType;");
    }
    for name in config.guard_functions.iter().filter(|name| *name != "isType") {
        let _ = writeln!(aliases, "export const {name} = isType;");
    }
    if !aliases.is_empty() {
        out.push('\n');
        out.push_str(&aliases);
    }
    Ok(out)
}

const RUNTIME_BODY: &str = r#"const validator = new Ajv({ schemas: [rootSchema] });

export class ValidationError extends Error {
    public readonly validationError = true;

    constructor(message: string) {
        super(message);
        this.name = 'ValidationError';
    }
}

export function isType<T = any>(raw: unknown, definitionReference: object): raw is T {
    return validator.validate(definitionReference, raw) as boolean;
}

export function assertIsType<T = any>(raw: unknown, definitionReference: object): T {
    if (isType<T>(raw, definitionReference)) {
        return raw;
    }
    throw new ValidationError(
        'Validation Failure: ' +
            validator.errorsText() +
            '\n' +
            JSON.stringify(validator.errors, null, '  ') +
            '\nPassed in value:\n' +
            JSON.stringify(raw),
    );
}
"#;

pub fn write_file(path: &Path, contents: &str) -> Result<(), EmitError> {
    let write = || -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)
    };
    write().map_err(|source| EmitError::Write { path: path.to_path_buf(), source })?;
    tracing::debug!(path = %path.display(), bytes = contents.len(), "wrote file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn root() -> Value {
        json!({
            "$id": "root",
            "$schema": "http://json-schema.org/draft-07/schema#",
            "definitions": { "User": { "type": "object", "properties": {} } },
        })
    }

    #[test]
    fn module_seeds_ajv_with_the_root_schema() {
        let src = runtime_module(&Config::default(), &root()).unwrap();
        assert!(src.starts_with("// Generated by tsaudit"));
        assert!(src.contains("import Ajv from 'ajv';"));
        assert!(src.contains("\"$id\": \"root\""));
        assert!(src.contains("new Ajv({ schemas: [rootSchema] })"));
        assert!(src.contains("public readonly validationError = true;"));
        assert!(src.contains("'Validation Failure: ' +"));
        assert!(src.contains("export const validateInterface = assertIsType;"));
        assert!(!src.contains("export const isType"));
    }

    #[test]
    fn extra_guard_names_alias_is_type() {
        let config = Config { guard_functions: vec!["isType".into(), "matches".into()], ..Config::default() };
        let src = runtime_module(&config, &root()).unwrap();
        assert!(src.contains("export const matches = isType;"));
    }

    #[test]
    fn file_names_follow_the_generated_module() {
        let config = Config { generated_module: "checks".into(), ..Config::default() };
        assert_eq!(module_file_name(&config), "checks.ts");
        assert_eq!(schema_file_name(&config), "checks.schema.json");
    }

    #[test]
    fn diagnostics_error_lists_every_error() {
        let mut diagnostics = Diagnostics::new();
        for (line, message) in [(2, "first"), (5, "second")] {
            diagnostics.push(crate::diagnostics::Diagnostic {
                file: PathBuf::from("/p/a.ts"),
                line,
                character: 0,
                message: message.into(),
            });
        }
        assert_eq!(
            EmitError::Diagnostics(diagnostics).to_string(),
            "refusing to emit, 2 error(s) found:\n/p/a.ts:2:0: first\n/p/a.ts:5:0: second"
        );
    }

    #[test]
    fn write_file_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/c.ts");
        write_file(&path, "x").unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "x");
    }
}
