//! Compiler configuration, read from `tsaudit.json` and overridden by CLI flags.
use std::path::{Path, PathBuf};

use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "tsaudit.json";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
    /// Module specifier that application code imports the validate functions from.
    pub package_name: String,
    /// Name of the sentinel type that marks a validate function's signature.
    pub marker_type: String,
    /// File stem of the generated runtime module.
    pub generated_module: String,
    /// `$id` of the root schema that every definition lives under.
    pub root_schema_id: String,
    /// Overrides the computed common source directory.
    pub base_dir: Option<PathBuf>,
    pub out_dir: PathBuf,
    /// Single-file bundling; rejected.
    pub out_file: Option<PathBuf>,
    /// Functions that return the value or throw.
    pub assertion_functions: Vec<String>,
    /// Functions that return a boolean.
    pub guard_functions: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            package_name: "ts-audit".into(),
            marker_type: "_RUNTIME_CHECK_ANY".into(),
            generated_module: "runTimeValidations".into(),
            root_schema_id: "root".into(),
            base_dir: None,
            out_dir: PathBuf::from("build"),
            out_file: None,
            assertion_functions: vec!["assertIsType".into(), "validateInterface".into()],
            guard_functions: vec!["isType".into()],
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {message}")]
    Invalid { path: PathBuf, message: String },
    #[error(
        "{package} does not work with outFile. Use a bundler with this transformer to bundle your output instead."
    )]
    OutFileUnsupported { package: String },
    #[error("config field `{field}` must not be empty")]
    Empty { field: &'static str },
}

impl Config {
    pub fn from_json(src: &str) -> Result<Self, String> {
        crate::path_de::from_str_with_path(src)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let bytes = std::fs::read(path).map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        crate::path_de::from_slice_with_path(&bytes)
            .map_err(|message| ConfigError::Invalid { path: path.to_path_buf(), message })
    }

    /// Loads `tsaudit.json` from `dir` when it exists.
    pub fn discover(dir: &Path) -> Result<Option<Self>, ConfigError> {
        let path = dir.join(DEFAULT_CONFIG_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        tracing::debug!(path = %path.display(), "loading config");
        Self::load(&path).map(Some)
    }

    /// Rejects settings the file-per-module output model cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.out_file.is_some() {
            return Err(ConfigError::OutFileUnsupported { package: self.package_name.clone() });
        }
        let required = [
            ("packageName", &self.package_name),
            ("markerType", &self.marker_type),
            ("generatedModule", &self.generated_module),
            ("rootSchemaId", &self.root_schema_id),
        ];
        for (field, value) in required {
            if value.is_empty() {
                return Err(ConfigError::Empty { field });
            }
        }
        Ok(())
    }

    /// `root#/definitions/`, the prefix of every reference embedded in a call.
    pub fn definition_prefix(&self) -> String {
        format!("{}#/definitions/", self.root_schema_id)
    }

    pub fn validate_functions(&self) -> impl Iterator<Item = &str> {
        self.assertion_functions.iter().chain(&self.guard_functions).map(String::as_str)
    }
}
