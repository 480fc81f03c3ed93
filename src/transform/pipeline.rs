//! One compilation: locate, build, rewrite every source file, then freeze
//! the registry into the root schema.
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::config::Config;
use crate::diagnostics::Diagnostics;
use crate::emit::{self, EmitError};
use crate::host::{Checker, Program};
use crate::schema::{SchemaBuilder, SchemaRegistry};

use super::locate::locate;
use super::rewrite::{self, generated_module_specifier, Replacement};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenFile {
    pub source: PathBuf,
    /// Output path relative to the output directory.
    pub relative: PathBuf,
    pub text: String,
    pub call_sites: usize,
}

#[derive(Debug)]
pub struct TransformOutput {
    pub files: Vec<RewrittenFile>,
    pub registry: SchemaRegistry,
    pub root_schema: Value,
    /// Every error of the pass, in file order then position.
    pub diagnostics: Diagnostics,
    config: Config,
}

/// Owns the registry and the checker for a single pass. A fresh value per
/// invocation; nothing is shared between compilations.
pub struct Compilation<'p> {
    program: &'p Program,
    config: &'p Config,
    checker: Checker<'p>,
    registry: SchemaRegistry,
}

impl<'p> Compilation<'p> {
    pub fn new(program: &'p Program, config: &'p Config) -> Self {
        Self { program, config, checker: Checker::new(program), registry: SchemaRegistry::new() }
    }

    pub fn transform(mut self) -> TransformOutput {
        let program = self.program;
        let config = self.config;
        let root_id = config.root_schema_id.as_str();
        let mut diagnostics = Diagnostics::new();
        for diagnostic in program.diagnostics() {
            let in_source = program.source_files().any(|(_, file)| file.path == diagnostic.file);
            if !in_source {
                diagnostics.push(diagnostic.clone());
            }
        }

        let mut files = Vec::new();
        for (id, file) in program.source_files() {
            let mut file_diagnostics = Diagnostics::new();
            for diagnostic in program.diagnostics().iter().filter(|d| d.file == file.path) {
                file_diagnostics.push(diagnostic.clone());
            }
            let located = locate(&mut self.checker, program, id, config);
            file_diagnostics.extend(located.diagnostics);

            let file_dir = file.path.parent().unwrap_or(Path::new(""));
            let specifier = generated_module_specifier(file_dir, program.base_dir(), &config.generated_module);
            let mut replacements: Vec<Replacement> = located
                .imports
                .iter()
                .map(|span| Replacement::import_source(file.snippet(*span), *span, &specifier))
                .collect();
            for site in &located.sites {
                let built = SchemaBuilder::new(&mut self.checker, &mut self.registry).build(site.target);
                match built {
                    Ok(node) => {
                        let argument = self.registry.call_argument(&node, root_id);
                        replacements.push(Replacement::append_argument(site, &argument));
                    }
                    Err(error) => file_diagnostics.push(file.diagnostic(site.span, error.to_string())),
                }
            }
            file_diagnostics.sort_by_position();
            diagnostics.extend(file_diagnostics);

            let relative = match file.path.strip_prefix(program.base_dir()) {
                Ok(relative) => relative.to_path_buf(),
                Err(_) => {
                    tracing::warn!(
                        file = %file.path.display(),
                        base_dir = %program.base_dir().display(),
                        "source file is outside the base directory; writing it at the output root"
                    );
                    file.path.file_name().map(PathBuf::from).unwrap_or_default()
                }
            };
            files.push(RewrittenFile {
                source: file.path.clone(),
                relative,
                text: rewrite::apply(&file.text, replacements),
                call_sites: located.sites.len(),
            });
        }

        let root_schema = self.registry.root_schema(root_id);
        tracing::info!(
            files = files.len(),
            call_sites = files.iter().map(|f| f.call_sites).sum::<usize>(),
            definitions = self.registry.len(),
            errors = diagnostics.len(),
            "transform finished"
        );
        TransformOutput { files, registry: self.registry, root_schema, diagnostics, config: config.clone() }
    }
}

impl TransformOutput {
    pub fn is_ok(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn file(&self, source: &Path) -> Option<&RewrittenFile> {
        self.files.iter().find(|f| f.source == source)
    }

    /// Every file emission would write, as `(path under out_dir, contents)`.
    /// The runtime module and schema come first so a rewritten file is never
    /// written without the module it imports.
    pub fn outputs(&self, out_dir: &Path) -> Result<Vec<(PathBuf, String)>, EmitError> {
        if !self.is_ok() {
            return Err(EmitError::Diagnostics(self.diagnostics.clone()));
        }
        let mut schema = serde_json::to_string_pretty(&self.root_schema)?;
        schema.push('\n');
        let mut out = vec![
            (
                out_dir.join(emit::module_file_name(&self.config)),
                emit::runtime_module(&self.config, &self.root_schema)?,
            ),
            (out_dir.join(emit::schema_file_name(&self.config)), schema),
        ];
        out.extend(self.files.iter().map(|f| (out_dir.join(&f.relative), f.text.clone())));
        Ok(out)
    }

    /// Writes the runtime module and the rewritten files. Refuses when the
    /// pass reported any error.
    pub fn emit(&self, out_dir: &Path) -> Result<Vec<PathBuf>, EmitError> {
        let outputs = self.outputs(out_dir)?;
        let mut written = Vec::with_capacity(outputs.len());
        for (path, contents) in outputs {
            emit::write_file(&path, &contents)?;
            written.push(path);
        }
        tracing::info!(out_dir = %out_dir.display(), files = written.len(), "emitted");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compile(sources: &[(&str, &str)]) -> TransformOutput {
        let config = Config::default();
        let sources = sources.iter().map(|(path, text)| (*path, text.to_string())).collect();
        let program = Program::from_sources(sources, &config);
        Compilation::new(&program, &config).transform()
    }

    fn text<'a>(output: &'a TransformOutput, path: &str) -> &'a str {
        &output.file(Path::new(path)).unwrap().text
    }

    #[test]
    fn calls_and_imports_are_rewritten() {
        let output = compile(&[(
            "/p/src/main.ts",
            "import { assertIsType } from 'ts-audit';\ninterface User { name: string }\n\
             export const u = assertIsType<User>(JSON.parse('{}'));",
        )]);
        assert!(output.is_ok(), "{}", output.diagnostics);
        assert_eq!(
            text(&output, "/p/src/main.ts"),
            "import { assertIsType } from './runTimeValidations';\ninterface User { name: string }\n\
             export const u = assertIsType<User>(JSON.parse('{}'), { \"$ref\": \"root#/definitions/User\" });"
        );
        assert_eq!(
            output.root_schema["definitions"]["User"],
            json!({ "type": "object", "properties": { "name": { "type": "string" } }, "required": ["name"] })
        );
    }

    #[test]
    fn imports_in_subdirectories_climb_to_the_base_directory() {
        let output = compile(&[
            ("/p/src/index.ts", "export const x = 1;"),
            ("/p/src/api/users.ts", "import { isType } from \"ts-audit\";\nconst ok = isType<string>(1) as boolean;"),
        ]);
        assert!(output.is_ok(), "{}", output.diagnostics);
        let users = output.file(Path::new("/p/src/api/users.ts")).unwrap();
        assert_eq!(users.relative, PathBuf::from("api/users.ts"));
        assert!(users.text.starts_with("import { isType } from \"../runTimeValidations\";"));
        assert!(users.text.contains(r#"isType<string>(1, { "type": "string" })"#));
    }

    #[test]
    fn shapes_produce_identical_arguments() {
        let output = compile(&[(
            "/p/src/main.ts",
            "import { assertIsType } from 'ts-audit';\ninterface U { a: number }\n\
             const a = assertIsType<U>(1);\nconst b = assertIsType(1) as U;\nconst c: U = assertIsType(1);\n\
             let d: U;\nd = assertIsType(1);",
        )]);
        assert!(output.is_ok(), "{}", output.diagnostics);
        let reference = r#"assertIsType<U>(1, { "$ref": "root#/definitions/U" })"#;
        let text = text(&output, "/p/src/main.ts");
        assert!(text.contains(reference));
        assert_eq!(text.matches(r#", { "$ref": "root#/definitions/U" })"#).count(), 4);
        assert_eq!(output.registry.len(), 1);
    }

    #[test]
    fn errors_are_collected_in_source_order_and_block_emission() {
        let output = compile(&[(
            "/p/src/main.ts",
            "import { assertIsType } from 'ts-audit';\nenum E { A = 'a', B }\n\
             const x = assertIsType<E>(1);\nassertIsType(2);\nconst y = assertIsType<E>(3);",
        )]);
        assert_eq!(
            output.diagnostics.to_string(),
            "/p/src/main.ts:3:10: Enum 'E': cannot have automatically indexed member 'B' after a string member\n\
             /p/src/main.ts:4:0: validationFunction not used in a supported way. Please see documentation for details on usage\n\
             /p/src/main.ts:5:10: Enum 'E': cannot have automatically indexed member 'B' after a string member"
        );
        let err = output.emit(Path::new("/nonexistent")).unwrap_err();
        assert!(matches!(err, EmitError::Diagnostics(ref d) if d.len() == 3));
    }

    #[test]
    fn emit_writes_sources_module_and_schema() {
        let output = compile(&[(
            "/p/src/main.ts",
            "import { isType } from 'ts-audit';\ninterface A { b?: B }\ninterface B { a: A }\n\
             export function f(raw: unknown) { const ok: boolean = isType<A>(raw); return ok; }",
        )]);
        assert!(output.is_ok(), "{}", output.diagnostics);
        let dir = tempfile::tempdir().unwrap();
        let written = output.emit(dir.path()).unwrap();
        assert_eq!(written.len(), 3);
        let module = std::fs::read_to_string(dir.path().join("runTimeValidations.ts")).unwrap();
        assert!(module.contains("\"A\": {"));
        let schema: Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("runTimeValidations.schema.json")).unwrap())
                .unwrap();
        let names: Vec<_> = schema["definitions"].as_object().unwrap().keys().cloned().collect();
        assert_eq!(names, ["A", "B"]);
        assert_eq!(schema["definitions"]["B"]["properties"]["a"], json!({ "$ref": "#/definitions/A" }));
        assert!(dir.path().join("main.ts").is_file());
    }

    #[test]
    fn runtime_module_is_written_before_sources() {
        let output = compile(&[(
            "/p/src/main.ts",
            "import { isType } from 'ts-audit';\nconst ok = isType<string>(1) as boolean;",
        )]);
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("main.ts")).unwrap();
        let err = output.emit(dir.path()).unwrap_err();
        assert!(matches!(err, EmitError::Write { ref path, .. } if path.ends_with("main.ts")));
        assert!(dir.path().join("runTimeValidations.ts").is_file());
        assert!(dir.path().join("runTimeValidations.schema.json").is_file());
    }

    #[test]
    fn calls_inside_template_substitutions_are_rewritten() {
        let output = compile(&[(
            "/p/src/main.ts",
            "import { assertIsType } from 'ts-audit';\n\
             const x = `n: ${assertIsType<number>(1)} s: ${tag`${assertIsType<string>('a')}`}`;",
        )]);
        assert!(output.is_ok(), "{}", output.diagnostics);
        let text = text(&output, "/p/src/main.ts");
        assert!(text.contains(r#"${assertIsType<number>(1, { "type": "number" })}"#), "{text}");
        assert!(text.contains(r#"${assertIsType<string>('a', { "type": "string" })}"#), "{text}");
        assert_eq!(output.files[0].call_sites, 2);
    }
}
