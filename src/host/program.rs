//! The set of source files under compilation.
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::path::{Component, Path, PathBuf};

use rayon::prelude::*;

use crate::config::Config;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::syntax::{parse_module, ExportDecl, LineIndex, Module, ParseError, Span, Stmt};

use super::types::FileId;

#[derive(Debug)]
pub struct SourceFile {
    pub path: PathBuf,
    pub text: String,
    pub lines: LineIndex,
    /// Empty when the file failed to parse.
    pub module: Module,
    pub is_declaration: bool,
    /// The built-in declaration of the validate functions.
    pub is_prelude: bool,
}

impl SourceFile {
    fn parse(path: PathBuf, text: String) -> (Self, Option<ParseError>) {
        let lines = LineIndex::new(&text);
        let (module, error) = match parse_module(&text) {
            Ok(module) => (module, None),
            Err(error) => (Module { body: Vec::new() }, Some(error)),
        };
        let is_declaration = path.to_string_lossy().ends_with(".d.ts");
        let file = Self { path, text, lines, module, is_declaration, is_prelude: false };
        (file, error)
    }

    pub fn diagnostic(&self, span: Span, message: impl Into<String>) -> Diagnostic {
        Diagnostic::new(&self.path, &self.text, &self.lines, span, message)
    }

    pub fn snippet(&self, span: Span) -> &str {
        self.text.get(span.start as usize..span.end as usize).unwrap_or("")
    }

    pub fn in_node_modules(&self) -> bool {
        self.path.components().any(|c| c.as_os_str() == "node_modules")
    }

    /// Files whose calls get located and rewritten.
    pub fn is_source(&self) -> bool {
        !self.is_declaration && !self.is_prelude && !self.in_node_modules()
    }

    /// Relative module specifiers this file imports or re-exports from.
    fn relative_specifiers(&self) -> Vec<&str> {
        let mut out = Vec::new();
        for stmt in &self.module.body {
            let source = match stmt {
                Stmt::Import(import) => Some(&import.source),
                Stmt::Export(ExportDecl::Named { source, .. }) => source.as_ref(),
                Stmt::Export(ExportDecl::All { source, .. }) => Some(source),
                _ => None,
            };
            if let Some(source) = source {
                if source.value.starts_with('.') {
                    out.push(source.value.as_str());
                }
            }
        }
        out
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug)]
pub struct Program {
    files: Vec<SourceFile>,
    by_path: HashMap<PathBuf, FileId>,
    prelude: FileId,
    package_name: String,
    base_dir: PathBuf,
    diagnostics: Diagnostics,
}

impl Program {
    /// Reads `paths` and every file they import through relative specifiers.
    pub fn load(paths: &[PathBuf], config: &Config) -> Result<Self, LoadError> {
        let mut seen = HashSet::new();
        let mut queue = Vec::new();
        for path in paths {
            let path = absolute(path)?;
            if seen.insert(path.clone()) {
                queue.push(path);
            }
        }
        let mut parsed = Vec::new();
        while !queue.is_empty() {
            let batch = queue
                .par_iter()
                .map(|path| {
                    let text = std::fs::read_to_string(path)
                        .map_err(|source| LoadError::Read { path: path.clone(), source })?;
                    Ok(SourceFile::parse(path.clone(), text))
                })
                .collect::<Result<Vec<_>, LoadError>>()?;
            queue.clear();
            for (file, _) in &batch {
                let dir = file.path.parent().unwrap_or(Path::new(""));
                for specifier in file.relative_specifiers() {
                    match probe(dir, specifier, |candidate| candidate.is_file()) {
                        Some(found) if seen.insert(found.clone()) => {
                            tracing::debug!(from = %file.path.display(), found = %found.display(), "discovered import");
                            queue.push(found);
                        }
                        Some(_) => {}
                        None => tracing::warn!(from = %file.path.display(), specifier, "unresolved relative import"),
                    }
                }
            }
            parsed.extend(batch);
        }
        let mut config = config.clone();
        if let Some(base_dir) = &config.base_dir {
            config.base_dir = Some(absolute(base_dir)?);
        }
        Ok(Self::assemble(parsed, &config))
    }

    /// In-memory program; no filesystem access.
    pub fn from_sources<P: Into<PathBuf>>(sources: Vec<(P, String)>, config: &Config) -> Self {
        let parsed = sources
            .into_iter()
            .map(|(path, text)| (normalize(&path.into()), text))
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|(path, text)| SourceFile::parse(path, text))
            .collect();
        Self::assemble(parsed, config)
    }

    fn assemble(parsed: Vec<(SourceFile, Option<ParseError>)>, config: &Config) -> Self {
        let mut files = Vec::with_capacity(parsed.len() + 1);
        let mut diagnostics = Diagnostics::new();
        for (file, error) in parsed {
            if let Some(error) = error {
                diagnostics.push(file.diagnostic(error.span, error.message));
            }
            files.push(file);
        }

        let prelude_path = PathBuf::from("node_modules").join(&config.package_name).join("index.d.ts");
        let (mut prelude, error) = SourceFile::parse(prelude_path, prelude_source(config));
        if let Some(error) = error {
            diagnostics.push(prelude.diagnostic(error.span, error.message));
        }
        prelude.is_prelude = true;
        let prelude_id = files.len();
        files.push(prelude);

        let by_path = files
            .iter()
            .enumerate()
            .filter(|(_, file)| !file.is_prelude)
            .map(|(id, file)| (file.path.clone(), id))
            .collect();
        let base_dir = match &config.base_dir {
            Some(dir) => normalize(dir),
            None => common_dir(files.iter().filter(|f| f.is_source()).map(|f| f.path.parent().unwrap_or(Path::new("")))),
        };
        tracing::debug!(files = files.len(), base_dir = %base_dir.display(), "program assembled");
        Self {
            files,
            by_path,
            prelude: prelude_id,
            package_name: config.package_name.clone(),
            base_dir,
            diagnostics,
        }
    }

    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    pub fn file(&self, id: FileId) -> &SourceFile {
        &self.files[id]
    }

    /// Files to locate and rewrite, in program order.
    pub fn source_files(&self) -> impl Iterator<Item = (FileId, &SourceFile)> {
        self.files.iter().enumerate().filter(|(_, file)| file.is_source())
    }

    pub fn prelude(&self) -> FileId {
        self.prelude
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Parse errors.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn resolve_module(&self, from: FileId, specifier: &str) -> Option<FileId> {
        if specifier == self.package_name {
            return Some(self.prelude);
        }
        if !specifier.starts_with('.') {
            return None;
        }
        let dir = self.files[from].path.parent().unwrap_or(Path::new(""));
        let path = probe(dir, specifier, |candidate| self.by_path.contains_key(candidate))?;
        self.by_path.get(&path).copied()
    }
}

/// Declarations of the validate functions, as the package ships them.
pub fn prelude_source(config: &Config) -> String {
    let marker = &config.marker_type;
    let mut out = format!("type {marker} = any;\n\n");
    for name in &config.assertion_functions {
        let _ = writeln!(out, "export function {name}<T = {marker}>(data: unknown): {marker};");
    }
    for name in &config.guard_functions {
        let _ = writeln!(out, "export function {name}<T = {marker}>(data: unknown): data is T;");
    }
    out.push_str("\nexport default function (arg: never): never;\n");
    out
}

// ————————————————————————————————————————————————————————————————————————————
// PATHS
// ————————————————————————————————————————————————————————————————————————————

fn absolute(path: &Path) -> Result<PathBuf, LoadError> {
    std::path::absolute(path)
        .map(|p| normalize(&p))
        .map_err(|source| LoadError::Read { path: path.to_path_buf(), source })
}

/// Lexically resolves `.` and `..` without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// `/`-separated path from directory `from` to directory `to`; `.` when equal.
pub fn relative_path(from: &Path, to: &Path) -> String {
    let from: Vec<_> = from.components().collect();
    let to: Vec<_> = to.components().collect();
    let shared = from.iter().zip(&to).take_while(|(a, b)| a == b).count();
    let mut parts: Vec<String> = Vec::new();
    for _ in shared..from.len() {
        parts.push("..".into());
    }
    for component in &to[shared..] {
        parts.push(component.as_os_str().to_string_lossy().into_owned());
    }
    if parts.is_empty() { ".".into() } else { parts.join("/") }
}

fn common_dir<'a>(dirs: impl Iterator<Item = &'a Path>) -> PathBuf {
    let mut common: Option<Vec<Component<'a>>> = None;
    for dir in dirs {
        let components: Vec<_> = dir.components().collect();
        common = Some(match common {
            None => components,
            Some(prev) => prev.into_iter().zip(components).take_while(|(a, b)| a == b).map(|(a, _)| a).collect(),
        });
    }
    common.map(|components| components.into_iter().collect()).unwrap_or_default()
}

/// Module resolution for relative specifiers.
fn probe(dir: &Path, specifier: &str, exists: impl Fn(&Path) -> bool) -> Option<PathBuf> {
    let specifier = specifier.strip_suffix(".js").unwrap_or(specifier);
    let base = normalize(&dir.join(specifier));
    let mut candidates = Vec::new();
    if base.extension().is_some_and(|ext| ext == "ts") {
        candidates.push(base.clone());
    }
    for suffix in [".ts", ".d.ts"] {
        let mut path = base.clone().into_os_string();
        path.push(suffix);
        candidates.push(PathBuf::from(path));
    }
    candidates.push(base.join("index.ts"));
    candidates.push(base.join("index.d.ts"));
    candidates.into_iter().find(|candidate| exists(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_folds_dots() {
        assert_eq!(normalize(Path::new("src/./a/../b.ts")), PathBuf::from("src/b.ts"));
        assert_eq!(normalize(Path::new("../../x")), PathBuf::from("../../x"));
        assert_eq!(normalize(Path::new("/a/../../b")), PathBuf::from("/b"));
    }

    #[test]
    fn relative_paths_use_forward_slashes() {
        assert_eq!(relative_path(Path::new("src"), Path::new("src")), ".");
        assert_eq!(relative_path(Path::new("src/a/b"), Path::new("src")), "../..");
        assert_eq!(relative_path(Path::new("src"), Path::new("src/gen")), "gen");
    }

    #[test]
    fn base_dir_is_common_ancestor_of_sources() {
        let program = Program::from_sources(
            vec![
                ("proj/src/a/x.ts", String::new()),
                ("proj/src/b/y.ts", String::new()),
                ("proj/types/z.d.ts", String::new()),
            ],
            &Config::default(),
        );
        assert_eq!(program.base_dir(), Path::new("proj/src"));
        assert_eq!(program.source_files().count(), 2);
    }

    #[test]
    fn base_dir_override_wins() {
        let config = Config { base_dir: Some(PathBuf::from("proj")), ..Config::default() };
        let program = Program::from_sources(vec![("proj/src/a.ts", String::new())], &config);
        assert_eq!(program.base_dir(), Path::new("proj"));
    }

    #[test]
    fn modules_resolve_by_probing_and_package_name() {
        let program = Program::from_sources(
            vec![
                ("src/main.ts", String::new()),
                ("src/types.ts", String::new()),
                ("src/lib/index.ts", String::new()),
                ("src/decls.d.ts", String::new()),
            ],
            &Config::default(),
        );
        assert_eq!(program.resolve_module(0, "./types"), Some(1));
        assert_eq!(program.resolve_module(0, "./types.js"), Some(1));
        assert_eq!(program.resolve_module(0, "./lib"), Some(2));
        assert_eq!(program.resolve_module(0, "./decls"), Some(3));
        assert_eq!(program.resolve_module(0, "ts-audit"), Some(program.prelude()));
        assert_eq!(program.resolve_module(0, "lodash"), None);
    }

    #[test]
    fn parse_errors_become_diagnostics() {
        let program = Program::from_sources(vec![("src/bad.ts", "let = ;".to_string())], &Config::default());
        assert_eq!(program.diagnostics().len(), 1);
        assert!(program.diagnostics().to_string().starts_with("src/bad.ts:1:"));
    }

    #[test]
    fn prelude_declares_every_validate_function() {
        let source = prelude_source(&Config::default());
        assert!(source.contains("export function assertIsType<T = _RUNTIME_CHECK_ANY>"));
        assert!(source.contains("export function isType<T = _RUNTIME_CHECK_ANY>(data: unknown): data is T;"));
        assert!(parse_module(&source).is_ok());
    }

    #[test]
    fn load_follows_relative_imports() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.ts"), "import { A } from './types';\n").unwrap();
        std::fs::write(dir.path().join("types.ts"), "export interface A { a: string }\n").unwrap();
        let program = Program::load(&[dir.path().join("main.ts")], &Config::default()).unwrap();
        assert_eq!(program.source_files().count(), 2);
    }
}
