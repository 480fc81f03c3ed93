//! CLI: transform | schema | check
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;

use crate::config::Config;
use crate::host::Program;
use crate::transform::{Compilation, TransformOutput};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// rewrite validate<T>() calls into schema-carrying calls and emit the runtime validator module
#[derive(Parser, Debug)]
#[command(name = "tsaudit", version)]
pub struct CommandLineInterface {
    /// more logging (-v info, -vv debug); RUST_LOG wins when set
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// rewrite sources and emit them with the runtime module
    Transform(TransformOut),
    /// print the root schema only
    Schema(SchemaOut),
    /// report errors without writing anything
    Check(CheckOut),
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// One or more inputs. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,

    /// config file (default: ./tsaudit.json when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// overrides the common source directory
    #[arg(long)]
    base_dir: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct TransformOut {
    #[command(flatten)]
    input_settings: InputSettings,

    /// output directory (config `outDir` if omitted)
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// list what would be written
    #[arg(long)]
    dry_run: bool,
}

#[derive(clap::Parser, Debug)]
struct SchemaOut {
    #[command(flatten)]
    input_settings: InputSettings,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct CheckOut {
    #[command(flatten)]
    input_settings: InputSettings,

    /// print errors as JSON on stdout
    #[arg(long)]
    json: bool,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl InputSettings {
    /// Config first, so fatal settings fail before any source is read.
    fn load(&self) -> anyhow::Result<(Config, Program)> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::discover(Path::new("."))?.unwrap_or_default(),
        };
        if let Some(base_dir) = &self.base_dir {
            config.base_dir = Some(base_dir.clone());
        }
        config.validate()?;
        let paths = resolve_file_path_patterns(&self.input).context("failed to resolve input file paths")?;
        tracing::info!(inputs = paths.len(), "loading program");
        let program = Program::load(&paths, &config)?;
        Ok((config, program))
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn run(&self) -> anyhow::Result<()> {
        match &self.cmd {
            Command::Transform(target) => {
                let (config, program) = target.input_settings.load()?;
                let output = Compilation::new(&program, &config).transform();
                report(&output)?;
                let out_dir = target.out_dir.clone().unwrap_or_else(|| config.out_dir.clone());
                if target.dry_run {
                    for (path, contents) in output.outputs(&out_dir)? {
                        println!("{} ({} bytes)", path.display(), contents.len());
                    }
                    return Ok(());
                }
                let written = output.emit(&out_dir)?;
                eprintln!("{} {} file(s) to {}", "wrote".green().bold(), written.len(), out_dir.display());
            }
            Command::Schema(target) => {
                let (config, program) = target.input_settings.load()?;
                let output = Compilation::new(&program, &config).transform();
                report(&output)?;
                let schema_src = serde_json::to_string_pretty(&output.root_schema)?;
                match target.out.as_ref() {
                    Some(out) => crate::emit::write_file(out, &schema_src)?,
                    None => println!("{schema_src}"),
                }
            }
            Command::Check(target) => {
                let (config, program) = target.input_settings.load()?;
                let output = Compilation::new(&program, &config).transform();
                if target.json {
                    println!("{}", serde_json::to_string_pretty(&output.diagnostics)?);
                    if !output.is_ok() {
                        bail!("{} error(s)", output.diagnostics.len());
                    }
                } else {
                    report(&output)?;
                }
                eprintln!("{} {} file(s), {} definition(s)", "ok".green().bold(), output.files.len(), output.registry.len());
            }
        }
        Ok(())
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

/// Prints every diagnostic to stderr and fails when there were any.
fn report(output: &TransformOutput) -> anyhow::Result<()> {
    if output.is_ok() {
        return Ok(());
    }
    for diagnostic in &output.diagnostics {
        eprintln!("{}", diagnostic.render());
    }
    bail!("{} error(s), nothing emitted", output.diagnostics.len())
}

pub fn resolve_file_path_patterns<I>(patterns: I) -> anyhow::Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{'))
    }

    let mut out = Vec::<PathBuf>::new();
    for raw in patterns {
        let pattern = raw.as_ref();
        if has_glob_chars(pattern) {
            let mut matched_any = false;
            for entry in glob::glob(pattern)? {
                out.push(entry?);
                matched_any = true;
            }
            if !matched_any {
                bail!("glob pattern matched no files: {pattern}");
            }
        } else {
            out.push(PathBuf::from(pattern));
        }
    }
    out.sort();
    out.dedup();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn globs_expand_and_literals_pass_through() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.ts"), "").unwrap();
        std::fs::write(dir.path().join("b.ts"), "").unwrap();
        let pattern = format!("{}/*.ts", dir.path().display());
        let literal = dir.path().join("a.ts").display().to_string();
        let paths = resolve_file_path_patterns([pattern.as_str(), literal.as_str()]).unwrap();
        assert_eq!(paths, [dir.path().join("a.ts"), dir.path().join("b.ts")]);
    }

    #[test]
    fn empty_globs_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = format!("{}/*.ts", dir.path().display());
        let err = resolve_file_path_patterns([pattern]).unwrap_err();
        assert!(err.to_string().contains("matched no files"));
    }

    #[test]
    fn subcommands_parse() {
        let cli = CommandLineInterface::try_parse_from(["tsaudit", "-v", "transform", "-i", "src/**/*.ts", "--dry-run"])
            .unwrap();
        assert_eq!(cli.verbose, 1);
        assert!(matches!(cli.cmd, Command::Transform(ref t) if t.dry_run && t.input_settings.input == ["src/**/*.ts"]));
    }
}
