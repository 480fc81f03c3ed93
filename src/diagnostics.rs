//! Build-time error surface: `file:line:character: message` entries.
use std::fmt;
use std::path::{Path, PathBuf};

use colored::Colorize;
use serde::Serialize;

use crate::syntax::{LineIndex, Span};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub file: PathBuf,
    /// 1-based.
    pub line: usize,
    /// 0-based.
    pub character: usize,
    pub message: String,
}

impl Diagnostic {
    pub fn new(file: &Path, text: &str, lines: &LineIndex, span: Span, message: impl Into<String>) -> Self {
        let (line, character) = lines.line_col(text, span.start);
        Self { file: file.to_path_buf(), line, character, message: message.into() }
    }

    /// Coloured rendering for terminals.
    pub fn render(&self) -> String {
        let location = format!("{}:{}:{}", self.file.display(), self.line, self.character);
        format!("{}: {} {}", location.bold(), "error:".red().bold(), self.message)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}: {}", self.file.display(), self.line, self.character, self.message)
    }
}

/// Ordered collection; `Display` joins entries with newlines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        tracing::debug!(%diagnostic, "recorded diagnostic");
        self.0.push(diagnostic);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    /// Stable sort by line then character; meant for entries of a single file.
    pub fn sort_by_position(&mut self) {
        self.0.sort_by_key(|d| (d.line, d.character));
    }

    pub fn messages(&self) -> Vec<&str> {
        self.0.iter().map(|d| d.message.as_str()).collect()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, diagnostic) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{diagnostic}")?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_newline_joined_file_line_character() {
        let text = "a;\n  validate(x);\n";
        let lines = LineIndex::new(text);
        let mut diagnostics = Diagnostics::new();
        diagnostics.push(Diagnostic::new(Path::new("src/a.ts"), text, &lines, Span::new(5, 16), "first"));
        diagnostics.push(Diagnostic::new(Path::new("src/a.ts"), text, &lines, Span::new(0, 1), "second"));
        assert_eq!(diagnostics.to_string(), "src/a.ts:2:2: first\nsrc/a.ts:1:0: second");
    }
}
