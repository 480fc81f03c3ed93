//! Minimal TypeScript-subset front end.
//!
//! Just enough syntax to find validate calls, the declarations they point at,
//! and the imports that bring the validate functions into scope. Everything
//! keeps byte spans into the original text so rewrites can be spliced back in
//! without reprinting whole files.
pub mod ast;
pub mod lexer;
pub mod parser;

pub use ast::*;
pub use lexer::{Token, TokenKind};
pub use parser::{parse_module, ParseError};

/// Byte range into a source file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn to(self, other: Span) -> Span {
        Span { start: self.start.min(other.start), end: self.end.max(other.end) }
    }

    pub fn len(self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(self) -> bool {
        self.start == self.end
    }
}

/// Maps byte offsets to `(line, character)` pairs.
///
/// Lines are 1-based and characters are 0-based UTF-16 code units, the
/// columns editors and the TypeScript compiler report.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<u32>,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i as u32 + 1);
            }
        }
        Self { line_starts }
    }

    pub fn line_col(&self, text: &str, offset: u32) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let start = self.line_starts[line] as usize;
        let end = (offset as usize).min(text.len());
        let character = text.get(start..end).map(|s| s.encode_utf16().count()).unwrap_or(end - start);
        (line + 1, character)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_col_is_one_based_lines_zero_based_chars() {
        let text = "let a;\nlet bb = 1;\n";
        let index = LineIndex::new(text);
        assert_eq!(index.line_col(text, 0), (1, 0));
        assert_eq!(index.line_col(text, 7), (2, 0));
        assert_eq!(index.line_col(text, 11), (2, 4));
    }

    #[test]
    fn characters_count_utf16_code_units() {
        let text = "const s = '\u{1F600}é'; f();";
        let index = LineIndex::new(text);
        let call = text.find("f()").unwrap() as u32;
        assert_eq!(index.line_col(text, call), (1, 17));
    }
}
