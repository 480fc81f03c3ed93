use super::parser::ParseError;
use super::Span;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Str(String),
    Num(f64),
    /// Raw text between the backticks, substitutions included.
    Template(String),
    Regex(String),
    Punct(&'static str),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// A line terminator sits between this token and the previous one.
    pub newline_before: bool,
}

impl Token {
    pub fn is_punct(&self, p: &str) -> bool {
        matches!(&self.kind, TokenKind::Punct(q) if *q == p)
    }

    pub fn is_ident(&self, name: &str) -> bool {
        matches!(&self.kind, TokenKind::Ident(s) if s == name)
    }

    pub fn ident(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Ident(s) => Some(s),
            _ => None,
        }
    }
}

// Longest first. `>` is never combined here: the parser glues adjacent `>`
// tokens back together so `Array<Array<T>>` closes two type argument lists.
const PUNCTUATORS: &[&str] = &[
    "...", "===", "!==", "**=", "<<=", "&&=", "||=", "??=",
    "=>", "==", "!=", "<=", "&&", "||", "??", "?.", "++", "--", "+=", "-=", "*=", "/=", "%=",
    "&=", "|=", "^=", "**", "<<",
    "{", "}", "(", ")", "[", "]", ";", ",", "<", ">", "+", "-", "*", "/", "%", "&", "|", "^",
    "!", "~", "?", ":", "=", ".", "@",
];

// Keywords after which a `/` starts a regular expression rather than a division.
const REGEX_PREFIX_KEYWORDS: &[&str] = &[
    "return", "typeof", "case", "do", "else", "in", "instanceof", "new", "delete", "void",
    "throw", "yield", "await", "of",
];

pub fn tokenize(src: &str) -> Result<Vec<Token>, ParseError> {
    let mut lexer = Lexer { src, bytes: src.as_bytes(), pos: 0, tokens: Vec::new() };
    lexer.run()?;
    Ok(lexer.tokens)
}

/// Spans of the `${...}` bodies inside a template's raw text, offset by
/// `base` so they point into the enclosing source.
pub fn template_substitutions(raw: &str, base: u32) -> Result<Vec<Span>, ParseError> {
    let mut lexer = Lexer { src: raw, bytes: raw.as_bytes(), pos: 0, tokens: Vec::new() };
    let mut spans = Vec::new();
    while let Some(c) = lexer.bump() {
        match c {
            '\\' => {
                lexer.bump();
            }
            '$' if lexer.peek_char() == Some('{') => {
                lexer.bump();
                let start = lexer.pos;
                lexer.skip_substitution(start).map_err(|err| err.shifted(base))?;
                spans.push(Span::new(base + start as u32, base + lexer.pos as u32 - 1));
            }
            _ => {}
        }
    }
    Ok(spans)
}

/// Tokenizes a slice of a larger source; spans point into the larger source.
pub fn tokenize_at(src: &str, base: u32) -> Result<Vec<Token>, ParseError> {
    let mut tokens = tokenize(src).map_err(|err| err.shifted(base))?;
    for token in &mut tokens {
        token.span = Span::new(token.span.start + base, token.span.end + base);
    }
    Ok(tokens)
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn run(&mut self) -> Result<(), ParseError> {
        loop {
            let newline_before = self.skip_trivia()?;
            let start = self.pos;
            let Some(c) = self.peek_char() else {
                self.push(TokenKind::Eof, start, newline_before);
                return Ok(());
            };
            let kind = if c == '"' || c == '\'' {
                TokenKind::Str(self.string(c)?)
            } else if c == '`' {
                TokenKind::Template(self.template()?)
            } else if c.is_ascii_digit()
                || (c == '.' && self.bytes.get(self.pos + 1).is_some_and(|b| b.is_ascii_digit()))
            {
                TokenKind::Num(self.number()?)
            } else if is_ident_start(c) || c == '#' {
                TokenKind::Ident(self.identifier())
            } else if c == '/' && self.regex_allowed() {
                TokenKind::Regex(self.regex()?)
            } else {
                TokenKind::Punct(self.punct()?)
            };
            self.push(kind, start, newline_before);
        }
    }

    fn push(&mut self, kind: TokenKind, start: usize, newline_before: bool) {
        self.tokens.push(Token {
            kind,
            span: Span::new(start as u32, self.pos as u32),
            newline_before,
        });
    }

    fn error(&self, message: impl Into<String>, start: usize) -> ParseError {
        ParseError::new(message, Span::new(start as u32, self.pos.max(start) as u32))
    }

    fn peek_char(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    /// Skips whitespace and comments; reports whether a newline was crossed.
    fn skip_trivia(&mut self) -> Result<bool, ParseError> {
        let mut newline = false;
        while let Some(c) = self.peek_char() {
            match c {
                '\n' | '\r' | '\u{2028}' | '\u{2029}' => {
                    newline = true;
                    self.bump();
                }
                c if c.is_whitespace() || c == '\u{feff}' => {
                    self.bump();
                }
                '/' if self.src[self.pos..].starts_with("//") => {
                    while let Some(c) = self.peek_char() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                '/' if self.src[self.pos..].starts_with("/*") => {
                    let start = self.pos;
                    let Some(end) = self.src[self.pos + 2..].find("*/") else {
                        self.pos = self.src.len();
                        return Err(self.error("unterminated block comment", start));
                    };
                    let body = &self.src[self.pos..self.pos + 2 + end];
                    newline |= body.contains('\n');
                    self.pos += end + 4;
                }
                _ => break,
            }
        }
        Ok(newline)
    }

    fn string(&mut self, quote: char) -> Result<String, ParseError> {
        let start = self.pos;
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => return Err(self.error("unterminated string literal", start)),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => self.escape(&mut out, start)?,
                Some(c) => out.push(c),
            }
        }
    }

    fn escape(&mut self, out: &mut String, start: usize) -> Result<(), ParseError> {
        let Some(c) = self.bump() else {
            return Err(self.error("unterminated escape sequence", start));
        };
        match c {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' => out.push('\0'),
            '\r' => {
                if self.peek_char() == Some('\n') {
                    self.bump();
                }
            }
            '\n' => {}
            'x' => {
                let code = self.hex_digits(2, start)?;
                out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
            }
            'u' => {
                let code = if self.peek_char() == Some('{') {
                    self.bump();
                    let digits_start = self.pos;
                    while self.peek_char().is_some_and(|c| c.is_ascii_hexdigit()) {
                        self.bump();
                    }
                    let code = u32::from_str_radix(&self.src[digits_start..self.pos], 16)
                        .map_err(|_| self.error("invalid unicode escape", start))?;
                    if self.bump() != Some('}') {
                        return Err(self.error("invalid unicode escape", start));
                    }
                    code
                } else {
                    self.hex_digits(4, start)?
                };
                out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
            }
            other => out.push(other),
        }
        Ok(())
    }

    fn hex_digits(&mut self, count: usize, start: usize) -> Result<u32, ParseError> {
        let end = self.pos + count;
        let digits = self.src.get(self.pos..end).ok_or_else(|| self.error("invalid escape", start))?;
        let code = u32::from_str_radix(digits, 16).map_err(|_| self.error("invalid escape", start))?;
        self.pos = end;
        Ok(code)
    }

    fn template(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        self.bump();
        self.skip_template_body(start)?;
        Ok(self.src[start + 1..self.pos - 1].to_string())
    }

    /// Consumes up to and including the closing backtick.
    fn skip_template_body(&mut self, start: usize) -> Result<(), ParseError> {
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated template literal", start)),
                Some('`') => return Ok(()),
                Some('\\') => {
                    self.bump();
                }
                Some('$') if self.peek_char() == Some('{') => {
                    self.bump();
                    self.skip_substitution(start)?;
                }
                Some(_) => {}
            }
        }
    }

    fn skip_substitution(&mut self, start: usize) -> Result<(), ParseError> {
        let mut depth = 1usize;
        while depth > 0 {
            match self.peek_char() {
                None => return Err(self.error("unterminated template substitution", start)),
                Some('{') => {
                    depth += 1;
                    self.bump();
                }
                Some('}') => {
                    depth -= 1;
                    self.bump();
                }
                Some(q @ ('"' | '\'')) => {
                    self.string(q)?;
                }
                Some('`') => {
                    self.bump();
                    self.skip_template_body(start)?;
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
        Ok(())
    }

    fn number(&mut self) -> Result<f64, ParseError> {
        let start = self.pos;
        let rest = &self.src[self.pos..];
        let radix = match rest.get(..2) {
            Some("0x") | Some("0X") => 16,
            Some("0b") | Some("0B") => 2,
            Some("0o") | Some("0O") => 8,
            _ => 10,
        };
        if radix != 10 {
            self.pos += 2;
            let digits_start = self.pos;
            while self.peek_char().is_some_and(|c| c.is_ascii_alphanumeric() || c == '_') {
                self.bump();
            }
            let digits: String = self.src[digits_start..self.pos]
                .chars()
                .filter(|c| *c != '_' && *c != 'n')
                .collect();
            return u64::from_str_radix(&digits, radix)
                .map(|v| v as f64)
                .map_err(|_| self.error("invalid numeric literal", start));
        }

        let mut text = String::new();
        self.digits(&mut text);
        if self.peek_char() == Some('.') {
            text.push('.');
            self.bump();
            self.digits(&mut text);
        }
        if matches!(self.peek_char(), Some('e') | Some('E')) {
            text.push('e');
            self.bump();
            if let Some(sign @ ('+' | '-')) = self.peek_char() {
                text.push(sign);
                self.bump();
            }
            self.digits(&mut text);
        }
        // BigInt suffix
        if self.peek_char() == Some('n') {
            self.bump();
        }
        text.parse::<f64>().map_err(|_| self.error("invalid numeric literal", start))
    }

    fn digits(&mut self, text: &mut String) {
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                text.push(c);
            } else if c != '_' {
                break;
            }
            self.bump();
        }
    }

    fn identifier(&mut self) -> String {
        let start = self.pos;
        if self.peek_char() == Some('#') {
            self.bump();
        }
        while let Some(c) = self.peek_char() {
            if is_ident_continue(c) {
                self.bump();
            } else {
                break;
            }
        }
        self.src[start..self.pos].to_string()
    }

    fn regex_allowed(&self) -> bool {
        match self.tokens.last().map(|t| &t.kind) {
            None => true,
            Some(TokenKind::Ident(name)) => REGEX_PREFIX_KEYWORDS.contains(&name.as_str()),
            Some(TokenKind::Punct(p)) => !matches!(*p, ")" | "]" | "}" | "++" | "--"),
            Some(_) => false,
        }
    }

    fn regex(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        self.bump();
        let mut in_class = false;
        loop {
            match self.bump() {
                None | Some('\n') => return Err(self.error("unterminated regular expression", start)),
                Some('\\') => {
                    self.bump();
                }
                Some('[') => in_class = true,
                Some(']') => in_class = false,
                Some('/') if !in_class => break,
                Some(_) => {}
            }
        }
        while self.peek_char().is_some_and(is_ident_continue) {
            self.bump();
        }
        Ok(self.src[start..self.pos].to_string())
    }

    fn punct(&mut self) -> Result<&'static str, ParseError> {
        let rest = &self.src[self.pos..];
        for p in PUNCTUATORS {
            if rest.starts_with(p) {
                // `?.5` is a conditional followed by a number
                if *p == "?." && rest.as_bytes().get(2).is_some_and(|b| b.is_ascii_digit()) {
                    continue;
                }
                self.pos += p.len();
                return Ok(*p);
            }
        }
        let start = self.pos;
        self.bump();
        Err(self.error(format!("unexpected character '{}'", &self.src[start..self.pos]), start))
    }
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c == '$' || c.is_alphabetic()
}

fn is_ident_continue(c: char) -> bool {
    c == '_' || c == '$' || c.is_alphanumeric()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn generic_close_is_split_into_single_angles() {
        let ks = kinds("Array<Array<T>>");
        assert_eq!(ks.iter().filter(|k| **k == TokenKind::Punct(">")).count(), 2);
    }

    #[test]
    fn strings_are_cooked() {
        assert_eq!(kinds(r#"'a\'b' "c\nd""#)[..2], [
            TokenKind::Str("a'b".into()),
            TokenKind::Str("c\nd".into()),
        ]);
    }

    #[test]
    fn numbers_cover_radixes_and_separators() {
        assert_eq!(kinds("0x1F 1_000 2.5e1 .5")[..4], [
            TokenKind::Num(31.0),
            TokenKind::Num(1000.0),
            TokenKind::Num(25.0),
            TokenKind::Num(0.5),
        ]);
    }

    #[test]
    fn regex_versus_division() {
        let ks = kinds("a / b; x = /ab+c/g;");
        assert!(ks.contains(&TokenKind::Punct("/")));
        assert!(ks.contains(&TokenKind::Regex("/ab+c/g".into())));
    }

    #[test]
    fn substitution_spans_point_into_the_source() {
        let src = "x = `a ${f(`${b}`)} c ${ {d: 1}.d }`;";
        let tok = &tokenize(src).unwrap()[2];
        let TokenKind::Template(raw) = &tok.kind else { panic!("{tok:?}") };
        let spans = template_substitutions(raw, tok.span.start + 1).unwrap();
        let texts: Vec<_> = spans.iter().map(|s| &src[s.start as usize..s.end as usize]).collect();
        assert_eq!(texts, ["f(`${b}`)", " {d: 1}.d "]);
    }

    #[test]
    fn template_substitutions_are_balanced() {
        let ks = kinds("`a ${ {b: `c`}.b } d` ;");
        assert_eq!(ks[0], TokenKind::Template("a ${ {b: `c`}.b } d".into()));
        assert_eq!(ks[1], TokenKind::Punct(";"));
    }

    #[test]
    fn newline_flag_tracks_comments() {
        let toks = tokenize("a /* x\n */ b // c\n d").unwrap();
        assert!(toks[1].newline_before);
        assert!(toks[2].newline_before);
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let err = tokenize("let a = 'oops").unwrap_err();
        assert!(err.message.contains("unterminated"));
    }
}
