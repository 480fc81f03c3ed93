//! Recursive-descent parser over the token stream.
//!
//! The grammar is the TypeScript subset that shows up in application code:
//! modules, declarations, statements and the full expression grammar, plus
//! enough of the type grammar to describe any declaration. Generic calls and
//! arrow functions are disambiguated by backtracking.
use super::ast::*;
use super::lexer::{template_substitutions, tokenize, tokenize_at, Token, TokenKind};
use super::Span;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

impl ParseError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self { message: message.into(), span }
    }

    pub(crate) fn shifted(self, base: u32) -> Self {
        Self { span: Span::new(self.span.start + base, self.span.end + base), ..self }
    }
}

type PResult<T> = Result<T, ParseError>;

pub fn parse_module(src: &str) -> PResult<Module> {
    let tokens = tokenize(src)?;
    let mut parser = Parser { tokens, pos: 0, next_id: 0, no_in: false, no_conditional: false };
    let mut body = Vec::new();
    while !parser.at_eof() {
        body.push(parser.statement()?);
    }
    Ok(Module { body })
}

const CLASS_MODIFIERS: &[&str] = &[
    "public", "private", "protected", "static", "readonly", "abstract", "declare", "override",
    "accessor", "async",
];

const PARAM_MODIFIERS: &[&str] = &["public", "private", "protected", "readonly", "override"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArrowHint {
    No,
    Certain,
    Maybe,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    next_id: NodeId,
    /// Inside a `for (...)` head, where `in` ends the left-hand side.
    no_in: bool,
    /// Inside the `extends` clause of a conditional type.
    no_conditional: bool,
}

impl Parser {
    // ----- token cursor -----

    fn nth(&self, n: usize) -> &Token {
        let i = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[i]
    }

    fn peek(&self) -> &Token {
        self.nth(0)
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn bump(&mut self) -> Token {
        let tok = self.peek().clone();
        if !self.at_eof() {
            self.pos += 1;
        }
        tok
    }

    fn start(&self) -> u32 {
        self.peek().span.start
    }

    fn prev_end(&self) -> u32 {
        if self.pos == 0 { 0 } else { self.tokens[self.pos - 1].span.end }
    }

    fn span_from(&self, start: u32) -> Span {
        Span::new(start, self.prev_end().max(start))
    }

    fn punct(&self) -> Option<&'static str> {
        match self.peek().kind {
            TokenKind::Punct(p) => Some(p),
            _ => None,
        }
    }

    fn at(&self, p: &str) -> bool {
        self.peek().is_punct(p)
    }

    fn at_kw(&self, kw: &str) -> bool {
        self.peek().is_ident(kw)
    }

    fn eat(&mut self, p: &str) -> bool {
        if self.at(p) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn eat_kw(&mut self, kw: &str) -> bool {
        if self.at_kw(kw) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, p: &str) -> PResult<Span> {
        if self.at(p) { Ok(self.bump().span) } else { Err(self.unexpected(&format!("'{p}'"))) }
    }

    fn expect_kw(&mut self, kw: &str) -> PResult<Span> {
        if self.at_kw(kw) { Ok(self.bump().span) } else { Err(self.unexpected(&format!("'{kw}'"))) }
    }

    fn unexpected(&self, wanted: &str) -> ParseError {
        let tok = self.peek();
        ParseError::new(format!("expected {wanted}, found {}", describe(&tok.kind)), tok.span)
    }

    fn ident(&mut self) -> PResult<Ident> {
        match &self.peek().kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                let span = self.bump().span;
                Ok(Ident { name, span })
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    fn string_lit(&mut self) -> PResult<StrLit> {
        match &self.peek().kind {
            TokenKind::Str(value) => {
                let value = value.clone();
                let span = self.bump().span;
                Ok(StrLit { value, span })
            }
            _ => Err(self.unexpected("string literal")),
        }
    }

    fn fresh_id(&mut self) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Statement terminator with automatic semicolon insertion.
    fn semi(&mut self) -> PResult<()> {
        if self.eat(";") || self.at("}") || self.at_eof() || self.peek().newline_before {
            Ok(())
        } else {
            Err(self.unexpected("';'"))
        }
    }

    /// Runs `f`, rewinding the cursor if it fails.
    fn attempt<T>(&mut self, f: impl FnOnce(&mut Self) -> PResult<T>) -> Option<T> {
        let (pos, no_in, no_conditional) = (self.pos, self.no_in, self.no_conditional);
        match f(self) {
            Ok(value) => Some(value),
            Err(_) => {
                self.pos = pos;
                self.no_in = no_in;
                self.no_conditional = no_conditional;
                None
            }
        }
    }

    fn with_in<T>(&mut self, f: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        let saved = std::mem::replace(&mut self.no_in, false);
        let out = f(self);
        self.no_in = saved;
        out
    }

    fn matching_paren(&self, open: usize) -> Option<usize> {
        let mut depth = 0usize;
        for (i, tok) in self.tokens.iter().enumerate().skip(open) {
            if tok.is_punct("(") {
                depth += 1;
            } else if tok.is_punct(")") {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
        }
        None
    }

    fn token_at(&self, index: usize) -> &Token {
        &self.tokens[index.min(self.tokens.len() - 1)]
    }

    /// An operator spelled with a leading `>`, glued from adjacent tokens.
    fn gt_operator(&self) -> Option<(&'static str, usize)> {
        if !self.at(">") {
            return None;
        }
        let mut text = String::from(">");
        let mut end = self.peek().span.end;
        let mut count = 1;
        loop {
            let tok = self.nth(count);
            if tok.span.start != end {
                break;
            }
            match tok.kind {
                TokenKind::Punct(">") if text.len() < 3 => text.push('>'),
                TokenKind::Punct("=") => {
                    text.push('=');
                    count += 1;
                    break;
                }
                _ => break,
            }
            end = tok.span.end;
            count += 1;
        }
        let op = match text.as_str() {
            ">" => ">",
            ">>" => ">>",
            ">>>" => ">>>",
            ">=" => ">=",
            ">>=" => ">>=",
            ">>>=" => ">>>=",
            _ => return None,
        };
        Some((op, count))
    }

    fn modifier_applies(&self) -> bool {
        let next = self.nth(1);
        match &next.kind {
            TokenKind::Ident(_) | TokenKind::Str(_) | TokenKind::Num(_) => true,
            TokenKind::Punct(p) => matches!(*p, "[" | "{" | "*" | "..."),
            _ => false,
        }
    }

    fn decorators(&mut self) -> PResult<()> {
        while self.eat("@") {
            let start = self.start();
            let expr = self.primary()?;
            self.suffixes(expr, start, true)?;
        }
        Ok(())
    }

    // ————————————————————————————————————————————————————————————————————————
    // STATEMENTS
    // ————————————————————————————————————————————————————————————————————————

    fn statement(&mut self) -> PResult<Stmt> {
        if self.at("@") {
            self.decorators()?;
        }
        match self.punct() {
            Some("{") => return Ok(Stmt::Block(self.block()?)),
            Some(";") => {
                self.bump();
                return Ok(Stmt::Empty);
            }
            _ => {}
        }
        if let Some(word) = self.peek().ident().map(str::to_owned) {
            if let Some(stmt) = self.declaration_opt(DeclFlags::default())? {
                return Ok(stmt);
            }
            if let Some(stmt) = self.keyword_statement(&word)? {
                return Ok(stmt);
            }
        }
        let expr = self.expr()?;
        self.semi()?;
        Ok(Stmt::Expr(expr))
    }

    fn block(&mut self) -> PResult<Block> {
        let start = self.start();
        self.expect("{")?;
        let stmts = self.with_in(|p| {
            let mut stmts = Vec::new();
            while !p.at("}") {
                if p.at_eof() {
                    return Err(p.unexpected("'}'"));
                }
                stmts.push(p.statement()?);
            }
            Ok(stmts)
        })?;
        self.expect("}")?;
        Ok(Block { stmts, span: self.span_from(start) })
    }

    fn declaration_opt(&mut self, flags: DeclFlags) -> PResult<Option<Stmt>> {
        let Some(word) = self.peek().ident().map(str::to_owned) else {
            return Ok(None);
        };
        let next = self.nth(1).clone();
        let same_line = !next.newline_before;
        let next_ident = next.ident().is_some() && same_line;
        let stmt = match word.as_str() {
            "interface" if next_ident => Stmt::Interface(self.interface_decl(flags)?),
            "type" if next_ident && (self.nth(2).is_punct("=") || self.nth(2).is_punct("<")) => {
                Stmt::TypeAlias(self.type_alias(flags)?)
            }
            "enum" if next_ident => Stmt::Enum(self.enum_decl(flags)?),
            "const" if next.is_ident("enum") => Stmt::Enum(self.enum_decl(flags)?),
            "const" | "var" => self.var_statement(flags)?,
            "let" if next.ident().is_some() || next.is_punct("[") || next.is_punct("{") => {
                self.var_statement(flags)?
            }
            "function" => Stmt::Function(self.function_decl(flags)?),
            "async" if next.is_ident("function") && same_line => {
                Stmt::Function(self.function_decl(flags)?)
            }
            "class" => Stmt::Class(self.class_decl(flags)?),
            "abstract" if next.is_ident("class") && same_line => Stmt::Class(self.class_decl(flags)?),
            "namespace" | "module"
                if same_line && (next.ident().is_some() || matches!(next.kind, TokenKind::Str(_))) =>
            {
                self.namespace_decl()?
            }
            "global" if next.is_punct("{") => {
                self.bump();
                Stmt::Block(self.block()?)
            }
            _ => return Ok(None),
        };
        Ok(Some(stmt))
    }

    fn keyword_statement(&mut self, word: &str) -> PResult<Option<Stmt>> {
        let next = self.nth(1).clone();
        let stmt = match word {
            "import" if !next.is_punct("(") && !next.is_punct(".") => self.import_decl()?,
            "export" => self.export_decl()?,
            "declare" if next.ident().is_some() && !next.newline_before => {
                self.bump();
                let flags = DeclFlags { declare: true, ..DeclFlags::default() };
                match self.declaration_opt(flags)? {
                    Some(stmt) => stmt,
                    None => return Err(self.unexpected("declaration")),
                }
            }
            "if" => {
                self.bump();
                let test = self.paren_expr()?;
                let cons = Box::new(self.statement()?);
                let alt = if self.eat_kw("else") { Some(Box::new(self.statement()?)) } else { None };
                Stmt::If { test, cons, alt }
            }
            "for" => self.for_stmt()?,
            "while" => {
                self.bump();
                let test = self.paren_expr()?;
                let body = Box::new(self.statement()?);
                Stmt::While { test, body }
            }
            "do" => {
                self.bump();
                let body = Box::new(self.statement()?);
                self.expect_kw("while")?;
                let test = self.paren_expr()?;
                self.eat(";");
                Stmt::DoWhile { body, test }
            }
            "switch" => self.switch_stmt()?,
            "try" => self.try_stmt()?,
            "return" => {
                self.bump();
                let arg = if self.at(";") || self.at("}") || self.at_eof() || self.peek().newline_before {
                    None
                } else {
                    Some(self.expr()?)
                };
                self.semi()?;
                Stmt::Return(arg)
            }
            "throw" => {
                self.bump();
                let arg = self.expr()?;
                self.semi()?;
                Stmt::Throw(arg)
            }
            "break" | "continue" => {
                self.bump();
                if self.peek().ident().is_some() && !self.peek().newline_before {
                    self.bump();
                }
                self.semi()?;
                if word == "break" { Stmt::Break } else { Stmt::Continue }
            }
            "debugger" => {
                self.bump();
                self.semi()?;
                Stmt::Empty
            }
            _ if next.is_punct(":") => {
                let label = self.ident()?;
                self.bump();
                Stmt::Labeled { label, body: Box::new(self.statement()?) }
            }
            _ => return Ok(None),
        };
        Ok(Some(stmt))
    }

    fn paren_expr(&mut self) -> PResult<Expr> {
        self.expect("(")?;
        let expr = self.with_in(|p| p.expr())?;
        self.expect(")")?;
        Ok(expr)
    }

    fn for_stmt(&mut self) -> PResult<Stmt> {
        self.bump();
        self.eat_kw("await");
        self.expect("(")?;
        let init = if self.at(";") {
            None
        } else {
            let saved = std::mem::replace(&mut self.no_in, true);
            let parsed = if self.at_var_keyword() {
                self.var_decl(DeclFlags::default()).map(ForInit::Var)
            } else {
                self.expr().map(ForInit::Expr)
            };
            self.no_in = saved;
            Some(parsed?)
        };
        let init = match init {
            Some(left) if self.at_kw("of") || self.at_kw("in") => {
                self.bump();
                let right = self.with_in(|p| p.assign())?;
                self.expect(")")?;
                let body = Box::new(self.statement()?);
                return Ok(Stmt::ForInOf { left, right, body });
            }
            other => other,
        };
        self.expect(";")?;
        let test = if self.at(";") { None } else { Some(self.with_in(|p| p.expr())?) };
        self.expect(";")?;
        let update = if self.at(")") { None } else { Some(self.with_in(|p| p.expr())?) };
        self.expect(")")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::For { init, test, update, body })
    }

    fn at_var_keyword(&self) -> bool {
        let next = self.nth(1);
        self.at_kw("const")
            || self.at_kw("var")
            || (self.at_kw("let") && (next.ident().is_some() || next.is_punct("[") || next.is_punct("{")))
    }

    fn switch_stmt(&mut self) -> PResult<Stmt> {
        self.bump();
        let discriminant = self.paren_expr()?;
        self.expect("{")?;
        let mut cases = Vec::new();
        while !self.at("}") {
            let test = if self.eat_kw("case") {
                Some(self.with_in(|p| p.expr())?)
            } else {
                self.expect_kw("default")?;
                None
            };
            self.expect(":")?;
            let mut body = Vec::new();
            while !self.at("}") && !self.at_kw("case") && !self.at_kw("default") {
                if self.at_eof() {
                    return Err(self.unexpected("'}'"));
                }
                body.push(self.statement()?);
            }
            cases.push(SwitchCase { test, body });
        }
        self.expect("}")?;
        Ok(Stmt::Switch { discriminant, cases })
    }

    fn try_stmt(&mut self) -> PResult<Stmt> {
        self.bump();
        let block = self.block()?;
        let mut param = None;
        let mut handler = None;
        if self.eat_kw("catch") {
            if self.eat("(") {
                let pat = self.pattern()?;
                if self.eat(":") {
                    self.ty()?;
                }
                self.expect(")")?;
                param = Some(pat);
            }
            handler = Some(self.block()?);
        }
        let finalizer = if self.eat_kw("finally") { Some(self.block()?) } else { None };
        Ok(Stmt::Try { block, param, handler, finalizer })
    }

    fn import_decl(&mut self) -> PResult<Stmt> {
        let start = self.start();
        self.bump();
        if matches!(self.peek().kind, TokenKind::Str(_)) {
            let source = self.string_lit()?;
            self.import_attributes()?;
            self.semi()?;
            let span = self.span_from(start);
            return Ok(Stmt::Import(ImportDecl { clause: None, source, type_only: false, span }));
        }
        let next = self.nth(1);
        let type_only = self.at_kw("type")
            && (next.is_punct("{") || next.is_punct("*") || next.ident().is_some_and(|n| n != "from"));
        if type_only {
            self.bump();
        }
        let mut clause = ImportClause::default();
        if self.peek().ident().is_some() {
            let id = self.ident()?;
            if self.eat("=") {
                // `import x = require("y")`
                self.expr()?;
                self.semi()?;
                return Ok(Stmt::Empty);
            }
            clause.default = Some(id);
            self.eat(",");
        }
        if self.eat("*") {
            self.expect_kw("as")?;
            clause.namespace = Some(self.ident()?);
        } else if self.at("{") {
            clause.named = Some(self.import_specifiers()?);
        }
        self.expect_kw("from")?;
        let source = self.string_lit()?;
        self.import_attributes()?;
        self.semi()?;
        let span = self.span_from(start);
        Ok(Stmt::Import(ImportDecl { clause: Some(clause), source, type_only, span }))
    }

    fn import_attributes(&mut self) -> PResult<()> {
        if (self.at_kw("with") || self.at_kw("assert")) && !self.peek().newline_before {
            self.bump();
            self.object_literal()?;
        }
        Ok(())
    }

    fn import_specifiers(&mut self) -> PResult<Vec<ImportSpecifier>> {
        self.expect("{")?;
        let mut specifiers = Vec::new();
        while !self.at("}") {
            let next = self.nth(1);
            let type_only = self.at_kw("type")
                && (next.ident().is_some() || matches!(next.kind, TokenKind::Str(_)))
                && !(next.is_ident("as") && !self.nth(2).is_ident("as"));
            if type_only {
                self.bump();
            }
            let imported = self.module_export_name()?;
            let local = if self.eat_kw("as") { self.ident()? } else { imported.clone() };
            specifiers.push(ImportSpecifier { imported, local, type_only });
            if !self.eat(",") {
                break;
            }
        }
        self.expect("}")?;
        Ok(specifiers)
    }

    fn module_export_name(&mut self) -> PResult<Ident> {
        if matches!(self.peek().kind, TokenKind::Str(_)) {
            let lit = self.string_lit()?;
            return Ok(Ident { name: lit.value, span: lit.span });
        }
        self.ident()
    }

    fn export_decl(&mut self) -> PResult<Stmt> {
        let start = self.start();
        self.bump();
        if self.eat_kw("default") {
            let flags = DeclFlags { exported: true, default: true, declare: false };
            let next = self.nth(1);
            let is_decl = self.at_kw("function")
                || self.at_kw("class")
                || (self.at_kw("interface") && next.ident().is_some())
                || (self.at_kw("abstract") && next.is_ident("class"))
                || (self.at_kw("async") && next.is_ident("function"));
            if is_decl {
                if let Some(stmt) = self.declaration_opt(flags)? {
                    return Ok(stmt);
                }
            }
            let expr = self.assign()?;
            self.semi()?;
            let span = self.span_from(start);
            return Ok(Stmt::Export(ExportDecl::Default { expr, span }));
        }
        if self.eat("=") {
            self.expr()?;
            self.semi()?;
            return Ok(Stmt::Empty);
        }
        if self.eat_kw("as") {
            // `export as namespace X;`
            self.eat_kw("namespace");
            self.ident()?;
            self.semi()?;
            return Ok(Stmt::Empty);
        }
        if self.at_kw("import") {
            self.bump();
            self.ident()?;
            self.expect("=")?;
            self.expr()?;
            self.semi()?;
            return Ok(Stmt::Empty);
        }
        if self.at_kw("type") && (self.nth(1).is_punct("{") || self.nth(1).is_punct("*")) {
            self.bump();
        }
        if self.eat("*") {
            let alias = if self.eat_kw("as") { Some(self.module_export_name()?) } else { None };
            self.expect_kw("from")?;
            let source = self.string_lit()?;
            self.semi()?;
            let span = self.span_from(start);
            return Ok(Stmt::Export(ExportDecl::All { source, alias, span }));
        }
        if self.at("{") {
            let specifiers = self.export_specifiers()?;
            let source = if self.eat_kw("from") { Some(self.string_lit()?) } else { None };
            self.semi()?;
            let span = self.span_from(start);
            return Ok(Stmt::Export(ExportDecl::Named { specifiers, source, span }));
        }
        let mut flags = DeclFlags { exported: true, ..DeclFlags::default() };
        if self.eat_kw("declare") {
            flags.declare = true;
        }
        match self.declaration_opt(flags)? {
            Some(stmt) => Ok(stmt),
            None => Err(self.unexpected("declaration")),
        }
    }

    fn export_specifiers(&mut self) -> PResult<Vec<ExportSpecifier>> {
        self.expect("{")?;
        let mut specifiers = Vec::new();
        while !self.at("}") {
            if self.at_kw("type") && self.nth(1).ident().is_some() && !self.nth(1).is_ident("as") {
                self.bump();
            }
            let local = self.module_export_name()?;
            let exported = if self.eat_kw("as") { self.module_export_name()? } else { local.clone() };
            specifiers.push(ExportSpecifier { local, exported });
            if !self.eat(",") {
                break;
            }
        }
        self.expect("}")?;
        Ok(specifiers)
    }

    fn namespace_decl(&mut self) -> PResult<Stmt> {
        self.bump();
        if matches!(self.peek().kind, TokenKind::Str(_)) {
            self.bump();
        } else {
            self.ident()?;
            while self.eat(".") {
                self.ident()?;
            }
        }
        if self.at("{") {
            return Ok(Stmt::Block(self.block()?));
        }
        self.semi()?;
        Ok(Stmt::Empty)
    }

    fn interface_decl(&mut self, flags: DeclFlags) -> PResult<InterfaceDecl> {
        let start = self.start();
        self.bump();
        let name = self.ident()?;
        let type_params = self.type_params_opt()?;
        let mut extends = Vec::new();
        if self.eat_kw("extends") {
            loop {
                extends.push(self.type_reference()?);
                if !self.eat(",") {
                    break;
                }
            }
        }
        let members = self.type_members()?;
        let id = self.fresh_id();
        Ok(InterfaceDecl { id, name, type_params, extends, members, flags, span: self.span_from(start) })
    }

    fn type_alias(&mut self, flags: DeclFlags) -> PResult<TypeAliasDecl> {
        let start = self.start();
        self.bump();
        let name = self.ident()?;
        let type_params = self.type_params_opt()?;
        self.expect("=")?;
        let ty = self.ty()?;
        self.semi()?;
        let id = self.fresh_id();
        Ok(TypeAliasDecl { id, name, type_params, ty, flags, span: self.span_from(start) })
    }

    fn enum_decl(&mut self, flags: DeclFlags) -> PResult<EnumDecl> {
        let start = self.start();
        let is_const = self.eat_kw("const");
        self.expect_kw("enum")?;
        let name = self.ident()?;
        self.expect("{")?;
        let mut members = Vec::new();
        while !self.at("}") {
            let member_start = self.start();
            let tok = self.bump();
            let member_name = match tok.kind {
                TokenKind::Ident(name) | TokenKind::Str(name) => name,
                TokenKind::Num(n) => format_number(n),
                _ => return Err(ParseError::new("expected enum member name", tok.span)),
            };
            let init = if self.eat("=") { Some(self.with_in(|p| p.assign())?) } else { None };
            members.push(EnumMember { name: member_name, init, span: self.span_from(member_start) });
            if !self.eat(",") {
                break;
            }
        }
        self.expect("}")?;
        let id = self.fresh_id();
        Ok(EnumDecl { id, name, members, is_const, flags, span: self.span_from(start) })
    }

    fn function_decl(&mut self, flags: DeclFlags) -> PResult<FunctionDecl> {
        let start = self.start();
        let is_async = self.eat_kw("async");
        self.expect_kw("function")?;
        let is_generator = self.eat("*");
        let name = if matches!(self.peek().kind, TokenKind::Ident(_)) { Some(self.ident()?) } else { None };
        let func = self.function_rest(is_async, is_generator)?;
        if func.body.is_none() {
            self.semi()?;
        }
        let id = self.fresh_id();
        Ok(FunctionDecl { id, name, func, flags, span: self.span_from(start) })
    }

    /// Type parameters, parameters, return type and optional body.
    fn function_rest(&mut self, is_async: bool, is_generator: bool) -> PResult<Function> {
        let type_params = self.type_params_opt()?;
        let params = self.params()?;
        let ret = if self.eat(":") { Some(self.return_type()?) } else { None };
        let body = if self.at("{") { Some(self.block()?) } else { None };
        Ok(Function { type_params, params, ret, body, is_async, is_generator })
    }

    fn params(&mut self) -> PResult<Vec<Param>> {
        self.expect("(")?;
        let params = self.with_in(|p| {
            let mut params = Vec::new();
            while !p.at(")") {
                params.push(p.param()?);
                if !p.eat(",") {
                    break;
                }
            }
            Ok(params)
        })?;
        self.expect(")")?;
        Ok(params)
    }

    fn param(&mut self) -> PResult<Param> {
        self.decorators()?;
        while self.peek().ident().is_some_and(|w| PARAM_MODIFIERS.contains(&w)) && self.modifier_applies() {
            self.bump();
        }
        let rest = self.eat("...");
        let pat = self.pattern()?;
        let optional = self.eat("?");
        let ty = if self.eat(":") { Some(self.ty()?) } else { None };
        let default = if self.eat("=") { Some(self.assign()?) } else { None };
        Ok(Param { pat, optional, ty, default, rest })
    }

    fn class_decl(&mut self, flags: DeclFlags) -> PResult<ClassDecl> {
        let start = self.start();
        self.eat_kw("abstract");
        self.expect_kw("class")?;
        let name = if self.peek().ident().is_some() && !self.at_kw("extends") && !self.at_kw("implements") {
            Some(self.ident()?)
        } else {
            None
        };
        let type_params = self.type_params_opt()?;
        let extends = if self.eat_kw("extends") {
            let heritage_start = self.start();
            let base = self.primary()?;
            let base = self.suffixes(base, heritage_start, true)?;
            if self.at("<") {
                self.type_args()?;
            }
            Some(base)
        } else {
            None
        };
        let mut implements = Vec::new();
        if self.eat_kw("implements") {
            loop {
                implements.push(self.type_reference()?);
                if !self.eat(",") {
                    break;
                }
            }
        }
        let members = self.class_body()?;
        let id = self.fresh_id();
        Ok(ClassDecl { id, name, type_params, extends, implements, members, flags, span: self.span_from(start) })
    }

    fn class_body(&mut self) -> PResult<Vec<ClassMember>> {
        self.expect("{")?;
        let mut members = Vec::new();
        while !self.at("}") {
            if self.eat(";") {
                continue;
            }
            if self.at_eof() {
                return Err(self.unexpected("'}'"));
            }
            members.push(self.class_member()?);
        }
        self.expect("}")?;
        Ok(members)
    }

    fn class_member(&mut self) -> PResult<ClassMember> {
        self.decorators()?;
        let mut is_static = false;
        let mut is_async = false;
        while let Some(word) = self.peek().ident() {
            if !CLASS_MODIFIERS.contains(&word) || !self.modifier_applies() {
                break;
            }
            match word {
                "static" => is_static = true,
                "async" => is_async = true,
                _ => {}
            }
            self.bump();
        }
        if is_static && self.at("{") {
            return Ok(ClassMember::StaticBlock(self.block()?));
        }
        if self.index_signature_ahead() {
            let (key, value) = self.index_signature()?;
            self.semi()?;
            return Ok(ClassMember::Index { key, value });
        }
        let mut kind = MethodKind::Method;
        if (self.at_kw("get") || self.at_kw("set")) && self.modifier_applies() {
            kind = if self.at_kw("get") { MethodKind::Getter } else { MethodKind::Setter };
            self.bump();
        }
        let is_generator = self.eat("*");
        let key = self.prop_key()?;
        if matches!(&key, PropKey::Ident(name) if name == "constructor") && self.at("(") {
            kind = MethodKind::Constructor;
        }
        self.eat("?");
        self.eat("!");
        if self.at("(") || self.at("<") {
            let func = self.function_rest(is_async, is_generator)?;
            if func.body.is_none() {
                self.semi()?;
            }
            return Ok(ClassMember::Method { key, func, kind, is_static });
        }
        let ty = if self.eat(":") { Some(self.ty()?) } else { None };
        let init = if self.eat("=") { Some(self.with_in(|p| p.assign())?) } else { None };
        self.semi()?;
        Ok(ClassMember::Property { key, ty, init, is_static })
    }

    fn var_statement(&mut self, flags: DeclFlags) -> PResult<Stmt> {
        let decl = self.var_decl(flags)?;
        self.semi()?;
        Ok(Stmt::Var(decl))
    }

    fn var_decl(&mut self, flags: DeclFlags) -> PResult<VarDecl> {
        let start = self.start();
        let kind = match self.bump().ident() {
            Some("const") => VarKind::Const,
            Some("let") => VarKind::Let,
            _ => VarKind::Var,
        };
        let mut decls = Vec::new();
        loop {
            let decl_start = self.start();
            let pat = self.pattern()?;
            self.eat("!");
            let ty = if self.eat(":") { Some(self.ty()?) } else { None };
            let init = if self.eat("=") { Some(self.assign()?) } else { None };
            decls.push(VarDeclarator { pat, ty, init, span: self.span_from(decl_start) });
            if !self.eat(",") {
                break;
            }
        }
        Ok(VarDecl { kind, decls, flags, span: self.span_from(start) })
    }

    fn pattern(&mut self) -> PResult<Pattern> {
        match self.punct() {
            Some("{") => self.object_pattern(),
            Some("[") => self.array_pattern(),
            _ => Ok(Pattern::Ident(self.ident()?)),
        }
    }

    fn object_pattern(&mut self) -> PResult<Pattern> {
        self.expect("{")?;
        let mut props = Vec::new();
        let mut rest = None;
        while !self.at("}") {
            if self.eat("...") {
                rest = Some(Box::new(self.pattern()?));
            } else {
                let key_start = self.start();
                let key = self.prop_key()?;
                let value = if self.eat(":") {
                    self.pattern()?
                } else {
                    match &key {
                        PropKey::Ident(name) => {
                            Pattern::Ident(Ident { name: name.clone(), span: self.span_from(key_start) })
                        }
                        _ => return Err(self.unexpected("':'")),
                    }
                };
                let default = if self.eat("=") { Some(self.with_in(|p| p.assign())?) } else { None };
                props.push(PatternProp { key, value, default });
            }
            if !self.eat(",") {
                break;
            }
        }
        self.expect("}")?;
        Ok(Pattern::Object { props, rest })
    }

    fn array_pattern(&mut self) -> PResult<Pattern> {
        self.expect("[")?;
        let mut elems = Vec::new();
        let mut rest = None;
        while !self.at("]") {
            if self.eat(",") {
                elems.push(None);
                continue;
            }
            if self.eat("...") {
                rest = Some(Box::new(self.pattern()?));
            } else {
                let pat = self.pattern()?;
                let default = if self.eat("=") { Some(self.with_in(|p| p.assign())?) } else { None };
                elems.push(Some(PatternElem { pat, default }));
            }
            if !self.eat(",") {
                break;
            }
        }
        self.expect("]")?;
        Ok(Pattern::Array { elems, rest })
    }

    // ————————————————————————————————————————————————————————————————————————
    // EXPRESSIONS
    // ————————————————————————————————————————————————————————————————————————

    fn expr(&mut self) -> PResult<Expr> {
        let start = self.start();
        let first = self.assign()?;
        if !self.at(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(",") {
            items.push(self.assign()?);
        }
        Ok(Expr { kind: ExprKind::Seq(items), span: self.span_from(start) })
    }

    fn arrow_hint(&self) -> ArrowHint {
        let mut offset = 0;
        let second = self.nth(1);
        if self.at_kw("async")
            && !second.newline_before
            && (second.ident().is_some() || second.is_punct("(") || second.is_punct("<"))
        {
            offset = 1;
        }
        let tok = self.nth(offset);
        match &tok.kind {
            TokenKind::Ident(_) if self.nth(offset + 1).is_punct("=>") => ArrowHint::Certain,
            TokenKind::Punct("(") => match self.matching_paren(self.pos + offset) {
                Some(close) if self.token_at(close + 1).is_punct("=>") => ArrowHint::Certain,
                Some(close) if self.token_at(close + 1).is_punct(":") => ArrowHint::Maybe,
                _ => ArrowHint::No,
            },
            TokenKind::Punct("<") => ArrowHint::Maybe,
            _ => ArrowHint::No,
        }
    }

    fn assign(&mut self) -> PResult<Expr> {
        match self.arrow_hint() {
            ArrowHint::Certain => return self.arrow(),
            ArrowHint::Maybe => {
                if let Some(arrow) = self.attempt(|p| p.arrow()) {
                    return Ok(arrow);
                }
            }
            ArrowHint::No => {}
        }
        if self.at_kw("yield") {
            return self.yield_expr();
        }
        let start = self.start();
        let target = self.conditional()?;
        let op = match self.gt_operator() {
            Some((op, n)) if op.ends_with('=') && op != ">=" => Some((op, n)),
            Some(_) => None,
            None => match self.punct() {
                Some(
                    op @ ("=" | "+=" | "-=" | "*=" | "/=" | "%=" | "**=" | "<<=" | "&=" | "|=" | "^="
                    | "&&=" | "||=" | "??="),
                ) => Some((op, 1)),
                _ => None,
            },
        };
        let Some((op, count)) = op else {
            return Ok(target);
        };
        for _ in 0..count {
            self.bump();
        }
        let value = self.assign()?;
        Ok(Expr {
            kind: ExprKind::Assign { op, target: Box::new(target), value: Box::new(value) },
            span: self.span_from(start),
        })
    }

    fn yield_expr(&mut self) -> PResult<Expr> {
        let start = self.start();
        self.bump();
        let delegate = self.eat("*");
        let ends = self.peek().newline_before
            || self.at_eof()
            || matches!(self.punct(), Some(")" | "]" | "}" | "," | ";" | ":"));
        let arg = if ends { None } else { Some(Box::new(self.assign()?)) };
        Ok(Expr { kind: ExprKind::Yield { arg, delegate }, span: self.span_from(start) })
    }

    fn arrow(&mut self) -> PResult<Expr> {
        let start = self.start();
        let next = self.nth(1);
        let is_async = self.at_kw("async")
            && !next.newline_before
            && (next.ident().is_some() || next.is_punct("(") || next.is_punct("<"));
        if is_async {
            self.bump();
        }
        let type_params = self.type_params_opt()?;
        let (params, ret) = if self.at("(") {
            let params = self.params()?;
            let ret = if self.eat(":") { Some(self.return_type()?) } else { None };
            (params, ret)
        } else {
            let name = self.ident()?;
            let param = Param { pat: Pattern::Ident(name), optional: false, ty: None, default: None, rest: false };
            (vec![param], None)
        };
        self.expect("=>")?;
        let body = if self.at("{") {
            ArrowBody::Block(self.block()?)
        } else {
            ArrowBody::Expr(self.assign()?)
        };
        let arrow = ArrowFn { type_params, params, ret, body, is_async };
        Ok(Expr { kind: ExprKind::Arrow(Box::new(arrow)), span: self.span_from(start) })
    }

    fn conditional(&mut self) -> PResult<Expr> {
        let start = self.start();
        let test = self.binary(1)?;
        if !self.eat("?") {
            return Ok(test);
        }
        let cons = self.with_in(|p| p.assign())?;
        self.expect(":")?;
        let alt = self.assign()?;
        Ok(Expr {
            kind: ExprKind::Cond { test: Box::new(test), cons: Box::new(cons), alt: Box::new(alt) },
            span: self.span_from(start),
        })
    }

    fn binary_op(&self) -> Option<(&'static str, u8, usize)> {
        if let Some((op, count)) = self.gt_operator() {
            let prec = match op {
                ">" | ">=" => 8,
                ">>" | ">>>" => 9,
                _ => return None,
            };
            return Some((op, prec, count));
        }
        let op = match &self.peek().kind {
            TokenKind::Punct(p) => *p,
            TokenKind::Ident(name) if name == "instanceof" => "instanceof",
            TokenKind::Ident(name) if name == "in" && !self.no_in => "in",
            _ => return None,
        };
        let prec = match op {
            "??" => 1,
            "||" => 2,
            "&&" => 3,
            "|" => 4,
            "^" => 5,
            "&" => 6,
            "==" | "!=" | "===" | "!==" => 7,
            "<" | "<=" | "instanceof" | "in" => 8,
            "<<" => 9,
            "+" | "-" => 10,
            "*" | "/" | "%" => 11,
            "**" => 12,
            _ => return None,
        };
        Some((op, prec, 1))
    }

    fn binary(&mut self, min_prec: u8) -> PResult<Expr> {
        let start = self.start();
        let mut left = self.unary()?;
        loop {
            if (self.at_kw("as") || self.at_kw("satisfies")) && !self.peek().newline_before && min_prec <= 8 {
                let satisfies = self.at_kw("satisfies");
                self.bump();
                let ty = if self.at_kw("const") {
                    let name = self.ident()?;
                    let span = name.span;
                    TypeNode { kind: TypeNodeKind::Ref { name: vec![name], args: Vec::new() }, span }
                } else {
                    self.ty()?
                };
                let expr = Box::new(left);
                let kind = if satisfies { ExprKind::Satisfies { expr, ty } } else { ExprKind::As { expr, ty } };
                left = Expr { kind, span: self.span_from(start) };
                continue;
            }
            let Some((op, prec, count)) = self.binary_op() else {
                break;
            };
            if prec < min_prec {
                break;
            }
            for _ in 0..count {
                self.bump();
            }
            let next_min = if op == "**" { prec } else { prec + 1 };
            let right = self.binary(next_min)?;
            left = Expr {
                kind: ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) },
                span: self.span_from(start),
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> PResult<Expr> {
        let start = self.start();
        match self.punct() {
            Some(op @ ("!" | "~" | "+" | "-")) => {
                self.bump();
                let arg = Box::new(self.unary()?);
                return Ok(Expr { kind: ExprKind::Unary { op, arg }, span: self.span_from(start) });
            }
            Some(op @ ("++" | "--")) => {
                self.bump();
                let arg = Box::new(self.unary()?);
                return Ok(Expr { kind: ExprKind::Update { op, prefix: true, arg }, span: self.span_from(start) });
            }
            Some("<") => {
                self.bump();
                let ty = self.ty()?;
                self.expect(">")?;
                let expr = Box::new(self.unary()?);
                return Ok(Expr { kind: ExprKind::TypeAssertion { ty, expr }, span: self.span_from(start) });
            }
            _ => {}
        }
        let keyword = match self.peek().ident() {
            Some("typeof") => Some("typeof"),
            Some("void") => Some("void"),
            Some("delete") => Some("delete"),
            Some("await") => Some("await"),
            _ => None,
        };
        if let Some(op) = keyword {
            self.bump();
            let arg = Box::new(self.unary()?);
            return Ok(Expr { kind: ExprKind::Unary { op, arg }, span: self.span_from(start) });
        }
        let primary = self.primary()?;
        let expr = self.suffixes(primary, start, true)?;
        if let Some(op @ ("++" | "--")) = self.punct() {
            if !self.peek().newline_before {
                self.bump();
                let arg = Box::new(expr);
                return Ok(Expr { kind: ExprKind::Update { op, prefix: false, arg }, span: self.span_from(start) });
            }
        }
        Ok(expr)
    }

    /// Member access, calls, indexing and postfix `!` after a primary.
    fn suffixes(&mut self, mut expr: Expr, start: u32, allow_call: bool) -> PResult<Expr> {
        loop {
            let kind = match self.punct() {
                Some(".") => {
                    self.bump();
                    let prop = self.ident()?;
                    ExprKind::Member { object: Box::new(expr), prop, optional: false }
                }
                Some("?.") => {
                    self.bump();
                    if self.at("(") || self.at("<") {
                        let type_args = if self.at("<") { self.type_args()? } else { Vec::new() };
                        self.call(expr, type_args, true)?
                    } else if self.eat("[") {
                        let index = self.with_in(|p| p.expr())?;
                        self.expect("]")?;
                        ExprKind::Index { object: Box::new(expr), index: Box::new(index), optional: true }
                    } else {
                        let prop = self.ident()?;
                        ExprKind::Member { object: Box::new(expr), prop, optional: true }
                    }
                }
                Some("[") => {
                    self.bump();
                    let index = self.with_in(|p| p.expr())?;
                    self.expect("]")?;
                    ExprKind::Index { object: Box::new(expr), index: Box::new(index), optional: false }
                }
                Some("(") if allow_call => self.call(expr, Vec::new(), false)?,
                Some("<") if allow_call => {
                    let type_args = self.attempt(|p| {
                        let args = p.type_args()?;
                        if p.at("(") || matches!(p.peek().kind, TokenKind::Template(_)) {
                            Ok(args)
                        } else {
                            Err(p.unexpected("'('"))
                        }
                    });
                    match type_args {
                        Some(type_args) if self.at("(") => self.call(expr, type_args, false)?,
                        Some(_) => self.tagged_template(expr)?,
                        None => break,
                    }
                }
                Some("!") if !self.peek().newline_before => {
                    self.bump();
                    ExprKind::NonNull(Box::new(expr))
                }
                _ if allow_call && matches!(self.peek().kind, TokenKind::Template(_)) => {
                    self.tagged_template(expr)?
                }
                _ => break,
            };
            expr = Expr { kind, span: self.span_from(start) };
        }
        Ok(expr)
    }

    fn tagged_template(&mut self, tag: Expr) -> PResult<ExprKind> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Template(raw) => {
                self.bump();
                let substitutions = self.substitutions(&raw, tok.span)?;
                Ok(ExprKind::TaggedTemplate { tag: Box::new(tag), raw, substitutions })
            }
            _ => Err(self.unexpected("template literal")),
        }
    }

    /// Parses each `${...}` of a template token as an expression of its own.
    fn substitutions(&mut self, raw: &str, span: Span) -> PResult<Vec<Expr>> {
        let base = span.start + 1;
        let mut exprs = Vec::new();
        for sub in template_substitutions(raw, base)? {
            let text = &raw[(sub.start - base) as usize..(sub.end - base) as usize];
            let tokens = tokenize_at(text, sub.start)?;
            let mut inner = Parser { tokens, pos: 0, next_id: self.next_id, no_in: false, no_conditional: false };
            let expr = inner.expr()?;
            if !inner.at_eof() {
                return Err(inner.unexpected("'}'"));
            }
            self.next_id = inner.next_id;
            exprs.push(expr);
        }
        Ok(exprs)
    }

    fn call(&mut self, callee: Expr, type_args: Vec<TypeNode>, optional: bool) -> PResult<ExprKind> {
        let (args, close_paren, trailing_comma) = self.arguments()?;
        Ok(ExprKind::Call(Box::new(CallExpr { callee, type_args, args, optional, close_paren, trailing_comma })))
    }

    fn arguments(&mut self) -> PResult<(Vec<Arg>, u32, bool)> {
        self.expect("(")?;
        let mut args = Vec::new();
        let mut trailing_comma = false;
        self.with_in(|p| {
            while !p.at(")") {
                let spread = p.eat("...");
                let expr = p.assign()?;
                args.push(Arg { spread, expr });
                if !p.eat(",") {
                    break;
                }
                trailing_comma = p.at(")");
            }
            Ok(())
        })?;
        let close = self.expect(")")?;
        Ok((args, close.start, trailing_comma))
    }

    fn primary(&mut self) -> PResult<Expr> {
        let start = self.start();
        let kind = match self.peek().kind.clone() {
            TokenKind::Num(n) => {
                self.bump();
                ExprKind::Num(n)
            }
            TokenKind::Str(s) => {
                self.bump();
                ExprKind::Str(s)
            }
            TokenKind::Template(raw) => {
                let span = self.bump().span;
                let substitutions = self.substitutions(&raw, span)?;
                ExprKind::Template { raw, substitutions }
            }
            TokenKind::Regex(re) => {
                self.bump();
                ExprKind::Regex(re)
            }
            TokenKind::Punct("(") => {
                self.bump();
                let inner = self.with_in(|p| p.expr())?;
                self.expect(")")?;
                ExprKind::Paren(Box::new(inner))
            }
            TokenKind::Punct("[") => ExprKind::Array(self.with_in(|p| p.array_literal())?),
            TokenKind::Punct("{") => ExprKind::Object(self.with_in(|p| p.object_literal())?),
            TokenKind::Ident(name) => match name.as_str() {
                "this" => {
                    self.bump();
                    ExprKind::This
                }
                "super" => {
                    self.bump();
                    ExprKind::Super
                }
                "null" => {
                    self.bump();
                    ExprKind::Null
                }
                "true" | "false" => {
                    self.bump();
                    ExprKind::Bool(name == "true")
                }
                "function" => self.function_expr(false)?,
                "async" if self.nth(1).is_ident("function") && !self.nth(1).newline_before => {
                    self.bump();
                    self.function_expr(true)?
                }
                "class" | "abstract" if name == "class" || self.nth(1).is_ident("class") => {
                    ExprKind::Class(Box::new(self.class_decl(DeclFlags::default())?))
                }
                "new" => self.new_expr()?,
                _ => {
                    self.bump();
                    ExprKind::Ident(name)
                }
            },
            _ => return Err(self.unexpected("expression")),
        };
        Ok(Expr { kind, span: self.span_from(start) })
    }

    fn function_expr(&mut self, is_async: bool) -> PResult<ExprKind> {
        self.expect_kw("function")?;
        let is_generator = self.eat("*");
        let name = if matches!(self.peek().kind, TokenKind::Ident(_)) { Some(self.ident()?) } else { None };
        let func = self.function_rest(is_async, is_generator)?;
        if func.body.is_none() {
            return Err(self.unexpected("'{'"));
        }
        Ok(ExprKind::Function { name, func: Box::new(func) })
    }

    fn new_expr(&mut self) -> PResult<ExprKind> {
        let new_tok = self.bump();
        if self.eat(".") {
            // `new.target`
            let prop = self.ident()?;
            let object = Expr { kind: ExprKind::Ident("new".into()), span: new_tok.span };
            return Ok(ExprKind::Member { object: Box::new(object), prop, optional: false });
        }
        let callee_start = self.start();
        let callee = self.primary()?;
        let callee = self.suffixes(callee, callee_start, false)?;
        let type_args = if self.at("<") { self.attempt(|p| p.type_args()).unwrap_or_default() } else { Vec::new() };
        let args = if self.at("(") { self.arguments()?.0 } else { Vec::new() };
        Ok(ExprKind::New { callee: Box::new(callee), type_args, args })
    }

    fn array_literal(&mut self) -> PResult<Vec<Option<Arg>>> {
        self.expect("[")?;
        let mut elems = Vec::new();
        while !self.at("]") {
            if self.eat(",") {
                elems.push(None);
                continue;
            }
            let spread = self.eat("...");
            let expr = self.assign()?;
            elems.push(Some(Arg { spread, expr }));
            if !self.eat(",") {
                break;
            }
        }
        self.expect("]")?;
        Ok(elems)
    }

    fn object_literal(&mut self) -> PResult<Vec<ObjectProp>> {
        self.expect("{")?;
        let mut props = Vec::new();
        while !self.at("}") {
            props.push(self.object_prop()?);
            if !self.eat(",") {
                break;
            }
        }
        self.expect("}")?;
        Ok(props)
    }

    fn object_prop(&mut self) -> PResult<ObjectProp> {
        if self.eat("...") {
            return Ok(ObjectProp::Spread(self.assign()?));
        }
        let mut kind = MethodKind::Method;
        let mut is_async = false;
        if self.modifier_applies() {
            match self.peek().ident() {
                Some("get") => kind = MethodKind::Getter,
                Some("set") => kind = MethodKind::Setter,
                Some("async") => is_async = true,
                _ => {}
            }
            if kind != MethodKind::Method || is_async {
                self.bump();
            }
        }
        let is_generator = self.eat("*");
        let key_start = self.start();
        let key = self.prop_key()?;
        if self.at("(") || self.at("<") {
            let func = self.function_rest(is_async, is_generator)?;
            return Ok(ObjectProp::Method { key, func, kind });
        }
        if self.eat(":") {
            return Ok(ObjectProp::KeyValue { key, value: self.assign()? });
        }
        let PropKey::Ident(name) = key else {
            return Err(self.unexpected("':'"));
        };
        let ident = Ident { name, span: self.span_from(key_start) };
        if self.eat("=") {
            // cover grammar for destructuring assignment defaults
            self.assign()?;
        }
        Ok(ObjectProp::Shorthand(ident))
    }

    fn prop_key(&mut self) -> PResult<PropKey> {
        let tok = self.bump();
        Ok(match tok.kind {
            TokenKind::Ident(name) => PropKey::Ident(name),
            TokenKind::Str(s) => PropKey::Str(s),
            TokenKind::Num(n) => PropKey::Num(n),
            TokenKind::Punct("[") => {
                let expr = self.with_in(|p| p.assign())?;
                self.expect("]")?;
                PropKey::Computed(Box::new(expr))
            }
            _ => return Err(ParseError::new("expected property name", tok.span)),
        })
    }

    // ————————————————————————————————————————————————————————————————————————
    // TYPES
    // ————————————————————————————————————————————————————————————————————————

    fn ty(&mut self) -> PResult<TypeNode> {
        let start = self.start();
        if self.at_function_type() {
            return self.function_type();
        }
        let check = self.union_type()?;
        if self.no_conditional || !self.at_kw("extends") || self.peek().newline_before {
            return Ok(check);
        }
        self.bump();
        let saved = std::mem::replace(&mut self.no_conditional, true);
        let extends = self.ty();
        self.no_conditional = saved;
        let extends = extends?;
        self.expect("?")?;
        let true_ty = self.ty()?;
        self.expect(":")?;
        let false_ty = self.ty()?;
        Ok(TypeNode {
            kind: TypeNodeKind::Conditional {
                check: Box::new(check),
                extends: Box::new(extends),
                true_ty: Box::new(true_ty),
                false_ty: Box::new(false_ty),
            },
            span: self.span_from(start),
        })
    }

    /// A type in a nested position where conditional types are allowed again.
    fn nested_ty(&mut self) -> PResult<TypeNode> {
        let saved = std::mem::replace(&mut self.no_conditional, false);
        let out = self.ty();
        self.no_conditional = saved;
        out
    }

    fn at_function_type(&self) -> bool {
        if self.at("<") || self.at_kw("new") {
            return true;
        }
        if self.at_kw("abstract") && self.nth(1).is_ident("new") {
            return true;
        }
        self.at("(")
            && self
                .matching_paren(self.pos)
                .is_some_and(|close| self.token_at(close + 1).is_punct("=>"))
    }

    fn function_type(&mut self) -> PResult<TypeNode> {
        let start = self.start();
        self.eat_kw("abstract");
        self.eat_kw("new");
        let type_params = self.type_params_opt()?;
        let params = self.params()?;
        self.expect("=>")?;
        let ret = self.return_type()?;
        Ok(TypeNode {
            kind: TypeNodeKind::Function { type_params, params, ret: Box::new(ret) },
            span: self.span_from(start),
        })
    }

    fn return_type(&mut self) -> PResult<TypeNode> {
        let start = self.start();
        let next = self.nth(1);
        let asserts = self.at_kw("asserts") && next.ident().is_some() && !next.is_ident("is") && !next.newline_before;
        if asserts {
            self.bump();
        }
        let next = self.nth(1);
        if self.peek().ident().is_some() && next.is_ident("is") && !next.newline_before {
            let param = self.ident()?;
            self.bump();
            let ty = self.ty()?;
            return Ok(TypeNode {
                kind: TypeNodeKind::Predicate { param, ty: Some(Box::new(ty)), asserts },
                span: self.span_from(start),
            });
        }
        if asserts {
            let param = self.ident()?;
            return Ok(TypeNode {
                kind: TypeNodeKind::Predicate { param, ty: None, asserts },
                span: self.span_from(start),
            });
        }
        self.ty()
    }

    fn union_type(&mut self) -> PResult<TypeNode> {
        let start = self.start();
        self.eat("|");
        let first = self.intersection_type()?;
        if !self.at("|") {
            return Ok(first);
        }
        let mut types = vec![first];
        while self.eat("|") {
            types.push(self.intersection_type()?);
        }
        Ok(TypeNode { kind: TypeNodeKind::Union(types), span: self.span_from(start) })
    }

    fn intersection_type(&mut self) -> PResult<TypeNode> {
        let start = self.start();
        self.eat("&");
        let first = self.type_operator()?;
        if !self.at("&") {
            return Ok(first);
        }
        let mut types = vec![first];
        while self.eat("&") {
            types.push(self.type_operator()?);
        }
        Ok(TypeNode { kind: TypeNodeKind::Intersection(types), span: self.span_from(start) })
    }

    fn type_operator(&mut self) -> PResult<TypeNode> {
        let start = self.start();
        let op = match self.peek().ident() {
            Some("keyof") => Some("keyof"),
            Some("unique") => Some("unique"),
            Some("readonly") => Some("readonly"),
            _ => None,
        };
        if let Some(op) = op {
            if self.modifier_applies() || self.nth(1).is_punct("(") {
                self.bump();
                let ty = Box::new(self.type_operator()?);
                return Ok(TypeNode { kind: TypeNodeKind::Operator { op, ty }, span: self.span_from(start) });
            }
        }
        if self.at_kw("infer") && self.nth(1).ident().is_some() {
            self.bump();
            let name = self.ident()?;
            return Ok(TypeNode { kind: TypeNodeKind::Infer(name), span: self.span_from(start) });
        }
        self.postfix_type()
    }

    fn postfix_type(&mut self) -> PResult<TypeNode> {
        let start = self.start();
        let mut ty = self.primary_type()?;
        while self.at("[") && !self.peek().newline_before {
            self.bump();
            let kind = if self.eat("]") {
                TypeNodeKind::Array(Box::new(ty))
            } else {
                let index = self.nested_ty()?;
                self.expect("]")?;
                TypeNodeKind::IndexedAccess { object: Box::new(ty), index: Box::new(index) }
            };
            ty = TypeNode { kind, span: self.span_from(start) };
        }
        Ok(ty)
    }

    fn primary_type(&mut self) -> PResult<TypeNode> {
        let start = self.start();
        let kind = match self.peek().kind.clone() {
            TokenKind::Punct("(") => {
                self.bump();
                let inner = self.nested_ty()?;
                self.expect(")")?;
                TypeNodeKind::Paren(Box::new(inner))
            }
            TokenKind::Punct("{") => {
                if self.mapped_type_ahead() {
                    self.mapped_type()?
                } else {
                    let members = self.type_members()?;
                    let id = self.fresh_id();
                    TypeNodeKind::Object { id, members }
                }
            }
            TokenKind::Punct("[") => TypeNodeKind::Tuple(self.tuple_elems()?),
            TokenKind::Punct("-") => {
                self.bump();
                let tok = self.bump();
                match tok.kind {
                    TokenKind::Num(n) => TypeNodeKind::Literal(LiteralType::Num(-n)),
                    _ => return Err(ParseError::new("expected numeric literal", tok.span)),
                }
            }
            TokenKind::Str(s) => {
                self.bump();
                TypeNodeKind::Literal(LiteralType::Str(s))
            }
            TokenKind::Num(n) => {
                self.bump();
                TypeNodeKind::Literal(LiteralType::Num(n))
            }
            TokenKind::Template(raw) => {
                self.bump();
                TypeNodeKind::TemplateLiteral(raw)
            }
            TokenKind::Ident(name) => match name.as_str() {
                "true" | "false" => {
                    self.bump();
                    TypeNodeKind::Literal(LiteralType::Bool(name == "true"))
                }
                "this" => {
                    self.bump();
                    TypeNodeKind::This
                }
                "typeof" => {
                    self.bump();
                    if self.at_kw("import") {
                        self.import_type()?
                    } else {
                        let mut path = vec![self.ident()?];
                        while self.eat(".") {
                            path.push(self.ident()?);
                        }
                        TypeNodeKind::Typeof(path)
                    }
                }
                "import" => self.import_type()?,
                _ => match KeywordType::from_name(&name) {
                    Some(keyword) if !self.nth(1).is_punct(".") => {
                        self.bump();
                        TypeNodeKind::Keyword(keyword)
                    }
                    _ => return self.type_reference(),
                },
            },
            _ => return Err(self.unexpected("type")),
        };
        Ok(TypeNode { kind, span: self.span_from(start) })
    }

    /// `import("mod").Name<Args>`
    fn import_type(&mut self) -> PResult<TypeNodeKind> {
        self.expect_kw("import")?;
        self.expect("(")?;
        self.string_lit()?;
        self.expect(")")?;
        let mut name = Vec::new();
        while self.eat(".") {
            name.push(self.ident()?);
        }
        if name.is_empty() {
            return Err(self.unexpected("'.'"));
        }
        let args = if self.at("<") { self.type_args()? } else { Vec::new() };
        Ok(TypeNodeKind::Ref { name, args })
    }

    fn type_reference(&mut self) -> PResult<TypeNode> {
        let start = self.start();
        let mut name = vec![self.ident()?];
        while self.at(".") && self.nth(1).ident().is_some() {
            self.bump();
            name.push(self.ident()?);
        }
        let args = if self.at("<") && !self.peek().newline_before { self.type_args()? } else { Vec::new() };
        Ok(TypeNode { kind: TypeNodeKind::Ref { name, args }, span: self.span_from(start) })
    }

    fn type_args(&mut self) -> PResult<Vec<TypeNode>> {
        self.expect("<")?;
        let mut args = Vec::new();
        while !self.at(">") {
            args.push(self.nested_ty()?);
            if !self.eat(",") {
                break;
            }
        }
        self.expect(">")?;
        Ok(args)
    }

    fn type_params_opt(&mut self) -> PResult<Vec<TypeParam>> {
        if !self.at("<") {
            return Ok(Vec::new());
        }
        self.bump();
        let mut params = Vec::new();
        while !self.at(">") {
            while (self.at_kw("in") || self.at_kw("out") || self.at_kw("const")) && self.nth(1).ident().is_some() {
                self.bump();
            }
            let name = self.ident()?;
            let constraint = if self.eat_kw("extends") { Some(self.nested_ty()?) } else { None };
            let default = if self.eat("=") { Some(self.nested_ty()?) } else { None };
            params.push(TypeParam { name, constraint, default });
            if !self.eat(",") {
                break;
            }
        }
        self.expect(">")?;
        Ok(params)
    }

    fn tuple_elems(&mut self) -> PResult<Vec<TupleElem>> {
        self.expect("[")?;
        let mut elems = Vec::new();
        while !self.at("]") {
            let rest = self.eat("...");
            let next = self.nth(1);
            let labelled = self.peek().ident().is_some()
                && (next.is_punct(":") || (next.is_punct("?") && self.nth(2).is_punct(":")));
            if labelled {
                self.bump();
                let optional = self.eat("?");
                self.expect(":")?;
                let ty = self.nested_ty()?;
                elems.push(TupleElem { ty, optional, rest });
            } else {
                let ty = self.nested_ty()?;
                let optional = self.eat("?");
                elems.push(TupleElem { ty, optional, rest });
            }
            if !self.eat(",") {
                break;
            }
        }
        self.expect("]")?;
        Ok(elems)
    }

    fn mapped_type_ahead(&self) -> bool {
        let mut i = 1;
        if self.nth(i).is_punct("+") || self.nth(i).is_punct("-") {
            i += 1;
        }
        if self.nth(i).is_ident("readonly") {
            i += 1;
        }
        self.nth(i).is_punct("[") && self.nth(i + 1).ident().is_some() && self.nth(i + 2).is_ident("in")
    }

    fn mapped_type(&mut self) -> PResult<TypeNodeKind> {
        self.expect("{")?;
        if !self.eat("+") {
            self.eat("-");
        }
        self.eat_kw("readonly");
        self.expect("[")?;
        let param = self.ident()?;
        self.expect_kw("in")?;
        let constraint = Box::new(self.nested_ty()?);
        if self.eat_kw("as") {
            self.nested_ty()?;
        }
        self.expect("]")?;
        if !self.eat("+") {
            self.eat("-");
        }
        self.eat("?");
        let value = if self.eat(":") { Some(Box::new(self.nested_ty()?)) } else { None };
        if !self.eat(";") {
            self.eat(",");
        }
        self.expect("}")?;
        Ok(TypeNodeKind::Mapped { param, constraint, value })
    }

    fn type_members(&mut self) -> PResult<Vec<TypeMember>> {
        self.expect("{")?;
        let mut members = Vec::new();
        while !self.at("}") {
            if self.at_eof() {
                return Err(self.unexpected("'}'"));
            }
            members.push(self.type_member()?);
            if !(self.eat(";") || self.eat(",")) && !self.at("}") && !self.peek().newline_before {
                return Err(self.unexpected("';'"));
            }
        }
        self.expect("}")?;
        Ok(members)
    }

    fn type_member(&mut self) -> PResult<TypeMember> {
        let start = self.start();
        if self.at("(") || self.at("<") {
            let func = self.signature()?;
            return Ok(TypeMember::Call { func, span: self.span_from(start) });
        }
        if self.at_kw("new") && (self.nth(1).is_punct("(") || self.nth(1).is_punct("<")) {
            self.bump();
            let func = self.signature()?;
            return Ok(TypeMember::Call { func, span: self.span_from(start) });
        }
        let readonly = self.at_kw("readonly") && self.modifier_applies();
        if readonly {
            self.bump();
        }
        if self.index_signature_ahead() {
            let (key, value) = self.index_signature()?;
            return Ok(TypeMember::Index { key, value, span: self.span_from(start) });
        }
        if (self.at_kw("get") || self.at_kw("set")) && self.modifier_applies() {
            self.bump();
            let key = self.prop_key()?;
            let func = self.signature()?;
            return Ok(TypeMember::Method { key, optional: false, func, span: self.span_from(start) });
        }
        let key = self.prop_key()?;
        let optional = self.eat("?");
        if self.at("(") || self.at("<") {
            let func = self.signature()?;
            return Ok(TypeMember::Method { key, optional, func, span: self.span_from(start) });
        }
        let ty = if self.eat(":") { Some(self.nested_ty()?) } else { None };
        Ok(TypeMember::Property { key, optional, readonly, ty, span: self.span_from(start) })
    }

    fn signature(&mut self) -> PResult<Function> {
        let type_params = self.type_params_opt()?;
        let params = self.params()?;
        let ret = if self.eat(":") { Some(self.return_type()?) } else { None };
        Ok(Function { type_params, params, ret, body: None, is_async: false, is_generator: false })
    }

    fn index_signature_ahead(&self) -> bool {
        self.at("[") && self.nth(1).ident().is_some() && self.nth(2).is_punct(":")
    }

    fn index_signature(&mut self) -> PResult<(TypeNode, TypeNode)> {
        self.expect("[")?;
        self.ident()?;
        self.expect(":")?;
        let key = self.nested_ty()?;
        self.expect("]")?;
        self.eat("?");
        self.expect(":")?;
        let value = self.nested_ty()?;
        Ok((key, value))
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Ident(name) => format!("'{name}'"),
        TokenKind::Str(_) => "string literal".into(),
        TokenKind::Num(n) => format!("'{}'", format_number(*n)),
        TokenKind::Template(_) => "template literal".into(),
        TokenKind::Regex(_) => "regular expression".into(),
        TokenKind::Punct(p) => format!("'{p}'"),
        TokenKind::Eof => "end of file".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Module {
        parse_module(src).unwrap_or_else(|e| panic!("parse failed: {e} at {:?}", e.span))
    }

    fn only_expr(src: &str) -> Expr {
        match parse(src).body.into_iter().next() {
            Some(Stmt::Expr(expr)) => expr,
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn generic_call_records_close_paren_and_trailing_comma() {
        let src = "assertIsType<Foo>(raw,);";
        let ExprKind::Call(call) = only_expr(src).kind else { panic!("expected call") };
        assert_eq!(call.type_args.len(), 1);
        assert_eq!(call.args.len(), 1);
        assert!(call.trailing_comma);
        assert_eq!(&src[call.close_paren as usize..call.close_paren as usize + 1], ")");
    }

    #[test]
    fn comparison_is_not_mistaken_for_type_arguments() {
        let expr = only_expr("a < b && c > d;");
        assert!(matches!(expr.kind, ExprKind::Binary { op: "&&", .. }));
    }

    #[test]
    fn shift_operators_are_glued() {
        let ExprKind::Binary { op, .. } = only_expr("x >>> 2;").kind else { panic!() };
        assert_eq!(op, ">>>");
        let ExprKind::Assign { op, .. } = only_expr("x >>= 1;").kind else { panic!() };
        assert_eq!(op, ">>=");
        let ExprKind::Binary { op, .. } = only_expr("x >= 1;").kind else { panic!() };
        assert_eq!(op, ">=");
    }

    #[test]
    fn nested_generic_types_close() {
        let module = parse("let a: Array<Array<number>> = [];");
        let Some(Stmt::Var(decl)) = module.body.first() else { panic!() };
        let Some(TypeNode { kind: TypeNodeKind::Ref { args, .. }, .. }) = &decl.decls[0].ty else { panic!() };
        assert!(matches!(&args[0].kind, TypeNodeKind::Ref { args, .. } if args.len() == 1));
    }

    #[test]
    fn import_clause_shapes() {
        let module = parse(
            "import def from 'a';\nimport * as ns from \"b\";\nimport { x, y as z } from 'c';\nimport 'd';",
        );
        let imports: Vec<_> = module
            .body
            .iter()
            .filter_map(|s| match s {
                Stmt::Import(decl) => Some(decl),
                _ => None,
            })
            .collect();
        assert_eq!(imports.len(), 4);
        assert_eq!(imports[0].clause.as_ref().and_then(|c| c.default.as_ref()).map(|i| i.name.as_str()), Some("def"));
        assert!(imports[1].clause.as_ref().is_some_and(|c| c.namespace.is_some()));
        let named = imports[2].clause.as_ref().and_then(|c| c.named.as_ref()).unwrap();
        assert_eq!(named[1].imported.name, "y");
        assert_eq!(named[1].local.name, "z");
        assert!(imports[3].clause.is_none());
        assert_eq!(imports[2].source.value, "c");
    }

    #[test]
    fn declarations_get_distinct_node_ids() {
        let module = parse(
            "export interface A { a: string; b?: { c: number } }\nexport type B = { d: boolean };\nenum E { X = 'x', Y = 2, Z }",
        );
        let mut ids = Vec::new();
        for stmt in &module.body {
            match stmt {
                Stmt::Interface(decl) => {
                    assert!(decl.flags.exported);
                    ids.push(decl.id);
                }
                Stmt::TypeAlias(decl) => ids.push(decl.id),
                Stmt::Enum(decl) => {
                    assert_eq!(decl.members.len(), 3);
                    ids.push(decl.id);
                }
                _ => {}
            }
        }
        let mut deduped = ids.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(ids.len(), 3);
        assert_eq!(deduped.len(), 3);
    }

    #[test]
    fn arrow_functions_and_parenthesized_expressions() {
        let expr = only_expr("(a: number, b) => a + b;");
        assert!(matches!(expr.kind, ExprKind::Arrow(_)));
        let expr = only_expr("(a + b) * c;");
        assert!(matches!(expr.kind, ExprKind::Binary { op: "*", .. }));
        let expr = only_expr("x ? (y) : z;");
        assert!(matches!(expr.kind, ExprKind::Cond { .. }));
    }

    #[test]
    fn casts_parse_both_spellings() {
        assert!(matches!(only_expr("f(x) as Foo;").kind, ExprKind::As { .. }));
        assert!(matches!(only_expr("<Foo>f(x);").kind, ExprKind::TypeAssertion { .. }));
    }

    #[test]
    fn semicolons_are_inserted_at_line_breaks() {
        let module = parse("let a = 1\nlet b = a\nb++\n");
        assert_eq!(module.body.len(), 3);
    }

    #[test]
    fn missing_semicolon_on_one_line_is_an_error() {
        assert!(parse_module("let a = 1 let b = 2").is_err());
    }

    #[test]
    fn class_and_function_bodies() {
        let module = parse(
            "export class Box<T> extends Base implements I {\n  private value?: T;\n  static count = 0;\n  constructor(private readonly v: T) { super(); }\n  get size(): number { return 1 }\n}\nexport function f<T = X>(data: unknown): data is T { return true; }\nexport declare function g(arg: never): never;",
        );
        assert_eq!(module.body.len(), 3);
        let Stmt::Function(decl) = &module.body[1] else { panic!() };
        assert!(decl.func.type_params[0].default.is_some());
        assert!(matches!(decl.func.ret.as_ref().map(|t| &t.kind), Some(TypeNodeKind::Predicate { .. })));
    }
}
