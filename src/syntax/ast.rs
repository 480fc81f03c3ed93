//! Syntax tree for the supported TypeScript subset.
//!
//! Nodes the checker needs to refer to later (declarations and object type
//! literals) carry a [`NodeId`] unique within their file.
use super::Span;

pub type NodeId = u32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrLit {
    pub value: String,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Module {
    pub body: Vec<Stmt>,
}

// ————————————————————————————————————————————————————————————————————————————
// STATEMENTS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone)]
pub enum Stmt {
    Import(ImportDecl),
    Export(ExportDecl),
    Interface(InterfaceDecl),
    TypeAlias(TypeAliasDecl),
    Enum(EnumDecl),
    Function(FunctionDecl),
    Class(ClassDecl),
    Var(VarDecl),
    Expr(Expr),
    Block(Block),
    If { test: Expr, cons: Box<Stmt>, alt: Option<Box<Stmt>> },
    For { init: Option<ForInit>, test: Option<Expr>, update: Option<Expr>, body: Box<Stmt> },
    ForInOf { left: ForInit, right: Expr, body: Box<Stmt> },
    While { test: Expr, body: Box<Stmt> },
    DoWhile { body: Box<Stmt>, test: Expr },
    Switch { discriminant: Expr, cases: Vec<SwitchCase> },
    Try { block: Block, param: Option<Pattern>, handler: Option<Block>, finalizer: Option<Block> },
    Return(Option<Expr>),
    Throw(Expr),
    Labeled { label: Ident, body: Box<Stmt> },
    Break,
    Continue,
    Empty,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ForInit {
    Var(VarDecl),
    Expr(Expr),
}

#[derive(Debug, Clone)]
pub struct SwitchCase {
    pub test: Option<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct ImportDecl {
    pub clause: Option<ImportClause>,
    pub source: StrLit,
    pub type_only: bool,
    pub span: Span,
}

#[derive(Debug, Clone, Default)]
pub struct ImportClause {
    pub default: Option<Ident>,
    pub namespace: Option<Ident>,
    pub named: Option<Vec<ImportSpecifier>>,
}

#[derive(Debug, Clone)]
pub struct ImportSpecifier {
    pub imported: Ident,
    pub local: Ident,
    pub type_only: bool,
}

#[derive(Debug, Clone)]
pub enum ExportDecl {
    Named { specifiers: Vec<ExportSpecifier>, source: Option<StrLit>, span: Span },
    All { source: StrLit, alias: Option<Ident>, span: Span },
    Default { expr: Expr, span: Span },
}

#[derive(Debug, Clone)]
pub struct ExportSpecifier {
    pub local: Ident,
    pub exported: Ident,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeclFlags {
    pub exported: bool,
    pub default: bool,
    pub declare: bool,
}

#[derive(Debug, Clone)]
pub struct InterfaceDecl {
    pub id: NodeId,
    pub name: Ident,
    pub type_params: Vec<TypeParam>,
    pub extends: Vec<TypeNode>,
    pub members: Vec<TypeMember>,
    pub flags: DeclFlags,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct TypeAliasDecl {
    pub id: NodeId,
    pub name: Ident,
    pub type_params: Vec<TypeParam>,
    pub ty: TypeNode,
    pub flags: DeclFlags,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct EnumDecl {
    pub id: NodeId,
    pub name: Ident,
    pub members: Vec<EnumMember>,
    pub is_const: bool,
    pub flags: DeclFlags,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct EnumMember {
    pub name: String,
    pub init: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub id: NodeId,
    pub name: Option<Ident>,
    pub func: Function,
    pub flags: DeclFlags,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub type_params: Vec<TypeParam>,
    pub params: Vec<Param>,
    pub ret: Option<TypeNode>,
    pub body: Option<Block>,
    pub is_async: bool,
    pub is_generator: bool,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub pat: Pattern,
    pub optional: bool,
    pub ty: Option<TypeNode>,
    pub default: Option<Expr>,
    pub rest: bool,
}

#[derive(Debug, Clone)]
pub struct ClassDecl {
    pub id: NodeId,
    pub name: Option<Ident>,
    pub type_params: Vec<TypeParam>,
    pub extends: Option<Expr>,
    pub implements: Vec<TypeNode>,
    pub members: Vec<ClassMember>,
    pub flags: DeclFlags,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ClassMember {
    Property { key: PropKey, ty: Option<TypeNode>, init: Option<Expr>, is_static: bool },
    Method { key: PropKey, func: Function, kind: MethodKind, is_static: bool },
    Index { key: TypeNode, value: TypeNode },
    StaticBlock(Block),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Method,
    Getter,
    Setter,
    Constructor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Var,
    Let,
    Const,
}

#[derive(Debug, Clone)]
pub struct VarDecl {
    pub kind: VarKind,
    pub decls: Vec<VarDeclarator>,
    pub flags: DeclFlags,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct VarDeclarator {
    pub pat: Pattern,
    pub ty: Option<TypeNode>,
    pub init: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum Pattern {
    Ident(Ident),
    Object { props: Vec<PatternProp>, rest: Option<Box<Pattern>> },
    Array { elems: Vec<Option<PatternElem>>, rest: Option<Box<Pattern>> },
}

#[derive(Debug, Clone)]
pub struct PatternProp {
    pub key: PropKey,
    pub value: Pattern,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct PatternElem {
    pub pat: Pattern,
    pub default: Option<Expr>,
}

impl Pattern {
    /// Every identifier this pattern binds, in source order.
    pub fn bound_names(&self) -> Vec<&Ident> {
        let mut out = Vec::new();
        self.collect_names(&mut out);
        out
    }

    fn collect_names<'a>(&'a self, out: &mut Vec<&'a Ident>) {
        match self {
            Pattern::Ident(id) => out.push(id),
            Pattern::Object { props, rest } => {
                for prop in props {
                    prop.value.collect_names(out);
                }
                if let Some(rest) = rest {
                    rest.collect_names(out);
                }
            }
            Pattern::Array { elems, rest } => {
                for elem in elems.iter().flatten() {
                    elem.pat.collect_names(out);
                }
                if let Some(rest) = rest {
                    rest.collect_names(out);
                }
            }
        }
    }

    pub fn as_ident(&self) -> Option<&Ident> {
        match self {
            Pattern::Ident(id) => Some(id),
            _ => None,
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// EXPRESSIONS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Ident(String),
    This,
    Super,
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    Template { raw: String, substitutions: Vec<Expr> },
    TaggedTemplate { tag: Box<Expr>, raw: String, substitutions: Vec<Expr> },
    Regex(String),
    Array(Vec<Option<Arg>>),
    Object(Vec<ObjectProp>),
    Paren(Box<Expr>),
    Arrow(Box<ArrowFn>),
    Function { name: Option<Ident>, func: Box<Function> },
    Class(Box<ClassDecl>),
    Call(Box<CallExpr>),
    New { callee: Box<Expr>, type_args: Vec<TypeNode>, args: Vec<Arg> },
    Member { object: Box<Expr>, prop: Ident, optional: bool },
    Index { object: Box<Expr>, index: Box<Expr>, optional: bool },
    Unary { op: &'static str, arg: Box<Expr> },
    Update { op: &'static str, prefix: bool, arg: Box<Expr> },
    Binary { op: &'static str, left: Box<Expr>, right: Box<Expr> },
    Assign { op: &'static str, target: Box<Expr>, value: Box<Expr> },
    Cond { test: Box<Expr>, cons: Box<Expr>, alt: Box<Expr> },
    As { expr: Box<Expr>, ty: TypeNode },
    Satisfies { expr: Box<Expr>, ty: TypeNode },
    TypeAssertion { ty: TypeNode, expr: Box<Expr> },
    NonNull(Box<Expr>),
    Yield { arg: Option<Box<Expr>>, delegate: bool },
    Seq(Vec<Expr>),
}

#[derive(Debug, Clone)]
pub struct CallExpr {
    pub callee: Expr,
    pub type_args: Vec<TypeNode>,
    pub args: Vec<Arg>,
    pub optional: bool,
    /// Offset of the closing parenthesis.
    pub close_paren: u32,
    pub trailing_comma: bool,
}

#[derive(Debug, Clone)]
pub struct Arg {
    pub spread: bool,
    pub expr: Expr,
}

#[derive(Debug, Clone)]
pub enum ObjectProp {
    KeyValue { key: PropKey, value: Expr },
    Shorthand(Ident),
    Spread(Expr),
    Method { key: PropKey, func: Function, kind: MethodKind },
}

#[derive(Debug, Clone)]
pub enum PropKey {
    Ident(String),
    Str(String),
    Num(f64),
    Computed(Box<Expr>),
}

impl PropKey {
    /// The static property name, if the key is not computed.
    pub fn name(&self) -> Option<String> {
        match self {
            PropKey::Ident(s) | PropKey::Str(s) => Some(s.clone()),
            PropKey::Num(n) => Some(crate::syntax::ast::format_number(*n)),
            PropKey::Computed(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArrowFn {
    pub type_params: Vec<TypeParam>,
    pub params: Vec<Param>,
    pub ret: Option<TypeNode>,
    pub body: ArrowBody,
    pub is_async: bool,
}

#[derive(Debug, Clone)]
pub enum ArrowBody {
    Block(Block),
    Expr(Expr),
}

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone)]
pub struct TypeParam {
    pub name: Ident,
    pub constraint: Option<TypeNode>,
    pub default: Option<TypeNode>,
}

#[derive(Debug, Clone)]
pub struct TypeNode {
    pub kind: TypeNodeKind,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeywordType {
    String,
    Number,
    Boolean,
    BigInt,
    Symbol,
    Any,
    Unknown,
    Never,
    Void,
    Null,
    Undefined,
    Object,
}

impl KeywordType {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "string" => Self::String,
            "number" => Self::Number,
            "boolean" => Self::Boolean,
            "bigint" => Self::BigInt,
            "symbol" => Self::Symbol,
            "any" => Self::Any,
            "unknown" => Self::Unknown,
            "never" => Self::Never,
            "void" => Self::Void,
            "null" => Self::Null,
            "undefined" => Self::Undefined,
            "object" => Self::Object,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::BigInt => "bigint",
            Self::Symbol => "symbol",
            Self::Any => "any",
            Self::Unknown => "unknown",
            Self::Never => "never",
            Self::Void => "void",
            Self::Null => "null",
            Self::Undefined => "undefined",
            Self::Object => "object",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiteralType {
    Str(String),
    Num(f64),
    Bool(bool),
}

#[derive(Debug, Clone)]
pub enum TypeNodeKind {
    Keyword(KeywordType),
    Literal(LiteralType),
    /// `A`, `A.B`, `A<T>`.
    Ref { name: Vec<Ident>, args: Vec<TypeNode> },
    Array(Box<TypeNode>),
    Tuple(Vec<TupleElem>),
    Union(Vec<TypeNode>),
    Intersection(Vec<TypeNode>),
    Object { id: NodeId, members: Vec<TypeMember> },
    Paren(Box<TypeNode>),
    Function { type_params: Vec<TypeParam>, params: Vec<Param>, ret: Box<TypeNode> },
    /// `x is T` in a return position.
    Predicate { param: Ident, ty: Option<Box<TypeNode>>, asserts: bool },
    Typeof(Vec<Ident>),
    Operator { op: &'static str, ty: Box<TypeNode> },
    IndexedAccess { object: Box<TypeNode>, index: Box<TypeNode> },
    Conditional {
        check: Box<TypeNode>,
        extends: Box<TypeNode>,
        true_ty: Box<TypeNode>,
        false_ty: Box<TypeNode>,
    },
    Mapped { param: Ident, constraint: Box<TypeNode>, value: Option<Box<TypeNode>> },
    Infer(Ident),
    /// Raw text between the backticks.
    TemplateLiteral(String),
    This,
}

#[derive(Debug, Clone)]
pub struct TupleElem {
    pub ty: TypeNode,
    pub optional: bool,
    pub rest: bool,
}

#[derive(Debug, Clone)]
pub enum TypeMember {
    Property { key: PropKey, optional: bool, readonly: bool, ty: Option<TypeNode>, span: Span },
    Method { key: PropKey, optional: bool, func: Function, span: Span },
    Index { key: TypeNode, value: TypeNode, span: Span },
    Call { func: Function, span: Span },
}

impl TypeMember {
    pub fn span(&self) -> Span {
        match self {
            TypeMember::Property { span, .. }
            | TypeMember::Method { span, .. }
            | TypeMember::Index { span, .. }
            | TypeMember::Call { span, .. } => *span,
        }
    }
}

/// Formats a number the way JavaScript prints it for integral values.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}
