//! Name resolution and type construction.
//!
//! Module scopes are built once up front. Types are interned on demand as
//! annotations get resolved, so asking for the same instantiation twice
//! hands back the same [`TypeId`].
use std::collections::HashMap;

use indexmap::IndexMap;
use ordered_float::OrderedFloat;

use crate::syntax::{
    ClassDecl, EnumDecl, Expr, ExprKind, ExportDecl, FunctionDecl, Ident, InterfaceDecl, KeywordType, LiteralType,
    Module, Pattern, Stmt, TypeAliasDecl, TypeMember, TypeNode, TypeNodeKind, TypeParam, VarDeclarator, format_number,
};

use super::program::Program;
use super::scope::{LocalScope, LocalValue};
use super::types::*;
use super::{EnumInit, EnumMemberInfo, HostError, Member, MemberKind, TypeHost, VarLookup};

/// Bound on import/export hops and initializer chains.
const MAX_HOPS: usize = 32;

/// Library types that are accepted in annotations but not modelled.
const GLOBAL_TYPES: &[&str] = &[
    "Record", "Partial", "Required", "Readonly", "Pick", "Omit", "Exclude", "Extract", "NonNullable",
    "ReturnType", "Parameters", "InstanceType", "Awaited", "Promise", "PromiseLike", "Map", "Set", "WeakMap",
    "WeakSet", "ReadonlyMap", "ReadonlySet", "Date", "RegExp", "Error", "Function", "Object", "String", "Number",
    "Boolean", "Symbol", "BigInt", "ArrayBuffer", "Uint8Array", "Iterable", "Iterator", "AsyncIterable",
];

// ————————————————————————————————————————————————————————————————————————————
// MODULE SCOPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy)]
pub enum Decl<'p> {
    Interface(&'p InterfaceDecl),
    Alias(&'p TypeAliasDecl),
    Enum(&'p EnumDecl),
    Class(&'p ClassDecl),
    Function(&'p FunctionDecl),
    Var(&'p VarDeclarator),
}

#[derive(Debug, Clone, Copy)]
enum Binding<'p> {
    Local(Decl<'p>),
    Import { specifier: &'p str, name: &'p str },
    Namespace { specifier: &'p str },
}

#[derive(Debug, Clone, Copy)]
enum Export<'p> {
    Local(&'p str),
    /// Anonymous default export.
    Decl(Decl<'p>),
    Reexport { specifier: &'p str, name: &'p str },
    Namespace { specifier: &'p str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Space {
    Type,
    Value,
}

#[derive(Debug, Clone, Copy)]
enum Symbol<'p> {
    Decl { file: FileId, decl: Decl<'p> },
    Module(FileId),
}

#[derive(Debug, Default)]
struct ModuleScope<'p> {
    types: HashMap<&'p str, Binding<'p>>,
    values: HashMap<&'p str, Binding<'p>>,
    exports: HashMap<&'p str, Export<'p>>,
    star_exports: Vec<&'p str>,
}

impl<'p> ModuleScope<'p> {
    fn build(file: FileId, module: &'p Module, decls: &mut HashMap<DeclRef, Decl<'p>>) -> Self {
        let mut scope = Self::default();
        for stmt in &module.body {
            match stmt {
                Stmt::Import(import) => {
                    let Some(clause) = &import.clause else { continue };
                    let specifier = import.source.value.as_str();
                    if let Some(local) = &clause.default {
                        scope.bind(&local.name, Binding::Import { specifier, name: "default" });
                    }
                    if let Some(local) = &clause.namespace {
                        scope.bind(&local.name, Binding::Namespace { specifier });
                    }
                    for spec in clause.named.iter().flatten() {
                        scope.bind(&spec.local.name, Binding::Import { specifier, name: &spec.imported.name });
                    }
                }
                Stmt::Export(ExportDecl::Named { specifiers, source, .. }) => {
                    for spec in specifiers {
                        let export = match source {
                            Some(source) => Export::Reexport { specifier: &source.value, name: &spec.local.name },
                            None => Export::Local(&spec.local.name),
                        };
                        scope.exports.insert(&spec.exported.name, export);
                    }
                }
                Stmt::Export(ExportDecl::All { source, alias, .. }) => match alias {
                    Some(alias) => {
                        scope.exports.insert(&alias.name, Export::Namespace { specifier: &source.value });
                    }
                    None => scope.star_exports.push(&source.value),
                },
                Stmt::Export(ExportDecl::Default { expr, .. }) => {
                    if let ExprKind::Ident(name) = &expr.kind {
                        scope.exports.insert("default", Export::Local(name));
                    }
                }
                Stmt::Interface(d) => {
                    decls.insert(DeclRef { file, node: d.id }, Decl::Interface(d));
                    scope.declare(Some(&d.name), Decl::Interface(d), d.flags.exported, d.flags.default, Space::Type);
                }
                Stmt::TypeAlias(d) => {
                    decls.insert(DeclRef { file, node: d.id }, Decl::Alias(d));
                    scope.declare(Some(&d.name), Decl::Alias(d), d.flags.exported, d.flags.default, Space::Type);
                }
                Stmt::Enum(d) => {
                    decls.insert(DeclRef { file, node: d.id }, Decl::Enum(d));
                    scope.declare(Some(&d.name), Decl::Enum(d), d.flags.exported, d.flags.default, Space::Type);
                    scope.declare(Some(&d.name), Decl::Enum(d), false, false, Space::Value);
                }
                Stmt::Class(d) => {
                    decls.insert(DeclRef { file, node: d.id }, Decl::Class(d));
                    scope.declare(d.name.as_ref(), Decl::Class(d), d.flags.exported, d.flags.default, Space::Type);
                    scope.declare(d.name.as_ref(), Decl::Class(d), false, false, Space::Value);
                }
                Stmt::Function(d) => {
                    decls.insert(DeclRef { file, node: d.id }, Decl::Function(d));
                    scope.declare(d.name.as_ref(), Decl::Function(d), d.flags.exported, d.flags.default, Space::Value);
                }
                Stmt::Var(var) => {
                    for declarator in &var.decls {
                        if let Pattern::Ident(id) = &declarator.pat {
                            scope.declare(Some(id), Decl::Var(declarator), var.flags.exported, false, Space::Value);
                        }
                    }
                }
                _ => {}
            }
        }
        scope
    }

    /// Imports bind both spaces; the target decides which one is meaningful.
    fn bind(&mut self, name: &'p str, binding: Binding<'p>) {
        self.types.entry(name).or_insert(binding);
        self.values.entry(name).or_insert(binding);
    }

    /// First declaration of a name wins.
    fn declare(&mut self, name: Option<&'p Ident>, decl: Decl<'p>, exported: bool, default: bool, space: Space) {
        if let Some(name) = name {
            let map = match space {
                Space::Type => &mut self.types,
                Space::Value => &mut self.values,
            };
            map.entry(name.name.as_str()).or_insert(Binding::Local(decl));
        }
        if !exported {
            return;
        }
        let export = match name {
            Some(name) => Export::Local(name.name.as_str()),
            None => Export::Decl(decl),
        };
        match (default, name) {
            (true, _) => {
                self.exports.insert("default", export);
            }
            (false, Some(name)) => {
                self.exports.insert(name.name.as_str(), export);
            }
            (false, None) => {}
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// TYPE ENVIRONMENTS
// ————————————————————————————————————————————————————————————————————————————

/// Type parameter bindings; later bindings shadow earlier ones.
#[derive(Debug, Clone, Default)]
struct TypeEnv {
    bindings: Subst,
}

impl TypeEnv {
    fn from_params(params: &[TypeParam], args: &[TypeId]) -> Self {
        let bindings = params.iter().zip(args).map(|(param, ty)| (param.name.name.clone(), *ty)).collect();
        Self { bindings }
    }

    fn bind(&mut self, name: impl Into<String>, ty: TypeId) {
        self.bindings.push((name.into(), ty));
    }

    fn get(&self, name: &str) -> Option<TypeId> {
        self.bindings.iter().rev().find(|(bound, _)| bound == name).map(|(_, ty)| *ty)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// CHECKER
// ————————————————————————————————————————————————————————————————————————————

pub struct Checker<'p> {
    program: &'p Program,
    arena: TypeArena,
    modules: Vec<ModuleScope<'p>>,
    decls: HashMap<DeclRef, Decl<'p>>,
    /// Object type literal nodes that have been resolved at least once.
    literals: HashMap<DeclRef, &'p TypeNode>,
}

impl<'p> Checker<'p> {
    pub fn new(program: &'p Program) -> Self {
        let mut decls = HashMap::new();
        let modules = program
            .files()
            .iter()
            .enumerate()
            .map(|(file, source)| ModuleScope::build(file, &source.module, &mut decls))
            .collect();
        Self { program, arena: TypeArena::new(), modules, decls, literals: HashMap::new() }
    }

    pub fn program(&self) -> &'p Program {
        self.program
    }

    /// The declared type `name` in `file`'s module scope, with default type
    /// arguments applied.
    pub fn named_type(&mut self, file: FileId, name: &str) -> Result<TypeId, HostError> {
        let symbol = self.lookup(file, name, Space::Type, 0)?;
        self.instantiate(symbol, Vec::new(), name)
    }

    /// Names of the interfaces, aliases and enums `file` declares, in source order.
    pub fn declared_type_names(&self, file: FileId) -> Vec<&'p str> {
        let module = &self.program.file(file).module;
        module
            .body
            .iter()
            .filter_map(|stmt| match stmt {
                Stmt::Interface(d) => Some(d.name.name.as_str()),
                Stmt::TypeAlias(d) => Some(d.name.name.as_str()),
                Stmt::Enum(d) => Some(d.name.name.as_str()),
                _ => None,
            })
            .collect()
    }

    fn intern(&mut self, kind: TypeKind) -> TypeId {
        self.arena.intern(kind)
    }

    fn snippet(&self, file: FileId, span: crate::syntax::Span) -> String {
        self.program.file(file).snippet(span).split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn resolve_module(&self, file: FileId, specifier: &str) -> Result<FileId, HostError> {
        self.program
            .resolve_module(file, specifier)
            .ok_or_else(|| HostError::UnresolvedModule(specifier.to_string()))
    }

    // ----- symbols -----

    fn lookup(&self, file: FileId, name: &str, space: Space, hops: usize) -> Result<Symbol<'p>, HostError> {
        if hops > MAX_HOPS {
            return Err(HostError::UnresolvedName(name.to_string()));
        }
        let scope = &self.modules[file];
        let bindings = match space {
            Space::Type => &scope.types,
            Space::Value => &scope.values,
        };
        match bindings.get(name).copied() {
            Some(Binding::Local(decl)) => Ok(Symbol::Decl { file, decl }),
            Some(Binding::Import { specifier, name }) => {
                let target = self.resolve_module(file, specifier)?;
                self.export(target, name, space, hops + 1)
            }
            Some(Binding::Namespace { specifier }) => Ok(Symbol::Module(self.resolve_module(file, specifier)?)),
            None => Err(HostError::UnresolvedName(name.to_string())),
        }
    }

    fn export(&self, file: FileId, name: &str, space: Space, hops: usize) -> Result<Symbol<'p>, HostError> {
        if hops > MAX_HOPS {
            return Err(HostError::UnresolvedName(name.to_string()));
        }
        let scope = &self.modules[file];
        match scope.exports.get(name).copied() {
            Some(Export::Local(local)) => return self.lookup(file, local, space, hops + 1),
            Some(Export::Decl(decl)) => return Ok(Symbol::Decl { file, decl }),
            Some(Export::Reexport { specifier, name }) => {
                let target = self.resolve_module(file, specifier)?;
                return self.export(target, name, space, hops + 1);
            }
            Some(Export::Namespace { specifier }) => return Ok(Symbol::Module(self.resolve_module(file, specifier)?)),
            None => {}
        }
        if name != "default" {
            for specifier in &scope.star_exports {
                let Ok(target) = self.resolve_module(file, specifier) else { continue };
                if let Ok(symbol) = self.export(target, name, space, hops + 1) {
                    return Ok(symbol);
                }
            }
        }
        Err(HostError::MissingExport {
            module: self.program.file(file).path.display().to_string(),
            name: name.to_string(),
        })
    }

    // ----- type resolution -----

    fn resolve_type(&mut self, file: FileId, node: &'p TypeNode, env: &TypeEnv) -> Result<TypeId, HostError> {
        let kind = match &node.kind {
            TypeNodeKind::Keyword(keyword) => keyword_kind(*keyword),
            TypeNodeKind::Literal(literal) => TypeKind::Literal(match literal {
                LiteralType::Str(s) => LiteralValue::Str(s.clone()),
                LiteralType::Num(n) => LiteralValue::Num(OrderedFloat(*n)),
                LiteralType::Bool(b) => LiteralValue::Bool(*b),
            }),
            TypeNodeKind::Ref { name, args } => return self.resolve_reference(file, node, name, args, env),
            TypeNodeKind::Array(elem) => TypeKind::Array(self.resolve_type(file, elem, env)?),
            TypeNodeKind::Tuple(elems) => {
                let mut members = Vec::with_capacity(elems.len());
                for elem in elems {
                    let ty = self.resolve_type(file, &elem.ty, env)?;
                    members.push(TupleMember { ty, optional: elem.optional, rest: elem.rest });
                }
                TypeKind::Tuple(members)
            }
            TypeNodeKind::Union(items) => TypeKind::Union(self.resolve_all(file, items, env)?),
            TypeNodeKind::Intersection(items) => TypeKind::Intersection(self.resolve_all(file, items, env)?),
            TypeNodeKind::Object { id, .. } => {
                let decl = DeclRef { file, node: *id };
                self.literals.insert(decl, node);
                TypeKind::ObjectLiteral { decl, subst: env.bindings.clone() }
            }
            TypeNodeKind::Paren(inner) => return self.resolve_type(file, inner, env),
            TypeNodeKind::Function { type_params, ret, .. } => self.function_kind(file, type_params, Some(&**ret), env),
            TypeNodeKind::Predicate { .. } => TypeKind::Primitive(PrimitiveKind::Boolean),
            TypeNodeKind::Typeof(path) => {
                return match self.value_path_type(file, path) {
                    Some(ty) => Ok(ty),
                    None => Ok(self.opaque(file, node)),
                };
            }
            _ => TypeKind::Opaque(self.snippet(file, node.span)),
        };
        Ok(self.intern(kind))
    }

    fn resolve_all(&mut self, file: FileId, nodes: &'p [TypeNode], env: &TypeEnv) -> Result<Vec<TypeId>, HostError> {
        nodes.iter().map(|node| self.resolve_type(file, node, env)).collect()
    }

    fn opaque(&mut self, file: FileId, node: &TypeNode) -> TypeId {
        let text = self.snippet(file, node.span);
        self.intern(TypeKind::Opaque(text))
    }

    fn resolve_reference(
        &mut self,
        file: FileId,
        node: &'p TypeNode,
        path: &'p [Ident],
        args: &'p [TypeNode],
        env: &TypeEnv,
    ) -> Result<TypeId, HostError> {
        let Some((head, rest)) = path.split_first() else {
            return Err(HostError::UnresolvedName(String::new()));
        };
        let qualified = path.iter().map(|segment| segment.name.as_str()).collect::<Vec<_>>().join(".");
        if rest.is_empty() {
            if let Some(ty) = env.get(&head.name) {
                if !args.is_empty() {
                    return Err(HostError::Arity { name: qualified, expected: 0, got: args.len() });
                }
                return Ok(ty);
            }
        }
        let args = self.resolve_all(file, args, env)?;
        let mut symbol = match self.lookup(file, &head.name, Space::Type, 0) {
            Ok(symbol) => symbol,
            Err(HostError::UnresolvedName(_)) if rest.is_empty() => {
                return self.global_type(file, node, &head.name, args);
            }
            Err(err) => return Err(err),
        };
        for segment in rest {
            symbol = match symbol {
                Symbol::Module(target) => self.export(target, &segment.name, Space::Type, 0)?,
                // `E.Member` is a literal of one enum member.
                Symbol::Decl { decl: Decl::Enum(_), .. } => return Ok(self.opaque(file, node)),
                Symbol::Decl { .. } => return Err(HostError::NotAType(qualified)),
            };
        }
        self.instantiate(symbol, args, &qualified)
    }

    fn instantiate(&mut self, symbol: Symbol<'p>, args: Vec<TypeId>, name: &str) -> Result<TypeId, HostError> {
        let kind = match symbol {
            Symbol::Decl { file, decl: Decl::Interface(d) } => TypeKind::Interface {
                decl: DeclRef { file, node: d.id },
                args: self.fill_type_args(file, name, &d.type_params, args)?,
            },
            Symbol::Decl { file, decl: Decl::Alias(d) } => TypeKind::Alias {
                decl: DeclRef { file, node: d.id },
                args: self.fill_type_args(file, name, &d.type_params, args)?,
            },
            Symbol::Decl { file, decl: Decl::Enum(d) } => {
                if !args.is_empty() {
                    return Err(HostError::Arity { name: name.to_string(), expected: 0, got: args.len() });
                }
                TypeKind::Enum(DeclRef { file, node: d.id })
            }
            Symbol::Decl { decl: Decl::Class(_), .. } => TypeKind::Opaque(format!("class {name}")),
            Symbol::Decl { .. } | Symbol::Module(_) => return Err(HostError::NotAType(name.to_string())),
        };
        Ok(self.intern(kind))
    }

    /// Explicit arguments followed by defaults for the rest.
    fn fill_type_args(
        &mut self,
        file: FileId,
        name: &str,
        params: &'p [TypeParam],
        mut args: Vec<TypeId>,
    ) -> Result<Vec<TypeId>, HostError> {
        let arity = HostError::Arity { name: name.to_string(), expected: params.len(), got: args.len() };
        if args.len() > params.len() {
            return Err(arity);
        }
        for param in &params[args.len()..] {
            let Some(default) = &param.default else { return Err(arity) };
            let env = TypeEnv::from_params(params, &args);
            let ty = self.resolve_type(file, default, &env)?;
            args.push(ty);
        }
        Ok(args)
    }

    fn global_type(&mut self, file: FileId, node: &TypeNode, name: &str, args: Vec<TypeId>) -> Result<TypeId, HostError> {
        match name {
            "Array" | "ReadonlyArray" => match args.as_slice() {
                [elem] => Ok(self.intern(TypeKind::Array(*elem))),
                _ => Err(HostError::Arity { name: name.to_string(), expected: 1, got: args.len() }),
            },
            _ if GLOBAL_TYPES.contains(&name) => Ok(self.opaque(file, node)),
            _ => Err(HostError::UnresolvedName(name.to_string())),
        }
    }

    /// Function types are only inspected for their type parameter defaults
    /// and return type; failures there are not errors.
    fn function_kind(
        &mut self,
        file: FileId,
        type_params: &'p [TypeParam],
        ret: Option<&'p TypeNode>,
        env: &TypeEnv,
    ) -> TypeKind {
        let mut inner = env.clone();
        for param in type_params {
            let ty = self.intern(TypeKind::TypeParam(param.name.name.clone()));
            inner.bind(param.name.name.clone(), ty);
        }
        let mut params = Vec::with_capacity(type_params.len());
        for param in type_params {
            let default = param.default.as_ref().and_then(|d| self.resolve_type(file, d, &inner).ok());
            params.push(FnTypeParam { name: param.name.name.clone(), default });
        }
        let ret = ret.and_then(|r| match self.resolve_type(file, r, &inner) {
            Ok(ty) => Some(ty),
            Err(err) => {
                tracing::trace!(%err, "ignoring unresolved return type");
                None
            }
        });
        TypeKind::Function { type_params: params, ret }
    }

    fn env_for(&mut self, scope: &LocalScope<'p>) -> TypeEnv {
        let mut env = TypeEnv::default();
        for name in scope.type_params() {
            let ty = self.intern(TypeKind::TypeParam(name.to_string()));
            env.bind(name, ty);
        }
        env
    }

    // ----- value types -----

    fn value_path_type(&mut self, file: FileId, path: &[Ident]) -> Option<TypeId> {
        let (head, rest) = path.split_first()?;
        let mut symbol = self.lookup(file, &head.name, Space::Value, 0).ok()?;
        for segment in rest {
            let Symbol::Module(target) = symbol else { return None };
            symbol = self.export(target, &segment.name, Space::Value, 0).ok()?;
        }
        self.symbol_value_type(symbol, 0)
    }

    fn symbol_value_type(&mut self, symbol: Symbol<'p>, depth: usize) -> Option<TypeId> {
        let Symbol::Decl { file, decl } = symbol else { return None };
        match decl {
            Decl::Function(f) => {
                let kind = self.function_kind(file, &f.func.type_params, f.func.ret.as_ref(), &TypeEnv::default());
                Some(self.intern(kind))
            }
            Decl::Var(declarator) => match (&declarator.ty, &declarator.init) {
                (Some(ty), _) => self.resolve_type(file, ty, &TypeEnv::default()).ok(),
                (None, Some(init)) => self.expr_type(file, init, &LocalScope::new(), depth + 1),
                (None, None) => None,
            },
            _ => None,
        }
    }

    fn expr_type(&mut self, file: FileId, expr: &'p Expr, scope: &LocalScope<'p>, depth: usize) -> Option<TypeId> {
        if depth > MAX_HOPS {
            return None;
        }
        match &expr.kind {
            ExprKind::Ident(name) => self.ident_type(file, name, scope, depth),
            ExprKind::Paren(inner) | ExprKind::NonNull(inner) | ExprKind::Satisfies { expr: inner, .. } => {
                self.expr_type(file, inner, scope, depth + 1)
            }
            ExprKind::As { ty, .. } | ExprKind::TypeAssertion { ty, .. } => {
                let env = self.env_for(scope);
                self.resolve_type(file, ty, &env).ok()
            }
            ExprKind::Member { object, prop, .. } => {
                let ExprKind::Ident(namespace) = &object.kind else { return None };
                if scope.lookup(namespace).is_some() {
                    return None;
                }
                let Ok(Symbol::Module(target)) = self.lookup(file, namespace, Space::Value, 0) else {
                    return None;
                };
                let symbol = self.export(target, &prop.name, Space::Value, 0).ok()?;
                self.symbol_value_type(symbol, depth + 1)
            }
            ExprKind::Function { func, .. } => {
                let env = self.env_for(scope);
                let kind = self.function_kind(file, &func.type_params, func.ret.as_ref(), &env);
                Some(self.intern(kind))
            }
            ExprKind::Arrow(arrow) => {
                let env = self.env_for(scope);
                let kind = self.function_kind(file, &arrow.type_params, arrow.ret.as_ref(), &env);
                Some(self.intern(kind))
            }
            _ => None,
        }
    }

    fn ident_type(&mut self, file: FileId, name: &str, scope: &LocalScope<'p>, depth: usize) -> Option<TypeId> {
        match scope.lookup(name) {
            Some(LocalValue::Var { ty: Some(ty), .. }) | Some(LocalValue::Param { ty: Some(ty) }) => {
                let env = self.env_for(scope);
                self.resolve_type(file, ty, &env).ok()
            }
            Some(LocalValue::Var { ty: None, init: Some(init) }) => self.expr_type(file, init, scope, depth + 1),
            Some(LocalValue::Function(func)) => {
                let env = self.env_for(scope);
                let kind = self.function_kind(file, &func.type_params, func.ret.as_ref(), &env);
                Some(self.intern(kind))
            }
            Some(_) => None,
            None => {
                let symbol = self.lookup(file, name, Space::Value, 0).ok()?;
                self.symbol_value_type(symbol, depth + 1)
            }
        }
    }

    // ----- members -----

    fn collect_members(
        &mut self,
        ty: TypeId,
        visiting: &mut Vec<TypeId>,
        out: &mut IndexMap<String, Member>,
    ) -> Result<(), HostError> {
        if visiting.contains(&ty) {
            return Err(HostError::CircularBase(self.display(ty)));
        }
        visiting.push(ty);
        match self.arena.kind(ty).clone() {
            TypeKind::Interface { decl, args } => {
                let Some(Decl::Interface(d)) = self.decls.get(&decl).copied() else {
                    return Err(HostError::NotAnObject(self.display(ty)));
                };
                let env = TypeEnv::from_params(&d.type_params, &args);
                for base in &d.extends {
                    let base = self.resolve_type(decl.file, base, &env)?;
                    self.collect_members(base, visiting, out)?;
                }
                self.own_members(decl.file, &d.members, &env, out)?;
            }
            TypeKind::ObjectLiteral { decl, subst } => {
                let node = self.literals.get(&decl).copied();
                let Some(TypeNodeKind::Object { members, .. }) = node.map(|node| &node.kind) else {
                    return Err(HostError::NotAnObject(self.display(ty)));
                };
                let env = TypeEnv { bindings: subst };
                self.own_members(decl.file, members, &env, out)?;
            }
            TypeKind::Alias { .. } => {
                let target = self.alias_target(ty)?;
                self.collect_members(target, visiting, out)?;
            }
            TypeKind::Intersection(parts) => {
                for part in parts {
                    self.collect_members(part, visiting, out)?;
                }
            }
            _ => return Err(HostError::NotAnObject(self.display(ty))),
        }
        visiting.pop();
        Ok(())
    }

    fn own_members(
        &mut self,
        file: FileId,
        members: &'p [TypeMember],
        env: &TypeEnv,
        out: &mut IndexMap<String, Member>,
    ) -> Result<(), HostError> {
        for member in members {
            let member = match member {
                TypeMember::Property { key, optional, ty, .. } => {
                    let ty = match ty {
                        Some(ty) => self.resolve_type(file, ty, env)?,
                        None => self.intern(TypeKind::Intrinsic(Intrinsic::Any)),
                    };
                    match key.name() {
                        Some(name) => Member { name, optional: *optional, kind: MemberKind::Property, ty },
                        None => Member { name: "[computed]".into(), optional: *optional, kind: MemberKind::Index, ty },
                    }
                }
                TypeMember::Method { key, optional, func, .. } => {
                    let kind = self.function_kind(file, &func.type_params, func.ret.as_ref(), env);
                    let ty = self.intern(kind);
                    let name = key.name().unwrap_or_else(|| "[computed]".into());
                    Member { name, optional: *optional, kind: MemberKind::Method, ty }
                }
                TypeMember::Index { value, .. } => {
                    let ty = self.resolve_type(file, value, env)?;
                    Member { name: "[index]".into(), optional: false, kind: MemberKind::Index, ty }
                }
                TypeMember::Call { func, .. } => {
                    let kind = self.function_kind(file, &func.type_params, func.ret.as_ref(), env);
                    let ty = self.intern(kind);
                    Member { name: "[call]".into(), optional: false, kind: MemberKind::Call, ty }
                }
            };
            out.insert(member.name.clone(), member);
        }
        Ok(())
    }

    fn enum_init(&self, file: FileId, expr: &Expr) -> EnumInit {
        let negate = |init: EnumInit, sign: f64| match init {
            EnumInit::Num(n) => EnumInit::Num(sign * n),
            _ => EnumInit::Other(self.snippet(file, expr.span)),
        };
        match &expr.kind {
            ExprKind::Str(s) => EnumInit::Str(s.clone()),
            ExprKind::Num(n) => EnumInit::Num(*n),
            ExprKind::Paren(inner) => self.enum_init(file, inner),
            ExprKind::Unary { op: "-", arg } => negate(self.enum_init(file, arg), -1.0),
            ExprKind::Unary { op: "+", arg } => negate(self.enum_init(file, arg), 1.0),
            _ => EnumInit::Other(self.snippet(file, expr.span)),
        }
    }

    fn decl_name(&self, decl: DeclRef) -> String {
        match self.decls.get(&decl) {
            Some(Decl::Interface(d)) => d.name.name.clone(),
            Some(Decl::Alias(d)) => d.name.name.clone(),
            Some(Decl::Enum(d)) => d.name.name.clone(),
            Some(Decl::Class(d)) => d.name.as_ref().map(|n| n.name.clone()).unwrap_or_default(),
            Some(Decl::Function(d)) => d.name.as_ref().map(|n| n.name.clone()).unwrap_or_default(),
            Some(Decl::Var(_)) | None => "<anonymous>".into(),
        }
    }

    fn display_list(&self, items: &[TypeId], separator: &str) -> String {
        items.iter().map(|ty| self.display(*ty)).collect::<Vec<_>>().join(separator)
    }
}

fn keyword_kind(keyword: KeywordType) -> TypeKind {
    match keyword {
        KeywordType::String => TypeKind::Primitive(PrimitiveKind::String),
        KeywordType::Number => TypeKind::Primitive(PrimitiveKind::Number),
        KeywordType::Boolean => TypeKind::Primitive(PrimitiveKind::Boolean),
        KeywordType::BigInt => TypeKind::Intrinsic(Intrinsic::BigInt),
        KeywordType::Symbol => TypeKind::Intrinsic(Intrinsic::Symbol),
        KeywordType::Any => TypeKind::Intrinsic(Intrinsic::Any),
        KeywordType::Unknown => TypeKind::Intrinsic(Intrinsic::Unknown),
        KeywordType::Never => TypeKind::Intrinsic(Intrinsic::Never),
        KeywordType::Void => TypeKind::Intrinsic(Intrinsic::Void),
        KeywordType::Null => TypeKind::Intrinsic(Intrinsic::Null),
        KeywordType::Undefined => TypeKind::Intrinsic(Intrinsic::Undefined),
        KeywordType::Object => TypeKind::Intrinsic(Intrinsic::Object),
    }
}

impl<'p> TypeHost<'p> for Checker<'p> {
    fn kind(&self, ty: TypeId) -> TypeKind {
        self.arena.kind(ty).clone()
    }

    fn display(&self, ty: TypeId) -> String {
        match self.arena.kind(ty) {
            TypeKind::Primitive(kind) => kind.name().to_string(),
            TypeKind::Intrinsic(kind) => kind.name().to_string(),
            TypeKind::Literal(LiteralValue::Str(s)) => format!("\"{s}\""),
            TypeKind::Literal(LiteralValue::Num(n)) => format_number(n.0),
            TypeKind::Literal(LiteralValue::Bool(b)) => b.to_string(),
            TypeKind::Enum(decl) => self.decl_name(*decl),
            TypeKind::Interface { decl, args } | TypeKind::Alias { decl, args } => {
                let name = self.decl_name(*decl);
                if args.is_empty() { name } else { format!("{name}<{}>", self.display_list(args, ", ")) }
            }
            TypeKind::ObjectLiteral { decl, .. } => match self.literals.get(decl) {
                Some(node) => self.snippet(decl.file, node.span),
                None => "{}".into(),
            },
            TypeKind::Array(elem) => {
                let inner = self.display(*elem);
                match self.arena.kind(*elem) {
                    TypeKind::Union(_) | TypeKind::Intersection(_) | TypeKind::Function { .. } => format!("({inner})[]"),
                    _ => format!("{inner}[]"),
                }
            }
            TypeKind::Tuple(members) => {
                let items = members
                    .iter()
                    .map(|member| {
                        let mut item = if member.rest { format!("...{}", self.display(member.ty)) } else { self.display(member.ty) };
                        if member.optional {
                            item.push('?');
                        }
                        item
                    })
                    .collect::<Vec<_>>();
                format!("[{}]", items.join(", "))
            }
            TypeKind::Union(items) => self.display_list(items, " | "),
            TypeKind::Intersection(items) => self.display_list(items, " & "),
            TypeKind::Function { ret, .. } => {
                format!("(...) => {}", ret.map(|ret| self.display(ret)).unwrap_or_else(|| "void".into()))
            }
            TypeKind::TypeParam(name) | TypeKind::Opaque(name) => name.clone(),
        }
    }

    fn alias_target(&mut self, ty: TypeId) -> Result<TypeId, HostError> {
        let TypeKind::Alias { decl, args } = self.arena.kind(ty).clone() else { return Ok(ty) };
        let Some(Decl::Alias(d)) = self.decls.get(&decl).copied() else {
            return Err(HostError::UnresolvedName(self.display(ty)));
        };
        let env = TypeEnv::from_params(&d.type_params, &args);
        self.resolve_type(decl.file, &d.ty, &env)
    }

    fn members(&mut self, ty: TypeId) -> Result<Vec<Member>, HostError> {
        let mut out = IndexMap::new();
        self.collect_members(ty, &mut Vec::new(), &mut out)?;
        Ok(out.into_values().collect())
    }

    fn enum_members(&self, ty: TypeId) -> Result<Vec<EnumMemberInfo>, HostError> {
        let TypeKind::Enum(decl) = self.arena.kind(ty) else {
            return Err(HostError::NotAnEnum(self.display(ty)));
        };
        let Some(Decl::Enum(d)) = self.decls.get(decl).copied() else {
            return Err(HostError::NotAnEnum(self.display(ty)));
        };
        Ok(d.members
            .iter()
            .map(|member| EnumMemberInfo {
                name: member.name.clone(),
                init: match &member.init {
                    Some(init) => self.enum_init(decl.file, init),
                    None => EnumInit::Absent,
                },
            })
            .collect())
    }

    fn resolve_annotation(
        &mut self,
        file: FileId,
        node: &'p TypeNode,
        scope: &LocalScope<'p>,
    ) -> Result<TypeId, HostError> {
        let env = self.env_for(scope);
        self.resolve_type(file, node, &env)
    }

    fn type_of_expr(&mut self, file: FileId, expr: &'p Expr, scope: &LocalScope<'p>) -> Option<TypeId> {
        self.expr_type(file, expr, scope, 0)
    }

    fn binding_type(&mut self, file: FileId, name: &str) -> Option<TypeId> {
        self.ident_type(file, name, &LocalScope::new(), 0)
    }

    fn variable_annotation(&mut self, file: FileId, name: &str, scope: &LocalScope<'p>) -> VarLookup<'p> {
        match scope.lookup(name) {
            Some(LocalValue::Var { ty: Some(ty), .. }) => VarLookup::Annotated(ty),
            Some(LocalValue::Var { ty: None, .. }) => VarLookup::Unannotated,
            Some(_) => VarLookup::NotAVariable,
            None => match self.lookup(file, name, Space::Value, 0) {
                Ok(Symbol::Decl { file: declared_in, decl: Decl::Var(declarator) }) if declared_in == file => {
                    match &declarator.ty {
                        Some(ty) => VarLookup::Annotated(ty),
                        None => VarLookup::Unannotated,
                    }
                }
                Ok(_) => VarLookup::NotAVariable,
                Err(_) => VarLookup::Unresolved,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn program(sources: &[(&str, &str)]) -> Program {
        let sources = sources.iter().map(|(path, text)| (*path, text.to_string())).collect();
        Program::from_sources(sources, &Config::default())
    }

    fn alias(checker: &mut Checker<'_>, name: &str) -> TypeId {
        let ty = checker.named_type(0, name).unwrap();
        checker.alias_target(ty).unwrap()
    }

    #[test]
    fn instantiations_are_interned_by_arguments() {
        let program = program(&[(
            "src/a.ts",
            "interface Box<T> { v: T }\ntype A = Box<number>;\ntype B = Box<number>;\ntype C = Box<string>;",
        )]);
        let mut checker = Checker::new(&program);
        let (a, b, c) = (alias(&mut checker, "A"), alias(&mut checker, "B"), alias(&mut checker, "C"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(checker.display(c), "Box<string>");
    }

    #[test]
    fn omitted_type_arguments_take_defaults() {
        let program = program(&[(
            "src/a.ts",
            "interface P<T = string> { v: T }\ntype A = P;\ntype B = P<string>;\ntype C = Array<number>;",
        )]);
        let mut checker = Checker::new(&program);
        assert_eq!(alias(&mut checker, "A"), alias(&mut checker, "B"));
        let c = alias(&mut checker, "C");
        assert_eq!(checker.display(c), "number[]");
    }

    #[test]
    fn arity_mismatch_is_an_error() {
        let program = program(&[("src/a.ts", "interface P<T> { v: T }\ntype A = P;")]);
        let mut checker = Checker::new(&program);
        let ty = checker.named_type(0, "A").unwrap();
        let err = checker.alias_target(ty).unwrap_err();
        assert!(matches!(err, HostError::Arity { expected: 1, got: 0, .. }), "{err}");
    }

    #[test]
    fn inherited_members_come_first_and_own_members_override() {
        let program = program(&[(
            "src/a.ts",
            "interface Base { a: number; b: number }\ninterface D extends Base { c?: boolean; a: string }",
        )]);
        let mut checker = Checker::new(&program);
        let d = checker.named_type(0, "D").unwrap();
        let members = checker.members(d).unwrap();
        let names: Vec<_> = members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert_eq!(checker.display(members[0].ty), "string");
        assert!(members[2].optional);
    }

    #[test]
    fn circular_bases_are_reported() {
        let program = program(&[("src/a.ts", "interface A extends B {}\ninterface B extends A {}")]);
        let mut checker = Checker::new(&program);
        let a = checker.named_type(0, "A").unwrap();
        assert!(matches!(checker.members(a), Err(HostError::CircularBase(_))));
    }

    #[test]
    fn enum_initializers_are_evaluated() {
        let program = program(&[("src/a.ts", "enum E { A = 'x', B = -2, C, D = (3), F = 1 + 1 }")]);
        let mut checker = Checker::new(&program);
        let e = checker.named_type(0, "E").unwrap();
        let inits: Vec<_> = checker.enum_members(e).unwrap().into_iter().map(|m| m.init).collect();
        assert_eq!(
            inits,
            [
                EnumInit::Str("x".into()),
                EnumInit::Num(-2.0),
                EnumInit::Absent,
                EnumInit::Num(3.0),
                EnumInit::Other("1 + 1".into()),
            ]
        );
    }

    #[test]
    fn namespace_imports_and_reexports_resolve() {
        let program = program(&[
            ("src/main.ts", "import * as ns from './index';\ntype X = ns.T;\ntype Y = ns.U;"),
            ("src/index.ts", "export * from './types';\nexport { T as U } from './types';"),
            ("src/types.ts", "export interface T { a: string }"),
        ]);
        let mut checker = Checker::new(&program);
        let x = alias(&mut checker, "X");
        let y = alias(&mut checker, "Y");
        assert_eq!(x, y);
        assert_eq!(checker.display(x), "T");
    }

    #[test]
    fn unknown_names_are_errors_and_library_types_are_opaque() {
        let program = program(&[("src/a.ts", "type X = Missing;\ntype Y = Record<string, number>;")]);
        let mut checker = Checker::new(&program);
        let x = checker.named_type(0, "X").unwrap();
        assert_eq!(checker.alias_target(x), Err(HostError::UnresolvedName("Missing".into())));
        let y = alias(&mut checker, "Y");
        assert!(matches!(checker.kind(y), TypeKind::Opaque(_)));
    }

    #[test]
    fn validate_functions_carry_the_marker_default() {
        let program = program(&[(
            "src/main.ts",
            "import { assertIsType as check } from 'ts-audit';\nconst alias = check;",
        )]);
        let mut checker = Checker::new(&program);
        let Stmt::Var(var) = &program.file(0).module.body[1] else { panic!("expected a variable") };
        let init = var.decls[0].init.as_ref().unwrap();
        let ty = checker.type_of_expr(0, init, &LocalScope::new()).unwrap();
        let TypeKind::Function { type_params, ret } = checker.kind(ty) else { panic!("expected a function") };
        assert_eq!(type_params.len(), 1);
        assert_eq!(checker.display(type_params[0].default.unwrap()), "_RUNTIME_CHECK_ANY");
        assert_eq!(checker.display(ret.unwrap()), "_RUNTIME_CHECK_ANY");
    }

    #[test]
    fn variable_annotations_are_looked_up_through_scopes() {
        let program = program(&[("src/a.ts", "let a: string;\nlet b;\nfunction f() {}")]);
        let mut checker = Checker::new(&program);
        let scope = LocalScope::new();
        assert!(matches!(checker.variable_annotation(0, "a", &scope), VarLookup::Annotated(_)));
        assert!(matches!(checker.variable_annotation(0, "b", &scope), VarLookup::Unannotated));
        assert!(matches!(checker.variable_annotation(0, "f", &scope), VarLookup::NotAVariable));
        assert!(matches!(checker.variable_annotation(0, "zz", &scope), VarLookup::Unresolved));
    }
}
