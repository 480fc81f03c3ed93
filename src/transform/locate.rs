//! Finds validate calls in a file and works out the type each one checks.
//!
//! The walk is depth-first and visits a call before its callee and
//! arguments, so nested validate calls are found in source order. While
//! walking, the locator keeps a [`LocalScope`] up to date so that
//! parameters, local variables and local function declarations shadow and
//! resolve the way they do at runtime.
use crate::config::Config;
use crate::diagnostics::Diagnostics;
use crate::host::{FileId, HostError, LocalScope, LocalValue, Program, SourceFile, TypeHost, TypeId, TypeKind, VarLookup};
use crate::syntax::{
    ArrowBody, ArrowFn, Block, CallExpr, ClassDecl, ClassMember, ExportDecl, Expr, ExprKind, ForInit, Function,
    ImportDecl, ObjectProp, Param, Pattern, PropKey, Span, Stmt, TypeNode, TypeParam, VarDecl, VarDeclarator,
};

pub const NO_TYPE_FOUND: &str = "No type was found to be associated with variable; make sure type is annotated";
pub const UNSUPPORTED_USAGE: &str =
    "validationFunction not used in a supported way. Please see documentation for details on usage";

/// How a call site names its target type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallShape {
    /// `validate<T>(x)`
    GenericArgument,
    /// `validate(x) as T`, `<T>validate(x)`
    CastExpression,
    /// `const v: T = validate(x)`
    ExplicitlyTypedBinding,
    /// `v = validate(x)` where `v` is declared `let v: T`
    AssignmentTarget,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub span: Span,
    pub close_paren: u32,
    pub has_args: bool,
    pub trailing_comma: bool,
    pub shape: CallShape,
    pub target: TypeId,
}

#[derive(Debug, Default)]
pub struct Located {
    pub sites: Vec<CallSite>,
    /// Module specifiers of imports that bring a validate function in.
    pub imports: Vec<Span>,
    pub diagnostics: Diagnostics,
}

/// Where the expression being visited sits in its parent.
#[derive(Clone, Copy)]
enum Context<'p> {
    Other,
    Cast(&'p TypeNode),
    VarInit(&'p VarDeclarator),
    Assign { op: &'static str, target: &'p Expr },
}

/// True when `ty` is a function type carrying the marker, either as the
/// default of its single type parameter or as its return type.
pub fn is_validate_function<'p, H: TypeHost<'p> + ?Sized>(host: &H, ty: TypeId, marker: &str) -> bool {
    let TypeKind::Function { type_params, ret } = host.kind(ty) else {
        return false;
    };
    let marked_default = match type_params.as_slice() {
        [param] => param.default.is_some_and(|default| host.display(default) == marker),
        _ => false,
    };
    marked_default || ret.is_some_and(|ret| host.display(ret) == marker)
}

pub fn locate<'p, H: TypeHost<'p> + ?Sized>(host: &mut H, program: &'p Program, file: FileId, config: &Config) -> Located {
    let source = program.file(file);
    let mut locator = Locator {
        host,
        program,
        config,
        file_id: file,
        file: source,
        scope: LocalScope::new(),
        out: Located::default(),
    };
    locator.stmts(&source.module.body);
    locator.out
}

struct Locator<'c, 'p, H: ?Sized> {
    host: &'c mut H,
    program: &'p Program,
    config: &'c Config,
    file_id: FileId,
    file: &'p SourceFile,
    scope: LocalScope<'p>,
    out: Located,
}

impl<'c, 'p, H: TypeHost<'p> + ?Sized> Locator<'c, 'p, H> {
    fn error(&mut self, span: Span, message: impl Into<String>) {
        self.out.diagnostics.push(self.file.diagnostic(span, message));
    }

    // ----- imports -----

    fn import(&mut self, import: &'p ImportDecl) {
        let Some(clause) = &import.clause else { return };
        if import.type_only {
            return;
        }
        let from_package = self.program.resolve_module(self.file_id, &import.source.value) == Some(self.program.prelude());
        if from_package {
            let config = self.config;
            let suggestion = config.assertion_functions.first().map(String::as_str).unwrap_or("assertIsType");
            let package = &config.package_name;
            if clause.default.is_some() {
                let message = format!(
                    "Default import is not yet supported. Please use `import {{ {suggestion} }} from '{package}';`"
                );
                self.error(import.span, message);
            }
            if clause.namespace.is_some() {
                let message = format!(
                    "Namespace import is not yet supported. Please use `import {{ {suggestion} }} from '{package}';`"
                );
                self.error(import.span, message);
            }
        }
        let mut binds_validate = false;
        for specifier in clause.named.iter().flatten().filter(|s| !s.type_only) {
            if let Some(ty) = self.host.binding_type(self.file_id, &specifier.local.name) {
                binds_validate |= is_validate_function(&*self.host, ty, &self.config.marker_type);
            }
        }
        if binds_validate {
            self.out.imports.push(import.source.span);
        }
    }

    // ----- statements -----

    fn stmts(&mut self, stmts: &'p [Stmt]) {
        for stmt in stmts {
            if let Stmt::Function(decl) = stmt {
                if let Some(name) = &decl.name {
                    self.scope.declare(&name.name, LocalValue::Function(&decl.func));
                }
            }
        }
        for stmt in stmts {
            self.stmt(stmt);
        }
    }

    fn block(&mut self, block: &'p Block) {
        self.scope.push();
        self.stmts(&block.stmts);
        self.scope.pop();
    }

    fn stmt(&mut self, stmt: &'p Stmt) {
        match stmt {
            Stmt::Import(import) => self.import(import),
            Stmt::Export(ExportDecl::Default { expr, .. }) => self.expr(expr, Context::Other),
            Stmt::Export(_) | Stmt::Interface(_) | Stmt::TypeAlias(_) => {}
            Stmt::Enum(decl) => {
                for init in decl.members.iter().filter_map(|m| m.init.as_ref()) {
                    self.expr(init, Context::Other);
                }
            }
            Stmt::Function(decl) => self.function(&decl.func),
            Stmt::Class(decl) => self.class(decl),
            Stmt::Var(var) => self.var_decl(var),
            Stmt::Expr(expr) => self.expr(expr, Context::Other),
            Stmt::Block(block) => self.block(block),
            Stmt::If { test, cons, alt } => {
                self.expr(test, Context::Other);
                self.stmt(cons);
                if let Some(alt) = alt {
                    self.stmt(alt);
                }
            }
            Stmt::For { init, test, update, body } => {
                self.scope.push();
                match init {
                    Some(ForInit::Var(var)) => self.var_decl(var),
                    Some(ForInit::Expr(expr)) => self.expr(expr, Context::Other),
                    None => {}
                }
                for expr in [test, update].into_iter().flatten() {
                    self.expr(expr, Context::Other);
                }
                self.stmt(body);
                self.scope.pop();
            }
            Stmt::ForInOf { left, right, body } => {
                self.scope.push();
                self.expr(right, Context::Other);
                match left {
                    ForInit::Var(var) => {
                        for declarator in &var.decls {
                            self.bind_pattern(&declarator.pat, LocalValue::Var { ty: declarator.ty.as_ref(), init: None });
                        }
                    }
                    ForInit::Expr(expr) => self.expr(expr, Context::Other),
                }
                self.stmt(body);
                self.scope.pop();
            }
            Stmt::While { test, body } | Stmt::DoWhile { body, test } => {
                self.expr(test, Context::Other);
                self.stmt(body);
            }
            Stmt::Switch { discriminant, cases } => {
                self.expr(discriminant, Context::Other);
                self.scope.push();
                for case in cases {
                    if let Some(test) = &case.test {
                        self.expr(test, Context::Other);
                    }
                    self.stmts(&case.body);
                }
                self.scope.pop();
            }
            Stmt::Try { block, param, handler, finalizer } => {
                self.block(block);
                if let Some(handler) = handler {
                    self.scope.push();
                    if let Some(param) = param {
                        self.bind_pattern(param, LocalValue::Opaque);
                    }
                    self.stmts(&handler.stmts);
                    self.scope.pop();
                }
                if let Some(finalizer) = finalizer {
                    self.block(finalizer);
                }
            }
            Stmt::Return(Some(expr)) | Stmt::Throw(expr) => self.expr(expr, Context::Other),
            Stmt::Labeled { body, .. } => self.stmt(body),
            Stmt::Return(None) | Stmt::Break | Stmt::Continue | Stmt::Empty => {}
        }
    }

    fn var_decl(&mut self, var: &'p VarDecl) {
        for declarator in &var.decls {
            self.pattern_defaults(&declarator.pat);
            if let Some(init) = &declarator.init {
                self.expr(init, Context::VarInit(declarator));
            }
            match &declarator.pat {
                Pattern::Ident(id) => self.scope.declare(
                    &id.name,
                    LocalValue::Var { ty: declarator.ty.as_ref(), init: declarator.init.as_ref() },
                ),
                pat => self.bind_pattern(pat, LocalValue::Opaque),
            }
        }
    }

    fn bind_pattern(&mut self, pat: &'p Pattern, value: LocalValue<'p>) {
        match pat {
            Pattern::Ident(id) => self.scope.declare(&id.name, value),
            pat => {
                for id in pat.bound_names() {
                    self.scope.declare(&id.name, LocalValue::Opaque);
                }
            }
        }
    }

    fn pattern_defaults(&mut self, pat: &'p Pattern) {
        match pat {
            Pattern::Ident(_) => {}
            Pattern::Object { props, rest } => {
                for prop in props {
                    if let PropKey::Computed(key) = &prop.key {
                        self.expr(key, Context::Other);
                    }
                    self.pattern_defaults(&prop.value);
                    if let Some(default) = &prop.default {
                        self.expr(default, Context::Other);
                    }
                }
                if let Some(rest) = rest {
                    self.pattern_defaults(rest);
                }
            }
            Pattern::Array { elems, rest } => {
                for elem in elems.iter().flatten() {
                    self.pattern_defaults(&elem.pat);
                    if let Some(default) = &elem.default {
                        self.expr(default, Context::Other);
                    }
                }
                if let Some(rest) = rest {
                    self.pattern_defaults(rest);
                }
            }
        }
    }

    // ----- functions and classes -----

    fn params(&mut self, type_params: &'p [TypeParam], params: &'p [Param]) {
        for param in type_params {
            self.scope.declare_type_param(&param.name.name);
        }
        for param in params {
            self.pattern_defaults(&param.pat);
            if let Some(default) = &param.default {
                self.expr(default, Context::Other);
            }
            match &param.pat {
                Pattern::Ident(id) => self.scope.declare(&id.name, LocalValue::Param { ty: param.ty.as_ref() }),
                pat => self.bind_pattern(pat, LocalValue::Opaque),
            }
        }
    }

    fn function(&mut self, func: &'p Function) {
        self.scope.push();
        self.params(&func.type_params, &func.params);
        if let Some(body) = &func.body {
            self.stmts(&body.stmts);
        }
        self.scope.pop();
    }

    fn arrow(&mut self, arrow: &'p ArrowFn) {
        self.scope.push();
        self.params(&arrow.type_params, &arrow.params);
        match &arrow.body {
            ArrowBody::Block(block) => self.stmts(&block.stmts),
            ArrowBody::Expr(expr) => self.expr(expr, Context::Other),
        }
        self.scope.pop();
    }

    fn class(&mut self, class: &'p ClassDecl) {
        if let Some(name) = &class.name {
            self.scope.declare(&name.name, LocalValue::Opaque);
        }
        if let Some(base) = &class.extends {
            self.expr(base, Context::Other);
        }
        self.scope.push();
        for param in &class.type_params {
            self.scope.declare_type_param(&param.name.name);
        }
        for member in &class.members {
            match member {
                ClassMember::Property { key, init, .. } => {
                    self.prop_key(key);
                    if let Some(init) = init {
                        self.expr(init, Context::Other);
                    }
                }
                ClassMember::Method { key, func, .. } => {
                    self.prop_key(key);
                    self.function(func);
                }
                ClassMember::StaticBlock(block) => self.block(block),
                ClassMember::Index { .. } => {}
            }
        }
        self.scope.pop();
    }

    fn prop_key(&mut self, key: &'p PropKey) {
        if let PropKey::Computed(expr) = key {
            self.expr(expr, Context::Other);
        }
    }

    // ----- expressions -----

    fn expr(&mut self, expr: &'p Expr, ctx: Context<'p>) {
        match &expr.kind {
            ExprKind::Call(call) => {
                self.call(expr, call, ctx);
                self.expr(&call.callee, Context::Other);
                for arg in &call.args {
                    self.expr(&arg.expr, Context::Other);
                }
            }
            ExprKind::As { expr: inner, ty } | ExprKind::TypeAssertion { ty, expr: inner } => {
                self.expr(inner, Context::Cast(ty))
            }
            ExprKind::Satisfies { expr: inner, .. } | ExprKind::NonNull(inner) | ExprKind::Paren(inner) => {
                self.expr(inner, Context::Other)
            }
            ExprKind::Assign { op, target, value } => {
                self.expr(target, Context::Other);
                self.expr(value, Context::Assign { op: *op, target: &**target });
            }
            ExprKind::Arrow(arrow) => self.arrow(arrow),
            ExprKind::Function { func, .. } => self.function(func),
            ExprKind::Class(class) => {
                self.scope.push();
                self.class(class);
                self.scope.pop();
            }
            ExprKind::Array(items) => {
                for item in items.iter().flatten() {
                    self.expr(&item.expr, Context::Other);
                }
            }
            ExprKind::Object(props) => {
                for prop in props {
                    match prop {
                        ObjectProp::KeyValue { key, value } => {
                            self.prop_key(key);
                            self.expr(value, Context::Other);
                        }
                        ObjectProp::Spread(value) => self.expr(value, Context::Other),
                        ObjectProp::Method { key, func, .. } => {
                            self.prop_key(key);
                            self.function(func);
                        }
                        ObjectProp::Shorthand(_) => {}
                    }
                }
            }
            ExprKind::TaggedTemplate { tag, substitutions, .. } => {
                self.expr(tag, Context::Other);
                for sub in substitutions {
                    self.expr(sub, Context::Other);
                }
            }
            ExprKind::Template { substitutions, .. } => {
                for sub in substitutions {
                    self.expr(sub, Context::Other);
                }
            }
            ExprKind::New { callee, args, .. } => {
                self.expr(callee, Context::Other);
                for arg in args {
                    self.expr(&arg.expr, Context::Other);
                }
            }
            ExprKind::Member { object, .. } => self.expr(object, Context::Other),
            ExprKind::Index { object, index, .. } => {
                self.expr(object, Context::Other);
                self.expr(index, Context::Other);
            }
            ExprKind::Unary { arg, .. } | ExprKind::Update { arg, .. } => self.expr(arg, Context::Other),
            ExprKind::Yield { arg: Some(arg), .. } => self.expr(arg, Context::Other),
            ExprKind::Binary { left, right, .. } => {
                self.expr(left, Context::Other);
                self.expr(right, Context::Other);
            }
            ExprKind::Cond { test, cons, alt } => {
                for e in [test, cons, alt] {
                    self.expr(e, Context::Other);
                }
            }
            ExprKind::Seq(items) => {
                for item in items {
                    self.expr(item, Context::Other);
                }
            }
            ExprKind::Ident(_)
            | ExprKind::This
            | ExprKind::Super
            | ExprKind::Null
            | ExprKind::Bool(_)
            | ExprKind::Num(_)
            | ExprKind::Str(_)
            | ExprKind::Regex(_)
            | ExprKind::Yield { arg: None, .. } => {}
        }
    }

    fn call(&mut self, expr: &'p Expr, call: &'p CallExpr, ctx: Context<'p>) {
        let Some(callee) = self.host.type_of_expr(self.file_id, &call.callee, &self.scope) else {
            return;
        };
        if !is_validate_function(&*self.host, callee, &self.config.marker_type) {
            return;
        }
        match self.target(call, ctx) {
            Ok((shape, target)) => {
                tracing::debug!(
                    file = %self.file.path.display(),
                    call = self.file.snippet(expr.span),
                    ?shape,
                    target = %self.host.display(target),
                    "located validate call"
                );
                self.out.sites.push(CallSite {
                    span: expr.span,
                    close_paren: call.close_paren,
                    has_args: !call.args.is_empty(),
                    trailing_comma: call.trailing_comma,
                    shape,
                    target,
                });
            }
            Err(message) => self.error(expr.span, message),
        }
    }

    fn target(&mut self, call: &'p CallExpr, ctx: Context<'p>) -> Result<(CallShape, TypeId), String> {
        if let Some(arg) = call.type_args.first() {
            return Ok((CallShape::GenericArgument, self.annotation(arg)?));
        }
        match ctx {
            Context::Cast(ty) => Ok((CallShape::CastExpression, self.annotation(ty)?)),
            Context::VarInit(declarator) => match &declarator.ty {
                Some(ty) => Ok((CallShape::ExplicitlyTypedBinding, self.annotation(ty)?)),
                None => Err(NO_TYPE_FOUND.into()),
            },
            Context::Assign { op, target } => {
                if op != "=" {
                    return Err("Was expecting assignment here.".into());
                }
                let ExprKind::Ident(name) = &target.kind else {
                    return Err("Assigned Node must be an identifier".into());
                };
                match self.host.variable_annotation(self.file_id, name, &self.scope) {
                    VarLookup::Annotated(ty) => Ok((CallShape::AssignmentTarget, self.annotation(ty)?)),
                    VarLookup::Unannotated => Err(NO_TYPE_FOUND.into()),
                    VarLookup::NotAVariable => {
                        Err("Value declaration of assignment must be a variable declaration".into())
                    }
                    VarLookup::Unresolved => Err(HostError::UnresolvedName(name.clone()).to_string()),
                }
            }
            Context::Other => Err(UNSUPPORTED_USAGE.into()),
        }
    }

    fn annotation(&mut self, node: &'p TypeNode) -> Result<TypeId, String> {
        self.host.resolve_annotation(self.file_id, node, &self.scope).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Checker;

    fn run(source: &str) -> (Program, Vec<(CallShape, String)>, Vec<String>, usize) {
        let program = Program::from_sources(vec![("src/main.ts", source.to_string())], &Config::default());
        let (sites, messages, imports) = {
            let mut checker = Checker::new(&program);
            let located = locate(&mut checker, &program, 0, &Config::default());
            let sites = located.sites.iter().map(|s| (s.shape, checker.display(s.target))).collect::<Vec<_>>();
            let messages = located.diagnostics.messages().into_iter().map(String::from).collect::<Vec<_>>();
            (sites, messages, located.imports.len())
        };
        (program, sites, messages, imports)
    }

    const PRELUDE: &str = "import { assertIsType, isType } from 'ts-audit';\ninterface User { name: string }\n";

    #[test]
    fn four_call_shapes_resolve_to_the_same_type() {
        let src = format!(
            "{PRELUDE}const a = assertIsType<User>(raw);\nconst b = assertIsType(raw) as User;\n\
             const c: User = assertIsType(raw);\nlet d: User;\nd = assertIsType(raw);"
        );
        let (_, sites, messages, imports) = run(&src);
        assert!(messages.is_empty(), "{messages:?}");
        assert_eq!(imports, 1);
        let shapes: Vec<_> = sites.iter().map(|(shape, _)| *shape).collect();
        assert_eq!(
            shapes,
            [
                CallShape::GenericArgument,
                CallShape::CastExpression,
                CallShape::ExplicitlyTypedBinding,
                CallShape::AssignmentTarget
            ]
        );
        assert!(sites.iter().all(|(_, ty)| ty == "User"));
    }

    #[test]
    fn generic_argument_wins_over_the_binding() {
        let src = format!("{PRELUDE}const a: string = assertIsType<User>(raw);");
        let (_, sites, _, _) = run(&src);
        assert_eq!(sites, [(CallShape::GenericArgument, "User".to_string())]);
    }

    #[test]
    fn unannotated_assignment_target_has_no_type() {
        let src = format!("{PRELUDE}let v;\nv = assertIsType(raw);");
        let (_, sites, messages, _) = run(&src);
        assert!(sites.is_empty());
        assert_eq!(messages, [NO_TYPE_FOUND]);
    }

    #[test]
    fn bare_calls_are_unsupported() {
        let src = format!("{PRELUDE}function f(raw: unknown) {{ if (isType(raw)) {{ return 1; }} }}");
        let (_, _, messages, _) = run(&src);
        assert_eq!(messages, [UNSUPPORTED_USAGE]);
    }

    #[test]
    fn renamed_imports_and_local_aliases_are_recognised() {
        let src = "import { assertIsType as check } from 'ts-audit';\ninterface U { a: number }\n\
                   function f(raw: unknown) { const again = check; const u: U = again(raw); return u; }";
        let (_, sites, messages, imports) = run(src);
        assert!(messages.is_empty(), "{messages:?}");
        assert_eq!(imports, 1);
        assert_eq!(sites, [(CallShape::ExplicitlyTypedBinding, "U".to_string())]);
    }

    #[test]
    fn shadowing_parameters_hide_the_validate_function() {
        let src = format!("{PRELUDE}function f(assertIsType: (x: unknown) => User) {{ assertIsType(1); }}");
        let (_, sites, messages, _) = run(&src);
        assert!(sites.is_empty());
        assert!(messages.is_empty(), "{messages:?}");
    }

    #[test]
    fn assignment_in_a_function_uses_the_local_annotation() {
        let src = format!("{PRELUDE}function f(raw: unknown) {{ let u: User[]; u = assertIsType(raw); }}");
        let (_, sites, _, _) = run(&src);
        assert_eq!(sites, [(CallShape::AssignmentTarget, "User[]".to_string())]);
    }

    #[test]
    fn default_and_namespace_imports_are_rejected() {
        let src = "import audit from 'ts-audit';\nimport * as ns from 'ts-audit';";
        let (_, _, messages, imports) = run(src);
        assert_eq!(imports, 0);
        assert_eq!(
            messages,
            [
                "Default import is not yet supported. Please use `import { assertIsType } from 'ts-audit';`",
                "Namespace import is not yet supported. Please use `import { assertIsType } from 'ts-audit';`",
            ]
        );
    }

    #[test]
    fn unrelated_calls_are_ignored() {
        let src = format!("{PRELUDE}console.log(1);\nconst x = [1].map((n) => n);\nfoo<User>(x);");
        let (_, sites, messages, _) = run(&src);
        assert!(sites.is_empty());
        assert!(messages.is_empty(), "{messages:?}");
    }
}
