//! AST to FIR lowering
//!
//! The lowering walks a translation unit in source order and drives its
//! [`FloatingPointModePolicy`]: namespaces and blocks open and close policy
//! scopes, pragma lines are applied where they appear, every function and
//! lambda body gets its own escalation frame, and every arithmetic operation
//! queries the policy for the mode it is lowered under.
//!
//! Generic functions capture the mode in effect at their definition. Their
//! instantiations are lowered after the last item, one per distinct set of
//! type arguments, under that captured mode.

mod expr;

use crate::ast::*;
use crate::common::Span;
use crate::diagnostics::{CompileError, Reporter};
use crate::fir::{FirModule, FirType, FunctionBuilder, ModuleBuilder, Operand};
use crate::fp::{
    FloatKind, FloatingPointModePolicy, FpMode, PolicyError, PragmaDirective, ScopeKind,
    parse_pragma,
};
use crate::target::TargetInfo;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;

type Result<T> = std::result::Result<T, CompileError>;

/// Type arguments of a generic instantiation, by parameter name
type Subst = FxHashMap<String, FloatKind>;

/// Lower a parsed translation unit starting from `default_mode`.
///
/// Recoverable problems (bad pragmas, type errors in one statement) are
/// reported to `reporter` and lowering continues with the next statement.
pub fn lower(
    ast: &Ast,
    target: &TargetInfo,
    default_mode: FpMode,
    reporter: &mut Reporter,
) -> FirModule {
    Lowering::new(target, default_mode, reporter).lower_module(ast)
}

#[derive(Debug, Clone, PartialEq)]
struct Signature {
    params: Vec<FirType>,
    ret: FirType,
}

struct GenericDef<'a> {
    def: &'a FnDef,
    /// Namespace path of the definition, for name lookup in its body
    namespace: Vec<String>,
    /// Mode in effect where the definition appears
    captured: Option<FpMode>,
}

#[derive(Debug, Clone)]
enum Local {
    Value { value: Operand, ty: FirType },
    Lambda { symbol: String, sig: Signature },
}

/// A function (or lambda) whose body is being lowered
struct FnState {
    builder: FunctionBuilder,
    scopes: Vec<FxHashMap<String, Local>>,
    subst: Subst,
    /// Return type comes from the first `return` (unannotated lambda)
    infer_return: bool,
    lambdas: u32,
    /// Instructions are emitted in constrained form
    strict: bool,
}

struct Lowering<'a> {
    target: &'a TargetInfo,
    reporter: &'a mut Reporter,
    policy: FloatingPointModePolicy,
    module: ModuleBuilder,
    signatures: FxHashMap<String, Signature>,
    generics: FxHashMap<String, GenericDef<'a>>,
    /// `(generic, type arguments)` to instantiated symbol, in request order
    instantiations: IndexMap<(String, Vec<FloatKind>), String>,
    namespaces: Vec<String>,
    functions: Vec<FnState>,
}

impl<'a> Lowering<'a> {
    fn new(target: &'a TargetInfo, default_mode: FpMode, reporter: &'a mut Reporter) -> Self {
        let module = ModuleBuilder::new(reporter.source().name.clone(), target.triple.clone());
        Self {
            target,
            reporter,
            policy: FloatingPointModePolicy::new(default_mode),
            module,
            signatures: FxHashMap::default(),
            generics: FxHashMap::default(),
            instantiations: IndexMap::new(),
            namespaces: Vec::new(),
            functions: Vec::new(),
        }
    }

    fn lower_module(mut self, ast: &'a Ast) -> FirModule {
        // First pass: signatures and generic definitions, so calls may
        // precede the callee
        self.collect(&ast.items);

        // Second pass: items in source order
        for item in &ast.items {
            self.lower_item(item);
        }
        self.instantiate_pending();

        let Lowering {
            policy,
            module,
            reporter,
            ..
        } = self;
        let report = policy.finish();
        tracing::debug!(
            final_mode = %report.final_mode,
            open_scopes = report.open_scopes,
            "translation unit lowered"
        );
        if report.unmatched_pushes > 0 {
            let end = reporter.source().content.len();
            let warning = CompileError::UnterminatedPush {
                count: report.unmatched_pushes,
                span: Span::new(end, end).into(),
                src: reporter.named_source(),
            };
            tracing::warn!(%warning, "recoverable diagnostic");
            reporter.report(warning);
        }
        module.build()
    }

    // ==================== DIAGNOSTICS ====================

    fn report(&mut self, diagnostic: CompileError) {
        tracing::warn!(%diagnostic, "recoverable diagnostic");
        self.reporter.report(diagnostic);
    }

    fn src(&self) -> miette::NamedSource<String> {
        self.reporter.named_source()
    }

    fn policy_error(&self, err: PolicyError, span: Span) -> CompileError {
        match err {
            PolicyError::Underflow | PolicyError::NoOpenScope => CompileError::PolicyUnderflow {
                span: span.into(),
                src: self.src(),
            },
            other => CompileError::IllegalPragmaCombination {
                message: other.to_string(),
                span: span.into(),
                src: self.src(),
            },
        }
    }

    // ==================== NAMES AND TYPES ====================

    fn qualify(&self, name: &str) -> String {
        if self.namespaces.is_empty() {
            name.to_string()
        } else {
            format!("{}::{name}", self.namespaces.join("::"))
        }
    }

    /// Candidate symbols for `path`, innermost namespace first
    fn candidates(&self, path: &[String]) -> Vec<String> {
        let name = path.join("::");
        (0..=self.namespaces.len())
            .rev()
            .map(|depth| {
                if depth == 0 {
                    name.clone()
                } else {
                    format!("{}::{name}", self.namespaces[..depth].join("::"))
                }
            })
            .collect()
    }

    fn float_type(&self, kind: FloatKind, span: Span) -> Result<FirType> {
        if self.target.supports(kind) {
            Ok(FirType::Float(kind))
        } else {
            Err(CompileError::UnsupportedType {
                ty: kind.source_name().to_string(),
                target: self.target.triple.clone(),
                span: span.into(),
                src: self.src(),
            })
        }
    }

    fn resolve_type(&self, ty: &TypeExpr, subst: &Subst) -> Result<FirType> {
        match &ty.kind {
            TypeKind::Float(kind) => self.float_type(*kind, ty.span),
            TypeKind::I32 => Ok(FirType::I32),
            TypeKind::Void => Ok(FirType::Void),
            TypeKind::Named(name) => match subst.get(name) {
                Some(kind) => self.float_type(*kind, ty.span),
                None => Err(CompileError::UndefinedType {
                    name: name.clone(),
                    span: ty.span.into(),
                    src: self.src(),
                }),
            },
        }
    }

    /// Resolve a type written inside the body being lowered
    fn resolve_local_type(&self, ty: &TypeExpr) -> Result<FirType> {
        match self.functions.last() {
            Some(state) => self.resolve_type(ty, &state.subst),
            None => self.resolve_type(ty, &Subst::default()),
        }
    }

    fn signature(&self, def: &FnDef, subst: &Subst) -> Result<Signature> {
        let params = def
            .params
            .iter()
            .map(|p| self.resolve_type(&p.ty, subst))
            .collect::<Result<Vec<_>>>()?;
        let ret = match &def.return_type {
            Some(ty) => self.resolve_type(ty, subst)?,
            None => FirType::Void,
        };
        Ok(Signature { params, ret })
    }

    // ==================== ITEMS ====================

    fn collect(&mut self, items: &'a [Item]) {
        for item in items {
            match item {
                Item::Function(def) => {
                    let symbol = self.qualify(&def.name);
                    if def.is_generic() {
                        let generic = GenericDef {
                            def,
                            namespace: self.namespaces.clone(),
                            captured: None,
                        };
                        self.generics.insert(symbol, generic);
                    } else {
                        match self.signature(def, &Subst::default()) {
                            Ok(sig) => {
                                self.signatures.insert(symbol, sig);
                            }
                            Err(err) => self.report(err),
                        }
                    }
                }
                Item::Namespace(ns) => {
                    self.namespaces.push(ns.name.clone());
                    self.collect(&ns.items);
                    self.namespaces.pop();
                }
                Item::Pragma(_) => {}
            }
        }
    }

    fn lower_item(&mut self, item: &Item) {
        match item {
            Item::Function(def) if def.is_generic() => {
                let symbol = self.qualify(&def.name);
                let captured = self.policy.capture();
                if let Some(generic) = self.generics.get_mut(&symbol) {
                    tracing::trace!(%symbol, mode = %captured, "captured generic definition mode");
                    generic.captured = Some(captured);
                }
            }
            Item::Function(def) => {
                let symbol = self.qualify(&def.name);
                // A signature that failed to resolve was reported while collecting
                if let Some(sig) = self.signatures.get(&symbol).cloned() {
                    self.policy.enter_function(ScopeKind::Function);
                    self.lower_function_body(def, symbol, sig, Subst::default());
                }
            }
            Item::Namespace(ns) => {
                self.policy.enter_scope(ScopeKind::Namespace);
                self.namespaces.push(ns.name.clone());
                for item in &ns.items {
                    self.lower_item(item);
                }
                self.namespaces.pop();
                self.exit_scope(ns.span);
            }
            Item::Pragma(line) => self.lower_pragma(line),
        }
    }

    fn instantiate_pending(&mut self) {
        let mut next = 0;
        while let Some(((generic, args), symbol)) = self
            .instantiations
            .get_index(next)
            .map(|(key, symbol)| (key.clone(), symbol.clone()))
        {
            next += 1;
            self.instantiate(&generic, &args, symbol);
        }
    }

    fn instantiate(&mut self, generic: &str, args: &[FloatKind], symbol: String) {
        let Some(found) = self.generics.get(generic) else {
            return;
        };
        let def = found.def;
        let namespace = found.namespace.clone();
        let captured = found.captured.unwrap_or_else(|| self.policy.capture());

        let subst: Subst = def
            .generics
            .iter()
            .cloned()
            .zip(args.iter().copied())
            .collect();
        let sig = match self.signature(def, &subst) {
            Ok(sig) => sig,
            Err(err) => {
                self.report(err);
                return;
            }
        };

        tracing::debug!(%symbol, mode = %captured, "instantiating generic function");
        let saved = std::mem::replace(&mut self.namespaces, namespace);
        self.policy.enter_instantiation(captured);
        self.lower_function_body(def, symbol, sig, subst);
        self.namespaces = saved;
    }

    // ==================== FUNCTIONS ====================

    /// Lower a body whose policy scope and frame are already entered
    fn lower_function_body(&mut self, def: &FnDef, symbol: String, sig: Signature, subst: Subst) {
        let id = self.module.fresh_func_id();
        let mut builder = FunctionBuilder::new(id, symbol, sig.ret);
        let mut scope = FxHashMap::default();
        for (param, ty) in def.params.iter().zip(&sig.params) {
            let value = builder.add_param(&param.name, *ty);
            scope.insert(
                param.name.clone(),
                Local::Value {
                    value: Operand::Value(value),
                    ty: *ty,
                },
            );
        }

        self.functions.push(FnState {
            builder,
            scopes: vec![scope],
            subst,
            infer_return: false,
            lambdas: 0,
            strict: false,
        });
        self.sync_strictness();
        self.lower_body(&def.body);
        self.finish_function();
    }

    /// Statements and expressions are only lowered inside a function body
    fn state(&mut self) -> &mut FnState {
        let last = self.functions.len() - 1;
        &mut self.functions[last]
    }

    /// Switch the current function to constrained form once its frame has
    /// escalated, rewriting what was already emitted
    fn sync_strictness(&mut self) {
        if !self.policy.function_is_strict() {
            return;
        }
        if let Some(state) = self.functions.last_mut() {
            if !state.strict {
                state.strict = true;
                let rewritten = state.builder.constrain_all();
                state.builder.set_strictfp(true);
                tracing::debug!(
                    function = state.builder.name(),
                    rewritten,
                    "function switched to constrained fp"
                );
            }
        }
    }

    /// Close the current function, returning its final return type
    fn finish_function(&mut self) -> FirType {
        let Some(mut state) = self.functions.pop() else {
            return FirType::Void;
        };
        match self.policy.exit_function() {
            Ok(summary) => {
                if summary.strict && !state.strict {
                    state.builder.constrain_all();
                }
                state.builder.set_strictfp(summary.strict);
                tracing::debug!(
                    function = state.builder.name(),
                    strict = summary.strict,
                    except = %summary.except,
                    "lowered function"
                );
            }
            Err(err) => tracing::error!(%err, "function scope was not open"),
        }
        let ret = state.builder.return_type();
        self.module.add_function(state.builder.build());
        ret
    }

    fn lower_body(&mut self, body: &Block) {
        let (tail, stmts) = match body.stmts.split_last() {
            Some((Stmt::Expr {
                expr,
                has_semi: false,
            }, rest)) => (Some(expr), rest),
            _ => (None, &body.stmts[..]),
        };

        for stmt in stmts {
            self.lower_stmt_reporting(stmt);
        }

        if let Some(expr) = tail {
            if let Err(err) = self.lower_return(Some(expr), expr.span()) {
                self.report(err);
            }
        }
        if !self.state().builder.is_terminated() {
            self.implicit_return(body.span);
        }
    }

    fn implicit_return(&mut self, span: Span) {
        let state = self.state();
        if state.infer_return {
            state.infer_return = false;
            state.builder.set_return_type(FirType::Void);
        }
        let ret = state.builder.return_type();
        if ret == FirType::Void {
            state.builder.build_return(None);
            return;
        }

        state.builder.build_return(Some((ret, Operand::Undef(ret))));
        let end = Span::new(span.end.saturating_sub(1), span.end);
        let err = CompileError::TypeMismatch {
            expected: ret.to_string(),
            found: "()".to_string(),
            span: end.into(),
            src: self.src(),
            help: Some("add a `return` statement or a tail expression".to_string()),
        };
        self.report(err);
    }

    // ==================== STATEMENTS ====================

    fn lower_stmt_reporting(&mut self, stmt: &Stmt) {
        if let Err(err) = self.lower_stmt(stmt) {
            self.report(err);
        }
    }

    fn lower_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Let {
                name,
                ty,
                init,
                span,
                ..
            } => {
                let declared = ty
                    .as_ref()
                    .map(|ty| self.resolve_local_type(ty))
                    .transpose()?;
                let local = match (declared, init) {
                    (Some(ty), Some(init)) => {
                        let typed = self.lower_value(init)?;
                        let value = self.convert(typed, ty, init.span())?;
                        Local::Value { value, ty }
                    }
                    (None, Some(Expr::Lambda(lambda))) => {
                        let (symbol, sig) = self.lower_lambda(lambda)?;
                        Local::Lambda { symbol, sig }
                    }
                    (None, Some(init)) => {
                        let typed = self.lower_value(init)?;
                        Local::Value {
                            value: typed.value,
                            ty: typed.ty,
                        }
                    }
                    (Some(ty), None) => Local::Value {
                        value: Operand::Undef(ty),
                        ty,
                    },
                    (None, None) => {
                        return Err(CompileError::TypeMismatch {
                            expected: "a type annotation or an initializer".to_string(),
                            found: format!("`let {name}`"),
                            span: (*span).into(),
                            src: self.src(),
                            help: None,
                        });
                    }
                };
                self.bind(name, local);
            }
            Stmt::Assign {
                target,
                op,
                value,
                span,
            } => {
                let ty = match self.lookup(target) {
                    Some(Local::Value { ty, .. }) => ty,
                    Some(Local::Lambda { .. }) => {
                        return Err(CompileError::TypeMismatch {
                            expected: "a variable".to_string(),
                            found: "lambda".to_string(),
                            span: (*span).into(),
                            src: self.src(),
                            help: None,
                        });
                    }
                    None => {
                        return Err(CompileError::UndefinedVariable {
                            name: target.clone(),
                            span: (*span).into(),
                            src: self.src(),
                        });
                    }
                };
                let result = match op.binary_op() {
                    None => self.lower_value(value)?,
                    Some(bin) => {
                        let current = Expr::Var {
                            name: target.clone(),
                            span: *span,
                        };
                        self.lower_binary_value(bin, &current, value, *span)?
                    }
                };
                let converted = self.convert(result, ty, value.span())?;
                self.assign(target, converted);
            }
            Stmt::Return { value, span } => self.lower_return(value.as_ref(), *span)?,
            Stmt::Expr { expr, .. } => {
                self.lower_expr(expr)?;
            }
            Stmt::Block(block) => self.lower_block(block),
            Stmt::Pragma(line) => self.lower_pragma(line),
            Stmt::Empty => {}
        }
        Ok(())
    }

    fn lower_block(&mut self, block: &Block) {
        self.policy.enter_scope(ScopeKind::Block);
        self.state().scopes.push(FxHashMap::default());
        for stmt in &block.stmts {
            self.lower_stmt_reporting(stmt);
        }
        self.state().scopes.pop();
        self.exit_scope(block.span);
    }

    fn exit_scope(&mut self, span: Span) {
        if let Err(err) = self.policy.exit_scope() {
            let diagnostic = self.policy_error(err, span);
            self.report(diagnostic);
        }
    }

    /// Lower a `return`. The function is terminated even when the value
    /// fails to lower, so no second diagnostic follows.
    fn lower_return(&mut self, value: Option<&Expr>, span: Span) -> Result<()> {
        let result = self.lower_return_value(value, span);
        if result.is_err() {
            let state = self.state();
            if !state.builder.is_terminated() {
                let ret = state.builder.return_type();
                let value = (ret != FirType::Void).then_some((ret, Operand::Undef(ret)));
                state.infer_return = false;
                state.builder.build_return(value);
            }
        }
        result
    }

    fn lower_return_value(&mut self, value: Option<&Expr>, span: Span) -> Result<()> {
        let Some(expr) = value else {
            let state = self.state();
            if state.infer_return {
                state.infer_return = false;
                state.builder.set_return_type(FirType::Void);
            }
            let ret = state.builder.return_type();
            if ret != FirType::Void {
                return Err(CompileError::TypeMismatch {
                    expected: ret.to_string(),
                    found: "()".to_string(),
                    span: span.into(),
                    src: self.src(),
                    help: None,
                });
            }
            state.builder.build_return(None);
            return Ok(());
        };

        let typed = self.lower_value(expr)?;
        let state = self.state();
        if state.infer_return {
            state.infer_return = false;
            state.builder.set_return_type(typed.ty);
        }
        let ret = state.builder.return_type();
        if ret == FirType::Void {
            return Err(CompileError::TypeMismatch {
                expected: "()".to_string(),
                found: typed.ty.to_string(),
                span: expr.span().into(),
                src: self.src(),
                help: Some("the function does not return a value".to_string()),
            });
        }
        let value = self.convert(typed, ret, expr.span())?;
        self.state().builder.build_return(Some((ret, value)));
        Ok(())
    }

    fn lower_pragma(&mut self, line: &PragmaLine) {
        match parse_pragma(&line.text) {
            Ok(PragmaDirective::Float(pragmas)) => {
                for pragma in &pragmas {
                    if let Err(err) = self.policy.apply_pragma(pragma) {
                        let diagnostic = self.policy_error(err, line.span);
                        self.report(diagnostic);
                    }
                }
            }
            Ok(PragmaDirective::Unrecognized(name)) => {
                let warning = CompileError::UnknownPragma {
                    name,
                    span: line.span.into(),
                    src: self.src(),
                };
                self.report(warning);
            }
            Err(err) => {
                let diagnostic = CompileError::MalformedPragma {
                    message: err.to_string(),
                    span: line.span.into(),
                    src: self.src(),
                };
                self.report(diagnostic);
            }
        }
        self.sync_strictness();
    }

    // ==================== LOCALS ====================

    fn lookup(&self, name: &str) -> Option<Local> {
        let state = self.functions.last()?;
        state
            .scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .cloned()
    }

    fn bind(&mut self, name: &str, local: Local) {
        if let Some(scope) = self.state().scopes.last_mut() {
            scope.insert(name.to_string(), local);
        }
    }

    /// Rebind an existing variable to a new SSA value
    fn assign(&mut self, name: &str, value: Operand) {
        let state = self.state();
        for scope in state.scopes.iter_mut().rev() {
            if let Some(Local::Value { value: slot, .. }) = scope.get_mut(name) {
                *slot = value;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::SourceFile;
    use crate::fir::{FirFunction, Op};
    use crate::fp::ExceptBehavior;

    fn lower_src(source: &str) -> (FirModule, Reporter) {
        let file = SourceFile::new("t.fp", source);
        let tokens = crate::lexer::lex_file(&file).unwrap();
        let ast = crate::parser::parse_file(&tokens, &file).unwrap();
        let mut reporter = Reporter::new(file);
        let module = lower(&ast, &TargetInfo::default(), FpMode::default(), &mut reporter);
        (module, reporter)
    }

    fn function<'m>(module: &'m FirModule, name: &str) -> &'m FirFunction {
        module.find_function(name).unwrap()
    }

    #[test]
    fn test_pragma_after_namespace_applies_to_later_function() {
        let (module, reporter) = lower_src(
            "namespace ns {
                #pragma float_control(except, on, push)
                fn a(x: f64) -> f64 { return x / x; }
            }
            fn b(x: f64) -> f64 { return x / x; }
            #pragma float_control(pop)
            fn c(x: f64) -> f64 { return x / x; }",
        );
        assert!(!reporter.has_errors());
        assert!(function(&module, "ns::a").strictfp);
        assert!(function(&module, "b").strictfp);
        assert!(!function(&module, "c").strictfp);
    }

    #[test]
    fn test_generic_instantiated_once_per_type() {
        let (module, reporter) = lower_src(
            "fn twice<T>(x: T) -> T { return x + x; }
            fn f(a: f32, b: f32) -> f32 { return twice(a) + twice(b); }",
        );
        assert!(!reporter.has_errors());
        let names: Vec<_> = module.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["f", "twice<f32>"]);
    }

    #[test]
    fn test_retroactive_rewrite_keeps_ignore() {
        let (module, _) = lower_src(
            "fn g(x: f32) -> f32 {
                let y: f32 = x * x;
                #pragma float_control(except, on)
                return y + x;
            }",
        );
        let g = function(&module, "g");
        let excepts: Vec<_> = g.fp_instructions().map(|(_, fp)| fp.except).collect();
        assert_eq!(excepts, [ExceptBehavior::Ignore, ExceptBehavior::Strict]);
        assert!(g.fp_instructions().all(|(_, fp)| fp.constrained));
    }

    #[test]
    fn test_statements_after_return_emit_nothing() {
        let (module, reporter) = lower_src(
            "fn h(x: f32) -> f32 {
                return x;
                let y: f32 = x * x;
            }",
        );
        assert!(!reporter.has_errors());
        assert_eq!(function(&module, "h").instructions().count(), 0);
    }

    #[test]
    fn test_error_in_statement_does_not_stop_function() {
        let (module, reporter) = lower_src(
            "fn k(x: f32) -> f32 {
                let y: f32 = missing * x;
                return x * x;
            }",
        );
        assert_eq!(reporter.error_count(), 1);
        let k = function(&module, "k");
        assert!(k.instructions().any(|i| matches!(i.op, Op::Binary { .. })));
    }
}
