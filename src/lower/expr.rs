//! Expression lowering
//!
//! Arithmetic is lowered per expression tree. Operands are brought to their
//! common semantic type, the whole tree is evaluated at the type the
//! evaluation method selects, and the result is narrowed back once, where
//! the value leaves the tree.

use super::{FnState, Local, Lowering, Result, Signature, Subst};
use crate::ast::{BinaryOp, Expr, LambdaExpr, TypeKind, UnaryOp};
use crate::common::Span;
use crate::diagnostics::CompileError;
use crate::fir::{CastOp, FirType, FloatOp, FpAttrs, FunctionBuilder, Operand};
use crate::fp::{FloatKind, FpMode, ScopeKind};
use rustc_hash::FxHashMap;

/// A lowered value and its type
#[derive(Debug, Clone, Copy)]
pub(super) struct Typed {
    pub value: Operand,
    pub ty: FirType,
}

/// Floating-point value inside an arithmetic tree
#[derive(Debug, Clone, Copy)]
struct Arith {
    value: Operand,
    /// Type of the expression in the source
    semantic: FloatKind,
    /// Type `value` actually has
    eval: FloatKind,
}

impl Arith {
    fn exact(value: Operand, kind: FloatKind) -> Self {
        Self {
            value,
            semantic: kind,
            eval: kind,
        }
    }
}

/// Operand of an arithmetic tree before the usual arithmetic conversions
#[derive(Debug, Clone, Copy)]
enum Leaf {
    Float(Arith),
    Int(Operand),
}

enum Callee {
    Function { symbol: String, sig: Signature },
    Generic { symbol: String },
}

const FLT_EVAL_METHOD: &str = "__FLT_EVAL_METHOD__";

fn float_op(op: BinaryOp) -> FloatOp {
    match op {
        BinaryOp::Add => FloatOp::FAdd,
        BinaryOp::Sub => FloatOp::FSub,
        BinaryOp::Mul => FloatOp::FMul,
        BinaryOp::Div => FloatOp::FDiv,
        BinaryOp::Rem => FloatOp::FRem,
    }
}

/// Round a constant to the precision of `kind` where the host can
fn round_to(kind: FloatKind, value: f64) -> f64 {
    match kind {
        FloatKind::F32 => value as f32 as f64,
        _ => value,
    }
}

fn mangle(symbol: &str, args: &[FloatKind]) -> String {
    let args: Vec<&str> = args.iter().map(|k| k.source_name()).collect();
    format!("{symbol}<{}>", args.join(", "))
}

impl Lowering<'_> {
    /// Lower an expression whose value may be void (a call statement)
    pub(super) fn lower_expr(&mut self, expr: &Expr) -> Result<Typed> {
        match expr {
            Expr::FloatLit {
                value,
                suffix,
                span,
            } => {
                let kind = suffix.unwrap_or(FloatKind::F64);
                let ty = self.float_type(kind, *span)?;
                Ok(Typed {
                    value: Operand::Float(round_to(kind, *value), kind),
                    ty,
                })
            }
            Expr::IntLit { value, span } => Ok(Typed {
                value: self.int_constant(*value, *span)?,
                ty: FirType::I32,
            }),
            Expr::Var { name, span } => self.lower_var(name, *span),
            Expr::Binary { .. } | Expr::Unary { .. } => match self.lower_arith(expr)? {
                Leaf::Float(arith) => Ok(self.narrow(arith)),
                Leaf::Int(value) => Ok(Typed {
                    value,
                    ty: FirType::I32,
                }),
            },
            Expr::Cast { expr, ty, span } => {
                let typed = self.lower_value(expr)?;
                let to = self.resolve_local_type(ty)?;
                let value = self.convert(typed, to, *span)?;
                Ok(Typed { value, ty: to })
            }
            Expr::Call { path, args, span } => self.lower_call(path, args, *span),
            Expr::Invoke { callee, args, span } => match callee.as_ref() {
                Expr::Lambda(lambda) => {
                    let (symbol, sig) = self.lower_lambda(lambda)?;
                    self.emit_call("lambda", symbol, sig, args, *span)
                }
                other => Err(CompileError::TypeMismatch {
                    expected: "a function".to_string(),
                    found: "expression".to_string(),
                    span: other.span().into(),
                    src: self.src(),
                    help: Some("only named functions and lambdas can be called".to_string()),
                }),
            },
            Expr::Lambda(lambda) => Err(CompileError::TypeMismatch {
                expected: "a value".to_string(),
                found: "lambda".to_string(),
                span: lambda.span.into(),
                src: self.src(),
                help: Some("bind the lambda with `let` or call it".to_string()),
            }),
        }
    }

    /// Lower an expression that must produce a value
    pub(super) fn lower_value(&mut self, expr: &Expr) -> Result<Typed> {
        let typed = self.lower_expr(expr)?;
        if typed.ty == FirType::Void {
            return Err(CompileError::TypeMismatch {
                expected: "a value".to_string(),
                found: "()".to_string(),
                span: expr.span().into(),
                src: self.src(),
                help: None,
            });
        }
        Ok(typed)
    }

    fn lower_var(&mut self, name: &str, span: Span) -> Result<Typed> {
        match self.lookup(name) {
            Some(Local::Value { value, ty }) => Ok(Typed { value, ty }),
            Some(Local::Lambda { .. }) => Err(CompileError::TypeMismatch {
                expected: "a value".to_string(),
                found: "lambda".to_string(),
                span: span.into(),
                src: self.src(),
                help: Some(format!("call it: `{name}(...)`")),
            }),
            None if name == FLT_EVAL_METHOD => {
                let method = self.policy.current().eval_method;
                Ok(Typed {
                    value: Operand::Int(method.flt_eval_method().into()),
                    ty: FirType::I32,
                })
            }
            None => Err(CompileError::UndefinedVariable {
                name: name.to_string(),
                span: span.into(),
                src: self.src(),
            }),
        }
    }

    // ==================== ARITHMETIC ====================

    /// Mode of the operation being lowered, and the attributes it gets
    fn arith_attrs(&mut self) -> (FpMode, FpAttrs) {
        let mode = self.policy.query();
        self.sync_strictness();
        let constrained = self.policy.function_is_strict();
        (mode, FpAttrs::from_mode(&mode, constrained))
    }

    fn lower_arith(&mut self, expr: &Expr) -> Result<Leaf> {
        match expr {
            Expr::Binary {
                op,
                left,
                right,
                span,
                ..
            } => self.lower_binary(*op, left, right, *span).map(Leaf::Float),
            Expr::Unary {
                op: UnaryOp::Neg,
                expr: inner,
                span,
            } => match self.lower_arith(inner)? {
                Leaf::Float(arith) => Ok(Leaf::Float(self.negate(arith))),
                Leaf::Int(Operand::Int(value)) => Ok(Leaf::Int(self.int_constant(-value, *span)?)),
                Leaf::Int(_) => Err(self.int_arith_error(*span)),
            },
            _ => {
                let typed = self.lower_value(expr)?;
                match typed.ty {
                    FirType::Float(kind) => Ok(Leaf::Float(Arith::exact(typed.value, kind))),
                    _ => Ok(Leaf::Int(typed.value)),
                }
            }
        }
    }

    /// Lower `left op right` and narrow the result, as for `x op= y`
    pub(super) fn lower_binary_value(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        span: Span,
    ) -> Result<Typed> {
        let arith = self.lower_binary(op, left, right, span)?;
        Ok(self.narrow(arith))
    }

    fn lower_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr, span: Span) -> Result<Arith> {
        if op == BinaryOp::Add && self.policy.current().allows_fmuladd() {
            if let Expr::Binary {
                op: BinaryOp::Mul,
                left: a,
                right: b,
                ..
            } = left
            {
                return self.lower_muladd(a, b, right, false, span);
            }
            if let Expr::Binary {
                op: BinaryOp::Mul,
                left: a,
                right: b,
                ..
            } = right
            {
                return self.lower_muladd(a, b, left, true, span);
            }
        }

        let lhs = self.lower_arith(left)?;
        let rhs = self.lower_arith(right)?;
        let operands = self.unify(&[lhs, rhs], span)?;
        let semantic = operands[0].semantic.max(operands[1].semantic);

        let (mode, fp) = self.arith_attrs();
        let eval = self.target.eval_type(semantic, mode.eval_method);
        let a = self.widen(operands[0], eval, fp);
        let b = self.widen(operands[1], eval, fp);
        let value =
            self.state()
                .builder
                .build_binary(float_op(op), a, b, FirType::Float(eval), fp);
        tracing::trace!(?op, %semantic, %eval, %mode, "lowered arithmetic");
        Ok(Arith {
            value,
            semantic,
            eval,
        })
    }

    /// `a * b + c` as one multiply-add
    fn lower_muladd(
        &mut self,
        a: &Expr,
        b: &Expr,
        addend: &Expr,
        addend_first: bool,
        span: Span,
    ) -> Result<Arith> {
        let (a, b, c) = if addend_first {
            let c = self.lower_arith(addend)?;
            (self.lower_arith(a)?, self.lower_arith(b)?, c)
        } else {
            (self.lower_arith(a)?, self.lower_arith(b)?, self.lower_arith(addend)?)
        };
        let operands = self.unify(&[a, b, c], span)?;
        let semantic = operands
            .iter()
            .map(|o| o.semantic)
            .max()
            .unwrap_or(FloatKind::F64);

        let (mode, fp) = self.arith_attrs();
        let eval = self.target.eval_type(semantic, mode.eval_method);
        let a = self.widen(operands[0], eval, fp);
        let b = self.widen(operands[1], eval, fp);
        let c = self.widen(operands[2], eval, fp);
        let value = self
            .state()
            .builder
            .build_muladd(a, b, c, FirType::Float(eval), fp);
        tracing::trace!(%semantic, %eval, %mode, "contracted multiply-add");
        Ok(Arith {
            value,
            semantic,
            eval,
        })
    }

    /// Usual arithmetic conversions: integers become the widest float type
    fn unify(&mut self, leaves: &[Leaf], span: Span) -> Result<Vec<Arith>> {
        let Some(kind) = leaves
            .iter()
            .filter_map(|leaf| match leaf {
                Leaf::Float(arith) => Some(arith.semantic),
                Leaf::Int(_) => None,
            })
            .max()
        else {
            return Err(self.int_arith_error(span));
        };

        let mut operands = Vec::with_capacity(leaves.len());
        for leaf in leaves {
            let arith = match *leaf {
                Leaf::Float(arith) => arith,
                Leaf::Int(Operand::Int(value)) => {
                    Arith::exact(Operand::Float(value as f64, kind), kind)
                }
                Leaf::Int(value) => {
                    let (_, fp) = self.arith_attrs();
                    let converted =
                        self.state()
                            .builder
                            .build_cast(CastOp::SiToFp, value, FirType::Float(kind), fp);
                    Arith::exact(converted, kind)
                }
            };
            operands.push(arith);
        }
        Ok(operands)
    }

    /// Integer constants are `i32`
    fn int_constant(&self, value: i64, span: Span) -> Result<Operand> {
        if i32::try_from(value).is_err() {
            return Err(CompileError::InvalidLiteral {
                text: value.to_string(),
                span: span.into(),
                src: self.src(),
            });
        }
        Ok(Operand::Int(value))
    }

    fn int_arith_error(&self, span: Span) -> CompileError {
        CompileError::TypeMismatch {
            expected: "floating-point operands".to_string(),
            found: "i32".to_string(),
            span: span.into(),
            src: self.src(),
            help: Some("convert an operand with `as f64`".to_string()),
        }
    }

    fn widen(&mut self, arith: Arith, eval: FloatKind, fp: FpAttrs) -> Operand {
        if arith.eval == eval {
            return arith.value;
        }
        match arith.value {
            Operand::Float(value, _) => Operand::Float(value, eval),
            value => self
                .state()
                .builder
                .build_cast(CastOp::FpExt, value, FirType::Float(eval), fp),
        }
    }

    /// Bring a tree result back to its semantic type
    fn narrow(&mut self, arith: Arith) -> Typed {
        let ty = FirType::Float(arith.semantic);
        if arith.eval == arith.semantic {
            return Typed {
                value: arith.value,
                ty,
            };
        }
        let value = match arith.value {
            Operand::Float(value, _) => {
                Operand::Float(round_to(arith.semantic, value), arith.semantic)
            }
            value => {
                let (_, fp) = self.arith_attrs();
                self.state().builder.build_cast(CastOp::FpTrunc, value, ty, fp)
            }
        };
        Typed { value, ty }
    }

    fn negate(&mut self, arith: Arith) -> Arith {
        let value = match arith.value {
            Operand::Float(value, kind) => Operand::Float(-value, kind),
            value => {
                let (_, fp) = self.arith_attrs();
                self.state()
                    .builder
                    .build_fneg(value, FirType::Float(arith.eval), fp)
            }
        };
        Arith { value, ..arith }
    }

    // ==================== CONVERSIONS ====================

    /// Convert a value to `to`, as for an assignment, argument, return or
    /// `as` cast. Constants are folded.
    pub(super) fn convert(&mut self, typed: Typed, to: FirType, span: Span) -> Result<Operand> {
        if typed.ty == to {
            return Ok(typed.value);
        }
        let op = match (typed.ty, to) {
            (FirType::Float(from), FirType::Float(kind)) => {
                if let Operand::Float(value, _) = typed.value {
                    return Ok(Operand::Float(round_to(kind, value), kind));
                }
                if kind > from {
                    CastOp::FpExt
                } else {
                    CastOp::FpTrunc
                }
            }
            (FirType::I32, FirType::Float(kind)) => {
                if let Operand::Int(value) = typed.value {
                    return Ok(Operand::Float(round_to(kind, value as f64), kind));
                }
                CastOp::SiToFp
            }
            (FirType::Float(_), FirType::I32) => {
                if let Operand::Float(value, _) = typed.value {
                    let truncated = value.trunc();
                    if !(f64::from(i32::MIN)..=f64::from(i32::MAX)).contains(&truncated) {
                        return Err(CompileError::InvalidLiteral {
                            text: value.to_string(),
                            span: span.into(),
                            src: self.src(),
                        });
                    }
                    return Ok(Operand::Int(truncated as i64));
                }
                CastOp::FpToSi
            }
            (from, to) => {
                return Err(CompileError::TypeMismatch {
                    expected: to.to_string(),
                    found: from.to_string(),
                    span: span.into(),
                    src: self.src(),
                    help: None,
                });
            }
        };
        let (_, fp) = self.arith_attrs();
        Ok(self.state().builder.build_cast(op, typed.value, to, fp))
    }

    // ==================== CALLS ====================

    fn resolve_callee(&self, path: &[String]) -> Option<Callee> {
        if let [name] = path {
            if let Some(Local::Lambda { symbol, sig }) = self.lookup(name) {
                return Some(Callee::Function { symbol, sig });
            }
        }
        self.candidates(path).into_iter().find_map(|symbol| {
            if let Some(sig) = self.signatures.get(&symbol) {
                Some(Callee::Function {
                    sig: sig.clone(),
                    symbol,
                })
            } else if self.generics.contains_key(&symbol) {
                Some(Callee::Generic { symbol })
            } else {
                None
            }
        })
    }

    fn lower_call(&mut self, path: &[String], args: &[Expr], span: Span) -> Result<Typed> {
        let name = path.join("::");
        match self.resolve_callee(path) {
            Some(Callee::Function { symbol, sig }) => self.emit_call(&name, symbol, sig, args, span),
            Some(Callee::Generic { symbol }) => self.lower_generic_call(&name, symbol, args, span),
            None => Err(CompileError::UndefinedFunction {
                name,
                span: span.into(),
                src: self.src(),
            }),
        }
    }

    fn check_arity(&self, name: &str, expected: usize, found: usize, span: Span) -> Result<()> {
        if expected == found {
            return Ok(());
        }
        Err(CompileError::ArityMismatch {
            name: name.to_string(),
            expected,
            found,
            span: span.into(),
            src: self.src(),
        })
    }

    fn emit_call(
        &mut self,
        name: &str,
        symbol: String,
        sig: Signature,
        args: &[Expr],
        span: Span,
    ) -> Result<Typed> {
        self.check_arity(name, sig.params.len(), args.len(), span)?;
        let mut lowered = Vec::with_capacity(args.len());
        for (arg, ty) in args.iter().zip(&sig.params) {
            let typed = self.lower_value(arg)?;
            let value = self.convert(typed, *ty, arg.span())?;
            lowered.push((*ty, value));
        }
        let value = self.state().builder.build_call(symbol, lowered, sig.ret);
        Ok(Typed { value, ty: sig.ret })
    }

    /// Deduce the type arguments from the call and request the
    /// instantiation; its body is lowered at the end of the unit
    fn lower_generic_call(
        &mut self,
        name: &str,
        symbol: String,
        args: &[Expr],
        span: Span,
    ) -> Result<Typed> {
        let Some(def) = self.generics.get(&symbol).map(|g| g.def) else {
            return Err(CompileError::UndefinedFunction {
                name: name.to_string(),
                span: span.into(),
                src: self.src(),
            });
        };
        self.check_arity(name, def.params.len(), args.len(), span)?;

        let mut lowered = Vec::with_capacity(args.len());
        for arg in args {
            lowered.push(self.lower_value(arg)?);
        }

        let mut subst = Subst::default();
        for ((param, typed), arg) in def.params.iter().zip(&lowered).zip(args) {
            let TypeKind::Named(generic) = &param.ty.kind else {
                continue;
            };
            if !def.generics.contains(generic) {
                continue;
            }
            let FirType::Float(kind) = typed.ty else {
                return Err(CompileError::TypeMismatch {
                    expected: format!("a floating-point type for `{generic}`"),
                    found: typed.ty.to_string(),
                    span: arg.span().into(),
                    src: self.src(),
                    help: None,
                });
            };
            match subst.get(generic) {
                Some(previous) if *previous != kind => {
                    return Err(CompileError::TypeMismatch {
                        expected: previous.source_name().to_string(),
                        found: kind.source_name().to_string(),
                        span: arg.span().into(),
                        src: self.src(),
                        help: Some(format!("every argument for `{generic}` must have the same type")),
                    });
                }
                _ => {
                    subst.insert(generic.clone(), kind);
                }
            }
        }

        let mut kinds = Vec::with_capacity(def.generics.len());
        for generic in &def.generics {
            match subst.get(generic) {
                Some(kind) => kinds.push(*kind),
                None => {
                    return Err(CompileError::CannotInfer {
                        name: name.to_string(),
                        param: generic.clone(),
                        span: span.into(),
                        src: self.src(),
                    });
                }
            }
        }

        let sig = self.signature(def, &subst)?;
        let mangled = self
            .instantiations
            .entry((symbol.clone(), kinds.clone()))
            .or_insert_with(|| mangle(&symbol, &kinds))
            .clone();

        let mut call_args = Vec::with_capacity(lowered.len());
        for ((typed, ty), arg) in lowered.into_iter().zip(&sig.params).zip(args) {
            let value = self.convert(typed, *ty, arg.span())?;
            call_args.push((*ty, value));
        }
        let value = self.state().builder.build_call(mangled, call_args, sig.ret);
        Ok(Typed { value, ty: sig.ret })
    }

    // ==================== LAMBDAS ====================

    /// Lower a lambda as a function of its own, `outer::{lambda#N}`
    pub(super) fn lower_lambda(&mut self, lambda: &LambdaExpr) -> Result<(String, Signature)> {
        let subst = self.state().subst.clone();
        let params = lambda
            .params
            .iter()
            .map(|p| self.resolve_type(&p.ty, &subst))
            .collect::<Result<Vec<_>>>()?;
        let ret = lambda
            .return_type
            .as_ref()
            .map(|ty| self.resolve_type(ty, &subst))
            .transpose()?;

        let outer = self.state();
        outer.lambdas += 1;
        let symbol = format!("{}::{{lambda#{}}}", outer.builder.name(), outer.lambdas);

        let id = self.module.fresh_func_id();
        let mut builder = FunctionBuilder::new(id, symbol.clone(), ret.unwrap_or(FirType::Void));
        let mut scope = FxHashMap::default();
        for (param, ty) in lambda.params.iter().zip(&params) {
            let value = builder.add_param(&param.name, *ty);
            scope.insert(
                param.name.clone(),
                Local::Value {
                    value: Operand::Value(value),
                    ty: *ty,
                },
            );
        }

        self.policy.enter_function(ScopeKind::Lambda);
        self.functions.push(FnState {
            builder,
            scopes: vec![scope],
            subst,
            infer_return: ret.is_none(),
            lambdas: 0,
            strict: false,
        });
        self.sync_strictness();
        self.lower_body(&lambda.body);
        let ret = self.finish_function();

        Ok((symbol, Signature { params, ret }))
    }
}
