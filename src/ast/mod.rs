//! Abstract Syntax Tree for fpc source files
//!
//! This module defines the AST types produced by the parser. Pragmas stay in
//! the tree at the position they were written, so the lowering pass sees
//! them in parse order.

use crate::common::{NodeId, Span};
use crate::fp::FloatKind;
use serde::{Deserialize, Serialize};

/// Top-level AST
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ast {
    pub items: Vec<Item>,
}

/// Top-level item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Item {
    Function(FnDef),
    Namespace(NamespaceDef),
    Pragma(PragmaLine),
}

/// A `#pragma` line, kept as raw text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PragmaLine {
    /// Text after `pragma`
    pub text: String,
    pub span: Span,
}

// ==================== ITEMS ====================

/// `namespace name { items }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceDef {
    pub id: NodeId,
    pub name: String,
    pub items: Vec<Item>,
    pub span: Span,
}

/// Function definition. Non-empty `generics` makes it a template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FnDef {
    pub id: NodeId,
    pub name: String,
    pub generics: Vec<String>,
    pub params: Vec<Param>,
    pub return_type: Option<TypeExpr>,
    pub body: Block,
    pub span: Span,
}

impl FnDef {
    pub fn is_generic(&self) -> bool {
        !self.generics.is_empty()
    }
}

/// Function or lambda parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    pub id: NodeId,
    pub name: String,
    pub ty: TypeExpr,
    pub span: Span,
}

// ==================== TYPES ====================

/// Type annotation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeExpr {
    pub kind: TypeKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeKind {
    Float(FloatKind),
    I32,
    Void,
    /// Generic parameter or unknown name
    Named(String),
}

// ==================== STATEMENTS ====================

/// Compound statement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Stmt {
    Let {
        id: NodeId,
        name: String,
        ty: Option<TypeExpr>,
        init: Option<Expr>,
        span: Span,
    },
    Assign {
        target: String,
        op: AssignOp,
        value: Expr,
        span: Span,
    },
    Return {
        value: Option<Expr>,
        span: Span,
    },
    Expr {
        expr: Expr,
        has_semi: bool,
    },
    Block(Block),
    Pragma(PragmaLine),
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
}

impl AssignOp {
    /// Binary operator applied by a compound assignment
    pub fn binary_op(self) -> Option<BinaryOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::AddAssign => Some(BinaryOp::Add),
            AssignOp::SubAssign => Some(BinaryOp::Sub),
            AssignOp::MulAssign => Some(BinaryOp::Mul),
            AssignOp::DivAssign => Some(BinaryOp::Div),
        }
    }
}

// ==================== EXPRESSIONS ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expr {
    FloatLit {
        value: f64,
        /// Explicit suffix such as `1.0f32`; unsuffixed literals are `f64`
        suffix: Option<FloatKind>,
        span: Span,
    },
    IntLit {
        value: i64,
        span: Span,
    },
    /// Variable or builtin such as `__FLT_EVAL_METHOD__`
    Var {
        name: String,
        span: Span,
    },
    Binary {
        id: NodeId,
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
        span: Span,
    },
    Cast {
        expr: Box<Expr>,
        ty: TypeExpr,
        span: Span,
    },
    /// Call of a named function, `ns::f(args)`
    Call {
        path: Vec<String>,
        args: Vec<Expr>,
        span: Span,
    },
    /// Call of an arbitrary callee, e.g. an immediately invoked lambda
    Invoke {
        callee: Box<Expr>,
        args: Vec<Expr>,
        span: Span,
    },
    Lambda(LambdaExpr),
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::FloatLit { span, .. }
            | Expr::IntLit { span, .. }
            | Expr::Var { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Cast { span, .. }
            | Expr::Call { span, .. }
            | Expr::Invoke { span, .. } => *span,
            Expr::Lambda(lambda) => lambda.span,
        }
    }
}

/// `|params| -> ret { body }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LambdaExpr {
    pub id: NodeId,
    pub params: Vec<Param>,
    pub return_type: Option<TypeExpr>,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
}
