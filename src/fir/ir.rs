//! FIR definitions - SSA form for floating-point lowering
//!
//! Every floating-point instruction carries the [`FpAttrs`] it was lowered
//! with, so a function that escalates to strict semantics can rewrite the
//! instructions it emitted earlier into their constrained form.

use crate::fp::{ExceptBehavior, FloatKind, FpMode, RoundingMode};
use rustc_hash::FxHashMap;
use std::fmt;

/// FIR module - one translation unit
#[derive(Debug, Clone)]
pub struct FirModule {
    pub name: String,
    pub target_triple: String,
    pub functions: Vec<FirFunction>,
}

impl FirModule {
    pub fn new(name: impl Into<String>, target_triple: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target_triple: target_triple.into(),
            functions: Vec::new(),
        }
    }

    pub fn find_function(&self, name: &str) -> Option<&FirFunction> {
        self.functions.iter().find(|f| f.name == name)
    }
}

/// FIR function
#[derive(Debug, Clone)]
pub struct FirFunction {
    pub id: FunctionId,
    pub name: String,
    pub params: Vec<FirParam>,
    pub return_type: FirType,
    pub blocks: Vec<FirBlock>,
    /// Lowered entirely with constrained operations
    pub strictfp: bool,
    /// Names of values that have one (parameters)
    pub value_names: FxHashMap<ValueId, String>,
}

impl FirFunction {
    pub fn entry_block(&self) -> Option<&FirBlock> {
        self.blocks.first()
    }

    pub fn instructions(&self) -> impl Iterator<Item = &FirInstr> {
        self.blocks.iter().flat_map(|b| b.instructions.iter())
    }

    /// Floating-point instructions and their attributes
    pub fn fp_instructions(&self) -> impl Iterator<Item = (&FirInstr, &FpAttrs)> {
        self.instructions()
            .filter_map(|instr| instr.op.fp_attrs().map(|attrs| (instr, attrs)))
    }
}

/// Function identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId(pub u32);

/// Block identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

impl BlockId {
    pub const ENTRY: BlockId = BlockId(0);
}

/// Value identifier (SSA value)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueId(pub u32);

/// FIR parameter
#[derive(Debug, Clone)]
pub struct FirParam {
    pub value: ValueId,
    pub name: String,
    pub ty: FirType,
}

/// FIR type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FirType {
    Void,
    I32,
    Float(FloatKind),
}

impl fmt::Display for FirType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FirType::Void => f.write_str("void"),
            FirType::I32 => f.write_str("i32"),
            FirType::Float(kind) => f.write_str(kind.ir_name()),
        }
    }
}

/// Instruction operand
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    Value(ValueId),
    Float(f64, FloatKind),
    Int(i64),
    Undef(FirType),
}

/// Floating-point semantics attached to one instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FpAttrs {
    /// `fast` flags
    pub fast: bool,
    /// Lowered as a constrained intrinsic
    pub constrained: bool,
    pub rounding: RoundingMode,
    pub except: ExceptBehavior,
}

impl FpAttrs {
    pub fn from_mode(mode: &FpMode, constrained: bool) -> Self {
        Self {
            fast: mode.fast_math(),
            constrained,
            rounding: mode.rounding,
            except: mode.except,
        }
    }
}

/// FIR basic block
#[derive(Debug, Clone)]
pub struct FirBlock {
    pub id: BlockId,
    pub label: String,
    pub instructions: Vec<FirInstr>,
    pub terminator: FirTerminator,
}

impl FirBlock {
    pub fn new(id: BlockId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            instructions: Vec::new(),
            terminator: FirTerminator::Unreachable,
        }
    }
}

/// FIR instruction
#[derive(Debug, Clone)]
pub struct FirInstr {
    pub result: Option<ValueId>,
    pub op: Op,
    /// Result type
    pub ty: FirType,
}

/// Arithmetic operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatOp {
    FAdd,
    FSub,
    FMul,
    FDiv,
    FRem,
}

impl FloatOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            FloatOp::FAdd => "fadd",
            FloatOp::FSub => "fsub",
            FloatOp::FMul => "fmul",
            FloatOp::FDiv => "fdiv",
            FloatOp::FRem => "frem",
        }
    }
}

/// Conversion between floating-point and integer types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastOp {
    FpExt,
    FpTrunc,
    SiToFp,
    FpToSi,
}

impl CastOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            CastOp::FpExt => "fpext",
            CastOp::FpTrunc => "fptrunc",
            CastOp::SiToFp => "sitofp",
            CastOp::FpToSi => "fptosi",
        }
    }

    /// Whether the constrained form takes a rounding argument
    pub fn rounds(self) -> bool {
        matches!(self, CastOp::FpTrunc | CastOp::SiToFp)
    }
}

/// FIR operation
#[derive(Debug, Clone)]
pub enum Op {
    /// Binary arithmetic at type `ty` of the instruction
    Binary {
        op: FloatOp,
        lhs: Operand,
        rhs: Operand,
        fp: FpAttrs,
    },
    /// `a * b + c` with a single rounding permitted
    MulAdd {
        a: Operand,
        b: Operand,
        c: Operand,
        fp: FpAttrs,
    },
    FNeg { operand: Operand, fp: FpAttrs },
    Cast {
        op: CastOp,
        value: Operand,
        from: FirType,
        fp: FpAttrs,
    },
    /// Direct call by symbol name
    Call {
        callee: String,
        args: Vec<(FirType, Operand)>,
    },
}

impl Op {
    pub fn fp_attrs(&self) -> Option<&FpAttrs> {
        match self {
            Op::Binary { fp, .. }
            | Op::MulAdd { fp, .. }
            | Op::FNeg { fp, .. }
            | Op::Cast { fp, .. } => Some(fp),
            Op::Call { .. } => None,
        }
    }

    pub fn fp_attrs_mut(&mut self) -> Option<&mut FpAttrs> {
        match self {
            Op::Binary { fp, .. }
            | Op::MulAdd { fp, .. }
            | Op::FNeg { fp, .. }
            | Op::Cast { fp, .. } => Some(fp),
            Op::Call { .. } => None,
        }
    }
}

/// Block terminator
#[derive(Debug, Clone)]
pub enum FirTerminator {
    Return(Option<(FirType, Operand)>),
    Unreachable,
}
