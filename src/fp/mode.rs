//! Floating-point mode values
//!
//! An [`FpMode`] is the complete set of floating-point semantics in effect at
//! one point of a translation unit. It is a plain `Copy` value: the policy
//! stack stores copies of it, templates capture it, and the lowering reads it
//! once per arithmetic operation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Exception behavior of floating-point operations, ordered by strictness
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExceptBehavior {
    /// Exceptions may be ignored; ordinary instructions are used
    Ignore,
    /// Operations may raise exceptions but spurious ones may be suppressed
    MayTrap,
    /// Exception semantics must be preserved exactly
    Strict,
}

impl ExceptBehavior {
    /// Metadata string attached to constrained intrinsics
    pub fn metadata(self) -> &'static str {
        match self {
            ExceptBehavior::Ignore => "fpexcept.ignore",
            ExceptBehavior::MayTrap => "fpexcept.maytrap",
            ExceptBehavior::Strict => "fpexcept.strict",
        }
    }
}

/// Intermediate precision used to evaluate an expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvalMethod {
    /// Evaluate at the precision of the operand type
    Source,
    /// Evaluate `float` and narrower at `double`
    Double,
    /// Evaluate at the target's `long double`
    Extended,
}

impl EvalMethod {
    /// Value reported by `__FLT_EVAL_METHOD__`
    pub fn flt_eval_method(self) -> i32 {
        match self {
            EvalMethod::Source => 0,
            EvalMethod::Double => 1,
            EvalMethod::Extended => 2,
        }
    }
}

/// Multiply-add contraction policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FpContract {
    /// Never fuse
    Off,
    /// Fuse within one expression (`llvm.fmuladd`)
    On,
    /// Leave fusion to the backend via fast-math flags
    Fast,
}

/// Rounding mode assumed by the generated code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundingMode {
    ToNearest,
    /// Rounding mode may be changed at run time (`FENV_ACCESS ON`)
    Dynamic,
}

impl RoundingMode {
    pub fn metadata(self) -> &'static str {
        match self {
            RoundingMode::ToNearest => "round.tonearest",
            RoundingMode::Dynamic => "round.dynamic",
        }
    }
}

/// Floating-point semantics in effect at a program point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FpMode {
    /// `true` keeps strict IEEE semantics, `false` permits fast-math
    pub precise: bool,
    pub except: ExceptBehavior,
    pub eval_method: EvalMethod,
    pub contract: FpContract,
    pub rounding: RoundingMode,
}

impl Default for FpMode {
    fn default() -> Self {
        Self {
            precise: true,
            except: ExceptBehavior::Ignore,
            eval_method: EvalMethod::Source,
            contract: FpContract::On,
            rounding: RoundingMode::ToNearest,
        }
    }
}

impl FpMode {
    /// Whether fast-math flags are attached to arithmetic
    pub fn fast_math(&self) -> bool {
        !self.precise
    }

    /// Whether operations must use the constrained (strict) form
    pub fn requires_constrained(&self) -> bool {
        self.except != ExceptBehavior::Ignore || self.rounding == RoundingMode::Dynamic
    }

    /// Whether `a * b + c` may be emitted as a single multiply-add
    pub fn allows_fmuladd(&self) -> bool {
        self.precise && self.contract == FpContract::On
    }

    pub fn with_eval_method(mut self, eval_method: EvalMethod) -> Self {
        self.eval_method = eval_method;
        self
    }

    pub fn with_except(mut self, except: ExceptBehavior) -> Self {
        self.except = except;
        self
    }

    /// Relaxed semantics as selected by `-ffast-math`
    pub fn fast(mut self) -> Self {
        self.precise = false;
        self.contract = FpContract::Fast;
        self
    }
}

impl fmt::Display for FpMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "precise={} except={} eval={} contract={} rounding={}",
            self.precise, self.except, self.eval_method, self.contract, self.rounding
        )
    }
}

/// Floating-point storage formats known to the compiler
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FloatKind {
    F16,
    F32,
    F64,
    /// x87 80-bit extended precision
    F80,
    F128,
}

impl FloatKind {
    /// Type name in the textual IR
    pub fn ir_name(self) -> &'static str {
        match self {
            FloatKind::F16 => "half",
            FloatKind::F32 => "float",
            FloatKind::F64 => "double",
            FloatKind::F80 => "x86_fp80",
            FloatKind::F128 => "fp128",
        }
    }

    /// Overload suffix used in intrinsic names
    pub fn intrinsic_suffix(self) -> &'static str {
        match self {
            FloatKind::F16 => "f16",
            FloatKind::F32 => "f32",
            FloatKind::F64 => "f64",
            FloatKind::F80 => "f80",
            FloatKind::F128 => "f128",
        }
    }

    /// Source-level type name
    pub fn source_name(self) -> &'static str {
        self.intrinsic_suffix()
    }
}

/// Error returned when a mode keyword is not recognized
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unrecognized {what} `{found}`")]
pub struct ModeParseError {
    pub what: &'static str,
    pub found: String,
}

impl ModeParseError {
    fn new(what: &'static str, found: &str) -> Self {
        Self {
            what,
            found: found.to_string(),
        }
    }
}

impl FromStr for EvalMethod {
    type Err = ModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "source" => Ok(EvalMethod::Source),
            "double" => Ok(EvalMethod::Double),
            "extended" => Ok(EvalMethod::Extended),
            other => Err(ModeParseError::new("evaluation method", other)),
        }
    }
}

impl FromStr for FpContract {
    type Err = ModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(FpContract::Off),
            "on" => Ok(FpContract::On),
            "fast" => Ok(FpContract::Fast),
            other => Err(ModeParseError::new("contraction mode", other)),
        }
    }
}

impl FromStr for ExceptBehavior {
    type Err = ModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ignore" => Ok(ExceptBehavior::Ignore),
            "maytrap" => Ok(ExceptBehavior::MayTrap),
            "strict" => Ok(ExceptBehavior::Strict),
            other => Err(ModeParseError::new("exception behavior", other)),
        }
    }
}

impl FromStr for FloatKind {
    type Err = ModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "f16" | "16" => Ok(FloatKind::F16),
            "f32" | "32" => Ok(FloatKind::F32),
            "f64" | "64" => Ok(FloatKind::F64),
            "f80" | "80" => Ok(FloatKind::F80),
            "f128" | "128" => Ok(FloatKind::F128),
            other => Err(ModeParseError::new("float format", other)),
        }
    }
}

impl fmt::Display for ExceptBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExceptBehavior::Ignore => "ignore",
            ExceptBehavior::MayTrap => "maytrap",
            ExceptBehavior::Strict => "strict",
        };
        f.write_str(s)
    }
}

impl fmt::Display for EvalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EvalMethod::Source => "source",
            EvalMethod::Double => "double",
            EvalMethod::Extended => "extended",
        };
        f.write_str(s)
    }
}

impl fmt::Display for FpContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FpContract::Off => "off",
            FpContract::On => "on",
            FpContract::Fast => "fast",
        };
        f.write_str(s)
    }
}

impl fmt::Display for RoundingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.metadata())
    }
}

impl fmt::Display for FloatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ir_name())
    }
}
