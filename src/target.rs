//! Target description
//!
//! Only the properties that affect floating-point lowering are modelled:
//! the `long double` format, availability of `f128` and native `f16`
//! arithmetic, and the evaluation method used when none is requested.

use crate::fp::{EvalMethod, FloatKind};
use thiserror::Error;

/// Architecture family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X86_64,
    X86,
    PowerPc,
    AArch64,
    Nvptx64,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("unsupported target triple `{0}`")]
    UnknownTriple(String),
    #[error("`long double` cannot be {0}")]
    InvalidLongDouble(FloatKind),
}

/// Floating-point relevant target configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetInfo {
    pub triple: String,
    pub arch: Arch,
    /// Format of `long double`, the `Extended` evaluation type
    pub long_double: FloatKind,
    pub has_float128: bool,
    /// `f16` arithmetic without promotion to `f32`
    pub native_half: bool,
    pub default_eval_method: EvalMethod,
}

pub const DEFAULT_TRIPLE: &str = "x86_64-unknown-linux-gnu";

impl Default for TargetInfo {
    fn default() -> Self {
        Self::x86_64(DEFAULT_TRIPLE)
    }
}

impl TargetInfo {
    fn x86_64(triple: &str) -> Self {
        Self {
            triple: triple.to_string(),
            arch: Arch::X86_64,
            long_double: FloatKind::F80,
            has_float128: true,
            native_half: false,
            default_eval_method: EvalMethod::Source,
        }
    }

    /// x86_64 properties under another triple, used for unrecognized targets
    pub fn fallback(triple: &str) -> Self {
        Self::x86_64(triple)
    }

    /// Describe the target named by `triple`
    pub fn from_triple(triple: &str) -> Result<Self, TargetError> {
        let arch = triple.split('-').next().unwrap_or_default();
        let os_is = |os: &str| triple.split('-').any(|part| part.starts_with(os));

        let info = match arch {
            "x86_64" | "amd64" => Self::x86_64(triple),
            "i386" | "i486" | "i586" | "i686" => Self {
                arch: Arch::X86,
                ..Self::x86_64(triple)
            },
            "powerpc" | "powerpc64" | "powerpc64le" => {
                let aix = os_is("aix");
                Self {
                    triple: triple.to_string(),
                    arch: Arch::PowerPc,
                    long_double: if aix { FloatKind::F64 } else { FloatKind::F128 },
                    has_float128: !aix,
                    native_half: false,
                    default_eval_method: if aix {
                        EvalMethod::Double
                    } else {
                        EvalMethod::Source
                    },
                }
            }
            "aarch64" | "arm64" => {
                let darwin = os_is("apple") || os_is("darwin");
                Self {
                    triple: triple.to_string(),
                    arch: Arch::AArch64,
                    long_double: if darwin { FloatKind::F64 } else { FloatKind::F128 },
                    has_float128: !darwin,
                    native_half: true,
                    default_eval_method: EvalMethod::Source,
                }
            }
            "nvptx64" => Self {
                triple: triple.to_string(),
                arch: Arch::Nvptx64,
                long_double: FloatKind::F64,
                has_float128: false,
                native_half: true,
                default_eval_method: EvalMethod::Source,
            },
            _ => return Err(TargetError::UnknownTriple(triple.to_string())),
        };
        Ok(info)
    }

    /// Override the `long double` format (`-mlong-double-80` and friends)
    pub fn with_long_double(mut self, kind: FloatKind) -> Result<Self, TargetError> {
        match kind {
            FloatKind::F64 | FloatKind::F128 => {}
            FloatKind::F80 if matches!(self.arch, Arch::X86 | Arch::X86_64) => {}
            other => return Err(TargetError::InvalidLongDouble(other)),
        }
        self.long_double = kind;
        Ok(self)
    }

    pub fn supports(&self, kind: FloatKind) -> bool {
        match kind {
            FloatKind::F80 => matches!(self.arch, Arch::X86 | Arch::X86_64),
            FloatKind::F128 => self.has_float128 || self.long_double == FloatKind::F128,
            _ => true,
        }
    }

    /// Type an operation on `operand` is evaluated in under `method`.
    ///
    /// Never narrower than `operand`; equal to it when no widening applies.
    pub fn eval_type(&self, operand: FloatKind, method: EvalMethod) -> FloatKind {
        let promoted = if operand == FloatKind::F16 && !self.native_half {
            FloatKind::F32
        } else {
            operand
        };
        match method {
            EvalMethod::Source => promoted,
            EvalMethod::Double => promoted.max(FloatKind::F64),
            EvalMethod::Extended => promoted.max(self.long_double),
        }
    }
}
