//! Compiler options
//!
//! Options come from an optional `fpc.toml` and are then overridden by
//! command-line flags. They determine the target and the floating-point mode
//! every translation unit starts from.
//!
//! ```toml
//! target = "i386-linux-gnu"
//! long_double = 80
//!
//! [fp]
//! eval_method = "extended"
//! contract = "on"
//! exceptions = "ignore"
//! fast_math = false
//! ```

use crate::fp::{EvalMethod, ExceptBehavior, FloatKind, FpContract, FpMode, RoundingMode};
use crate::target::{DEFAULT_TRIPLE, TargetError, TargetInfo};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config file `{path}`: {source}")]
    #[diagnostic(code(config::io))]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    #[diagnostic(code(config::parse))]
    Parse(#[from] toml::de::Error),
    #[error(transparent)]
    #[diagnostic(code(config::target))]
    Target(#[from] TargetError),
    #[error("`long_double = {0}` is not a valid width (expected 64, 80 or 128)")]
    #[diagnostic(code(config::long_double))]
    LongDoubleWidth(u16),
    #[error("fast-math cannot be combined with exception behavior `{0}`")]
    #[diagnostic(code(config::fast_math), help("use `exceptions = \"ignore\"` with fast-math"))]
    FastMathWithExceptions(ExceptBehavior),
}

/// Initial floating-point settings of a translation unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FpDefaults {
    /// Falls back to the target's default when unset
    pub eval_method: Option<EvalMethod>,
    pub contract: FpContract,
    pub exceptions: ExceptBehavior,
    pub fast_math: bool,
    pub fenv_access: bool,
}

impl Default for FpDefaults {
    fn default() -> Self {
        Self {
            eval_method: None,
            contract: FpContract::On,
            exceptions: ExceptBehavior::Ignore,
            fast_math: false,
            fenv_access: false,
        }
    }
}

/// Options shared by every translation unit of one invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompileOptions {
    pub target: String,
    /// `long double` width in bits
    pub long_double: Option<u16>,
    pub fp: FpDefaults,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            target: DEFAULT_TRIPLE.to_string(),
            long_double: None,
            fp: FpDefaults::default(),
        }
    }
}

impl CompileOptions {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn with_target(mut self, triple: impl Into<String>) -> Self {
        self.target = triple.into();
        self
    }

    pub fn with_eval_method(mut self, method: EvalMethod) -> Self {
        self.fp.eval_method = Some(method);
        self
    }

    pub fn with_long_double(mut self, bits: u16) -> Self {
        self.long_double = Some(bits);
        self
    }

    /// Resolve the configured target. Unknown triples get x86_64 defaults.
    pub fn target_info(&self) -> Result<TargetInfo, ConfigError> {
        let target = match TargetInfo::from_triple(&self.target) {
            Ok(target) => target,
            Err(TargetError::UnknownTriple(triple)) => {
                tracing::warn!(%triple, "unknown target triple, assuming x86_64 floating-point properties");
                TargetInfo::fallback(&triple)
            }
            Err(err) => return Err(err.into()),
        };
        match self.long_double {
            None => Ok(target),
            Some(bits @ (64 | 80 | 128)) => {
                let kind: FloatKind = bits
                    .to_string()
                    .parse()
                    .map_err(|_| ConfigError::LongDoubleWidth(bits))?;
                Ok(target.with_long_double(kind)?)
            }
            Some(bits) => Err(ConfigError::LongDoubleWidth(bits)),
        }
    }

    /// Mode pushed as the base entry of every translation unit
    pub fn default_mode(&self, target: &TargetInfo) -> Result<FpMode, ConfigError> {
        let fp = &self.fp;
        let mut mode = FpMode {
            contract: fp.contract,
            ..FpMode::default()
        }
        .with_eval_method(fp.eval_method.unwrap_or(target.default_eval_method))
        .with_except(fp.exceptions);

        if fp.fenv_access {
            mode.except = ExceptBehavior::Strict;
            mode.rounding = RoundingMode::Dynamic;
        }
        if fp.fast_math {
            if mode.except != ExceptBehavior::Ignore {
                return Err(ConfigError::FastMathWithExceptions(mode.except));
            }
            mode = mode.fast();
        }
        Ok(mode)
    }
}
