//! Floating-point control
//!
//! Mode values, `#pragma` directives that change them, and the scoped
//! policy that decides which mode applies to each arithmetic operation.

pub mod mode;
pub mod policy;
pub mod pragma;

pub use mode::{EvalMethod, ExceptBehavior, FloatKind, FpContract, FpMode, RoundingMode};
pub use policy::{
    FloatingPointModePolicy, FunctionFpSummary, ModeScope, PolicyError, PolicyReport,
    PolicyStack, ScopeKind,
};
pub use pragma::{FpPragma, PragmaDirective, PragmaError, parse_pragma};
