//! Float IR (FIR)
//!
//! FIR is a small SSA representation of the floating-point work in a
//! translation unit. It is what the lowering pass produces and what
//! `--emit fir` prints:
//! - Static Single Assignment values, one `entry` block per function
//! - Per-instruction floating-point attributes (fast flags, constrained
//!   form, rounding and exception behavior)
//! - `strictfp` marking for functions lowered under constrained semantics

pub mod builder;
pub mod ir;
pub mod printer;

pub use builder::{FunctionBuilder, ModuleBuilder};
pub use ir::*;
pub use printer::{IrPrinter, print_module};
