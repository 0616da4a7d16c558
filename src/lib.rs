//! fpc: floating-point pragma policy compiler
//!
//! fpc compiles a small C-like language whose floating-point semantics are
//! controlled by scoped pragmas:
//! - `#pragma float_control(precise|except, on|off[, push])` and `(push|pop)`
//! - `#pragma clang fp eval_method(...)`, `contract(...)`, `exceptions(...)`
//! - `#pragma STDC FENV_ACCESS` and `#pragma STDC FP_CONTRACT`
//!
//! Every arithmetic operation is lowered under the mode in effect at its
//! source position. A function that needs strict exception semantics
//! anywhere is lowered entirely with constrained intrinsics and marked
//! `strictfp`.
//!
//! # Architecture
//!
//! ```text
//! Source → Lexer → Parser → AST → Lowering (+ FloatingPointModePolicy) → FIR → text
//! ```
//!
//! # Example
//!
//! ```text
//! #pragma float_control(except, on, push)
//! fn scale(a: f32, b: f32) -> f32 {
//!     a * b
//! }
//! #pragma float_control(pop)
//! ```

pub mod ast;
pub mod common;
pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod fir;
pub mod fp;
pub mod lexer;
pub mod lower;
pub mod parser;
pub mod target;

pub use diagnostics::{CompileError, Reporter, SourceFile};

pub use ast::Ast;
pub use config::CompileOptions;
pub use driver::{CompileOutput, Session, compile_files, compile_source};
pub use fir::FirModule;
pub use fp::{FloatingPointModePolicy, FpMode};
pub use target::TargetInfo;

/// Compiler version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Compile source text with default options and return the printed FIR
pub fn compile(source: &str) -> miette::Result<String> {
    let output = compile_source("<input>", source, &CompileOptions::default())?;
    match output.errors.into_iter().next() {
        Some(error) => Err(error.into()),
        None => Ok(output.ir),
    }
}

/// Parse source code to AST
pub fn parse(source: &str) -> miette::Result<Ast> {
    let tokens = lexer::lex(source)?;
    parser::parse(&tokens, source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_compile_reports_first_error() {
        assert!(compile("fn f() -> f32 { missing }").is_err());
        assert!(compile("fn f(a: f64) -> f64 { a }").is_ok());
    }
}
