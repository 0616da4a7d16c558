//! Diagnostic reporting with source locations
//!
//! This module provides rich error messages with source locations using miette.

use crate::common::Span;
use miette::{Diagnostic, NamedSource, SourceSpan};
use std::sync::Arc;
use thiserror::Error;

/// Source file for error reporting
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub content: Arc<str>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: Arc::from(content.into()),
        }
    }

    pub fn to_named_source(&self) -> NamedSource<String> {
        NamedSource::new(self.name.clone(), self.content.to_string())
    }
}

/// Convert our Span to miette's SourceSpan
impl From<Span> for SourceSpan {
    fn from(span: Span) -> Self {
        SourceSpan::new(span.start.into(), span.len())
    }
}

/// Compiler diagnostic
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CompileError {
    // === Lex / Parse Errors ===
    #[error("Invalid token `{text}`")]
    #[diagnostic(code(lex::invalid_token))]
    InvalidToken {
        text: String,
        #[label("not recognized")]
        span: SourceSpan,
        #[source_code]
        src: NamedSource<String>,
    },

    #[error("Unexpected token: expected {expected}, found {found}")]
    #[diagnostic(code(parse::unexpected_token))]
    UnexpectedToken {
        expected: String,
        found: String,
        #[label("unexpected token here")]
        span: SourceSpan,
        #[source_code]
        src: NamedSource<String>,
    },

    #[error("Unexpected end of file")]
    #[diagnostic(code(parse::unexpected_eof))]
    UnexpectedEof {
        #[label("expected more tokens")]
        span: SourceSpan,
        #[source_code]
        src: NamedSource<String>,
    },

    #[error("Invalid literal `{text}`")]
    #[diagnostic(code(parse::invalid_literal))]
    InvalidLiteral {
        text: String,
        #[label("cannot be represented")]
        span: SourceSpan,
        #[source_code]
        src: NamedSource<String>,
    },

    #[error("Nesting deeper than {limit} levels")]
    #[diagnostic(
        code(parse::nesting_too_deep),
        help("split the expression or block into smaller pieces")
    )]
    NestingTooDeep {
        limit: usize,
        #[label("too deeply nested")]
        span: SourceSpan,
        #[source_code]
        src: NamedSource<String>,
    },

    // === Pragma Errors ===
    #[error("`#pragma float_control(pop)` without a matching push")]
    #[diagnostic(
        code(pragma::underflow),
        help("every `pop` must follow a `push` in the same scope")
    )]
    PolicyUnderflow {
        #[label("nothing to pop here")]
        span: SourceSpan,
        #[source_code]
        src: NamedSource<String>,
    },

    #[error("{message}")]
    #[diagnostic(code(pragma::malformed), help("the directive is ignored"))]
    MalformedPragma {
        message: String,
        #[label("malformed directive")]
        span: SourceSpan,
        #[source_code]
        src: NamedSource<String>,
    },

    #[error("{message}")]
    #[diagnostic(code(pragma::illegal_combination), help("the directive is ignored"))]
    IllegalPragmaCombination {
        message: String,
        #[label("conflicts with the current floating-point mode")]
        span: SourceSpan,
        #[source_code]
        src: NamedSource<String>,
    },

    #[error("Unknown pragma `{name}` ignored")]
    #[diagnostic(code(pragma::unknown), severity(Warning))]
    UnknownPragma {
        name: String,
        #[label("ignored")]
        span: SourceSpan,
        #[source_code]
        src: NamedSource<String>,
    },

    #[error("{count} `float_control(push)` never popped")]
    #[diagnostic(code(pragma::unterminated_push), severity(Warning))]
    UnterminatedPush {
        count: usize,
        #[label("translation unit ends here")]
        span: SourceSpan,
        #[source_code]
        src: NamedSource<String>,
    },

    // === Resolution Errors ===
    #[error("Undefined variable `{name}`")]
    #[diagnostic(code(resolve::undefined_var))]
    UndefinedVariable {
        name: String,
        #[label("not found in this scope")]
        span: SourceSpan,
        #[source_code]
        src: NamedSource<String>,
    },

    #[error("Undefined function `{name}`")]
    #[diagnostic(code(resolve::undefined_fn))]
    UndefinedFunction {
        name: String,
        #[label("no function with this name")]
        span: SourceSpan,
        #[source_code]
        src: NamedSource<String>,
    },

    #[error("Undefined type `{name}`")]
    #[diagnostic(code(resolve::undefined_type))]
    UndefinedType {
        name: String,
        #[label("not a type or type parameter")]
        span: SourceSpan,
        #[source_code]
        src: NamedSource<String>,
    },

    // === Type Errors ===
    #[error("Type mismatch: expected `{expected}`, found `{found}`")]
    #[diagnostic(code(typecheck::mismatch))]
    TypeMismatch {
        expected: String,
        found: String,
        #[label("expected `{expected}`")]
        span: SourceSpan,
        #[source_code]
        src: NamedSource<String>,
        #[help]
        help: Option<String>,
    },

    #[error("`{name}` takes {expected} argument(s) but {found} were supplied")]
    #[diagnostic(code(typecheck::arity))]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
        #[label("wrong number of arguments")]
        span: SourceSpan,
        #[source_code]
        src: NamedSource<String>,
    },

    #[error("Cannot infer type parameter `{param}` of `{name}`")]
    #[diagnostic(code(typecheck::cannot_infer))]
    CannotInfer {
        name: String,
        param: String,
        #[label("no argument determines `{param}`")]
        span: SourceSpan,
        #[source_code]
        src: NamedSource<String>,
    },

    #[error("Type `{ty}` is not supported on target `{target}`")]
    #[diagnostic(code(target::unsupported_type))]
    UnsupportedType {
        ty: String,
        target: String,
        #[label("used here")]
        span: SourceSpan,
        #[source_code]
        src: NamedSource<String>,
    },
}

impl CompileError {
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            CompileError::UnknownPragma { .. } | CompileError::UnterminatedPush { .. }
        )
    }
}

/// Error reporter that collects diagnostics
pub struct Reporter {
    source: SourceFile,
    errors: Vec<CompileError>,
    warnings: Vec<CompileError>,
}

impl Reporter {
    pub fn new(source: SourceFile) -> Self {
        Self {
            source,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn error(&mut self, error: CompileError) {
        tracing::debug!(%error, "error reported");
        self.errors.push(error);
    }

    pub fn warning(&mut self, warning: CompileError) {
        tracing::debug!(%warning, "warning reported");
        self.warnings.push(warning);
    }

    /// Route a diagnostic by its severity
    pub fn report(&mut self, diagnostic: CompileError) {
        if diagnostic.is_warning() {
            self.warning(diagnostic);
        } else {
            self.error(diagnostic);
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Create NamedSource for this file
    pub fn named_source(&self) -> NamedSource<String> {
        self.source.to_named_source()
    }

    /// Get the source file
    pub fn source(&self) -> &SourceFile {
        &self.source
    }

    /// Consume and return `(errors, warnings)`
    pub fn into_parts(self) -> (Vec<CompileError>, Vec<CompileError>) {
        (self.errors, self.warnings)
    }

    /// Get errors by reference
    pub fn errors(&self) -> &[CompileError] {
        &self.errors
    }

    pub fn warnings(&self) -> &[CompileError] {
        &self.warnings
    }
}
