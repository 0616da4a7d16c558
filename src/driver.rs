//! Compilation driver
//!
//! Runs the pipeline `lex → parse → lower → print` for one translation unit,
//! or for several in parallel. Every translation unit gets its own
//! [`FloatingPointModePolicy`](crate::fp::FloatingPointModePolicy); nothing is
//! shared between them.

use crate::ast::Ast;
use crate::config::{CompileOptions, ConfigError};
use crate::diagnostics::{CompileError, Reporter, SourceFile};
use crate::fir::{FirModule, print_module};
use crate::fp::FpMode;
use crate::target::TargetInfo;
use crate::{lexer, lower, parser};
use std::path::{Path, PathBuf};
use std::thread;

/// Result of compiling one translation unit.
///
/// Recoverable diagnostics do not stop compilation; they are collected here
/// and the module is still produced.
#[derive(Debug)]
pub struct CompileOutput {
    pub name: String,
    pub module: FirModule,
    /// Textual FIR
    pub ir: String,
    pub errors: Vec<CompileError>,
    pub warnings: Vec<CompileError>,
}

impl CompileOutput {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Print warnings and errors to stderr
    pub fn emit_diagnostics(&self) {
        for diagnostic in self.warnings.iter().chain(&self.errors) {
            eprintln!("{:?}", miette::Report::new(diagnostic.clone()));
        }
    }
}

/// Target and base mode resolved once per invocation
#[derive(Debug, Clone)]
pub struct Session {
    pub options: CompileOptions,
    pub target: TargetInfo,
    pub default_mode: FpMode,
}

impl Session {
    pub fn new(options: CompileOptions) -> Result<Self, ConfigError> {
        let target = options.target_info()?;
        let default_mode = options.default_mode(&target)?;
        tracing::debug!(triple = %target.triple, mode = %default_mode, "session configured");
        Ok(Self {
            options,
            target,
            default_mode,
        })
    }

    /// Compile one translation unit. Lex and parse errors abort it.
    pub fn compile(&self, file: &SourceFile) -> miette::Result<CompileOutput> {
        let ast = parse_file(file)?;
        let mut reporter = Reporter::new(file.clone());
        let module = lower::lower(&ast, &self.target, self.default_mode, &mut reporter);
        let ir = print_module(&module);
        let (errors, warnings) = reporter.into_parts();
        tracing::info!(
            file = %file.name,
            functions = module.functions.len(),
            errors = errors.len(),
            warnings = warnings.len(),
            "compiled translation unit"
        );
        Ok(CompileOutput {
            name: file.name.clone(),
            module,
            ir,
            errors,
            warnings,
        })
    }

    /// Compile several translation units concurrently. Results come back in
    /// input order.
    pub fn compile_all(&self, files: &[SourceFile]) -> Vec<miette::Result<CompileOutput>> {
        let workers = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .clamp(1, files.len().max(1));
        if workers == 1 {
            return files.iter().map(|file| self.compile(file)).collect();
        }

        let chunk = files.len().div_ceil(workers);
        thread::scope(|scope| {
            let handles: Vec<_> = files
                .chunks(chunk)
                .map(|batch| {
                    scope.spawn(move || {
                        batch
                            .iter()
                            .map(|file| self.compile(file))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            handles
                .into_iter()
                .zip(files.chunks(chunk))
                .flat_map(|(handle, batch)| match handle.join() {
                    Ok(results) => results,
                    Err(_) => batch
                        .iter()
                        .map(|file| Err(miette::miette!("worker compiling `{}` panicked", file.name)))
                        .collect(),
                })
                .collect()
        })
    }
}

/// Lex and parse a source file
pub fn parse_file(file: &SourceFile) -> miette::Result<Ast> {
    let tokens = lexer::lex_file(file)?;
    tracing::debug!(file = %file.name, tokens = tokens.len(), "lexed");
    let ast = parser::parse_file(&tokens, file)?;
    tracing::debug!(file = %file.name, items = ast.items.len(), "parsed");
    Ok(ast)
}

/// Compile a single translation unit held in memory
pub fn compile_source(
    name: &str,
    source: &str,
    options: &CompileOptions,
) -> miette::Result<CompileOutput> {
    let session = Session::new(options.clone())?;
    session.compile(&SourceFile::new(name, source))
}

/// Compile in-memory translation units in parallel
pub fn compile_files(
    files: &[SourceFile],
    options: &CompileOptions,
) -> miette::Result<Vec<miette::Result<CompileOutput>>> {
    let session = Session::new(options.clone())?;
    Ok(session.compile_all(files))
}

/// Read source files from disk
pub fn read_sources(paths: &[PathBuf]) -> miette::Result<Vec<SourceFile>> {
    paths.iter().map(|path| read_source(path)).collect()
}

pub fn read_source(path: &Path) -> miette::Result<SourceFile> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| miette::miette!("failed to read `{}`: {}", path.display(), e))?;
    Ok(SourceFile::new(path.display().to_string(), content))
}

/// JSON dump of the parsed AST for `--emit ast`
pub fn emit_ast(file: &SourceFile) -> miette::Result<String> {
    let ast = parse_file(file)?;
    serde_json::to_string_pretty(&ast)
        .map_err(|e| miette::miette!("failed to serialize AST: {}", e))
}
