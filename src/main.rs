//! fpc CLI
//!
//! Main entry point for the `fpc` command.

use clap::{Parser, Subcommand};
use fpc::config::CompileOptions;
use fpc::driver::{self, CompileOutput, Session};
use fpc::fp::{EvalMethod, ExceptBehavior, FpContract};
use miette::{IntoDiagnostic, Result};
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "fpc")]
#[command(author = "Demetrios Chiuratto Agourakis, Dionisio Chiuratto Agourakis")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Floating-point pragma policy compiler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ./fpc.toml when present)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(flatten)]
    fp: FpArgs,
}

/// Command-line overrides of the configured floating-point defaults
#[derive(clap::Args)]
struct FpArgs {
    /// Target triple
    #[arg(long, global = true, value_name = "TRIPLE")]
    target: Option<String>,

    /// Evaluation method: source, double or extended
    #[arg(long, global = true)]
    eval_method: Option<EvalMethod>,

    /// Contraction: on, off or fast
    #[arg(long, global = true)]
    fp_contract: Option<FpContract>,

    /// Exception behavior: ignore, maytrap or strict
    #[arg(long, global = true)]
    fp_exceptions: Option<ExceptBehavior>,

    /// Allow all fast-math transformations
    #[arg(long, global = true)]
    fast_math: bool,

    /// Width of `long double` in bits (64, 80 or 128)
    #[arg(long, global = true, value_name = "BITS")]
    long_double: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile source files to FIR
    Compile {
        /// Input files, compiled in parallel
        #[arg(value_name = "FILES", required = true)]
        inputs: Vec<PathBuf>,

        /// Output file (a directory when compiling several inputs)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// What to emit
        #[arg(long, value_enum, default_value = "fir")]
        emit: EmitType,
    },

    /// Parse and lower a file, printing diagnostics only
    Check {
        /// Input file
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Show the version and the effective default floating-point mode
    Info,
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum EmitType {
    /// Abstract Syntax Tree (JSON)
    Ast,
    /// Float IR
    Fir,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.verbose {
        tracing::info!("Verbose mode enabled");
    }

    let options = load_options(cli.config.as_deref(), &cli.fp)?;

    match cli.command {
        Commands::Compile {
            inputs,
            output,
            emit,
        } => compile(&inputs, output.as_deref(), emit, options),
        Commands::Check { input } => check(&input, options),
        Commands::Info => info(options),
    }
}

fn load_options(config: Option<&Path>, fp: &FpArgs) -> Result<CompileOptions> {
    let mut options = match config {
        Some(path) => CompileOptions::load(path)?,
        None if Path::new("fpc.toml").exists() => CompileOptions::load(Path::new("fpc.toml"))?,
        None => CompileOptions::default(),
    };

    if let Some(target) = &fp.target {
        options.target = target.clone();
    }
    if let Some(method) = fp.eval_method {
        options.fp.eval_method = Some(method);
    }
    if let Some(contract) = fp.fp_contract {
        options.fp.contract = contract;
    }
    if let Some(except) = fp.fp_exceptions {
        options.fp.exceptions = except;
    }
    if fp.fast_math {
        options.fp.fast_math = true;
    }
    if let Some(bits) = fp.long_double {
        options.long_double = Some(bits);
    }
    Ok(options)
}

fn compile(
    inputs: &[PathBuf],
    output: Option<&Path>,
    emit: EmitType,
    options: CompileOptions,
) -> Result<()> {
    let files = driver::read_sources(inputs)?;

    if emit == EmitType::Ast {
        for file in &files {
            let json = driver::emit_ast(file)?;
            write_output(output, inputs.len(), &file.name, "json", &json)?;
        }
        return Ok(());
    }

    let session = Session::new(options)?;
    tracing::info!(files = files.len(), target = %session.target.triple, "compiling");

    let mut failed = 0;
    for result in session.compile_all(&files) {
        let out: CompileOutput = match result {
            Ok(out) => out,
            Err(report) => {
                eprintln!("{:?}", report);
                failed += 1;
                continue;
            }
        };
        out.emit_diagnostics();
        if out.has_errors() {
            failed += 1;
            continue;
        }
        write_output(output, inputs.len(), &out.name, "fir", &out.ir)?;
    }

    if failed > 0 {
        return Err(miette::miette!("{} translation unit(s) failed to compile", failed));
    }
    Ok(())
}

/// Write to stdout, to `output`, or to `output/<stem>.<ext>` for several inputs
fn write_output(
    output: Option<&Path>,
    inputs: usize,
    name: &str,
    ext: &str,
    text: &str,
) -> Result<()> {
    let Some(output) = output else {
        println!("{}", text);
        return Ok(());
    };

    let path = if inputs > 1 {
        std::fs::create_dir_all(output).into_diagnostic()?;
        let stem = Path::new(name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("out");
        output.join(format!("{}.{}", stem, ext))
    } else {
        output.to_path_buf()
    };
    std::fs::write(&path, text)
        .map_err(|e| miette::miette!("failed to write `{}`: {}", path.display(), e))?;
    tracing::info!(path = %path.display(), "wrote output");
    Ok(())
}

fn check(input: &Path, options: CompileOptions) -> Result<()> {
    let file = driver::read_source(input)?;
    let output = Session::new(options)?.compile(&file)?;
    output.emit_diagnostics();

    if output.has_errors() {
        return Err(miette::miette!(
            "{} error(s) in `{}`",
            output.errors.len(),
            output.name
        ));
    }
    println!(
        "{}: ok ({} function(s), {} warning(s))",
        output.name,
        output.module.functions.len(),
        output.warnings.len()
    );
    Ok(())
}

fn info(options: CompileOptions) -> Result<()> {
    let session = Session::new(options)?;
    println!("fpc {}", fpc::VERSION);
    println!();
    println!("Target:          {}", session.target.triple);
    println!("long double:     {}", session.target.long_double);
    println!("Eval method:     {}", session.default_mode.eval_method);
    println!("Default mode:    {}", session.default_mode);
    println!();
    println!("Pragmas:");
    println!("  #pragma float_control(precise|except, on|off[, push])");
    println!("  #pragma float_control(push|pop)");
    println!("  #pragma clang fp eval_method(source|double|extended)");
    println!("  #pragma clang fp contract(on|off|fast)");
    println!("  #pragma clang fp exceptions(ignore|maytrap|strict)");
    println!("  #pragma STDC FENV_ACCESS ON|OFF");
    println!("  #pragma STDC FP_CONTRACT ON|OFF");
    Ok(())
}
