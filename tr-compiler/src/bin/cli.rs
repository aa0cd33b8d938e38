//! tr Language compiler CLI

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tr_checker::{Diagnostic, Severity, Strictness};
use tr_compiler::{CompilationPipeline, CompilerConfig, IncrementalCompiler};
use tr_parser::parse_to_ir;
use tracing::{error, info, warn};

/// Source files the batch command picks up from directories
const SOURCE_EXTENSION: &str = "trb";

#[derive(Parser)]
#[command(name = "trc")]
#[command(about = "Type-checking compiler for the tr annotated scripting language")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a source file and show its declarations
    Parse(ParseArgs),

    /// Type check a source file
    Check(CheckArgs),

    /// Compile a source file to erased source and signatures
    Compile(CompileArgs),

    /// Check many files in parallel against a shared registry
    Batch(BatchArgs),

    /// Create default configuration file
    InitConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "trc.toml")]
        output: PathBuf,
    },

    /// Validate configuration file
    ValidateConfig {
        /// Configuration file path
        path: PathBuf,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Pretty,
    Json,
    Debug,
}

#[derive(Args)]
struct ParseArgs {
    /// Input source file
    input: PathBuf,

    #[arg(short, long, value_enum, default_value = "pretty")]
    format: Format,
}

#[derive(Args)]
struct CheckArgs {
    /// Input source file
    input: PathBuf,

    #[arg(short, long, value_enum, default_value = "pretty")]
    format: Format,

    /// Stop at the first return type mismatch
    #[arg(long)]
    strict: bool,
}

#[derive(Args)]
struct CompileArgs {
    /// Input source file
    input: PathBuf,

    /// Output directory (defaults to next to the input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Stop at the first return type mismatch
    #[arg(long)]
    strict: bool,

    /// Do not write the signature sidecar
    #[arg(long)]
    no_signatures: bool,
}

#[derive(Args)]
struct BatchArgs {
    /// Source files or directories
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Worker threads (0 = available parallelism)
    #[arg(short = 'j', long)]
    workers: Option<usize>,

    #[arg(short, long, value_enum, default_value = "pretty")]
    format: Format,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Parse(args) => handle_parse(args),
        Commands::Check(args) => handle_check(args, config),
        Commands::Compile(args) => handle_compile(args, config),
        Commands::Batch(args) => handle_batch(args, config).await,
        Commands::InitConfig { output } => handle_init_config(output),
        Commands::ValidateConfig { path } => handle_validate_config(path),
    }
}

fn load_config(path: Option<&Path>) -> Result<CompilerConfig> {
    match path {
        Some(path) => CompilerConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Ok(CompilerConfig::default()),
    }
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn report(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        match diagnostic.severity {
            Severity::Error => error!("{}", diagnostic),
            Severity::Warning => warn!("{}", diagnostic),
        }
    }
}

fn handle_parse(args: ParseArgs) -> Result<()> {
    info!("Parsing {}", args.input.display());

    let source = read(&args.input)?;
    let file = args.input.display().to_string();
    let (program, errors) = parse_to_ir(&source);

    match args.format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&program)?),
        Format::Debug => println!("{:#?}", program),
        Format::Pretty => {
            println!("Declarations: {}", program.declarations.len());
            for declaration in program.walk() {
                println!("  {} {} ({})", declaration.kind_name(), declaration.name(), declaration.location());
            }
        }
    }

    if !errors.is_empty() {
        let diagnostics: Vec<Diagnostic> = errors
            .iter()
            .map(|error| Diagnostic::from_parse_error(&file, error))
            .collect();
        report(&diagnostics);
        bail!("{} syntax error(s) in {}", errors.len(), file);
    }
    Ok(())
}

fn handle_check(args: CheckArgs, mut config: CompilerConfig) -> Result<()> {
    info!("Type checking {}", args.input.display());

    if args.strict {
        config.strictness = Strictness::Strict;
    }
    config.type_check = true;
    config.emit_signatures = false;
    config.validate()?;

    let source = read(&args.input)?;
    let file = args.input.display().to_string();
    let output = CompilationPipeline::new(config).run(&file, &source)?;

    match args.format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&output.diagnostics)?),
        Format::Debug => println!("{:#?}", output.diagnostics),
        Format::Pretty => report(&output.diagnostics),
    }

    if !output.success {
        bail!("Type checking failed");
    }
    if let Some(check) = &output.check {
        for (method, ty) in &check.inferred_returns {
            info!("  {} -> {}", method, ty);
        }
    }
    info!("Type checking successful!");
    Ok(())
}

fn handle_compile(args: CompileArgs, mut config: CompilerConfig) -> Result<()> {
    info!("Compiling {}", args.input.display());

    if args.strict {
        config.strictness = Strictness::Strict;
    }
    if args.no_signatures {
        config.emit_signatures = false;
    }
    if args.output.is_some() {
        config.output_dir = args.output;
    }

    match tr_compiler::compile_file(&args.input, &config) {
        Ok(artifacts) => {
            report(&artifacts.diagnostics);
            info!("  Erased source: {}", artifacts.erased.display());
            if let Some(signatures) = &artifacts.signatures {
                info!("  Signatures: {}", signatures.display());
            }
            Ok(())
        }
        Err(tr_compiler::CompilerError::Diagnostics { path, diagnostics }) => {
            report(&diagnostics);
            bail!("Compilation of {} failed", path.display());
        }
        Err(other) => Err(other.into()),
    }
}

/// Expand directories to the source files directly inside them
fn collect_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(input)
                .with_context(|| format!("Failed to list {}", input.display()))?
                .filter_map(|entry| entry.ok().map(|entry| entry.path()))
                .filter(|path| path.extension().is_some_and(|ext| ext == SOURCE_EXTENSION))
                .collect();
            found.sort();
            paths.extend(found);
        } else {
            paths.push(input.clone());
        }
    }
    Ok(paths)
}

async fn handle_batch(args: BatchArgs, config: CompilerConfig) -> Result<()> {
    let paths = collect_inputs(&args.inputs)?;
    let workers = args.workers.unwrap_or_else(|| config.effective_workers());
    info!("Checking {} files", paths.len());

    let cancel = Arc::new(AtomicBool::new(false));
    let interrupt = {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling batch");
                cancel.store(true, Ordering::Relaxed);
            }
        })
    };

    let severity = if config.unknown_types_as_errors {
        Severity::Error
    } else {
        Severity::Warning
    };
    let batch = {
        let cancel = Arc::clone(&cancel);
        tokio::task::spawn_blocking(move || {
            IncrementalCompiler::new()
                .with_unknown_severity(severity)
                .compile_batch(&paths, workers, &cancel)
        })
        .await?
    };
    interrupt.abort();
    let outcome = batch?;

    match args.format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
        Format::Debug => println!("{:#?}", outcome),
        Format::Pretty => {
            for file in &outcome.files {
                report(&file.diagnostics);
            }
        }
    }

    let failed = outcome.files.iter().filter(|file| !file.success).count();
    if failed > 0 {
        bail!("{} of {} files failed", failed, outcome.files.len());
    }
    info!("All {} files checked", outcome.files.len());
    Ok(())
}

fn handle_init_config(output: PathBuf) -> Result<()> {
    info!("Creating configuration file at {}", output.display());
    CompilerConfig::default().to_file(&output)?;
    info!("Configuration file created successfully!");
    Ok(())
}

fn handle_validate_config(path: PathBuf) -> Result<()> {
    info!("Validating configuration file {}", path.display());
    CompilerConfig::from_file(&path)?;
    info!("Configuration file is valid!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from(["trc", "batch", "-j", "4", "a.trb", "b.trb"]).unwrap();
        match cli.command {
            Commands::Batch(args) => {
                assert_eq!(args.workers, Some(4));
                assert_eq!(args.inputs.len(), 2);
            }
            _ => panic!("expected batch"),
        }

        let cli = Cli::try_parse_from(["trc", "--verbose", "check", "--format", "json", "x.trb"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Check(CheckArgs { format: Format::Json, .. })));
    }

    #[test]
    fn test_collect_inputs_expands_directories() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.trb"), "").unwrap();
        std::fs::write(dir.path().join("a.trb"), "").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();

        let extra = PathBuf::from("extra.trb");
        let paths = collect_inputs(&[dir.path().to_path_buf(), extra.clone()]).unwrap();
        assert_eq!(
            paths,
            vec![dir.path().join("a.trb"), dir.path().join("b.trb"), extra]
        );
    }
}
