//! tr Language Compiler
//!
//! Single-file pipeline (parse, check, erase, emit signatures) plus the
//! incremental engine that keeps many files up to date and checks them in
//! parallel against a shared registry.

pub mod config;
pub mod erase;
pub mod incremental;
pub mod parallel;
pub mod pipeline;
pub mod signature;

// Re-export main types
pub use config::{CompilerConfig, ConfigError};
pub use erase::erase;
pub use incremental::{
    CompilerStats, CrossFileError, CrossFileReport, FileCompilationRecord, IncrementalCompiler, RecompileReport,
};
pub use parallel::{compile_batch, BatchOutcome, FileOutcome};
pub use pipeline::{CompilationPipeline, PipelineOutput, PipelineStage};
pub use signature::{SignatureEntry, Signatures};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tr_checker::{Diagnostic, TypeCheckError};
use tracing::info;

pub type Result<T> = std::result::Result<T, CompilerError>;

/// Code for files that could not be read
pub const IO_ERROR_CODE: &str = "TR0001";

/// Compiler errors
#[derive(Debug, thiserror::Error)]
pub enum CompilerError {
    #[error("I/O error for {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Type checking failed: {0}")]
    TypeCheck(#[from] TypeCheckError),

    #[error("Compilation cancelled")]
    Cancelled,

    #[error("Failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("{} failed with {} error(s)", path.display(), count_errors(diagnostics))]
    Diagnostics {
        path: PathBuf,
        diagnostics: Vec<Diagnostic>,
    },
}

fn count_errors(diagnostics: &[Diagnostic]) -> usize {
    diagnostics.iter().filter(|d| d.is_error()).count()
}

impl CompilerError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        CompilerError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// The error as diagnostics for `file`
    pub fn into_diagnostics(self, file: &str) -> Vec<Diagnostic> {
        match self {
            CompilerError::Diagnostics { diagnostics, .. } => diagnostics,
            CompilerError::TypeCheck(error) => vec![Diagnostic::from_type_check_error(file, &error)],
            other => vec![Diagnostic::error(
                file,
                tr_parser::Location::default(),
                IO_ERROR_CODE,
                other.to_string(),
            )],
        }
    }
}

/// Read a source file
pub(crate) fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| CompilerError::io(path, e))
}

/// Result of `compile_with_diagnostics`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileOutcome {
    pub success: bool,
    pub diagnostics: Vec<Diagnostic>,
}

/// Parse and check `path` with the default configuration. Never fails;
/// unreadable files and fatal errors come back as diagnostics.
pub fn compile_with_diagnostics(path: &Path) -> CompileOutcome {
    let file = path.display().to_string();
    let pipeline = CompilationPipeline::new(CompilerConfig::default());
    let result = read_source(path).and_then(|source| pipeline.run(&file, &source));
    match result {
        Ok(output) => CompileOutcome {
            success: output.success,
            diagnostics: output.diagnostics,
        },
        Err(error) => CompileOutcome {
            success: false,
            diagnostics: error.into_diagnostics(&file),
        },
    }
}

/// Files written by `compile_file`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledArtifacts {
    pub erased: PathBuf,
    pub signatures: Option<PathBuf>,
    /// Warnings that did not stop compilation
    pub diagnostics: Vec<Diagnostic>,
}

/// Compile `path` to disk. Nothing is written unless the whole pipeline
/// succeeds.
pub fn compile_file(path: &Path, config: &CompilerConfig) -> Result<CompiledArtifacts> {
    config.validate()?;
    let file = path.display().to_string();
    let source = read_source(path)?;
    let output = CompilationPipeline::new(config.clone()).run(&file, &source)?;

    if !output.success {
        return Err(CompilerError::Diagnostics {
            path: path.to_path_buf(),
            diagnostics: output.diagnostics,
        });
    }

    let erased_path = config.output_path(path, "rb");
    if let Some(dir) = erased_path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| CompilerError::io(dir, e))?;
    }
    let erased = output.erased.unwrap_or_default();
    std::fs::write(&erased_path, erased).map_err(|e| CompilerError::io(&erased_path, e))?;

    let signatures = match output.signatures {
        Some(signatures) => {
            let signature_path = config.output_path(path, "rbs");
            std::fs::write(&signature_path, signatures.to_string())
                .map_err(|e| CompilerError::io(&signature_path, e))?;
            Some(signature_path)
        }
        None => None,
    };

    info!("Compiled {} -> {}", file, erased_path.display());
    Ok(CompiledArtifacts {
        erased: erased_path,
        signatures,
        diagnostics: output.diagnostics,
    })
}
