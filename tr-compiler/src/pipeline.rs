//! Compilation pipeline for a single source file

use crate::{config::CompilerConfig, erase::erase, signature::Signatures, Result};
use std::time::{Duration, Instant};
use tr_checker::error_reporting::sort_diagnostics;
use tr_checker::{check_with_registry, resolve_all_untyped, CheckResult, Diagnostic, Severity, Strictness};
use tr_parser::{parse_to_ir, Program};
use tracing::debug;

/// Compilation pipeline stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineStage {
    Parse,
    TypeCheck,
    Erase,
    Signatures,
}

/// Everything one run of the pipeline produced
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub program: Program,
    pub check: Option<CheckResult>,
    /// Sorted by position
    pub diagnostics: Vec<Diagnostic>,
    /// No error-severity diagnostics
    pub success: bool,
    /// Erased source, only when successful
    pub erased: Option<String>,
    pub signatures: Option<Signatures>,
    pub timings: Vec<(PipelineStage, Duration)>,
}

/// Compilation pipeline
pub struct CompilationPipeline {
    config: CompilerConfig,
}

impl CompilationPipeline {
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Severity given to unknown type names
    pub fn unknown_type_severity(&self) -> Severity {
        if self.config.unknown_types_as_errors {
            Severity::Error
        } else {
            Severity::Warning
        }
    }

    /// Run every enabled stage over `source`.
    ///
    /// In strict mode the first return type mismatch is returned as the
    /// error; otherwise problems are reported as diagnostics.
    pub fn run(&self, file: &str, source: &str) -> Result<PipelineOutput> {
        let mut timings = Vec::new();

        let start = Instant::now();
        let (program, parse_errors) = parse_to_ir(source);
        timings.push((PipelineStage::Parse, start.elapsed()));
        let mut diagnostics: Vec<Diagnostic> = parse_errors
            .iter()
            .map(|error| Diagnostic::from_parse_error(file, error))
            .collect();

        let check = if self.config.type_check {
            let start = Instant::now();
            let (_, result) = check_with_registry(&program, file);
            timings.push((PipelineStage::TypeCheck, start.elapsed()));

            if self.config.strictness == Strictness::Strict {
                if let Some(first) = result.mismatches().next() {
                    return Err(first.clone().into());
                }
            }
            diagnostics.extend(result.diagnostics(file, self.unknown_type_severity()));
            Some(result)
        } else {
            None
        };
        sort_diagnostics(&mut diagnostics);

        // inference has run; whatever is still open is `untyped`
        let resolved = resolve_all_untyped(&program);
        debug!("Resolved {} unannotated slots to untyped", resolved);

        let success = !diagnostics.iter().any(Diagnostic::is_error);
        let (erased, signatures) = if success {
            let start = Instant::now();
            let erased = erase(source, &program);
            timings.push((PipelineStage::Erase, start.elapsed()));

            let signatures = self.config.emit_signatures.then(|| {
                let start = Instant::now();
                let signatures = Signatures::from_program(&program);
                timings.push((PipelineStage::Signatures, start.elapsed()));
                signatures
            });
            (Some(erased), signatures)
        } else {
            (None, None)
        };

        debug!(
            "Pipeline for {}: {} diagnostics, success = {}",
            file,
            diagnostics.len(),
            success
        );
        Ok(PipelineOutput {
            program,
            check,
            diagnostics,
            success,
            erased,
            signatures,
            timings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(config: CompilerConfig, source: &str) -> PipelineOutput {
        CompilationPipeline::new(config).run("test.trb", source).unwrap()
    }

    #[test]
    fn test_clean_source_runs_every_stage() {
        let output = run(
            CompilerConfig::default(),
            "def add(a: Integer, b: Integer): Integer\n  a + b\nend\n",
        );
        assert!(output.success);
        assert!(output.diagnostics.is_empty());
        let stages: Vec<_> = output.timings.iter().map(|(stage, _)| *stage).collect();
        assert_eq!(
            stages,
            vec![
                PipelineStage::Parse,
                PipelineStage::TypeCheck,
                PipelineStage::Erase,
                PipelineStage::Signatures
            ]
        );
        assert_eq!(output.check.unwrap().inferred_returns["add"], "Integer");
    }

    #[test]
    fn test_unknown_type_severity_follows_config() {
        let source = "def f(u: User): String\n  u.to_s\nend\n";
        let strict_names = run(CompilerConfig::default(), source);
        assert!(!strict_names.success);
        assert_eq!(strict_names.diagnostics[0].code, "TR1004");
        assert!(strict_names.erased.is_none());

        let lenient = run(
            CompilerConfig {
                unknown_types_as_errors: false,
                ..CompilerConfig::default()
            },
            source,
        );
        assert!(lenient.success);
        assert_eq!(lenient.diagnostics[0].severity, Severity::Warning);
        assert_eq!(lenient.erased.as_deref(), Some("def f(u)\n  u.to_s\nend\n"));
    }

    #[test]
    fn test_type_check_can_be_disabled() {
        let output = run(
            CompilerConfig {
                type_check: false,
                emit_signatures: false,
                ..CompilerConfig::default()
            },
            "def bad(): Integer\n  \"x\"\nend\n",
        );
        assert!(output.success);
        assert!(output.check.is_none());
        assert!(output.signatures.is_none());
    }

    #[test]
    fn test_unannotated_slots_end_up_untyped() {
        let source = "def greet(name: String, times)\n  name * times\nend\n";
        for type_check in [true, false] {
            let output = run(
                CompilerConfig {
                    type_check,
                    ..CompilerConfig::default()
                },
                source,
            );
            let summary = tr_checker::slot_summary(&output.program);
            assert_eq!(summary.needs_inference, 0);
            assert_eq!(summary.explicit, 1);
            assert_eq!(summary.total, 3);

            let methods = output.program.methods();
            let times = &methods[0].method.params[1].slot;
            assert_eq!(times.effective_type().map(ToString::to_string).as_deref(), Some("untyped"));
            let signatures = output.signatures.unwrap().to_string();
            assert!(signatures.contains("def greet: (String name, untyped times) -> untyped"));
        }
    }

    #[test]
    fn test_parse_errors_fail_the_file() {
        let output = run(CompilerConfig::default(), "def f() : Integer\n  1\nend\n");
        assert!(!output.success);
        assert_eq!(output.diagnostics[0].code, "TR1003");
    }
}
