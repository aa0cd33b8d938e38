//! Two-phase parallel batch compilation
//!
//! Phase 1 reads and parses every file and registers its declarations.
//! After the join barrier the registries are merged into one frozen
//! `GlobalRegistry`. Phase 2 type-checks the files against it. Both phases
//! run on a rayon pool sized to the requested worker count, and results are
//! collected by input index, so the outcome does not depend on the number of
//! workers.

use crate::incremental::{FileCompilationRecord, IncrementalCompiler};
use crate::{CompilerError, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tr_checker::{Diagnostic, GlobalRegistry, Severity};
use tracing::debug;

/// Diagnostics for one file of a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub diagnostics: Vec<Diagnostic>,
    pub success: bool,
}

/// Per-file results, in the order the paths were given
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub files: Vec<FileOutcome>,
}

impl BatchOutcome {
    pub fn success(&self) -> bool {
        self.files.iter().all(|file| file.success)
    }

    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.files.iter().flat_map(|file| &file.diagnostics)
    }

    pub fn file(&self, path: &Path) -> Option<&FileOutcome> {
        self.files.iter().find(|file| file.path == path)
    }
}

/// Compile `paths` from scratch on `workers` threads (0 = available
/// parallelism). Raising `cancel` aborts the batch with
/// `CompilerError::Cancelled`.
pub fn compile_batch(paths: &[PathBuf], workers: usize, cancel: &AtomicBool) -> Result<BatchOutcome> {
    IncrementalCompiler::new().compile_batch(paths, workers, cancel)
}

/// Phase 2 output: updated records for parsed files plus an outcome for
/// every input path
pub(crate) struct CheckedBatch {
    pub records: Vec<FileCompilationRecord>,
    pub files: Vec<FileOutcome>,
}

impl From<CheckedBatch> for BatchOutcome {
    fn from(batch: CheckedBatch) -> Self {
        BatchOutcome { files: batch.files }
    }
}

pub(crate) fn worker_count(requested: usize, jobs: usize) -> usize {
    let workers = match requested {
        0 => std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1),
        n => n,
    };
    workers.clamp(1, jobs.max(1))
}

/// Phase 1. Unreadable files come back as `Err` in their slot.
pub(crate) fn parse_all(
    paths: &[PathBuf],
    workers: usize,
    cancel: &AtomicBool,
) -> Result<Vec<Result<FileCompilationRecord>>> {
    par_map(paths, workers, cancel, |path| FileCompilationRecord::parse(path))
}

/// Phase 2
pub(crate) fn check_all(
    paths: &[PathBuf],
    parsed: Vec<Result<FileCompilationRecord>>,
    global: &GlobalRegistry,
    workers: usize,
    cancel: &AtomicBool,
    unknown_severity: Severity,
) -> Result<CheckedBatch> {
    let checked = par_map(&parsed, workers, cancel, |unit| match unit {
        Ok(record) => record.check(global, unknown_severity),
        Err(_) => Vec::new(),
    })?;

    let mut batch = CheckedBatch {
        records: Vec::new(),
        files: Vec::with_capacity(paths.len()),
    };
    for ((path, unit), diagnostics) in paths.iter().zip(parsed).zip(checked) {
        let diagnostics = match unit {
            Ok(mut record) => {
                record.diagnostics = diagnostics;
                let diagnostics = record.diagnostics.clone();
                batch.records.push(record);
                diagnostics
            }
            Err(error) => error.into_diagnostics(&path.display().to_string()),
        };
        batch.files.push(FileOutcome {
            path: path.clone(),
            success: !diagnostics.iter().any(Diagnostic::is_error),
            diagnostics,
        });
    }
    Ok(batch)
}

/// Map `f` over `items` on a pool of `workers` threads, keeping input
/// order. Items not yet started when `cancel` is raised are skipped. A
/// worker panic is re-raised on the caller.
fn par_map<T, R, F>(items: &[T], workers: usize, cancel: &AtomicBool, f: F) -> Result<Vec<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    if items.is_empty() {
        return Ok(Vec::new());
    }
    let workers = worker_count(workers, items.len());
    let pool = rayon::ThreadPoolBuilder::new().num_threads(workers).build()?;
    debug!("Mapping {} items on {} workers", items.len(), workers);

    let mapped: Option<Vec<R>> = pool.install(|| {
        items
            .par_iter()
            .map(|item| {
                if cancel.load(Ordering::Relaxed) {
                    None
                } else {
                    Some(f(item))
                }
            })
            .collect()
    });

    match mapped {
        Some(out) if !cancel.load(Ordering::Relaxed) => Ok(out),
        _ => {
            debug!("Batch phase cancelled");
            Err(CompilerError::Cancelled)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    #[test]
    fn test_worker_count() {
        assert_eq!(worker_count(4, 2), 2);
        assert_eq!(worker_count(3, 10), 3);
        assert_eq!(worker_count(8, 0), 1);
        assert!(worker_count(0, 100) >= 1);
    }

    #[test]
    fn test_par_map_keeps_order() {
        let items: Vec<usize> = (0..37).collect();
        let cancel = AtomicBool::new(false);
        for workers in [1, 2, 5, 64] {
            let doubled = par_map(&items, workers, &cancel, |n| n * 2).unwrap();
            assert_eq!(doubled, items.iter().map(|n| n * 2).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_par_map_cancelled() {
        let items = vec![1, 2, 3];
        let cancel = AtomicBool::new(true);
        let calls = AtomicUsize::new(0);
        let result = par_map(&items, 2, &cancel, |n| {
            calls.fetch_add(1, Ordering::Relaxed);
            *n
        });
        assert!(matches!(result, Err(CompilerError::Cancelled)));
        assert_eq!(calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_cancel_raised_mid_phase() {
        let items: Vec<usize> = (0..200).collect();
        let cancel = AtomicBool::new(false);
        let calls = AtomicUsize::new(0);
        let result = par_map(&items, 1, &cancel, |n| {
            calls.fetch_add(1, Ordering::Relaxed);
            if *n == 10 {
                cancel.store(true, Ordering::Relaxed);
            }
            *n
        });
        assert!(matches!(result, Err(CompilerError::Cancelled)));
        assert!(calls.load(Ordering::Relaxed) < items.len());
    }

    #[test]
    #[should_panic(expected = "boom")]
    fn test_worker_panic_propagates() {
        let items = vec![1, 2, 3, 4];
        let cancel = AtomicBool::new(false);
        let _ = par_map(&items, 2, &cancel, |n| {
            if *n == 3 {
                panic!("boom");
            }
            *n
        });
    }

    #[test]
    fn test_unreadable_file_is_reported_in_place() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("good.trb");
        std::fs::write(&good, "def f: Integer\n  1\nend\n").unwrap();
        let missing = dir.path().join("missing.trb");

        let cancel = AtomicBool::new(false);
        let outcome = compile_batch(&[missing.clone(), good.clone()], 2, &cancel).unwrap();
        assert_eq!(outcome.files[0].path, missing);
        assert!(!outcome.files[0].success);
        assert_eq!(outcome.files[0].diagnostics[0].code, crate::IO_ERROR_CODE);
        assert!(outcome.file(&good).unwrap().success);
        assert!(!outcome.success());
    }
}
