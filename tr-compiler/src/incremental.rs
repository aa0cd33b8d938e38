//! Incremental and cross-file compilation
//!
//! Every compiled file leaves a `FileCompilationRecord` keyed by path.
//! A file is recompiled only when its bytes change or its last compile
//! had errors. Two indexes (symbol → declaring files, symbol →
//! referencing files) let a change to one file re-check exactly the files
//! that referenced a symbol it stopped declaring.

use crate::parallel::{self, BatchOutcome};
use crate::{read_source, CompilerError, Result};
use im::{OrdMap, OrdSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tr_checker::error_reporting::sort_diagnostics;
use tr_checker::{Diagnostic, GlobalRegistry, Severity, TypeAliasRegistry, TypeChecker, TypeError, TypeLookup};
use tr_parser::content_hash::{hash_file, hash_source};
use tr_parser::{parse_to_ir, ParseError, Program};
use tracing::{debug, info};

/// What one successful read-and-parse of a file left behind
#[derive(Debug, Clone)]
pub struct FileCompilationRecord {
    pub path: PathBuf,
    /// SHA-256 of the file's bytes
    pub content_hash: String,
    pub program: Arc<Program>,
    pub registry: Arc<TypeAliasRegistry>,
    pub parse_errors: Vec<ParseError>,
    /// Duplicate and circular alias errors found while registering
    pub registry_errors: Vec<TypeError>,
    /// Result of the last check against the global registry
    pub diagnostics: Vec<Diagnostic>,
    pub declared: BTreeSet<String>,
    pub referenced: BTreeSet<String>,
}

impl FileCompilationRecord {
    /// Read, hash, parse and register `path`. Diagnostics are filled in by
    /// `check`.
    pub fn parse(path: &Path) -> Result<Self> {
        let source = read_source(path)?;
        Ok(Self::from_source(path, &source))
    }

    pub fn from_source(path: &Path, source: &str) -> Self {
        let (program, parse_errors) = parse_to_ir(source);
        let (registry, registry_errors) = TypeAliasRegistry::from_program(&program);
        FileCompilationRecord {
            path: path.to_path_buf(),
            content_hash: hash_source(source),
            declared: program.declared_symbols(),
            referenced: program.referenced_symbols(),
            program: Arc::new(program),
            registry: Arc::new(registry),
            parse_errors,
            registry_errors,
            diagnostics: Vec::new(),
        }
    }

    fn file_name(&self) -> String {
        self.path.display().to_string()
    }

    /// Check the program against `global`
    pub fn check(&self, global: &GlobalRegistry, unknown_severity: Severity) -> Vec<Diagnostic> {
        let file = self.file_name();
        let result = TypeChecker::new(global, file.as_str()).check_program(&self.program);

        let mut diagnostics: Vec<Diagnostic> = self
            .parse_errors
            .iter()
            .map(|error| Diagnostic::from_parse_error(&file, error))
            .chain(
                self.registry_errors
                    .iter()
                    .chain(&self.cross_file_cycles(global))
                    .map(|error| Diagnostic::from_type_error(&file, error)),
            )
            .chain(result.diagnostics(&file, unknown_severity))
            .collect();
        sort_diagnostics(&mut diagnostics);
        diagnostics
    }

    /// Aliases declared here that only form a cycle together with other files
    fn cross_file_cycles(&self, global: &GlobalRegistry) -> Vec<TypeError> {
        self.registry
            .alias_names()
            .filter(|name| !self.registry.is_circular(name))
            .filter(|name| global.declaring_file(name) == Some(self.path.as_path()))
            .filter_map(|name| {
                let chain = global.cycle_chain(name)?;
                let location = self.registry.alias(name)?.location;
                Some(TypeError::CircularTypeAlias {
                    name: name.to_string(),
                    chain,
                    location,
                })
            })
            .collect()
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerStats {
    /// Source files parsed
    pub parses: usize,
    /// Files checked against the global registry
    pub checks: usize,
    /// Compiles answered from a clean record
    pub cache_hits: usize,
}

/// Files touched by one `compile_file` or `remove_file`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecompileReport {
    /// The compiled file first, then re-checked dependents in path order
    pub recompiled: Vec<PathBuf>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossFileError {
    pub file: PathBuf,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossFileReport {
    pub errors: Vec<CrossFileError>,
}

/// In-memory incremental compiler
#[derive(Debug, Clone)]
pub struct IncrementalCompiler {
    records: OrdMap<PathBuf, Arc<FileCompilationRecord>>,
    declared_by: OrdMap<String, OrdSet<PathBuf>>,
    referenced_by: OrdMap<String, OrdSet<PathBuf>>,
    global: Arc<GlobalRegistry>,
    unknown_severity: Severity,
    stats: CompilerStats,
}

impl Default for IncrementalCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl IncrementalCompiler {
    pub fn new() -> Self {
        IncrementalCompiler {
            records: OrdMap::new(),
            declared_by: OrdMap::new(),
            referenced_by: OrdMap::new(),
            global: Arc::new(GlobalRegistry::default()),
            unknown_severity: Severity::Error,
            stats: CompilerStats::default(),
        }
    }

    pub fn with_unknown_severity(mut self, severity: Severity) -> Self {
        self.unknown_severity = severity;
        self
    }

    pub fn stats(&self) -> CompilerStats {
        self.stats
    }

    pub fn record(&self, path: &Path) -> Option<&FileCompilationRecord> {
        self.records.get(path).map(Arc::as_ref)
    }

    pub fn global_registry(&self) -> &GlobalRegistry {
        &self.global
    }

    /// Files that declare `symbol`
    pub fn declaring_files(&self, symbol: &str) -> Vec<PathBuf> {
        index_files(&self.declared_by, symbol)
    }

    /// Files whose annotations mention `symbol`
    pub fn referencing_files(&self, symbol: &str) -> Vec<PathBuf> {
        index_files(&self.referenced_by, symbol)
    }

    /// True when there is no record, the bytes changed, or the last
    /// compile had errors. Unreadable files always need compiling.
    pub fn needs_compile(&self, path: &Path) -> bool {
        let Some(record) = self.records.get(path) else {
            return true;
        };
        match hash_file(path) {
            Ok(hash) => record.has_errors() || record.content_hash != hash,
            Err(_) => true,
        }
    }

    /// The program for `path`, from the cache when the file is unchanged
    /// and compiled cleanly last time
    pub fn compile_with_ir(&mut self, path: &Path) -> Result<Arc<Program>> {
        self.compile_file(path)?;
        self.records
            .get(path)
            .map(|record| Arc::clone(&record.program))
            .ok_or_else(|| {
                CompilerError::io(path, std::io::Error::new(std::io::ErrorKind::NotFound, "no record"))
            })
    }

    /// Compile `path` if needed, then re-check every file that referenced
    /// a symbol `path` no longer declares
    pub fn compile_file(&mut self, path: &Path) -> Result<RecompileReport> {
        let source = read_source(path)?;
        let hash = hash_source(&source);

        if let Some(record) = self.records.get(path) {
            if record.content_hash == hash && !record.has_errors() {
                debug!("Cache hit for {}", path.display());
                self.stats.cache_hits += 1;
                return Ok(RecompileReport {
                    recompiled: Vec::new(),
                    diagnostics: record.diagnostics.clone(),
                });
            }
        }

        debug!("Recompiling {}", path.display());
        let previous = self.records.get(path).map(|record| record.declared.clone());
        let record = FileCompilationRecord::from_source(path, &source);
        self.stats.parses += 1;

        let removed: BTreeSet<String> = match previous {
            Some(old) => old.difference(&record.declared).cloned().collect(),
            None => BTreeSet::new(),
        };
        self.install(record);
        self.rebuild_global();

        let mut report = RecompileReport::default();
        self.recheck(path, &mut report);
        for dependent in self.dependents_of(&removed, path) {
            self.recheck(&dependent, &mut report);
        }
        Ok(report)
    }

    /// Forget `path` and re-check the files that referenced its symbols
    pub fn remove_file(&mut self, path: &Path) -> RecompileReport {
        let mut report = RecompileReport::default();
        let Some(record) = self.records.remove(path) else {
            return report;
        };
        self.unindex(&record);
        self.rebuild_global();

        for dependent in self.dependents_of(&record.declared, path) {
            self.recheck(&dependent, &mut report);
        }
        info!(
            "Removed {}; re-checked {} dependents",
            path.display(),
            report.recompiled.len()
        );
        report
    }

    /// Re-check every recorded file's annotations against the global registry
    pub fn cross_file_check_all(&self) -> CrossFileReport {
        let errors = self
            .records
            .values()
            .flat_map(|record| {
                let file = record.file_name();
                TypeChecker::new(self.global.as_ref(), file.as_str())
                    .unknown_types(&record.program)
                    .into_iter()
                    .map(|error| CrossFileError {
                        file: record.path.clone(),
                        message: error.to_string(),
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        CrossFileReport { errors }
    }

    /// Compile `paths` in two phases on `workers` threads and record the
    /// results. Nothing is recorded when `cancel` is raised.
    pub fn compile_batch(&mut self, paths: &[PathBuf], workers: usize, cancel: &AtomicBool) -> Result<BatchOutcome> {
        let parsed = parallel::parse_all(paths, workers, cancel)?;
        self.stats.parses += parsed.iter().filter(|unit| unit.is_ok()).count();

        // registry over the batch plus every other file already recorded
        let batch: BTreeSet<&Path> = paths.iter().map(PathBuf::as_path).collect();
        let mut registries: Vec<(PathBuf, Arc<TypeAliasRegistry>)> = parsed
            .iter()
            .flatten()
            .map(|record| (record.path.clone(), Arc::clone(&record.registry)))
            .collect();
        registries.extend(
            self.records
                .values()
                .filter(|record| !batch.contains(record.path.as_path()))
                .map(|record| (record.path.clone(), Arc::clone(&record.registry))),
        );
        let global = GlobalRegistry::build(registries.iter().map(|(path, registry)| (path, registry.as_ref())));

        let outcome = parallel::check_all(paths, parsed, &global, workers, cancel, self.unknown_severity)?;
        self.stats.checks += outcome.records.len();
        for record in outcome.records.iter().cloned() {
            self.install(record);
        }
        self.global = Arc::new(global);
        Ok(outcome.into())
    }

    fn install(&mut self, record: FileCompilationRecord) {
        if let Some(old) = self.records.remove(&record.path) {
            self.unindex(&old);
        }
        for symbol in &record.declared {
            index_add(&mut self.declared_by, symbol, &record.path);
        }
        for symbol in &record.referenced {
            index_add(&mut self.referenced_by, symbol, &record.path);
        }
        self.records.insert(record.path.clone(), Arc::new(record));
    }

    fn unindex(&mut self, record: &FileCompilationRecord) {
        for symbol in &record.declared {
            index_remove(&mut self.declared_by, symbol, &record.path);
        }
        for symbol in &record.referenced {
            index_remove(&mut self.referenced_by, symbol, &record.path);
        }
    }

    fn rebuild_global(&mut self) {
        let global = GlobalRegistry::build(
            self.records
                .values()
                .map(|record| (record.path.as_path(), record.registry.as_ref())),
        );
        self.global = Arc::new(global);
    }

    /// Files other than `except` that reference any of `symbols`
    fn dependents_of(&self, symbols: &BTreeSet<String>, except: &Path) -> Vec<PathBuf> {
        let mut dependents: OrdSet<PathBuf> = OrdSet::new();
        for symbol in symbols {
            if let Some(files) = self.referenced_by.get(symbol) {
                dependents.extend(files.iter().filter(|file| file.as_path() != except).cloned());
            }
        }
        if !dependents.is_empty() {
            debug!("Re-validating {} dependents of {}", dependents.len(), except.display());
        }
        dependents.into_iter().collect()
    }

    /// Re-run checking for a recorded file without re-parsing it
    fn recheck(&mut self, path: &Path, report: &mut RecompileReport) {
        let Some(record) = self.records.get(path) else {
            return;
        };
        let mut updated = FileCompilationRecord::clone(record);
        updated.diagnostics = updated.check(&self.global, self.unknown_severity);
        self.stats.checks += 1;

        report.recompiled.push(path.to_path_buf());
        report.diagnostics.extend(updated.diagnostics.iter().cloned());
        self.records.insert(path.to_path_buf(), Arc::new(updated));
    }
}

fn index_add(index: &mut OrdMap<String, OrdSet<PathBuf>>, symbol: &str, path: &Path) {
    index
        .entry(symbol.to_string())
        .or_insert_with(OrdSet::new)
        .insert(path.to_path_buf());
}

fn index_remove(index: &mut OrdMap<String, OrdSet<PathBuf>>, symbol: &str, path: &Path) {
    let now_empty = match index.get_mut(symbol) {
        Some(files) => {
            files.remove(path);
            files.is_empty()
        }
        None => false,
    };
    if now_empty {
        index.remove(symbol);
    }
}

fn index_files(index: &OrdMap<String, OrdSet<PathBuf>>, symbol: &str) -> Vec<PathBuf> {
    index
        .get(symbol)
        .map(|files| files.iter().cloned().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, source: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, source).unwrap();
        path
    }

    #[test]
    fn test_unchanged_file_is_not_reparsed() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "a.trb", "def f: Integer\n  1\nend\n");
        let mut compiler = IncrementalCompiler::new();

        assert!(compiler.needs_compile(&path));
        let first = compiler.compile_file(&path).unwrap();
        assert_eq!(first.recompiled, vec![path.clone()]);
        assert!(!compiler.needs_compile(&path));

        let program = compiler.compile_with_ir(&path).unwrap();
        assert_eq!(program.declarations.len(), 1);
        assert_eq!(compiler.stats().parses, 1);
        assert_eq!(compiler.stats().cache_hits, 1);
    }

    #[test]
    fn test_failed_compile_is_never_a_cache_hit() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "a.trb", "def f: Integer\n  \"x\"\nend\n");
        let mut compiler = IncrementalCompiler::new();

        let report = compiler.compile_file(&path).unwrap();
        assert_eq!(report.diagnostics.len(), 1);
        assert!(compiler.needs_compile(&path));

        let again = compiler.compile_file(&path).unwrap();
        assert_eq!(again.diagnostics, report.diagnostics);
        assert_eq!(compiler.stats().parses, 2);
    }

    #[test]
    fn test_indexes_follow_records() {
        let dir = TempDir::new().unwrap();
        let types = write(&dir, "types.trb", "type Id = Integer\n");
        let user = write(&dir, "user.trb", "def find(id: Id): String\n  id.to_s\nend\n");
        let mut compiler = IncrementalCompiler::new();
        compiler.compile_file(&types).unwrap();
        compiler.compile_file(&user).unwrap();

        assert_eq!(compiler.declaring_files("Id"), vec![types.clone()]);
        assert_eq!(compiler.referencing_files("Id"), vec![user.clone()]);

        let report = compiler.remove_file(&types);
        assert_eq!(report.recompiled, vec![user.clone()]);
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].code, "TR1004");
        assert!(compiler.declaring_files("Id").is_empty());
    }

    #[test]
    fn test_cross_file_cycle_reported_in_each_file() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a.trb", "type A = B\n");
        let b = write(&dir, "b.trb", "type B = A\n");
        let mut compiler = IncrementalCompiler::new();
        compiler.compile_file(&a).unwrap();
        let report = compiler.compile_file(&b).unwrap();

        assert_eq!(report.recompiled, vec![b.clone()]);
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].code, "TR1005");
        assert!(report.diagnostics[0].message.contains("B -> A -> B"));
    }

    #[test]
    fn test_cross_file_check_all() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a.trb", "interface User\n  name: String\nend\n");
        let b = write(&dir, "b.trb", "def f(u: User): String\n  u.name\nend\n");
        let mut compiler = IncrementalCompiler::new();
        compiler.compile_file(&a).unwrap();
        compiler.compile_file(&b).unwrap();
        assert!(compiler.cross_file_check_all().errors.is_empty());

        compiler.remove_file(&a);
        let report = compiler.cross_file_check_all();
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].file, b);
        assert!(report.errors[0].message.contains("User"));
    }
}
