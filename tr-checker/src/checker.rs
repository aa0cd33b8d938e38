//! Main type checker interface
//!
//! Checking is a pure function of a program and a `TypeLookup`: every call
//! builds and returns a fresh `CheckResult`. Methods are checked one at a
//! time, so a failing method never hides errors in the others.

use crate::compatibility::types_compatible;
use crate::error_reporting::{sort_diagnostics, Diagnostic, Severity, TypeCheckError, TypeError};
use crate::inference::infer_return_type;
use crate::registry::{TypeAliasRegistry, TypeLookup};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tr_parser::{parse_to_ir, Declaration, Location, MethodRef, Program};
use tracing::debug;

/// How `type_check` reports mismatches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    /// The first mismatch is returned as an error
    Strict,
    /// Every mismatch is collected
    #[default]
    Permissive,
}

/// Type checking result
#[derive(Debug, Clone, Default)]
pub struct CheckResult {
    /// Qualified method name → inferred return type
    pub inferred_returns: BTreeMap<String, String>,
    /// Duplicate definitions, circular aliases and return type mismatches
    pub errors: Vec<TypeError>,
    pub unknown_types: Vec<TypeError>,
}

impl CheckResult {
    pub fn mismatches(&self) -> impl Iterator<Item = &TypeCheckError> {
        self.errors.iter().filter_map(|error| match error {
            TypeError::TypeMismatch(mismatch) => Some(mismatch),
            _ => None,
        })
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.unknown_types.is_empty()
    }

    /// Convert to diagnostics, giving unknown types `unknown_severity`
    pub fn diagnostics(&self, file: &str, unknown_severity: Severity) -> Vec<Diagnostic> {
        let mut diagnostics: Vec<Diagnostic> = self
            .errors
            .iter()
            .map(|error| Diagnostic::from_type_error(file, error))
            .chain(
                self.unknown_types
                    .iter()
                    .map(|error| Diagnostic::from_type_error(file, error).with_severity(unknown_severity)),
            )
            .collect();
        sort_diagnostics(&mut diagnostics);
        diagnostics
    }
}

/// Checks one program against a lookup
pub struct TypeChecker<'l, L: TypeLookup + ?Sized> {
    lookup: &'l L,
    file: String,
}

impl<'l, L: TypeLookup + ?Sized> TypeChecker<'l, L> {
    pub fn new(lookup: &'l L, file: impl Into<String>) -> Self {
        TypeChecker {
            lookup,
            file: file.into(),
        }
    }

    pub fn check_program(&self, program: &Program) -> CheckResult {
        let mut result = CheckResult {
            errors: method_duplicates(program),
            unknown_types: self.unknown_types(program),
            ..CheckResult::default()
        };

        let sibling_returns = sibling_returns(program);
        let no_siblings = HashMap::new();
        for method in program.methods() {
            let siblings = sibling_returns.get(&method.owner).unwrap_or(&no_siblings);
            let inferred = infer_return_type(method.method, method.class, siblings);
            if let Some(error) = self.check_return(&method, &inferred) {
                result.errors.push(TypeError::TypeMismatch(error));
            }
            result.inferred_returns.insert(method.qualified_name(), inferred);
        }

        debug!(
            "Checked {}: {} errors, {} unknown types",
            self.file,
            result.errors.len(),
            result.unknown_types.len()
        );
        result
    }

    /// Every annotation name that does not resolve
    pub fn unknown_types(&self, program: &Program) -> Vec<TypeError> {
        program
            .annotations()
            .into_iter()
            .flat_map(|(ty, location)| {
                self.lookup
                    .unknown_names(ty)
                    .into_iter()
                    .map(move |name| TypeError::unknown_type(name, location))
            })
            .collect()
    }

    /// Only mismatches, in method order
    pub fn check_return_types(&self, program: &Program) -> Vec<TypeCheckError> {
        self.check_program(program).mismatches().cloned().collect()
    }

    fn check_return(&self, method: &MethodRef<'_>, inferred: &str) -> Option<TypeCheckError> {
        let declared = method.method.return_type()?;
        // the circular alias error is already reported
        if self.lookup.touches_circular(declared) {
            return None;
        }
        let expanded = self.lookup.expand_aliases(declared).to_string();
        // an unknown inferred name is already reported as unknown
        let actual = self.expand_inferred(inferred)?;
        if types_compatible(&actual, &expanded) {
            return None;
        }
        Some(TypeCheckError::return_mismatch(
            method.qualified_name(),
            &self.file,
            method.method.location,
            declared.to_string(),
            inferred,
        ))
    }

    /// Annotated locals and instance variables can carry alias names too
    fn expand_inferred(&self, inferred: &str) -> Option<String> {
        match tr_parser::parse_type(inferred) {
            Ok(ty) if self.lookup.touches_circular(&ty) || !self.lookup.unknown_names(&ty).is_empty() => None,
            Ok(ty) => Some(self.lookup.expand_aliases(&ty).to_string()),
            Err(_) => Some(inferred.to_string()),
        }
    }
}

/// Explicit return types of the methods in each class/module body
fn sibling_returns<'p>(program: &'p Program) -> HashMap<Option<&'p str>, HashMap<String, String>> {
    let mut returns: HashMap<Option<&str>, HashMap<String, String>> = HashMap::new();
    for method in program.methods() {
        if let Some(ty) = method.method.return_type() {
            returns
                .entry(method.owner)
                .or_default()
                .entry(method.method.name.clone())
                .or_insert_with(|| ty.to_string());
        }
    }
    returns
}

/// Methods defined twice in the same body on the same side (instance or singleton)
pub fn method_duplicates(program: &Program) -> Vec<TypeError> {
    fn visit(declarations: &[Declaration], owner: Option<&str>, errors: &mut Vec<TypeError>) {
        let mut seen: HashMap<(bool, &str), Location> = HashMap::new();
        for declaration in declarations {
            match declaration {
                Declaration::Method(method) => {
                    let key = (method.singleton, method.name.as_str());
                    if let Some(original) = seen.get(&key) {
                        let name = MethodRef {
                            owner,
                            class: None,
                            method,
                        }
                        .qualified_name();
                        errors.push(TypeError::duplicate("method", name, original.line, method.location));
                    } else {
                        seen.insert(key, method.location);
                    }
                }
                Declaration::Class(class) => visit(&class.body, Some(&class.name), errors),
                Declaration::Module(module) => visit(&module.body, Some(&module.name), errors),
                Declaration::TypeAlias(_) | Declaration::Interface(_) => {}
            }
        }
    }

    let mut errors = Vec::new();
    visit(&program.declarations, None, &mut errors);
    errors
}

/// Build the file's own registry and check the program against it
pub fn check_with_registry(program: &Program, file: &str) -> (TypeAliasRegistry, CheckResult) {
    let (registry, registry_errors) = TypeAliasRegistry::from_program(program);
    let mut result = TypeChecker::new(&registry, file).check_program(program);
    result.errors.splice(0..0, registry_errors);
    (registry, result)
}

/// Return type checking of a single program.
///
/// Strict mode returns the first mismatch as the error; permissive mode
/// collects all of them.
pub fn type_check(
    program: &Program,
    file: &str,
    strictness: Strictness,
) -> Result<Vec<TypeCheckError>, TypeCheckError> {
    let (registry, _) = TypeAliasRegistry::from_program(program);
    let mismatches = TypeChecker::new(&registry, file).check_return_types(program);
    match strictness {
        Strictness::Strict => match mismatches.into_iter().next() {
            Some(first) => Err(first),
            None => Ok(Vec::new()),
        },
        Strictness::Permissive => Ok(mismatches),
    }
}

/// Full static analysis of one source text. Never fails; every problem
/// is a diagnostic. Unknown types are warnings here.
pub fn check(source: &str) -> Vec<Diagnostic> {
    const FILE: &str = "<input>";

    let (program, parse_errors) = parse_to_ir(source);
    let (_, result) = check_with_registry(&program, FILE);

    let mut diagnostics: Vec<Diagnostic> = parse_errors
        .iter()
        .map(|error| Diagnostic::from_parse_error(FILE, error))
        .chain(result.diagnostics(FILE, Severity::Warning))
        .collect();
    sort_diagnostics(&mut diagnostics);
    diagnostics
}
