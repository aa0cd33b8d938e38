//! Error reporting for type checking
//!
//! Checker errors are typed values; tooling sees them through the uniform
//! `Diagnostic` shape together with parse errors.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tr_parser::{Location, ParseError};

pub use tr_parser::SlotError;

pub const DUPLICATE_DEFINITION_CODE: &str = "TR1002";
pub const UNKNOWN_TYPE_CODE: &str = "TR1004";
pub const CIRCULAR_TYPE_ALIAS_CODE: &str = "TR1005";
pub const TYPE_MISMATCH_CODE: &str = "TR2001";

/// Registry and declaration level errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeError {
    #[error("Duplicate {kind} '{name}' (first defined on line {original_line})")]
    DuplicateDefinition {
        kind: String,
        name: String,
        original_line: u32,
        location: Location,
    },

    #[error("Circular type alias detected: {chain}")]
    CircularTypeAlias {
        name: String,
        chain: String,
        location: Location,
    },

    #[error("Unknown type '{name}'")]
    UnknownType { name: String, location: Location },

    #[error("{0}")]
    TypeMismatch(TypeCheckError),
}

impl TypeError {
    pub fn duplicate(kind: &str, name: impl Into<String>, original_line: u32, location: Location) -> Self {
        Self::DuplicateDefinition {
            kind: kind.to_string(),
            name: name.into(),
            original_line,
            location,
        }
    }

    pub fn unknown_type(name: impl Into<String>, location: Location) -> Self {
        Self::UnknownType {
            name: name.into(),
            location,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateDefinition { .. } => DUPLICATE_DEFINITION_CODE,
            Self::CircularTypeAlias { .. } => CIRCULAR_TYPE_ALIAS_CODE,
            Self::UnknownType { .. } => UNKNOWN_TYPE_CODE,
            Self::TypeMismatch(_) => TYPE_MISMATCH_CODE,
        }
    }

    pub fn location(&self) -> Location {
        match self {
            Self::DuplicateDefinition { location, .. }
            | Self::CircularTypeAlias { location, .. }
            | Self::UnknownType { location, .. } => *location,
            Self::TypeMismatch(error) => Location::new(error.line, error.column),
        }
    }
}

/// A declared return type that the inferred type does not satisfy
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct TypeCheckError {
    pub message: String,
    /// `file:line`
    pub location: String,
    pub line: u32,
    pub column: u32,
    pub expected: String,
    pub actual: String,
    /// Qualified method name, e.g. `User#name`
    pub method: String,
}

impl TypeCheckError {
    pub fn return_mismatch(
        method: impl Into<String>,
        file: &str,
        location: Location,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        let method = method.into();
        let expected = expected.into();
        let actual = actual.into();
        TypeCheckError {
            message: format!(
                "Method '{method}' declared to return {expected} but returns {actual}"
            ),
            location: format!("{file}:{}", location.line),
            line: location.line,
            column: location.column,
            expected,
            actual,
            method,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// The one shape every error takes on its way out to tooling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub message: String,
    pub code: String,
    pub severity: Severity,
}

impl Diagnostic {
    pub fn error(file: &str, location: Location, code: &str, message: impl Into<String>) -> Self {
        Diagnostic {
            file: file.to_string(),
            line: location.line,
            column: location.column,
            message: message.into(),
            code: code.to_string(),
            severity: Severity::Error,
        }
    }

    pub fn from_parse_error(file: &str, error: &ParseError) -> Self {
        Self::error(file, error.location(), error.code(), error.message())
    }

    pub fn from_type_error(file: &str, error: &TypeError) -> Self {
        Self::error(file, error.location(), error.code(), error.to_string())
    }

    pub fn from_type_check_error(file: &str, error: &TypeCheckError) -> Self {
        Self::error(
            file,
            Location::new(error.line, error.column),
            TYPE_MISMATCH_CODE,
            error.message.clone(),
        )
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    fn sort_key(&self) -> (&str, u32, u32, &str) {
        (&self.file, self.line, self.column, &self.code)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}[{}]: {}",
            self.file, self.line, self.column, self.severity, self.code, self.message
        )
    }
}

/// Stable ordering by file, position and code
pub fn sort_diagnostics(diagnostics: &mut [Diagnostic]) {
    diagnostics.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use tr_parser::ColonSpacingKind;

    #[test]
    fn test_type_error_codes() {
        let location = Location::new(3, 1);
        assert_eq!(TypeError::unknown_type("User", location).code(), "TR1004");
        assert_eq!(TypeError::duplicate("type alias", "Id", 1, location).code(), "TR1002");
        let circular = TypeError::CircularTypeAlias {
            name: "A".to_string(),
            chain: "A -> B -> A".to_string(),
            location,
        };
        assert_eq!(circular.code(), "TR1005");
        assert_eq!(circular.to_string(), "Circular type alias detected: A -> B -> A");
    }

    #[test]
    fn test_mismatch_message_and_location() {
        let error = TypeCheckError::return_mismatch("bad", "app.trb", Location::new(4, 1), "Integer", "String");
        assert_eq!(error.location, "app.trb:4");
        assert_eq!(error.expected, "Integer");
        assert_eq!(error.actual, "String");
        assert!(error.message.contains("bad"));

        let wrapped = TypeError::TypeMismatch(error);
        assert_eq!(wrapped.code(), "TR2001");
        assert_eq!(wrapped.location(), Location::new(4, 1));
    }

    #[test]
    fn test_diagnostic_display_and_json() {
        let parse_error = ParseError::colon_spacing(ColonSpacingKind::SpaceBeforeColon, Location::new(1, 9));
        let diagnostic = Diagnostic::from_parse_error("<input>", &parse_error);
        assert_eq!(diagnostic.code, "TR1003");
        assert!(diagnostic.to_string().starts_with("<input>:1:9: error[TR1003]: "));

        let json = serde_json::to_value(&diagnostic).unwrap();
        assert_eq!(json["severity"], "error");
        assert_eq!(json["line"], 1);
    }

    #[test]
    fn test_sort_diagnostics() {
        let mut diagnostics = vec![
            Diagnostic::error("b", Location::new(1, 1), "TR1001", "x"),
            Diagnostic::error("a", Location::new(5, 1), "TR1004", "y"),
            Diagnostic::error("a", Location::new(2, 3), "TR1002", "z"),
        ];
        sort_diagnostics(&mut diagnostics);
        let order: Vec<_> = diagnostics.iter().map(|d| (d.file.as_str(), d.line)).collect();
        assert_eq!(order, vec![("a", 2), ("a", 5), ("b", 1)]);
    }
}
