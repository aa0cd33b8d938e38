//! Parser error types and utilities

use crate::span::Location;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ParseError>;

/// Stable code for generic syntax errors
pub const SYNTAX_ERROR_CODE: &str = "TR1001";
/// Stable code for the annotation colon spacing contract
pub const COLON_SPACING_CODE: &str = "TR1003";

/// Which half of the colon spacing contract was broken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColonSpacingKind {
    /// `def f() : Integer`
    SpaceBeforeColon,
    /// `def f():Integer`
    MissingSpaceAfterColon,
}

impl ColonSpacingKind {
    fn message(self) -> &'static str {
        match self {
            ColonSpacingKind::SpaceBeforeColon => {
                "No whitespace is allowed before the type annotation colon"
            }
            ColonSpacingKind::MissingSpaceAfterColon => {
                "A space is required after the type annotation colon"
            }
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseError {
    #[error("Lexer error at {location}: {message}")]
    Lexer { message: String, location: Location },

    #[error("Syntax error at {location}: {message}")]
    Syntax { message: String, location: Location },

    #[error("Colon spacing error at {location}: {}", kind.message())]
    ColonSpacing { kind: ColonSpacingKind, location: Location },
}

impl ParseError {
    pub fn lexer(message: impl Into<String>, location: Location) -> Self {
        Self::Lexer {
            message: message.into(),
            location,
        }
    }

    pub fn syntax(message: impl Into<String>, location: Location) -> Self {
        Self::Syntax {
            message: message.into(),
            location,
        }
    }

    pub fn colon_spacing(kind: ColonSpacingKind, location: Location) -> Self {
        Self::ColonSpacing { kind, location }
    }

    pub fn location(&self) -> Location {
        match self {
            Self::Lexer { location, .. }
            | Self::Syntax { location, .. }
            | Self::ColonSpacing { location, .. } => *location,
        }
    }

    /// Message without the location prefix
    pub fn message(&self) -> String {
        match self {
            Self::Lexer { message, .. } | Self::Syntax { message, .. } => message.clone(),
            Self::ColonSpacing { kind, .. } => kind.message().to_string(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Lexer { .. } | Self::Syntax { .. } => SYNTAX_ERROR_CODE,
            Self::ColonSpacing { .. } => COLON_SPACING_CODE,
        }
    }
}

/// Collects errors in the order they are found
#[derive(Debug, Default)]
pub struct ErrorReporter {
    errors: Vec<ParseError>,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report_error(&mut self, error: ParseError) {
        self.errors.push(error);
    }

    pub fn extend(&mut self, errors: impl IntoIterator<Item = ParseError>) {
        self.errors.extend(errors);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<ParseError> {
        self.errors
    }

    /// Render every error with the offending source line and a caret
    pub fn format_diagnostics(&self, source: &str) -> String {
        let lines: Vec<&str> = source.lines().collect();
        let mut output = String::new();

        for error in &self.errors {
            let location = error.location();
            output.push_str(&format!("Error[{}]: {}\n", error.code(), error));

            let index = location.line.saturating_sub(1) as usize;
            if let Some(line) = lines.get(index) {
                output.push_str(&format!("  {}: {}\n", location.line, line));
                let gutter = location.line.to_string().len() + 4;
                let pointer = " ".repeat(gutter + location.column.saturating_sub(1) as usize);
                output.push_str(&format!("{pointer}^\n"));
            }
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let syntax = ParseError::syntax("unexpected `)`", Location::new(2, 5));
        assert_eq!(syntax.code(), "TR1001");
        assert_eq!(syntax.location(), Location::new(2, 5));

        let spacing = ParseError::colon_spacing(ColonSpacingKind::SpaceBeforeColon, Location::new(1, 9));
        assert_eq!(spacing.code(), "TR1003");
        assert!(spacing.message().contains("before"));
    }

    #[test]
    fn test_error_reporter() {
        let mut reporter = ErrorReporter::new();
        assert!(!reporter.has_errors());

        reporter.report_error(ParseError::syntax("test error", Location::new(1, 1)));
        assert!(reporter.has_errors());
        assert_eq!(reporter.errors().len(), 1);
    }

    #[test]
    fn test_format_diagnostics_points_at_column() {
        let mut reporter = ErrorReporter::new();
        let source = "def ok\nend\ndef f() : Integer\nend";

        reporter.report_error(ParseError::colon_spacing(
            ColonSpacingKind::SpaceBeforeColon,
            Location::new(3, 9),
        ));

        let formatted = reporter.format_diagnostics(source);
        assert!(formatted.contains("Error[TR1003]"));
        assert!(formatted.contains("3: def f() : Integer"));
        let caret_line = formatted.lines().last().unwrap();
        assert_eq!(caret_line.find('^'), Some(5 + 8));
    }
}
