//! tr Language Parser
//!
//! Lexing, a parser-combinator toolkit, and the declaration parser that turns
//! annotated source into the IR consumed by the checker and the compiler.

pub mod body_parser;
pub mod combinator;
pub mod content_hash;
pub mod error;
pub mod ir;
pub mod lexer;
pub mod parser;
pub mod span;
pub mod token;
pub mod type_parser;

// Re-export core types
pub use error::{ColonSpacingKind, ErrorReporter, ParseError, Result};
pub use ir::*;
pub use lexer::{tokenize, Lexer};
pub use parser::parse_to_ir;
pub use span::{HasSpan, Location, Span};
pub use token::{Token, TokenKind};

/// Parse a standalone type expression such as `Array<String>?`
pub fn parse_type(source: &str) -> std::result::Result<TypeExpr, ParseError> {
    use combinator::end_of_input;

    let tokens = tokenize(source).tokens;
    let body = &tokens[..tokens.len().saturating_sub(1)];
    type_parser::type_expr()
        .then_skip(end_of_input())
        .parse(body, 0)
        .map(|success| success.value)
        .map_err(|failure| {
            let location = body
                .get(failure.position)
                .or_else(|| tokens.last())
                .map(Token::location)
                .unwrap_or_default();
            ParseError::syntax(failure.message, location)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_type() {
        assert_eq!(parse_type("Array<String>?").unwrap().to_string(), "Array<String>?");
        let error = parse_type("Array<").unwrap_err();
        assert_eq!(error.code(), "TR1001");
    }

    #[test]
    fn test_parse_to_ir_reexport() {
        let (program, errors) = parse_to_ir("type Id = Integer\n");
        assert!(errors.is_empty());
        assert_eq!(program.declarations.len(), 1);
    }
}
