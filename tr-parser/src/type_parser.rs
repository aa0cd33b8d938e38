//! Type expression grammar
//!
//! ```text
//! Type    := Union
//! Union   := Primary ('|' Primary)*
//! Primary := '->' Type
//!          | '(' (Type (',' Type)*)? ')' ('->' Type)?
//!          | '{' Field (',' Field)* '}'
//!          | Name ('<' Type (',' Type)* '>')? '?'?
//! Field   := identifier ':' Type ('=' <skipped>)?
//! Name    := Constant ('::' Constant)* | identifier | 'nil' | 'self'
//! ```
//!
//! A parenthesized single type without `->` is a grouping, not a one-element
//! tuple, so `(String|Integer)?` means a nullable union.

use crate::{
    combinator::{choice, lazy, optional, satisfy, sep_by, sep_by1, Failure, Parser, Success},
    ir::{HashField, TypeExpr},
    span::Span,
    token::{Token, TokenKind},
};

pub type TokenParser<'a, T> = Parser<'a, [Token], T>;

/// Match one token of `kind`
pub fn token<'a>(kind: TokenKind) -> TokenParser<'a, Token> {
    satisfy::<[Token], _>(&kind.to_string(), move |t: &Token| t.kind == kind).label(&kind.to_string())
}

/// A full type expression
pub fn type_expr<'a>() -> TokenParser<'a, TypeExpr> {
    union(false)
}

/// A type expression whose leading name was scanned together with its colon,
/// as in `:Integer` or `:Array<String>`
pub fn glued_type_expr<'a>() -> TokenParser<'a, TypeExpr> {
    union(true)
}

fn union<'a>(glued: bool) -> TokenParser<'a, TypeExpr> {
    let first = if glued { named_type(true) } else { primary() };
    first
        .then(token(TokenKind::Pipe).skip_then(primary()).many())
        .map(|(first, rest)| {
            if rest.is_empty() {
                return first;
            }
            let mut types = Vec::with_capacity(rest.len() + 1);
            for ty in std::iter::once(first).chain(rest) {
                match ty {
                    TypeExpr::Union { types: members } => types.extend(members),
                    other => types.push(other),
                }
            }
            TypeExpr::Union { types }
        })
}

fn primary<'a>() -> TokenParser<'a, TypeExpr> {
    choice(vec![arrow_function(), parenthesized(), record(), named_type(false)])
}

fn arrow_function<'a>() -> TokenParser<'a, TypeExpr> {
    token(TokenKind::Arrow)
        .skip_then(lazy(type_expr))
        .map(|return_type| TypeExpr::Function {
            params: Vec::new(),
            return_type: Box::new(return_type),
        })
}

fn parenthesized<'a>() -> TokenParser<'a, TypeExpr> {
    let items = token(TokenKind::LeftParen)
        .skip_then(sep_by(lazy(type_expr), token(TokenKind::Comma)))
        .then_skip(token(TokenKind::RightParen));
    let returns = token(TokenKind::Arrow).skip_then(lazy(type_expr));
    let question = token(TokenKind::Question);

    Parser::new(move |input: &[Token], position| {
        let items = items.parse(input, position)?;
        if let Ok(return_type) = returns.parse(input, items.position) {
            return Ok(Success {
                value: TypeExpr::Function {
                    params: items.value,
                    return_type: Box::new(return_type.value),
                },
                position: return_type.position,
            });
        }

        let mut elements = items.value;
        let ty = if elements.len() == 1 {
            elements.remove(0)
        } else {
            TypeExpr::Tuple { elements }
        };
        match question.parse(input, items.position) {
            Ok(nullable) => Ok(Success {
                value: TypeExpr::nullable(ty),
                position: nullable.position,
            }),
            Err(_) => Ok(Success {
                value: ty,
                position: items.position,
            }),
        }
    })
}

fn record<'a>() -> TokenParser<'a, TypeExpr> {
    token(TokenKind::LeftBrace)
        .skip_then(sep_by1(field(), token(TokenKind::Comma)))
        .then_skip(token(TokenKind::RightBrace))
        .map(|fields| TypeExpr::HashLiteral { fields })
}

fn field<'a>() -> TokenParser<'a, HashField> {
    let name = satisfy::<[Token], _>("field name", |t: &Token| {
        t.kind == TokenKind::Identifier || t.kind.is_keyword()
    });
    let spaced = token(TokenKind::Colon).skip_then(lazy(type_expr));
    let glued = lazy(glued_type_expr);

    name.then(spaced.or(glued))
        .then_skip(optional(token(TokenKind::Equal).skip_then(skip_default())))
        .map(|(name, ty)| HashField { name: name.text, ty })
}

fn named_type<'a>(glued: bool) -> TokenParser<'a, TypeExpr> {
    let args = token(TokenKind::Less)
        .skip_then(sep_by1(lazy(type_expr), token(TokenKind::Comma)))
        .then_skip(token(TokenKind::Greater));

    type_name(glued)
        .then(optional(args))
        .then(optional(token(TokenKind::Question)))
        .map(|(((name, absorbed_question), args), question)| {
            let ty = match args {
                Some(args) => TypeExpr::Generic { base: name, args },
                None => TypeExpr::Simple { name },
            };
            if absorbed_question || question.is_some() {
                TypeExpr::nullable(ty)
            } else {
                ty
            }
        })
}

/// The name and whether the lexer already absorbed a trailing `?` into it
fn type_name<'a>(glued: bool) -> TokenParser<'a, (String, bool)> {
    let path_tail = token(TokenKind::ColonColon)
        .skip_then(token(TokenKind::Constant))
        .many();

    let head: TokenParser<'a, (String, bool)> = if glued {
        satisfy::<[Token], _>("type name", |t: &Token| t.is_capitalized_symbol())
            .map(|t| (t.text.trim_start_matches(':').to_string(), false))
    } else {
        satisfy::<[Token], _>("type name", |t: &Token| {
            matches!(
                t.kind,
                TokenKind::Constant | TokenKind::Identifier | TokenKind::Nil | TokenKind::SelfKw
            )
        })
        .map(|t| {
            if t.kind == TokenKind::Identifier {
                if let Some(stripped) = t.text.strip_suffix('?') {
                    return (stripped.to_string(), true);
                }
            }
            (t.text, false)
        })
    };

    head.then(path_tail)
        .map(|((mut name, absorbed), tail)| {
            for segment in tail {
                name.push_str("::");
                name.push_str(&segment.text);
            }
            (name, absorbed)
        })
        .label("type name")
}

/// Skip a default value expression without parsing it. Stops before a
/// `,`, a closing bracket or a line break at nesting depth zero.
pub fn skip_default<'a>() -> TokenParser<'a, Span> {
    Parser::new(|input: &[Token], start| {
        let mut depth = 0usize;
        let mut position = start;

        while let Some(t) = input.get(position) {
            match t.kind {
                TokenKind::LeftParen | TokenKind::LeftBracket | TokenKind::LeftBrace => depth += 1,
                TokenKind::RightParen | TokenKind::RightBracket | TokenKind::RightBrace if depth == 0 => break,
                TokenKind::RightParen | TokenKind::RightBracket | TokenKind::RightBrace => depth -= 1,
                TokenKind::Comma if depth == 0 => break,
                TokenKind::Newline | TokenKind::Semicolon | TokenKind::Eof if depth == 0 => break,
                TokenKind::Eof => break,
                _ => {}
            }
            position += 1;
        }

        if position == start {
            return Err(Failure::new("Expected default value", start));
        }
        let span = Span::new(input[start].start, input[position - 1].end);
        Ok(Success { value: span, position })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{combinator::end_of_input, lexer::tokenize};

    fn parse(source: &str) -> TypeExpr {
        let tokens = tokenize(source).tokens;
        let tokens = &tokens[..tokens.len() - 1];
        type_expr()
            .then_skip(end_of_input())
            .parse(tokens, 0)
            .unwrap_or_else(|failure| panic!("{source}: {failure:?}"))
            .value
    }

    fn parse_fails(source: &str) -> bool {
        let tokens = tokenize(source).tokens;
        let tokens = &tokens[..tokens.len() - 1];
        type_expr().then_skip(end_of_input()).parse(tokens, 0).is_err()
    }

    #[test]
    fn test_canonical_rendering() {
        for source in [
            "Integer",
            "Array<Integer>",
            "String|Integer",
            "String?",
            "(Integer, String) -> Boolean",
            "(Integer, String)",
            "{ name: String, age: Integer }",
            "Hash<Symbol, Array<String>>",
            "Foo::Bar",
        ] {
            assert_eq!(parse(source).to_string(), source);
        }
    }

    #[test]
    fn test_union_members() {
        match parse("String | Integer | nil") {
            TypeExpr::Union { types } => {
                assert_eq!(types.len(), 3);
                assert_eq!(types[2], TypeExpr::simple("nil"));
            }
            other => panic!("expected union, got {other:?}"),
        }
    }

    #[test]
    fn test_function_types() {
        assert_eq!(parse("-> String").to_string(), "() -> String");
        assert_eq!(parse("() -> void").to_string(), "() -> void");
        match parse("(Integer) -> String|nil") {
            TypeExpr::Function { params, return_type } => {
                assert_eq!(params, vec![TypeExpr::simple("Integer")]);
                assert!(matches!(*return_type, TypeExpr::Union { .. }));
            }
            other => panic!("expected function, got {other:?}"),
        }
    }

    #[test]
    fn test_grouping_and_nullable() {
        assert_eq!(parse("(String)"), TypeExpr::simple("String"));
        assert_eq!(parse("(String|Integer)?").to_string(), "(String|Integer)?");
        assert_eq!(parse("bool?"), TypeExpr::nullable(TypeExpr::simple("bool")));
        assert_eq!(
            parse("Array<String>?"),
            TypeExpr::nullable(TypeExpr::generic("Array", vec![TypeExpr::simple("String")]))
        );
    }

    #[test]
    fn test_record_with_defaults() {
        match parse("{ name: String, retries: Integer = 3 }") {
            TypeExpr::HashLiteral { fields } => {
                assert_eq!(fields.len(), 2);
                assert_eq!(fields[1].name, "retries");
                assert_eq!(fields[1].ty, TypeExpr::simple("Integer"));
            }
            other => panic!("expected record, got {other:?}"),
        }
    }

    #[test]
    fn test_glued_name() {
        let tokens = tokenize(":Array<String>").tokens;
        let result = glued_type_expr().parse(&tokens, 0).unwrap();
        assert_eq!(result.value.to_string(), "Array<String>");
        assert_eq!(tokens[result.position].kind, TokenKind::Eof);
    }

    #[test]
    fn test_malformed_types() {
        assert!(parse_fails("Array<"));
        assert!(parse_fails("String |"));
        assert!(parse_fails("{ }"));
        assert!(parse_fails("-> "));
    }

    #[test]
    fn test_skip_default_stops_at_delimiters() {
        let tokens = tokenize("foo(1, 2), next").tokens;
        let result = skip_default().parse(&tokens, 0).unwrap();
        assert_eq!(result.value, Span::new(0, 9));
        assert_eq!(tokens[result.position].kind, TokenKind::Comma);
    }
}
