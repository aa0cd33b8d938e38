//! Method body statements
//!
//! Each logical line of a method body is parsed with a small expression
//! grammar. Lines the grammar cannot consume completely (blocks, modifiers,
//! command calls without parentheses, multi-line constructs) are kept as
//! `Expr::Opaque` with their source text.

use crate::{
    combinator::{choice, end_of_input, lazy, optional, satisfy, sep_by, Failure, Parser, Success},
    ir::{BinaryOp, Expr, Literal, UnaryOp},
    token::{Token, TokenKind},
    type_parser::{token, TokenParser},
};

const OR_OPERATORS: &[(TokenKind, BinaryOp)] = &[(TokenKind::PipePipe, BinaryOp::Or), (TokenKind::Or, BinaryOp::Or)];

const AND_OPERATORS: &[(TokenKind, BinaryOp)] = &[(TokenKind::AmpAmp, BinaryOp::And), (TokenKind::And, BinaryOp::And)];

const EQUALITY_OPERATORS: &[(TokenKind, BinaryOp)] = &[
    (TokenKind::EqualEqual, BinaryOp::Eq),
    (TokenKind::NotEqual, BinaryOp::NotEq),
    (TokenKind::Match, BinaryOp::Match),
    (TokenKind::Spaceship, BinaryOp::Cmp),
];

const COMPARISON_OPERATORS: &[(TokenKind, BinaryOp)] = &[
    (TokenKind::Less, BinaryOp::Lt),
    (TokenKind::Greater, BinaryOp::Gt),
    (TokenKind::LessEqual, BinaryOp::Le),
    (TokenKind::GreaterEqual, BinaryOp::Ge),
];

const ADDITIVE_OPERATORS: &[(TokenKind, BinaryOp)] = &[(TokenKind::Plus, BinaryOp::Add), (TokenKind::Minus, BinaryOp::Sub)];

const MULTIPLICATIVE_OPERATORS: &[(TokenKind, BinaryOp)] = &[
    (TokenKind::Star, BinaryOp::Mul),
    (TokenKind::Slash, BinaryOp::Div),
    (TokenKind::Percent, BinaryOp::Mod),
];

/// Parse one logical line of a method body
pub fn parse_statement(line: &[Token], source: &str) -> Expr {
    match statement().then_skip(end_of_input()).parse(line, 0) {
        Ok(result) => result.value,
        Err(_) => opaque(line, source),
    }
}

fn opaque(line: &[Token], source: &str) -> Expr {
    let text = match (line.first(), line.last()) {
        (Some(first), Some(last)) => source.get(first.start..last.end).unwrap_or_default(),
        _ => "",
    };
    Expr::Opaque { text: text.to_string() }
}

pub fn statement<'a>() -> TokenParser<'a, Expr> {
    choice(vec![return_statement(), assignment(), expression()])
}

fn return_statement<'a>() -> TokenParser<'a, Expr> {
    token(TokenKind::Return)
        .skip_then(optional(lazy(expression)))
        .map(|value| Expr::Return(value.map(Box::new)))
}

fn assignment<'a>() -> TokenParser<'a, Expr> {
    let target = satisfy::<[Token], _>("assignment target", |t: &Token| {
        matches!(t.kind, TokenKind::Identifier | TokenKind::InstanceVar)
    })
    .map(|t| match t.kind {
        TokenKind::InstanceVar => Expr::InstanceVariable(t.text.trim_start_matches('@').to_string()),
        _ => Expr::Variable(t.text),
    });

    let operator = token(TokenKind::Equal).or(token(TokenKind::OpAssign));

    target
        .then(operator)
        .then(lazy(expression))
        .map(|((target, operator), value)| {
            let value = match compound_operator(&operator.text) {
                Some(op) => Expr::Binary {
                    op,
                    left: Box::new(target.clone()),
                    right: Box::new(value),
                },
                None => value,
            };
            Expr::Assignment {
                target: Box::new(target),
                value: Box::new(value),
            }
        })
}

fn compound_operator(text: &str) -> Option<BinaryOp> {
    let op = match text.strip_suffix('=')? {
        "+" => BinaryOp::Add,
        "-" => BinaryOp::Sub,
        "*" => BinaryOp::Mul,
        "/" => BinaryOp::Div,
        "%" => BinaryOp::Mod,
        "**" => BinaryOp::Pow,
        "||" => BinaryOp::Or,
        "&&" => BinaryOp::And,
        _ => return None,
    };
    Some(op)
}

pub fn expression<'a>() -> TokenParser<'a, Expr> {
    let negation = token(TokenKind::Not)
        .skip_then(lazy(expression))
        .map(|operand| Expr::Unary {
            op: UnaryOp::Not,
            operand: Box::new(operand),
        });
    negation.or(or_expression())
}

fn or_expression<'a>() -> TokenParser<'a, Expr> {
    binary_level(and_expression(), OR_OPERATORS)
}

fn and_expression<'a>() -> TokenParser<'a, Expr> {
    binary_level(equality(), AND_OPERATORS)
}

fn equality<'a>() -> TokenParser<'a, Expr> {
    binary_level(comparison(), EQUALITY_OPERATORS)
}

fn comparison<'a>() -> TokenParser<'a, Expr> {
    binary_level(additive(), COMPARISON_OPERATORS)
}

fn additive<'a>() -> TokenParser<'a, Expr> {
    binary_level(multiplicative(), ADDITIVE_OPERATORS)
}

fn multiplicative<'a>() -> TokenParser<'a, Expr> {
    binary_level(power(), MULTIPLICATIVE_OPERATORS)
}

/// Left-associative chain of `operand (op operand)*`
fn binary_level<'a>(
    operand: TokenParser<'a, Expr>,
    operators: &'static [(TokenKind, BinaryOp)],
) -> TokenParser<'a, Expr> {
    let operator = Parser::new(move |input: &[Token], position| {
        input
            .get(position)
            .and_then(|t| operators.iter().find(|(kind, _)| *kind == t.kind))
            .map(|&(_, op)| Success {
                value: op,
                position: position + 1,
            })
            .ok_or_else(|| Failure::new("Expected operator", position))
    });

    operand
        .clone()
        .then(operator.then(operand).many())
        .map(|(first, rest)| {
            rest.into_iter().fold(first, |left, (op, right)| Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            })
        })
}

/// `**` binds tighter than unary minus on its left and is right-associative
fn power<'a>() -> TokenParser<'a, Expr> {
    unary()
        .then(optional(token(TokenKind::StarStar).skip_then(lazy(power))))
        .map(|(base, exponent)| match exponent {
            Some(exponent) => Expr::Binary {
                op: BinaryOp::Pow,
                left: Box::new(base),
                right: Box::new(exponent),
            },
            None => base,
        })
}

fn unary<'a>() -> TokenParser<'a, Expr> {
    let operator = satisfy::<[Token], _>("unary operator", |t: &Token| {
        matches!(t.kind, TokenKind::Bang | TokenKind::Minus)
    });

    operator
        .then(lazy(unary))
        .map(|(operator, operand)| Expr::Unary {
            op: if operator.kind == TokenKind::Bang {
                UnaryOp::Not
            } else {
                UnaryOp::Neg
            },
            operand: Box::new(operand),
        })
        .or(postfix())
}

enum Suffix {
    Method { name: String, args: Vec<Expr> },
    Index(Vec<Expr>),
}

fn postfix<'a>() -> TokenParser<'a, Expr> {
    let method_name = satisfy::<[Token], _>("method name", |t: &Token| {
        matches!(t.kind, TokenKind::Identifier | TokenKind::Constant)
    });
    let method = optional(token(TokenKind::Ampersand))
        .skip_then(token(TokenKind::Dot))
        .skip_then(method_name)
        .then(optional(arguments()))
        .map(|(name, args)| Suffix::Method {
            name: name.text,
            args: args.unwrap_or_default(),
        });
    let index = token(TokenKind::LeftBracket)
        .skip_then(sep_by(lazy(expression), token(TokenKind::Comma)))
        .then_skip(token(TokenKind::RightBracket))
        .map(Suffix::Index);

    primary().then(method.or(index).many()).map(|(receiver, suffixes)| {
        suffixes.into_iter().fold(receiver, |receiver, suffix| match suffix {
            Suffix::Method { name, args } => Expr::Call {
                receiver: Some(Box::new(receiver)),
                method: name,
                args,
            },
            Suffix::Index(args) => Expr::Call {
                receiver: Some(Box::new(receiver)),
                method: "[]".to_string(),
                args,
            },
        })
    })
}

/// `( expr, ... )` directly after a name
fn arguments<'a>() -> TokenParser<'a, Vec<Expr>> {
    Parser::new(|input: &[Token], position| {
        let touching = match (position.checked_sub(1).and_then(|i| input.get(i)), input.get(position)) {
            (Some(previous), Some(paren)) => previous.touches(paren),
            _ => false,
        };
        if !touching {
            return Err(Failure::new("Expected `(`", position));
        }
        token(TokenKind::LeftParen)
            .skip_then(sep_by(lazy(expression), token(TokenKind::Comma)))
            .then_skip(token(TokenKind::RightParen))
            .parse(input, position)
    })
}

fn primary<'a>() -> TokenParser<'a, Expr> {
    choice(vec![
        literal(),
        token(TokenKind::SelfKw).map(|_| Expr::SelfRef),
        token(TokenKind::InstanceVar)
            .map(|t| Expr::InstanceVariable(t.text.trim_start_matches('@').to_string())),
        identifier(),
        constant_path(),
        token(TokenKind::LeftParen)
            .skip_then(lazy(expression))
            .then_skip(token(TokenKind::RightParen)),
        array_literal(),
        hash_literal(),
    ])
}

fn literal<'a>() -> TokenParser<'a, Expr> {
    satisfy::<[Token], _>("literal", |t: &Token| {
        matches!(
            t.kind,
            TokenKind::Integer
                | TokenKind::Float
                | TokenKind::String
                | TokenKind::Symbol
                | TokenKind::True
                | TokenKind::False
                | TokenKind::Nil
        )
    })
    .map(|t| {
        let literal = match t.kind {
            TokenKind::Integer => Literal::Integer(t.text),
            TokenKind::Float => Literal::Float(t.text),
            TokenKind::String => Literal::String(unquote(&t.text)),
            TokenKind::Symbol => Literal::Symbol(t.text),
            TokenKind::True => Literal::Boolean(true),
            TokenKind::False => Literal::Boolean(false),
            _ => Literal::Nil,
        };
        Expr::Literal(literal)
    })
}

fn unquote(text: &str) -> String {
    let mut chars = text.chars();
    let Some(quote) = chars.next() else {
        return String::new();
    };
    let inner = chars.as_str();
    inner.strip_suffix(quote).unwrap_or(inner).to_string()
}

/// A bare name is a local variable unless it is called or ends in `?`/`!`
fn identifier<'a>() -> TokenParser<'a, Expr> {
    token(TokenKind::Identifier)
        .then(optional(arguments()))
        .map(|(name, args)| match args {
            Some(args) => Expr::Call {
                receiver: None,
                method: name.text,
                args,
            },
            None if name.text.ends_with(['?', '!']) => Expr::Call {
                receiver: None,
                method: name.text,
                args: Vec::new(),
            },
            None => Expr::Variable(name.text),
        })
}

fn constant_path<'a>() -> TokenParser<'a, Expr> {
    token(TokenKind::Constant)
        .then(token(TokenKind::ColonColon).skip_then(token(TokenKind::Constant)).many())
        .map(|(head, tail)| {
            let mut name = head.text;
            for segment in tail {
                name.push_str("::");
                name.push_str(&segment.text);
            }
            Expr::Variable(name)
        })
}

fn array_literal<'a>() -> TokenParser<'a, Expr> {
    token(TokenKind::LeftBracket)
        .skip_then(sep_by(lazy(expression), token(TokenKind::Comma)))
        .then_skip(optional(token(TokenKind::Comma)))
        .then_skip(token(TokenKind::RightBracket))
        .map(Expr::Array)
}

fn hash_literal<'a>() -> TokenParser<'a, Expr> {
    let label_key = token(TokenKind::Identifier)
        .then_skip(token(TokenKind::Colon))
        .map(|name| Expr::Literal(Literal::Symbol(format!(":{}", name.text))));
    let rocket_key = lazy(expression).then_skip(token(TokenKind::FatArrow));
    let pair = label_key.or(rocket_key).then(lazy(expression));

    token(TokenKind::LeftBrace)
        .skip_then(sep_by(pair, token(TokenKind::Comma)))
        .then_skip(optional(token(TokenKind::Comma)))
        .then_skip(token(TokenKind::RightBrace))
        .map(Expr::Hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse(source: &str) -> Expr {
        let tokens = tokenize(source).tokens;
        parse_statement(&tokens[..tokens.len() - 1], source)
    }

    fn int(text: &str) -> Expr {
        Expr::Literal(Literal::Integer(text.to_string()))
    }

    #[test]
    fn test_precedence() {
        let expr = parse("1 + 2 * 3");
        assert_eq!(
            expr,
            Expr::Binary {
                op: BinaryOp::Add,
                left: Box::new(int("1")),
                right: Box::new(Expr::Binary {
                    op: BinaryOp::Mul,
                    left: Box::new(int("2")),
                    right: Box::new(int("3")),
                }),
            }
        );
    }

    #[test]
    fn test_comparison_and_logic() {
        match parse("a < b && !c") {
            Expr::Binary { op: BinaryOp::And, left, right } => {
                assert!(matches!(*left, Expr::Binary { op: BinaryOp::Lt, .. }));
                assert!(matches!(*right, Expr::Unary { op: UnaryOp::Not, .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_assignment_and_compound() {
        assert_eq!(
            parse("total = 0"),
            Expr::Assignment {
                target: Box::new(Expr::Variable("total".into())),
                value: Box::new(int("0")),
            }
        );
        match parse("@count += 1") {
            Expr::Assignment { target, value } => {
                assert_eq!(*target, Expr::InstanceVariable("count".into()));
                assert!(matches!(*value, Expr::Binary { op: BinaryOp::Add, .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_calls_and_literals() {
        match parse("name.to_s.upcase") {
            Expr::Call { receiver: Some(receiver), method, args } => {
                assert_eq!(method, "upcase");
                assert!(args.is_empty());
                assert!(matches!(*receiver, Expr::Call { .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            parse("\"héllo\""),
            Expr::Literal(Literal::String("héllo".into()))
        );
        assert!(matches!(parse("[1, 2, 3]"), Expr::Array(items) if items.len() == 3));
        assert!(matches!(parse("{ name: \"x\", \"k\" => 1 }"), Expr::Hash(pairs) if pairs.len() == 2));
        assert!(matches!(parse("empty?"), Expr::Call { receiver: None, .. }));
        assert!(matches!(parse("compute(1, 2)"), Expr::Call { receiver: None, args, .. } if args.len() == 2));
    }

    #[test]
    fn test_return() {
        assert_eq!(parse("return"), Expr::Return(None));
        assert_eq!(parse("return 1"), Expr::Return(Some(Box::new(int("1")))));
    }

    #[test]
    fn test_unmodelled_code_is_opaque() {
        for source in ["puts x if ready", "items.each do |item|", "x ? 1 : 2", "puts \"hi\""] {
            assert_eq!(
                parse(source),
                Expr::Opaque {
                    text: source.to_string()
                },
                "{source}"
            );
        }
    }
}
