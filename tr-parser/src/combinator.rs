//! Parser combinators
//!
//! A `Parser` is a boxed function from `(input, position)` to a
//! `ParseResult`. Parsers never mutate their input; a successful parse
//! reports where the next parser should resume. The same combinators run
//! over characters (`[char]`) and tokens (`[Token]`).
//!
//! Alternatives backtrack fully: there is no cut, so an ambiguous grammar
//! quietly prefers the first branch that matches.

use std::rc::Rc;

/// Anything indexable by position
pub trait Stream {
    type Item;

    fn item(&self, position: usize) -> Option<&Self::Item>;
    fn length(&self) -> usize;
}

impl<T> Stream for [T] {
    type Item = T;

    fn item(&self, position: usize) -> Option<&T> {
        self.get(position)
    }

    fn length(&self) -> usize {
        self.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Success<T> {
    pub value: T,
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub message: String,
    pub position: usize,
}

impl Failure {
    pub fn new(message: impl Into<String>, position: usize) -> Self {
        Failure {
            message: message.into(),
            position,
        }
    }

    /// The failure that got further into the input; ties go to `other`
    fn furthest(self, other: Failure) -> Failure {
        if self.position > other.position {
            self
        } else {
            other
        }
    }
}

pub type ParseResult<T> = Result<Success<T>, Failure>;

fn success<T>(value: T, position: usize) -> ParseResult<T> {
    Ok(Success { value, position })
}

pub struct Parser<'a, S: ?Sized, T> {
    run: Rc<dyn Fn(&S, usize) -> ParseResult<T> + 'a>,
}

impl<'a, S: ?Sized, T> Clone for Parser<'a, S, T> {
    fn clone(&self) -> Self {
        Parser {
            run: Rc::clone(&self.run),
        }
    }
}

impl<'a, S: ?Sized + 'a, T: 'a> Parser<'a, S, T> {
    pub fn new(run: impl Fn(&S, usize) -> ParseResult<T> + 'a) -> Self {
        Parser { run: Rc::new(run) }
    }

    pub fn parse(&self, input: &S, position: usize) -> ParseResult<T> {
        (self.run)(input, position)
    }

    pub fn then<U: 'a>(self, next: Parser<'a, S, U>) -> Parser<'a, S, (T, U)> {
        sequence(self, next)
    }

    /// Run `next` after `self`, keeping only `next`'s value
    pub fn skip_then<U: 'a>(self, next: Parser<'a, S, U>) -> Parser<'a, S, U> {
        map(sequence(self, next), |(_, value)| value)
    }

    /// Run `next` after `self`, keeping only `self`'s value
    pub fn then_skip<U: 'a>(self, next: Parser<'a, S, U>) -> Parser<'a, S, T> {
        map(sequence(self, next), |(value, _)| value)
    }

    pub fn or(self, other: Parser<'a, S, T>) -> Parser<'a, S, T> {
        alternative(self, other)
    }

    pub fn map<U: 'a>(self, f: impl Fn(T) -> U + 'a) -> Parser<'a, S, U> {
        map(self, f)
    }

    pub fn and_then<U: 'a>(self, f: impl Fn(T) -> Parser<'a, S, U> + 'a) -> Parser<'a, S, U> {
        flat_map(self, f)
    }

    pub fn label(self, name: &str) -> Parser<'a, S, T> {
        label(self, name)
    }

    pub fn many(self) -> Parser<'a, S, Vec<T>> {
        many(self)
    }

    pub fn many1(self) -> Parser<'a, S, Vec<T>> {
        many1(self)
    }

    pub fn optional(self) -> Parser<'a, S, Option<T>> {
        optional(self)
    }
}

/// Always succeeds with `value`, consuming nothing
pub fn pure<'a, S: ?Sized + 'a, T: Clone + 'a>(value: T) -> Parser<'a, S, T> {
    Parser::new(move |_, position| success(value.clone(), position))
}

/// Always fails with `message`
pub fn fail<'a, S: ?Sized + 'a, T: 'a>(message: &str) -> Parser<'a, S, T> {
    let message = message.to_string();
    Parser::new(move |_, position| Err(Failure::new(message.clone(), position)))
}

/// Consume one item matching `predicate`
pub fn satisfy<'a, S, F>(description: &str, predicate: F) -> Parser<'a, S, S::Item>
where
    S: Stream + ?Sized + 'a,
    S::Item: Clone + 'a,
    F: Fn(&S::Item) -> bool + 'a,
{
    let description = description.to_string();
    Parser::new(move |input: &S, position| match input.item(position) {
        Some(item) if predicate(item) => success(item.clone(), position + 1),
        _ => Err(Failure::new(format!("Expected {description}"), position)),
    })
}

/// Succeeds only at the end of the stream
pub fn end_of_input<'a, S: Stream + ?Sized + 'a>() -> Parser<'a, S, ()> {
    Parser::new(|input: &S, position| {
        if position >= input.length() {
            success((), position)
        } else {
            Err(Failure::new("Expected end of input", position))
        }
    })
}

/// Defer construction, for recursive grammars
pub fn lazy<'a, S: ?Sized + 'a, T: 'a>(build: impl Fn() -> Parser<'a, S, T> + 'a) -> Parser<'a, S, T> {
    Parser::new(move |input, position| build().parse(input, position))
}

pub fn sequence<'a, S: ?Sized + 'a, T: 'a, U: 'a>(
    first: Parser<'a, S, T>,
    second: Parser<'a, S, U>,
) -> Parser<'a, S, (T, U)> {
    Parser::new(move |input, position| {
        let a = first.parse(input, position)?;
        let b = second.parse(input, a.position)?;
        success((a.value, b.value), b.position)
    })
}

pub fn alternative<'a, S: ?Sized + 'a, T: 'a>(
    first: Parser<'a, S, T>,
    second: Parser<'a, S, T>,
) -> Parser<'a, S, T> {
    Parser::new(move |input, position| match first.parse(input, position) {
        Ok(result) => Ok(result),
        Err(first_failure) => second
            .parse(input, position)
            .map_err(|second_failure| first_failure.furthest(second_failure)),
    })
}

pub fn map<'a, S: ?Sized + 'a, T: 'a, U: 'a>(
    parser: Parser<'a, S, T>,
    f: impl Fn(T) -> U + 'a,
) -> Parser<'a, S, U> {
    Parser::new(move |input, position| {
        let result = parser.parse(input, position)?;
        success(f(result.value), result.position)
    })
}

pub fn flat_map<'a, S: ?Sized + 'a, T: 'a, U: 'a>(
    parser: Parser<'a, S, T>,
    f: impl Fn(T) -> Parser<'a, S, U> + 'a,
) -> Parser<'a, S, U> {
    Parser::new(move |input, position| {
        let result = parser.parse(input, position)?;
        f(result.value).parse(input, result.position)
    })
}

/// Zero or more; stops at the first failure or at a match that consumed nothing
pub fn many<'a, S: ?Sized + 'a, T: 'a>(parser: Parser<'a, S, T>) -> Parser<'a, S, Vec<T>> {
    Parser::new(move |input, mut position| {
        let mut values = Vec::new();
        while let Ok(result) = parser.parse(input, position) {
            if result.position == position {
                break;
            }
            values.push(result.value);
            position = result.position;
        }
        success(values, position)
    })
}

pub fn many1<'a, S: ?Sized + 'a, T: 'a>(parser: Parser<'a, S, T>) -> Parser<'a, S, Vec<T>> {
    let rest = many(parser.clone());
    Parser::new(move |input, position| {
        let first = parser.parse(input, position)?;
        let mut values = vec![first.value];
        let tail = rest.parse(input, first.position)?;
        values.extend(tail.value);
        success(values, tail.position)
    })
}

/// Never fails; yields `None` without consuming when `parser` fails
pub fn optional<'a, S: ?Sized + 'a, T: 'a>(parser: Parser<'a, S, T>) -> Parser<'a, S, Option<T>> {
    Parser::new(move |input, position| match parser.parse(input, position) {
        Ok(result) => success(Some(result.value), result.position),
        Err(_) => success(None, position),
    })
}

pub fn sep_by1<'a, S: ?Sized + 'a, T: 'a, D: 'a>(
    parser: Parser<'a, S, T>,
    delimiter: Parser<'a, S, D>,
) -> Parser<'a, S, Vec<T>> {
    Parser::new(move |input, position| {
        let first = parser.parse(input, position)?;
        let mut values = vec![first.value];
        let mut position = first.position;

        loop {
            let Ok(delimited) = delimiter.parse(input, position) else {
                break;
            };
            let Ok(item) = parser.parse(input, delimited.position) else {
                break;
            };
            if item.position == position {
                break;
            }
            values.push(item.value);
            position = item.position;
        }

        success(values, position)
    })
}

pub fn sep_by<'a, S: ?Sized + 'a, T: 'a, D: 'a>(
    parser: Parser<'a, S, T>,
    delimiter: Parser<'a, S, D>,
) -> Parser<'a, S, Vec<T>> {
    let some = sep_by1(parser, delimiter);
    Parser::new(move |input, position| match some.parse(input, position) {
        Ok(result) => Ok(result),
        Err(_) => success(Vec::new(), position),
    })
}

/// Replace the failure message with ``Expected `name` ``
pub fn label<'a, S: ?Sized + 'a, T: 'a>(parser: Parser<'a, S, T>, name: &str) -> Parser<'a, S, T> {
    let message = format!("Expected `{name}`");
    Parser::new(move |input, position| {
        parser
            .parse(input, position)
            .map_err(|failure| Failure::new(message.clone(), failure.position))
    })
}

/// Succeeds or fails like `parser`, but never consumes
pub fn lookahead<'a, S: ?Sized + 'a, T: 'a>(parser: Parser<'a, S, T>) -> Parser<'a, S, T> {
    Parser::new(move |input, position| {
        let result = parser.parse(input, position)?;
        success(result.value, position)
    })
}

/// Succeeds, consuming nothing, exactly when `parser` fails
pub fn not_followed_by<'a, S: ?Sized + 'a, T: 'a>(parser: Parser<'a, S, T>) -> Parser<'a, S, ()> {
    Parser::new(move |input, position| match parser.parse(input, position) {
        Ok(_) => Err(Failure::new("Unexpected input", position)),
        Err(_) => success((), position),
    })
}

/// First success wins; otherwise the failure that reached furthest
pub fn choice<'a, S: ?Sized + 'a, T: 'a>(parsers: Vec<Parser<'a, S, T>>) -> Parser<'a, S, T> {
    Parser::new(move |input, position| {
        let mut best: Option<Failure> = None;
        for parser in &parsers {
            match parser.parse(input, position) {
                Ok(result) => return Ok(result),
                Err(failure) => {
                    best = Some(match best.take() {
                        Some(previous) if previous.position >= failure.position => previous,
                        _ => failure,
                    });
                }
            }
        }
        Err(best.unwrap_or_else(|| Failure::new("No alternatives", position)))
    })
}

/// Match one character
pub fn char_parser<'a>(expected: char) -> Parser<'a, [char], char> {
    satisfy::<[char], _>(&format!("'{expected}'"), move |c: &char| *c == expected)
}

/// Match a literal string character by character
pub fn string_parser<'a>(expected: &str) -> Parser<'a, [char], String> {
    let expected: Vec<char> = expected.chars().collect();
    let text: String = expected.iter().collect();
    Parser::new(move |input: &[char], position| {
        let end = position + expected.len();
        if input.get(position..end) == Some(expected.as_slice()) {
            success(text.clone(), end)
        } else {
            Err(Failure::new(format!("Expected \"{text}\""), position))
        }
    })
}
