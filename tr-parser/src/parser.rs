//! Declaration parser
//!
//! Builds IR declarations from the token stream. Signatures, classes,
//! modules, aliases and interfaces are composed from combinators; method
//! bodies are split into logical statements by tracking `end`-terminated
//! block nesting. A failed declaration is recorded and the parser
//! resynchronizes at the next line that starts a declaration.

use crate::{
    body_parser::parse_statement,
    combinator::{choice, lookahead, optional, satisfy, Failure, ParseResult, Parser, Success},
    error::{ColonSpacingKind, ErrorReporter, ParseError},
    ir::{
        ClassDecl, Declaration, Interface, InterfaceMember, InstanceVarDecl, MethodBody, MethodDef, ModuleDecl,
        Parameter, ParameterKind, Program, SlotKind, TypeAlias, TypeExpr, TypeSlot, Visibility,
    },
    lexer::{tokenize, LexOutput},
    span::{Location, Span},
    token::{Token, TokenKind},
    type_parser::{glued_type_expr, skip_default, token, type_expr, TokenParser},
};
use once_cell::sync::OnceCell;
use std::ops::Range;
use tracing::debug;

/// A parsed value plus the recoverable errors found inside it
#[derive(Debug, Clone)]
pub struct Parsed<T> {
    pub value: T,
    pub errors: Vec<ParseError>,
}

impl<T> Parsed<T> {
    fn clean(value: T) -> Self {
        Parsed {
            value,
            errors: Vec::new(),
        }
    }
}

/// `: Type` after a parameter, a method signature, an ivar or a member
#[derive(Debug, Clone)]
pub struct Annotation {
    pub ty: TypeExpr,
    /// From the colon through the last token of the type
    pub span: Span,
    pub location: Location,
    pub spacing: Option<ParseError>,
}

impl Annotation {
    fn into_slot(self, kind: SlotKind) -> (TypeSlot, Option<ParseError>) {
        (TypeSlot::annotated(kind, self.ty, self.span, self.location), self.spacing)
    }
}

/// Parse source text into IR, collecting every error instead of stopping
pub fn parse_to_ir(source: &str) -> (Program, Vec<ParseError>) {
    let LexOutput { tokens, errors } = tokenize(source);
    let mut reporter = ErrorReporter::new();
    reporter.extend(errors);

    let program = parse_program(&tokens, source, &mut reporter);

    let mut errors = reporter.into_errors();
    errors.sort_by_key(|error| error.location());
    (program, errors)
}

/// Parse a token stream ending in `Eof`
pub fn parse_program(tokens: &[Token], source: &str, reporter: &mut ErrorReporter) -> Program {
    let declaration = Grammar { source }.declaration();
    let mut declarations = Vec::new();
    let mut position = 0;

    while let Some(current) = tokens.get(position) {
        match current.kind {
            TokenKind::Eof => break,
            TokenKind::Newline | TokenKind::Semicolon => position += 1,
            _ if is_declaration_start(tokens, position) => match declaration.parse(tokens, position) {
                Ok(parsed) => {
                    reporter.extend(parsed.value.errors);
                    declarations.push(parsed.value.value);
                    position = parsed.position;
                }
                Err(failure) => {
                    let error = syntax_error(tokens, &failure);
                    debug!("Recovering from declaration error: {}", error);
                    reporter.report_error(error);
                    position = resynchronize(tokens, position);
                }
            },
            _ => position = next_line(tokens, position),
        }
    }

    Program::new(declarations)
}

fn syntax_error(tokens: &[Token], failure: &Failure) -> ParseError {
    match tokens.get(failure.position) {
        Some(found) => ParseError::syntax(format!("{}, found {}", failure.message, found), found.location()),
        None => ParseError::syntax(failure.message.clone(), tokens.last().map(Token::location).unwrap_or_default()),
    }
}

/// Whether a declaration begins at `index`
pub fn is_declaration_start(tokens: &[Token], index: usize) -> bool {
    let next = tokens.get(index + 1).map(|t| t.kind);
    match tokens.get(index).map(|t| t.kind) {
        Some(TokenKind::Def | TokenKind::Module | TokenKind::Interface) => true,
        Some(TokenKind::Class) => next != Some(TokenKind::Less),
        Some(TokenKind::Type) => next == Some(TokenKind::Constant),
        Some(TokenKind::Private | TokenKind::Protected | TokenKind::Public) => next == Some(TokenKind::Def),
        _ => false,
    }
}

/// First declaration start after `start` that begins a new line
fn resynchronize(tokens: &[Token], start: usize) -> usize {
    (start + 1..tokens.len())
        .find(|&index| {
            tokens[index].kind == TokenKind::Eof
                || (tokens[index - 1].kind == TokenKind::Newline && is_declaration_start(tokens, index))
        })
        .unwrap_or(tokens.len())
}

/// Index just past the next line break
fn next_line(tokens: &[Token], start: usize) -> usize {
    let mut position = start;
    while let Some(t) = tokens.get(position) {
        position += 1;
        if t.kind == TokenKind::Newline {
            break;
        }
        if t.kind == TokenKind::Eof {
            return position - 1;
        }
    }
    position
}

fn is_terminator(kind: TokenKind) -> bool {
    matches!(kind, TokenKind::Newline | TokenKind::Semicolon)
}

/// Tokens that can end an expression, so a following `if` is a modifier
fn ends_expression(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Identifier
            | TokenKind::Constant
            | TokenKind::InstanceVar
            | TokenKind::ClassVar
            | TokenKind::GlobalVar
            | TokenKind::Integer
            | TokenKind::Float
            | TokenKind::String
            | TokenKind::Symbol
            | TokenKind::True
            | TokenKind::False
            | TokenKind::Nil
            | TokenKind::SelfKw
            | TokenKind::End
            | TokenKind::RightParen
            | TokenKind::RightBracket
            | TokenKind::RightBrace
            | TokenKind::Return
    )
}

/// Whether the keyword at `index` opens a block closed by `end`
fn opens_block(tokens: &[Token], index: usize) -> bool {
    match tokens[index].kind {
        TokenKind::Def
        | TokenKind::Class
        | TokenKind::Module
        | TokenKind::Interface
        | TokenKind::Case
        | TokenKind::Begin
        | TokenKind::Do
        | TokenKind::For => true,
        TokenKind::If | TokenKind::Unless | TokenKind::While | TokenKind::Until => {
            index == 0 || !ends_expression(tokens[index - 1].kind)
        }
        _ => false,
    }
}

/// Find the end of the logical statement starting at `start`: the next
/// terminator, or `end`, at block depth zero. Multi-line blocks opened inside
/// the statement belong to it.
fn scan_statement(tokens: &[Token], start: usize) -> Result<usize, Failure> {
    let mut depth = 0usize;
    let mut loop_header = false;
    let mut position = start;

    loop {
        let Some(current) = tokens.get(position) else {
            return Err(Failure::new("Expected `end`", position));
        };
        match current.kind {
            TokenKind::Eof if depth == 0 => return Ok(position),
            TokenKind::Eof => return Err(Failure::new("Expected `end`", position)),
            kind if is_terminator(kind) => {
                loop_header = false;
                if depth == 0 {
                    return Ok(position);
                }
            }
            TokenKind::End if depth == 0 => return Ok(position),
            TokenKind::End => depth -= 1,
            // `while cond do` opens one block, not two
            TokenKind::Do if loop_header => loop_header = false,
            kind if opens_block(tokens, position) => {
                depth += 1;
                loop_header = matches!(kind, TokenKind::While | TokenKind::Until | TokenKind::For);
            }
            _ => {}
        }
        position += 1;
    }
}

/// Index just past the `end` closing the declaration that starts at `start`
fn skip_declaration(tokens: &[Token], start: usize) -> Result<usize, Failure> {
    let keyword = if matches!(
        tokens[start].kind,
        TokenKind::Private | TokenKind::Protected | TokenKind::Public
    ) {
        start + 1
    } else {
        start
    };

    if tokens[keyword].kind == TokenKind::Type {
        return scan_statement(tokens, keyword);
    }

    let mut position = keyword + 1;
    loop {
        position = scan_statement(tokens, position)?;
        match tokens[position].kind {
            TokenKind::End => return Ok(position + 1),
            TokenKind::Eof => return Err(Failure::new("Expected `end`", position)),
            _ => position += 1,
        }
    }
}

fn starts_annotation(tokens: &[Token], index: usize) -> bool {
    tokens
        .get(index)
        .map_or(false, |t| t.kind == TokenKind::Colon || t.is_capitalized_symbol())
}

fn visibility_of(kind: TokenKind) -> Option<Visibility> {
    match kind {
        TokenKind::Private => Some(Visibility::Private),
        TokenKind::Protected => Some(Visibility::Protected),
        TokenKind::Public => Some(Visibility::Public),
        _ => None,
    }
}

fn visibility_keyword<'a>() -> TokenParser<'a, Visibility> {
    satisfy::<[Token], _>("visibility", |t: &Token| visibility_of(t.kind).is_some())
        .map(|t| visibility_of(t.kind).unwrap_or_default())
}

/// Newline, `;` or end of input, not consumed
fn line_end<'a>() -> TokenParser<'a, ()> {
    lookahead(choice(vec![
        token(TokenKind::Newline),
        token(TokenKind::Semicolon),
        token(TokenKind::Eof),
    ]))
    .map(|_| ())
    .label("newline")
}

fn constant_path<'a>() -> TokenParser<'a, String> {
    token(TokenKind::Constant)
        .then(token(TokenKind::ColonColon).skip_then(token(TokenKind::Constant)).many())
        .map(|(head, tail)| {
            let mut name = head.text;
            for segment in tail {
                name.push_str("::");
                name.push_str(&segment.text);
            }
            name
        })
        .label("constant name")
}

/// The colon contract: nothing between the preceding token and the colon,
/// at least one space between the colon and the type
pub fn annotation<'a>() -> TokenParser<'a, Annotation> {
    let spaced = type_expr();
    let glued = glued_type_expr();

    Parser::new(move |input: &[Token], position| {
        let Some(colon) = input.get(position) else {
            return Err(Failure::new("Expected `:`", position));
        };
        let ty = if colon.kind == TokenKind::Colon {
            spaced.parse(input, position + 1)?
        } else if colon.is_capitalized_symbol() {
            glued.parse(input, position)?
        } else {
            return Err(Failure::new("Expected `:`", position));
        };

        let preceding = position.checked_sub(1).and_then(|index| input.get(index));
        let kind = if preceding.map_or(false, |previous| !previous.touches(colon)) {
            Some(ColonSpacingKind::SpaceBeforeColon)
        } else if colon.kind == TokenKind::Symbol
            || input.get(position + 1).map_or(false, |next| colon.touches(next))
        {
            Some(ColonSpacingKind::MissingSpaceAfterColon)
        } else {
            None
        };

        let end = input.get(ty.position - 1).map_or(colon.end, |last| last.end);
        Ok(Success {
            value: Annotation {
                ty: ty.value,
                span: Span::new(colon.start, end),
                location: colon.location(),
                spacing: kind.map(|kind| ParseError::colon_spacing(kind, colon.location())),
            },
            position: ty.position,
        })
    })
}

const OPERATOR_METHODS: &[TokenKind] = &[
    TokenKind::EqualEqual,
    TokenKind::NotEqual,
    TokenKind::Match,
    TokenKind::Spaceship,
    TokenKind::Less,
    TokenKind::Greater,
    TokenKind::LessEqual,
    TokenKind::GreaterEqual,
    TokenKind::Plus,
    TokenKind::Minus,
    TokenKind::Star,
    TokenKind::StarStar,
    TokenKind::Slash,
    TokenKind::Percent,
    TokenKind::Bang,
    TokenKind::Tilde,
    TokenKind::Caret,
    TokenKind::Pipe,
    TokenKind::Ampersand,
];

/// A method or member name: an identifier (with a `?`, `!` or setter `=`
/// glued on), a constant, an operator, or `[]`/`[]=`
pub fn method_name<'a>() -> TokenParser<'a, (String, Location)> {
    Parser::new(|input: &[Token], position| {
        let Some(first) = input.get(position) else {
            return Err(Failure::new("Expected method name", position));
        };
        let glued = |offset: usize, kinds: &[TokenKind]| {
            let previous = &input[position + offset - 1];
            input
                .get(position + offset)
                .filter(|next| kinds.contains(&next.kind) && previous.touches(next))
        };
        let done = |name: String, length: usize| -> ParseResult<(String, Location)> {
            Ok(Success {
                value: (name, first.location()),
                position: position + length,
            })
        };

        match first.kind {
            TokenKind::Identifier if !first.text.ends_with(['?', '!']) => {
                match glued(1, &[TokenKind::Question, TokenKind::Bang, TokenKind::Equal]) {
                    Some(suffix) => done(format!("{}{}", first.text, suffix.text), 2),
                    None => done(first.text.clone(), 1),
                }
            }
            TokenKind::Identifier | TokenKind::Constant => done(first.text.clone(), 1),
            TokenKind::LeftBracket => match glued(1, &[TokenKind::RightBracket]) {
                Some(_) if glued(2, &[TokenKind::Equal]).is_some() => done("[]=".to_string(), 3),
                Some(_) => done("[]".to_string(), 2),
                None => Err(Failure::new("Expected method name", position)),
            },
            kind if OPERATOR_METHODS.contains(&kind) => done(first.text.clone(), 1),
            _ => Err(Failure::new("Expected method name", position)),
        }
    })
}

/// Another name right after the method name means a space inside the name
fn no_embedded_space<'a>() -> TokenParser<'a, ()> {
    Parser::new(|input: &[Token], position| match input.get(position) {
        Some(next) if matches!(next.kind, TokenKind::Identifier | TokenKind::Constant) => {
            Err(Failure::new("Method name must not contain whitespace", position))
        }
        _ => Ok(Success { value: (), position }),
    })
}

#[derive(Clone, Copy)]
struct Grammar<'a> {
    source: &'a str,
}

impl<'a> Grammar<'a> {
    fn text(self, span: Span) -> String {
        span.slice(self.source).to_string()
    }

    fn declaration(self) -> TokenParser<'a, Parsed<Declaration>> {
        choice(vec![
            self.method_def(),
            self.class_decl(),
            self.module_decl(),
            self.type_alias(),
            self.interface_decl(),
        ])
    }

    fn method_def(self) -> TokenParser<'a, Parsed<Declaration>> {
        let prefix = optional(visibility_keyword());
        let def = token(TokenKind::Def);
        let singleton = optional(token(TokenKind::SelfKw).then_skip(token(TokenKind::Dot)));
        let name = method_name().then_skip(no_embedded_space());
        let params = self.parameter_list();
        let return_annotation = annotation();
        let header_end = line_end().label("newline after method signature");
        let body = self.method_body();

        Parser::new(move |input: &[Token], start| {
            let visibility = prefix.parse(input, start)?;
            let def_token = def.parse(input, visibility.position)?;
            let singleton = singleton.parse(input, def_token.position)?;
            let parsed_name = name.parse(input, singleton.position)?;
            let (name, name_location) = parsed_name.value;
            let mut position = parsed_name.position;
            let mut errors = Vec::new();

            let params = if input.get(position).map_or(false, |t| t.kind == TokenKind::LeftParen) {
                let parsed = params.parse(input, position)?;
                position = parsed.position;
                errors.extend(parsed.value.errors);
                parsed.value.value
            } else {
                Vec::new()
            };

            let return_slot = if starts_annotation(input, position) {
                let parsed = return_annotation.parse(input, position)?;
                position = parsed.position;
                let (slot, spacing) = parsed.value.into_slot(SlotKind::Return);
                errors.extend(spacing);
                slot
            } else {
                TypeSlot::unannotated(SlotKind::Return, name_location)
            };

            let header = header_end.parse(input, position)?;
            let body = body.parse(input, header.position)?;
            let end_token = &input[body.position - 1];

            let first = &input[start];
            let method = MethodDef {
                name,
                params,
                return_slot,
                body: body.value,
                visibility: visibility.value.unwrap_or_default(),
                singleton: singleton.value.is_some(),
                span: Span::new(first.start, end_token.end),
                location: first.location(),
            };
            Ok(Success {
                value: Parsed {
                    value: Declaration::Method(method),
                    errors,
                },
                position: body.position,
            })
        })
    }

    /// `( param, ... )`
    fn parameter_list(self) -> TokenParser<'a, Parsed<Vec<Parameter>>> {
        let open = token(TokenKind::LeftParen);
        let parameter = self.parameter();

        Parser::new(move |input: &[Token], start| {
            let mut position = open.parse(input, start)?.position;
            let mut params = Vec::new();
            let mut errors = Vec::new();

            if input.get(position).map_or(false, |t| t.kind == TokenKind::RightParen) {
                return Ok(Success {
                    value: Parsed::clean(params),
                    position: position + 1,
                });
            }

            loop {
                let parsed = parameter.parse(input, position)?;
                params.extend(parsed.value.value);
                errors.extend(parsed.value.errors);
                position = parsed.position;

                match input.get(position).map(|t| t.kind) {
                    Some(TokenKind::Comma) => position += 1,
                    Some(TokenKind::RightParen) => {
                        return Ok(Success {
                            value: Parsed { value: params, errors },
                            position: position + 1,
                        })
                    }
                    _ => return Err(Failure::new("Expected `,` or `)`", position)),
                }
            }
        })
    }

    /// One parameter, or every member of a keyword group
    fn parameter(self) -> TokenParser<'a, Parsed<Vec<Parameter>>> {
        self.keyword_group().or(self.single_parameter().map(|parsed| Parsed {
            value: vec![parsed.value],
            errors: parsed.errors,
        }))
    }

    fn single_parameter(self) -> TokenParser<'a, Parsed<Parameter>> {
        let name = token(TokenKind::Identifier);
        let colon_annotation = annotation();
        let default = token(TokenKind::Equal).skip_then(skip_default());
        let grammar = self;

        Parser::new(move |input: &[Token], start| {
            let (mut kind, mut position) = match input.get(start).map(|t| t.kind) {
                Some(TokenKind::Star) => (ParameterKind::Rest, start + 1),
                Some(TokenKind::StarStar) => (ParameterKind::KeyRest, start + 1),
                Some(TokenKind::Ampersand) => (ParameterKind::Block, start + 1),
                _ => (ParameterKind::Required, start),
            };

            let (param_name, location) = match name.parse(input, position) {
                Ok(parsed) => {
                    position = parsed.position;
                    (parsed.value.text.clone(), parsed.value.location())
                }
                // bare `*`, `**` and `&` forward their arguments
                Err(_) if kind != ParameterKind::Required => (String::new(), input[start].location()),
                Err(failure) => return Err(Failure::new("Expected parameter name", failure.position)),
            };

            let mut errors = Vec::new();
            let slot = if starts_annotation(input, position) {
                let parsed = colon_annotation.parse(input, position)?;
                position = parsed.position;
                let (slot, spacing) = parsed.value.into_slot(SlotKind::Parameter);
                errors.extend(spacing);
                slot
            } else {
                TypeSlot::unannotated(SlotKind::Parameter, location)
            };

            let mut default_value = None;
            if kind == ParameterKind::Required
                && input.get(position).map_or(false, |t| t.kind == TokenKind::Equal)
            {
                let parsed = default.parse(input, position)?;
                default_value = Some(grammar.text(parsed.value));
                position = parsed.position;
                kind = ParameterKind::Optional;
            }

            let span = Span::new(input[start].start, input[position - 1].end);
            Ok(Success {
                value: Parsed {
                    value: Parameter {
                        name: param_name,
                        slot,
                        default_value,
                        kind,
                        interface_ref: OnceCell::new(),
                        group_span: None,
                        span,
                    },
                    errors,
                },
                position,
            })
        })
    }

    /// `{ name[: Type][= default], ... }[: Interface]`
    fn keyword_group(self) -> TokenParser<'a, Parsed<Vec<Parameter>>> {
        let open = token(TokenKind::LeftBrace);
        let member = self.single_parameter();
        let interface_annotation = annotation();

        Parser::new(move |input: &[Token], start| {
            let mut position = open.parse(input, start)?.position;
            let mut members = Vec::new();
            let mut errors = Vec::new();

            loop {
                let parsed = member.parse(input, position)?;
                if parsed.value.value.kind != ParameterKind::Required
                    && parsed.value.value.kind != ParameterKind::Optional
                {
                    return Err(Failure::new("Expected keyword parameter", position));
                }
                members.push(parsed.value.value);
                errors.extend(parsed.value.errors);
                position = parsed.position;

                match input.get(position).map(|t| t.kind) {
                    Some(TokenKind::Comma) => position += 1,
                    Some(TokenKind::RightBrace) => {
                        position += 1;
                        break;
                    }
                    _ => return Err(Failure::new("Expected `,` or `}`", position)),
                }
            }

            let interface = if starts_annotation(input, position) {
                let parsed = interface_annotation.parse(input, position)?;
                position = parsed.position;
                errors.extend(parsed.value.spacing);
                Some(parsed.value.ty)
            } else {
                None
            };

            let group_span = Span::new(input[start].start, input[position - 1].end);
            for member in &mut members {
                member.kind = ParameterKind::Keyword;
                member.group_span = Some(group_span);
                if let Some(interface) = &interface {
                    member.set_interface_ref(interface.clone());
                }
            }

            Ok(Success {
                value: Parsed {
                    value: members,
                    errors,
                },
                position,
            })
        })
    }

    /// Statements up to and including the matching `end`
    fn method_body(self) -> TokenParser<'a, MethodBody> {
        let source = self.source;

        Parser::new(move |input: &[Token], start| {
            let mut statements = Vec::new();
            let mut position = start;

            loop {
                let Some(current) = input.get(position) else {
                    return Err(Failure::new("Expected `end`", position));
                };
                match current.kind {
                    kind if is_terminator(kind) => position += 1,
                    TokenKind::End => break,
                    TokenKind::Eof => return Err(Failure::new("Expected `end`", position)),
                    _ => {
                        let statement_end = scan_statement(input, position)?;
                        let line: Range<usize> = position..statement_end;
                        statements.push(parse_statement(&input[line], source));
                        position = statement_end;
                    }
                }
            }

            let body_start = input
                .get(start.saturating_sub(1))
                .map_or(0, |previous| previous.end);
            Ok(Success {
                value: MethodBody {
                    statements,
                    span: Span::new(body_start, input[position].start),
                },
                position: position + 1,
            })
        })
    }

    fn class_decl(self) -> TokenParser<'a, Parsed<Declaration>> {
        let header = token(TokenKind::Class)
            .then(constant_path())
            .then(optional(token(TokenKind::Less).skip_then(constant_path())))
            .then_skip(line_end());
        let body = self.container_body(true);

        Parser::new(move |input: &[Token], start| {
            let header = header.parse(input, start)?;
            let ((class_token, name), superclass) = header.value;
            let body = body.parse(input, header.position)?;
            let (declarations, instance_vars, errors) = body.value;
            let end_token = &input[body.position - 1];

            debug!("Parsed class {} with {} members", name, declarations.len());
            Ok(Success {
                value: Parsed {
                    value: Declaration::Class(ClassDecl {
                        name,
                        superclass,
                        body: declarations,
                        instance_vars,
                        span: Span::new(class_token.start, end_token.end),
                        location: class_token.location(),
                    }),
                    errors,
                },
                position: body.position,
            })
        })
    }

    fn module_decl(self) -> TokenParser<'a, Parsed<Declaration>> {
        let header = token(TokenKind::Module).then(constant_path()).then_skip(line_end());
        let body = self.container_body(false);

        Parser::new(move |input: &[Token], start| {
            let header = header.parse(input, start)?;
            let (module_token, name) = header.value;
            let body = body.parse(input, header.position)?;
            let (declarations, _, errors) = body.value;
            let end_token = &input[body.position - 1];

            Ok(Success {
                value: Parsed {
                    value: Declaration::Module(ModuleDecl {
                        name,
                        body: declarations,
                        span: Span::new(module_token.start, end_token.end),
                        location: module_token.location(),
                    }),
                    errors,
                },
                position: body.position,
            })
        })
    }

    /// Class or module body through its `end`. Nested declarations that fail
    /// are recorded and skipped so the rest of the body survives.
    #[allow(clippy::type_complexity)]
    fn container_body(
        self,
        allow_instance_vars: bool,
    ) -> TokenParser<'a, (Vec<Declaration>, Vec<InstanceVarDecl>, Vec<ParseError>)> {
        let ivar_annotation = annotation();
        let grammar = self;

        Parser::new(move |input: &[Token], start| {
            let declaration = grammar.declaration();
            let mut declarations = Vec::new();
            let mut instance_vars = Vec::new();
            let mut errors = Vec::new();
            let mut default_visibility = Visibility::Public;
            let mut position = start;

            loop {
                let Some(current) = input.get(position) else {
                    return Err(Failure::new("Expected `end`", position));
                };
                let next_kind = input.get(position + 1).map(|t| t.kind);

                match current.kind {
                    kind if is_terminator(kind) => position += 1,
                    TokenKind::End => return Ok(Success {
                        value: (declarations, instance_vars, errors),
                        position: position + 1,
                    }),
                    TokenKind::Eof => return Err(Failure::new("Expected `end`", position)),
                    TokenKind::InstanceVar if allow_instance_vars && starts_annotation(input, position + 1) => {
                        match ivar_annotation.parse(input, position + 1) {
                            Ok(parsed) => {
                                let annotation = parsed.value;
                                errors.extend(annotation.spacing);
                                instance_vars.push(InstanceVarDecl {
                                    name: current.text.trim_start_matches('@').to_string(),
                                    ty: annotation.ty,
                                    span: Span::new(current.start, annotation.span.end),
                                    location: current.location(),
                                });
                                position = parsed.position;
                            }
                            Err(failure) => {
                                errors.push(syntax_error(input, &failure));
                                position = scan_statement(input, position)?;
                            }
                        }
                    }
                    kind if visibility_of(kind).is_some()
                        && next_kind.map_or(true, is_terminator) =>
                    {
                        default_visibility = visibility_of(kind).unwrap_or_default();
                        position += 1;
                    }
                    _ if is_declaration_start(input, position) => match declaration.parse(input, position) {
                        Ok(parsed) => {
                            let mut nested = parsed.value.value;
                            if let Declaration::Method(method) = &mut nested {
                                if visibility_of(current.kind).is_none() {
                                    method.visibility = default_visibility;
                                }
                            }
                            errors.extend(parsed.value.errors);
                            declarations.push(nested);
                            position = parsed.position;
                        }
                        Err(failure) => {
                            let error = syntax_error(input, &failure);
                            debug!("Skipping nested declaration: {}", error);
                            errors.push(error);
                            position = skip_declaration(input, position)?;
                        }
                    },
                    _ => position = scan_statement(input, position)?,
                }
            }
        })
    }

    fn type_alias(self) -> TokenParser<'a, Parsed<Declaration>> {
        let alias = token(TokenKind::Type)
            .then(token(TokenKind::Constant))
            .then_skip(token(TokenKind::Equal))
            .then(type_expr())
            .then_skip(line_end());

        Parser::new(move |input: &[Token], start| {
            let parsed = alias.parse(input, start)?;
            let ((type_token, name), definition) = parsed.value;
            let end = input[parsed.position - 1].end;
            Ok(Success {
                value: Parsed::clean(Declaration::TypeAlias(TypeAlias {
                    name: name.text,
                    definition,
                    span: Span::new(type_token.start, end),
                    location: type_token.location(),
                })),
                position: parsed.position,
            })
        })
    }

    fn interface_decl(self) -> TokenParser<'a, Parsed<Declaration>> {
        let header = token(TokenKind::Interface).then(constant_path()).then_skip(line_end());
        let member = method_name().then(annotation()).then_skip(line_end().or(lookahead(token(TokenKind::End)).map(|_| ())));

        Parser::new(move |input: &[Token], start| {
            let header = header.parse(input, start)?;
            let (interface_token, name) = header.value;
            let mut position = header.position;
            let mut members = Vec::new();
            let mut errors = Vec::new();

            loop {
                match input.get(position).map(|t| t.kind) {
                    Some(kind) if is_terminator(kind) => position += 1,
                    Some(TokenKind::End) => break,
                    Some(_) => {
                        let parsed = member.parse(input, position)?;
                        let ((member_name, location), annotation) = parsed.value;
                        errors.extend(annotation.spacing);
                        members.push(InterfaceMember {
                            name: member_name,
                            type_signature: annotation.ty,
                            location,
                        });
                        position = parsed.position;
                    }
                    None => return Err(Failure::new("Expected `end`", position)),
                }
            }

            let end_token = &input[position];
            Ok(Success {
                value: Parsed {
                    value: Declaration::Interface(Interface {
                        name,
                        members,
                        span: Span::new(interface_token.start, end_token.end),
                        location: interface_token.location(),
                    }),
                    errors,
                },
                position: position + 1,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Expr;

    fn parse_ok(source: &str) -> Program {
        let (program, errors) = parse_to_ir(source);
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
        program
    }

    fn method(program: &Program, index: usize) -> &MethodDef {
        match &program.declarations[index] {
            Declaration::Method(method) => method,
            other => panic!("expected method, got {other:?}"),
        }
    }

    #[test]
    fn test_annotated_method() {
        let program = parse_ok("def add(a: Integer, b: Integer): Integer\n  a + b\nend\n");
        let add = method(&program, 0);
        assert_eq!(add.name, "add");
        assert_eq!(add.params.len(), 2);
        assert_eq!(add.params[1].type_annotation(), Some(&TypeExpr::simple("Integer")));
        assert_eq!(add.return_type(), Some(&TypeExpr::simple("Integer")));
        assert_eq!(add.body.statements.len(), 1);
        assert!(matches!(add.body.statements[0], Expr::Binary { .. }));
        assert_eq!(add.location, Location::new(1, 1));
    }

    #[test]
    fn test_parameter_kinds() {
        let program = parse_ok("def f(a, b: String = \"x\", *rest, **opts, &blk: Proc)\nend");
        let kinds: Vec<_> = method(&program, 0).params.iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ParameterKind::Required,
                ParameterKind::Optional,
                ParameterKind::Rest,
                ParameterKind::KeyRest,
                ParameterKind::Block,
            ]
        );
        assert_eq!(method(&program, 0).params[1].default_value.as_deref(), Some("\"x\""));
    }

    #[test]
    fn test_keyword_group_with_interface() {
        let program = parse_ok("def connect({ host: String, port: Integer = 80 }: Options)\nend");
        let params = &method(&program, 0).params;
        assert_eq!(params.len(), 2);
        for param in params {
            assert_eq!(param.kind, ParameterKind::Keyword);
            assert_eq!(param.interface_ref(), Some(&TypeExpr::simple("Options")));
        }
        assert_eq!(params[1].default_value.as_deref(), Some("80"));
        assert_eq!(params[0].group_span, params[1].group_span);
    }

    #[test]
    fn test_colon_spacing() {
        let (program, errors) = parse_to_ir("def f() : Integer\n  1\nend\n");
        assert_eq!(program.declarations.len(), 1);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code(), "TR1003");
        assert_eq!(
            errors[0],
            ParseError::colon_spacing(ColonSpacingKind::SpaceBeforeColon, Location::new(1, 9))
        );

        let (program, errors) = parse_to_ir("def f():Integer\n  1\nend\n");
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            errors[0],
            ParseError::ColonSpacing {
                kind: ColonSpacingKind::MissingSpaceAfterColon,
                ..
            }
        ));
        assert_eq!(method(&program, 0).return_type(), Some(&TypeExpr::simple("Integer")));

        let (_, errors) = parse_to_ir("def g(x:String)\nend\n");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code(), "TR1003");
    }

    #[test]
    fn test_method_name_with_space() {
        let (program, errors) = parse_to_ir("def my method\nend\n");
        assert!(program.declarations.is_empty());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message().contains("whitespace"));
        assert_eq!(errors[0].location(), Location::new(1, 8));
    }

    #[test]
    fn test_special_method_names() {
        let program = parse_ok("def valid?(x): Boolean\nend\ndef name=(v)\nend\ndef ==(other)\nend\ndef [](i)\nend\ndef self.build\nend\n");
        let names: Vec<_> = program.declarations.iter().map(Declaration::name).collect();
        assert_eq!(names, vec!["valid?", "name=", "==", "[]", "build"]);
        assert!(method(&program, 4).singleton);
    }

    #[test]
    fn test_class_body() {
        let source = "class User < Base\n  @name: String\n  attr_reader :name\n\n  def greet: String\n    \"hi\"\n  end\n\n  private\n\n  def secret\n    if true\n      1\n    end\n  end\nend\n";
        let program = parse_ok(source);
        let Declaration::Class(class) = &program.declarations[0] else {
            panic!("expected class");
        };
        assert_eq!(class.name, "User");
        assert_eq!(class.superclass.as_deref(), Some("Base"));
        assert_eq!(class.instance_vars.len(), 1);
        assert_eq!(class.instance_vars[0].ty, TypeExpr::simple("String"));
        assert_eq!(class.body.len(), 2);
        let Declaration::Method(secret) = &class.body[1] else {
            panic!("expected method");
        };
        assert_eq!(secret.visibility, Visibility::Private);
        assert_eq!(secret.body.statements.len(), 1);
    }

    #[test]
    fn test_nested_failure_keeps_class() {
        let source = "class A\n  def broken(: Integer)\n  end\n  def fine: Integer\n    1\n  end\nend\n";
        let (program, errors) = parse_to_ir(source);
        assert_eq!(errors.len(), 1);
        let Declaration::Class(class) = &program.declarations[0] else {
            panic!("expected class");
        };
        assert_eq!(class.body.len(), 1);
        assert_eq!(class.body[0].name(), "fine");
    }

    #[test]
    fn test_alias_and_interface() {
        let program = parse_ok("type Id = Integer | String\ninterface Named\n  name: String\n  rename: (String) -> void\nend\n");
        assert!(matches!(&program.declarations[0], Declaration::TypeAlias(alias) if alias.name == "Id"));
        let Declaration::Interface(interface) = &program.declarations[1] else {
            panic!("expected interface");
        };
        assert_eq!(interface.members.len(), 2);
        assert_eq!(interface.members[1].type_signature.to_string(), "(String) -> void");
    }

    #[test]
    fn test_resynchronization_yields_one_error() {
        let source = "def one: Integer\n  1\nend\n\ndef two(a: Integer,: String)\n  2\nend\n\ntype Name = String\n\ndef three\n  3\nend\n";
        let (program, errors) = parse_to_ir(source);
        assert_eq!(errors.len(), 1, "{errors:?}");
        assert_eq!(errors[0].location().line, 5);
        let names: Vec<_> = program.declarations.iter().map(Declaration::name).collect();
        assert_eq!(names, vec!["one", "Name", "three"]);
    }

    #[test]
    fn test_top_level_code_is_skipped() {
        let program = parse_ok("require \"json\"\nputs 1 + 2\n\ndef main\n  run\nend\nmain\n");
        assert_eq!(program.declarations.len(), 1);
    }

    #[test]
    fn test_nested_blocks_in_body() {
        let source = "def f(xs)\n  total = 0\n  xs.each do |x|\n    total += x if x > 0\n  end\n  while total > 10 do\n    total -= 1\n  end\n  total\nend\n";
        let program = parse_ok(source);
        let body = &method(&program, 0).body;
        assert_eq!(body.statements.len(), 4);
        assert!(matches!(body.statements[1], Expr::Opaque { .. }));
        assert_eq!(body.statements[3], Expr::Variable("total".into()));
    }

    #[test]
    fn test_unterminated_method() {
        let (program, errors) = parse_to_ir("def f\n  1\n");
        assert!(program.declarations.is_empty());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message().contains("end"));
    }

    #[test]
    fn test_reserved_words_as_names() {
        let program = parse_ok("def f(type: String): String\n  type\nend\n");
        let f = method(&program, 0);
        assert_eq!(f.params[0].name, "type");
        assert_eq!(f.params[0].type_annotation(), Some(&TypeExpr::simple("String")));
        assert_eq!(f.body.statements[0], Expr::Variable("type".into()));

        let program = parse_ok("def g({ type: String, class: Integer })\nend\n");
        let names: Vec<_> = method(&program, 0).params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["type", "class"]);

        let program = parse_ok("def f: Integer\n  interface = 1\n  interface\nend\n");
        assert_eq!(method(&program, 0).body.statements.len(), 2);
    }

    #[test]
    fn test_label_does_not_open_block() {
        let program = parse_ok("def link: String\n  tag(\"a\", class: \"btn\")\nend\n\ndef next_one: Integer\n  1\nend\n");
        let names: Vec<_> = program.declarations.iter().map(Declaration::name).collect();
        assert_eq!(names, vec!["link", "next_one"]);
        assert_eq!(method(&program, 0).body.statements.len(), 1);
    }

    #[test]
    fn test_reserved_method_names_in_class() {
        let source = "class Shape\n  def type: String\n    \"shape\"\n  end\n\n  def class\n    1\n  end\nend\n\ninterface Kind\n  type: String\n  end: Integer\nend\n";
        let program = parse_ok(source);
        let Declaration::Class(class) = &program.declarations[0] else {
            panic!("expected class");
        };
        let names: Vec<_> = class.body.iter().map(Declaration::name).collect();
        assert_eq!(names, vec!["type", "class"]);

        let Declaration::Interface(kind) = &program.declarations[1] else {
            panic!("expected interface");
        };
        let members: Vec<_> = kind.members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(members, vec!["type", "end"]);
    }

    #[test]
    fn test_annotation_span_covers_type() {
        let source = "def f(a: Array<String>): Integer\nend\n";
        let program = parse_ok(source);
        let span = method(&program, 0).params[0].slot.annotation_span.unwrap();
        assert_eq!(span.slice(source), ": Array<String>");
    }
}
