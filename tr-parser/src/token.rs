//! Token definitions

use crate::span::{Location, Span};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    // Literals and names
    Integer,
    Float,
    String,
    Symbol,
    Identifier,
    Constant,
    InstanceVar,
    ClassVar,
    GlobalVar,

    // Keywords
    Def,
    End,
    Class,
    Module,
    Type,
    Interface,
    Private,
    Protected,
    Public,
    If,
    Unless,
    While,
    Until,
    Case,
    Begin,
    Do,
    For,
    Then,
    Else,
    Elsif,
    When,
    Rescue,
    Ensure,
    Return,
    Yield,
    Nil,
    True,
    False,
    SelfKw,
    And,
    Or,
    Not,

    // Delimiters
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,
    Comma,
    Dot,
    DotDot,
    Colon,
    ColonColon,
    Semicolon,

    // Operators
    Arrow,
    FatArrow,
    Equal,
    OpAssign,
    EqualEqual,
    NotEqual,
    Match,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    Spaceship,
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Percent,
    Pipe,
    PipePipe,
    Ampersand,
    AmpAmp,
    Bang,
    Question,
    Tilde,
    Caret,

    // Layout
    Newline,
    Unknown,
    Eof,
}

impl TokenKind {
    /// Keywords that can start a top-level declaration
    pub fn starts_declaration(self) -> bool {
        matches!(
            self,
            TokenKind::Def
                | TokenKind::Class
                | TokenKind::Module
                | TokenKind::Type
                | TokenKind::Interface
                | TokenKind::Private
                | TokenKind::Protected
                | TokenKind::Public
        )
    }

    /// Reserved only where they start a declaration; plain names elsewhere
    pub fn is_contextual(self) -> bool {
        matches!(
            self,
            TokenKind::Type | TokenKind::Interface | TokenKind::Private | TokenKind::Protected | TokenKind::Public
        )
    }

    pub fn is_keyword(self) -> bool {
        matches!(
            self,
            TokenKind::Def
                | TokenKind::End
                | TokenKind::Class
                | TokenKind::Module
                | TokenKind::Type
                | TokenKind::Interface
                | TokenKind::Private
                | TokenKind::Protected
                | TokenKind::Public
                | TokenKind::If
                | TokenKind::Unless
                | TokenKind::While
                | TokenKind::Until
                | TokenKind::Case
                | TokenKind::Begin
                | TokenKind::Do
                | TokenKind::For
                | TokenKind::Then
                | TokenKind::Else
                | TokenKind::Elsif
                | TokenKind::When
                | TokenKind::Rescue
                | TokenKind::Ensure
                | TokenKind::Return
                | TokenKind::Yield
                | TokenKind::Nil
                | TokenKind::True
                | TokenKind::False
                | TokenKind::SelfKw
                | TokenKind::And
                | TokenKind::Or
                | TokenKind::Not
        )
    }

    /// A line ending in one of these continues on the next line
    pub fn continues_line(self) -> bool {
        matches!(
            self,
            TokenKind::Comma
                | TokenKind::Dot
                | TokenKind::Plus
                | TokenKind::Minus
                | TokenKind::Star
                | TokenKind::StarStar
                | TokenKind::Slash
                | TokenKind::Percent
                | TokenKind::AmpAmp
                | TokenKind::PipePipe
                | TokenKind::Equal
                | TokenKind::OpAssign
                | TokenKind::EqualEqual
                | TokenKind::NotEqual
                | TokenKind::FatArrow
                | TokenKind::And
                | TokenKind::Or
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::Integer => "integer",
            TokenKind::Float => "float",
            TokenKind::String => "string",
            TokenKind::Symbol => "symbol",
            TokenKind::Identifier => "identifier",
            TokenKind::Constant => "constant",
            TokenKind::InstanceVar => "instance variable",
            TokenKind::ClassVar => "class variable",
            TokenKind::GlobalVar => "global variable",
            TokenKind::Def => "def",
            TokenKind::End => "end",
            TokenKind::Class => "class",
            TokenKind::Module => "module",
            TokenKind::Type => "type",
            TokenKind::Interface => "interface",
            TokenKind::Private => "private",
            TokenKind::Protected => "protected",
            TokenKind::Public => "public",
            TokenKind::If => "if",
            TokenKind::Unless => "unless",
            TokenKind::While => "while",
            TokenKind::Until => "until",
            TokenKind::Case => "case",
            TokenKind::Begin => "begin",
            TokenKind::Do => "do",
            TokenKind::For => "for",
            TokenKind::Then => "then",
            TokenKind::Else => "else",
            TokenKind::Elsif => "elsif",
            TokenKind::When => "when",
            TokenKind::Rescue => "rescue",
            TokenKind::Ensure => "ensure",
            TokenKind::Return => "return",
            TokenKind::Yield => "yield",
            TokenKind::Nil => "nil",
            TokenKind::True => "true",
            TokenKind::False => "false",
            TokenKind::SelfKw => "self",
            TokenKind::And => "and",
            TokenKind::Or => "or",
            TokenKind::Not => "not",
            TokenKind::LeftParen => "(",
            TokenKind::RightParen => ")",
            TokenKind::LeftBracket => "[",
            TokenKind::RightBracket => "]",
            TokenKind::LeftBrace => "{",
            TokenKind::RightBrace => "}",
            TokenKind::Comma => ",",
            TokenKind::Dot => ".",
            TokenKind::DotDot => "..",
            TokenKind::Colon => ":",
            TokenKind::ColonColon => "::",
            TokenKind::Semicolon => ";",
            TokenKind::Arrow => "->",
            TokenKind::FatArrow => "=>",
            TokenKind::Equal => "=",
            TokenKind::OpAssign => "compound assignment",
            TokenKind::EqualEqual => "==",
            TokenKind::NotEqual => "!=",
            TokenKind::Match => "=~",
            TokenKind::Less => "<",
            TokenKind::Greater => ">",
            TokenKind::LessEqual => "<=",
            TokenKind::GreaterEqual => ">=",
            TokenKind::Spaceship => "<=>",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::StarStar => "**",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Pipe => "|",
            TokenKind::PipePipe => "||",
            TokenKind::Ampersand => "&",
            TokenKind::AmpAmp => "&&",
            TokenKind::Bang => "!",
            TokenKind::Question => "?",
            TokenKind::Tilde => "~",
            TokenKind::Caret => "^",
            TokenKind::Newline => "newline",
            TokenKind::Unknown => "unknown character",
            TokenKind::Eof => "end of input",
        };
        f.write_str(text)
    }
}

/// Map reserved words to their token kind
pub fn keyword_kind(word: &str) -> Option<TokenKind> {
    let kind = match word {
        "def" => TokenKind::Def,
        "end" => TokenKind::End,
        "class" => TokenKind::Class,
        "module" => TokenKind::Module,
        "type" => TokenKind::Type,
        "interface" => TokenKind::Interface,
        "private" => TokenKind::Private,
        "protected" => TokenKind::Protected,
        "public" => TokenKind::Public,
        "if" => TokenKind::If,
        "unless" => TokenKind::Unless,
        "while" => TokenKind::While,
        "until" => TokenKind::Until,
        "case" => TokenKind::Case,
        "begin" => TokenKind::Begin,
        "do" => TokenKind::Do,
        "for" => TokenKind::For,
        "then" => TokenKind::Then,
        "else" => TokenKind::Else,
        "elsif" => TokenKind::Elsif,
        "when" => TokenKind::When,
        "rescue" => TokenKind::Rescue,
        "ensure" => TokenKind::Ensure,
        "return" => TokenKind::Return,
        "yield" => TokenKind::Yield,
        "nil" => TokenKind::Nil,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "self" => TokenKind::SelfKw,
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        _ => return None,
    };
    Some(kind)
}

/// A lexed token. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: u32,
    pub column: u32,
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, location: Location, span: Span) -> Self {
        Token {
            kind,
            text: text.into(),
            line: location.line,
            column: location.column,
            start: span.start,
            end: span.end,
        }
    }

    pub fn span(&self) -> Span {
        Span::new(self.start, self.end)
    }

    pub fn location(&self) -> Location {
        Location::new(self.line, self.column)
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    /// Symbol-like token whose name starts with an uppercase letter (`:Integer`)
    pub fn is_capitalized_symbol(&self) -> bool {
        self.kind == TokenKind::Symbol
            && self.text.chars().nth(1).map_or(false, char::is_uppercase)
    }

    /// No whitespace between `self` and `next`
    pub fn touches(&self, next: &Token) -> bool {
        self.end == next.start
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Newline => write!(f, "newline"),
            TokenKind::Eof => write!(f, "end of input"),
            _ => write!(f, "`{}`", self.text),
        }
    }
}
