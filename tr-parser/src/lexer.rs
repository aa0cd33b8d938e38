//! Lexer
//!
//! Tokenizes source code into a stream of tokens for parsing. Whitespace is
//! dropped (adjacency is recoverable from offsets), comments are dropped,
//! and line breaks become `Newline` tokens except inside brackets or after a
//! token that continues the line.

use crate::{
    error::ParseError,
    span::{Location, Span},
    token::{keyword_kind, Token, TokenKind},
};

/// Tokens plus any lexical errors found on the way
#[derive(Debug, Clone, Default)]
pub struct LexOutput {
    pub tokens: Vec<Token>,
    pub errors: Vec<ParseError>,
}

/// Lexical analyzer
pub struct Lexer<'a> {
    source: &'a str,
    chars: Vec<(usize, char)>,
    position: usize,
    line: u32,
    column: u32,
    nesting: usize,
    tokens: Vec<Token>,
    errors: Vec<ParseError>,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given input
    pub fn new(source: &'a str) -> Self {
        Lexer {
            source,
            chars: source.char_indices().collect(),
            position: 0,
            line: 1,
            column: 1,
            nesting: 0,
            tokens: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Tokenize the entire input. The last token is always `Eof`.
    pub fn tokenize(mut self) -> LexOutput {
        loop {
            self.skip_blanks_and_comments();

            let Some(ch) = self.current_char() else {
                break;
            };

            if ch == '\n' {
                self.read_newline();
                continue;
            }

            self.next_token(ch);
        }

        let offset = self.source.len();
        let location = self.location();
        self.tokens.push(Token::new(TokenKind::Eof, "", location, Span::new(offset, offset)));

        LexOutput {
            tokens: self.tokens,
            errors: self.errors,
        }
    }

    /// Get current character
    fn current_char(&self) -> Option<char> {
        self.chars.get(self.position).map(|&(_, ch)| ch)
    }

    /// Peek at next character
    fn peek_char(&self) -> Option<char> {
        self.peek_ahead(1)
    }

    /// Peek ahead n characters without advancing
    fn peek_ahead(&self, n: usize) -> Option<char> {
        self.chars.get(self.position + n).map(|&(_, ch)| ch)
    }

    fn byte_offset(&self) -> usize {
        self.chars
            .get(self.position)
            .map_or(self.source.len(), |&(offset, _)| offset)
    }

    fn location(&self) -> Location {
        Location::new(self.line, self.column)
    }

    /// Advance to next character
    fn advance(&mut self) {
        if let Some(&(_, ch)) = self.chars.get(self.position) {
            self.position += 1;
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }

    fn advance_by(&mut self, n: usize) {
        for _ in 0..n {
            self.advance();
        }
    }

    fn skip_blanks_and_comments(&mut self) {
        loop {
            match self.current_char() {
                Some(ch) if ch.is_whitespace() && ch != '\n' => self.advance(),
                Some('\\') if self.peek_char() == Some('\n') => self.advance_by(2),
                Some('#') => {
                    while let Some(ch) = self.current_char() {
                        if ch == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn read_newline(&mut self) {
        let start = self.byte_offset();
        let location = self.location();
        self.advance();

        let suppressed = match self.tokens.last() {
            None => true,
            Some(last) => {
                last.kind == TokenKind::Newline || self.nesting > 0 || last.kind.continues_line()
            }
        };
        if !suppressed {
            self.tokens
                .push(Token::new(TokenKind::Newline, "\n", location, Span::new(start, start + 1)));
        }
    }

    fn push(&mut self, kind: TokenKind, start_position: usize, location: Location) {
        let start = self.chars[start_position].0;
        let end = self.byte_offset();
        let text = &self.source[start..end];
        self.tokens.push(Token::new(kind, text, location, Span::new(start, end)));
    }

    /// Lex one token starting at `ch`
    fn next_token(&mut self, ch: char) {
        let start = self.position;
        let location = self.location();

        let (kind, width) = match (ch, self.peek_char(), self.peek_ahead(2)) {
            ('"', _, _) | ('\'', _, _) | ('`', _, _) => {
                self.read_string(ch, location);
                return;
            }
            (c, _, _) if c.is_ascii_digit() => {
                self.read_number(location);
                return;
            }
            (c, _, _) if c.is_alphabetic() || c == '_' => {
                self.read_identifier(location);
                return;
            }
            ('@', Some('@'), _) => {
                self.advance_by(2);
                self.read_name_tail();
                self.push(TokenKind::ClassVar, start, location);
                return;
            }
            ('@', _, _) => {
                self.advance();
                self.read_name_tail();
                self.push(TokenKind::InstanceVar, start, location);
                return;
            }
            ('$', _, _) => {
                self.advance();
                self.read_name_tail();
                self.push(TokenKind::GlobalVar, start, location);
                return;
            }
            (':', Some(':'), _) => (TokenKind::ColonColon, 2),
            (':', Some('"'), _) => {
                self.advance();
                self.read_string('"', location);
                if let Some(token) = self.tokens.last_mut() {
                    token.kind = TokenKind::Symbol;
                    token.start = self.chars[start].0;
                    token.text = self.source[token.start..token.end].to_string();
                    token.column = location.column;
                }
                return;
            }
            (':', Some(c), _) if c.is_alphabetic() || c == '_' => {
                self.advance();
                self.read_name_tail();
                if matches!(self.current_char(), Some('?') | Some('!') | Some('='))
                    && self.peek_char() != Some('=')
                {
                    self.advance();
                }
                self.push(TokenKind::Symbol, start, location);
                return;
            }
            (':', _, _) => (TokenKind::Colon, 1),
            ('(', _, _) => (TokenKind::LeftParen, 1),
            (')', _, _) => (TokenKind::RightParen, 1),
            ('[', _, _) => (TokenKind::LeftBracket, 1),
            (']', _, _) => (TokenKind::RightBracket, 1),
            ('{', _, _) => (TokenKind::LeftBrace, 1),
            ('}', _, _) => (TokenKind::RightBrace, 1),
            (',', _, _) => (TokenKind::Comma, 1),
            (';', _, _) => (TokenKind::Semicolon, 1),
            ('.', Some('.'), Some('.')) => (TokenKind::DotDot, 3),
            ('.', Some('.'), _) => (TokenKind::DotDot, 2),
            ('.', _, _) => (TokenKind::Dot, 1),
            ('-', Some('>'), _) => (TokenKind::Arrow, 2),
            ('-', Some('='), _) => (TokenKind::OpAssign, 2),
            ('-', _, _) => (TokenKind::Minus, 1),
            ('+', Some('='), _) => (TokenKind::OpAssign, 2),
            ('+', _, _) => (TokenKind::Plus, 1),
            ('*', Some('*'), Some('=')) => (TokenKind::OpAssign, 3),
            ('*', Some('*'), _) => (TokenKind::StarStar, 2),
            ('*', Some('='), _) => (TokenKind::OpAssign, 2),
            ('*', _, _) => (TokenKind::Star, 1),
            ('/', Some('='), _) => (TokenKind::OpAssign, 2),
            ('/', _, _) => (TokenKind::Slash, 1),
            ('%', Some('='), _) => (TokenKind::OpAssign, 2),
            ('%', _, _) => (TokenKind::Percent, 1),
            ('=', Some('='), Some('=')) => (TokenKind::EqualEqual, 3),
            ('=', Some('='), _) => (TokenKind::EqualEqual, 2),
            ('=', Some('>'), _) => (TokenKind::FatArrow, 2),
            ('=', Some('~'), _) => (TokenKind::Match, 2),
            ('=', _, _) => (TokenKind::Equal, 1),
            ('!', Some('='), _) => (TokenKind::NotEqual, 2),
            ('!', Some('~'), _) => (TokenKind::Match, 2),
            ('!', _, _) => (TokenKind::Bang, 1),
            ('<', Some('='), Some('>')) => (TokenKind::Spaceship, 3),
            ('<', Some('='), _) => (TokenKind::LessEqual, 2),
            ('<', _, _) => (TokenKind::Less, 1),
            ('>', Some('='), _) => (TokenKind::GreaterEqual, 2),
            ('>', _, _) => (TokenKind::Greater, 1),
            ('|', Some('|'), Some('=')) => (TokenKind::OpAssign, 3),
            ('|', Some('|'), _) => (TokenKind::PipePipe, 2),
            ('|', _, _) => (TokenKind::Pipe, 1),
            ('&', Some('&'), Some('=')) => (TokenKind::OpAssign, 3),
            ('&', Some('&'), _) => (TokenKind::AmpAmp, 2),
            ('&', _, _) => (TokenKind::Ampersand, 1),
            ('?', _, _) => (TokenKind::Question, 1),
            ('~', _, _) => (TokenKind::Tilde, 1),
            ('^', _, _) => (TokenKind::Caret, 1),
            (other, _, _) => {
                self.errors
                    .push(ParseError::lexer(format!("Unexpected character: '{other}'"), location));
                (TokenKind::Unknown, 1)
            }
        };

        match kind {
            TokenKind::LeftParen | TokenKind::LeftBracket | TokenKind::LeftBrace => {
                self.nesting += 1;
            }
            TokenKind::RightParen | TokenKind::RightBracket | TokenKind::RightBrace => {
                self.nesting = self.nesting.saturating_sub(1);
            }
            _ => {}
        }

        self.advance_by(width);
        self.push(kind, start, location);
    }

    fn read_name_tail(&mut self) {
        while let Some(ch) = self.current_char() {
            if ch.is_alphanumeric() || ch == '_' {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_string(&mut self, quote: char, location: Location) {
        let start = self.position;
        self.advance(); // opening quote

        let interpolates = quote != '\'';
        let mut interpolation_depth = 0usize;

        while let Some(ch) = self.current_char() {
            match ch {
                '\\' => self.advance_by(2),
                '#' if interpolates && self.peek_char() == Some('{') => {
                    interpolation_depth += 1;
                    self.advance_by(2);
                }
                '}' if interpolation_depth > 0 => {
                    interpolation_depth -= 1;
                    self.advance();
                }
                c if c == quote && interpolation_depth == 0 => {
                    self.advance();
                    self.push(TokenKind::String, start, location);
                    return;
                }
                _ => self.advance(),
            }
        }

        self.errors
            .push(ParseError::lexer("Unterminated string literal", location));
        self.push(TokenKind::String, start, location);
    }

    fn read_number(&mut self, location: Location) {
        let start = self.position;
        let mut kind = TokenKind::Integer;

        if self.current_char() == Some('0')
            && matches!(self.peek_char(), Some('x') | Some('X') | Some('b') | Some('B') | Some('o'))
        {
            self.advance_by(2);
            while matches!(self.current_char(), Some(c) if c.is_ascii_hexdigit() || c == '_') {
                self.advance();
            }
            self.push(kind, start, location);
            return;
        }

        self.read_digits();

        // `1.5` is a float, `1.times` is a call
        if self.current_char() == Some('.') && matches!(self.peek_char(), Some(c) if c.is_ascii_digit()) {
            kind = TokenKind::Float;
            self.advance();
            self.read_digits();
        }

        if matches!(self.current_char(), Some('e') | Some('E'))
            && matches!(self.peek_char(), Some(c) if c.is_ascii_digit() || c == '-' || c == '+')
        {
            kind = TokenKind::Float;
            self.advance_by(2);
            self.read_digits();
        }

        self.push(kind, start, location);
    }

    fn read_digits(&mut self) {
        while matches!(self.current_char(), Some(c) if c.is_ascii_digit() || c == '_') {
            self.advance();
        }
    }

    fn read_identifier(&mut self, location: Location) {
        let start = self.position;
        let capitalized = self.current_char().map_or(false, char::is_uppercase);
        self.read_name_tail();

        // Predicate and bang suffixes belong to the name, but not `x!= y`
        if !capitalized
            && matches!(self.current_char(), Some('?') | Some('!'))
            && !matches!(self.peek_char(), Some('=') | Some(':'))
        {
            self.advance();
        }

        let text = &self.source[self.chars[start].0..self.byte_offset()];
        let previous = self.tokens.last().map(|t| t.kind);
        let kind = match keyword_kind(text) {
            // `obj.class`, `obj.type` are method calls, not keywords
            Some(_) if previous == Some(TokenKind::Dot) => TokenKind::Identifier,
            // `class: "btn"`, `type: String`
            Some(_) if self.at_label() => TokenKind::Identifier,
            // `def class`, but `def self.name` keeps its receiver
            Some(keyword) if previous == Some(TokenKind::Def) && keyword != TokenKind::SelfKw => {
                TokenKind::Identifier
            }
            Some(keyword) if keyword.is_contextual() && !self.opens_declaration_line(keyword) => {
                TokenKind::Identifier
            }
            Some(keyword) => keyword,
            None if capitalized => TokenKind::Constant,
            None => TokenKind::Identifier,
        };

        self.push(kind, start, location);
    }

    /// A name glued to a single `:` is a label
    fn at_label(&self) -> bool {
        self.current_char() == Some(':') && self.peek_char() != Some(':')
    }

    /// `type` and `interface` need a constant after them, visibility words a
    /// name or the end of the line. Either way they must lead the statement.
    fn opens_declaration_line(&self, keyword: TokenKind) -> bool {
        let leads = self
            .tokens
            .last()
            .map_or(true, |t| matches!(t.kind, TokenKind::Newline | TokenKind::Semicolon));
        if !leads {
            return false;
        }

        let mut offset = 0;
        while matches!(self.peek_ahead(offset), Some(' ') | Some('\t')) {
            offset += 1;
        }
        let next = self.peek_ahead(offset);
        match keyword {
            TokenKind::Type | TokenKind::Interface => offset > 0 && next.map_or(false, char::is_uppercase),
            _ => match next {
                None | Some('\n') | Some('#') | Some(';') => true,
                Some(c) => offset > 0 && (c.is_lowercase() || c == '_'),
            },
        }
    }
}

/// Tokenize a whole source string
pub fn tokenize(source: &str) -> LexOutput {
    Lexer::new(source).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_method_signature() {
        assert_eq!(
            kinds("def add(a: Integer): Integer"),
            vec![
                TokenKind::Def,
                TokenKind::Identifier,
                TokenKind::LeftParen,
                TokenKind::Identifier,
                TokenKind::Colon,
                TokenKind::Constant,
                TokenKind::RightParen,
                TokenKind::Colon,
                TokenKind::Constant,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_adjacent_colon_scans_as_symbol() {
        let output = tokenize("def f():Integer");
        let symbol = &output.tokens[4];
        assert_eq!(symbol.kind, TokenKind::Symbol);
        assert_eq!(symbol.text, ":Integer");
        assert!(symbol.is_capitalized_symbol());
    }

    #[test]
    fn test_positions_and_offsets() {
        let output = tokenize("x = 1\n  héllo = 2");
        let hello = output
            .tokens
            .iter()
            .find(|t| t.text == "héllo")
            .expect("unicode identifier");
        assert_eq!(hello.kind, TokenKind::Identifier);
        assert_eq!((hello.line, hello.column), (2, 3));
        assert_eq!(hello.start, 8);
        assert_eq!(hello.end, 8 + "héllo".len());
    }

    #[test]
    fn test_newlines_collapse_and_continue() {
        assert_eq!(
            kinds("a\n\n\nb"),
            vec![TokenKind::Identifier, TokenKind::Newline, TokenKind::Identifier, TokenKind::Eof]
        );
        // no newline inside parens or after a trailing operator
        assert_eq!(
            kinds("f(a,\n b) +\n c"),
            vec![
                TokenKind::Identifier,
                TokenKind::LeftParen,
                TokenKind::Identifier,
                TokenKind::Comma,
                TokenKind::Identifier,
                TokenKind::RightParen,
                TokenKind::Plus,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_and_strings() {
        let output = tokenize("x = \"a #{b} \\\" c\" # trailing\ny = 'it''s'");
        let strings: Vec<_> = output
            .tokens
            .iter()
            .filter(|t| t.kind == TokenKind::String)
            .map(|t| t.text.as_str())
            .collect();
        assert_eq!(strings, vec!["\"a #{b} \\\" c\"", "'it'", "'s'"]);
        assert!(output.errors.is_empty());
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("1 2.5 1_000 3e10 1.times"),
            vec![
                TokenKind::Integer,
                TokenKind::Float,
                TokenKind::Integer,
                TokenKind::Float,
                TokenKind::Integer,
                TokenKind::Dot,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_predicate_names_and_nullable_constants() {
        let output = tokenize("empty? String? x != y");
        let texts: Vec<_> = output.tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["empty?", "String", "?", "x", "!=", "y", ""]);
    }

    #[test]
    fn test_keywords_after_dot_are_identifiers() {
        assert_eq!(
            kinds("obj.class"),
            vec![TokenKind::Identifier, TokenKind::Dot, TokenKind::Identifier, TokenKind::Eof]
        );
    }

    #[test]
    fn test_labels_are_identifiers() {
        assert_eq!(
            kinds("tag(class: x)"),
            vec![
                TokenKind::Identifier,
                TokenKind::LeftParen,
                TokenKind::Identifier,
                TokenKind::Colon,
                TokenKind::Identifier,
                TokenKind::RightParen,
                TokenKind::Eof,
            ]
        );
        assert_eq!(kinds("type:String")[..2], [TokenKind::Identifier, TokenKind::Symbol]);
        assert_eq!(kinds("def class")[1], TokenKind::Identifier);
        assert_eq!(kinds("def self.name")[1], TokenKind::SelfKw);
    }

    #[test]
    fn test_soft_keywords_need_a_declaration_line() {
        assert_eq!(kinds("type Id = Integer")[0], TokenKind::Type);
        assert_eq!(kinds("interface Named")[0], TokenKind::Interface);
        assert_eq!(kinds("x\nprivate def f")[2], TokenKind::Private);
        assert_eq!(kinds("  public\n")[0], TokenKind::Public);

        assert_eq!(kinds("interface = 1")[0], TokenKind::Identifier);
        assert_eq!(kinds("type\n")[0], TokenKind::Identifier);
        assert_eq!(kinds("f(type)")[2], TokenKind::Identifier);
        assert_eq!(kinds("x = private")[2], TokenKind::Identifier);
        assert_eq!(kinds("protected = true")[0], TokenKind::Identifier);
    }

    #[test]
    fn test_unterminated_string_is_reported() {
        let output = tokenize("x = \"open");
        assert_eq!(output.errors.len(), 1);
        assert_eq!(output.tokens.last().map(|t| t.kind), Some(TokenKind::Eof));
    }

    #[test]
    fn test_unknown_character_does_not_abort() {
        let output = tokenize("a \u{00A7} b");
        assert_eq!(output.errors.len(), 1);
        assert_eq!(output.tokens.len(), 4);
    }
}
