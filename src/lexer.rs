// Expression Lexer
// Lazily tokenizes condition expressions with position-dependent rules

use crate::extensions::{ExtensionFunction, ExtensionRegistry};
use crate::functions::Builtin;
use crate::value::{Version, format_number};

use rust_decimal::Decimal;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// A token over the raw expression. `index` and `length` are byte offsets.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub index: usize,
    pub length: usize,
}

impl Token {
    /// Slice of the source this token spans.
    pub fn raw<'a>(&self, source: &'a str) -> &'a str {
        &source[self.index..self.index + self.length]
    }
}

#[derive(Debug, Clone)]
pub enum TokenKind {
    // Punctuation
    StartIndex,
    StartParameter,
    EndIndex,
    EndParameter,
    Separator,
    Dereference,

    // Literals
    Boolean(bool),
    Number(Decimal),
    Version(Version),
    String(String),

    // Identifiers
    PropertyName(String),
    Function(Builtin),
    Extension(Arc<ExtensionFunction>),

    Unrecognized,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::StartIndex => write!(f, "["),
            TokenKind::StartParameter => write!(f, "("),
            TokenKind::EndIndex => write!(f, "]"),
            TokenKind::EndParameter => write!(f, ")"),
            TokenKind::Separator => write!(f, ","),
            TokenKind::Dereference => write!(f, "."),
            TokenKind::Boolean(b) => write!(f, "{}", if *b { "true" } else { "false" }),
            TokenKind::Number(n) => write!(f, "{}", format_number(n)),
            TokenKind::Version(v) => write!(f, "{}", v),
            TokenKind::String(s) => write!(f, "'{}'", s),
            TokenKind::PropertyName(name) => write!(f, "{}", name),
            TokenKind::Function(builtin) => write!(f, "{}", builtin),
            TokenKind::Extension(extension) => write!(f, "{}", extension.name),
            TokenKind::Unrecognized => write!(f, "?"),
        }
    }
}

/// What the previously produced token was, reduced to the categories the
/// position-sensitive rules care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Previous {
    StartIndex,
    StartParameter,
    Separator,
    Dereference,
    Other,
}

/// Single-consumer lexer over a raw expression string.
///
/// The stream is finite and non-restartable; `try_next` returns `None` once
/// the input is exhausted. Lexical failures never abort the stream, they
/// surface as `Unrecognized` tokens.
pub struct Lexer<'a> {
    raw: &'a str,
    extensions: &'a ExtensionRegistry,
    position: usize,
    previous: Option<Previous>,
}

impl<'a> Lexer<'a> {
    pub fn new(raw: &'a str, extensions: &'a ExtensionRegistry) -> Self {
        Self {
            raw,
            extensions,
            position: 0,
            previous: None,
        }
    }

    pub fn try_next(&mut self) -> Option<Token> {
        self.skip_whitespace();
        let ch = self.current_char()?;
        let start = self.position;

        let kind = match ch {
            '[' => self.punctuation(TokenKind::StartIndex),
            ']' => self.punctuation(TokenKind::EndIndex),
            '(' => self.punctuation(TokenKind::StartParameter),
            ')' => self.punctuation(TokenKind::EndParameter),
            ',' => self.punctuation(TokenKind::Separator),
            '\'' => self.scan_string(),
            '.' if self.number_may_start() => self.scan_number(),
            '.' => self.punctuation(TokenKind::Dereference),
            '-' | '0'..='9' => self.scan_number(),
            _ => self.scan_keyword(),
        };

        self.previous = Some(match kind {
            TokenKind::StartIndex => Previous::StartIndex,
            TokenKind::StartParameter => Previous::StartParameter,
            TokenKind::Separator => Previous::Separator,
            TokenKind::Dereference => Previous::Dereference,
            _ => Previous::Other,
        });

        Some(Token {
            kind,
            index: start,
            length: self.position - start,
        })
    }

    fn current_char(&self) -> Option<char> {
        self.raw[self.position..].chars().next()
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char() {
            if !ch.is_whitespace() {
                break;
            }
            self.position += ch.len_utf8();
        }
    }

    fn punctuation(&mut self, kind: TokenKind) -> TokenKind {
        self.position += 1;
        kind
    }

    /// A leading `.` starts a number only at the beginning of the stream or
    /// right after a separator or opening bracket; anywhere else it is the
    /// dereference operator.
    fn number_may_start(&self) -> bool {
        matches!(
            self.previous,
            None | Some(Previous::Separator | Previous::StartIndex | Previous::StartParameter)
        )
    }

    fn after_dereference(&self) -> bool {
        self.previous == Some(Previous::Dereference)
    }

    fn scan_string(&mut self) -> TokenKind {
        self.position += 1; // opening quote
        let mut value = String::new();
        loop {
            let Some(ch) = self.current_char() else {
                // Unterminated: the token spans to the end of the input.
                self.position = self.raw.len();
                return TokenKind::Unrecognized;
            };
            self.position += ch.len_utf8();
            if ch != '\'' {
                value.push(ch);
            } else if self.raw[self.position..].starts_with('\'') {
                // A doubled quote is an escaped quote.
                value.push('\'');
                self.position += 1;
            } else {
                return TokenKind::String(value);
            }
        }
    }

    fn scan_number(&mut self) -> TokenKind {
        let start = self.position;
        while let Some(ch) = self.current_char() {
            if ch.is_whitespace() || matches!(ch, '[' | ']' | '(' | ')' | ',') {
                break;
            }
            self.position += ch.len_utf8();
        }
        let text = &self.raw[start..self.position];
        let periods = text.bytes().filter(|&b| b == b'.').count();
        if periods >= 2 {
            match Version::parse(text) {
                Some(version) => TokenKind::Version(version),
                None => TokenKind::Unrecognized,
            }
        } else {
            match parse_number_literal(text) {
                Some(number) => TokenKind::Number(number),
                None => TokenKind::Unrecognized,
            }
        }
    }

    fn scan_keyword(&mut self) -> TokenKind {
        let start = self.position;
        while let Some(ch) = self.current_char() {
            if ch.is_whitespace() || matches!(ch, '[' | ']' | '(' | ')' | ',' | '.') {
                break;
            }
            self.position += ch.len_utf8();
        }
        let text = &self.raw[start..self.position];
        if !is_identifier(text) {
            return TokenKind::Unrecognized;
        }
        if self.after_dereference() {
            return TokenKind::PropertyName(text.to_string());
        }
        if text.eq_ignore_ascii_case("true") {
            return TokenKind::Boolean(true);
        }
        if text.eq_ignore_ascii_case("false") {
            return TokenKind::Boolean(false);
        }
        if let Some(builtin) = Builtin::from_name(text) {
            return TokenKind::Function(builtin);
        }
        if let Some(extension) = self.extensions.lookup(text) {
            return TokenKind::Extension(extension.clone());
        }
        TokenKind::Unrecognized
    }
}

fn is_identifier(text: &str) -> bool {
    let mut bytes = text.bytes();
    match bytes.next() {
        Some(byte) if byte.is_ascii_alphabetic() || byte == b'_' => {}
        _ => return false,
    }
    bytes.all(|byte| byte.is_ascii_alphanumeric() || byte == b'_')
}

/// Literal number grammar: optional leading sign, digits, at most one
/// decimal point. Thousands separators belong to the string-to-number
/// coercion, never to literals.
fn parse_number_literal(text: &str) -> Option<Decimal> {
    let unsigned = text.strip_prefix(['-', '+']).unwrap_or(text);
    let negative = text.starts_with('-');
    let (integral, fraction) = match unsigned.split_once('.') {
        Some((integral, fraction)) => (integral, Some(fraction)),
        None => (unsigned, None),
    };
    if !integral.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if let Some(fraction) = fraction {
        if !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
    }
    if integral.is_empty() && fraction.is_none_or(str::is_empty) {
        return None;
    }

    let mut normalized = String::with_capacity(text.len() + 1);
    if negative {
        normalized.push('-');
    }
    if integral.is_empty() {
        normalized.push('0');
    } else {
        normalized.push_str(integral);
    }
    if let Some(fraction) = fraction {
        if !fraction.is_empty() {
            normalized.push('.');
            normalized.push_str(fraction);
        }
    }
    Decimal::from_str(&normalized).ok()
}
