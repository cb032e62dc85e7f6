//! Tokenizer for formula expressions.

use std::str::FromStr;

use rust_decimal::Decimal;

use crate::error::{EngineError, EngineResult};

/// Maximum accepted expression length in bytes.
pub const MAX_EXPRESSION_LENGTH: usize = 4096;

/// A lexical token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Number(Decimal),
    Identifier(String),
    True,
    False,
    Plus,
    Minus,
    Star,
    Slash,
    LeftParen,
    RightParen,
    Comma,
    Question,
    Colon,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    EqualEqual,
    BangEqual,
    AndAnd,
    OrOr,
    Bang,
    End,
}

/// A token with its byte offset in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: usize,
}

/// Splits an expression into tokens, ending with [`TokenKind::End`].
pub fn tokenize(source: &str) -> EngineResult<Vec<Token>> {
    if source.len() > MAX_EXPRESSION_LENGTH {
        return Err(syntax(
            MAX_EXPRESSION_LENGTH,
            format!("expression exceeds {} bytes", MAX_EXPRESSION_LENGTH),
        ));
    }

    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let start = i;
        let kind = match c {
            b'0'..=b'9' | b'.' => {
                let mut seen_dot = false;
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                    if bytes[i] == b'.' {
                        if seen_dot {
                            return Err(syntax(i, "number has more than one decimal point"));
                        }
                        seen_dot = true;
                    }
                    i += 1;
                }
                let text = &source[start..i];
                let number = Decimal::from_str(text)
                    .map_err(|_| syntax(start, format!("invalid number '{}'", text)))?;
                tokens.push(Token {
                    kind: TokenKind::Number(number),
                    position: start,
                });
                continue;
            }
            c if is_ident_start(c) => {
                while i < bytes.len() && is_ident_continue(bytes[i]) {
                    i += 1;
                }
                let kind = match &source[start..i] {
                    "true" => TokenKind::True,
                    "false" => TokenKind::False,
                    name => TokenKind::Identifier(name.to_string()),
                };
                tokens.push(Token {
                    kind,
                    position: start,
                });
                continue;
            }
            b'+' => TokenKind::Plus,
            b'-' => TokenKind::Minus,
            b'*' => TokenKind::Star,
            b'/' => TokenKind::Slash,
            b'(' => TokenKind::LeftParen,
            b')' => TokenKind::RightParen,
            b',' => TokenKind::Comma,
            b'?' => TokenKind::Question,
            b':' => TokenKind::Colon,
            b'>' if peek(bytes, i) == Some(b'=') => TokenKind::GreaterEqual,
            b'>' => TokenKind::Greater,
            b'<' if peek(bytes, i) == Some(b'=') => TokenKind::LessEqual,
            b'<' => TokenKind::Less,
            b'=' if peek(bytes, i) == Some(b'=') => TokenKind::EqualEqual,
            b'!' if peek(bytes, i) == Some(b'=') => TokenKind::BangEqual,
            b'!' => TokenKind::Bang,
            b'&' if peek(bytes, i) == Some(b'&') => TokenKind::AndAnd,
            b'|' if peek(bytes, i) == Some(b'|') => TokenKind::OrOr,
            b'=' => return Err(syntax(i, "assignment is not supported, use '=='")),
            _ => {
                let ch = source[i..].chars().next().unwrap_or('?');
                return Err(syntax(i, format!("unexpected character '{}'", ch)));
            }
        };

        i += match kind {
            TokenKind::GreaterEqual
            | TokenKind::LessEqual
            | TokenKind::EqualEqual
            | TokenKind::BangEqual
            | TokenKind::AndAnd
            | TokenKind::OrOr => 2,
            _ => 1,
        };
        tokens.push(Token {
            kind,
            position: start,
        });
    }

    tokens.push(Token {
        kind: TokenKind::End,
        position: source.len(),
    });
    Ok(tokens)
}

fn peek(bytes: &[u8], i: usize) -> Option<u8> {
    bytes.get(i + 1).copied()
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

pub(crate) fn syntax(position: usize, message: impl Into<String>) -> EngineError {
    EngineError::Syntax {
        position,
        message: message.into(),
    }
}
