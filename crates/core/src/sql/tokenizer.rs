//! Minimal SQL lexer used by the safety validator.
//!
//! It understands just enough of the SQLite lexical grammar to keep keyword and
//! table scanning honest: line and block comments are dropped, string literals
//! and quoted identifiers are single tokens, and everything else is split into
//! words, numbers, semicolons and single-character punctuation.

use std::ops::Range;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    /// Bare identifier or keyword.
    Word,
    /// `"ident"`, `` `ident` `` or `[ident]`.
    QuotedIdent,
    /// `'string literal'`.
    Literal,
    Number,
    Semicolon,
    Punct(char),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub span: Range<usize>,
}

impl Token<'_> {
    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(keyword)
    }

    pub fn is_punct(&self, ch: char) -> bool {
        self.kind == TokenKind::Punct(ch)
    }

    /// Identifier value with any quoting removed. `None` for tokens that can
    /// not name a relation.
    pub fn identifier(&self) -> Option<String> {
        match self.kind {
            TokenKind::Word => Some(self.text.to_string()),
            TokenKind::QuotedIdent => {
                let inner = &self.text[1..self.text.len() - 1];
                let unescaped = match self.text.as_bytes()[0] {
                    b'"' => inner.replace("\"\"", "\""),
                    b'`' => inner.replace("``", "`"),
                    _ => inner.to_string(),
                };
                Some(unescaped)
            }
            _ => None,
        }
    }
}

/// A literal or quoted identifier was opened at `offset` and never closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnterminatedToken {
    pub offset: usize,
}

pub fn tokenize(sql: &str) -> Result<Vec<Token<'_>>, UnterminatedToken> {
    let bytes = sql.as_bytes();
    let mut tokens = Vec::new();
    let mut index = 0;

    while index < bytes.len() {
        let start = index;
        let byte = bytes[index];

        let kind = match byte {
            b if b.is_ascii_whitespace() => {
                index += 1;
                continue;
            }
            b'-' if bytes.get(index + 1) == Some(&b'-') => {
                index = find_byte(bytes, index + 2, b'\n').map_or(bytes.len(), |end| end + 1);
                continue;
            }
            b'/' if bytes.get(index + 1) == Some(&b'*') => {
                index = find_block_comment_end(bytes, index + 2).unwrap_or(bytes.len());
                continue;
            }
            b'\'' => {
                index = scan_quoted(bytes, index, b'\'')?;
                TokenKind::Literal
            }
            b'"' | b'`' => {
                index = scan_quoted(bytes, index, byte)?;
                TokenKind::QuotedIdent
            }
            b'[' => {
                index = find_byte(bytes, index + 1, b']')
                    .map(|end| end + 1)
                    .ok_or(UnterminatedToken { offset: start })?;
                TokenKind::QuotedIdent
            }
            b';' => {
                index += 1;
                TokenKind::Semicolon
            }
            b'0'..=b'9' => {
                index = scan_while(bytes, index, is_number_continue);
                TokenKind::Number
            }
            b'.' if bytes.get(index + 1).is_some_and(u8::is_ascii_digit) => {
                index = scan_while(bytes, index + 1, is_number_continue);
                TokenKind::Number
            }
            b if is_ident_start(b) => {
                index = scan_while(bytes, index, is_ident_continue);
                TokenKind::Word
            }
            other => {
                index += 1;
                TokenKind::Punct(char::from(other))
            }
        };

        tokens.push(Token { kind, text: &sql[start..index], span: start..index });
    }

    Ok(tokens)
}

fn is_ident_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_' || byte >= 0x80
}

fn is_ident_continue(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'$' || byte >= 0x80
}

fn is_number_continue(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'.' || byte == b'_'
}

fn scan_while(bytes: &[u8], mut index: usize, predicate: fn(u8) -> bool) -> usize {
    while index < bytes.len() && predicate(bytes[index]) {
        index += 1;
    }
    index
}

fn find_byte(bytes: &[u8], from: usize, needle: u8) -> Option<usize> {
    bytes.get(from..)?.iter().position(|byte| *byte == needle).map(|offset| from + offset)
}

fn find_block_comment_end(bytes: &[u8], from: usize) -> Option<usize> {
    bytes.get(from..)?.windows(2).position(|pair| pair == b"*/").map(|offset| from + offset + 2)
}

/// Scans a quoted token starting at `start`; a doubled quote is an escape.
fn scan_quoted(bytes: &[u8], start: usize, quote: u8) -> Result<usize, UnterminatedToken> {
    let mut index = start + 1;
    loop {
        let close = find_byte(bytes, index, quote).ok_or(UnterminatedToken { offset: start })?;
        if bytes.get(close + 1) == Some(&quote) {
            index = close + 2;
            continue;
        }
        return Ok(close + 1);
    }
}
