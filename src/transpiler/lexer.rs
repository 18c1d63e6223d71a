//! Lexer for the authoring syntax.
//!
//! Never fails: unknown characters become single-character punctuation and
//! unterminated strings or block comments run to the end of the input.

use std::ops::Range;

use super::utils::{is_ident_char, is_ident_start};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LexKind {
    Ident,
    Number,
    Str,
    Punct,
    LineComment,
    BlockComment,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lexeme {
    pub kind: LexKind,
    pub text: String,
    /// 1-based source line of the first character.
    pub line: u32,
    pub span: Range<usize>,
    pub newline_before: bool,
}

impl Lexeme {
    pub fn is_comment(&self) -> bool {
        matches!(self.kind, LexKind::LineComment | LexKind::BlockComment)
    }

    pub fn is_punct(&self, p: &str) -> bool {
        self.kind == LexKind::Punct && self.text == p
    }

    pub fn is_ident(&self, word: &str) -> bool {
        self.kind == LexKind::Ident && self.text == word
    }
}

// Longest first.
const PUNCTUATORS: &[&str] = &[
    ">>>=", "===", "!==", "**=", "<<=", ">>=", ">>>", "...", "&&=", "||=", "??=", "=>", "==",
    "!=", "<=", ">=", "&&", "||", "??", "?.", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=",
    "|=", "^=", "**", "<<", ">>",
];

pub fn lex(src: &str) -> Vec<Lexeme> {
    let bytes = src.as_bytes();
    let mut out = Vec::new();
    let mut pos = 0usize;
    let mut line = 1u32;
    let mut newline_before = true;

    while pos < bytes.len() {
        let ch = bytes[pos] as char;
        if ch == '\n' {
            line += 1;
            newline_before = true;
            pos += 1;
            continue;
        }
        if ch.is_ascii_whitespace() {
            pos += 1;
            continue;
        }
        // Non-ASCII outside strings and comments: skip the whole char.
        if !ch.is_ascii() {
            let width = src[pos..].chars().next().map_or(1, char::len_utf8);
            pos += width;
            continue;
        }

        let start = pos;
        let start_line = line;
        let kind;

        if src[pos..].starts_with("//") {
            while pos < bytes.len() && bytes[pos] != b'\n' {
                pos += 1;
            }
            kind = LexKind::LineComment;
        } else if src[pos..].starts_with("/*") {
            pos += 2;
            while pos < bytes.len() && !src[pos..].starts_with("*/") {
                if bytes[pos] == b'\n' {
                    line += 1;
                }
                pos += 1;
            }
            pos = (pos + 2).min(bytes.len());
            kind = LexKind::BlockComment;
        } else if ch == '"' || ch == '\'' || ch == '`' {
            pos += 1;
            while pos < bytes.len() && bytes[pos] as char != ch {
                match bytes[pos] {
                    b'\\' => pos += 1,
                    b'\n' => line += 1,
                    _ => {}
                }
                pos += 1;
            }
            pos = (pos + 1).min(bytes.len());
            kind = LexKind::Str;
        } else if ch.is_ascii_digit()
            || (ch == '.' && bytes.get(pos + 1).is_some_and(u8::is_ascii_digit))
        {
            pos = scan_number(bytes, pos);
            kind = LexKind::Number;
        } else if is_ident_start(ch) {
            while pos < bytes.len() && is_ident_char(bytes[pos] as char) {
                pos += 1;
            }
            kind = LexKind::Ident;
        } else {
            let rest = &src[pos..];
            let len = PUNCTUATORS
                .iter()
                .find(|p| rest.starts_with(**p))
                .map_or(1, |p| p.len());
            pos += len;
            kind = LexKind::Punct;
        }

        // Strings and comments may end mid-character on malformed input.
        let end = pos.min(src.len());
        let text = src.get(start..end).unwrap_or_default().to_string();
        out.push(Lexeme {
            kind,
            text,
            line: start_line,
            span: start..end,
            newline_before,
        });
        newline_before = false;
    }
    out
}

fn scan_number(bytes: &[u8], mut pos: usize) -> usize {
    if bytes[pos] == b'0' && matches!(bytes.get(pos + 1), Some(b'x' | b'X')) {
        pos += 2;
        while pos < bytes.len() && (bytes[pos].is_ascii_hexdigit() || bytes[pos] == b'_') {
            pos += 1;
        }
    } else {
        while pos < bytes.len() && (bytes[pos].is_ascii_digit() || bytes[pos] == b'_') {
            pos += 1;
        }
        if pos < bytes.len() && bytes[pos] == b'.' {
            pos += 1;
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                pos += 1;
            }
        }
        if pos < bytes.len() && matches!(bytes[pos], b'e' | b'E') {
            let mut look = pos + 1;
            if matches!(bytes.get(look), Some(b'+' | b'-')) {
                look += 1;
            }
            if bytes.get(look).is_some_and(u8::is_ascii_digit) {
                pos = look;
                while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                    pos += 1;
                }
            }
        }
    }
    // Typed suffix: 1u, 2i, 0.5f, 1h, and the BigInt `n`.
    if pos < bytes.len()
        && matches!(bytes[pos], b'u' | b'i' | b'f' | b'h' | b'n')
        && !bytes
            .get(pos + 1)
            .is_some_and(|b| is_ident_char(*b as char))
    {
        pos += 1;
    }
    pos
}
