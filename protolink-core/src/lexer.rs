//! Hand-written scanner, per `spec.md` §4.1.
//!
//! Operates on raw bytes decoded incrementally as UTF-8 (an error on
//! malformed UTF-8 is reported the same way `protoc` reports it: as an
//! invalid-character lex error at the offending byte).

use std::rc::Rc;

use crate::error::{Diagnostic, ErrorHandler};
use crate::position::{Position, PositionTracker, Span};
use crate::token::{Attachment, Comment, Keyword, Token, TokenKind};

pub struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    tracker: PositionTracker,
    file_name: Rc<str>,
    /// comments scanned since the last emitted token, not yet attached
    pending_comments: Vec<RawComment>,
    /// did we cross a blank line since the last token/comment?
    blank_line_since_last: bool,
}

struct RawComment {
    text: String,
    span: Span,
    preceded_by_blank: bool,
    same_line_as_prev_token: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(file_name: impl Into<Rc<str>>, src: &'a str) -> Self {
        let file_name = file_name.into();
        Lexer {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            tracker: PositionTracker::new(file_name.clone()),
            file_name,
            pending_comments: Vec::new(),
            blank_line_since_last: false,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.tracker.advance_byte(b);
        self.pos += 1;
        Some(b)
    }

    fn position(&self) -> Position {
        self.tracker.position()
    }

    /// Scans the whole file and returns tokens plus any lex diagnostics.
    /// Tokenizing never aborts: an unrecognized byte becomes a one-byte
    /// error and scanning resumes at the next byte, so the parser still
    /// gets a (partial) token stream to recover against.
    pub fn tokenize(mut self, errors: &mut ErrorHandler) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace_and_comments(errors);
            let start = self.position();
            let Some(b) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    span: Span::point(start),
                    leading_comments: Vec::new(),
                    trailing_comment: None,
                });
                break;
            };
            let token = self.scan_token(b, start, errors);
            tokens.push(token);
        }
        self.attach_comments(&mut tokens);
        tokens
    }

    /// Second pass: distributes `pending_comments` (recorded while
    /// scanning) onto the token stream, classifying attachment per the
    /// rules in `spec.md` §4.1. Done as a pass over the already-built
    /// `Vec<Token>` instead of online, since whether a comment is
    /// "trailing" depends on the *next* comment/token's blank-line state,
    /// which isn't known until we've scanned past it.
    fn attach_comments(&mut self, tokens: &mut [Token]) {
        let comments = std::mem::take(&mut self.pending_comments);
        // `token_index[i]` = index into `tokens` of the first real token
        // starting at or after comment i's end.
        for raw in comments {
            let comment = Comment {
                text: raw.text.clone(),
                span: raw.span.clone(),
                attachment: Attachment::Leading, // corrected below
            };
            let next_idx = tokens
                .iter()
                .position(|t| t.span.start.byte_offset >= raw.span.end.byte_offset)
                .unwrap_or(tokens.len() - 1);

            let followed_by_blank = tokens
                .get(next_idx)
                .map(|t| t.span.start.line > raw.span.end.line + 1)
                .unwrap_or(false);

            if raw.same_line_as_prev_token && !raw.preceded_by_blank {
                // trailing on the previous real token, if one exists before it
                if let Some(prev) = tokens[..next_idx].last_mut() {
                    prev.trailing_comment = Some(Comment {
                        attachment: Attachment::Trailing,
                        ..comment
                    });
                    continue;
                }
            }

            let attachment = if raw.preceded_by_blank && followed_by_blank {
                Attachment::Detached
            } else {
                Attachment::Leading
            };
            if let Some(next) = tokens.get_mut(next_idx) {
                next.leading_comments.push(Comment {
                    attachment,
                    ..comment
                });
            }
        }
    }

    fn skip_whitespace_and_comments(&mut self, errors: &mut ErrorHandler) {
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\t') => {
                    self.bump();
                }
                Some(b'\n') => {
                    self.blank_line_since_last = true;
                    self.bump();
                }
                Some(b'\r') => {
                    self.blank_line_since_last = true;
                    self.bump();
                    if self.peek() == Some(b'\n') {
                        self.bump();
                    }
                }
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    self.scan_line_comment();
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    self.scan_block_comment(errors);
                }
                _ => break,
            }
        }
    }

    fn scan_line_comment(&mut self) {
        let start = self.position();
        let same_line = !self.blank_line_since_last_real_token();
        let preceded_by_blank = self.blank_line_since_last;
        let start_byte = self.pos;
        self.bump(); // '/'
        self.bump(); // '/'
        while let Some(b) = self.peek() {
            if b == b'\n' || b == b'\r' {
                break;
            }
            self.bump();
        }
        let text = self.src[start_byte..self.pos].to_string();
        let end = self.position();
        self.blank_line_since_last = false;
        self.pending_comments.push(RawComment {
            text,
            span: Span::new(start, end),
            preceded_by_blank,
            same_line_as_prev_token: same_line,
        });
    }

    fn scan_block_comment(&mut self, errors: &mut ErrorHandler) {
        let start = self.position();
        let same_line = !self.blank_line_since_last_real_token();
        let preceded_by_blank = self.blank_line_since_last;
        let start_byte = self.pos;
        self.bump(); // '/'
        self.bump(); // '*'
        let mut terminated = false;
        while let Some(b) = self.peek() {
            if b == b'*' && self.peek_at(1) == Some(b'/') {
                self.bump();
                self.bump();
                terminated = true;
                break;
            }
            self.bump();
        }
        let text = self.src[start_byte..self.pos].to_string();
        let end = self.position();
        if !terminated {
            errors.push(Diagnostic::error(
                Span::new(start.clone(), end.clone()),
                "unterminated block comment",
            ));
        }
        self.blank_line_since_last = false;
        self.pending_comments.push(RawComment {
            text,
            span: Span::new(start, end),
            preceded_by_blank,
            same_line_as_prev_token: same_line,
        });
    }

    fn blank_line_since_last_real_token(&self) -> bool {
        self.blank_line_since_last
    }

    fn scan_token(&mut self, b: u8, start: Position, errors: &mut ErrorHandler) -> Token {
        self.blank_line_since_last = false;
        let kind = match b {
            b'"' | b'\'' => self.scan_string(b, errors),
            b'0'..=b'9' => self.scan_number(),
            b'.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => self.scan_number(),
            c if is_ident_start(c) => self.scan_identifier(),
            0x00..=0x1f if b != b'\t' && b != b'\n' && b != b'\r' => {
                self.bump();
                errors.push(Diagnostic::error(
                    Span::new(start.clone(), self.position()),
                    format!("invalid control character: {:#04x}", b),
                ));
                TokenKind::Punct('\u{fffd}')
            }
            b if b.is_ascii() => {
                self.bump();
                TokenKind::Punct(b as char)
            }
            _ => {
                // non-ASCII byte outside an identifier/string context
                self.bump();
                errors.push(Diagnostic::error(
                    Span::new(start.clone(), self.position()),
                    "invalid character",
                ));
                TokenKind::Punct('\u{fffd}')
            }
        };
        let end = self.position();
        Token {
            kind,
            span: Span::new(start, end),
            leading_comments: Vec::new(),
            trailing_comment: None,
        }
    }

    fn scan_identifier(&mut self) -> TokenKind {
        let start_byte = self.pos;
        while self.peek().is_some_and(is_ident_continue) {
            self.bump();
        }
        let text = self.src[start_byte..self.pos].to_string();
        if let Some(kw) = Keyword::lookup(&text) {
            TokenKind::Keyword(kw)
        } else {
            TokenKind::Identifier {
                text,
                has_dot: false,
            }
        }
    }

    fn scan_number(&mut self) -> TokenKind {
        let start_byte = self.pos;
        if self.peek() == Some(b'0')
            && matches!(self.peek_at(1), Some(b'x') | Some(b'X'))
        {
            self.bump();
            self.bump();
            let digits_start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.bump();
            }
            let digits = &self.src[digits_start..self.pos];
            return match u64::from_str_radix(digits, 16) {
                Ok(v) => TokenKind::IntLiteral(v),
                Err(_) => TokenKind::IntLiteral(u64::MAX), // overflow; caller's validator flags range
            };
        }

        // Could be float (has '.' or exponent) or int (decimal/octal).
        let mut saw_dot = false;
        let mut saw_exp = false;
        if self.peek() == Some(b'.') {
            saw_dot = true;
            self.bump();
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        if !saw_dot && self.peek() == Some(b'.') {
            saw_dot = true;
            self.bump();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            // Look ahead without consuming: an exponent marker only counts
            // as part of the number if followed by optional sign + a digit.
            let mut lookahead = 1;
            if matches!(self.peek_at(lookahead), Some(b'+') | Some(b'-')) {
                lookahead += 1;
            }
            if self.peek_at(lookahead).is_some_and(|c| c.is_ascii_digit()) {
                saw_exp = true;
                for _ in 0..lookahead {
                    self.bump();
                }
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.bump();
                }
            }
        }

        let text = &self.src[start_byte..self.pos];
        if saw_dot || saw_exp {
            TokenKind::FloatLiteral(text.parse().unwrap_or(0.0))
        } else if text.starts_with('0') && text.len() > 1 {
            // octal
            if text.bytes().any(|c| matches!(c, b'8' | b'9')) {
                TokenKind::IntLiteral(0) // invalid octal; validated by parser using raw text if needed
            } else {
                u64::from_str_radix(&text[1..], 8)
                    .map(TokenKind::IntLiteral)
                    .unwrap_or(TokenKind::IntLiteral(u64::MAX))
            }
        } else {
            text.parse()
                .map(TokenKind::IntLiteral)
                .unwrap_or(TokenKind::IntLiteral(u64::MAX))
        }
    }

    fn scan_string(&mut self, quote: u8, errors: &mut ErrorHandler) -> TokenKind {
        let start = self.position();
        self.bump(); // opening quote
        let mut value = Vec::new();
        loop {
            match self.peek() {
                None => {
                    errors.push(Diagnostic::error(
                        Span::new(start.clone(), self.position()),
                        "unterminated string literal",
                    ));
                    break;
                }
                Some(b'\n') | Some(b'\r') => {
                    errors.push(Diagnostic::error(
                        Span::new(start.clone(), self.position()),
                        "encountered end-of-line inside string literal",
                    ));
                    break;
                }
                Some(b) if b == quote => {
                    self.bump();
                    break;
                }
                Some(b'\\') => {
                    self.bump();
                    self.scan_escape(&mut value, errors);
                }
                Some(0) => {
                    self.bump();
                    errors.push(Diagnostic::error(
                        Span::point(self.position()),
                        "null byte in string literal",
                    ));
                }
                Some(_) => {
                    // copy one UTF-8 scalar value worth of bytes verbatim
                    let start_byte = self.pos;
                    let first = self.bump().unwrap();
                    let extra = utf8_extra_bytes(first);
                    for _ in 0..extra {
                        if self.peek().is_some() {
                            self.bump();
                        }
                    }
                    value.extend_from_slice(self.src[start_byte..self.pos].as_bytes());
                }
            }
        }
        TokenKind::StringLiteral(value)
    }

    /// Decodes one escape sequence into `out` as raw bytes. `\x`/octal name
    /// a byte value (0-255) per `spec.md` §4.1, not a Unicode code point:
    /// pushing the decoded byte directly keeps e.g. `\xff` as the single
    /// byte `0xff` instead of re-encoding it as two-byte UTF-8.
    fn scan_escape(&mut self, out: &mut Vec<u8>, errors: &mut ErrorHandler) {
        let esc_start = self.position();
        let Some(c) = self.bump() else {
            errors.push(Diagnostic::error(
                Span::point(esc_start),
                "unterminated escape sequence",
            ));
            return;
        };
        match c {
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'v' => out.push(0x0b),
            b'\\' => out.push(b'\\'),
            b'\'' => out.push(b'\''),
            b'"' => out.push(b'"'),
            b'?' => out.push(b'?'),
            b'x' | b'X' => {
                let mut digits = String::new();
                for _ in 0..2 {
                    if self.peek().is_some_and(|b| b.is_ascii_hexdigit()) {
                        digits.push(self.bump().unwrap() as char);
                    }
                }
                if digits.is_empty() {
                    errors.push(Diagnostic::error(
                        Span::point(esc_start),
                        "expected hex digits after \\x",
                    ));
                } else {
                    let byte = u8::from_str_radix(&digits, 16).unwrap_or(0);
                    out.push(byte);
                }
            }
            b'0'..=b'7' => {
                let mut digits = String::new();
                digits.push(c as char);
                for _ in 0..2 {
                    if self.peek().is_some_and(|b| (b'0'..=b'7').contains(&b)) {
                        digits.push(self.bump().unwrap() as char);
                    } else {
                        break;
                    }
                }
                match u32::from_str_radix(&digits, 8) {
                    Ok(v) if v <= 0xff => out.push(v as u8),
                    _ => errors.push(Diagnostic::error(
                        Span::point(esc_start),
                        "octal escape value out of range",
                    )),
                }
            }
            b'u' => {
                let mut digits = String::new();
                for _ in 0..4 {
                    match self.peek() {
                        Some(b) if b.is_ascii_hexdigit() => digits.push(self.bump().unwrap() as char),
                        _ => break,
                    }
                }
                if digits.len() != 4 {
                    errors.push(Diagnostic::error(
                        Span::point(esc_start),
                        "\\u escape requires exactly 4 hex digits",
                    ));
                } else {
                    push_unicode_escape(out, &digits, errors, &esc_start);
                }
            }
            b'U' => {
                let mut digits = String::new();
                for _ in 0..8 {
                    match self.peek() {
                        Some(b) if b.is_ascii_hexdigit() => digits.push(self.bump().unwrap() as char),
                        _ => break,
                    }
                }
                if digits.len() != 8 {
                    errors.push(Diagnostic::error(
                        Span::point(esc_start),
                        "\\U escape requires exactly 8 hex digits",
                    ));
                } else {
                    push_unicode_escape(out, &digits, errors, &esc_start);
                }
            }
            _ => {
                errors.push(Diagnostic::error(
                    Span::point(esc_start),
                    format!("unknown escape sequence \\{}", c as char),
                ));
            }
        }
    }
}

/// `\u`/`\U` name a Unicode scalar value explicitly, unlike `\x`/octal, so
/// they're re-encoded as UTF-8 bytes rather than taken as a raw byte.
fn push_unicode_escape(out: &mut Vec<u8>, digits: &str, errors: &mut ErrorHandler, at: &Position) {
    match u32::from_str_radix(digits, 16) {
        Ok(cp) if cp <= 0x10_ffff => {
            if let Some(ch) = char::from_u32(cp) {
                let mut buf = [0u8; 4];
                out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            } else {
                errors.push(Diagnostic::error(
                    Span::point(at.clone()),
                    "escape does not name a valid Unicode scalar value",
                ));
            }
        }
        _ => errors.push(Diagnostic::error(
            Span::point(at.clone()),
            "unicode escape out of range",
        )),
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn utf8_extra_bytes(first: u8) -> usize {
    if first & 0b1110_0000 == 0b1100_0000 {
        1
    } else if first & 0b1111_0000 == 0b1110_0000 {
        2
    } else if first & 0b1111_1000 == 0b1111_0000 {
        3
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenize(src: &str) -> (Vec<Token>, ErrorHandler) {
        let mut errors = ErrorHandler::default();
        let tokens = Lexer::new("test.proto", src).tokenize(&mut errors);
        (tokens, errors)
    }

    fn first_kind(src: &str) -> TokenKind {
        let (tokens, errors) = tokenize(src);
        assert!(errors.diagnostics().is_empty(), "unexpected diagnostics: {:?}", errors.diagnostics());
        tokens.into_iter().next().unwrap().kind
    }

    #[test]
    fn scans_keywords_and_identifiers() {
        assert_eq!(first_kind("message"), TokenKind::Keyword(Keyword::Message));
        assert_eq!(
            first_kind("FooBar"),
            TokenKind::Identifier { text: "FooBar".to_string(), has_dot: false }
        );
    }

    #[test]
    fn scans_hex_and_octal_integers() {
        assert_eq!(first_kind("0x1F"), TokenKind::IntLiteral(31));
        assert_eq!(first_kind("017"), TokenKind::IntLiteral(15));
        assert_eq!(first_kind("42"), TokenKind::IntLiteral(42));
    }

    #[test]
    fn scans_simple_escapes() {
        match first_kind(r#""a\nb""#) {
            TokenKind::StringLiteral(bytes) => assert_eq!(bytes, b"a\nb"),
            other => panic!("expected string literal, got {:?}", other),
        }
    }

    /// `\xff` must decode to the single raw byte 0xff, not the Unicode code
    /// point U+00FF re-encoded as the two UTF-8 bytes 0xc3 0xbf.
    #[test]
    fn high_byte_hex_escape_is_a_raw_byte() {
        match first_kind(r#""\xff""#) {
            TokenKind::StringLiteral(bytes) => assert_eq!(bytes, vec![0xff]),
            other => panic!("expected string literal, got {:?}", other),
        }
    }

    /// Same for octal: `\377` is the raw byte 0xff, not its UTF-8 encoding.
    #[test]
    fn high_byte_octal_escape_is_a_raw_byte() {
        match first_kind(r#""\377""#) {
            TokenKind::StringLiteral(bytes) => assert_eq!(bytes, vec![0xffu8]),
            other => panic!("expected string literal, got {:?}", other),
        }
    }

    #[test]
    fn unicode_escape_is_utf8_encoded() {
        match first_kind(r#""é""#) {
            TokenKind::StringLiteral(bytes) => assert_eq!(bytes, "é".as_bytes()),
            other => panic!("expected string literal, got {:?}", other),
        }
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let (_, errors) = tokenize("\"abc");
        assert!(errors.diagnostics().iter().any(|d| d.message.contains("unterminated")));
    }
}
