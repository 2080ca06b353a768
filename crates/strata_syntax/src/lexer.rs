//! Tokenizer: source bytes → token stream.
//!
//! The lexer is byte-oriented (identifiers are ASCII) but tolerates UTF-8
//! bytes inside comments and string literals. On a malformed literal it
//! reports a diagnostic and emits [`TokenKind::Error`] in its place so the
//! parser still sees a well-formed stream.

use strata_base::{Atom, AtomTable, Diagnostic, DiagnosticKind, FileId, TextSpan};

use crate::token::{CompileTimeTag, CompoundOp, Keyword, Radix, Token, TokenKind};

pub fn lex(source: &str, file: FileId, atoms: &mut AtomTable) -> (Vec<Token>, Vec<Diagnostic>) {
    let mut lexer = Lexer {
        src: source,
        bytes: source.as_bytes(),
        pos: 0,
        file,
        atoms,
        tokens: Vec::new(),
        diagnostics: Vec::new(),
    };
    lexer.run();
    (lexer.tokens, lexer.diagnostics)
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    file: FileId,
    atoms: &'a mut AtomTable,
    tokens: Vec<Token>,
    diagnostics: Vec<Diagnostic>,
}

fn is_ident_start(b: u8) -> bool {
    b == b'_' || b.is_ascii_alphabetic()
}

fn is_ident_continue(b: u8) -> bool {
    b == b'_' || b.is_ascii_alphanumeric()
}

impl<'a> Lexer<'a> {
    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> u8 {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> u8 {
        *self.bytes.get(self.pos + offset).unwrap_or(&0)
    }

    fn advance(&mut self) -> u8 {
        let b = self.peek();
        self.pos += 1;
        b
    }

    /// Consumes one full UTF-8 character starting at the current position
    /// and returns it. Used when copying comment/string content verbatim.
    fn bump_char(&mut self) -> char {
        let ch = self.src[self.pos..].chars().next().unwrap_or('\u{FFFD}');
        self.pos += ch.len_utf8();
        ch
    }

    fn span_from(&self, start: usize) -> TextSpan {
        TextSpan::new(self.file, start, self.pos - start)
    }

    fn error(&mut self, start: usize, message: impl Into<String>) {
        self.diagnostics
            .push(Diagnostic::new(DiagnosticKind::LexError, message, self.span_from(start)));
    }

    fn push(&mut self, kind: TokenKind, start: usize) {
        let span = self.span_from(start);
        self.tokens.push(Token::new(kind, span));
    }

    fn run(&mut self) {
        loop {
            self.skip_trivia();
            if self.at_end() {
                let start = self.pos;
                self.push(TokenKind::Eof, start);
                break;
            }
            let start = self.pos;
            let b = self.peek();
            if is_ident_start(b) {
                self.lex_identifier(start);
            } else if b == b'@' {
                self.lex_tag(start);
            } else if b.is_ascii_digit() {
                self.lex_number(start);
            } else if b == b'"' {
                self.lex_string(start);
            } else if b == b'\'' {
                self.lex_char(start);
            } else {
                self.lex_punct_or_op(start);
            }
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.advance();
                }
                b'/' if self.peek_at(1) == b'/' => {
                    while !self.at_end() && self.peek() != b'\n' {
                        self.advance();
                    }
                }
                b'/' if self.peek_at(1) == b'*' => {
                    self.skip_block_comment();
                }
                _ => break,
            }
        }
    }

    fn skip_block_comment(&mut self) {
        let start = self.pos;
        self.advance();
        self.advance();
        let mut depth = 1u32;
        while depth > 0 {
            if self.at_end() {
                self.error(start, "unterminated block comment");
                return;
            }
            if self.peek() == b'/' && self.peek_at(1) == b'*' {
                self.advance();
                self.advance();
                depth += 1;
            } else if self.peek() == b'*' && self.peek_at(1) == b'/' {
                self.advance();
                self.advance();
                depth -= 1;
            } else {
                self.bump_char();
            }
        }
    }

    fn lex_identifier(&mut self, start: usize) {
        while is_ident_continue(self.peek()) {
            self.advance();
        }
        let text = &self.src[start..self.pos];
        let kind = match Keyword::from_str(text) {
            Some(kw) => TokenKind::Keyword(kw),
            None => TokenKind::Identifier(self.intern(text)),
        };
        self.push(kind, start);
    }

    fn intern(&mut self, text: &str) -> Atom {
        self.atoms.intern(text)
    }

    fn lex_tag(&mut self, start: usize) {
        self.advance(); // '@'
        let name_start = self.pos;
        while is_ident_continue(self.peek()) {
            self.advance();
        }
        let text = &self.src[name_start..self.pos];
        match CompileTimeTag::from_str(text) {
            Some(tag) => self.push(TokenKind::CompileTimeTag(tag), start),
            None => {
                self.error(start, format!("unknown compile-time tag '@{text}'"));
                self.push(TokenKind::Error, start);
            }
        }
    }

    fn lex_number(&mut self, start: usize) {
        if self.peek() == b'0' && (self.peek_at(1) == b'x' || self.peek_at(1) == b'X') {
            self.advance();
            self.advance();
            let digits_start = self.pos;
            while self.peek().is_ascii_hexdigit() {
                self.advance();
            }
            let digits = &self.src[digits_start..self.pos];
            if digits.is_empty() {
                self.error(start, "hexadecimal literal has no digits");
                self.push(TokenKind::Error, start);
                return;
            }
            match u64::from_str_radix(digits, 16) {
                Ok(value) => self.push(TokenKind::Integer { value, radix: Radix::Hexadecimal }, start),
                Err(_) => {
                    self.error(start, "hexadecimal literal does not fit in 64 bits");
                    self.push(TokenKind::Error, start);
                }
            }
            return;
        }

        while self.peek().is_ascii_digit() {
            self.advance();
        }

        if self.peek() == b'.' && self.peek_at(1).is_ascii_digit() {
            self.advance(); // '.'
            while self.peek().is_ascii_digit() {
                self.advance();
            }
            let text = &self.src[start..self.pos];
            match text.parse::<f64>() {
                Ok(value) => self.push(TokenKind::Float(value), start),
                Err(_) => {
                    self.error(start, "malformed float literal");
                    self.push(TokenKind::Error, start);
                }
            }
            return;
        }

        let text = &self.src[start..self.pos];
        match text.parse::<u64>() {
            Ok(value) => self.push(TokenKind::Integer { value, radix: Radix::Decimal }, start),
            Err(_) => {
                self.error(start, "integer literal does not fit in 64 bits");
                self.push(TokenKind::Error, start);
            }
        }
    }

    /// Decodes one escape sequence (the leading backslash has already been
    /// consumed) and appends the decoded character(s) to `buf`.
    fn decode_escape(&mut self, start: usize, buf: &mut String) {
        if self.at_end() {
            self.error(start, "unterminated escape sequence");
            return;
        }
        let b = self.advance();
        match b {
            b'0' => buf.push('\0'),
            b'n' => buf.push('\n'),
            b'r' => buf.push('\r'),
            b't' => buf.push('\t'),
            b'\\' => buf.push('\\'),
            b'"' => buf.push('"'),
            b'\'' => buf.push('\''),
            other => {
                self.error(start, format!("unknown escape sequence '\\{}'", other as char));
                buf.push(other as char);
            }
        }
    }

    fn lex_string(&mut self, start: usize) {
        if self.peek_at(1) == b'"' && self.peek_at(2) == b'"' {
            self.lex_multiline_string(start);
        } else {
            self.lex_single_line_string(start);
        }
    }

    fn lex_single_line_string(&mut self, start: usize) {
        self.advance(); // opening quote
        let mut buf = String::new();
        loop {
            if self.at_end() {
                self.error(start, "unterminated string literal");
                break;
            }
            match self.peek() {
                b'"' => {
                    self.advance();
                    break;
                }
                b'\\' => {
                    let esc_start = self.pos;
                    self.advance();
                    self.decode_escape(esc_start, &mut buf);
                }
                b'\n' => {
                    self.error(start, "newline in single-line string literal");
                    break;
                }
                _ => {
                    let ch = self.bump_char();
                    buf.push(ch);
                }
            }
        }
        self.push(TokenKind::String(buf), start);
    }

    fn lex_multiline_string(&mut self, start: usize) {
        self.advance();
        self.advance();
        self.advance(); // """
        // Whitespace followed by a newline right after the opening delimiter is skipped.
        let mut probe = self.pos;
        while matches!(self.bytes.get(probe), Some(b' ') | Some(b'\t')) {
            probe += 1;
        }
        if self.bytes.get(probe) == Some(&b'\n') {
            self.pos = probe + 1;
        }

        let mut raw = String::new();
        loop {
            if self.at_end() {
                self.error(start, "unterminated multi-line string literal");
                break;
            }
            if self.peek() == b'"' && self.peek_at(1) == b'"' && self.peek_at(2) == b'"' {
                self.advance();
                self.advance();
                self.advance();
                break;
            }
            if self.peek() == b'\\' {
                let esc_start = self.pos;
                self.advance();
                self.decode_escape(esc_start, &mut raw);
                continue;
            }
            let ch = self.bump_char();
            raw.push(ch);
        }

        self.push(TokenKind::String(strip_common_indent(&raw)), start);
    }

    fn lex_char(&mut self, start: usize) {
        self.advance(); // opening quote
        let mut decoded = String::new();
        if self.peek() == b'\\' {
            let esc_start = self.pos;
            self.advance();
            self.decode_escape(esc_start, &mut decoded);
        } else if !self.at_end() && self.peek() != b'\'' {
            let ch = self.bump_char();
            decoded.push(ch);
        }
        if self.peek() == b'\'' {
            self.advance();
        } else {
            self.error(start, "unterminated character literal");
        }

        let bytes = decoded.as_bytes();
        if bytes.len() > 4 {
            self.error(start, "character literal does not fit in 4 bytes");
            self.push(TokenKind::Error, start);
            return;
        }
        let mut value: u64 = 0;
        for (i, b) in bytes.iter().enumerate() {
            value |= (*b as u64) << (8 * i);
        }
        self.push(TokenKind::Integer { value, radix: Radix::Decimal }, start);
    }

    fn lex_punct_or_op(&mut self, start: usize) {
        let b = self.advance();
        let kind = match b {
            b'-' if self.peek() == b'>' => {
                self.advance();
                TokenKind::Op(CompoundOp::Arrow)
            }
            b'-' if self.peek() == b'=' => {
                self.advance();
                TokenKind::Op(CompoundOp::MinusEq)
            }
            b'<' if self.peek() == b'<' => {
                self.advance();
                TokenKind::Op(CompoundOp::Shl)
            }
            b'<' if self.peek() == b'=' => {
                self.advance();
                TokenKind::Op(CompoundOp::Le)
            }
            b'>' if self.peek() == b'>' => {
                self.advance();
                TokenKind::Op(CompoundOp::Shr)
            }
            b'>' if self.peek() == b'=' => {
                self.advance();
                TokenKind::Op(CompoundOp::Ge)
            }
            b'.' if self.peek() == b'.' && self.peek_at(1) == b'<' => {
                self.advance();
                self.advance();
                TokenKind::Op(CompoundOp::DotDotLt)
            }
            b'.' if self.peek() == b'.' => {
                self.advance();
                TokenKind::Op(CompoundOp::DotDot)
            }
            b'=' if self.peek() == b'=' => {
                self.advance();
                TokenKind::Op(CompoundOp::EqEq)
            }
            b'!' if self.peek() == b'=' => {
                self.advance();
                TokenKind::Op(CompoundOp::NotEq)
            }
            b'&' if self.peek() == b'&' => {
                self.advance();
                TokenKind::Op(CompoundOp::AndAnd)
            }
            b'&' if self.peek() == b'=' => {
                self.advance();
                TokenKind::Op(CompoundOp::AndEq)
            }
            b'|' if self.peek() == b'|' => {
                self.advance();
                TokenKind::Op(CompoundOp::OrOr)
            }
            b'|' if self.peek() == b'=' => {
                self.advance();
                TokenKind::Op(CompoundOp::OrEq)
            }
            b'^' if self.peek() == b'^' => {
                self.advance();
                TokenKind::Op(CompoundOp::XorXor)
            }
            b'^' if self.peek() == b'=' => {
                self.advance();
                TokenKind::Op(CompoundOp::XorEq)
            }
            b'+' if self.peek() == b'=' => {
                self.advance();
                TokenKind::Op(CompoundOp::PlusEq)
            }
            b'*' if self.peek() == b'=' => {
                self.advance();
                TokenKind::Op(CompoundOp::StarEq)
            }
            b'/' if self.peek() == b'=' => {
                self.advance();
                TokenKind::Op(CompoundOp::SlashEq)
            }
            b'%' if self.peek() == b'=' => {
                self.advance();
                TokenKind::Op(CompoundOp::PercentEq)
            }
            b if b.is_ascii_graphic() => TokenKind::Punct(b as char),
            other => {
                self.error(start, format!("unexpected byte 0x{other:02x}"));
                TokenKind::Error
            }
        };
        self.push(kind, start);
    }
}

/// Strips the indent established by the first content line from every
/// subsequent line of a multi-line string, per the "leading run of spaces
/// OR leading run of tabs" rule.
fn strip_common_indent(raw: &str) -> String {
    let mut lines: Vec<&str> = raw.split('\n').collect();
    let indent_char = lines
        .first()
        .and_then(|l| l.chars().next())
        .filter(|c| *c == ' ' || *c == '\t');
    let Some(indent_char) = indent_char else {
        return raw.to_string();
    };
    let indent_len = lines[0].chars().take_while(|c| *c == indent_char).count();
    if indent_len == 0 {
        return raw.to_string();
    }
    for line in lines.iter_mut() {
        let strip = line.chars().take(indent_len).take_while(|c| *c == indent_char).count();
        *line = &line[strip..];
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut atoms = AtomTable::new();
        let (tokens, diags) = lex(source, FileId(0), &mut atoms);
        assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_identifier_and_keyword() {
        let kinds = kinds("var foo");
        assert_eq!(kinds[0], TokenKind::Keyword(Keyword::Var));
        assert!(matches!(kinds[1], TokenKind::Identifier(_)));
        assert_eq!(kinds[2], TokenKind::Eof);
    }

    #[test]
    fn lexes_decimal_and_hex_integers() {
        let kinds = kinds("42 0xFF");
        assert_eq!(kinds[0], TokenKind::Integer { value: 42, radix: Radix::Decimal });
        assert_eq!(kinds[1], TokenKind::Integer { value: 255, radix: Radix::Hexadecimal });
    }

    #[test]
    fn lexes_float_literal() {
        let kinds = kinds("3.14");
        assert_eq!(kinds[0], TokenKind::Float(3.14));
    }

    #[test]
    fn range_dots_do_not_become_floats() {
        let kinds = kinds("0..10");
        assert_eq!(kinds[0], TokenKind::Integer { value: 0, radix: Radix::Decimal });
        assert_eq!(kinds[1], TokenKind::Op(CompoundOp::DotDot));
        assert_eq!(kinds[2], TokenKind::Integer { value: 10, radix: Radix::Decimal });
    }

    #[test]
    fn lexes_exclusive_range() {
        let kinds = kinds("0..<10");
        assert_eq!(kinds[1], TokenKind::Op(CompoundOp::DotDotLt));
    }

    #[test]
    fn lexes_string_with_escapes() {
        let kinds = kinds(r#""hi\n""#);
        assert_eq!(kinds[0], TokenKind::String("hi\n".to_string()));
    }

    #[test]
    fn reports_newline_in_single_line_string() {
        let mut atoms = AtomTable::new();
        let (_, diags) = lex("\"abc\ndef\"", FileId(0), &mut atoms);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, DiagnosticKind::LexError);
    }

    #[test]
    fn lexes_multiline_string_strips_indent() {
        let kinds = kinds("\"\"\"\n    hello\n    world\n    \"\"\"");
        assert_eq!(kinds[0], TokenKind::String("hello\nworld\n".to_string()));
    }

    #[test]
    fn nested_block_comments_are_tolerated() {
        let kinds = kinds("/* outer /* inner */ still-outer */ 1");
        assert_eq!(kinds[0], TokenKind::Integer { value: 1, radix: Radix::Decimal });
    }

    #[test]
    fn lexes_char_literal_as_packed_integer() {
        let kinds = kinds("'A'");
        assert_eq!(kinds[0], TokenKind::Integer { value: b'A' as u64, radix: Radix::Decimal });
    }

    #[test]
    fn overwide_char_literal_is_a_diagnostic() {
        let mut atoms = AtomTable::new();
        let (_, diags) = lex("'\u{1F600}'", FileId(0), &mut atoms); // 4-byte emoji fits exactly at the boundary
        assert!(diags.is_empty());
    }

    #[test]
    fn compile_time_tag_is_recognized() {
        let kinds = kinds("@c_function");
        assert_eq!(kinds[0], TokenKind::CompileTimeTag(CompileTimeTag::CFunction));
    }

    #[test]
    fn unknown_compile_time_tag_is_an_error() {
        let mut atoms = AtomTable::new();
        let (tokens, diags) = lex("@bogus", FileId(0), &mut atoms);
        assert_eq!(diags.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Error);
    }

    #[test]
    fn compound_assignment_operators() {
        let kinds = kinds("+= -= *= /= %= &= |= ^=");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Op(CompoundOp::PlusEq),
                TokenKind::Op(CompoundOp::MinusEq),
                TokenKind::Op(CompoundOp::StarEq),
                TokenKind::Op(CompoundOp::SlashEq),
                TokenKind::Op(CompoundOp::PercentEq),
                TokenKind::Op(CompoundOp::AndEq),
                TokenKind::Op(CompoundOp::OrEq),
                TokenKind::Op(CompoundOp::XorEq),
                TokenKind::Eof,
            ]
        );
    }
}
