//! Tokenizer for PDF object syntax.

use crate::error::{PdfError, Result};

/// Keywords and delimiters that matter when reading objects and xref data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keyword {
    ArrayStart, // [
    ArrayEnd,   // ]
    DictStart,  // <<
    DictEnd,    // >>
    Null,
    Obj,
    EndObj,
    R,
    Stream,
    EndStream,
    Xref,
    Trailer,
    StartXref,
    Other(Vec<u8>),
}

impl Keyword {
    pub fn from_bytes(b: &[u8]) -> Self {
        match b {
            b"[" => Self::ArrayStart,
            b"]" => Self::ArrayEnd,
            b"<<" => Self::DictStart,
            b">>" => Self::DictEnd,
            b"null" => Self::Null,
            b"obj" => Self::Obj,
            b"endobj" => Self::EndObj,
            b"R" => Self::R,
            b"stream" => Self::Stream,
            b"endstream" => Self::EndStream,
            b"xref" => Self::Xref,
            b"trailer" => Self::Trailer,
            b"startxref" => Self::StartXref,
            _ => Self::Other(b.to_vec()),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::ArrayStart => b"[",
            Self::ArrayEnd => b"]",
            Self::DictStart => b"<<",
            Self::DictEnd => b">>",
            Self::Null => b"null",
            Self::Obj => b"obj",
            Self::EndObj => b"endobj",
            Self::R => b"R",
            Self::Stream => b"stream",
            Self::EndStream => b"endstream",
            Self::Xref => b"xref",
            Self::Trailer => b"trailer",
            Self::StartXref => b"startxref",
            Self::Other(b) => b,
        }
    }
}

/// A lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Real(f64),
    Bool(bool),
    /// `/Name`, with `#xx` escapes resolved.
    Name(String),
    /// `(literal)`
    String(Vec<u8>),
    /// `<hex>`
    HexString(Vec<u8>),
    Keyword(Keyword),
}

/// Byte-level tokenizer over a borrowed buffer.
pub struct Lexer<'a> {
    data: &'a [u8],
    pos: usize,
    /// Start of the last token returned
    token_pos: usize,
}

impl<'a> Lexer<'a> {
    pub const fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            token_pos: 0,
        }
    }

    /// Lexer positioned at `pos`.
    pub const fn at(data: &'a [u8], pos: usize) -> Self {
        Self {
            data,
            pos,
            token_pos: pos,
        }
    }

    /// Current position in the buffer
    pub const fn tell(&self) -> usize {
        self.pos
    }

    pub fn set_pos(&mut self, pos: usize) {
        self.pos = pos.min(self.data.len());
        self.token_pos = self.pos;
    }

    pub const fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.data.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    pub const fn is_whitespace(b: u8) -> bool {
        matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'\x00' | b'\x0c')
    }

    pub const fn is_delimiter(b: u8) -> bool {
        matches!(
            b,
            b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
        )
    }

    /// Skip whitespace and comments
    pub fn skip_whitespace(&mut self) {
        while let Some(b) = self.peek() {
            if b == b'%' {
                match find_line_end(&self.data[self.pos..]) {
                    Some(offset) => self.pos += offset + 1,
                    None => self.pos = self.data.len(),
                }
                continue;
            }
            if !Self::is_whitespace(b) {
                return;
            }
            self.pos += 1;
        }
    }

    fn parse_name(&mut self) -> Token {
        self.advance(); // '/'
        let mut name = Vec::new();

        while let Some(b) = self.peek() {
            if Self::is_whitespace(b) || Self::is_delimiter(b) {
                break;
            }
            self.pos += 1;
            if b == b'#' {
                let escaped = self
                    .peek()
                    .and_then(hex_value)
                    .zip(self.peek_at(1).and_then(hex_value));
                if let Some((hi, lo)) = escaped {
                    self.pos += 2;
                    name.push((hi << 4) | lo);
                    continue;
                }
                // A '#' without two hex digits is dropped.
                continue;
            }
            name.push(b);
        }

        Token::Name(name_from_bytes(&name))
    }

    fn parse_number(&mut self) -> Result<Token> {
        let start = self.pos;
        let mut has_dot = false;

        if matches!(self.peek(), Some(b'+' | b'-')) {
            self.advance();
        }
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() {
                self.advance();
            } else if b == b'.' && !has_dot {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        let text = std::str::from_utf8(&self.data[start..self.pos]).map_err(|_| {
            PdfError::TokenError {
                pos: start,
                msg: "invalid number".into(),
            }
        })?;

        if has_dot {
            // "5." and "-.5" are valid; Rust's parser handles both.
            let val: f64 = text.parse().map_err(|_| PdfError::TokenError {
                pos: start,
                msg: format!("invalid real: {text}"),
            })?;
            Ok(Token::Real(val))
        } else {
            let val: i64 = text.parse().map_err(|_| PdfError::TokenError {
                pos: start,
                msg: format!("invalid int: {text}"),
            })?;
            Ok(Token::Int(val))
        }
    }

    fn parse_string(&mut self) -> Result<Token> {
        self.advance(); // '('
        let mut result = Vec::new();
        let mut depth = 1;

        while depth > 0 {
            match self.advance() {
                Some(b'(') => {
                    depth += 1;
                    result.push(b'(');
                }
                Some(b')') => {
                    depth -= 1;
                    if depth > 0 {
                        result.push(b')');
                    }
                }
                Some(b'\\') => match self.advance() {
                    Some(b'n') => result.push(b'\n'),
                    Some(b'r') => result.push(b'\r'),
                    Some(b't') => result.push(b'\t'),
                    Some(b'b') => result.push(0x08),
                    Some(b'f') => result.push(0x0c),
                    Some(b'\r') => {
                        if self.peek() == Some(b'\n') {
                            self.advance();
                        }
                    }
                    Some(b'\n') => {}
                    Some(c @ b'0'..=b'7') => {
                        let mut octal = u32::from(c - b'0');
                        for _ in 0..2 {
                            match self.peek() {
                                Some(d @ b'0'..=b'7') => {
                                    self.advance();
                                    octal = octal * 8 + u32::from(d - b'0');
                                }
                                _ => break,
                            }
                        }
                        result.push((octal & 0xFF) as u8);
                    }
                    // \( \) \\ and unknown escapes keep the character
                    Some(c) => result.push(c),
                    None => return Err(PdfError::UnexpectedEof),
                },
                Some(c) => result.push(c),
                None => return Err(PdfError::UnexpectedEof),
            }
        }

        Ok(Token::String(result))
    }

    fn parse_hex_string(&mut self) -> Result<Token> {
        self.advance(); // '<'
        let mut result = Vec::new();
        let mut pending: Option<u8> = None;

        loop {
            match self.advance() {
                Some(b'>') => break,
                Some(c) if Self::is_whitespace(c) => {}
                Some(c) => {
                    let nibble = hex_value(c).ok_or_else(|| PdfError::TokenError {
                        pos: self.pos - 1,
                        msg: format!("invalid hex digit {:?}", c as char),
                    })?;
                    match pending.take() {
                        Some(high) => result.push((high << 4) | nibble),
                        None => pending = Some(nibble),
                    }
                }
                None => return Err(PdfError::UnexpectedEof),
            }
        }

        // Odd digit count: the last nibble is followed by an implicit 0.
        if let Some(high) = pending {
            result.push(high << 4);
        }

        Ok(Token::HexString(result))
    }

    fn parse_keyword(&mut self) -> Token {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if Self::is_whitespace(b) || Self::is_delimiter(b) {
                break;
            }
            self.advance();
        }

        match &self.data[start..self.pos] {
            b"true" => Token::Bool(true),
            b"false" => Token::Bool(false),
            bytes => Token::Keyword(Keyword::from_bytes(bytes)),
        }
    }

    /// Next token and its start offset, or `None` at end of input.
    pub fn next_token(&mut self) -> Option<Result<(usize, Token)>> {
        self.skip_whitespace();
        if self.at_end() {
            return None;
        }

        self.token_pos = self.pos;
        let b = self.peek()?;

        let result = match b {
            b'/' => Ok(self.parse_name()),
            b'(' => self.parse_string(),
            b'<' if self.peek_at(1) == Some(b'<') => {
                self.pos += 2;
                Ok(Token::Keyword(Keyword::DictStart))
            }
            b'<' => self.parse_hex_string(),
            b'>' if self.peek_at(1) == Some(b'>') => {
                self.pos += 2;
                Ok(Token::Keyword(Keyword::DictEnd))
            }
            b'[' => {
                self.advance();
                Ok(Token::Keyword(Keyword::ArrayStart))
            }
            b']' => {
                self.advance();
                Ok(Token::Keyword(Keyword::ArrayEnd))
            }
            b'>' | b')' | b'{' | b'}' => {
                self.advance();
                Ok(Token::Keyword(Keyword::Other(vec![b])))
            }
            b'+' | b'-' | b'.' => {
                if matches!(self.peek_at(1), Some(c) if c.is_ascii_digit() || c == b'.') {
                    self.parse_number()
                } else {
                    Ok(self.parse_keyword())
                }
            }
            c if c.is_ascii_digit() => self.parse_number(),
            _ => Ok(self.parse_keyword()),
        };

        Some(result.map(|token| (self.token_pos, token)))
    }
}

pub(crate) const fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

fn find_line_end(data: &[u8]) -> Option<usize> {
    data.iter().position(|&b| b == b'\r' || b == b'\n')
}

/// Names are byte strings; each byte maps to the char of the same value.
pub(crate) fn name_from_bytes(bytes: &[u8]) -> String {
    bytes.iter().copied().map(char::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(data: &[u8]) -> Vec<Token> {
        let mut lexer = Lexer::new(data);
        std::iter::from_fn(|| lexer.next_token())
            .map(|r| r.unwrap().1)
            .collect()
    }

    #[test]
    fn keyword_round_trip() {
        assert_eq!(Keyword::from_bytes(b"obj"), Keyword::Obj);
        assert_eq!(Keyword::from_bytes(b"startxref"), Keyword::StartXref);
        assert_eq!(Keyword::EndStream.as_bytes(), b"endstream");
        assert_eq!(
            Keyword::from_bytes(b"BT"),
            Keyword::Other(b"BT".to_vec())
        );
    }

    #[test]
    fn names_resolve_hex_escapes() {
        assert_eq!(
            tokens(b"/A#20B /C#2"),
            vec![Token::Name("A B".into()), Token::Name("C2".into())]
        );
    }

    #[test]
    fn numbers_and_comments() {
        assert_eq!(
            tokens(b"12 % comment\n-3.5 +.5 4."),
            vec![
                Token::Int(12),
                Token::Real(-3.5),
                Token::Real(0.5),
                Token::Real(4.0)
            ]
        );
    }

    #[test]
    fn literal_string_escapes() {
        assert_eq!(
            tokens(b"(a\\(b\\)\\101\\\nc(d))"),
            vec![Token::String(b"a(b)Ac(d)".to_vec())]
        );
    }

    #[test]
    fn hex_string_odd_length() {
        assert_eq!(
            tokens(b"<48 65 6C 6C 6F 7>"),
            vec![Token::HexString(b"Hello\x70".to_vec())]
        );
    }

    #[test]
    fn dict_delimiters_and_keywords() {
        assert_eq!(
            tokens(b"<</K true>>null"),
            vec![
                Token::Keyword(Keyword::DictStart),
                Token::Name("K".into()),
                Token::Bool(true),
                Token::Keyword(Keyword::DictEnd),
                Token::Keyword(Keyword::Null),
            ]
        );
    }

    #[test]
    fn unterminated_string_is_eof() {
        let mut lexer = Lexer::new(b"(abc");
        assert!(matches!(
            lexer.next_token(),
            Some(Err(PdfError::UnexpectedEof))
        ));
    }
}
