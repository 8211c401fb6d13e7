//! PDF object parser - builds objects from lexer tokens.

use super::lexer::{Keyword, Lexer, Token};
use crate::error::{PdfError, Result};
use crate::model::{Dictionary, IndirectObject, PDFObjRef, PDFObject, PDFStream, PDFString};
use bytes::Bytes;

/// Nesting limit for arrays and dictionaries.
const MAX_DEPTH: usize = 256;

/// Recursive-descent parser over a [`Lexer`].
///
/// `N G R` references are recognized with a two-token lookahead.
pub struct ObjectParser<'a> {
    lexer: Lexer<'a>,
    /// Pushed-back tokens, most recent last
    lookahead: Vec<(usize, Token)>,
}

impl<'a> ObjectParser<'a> {
    pub const fn new(data: &'a [u8]) -> Self {
        Self {
            lexer: Lexer::new(data),
            lookahead: Vec::new(),
        }
    }

    /// Parser positioned at `pos`.
    pub const fn at(data: &'a [u8], pos: usize) -> Self {
        Self {
            lexer: Lexer::at(data, pos),
            lookahead: Vec::new(),
        }
    }

    /// Offset of the next unread token.
    pub fn tell(&self) -> usize {
        self.lookahead
            .last()
            .map_or_else(|| self.lexer.tell(), |(pos, _)| *pos)
    }

    pub fn set_pos(&mut self, pos: usize) {
        self.lookahead.clear();
        self.lexer.set_pos(pos);
    }

    fn next_token(&mut self) -> Result<Option<(usize, Token)>> {
        if let Some(tok) = self.lookahead.pop() {
            return Ok(Some(tok));
        }
        self.lexer.next_token().transpose()
    }

    fn expect_token(&mut self) -> Result<(usize, Token)> {
        self.next_token()?.ok_or(PdfError::UnexpectedEof)
    }

    fn push_back(&mut self, tok: (usize, Token)) {
        self.lookahead.push(tok);
    }

    /// Parse the next direct object.
    pub fn parse_object(&mut self) -> Result<PDFObject> {
        self.parse_nested(0)
    }

    fn parse_nested(&mut self, depth: usize) -> Result<PDFObject> {
        let tok = self.expect_token()?;
        self.token_to_object(tok, depth)
    }

    fn token_to_object(&mut self, (pos, token): (usize, Token), depth: usize) -> Result<PDFObject> {
        match token {
            Token::Int(n) => self.int_or_reference(n),
            Token::Real(n) => Ok(PDFObject::Real(n)),
            Token::Bool(b) => Ok(PDFObject::Bool(b)),
            Token::Name(s) => Ok(PDFObject::Name(s)),
            Token::String(s) => Ok(PDFObject::String(PDFString::literal(s))),
            Token::HexString(s) => Ok(PDFObject::String(PDFString::hex(s))),
            Token::Keyword(Keyword::Null) => Ok(PDFObject::Null),
            Token::Keyword(Keyword::ArrayStart | Keyword::DictStart) if depth >= MAX_DEPTH => {
                Err(PdfError::SyntaxError(format!(
                    "objects nested deeper than {MAX_DEPTH} at offset {pos}"
                )))
            }
            Token::Keyword(Keyword::ArrayStart) => self.parse_array(depth + 1),
            Token::Keyword(Keyword::DictStart) => self.parse_dict(depth + 1),
            Token::Keyword(kw) => Err(PdfError::TokenError {
                pos,
                msg: format!(
                    "unexpected keyword: {}",
                    String::from_utf8_lossy(kw.as_bytes())
                ),
            }),
        }
    }

    /// `n` alone, or `n g R`.
    fn int_or_reference(&mut self, n: i64) -> Result<PDFObject> {
        let Some(second) = self.next_token()? else {
            return Ok(PDFObject::Int(n));
        };
        let Token::Int(g) = second.1 else {
            self.push_back(second);
            return Ok(PDFObject::Int(n));
        };
        match self.next_token()? {
            Some((_, Token::Keyword(Keyword::R))) => {
                let objid = u32::try_from(n).map_err(|_| {
                    PdfError::SyntaxError(format!("invalid object number {n} in reference"))
                })?;
                Ok(PDFObject::Ref(PDFObjRef::new(objid, g.clamp(0, 65535) as u32)))
            }
            third => {
                if let Some(third) = third {
                    self.push_back(third);
                }
                self.push_back(second);
                Ok(PDFObject::Int(n))
            }
        }
    }

    fn parse_array(&mut self, depth: usize) -> Result<PDFObject> {
        let mut arr = Vec::new();
        loop {
            let tok = self.expect_token()?;
            if tok.1 == Token::Keyword(Keyword::ArrayEnd) {
                break;
            }
            arr.push(self.token_to_object(tok, depth)?);
        }
        Ok(PDFObject::Array(arr))
    }

    fn parse_dict(&mut self, depth: usize) -> Result<PDFObject> {
        let mut dict = Dictionary::new();
        loop {
            let (pos, token) = self.expect_token()?;
            let key = match token {
                Token::Keyword(Keyword::DictEnd) => break,
                Token::Name(name) => name,
                _ => {
                    return Err(PdfError::TokenError {
                        pos,
                        msg: "expected name as dict key".into(),
                    });
                }
            };
            let value = self.parse_nested(depth)?;
            // A null value is the same as an absent key.
            if !value.is_null() {
                dict.insert(key, value);
            }
        }
        Ok(PDFObject::Dict(dict))
    }

    /// Read `N G obj`, returning the object and generation numbers.
    pub fn parse_indirect_header(&mut self) -> Result<(u32, u32)> {
        let (pos, first) = self.expect_token()?;
        let (_, second) = self.expect_token()?;
        let (_, third) = self.expect_token()?;
        match (first, second, third) {
            (Token::Int(n), Token::Int(g), Token::Keyword(Keyword::Obj)) => {
                let objid = u32::try_from(n)
                    .map_err(|_| PdfError::SyntaxError(format!("invalid object number {n}")))?;
                Ok((objid, g.clamp(0, 65535) as u32))
            }
            _ => Err(PdfError::SyntaxError(format!(
                "expected 'N G obj' at offset {pos}"
            ))),
        }
    }

    /// Parse `N G obj ... endobj` at the current position.
    ///
    /// `resolve_length` is asked for the value of an indirect `Length`.
    /// When the length is missing or does not end at `endstream`, the data
    /// runs to the next `endstream` keyword.
    pub fn parse_indirect_object<F>(&mut self, resolve_length: F) -> Result<IndirectObject>
    where
        F: FnOnce(PDFObjRef) -> Option<i64>,
    {
        let (objid, genno) = self.parse_indirect_header()?;
        let object = self.parse_object()?;

        let object = match object {
            PDFObject::Dict(attrs) => match self.next_token()? {
                Some((_, Token::Keyword(Keyword::Stream))) => {
                    let length = match attrs.get("Length") {
                        Some(PDFObject::Int(n)) => Some(*n),
                        Some(PDFObject::Ref(r)) => resolve_length(*r),
                        _ => None,
                    };
                    let data = self.read_stream_data(length);
                    PDFObject::Stream(Box::new(PDFStream::new(attrs, data)))
                }
                other => {
                    if let Some(tok) = other {
                        self.push_back(tok);
                    }
                    PDFObject::Dict(attrs)
                }
            },
            other => other,
        };

        if let Ok(Some(tok)) = self.next_token()
            && tok.1 != Token::Keyword(Keyword::EndObj)
        {
            self.push_back(tok);
        }

        Ok(IndirectObject::new(objid, genno, object))
    }

    /// Read stream bytes after the `stream` keyword, leaving the parser
    /// after `endstream`.
    fn read_stream_data(&mut self, length: Option<i64>) -> Bytes {
        self.lookahead.clear();
        let data = self.lexer.data();
        let mut start = self.lexer.tell();
        // The keyword is followed by CRLF or LF; tolerate a lone CR.
        if data.get(start) == Some(&b'\r') {
            start += 1;
        }
        if data.get(start) == Some(&b'\n') {
            start += 1;
        }

        let declared = length
            .and_then(|n| usize::try_from(n).ok())
            .and_then(|n| start.checked_add(n))
            .filter(|&end| end <= data.len() && ends_at_endstream(&data[end..]));

        let (end, resume) = match declared {
            Some(end) => (end, end),
            None => match find_endstream(&data[start..]) {
                Some((end, keyword)) => (start + end, start + keyword),
                None => (data.len(), data.len()),
            },
        };

        self.lexer.set_pos(resume);
        if !matches!(
            self.lexer.next_token(),
            Some(Ok((_, Token::Keyword(Keyword::EndStream))))
        ) {
            self.lexer.set_pos(resume);
        }
        Bytes::copy_from_slice(&data[start..end])
    }
}

fn ends_at_endstream(data: &[u8]) -> bool {
    let skip = data
        .iter()
        .position(|&b| !Lexer::is_whitespace(b))
        .unwrap_or(data.len());
    data[skip..].starts_with(b"endstream")
}

/// Returns (end of data with the trailing EOL trimmed, offset of the keyword).
fn find_endstream(data: &[u8]) -> Option<(usize, usize)> {
    let needle = b"endstream";
    let pos = data.windows(needle.len()).position(|w| w == needle)?;
    let mut end = pos;
    if end > 0 && data[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && data[end - 1] == b'\r' {
        end -= 1;
    }
    Some((end, pos))
}
