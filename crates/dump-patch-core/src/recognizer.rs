//! Recognition of PHP serialize framing inside decoded content.
//!
//! Every function here answers "does a valid token start at this offset?"
//! and returns `None` when it does not. A near miss is never an error: dumps
//! are full of text that only looks like serialized data.
//!
//! All scanning is bounded by a `limit` offset so a token can never extend
//! past the end of the string or literal that encloses it.

use std::ops::Range;

use memchr::memchr;

use crate::types::{
    ContainerHeader, ContainerKind, CustomObjectToken, SerializedStringToken, Token,
};

/// A value found inside a container body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Element {
    /// A value with nothing to rewrite (`i:`, `d:`, `b:`, `N;`, `r:`, `R:`, `E:`).
    Scalar {
        /// Offset just past the value's `;`.
        end: usize,
    },
    /// A string whose content may be rewritten.
    String(SerializedStringToken),
    /// A nested array or object.
    Container(ContainerHeader),
    /// A custom-serialized object whose payload may be rewritten.
    CustomObject(CustomObjectToken),
}

/// Classify the content at `at` for a free-text scan.
///
/// Only strings, containers and custom objects are structural here; scalars
/// outside a container are left to ordinary replacement.
#[inline]
pub fn classify(data: &[u8], at: usize, limit: usize) -> Token {
    let recognized = match data.get(at) {
        Some(b's') => serialized_string(data, at, limit).map(Token::SerializedString),
        Some(b'a' | b'O') => container_header(data, at, limit).map(Token::Container),
        Some(b'C') => custom_object(data, at, limit).map(Token::CustomObject),
        _ => None,
    };
    recognized.unwrap_or(Token::Plain)
}

/// Recognize `s:<N>:"<N bytes>";` starting at `at`.
pub fn serialized_string(data: &[u8], at: usize, limit: usize) -> Option<SerializedStringToken> {
    let mut r = Recognizer::new(data, at, limit);
    r.expect_byte(b's')?;
    r.expect_byte(b':')?;
    let (declared_length, digits) = r.read_length()?;
    r.expect_byte(b':')?;
    r.expect_byte(b'"')?;

    let content_start = r.pos;
    r.skip(declared_length)?;
    let content_end = r.pos;
    r.expect_byte(b'"')?;
    r.expect_byte(b';')?;

    Some(SerializedStringToken {
        start: at,
        declared_length,
        digits,
        content_start,
        content_end,
    })
}

/// Recognize `a:<count>:{` or `O:<len>:"<class>":<count>:{` starting at `at`.
pub fn container_header(data: &[u8], at: usize, limit: usize) -> Option<ContainerHeader> {
    let mut r = Recognizer::new(data, at, limit);
    let kind = match r.read_byte()? {
        b'a' => ContainerKind::Array,
        b'O' => ContainerKind::Object,
        _ => return None,
    };
    r.expect_byte(b':')?;

    if kind == ContainerKind::Object {
        let (name_len, _) = r.read_length()?;
        r.expect_byte(b':')?;
        r.expect_byte(b'"')?;
        r.skip(name_len)?;
        r.expect_byte(b'"')?;
        r.expect_byte(b':')?;
    }

    let (count, _) = r.read_length()?;
    r.expect_byte(b':')?;
    r.expect_byte(b'{')?;

    Some(ContainerHeader {
        kind,
        start: at,
        count,
        body_start: r.pos,
    })
}

/// Recognize `C:<len>:"<class>":<N>:{<N bytes>}` starting at `at`.
pub fn custom_object(data: &[u8], at: usize, limit: usize) -> Option<CustomObjectToken> {
    let mut r = Recognizer::new(data, at, limit);
    r.expect_byte(b'C')?;
    r.expect_byte(b':')?;
    let (name_len, _) = r.read_length()?;
    r.expect_byte(b':')?;
    r.expect_byte(b'"')?;
    r.skip(name_len)?;
    r.expect_byte(b'"')?;
    r.expect_byte(b':')?;

    let (declared_length, digits) = r.read_length()?;
    r.expect_byte(b':')?;
    r.expect_byte(b'{')?;

    let payload_start = r.pos;
    r.skip(declared_length)?;
    let payload_end = r.pos;
    r.expect_byte(b'}')?;

    Some(CustomObjectToken {
        start: at,
        declared_length,
        digits,
        payload_start,
        payload_end,
    })
}

/// Recognize any value allowed inside a container body.
pub fn element(data: &[u8], at: usize, limit: usize) -> Option<Element> {
    match *data.get(at)? {
        b's' => serialized_string(data, at, limit).map(Element::String),
        b'a' | b'O' => container_header(data, at, limit).map(Element::Container),
        b'C' => custom_object(data, at, limit).map(Element::CustomObject),
        _ => scalar_end(data, at, limit).map(|end| Element::Scalar { end }),
    }
}

/// Recognize a scalar value starting at `at` and return the offset past it.
pub fn scalar_end(data: &[u8], at: usize, limit: usize) -> Option<usize> {
    let mut r = Recognizer::new(data, at, limit);
    match r.read_byte()? {
        b'N' => {}
        b'b' => {
            r.expect_byte(b':')?;
            if !matches!(r.read_byte()?, b'0' | b'1') {
                return None;
            }
        }
        b'i' => {
            r.expect_byte(b':')?;
            let value = r.read_until(b';')?;
            let digits = value.strip_prefix(b"-").unwrap_or(value);
            if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
                return None;
            }
        }
        b'd' => {
            r.expect_byte(b':')?;
            let value = std::str::from_utf8(r.read_until(b';')?).ok()?;
            if !matches!(value, "INF" | "-INF" | "NAN") {
                value.parse::<f64>().ok()?;
            }
        }
        b'r' | b'R' => {
            r.expect_byte(b':')?;
            let value = r.read_until(b';')?;
            if value.is_empty() || !value.iter().all(u8::is_ascii_digit) {
                return None;
            }
        }
        b'E' => {
            r.expect_byte(b':')?;
            let (len, _) = r.read_length()?;
            r.expect_byte(b':')?;
            r.expect_byte(b'"')?;
            r.skip(len)?;
            r.expect_byte(b'"')?;
        }
        _ => return None,
    }
    r.expect_byte(b';')?;
    Some(r.pos)
}

/// A bounded cursor over decoded content.
struct Recognizer<'a> {
    data: &'a [u8],
    pos: usize,
    limit: usize,
}

impl<'a> Recognizer<'a> {
    #[inline]
    fn new(data: &'a [u8], at: usize, limit: usize) -> Self {
        Self {
            data,
            pos: at,
            limit: limit.min(data.len()),
        }
    }

    /// Peek at the current byte without consuming it.
    #[inline(always)]
    fn peek_byte(&self) -> Option<u8> {
        if self.pos < self.limit {
            Some(self.data[self.pos])
        } else {
            None
        }
    }

    /// Read and consume the current byte.
    #[inline(always)]
    fn read_byte(&mut self) -> Option<u8> {
        let byte = self.peek_byte()?;
        self.pos += 1;
        Some(byte)
    }

    #[inline]
    fn expect_byte(&mut self, expected: u8) -> Option<()> {
        (self.read_byte()? == expected).then_some(())
    }

    /// Advance by `n` bytes if they are all within the limit.
    #[inline]
    fn skip(&mut self, n: usize) -> Option<()> {
        let end = self.pos.checked_add(n)?;
        if end > self.limit {
            return None;
        }
        self.pos = end;
        Some(())
    }

    /// Read the bytes before the next `delimiter`, leaving it unconsumed.
    #[inline]
    fn read_until(&mut self, delimiter: u8) -> Option<&'a [u8]> {
        let start = self.pos;
        let offset = memchr(delimiter, &self.data[start..self.limit])?;
        self.pos = start + offset;
        Some(&self.data[start..start + offset])
    }

    /// Read a decimal length or count.
    ///
    /// At least one digit, no leading zero unless the number is `0` itself,
    /// no overflow.
    fn read_length(&mut self) -> Option<(usize, Range<usize>)> {
        let start = self.pos;
        let mut value: usize = 0;
        while let Some(b) = self.peek_byte() {
            if !b.is_ascii_digit() {
                break;
            }
            if self.pos > start && value == 0 {
                return None;
            }
            value = value.checked_mul(10)?.checked_add(usize::from(b - b'0'))?;
            self.pos += 1;
        }
        if self.pos == start {
            return None;
        }
        Some((value, start..self.pos))
    }
}
