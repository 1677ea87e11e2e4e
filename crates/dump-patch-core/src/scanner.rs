//! Escape-aware scanning of dump lines.
//!
//! A dump line is split into [`Segment`]s: plain SQL runs, runs that must pass
//! through untouched (hex and bit literals), and string literals. Literal
//! bodies are decoded with MySQL's backslash rules into a [`DecodedLiteral`],
//! which remembers where every decoded byte came from so unchanged content is
//! written back with its original escaping.
//!
//! Length prefixes of serialized strings count decoded bytes: an on-disk `\"`
//! is one content byte.

use std::borrow::Cow;
use std::ops::Range;

use memchr::{memchr, memchr2};

use crate::types::{Cursor, LexState};

/// A classified run of a dump line, in raw line coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// SQL outside any literal. Replacement applies, escaping does not.
    Plain(Range<usize>),
    /// Bytes copied as-is: `0x...`, `X'...'` and `B'...'` literals.
    Verbatim(Range<usize>),
    /// A string literal body, without its quotes.
    Literal {
        /// The quote byte that opened the literal.
        quote: u8,
        /// The escaped body between the quotes.
        body: Range<usize>,
        /// False if the line ended before the closing quote.
        closed: bool,
    },
}

/// Splits one dump line into segments, threading an explicit [`Cursor`].
pub struct LineScanner<'a> {
    line: &'a [u8],
    quotes: &'a [u8],
    cursor: Cursor,
}

impl<'a> LineScanner<'a> {
    /// Scan `line`, treating each byte of `quotes` as a literal delimiter.
    pub fn new(line: &'a [u8], quotes: &'a [u8]) -> Self {
        Self {
            line,
            quotes,
            cursor: Cursor::new(),
        }
    }

    #[cfg(test)]
    fn cursor(&self) -> Cursor {
        self.cursor
    }

    #[inline]
    fn is_quote(&self, byte: u8) -> bool {
        self.quotes.contains(&byte)
    }

    fn plain_run(&mut self) -> Segment {
        let start = self.cursor.pos;
        let mut i = start;
        while i < self.line.len() {
            let b = self.line[i];
            if self.is_quote(b) || (b == b'0' && hex_literal_end(self.line, i).is_some()) {
                break;
            }
            i += 1;
        }
        self.cursor.pos = i;
        Segment::Plain(start..i)
    }

    fn literal(&mut self, quote: u8) -> Segment {
        let start = self.cursor.pos;
        let mut i = start;
        loop {
            match memchr2(b'\\', quote, &self.line[i..]) {
                Some(offset) if self.line[i + offset] == b'\\' => {
                    i = (i + offset + 2).min(self.line.len());
                }
                Some(offset) => {
                    let close = i + offset;
                    self.cursor = Cursor {
                        pos: close + 1,
                        state: LexState::Plain,
                    };
                    return Segment::Literal {
                        quote,
                        body: start..close,
                        closed: true,
                    };
                }
                None => {
                    // Left open: the rest of the line is literal content.
                    self.cursor.pos = self.line.len();
                    return Segment::Literal {
                        quote,
                        body: start..self.line.len(),
                        closed: false,
                    };
                }
            }
        }
    }
}

impl Iterator for LineScanner<'_> {
    type Item = Segment;

    fn next(&mut self) -> Option<Segment> {
        let pos = self.cursor.pos;
        let byte = *self.line.get(pos)?;

        if let LexState::InLiteral(quote) = self.cursor.state {
            return Some(self.literal(quote));
        }

        if byte == b'0' {
            if let Some(end) = hex_literal_end(self.line, pos) {
                self.cursor.pos = end;
                return Some(Segment::Verbatim(pos..end));
            }
        }

        if self.is_quote(byte) {
            if byte == b'\'' && has_binary_prefix(self.line, pos) {
                let end = memchr(byte, &self.line[pos + 1..])
                    .map_or(self.line.len(), |offset| pos + 1 + offset + 1);
                self.cursor.pos = end;
                return Some(Segment::Verbatim(pos..end));
            }
            self.cursor = Cursor {
                pos: pos + 1,
                state: LexState::InLiteral(byte),
            };
            return Some(self.literal(byte));
        }

        Some(self.plain_run())
    }
}

#[inline]
fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

/// End of a `0x<hex>` literal starting at `pos`, if one starts there.
fn hex_literal_end(line: &[u8], pos: usize) -> Option<usize> {
    if pos > 0 && is_ident_byte(line[pos - 1]) {
        return None;
    }
    match line.get(pos..pos + 3) {
        Some([b'0', b'x' | b'X', d]) if d.is_ascii_hexdigit() => {}
        _ => return None,
    }
    let digits = line[pos + 2..]
        .iter()
        .take_while(|b| b.is_ascii_hexdigit())
        .count();
    Some(pos + 2 + digits)
}

/// Whether the quote at `pos` opens an `X'..'` or `B'..'` literal.
fn has_binary_prefix(line: &[u8], pos: usize) -> bool {
    if pos == 0 || !matches!(line[pos - 1], b'x' | b'X' | b'b' | b'B') {
        return false;
    }
    pos < 2 || !is_ident_byte(line[pos - 2])
}

/// Decode the byte following a backslash.
///
/// `\%` and `\_` are not handled here: MySQL keeps both bytes.
#[inline]
pub fn unescape_byte(b: u8) -> u8 {
    match b {
        b'0' => 0,
        b'b' => 0x08,
        b'n' => b'\n',
        b'r' => b'\r',
        b't' => b'\t',
        b'Z' => 0x1A,
        other => other,
    }
}

#[inline]
fn escape_sequence(b: u8) -> Option<&'static [u8; 2]> {
    match b {
        0 => Some(b"\\0"),
        b'\n' => Some(b"\\n"),
        b'\r' => Some(b"\\r"),
        b'\\' => Some(b"\\\\"),
        b'\'' => Some(b"\\'"),
        b'"' => Some(b"\\\""),
        0x1A => Some(b"\\Z"),
        _ => None,
    }
}

/// Append `bytes` escaped the way `mysqldump` escapes literal content.
pub fn escape_into(bytes: &[u8], out: &mut Vec<u8>) {
    let mut run = 0;
    for (i, &b) in bytes.iter().enumerate() {
        if let Some(seq) = escape_sequence(b) {
            out.extend_from_slice(&bytes[run..i]);
            out.extend_from_slice(seq);
            run = i + 1;
        }
    }
    out.extend_from_slice(&bytes[run..]);
}

/// A byte buffer the rewrite engine reads decoded content from and writes
/// output for.
pub trait Source {
    /// The content the engine scans.
    fn decoded(&self) -> &[u8];

    /// Append the original on-disk form of a decoded range.
    fn write_original(&self, range: Range<usize>, out: &mut Vec<u8>);

    /// Append newly produced decoded bytes in on-disk form.
    fn write_new(&self, bytes: &[u8], out: &mut Vec<u8>);
}

/// A buffer whose on-disk and decoded forms are the same.
#[derive(Debug, Clone, Copy)]
pub struct RawBuffer<'a>(pub &'a [u8]);

impl Source for RawBuffer<'_> {
    #[inline]
    fn decoded(&self) -> &[u8] {
        self.0
    }

    #[inline]
    fn write_original(&self, range: Range<usize>, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.0[range]);
    }

    #[inline]
    fn write_new(&self, bytes: &[u8], out: &mut Vec<u8>) {
        out.extend_from_slice(bytes);
    }
}

/// The decoded content of one SQL string literal.
#[derive(Debug, Clone)]
pub struct DecodedLiteral<'a> {
    raw: &'a [u8],
    decoded: Cow<'a, [u8]>,
    /// On-disk offset of each decoded byte plus one trailing entry.
    /// `None` when the body has no escapes.
    offsets: Option<Vec<usize>>,
}

impl<'a> DecodedLiteral<'a> {
    /// Decode an escaped literal body (without its quotes).
    pub fn decode(raw: &'a [u8]) -> Self {
        if memchr(b'\\', raw).is_none() {
            return Self {
                raw,
                decoded: Cow::Borrowed(raw),
                offsets: None,
            };
        }

        let mut decoded = Vec::with_capacity(raw.len());
        let mut offsets = Vec::with_capacity(raw.len() + 1);
        let mut i = 0;
        while i < raw.len() {
            let b = raw[i];
            if b == b'\\' && i + 1 < raw.len() {
                let next = raw[i + 1];
                if matches!(next, b'%' | b'_') {
                    decoded.extend_from_slice(&[b'\\', next]);
                    offsets.extend_from_slice(&[i, i + 1]);
                } else {
                    decoded.push(unescape_byte(next));
                    offsets.push(i);
                }
                i += 2;
            } else {
                decoded.push(b);
                offsets.push(i);
                i += 1;
            }
        }
        offsets.push(raw.len());

        Self {
            raw,
            decoded: Cow::Owned(decoded),
            offsets: Some(offsets),
        }
    }

    /// On-disk offset of decoded offset `index` (which may equal the length).
    #[inline]
    pub fn raw_offset(&self, index: usize) -> usize {
        self.offsets.as_ref().map_or(index, |offsets| offsets[index])
    }
}

impl Source for DecodedLiteral<'_> {
    #[inline]
    fn decoded(&self) -> &[u8] {
        &self.decoded
    }

    #[inline]
    fn write_original(&self, range: Range<usize>, out: &mut Vec<u8>) {
        let start = self.raw_offset(range.start);
        let end = self.raw_offset(range.end);
        out.extend_from_slice(&self.raw[start..end]);
    }

    #[inline]
    fn write_new(&self, bytes: &[u8], out: &mut Vec<u8>) {
        escape_into(bytes, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segments(line: &[u8]) -> Vec<Segment> {
        LineScanner::new(line, b"'").collect()
    }

    #[test]
    fn test_insert_row_segments() {
        let line = b"(1,'abc',0x4142)";
        assert_eq!(
            segments(line),
            vec![
                Segment::Plain(0..3),
                Segment::Literal {
                    quote: b'\'',
                    body: 4..7,
                    closed: true
                },
                Segment::Plain(8..9),
                Segment::Verbatim(9..15),
                Segment::Plain(15..16),
            ]
        );
    }

    #[test]
    fn test_escaped_quote_does_not_close() {
        let line = br"'it\'s','x'";
        let segs = segments(line);
        assert_eq!(
            segs[0],
            Segment::Literal {
                quote: b'\'',
                body: 1..6,
                closed: true
            }
        );
        assert_eq!(segs.len(), 3);
    }

    #[test]
    fn test_escaped_backslash_before_quote_closes() {
        let line = br"'a\\',1";
        let segs = segments(line);
        assert_eq!(
            segs[0],
            Segment::Literal {
                quote: b'\'',
                body: 1..4,
                closed: true
            }
        );
        assert_eq!(segs[1], Segment::Plain(5..7));
    }

    #[test]
    fn test_unterminated_literal_runs_to_end() {
        let line = b"-- it's a comment";
        let mut scanner = LineScanner::new(line, b"'");
        assert_eq!(scanner.next(), Some(Segment::Plain(0..5)));
        assert_eq!(
            scanner.next(),
            Some(Segment::Literal {
                quote: b'\'',
                body: 6..line.len(),
                closed: false
            })
        );
        assert_eq!(scanner.next(), None);
        assert_eq!(scanner.cursor().state, LexState::InLiteral(b'\''));
    }

    #[test]
    fn test_hex_requires_token_boundary() {
        // `a0x1` is an identifier, not a hex literal.
        assert_eq!(segments(b"a0x1"), vec![Segment::Plain(0..4)]);
        assert_eq!(
            segments(b"(0xFF)"),
            vec![
                Segment::Plain(0..1),
                Segment::Verbatim(1..5),
                Segment::Plain(5..6)
            ]
        );
    }

    #[test]
    fn test_prefixed_binary_literal_is_verbatim() {
        let segs = segments(b"(X'6f6c64',B'0101')");
        assert_eq!(segs[0], Segment::Plain(0..2));
        assert_eq!(segs[1], Segment::Verbatim(2..10));
        assert_eq!(segs[2], Segment::Plain(10..12));
        assert_eq!(segs[3], Segment::Verbatim(12..18));
    }

    #[test]
    fn test_double_quote_delimiter() {
        let segs: Vec<_> = LineScanner::new(b"\"a'b\"", b"\"").collect();
        assert_eq!(
            segs,
            vec![Segment::Literal {
                quote: b'"',
                body: 1..4,
                closed: true
            }]
        );
    }

    #[test]
    fn test_decode_without_escapes_borrows() {
        let lit = DecodedLiteral::decode(b"plain");
        assert!(matches!(lit.decoded, Cow::Borrowed(_)));
        assert_eq!(lit.raw_offset(4), 4);
    }

    #[test]
    fn test_decode_offsets() {
        let raw = br#"s:2:\"a\'\";"#;
        let lit = DecodedLiteral::decode(raw);
        assert_eq!(lit.decoded(), br#"s:2:"a'";"#);
        // `"a'` decodes to 3 bytes but takes 5 on disk.
        assert_eq!(lit.raw_offset(7) - lit.raw_offset(4), 5);
        let mut out = Vec::new();
        lit.write_original(0..lit.decoded().len(), &mut out);
        assert_eq!(out, raw);
    }

    #[test]
    fn test_decode_special_escapes() {
        let lit = DecodedLiteral::decode(br"\0\n\r\t\Z\b\\\%\_\q");
        assert_eq!(
            lit.decoded(),
            b"\x00\n\r\t\x1a\x08\\\\%\\_q".as_slice()
        );
    }

    #[test]
    fn test_trailing_backslash_kept() {
        let lit = DecodedLiteral::decode(b"ab\\");
        assert_eq!(lit.decoded(), b"ab\\");
    }

    #[test]
    fn test_escape_into() {
        let mut out = Vec::new();
        escape_into(b"O'Neil \"x\"\n\\\x00", &mut out);
        assert_eq!(out, br#"O\'Neil \"x\"\n\\\0"#);
    }

    #[test]
    fn test_escape_roundtrip_through_decode() {
        let mut escaped = Vec::new();
        escape_into(b"a'b\"c\\d\ne\x1a", &mut escaped);
        let lit = DecodedLiteral::decode(&escaped);
        assert_eq!(lit.decoded(), b"a'b\"c\\d\ne\x1a");
    }
}
