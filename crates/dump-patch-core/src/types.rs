//! Token and cursor types shared by the scanner, recognizer and rewrite engine.
//!
//! All offsets of serialized tokens are in decoded coordinates: positions in
//! the content of a SQL literal after its backslash escapes are resolved.

use std::ops::Range;

/// A validated `s:<N>:"<content>";` occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedStringToken {
    /// Offset of the leading `s`.
    pub start: usize,
    /// The length the framing declares, in bytes.
    pub declared_length: usize,
    /// Where the length digits sit.
    pub digits: Range<usize>,
    /// First content byte (just past `:"`).
    pub content_start: usize,
    /// One past the last content byte (the closing `"`).
    pub content_end: usize,
}

impl SerializedStringToken {
    /// Offset just past the closing `";`.
    #[inline]
    pub fn end(&self) -> usize {
        self.content_end + 2
    }
}

/// A validated `C:<len>:"<class>":<N>:{<payload>}` custom object.
///
/// The payload is whatever the class's `serialize()` produced; only its byte
/// length is framed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomObjectToken {
    /// Offset of the leading `C`.
    pub start: usize,
    /// The payload length the framing declares, in bytes.
    pub declared_length: usize,
    /// Where the payload length digits sit.
    pub digits: Range<usize>,
    /// First payload byte (just past `:{`).
    pub payload_start: usize,
    /// One past the last payload byte (the closing `}`).
    pub payload_end: usize,
}

impl CustomObjectToken {
    /// Offset just past the closing `}`.
    #[inline]
    pub fn end(&self) -> usize {
        self.payload_end + 1
    }
}

/// The kind of a composite serialized value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// `a:<count>:{...}`
    Array,
    /// `O:<len>:"<class>":<count>:{...}`
    Object,
}

impl ContainerKind {
    /// A type name for log messages.
    pub fn type_name(self) -> &'static str {
        match self {
            ContainerKind::Array => "array",
            ContainerKind::Object => "object",
        }
    }
}

/// A validated container header, up to and including the opening `{`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHeader {
    /// Array or object.
    pub kind: ContainerKind,
    /// Offset of the leading `a` or `O`.
    pub start: usize,
    /// Declared element count (pairs for arrays, properties for objects).
    pub count: usize,
    /// Offset just past `{`.
    pub body_start: usize,
}

impl ContainerHeader {
    /// Number of values the body must contain: one key and one value per element.
    #[inline]
    pub fn expected_values(&self) -> usize {
        self.count.saturating_mul(2)
    }
}

/// What starts at a given offset of decoded content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Nothing structural: ordinary content.
    Plain,
    /// A serialized string whose content may be rewritten.
    SerializedString(SerializedStringToken),
    /// An array or object whose body holds further values.
    Container(ContainerHeader),
    /// A custom-serialized object whose payload may be rewritten.
    CustomObject(CustomObjectToken),
}

/// Lexical state of a dump line scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LexState {
    /// Outside any SQL string literal.
    #[default]
    Plain,
    /// Inside a literal opened by the given quote byte.
    InLiteral(u8),
}

/// Scanning position in a line plus its lexical state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursor {
    /// Byte offset into the raw line.
    pub pos: usize,
    /// Whether the cursor sits inside a literal.
    pub state: LexState,
}

impl Cursor {
    /// A cursor at the start of a line, in plain context.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }
}
