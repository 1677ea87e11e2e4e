//! Serialization-aware rewrite engine.
//!
//! The engine walks decoded content left to right. Where PHP serialize framing
//! starts it descends into the value; everywhere else it applies the
//! [`ReplaceMap`]. Every rewritten `s:<N>:"...";` gets `N` recomputed from the
//! byte length of its new content, at any nesting depth.
//!
//! # Frames
//!
//! Nesting is tracked with an explicit stack of frames rather than call
//! recursion. Each frame owns the output produced for its content so far; a
//! string's (or custom object's) length prefix is written when its frame
//! closes, once the final content length is known.
//!
//! - *Free-text* frames (the buffer root, serialized string content and
//!   `C:` custom object payloads) accept anything. Tokens are recognized opportunistically and replacement applies
//!   between them.
//! - *Container* frames (`a:` and `O:` bodies) accept only serialized values.
//!   If an element does not parse, or the element count does not match the
//!   header on `}`, the container is abandoned together with every enclosing
//!   container up to the nearest free-text frame, and scanning resumes at the
//!   container's first byte as plain content. No container dropped this way
//!   is recognized again, so each byte is rescanned at most once.
//!
//! # Example
//!
//! ```rust
//! use dump_patch_core::{walk, ReplaceMap};
//!
//! let map = ReplaceMap::from_pairs([("hello", "hi")]).unwrap();
//! assert_eq!(walk(br#"s:5:"hello";"#, &map), br#"s:2:"hi";"#);
//! ```

use std::collections::HashSet;
use std::ops::Range;

#[cfg(feature = "tracing")]
use tracing::trace;

use crate::recognizer::{self, Element};
use crate::replace_map::ReplaceMap;
use crate::scanner::{DecodedLiteral, LineScanner, RawBuffer, Segment, Source};
use crate::types::{ContainerKind, CustomObjectToken, SerializedStringToken, Token};

/// Default cap on open frames.
pub const MAX_DEPTH: usize = 512;

/// Rewrite configuration options.
#[derive(Debug, Clone)]
pub struct PatchConfig {
    /// Bytes that open and close SQL string literals.
    pub quotes: Vec<u8>,
    /// Maximum number of open frames. Tokens nested deeper are left as plain
    /// content.
    pub max_depth: usize,
    /// Lines handed to the worker pool at once by the parallel patcher.
    pub batch_lines: usize,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            quotes: vec![b'\''],
            max_depth: MAX_DEPTH,
            batch_lines: 4096,
        }
    }
}

/// Rewrites buffers and dump lines with one replace map.
///
/// Cheap to share across threads; build it once per dump.
#[derive(Debug, Clone)]
pub struct Rewriter<'a> {
    map: &'a ReplaceMap,
    config: &'a PatchConfig,
    /// Bytes that can start a token or a replacement.
    interesting: [bool; 256],
}

impl<'a> Rewriter<'a> {
    /// Create a rewriter for `map`.
    pub fn new(map: &'a ReplaceMap, config: &'a PatchConfig) -> Self {
        let mut interesting = [false; 256];
        for b in [b's', b'a', b'O', b'C'] {
            interesting[usize::from(b)] = true;
        }
        for b in 0..=u8::MAX {
            if map.is_candidate(b) {
                interesting[usize::from(b)] = true;
            }
        }
        Self {
            map,
            config,
            interesting,
        }
    }

    /// Rewrite decoded content. No SQL lexing happens here.
    pub fn walk(&self, buffer: &[u8]) -> Vec<u8> {
        if self.map.is_empty() {
            return buffer.to_vec();
        }
        self.run(&RawBuffer(buffer)).bytes
    }

    /// Rewrite one raw dump line, starting in plain SQL context.
    ///
    /// Plain SQL gets replacement only. String literal content is decoded,
    /// walked, and written back with its original escaping wherever it did not
    /// change. Hex and bit literals are copied as-is.
    pub fn patch_line(&self, line: &[u8]) -> Vec<u8> {
        if self.map.is_empty() {
            return line.to_vec();
        }

        let mut out = Vec::with_capacity(line.len() + line.len() / 8);
        for segment in LineScanner::new(line, &self.config.quotes) {
            match segment {
                Segment::Plain(range) => {
                    self.map.replace_into(&line[range], &mut out);
                }
                Segment::Verbatim(range) => out.extend_from_slice(&line[range]),
                Segment::Literal {
                    quote,
                    body,
                    closed,
                } => {
                    out.push(quote);
                    let literal = DecodedLiteral::decode(&line[body]);
                    out.extend_from_slice(&self.run(&literal).bytes);
                    if closed {
                        out.push(quote);
                    }
                }
            }
        }
        out
    }

    fn run<S: Source + ?Sized>(&self, src: &S) -> Output {
        Walker::new(src, self).run()
    }
}

/// Rewrite decoded content with the default configuration.
///
/// # Example
///
/// ```rust
/// use dump_patch_core::{walk, ReplaceMap};
///
/// let map = ReplaceMap::from_pairs([("http://old", "http://new!")]).unwrap();
/// let out = walk(br#"a:1:{i:0;s:10:"http://old";}"#, &map);
/// assert_eq!(out, br#"a:1:{i:0;s:11:"http://new!";}"#);
/// ```
pub fn walk(buffer: &[u8], map: &ReplaceMap) -> Vec<u8> {
    walk_with_config(buffer, map, &PatchConfig::default())
}

/// Rewrite decoded content with a custom configuration.
pub fn walk_with_config(buffer: &[u8], map: &ReplaceMap, config: &PatchConfig) -> Vec<u8> {
    Rewriter::new(map, config).walk(buffer)
}

/// Rewrite one raw dump line with the default configuration.
///
/// # Example
///
/// ```rust
/// use dump_patch_core::{patch_line, ReplaceMap};
///
/// let map = ReplaceMap::from_pairs([("old.test", "new.example")]).unwrap();
/// let line = br#"(1,'home','s:15:\"http://old.test\";')"#;
/// assert_eq!(
///     patch_line(line, &map),
///     br#"(1,'home','s:18:\"http://new.example\";')"#
/// );
/// ```
pub fn patch_line(line: &[u8], map: &ReplaceMap) -> Vec<u8> {
    patch_line_with_config(line, map, &PatchConfig::default())
}

/// Rewrite one raw dump line with a custom configuration.
pub fn patch_line_with_config(line: &[u8], map: &ReplaceMap, config: &PatchConfig) -> Vec<u8> {
    Rewriter::new(map, config).patch_line(line)
}

/// Output of one frame, with its length in decoded bytes.
#[derive(Debug, Default)]
struct Output {
    bytes: Vec<u8>,
    decoded_len: usize,
}

impl Output {
    #[inline]
    fn original<S: Source + ?Sized>(&mut self, src: &S, range: Range<usize>) {
        self.decoded_len += range.len();
        src.write_original(range, &mut self.bytes);
    }

    #[inline]
    fn fresh<S: Source + ?Sized>(&mut self, src: &S, bytes: &[u8]) {
        self.decoded_len += bytes.len();
        src.write_new(bytes, &mut self.bytes);
    }

    #[inline]
    fn append(&mut self, child: Output) {
        self.bytes.extend_from_slice(&child.bytes);
        self.decoded_len += child.decoded_len;
    }
}

#[derive(Debug)]
enum FrameKind {
    Root,
    String(SerializedStringToken),
    CustomObject(CustomObjectToken),
    Container {
        #[cfg_attr(not(feature = "tracing"), allow(dead_code))]
        kind: ContainerKind,
        body_start: usize,
        expected_values: usize,
        values: usize,
    },
}

#[derive(Debug)]
struct Frame {
    kind: FrameKind,
    /// Offset of the token that opened the frame.
    start: usize,
    /// Scanning never passes this offset while the frame is open.
    end: usize,
    out: Output,
}

impl Frame {
    #[inline]
    fn is_container(&self) -> bool {
        matches!(self.kind, FrameKind::Container { .. })
    }
}

struct Walker<'w, S: Source + ?Sized> {
    src: &'w S,
    rewriter: &'w Rewriter<'w>,
    frames: Vec<Frame>,
    pos: usize,
    /// Starts of abandoned containers; never recognized again.
    suppressed: HashSet<usize>,
    /// Frames pushed over the whole walk.
    #[cfg_attr(not(any(test, feature = "tracing")), allow(dead_code))]
    opened: usize,
}

impl<'w, S: Source + ?Sized> Walker<'w, S> {
    fn new(src: &'w S, rewriter: &'w Rewriter<'w>) -> Self {
        Self {
            src,
            rewriter,
            frames: Vec::new(),
            pos: 0,
            suppressed: HashSet::new(),
            opened: 0,
        }
    }

    fn run(&mut self) -> Output {
        let len = self.src.decoded().len();
        self.frames.push(Frame {
            kind: FrameKind::Root,
            start: 0,
            end: len,
            out: Output {
                bytes: Vec::with_capacity(len),
                decoded_len: 0,
            },
        });

        loop {
            let Some(top) = self.frames.last() else {
                break;
            };
            let end = top.end;
            if top.is_container() {
                self.step_container(end);
            } else if self.pos < end {
                self.step_text(end);
            } else if self.frames.len() == 1 {
                break;
            } else if let Some(frame) = self.frames.pop() {
                self.close(frame);
            }
        }

        #[cfg(feature = "tracing")]
        if !self.suppressed.is_empty() {
            trace!(
                opened = self.opened,
                abandoned = self.suppressed.len(),
                "Walk finished with plain-text fallbacks"
            );
        }

        self.frames.pop().map(|frame| frame.out).unwrap_or_default()
    }

    #[inline]
    fn top(&mut self) -> &mut Output {
        let last = self.frames.len() - 1;
        &mut self.frames[last].out
    }

    #[inline]
    fn can_open(&self) -> bool {
        self.frames.len() < self.rewriter.config.max_depth
    }

    fn step_text(&mut self, end: usize) {
        let src = self.src;
        let rewriter = self.rewriter;
        let data = src.decoded();
        let pos = self.pos;

        if self.can_open() && !self.suppressed.contains(&pos) {
            match recognizer::classify(data, pos, end) {
                Token::SerializedString(token) => return self.open_string(token),
                Token::CustomObject(token) => return self.open_custom(token),
                Token::Container(header) => {
                    return self.open_container(
                        header.kind,
                        header.start,
                        header.body_start,
                        header.expected_values(),
                        end,
                    )
                }
                Token::Plain => {}
            }
        }

        if let Some(hit) = rewriter.map.find_at(&data[..end], pos) {
            self.top().fresh(src, hit.replace());
            self.pos += hit.search().len();
            return;
        }

        let interesting = &rewriter.interesting;
        let next = data[pos + 1..end]
            .iter()
            .position(|&b| interesting[usize::from(b)])
            .map_or(end, |offset| pos + 1 + offset);
        self.top().original(src, pos..next);
        self.pos = next;
    }

    fn step_container(&mut self, end: usize) {
        let src = self.src;
        let data = src.decoded();
        let pos = self.pos;

        let (expected_values, values) = match self.frames.last().map(|f| &f.kind) {
            Some(FrameKind::Container {
                expected_values,
                values,
                ..
            }) => (*expected_values, *values),
            _ => return,
        };

        if pos >= end {
            return self.abandon();
        }

        if data[pos] == b'}' {
            if values != expected_values {
                return self.abandon();
            }
            if let Some(frame) = self.frames.pop() {
                self.close(frame);
            }
            return;
        }

        if values >= expected_values {
            return self.abandon();
        }

        match recognizer::element(data, pos, end) {
            Some(Element::Scalar { end: scalar_end }) => {
                self.top().original(src, pos..scalar_end);
                self.pos = scalar_end;
                self.count_value();
            }
            Some(Element::String(token)) if self.can_open() => self.open_string(token),
            Some(Element::CustomObject(token)) if self.can_open() => self.open_custom(token),
            Some(Element::Container(header)) if self.can_open() => self.open_container(
                header.kind,
                header.start,
                header.body_start,
                header.expected_values(),
                end,
            ),
            _ => self.abandon(),
        }
    }

    #[inline]
    fn push(&mut self, frame: Frame) {
        self.opened += 1;
        self.frames.push(frame);
    }

    fn open_string(&mut self, token: SerializedStringToken) {
        self.pos = token.content_start;
        self.push(Frame {
            start: token.start,
            end: token.content_end,
            kind: FrameKind::String(token),
            out: Output::default(),
        });
    }

    fn open_custom(&mut self, token: CustomObjectToken) {
        self.pos = token.payload_start;
        self.push(Frame {
            start: token.start,
            end: token.payload_end,
            kind: FrameKind::CustomObject(token),
            out: Output::default(),
        });
    }

    fn open_container(
        &mut self,
        kind: ContainerKind,
        start: usize,
        body_start: usize,
        expected_values: usize,
        end: usize,
    ) {
        self.pos = body_start;
        self.push(Frame {
            kind: FrameKind::Container {
                kind,
                body_start,
                expected_values,
                values: 0,
            },
            start,
            end,
            out: Output::default(),
        });
    }

    /// Emit a finished frame into its parent.
    fn close(&mut self, frame: Frame) {
        let src = self.src;
        let pos = self.pos;
        let Frame { kind, start, out, .. } = frame;
        let parent = self.top();

        match kind {
            FrameKind::String(token) => {
                parent.original(src, start..token.digits.start);
                parent.fresh(src, out.decoded_len.to_string().as_bytes());
                parent.original(src, token.digits.end..token.content_start);
                parent.append(out);
                parent.original(src, token.content_end..token.end());
                self.pos = token.end();
            }
            FrameKind::CustomObject(token) => {
                parent.original(src, start..token.digits.start);
                parent.fresh(src, out.decoded_len.to_string().as_bytes());
                parent.original(src, token.digits.end..token.payload_start);
                parent.append(out);
                parent.original(src, token.payload_end..token.end());
                self.pos = token.end();
            }
            FrameKind::Container { body_start, .. } => {
                parent.original(src, start..body_start);
                parent.append(out);
                parent.original(src, pos..pos + 1);
                self.pos = pos + 1;
            }
            FrameKind::Root => return,
        }

        self.count_value();
    }

    #[inline]
    fn count_value(&mut self) {
        if let Some(Frame {
            kind: FrameKind::Container { values, .. },
            ..
        }) = self.frames.last_mut()
        {
            *values += 1;
        }
    }

    /// Drop the innermost container and every container directly enclosing
    /// it, then resume at the outermost one's first byte as plain content.
    /// None of the dropped containers is recognized again.
    #[cold]
    fn abandon(&mut self) {
        while let Some(frame) = self.frames.pop() {
            #[cfg(feature = "tracing")]
            if let FrameKind::Container { kind, .. } = frame.kind {
                trace!(
                    kind = kind.type_name(),
                    start = frame.start,
                    pos = self.pos,
                    "Malformed serialized container, treating as plain text"
                );
            }

            self.suppressed.insert(frame.start);
            let parent_is_container = self.frames.last().map_or(false, Frame::is_container);
            if !parent_is_container {
                self.pos = frame.start;
                return;
            }
        }
    }
}
