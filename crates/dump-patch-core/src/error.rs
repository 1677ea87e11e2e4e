//! Error types for dump patching.
//!
//! Only configuration problems and I/O failures are errors. Content that merely
//! resembles serialized framing is never reported; the engine falls back to
//! plain text for it.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// The main error type for dump patching.
#[derive(Error, Debug)]
pub struct PatchError {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// The file being read or written, when known.
    pub path: Option<PathBuf>,
    /// The 1-based dump line reached when the error occurred.
    pub line: Option<u64>,
    /// Optional context about what was being done.
    pub context: Option<String>,
}

impl fmt::Display for PatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(ref path) = self.path {
            write!(f, " [{}]", path.display())?;
        }
        if let Some(line) = self.line {
            write!(f, " at line {}", line)?;
        }
        if let Some(ref ctx) = self.context {
            write!(f, " ({})", ctx)?;
        }
        Ok(())
    }
}

/// Specific kinds of patching errors.
#[derive(Error, Debug)]
pub enum ErrorKind {
    /// A replace pair has an empty search key.
    #[error("replace map entry {index} has an empty search key")]
    EmptySearch {
        /// Position of the offending pair in the input list.
        index: usize,
    },

    /// The source dump could not be opened or read.
    #[error("could not read SQL dump: {0}")]
    Read(#[source] io::Error),

    /// The destination dump could not be created or written.
    #[error("could not write patched SQL dump: {0}")]
    Write(#[source] io::Error),

    /// The settings document is malformed.
    #[error("invalid settings: {0}")]
    Settings(String),
}

impl PatchError {
    /// Create a new error with the given kind.
    #[inline]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            path: None,
            line: None,
            context: None,
        }
    }

    /// Attach the file the error relates to.
    #[inline]
    pub fn with_path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Attach the dump line reached.
    #[inline]
    pub fn with_line(mut self, line: u64) -> Self {
        self.line = Some(line);
        self
    }

    /// Add context to the error.
    #[inline]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Whether the error came from the I/O layer rather than configuration.
    pub fn is_io(&self) -> bool {
        matches!(self.kind, ErrorKind::Read(_) | ErrorKind::Write(_))
    }

    #[cold]
    pub(crate) fn read(err: io::Error) -> Self {
        Self::new(ErrorKind::Read(err))
    }

    #[cold]
    pub(crate) fn write(err: io::Error) -> Self {
        Self::new(ErrorKind::Write(err))
    }
}

#[cfg(feature = "serde")]
impl From<serde_json::Error> for PatchError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(ErrorKind::Settings(err.to_string()))
    }
}

/// Result type alias for dump patching.
pub type Result<T> = std::result::Result<T, PatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_path_and_line() {
        let err = PatchError::read(io::Error::new(io::ErrorKind::NotFound, "gone"))
            .with_path("/tmp/dump.sql")
            .with_line(12);
        let msg = err.to_string();
        assert!(msg.starts_with("could not read SQL dump: gone"));
        assert!(msg.contains("[/tmp/dump.sql]"));
        assert!(msg.ends_with("at line 12"));
        assert!(err.is_io());
    }

    #[test]
    fn empty_search_is_not_io() {
        let err = PatchError::new(ErrorKind::EmptySearch { index: 3 }).with_context("settings");
        assert_eq!(
            err.to_string(),
            "replace map entry 3 has an empty search key (settings)"
        );
        assert!(!err.is_io());
    }
}
