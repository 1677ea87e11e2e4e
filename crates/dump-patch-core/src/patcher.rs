//! Streaming dump patcher.
//!
//! Reads a dump line by line, rewrites each line independently and writes the
//! result in input order. Line terminators are split off before rewriting and
//! written back unchanged; a `\r` before the `\n` is ordinary content.
//!
//! I/O errors are fatal. Nothing is done about a half-written destination:
//! callers must discard it.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

#[cfg(feature = "tracing")]
use tracing::{debug, info, instrument};

use crate::error::{ErrorKind, PatchError, Result};
use crate::replace_map::ReplaceMap;
use crate::walk::{PatchConfig, Rewriter};

const IO_BUFFER: usize = 64 * 1024;

/// Counters collected while patching a dump.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchStats {
    /// Lines read from the source.
    pub lines: u64,
    /// Lines whose bytes differ after patching.
    pub lines_changed: u64,
    /// Bytes read from the source.
    pub bytes_read: u64,
    /// Bytes written to the destination.
    pub bytes_written: u64,
}

impl PatchStats {
    fn record<W: Write>(&mut self, writer: &mut W, line: &[u8], patched: &[u8]) -> Result<()> {
        let (body, terminator) = split_terminator(line);
        self.lines += 1;
        self.bytes_read += line.len() as u64;
        if body != patched {
            self.lines_changed += 1;
        }

        writer
            .write_all(patched)
            .and_then(|()| writer.write_all(terminator))
            .map_err(|e| PatchError::write(e).with_line(self.lines))?;
        self.bytes_written += (patched.len() + terminator.len()) as u64;
        Ok(())
    }
}

/// Split a line read with `read_until(b'\n')` into content and terminator.
#[inline]
fn split_terminator(line: &[u8]) -> (&[u8], &[u8]) {
    match line.last() {
        Some(b'\n') => line.split_at(line.len() - 1),
        _ => line.split_at(line.len()),
    }
}

/// Read one line into `buf`. Returns false at end of input.
#[inline]
fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>, line_no: u64) -> Result<bool> {
    buf.clear();
    let n = reader
        .read_until(b'\n', buf)
        .map_err(|e| PatchError::read(e).with_line(line_no))?;
    Ok(n > 0)
}

/// Patch a dump read from `reader` into `writer`, one line at a time.
///
/// # Example
///
/// ```rust
/// use dump_patch_core::{patch_dump, PatchConfig, ReplaceMap};
///
/// let map = ReplaceMap::from_pairs([("old.test", "new.test")]).unwrap();
/// let dump = b"INSERT INTO t VALUES ('http://old.test');\n";
/// let mut out = Vec::new();
/// let stats = patch_dump(&dump[..], &mut out, &map, &PatchConfig::default()).unwrap();
/// assert_eq!(out, b"INSERT INTO t VALUES ('http://new.test');\n");
/// assert_eq!(stats.lines_changed, 1);
/// ```
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all, fields(pairs = map.len())))]
pub fn patch_dump<R: BufRead, W: Write>(
    mut reader: R,
    mut writer: W,
    map: &ReplaceMap,
    config: &PatchConfig,
) -> Result<PatchStats> {
    let rewriter = Rewriter::new(map, config);
    let mut stats = PatchStats::default();
    let mut line = Vec::new();

    while read_line(&mut reader, &mut line, stats.lines + 1)? {
        let (body, _) = split_terminator(&line);
        let patched = rewriter.patch_line(body);
        stats.record(&mut writer, &line, &patched)?;
    }

    writer.flush().map_err(PatchError::write)?;

    #[cfg(feature = "tracing")]
    debug!(
        lines = stats.lines,
        changed = stats.lines_changed,
        "SQL dump patched"
    );

    Ok(stats)
}

/// Patch a dump on the rayon pool, `config.batch_lines` lines at a time.
///
/// Output order equals input order.
#[cfg(feature = "parallel")]
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all, fields(pairs = map.len(), batch = config.batch_lines)))]
pub fn patch_dump_parallel<R: BufRead, W: Write>(
    mut reader: R,
    mut writer: W,
    map: &ReplaceMap,
    config: &PatchConfig,
) -> Result<PatchStats> {
    use rayon::prelude::*;

    let rewriter = Rewriter::new(map, config);
    let batch_size = config.batch_lines.max(1);
    let mut stats = PatchStats::default();

    loop {
        let mut batch: Vec<Vec<u8>> = Vec::with_capacity(batch_size);
        let mut line = Vec::new();
        while batch.len() < batch_size
            && read_line(&mut reader, &mut line, stats.lines + batch.len() as u64 + 1)?
        {
            batch.push(std::mem::take(&mut line));
        }
        if batch.is_empty() {
            break;
        }

        let patched: Vec<Vec<u8>> = batch
            .par_iter()
            .map(|line| rewriter.patch_line(split_terminator(line).0))
            .collect();

        for (line, patched) in batch.iter().zip(&patched) {
            stats.record(&mut writer, line, patched)?;
        }
    }

    writer.flush().map_err(PatchError::write)?;

    #[cfg(feature = "tracing")]
    debug!(
        lines = stats.lines,
        changed = stats.lines_changed,
        "SQL dump patched"
    );

    Ok(stats)
}

/// Patch the dump at `source` into a new file at `dest`.
///
/// `dest` is created or truncated. On error it may hold partial output.
pub fn patch_dump_file(
    source: impl AsRef<Path>,
    dest: impl AsRef<Path>,
    map: &ReplaceMap,
    config: &PatchConfig,
) -> Result<PatchStats> {
    with_files(source.as_ref(), dest.as_ref(), |reader, writer| {
        patch_dump(reader, writer, map, config)
    })
}

/// Like [`patch_dump_file`], rewriting lines on the rayon pool.
#[cfg(feature = "parallel")]
pub fn patch_dump_file_parallel(
    source: impl AsRef<Path>,
    dest: impl AsRef<Path>,
    map: &ReplaceMap,
    config: &PatchConfig,
) -> Result<PatchStats> {
    with_files(source.as_ref(), dest.as_ref(), |reader, writer| {
        patch_dump_parallel(reader, writer, map, config)
    })
}

fn with_files<F>(source: &Path, dest: &Path, patch: F) -> Result<PatchStats>
where
    F: FnOnce(BufReader<File>, BufWriter<File>) -> Result<PatchStats>,
{
    let input = File::open(source).map_err(|e| PatchError::read(e).with_path(source))?;
    let output = File::create(dest).map_err(|e| PatchError::write(e).with_path(dest))?;

    let stats = patch(
        BufReader::with_capacity(IO_BUFFER, input),
        BufWriter::with_capacity(IO_BUFFER, output),
    )
    .map_err(|e| match e.kind {
        ErrorKind::Read(_) if e.path.is_none() => e.with_path(source),
        ErrorKind::Write(_) if e.path.is_none() => e.with_path(dest),
        _ => e,
    })?;

    #[cfg(feature = "tracing")]
    info!(
        source = %source.display(),
        dest = %dest.display(),
        lines = stats.lines,
        changed = stats.lines_changed,
        "Wrote patched SQL dump"
    );

    Ok(stats)
}
