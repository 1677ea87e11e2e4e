//! `dump-patch`: rewrite URLs and other strings in an SQL dump without
//! breaking PHP-serialized values.
//!
//! # Example
//!
//! ```bash
//! dump-patch dump.sql dump.local.sql \
//!   --replace https://www.example.com http://localhost:8080 \
//!   --settings snapshot/settings.json
//! ```

mod cli;
mod logging;

use std::fs;
use std::io;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use dump_patch_core::{patch_dump_file, patch_dump_file_parallel, ErrorKind, PatchError};
use tracing::{debug, error, info, warn};

use crate::cli::Args;

fn main() -> ExitCode {
    let args = Args::parse();
    logging::init(args.verbose);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    if same_file(&args.source, &args.dest) {
        bail!(
            "source and destination are the same file: {}",
            args.source.display()
        );
    }

    let map = args.replace_map()?;
    if map.is_empty() {
        warn!("no replacements configured, the dump is copied unchanged");
    }
    for pair in &map {
        debug!(search = %pair.search(), replace = %pair.replace(), "replace");
    }

    let config = args.patch_config();
    info!(
        source = %args.source.display(),
        dest = %args.dest.display(),
        pairs = map.len(),
        parallel = args.parallel,
        "Patching SQL dump"
    );

    let result = if args.parallel {
        patch_dump_file_parallel(&args.source, &args.dest, &map, &config)
    } else {
        patch_dump_file(&args.source, &args.dest, &map, &config)
    };

    match result {
        Ok(stats) => {
            info!(
                lines = stats.lines,
                changed = stats.lines_changed,
                bytes_in = stats.bytes_read,
                bytes_out = stats.bytes_written,
                "Done"
            );
            Ok(())
        }
        Err(e) => {
            discard_partial(&e, &args.dest);
            Err(e).context("failed to patch SQL dump")
        }
    }
}

/// Remove a destination left half-written by a failed run.
///
/// A read error without a line number means the source never opened, so the
/// destination was not touched.
fn discard_partial(err: &PatchError, dest: &Path) {
    if matches!(err.kind, ErrorKind::Read(_)) && err.line.is_none() {
        return;
    }
    match fs::remove_file(dest) {
        Ok(()) => debug!(dest = %dest.display(), "Removed partial output"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(dest = %dest.display(), "could not remove partial output: {e}"),
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(source: &Path, dest: &Path, extra: &[&str]) -> Args {
        let mut argv = vec![
            "dump-patch".to_string(),
            source.display().to_string(),
            dest.display().to_string(),
        ];
        argv.extend(extra.iter().map(|s| s.to_string()));
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_run_patches_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("run.sql");
        let dest = dir.path().join("run.out.sql");
        fs::write(
            &source,
            "INSERT INTO `wp_options` VALUES (1,'home','s:15:\\\"http://old.test\\\";');\n",
        )
        .unwrap();

        run(&args(&source, &dest, &["--replace", "old.test", "new.example"])).unwrap();
        assert_eq!(
            fs::read_to_string(&dest).unwrap(),
            "INSERT INTO `wp_options` VALUES (1,'home','s:18:\\\"http://new.example\\\";');\n"
        );
    }

    #[test]
    fn test_run_parallel_matches_sequential() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("par.sql");
        let seq = dir.path().join("par.seq.sql");
        let par = dir.path().join("par.par.sql");
        let dump: String = (0..50)
            .map(|i| format!("INSERT INTO t VALUES ({i},'s:8:\\\"old.test\\\";');\n"))
            .collect();
        fs::write(&source, dump).unwrap();

        run(&args(&source, &seq, &["--replace", "old", "newer"])).unwrap();
        run(&args(
            &source,
            &par,
            &["--replace", "old", "newer", "--parallel", "--batch-lines", "7"],
        ))
        .unwrap();
        assert_eq!(fs::read(&seq).unwrap(), fs::read(&par).unwrap());
        assert!(fs::read_to_string(&seq).unwrap().contains("s:10:\\\"newer.test\\\""));
    }

    #[test]
    fn test_run_refuses_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("inplace.sql");
        fs::write(&source, "SELECT 1;\n").unwrap();
        let err = run(&args(&source, &source, &[])).unwrap_err();
        assert!(err.to_string().contains("same file"));
        assert_eq!(fs::read_to_string(&source).unwrap(), "SELECT 1;\n");
    }

    #[test]
    fn test_missing_source_keeps_dest() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("missing.sql");
        let dest = dir.path().join("missing.out.sql");
        fs::write(&dest, "keep me").unwrap();

        let err = run(&args(&source, &dest, &["--replace", "a", "b"])).unwrap_err();
        assert!(format!("{err:#}").contains("could not read SQL dump"));
        assert_eq!(fs::read_to_string(&dest).unwrap(), "keep me");
    }

    #[test]
    fn test_discard_partial_removes_dest() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("partial.sql");
        fs::write(&dest, "half").unwrap();
        let err = PatchError::new(ErrorKind::Write(io::Error::new(io::ErrorKind::Other, "full")))
            .with_line(3);
        discard_partial(&err, &dest);
        assert!(!dest.exists());
    }
}
