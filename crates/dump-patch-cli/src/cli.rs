//! Command line arguments and the replace map they describe.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use dump_patch_core::{DumpSettings, PatchConfig, ReplaceMap};

/// Rewrite an SQL dump, keeping PHP-serialized string lengths consistent.
#[derive(Parser, Debug)]
#[command(name = "dump-patch", version)]
#[command(about = "Serialization-aware search and replace for SQL dumps")]
pub struct Args {
    /// SQL dump to read
    pub source: PathBuf,

    /// Where to write the patched dump (created or truncated)
    pub dest: PathBuf,

    /// Replace SEARCH with REPLACE; may be given several times
    #[arg(
        long = "replace",
        num_args = 2,
        value_names = ["SEARCH", "REPLACE"],
        action = ArgAction::Append
    )]
    pub replace: Vec<String>,

    /// Snapshot settings JSON with a `replace_in_dump` list
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Settings patch JSON; its top-level keys override the settings file
    #[arg(long, value_name = "FILE")]
    pub patch: Option<PathBuf>,

    /// Quote byte that delimits SQL string literals; may be given several times
    #[arg(long = "quote", value_name = "CHAR", value_parser = parse_quote, default_value = "'")]
    pub quotes: Vec<u8>,

    /// Rewrite lines on a worker pool
    #[arg(long)]
    pub parallel: bool,

    /// Lines per worker pool batch
    #[arg(long, value_name = "N", default_value_t = PatchConfig::default().batch_lines)]
    pub batch_lines: usize,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Rewrite options for the core library.
    pub fn patch_config(&self) -> PatchConfig {
        PatchConfig {
            quotes: self.quotes.clone(),
            batch_lines: self.batch_lines,
            ..PatchConfig::default()
        }
    }

    /// Build the replace map.
    ///
    /// Flag pairs come first, so on an identical search key they win over the
    /// settings file.
    pub fn replace_map(&self) -> Result<ReplaceMap> {
        let mut map = ReplaceMap::new();
        for (n, pair) in self.replace.chunks_exact(2).enumerate() {
            map.insert(&pair[0], &pair[1])
                .with_context(|| format!("--replace #{} has an empty SEARCH", n + 1))?;
        }

        if let Some(settings) = self.load_settings()? {
            for (n, pair) in settings.pairs().iter().enumerate() {
                map.insert(&pair.search, &pair.replace)
                    .with_context(|| format!("replace_in_dump entry {} is invalid", n))?;
            }
        }
        Ok(map)
    }

    /// The settings file with the patch applied, if either was given.
    pub fn load_settings(&self) -> Result<Option<DumpSettings>> {
        let mut settings = match &self.settings {
            Some(path) => Some(read_settings(path)?),
            None => None,
        };
        if let Some(path) = &self.patch {
            let patch = read_settings(path)?;
            settings.get_or_insert_with(DumpSettings::default).merge_patch(patch);
        }
        Ok(settings)
    }
}

fn read_settings(path: &Path) -> Result<DumpSettings> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    DumpSettings::from_json_slice(&bytes)
        .with_context(|| format!("failed to parse {}", path.display()))
}

fn parse_quote(value: &str) -> std::result::Result<u8, String> {
    match value.as_bytes() {
        [b] if b.is_ascii_punctuation() => Ok(*b),
        _ => Err(format!(
            "quote must be a single ASCII punctuation character, got {value:?}"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("dump-patch").chain(args.iter().copied())).unwrap()
    }

    fn write_json(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["in.sql", "out.sql"]);
        assert_eq!(args.source, PathBuf::from("in.sql"));
        assert_eq!(args.dest, PathBuf::from("out.sql"));
        assert!(args.replace.is_empty());
        assert_eq!(args.quotes, vec![b'\'']);
        assert!(!args.parallel);
        assert_eq!(args.patch_config().quotes, vec![b'\'']);
        assert!(args.replace_map().unwrap().is_empty());
    }

    #[test]
    fn test_repeated_replace() {
        let args = parse(&[
            "in.sql", "out.sql", "--replace", "old.test", "new.test", "--replace", "a", "b",
        ]);
        let map = args.replace_map().unwrap();
        assert_eq!(map.len(), 2);
        let pairs: Vec<_> = map
            .iter()
            .map(|r| (r.search().to_string(), r.replace().to_string()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("old.test".to_string(), "new.test".to_string()),
                ("a".to_string(), "b".to_string())
            ]
        );
    }

    #[test]
    fn test_replace_needs_two_values() {
        let result = Args::try_parse_from(["dump-patch", "in.sql", "out.sql", "--replace", "x"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_search_rejected() {
        let args = parse(&["in.sql", "out.sql", "--replace", "", "x"]);
        let err = args.replace_map().unwrap_err();
        assert!(err.to_string().contains("--replace #1"));
    }

    #[test]
    fn test_quotes() {
        let args = parse(&["in.sql", "out.sql", "--quote", "'", "--quote", "\""]);
        assert_eq!(args.quotes, vec![b'\'', b'"']);
        assert!(Args::try_parse_from(["dump-patch", "a", "b", "--quote", "ab"]).is_err());
        assert!(Args::try_parse_from(["dump-patch", "a", "b", "--quote", "x"]).is_err());
    }

    #[test]
    fn test_settings_and_patch() {
        let dir = tempfile::tempdir().unwrap();
        let settings = write_json(
            &dir,
            "settings.json",
            r#"{"replace_in_dump": [{"search": "https://prod", "replace": "http://stage"}]}"#,
        );
        let patch = write_json(
            &dir,
            "patch.json",
            r#"{"replace_in_dump": [{"search": "https://prod", "replace": "http://local"}]}"#,
        );

        let only_settings = parse(&["in.sql", "out.sql", "--settings", settings.to_str().unwrap()]);
        let map = only_settings.replace_map().unwrap();
        assert_eq!(map.iter().next().unwrap().replace(), "http://stage");

        let patched = parse(&[
            "in.sql",
            "out.sql",
            "--settings",
            settings.to_str().unwrap(),
            "--patch",
            patch.to_str().unwrap(),
        ]);
        let map = patched.replace_map().unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.iter().next().unwrap().replace(), "http://local");
    }

    #[test]
    fn test_flags_win_over_settings() {
        let dir = tempfile::tempdir().unwrap();
        let settings = write_json(
            &dir,
            "settings.json",
            r#"{"replace_in_dump": [{"search": "prod", "replace": "from-settings"}]}"#,
        );
        let args = parse(&[
            "in.sql",
            "out.sql",
            "--settings",
            settings.to_str().unwrap(),
            "--replace",
            "prod",
            "from-flag",
        ]);
        let map = args.replace_map().unwrap();
        assert_eq!(map.find_at(b"prod", 0).unwrap().replace(), "from-flag");
    }

    #[test]
    fn test_missing_settings_file() {
        let args = parse(&["in.sql", "out.sql", "--settings", "/nonexistent/settings.json"]);
        let err = args.replace_map().unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }
}
