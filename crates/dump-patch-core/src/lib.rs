//! Serialization-aware search and replace for SQL dumps.
//!
//! WordPress-style databases store PHP-serialized values such as
//! `s:5:"hello";` inside ordinary SQL string literals. Rewriting a URL inside
//! one with a plain text replace leaves the byte length prefix wrong and the
//! application can no longer unserialize the value. This crate rewrites dumps
//! so that every affected `s:<N>:"...";` gets `N` recomputed, at any nesting
//! depth, while everything that did not change is reproduced byte for byte.
//!
//! # Features
//!
//! - **Length-correct rewrites** - nested strings, arrays and objects
//! - **Escape-aware** - mysqldump backslash escapes are decoded for matching
//!   and restored on output
//! - **Longest match first** - overlapping search keys behave predictably
//! - **Never fails on content** - anything that does not parse is plain text
//! - **Streaming** - constant memory per line, optional rayon worker pool
//!
//! # Quick Start
//!
//! ```rust
//! use dump_patch_core::{patch_line, ReplaceMap};
//!
//! let map = ReplaceMap::from_pairs([("http://old", "https://new")]).unwrap();
//! let line = br#"INSERT INTO `wp_options` VALUES (1,'siteurl','s:10:\"http://old\";');"#;
//!
//! assert_eq!(
//!     patch_line(line, &map),
//!     br#"INSERT INTO `wp_options` VALUES (1,'siteurl','s:11:\"https://new\";');"#
//! );
//! ```
//!
//! # Patching Files
//!
//! ```no_run
//! use dump_patch_core::{patch_dump_file, PatchConfig, ReplaceMap};
//!
//! let map = ReplaceMap::from_pairs([("www.example.com", "localhost")])?;
//! let stats = patch_dump_file("dump.sql", "dump.patched.sql", &map, &PatchConfig::default())?;
//! println!("{} of {} lines changed", stats.lines_changed, stats.lines);
//! # Ok::<(), dump_patch_core::PatchError>(())
//! ```
//!
//! # Cargo Features
//!
//! | Feature | Enables |
//! |---------|---------|
//! | `serde` | [`settings`]: `replace_in_dump` from a JSON settings document |
//! | `tracing` | Structured log events and spans |
//! | `parallel` | [`patch_dump_parallel`] on the rayon pool |

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::inline_always)]

pub mod error;
pub mod patcher;
pub mod recognizer;
pub mod replace_map;
pub mod scanner;
pub mod types;
pub mod walk;

#[cfg(feature = "serde")]
pub mod settings;

pub use error::{ErrorKind, PatchError, Result};
pub use patcher::{patch_dump, patch_dump_file, PatchStats};
pub use replace_map::{ReplaceMap, Replacement};
pub use types::{ContainerHeader, ContainerKind, CustomObjectToken, SerializedStringToken, Token};
pub use walk::{
    patch_line, patch_line_with_config, walk, walk_with_config, PatchConfig, Rewriter, MAX_DEPTH,
};

#[cfg(feature = "parallel")]
pub use patcher::{patch_dump_file_parallel, patch_dump_parallel};

#[cfg(feature = "serde")]
pub use settings::{DumpSettings, ReplacePair};
