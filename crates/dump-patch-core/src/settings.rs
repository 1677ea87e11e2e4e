//! Restore settings carrying the dump replacements.
//!
//! A snapshot ships a `settings.json`; a restore may be given a settings patch
//! whose top-level keys replace those of the snapshot wholesale. The only key
//! this crate interprets is `replace_in_dump`:
//!
//! ```json
//! {
//!     "replace_in_dump": [
//!         {"search": "https://www.example.com", "replace": "http://localhost:8080"}
//!     ]
//! }
//! ```
//!
//! Enable the `serde` feature to use this module.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ErrorKind, PatchError, Result};
use crate::replace_map::ReplaceMap;

/// One configured search/replace pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplacePair {
    /// Text to look for.
    pub search: String,
    /// Text written instead.
    pub replace: String,
}

/// A settings document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DumpSettings {
    /// Pairs applied to the SQL dump, if the document sets them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace_in_dump: Option<Vec<ReplacePair>>,
    /// Every other key, untouched.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl DumpSettings {
    /// Parse a settings document. The top level must be a JSON object.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes)?;
        if !value.is_object() {
            return Err(PatchError::new(ErrorKind::Settings(
                "top level must be a JSON object".into(),
            )));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Overlay a settings patch: every key present in `patch` wins.
    pub fn merge_patch(&mut self, patch: DumpSettings) {
        if patch.replace_in_dump.is_some() {
            self.replace_in_dump = patch.replace_in_dump;
        }
        self.other.extend(patch.other);
    }

    /// The configured pairs, in order.
    pub fn pairs(&self) -> &[ReplacePair] {
        self.replace_in_dump.as_deref().unwrap_or(&[])
    }

    /// Build the replace map. Empty when nothing is configured.
    pub fn replace_map(&self) -> Result<ReplaceMap> {
        ReplaceMap::from_pairs(
            self.pairs()
                .iter()
                .map(|pair| (pair.search.as_bytes(), pair.replace.as_bytes())),
        )
        .map_err(|e| e.with_context("replace_in_dump"))
    }
}
