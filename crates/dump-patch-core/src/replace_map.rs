//! Ordered search/replace pairs with longest-match lookup.

use bstr::{BStr, BString, ByteSlice};

use crate::error::{ErrorKind, PatchError, Result};

/// One search/replace pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    search: BString,
    replace: BString,
}

impl Replacement {
    /// The bytes to look for.
    #[inline]
    pub fn search(&self) -> &BStr {
        self.search.as_bstr()
    }

    /// The bytes emitted in place of a match.
    #[inline]
    pub fn replace(&self) -> &BStr {
        self.replace.as_bstr()
    }
}

/// An ordered set of search/replace pairs.
///
/// When several keys match at the same offset the longest one wins, so
/// `"old"` never eats the prefix of `"old.example.com"`. Identical keys keep
/// insertion order: the first one inserted is used.
///
/// An empty map is valid and turns every rewrite into an identity transform.
///
/// # Example
///
/// ```rust
/// use dump_patch_core::ReplaceMap;
///
/// let map = ReplaceMap::from_pairs([("ab", "1"), ("abc", "2")]).unwrap();
/// let hit = map.find_at(b"xabcd", 1).unwrap();
/// assert_eq!(hit.replace(), "2");
/// assert!(map.find_at(b"xabcd", 0).is_none());
/// ```
#[derive(Debug, Clone)]
pub struct ReplaceMap {
    entries: Vec<Replacement>,
    /// Entry indices per first byte, longest key first.
    buckets: Box<[Vec<usize>; 256]>,
}

impl Default for ReplaceMap {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplaceMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            buckets: Box::new(std::array::from_fn(|_| Vec::new())),
        }
    }

    /// Build a map from `(search, replace)` pairs, keeping their order.
    ///
    /// Fails with [`ErrorKind::EmptySearch`] if any search key is empty.
    pub fn from_pairs<I, S, R>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, R)>,
        S: AsRef<[u8]>,
        R: AsRef<[u8]>,
    {
        let mut map = Self::new();
        for (search, replace) in pairs {
            map.insert(search, replace)?;
        }
        Ok(map)
    }

    /// Append a pair to the map.
    pub fn insert(&mut self, search: impl AsRef<[u8]>, replace: impl AsRef<[u8]>) -> Result<()> {
        let search = search.as_ref();
        let Some(&first) = search.first() else {
            return Err(PatchError::new(ErrorKind::EmptySearch {
                index: self.entries.len(),
            }));
        };

        let index = self.entries.len();
        self.entries.push(Replacement {
            search: BString::from(search),
            replace: BString::from(replace.as_ref()),
        });

        let entries = &self.entries;
        let bucket = &mut self.buckets[usize::from(first)];
        bucket.push(index);
        // Stable: equal lengths keep insertion order.
        bucket.sort_by(|a, b| entries[*b].search.len().cmp(&entries[*a].search.len()));
        Ok(())
    }

    /// Number of pairs.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map has no pairs.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over the pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Replacement> {
        self.entries.iter()
    }

    /// Whether some key starts with `byte`.
    #[inline(always)]
    pub fn is_candidate(&self, byte: u8) -> bool {
        !self.buckets[usize::from(byte)].is_empty()
    }

    /// Find the longest key matching `haystack` at offset `at`.
    ///
    /// Keys are never matched past the end of `haystack`; callers bound it to
    /// the region they are scanning.
    #[inline]
    pub fn find_at(&self, haystack: &[u8], at: usize) -> Option<&Replacement> {
        let rest = haystack.get(at..)?;
        let first = *rest.first()?;
        self.buckets[usize::from(first)]
            .iter()
            .map(|&idx| &self.entries[idx])
            .find(|entry| rest.starts_with(entry.search.as_slice()))
    }

    /// Apply the map to `input` without any structural awareness, appending
    /// to `out`. Returns whether anything was replaced.
    ///
    /// Scanning resumes after the matched key, never inside emitted output.
    pub fn replace_into(&self, input: &[u8], out: &mut Vec<u8>) -> bool {
        let mut changed = false;
        let mut pos = 0;
        while pos < input.len() {
            if let Some(hit) = self.find_at(input, pos) {
                out.extend_from_slice(&hit.replace);
                pos += hit.search.len();
                changed = true;
                continue;
            }
            let next = self.next_candidate(input, pos + 1);
            out.extend_from_slice(&input[pos..next]);
            pos = next;
        }
        changed
    }

    /// Offset of the first byte at or after `from` that could start a match,
    /// or `input.len()`.
    #[inline]
    pub(crate) fn next_candidate(&self, input: &[u8], from: usize) -> usize {
        if from >= input.len() {
            return input.len();
        }
        input[from..]
            .iter()
            .position(|&b| self.is_candidate(b))
            .map_or(input.len(), |offset| from + offset)
    }
}

impl<'a> IntoIterator for &'a ReplaceMap {
    type Item = &'a Replacement;
    type IntoIter = std::slice::Iter<'a, Replacement>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
