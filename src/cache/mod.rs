//! Memoization of transformed documents.
//!
//! Loading and expanding an external document is the expensive operation of
//! the engine, so the result is memoized per `(canonical path, template
//! arguments)`: for a given key the transformation runs at most once per
//! [`Session`](crate::engine::Session). The same file included with
//! different template arguments is a distinct entry.
//!
//! # Aliasing contract
//!
//! Every read returns an owned, independently mutable deep copy of the
//! entry. A consumer mutating its copy can never be observed by another
//! consumer or by the cache itself.
//!
//! Only the whole-document transformation is memoized; sub-node selection
//! via a path address is re-derived by the caller on every access.

use std::path::{Path, PathBuf};

use dashmap::DashMap;
use tracing::{debug, trace};

use crate::document::{Document, Metadata};
use crate::template::TemplateArgs;

/// Cache key: canonical document path plus the template-argument set it was
/// expanded with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    path: PathBuf,
    template_args: TemplateArgs,
}

impl CacheKey {
    /// Builds a key from an already-canonicalized path.
    #[must_use]
    pub fn new(path: PathBuf, template_args: TemplateArgs) -> Self {
        Self {
            path,
            template_args,
        }
    }

    /// The document path of this key.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A fully transformed document plus its extracted metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The transformed tree, free of invocation nodes.
    pub document: Document,
    /// Metadata extracted from the document's `_meta` section, if any.
    pub metadata: Option<Metadata>,
}

/// Session-owned store of transformed documents.
///
/// Backed by a concurrent map so a session can be shared across threads;
/// lookups never hold a guard across a recursive transformation.
#[derive(Default)]
pub struct DocumentCache {
    entries: DashMap<CacheKey, CacheEntry>,
}

impl DocumentCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a deep copy of the entry for `key`, if present.
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let entry = self.entries.get(key).map(|entry| entry.clone());
        match &entry {
            Some(_) => debug!(path = %key.path.display(), "document cache hit"),
            None => trace!(path = %key.path.display(), "document cache miss"),
        }
        entry
    }

    /// Stores a transformed document under `key`.
    ///
    /// A concurrent insert for the same key keeps the first entry; both were
    /// produced from the same source, so the results are interchangeable.
    pub fn insert(&self, key: CacheKey, entry: CacheEntry) {
        self.entries.entry(key).or_insert(entry);
    }

    /// Number of cached documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(path: &str, args: &[(&str, &str)]) -> CacheKey {
        CacheKey::new(
            PathBuf::from(path),
            args.iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        )
    }

    fn entry(source: &str) -> CacheEntry {
        CacheEntry {
            document: serde_yaml::from_str(source).unwrap(),
            metadata: None,
        }
    }

    #[test]
    fn test_insert_and_get() {
        let cache = DocumentCache::new();
        let k = key("/a.yaml", &[]);
        assert!(cache.get(&k).is_none());
        cache.insert(k.clone(), entry("{x: 1}"));
        assert!(cache.get(&k).is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_template_args_distinguish_entries() {
        let cache = DocumentCache::new();
        cache.insert(key("/a.yaml", &[("n", "1")]), entry("{x: 1}"));
        assert!(cache.get(&key("/a.yaml", &[("n", "2")])).is_none());
        assert!(cache.get(&key("/a.yaml", &[])).is_none());
        assert!(cache.get(&key("/a.yaml", &[("n", "1")])).is_some());
    }

    #[test]
    fn test_reads_are_independent_copies() {
        let cache = DocumentCache::new();
        let k = key("/a.yaml", &[]);
        cache.insert(k.clone(), entry("{nested: {x: 1}}"));

        let mut first = cache.get(&k).unwrap();
        let mapping = first.document.as_mapping_mut().unwrap();
        mapping.insert("mutated".into(), true.into());

        // The cache and later reads are unaffected by the mutation.
        let second = cache.get(&k).unwrap();
        assert!(second.document.as_mapping().unwrap().get("mutated").is_none());
    }

    #[test]
    fn test_insert_keeps_first_entry() {
        let cache = DocumentCache::new();
        let k = key("/a.yaml", &[]);
        cache.insert(k.clone(), entry("{x: 1}"));
        cache.insert(k.clone(), entry("{x: 2}"));
        let got = cache.get(&k).unwrap();
        assert_eq!(
            got.document.as_mapping().unwrap().get("x").unwrap().as_u64(),
            Some(1)
        );
    }
}
