//! Incremental build cache.
//!
//! Persists the signals that let later builds skip work whose inputs have
//! not changed since the previous run. The cache is strictly an
//! optimization: losing it costs a full rebuild, never a wrong one.
//!
//! # What is stored
//!
//! - **Glob entry**: the file list discovered last time together with the
//!   hash of the pattern set that produced it. It only answers "did the
//!   pattern set change"; the glob plugin still walks the filesystem every
//!   run, so added or deleted files are always noticed.
//!
//! - **File fingerprints**: `source_path → {slug, hash}` for every source
//!   recorded this run. Comparing against the previous run's map yields the
//!   **changed slugs**: posts that are new or whose content hash differs.
//!
//! - **Named hashes**: arbitrary `name → hash` entries. Feeds store theirs
//!   under `feed:<slug>`.
//!
//! # Skipping a feed
//!
//! A feed may skip publication only when all of these hold:
//! 1. none of its member slugs is in [`BuildCache::changed_slugs`]
//! 2. a freshly computed [`compute_feed_hash`] equals the stored hash
//! 3. every output file the feed would write still exists
//!
//! The feed hash folds in every input that shapes the published files:
//! the feed's own settings, caller-supplied site context, and the sorted
//! member slugs. Member *content* is covered by rule 1.
//!
//! # Storage
//!
//! A JSON document, by default `<output_dir>/.build-cache.json`. A missing,
//! unparseable or version-mismatched file is a cold start. Each section is
//! decoded on its own, so a damaged `files` map does not discard a valid
//! glob entry.
//!
//! Only fingerprints recorded during the current run are written back, so
//! deleted sources drop out on the next save.

use crate::hash::ContentHasher;
use crate::post::Feed;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

pub use crate::hash::hash_content;

/// Version of the cache document format. Bump this to invalidate all
/// existing caches when the format or key computation changes.
const MANIFEST_VERSION: u32 = 1;

/// Prefix for feed entries in the named-hash map.
const FEED_KEY_PREFIX: &str = "feed:";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Last glob result and the pattern set that produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobEntry {
    pub pattern_hash: String,
    pub files: Vec<String>,
}

/// Fingerprint of one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub slug: String,
    pub hash: String,
}

#[derive(Serialize)]
struct CacheDocument<'a> {
    version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    glob: Option<&'a GlobEntry>,
    files: &'a BTreeMap<String, FileEntry>,
    hashes: &'a BTreeMap<String, String>,
}

/// Cross-run store for incremental builds.
#[derive(Debug, Clone, Default)]
pub struct BuildCache {
    glob: Option<GlobEntry>,
    /// Fingerprints from the previous run (read-only during a build).
    previous_files: BTreeMap<String, FileEntry>,
    /// Fingerprints recorded during this run; what `save` persists.
    files: BTreeMap<String, FileEntry>,
    hashes: BTreeMap<String, String>,
    changed: BTreeSet<String>,
}

impl BuildCache {
    /// Create an empty cache (used for `--no-cache` or first build).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load from `path`. Returns an empty cache if the file doesn't exist or
    /// can't be parsed; a damaged section degrades only that section.
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no build cache, starting cold");
                return Self::empty();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "build cache unreadable, starting cold");
                return Self::empty();
            }
        };
        let mut doc: serde_json::Map<String, serde_json::Value> =
            match serde_json::from_str(&content) {
                Ok(d) => d,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "build cache corrupt, starting cold");
                    return Self::empty();
                }
            };

        let version = doc.get("version").and_then(|v| v.as_u64());
        if version != Some(u64::from(MANIFEST_VERSION)) {
            debug!(?version, "build cache version mismatch, starting cold");
            return Self::empty();
        }

        Self {
            glob: take_section(&mut doc, "glob"),
            previous_files: take_section(&mut doc, "files").unwrap_or_default(),
            files: BTreeMap::new(),
            hashes: take_section(&mut doc, "hashes").unwrap_or_default(),
            changed: BTreeSet::new(),
        }
    }

    /// Save to `path`, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let doc = CacheDocument {
            version: MANIFEST_VERSION,
            glob: self.glob.as_ref(),
            files: &self.files,
            hashes: &self.hashes,
        };
        let json = serde_json::to_string_pretty(&doc)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    // =========================================================================
    // Glob entry
    // =========================================================================

    /// Cached file list, only when `pattern_hash` matches exactly.
    pub fn glob_cache(&self, pattern_hash: &str) -> Option<&[String]> {
        self.glob
            .as_ref()
            .filter(|g| g.pattern_hash == pattern_hash)
            .map(|g| g.files.as_slice())
    }

    pub fn set_glob_cache(&mut self, files: Vec<String>, pattern_hash: String) {
        self.glob = Some(GlobEntry {
            pattern_hash,
            files,
        });
    }

    pub fn glob_entry(&self) -> Option<&GlobEntry> {
        self.glob.as_ref()
    }

    // =========================================================================
    // File fingerprints and changed slugs
    // =========================================================================

    /// Record this run's fingerprint for a source file.
    ///
    /// Returns `true` (and marks `slug` changed) when the previous run had no
    /// entry for the path, or recorded a different hash or slug.
    pub fn record_file(&mut self, source_path: &str, slug: &str, hash: &str) -> bool {
        let changed = match self.previous_files.get(source_path) {
            Some(prev) => prev.hash != hash || prev.slug != slug,
            None => true,
        };
        if changed {
            self.changed.insert(slug.to_string());
        }
        self.files.insert(
            source_path.to_string(),
            FileEntry {
                slug: slug.to_string(),
                hash: hash.to_string(),
            },
        );
        changed
    }

    /// Slugs of posts that are new or changed since the previous build.
    pub fn changed_slugs(&self) -> &BTreeSet<String> {
        &self.changed
    }

    pub fn is_changed(&self, slug: &str) -> bool {
        self.changed.contains(slug)
    }

    /// Fingerprints loaded from the previous build.
    pub fn previous_files(&self) -> &BTreeMap<String, FileEntry> {
        &self.previous_files
    }

    /// Fingerprints recorded during this build.
    pub fn files(&self) -> &BTreeMap<String, FileEntry> {
        &self.files
    }

    // =========================================================================
    // Named hashes
    // =========================================================================

    pub fn hash(&self, name: &str) -> Option<&str> {
        self.hashes.get(name).map(String::as_str)
    }

    pub fn set_hash(&mut self, name: impl Into<String>, hash: impl Into<String>) {
        self.hashes.insert(name.into(), hash.into());
    }

    pub fn hashes(&self) -> &BTreeMap<String, String> {
        &self.hashes
    }

    pub fn feed_hash(&self, slug: &str) -> Option<&str> {
        self.hash(&format!("{FEED_KEY_PREFIX}{slug}"))
    }

    pub fn set_feed_hash(&mut self, slug: &str, hash: impl Into<String>) {
        self.set_hash(format!("{FEED_KEY_PREFIX}{slug}"), hash);
    }

    /// Whether publishing `feed` can be skipped this run.
    ///
    /// `fresh_hash` must come from [`compute_feed_hash`] over the feed as it
    /// stands now; `outputs` lists every file publication would write.
    pub fn is_feed_skippable(&self, feed: &Feed, fresh_hash: &str, outputs: &[PathBuf]) -> bool {
        let member_changed = feed
            .posts
            .iter()
            .any(|p| self.changed.contains(&p.read().slug));
        if member_changed {
            return false;
        }
        if self.feed_hash(&feed.slug) != Some(fresh_hash) {
            return false;
        }
        outputs.iter().all(|p| p.exists())
    }
}

/// Remove and decode one top-level section, warning if it is malformed.
fn take_section<T: serde::de::DeserializeOwned>(
    doc: &mut serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Option<T> {
    let value = doc.remove(key)?;
    match serde_json::from_value(value) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(section = key, error = %e, "build cache section malformed, ignoring it");
            None
        }
    }
}

/// Hash over everything that shapes a feed's published output.
///
/// `context` carries site-level inputs the caller folds into the output
/// (base URL, output format version, ...). Member slugs are sorted, so the
/// hash does not depend on collection order; publishers must therefore
/// order members by a function of membership alone.
pub fn compute_feed_hash(feed: &Feed, context: &[&str]) -> String {
    let mut slugs = feed.member_slugs();
    slugs.sort_unstable();

    let hasher = ContentHasher::new("feed")
        .str_field(&feed.slug)
        .str_field(&feed.title)
        .opt_str_field(feed.description.as_deref())
        .u64_field(feed.per_page as u64)
        .u64_field(context.len() as u64);
    let hasher = context.iter().fold(hasher, |h, c| h.str_field(c));
    let hasher = hasher.u64_field(slugs.len() as u64);
    slugs.iter().fold(hasher, |h, s| h.str_field(s)).finish()
}

/// Summary of cache effectiveness for one kind of cached work.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u32,
    pub misses: u32,
}

impl CacheStats {
    pub fn hit(&mut self) {
        self.hits += 1;
    }

    pub fn miss(&mut self) {
        self.misses += 1;
    }

    pub fn total(&self) -> u32 {
        self.hits + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 {
            write!(
                f,
                "{} cached, {} rebuilt ({} total)",
                self.hits,
                self.misses,
                self.total()
            )
        } else {
            write!(f, "{} rebuilt", self.misses)
        }
    }
}
