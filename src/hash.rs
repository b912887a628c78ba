//! Content fingerprinting.
//!
//! Every cache key in the build is derived from these functions. Hashes are
//! SHA-256 rendered as lowercase hex, so they are stable across runs,
//! platforms and process restarts: nothing here depends on memory addresses,
//! map iteration order, or a random seed.
//!
//! # Composite hashes
//!
//! Keys built from several inputs go through [`ContentHasher`], which
//! prefixes each field with its byte length. Without the prefix, the inputs
//! `("ab", "c")` and `("a", "bc")` would hash identically. Each composite
//! hash also starts with a domain tag (`"feed"`, `"glob"`, ...) so hashes of
//! different kinds never compare equal by accident.
//!
//! Callers are responsible for feeding collections in a canonical order.
//! Feed membership, for example, is sorted before hashing so the result does
//! not depend on the order posts happened to be collected in.

use sha2::{Digest, Sha256};
use std::io;
use std::path::Path;

/// SHA-256 of raw bytes, as a 64-char hex string.
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// SHA-256 of a string's UTF-8 bytes.
pub fn hash_content(content: &str) -> String {
    hash_bytes(content.as_bytes())
}

/// SHA-256 of a file's contents.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(hash_bytes(&bytes))
}

/// Incremental, length-prefixed hasher for composite cache keys.
#[derive(Clone)]
pub struct ContentHasher {
    inner: Sha256,
}

impl ContentHasher {
    /// Start a composite hash tagged with `domain`.
    pub fn new(domain: &str) -> Self {
        let mut inner = Sha256::new();
        inner.update(domain.as_bytes());
        inner.update(b"\0");
        Self { inner }
    }

    pub fn field(mut self, bytes: &[u8]) -> Self {
        self.inner.update((bytes.len() as u64).to_le_bytes());
        self.inner.update(bytes);
        self
    }

    pub fn str_field(self, value: &str) -> Self {
        self.field(value.as_bytes())
    }

    pub fn u64_field(self, value: u64) -> Self {
        self.field(&value.to_le_bytes())
    }

    /// Optional values hash a presence marker so `None` and `Some("")` differ.
    pub fn opt_str_field(self, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.field(b"\x01").str_field(v),
            None => self.field(b"\x00"),
        }
    }

    pub fn finish(self) -> String {
        format!("{:x}", self.inner.finalize())
    }
}

/// Hash of a set of strings, independent of the order they are given in.
///
/// Duplicates collapse, matching set semantics.
pub fn hash_string_set<'a, I>(domain: &str, items: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut sorted: Vec<&str> = items.into_iter().collect();
    sorted.sort_unstable();
    sorted.dedup();
    sorted
        .into_iter()
        .fold(ContentHasher::new(domain), |h, s| h.str_field(s))
        .finish()
}
