//! Content records shared between plugins.
//!
//! A [`Post`] is created during Collect and then enriched in place by later
//! stages: a title plugin fills `title`, a renderer fills `html`, and plugins
//! leave notes for each other in `extra`. The manager owns the collection;
//! every other holder (feeds, filtered subsets, worker closures) goes
//! through a [`SharedPost`] handle, so writes are visible everywhere.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Shared, mutable handle to a post owned by the manager.
pub type SharedPost = Arc<RwLock<Post>>;

/// Open key/value bag for data one plugin hands to another.
pub type Extra = BTreeMap<String, serde_json::Value>;

/// One content item moving through the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Post {
    /// Path relative to the content directory, `/`-separated. Stable for the
    /// lifetime of the source file and used as the build cache key.
    pub source_path: String,
    /// Routing slug (URL path without leading or trailing slash).
    pub slug: String,
    pub title: String,
    /// Raw source text as read from disk.
    pub content: String,
    /// Rendered body, filled by a render plugin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    /// Excluded from output entirely.
    #[serde(default)]
    pub skip: bool,
    /// Work in progress; kept out of feeds unless a feed opts in.
    #[serde(default)]
    pub draft: bool,
    /// Rendered but never listed.
    #[serde(default)]
    pub private: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: Extra,
}

impl Post {
    pub fn new(source_path: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            slug: slug.into(),
            ..Default::default()
        }
    }

    /// Wrap into a shared handle.
    pub fn shared(self) -> SharedPost {
        Arc::new(RwLock::new(self))
    }

    /// Whether the post may appear in listings such as feeds.
    pub fn is_listed(&self, include_drafts: bool) -> bool {
        !self.skip && !self.private && (include_drafts || !self.draft)
    }

    /// Typed read from the `extra` bag. Returns `None` when the key is
    /// missing or holds a value of a different shape.
    pub fn extra_as<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.extra
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Named, ordered collection of posts with publishing metadata.
#[derive(Debug, Clone)]
pub struct Feed {
    /// Identity of the feed; also its output directory.
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    /// Posts per output page. Zero means a single page.
    pub per_page: usize,
    pub posts: Vec<SharedPost>,
}

impl Feed {
    pub fn new(slug: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            title: title.into(),
            description: None,
            per_page: 0,
            posts: Vec::new(),
        }
    }

    /// Member slugs in feed order.
    pub fn member_slugs(&self) -> Vec<String> {
        self.posts.iter().map(|p| p.read().slug.clone()).collect()
    }

    /// Number of output pages the feed paginates into. An empty feed still
    /// publishes one (empty) page.
    pub fn page_count(&self) -> usize {
        if self.per_page == 0 || self.posts.is_empty() {
            1
        } else {
            self.posts.len().div_ceil(self.per_page)
        }
    }
}
