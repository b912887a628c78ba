//! Per-build state container handed to every plugin.
//!
//! The [`Manager`] owns the posts, feeds, configuration, scratch cache and
//! build cache for one run. Access follows two regions:
//!
//! - **Driver region**: stage methods receive `&mut Manager`. Everything may
//!   be read or replaced, one plugin at a time.
//! - **Worker region**: inside [`Manager::process_posts_concurrently`] the
//!   closure gets `&mut Post` for exactly one post. Anything it captures from
//!   the manager is a shared borrow, so the collections, scratch cache and
//!   build cache are read-only there by construction.
//!
//! Worker closures must not lock posts other than the one they are given;
//! two workers holding their own post while waiting on each other's would
//! deadlock.

use crate::cache::BuildCache;
use crate::config::{SiteConfig, effective_workers};
use crate::post::{Feed, Post, SharedPost};
use rayon::prelude::*;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("worker pool could not be started: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("post '{path}' failed: {error:#}")]
    Post { path: String, error: anyhow::Error },
}

/// In-memory key/value blackboard for one build.
///
/// One plugin sets a value, a later one reads it back with the same type.
/// Reads with a different type behave like a miss. Last writer wins.
#[derive(Default)]
pub struct ScratchCache {
    values: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl ScratchCache {
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.values.get(key)?.downcast_ref()
    }

    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.values.get_mut(key)?.downcast_mut()
    }

    pub fn set<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Box::new(value));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.values.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for ScratchCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.values.keys().map(String::as_str).collect();
        keys.sort_unstable();
        f.debug_struct("ScratchCache").field("keys", &keys).finish()
    }
}

/// Shared state for one build run.
#[derive(Debug)]
pub struct Manager {
    root: PathBuf,
    config: SiteConfig,
    posts: Vec<SharedPost>,
    feeds: Vec<Feed>,
    cache: ScratchCache,
    build_cache: BuildCache,
}

impl Manager {
    /// Create a manager for the site rooted at `root` with an empty build cache.
    pub fn new(root: impl Into<PathBuf>, config: SiteConfig) -> Self {
        Self {
            root: root.into(),
            config,
            posts: Vec::new(),
            feeds: Vec::new(),
            cache: ScratchCache::default(),
            build_cache: BuildCache::empty(),
        }
    }

    pub fn with_build_cache(mut self, build_cache: BuildCache) -> Self {
        self.build_cache = build_cache;
        self
    }

    /// Site root; config paths resolve against it.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn content_path(&self) -> PathBuf {
        self.config.content_path(&self.root)
    }

    pub fn output_path(&self) -> PathBuf {
        self.config.output_path(&self.root)
    }

    // =========================================================================
    // Config
    // =========================================================================

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut SiteConfig {
        &mut self.config
    }

    pub fn set_config(&mut self, config: SiteConfig) {
        self.config = config;
    }

    // =========================================================================
    // Posts and feeds
    // =========================================================================

    pub fn posts(&self) -> &[SharedPost] {
        &self.posts
    }

    pub fn set_posts(&mut self, posts: Vec<SharedPost>) {
        self.posts = posts;
    }

    /// Append a post and return its shared handle.
    pub fn add_post(&mut self, post: Post) -> SharedPost {
        let shared = post.shared();
        self.posts.push(Arc::clone(&shared));
        shared
    }

    /// Handles to every post matching `predicate`, in collection order.
    /// The handles alias the manager's posts.
    pub fn filter_posts<P>(&self, predicate: P) -> Vec<SharedPost>
    where
        P: Fn(&Post) -> bool,
    {
        self.posts
            .iter()
            .filter(|p| predicate(&p.read()))
            .cloned()
            .collect()
    }

    pub fn feeds(&self) -> &[Feed] {
        &self.feeds
    }

    pub fn set_feeds(&mut self, feeds: Vec<Feed>) {
        self.feeds = feeds;
    }

    // =========================================================================
    // Caches
    // =========================================================================

    pub fn cache(&self) -> &ScratchCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut ScratchCache {
        &mut self.cache
    }

    pub fn build_cache(&self) -> &BuildCache {
        &self.build_cache
    }

    pub fn build_cache_mut(&mut self) -> &mut BuildCache {
        &mut self.build_cache
    }

    // =========================================================================
    // Concurrent post processing
    // =========================================================================

    /// Number of workers a concurrent batch uses at most.
    pub fn workers(&self) -> usize {
        effective_workers(&self.config.processing)
    }

    /// Run `f` once for every post on the bounded worker pool.
    ///
    /// See [`Manager::process_posts_slice_concurrently`].
    pub fn process_posts_concurrently<F>(&self, f: F) -> Result<(), ProcessError>
    where
        F: Fn(&mut Post) -> anyhow::Result<()> + Sync,
    {
        self.process_posts_slice_concurrently(&self.posts, f)
    }

    /// Run `f` once for every post in `posts` on a bounded worker pool.
    ///
    /// Blocks until every call has returned. A failure does not cancel the
    /// rest of the batch; once all calls are done, the first failure in
    /// `posts` order is returned with the post's source path. Panics in `f`
    /// are re-raised on the calling thread.
    pub fn process_posts_slice_concurrently<F>(
        &self,
        posts: &[SharedPost],
        f: F,
    ) -> Result<(), ProcessError>
    where
        F: Fn(&mut Post) -> anyhow::Result<()> + Sync,
    {
        if posts.is_empty() {
            return Ok(());
        }

        let workers = self.workers().min(posts.len());
        debug!(posts = posts.len(), workers, "processing posts concurrently");
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("folio-post-{i}"))
            .build()?;

        let results: Vec<Result<(), (String, anyhow::Error)>> = pool.install(|| {
            posts
                .par_iter()
                .map(|post| {
                    let mut post = post.write();
                    f(&mut *post).map_err(|e| (post.source_path.clone(), e))
                })
                .collect()
        });

        match results.into_iter().find_map(Result::err) {
            Some((path, error)) => Err(ProcessError::Post { path, error }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{manager_with_posts, post};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct BrokenPost;

    impl fmt::Display for BrokenPost {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "broken post")
        }
    }

    impl std::error::Error for BrokenPost {}

    // =========================================================================
    // Posts, feeds, config
    // =========================================================================

    #[test]
    fn add_post_returns_aliasing_handle() {
        let mut m = Manager::new("/site", SiteConfig::default());
        let handle = m.add_post(post("a"));
        handle.write().title = "A".into();
        assert_eq!(m.posts()[0].read().title, "A");
    }

    #[test]
    fn set_posts_replaces_collection() {
        let mut m = manager_with_posts(&["a", "b"]);
        m.set_posts(vec![post("c").shared()]);
        assert_eq!(m.posts().len(), 1);
        assert_eq!(m.posts()[0].read().slug, "c");
    }

    #[test]
    fn filter_posts_returns_shared_handles() {
        let m = manager_with_posts(&["a", "b", "c"]);
        let picked = m.filter_posts(|p| p.slug != "b");
        assert_eq!(picked.len(), 2);

        picked[1].write().draft = true;
        assert!(m.posts()[2].read().draft);
    }

    #[test]
    fn filter_posts_no_match_is_empty() {
        let m = manager_with_posts(&["a"]);
        assert!(m.filter_posts(|_| false).is_empty());
    }

    #[test]
    fn feeds_set_and_read() {
        let mut m = manager_with_posts(&["a"]);
        let mut feed = Feed::new("blog", "Blog");
        feed.posts = m.posts().to_vec();
        m.set_feeds(vec![feed]);
        assert_eq!(m.feeds().len(), 1);
        assert_eq!(m.feeds()[0].member_slugs(), vec!["a"]);
    }

    #[test]
    fn config_is_mutable() {
        let mut m = Manager::new("/site", SiteConfig::default());
        m.config_mut().title = "Changed".into();
        assert_eq!(m.config().title, "Changed");

        m.set_config(SiteConfig::default());
        assert_eq!(m.config().title, SiteConfig::default().title);
    }

    #[test]
    fn paths_resolve_against_root() {
        let m = Manager::new("/site", SiteConfig::default());
        assert_eq!(m.content_path(), PathBuf::from("/site/content"));
        assert_eq!(m.output_path(), PathBuf::from("/site/public"));
    }

    // =========================================================================
    // Scratch cache
    // =========================================================================

    #[test]
    fn scratch_cache_typed_roundtrip() {
        let mut m = Manager::new("/site", SiteConfig::default());
        m.cache_mut().set("toc", vec!["intro".to_string()]);
        assert_eq!(
            m.cache().get::<Vec<String>>("toc"),
            Some(&vec!["intro".to_string()])
        );
    }

    #[test]
    fn scratch_cache_wrong_type_is_miss() {
        let mut c = ScratchCache::default();
        c.set("count", 3usize);
        assert_eq!(c.get::<u32>("count"), None);
        assert_eq!(c.get::<usize>("count"), Some(&3));
        assert!(c.get::<usize>("missing").is_none());
    }

    #[test]
    fn scratch_cache_last_writer_wins() {
        let mut c = ScratchCache::default();
        c.set("k", 1u8);
        c.set("k", "two");
        assert_eq!(c.get::<&str>("k"), Some(&"two"));
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn scratch_cache_get_mut_and_remove() {
        let mut c = ScratchCache::default();
        c.set("n", 1u32);
        *c.get_mut::<u32>("n").unwrap() += 1;
        assert_eq!(c.get::<u32>("n"), Some(&2));
        assert!(c.remove("n"));
        assert!(!c.contains("n"));
        assert!(c.is_empty());
    }

    // =========================================================================
    // Concurrent processing
    // =========================================================================

    #[test]
    fn process_empty_returns_ok_without_calls() {
        let m = Manager::new("/site", SiteConfig::default());
        let calls = AtomicUsize::new(0);
        m.process_posts_concurrently(|_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn process_calls_each_post_exactly_once() {
        let slugs: Vec<String> = (0..64).map(|i| format!("p{i}")).collect();
        let refs: Vec<&str> = slugs.iter().map(String::as_str).collect();
        let m = manager_with_posts(&refs);
        let calls = AtomicUsize::new(0);

        m.process_posts_concurrently(|p| {
            calls.fetch_add(1, Ordering::SeqCst);
            p.extra.insert("seen".into(), serde_json::json!(true));
            Ok(())
        })
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 64);
        assert!(
            m.posts()
                .iter()
                .all(|p| p.read().extra_as::<bool>("seen") == Some(true))
        );
    }

    #[test]
    fn process_error_waits_for_all_posts() {
        let slugs: Vec<String> = (0..32).map(|i| format!("p{i}")).collect();
        let refs: Vec<&str> = slugs.iter().map(String::as_str).collect();
        let m = manager_with_posts(&refs);
        let calls = AtomicUsize::new(0);

        let err = m
            .process_posts_concurrently(|p| {
                calls.fetch_add(1, Ordering::SeqCst);
                if p.slug == "p3" {
                    return Err(BrokenPost.into());
                }
                Ok(())
            })
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 32);
        match err {
            ProcessError::Post { path, error } => {
                assert_eq!(path, "p3.md");
                assert!(error.downcast_ref::<BrokenPost>().is_some());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn process_reports_first_failure_in_batch_order() {
        let m = manager_with_posts(&["a", "b", "c", "d"]);
        let err = m
            .process_posts_concurrently(|p| match p.slug.as_str() {
                "b" | "d" => Err(anyhow::anyhow!("bad {}", p.slug)),
                _ => Ok(()),
            })
            .unwrap_err();
        assert_eq!(err.to_string(), "post 'b.md' failed: bad b");
    }

    #[test]
    fn process_slice_touches_only_given_posts() {
        let m = manager_with_posts(&["a", "b", "c"]);
        let subset = m.filter_posts(|p| p.slug != "b");
        m.process_posts_slice_concurrently(&subset, |p| {
            p.title = p.slug.to_uppercase();
            Ok(())
        })
        .unwrap();

        let titles: Vec<String> = m.posts().iter().map(|p| p.read().title.clone()).collect();
        assert_eq!(titles, vec!["A", "", "C"]);
    }

    #[test]
    fn process_with_single_worker() {
        let mut m = manager_with_posts(&["a", "b", "c"]);
        m.config_mut().processing.max_processes = Some(1);
        assert_eq!(m.workers(), 1);
        let calls = AtomicUsize::new(0);
        m.process_posts_concurrently(|_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    #[should_panic(expected = "worker blew up")]
    fn process_panic_propagates() {
        let m = manager_with_posts(&["a"]);
        let _ = m.process_posts_concurrently(|_| panic!("worker blew up"));
    }
}
