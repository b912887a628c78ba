//! End-to-end builds of a small site on disk.
//!
//! Runs the default pipeline (plus a concurrent transform plugin) twice
//! against the same root and checks what the second run skips.

use folio::build::{self, BuildOptions, BuildReport};
use folio::cache::CacheStats;
use folio::config::load_config;
use folio::manager::Manager;
use folio::pipeline::{Pipeline, Plugin, TransformStage};
use folio::plugins::default_pipeline;
use folio::plugins::feeds::FeedPage;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const CONFIG: &str = r#"
title = "Test Site"
base_url = "https://example.com"

[processing]
max_processes = 2

[[feeds]]
slug = "blog"
title = "Blog"
section = "posts"
per_page = 2

[[feeds]]
slug = "pages"
title = "Pages"
section = "pages"
"#;

/// Counts words of every post on the worker pool.
struct WordCount;

impl Plugin for WordCount {
    fn name(&self) -> &str {
        "word-count"
    }

    fn as_transform(&mut self) -> Option<&mut dyn TransformStage> {
        Some(self)
    }
}

impl TransformStage for WordCount {
    fn transform(&mut self, manager: &mut Manager) -> anyhow::Result<()> {
        manager.process_posts_concurrently(|post| {
            let words = post.content.split_whitespace().count();
            post.extra.insert("words".into(), words.into());
            Ok(())
        })?;
        Ok(())
    }
}

fn write(root: &Path, rel: &str, body: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

fn site() -> TempDir {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "config.toml", CONFIG);
    write(tmp.path(), "content/posts/010-first.md", "# First Post\none two three");
    write(tmp.path(), "content/posts/020-second.md", "# Second Post\nfour five");
    write(tmp.path(), "content/posts/030-third.md", "# Third Post\nsix");
    write(tmp.path(), "content/pages/about.md", "# About\nHello");
    tmp
}

fn pipeline() -> Pipeline {
    default_pipeline().with(WordCount)
}

fn run(root: &Path) -> BuildReport {
    let config = load_config(root).unwrap();
    build::build(root, config, &mut pipeline(), &BuildOptions::default()).unwrap()
}

fn page(root: &Path, feed: &str, n: usize) -> FeedPage {
    let path = root.join(format!("public/{feed}/page-{n}.json"));
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn first_build_publishes_everything() {
    let tmp = site();
    let report = run(tmp.path());

    assert_eq!(report.posts.len(), 4);
    assert_eq!(report.changed.len(), 4);
    assert_eq!(report.feed_stats, CacheStats { hits: 0, misses: 2 });

    let first = page(tmp.path(), "blog", 1);
    assert_eq!(first.total_pages, 2);
    let slugs: Vec<&str> = first.posts.iter().map(|p| p.slug.as_str()).collect();
    assert_eq!(slugs, vec!["posts/first", "posts/second"]);
    assert_eq!(first.posts[0].title, "First Post");
    assert_eq!(first.posts[0].url, "https://example.com/posts/first/");
    assert_eq!(
        first.next.as_deref(),
        Some("https://example.com/blog/page-2.json")
    );

    let pages = page(tmp.path(), "pages", 1);
    assert_eq!(pages.posts.len(), 1);
    assert_eq!(pages.posts[0].slug, "pages/about");
}

#[test]
fn second_build_skips_unchanged_feeds() {
    let tmp = site();
    run(tmp.path());
    let report = run(tmp.path());

    assert!(report.changed.is_empty());
    assert_eq!(report.feed_stats, CacheStats { hits: 2, misses: 0 });
}

#[test]
fn editing_a_post_rebuilds_only_its_feed() {
    let tmp = site();
    run(tmp.path());

    write(
        tmp.path(),
        "content/posts/020-second.md",
        "# Second Post, Revised\nfour five",
    );
    let report = run(tmp.path());

    assert_eq!(report.changed, vec!["posts/second"]);
    assert_eq!(report.feed_stats, CacheStats { hits: 1, misses: 1 });
    assert_eq!(
        page(tmp.path(), "blog", 1).posts[1].title,
        "Second Post, Revised"
    );
}

#[test]
fn deleting_a_post_shrinks_its_feed() {
    let tmp = site();
    run(tmp.path());

    fs::remove_file(tmp.path().join("content/posts/030-third.md")).unwrap();
    let report = run(tmp.path());

    assert_eq!(report.feed_stats, CacheStats { hits: 1, misses: 1 });
    assert_eq!(page(tmp.path(), "blog", 1).total_pages, 1);
    assert!(!tmp.path().join("public/blog/page-2.json").exists());
}

#[test]
fn missing_output_forces_republish() {
    let tmp = site();
    run(tmp.path());

    fs::remove_file(tmp.path().join("public/pages/page-1.json")).unwrap();
    let report = run(tmp.path());

    assert_eq!(report.feed_stats, CacheStats { hits: 1, misses: 1 });
    assert!(tmp.path().join("public/pages/page-1.json").exists());
}

#[test]
fn corrupt_cache_means_cold_build() {
    let tmp = site();
    run(tmp.path());

    fs::write(tmp.path().join("public/.build-cache.json"), "{ not json").unwrap();
    let report = run(tmp.path());

    assert_eq!(report.changed.len(), 4);
    assert_eq!(report.feed_stats, CacheStats { hits: 0, misses: 2 });
}

#[test]
fn base_url_change_republishes_all_feeds() {
    let tmp = site();
    run(tmp.path());

    let config = CONFIG.replace("https://example.com", "https://example.org");
    write(tmp.path(), "config.toml", &config);
    let report = run(tmp.path());

    assert!(report.changed.is_empty());
    assert_eq!(report.feed_stats, CacheStats { hits: 0, misses: 2 });
    assert_eq!(
        page(tmp.path(), "pages", 1).posts[0].url,
        "https://example.org/pages/about/"
    );
}

#[test]
fn concurrent_transform_sees_every_post() {
    let tmp = site();
    let config = load_config(tmp.path()).unwrap();
    let mut manager = Manager::new(tmp.path(), config);
    let mut pipeline = pipeline();
    pipeline.run_all(&mut manager).unwrap();

    let mut words: Vec<(String, u64)> = manager
        .posts()
        .iter()
        .map(|p| {
            let p = p.read();
            (p.slug.clone(), p.extra_as::<u64>("words").unwrap())
        })
        .collect();
    words.sort();
    assert_eq!(
        words,
        vec![
            ("pages/about".to_string(), 3),
            ("posts/first".to_string(), 6),
            ("posts/second".to_string(), 5),
            ("posts/third".to_string(), 4),
        ]
    );
}
