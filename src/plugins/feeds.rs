//! Feed assembly and publication.
//!
//! - **Configure**: reads `[plugins.feeds]` settings.
//! - **Collect** (`LATE`): builds one [`Feed`] per `[[feeds]]` entry from the
//!   collected posts, ordered by source path.
//! - **Write**: publishes each feed as `<output_dir>/<slug>/page-N.json`,
//!   skipping feeds the build cache proves fresh, and removes pages left
//!   over from a longer previous run.
//!
//! Per-run hit/miss counts are left in the scratch cache under
//! [`STATS_KEY`].

use crate::cache::{CacheStats, compute_feed_hash};
use crate::config::FeedConfig;
use crate::manager::Manager;
use crate::pipeline::{CollectStage, ConfigureStage, Plugin, Stage, WriteStage, priority};
use crate::post::{Feed, Post};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Scratch cache key holding the feed [`CacheStats`] of this run.
pub const STATS_KEY: &str = "feeds.stats";

/// Bump when the page document layout changes; folded into every feed hash.
const PAGE_FORMAT: &str = "feed-page/1";

/// `[plugins.feeds]` settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeedsSettings {
    /// Pretty-print page JSON.
    pub pretty: bool,
}

/// One page of a published feed.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct FeedPage {
    pub feed: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub page: usize,
    pub total_pages: usize,
    pub prev: Option<String>,
    pub next: Option<String>,
    pub posts: Vec<FeedEntry>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct FeedEntry {
    pub slug: String,
    pub title: String,
    pub url: String,
}

/// Builds and publishes `[[feeds]]`.
#[derive(Debug, Default)]
pub struct FeedsPlugin {
    settings: FeedsSettings,
}

impl FeedsPlugin {
    pub fn settings(&self) -> &FeedsSettings {
        &self.settings
    }
}

/// `base_url` joined with a site-relative path, with exactly one `/` between.
fn site_url(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}

fn page_file(feed_dir: &Path, page: usize) -> PathBuf {
    feed_dir.join(format!("page-{page}.json"))
}

/// Output files publishing `feed` would write.
pub fn feed_outputs(output_dir: &Path, feed: &Feed) -> Vec<PathBuf> {
    let dir = output_dir.join(&feed.slug);
    (1..=feed.page_count()).map(|n| page_file(&dir, n)).collect()
}

/// Whether `post` belongs in the feed described by `config`.
fn is_member(config: &FeedConfig, post: &Post) -> bool {
    if !post.is_listed(config.include_drafts) {
        return false;
    }
    match config.section.as_deref().map(|s| s.trim_matches('/')) {
        None | Some("") => true,
        Some(section) => post
            .source_path
            .strip_prefix(section)
            .is_some_and(|rest| rest.starts_with('/')),
    }
}

/// Split a feed into its page documents.
pub fn paginate(feed: &Feed, base_url: &str) -> Vec<FeedPage> {
    let total_pages = feed.page_count();
    let chunk = if feed.per_page == 0 {
        feed.posts.len().max(1)
    } else {
        feed.per_page
    };
    let page_url = |n: usize| site_url(base_url, &format!("{}/page-{n}.json", feed.slug));

    let mut chunks: Vec<&[_]> = feed.posts.chunks(chunk).collect();
    if chunks.is_empty() {
        chunks.push(&[]);
    }

    chunks
        .into_iter()
        .enumerate()
        .map(|(i, members)| {
            let page = i + 1;
            FeedPage {
                feed: feed.slug.clone(),
                title: feed.title.clone(),
                description: feed.description.clone(),
                page,
                total_pages,
                prev: (page > 1).then(|| page_url(page - 1)),
                next: (page < total_pages).then(|| page_url(page + 1)),
                posts: members
                    .iter()
                    .map(|p| {
                        let p = p.read();
                        FeedEntry {
                            slug: p.slug.clone(),
                            title: p.title.clone(),
                            url: site_url(base_url, &format!("{}/", p.slug)),
                        }
                    })
                    .collect(),
            }
        })
        .collect()
}

impl Plugin for FeedsPlugin {
    fn name(&self) -> &str {
        "feeds"
    }

    fn priority(&self, stage: Stage) -> i32 {
        match stage {
            Stage::Collect => priority::LATE,
            _ => priority::DEFAULT,
        }
    }

    fn as_configure(&mut self) -> Option<&mut dyn ConfigureStage> {
        Some(self)
    }

    fn as_collect(&mut self) -> Option<&mut dyn CollectStage> {
        Some(self)
    }

    fn as_write(&mut self) -> Option<&mut dyn WriteStage> {
        Some(self)
    }
}

impl ConfigureStage for FeedsPlugin {
    fn configure(&mut self, manager: &mut Manager) -> anyhow::Result<()> {
        self.settings = manager.config().plugin_config("feeds")?;
        Ok(())
    }
}

impl CollectStage for FeedsPlugin {
    fn collect(&mut self, manager: &mut Manager) -> anyhow::Result<()> {
        let mut feeds = Vec::with_capacity(manager.config().feeds.len());
        for config in &manager.config().feeds {
            let mut posts = manager.filter_posts(|p| is_member(config, p));
            posts.sort_by_cached_key(|p| p.read().source_path.clone());

            let mut feed = Feed::new(&config.slug, &config.title);
            feed.description = config.description.clone();
            feed.per_page = config.per_page;
            feed.posts = posts;
            debug!(feed = %feed.slug, posts = feed.posts.len(), "assembled feed");
            feeds.push(feed);
        }
        manager.set_feeds(feeds);
        Ok(())
    }
}

impl WriteStage for FeedsPlugin {
    fn write(&mut self, manager: &mut Manager) -> anyhow::Result<()> {
        let output_dir = manager.output_path();
        let base_url = manager.config().base_url.clone();
        let pretty = if self.settings.pretty { "pretty" } else { "compact" };
        let context = [base_url.as_str(), PAGE_FORMAT, pretty];

        let mut stats = CacheStats::default();
        let mut fresh_hashes = Vec::new();
        for feed in manager.feeds() {
            let fresh = compute_feed_hash(feed, &context);
            let outputs = feed_outputs(&output_dir, feed);
            if manager
                .build_cache()
                .is_feed_skippable(feed, &fresh, &outputs)
            {
                debug!(feed = %feed.slug, "feed unchanged, skipping");
                stats.hit();
                continue;
            }

            let dir = output_dir.join(&feed.slug);
            fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
            for page in paginate(feed, &base_url) {
                let json = if self.settings.pretty {
                    serde_json::to_string_pretty(&page)?
                } else {
                    serde_json::to_string(&page)?
                };
                let path = page_file(&dir, page.page);
                fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
            }
            remove_stale_pages(&dir, outputs.len())?;

            debug!(feed = %feed.slug, pages = outputs.len(), "published feed");
            stats.miss();
            fresh_hashes.push((feed.slug.clone(), fresh));
        }

        for (slug, hash) in fresh_hashes {
            manager.build_cache_mut().set_feed_hash(&slug, hash);
        }
        if stats.total() > 0 {
            info!(feeds = %stats, "published feeds");
        }
        manager.cache_mut().set(STATS_KEY, stats);
        Ok(())
    }
}

/// Delete `page-N.json` files beyond the current page count.
fn remove_stale_pages(dir: &Path, page_count: usize) -> anyhow::Result<()> {
    let mut n = page_count + 1;
    loop {
        let path = page_file(dir, n);
        if !path.exists() {
            return Ok(());
        }
        fs::remove_file(&path).with_context(|| format!("removing {}", path.display()))?;
        debug!(path = %path.display(), "removed stale feed page");
        n += 1;
    }
}
