//! Build driver: one full pipeline run against a site root.
//!
//! ```text
//! load cache → Glob → Configure → Collect → Transform → Render → Write → save cache
//! ```
//!
//! The build cache is loaded from [`SiteConfig::cache_path`]. `--no-cache`
//! starts from an empty cache but still writes the fresh one back, so the
//! next build is incremental again; `[cache] enabled = false` neither loads
//! nor saves. The cache is written only after every stage succeeded; a
//! failure to save is logged and the build still counts as successful.
//!
//! [`check`] runs every stage except Write and never touches the cache file.

use crate::cache::{BuildCache, CacheStats};
use crate::config::{ConfigError, SiteConfig};
use crate::manager::Manager;
use crate::pipeline::{Pipeline, PluginError, Stage};
use crate::plugins::feeds::STATS_KEY;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Plugin(#[from] PluginError),
}

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Start from an empty build cache.
    pub no_cache: bool,
}

/// Feed as it was published (or skipped) in this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSummary {
    pub slug: String,
    pub title: String,
    pub posts: usize,
    pub pages: usize,
}

/// Post identity for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostSummary {
    pub source_path: String,
    pub slug: String,
    pub title: String,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub output_dir: PathBuf,
    pub posts: Vec<PostSummary>,
    pub feeds: Vec<FeedSummary>,
    /// Slugs that are new or changed since the previous build, sorted.
    pub changed: Vec<String>,
    pub feed_stats: CacheStats,
    /// Whether the build cache was persisted.
    pub cache_saved: bool,
}

impl BuildReport {
    fn from_manager(manager: &Manager) -> Self {
        let posts = manager
            .posts()
            .iter()
            .map(|p| {
                let p = p.read();
                PostSummary {
                    source_path: p.source_path.clone(),
                    slug: p.slug.clone(),
                    title: p.title.clone(),
                }
            })
            .collect();
        let feeds = manager
            .feeds()
            .iter()
            .map(|f| FeedSummary {
                slug: f.slug.clone(),
                title: f.title.clone(),
                posts: f.posts.len(),
                pages: f.page_count(),
            })
            .collect();
        Self {
            output_dir: manager.output_path(),
            posts,
            feeds,
            changed: manager.build_cache().changed_slugs().iter().cloned().collect(),
            feed_stats: manager
                .cache()
                .get::<CacheStats>(STATS_KEY)
                .copied()
                .unwrap_or_default(),
            cache_saved: false,
        }
    }
}

/// Run every stage of `pipeline` for the site at `root`.
pub fn build(
    root: &Path,
    config: SiteConfig,
    pipeline: &mut Pipeline,
    options: &BuildOptions,
) -> Result<BuildReport, BuildError> {
    config.validate()?;
    let cache_path = config.cache_path(root);
    let persist = config.cache.enabled;
    let build_cache = if persist && !options.no_cache {
        BuildCache::load(&cache_path)
    } else {
        info!("build cache disabled, starting cold");
        BuildCache::empty()
    };

    let mut manager = Manager::new(root, config).with_build_cache(build_cache);
    pipeline.run_all(&mut manager)?;

    let mut report = BuildReport::from_manager(&manager);
    if persist {
        match manager.build_cache().save(&cache_path) {
            Ok(()) => report.cache_saved = true,
            Err(e) => warn!(path = %cache_path.display(), error = %e, "failed to save build cache"),
        }
    }
    info!(
        posts = report.posts.len(),
        changed = report.changed.len(),
        feeds = %report.feed_stats,
        "build complete"
    );
    Ok(report)
}

/// Run every stage up to and including Render without writing output.
pub fn check(
    root: &Path,
    config: SiteConfig,
    pipeline: &mut Pipeline,
) -> Result<BuildReport, BuildError> {
    config.validate()?;
    let build_cache = if config.cache.enabled {
        BuildCache::load(&config.cache_path(root))
    } else {
        BuildCache::empty()
    };
    let mut manager = Manager::new(root, config).with_build_cache(build_cache);
    for stage in Stage::ALL.into_iter().filter(|s| *s != Stage::Write) {
        pipeline.run_stage(stage, &mut manager)?;
    }
    Ok(BuildReport::from_manager(&manager))
}
