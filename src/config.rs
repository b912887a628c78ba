//! Site configuration module.
//!
//! Handles loading, validating, and layering `config.toml`. Stock defaults
//! are the base layer; the site's `config.toml` overrides them key by key.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! title = "Untitled Site"
//! base_url = "/"
//! content_dir = "content"     # Relative to the site root
//! output_dir = "public"       # Relative to the site root
//! patterns = ["**/*.md"]      # Globs selecting source files in content_dir
//!
//! [processing]
//! max_processes = 4           # Cap on per-post parallelism (omit for auto)
//!
//! [cache]
//! enabled = true
//! path = "public/.build-cache.json"  # Omit to keep it in output_dir
//!
//! [[feeds]]
//! slug = "blog"
//! title = "Blog"
//! section = "posts"           # Only posts under content/posts/
//! per_page = 10
//! include_drafts = false
//!
//! [plugins.some-plugin]       # Free-form; decoded by the plugin itself
//! key = "value"
//! ```
//!
//! ## Plugin Settings
//!
//! Core keys are typed and unknown core keys are rejected to catch typos.
//! Plugin settings live under `[plugins.<name>]` and are kept as raw TOML
//! until the owning plugin decodes them into its own struct with
//! [`SiteConfig::plugin_config`], usually during the Configure stage.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the config file in the site root.
pub const CONFIG_FILENAME: &str = "config.toml";

/// Name of the build cache file when `cache.path` is not set.
pub const CACHE_FILENAME: &str = ".build-cache.json";

/// Workers per effective core for the post pool.
const WORKERS_PER_THREAD: usize = 2;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("Invalid settings for plugin '{plugin}': {source}")]
    Plugin {
        plugin: String,
        source: toml::de::Error,
    },
}

/// Site configuration loaded from `config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    pub title: String,
    /// Prefix for absolute links in published output.
    pub base_url: String,
    /// Content directory, relative to the site root.
    pub content_dir: String,
    /// Output directory, relative to the site root.
    pub output_dir: String,
    /// Glob patterns (relative to `content_dir`) selecting source files.
    pub patterns: Vec<String>,
    pub processing: ProcessingConfig,
    pub cache: CacheConfig,
    pub feeds: Vec<FeedConfig>,
    /// Raw per-plugin settings, keyed by plugin name.
    pub plugins: BTreeMap<String, toml::Value>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: "Untitled Site".to_string(),
            base_url: "/".to_string(),
            content_dir: "content".to_string(),
            output_dir: "public".to_string(),
            patterns: vec!["**/*.md".to_string()],
            processing: ProcessingConfig::default(),
            cache: CacheConfig::default(),
            feeds: Vec::new(),
            plugins: BTreeMap::new(),
        }
    }
}

impl SiteConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.patterns.is_empty() {
            return Err(ConfigError::Validation("patterns must not be empty".into()));
        }
        if let Some(p) = self.patterns.iter().find(|p| p.trim().is_empty()) {
            return Err(ConfigError::Validation(format!(
                "patterns must not contain blank entries (got {p:?})"
            )));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        let mut seen = HashSet::new();
        for feed in &self.feeds {
            if feed.slug.is_empty() || feed.slug.contains(['/', '\\']) || feed.slug == ".." {
                return Err(ConfigError::Validation(format!(
                    "feed slug {:?} must be a non-empty single path segment",
                    feed.slug
                )));
            }
            if !seen.insert(feed.slug.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate feed slug {:?}",
                    feed.slug
                )));
            }
        }
        Ok(())
    }

    /// Decode the `[plugins.<name>]` table into a plugin's typed settings.
    ///
    /// A missing table yields `T::default()`. Whether unknown keys are
    /// rejected is up to `T` (`#[serde(deny_unknown_fields)]`).
    pub fn plugin_config<T>(&self, name: &str) -> Result<T, ConfigError>
    where
        T: DeserializeOwned + Default,
    {
        match self.plugins.get(name) {
            None => Ok(T::default()),
            Some(value) => value.clone().try_into().map_err(|source| ConfigError::Plugin {
                plugin: name.to_string(),
                source,
            }),
        }
    }

    pub fn content_path(&self, root: &Path) -> PathBuf {
        root.join(&self.content_dir)
    }

    pub fn output_path(&self, root: &Path) -> PathBuf {
        root.join(&self.output_dir)
    }

    /// Location of the persisted build cache.
    pub fn cache_path(&self, root: &Path) -> PathBuf {
        match &self.cache.path {
            Some(p) => root.join(p),
            None => self.output_path(root).join(CACHE_FILENAME),
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel post workers.
    /// When absent, derived from the number of CPU cores.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

/// Size of the post worker pool: a fixed multiple of the effective thread
/// count, or the clamped `max_processes` when the user set one.
pub fn effective_workers(config: &ProcessingConfig) -> usize {
    match config.max_processes {
        Some(_) => effective_threads(config).max(1),
        None => effective_threads(config) * WORKERS_PER_THREAD,
    }
}

/// Build cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// When false every build starts cold (same as `--no-cache`).
    pub enabled: bool,
    /// Cache file relative to the site root. Defaults to a dotfile in
    /// `output_dir`, so it travels with cached output in CI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

/// One `[[feeds]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeedConfig {
    pub slug: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Only posts whose source path starts with this directory. Omit to
    /// include every listed post.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Posts per output page; 0 publishes a single page.
    #[serde(default)]
    pub per_page: usize,
    #[serde(default)]
    pub include_drafts: bool,
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(SiteConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely, so an
///   overlay `patterns` or `[[feeds]]` array replaces the default one.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load `config.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if no config file exists in the directory.
pub fn load_raw_config(root: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = root.join(CONFIG_FILENAME);
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<SiteConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: SiteConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `config.toml` in the site root.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result.
pub fn load_config(root: &Path) -> Result<SiteConfig, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(root)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `config.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Folio Configuration
# ===================
# All settings are optional. Values shown below are the defaults.
# Unknown keys outside [plugins.*] will cause an error.

title = "Untitled Site"

# Prefix for absolute links in published output.
base_url = "/"

# Source and output directories, relative to this file.
content_dir = "content"
output_dir = "public"

# Globs selecting source files inside content_dir.
# `*` matches within one path segment, `**` across segments.
patterns = ["**/*.md"]

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel post workers.
# Omit or comment out to auto-detect (= 2 x CPU cores).
# max_processes = 4

# ---------------------------------------------------------------------------
# Incremental build cache
# ---------------------------------------------------------------------------
[cache]
# Set to false to rebuild everything on every run.
enabled = true

# Cache file, relative to this file. Defaults to <output_dir>/.build-cache.json
# path = ".cache/build.json"

# ---------------------------------------------------------------------------
# Feeds
# ---------------------------------------------------------------------------
# [[feeds]]
# slug = "blog"              # Output directory and identity
# title = "Blog"
# description = "Notes"
# section = "posts"          # Only sources under content/posts/
# per_page = 10              # 0 = single page
# include_drafts = false

# ---------------------------------------------------------------------------
# Plugin settings
# ---------------------------------------------------------------------------
# [plugins.my-plugin]
# any = "value"
"##
}
