//! Source discovery.
//!
//! Walks the content directory and keeps every file whose relative path
//! matches one of the configured patterns. The result, sorted and
//! `/`-separated, goes into the scratch cache under [`FILES_KEY`] for the
//! collect stage.
//!
//! The glob cache is consulted only to report whether the pattern set or
//! the file set moved since the last build; the walk itself always runs,
//! so a new or deleted file is never missed.
//!
//! ## Pattern syntax
//!
//! | Token | Matches |
//! |-------|---------|
//! | `*` | any run of characters within one path segment |
//! | `?` | one character other than `/` |
//! | `**/` | zero or more whole directories |
//! | `**` | anything, across segments |
//!
//! Hidden files and directories (leading `.`) are never matched.

use crate::hash::{ContentHasher, hash_string_set};
use crate::manager::Manager;
use crate::pipeline::{GlobStage, Plugin, Stage, priority};
use anyhow::Context;
use regex::Regex;
use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Scratch cache key holding the discovered `Vec<String>` of relative paths.
pub const FILES_KEY: &str = "glob.files";

/// Compiled set of glob patterns.
#[derive(Debug, Clone)]
pub struct PatternSet {
    patterns: Vec<Regex>,
}

impl PatternSet {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(&glob_to_regex(p.as_ref())))
            .collect::<Result<_, _>>()?;
        Ok(Self { patterns })
    }

    /// Whether a `/`-separated relative path matches any pattern.
    pub fn is_match(&self, relative: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(relative))
    }
}

/// Translate one glob into an anchored regex.
fn glob_to_regex(glob: &str) -> String {
    let glob = glob.trim().trim_start_matches("./");
    let mut re = String::with_capacity(glob.len() * 2 + 2);
    re.push('^');
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    chars.next();
                    re.push_str("(?:.*/)?");
                } else {
                    re.push_str(".*");
                }
            }
            '*' => re.push_str("[^/]*"),
            '?' => re.push_str("[^/]"),
            c => re.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    re.push('$');
    re
}

/// Cache key for a pattern set applied to a content directory.
/// Pattern order and duplicates do not matter.
pub fn pattern_hash<S: AsRef<str>>(content_dir: &str, patterns: &[S]) -> String {
    ContentHasher::new("glob")
        .str_field(content_dir)
        .str_field(&hash_string_set(
            "patterns",
            patterns.iter().map(|p| p.as_ref()),
        ))
        .finish()
}

/// Sorted relative paths of the files under `root` matching `patterns`.
pub fn discover(root: &Path, patterns: &PatternSet) -> Result<Vec<String>, walkdir::Error> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if patterns.is_match(&relative) {
            files.push(relative);
        }
    }
    files.sort();
    Ok(files)
}

/// Discovers source files; see the module docs.
#[derive(Debug, Default)]
pub struct GlobPlugin;

impl Plugin for GlobPlugin {
    fn name(&self) -> &str {
        "glob"
    }

    fn priority(&self, _stage: Stage) -> i32 {
        priority::FIRST
    }

    fn as_glob(&mut self) -> Option<&mut dyn GlobStage> {
        Some(self)
    }
}

impl GlobStage for GlobPlugin {
    fn glob(&mut self, manager: &mut Manager) -> anyhow::Result<()> {
        let root = manager.content_path();
        if !root.is_dir() {
            anyhow::bail!("content directory not found: {}", root.display());
        }

        let config = manager.config();
        let matcher = PatternSet::new(&config.patterns).context("invalid glob pattern")?;
        let key = pattern_hash(&config.content_dir, &config.patterns);

        let files = discover(&root, &matcher)
            .with_context(|| format!("scanning {}", root.display()))?;

        match manager.build_cache().glob_cache(&key) {
            Some(previous) if previous == files.as_slice() => {
                debug!(files = files.len(), "source set unchanged since last build")
            }
            Some(previous) => info!(
                before = previous.len(),
                after = files.len(),
                "source set changed since last build"
            ),
            None => info!(files = files.len(), "patterns changed or no glob cache"),
        }

        manager
            .build_cache_mut()
            .set_glob_cache(files.clone(), key);
        manager.cache_mut().set(FILES_KEY, files);
        Ok(())
    }
}
