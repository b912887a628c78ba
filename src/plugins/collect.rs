//! Turns discovered source files into posts.
//!
//! Runs early in Collect so later collectors (feeds, taxonomies) see every
//! post. Reading and hashing happen on the worker pool; fingerprints are then
//! recorded in the build cache from the driver, in source order.

use crate::hash::hash_bytes;
use crate::manager::Manager;
use crate::pipeline::{CollectStage, Plugin, Stage, priority};
use crate::plugins::glob::FILES_KEY;
use crate::post::Post;
use crate::slug::slug_from_path;
use anyhow::Context;
use std::collections::HashMap;
use std::fs;
use tracing::{debug, info};

/// `extra` key holding the content hash of the post's source file.
pub const CONTENT_HASH_KEY: &str = "content_hash";

/// Title from the first `# ` heading, if any.
pub fn title_from_markdown(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim_start)
        .find_map(|line| line.strip_prefix("# "))
        .map(|t| t.trim().trim_end_matches('#').trim_end().to_string())
        .filter(|t| !t.is_empty())
}

/// Fallback title from the last slug segment: `posts/hello-world` → `Hello World`.
pub fn title_from_slug(slug: &str) -> String {
    let last = slug.rsplit('/').next().unwrap_or(slug);
    last.split('-')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Reads every globbed file into a [`Post`].
#[derive(Debug, Default)]
pub struct CollectPlugin;

impl Plugin for CollectPlugin {
    fn name(&self) -> &str {
        "collect"
    }

    fn priority(&self, _stage: Stage) -> i32 {
        priority::EARLY
    }

    fn as_collect(&mut self) -> Option<&mut dyn CollectStage> {
        Some(self)
    }
}

impl CollectStage for CollectPlugin {
    fn collect(&mut self, manager: &mut Manager) -> anyhow::Result<()> {
        let files = manager
            .cache()
            .get::<Vec<String>>(FILES_KEY)
            .cloned()
            .unwrap_or_default();
        if files.is_empty() {
            info!("no source files to collect");
            return Ok(());
        }

        let mut seen: HashMap<String, String> = HashMap::new();
        let mut handles = Vec::with_capacity(files.len());
        for rel in files {
            let slug = slug_from_path(&rel);
            if let Some(other) = seen.insert(slug.clone(), rel.clone()) {
                anyhow::bail!("'{other}' and '{rel}' both map to slug '{slug}'");
            }
            handles.push(manager.add_post(Post::new(rel, slug)));
        }

        let content = manager.content_path();
        manager
            .process_posts_slice_concurrently(&handles, |post| {
                let path = content.join(&post.source_path);
                let bytes =
                    fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
                post.extra
                    .insert(CONTENT_HASH_KEY.into(), hash_bytes(&bytes).into());
                let text = String::from_utf8(bytes)
                    .with_context(|| format!("{} is not valid UTF-8", path.display()))?;
                post.title =
                    title_from_markdown(&text).unwrap_or_else(|| title_from_slug(&post.slug));
                post.content = text;
                Ok(())
            })?;

        let mut changed = 0usize;
        for handle in &handles {
            let post = handle.read();
            let hash = post
                .extra_as::<String>(CONTENT_HASH_KEY)
                .unwrap_or_default();
            if manager
                .build_cache_mut()
                .record_file(&post.source_path, &post.slug, &hash)
            {
                debug!(slug = %post.slug, "changed since last build");
                changed += 1;
            }
        }
        info!(posts = handles.len(), changed, "collected posts");
        Ok(())
    }
}
