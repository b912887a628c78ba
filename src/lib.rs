//! # Folio
//!
//! A build engine for static sites. Content goes through a fixed sequence of
//! stages, and every piece of build logic is a plugin that joins one or more
//! of them.
//!
//! # Architecture: Staged Plugin Pipeline
//!
//! ```text
//! Glob → Configure → Collect → Transform → Render → Write
//! ```
//!
//! - **Glob** discovers source files.
//! - **Configure** lets plugins read or adjust the site config.
//! - **Collect** turns sources into posts and assembles feeds.
//! - **Transform** and **Render** rewrite post content.
//! - **Write** persists output.
//!
//! Within a stage, plugins run in ascending priority, ties in registration
//! order. All of them share one [`manager::Manager`] holding the posts,
//! feeds, config, a per-build scratch cache, and the persisted build cache.
//! Per-post work fans out over a bounded worker pool through
//! [`manager::Manager::process_posts_concurrently`].
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`pipeline`] | Stage sequence, plugin capability traits, priority scheduling |
//! | [`manager`] | Per-build state, scratch cache, concurrent post processing |
//! | [`post`] | `Post` and `Feed` records shared between plugins |
//! | [`cache`] | Incremental build cache: glob entry, file fingerprints, feed hashes |
//! | [`hash`] | SHA-256 helpers and the domain-tagged `ContentHasher` |
//! | [`config`] | `config.toml` loading, layering over stock defaults, validation |
//! | [`slug`] | Routing slugs from source paths (`NNN-` prefixes dropped) |
//! | [`plugins`] | Built-in plugins: source glob, post collection, feed publication |
//! | [`build`] | Build driver: cache load, full pipeline run, cache save |
//! | [`output`] | CLI output formatting for plans and build reports |
//!
//! # Design Decisions
//!
//! ## Priorities Instead of a Dependency Graph
//!
//! Plugins do not declare what they depend on. A plugin that needs every
//! post to exist runs `LATE` in Collect; a plugin that must see raw sources
//! runs `EARLY`. Five named levels cover almost every case, and the run
//! order of a pipeline is printed by `folio plan`.
//!
//! ## Incremental Builds Are Conservative
//!
//! The build cache only ever lets work be *skipped* when every input it
//! knows about is unchanged and every output still exists. Anything it
//! cannot vouch for is rebuilt. Deleting `public/.build-cache.json` is
//! always safe.

pub mod build;
pub mod cache;
pub mod config;
pub mod hash;
pub mod manager;
pub mod output;
pub mod pipeline;
pub mod plugins;
pub mod post;
pub mod slug;

#[cfg(test)]
pub(crate) mod test_helpers;
