//! Built-in plugins.
//!
//! | Plugin | Stage (priority) | Role |
//! |--------|------------------|------|
//! | [`GlobPlugin`] | Glob (`FIRST`) | Walks `content_dir`, matches `patterns`, keeps the glob cache current |
//! | [`CollectPlugin`] | Collect (`EARLY`) | Reads every discovered file into a [`Post`](crate::post::Post) and records its fingerprint |
//! | [`FeedsPlugin`] | Collect (`LATE`), Write | Assembles `[[feeds]]` and publishes them as paginated JSON, skipping fresh feeds |
//!
//! Content transforms (markdown, templates, assets) are supplied by the
//! embedding application and registered alongside these.

pub mod collect;
pub mod feeds;
pub mod glob;

pub use collect::CollectPlugin;
pub use feeds::FeedsPlugin;
pub use glob::GlobPlugin;

use crate::pipeline::Pipeline;

/// Pipeline with the built-in plugins registered.
pub fn default_pipeline() -> Pipeline {
    Pipeline::new()
        .with(GlobPlugin)
        .with(CollectPlugin)
        .with(FeedsPlugin::default())
}
