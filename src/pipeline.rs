//! Stage sequence and priority scheduling.
//!
//! A build runs six fixed stages in order:
//!
//! ```text
//! Glob → Configure → Collect → Transform → Render → Write
//! ```
//!
//! Plugins opt into stages by implementing the matching capability trait
//! ([`GlobStage`], [`CollectStage`], ...) and returning `Some(self)` from the
//! corresponding `as_*` accessor on [`Plugin`]. Within a stage, plugins run
//! in ascending [`Plugin::priority`] order; ties keep registration order.
//!
//! There is no dependency graph. Plugins that must run before or after
//! another say so with a priority relative to the named levels in
//! [`priority`], e.g. feed generation at `LATE` in Collect so that every
//! post exists before feeds are assembled.
//!
//! The first plugin error aborts the stage and the build.

use crate::manager::Manager;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Named priority levels. Any `i32` is a valid priority.
pub mod priority {
    pub const FIRST: i32 = -1000;
    pub const EARLY: i32 = -100;
    pub const DEFAULT: i32 = 0;
    pub const LATE: i32 = 100;
    pub const LAST: i32 = 1000;
}

/// One fixed phase of the build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Glob,
    Configure,
    Collect,
    Transform,
    Render,
    Write,
}

impl Stage {
    /// Every stage, in execution order.
    pub const ALL: [Stage; 6] = [
        Stage::Glob,
        Stage::Configure,
        Stage::Collect,
        Stage::Transform,
        Stage::Render,
        Stage::Write,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Glob => "glob",
            Stage::Configure => "configure",
            Stage::Collect => "collect",
            Stage::Transform => "transform",
            Stage::Render => "render",
            Stage::Write => "write",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A plugin call failed; the build stops here.
#[derive(Error, Debug)]
#[error("{stage} stage: plugin '{plugin}' failed: {error:#}")]
pub struct PluginError {
    pub stage: Stage,
    pub plugin: String,
    pub error: anyhow::Error,
}

pub trait GlobStage {
    /// Discover source files.
    fn glob(&mut self, manager: &mut Manager) -> anyhow::Result<()>;
}

pub trait ConfigureStage {
    /// Read or adjust configuration. Runs strictly in priority order, so
    /// later plugins see the changes earlier ones made.
    fn configure(&mut self, manager: &mut Manager) -> anyhow::Result<()>;
}

pub trait CollectStage {
    /// Build posts and feeds from the discovered files.
    fn collect(&mut self, manager: &mut Manager) -> anyhow::Result<()>;
}

pub trait TransformStage {
    /// Enrich or rewrite posts in place.
    fn transform(&mut self, manager: &mut Manager) -> anyhow::Result<()>;
}

pub trait RenderStage {
    /// Produce final output representations.
    fn render(&mut self, manager: &mut Manager) -> anyhow::Result<()>;
}

pub trait WriteStage {
    /// Persist output to disk.
    fn write(&mut self, manager: &mut Manager) -> anyhow::Result<()>;
}

/// A unit of build logic.
///
/// Only [`Plugin::name`] is required. Each `as_*` accessor defaults to
/// `None`; override the ones for the stages the plugin implements:
///
/// ```
/// use folio::manager::Manager;
/// use folio::pipeline::{Plugin, TransformStage};
///
/// struct WordCount;
///
/// impl Plugin for WordCount {
///     fn name(&self) -> &str {
///         "word-count"
///     }
///     fn as_transform(&mut self) -> Option<&mut dyn TransformStage> {
///         Some(self)
///     }
/// }
///
/// impl TransformStage for WordCount {
///     fn transform(&mut self, manager: &mut Manager) -> anyhow::Result<()> {
///         manager.process_posts_concurrently(|post| {
///             let words = post.content.split_whitespace().count();
///             post.extra.insert("words".into(), words.into());
///             Ok(())
///         })?;
///         Ok(())
///     }
/// }
/// ```
pub trait Plugin: Send {
    fn name(&self) -> &str;

    /// Ordering key within `stage`; lower runs first.
    fn priority(&self, _stage: Stage) -> i32 {
        priority::DEFAULT
    }

    fn as_glob(&mut self) -> Option<&mut dyn GlobStage> {
        None
    }

    fn as_configure(&mut self) -> Option<&mut dyn ConfigureStage> {
        None
    }

    fn as_collect(&mut self) -> Option<&mut dyn CollectStage> {
        None
    }

    fn as_transform(&mut self) -> Option<&mut dyn TransformStage> {
        None
    }

    fn as_render(&mut self) -> Option<&mut dyn RenderStage> {
        None
    }

    fn as_write(&mut self) -> Option<&mut dyn WriteStage> {
        None
    }
}

/// Whether `plugin` implements `stage`.
fn implements(plugin: &mut dyn Plugin, stage: Stage) -> bool {
    match stage {
        Stage::Glob => plugin.as_glob().is_some(),
        Stage::Configure => plugin.as_configure().is_some(),
        Stage::Collect => plugin.as_collect().is_some(),
        Stage::Transform => plugin.as_transform().is_some(),
        Stage::Render => plugin.as_render().is_some(),
        Stage::Write => plugin.as_write().is_some(),
    }
}

/// Invoke `plugin`'s operation for `stage`. A plugin without the capability
/// is a no-op.
fn invoke(plugin: &mut dyn Plugin, stage: Stage, manager: &mut Manager) -> anyhow::Result<()> {
    match stage {
        Stage::Glob => plugin.as_glob().map_or(Ok(()), |p| p.glob(manager)),
        Stage::Configure => plugin.as_configure().map_or(Ok(()), |p| p.configure(manager)),
        Stage::Collect => plugin.as_collect().map_or(Ok(()), |p| p.collect(manager)),
        Stage::Transform => plugin.as_transform().map_or(Ok(()), |p| p.transform(manager)),
        Stage::Render => plugin.as_render().map_or(Ok(()), |p| p.render(manager)),
        Stage::Write => plugin.as_write().map_or(Ok(()), |p| p.write(manager)),
    }
}

/// Ordered plugin registry and stage driver.
#[derive(Default)]
pub struct Pipeline {
    plugins: Vec<Box<dyn Plugin>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a plugin. Duplicate names are allowed but logged.
    pub fn register(&mut self, plugin: Box<dyn Plugin>) {
        if self.plugins.iter().any(|p| p.name() == plugin.name()) {
            warn!(plugin = plugin.name(), "plugin name registered more than once");
        }
        self.plugins.push(plugin);
    }

    /// Builder-style [`Pipeline::register`].
    pub fn with(mut self, plugin: impl Plugin + 'static) -> Self {
        self.register(Box::new(plugin));
        self
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Registered plugin names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Registry indices of the plugins implementing `stage`, in run order.
    fn schedule(&mut self, stage: Stage) -> Vec<(usize, i32)> {
        let mut selected = Vec::new();
        for (i, plugin) in self.plugins.iter_mut().enumerate() {
            if implements(&mut **plugin, stage) {
                selected.push((i, plugin.priority(stage)));
            }
        }
        // Stable: equal priorities keep registration order.
        selected.sort_by_key(|&(_, prio)| prio);
        selected
    }

    /// `(name, priority)` of each plugin `run_stage` would call, in order.
    pub fn plan(&mut self, stage: Stage) -> Vec<(String, i32)> {
        self.schedule(stage)
            .into_iter()
            .map(|(i, prio)| (self.plugins[i].name().to_string(), prio))
            .collect()
    }

    /// Run every plugin implementing `stage`, lowest priority first.
    pub fn run_stage(&mut self, stage: Stage, manager: &mut Manager) -> Result<(), PluginError> {
        let order = self.schedule(stage);
        info!(%stage, plugins = order.len(), "running stage");
        for (i, prio) in order {
            let plugin = &mut *self.plugins[i];
            debug!(%stage, plugin = plugin.name(), priority = prio, "invoking plugin");
            invoke(plugin, stage, manager).map_err(|error| PluginError {
                stage,
                plugin: plugin.name().to_string(),
                error,
            })?;
        }
        Ok(())
    }

    /// Run all stages in order, stopping at the first failure.
    pub fn run_all(&mut self, manager: &mut Manager) -> Result<(), PluginError> {
        for stage in Stage::ALL {
            self.run_stage(stage, manager)?;
        }
        Ok(())
    }

    /// Names registered more than once, sorted.
    pub fn duplicate_names(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let dups: BTreeSet<&str> = self
            .plugins
            .iter()
            .map(|p| p.name())
            .filter(|n| !seen.insert(*n))
            .collect();
        dups.into_iter().collect()
    }
}
