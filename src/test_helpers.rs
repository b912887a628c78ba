//! Shared test utilities for the folio test suite.
//!
//! Provides post/manager builders and a configurable [`RecordingPlugin`]
//! that logs every stage call into a shared [`CallLog`].
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let log = CallLog::default();
//! let mut pipeline = Pipeline::new()
//!     .with(RecordingPlugin::new("a", &log).stages(&[Stage::Render]).priority(10));
//! pipeline.run_stage(Stage::Render, &mut manager_with_posts(&["x"])).unwrap();
//! assert_eq!(log.calls(), vec!["render:a"]);
//! ```

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::config::SiteConfig;
use crate::manager::Manager;
use crate::pipeline::{
    CollectStage, ConfigureStage, GlobStage, Plugin, RenderStage, Stage, TransformStage,
    WriteStage, priority,
};
use crate::post::Post;

// =========================================================================
// Builders
// =========================================================================

/// A post whose source path is `<slug>.md`.
pub fn post(slug: &str) -> Post {
    Post::new(format!("{slug}.md"), slug)
}

/// Manager rooted at `/site` holding one post per slug, in order.
pub fn manager_with_posts(slugs: &[&str]) -> Manager {
    let mut m = Manager::new("/site", SiteConfig::default());
    for slug in slugs {
        m.add_post(post(slug));
    }
    m
}

// =========================================================================
// Recording plugin
// =========================================================================

/// Shared, ordered record of `"<stage>:<plugin>"` calls.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn calls(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    fn push(&self, stage: Stage, name: &str) {
        self.0.lock().push(format!("{stage}:{name}"));
    }
}

/// Plugin implementing whichever stages it is told to, logging each call.
///
/// In Configure it also appends `+<name>` to the site title, so tests can
/// observe that configuration changes happen in priority order.
pub struct RecordingPlugin {
    name: String,
    log: CallLog,
    stages: HashSet<Stage>,
    priority: i32,
    stage_priorities: HashMap<Stage, i32>,
    failing: Option<Stage>,
}

impl RecordingPlugin {
    pub fn new(name: &str, log: &CallLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            stages: HashSet::new(),
            priority: priority::DEFAULT,
            stage_priorities: HashMap::new(),
            failing: None,
        }
    }

    pub fn stages(mut self, stages: &[Stage]) -> Self {
        self.stages.extend(stages.iter().copied());
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn stage_priority(mut self, stage: Stage, priority: i32) -> Self {
        self.stage_priorities.insert(stage, priority);
        self
    }

    /// Return an error from `stage` (after logging the call).
    pub fn failing(mut self, stage: Stage) -> Self {
        self.failing = Some(stage);
        self
    }

    fn call(&self, stage: Stage) -> anyhow::Result<()> {
        self.log.push(stage, &self.name);
        if self.failing == Some(stage) {
            anyhow::bail!("{} failed in {stage}", self.name);
        }
        Ok(())
    }

    fn has(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }
}

impl Plugin for RecordingPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self, stage: Stage) -> i32 {
        self.stage_priorities
            .get(&stage)
            .copied()
            .unwrap_or(self.priority)
    }

    fn as_glob(&mut self) -> Option<&mut dyn GlobStage> {
        if self.has(Stage::Glob) { Some(self) } else { None }
    }

    fn as_configure(&mut self) -> Option<&mut dyn ConfigureStage> {
        if self.has(Stage::Configure) { Some(self) } else { None }
    }

    fn as_collect(&mut self) -> Option<&mut dyn CollectStage> {
        if self.has(Stage::Collect) { Some(self) } else { None }
    }

    fn as_transform(&mut self) -> Option<&mut dyn TransformStage> {
        if self.has(Stage::Transform) { Some(self) } else { None }
    }

    fn as_render(&mut self) -> Option<&mut dyn RenderStage> {
        if self.has(Stage::Render) { Some(self) } else { None }
    }

    fn as_write(&mut self) -> Option<&mut dyn WriteStage> {
        if self.has(Stage::Write) { Some(self) } else { None }
    }
}

impl GlobStage for RecordingPlugin {
    fn glob(&mut self, _manager: &mut Manager) -> anyhow::Result<()> {
        self.call(Stage::Glob)
    }
}

impl ConfigureStage for RecordingPlugin {
    fn configure(&mut self, manager: &mut Manager) -> anyhow::Result<()> {
        manager.config_mut().title.push_str(&format!("+{}", self.name));
        self.call(Stage::Configure)
    }
}

impl CollectStage for RecordingPlugin {
    fn collect(&mut self, _manager: &mut Manager) -> anyhow::Result<()> {
        self.call(Stage::Collect)
    }
}

impl TransformStage for RecordingPlugin {
    fn transform(&mut self, _manager: &mut Manager) -> anyhow::Result<()> {
        self.call(Stage::Transform)
    }
}

impl RenderStage for RecordingPlugin {
    fn render(&mut self, _manager: &mut Manager) -> anyhow::Result<()> {
        self.call(Stage::Render)
    }
}

impl WriteStage for RecordingPlugin {
    fn write(&mut self, _manager: &mut Manager) -> anyhow::Result<()> {
        self.call(Stage::Write)
    }
}
