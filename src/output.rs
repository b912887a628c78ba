//! CLI output formatting.
//!
//! # Information-First Display
//!
//! Every entity (post, feed, plugin) leads with its semantic identity
//! (positional index and title) and shows filesystem details as indented
//! context lines underneath.
//!
//! # Output Format
//!
//! ## Plan
//!
//! ```text
//! Glob
//!     -1000 glob
//! Configure
//!         0 feeds
//! Collect
//!      -100 collect
//!       100 feeds
//! Transform
//!     (no plugins)
//! ```
//!
//! ## Build
//!
//! ```text
//! Posts
//! 001 Welcome (changed)
//!     Source: 010-intro.md
//!     Slug: intro
//!
//! Feeds
//! 001 Blog → blog/ (2 posts, 1 page)
//!
//! Feeds: 1 cached, 0 rebuilt (1 total)
//! Built 2 posts (1 changed) → public
//! ```
//!
//! # Architecture
//!
//! Each report has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure.

use crate::build::{BuildReport, FeedSummary, PostSummary};
use crate::pipeline::Stage;
use std::path::Path;

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

// ============================================================================
// Plan
// ============================================================================

/// Format the per-stage run order of a pipeline.
pub fn format_plan(plan: &[(Stage, Vec<(String, i32)>)]) -> Vec<String> {
    let mut lines = Vec::new();
    for (stage, plugins) in plan {
        lines.push(capitalize(stage.as_str()));
        if plugins.is_empty() {
            lines.push(format!("{}(no plugins)", indent(1)));
        }
        for (name, priority) in plugins {
            lines.push(format!("{}{:>5} {}", indent(1), priority, name));
        }
    }
    lines
}

pub fn print_plan(plan: &[(Stage, Vec<(String, i32)>)]) {
    for line in format_plan(plan) {
        println!("{}", line);
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ============================================================================
// Build
// ============================================================================

fn post_lines(index: usize, post: &PostSummary, changed: bool) -> Vec<String> {
    let marker = if changed { " (changed)" } else { "" };
    vec![
        format!("{} {}{}", format_index(index), post.title, marker),
        format!("{}Source: {}", indent(1), post.source_path),
        format!("{}Slug: {}", indent(1), post.slug),
    ]
}

fn feed_line(index: usize, feed: &FeedSummary) -> String {
    format!(
        "{} {} → {}/ ({}, {})",
        format_index(index),
        feed.title,
        feed.slug,
        plural(feed.posts, "post", "posts"),
        plural(feed.pages, "page", "pages"),
    )
}

/// Format the inventory of a build or check run.
pub fn format_inventory(report: &BuildReport) -> Vec<String> {
    let mut lines = Vec::new();

    if !report.posts.is_empty() {
        lines.push("Posts".to_string());
        for (i, post) in report.posts.iter().enumerate() {
            let changed = report.changed.binary_search(&post.slug).is_ok();
            lines.extend(post_lines(i + 1, post, changed));
        }
    }

    if !report.feeds.is_empty() {
        if !lines.is_empty() {
            lines.push(String::new());
        }
        lines.push("Feeds".to_string());
        for (i, feed) in report.feeds.iter().enumerate() {
            lines.push(feed_line(i + 1, feed));
        }
    }

    lines
}

/// Format the full output of a build: inventory plus summary.
pub fn format_build_report(report: &BuildReport, root: &Path) -> Vec<String> {
    let mut lines = format_inventory(report);
    if !lines.is_empty() {
        lines.push(String::new());
    }
    if report.feed_stats.total() > 0 {
        lines.push(format!("Feeds: {}", report.feed_stats));
    }
    let output = report
        .output_dir
        .strip_prefix(root)
        .unwrap_or(&report.output_dir);
    lines.push(format!(
        "Built {} ({} changed) → {}",
        plural(report.posts.len(), "post", "posts"),
        report.changed.len(),
        output.display()
    ));
    lines
}

pub fn print_build_report(report: &BuildReport, root: &Path) {
    for line in format_build_report(report, root) {
        println!("{}", line);
    }
}

pub fn print_inventory(report: &BuildReport) {
    for line in format_inventory(report) {
        println!("{}", line);
    }
}
