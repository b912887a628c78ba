//! Routing slugs derived from source paths.
//!
//! A slug is the source path relative to the content directory with the
//! extension dropped and every segment normalized:
//!
//! - `posts/2024-Hello-World.md` → `posts/2024-hello-world`
//! - `010-Guides/020-Getting-Started.md` → `guides/getting-started`
//! - `notes/rust/index.md` → `notes/rust`
//!
//! Segments may carry an `NNN-` ordering prefix, which is stripped so that
//! renumbering files does not move their URLs. A prefix is only stripped
//! when something follows it: `2024.md` keeps its name.

/// Split an `NNN-name` segment into its order number and name.
///
/// Returns `(None, segment)` when there is no numeric prefix or nothing
/// follows it.
pub fn split_order_prefix(segment: &str) -> (Option<u32>, &str) {
    if let Some((prefix, rest)) = segment.split_once('-')
        && !rest.is_empty()
        && prefix.len() == 3
        && let Ok(n) = prefix.parse::<u32>()
    {
        return (Some(n), rest);
    }
    (None, segment)
}

/// Lowercase, ASCII-alphanumeric segment with single dashes between words.
pub fn normalize_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut pending_dash = false;
    for c in segment.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}

/// Slug for a `/`-separated path relative to the content directory.
pub fn slug_from_path(relative: &str) -> String {
    let mut segments: Vec<&str> = relative
        .split(['/', '\\'])
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();

    if let Some(last) = segments.last_mut() {
        let name = *last;
        if let Some((stem, _)) = name.rsplit_once('.')
            && !stem.is_empty()
        {
            *last = stem;
        }
    }

    let mut parts: Vec<String> = segments
        .into_iter()
        .map(|s| normalize_segment(split_order_prefix(s).1))
        .filter(|s| !s.is_empty())
        .collect();

    if parts.len() > 1 && parts.last().is_some_and(|s| s == "index") {
        parts.pop();
    }
    if parts.is_empty() {
        return "index".to_string();
    }
    parts.join("/")
}
