//! Text normalization and file system helpers.
//!
//! This module provides helper functions used throughout the application:
//! - Slug derivation for post filenames
//! - HTML-to-text cleanup for summaries and descriptions
//! - Display-name formatting for filter navigation
//! - String truncation for logging
//! - File system validation for the posts directory

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

use crate::error::{FeedError, Result};

/// Maximum slug length in characters.
pub const SLUG_MAX_CHARS: usize = 75;

/// Maximum description length in characters, before the `...` suffix.
pub const DESCRIPTION_MAX_CHARS: usize = 150;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));
static NON_SLUG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").expect("valid regex"));
static SEPARATOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-\s]+").expect("valid regex"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Convert a title to a URL-friendly slug.
///
/// HTML tags are removed first, then anything that is not a word character,
/// whitespace or `-`. The remainder is trimmed and lowercased, runs of
/// whitespace and hyphens collapse to a single `-`, and the result is capped
/// at [`SLUG_MAX_CHARS`] characters.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(slugify("Test Article Title"), "test-article-title");
/// assert_eq!(slugify("<b>Bold Title</b>"), "bold-title");
/// ```
pub fn slugify(text: &str) -> String {
    let text = TAG_RE.replace_all(text, "");
    let text = NON_SLUG_RE.replace_all(&text, "");
    let text = text.trim().to_lowercase();
    SEPARATOR_RE
        .replace_all(&text, "-")
        .chars()
        .take(SLUG_MAX_CHARS)
        .collect()
}

/// Reduce an HTML snippet to plain readable text.
///
/// Entities are decoded, tags are dropped (their text is kept) and all
/// whitespace runs collapse to a single space.
pub fn clean_html_content(content: &str) -> String {
    if content.trim().is_empty() {
        return String::new();
    }

    let fragment = Html::parse_fragment(content);
    let text = fragment.root_element().text().collect::<String>();
    // Escaped markup (`&lt;b&gt;`) decodes into real tags; drop those too.
    let text = TAG_RE.replace_all(&text, "");
    WHITESPACE_RE.replace_all(&text, " ").trim().to_string()
}

/// Escape double quotes for a metadata header value.
pub fn escape_quotes(s: &str) -> String {
    s.replace('"', "\\\"")
}

/// Build the one-line post description from a raw summary.
pub fn describe(summary: &str) -> String {
    let cleaned = clean_html_content(summary);
    let mut description: String = cleaned.chars().take(DESCRIPTION_MAX_CHARS).collect();
    description.push_str("...");
    escape_quotes(&description)
}

/// Turn an identifier like `technical_deep_dives` into `Technical Deep Dives`.
pub fn display_name(s: &str) -> String {
    s.split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(upcase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Capitalize the first character of a string.
pub fn upcase(s: &str) -> String {
    let mut c = s.chars();
    match c.next() {
        None => String::new(),
        Some(f) => f.to_uppercase().collect::<String>() + c.as_str(),
    }
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut at `max` characters with an ellipsis and a count of
/// the bytes left out.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}…(+{} bytes)", &s[..cut], s.len() - cut),
    }
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then writes and removes a probe file.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .await
        .map_err(|e| FeedError::io(path, e))?;

    let probe_path = path.join("..__probe_write__");
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Posts directory is writable");
            Ok(())
        }
        Err(e) => Err(FeedError::io(path, e)),
    }
}
