//! Data models for feed rows and generated post metadata.
//!
//! - [`RawRow`]: one CSV record exactly as read, keyed by column name
//! - [`BlogPostItem`]: a validated, whitespace-trimmed row ready to be written
//! - [`PostMetadata`]: the metadata header read back from a generated post

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use itertools::Itertools;
use std::collections::BTreeMap;

use crate::error::{FeedError, Result};
use crate::utils::slugify;

/// Tag added to every post.
pub const DEFAULT_TAG: &str = "tech";

/// CSV column names, in the order the feed publishes them.
pub mod columns {
    pub const TITLE: &str = "Title";
    pub const LINK: &str = "Link";
    pub const PUBLISHED_DATE: &str = "Published Date";
    pub const SUMMARY: &str = "Summary";
    pub const AI_CATEGORY: &str = "AI Category";
    pub const SOURCE_NAME: &str = "Source Name";
    pub const SOURCE_URL: &str = "Source URL";
    pub const AUTHOR: &str = "Author";
    pub const SOURCE_CATEGORY: &str = "Source Category";
}

/// A CSV record before validation. Missing columns are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    pub title: String,
    pub link: String,
    pub published_date: String,
    pub summary: String,
    pub ai_category: String,
    pub source_name: String,
    pub source_url: String,
    pub author: String,
    pub source_category: String,
}

/// A single article from the feed, trimmed and validated.
///
/// Construction (via [`TryFrom<RawRow>`]) guarantees that `title`, `link`
/// and `published_date` are non-empty and that the date parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlogPostItem {
    pub title: String,
    pub link: String,
    /// The published date exactly as it appeared in the feed (trimmed).
    pub published_date: String,
    pub published_at: DateTime<FixedOffset>,
    pub summary: String,
    pub ai_category: String,
    pub source_name: String,
    pub source_url: String,
    pub author: String,
    pub source_category: String,
}

impl TryFrom<RawRow> for BlogPostItem {
    type Error = FeedError;

    fn try_from(row: RawRow) -> Result<Self> {
        let title = row.title.trim().to_string();
        let link = row.link.trim().to_string();
        let published_date = row.published_date.trim().to_string();

        for (name, value) in [
            (columns::TITLE, &title),
            (columns::LINK, &link),
            (columns::PUBLISHED_DATE, &published_date),
        ] {
            if value.is_empty() {
                return Err(FeedError::invalid_row(format!("{name} is required")));
            }
        }

        let published_at = parse_published_date(&published_date).ok_or_else(|| {
            FeedError::invalid_row(format!("unparseable published date {published_date:?}"))
        })?;

        Ok(Self {
            title,
            link,
            published_date,
            published_at,
            summary: row.summary.trim().to_string(),
            ai_category: row.ai_category.trim().to_string(),
            source_name: row.source_name.trim().to_string(),
            source_url: row.source_url.trim().to_string(),
            author: row.author.trim().to_string(),
            source_category: row.source_category.trim().to_string(),
        })
    }
}

impl BlogPostItem {
    /// Filename stem for this post.
    pub fn slug(&self) -> String {
        slugify(&self.title)
    }

    /// Directory name the post is filed under (`YYYY-MM-DD`).
    pub fn date_dir(&self) -> String {
        self.published_at.format("%Y-%m-%d").to_string()
    }

    /// Header timestamp, e.g. `2024-08-30 10:00:00 +0000`.
    pub fn header_date(&self) -> String {
        self.published_at.format("%Y-%m-%d %H:%M:%S %z").to_string()
    }

    /// Category recorded in the header; falls back to [`DEFAULT_TAG`].
    pub fn category(&self) -> String {
        if self.ai_category.is_empty() {
            DEFAULT_TAG.to_string()
        } else {
            self.ai_category.to_lowercase()
        }
    }

    /// Sorted, deduplicated, comma-joined tag list.
    pub fn tags(&self) -> String {
        std::iter::once(self.ai_category.to_lowercase())
            .chain(
                self.source_category
                    .split(',')
                    .map(|tag| tag.trim().to_lowercase()),
            )
            .chain(std::iter::once(DEFAULT_TAG.to_string()))
            .filter(|tag| !tag.trim().is_empty())
            .unique()
            .sorted()
            .join(",")
    }
}

/// Only items with both a category and a summary are worth a post.
pub fn is_valid_to_save(item: &BlogPostItem) -> bool {
    !item.ai_category.trim().is_empty() && !item.summary.trim().is_empty()
}

/// Parse the feed's ISO-8601 timestamps.
///
/// Offsets are preserved. Timestamps without an offset, and bare dates, are
/// taken as UTC.
pub fn parse_published_date(s: &str) -> Option<DateTime<FixedOffset>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc().fixed_offset());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().fixed_offset())
}

/// The `.. key: value` header of a generated post, read back from disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostMetadata {
    pub fields: BTreeMap<String, String>,
}

impl PostMetadata {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn category(&self) -> Option<&str> {
        self.get("category")
    }

    pub fn source(&self) -> Option<&str> {
        self.get("source")
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn valid_row() -> RawRow {
        RawRow {
            title: "Test Article".to_string(),
            link: "https://example.com/test".to_string(),
            published_date: "2024-08-30T10:00:00Z".to_string(),
            summary: "Test summary".to_string(),
            ai_category: "technical_deep_dives".to_string(),
            source_name: "Test Blog".to_string(),
            source_url: "https://example.com".to_string(),
            author: "Test Author".to_string(),
            source_category: String::new(),
        }
    }

    #[test]
    fn test_valid_blog_post_item() {
        let item = BlogPostItem::try_from(valid_row()).unwrap();
        assert_eq!(item.title, "Test Article");
        assert_eq!(item.link, "https://example.com/test");
        assert_eq!(item.published_date, "2024-08-30T10:00:00Z");
        assert_eq!(item.ai_category, "technical_deep_dives");
        assert_eq!(item.source_name, "Test Blog");
        assert_eq!(item.source_url, "https://example.com");
    }

    #[test]
    fn test_required_fields_validation() {
        let clears: [fn(&mut RawRow); 3] = [
            |r: &mut RawRow| r.title.clear(),
            |r: &mut RawRow| r.link = "   ".to_string(),
            |r: &mut RawRow| r.published_date.clear(),
        ];
        for clear in clears {
            let mut row = valid_row();
            clear(&mut row);
            let err = BlogPostItem::try_from(row).unwrap_err();
            assert!(matches!(err, FeedError::InvalidRow { .. }));
        }
    }

    #[test]
    fn test_unparseable_date_is_rejected() {
        let mut row = valid_row();
        row.published_date = "yesterday".to_string();
        assert!(BlogPostItem::try_from(row).is_err());
    }

    #[test]
    fn test_optional_fields_default_values() {
        let item = BlogPostItem::try_from(RawRow {
            title: "Test Title".to_string(),
            link: "https://example.com".to_string(),
            published_date: "2024-08-30T10:00:00Z".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(item.summary, "");
        assert_eq!(item.ai_category, "");
        assert_eq!(item.source_name, "");
        assert_eq!(item.source_url, "");
        assert_eq!(item.author, "");
    }

    #[test]
    fn test_field_cleanup() {
        let item = BlogPostItem::try_from(RawRow {
            title: "  Test Title  ".to_string(),
            link: "  https://example.com  ".to_string(),
            published_date: "  2024-08-30T10:00:00Z  ".to_string(),
            summary: "  Test summary  ".to_string(),
            ai_category: "  technical_deep_dives  ".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(item.title, "Test Title");
        assert_eq!(item.link, "https://example.com");
        assert_eq!(item.published_date, "2024-08-30T10:00:00Z");
        assert_eq!(item.summary, "Test summary");
        assert_eq!(item.ai_category, "technical_deep_dives");
    }

    #[test]
    fn test_is_valid_to_save() {
        let item = BlogPostItem::try_from(valid_row()).unwrap();
        assert!(is_valid_to_save(&item));

        let mut row = valid_row();
        row.ai_category.clear();
        assert!(!is_valid_to_save(&BlogPostItem::try_from(row).unwrap()));

        let mut row = valid_row();
        row.summary.clear();
        assert!(!is_valid_to_save(&BlogPostItem::try_from(row).unwrap()));

        let mut row = valid_row();
        row.ai_category = "   ".to_string();
        row.summary = "   ".to_string();
        assert!(!is_valid_to_save(&BlogPostItem::try_from(row).unwrap()));
    }

    #[test]
    fn test_parse_published_date_forms() {
        let utc = parse_published_date("2024-08-30T10:00:00Z").unwrap();
        assert_eq!(utc.to_rfc3339(), "2024-08-30T10:00:00+00:00");

        let offset = parse_published_date("2024-08-30T23:30:00+02:00").unwrap();
        assert_eq!(offset.format("%Y-%m-%d %z").to_string(), "2024-08-30 +0200");

        let spaced = parse_published_date("2024-08-30 10:00:00+00:00").unwrap();
        assert_eq!(spaced, utc);

        let naive = parse_published_date("2024-08-30T10:00:00").unwrap();
        assert_eq!(naive, utc);

        let fractional = parse_published_date("2024-08-30T10:00:00.250Z").unwrap();
        assert_eq!(fractional.timestamp_subsec_millis(), 250);

        let date_only = parse_published_date("2024-08-30").unwrap();
        assert_eq!(date_only.to_rfc3339(), "2024-08-30T00:00:00+00:00");

        assert!(parse_published_date("30/08/2024").is_none());
    }

    #[test]
    fn test_date_dir_uses_own_offset() {
        let mut row = valid_row();
        row.published_date = "2024-08-30T23:30:00-05:00".to_string();
        let item = BlogPostItem::try_from(row).unwrap();
        assert_eq!(item.date_dir(), "2024-08-30");
        assert_eq!(item.header_date(), "2024-08-30 23:30:00 -0500");
    }

    #[test]
    fn test_tags_are_sorted_and_deduplicated() {
        let mut row = valid_row();
        row.ai_category = "General".to_string();
        row.source_category = "Rust, tech ,, general,Databases".to_string();
        let item = BlogPostItem::try_from(row).unwrap();
        assert_eq!(item.tags(), "databases,general,rust,tech");
    }

    #[test]
    fn test_tags_without_categories() {
        let mut row = valid_row();
        row.ai_category.clear();
        let item = BlogPostItem::try_from(row).unwrap();
        assert_eq!(item.tags(), "tech");
        assert_eq!(item.category(), "tech");
    }

    #[test]
    fn test_post_metadata_accessors() {
        let mut fields = BTreeMap::new();
        fields.insert("category".to_string(), "general".to_string());
        fields.insert("source".to_string(), String::new());
        let meta = PostMetadata { fields };
        assert_eq!(meta.category(), Some("general"));
        assert_eq!(meta.source(), None);
    }
}
