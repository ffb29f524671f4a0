//! CSV feed parsing.
//!
//! Columns are looked up by header name, so column order does not matter and
//! unknown columns are ignored. Missing columns read as empty strings, which
//! means a feed without a required column yields no items at all.

use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::{debug, info, instrument, warn};

use crate::error::Result;
use crate::models::{columns, BlogPostItem, RawRow};

/// Header positions for the columns we know about.
#[derive(Debug, Default)]
struct ColumnIndex {
    title: Option<usize>,
    link: Option<usize>,
    published_date: Option<usize>,
    summary: Option<usize>,
    ai_category: Option<usize>,
    source_name: Option<usize>,
    source_url: Option<usize>,
    author: Option<usize>,
    source_category: Option<usize>,
}

impl ColumnIndex {
    fn from_headers(headers: &StringRecord) -> Self {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim_start_matches('\u{feff}').trim() == name)
        };
        Self {
            title: find(columns::TITLE),
            link: find(columns::LINK),
            published_date: find(columns::PUBLISHED_DATE),
            summary: find(columns::SUMMARY),
            ai_category: find(columns::AI_CATEGORY),
            source_name: find(columns::SOURCE_NAME),
            source_url: find(columns::SOURCE_URL),
            author: find(columns::AUTHOR),
            source_category: find(columns::SOURCE_CATEGORY),
        }
    }

    fn row(&self, record: &StringRecord) -> RawRow {
        let get = |idx: Option<usize>| {
            idx.and_then(|i| record.get(i))
                .unwrap_or_default()
                .to_string()
        };
        RawRow {
            title: get(self.title),
            link: get(self.link),
            published_date: get(self.published_date),
            summary: get(self.summary),
            ai_category: get(self.ai_category),
            source_name: get(self.source_name),
            source_url: get(self.source_url),
            author: get(self.author),
            source_category: get(self.source_category),
        }
    }
}

/// Read raw rows from CSV text. Fails only if the text is not CSV at all.
pub fn read_rows(csv_text: &str) -> Result<Vec<RawRow>> {
    if csv_text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::Headers)
        .from_reader(csv_text.as_bytes());

    let index = ColumnIndex::from_headers(reader.headers()?);
    debug!(?index, "Resolved CSV columns");

    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(index.row(&record?));
    }
    Ok(rows)
}

/// Outcome of parsing one feed body.
#[derive(Debug, Default)]
pub struct ParsedFeed {
    /// Number of data rows read, valid or not.
    pub rows: usize,
    pub items: Vec<BlogPostItem>,
}

/// Parse CSV text, keeping the row count alongside the valid items.
#[instrument(level = "info", skip_all, fields(bytes = csv_text.len()))]
pub fn parse_feed(csv_text: &str) -> ParsedFeed {
    let rows = match read_rows(csv_text) {
        Ok(rows) => rows,
        Err(e) => {
            warn!(error = %e, "Could not read CSV data");
            return ParsedFeed::default();
        }
    };

    let total = rows.len();
    let items: Vec<BlogPostItem> = rows
        .into_iter()
        .enumerate()
        .filter_map(|(i, row)| match BlogPostItem::try_from(row) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(row = i + 1, error = %e, "Skipping row");
                None
            }
        })
        .collect();

    info!(rows = total, valid = items.len(), "Parsed CSV rows");
    ParsedFeed { rows: total, items }
}

/// Parse CSV text into validated [`BlogPostItem`]s.
///
/// Rows that fail validation are logged with their 1-based row number and
/// skipped. Unreadable CSV yields an empty list.
pub fn parse_csv_to_objects(csv_text: &str) -> Vec<BlogPostItem> {
    parse_feed(csv_text).items
}
