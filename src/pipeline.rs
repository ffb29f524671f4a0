//! The two runs the CLI offers: `generate` and `filters`.
//!
//! `generate` walks each requested feed in order (fetch, parse, write), then
//! refreshes the filter fragment once for the whole corpus.

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use tracing::{error, info, instrument};

use crate::config::Settings;
use crate::error::Result;
use crate::feed::{csv_url, process_csv_for_date, FetchCsv};
use crate::outputs::filters::regenerate_filters;
use crate::utils::ensure_writable_dir;

/// Totals for one `generate` run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub feeds: usize,
    pub processed: usize,
    pub created: usize,
    pub filters_written: bool,
}

impl RunSummary {
    pub fn skipped(&self) -> usize {
        self.processed - self.created
    }
}

/// Fetch and materialize every feed in `dates`, then refresh filters.
///
/// Per-feed failures are logged and counted as zero; only an unusable posts
/// directory or a failed filter rewrite is an error.
#[instrument(level = "info", skip_all, fields(host = %settings.host, feeds = dates.len()))]
pub async fn run_generate<F: FetchCsv>(
    fetcher: &F,
    dates: &[Option<NaiveDate>],
    settings: &Settings,
    skip_filters: bool,
) -> Result<RunSummary> {
    ensure_writable_dir(&settings.posts_dir).await?;

    match dates {
        [None] => info!("Processing today's feed from {}", settings.host),
        _ => info!("Processing {} dated feeds from {}", dates.len(), settings.host),
    }

    let per_feed: Vec<(usize, usize)> = stream::iter(dates)
        .then(|date| async move {
            let url = match csv_url(&settings.host, *date) {
                Ok(url) => url,
                Err(e) => {
                    error!(error = %e, "Cannot build feed URL");
                    return (0, 0);
                }
            };
            process_csv_for_date(fetcher, url.as_str(), &settings.posts_dir).await
        })
        .collect()
        .await;

    let mut summary = RunSummary {
        feeds: per_feed.len(),
        ..Default::default()
    };
    for (created, processed) in per_feed {
        summary.created += created;
        summary.processed += processed;
    }

    info!(
        processed = summary.processed,
        created = summary.created,
        skipped = summary.skipped(),
        "Processed {} items, created {} new blog posts",
        summary.processed,
        summary.created
    );

    if !skip_filters {
        summary.filters_written =
            regenerate_filters(&settings.posts_dir, &settings.filters, &settings.names).await?;
    }

    if summary.created > 0 {
        if let Some(site) = settings.posts_dir.parent() {
            info!(site = %site.display(), "New posts written; rebuild the site to publish them");
        }
    }

    Ok(summary)
}

/// Refresh the filter fragment from whatever is on disk.
#[instrument(level = "info", skip_all)]
pub async fn run_filters(settings: &Settings) -> Result<bool> {
    regenerate_filters(&settings.posts_dir, &settings.filters, &settings.names).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::feed::tests::{StubFetcher, SAMPLE_CSV_DATA};
    use std::path::Path;

    fn settings(root: &Path) -> Settings {
        Settings::resolve(
            Some("feeds.test:8000".to_string()),
            Some(root.join("posts")),
            Config::default(),
        )
    }

    #[tokio::test]
    async fn test_run_generate_today() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = settings(tmp.path());
        let stub = StubFetcher::with("http://feeds.test:8000/daily-items.csv", SAMPLE_CSV_DATA);

        let summary = run_generate(&stub, &[None], &settings, false).await.unwrap();
        assert_eq!(
            summary,
            RunSummary {
                feeds: 1,
                processed: 2,
                created: 2,
                filters_written: true
            }
        );
        let fragment = std::fs::read_to_string(tmp.path().join("templates/filters.tmpl")).unwrap();
        assert!(fragment.contains("2 posts"));
        assert!(fragment.contains("Test Blog <span class=\"filter-count\">2</span>"));

        let again = run_generate(&stub, &[None], &settings, false).await.unwrap();
        assert_eq!(again.created, 0);
        assert_eq!(again.skipped(), 2);
        assert!(!again.filters_written);
    }

    #[tokio::test]
    async fn test_run_generate_survives_fetch_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = settings(tmp.path());
        let stub = StubFetcher::with(
            "http://feeds.test:8000/daily-items/2024-08-30.csv",
            SAMPLE_CSV_DATA,
        );
        let dates = [
            NaiveDate::from_ymd_opt(2024, 8, 29),
            NaiveDate::from_ymd_opt(2024, 8, 30),
        ];

        let summary = run_generate(&stub, &dates, &settings, true).await.unwrap();
        assert_eq!(summary.feeds, 2);
        assert_eq!(summary.created, 2);
        assert!(!summary.filters_written);
        assert!(!tmp.path().join("templates/filters.tmpl").exists());
        assert_eq!(stub.calls.get(), 2);
    }

    #[tokio::test]
    async fn test_run_filters_on_empty_site() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = settings(tmp.path());
        assert!(run_filters(&settings).await.unwrap());
        let fragment = std::fs::read_to_string(tmp.path().join("templates/filters.tmpl")).unwrap();
        assert!(fragment.contains("0 posts"));
    }
}
