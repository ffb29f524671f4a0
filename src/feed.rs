//! Fetching the daily CSV feed, with exponential backoff retry logic.
//!
//! # Architecture
//!
//! - [`FetchCsv`]: core trait for anything that can produce CSV text for a URL
//! - [`HttpFetcher`]: reqwest-backed implementation
//! - [`RetryFetch`]: decorator that adds retries to any `FetchCsv`
//!
//! # Endpoints
//!
//! - Today: `http://{host}/daily-items.csv`
//! - A given day: `http://{host}/daily-items/{YYYY-MM-DD}.csv`

use chrono::{Duration, NaiveDate};
use rand::{rng, Rng};
use std::fmt;
use std::path::Path;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::error::{FeedError, Result};
use crate::outputs::posts::save_items_to_files;
use crate::parse::parse_feed;
use crate::utils::truncate_for_log;

/// Trait for fetching CSV text.
///
/// Implementors return the response body for `url`, or an error if the
/// request failed.
pub trait FetchCsv {
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Plain HTTP GET via reqwest. Non-2xx responses are errors.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build a client with the given per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Config`] if the TLS backend cannot be initialized.
    pub fn new(timeout: StdDuration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FeedError::config(format!("building HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl FetchCsv for HttpFetcher {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch(&self, url: &str) -> Result<String> {
        let t0 = Instant::now();
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| FeedError::fetch(url, e))?;
        let body = response.text().await.map_err(|e| FeedError::fetch(url, e))?;
        info!(
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched CSV"
        );
        Ok(body)
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`FetchCsv`].
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1) + random_jitter(0..250ms), max_delay)
/// ```
///
/// `max_attempts` counts every call to the inner fetcher, the first one
/// included; zero is treated as one. No jitter is added when `base_delay` is
/// zero, and the jittered delay never exceeds `max_delay`.
pub struct RetryFetch<T> {
    inner: T,
    max_attempts: usize,
    base_delay: StdDuration,
    max_delay: StdDuration,
}

impl<T> RetryFetch<T>
where
    T: FetchCsv,
{
    /// Wrap `inner` so that each fetch makes up to `max_attempts` calls.
    ///
    /// # Arguments
    ///
    /// * `inner` - The fetcher that does the actual work
    /// * `max_attempts` - Total calls per fetch, including the first
    /// * `base_delay` - Delay before the first retry; doubles after each failure
    pub fn new(inner: T, max_attempts: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }

    fn backoff(&self, attempt: usize) -> StdDuration {
        let shift = (attempt - 1).min(16) as u32;
        let delay = self.base_delay.saturating_mul(1 << shift).min(self.max_delay);
        if self.base_delay.is_zero() {
            return delay;
        }
        let jitter_ms: u64 = rng().random_range(0..=250);
        (delay + StdDuration::from_millis(jitter_ms)).min(self.max_delay)
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> FetchCsv for RetryFetch<T>
where
    T: FetchCsv,
{
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch(&self, url: &str) -> Result<String> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match self.inner.fetch(url).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        error!(
                            attempt,
                            max = self.max_attempts,
                            elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                            error = %e,
                            "fetch exhausted attempts"
                        );
                        return Err(e);
                    }

                    let delay = self.backoff(attempt);
                    warn!(
                        attempt,
                        max = self.max_attempts,
                        ?delay,
                        error = %e,
                        "fetch attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Build the feed URL for `date`, or today's feed when `date` is `None`.
///
/// # Arguments
///
/// * `host` - `host[:port]`, optionally with an `http://` or `https://` scheme
/// * `date` - The feed day, or `None` for `daily-items.csv`
///
/// # Returns
///
/// The endpoint URL; plain `host:port` defaults to `http://`.
///
/// # Errors
///
/// Returns [`FeedError::Config`] when the host is empty or the result is not
/// a valid URL.
pub fn csv_url(host: &str, date: Option<NaiveDate>) -> Result<Url> {
    let host = host.trim().trim_end_matches('/');
    if host.is_empty() {
        return Err(FeedError::config("feed host is empty"));
    }
    let base = if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    };

    let full = match date {
        None => format!("{base}/daily-items.csv"),
        Some(d) => format!("{base}/daily-items/{}.csv", d.format("%Y-%m-%d")),
    };
    Url::parse(&full).map_err(|e| FeedError::config(format!("bad feed URL {full:?}: {e}")))
}

/// Inclusive, ascending range from `start` to `start + offset_days`.
///
/// A negative offset walks backwards, so the range always holds
/// `|offset_days| + 1` days.
///
/// # Errors
///
/// Returns [`FeedError::Config`] when the end date falls outside the
/// calendar chrono can represent.
pub fn date_range(start: NaiveDate, offset_days: i64) -> Result<Vec<NaiveDate>> {
    let end = Duration::try_days(offset_days)
        .and_then(|delta| start.checked_add_signed(delta))
        .ok_or_else(|| FeedError::config(format!("offset of {offset_days} days is out of range")))?;
    let (from, to) = if end >= start { (start, end) } else { (end, start) };
    Ok(from.iter_days().take_while(|d| *d <= to).collect())
}

/// Fetch one feed and write its posts.
///
/// # Arguments
///
/// * `fetcher` - Any [`FetchCsv`], usually a [`RetryFetch`] around [`HttpFetcher`]
/// * `url` - The feed endpoint, see [`csv_url`]
/// * `posts_dir` - Root of the posts tree
///
/// # Returns
///
/// `(created, processed)`, where `processed` counts every data row read,
/// valid or not. Fetch failures and empty bodies are logged and reported as
/// `(0, 0)`; this function never fails the run.
#[instrument(level = "info", skip(fetcher, posts_dir), fields(posts_dir = %posts_dir.display()))]
pub async fn process_csv_for_date<F: FetchCsv>(
    fetcher: &F,
    url: &str,
    posts_dir: &Path,
) -> (usize, usize) {
    info!("Fetching data from {url}...");
    let body = match fetcher.fetch(url).await {
        Ok(body) => body,
        Err(e) => {
            error!(error = %e, "Failed to fetch CSV data");
            return (0, 0);
        }
    };

    if body.trim().is_empty() {
        warn!("Feed returned no data");
        return (0, 0);
    }
    debug!(preview = %truncate_for_log(&body, 200), "CSV body");

    let feed = parse_feed(&body);
    let (created, _) = save_items_to_files(&feed.items, posts_dir).await;
    let processed = feed.rows;
    info!(created, processed, "Finished feed");
    (created, processed)
}
