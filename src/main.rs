//! # Daily Feed Posts
//!
//! Turns the daily CSV export of an article aggregator into Nikola blog
//! posts, then rebuilds the filter navigation fragment from every post on
//! disk.
//!
//! ## Usage
//!
//! ```sh
//! daily_feed_posts generate                       # today's feed
//! daily_feed_posts generate 2024-08-30 2024-08-31
//! daily_feed_posts generate --start-date 2024-08-30 --offset-days -6
//! daily_feed_posts filters                        # only rebuild filters
//! ```
//!
//! ## Architecture
//!
//! The application is a linear pipeline:
//! 1. **Fetching**: GET `daily-items.csv` (or one file per date) with retries
//! 2. **Parsing**: Read rows by column name and validate required fields
//! 3. **Writing**: Create `posts/{date}/{slug}.md` unless it already exists
//! 4. **Filters**: Rescan all posts and re-render the navigation fragment

use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

use daily_feed_posts::cli::{Cli, Command};
use daily_feed_posts::config::{Config, Settings};
use daily_feed_posts::feed::{HttpFetcher, RetryFetch};
use daily_feed_posts::pipeline;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::parse();
    let common = args.command.common();

    // --- Tracing init ---
    let default_level = if common.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("daily_feed_posts starting up");
    debug!(?args, "Parsed CLI arguments");

    let config = Config::load(common.config.as_deref()).await?;

    match &args.command {
        Command::Generate(gen_args) => {
            let dates = gen_args.feed_dates().inspect_err(|e| {
                error!(error = %e, "Invalid date range");
            })?;
            let settings = Settings::resolve(
                gen_args.host.clone(),
                gen_args.common.posts_dir.clone(),
                config,
            );
            debug!(?settings, "Resolved settings");

            let fetcher = RetryFetch::new(
                HttpFetcher::new(settings.fetch.timeout())?,
                settings.fetch.max_attempts,
                settings.fetch.base_delay(),
            );
            let summary =
                pipeline::run_generate(&fetcher, &dates, &settings, gen_args.skip_filters).await?;
            info!(
                feeds = summary.feeds,
                processed = summary.processed,
                created = summary.created,
                skipped = summary.skipped(),
                filters_written = summary.filters_written,
                "Run summary"
            );
        }
        Command::Filters(common) => {
            let settings = Settings::resolve(None, common.posts_dir.clone(), config);
            let written = pipeline::run_filters(&settings).await?;
            info!(written, output = %settings.filters.output.display(), "Filter fragment refreshed");
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}
