//! Command-line interface definitions.
//!
//! All path and host options can also come from environment variables or
//! the YAML config file (see [`crate::config`]).

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use itertools::Itertools;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::error::{FeedError, Result};
use crate::feed::date_range;

/// Command-line arguments.
///
/// # Examples
///
/// ```sh
/// # Today's feed
/// daily_feed_posts generate
///
/// # Specific days from another host
/// daily_feed_posts generate 2024-08-30 2024-08-31 --host localhost:3000
///
/// # The three days ending on 2024-08-30
/// daily_feed_posts generate --start-date 2024-08-30 --offset-days -2
///
/// # Only rebuild the filter navigation
/// daily_feed_posts filters --posts-dir ./site/posts
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate blog posts from CSV data.
    Generate(GenerateArgs),
    /// Rescan the posts directory and rewrite the filter navigation fragment.
    Filters(CommonArgs),
}

impl Command {
    pub fn common(&self) -> &CommonArgs {
        match self {
            Command::Generate(args) => &args.common,
            Command::Filters(common) => common,
        }
    }
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Directory holding the generated posts
    #[arg(long, env = "FEED_POSTS_DIR")]
    pub posts_dir: Option<PathBuf>,

    /// Optional path to a YAML config file
    #[arg(short, long, env = "FEED_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log every step at debug level
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GenerateArgs {
    /// Feed dates to process (YYYY-MM-DD); today's feed when omitted
    pub dates: Vec<String>,

    /// Feed server as host[:port], optionally with a scheme
    #[arg(long, env = "FEED_HOST")]
    pub host: Option<String>,

    /// First day of a date range (YYYY-MM-DD); requires --offset-days
    #[arg(long)]
    pub start_date: Option<String>,

    /// Days to extend the range by; negative values go backwards
    #[arg(long, allow_negative_numbers = true)]
    pub offset_days: Option<i64>,

    /// Do not regenerate the filter navigation fragment
    #[arg(long)]
    pub skip_filters: bool,

    #[command(flatten)]
    pub common: CommonArgs,
}

impl GenerateArgs {
    /// The feeds to fetch, in order. `None` stands for today's feed.
    ///
    /// An incomplete `--start-date`/`--offset-days` pair is an error. Invalid
    /// positional dates are logged and dropped.
    pub fn feed_dates(&self) -> Result<Vec<Option<NaiveDate>>> {
        let range = match (&self.start_date, self.offset_days) {
            (Some(start), Some(offset)) => {
                let range = date_range(parse_date(start)?, offset)?;
                info!(start = %start, offset, "Processing date range of {} days", range.len());
                range
            }
            (None, None) => Vec::new(),
            _ => {
                return Err(FeedError::config(
                    "--start-date and --offset-days must be used together",
                ))
            }
        };

        let positional: Vec<NaiveDate> = self
            .dates
            .iter()
            .filter_map(|d| match parse_date(d) {
                Ok(date) => Some(date),
                Err(_) => {
                    warn!("Invalid date format: {d}. Use YYYY-MM-DD format.");
                    None
                }
            })
            .collect();

        if range.is_empty() && self.dates.is_empty() {
            return Ok(vec![None]);
        }

        Ok(range
            .into_iter()
            .chain(positional)
            .unique()
            .map(Some)
            .collect())
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| FeedError::config(format!("invalid date {s:?}: {e}")))
}
