//! Error types for feed ingestion and post generation.
//!
//! Domain failures are expressed as [`FeedError`]. `main` boxes them into
//! `Box<dyn Error>`; everything below the top level returns [`Result`].

use std::path::PathBuf;

/// Everything that can go wrong between fetching a feed and writing a post.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// A CSV row failed construction (missing required field, bad date).
    #[error("invalid row: {message}")]
    InvalidRow { message: String },

    /// The CSV body could not be fetched.
    #[error("fetch failed for {url}: {message}")]
    Fetch { url: String, message: String },

    /// The CSV body could not be read as CSV at all.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Filesystem I/O error with the path that caused it.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Configuration loading or CLI argument error.
    #[error("config error: {message}")]
    Config { message: String },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FeedError>;

impl FeedError {
    pub fn invalid_row(msg: impl Into<String>) -> Self {
        Self::InvalidRow {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn fetch(url: impl Into<String>, msg: impl ToString) -> Self {
        Self::Fetch {
            url: url.into(),
            message: msg.to_string(),
        }
    }

    /// Attach a path to an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
