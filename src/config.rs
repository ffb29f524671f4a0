//! Optional YAML configuration and final settings resolution.
//!
//! Precedence for every setting: CLI flag / env var, then the config file,
//! then the built-in default.
//!
//! ```yaml
//! host: host.docker.internal:8000
//! posts_dir: feeds/posts
//! fetch:
//!   timeout_secs: 30
//!   max_attempts: 3
//! filters:
//!   template: templates/filters.tmpl.in
//!   output: templates/filters.tmpl
//! category_names:
//!   technical_deep_dives: Technical Deep Dives
//! source_names: {}
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{info, instrument};

use crate::error::{FeedError, Result};
use crate::outputs::filters::{DisplayNames, FilterPaths};

pub const DEFAULT_HOST: &str = "host.docker.internal:8000";
pub const DEFAULT_POSTS_DIR: &str = "feeds/posts";

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub host: Option<String>,
    pub posts_dir: Option<PathBuf>,
    pub fetch: FetchConfig,
    pub filters: FiltersConfig,
    pub category_names: BTreeMap<String, String>,
    pub source_names: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    pub max_attempts: usize,
    pub base_delay_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FiltersConfig {
    pub template: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

impl Config {
    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|e| FeedError::config(e.to_string()))
    }

    /// Load a config file. `None` means "no file", which is all defaults.
    #[instrument(level = "info", skip_all)]
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path)
            .await
            .map_err(|e| FeedError::io(path, e))?;
        let config = Self::from_yaml(&text)
            .map_err(|e| FeedError::config(format!("{}: {e}", path.display())))?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }
}

/// Everything a run needs, after merging CLI, config file and defaults.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub posts_dir: PathBuf,
    pub fetch: FetchConfig,
    pub filters: FilterPaths,
    pub names: DisplayNames,
}

impl Settings {
    pub fn resolve(host: Option<String>, posts_dir: Option<PathBuf>, config: Config) -> Self {
        let host = host
            .or(config.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let posts_dir = posts_dir
            .or(config.posts_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_POSTS_DIR));

        // The site root is the directory holding `posts/`.
        let site_root = posts_dir
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let filters = FilterPaths {
            template: config
                .filters
                .template
                .unwrap_or_else(|| site_root.join("templates").join("filters.tmpl.in")),
            output: config
                .filters
                .output
                .unwrap_or_else(|| site_root.join("templates").join("filters.tmpl")),
        };

        Self {
            host,
            posts_dir,
            fetch: config.fetch,
            filters,
            names: DisplayNames {
                categories: config.category_names,
                sources: config.source_names,
            },
        }
    }
}
