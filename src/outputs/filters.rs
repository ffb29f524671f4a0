//! Filter navigation fragment.
//!
//! After posts are written, the whole corpus under `posts_dir` is rescanned
//! and a template fragment is regenerated with one entry per category and
//! per source. The site theme includes the rendered fragment.
//!
//! # Placeholders
//!
//! - `{{CATEGORY_FILTERS}}`: one `<li>` per category
//! - `{{SOURCE_FILTERS}}`: one `<li>` per source
//! - `{{POST_COUNT}}`: number of posts with a metadata header
//!
//! A placeholder that sits alone on its line expands to one entry per line,
//! each indented like the placeholder.

use itertools::Itertools;
use quick_xml::escape::escape;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

use crate::error::{FeedError, Result};
use crate::models::PostMetadata;
use crate::utils::{display_name, slugify};

pub const CATEGORY_PLACEHOLDER: &str = "{{CATEGORY_FILTERS}}";
pub const SOURCE_PLACEHOLDER: &str = "{{SOURCE_FILTERS}}";
pub const COUNT_PLACEHOLDER: &str = "{{POST_COUNT}}";

/// Used when no template file is configured or present.
pub const DEFAULT_TEMPLATE: &str = r#"<nav class="post-filters" aria-label="Filter posts">
  <p class="post-filters-total">{{POST_COUNT}} posts</p>
  <div class="post-filters-group">
    <h4>Categories</h4>
    <ul class="filter-categories">
      {{CATEGORY_FILTERS}}
    </ul>
  </div>
  <div class="post-filters-group">
    <h4>Sources</h4>
    <ul class="filter-sources">
      {{SOURCE_FILTERS}}
    </ul>
  </div>
</nav>
"#;

/// Display names for the categories the feed classifier emits.
const KNOWN_CATEGORIES: &[(&str, &str)] = &[
    ("ai_ml", "AI & Machine Learning"),
    ("career", "Career"),
    ("devops", "DevOps"),
    ("general", "General"),
    ("news", "News"),
    ("opinion", "Opinion"),
    ("releases", "Releases"),
    ("security", "Security"),
    ("tech", "Tech"),
    ("technical_deep_dives", "Technical Deep Dives"),
    ("tutorials", "Tutorials"),
];

/// Post counts gathered from the metadata headers on disk.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Corpus {
    pub posts: usize,
    pub categories: BTreeMap<String, usize>,
    pub sources: BTreeMap<String, usize>,
}

impl Corpus {
    fn add(&mut self, meta: &PostMetadata) {
        self.posts += 1;
        if let Some(category) = meta.category() {
            *self.categories.entry(category.to_string()).or_default() += 1;
        }
        if let Some(source) = meta.source() {
            *self.sources.entry(source.to_string()).or_default() += 1;
        }
    }
}

/// Human-readable names for filter entries.
#[derive(Debug, Default, Clone)]
pub struct DisplayNames {
    pub categories: BTreeMap<String, String>,
    pub sources: BTreeMap<String, String>,
}

impl DisplayNames {
    pub fn category(&self, key: &str) -> String {
        if let Some(name) = self.categories.get(key) {
            return name.clone();
        }
        KNOWN_CATEGORIES
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, name)| name.to_string())
            .unwrap_or_else(|| display_name(key))
    }

    /// Configured name, else a title-cased identifier (`hacker_news`), else
    /// the source name as written.
    pub fn source(&self, key: &str) -> String {
        if let Some(name) = self.sources.get(key) {
            return name.clone();
        }
        let identifier = !key.contains(char::is_whitespace) && key.contains(['_', '-']);
        if identifier {
            display_name(key)
        } else {
            key.to_string()
        }
    }
}

/// Read the `<!-- .. key: value -->` header at the top of a post.
///
/// Returns `None` when the text does not start with a complete header.
pub fn parse_metadata_header(text: &str) -> Option<PostMetadata> {
    let rest = text.trim_start().strip_prefix("<!--")?;
    let end = rest.find("-->")?;

    let fields: BTreeMap<String, String> = rest[..end]
        .lines()
        .filter_map(|line| line.trim().strip_prefix(".."))
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .collect();

    if fields.is_empty() {
        return None;
    }
    Some(PostMetadata { fields })
}

/// Walk `posts_dir` and tally every post's header.
///
/// # Returns
///
/// Post, category and source counts for every `*.md` file with a metadata
/// header. A missing directory is an empty corpus. Unreadable files are
/// logged and skipped.
///
/// # Errors
///
/// Returns [`FeedError::Io`] when a directory inside the tree cannot be listed.
#[instrument(level = "info", skip_all, fields(posts_dir = %posts_dir.display()))]
pub async fn scan_corpus(posts_dir: &Path) -> Result<Corpus> {
    let mut corpus = Corpus::default();
    if !fs::try_exists(posts_dir)
        .await
        .map_err(|e| FeedError::io(posts_dir, e))?
    {
        warn!("Posts directory does not exist yet");
        return Ok(corpus);
    }

    let mut pending: Vec<PathBuf> = vec![posts_dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|e| FeedError::io(&dir, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| FeedError::io(&dir, e))?
        {
            let path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| FeedError::io(&path, e))?;
            if file_type.is_dir() {
                pending.push(path);
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            match fs::read_to_string(&path).await {
                Ok(text) => match parse_metadata_header(&text) {
                    Some(meta) => corpus.add(&meta),
                    None => debug!(path = %path.display(), "No metadata header"),
                },
                Err(e) => warn!(path = %path.display(), error = %e, "Unreadable post"),
            }
        }
    }

    info!(
        posts = corpus.posts,
        categories = corpus.categories.len(),
        sources = corpus.sources.len(),
        "Scanned corpus"
    );
    Ok(corpus)
}

/// Sort `(key, count)` pairs by display name, ties broken by key.
fn by_display_name<'a>(
    counts: &'a BTreeMap<String, usize>,
    name: impl Fn(&str) -> String,
) -> Vec<(&'a str, String, usize)> {
    let mut entries: Vec<_> = counts
        .iter()
        .map(|(key, count)| (key.as_str(), name(key), *count))
        .collect();
    entries.sort_by(|a, b| a.1.to_lowercase().cmp(&b.1.to_lowercase()).then(a.0.cmp(b.0)));
    entries
}

fn category_entries(corpus: &Corpus, names: &DisplayNames) -> Vec<String> {
    by_display_name(&corpus.categories, |k| names.category(k))
        .into_iter()
        .filter_map(|(key, name, count)| {
            let slug = linkable_slug(key)?;
            Some(format!(
                r#"<li class="filter-item"><a href="/categories/cat_{slug}/" data-filter-category="{}">{} <span class="filter-count">{count}</span></a></li>"#,
                escape(key),
                escape(name.as_str()),
            ))
        })
        .collect()
}

fn source_entries(corpus: &Corpus, names: &DisplayNames) -> Vec<String> {
    by_display_name(&corpus.sources, |k| names.source(k))
        .into_iter()
        .filter_map(|(key, name, count)| {
            let slug = linkable_slug(key)?;
            Some(format!(
                r#"<li class="filter-item"><a href="?source={slug}" data-filter-source="{slug}">{} <span class="filter-count">{count}</span></a></li>"#,
                escape(name.as_str()),
            ))
        })
        .collect()
}

/// Slug for a filter link; `None` (and a debug log) when nothing is left.
fn linkable_slug(key: &str) -> Option<String> {
    let slug = slugify(key);
    if slug.is_empty() {
        debug!(key, "Filter key has no sluggable characters; left out");
        return None;
    }
    Some(slug)
}

/// Replace `placeholder` with `entries`.
///
/// On a line holding only the placeholder, each entry gets its own line with
/// the same indentation. An empty entry list removes such a line entirely.
/// Every line keeps its own terminator, so CRLF templates stay CRLF.
fn substitute(template: &str, placeholder: &str, entries: &[String]) -> String {
    let default_eol = if template.contains("\r\n") { "\r\n" } else { "\n" };
    let mut out = String::with_capacity(template.len());

    for raw in template.split_inclusive('\n') {
        let (line, eol) = split_line_ending(raw);
        if line.trim() == placeholder {
            if entries.is_empty() {
                continue;
            }
            let indent = &line[..line.len() - line.trim_start().len()];
            let sep = if eol.is_empty() { default_eol } else { eol };
            out.push_str(&entries.iter().map(|e| format!("{indent}{e}")).join(sep));
            out.push_str(eol);
        } else if line.contains(placeholder) {
            out.push_str(&line.replace(placeholder, &entries.concat()));
            out.push_str(eol);
        } else {
            out.push_str(raw);
        }
    }
    out
}

fn split_line_ending(raw: &str) -> (&str, &str) {
    if let Some(line) = raw.strip_suffix("\r\n") {
        (line, "\r\n")
    } else if let Some(line) = raw.strip_suffix('\n') {
        (line, "\n")
    } else {
        (raw, "")
    }
}

/// Render the fragment for `corpus` from `template`.
pub fn render_fragment(template: &str, corpus: &Corpus, names: &DisplayNames) -> String {
    let rendered = substitute(template, CATEGORY_PLACEHOLDER, &category_entries(corpus, names));
    let rendered = substitute(&rendered, SOURCE_PLACEHOLDER, &source_entries(corpus, names));
    rendered.replace(COUNT_PLACEHOLDER, &corpus.posts.to_string())
}

/// Where the fragment comes from and goes to.
#[derive(Debug, Clone)]
pub struct FilterPaths {
    /// Template to render; the built-in template is used if it does not exist.
    pub template: PathBuf,
    pub output: PathBuf,
}

/// Rescan the corpus and rewrite the fragment if it changed.
///
/// # Arguments
///
/// * `posts_dir` - Root of the posts tree to rescan
/// * `paths` - Template to read and fragment to write
/// * `names` - Display-name overrides for entries
///
/// # Returns
///
/// `true` when the output file was written, `false` when the rendered
/// fragment already matched what was on disk.
///
/// # Errors
///
/// Returns [`FeedError::Io`] if the corpus cannot be walked, the template
/// exists but cannot be read, or the output cannot be written.
#[instrument(level = "info", skip_all, fields(output = %paths.output.display()))]
pub async fn regenerate_filters(
    posts_dir: &Path,
    paths: &FilterPaths,
    names: &DisplayNames,
) -> Result<bool> {
    let corpus = scan_corpus(posts_dir).await?;

    let template = match fs::read_to_string(&paths.template).await {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(template = %paths.template.display(), "Template not found; using built-in");
            DEFAULT_TEMPLATE.to_string()
        }
        Err(e) => return Err(FeedError::io(&paths.template, e)),
    };

    let rendered = render_fragment(&template, &corpus, names);

    match fs::read_to_string(&paths.output).await {
        Ok(existing) if existing == rendered => {
            info!("Filter fragment unchanged");
            return Ok(false);
        }
        _ => {}
    }

    if let Some(parent) = paths.output.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| FeedError::io(parent, e))?;
    }
    fs::write(&paths.output, rendered)
        .await
        .map_err(|e| FeedError::io(&paths.output, e))?;
    info!(posts = corpus.posts, "Wrote filter fragment");
    Ok(true)
}
