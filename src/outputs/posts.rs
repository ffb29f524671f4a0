//! Post materialization.
//!
//! Each valid item becomes one Markdown file with a Nikola metadata header:
//!
//! ```text
//! posts_dir/
//! └── 2024-08-30/
//!     ├── test-article.md
//!     └── another-article.md
//! ```
//!
//! Files are created with `create_new`, so an existing post is never
//! overwritten. Re-running the same feed is a no-op.

use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, instrument, warn};

use crate::error::{FeedError, Result};
use crate::models::{is_valid_to_save, BlogPostItem};
use crate::utils::{clean_html_content, describe, escape_quotes};

/// Render the `<!-- .. key: value -->` header Nikola reads post metadata from.
pub fn metadata_header(item: &BlogPostItem) -> String {
    let mut header = String::new();
    let fields = [
        ("title", escape_quotes(&item.title)),
        ("slug", item.slug()),
        ("date", item.header_date()),
        ("tags", item.tags()),
        ("category", item.category()),
        ("link", item.link.clone()),
        ("description", describe(&item.summary)),
        ("source", item.source_name.clone()),
        ("type", "text".to_string()),
    ];

    header.push_str("<!--\n");
    for (key, value) in fields {
        writeln!(header, ".. {key}: {}", header_value(&value)).expect("writing to a String cannot fail");
    }
    header.push_str("-->\n\n");
    header
}

/// Make `value` safe inside the header comment.
///
/// Line breaks become spaces, and a `>` that would complete `-->` is
/// written as `&gt;` so the comment cannot end early.
fn header_value(value: &str) -> String {
    value.replace(['\r', '\n'], " ").replace("-->", "--&gt;")
}

/// Render the Markdown body of a post.
///
/// The summary is reduced to plain text, followed by source, author
/// (`Unknown` when empty), category and the original link.
pub fn format_markdown_content(item: &BlogPostItem) -> String {
    let summary = clean_html_content(&item.summary);
    let author = if item.author.is_empty() {
        "Unknown"
    } else {
        &item.author
    };

    format!(
        "{summary}\n\n\
         **Source:** [{}]({})  \n\
         **Author:** {author}  \n\
         **Category:** {}  \n\
         **Original Link:** [{}]({})",
        item.source_name, item.source_url, item.ai_category, item.title, item.link
    )
    .trim()
    .to_string()
}

/// Write one post unless it is invalid or already on disk.
///
/// # Arguments
///
/// * `item` - The validated feed row to materialize
/// * `posts_dir` - Root of the posts tree; the date directory is created under it
///
/// # Returns
///
/// `Ok(true)` when a new file was written, `Ok(false)` when the item was
/// skipped (incomplete, unsluggable, or already on disk).
///
/// # Errors
///
/// Returns [`FeedError::Io`] when the date directory or the file cannot be
/// created or written. A file that fails mid-write is removed again, so the
/// next run retries it instead of skipping a truncated post.
#[instrument(level = "debug", skip_all, fields(title = %item.title))]
pub async fn create_blog_post(item: &BlogPostItem, posts_dir: &Path) -> Result<bool> {
    if !is_valid_to_save(item) {
        info!(title = %item.title, "Skipping item - missing category or summary");
        return Ok(false);
    }

    let slug = item.slug();
    if slug.is_empty() {
        info!(title = %item.title, "Skipping item - title has no sluggable characters");
        return Ok(false);
    }

    let date_str = item.date_dir();
    let date_dir = posts_dir.join(&date_str);
    fs::create_dir_all(&date_dir)
        .await
        .map_err(|e| FeedError::io(&date_dir, e))?;

    let filename = format!("{slug}.md");
    let filepath = date_dir.join(&filename);

    let mut file = match fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&filepath)
        .await
    {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            info!("Skipping {date_str}/{filename} - already exists");
            return Ok(false);
        }
        Err(e) => return Err(FeedError::io(&filepath, e)),
    };

    let contents = metadata_header(item) + &format_markdown_content(item);
    write_or_discard(&mut file, &filepath, &contents).await?;

    info!("Created: {date_str}/{filename}");
    Ok(true)
}

/// Write `contents` to a freshly created file at `path`.
///
/// On failure the partial file is deleted before the error is returned.
async fn write_or_discard<W>(writer: &mut W, path: &Path, contents: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let written = match writer.write_all(contents.as_bytes()).await {
        Ok(()) => writer.flush().await,
        Err(e) => Err(e),
    };
    let Err(e) = written else {
        return Ok(());
    };

    if let Err(rm) = fs::remove_file(path).await {
        warn!(path = %path.display(), error = %rm, "Could not remove partial post");
    }
    Err(FeedError::io(path, e))
}

/// Write every item, returning `(created, processed)`.
///
/// An I/O failure on one item is logged and does not stop the batch; that
/// item counts as processed but not created.
#[instrument(level = "info", skip_all, fields(count = items.len(), posts_dir = %posts_dir.display()))]
pub async fn save_items_to_files(items: &[BlogPostItem], posts_dir: &Path) -> (usize, usize) {
    let mut created = 0;
    let mut processed = 0;

    for item in items {
        processed += 1;
        match create_blog_post(item, posts_dir).await {
            Ok(true) => created += 1,
            Ok(false) => debug!(index = processed, "Item not written"),
            Err(e) => error!(title = %item.title, error = %e, "Error creating post"),
        }
    }

    (created, processed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::valid_row;
    use crate::models::RawRow;
    use crate::outputs::filters::scan_corpus;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    fn item(row: RawRow) -> BlogPostItem {
        BlogPostItem::try_from(row).unwrap()
    }

    #[test]
    fn test_format_markdown_basic() {
        let result = format_markdown_content(&item(valid_row()));
        assert!(result.starts_with("Test summary\n\n"));
        assert!(result.contains("**Source:** [Test Blog](https://example.com)  \n"));
        assert!(result.contains("**Author:** Test Author"));
        assert!(result.contains("**Category:** technical_deep_dives"));
        assert!(result.ends_with("**Original Link:** [Test Article](https://example.com/test)"));
    }

    #[test]
    fn test_format_markdown_missing_author() {
        let mut row = valid_row();
        row.author.clear();
        assert!(format_markdown_content(&item(row)).contains("**Author:** Unknown"));
    }

    #[test]
    fn test_format_markdown_with_html_summary() {
        let mut row = valid_row();
        row.summary = "<p>Test <b>summary</b> with HTML</p>".to_string();
        let result = format_markdown_content(&item(row));
        assert!(result.contains("Test summary with HTML"));
        assert!(!result.contains("<p>"));
        assert!(!result.contains("<b>"));
    }

    #[test]
    fn test_metadata_header() {
        let mut row = valid_row();
        row.title = "Say \"hello\"".to_string();
        row.source_category = "Rust, Systems".to_string();
        let header = metadata_header(&item(row));
        let expected = "<!--\n\
            .. title: Say \\\"hello\\\"\n\
            .. slug: say-hello\n\
            .. date: 2024-08-30 10:00:00 +0000\n\
            .. tags: rust,systems,tech,technical_deep_dives\n\
            .. category: technical_deep_dives\n\
            .. link: https://example.com/test\n\
            .. description: Test summary...\n\
            .. source: Test Blog\n\
            .. type: text\n\
            -->\n\n";
        assert_eq!(header, expected);
    }

    #[tokio::test]
    async fn test_create_blog_post_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let created = create_blog_post(&item(valid_row()), tmp.path()).await.unwrap();
        assert!(created);
        let path = tmp.path().join("2024-08-30").join("test-article.md");
        let contents = std::fs::read_to_string(path).unwrap();
        assert!(contents.starts_with("<!--\n.. title: Test Article\n"));
        assert!(contents.contains("-->\n\nTest summary\n"));
    }

    #[tokio::test]
    async fn test_create_blog_post_file_exists_skip() {
        let tmp = tempfile::tempdir().unwrap();
        let post = item(valid_row());
        assert!(create_blog_post(&post, tmp.path()).await.unwrap());

        let path = tmp.path().join("2024-08-30").join("test-article.md");
        std::fs::write(&path, "hand edited").unwrap();

        assert!(!create_blog_post(&post, tmp.path()).await.unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hand edited");
    }

    #[tokio::test]
    async fn test_create_blog_post_invalid_data() {
        let tmp = tempfile::tempdir().unwrap();
        let mut row = valid_row();
        row.summary.clear();
        row.ai_category.clear();
        assert!(!create_blog_post(&item(row), tmp.path()).await.unwrap());
        assert!(!tmp.path().join("2024-08-30").exists());
    }

    #[tokio::test]
    async fn test_create_blog_post_generates_slug() {
        let tmp = tempfile::tempdir().unwrap();
        let mut row = valid_row();
        row.title = "Test Article with Special! Characters@".to_string();
        assert!(create_blog_post(&item(row), tmp.path()).await.unwrap());
        assert!(tmp
            .path()
            .join("2024-08-30")
            .join("test-article-with-special-characters.md")
            .exists());
    }

    #[tokio::test]
    async fn test_create_blog_post_unsluggable_title() {
        let tmp = tempfile::tempdir().unwrap();
        let mut row = valid_row();
        row.title = "!!!".to_string();
        assert!(!create_blog_post(&item(row), tmp.path()).await.unwrap());
    }

    #[tokio::test]
    async fn test_header_survives_comment_terminator_in_title() {
        let tmp = tempfile::tempdir().unwrap();
        let mut row = valid_row();
        row.title = "Why <!-- --> breaks HTML comments".to_string();
        row.link = "https://example.com/a-->b".to_string();
        let post = item(row);

        let header = metadata_header(&post);
        assert_eq!(header.matches("-->").count(), 1);
        assert!(header.contains(".. title: Why <!-- --&gt; breaks HTML comments\n"));

        assert!(create_blog_post(&post, tmp.path()).await.unwrap());
        let corpus = scan_corpus(tmp.path()).await.unwrap();
        assert_eq!(corpus.posts, 1);
        assert_eq!(corpus.categories.get("technical_deep_dives"), Some(&1));
        assert_eq!(corpus.sources.get("Test Blog"), Some(&1));
    }

    /// Accepts a few bytes, then fails like a full disk.
    struct FailingWriter {
        accepted: usize,
    }

    impl AsyncWrite for FailingWriter {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            if self.accepted >= 8 {
                return Poll::Ready(Err(std::io::Error::other("no space left on device")));
            }
            let n = buf.len().min(8 - self.accepted);
            self.accepted += n;
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_failed_write_removes_partial_post() {
        let tmp = tempfile::tempdir().unwrap();
        let post = item(valid_row());
        let path = tmp.path().join("2024-08-30").join("test-article.md");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "<!--\n.. ti").unwrap();

        let contents = metadata_header(&post) + &format_markdown_content(&post);
        let err = write_or_discard(&mut FailingWriter { accepted: 0 }, &path, &contents)
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::Io { .. }));
        assert!(!path.exists());

        // The next run writes the post in full.
        assert!(create_blog_post(&post, tmp.path()).await.unwrap());
        assert!(std::fs::read_to_string(&path).unwrap().ends_with("(https://example.com/test)"));
    }

    #[tokio::test]
    async fn test_save_items_empty_list() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(save_items_to_files(&[], tmp.path()).await, (0, 0));
    }

    #[tokio::test]
    async fn test_save_items_counts_duplicates_as_processed() {
        let tmp = tempfile::tempdir().unwrap();
        let post = item(valid_row());
        let mut other = valid_row();
        other.title = "Another Article".to_string();
        let items = vec![post.clone(), post, item(other)];
        assert_eq!(save_items_to_files(&items, tmp.path()).await, (2, 3));
        assert_eq!(save_items_to_files(&items, tmp.path()).await, (0, 3));
    }
}
