//! Everything that writes into the site tree.
//!
//! # Submodules
//!
//! - [`posts`]: one Markdown file per feed item
//! - [`filters`]: the filter navigation fragment rendered from all posts
//!
//! # Output Structure
//!
//! ```text
//! site/
//! ├── posts/
//! │   └── 2024-08-30/
//! │       └── test-article.md
//! └── templates/
//!     ├── filters.tmpl.in   # optional, hand-maintained
//!     └── filters.tmpl      # generated
//! ```

pub mod filters;
pub mod posts;
