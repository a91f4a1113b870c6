//! Immutable domain records built from `BlogPost` and `BlogPage` resources.

use chrono::{DateTime, FixedOffset};

/// A published article.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    /// Stable unique identifier (never empty)
    pub id: String,

    pub title: String,

    /// Optional summary used for `<meta>` and the feed
    pub meta_description: String,

    pub body: String,

    pub author: String,

    /// Tags in declaration order; duplicates are kept
    pub tags: Vec<String>,

    /// Publication timestamp, offset preserved
    pub authored_date: DateTime<FixedOffset>,

    /// Last edit timestamp, if ever set
    pub updated_date: Option<DateTime<FixedOffset>>,
}

impl Post {
    /// Whether any of this post's tags equals `tag` exactly.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Text used where a short description is needed.
    ///
    /// Falls back to the first `max_chars` characters of the body, suffixed
    /// with `...` when the body is longer.
    pub fn summary(&self, max_chars: usize) -> String {
        if !self.meta_description.is_empty() {
            return self.meta_description.clone();
        }

        match self.body.char_indices().nth(max_chars) {
            Some((end, _)) => format!("{}...", &self.body[..end]),
            None => self.body.clone(),
        }
    }
}

/// A static, orderable document (about, contact, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub id: String,
    pub title: String,
    pub content: String,
    /// Display position, ascending. Unordered pages sit at `0`.
    pub order: i64,
}
