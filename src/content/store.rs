//! Thread-safe in-memory index of posts and pages.
//!
//! # Thread Safety
//!
//! Each collection sits behind its own `RwLock`:
//! - Writers (the two sync workers) hold the write lock for one map operation.
//! - Readers (request handlers) hold the read lock only while copying `Arc`
//!   references out. Filtering and sorting run on the copy, so a slow reader
//!   never stalls a writer and never sees a half-replaced record.
//!
//! # Ordering
//!
//! Maps are keyed by id in a `BTreeMap`, and every listing uses a stable
//! sort. Records comparing equal therefore come out in id order.

use std::{cmp::Ordering, collections::BTreeMap, sync::Arc};

use parking_lot::RwLock;
use rustc_hash::FxHashSet;

use super::types::{Page, Post};

/// Newest first.
fn by_authored_date_desc(a: &Arc<Post>, b: &Arc<Post>) -> Ordering {
    b.authored_date.cmp(&a.authored_date)
}

/// Lowest `order` first.
fn by_order_asc(a: &Arc<Page>, b: &Arc<Page>) -> Ordering {
    a.order.cmp(&b.order)
}

/// The shared index of live posts and pages.
///
/// Every operation is total: deleting a missing id is a no-op and lookups of
/// a missing id return `None`.
#[derive(Debug, Default)]
pub struct ContentStore {
    posts: RwLock<BTreeMap<String, Arc<Post>>>,
    pages: RwLock<BTreeMap<String, Arc<Page>>>,
}

impl ContentStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Posts
    // ========================================================================

    /// Insert or replace a post. The new record fully supersedes the old one.
    pub fn upsert_post(&self, post: Post) {
        let post = Arc::new(post);
        self.posts.write().insert(post.id.clone(), post);
    }

    pub fn delete_post(&self, id: &str) {
        self.posts.write().remove(id);
    }

    pub fn get_post(&self, id: &str) -> Option<Arc<Post>> {
        self.posts.read().get(id).cloned()
    }

    /// All posts, newest first.
    pub fn list_posts(&self) -> Vec<Arc<Post>> {
        let mut posts = self.snapshot_posts();
        posts.sort_by(by_authored_date_desc);
        posts
    }

    /// Posts carrying `tag`, newest first.
    pub fn list_posts_by_tag(&self, tag: &str) -> Vec<Arc<Post>> {
        let mut posts = self.snapshot_posts();
        posts.retain(|post| post.has_tag(tag));
        posts.sort_by(by_authored_date_desc);
        posts
    }

    /// Posts written by `author`, newest first.
    pub fn list_posts_by_author(&self, author: &str) -> Vec<Arc<Post>> {
        let mut posts = self.snapshot_posts();
        posts.retain(|post| post.author == author);
        posts.sort_by(by_authored_date_desc);
        posts
    }

    /// Distinct tags across all posts, in no particular order.
    pub fn list_tags(&self) -> Vec<String> {
        let posts = self.snapshot_posts();
        let tags: FxHashSet<&str> = posts
            .iter()
            .flat_map(|post| post.tags.iter().map(String::as_str))
            .collect();
        tags.into_iter().map(str::to_owned).collect()
    }

    /// Distinct authors across all posts, in no particular order.
    pub fn list_authors(&self) -> Vec<String> {
        let posts = self.snapshot_posts();
        let authors: FxHashSet<&str> = posts.iter().map(|post| post.author.as_str()).collect();
        authors.into_iter().map(str::to_owned).collect()
    }

    pub fn post_count(&self) -> usize {
        self.posts.read().len()
    }

    // ========================================================================
    // Pages
    // ========================================================================

    /// Insert or replace a page. The new record fully supersedes the old one.
    pub fn upsert_page(&self, page: Page) {
        let page = Arc::new(page);
        self.pages.write().insert(page.id.clone(), page);
    }

    pub fn delete_page(&self, id: &str) {
        self.pages.write().remove(id);
    }

    pub fn get_page(&self, id: &str) -> Option<Arc<Page>> {
        self.pages.read().get(id).cloned()
    }

    /// All pages by ascending `order`.
    pub fn list_pages(&self) -> Vec<Arc<Page>> {
        let mut pages: Vec<_> = self.pages.read().values().cloned().collect();
        pages.sort_by(by_order_asc);
        pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.read().len()
    }

    /// Copy out post references. The read guard is dropped before returning.
    fn snapshot_posts(&self) -> Vec<Arc<Post>> {
        self.posts.read().values().cloned().collect()
    }
}
