//! Conversion-and-apply step shared by both sync workers.

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;

use super::event::{ResourceKind, WatchEvent};
use crate::{
    content::{ContentStore, ConvertError, Page, Post, page_from_record, post_from_record},
    log,
};

/// A domain record the controller knows how to keep in the store.
pub trait Resource: Sized {
    const KIND: ResourceKind;

    fn from_record(record: &Value) -> Result<Self, ConvertError>;

    fn id(&self) -> &str;

    fn title(&self) -> &str;

    fn upsert_into(self, store: &ContentStore);

    fn delete_from(store: &ContentStore, id: &str);
}

impl Resource for Post {
    const KIND: ResourceKind = ResourceKind::Post;

    fn from_record(record: &Value) -> Result<Self, ConvertError> {
        post_from_record(record)
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn upsert_into(self, store: &ContentStore) {
        store.upsert_post(self);
    }

    fn delete_from(store: &ContentStore, id: &str) {
        store.delete_post(id);
    }
}

impl Resource for Page {
    const KIND: ResourceKind = ResourceKind::Page;

    fn from_record(record: &Value) -> Result<Self, ConvertError> {
        page_from_record(record)
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn upsert_into(self, store: &ContentStore) {
        store.upsert_page(self);
    }

    fn delete_from(store: &ContentStore, id: &str) {
        store.delete_page(id);
    }
}

/// What happened to one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Upserted,
    Deleted,
    /// Add/update whose record did not convert; the store is untouched.
    Dropped,
    /// Delete whose record did not yield an id; a stale entry may remain.
    Orphaned,
}

/// Apply one event to the store.
///
/// Add and update are the same operation: the converted record replaces
/// whatever was stored under its id. Conversion failures are logged and
/// contained here.
pub fn apply<R: Resource>(store: &ContentStore, event: &WatchEvent) -> Outcome {
    let converted = R::from_record(event.record());

    match (event, converted) {
        (WatchEvent::Add(_) | WatchEvent::Update(_), Ok(resource)) => {
            log!("sync"; "{} {}: id={} title={:?}", R::KIND, event.verb(), resource.id(), resource.title());
            resource.upsert_into(store);
            Outcome::Upserted
        }
        (WatchEvent::Add(_) | WatchEvent::Update(_), Err(err)) => {
            log!("error"; "dropping {} event for {}: {err}", event.verb(), describe(R::KIND, event.record()));
            Outcome::Dropped
        }
        (WatchEvent::Delete(_), Ok(resource)) => {
            log!("sync"; "{} deleted: id={} title={:?}", R::KIND, resource.id(), resource.title());
            R::delete_from(store, resource.id());
            Outcome::Deleted
        }
        (WatchEvent::Delete(_), Err(err)) => {
            log!("error"; "cannot resolve id of deleted {}: {err}; entry may be orphaned", describe(R::KIND, event.record()));
            Outcome::Orphaned
        }
    }
}

/// `kind default/name` from the record envelope, for log lines only.
fn describe(kind: ResourceKind, record: &Value) -> String {
    let meta = |key: &str| {
        record
            .get("metadata")
            .and_then(|m| m.get(key))
            .and_then(Value::as_str)
            .unwrap_or("?")
            .to_owned()
    };
    format!("{} {}/{}", kind.kind_name(), meta("namespace"), meta("name"))
}

/// Event counters of one controller.
#[derive(Debug, Default)]
pub struct SyncStats {
    upserted: AtomicU64,
    deleted: AtomicU64,
    dropped: AtomicU64,
    orphaned: AtomicU64,
}

/// Point-in-time copy of [`SyncStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub upserted: u64,
    pub deleted: u64,
    pub dropped: u64,
    pub orphaned: u64,
}

impl SyncStats {
    pub fn record(&self, outcome: Outcome) {
        let counter = match outcome {
            Outcome::Upserted => &self.upserted,
            Outcome::Deleted => &self.deleted,
            Outcome::Dropped => &self.dropped,
            Outcome::Orphaned => &self.orphaned,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            upserted: self.upserted.load(Ordering::Relaxed),
            deleted: self.deleted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            orphaned: self.orphaned.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn post_record(id: &str, author: &str, tags: &[&str]) -> Value {
        json!({
            "kind": "BlogPost",
            "metadata": { "name": id, "namespace": "default" },
            "spec": {
                "id": id,
                "title": format!("Post {id}"),
                "author": author,
                "tags": tags,
                "authoredDate": "2024-01-01T00:00:00Z",
            },
        })
    }

    #[test]
    fn test_add_then_update_replaces() {
        let store = ContentStore::new();

        let added = apply::<Post>(&store, &WatchEvent::Add(post_record("p1", "alice", &["go", "k8s"])));
        let updated = apply::<Post>(&store, &WatchEvent::Update(post_record("p1", "bob", &["go"])));
        assert_eq!((added, updated), (Outcome::Upserted, Outcome::Upserted));

        let post = store.get_post("p1").unwrap();
        assert_eq!(post.author, "bob");
        assert_eq!(post.tags, vec!["go"]);
        assert!(store.list_posts_by_tag("k8s").is_empty());
        assert!(store.list_posts_by_author("alice").is_empty());
        assert_eq!(store.list_posts_by_author("bob").len(), 1);
    }

    #[test]
    fn test_update_without_prior_add_inserts() {
        let store = ContentStore::new();
        apply::<Post>(&store, &WatchEvent::Update(post_record("p9", "alice", &[])));
        assert!(store.get_post("p9").is_some());
    }

    #[test]
    fn test_delete_uses_record_id() {
        let store = ContentStore::new();
        apply::<Post>(&store, &WatchEvent::Add(post_record("p1", "alice", &[])));

        let outcome = apply::<Post>(&store, &WatchEvent::Delete(post_record("p1", "alice", &[])));
        assert_eq!(outcome, Outcome::Deleted);
        assert_eq!(store.post_count(), 0);
    }

    #[test]
    fn test_delete_of_unknown_id_is_noop() {
        let store = ContentStore::new();
        apply::<Post>(&store, &WatchEvent::Add(post_record("p1", "alice", &[])));

        let outcome = apply::<Post>(&store, &WatchEvent::Delete(post_record("ghost", "x", &[])));
        assert_eq!(outcome, Outcome::Deleted);
        assert_eq!(store.list_posts().len(), 1);
    }

    #[test]
    fn test_missing_authored_date_is_dropped() {
        let store = ContentStore::new();
        let record = json!({ "spec": { "id": "p1", "title": "No date" } });

        assert_eq!(apply::<Post>(&store, &WatchEvent::Add(record.clone())), Outcome::Dropped);
        assert_eq!(apply::<Post>(&store, &WatchEvent::Update(record)), Outcome::Dropped);
        assert_eq!(store.post_count(), 0);
    }

    #[test]
    fn test_bad_delete_is_orphaned() {
        let store = ContentStore::new();
        apply::<Post>(&store, &WatchEvent::Add(post_record("p1", "alice", &[])));

        let tombstone = json!({ "metadata": { "name": "p1" } });
        assert_eq!(apply::<Post>(&store, &WatchEvent::Delete(tombstone)), Outcome::Orphaned);
        assert!(store.get_post("p1").is_some());
    }

    #[test]
    fn test_pages() {
        let store = ContentStore::new();
        for (id, order) in [("a", 2), ("b", 1), ("c", 0)] {
            let record = json!({ "spec": { "id": id, "title": id, "order": order } });
            assert_eq!(apply::<Page>(&store, &WatchEvent::Add(record)), Outcome::Upserted);
        }

        let ids: Vec<_> = store.list_pages().iter().map(|p| p.id.clone()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);

        apply::<Page>(&store, &WatchEvent::Delete(json!({ "spec": { "id": "b" } })));
        assert!(store.get_page("b").is_none());
        assert_eq!(store.page_count(), 2);
    }

    #[test]
    fn test_stats_count_outcomes() {
        let stats = SyncStats::default();
        for outcome in [
            Outcome::Upserted,
            Outcome::Upserted,
            Outcome::Deleted,
            Outcome::Dropped,
            Outcome::Orphaned,
        ] {
            stats.record(outcome);
        }

        assert_eq!(
            stats.snapshot(),
            StatsSnapshot {
                upserted: 2,
                deleted: 1,
                dropped: 1,
                orphaned: 1,
            }
        );
    }

    #[test]
    fn test_describe_uses_envelope() {
        let record = post_record("p1", "alice", &[]);
        assert_eq!(describe(ResourceKind::Post, &record), "BlogPost default/p1");
        assert_eq!(describe(ResourceKind::Page, &json!({})), "BlogPage ?/?");
    }
}
