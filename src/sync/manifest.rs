//! File-backed watch transport.
//!
//! Serves a directory of resource manifests (`*.json`) as if it were the
//! control plane: every manifest whose `apiVersion`, `kind` and
//! `metadata.namespace` match a watch is one live object.
//!
//! ```text
//! manifests/
//! ├── posts/
//! │   ├── hello-world.json     kind: BlogPost
//! │   └── second-post.json
//! └── about.json               kind: BlogPage
//! ```
//!
//! Like an informer, each watch keeps the last record it delivered per file.
//! Deleting a file (or editing it so it no longer matches) emits `Delete`
//! with that cached record, so the consumer can still recover the id.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver, RecvTimeoutError},
    thread,
    time::Duration,
};

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher, event::ModifyKind};
use rustc_hash::FxHashMap;
use serde_json::Value;
use walkdir::WalkDir;

use super::{
    SyncError,
    event::{API_GROUP, API_VERSION, Notification, ResourceKind, WatchEvent},
    source::{StreamSender, WatchSource, WatchStream},
};
use crate::log;

/// Namespace assumed for manifests without `metadata.namespace`.
pub const DEFAULT_NAMESPACE: &str = "default";

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Watch transport over a manifest directory.
#[derive(Debug, Clone)]
pub struct ManifestSource {
    root: PathBuf,
}

impl ManifestSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every manifest file on disk, in path order, with its read result.
    ///
    /// Unlike a watch, nothing is filtered or skipped here; callers decide
    /// what an unreadable file means.
    pub fn read_all(&self) -> Vec<(PathBuf, Result<Value>)> {
        read_manifests(&self.root)
    }
}

impl WatchSource for ManifestSource {
    fn watch(&self, kind: ResourceKind, namespace: &str) -> Result<WatchStream, SyncError> {
        let root = fs::canonicalize(&self.root).map_err(|err| {
            SyncError::TransportFailure(format!(
                "manifest directory {} is not accessible: {err}",
                self.root.display()
            ))
        })?;

        // Subscribe before listing so nothing changes unseen in between
        let (fs_tx, fs_rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(fs_tx).map_err(|err| {
            SyncError::TransportFailure(format!("failed to create file watcher: {err}"))
        })?;
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|err| {
                SyncError::TransportFailure(format!("failed to watch {}: {err}", root.display()))
            })?;

        let (sender, stream) = WatchStream::channel();
        let follower = Follower {
            root,
            kind,
            namespace: namespace.to_owned(),
            cache: FxHashMap::default(),
            sender,
        };

        thread::Builder::new()
            .name(format!("manifests-{kind}"))
            .spawn(move || {
                let _watcher = watcher;
                follower.run(&fs_rx);
            })
            .map_err(|err| {
                SyncError::TransportFailure(format!("failed to start manifest watcher: {err}"))
            })?;

        Ok(stream)
    }
}

// =============================================================================
// Follower
// =============================================================================

/// Producer side of one watch: lists, then follows file-system events.
struct Follower {
    root: PathBuf,
    kind: ResourceKind,
    namespace: String,
    /// Last record delivered per manifest path
    cache: FxHashMap<PathBuf, Value>,
    sender: StreamSender,
}

impl Follower {
    fn run(mut self, fs_events: &Receiver<notify::Result<Event>>) {
        let listed = list_matching(&self.root, self.kind, &self.namespace);
        log!("source"; "listed {} {} in namespace {}", listed.len(), self.kind.plural(), self.namespace);
        for (path, record) in listed {
            self.cache.insert(path, record.clone());
            if !self.emit(WatchEvent::Add(record)) {
                return;
            }
        }
        if !self.sender.send(Notification::Synced) {
            return;
        }

        while !self.sender.is_closed() {
            match fs_events.recv_timeout(POLL_INTERVAL) {
                Ok(Ok(event)) if is_relevant(&event) => {
                    for path in &event.paths {
                        if !self.refresh(path) {
                            return;
                        }
                    }
                }
                Ok(Ok(_)) => {}
                Ok(Err(err)) => log!("source"; "watch error: {err}"),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    log!("source"; "file watcher for {} stopped", self.kind);
                    return;
                }
            }
        }
    }

    /// Reconcile the cache with whatever is now at `path`.
    ///
    /// Returns `false` once the consumer has gone away.
    fn refresh(&mut self, path: &Path) -> bool {
        if path.is_dir() {
            // A directory moved in: pick up everything below it
            return scan_manifests(path)
                .iter()
                .all(|manifest| self.refresh_file(manifest));
        }
        if path.exists() {
            return !is_manifest(path) || self.refresh_file(path);
        }

        // Removed file, or a removed directory with cached manifests below it
        let gone: Vec<PathBuf> = self
            .cache
            .keys()
            .filter(|cached| cached.starts_with(path))
            .cloned()
            .collect();
        gone.into_iter().all(|cached| self.forget(&cached))
    }

    fn refresh_file(&mut self, path: &Path) -> bool {
        let record = match read_manifest(path) {
            Ok(record) => record,
            Err(err) => {
                log!("source"; "skipping {}: {err:#}", path.display());
                return true;
            }
        };

        if !matches_watch(&record, self.kind, &self.namespace) {
            return self.forget(path);
        }

        let event = match self.cache.insert(path.to_path_buf(), record.clone()) {
            None => WatchEvent::Add(record),
            Some(previous) if previous == record => return true,
            Some(_) => WatchEvent::Update(record),
        };
        self.emit(event)
    }

    /// Drop `path` from the cache, emitting `Delete` if it was known.
    fn forget(&mut self, path: &Path) -> bool {
        match self.cache.remove(path) {
            Some(previous) => self.emit(WatchEvent::Delete(previous)),
            None => true,
        }
    }

    fn emit(&self, event: WatchEvent) -> bool {
        self.sender.send(Notification::Event(event))
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Content-bearing changes only. Our own reads raise access and metadata
/// events, which must not feed back into another read.
fn is_relevant(event: &Event) -> bool {
    match &event.kind {
        EventKind::Create(_) | EventKind::Remove(_) => true,
        EventKind::Modify(kind) => !matches!(kind, ModifyKind::Metadata(_)),
        _ => false,
    }
}

fn list_matching(root: &Path, kind: ResourceKind, namespace: &str) -> Vec<(PathBuf, Value)> {
    read_manifests(root)
        .into_iter()
        .filter_map(|(path, read)| match read {
            Ok(record) => Some((path, record)),
            Err(err) => {
                log!("source"; "skipping {}: {err:#}", path.display());
                None
            }
        })
        .filter(|(_, record)| matches_watch(record, kind, namespace))
        .collect()
}

fn read_manifests(dir: &Path) -> Vec<(PathBuf, Result<Value>)> {
    scan_manifests(dir)
        .into_iter()
        .map(|path| {
            let read = read_manifest(&path);
            (path, read)
        })
        .collect()
}

/// All manifest files below `dir`, sorted by path.
fn scan_manifests(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| is_manifest(path))
        .collect()
}

fn is_manifest(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json") && !is_temp_file(path)
}

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    name.ends_with('~') || name.starts_with('.')
}

fn read_manifest(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path).context("failed to read manifest")?;
    serde_json::from_str(&content).context("invalid JSON")
}

/// Whether `record` belongs to the `kind` watch in `namespace`.
pub fn matches_watch(record: &Value, kind: ResourceKind, namespace: &str) -> bool {
    let field = |pointer: &str| record.pointer(pointer).and_then(Value::as_str);
    let api_version = format!("{API_GROUP}/{API_VERSION}");

    field("/apiVersion") == Some(api_version.as_str())
        && field("/kind") == Some(kind.kind_name())
        && field("/metadata/namespace").unwrap_or(DEFAULT_NAMESPACE) == namespace
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    const WAIT: Duration = Duration::from_secs(5);

    fn manifest(kind: &str, name: &str, namespace: Option<&str>, spec: Value) -> Value {
        let mut metadata = json!({ "name": name });
        if let Some(ns) = namespace {
            metadata["namespace"] = json!(ns);
        }
        json!({
            "apiVersion": "alpha.bloggernetes.davies.me.uk/v1",
            "kind": kind,
            "metadata": metadata,
            "spec": spec,
        })
    }

    fn post(name: &str, title: &str) -> Value {
        manifest(
            "BlogPost",
            name,
            None,
            json!({ "id": name, "title": title, "authoredDate": "2024-01-01T00:00:00Z" }),
        )
    }

    /// Write via rename so the watcher never sees a half-written file.
    fn write(dir: &Path, name: &str, value: &Value) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let tmp = dir.join(format!(".{}.tmp", name.replace('/', "_")));
        fs::write(&tmp, serde_json::to_string_pretty(value).unwrap()).unwrap();
        fs::rename(&tmp, &path).unwrap();
    }

    /// Next event, skipping nothing; panics on timeout.
    fn next_event(stream: &WatchStream) -> WatchEvent {
        match stream.recv_timeout(WAIT) {
            Ok(Notification::Event(event)) => event,
            other => panic!("expected event, got {other:?}"),
        }
    }

    fn title(event: &WatchEvent) -> &str {
        event.record()["spec"]["title"].as_str().unwrap()
    }

    #[test]
    fn test_matches_watch() {
        let p = post("a", "A");
        assert!(matches_watch(&p, ResourceKind::Post, "default"));
        assert!(!matches_watch(&p, ResourceKind::Page, "default"));
        assert!(!matches_watch(&p, ResourceKind::Post, "blog"));

        let scoped = manifest("BlogPage", "b", Some("blog"), json!({}));
        assert!(matches_watch(&scoped, ResourceKind::Page, "blog"));
        assert!(!matches_watch(&scoped, ResourceKind::Page, "default"));

        let mut foreign = post("c", "C");
        foreign["apiVersion"] = json!("example.com/v1");
        assert!(!matches_watch(&foreign, ResourceKind::Post, "default"));
    }

    #[test]
    fn test_is_manifest() {
        assert!(is_manifest(Path::new("posts/hello.json")));
        assert!(!is_manifest(Path::new("posts/hello.yaml")));
        assert!(!is_manifest(Path::new("posts/.hello.json")));
        assert!(!is_manifest(Path::new("posts/hello.json~")));
        assert!(!is_manifest(Path::new("posts/.hello.json.tmp")));
    }

    #[test]
    fn test_list_filters_and_skips_broken_files() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "posts/b.json", &post("b", "B"));
        write(dir.path(), "posts/a.json", &post("a", "A"));
        write(dir.path(), "about.json", &manifest("BlogPage", "about", None, json!({ "id": "about" })));
        write(dir.path(), "other-ns.json", &manifest("BlogPost", "x", Some("other"), json!({})));
        fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let root = dir.path();
        let posts = list_matching(root, ResourceKind::Post, DEFAULT_NAMESPACE);
        let names: Vec<_> = posts.iter().map(|(_, r)| r["metadata"]["name"].clone()).collect();
        assert_eq!(names, vec![json!("a"), json!("b")]);

        assert_eq!(list_matching(root, ResourceKind::Page, DEFAULT_NAMESPACE).len(), 1);
        assert_eq!(list_matching(root, ResourceKind::Post, "other").len(), 1);
        assert!(list_matching(root, ResourceKind::Post, "nowhere").is_empty());
    }

    #[test]
    fn test_read_all_keeps_broken_files() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.json", &post("a", "A"));
        fs::write(dir.path().join("broken.json"), "{ \"kind\": \"BlogPost\", ").unwrap();

        let files = ManifestSource::new(dir.path()).read_all();
        let names: Vec<_> = files
            .iter()
            .map(|(path, _)| path.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.json", "broken.json"]);
        assert!(files[0].1.is_ok());
        assert!(files[1].1.is_err());
    }

    #[test]
    fn test_missing_directory_is_transport_failure() {
        let dir = TempDir::new().unwrap();
        let source = ManifestSource::new(dir.path().join("missing"));
        assert!(matches!(
            source.watch(ResourceKind::Post, DEFAULT_NAMESPACE),
            Err(SyncError::TransportFailure(_))
        ));
    }

    #[test]
    fn test_watch_lists_then_follows_changes() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "posts/a.json", &post("a", "First"));
        write(dir.path(), "about.json", &manifest("BlogPage", "about", None, json!({ "id": "about" })));

        let source = ManifestSource::new(dir.path());
        let stream = source.watch(ResourceKind::Post, DEFAULT_NAMESPACE).unwrap();

        let initial = next_event(&stream);
        assert!(matches!(initial, WatchEvent::Add(_)));
        assert_eq!(title(&initial), "First");
        assert_eq!(stream.recv_timeout(WAIT), Ok(Notification::Synced));

        // Live add
        write(dir.path(), "posts/b.json", &post("b", "Second"));
        let added = next_event(&stream);
        assert!(matches!(added, WatchEvent::Add(_)));
        assert_eq!(title(&added), "Second");

        // Content change
        write(dir.path(), "posts/a.json", &post("a", "First, edited"));
        let updated = next_event(&stream);
        assert!(matches!(updated, WatchEvent::Update(_)));
        assert_eq!(title(&updated), "First, edited");

        // Removal carries the last known record
        fs::remove_file(dir.path().join("posts/b.json")).unwrap();
        let deleted = next_event(&stream);
        assert!(matches!(deleted, WatchEvent::Delete(_)));
        assert_eq!(title(&deleted), "Second");
    }

    #[test]
    fn test_kind_change_is_delete() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "x.json", &post("x", "Was a post"));

        let source = ManifestSource::new(dir.path());
        let stream = source.watch(ResourceKind::Post, DEFAULT_NAMESPACE).unwrap();
        assert!(matches!(next_event(&stream), WatchEvent::Add(_)));
        assert_eq!(stream.recv_timeout(WAIT), Ok(Notification::Synced));

        write(dir.path(), "x.json", &manifest("BlogPage", "x", None, json!({ "id": "x" })));
        let deleted = next_event(&stream);
        assert!(matches!(deleted, WatchEvent::Delete(_)));
        assert_eq!(title(&deleted), "Was a post");
    }

    #[test]
    fn test_dropping_stream_stops_follower() {
        let dir = TempDir::new().unwrap();
        let source = ManifestSource::new(dir.path());
        let stream = source.watch(ResourceKind::Page, DEFAULT_NAMESPACE).unwrap();
        assert_eq!(stream.recv_timeout(WAIT), Ok(Notification::Synced));
        drop(stream);

        // Follower notices on its next tick; nothing to observe but no hang
        write(dir.path(), "late.json", &manifest("BlogPage", "late", None, json!({ "id": "late" })));
    }
}
