//! Resource synchronization: keeps the [`ContentStore`] in step with a watch
//! transport.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  WatchStream   ┌──────────────┐
//! │              │ ─────────────► │ post worker  │ ──┐
//! │ WatchSource  │                └──────────────┘   │ apply::<R>()
//! │ (transport)  │  WatchStream   ┌──────────────┐   ├──────────────► ContentStore
//! │              │ ─────────────► │ page worker  │ ──┘
//! └──────────────┘                └──────────────┘
//!                                        │ Synced / Ended
//!                                        ▼
//!                                 ┌──────────────┐
//!                                 │  Controller  │ ── StateHandle
//!                                 └──────────────┘
//! ```
//!
//! The two streams are independent. Within a stream, per-object ordering is
//! whatever the transport guarantees; the workers apply events in arrival
//! order and never diff old against new.

mod apply;
mod event;
pub mod manifest;
mod shutdown;
mod source;
mod state;

use std::{
    sync::{
        Arc,
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use rustc_hash::FxHashSet;
use thiserror::Error;

use crate::{
    content::{ContentStore, Page, Post},
    log,
};

use apply::{StatsSnapshot, SyncStats, apply};
use event::{Notification, ResourceKind};
use source::{WatchSource, WatchStream};
use state::SyncState;

pub use apply::Resource;
pub use manifest::ManifestSource;
pub use shutdown::Shutdown;
pub use state::StateHandle;

/// How often blocked workers and the controller re-check cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Failures that stop the controller. Per-object conversion errors never
/// end up here.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("transport failure: {0}")]
    TransportFailure(String),

    #[error("failed to spawn sync worker")]
    Spawn(#[source] std::io::Error),
}

/// Worker to controller messages.
#[derive(Debug, Clone, Copy)]
enum WorkerSignal {
    Synced(ResourceKind),
    Ended(ResourceKind),
}

/// Watches posts and pages in one namespace and mirrors them into a store.
pub struct Controller {
    source: Arc<dyn WatchSource>,
    store: Arc<ContentStore>,
    namespace: String,
    sync_timeout: Duration,
    state: StateHandle,
    stats: Arc<SyncStats>,
}

impl Controller {
    pub fn new(
        source: Arc<dyn WatchSource>,
        store: Arc<ContentStore>,
        namespace: impl Into<String>,
        sync_timeout: Duration,
    ) -> Self {
        Self {
            source,
            store,
            namespace: namespace.into(),
            sync_timeout,
            state: StateHandle::default(),
            stats: Arc::default(),
        }
    }

    /// Handle for observing the lifecycle from other threads.
    pub fn state(&self) -> StateHandle {
        self.state.clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Run until `shutdown` fires.
    ///
    /// Blocks through the initial sync, then through steady-state processing.
    /// Returns `Ok(())` after a clean shutdown, including one requested
    /// before the initial sync completed.
    ///
    /// # Errors
    ///
    /// [`SyncError::TransportFailure`] if a stream cannot be opened, if the
    /// initial sync does not complete within the sync timeout, or if a
    /// stream ends while the controller is running.
    pub fn start(&self, shutdown: &Shutdown) -> Result<(), SyncError> {
        log!("sync"; "starting controller: namespace={}", self.namespace);

        let posts = self.source.watch(ResourceKind::Post, &self.namespace)?;
        let pages = self.source.watch(ResourceKind::Page, &self.namespace)?;

        // Worker-local signal so a failed start can stop workers without
        // cancelling the caller's shutdown.
        let stop = Shutdown::new();
        let (signal_tx, signal_rx) = mpsc::channel();

        let mut workers = Vec::with_capacity(2);
        let result = self
            .spawn_workers(posts, pages, &stop, &signal_tx, &mut workers)
            .and_then(|()| self.supervise(&signal_rx, shutdown));

        stop.cancel();
        for worker in workers {
            if worker.join().is_err() {
                log!("error"; "sync worker panicked");
            }
        }

        let stats = self.stats();
        log!(
            "sync";
            "controller stopped: upserted={} deleted={} dropped={} orphaned={}",
            stats.upserted, stats.deleted, stats.dropped, stats.orphaned
        );
        result
    }

    /// Drive the state machine until shutdown or a transport failure.
    fn supervise(&self, signals: &Receiver<WorkerSignal>, shutdown: &Shutdown) -> Result<(), SyncError> {
        if !self.await_initial_sync(signals, shutdown)? {
            return Ok(());
        }

        self.state.set(SyncState::Synced);
        log!(
            "sync";
            "initial sync complete: {} posts, {} pages",
            self.store.post_count(),
            self.store.page_count()
        );
        self.state.set(SyncState::Running);

        while !shutdown.wait_timeout(POLL_INTERVAL) {
            if let Ok(WorkerSignal::Ended(kind)) = signals.try_recv() {
                return Err(SyncError::TransportFailure(format!("{kind} stream closed")));
            }
        }
        Ok(())
    }

    /// Wait for both streams to report their initial snapshot.
    ///
    /// Returns `Ok(false)` if shutdown fired first.
    fn await_initial_sync(
        &self,
        signals: &Receiver<WorkerSignal>,
        shutdown: &Shutdown,
    ) -> Result<bool, SyncError> {
        // A timeout past the end of the clock means no deadline at all
        let deadline = Instant::now().checked_add(self.sync_timeout);
        let mut pending: FxHashSet<ResourceKind> = ResourceKind::ALL.into_iter().collect();

        while !pending.is_empty() {
            if shutdown.is_cancelled() {
                return Ok(false);
            }

            let remaining = deadline.map_or(POLL_INTERVAL, |deadline| {
                deadline.saturating_duration_since(Instant::now())
            });
            if remaining.is_zero() {
                return Err(SyncError::TransportFailure(format!(
                    "initial sync did not complete within {}s",
                    self.sync_timeout.as_secs_f32()
                )));
            }

            match signals.recv_timeout(remaining.min(POLL_INTERVAL)) {
                Ok(WorkerSignal::Synced(kind)) => {
                    log!("sync"; "{kind} stream synced");
                    pending.remove(&kind);
                }
                Ok(WorkerSignal::Ended(kind)) => {
                    return Err(SyncError::TransportFailure(format!(
                        "{kind} stream closed before initial sync"
                    )));
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(SyncError::TransportFailure("sync workers exited".to_string()));
                }
            }
        }
        Ok(true)
    }

    fn spawn_workers(
        &self,
        posts: WatchStream,
        pages: WatchStream,
        stop: &Shutdown,
        signals: &Sender<WorkerSignal>,
        workers: &mut Vec<JoinHandle<()>>,
    ) -> Result<(), SyncError> {
        workers.push(self.spawn_worker::<Post>(posts, stop, signals.clone())?);
        workers.push(self.spawn_worker::<Page>(pages, stop, signals.clone())?);
        Ok(())
    }

    fn spawn_worker<R: Resource + 'static>(
        &self,
        stream: WatchStream,
        stop: &Shutdown,
        signals: Sender<WorkerSignal>,
    ) -> Result<JoinHandle<()>, SyncError> {
        let store = Arc::clone(&self.store);
        let stats = Arc::clone(&self.stats);
        let stop = stop.clone();

        thread::Builder::new()
            .name(format!("sync-{}", R::KIND))
            .spawn(move || run_worker::<R>(&stream, &store, &stats, &stop, &signals))
            .map_err(SyncError::Spawn)
    }
}

/// Consume one stream until it ends or `stop` fires.
///
/// Stopping abandons anything still queued on the stream.
fn run_worker<R: Resource>(
    stream: &WatchStream,
    store: &ContentStore,
    stats: &SyncStats,
    stop: &Shutdown,
    signals: &Sender<WorkerSignal>,
) {
    while !stop.is_cancelled() {
        match stream.recv_timeout(POLL_INTERVAL) {
            Ok(Notification::Event(event)) => stats.record(apply::<R>(store, &event)),
            Ok(Notification::Synced) => {
                let _ = signals.send(WorkerSignal::Synced(R::KIND));
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                log!("sync"; "{} stream ended", R::KIND);
                let _ = signals.send(WorkerSignal::Ended(R::KIND));
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::{
        source::{StreamSender, channel::ChannelSource},
        *,
    };

    const WAIT: Duration = Duration::from_secs(5);

    fn post(id: &str, date: Option<&str>, author: &str, tags: &[&str]) -> Value {
        let mut spec = json!({ "id": id, "title": format!("Post {id}"), "author": author, "tags": tags });
        if let Some(date) = date {
            spec["authoredDate"] = json!(date);
        }
        json!({ "kind": "BlogPost", "metadata": { "name": id, "namespace": "blog" }, "spec": spec })
    }

    fn page(id: &str, order: i64) -> Value {
        json!({ "kind": "BlogPage", "metadata": { "name": id }, "spec": { "id": id, "order": order } })
    }

    struct Harness {
        source: Arc<ChannelSource>,
        posts: StreamSender,
        pages: StreamSender,
        store: Arc<ContentStore>,
    }

    impl Harness {
        fn new() -> Self {
            let source = Arc::new(ChannelSource::new());
            let posts = source.sender(ResourceKind::Post);
            let pages = source.sender(ResourceKind::Page);
            Self {
                source,
                posts,
                pages,
                store: Arc::new(ContentStore::new()),
            }
        }

        fn controller(&self, sync_timeout: Duration) -> Arc<Controller> {
            Arc::new(Controller::new(
                self.source.clone(),
                Arc::clone(&self.store),
                "blog",
                sync_timeout,
            ))
        }
    }

    fn spawn(controller: &Arc<Controller>, shutdown: &Shutdown) -> JoinHandle<Result<(), SyncError>> {
        let controller = Arc::clone(controller);
        let shutdown = shutdown.clone();
        thread::spawn(move || controller.start(&shutdown))
    }

    /// Poll `cond` until it holds or `WAIT` elapses.
    fn eventually(cond: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + WAIT;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        cond()
    }

    #[test]
    fn test_initial_sync_then_live_events() {
        let h = Harness::new();
        let controller = h.controller(WAIT);
        let shutdown = Shutdown::new();
        let state = controller.state();
        let run = spawn(&controller, &shutdown);

        h.posts.add(post("p1", Some("2024-01-01T00:00:00Z"), "alice", &["go", "k8s"]));
        h.pages.add(page("a", 2));
        h.pages.add(page("b", 1));
        h.pages.add(page("c", 0));
        assert_eq!(state.get(), SyncState::Initializing);

        h.posts.synced();
        h.pages.synced();
        assert!(state.wait_synced(WAIT));
        assert!(eventually(|| state.get() == SyncState::Running));
        assert_eq!(h.store.post_count(), 1);

        let ids: Vec<_> = h.store.list_pages().iter().map(|p| p.id.clone()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);

        h.posts.update(post("p1", Some("2024-01-01T00:00:00Z"), "bob", &["go"]));
        assert!(eventually(|| h.store.get_post("p1").is_some_and(|p| p.author == "bob")));
        assert!(h.store.list_posts_by_tag("k8s").is_empty());
        assert!(h.store.list_posts_by_author("alice").is_empty());
        assert_eq!(h.store.list_posts_by_author("bob").len(), 1);

        h.posts.delete(post("ghost", Some("2024-01-01T00:00:00Z"), "x", &[]));
        h.posts.add(post("broken", None, "x", &[]));
        h.pages.delete(page("b", 1));
        assert!(eventually(|| controller.stats().dropped == 1 && h.store.page_count() == 2));
        assert_eq!(h.store.post_count(), 1);

        shutdown.cancel();
        assert!(run.join().unwrap().is_ok());

        let stats = controller.stats();
        assert_eq!(stats.upserted, 5);
        assert_eq!(stats.deleted, 2);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.orphaned, 0);
    }

    #[test]
    fn test_watches_configured_namespace() {
        let h = Harness::new();
        let controller = h.controller(WAIT);
        let shutdown = Shutdown::new();
        shutdown.cancel();

        assert!(controller.start(&shutdown).is_ok());
        assert_eq!(
            h.source.watched(),
            vec![
                (ResourceKind::Post, "blog".to_string()),
                (ResourceKind::Page, "blog".to_string())
            ]
        );
    }

    #[test]
    fn test_missing_stream_is_transport_failure() {
        let source = Arc::new(ChannelSource::new());
        let _posts = source.sender(ResourceKind::Post);
        let controller = Controller::new(source, Arc::new(ContentStore::new()), "blog", WAIT);

        let result = controller.start(&Shutdown::new());
        assert!(matches!(result, Err(SyncError::TransportFailure(_))));
        assert_eq!(controller.state().get(), SyncState::Initializing);
    }

    #[test]
    fn test_sync_timeout_is_transport_failure() {
        let h = Harness::new();
        let controller = h.controller(Duration::from_millis(200));

        h.posts.synced();
        // pages never sync
        let result = controller.start(&Shutdown::new());
        assert!(matches!(result, Err(SyncError::TransportFailure(msg)) if msg.contains("did not complete")));
        assert!(!controller.state().get().is_synced());
    }

    #[test]
    fn test_unbounded_sync_timeout_does_not_overflow() {
        let h = Harness::new();
        let controller = h.controller(Duration::MAX);
        let shutdown = Shutdown::new();
        let run = spawn(&controller, &shutdown);

        h.posts.synced();
        h.pages.synced();
        assert!(eventually(|| controller.state().get() == SyncState::Running));

        shutdown.cancel();
        assert!(run.join().unwrap().is_ok());
    }

    #[test]
    fn test_stream_closed_before_sync_is_transport_failure() {
        let h = Harness::new();
        let controller = h.controller(WAIT);
        let Harness { posts, pages, .. } = h;

        pages.synced();
        drop(posts);

        let result = controller.start(&Shutdown::new());
        assert!(matches!(result, Err(SyncError::TransportFailure(msg)) if msg.contains("post")));
        drop(pages);
    }

    #[test]
    fn test_stream_closed_while_running_is_transport_failure() {
        let h = Harness::new();
        let controller = h.controller(WAIT);
        let shutdown = Shutdown::new();
        let run = spawn(&controller, &shutdown);
        let Harness { posts, pages, .. } = h;

        posts.synced();
        pages.synced();
        assert!(controller.state().wait_synced(WAIT));

        drop(pages);
        let result = run.join().unwrap();
        assert!(matches!(result, Err(SyncError::TransportFailure(msg)) if msg.contains("page")));
        drop(posts);
    }

    #[test]
    fn test_shutdown_during_initial_sync_is_clean() {
        let h = Harness::new();
        let controller = h.controller(WAIT);
        let shutdown = Shutdown::new();
        let run = spawn(&controller, &shutdown);

        h.posts.add(post("p1", Some("2024-01-01T00:00:00Z"), "alice", &[]));
        assert!(eventually(|| h.store.post_count() == 1));

        shutdown.cancel();
        assert!(run.join().unwrap().is_ok());
        assert_eq!(controller.state().get(), SyncState::Initializing);
        // Workers are gone, so the transport sees the streams closed
        assert!(eventually(|| h.posts.is_closed() && h.pages.is_closed()));
    }

    #[test]
    fn test_reads_during_initializing_see_partial_view() {
        let h = Harness::new();
        let controller = h.controller(WAIT);
        let shutdown = Shutdown::new();
        let run = spawn(&controller, &shutdown);

        h.posts.add(post("p1", Some("2024-01-01T00:00:00Z"), "a", &[]));
        assert!(eventually(|| h.store.post_count() == 1));
        h.posts.add(post("p2", Some("2024-01-02T00:00:00Z"), "a", &[]));
        assert!(eventually(|| h.store.post_count() == 2));
        assert_eq!(controller.state().get(), SyncState::Initializing);

        shutdown.cancel();
        assert!(run.join().unwrap().is_ok());
    }
}
