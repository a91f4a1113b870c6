//! Watch transport seam.
//!
//! A [`WatchSource`] opens one [`WatchStream`] per resource kind. The stream
//! is a plain channel: the transport pushes notifications from its own
//! thread, the sync worker pulls them with a timeout so it can notice
//! cancellation.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
    },
    time::Duration,
};

use super::{
    SyncError,
    event::{Notification, ResourceKind},
};

/// Something that can stream add/update/delete notifications for a kind.
pub trait WatchSource: Send + Sync {
    /// Start watching `kind` within `namespace`.
    ///
    /// The stream first delivers every existing object, then
    /// [`Notification::Synced`], then live changes. Per-object order is
    /// preserved.
    ///
    /// # Errors
    ///
    /// [`SyncError::TransportFailure`] if the subscription cannot be set up.
    fn watch(&self, kind: ResourceKind, namespace: &str) -> Result<WatchStream, SyncError>;
}

/// Consumer end of a watch. Dropping it tells the producer to stop.
#[derive(Debug)]
pub struct WatchStream {
    rx: Receiver<Notification>,
    closed: Arc<AtomicBool>,
}

impl WatchStream {
    /// Create a connected producer/consumer pair.
    pub fn channel() -> (StreamSender, Self) {
        let (tx, rx) = mpsc::channel();
        let closed = Arc::new(AtomicBool::new(false));
        let sender = StreamSender {
            tx,
            closed: Arc::clone(&closed),
        };
        (sender, Self { rx, closed })
    }

    /// Wait up to `timeout` for the next notification.
    ///
    /// `Disconnected` means the transport is gone for good.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Notification, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

impl Drop for WatchStream {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Producer end of a watch, held by the transport.
#[derive(Debug, Clone)]
pub struct StreamSender {
    tx: Sender<Notification>,
    closed: Arc<AtomicBool>,
}

impl StreamSender {
    /// Push a notification. Returns `false` once the consumer is gone.
    pub fn send(&self, notification: Notification) -> bool {
        !self.is_closed() && self.tx.send(notification).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_delivers_in_order() {
        let (sender, stream) = WatchStream::channel();
        assert!(sender.send(Notification::Synced));
        assert!(sender.add(serde_json::json!({ "n": 1 })));

        let timeout = Duration::from_millis(100);
        assert_eq!(stream.recv_timeout(timeout), Ok(Notification::Synced));
        assert!(matches!(stream.recv_timeout(timeout), Ok(Notification::Event(_))));
        assert_eq!(stream.recv_timeout(timeout), Err(RecvTimeoutError::Timeout));
    }

    #[test]
    fn test_dropping_stream_closes_sender() {
        let (sender, stream) = WatchStream::channel();
        assert!(!sender.is_closed());
        drop(stream);
        assert!(sender.is_closed());
        assert!(!sender.send(Notification::Synced));
    }

    #[test]
    fn test_dropping_sender_disconnects_stream() {
        let (sender, stream) = WatchStream::channel();
        drop(sender);
        assert_eq!(
            stream.recv_timeout(Duration::from_millis(10)),
            Err(RecvTimeoutError::Disconnected)
        );
    }

    #[test]
    fn test_channel_source_hands_out_each_stream_once() {
        let source = channel::ChannelSource::new();
        let _posts = source.sender(ResourceKind::Post);

        assert!(source.watch(ResourceKind::Post, "blog").is_ok());
        assert!(matches!(
            source.watch(ResourceKind::Post, "blog"),
            Err(SyncError::TransportFailure(_))
        ));
        assert!(source.watch(ResourceKind::Page, "blog").is_err());
        assert_eq!(source.watched().len(), 3);
    }
}
