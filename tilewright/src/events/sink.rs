//! Event emission handle.

use super::event::TileEvent;
use tokio::sync::mpsc;

/// Handle for emitting [`TileEvent`]s.
///
/// Cheap to clone; wraps an optional unbounded channel sender. A disabled
/// sink drops every event. Sends never block and silently ignore a receiver
/// that has gone away, so observability can never fail a request.
#[derive(Clone, Debug, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<TileEvent>>,
}

impl EventSink {
    /// Creates a sink that forwards to the given sender.
    pub fn new(tx: mpsc::UnboundedSender<TileEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Creates a sink and the receiver that observes it.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TileEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Creates a sink that drops everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Sends an event (fire-and-forget).
    #[inline]
    pub fn emit(&self, event: TileEvent) {
        if let Some(tx) = &self.tx {
            // Receiver may have shut down
            let _ = tx.send(event);
        }
    }

    /// True if events go anywhere.
    pub fn is_enabled(&self) -> bool {
        self.tx.as_ref().is_some_and(|tx| !tx.is_closed())
    }
}
