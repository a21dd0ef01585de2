//! Viewer events
//!
//! The controller publishes selection, state, stream and error events on an
//! `EventBus`; the CLI prints the ones matching `--events`.

pub mod types;

pub use types::ViewerEvent;

use tokio::sync::broadcast;

/// Events a slow subscriber may fall behind by before it sees `Lagged`
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Fan-out of `ViewerEvent`s to every subscriber
///
/// Publishing never blocks and never fails. Subscribers only see events
/// published after they subscribed.
pub struct EventBus {
    tx: broadcast::Sender<ViewerEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, event: ViewerEvent) {
        // no subscribers is not an error
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ViewerEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
