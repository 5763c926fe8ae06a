//! Heartbeat timer for the failure detector.

use paxon_core::{Body, Message};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

/// The failure detector's adaptive timer.
///
/// Each arming spawns a tokio task that sleeps for the requested delay
/// and then enqueues an `EpfdTimeout` marker into the instance queue.
/// The callback never touches abstraction state; the dispatcher task
/// performs the round, keeping every transition single-threaded. Arming
/// while a timer is pending replaces it.
pub struct HeartbeatTimer {
    event_tx: mpsc::Sender<Message>,
    handle: Option<JoinHandle<()>>,
}

impl HeartbeatTimer {
    pub fn new(event_tx: mpsc::Sender<Message>) -> Self {
        Self {
            event_tx,
            handle: None,
        }
    }

    /// Arm the timer, cancelling any pending one.
    pub fn arm(&mut self, duration: Duration) {
        self.cancel();
        let event_tx = self.event_tx.clone();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            trace!(delay_ms = duration.as_millis() as u64, "heartbeat timer fired");
            let _ = event_tx.send(Message::new(Body::EpfdTimeout)).await;
        }));
    }

    /// Cancel the pending timer, if any.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for HeartbeatTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
