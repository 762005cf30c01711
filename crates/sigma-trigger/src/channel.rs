//! In-process channel-backed trigger.

use async_trait::async_trait;
use tokio::sync::mpsc;

use sigma_proto::Event;

use crate::Trigger;

/// Feeds events into a [`ChannelTrigger`].
///
/// Dropping every sender ends the trigger's stream.
#[derive(Debug, Clone)]
pub struct TriggerSender {
    tx: mpsc::Sender<Event>,
}

impl TriggerSender {
    /// Sends an event to the trigger; returns false once the trigger side
    /// is gone.
    pub async fn send(&self, event: Event) -> bool {
        self.tx.send(event).await.is_ok()
    }
}

/// Trigger fed from an in-process bounded channel.
///
/// Useful for wiring other subsystems into a function and as the event
/// source in tests.
#[derive(Debug)]
pub struct ChannelTrigger {
    rx: mpsc::Receiver<Event>,
}

impl ChannelTrigger {
    /// Creates a sender/trigger pair with the given buffering depth.
    #[must_use]
    pub fn channel(capacity: usize) -> (TriggerSender, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (TriggerSender { tx }, Self { rx })
    }
}

#[async_trait]
impl Trigger for ChannelTrigger {
    async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}
