//! Outbound notification channel

use std::sync::mpsc;

use crate::event::ClientEvent;

/// Sending half of the notification channel
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::Sender<ClientEvent>,
}

impl Notifier {
    pub fn new(tx: mpsc::Sender<ClientEvent>) -> Self {
        Self { tx }
    }

    /// Create a notifier together with its receiving end
    pub fn channel() -> (Self, mpsc::Receiver<ClientEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self::new(tx), rx)
    }

    pub fn emit(&self, event: ClientEvent) {
        tracing::debug!("Notify: {}", event);
        if self.tx.send(event).is_err() {
            tracing::trace!("Notification dropped, no receiver: {:?}", event);
        }
    }
}
