//! Reading the client's notification queue
//!
//! Every playing, paused, completed, failed and connection change lands on one
//! queue per client. [`ClientEventIterator`] is the caller's end of it: a plain
//! `Iterator` that parks until the next notification, with polling and bounded
//! waits for loops that also have other work to do.

use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::event::{ClientEvent, EventId};

/// The caller's end of a client's notification queue
///
/// Iteration ends once the client is dropped. Clones read from the same
/// queue, so a notification taken by one clone is gone for the others.
pub struct ClientEventIterator {
    rx: Arc<Mutex<mpsc::Receiver<ClientEvent>>>,
}

impl ClientEventIterator {
    pub(crate) fn new(rx: Arc<Mutex<mpsc::Receiver<ClientEvent>>>) -> Self {
        Self { rx }
    }

    /// Next notification, parking until one arrives
    ///
    /// `None` means the client is gone.
    pub fn recv(&self) -> Option<ClientEvent> {
        self.rx.lock().recv().ok()
    }

    /// Next notification if one is already queued
    pub fn try_recv(&self) -> Option<ClientEvent> {
        self.rx.lock().try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<ClientEvent> {
        self.rx.lock().recv_timeout(timeout).ok()
    }

    /// Everything queued right now, without waiting
    pub fn try_iter(&self) -> Queued<'_> {
        Queued { queue: self }
    }

    /// Notifications until the queue stays quiet for `idle`
    pub fn timeout_iter(&self, idle: Duration) -> UntilIdle<'_> {
        UntilIdle { queue: self, idle }
    }

    /// Consume notifications until `id` completes or fails
    ///
    /// Returns the terminal notification, or `None` if `timeout` passed
    /// first. Notifications for other events read on the way are discarded.
    pub fn wait_until_ended(&self, id: EventId, timeout: Duration) -> Option<ClientEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            let left = deadline.checked_duration_since(Instant::now())?;
            let notification = self.recv_timeout(left)?;
            if notification.is_terminal() && notification.event_id() == Some(id) {
                return Some(notification);
            }
        }
    }
}

impl Iterator for ClientEventIterator {
    type Item = ClientEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv()
    }
}

impl Clone for ClientEventIterator {
    fn clone(&self) -> Self {
        Self {
            rx: Arc::clone(&self.rx),
        }
    }
}

/// See [`ClientEventIterator::try_iter`]
pub struct Queued<'a> {
    queue: &'a ClientEventIterator,
}

impl Iterator for Queued<'_> {
    type Item = ClientEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.queue.try_recv()
    }
}

/// See [`ClientEventIterator::timeout_iter`]
pub struct UntilIdle<'a> {
    queue: &'a ClientEventIterator,
    idle: Duration,
}

impl Iterator for UntilIdle<'_> {
    type Item = ClientEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.queue.recv_timeout(self.idle)
    }
}
