//! Connection supervision
//!
//! Tracks whether the bus link is up and whether the daemon currently owns its
//! name, and reports connectivity to the client user on edges only. When the
//! daemon leaves the bus every tracked event is dropped, since their remote
//! state can no longer be known.

use ngf_bus::BusTransport;

use crate::event::ClientEvent;
use crate::notification::Notifier;
use crate::registry::EventRegistry;

#[derive(Debug, Default)]
pub struct ConnectionSupervisor {
    /// The user asked to be connected
    wanted: bool,

    /// `watch_service()` succeeded and `unwatch()` has not been called since
    attached: bool,

    /// The daemon's name has an owner as far as we know
    service_present: bool,

    /// Last connectivity value reported to the user
    reported: bool,
}

impl ConnectionSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether requests can be queued on the bus at all
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn is_connected(&self) -> bool {
        self.attached && self.service_present
    }

    /// Establish the presence and status subscriptions
    ///
    /// Idempotent. The daemon is assumed present once the subscriptions are in
    /// place; a later `ServiceUnregistered` corrects that.
    pub fn connect<T: BusTransport>(&mut self, transport: &mut T, notifier: &Notifier) -> bool {
        self.wanted = true;
        if self.attached {
            return true;
        }

        match transport.watch_service() {
            Ok(()) => {
                self.attached = true;
                self.service_present = true;
                tracing::info!("Connected to feedback daemon");
            }
            Err(e) => {
                tracing::warn!("Failed to connect to feedback daemon: {}", e);
            }
        }

        self.report(notifier);
        self.attached
    }

    /// Tear down the subscriptions and forget every tracked event
    pub fn disconnect<T: BusTransport>(
        &mut self,
        transport: &mut T,
        registry: &mut EventRegistry,
        notifier: &Notifier,
    ) {
        self.wanted = false;
        if self.attached {
            transport.unwatch();
            self.attached = false;
            tracing::info!("Disconnected from feedback daemon");
        }

        let dropped = registry.remove_all();
        if dropped > 0 {
            tracing::debug!("Dropped {} tracked events on disconnect", dropped);
        }

        self.report(notifier);
    }

    /// The daemon's name lost its owner
    pub fn service_unregistered(&mut self, registry: &mut EventRegistry, notifier: &Notifier) {
        if !self.attached {
            tracing::trace!("Ignoring daemon exit while detached");
            return;
        }

        self.service_present = false;
        let dropped = registry.remove_all();
        tracing::info!(
            "Feedback daemon left the bus, dropped {} tracked events",
            dropped
        );

        self.report(notifier);
    }

    /// The daemon's name gained an owner
    pub fn service_registered<T: BusTransport>(&mut self, transport: &mut T, notifier: &Notifier) {
        if !self.attached {
            tracing::trace!("Ignoring daemon start while detached");
            return;
        }

        self.service_present = true;
        if self.wanted {
            match transport.subscribe_status() {
                Ok(()) => tracing::info!("Feedback daemon is back, status subscription renewed"),
                Err(e) => tracing::warn!("Failed to renew status subscription: {}", e),
            }
        }

        self.report(notifier);
    }

    fn report(&mut self, notifier: &Notifier) {
        let connected = self.is_connected();
        if connected != self.reported {
            self.reported = connected;
            notifier.emit(ClientEvent::ConnectionStatus(connected));
        }
    }
}
