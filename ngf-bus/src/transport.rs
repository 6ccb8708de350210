//! The transport seam between the client core and the message bus
//!
//! Outbound requests go through [`BusTransport`]; every reply, signal and
//! presence change comes back as a [`BusEvent`] on a single channel, which
//! is what serializes delivery into the client core.

use std::sync::mpsc;

use crate::error::{BusError, Result};
use crate::properties::Properties;
use crate::types::{CallId, Control, RemoteId};

/// Inbound traffic from the bus, delivered in order on one channel
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    /// Reply to a `Play` call issued with [`BusTransport::play`]
    PlayReply {
        call: CallId,
        result: std::result::Result<RemoteId, BusError>,
    },

    /// Reply to a `Pause`/`Stop` call issued with [`BusTransport::control`]
    ControlReply {
        remote_id: RemoteId,
        control: Control,
        result: std::result::Result<(), BusError>,
    },

    /// `Status(remote_id, code)` broadcast by the daemon
    ///
    /// The code is passed through raw so that the receiver decides how to
    /// treat values it does not know.
    Status { remote_id: RemoteId, code: u32 },

    /// The daemon's well-known name gained an owner
    ServiceRegistered,

    /// The daemon's well-known name lost its owner
    ServiceUnregistered,
}

/// Sending half of the inbound event channel handed to a transport
pub type EventSink = mpsc::Sender<BusEvent>;

/// Outbound side of the bus as seen by the client core
///
/// All calls are non-blocking from the caller's point of view: they either
/// queue the request and return, or fail immediately when there is no bus
/// link to queue it on. Results surface later as [`BusEvent`]s.
pub trait BusTransport: Send + 'static {
    /// Open the bus link if needed and subscribe to service presence and
    /// the `Status` signal
    fn watch_service(&mut self) -> Result<()>;

    /// Re-bind the `Status` subscription, e.g. after the daemon restarted
    fn subscribe_status(&mut self) -> Result<()>;

    /// Drop every subscription and the bus link
    fn unwatch(&mut self);

    /// Issue an asynchronous `Play(name, properties)` call
    fn play(&mut self, name: &str, properties: &Properties) -> Result<CallId>;

    /// Issue an asynchronous `Pause` or `Stop` call for a started event
    fn control(&mut self, remote_id: RemoteId, control: Control) -> Result<()>;
}

impl<T: BusTransport + ?Sized> BusTransport for Box<T> {
    fn watch_service(&mut self) -> Result<()> {
        (**self).watch_service()
    }

    fn subscribe_status(&mut self) -> Result<()> {
        (**self).subscribe_status()
    }

    fn unwatch(&mut self) {
        (**self).unwatch()
    }

    fn play(&mut self, name: &str, properties: &Properties) -> Result<CallId> {
        (**self).play(name, properties)
    }

    fn control(&mut self, remote_id: RemoteId, control: Control) -> Result<()> {
        (**self).control(remote_id, control)
    }
}

/// Forward an inbound event, logging when nobody is listening any more
pub(crate) fn deliver(sink: &EventSink, event: BusEvent) {
    if let Err(mpsc::SendError(event)) = sink.send(event) {
        tracing::trace!("Inbound event dropped, receiver gone: {:?}", event);
    }
}
