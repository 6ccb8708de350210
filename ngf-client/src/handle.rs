//! Single-event handle
//!
//! [`FeedbackEvent`] binds one event name to a client and tracks the playback
//! status of the most recent play of it, the way a UI element bound to a
//! "ringtone" or "battery_low" effect would.

use ngf_bus::{BusTransport, DbusTransport, Properties};
use serde::Serialize;

use crate::client::NgfClient;
use crate::error::Result;
use crate::event::{ClientEvent, EventId};

/// Playback status as seen by a [`FeedbackEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    #[default]
    Stopped,
    Failed,
    Playing,
    Paused,
}

/// One named event bound to a client
///
/// The handle does not read notifications itself; feed it the client's
/// notifications with [`apply`](Self::apply). Dropping the handle stops its event.
pub struct FeedbackEvent<'a, T: BusTransport = DbusTransport> {
    client: &'a NgfClient<T>,
    event: String,
    properties: Properties,
    status: EventStatus,
    id: Option<EventId>,

    /// Play as soon as the client (re)connects
    autostart: bool,
}

impl<'a, T: BusTransport> FeedbackEvent<'a, T> {
    pub fn new(client: &'a NgfClient<T>, event: impl Into<String>) -> Self {
        Self {
            client,
            event: event.into(),
            properties: Properties::new(),
            status: EventStatus::Stopped,
            id: None,
            autostart: false,
        }
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    /// Change the event name; a running event restarts with the new one
    pub fn set_event(&mut self, event: impl Into<String>) -> Result<()> {
        let event = event.into();
        if event == self.event {
            return Ok(());
        }

        let restart = self.id.is_some() || self.autostart;
        self.stop();
        self.event = event;

        if restart {
            self.play()?;
        }
        Ok(())
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Properties used from the next `play` on
    pub fn set_properties(&mut self, properties: Properties) {
        self.properties = properties;
    }

    pub fn status(&self) -> EventStatus {
        self.status
    }

    /// Local id of the current play, if one is running
    pub fn id(&self) -> Option<EventId> {
        self.id
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    /// Start the event from the beginning
    ///
    /// Connects the client if needed. If no connection can be made yet, the
    /// play is remembered and retried when [`apply`](Self::apply) sees the
    /// client come back.
    pub fn play(&mut self) -> Result<()> {
        if !self.client.is_connected() {
            self.client.connect();
        }

        self.autostart = true;
        if self.id.is_some() {
            // Restarting clears the autostart intent along with the old play
            self.stop();
        }

        if self.event.is_empty() || !self.client.is_connected() {
            tracing::debug!("Deferring play of '{}' until connected", self.event);
            return Ok(());
        }

        let id = self.client.play_with(&self.event, &self.properties)?;
        self.id = Some(id);
        Ok(())
    }

    pub fn pause(&self) {
        if let Some(id) = self.id {
            self.client.pause(id);
        }
    }

    pub fn resume(&self) {
        if let Some(id) = self.id {
            self.client.resume(id);
        }
    }

    pub fn stop(&mut self) {
        self.autostart = false;
        if let Some(id) = self.id.take() {
            self.client.stop(id);
            self.status = EventStatus::Stopped;
        }
    }

    /// Fold one client notification into the handle's status
    ///
    /// Returns whether the status changed.
    pub fn apply(&mut self, notification: &ClientEvent) -> bool {
        let before = self.status;

        match *notification {
            ClientEvent::ConnectionStatus(true) if self.autostart && self.id.is_none() => {
                self.autostart = false;
                if let Err(e) = self.play() {
                    tracing::warn!("Deferred play of '{}' failed: {}", self.event, e);
                }
            }
            ClientEvent::ConnectionStatus(false) if self.id.is_some() => {
                // The client dropped every tracked event
                self.id = None;
                self.status = EventStatus::Stopped;
            }
            ClientEvent::ConnectionStatus(_) => {}
            ClientEvent::Failed(id) if self.id == Some(id) => {
                self.id = None;
                self.status = EventStatus::Failed;
            }
            ClientEvent::Completed(id) if self.id == Some(id) => {
                self.id = None;
                self.status = EventStatus::Stopped;
            }
            ClientEvent::Playing(id) if self.id == Some(id) => {
                self.autostart = false;
                self.status = EventStatus::Playing;
            }
            ClientEvent::Paused(id) if self.id == Some(id) => {
                self.status = EventStatus::Paused;
            }
            _ => {}
        }

        self.status != before
    }
}

impl<'a, T: BusTransport> Drop for FeedbackEvent<'a, T> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ngf_bus::{BusCall, Control, MockBus, RemoteId};
    use std::time::Duration;

    fn client() -> (NgfClient<MockBus>, MockBus) {
        let (bus, inbound) = MockBus::channel();
        let client = NgfClient::with_transport(bus.clone(), inbound).unwrap();
        (client, bus)
    }

    fn wait_for(client: &NgfClient<MockBus>, expected: ClientEvent) {
        let found = client
            .events()
            .timeout_iter(Duration::from_secs(2))
            .any(|event| event == expected);
        assert!(found, "never saw {:?}", expected);
    }

    #[test]
    fn test_play_connects_client() {
        let (client, bus) = client();
        let mut ringtone = FeedbackEvent::new(&client, "ringtone");

        ringtone.play().unwrap();
        assert!(client.is_connected());
        assert_eq!(ringtone.id().map(|id| id.get()), Some(1));
        assert!(bus.last_play().is_some());
    }

    #[test]
    fn test_status_follows_notifications() {
        let (client, _bus) = client();
        let mut ringtone = FeedbackEvent::new(&client, "ringtone");
        ringtone.play().unwrap();
        let id = ringtone.id().unwrap();
        let other = EventId::new(99).unwrap();

        assert!(!ringtone.apply(&ClientEvent::Playing(other)));
        assert!(ringtone.apply(&ClientEvent::Playing(id)));
        assert_eq!(ringtone.status(), EventStatus::Playing);

        assert!(ringtone.apply(&ClientEvent::Paused(id)));
        assert_eq!(ringtone.status(), EventStatus::Paused);

        assert!(ringtone.apply(&ClientEvent::Failed(id)));
        assert_eq!(ringtone.status(), EventStatus::Failed);
        assert_eq!(ringtone.id(), None);
    }

    #[test]
    fn test_replay_stops_previous() {
        let (client, bus) = client();
        let mut ringtone = FeedbackEvent::new(&client, "ringtone");
        ringtone.play().unwrap();
        let first = ringtone.id().unwrap();

        bus.reply_play(bus.last_play().unwrap(), 7);
        wait_for(&client, ClientEvent::Playing(first));

        ringtone.play().unwrap();
        assert_ne!(ringtone.id(), Some(first));
        assert_eq!(
            bus.control_calls(),
            vec![(RemoteId::new(7), Control::Stop)]
        );
    }

    #[test]
    fn test_failed_replay_is_not_retried_on_reconnect() {
        let (client, bus) = client();
        let mut ringtone = FeedbackEvent::new(&client, "ringtone");
        ringtone.play().unwrap();
        let first = ringtone.id().unwrap();
        assert!(ringtone.apply(&ClientEvent::Playing(first)));

        ringtone.play().unwrap();
        let second = ringtone.id().unwrap();
        assert_eq!(ringtone.status(), EventStatus::Stopped);

        assert!(ringtone.apply(&ClientEvent::Failed(second)));
        ringtone.apply(&ClientEvent::ConnectionStatus(true));
        assert_eq!(ringtone.id(), None);

        let plays = bus
            .calls()
            .into_iter()
            .filter(|call| matches!(call, BusCall::Play { .. }))
            .count();
        assert_eq!(plays, 2);
    }

    #[test]
    fn test_autostart_on_reconnect() {
        let (client, bus) = client();
        bus.fail_next_watch();

        let mut ringtone = FeedbackEvent::new(&client, "ringtone");
        ringtone.play().unwrap();
        assert_eq!(ringtone.id(), None);
        assert!(bus.last_play().is_none());

        assert!(client.connect());
        ringtone.apply(&ClientEvent::ConnectionStatus(true));
        assert!(ringtone.id().is_some());
        assert!(bus.last_play().is_some());
    }

    #[test]
    fn test_connected_edge_does_not_replay() {
        let (client, bus) = client();
        let mut ringtone = FeedbackEvent::new(&client, "ringtone");
        ringtone.play().unwrap();
        let id = ringtone.id();

        ringtone.apply(&ClientEvent::ConnectionStatus(true));
        assert_eq!(ringtone.id(), id);
        assert!(bus.control_calls().is_empty());
    }

    #[test]
    fn test_service_loss_resets_status() {
        let (client, bus) = client();
        let mut ringtone = FeedbackEvent::new(&client, "ringtone");
        ringtone.play().unwrap();
        let id = ringtone.id().unwrap();
        assert!(ringtone.apply(&ClientEvent::Playing(id)));

        assert!(ringtone.apply(&ClientEvent::ConnectionStatus(false)));
        assert_eq!(ringtone.status(), EventStatus::Stopped);
        assert_eq!(ringtone.id(), None);
        drop(ringtone);
        assert!(bus.control_calls().is_empty());
    }

    #[test]
    fn test_set_event_restarts_running_event() {
        let (client, bus) = client();
        let mut feedback = FeedbackEvent::new(&client, "ringtone");
        feedback.set_event("sms").unwrap();
        assert!(bus.last_play().is_none());

        feedback.play().unwrap();
        feedback.set_event("alarm").unwrap();

        assert_eq!(feedback.event(), "alarm");
        assert_eq!(feedback.id().map(|id| id.get()), Some(2));
    }

    #[test]
    fn test_drop_stops_event() {
        let (client, bus) = client();
        {
            let mut ringtone = FeedbackEvent::new(&client, "ringtone");
            ringtone.play().unwrap();
            bus.reply_play(bus.last_play().unwrap(), 3);
            wait_for(&client, ClientEvent::Playing(ringtone.id().unwrap()));
        }
        assert_eq!(
            bus.control_calls(),
            vec![(RemoteId::new(3), Control::Stop)]
        );
    }
}
