//! Event-state reconciliation
//!
//! The engine owns the transport, the registry and the connection supervisor.
//! Each tracked event carries the state the daemon last confirmed (`active`),
//! the state the caller last asked for (`wanted`), a request captured before
//! the daemon assigned a remote id (`pending`) and the target of the one
//! corrective call allowed on the wire at a time (`in_flight`).
//!
//! Requests never queue: a new request while a call is in flight only moves
//! `wanted`, and the engine issues the next corrective call once the daemon
//! confirms the previous one.
//!
//! All methods expect to be called from one thread at a time; the facade wraps
//! the engine in a mutex.

use ngf_bus::{BusError, BusEvent, BusTransport, CallId, Control, Properties, RemoteId, StatusCode};

use crate::error::{ClientError, Result};
use crate::event::{ClientEvent, Event, EventId, EventRef, EventSnapshot, PlaybackState};
use crate::notification::Notifier;
use crate::registry::EventRegistry;
use crate::supervisor::ConnectionSupervisor;

pub struct Engine<T: BusTransport> {
    transport: T,
    registry: EventRegistry,
    supervisor: ConnectionSupervisor,
    notifier: Notifier,
    last_id: u32,
}

impl<T: BusTransport> Engine<T> {
    pub fn new(transport: T, notifier: Notifier) -> Self {
        Self {
            transport,
            registry: EventRegistry::new(),
            supervisor: ConnectionSupervisor::new(),
            notifier,
            last_id: 0,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn connect(&mut self) -> bool {
        self.supervisor.connect(&mut self.transport, &self.notifier)
    }

    pub fn disconnect(&mut self) {
        self.supervisor
            .disconnect(&mut self.transport, &mut self.registry, &self.notifier);
    }

    pub fn is_connected(&self) -> bool {
        self.supervisor.is_connected()
    }

    pub fn tracked_count(&self) -> usize {
        self.registry.len()
    }

    pub fn snapshot(&self) -> Vec<EventSnapshot> {
        self.registry.snapshot()
    }

    /// Ask the daemon to play `name` and start tracking the request
    ///
    /// Returns as soon as the `Play` call is queued. The outcome arrives later
    /// as a `Playing` or `Failed` notification for the returned id.
    pub fn play(&mut self, name: &str, properties: &Properties) -> Result<EventId> {
        if !self.supervisor.is_attached() {
            return Err(ClientError::NotConnected);
        }

        let id = self
            .last_id
            .checked_add(1)
            .and_then(EventId::new)
            .ok_or(ClientError::IdsExhausted)?;

        let call = self.transport.play(name, properties)?;
        self.last_id = id.get();
        self.registry.insert(Event::new(id, name, call))?;

        tracing::debug!("Play '{}' as event {} ({})", name, id, call);
        Ok(id)
    }

    /// Request `target` for every event `event_ref` resolves to
    ///
    /// Returns whether at least one tracked event matched.
    pub fn request(&mut self, event_ref: EventRef, target: PlaybackState) -> bool {
        let ids = match &event_ref {
            EventRef::Id(id) if self.registry.contains(*id) => vec![*id],
            EventRef::Id(_) => Vec::new(),
            EventRef::Name(name) => self.registry.find_by_name(name),
        };

        if ids.is_empty() {
            tracing::trace!("No tracked {} to set {}", event_ref, target);
            return false;
        }

        for id in ids {
            self.request_state(id, target);
        }
        true
    }

    /// Apply one inbound bus event
    pub fn dispatch(&mut self, event: BusEvent) {
        match event {
            BusEvent::PlayReply { call, result } => self.on_play_reply(call, result),
            BusEvent::ControlReply {
                remote_id,
                control,
                result,
            } => self.on_control_reply(remote_id, control, result),
            BusEvent::Status { remote_id, code } => self.on_status(remote_id, code),
            BusEvent::ServiceRegistered => self
                .supervisor
                .service_registered(&mut self.transport, &self.notifier),
            BusEvent::ServiceUnregistered => self
                .supervisor
                .service_unregistered(&mut self.registry, &self.notifier),
        }
    }

    fn on_play_reply(&mut self, call: CallId, result: std::result::Result<RemoteId, BusError>) {
        let Some(id) = self.registry.take_call(call) else {
            tracing::trace!("Ignoring reply to {} for an untracked event", call);
            return;
        };

        let remote_id = match result {
            Ok(remote_id) => remote_id,
            Err(e) => {
                tracing::warn!("Play request for event {} failed: {}", id, e);
                self.retire(id, ClientEvent::Failed(id));
                return;
            }
        };

        match self.registry.resolve(id, remote_id) {
            Ok(Some(stale)) => {
                tracing::warn!(
                    "Daemon reassigned {} to event {}, dropping event {}",
                    remote_id,
                    id,
                    stale.id
                );
                self.notifier.emit(ClientEvent::Failed(stale.id));
            }
            Ok(None) => {}
            Err(e) => {
                tracing::trace!("Cannot bind {}: {}", remote_id, e);
                return;
            }
        }

        let Some(event) = self.registry.get_mut(id) else {
            return;
        };
        let pending = event.pending.take();
        event.active = PlaybackState::Playing;
        tracing::debug!("Event {} started as {}", id, remote_id);

        if pending != Some(PlaybackState::Stopped) {
            self.notifier.emit(ClientEvent::Playing(id));
        }

        if let Some(target) = pending {
            self.request_state(id, target);
        }
    }

    fn request_state(&mut self, id: EventId, target: PlaybackState) {
        let Some(event) = self.registry.get_mut(id) else {
            return;
        };

        if event.active == PlaybackState::Stopped {
            return;
        }

        if event.active == PlaybackState::New {
            tracing::debug!("Event {} not started yet, deferring {}", id, target);
            event.pending = Some(target);
            return;
        }

        if event.wanted == target {
            return;
        }

        event.wanted = target;
        let in_flight = event.in_flight;
        match in_flight {
            Some(in_flight) => tracing::debug!(
                "Event {} still converging to {}, will continue to {}",
                id,
                in_flight,
                target
            ),
            None => self.issue_corrective(id),
        }
    }

    /// Send the one call that moves the daemon towards the wanted state
    fn issue_corrective(&mut self, id: EventId) {
        let Some(event) = self.registry.get_mut(id) else {
            return;
        };
        let Some(remote_id) = event.remote_id else {
            return;
        };

        let target = event.wanted;
        let control = match target {
            PlaybackState::Playing => Control::Pause(false),
            PlaybackState::Paused => Control::Pause(true),
            PlaybackState::Stopped => Control::Stop,
            PlaybackState::New => return,
        };

        match self.transport.control(remote_id, control) {
            Ok(()) => {
                tracing::debug!("Event {}: {} on {}", id, control, remote_id);
                event.in_flight = Some(target);
            }
            Err(e) => {
                tracing::warn!("Event {}: could not send {}: {}", id, control, e);
                event.wanted = event.active;
            }
        }
    }

    fn on_control_reply(
        &mut self,
        remote_id: RemoteId,
        control: Control,
        result: std::result::Result<(), BusError>,
    ) {
        let Some(id) = self.registry.find_by_remote_id(remote_id) else {
            tracing::trace!("Ignoring {} reply for untracked {}", control, remote_id);
            return;
        };

        let Err(e) = result else {
            // The Status signal confirms the transition and clears the marker
            return;
        };

        let Some(event) = self.registry.get_mut(id) else {
            return;
        };
        let failed = target_of(control);
        if event.in_flight != Some(failed) {
            tracing::trace!("Ignoring stale {} failure for event {}", control, id);
            return;
        }

        tracing::warn!("Event {}: {} failed: {}", id, control, e);
        event.in_flight = None;
        if event.wanted == failed {
            event.wanted = event.active;
        } else if event.wanted != event.active {
            self.issue_corrective(id);
        }
    }

    fn on_status(&mut self, remote_id: RemoteId, code: u32) {
        let Some(id) = self.registry.find_by_remote_id(remote_id) else {
            tracing::trace!("Ignoring status {} for untracked {}", code, remote_id);
            return;
        };

        let status = match StatusCode::try_from(code) {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!("Protocol desync on event {}: {}", id, e);
                self.retire(id, ClientEvent::Failed(id));
                return;
            }
        };

        let state = match status {
            StatusCode::Failed => {
                tracing::debug!("Event {} failed on the daemon", id);
                self.retire(id, ClientEvent::Failed(id));
                return;
            }
            StatusCode::Completed => {
                tracing::debug!("Event {} completed", id);
                self.retire(id, ClientEvent::Completed(id));
                return;
            }
            StatusCode::Playing => PlaybackState::Playing,
            StatusCode::Paused => PlaybackState::Paused,
        };

        let Some(event) = self.registry.get_mut(id) else {
            return;
        };
        let previous = event.active;
        event.active = state;

        let confirmed = event.in_flight == Some(state);
        if confirmed {
            event.in_flight = None;
        } else if event.in_flight.is_none() && event.wanted != PlaybackState::Stopped {
            // Nothing of ours on the wire, so the daemon moved on its own
            event.wanted = state;
        }

        if previous != state && event.wanted != PlaybackState::Stopped {
            let notification = match state {
                PlaybackState::Paused => ClientEvent::Paused(id),
                _ => ClientEvent::Playing(id),
            };
            self.notifier.emit(notification);
        }

        if confirmed && event.wanted != event.active {
            self.issue_corrective(id);
        }
    }

    fn retire(&mut self, id: EventId, notification: ClientEvent) {
        match self.registry.remove(id) {
            Ok(_) => self.notifier.emit(notification),
            Err(e) => tracing::trace!("Not retiring event {}: {}", id, e),
        }
    }
}

fn target_of(control: Control) -> PlaybackState {
    match control {
        Control::Pause(true) => PlaybackState::Paused,
        Control::Pause(false) => PlaybackState::Playing,
        Control::Stop => PlaybackState::Stopped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ngf_bus::{BusCall, MockBus};
    use std::sync::mpsc;

    struct Harness {
        engine: Engine<MockBus>,
        bus: MockBus,
        inbound: mpsc::Receiver<BusEvent>,
        notifications: mpsc::Receiver<ClientEvent>,
    }

    impl Harness {
        fn connected() -> Self {
            let (bus, inbound) = MockBus::channel();
            let (notifier, notifications) = Notifier::channel();
            let mut engine = Engine::new(bus.clone(), notifier);
            assert!(engine.connect());

            let harness = Self {
                engine,
                bus,
                inbound,
                notifications,
            };
            assert_eq!(harness.drain(), vec![ClientEvent::ConnectionStatus(true)]);
            harness
        }

        /// Feed everything the mock daemon sent into the engine
        fn pump(&mut self) {
            while let Ok(event) = self.inbound.try_recv() {
                self.engine.dispatch(event);
            }
        }

        fn drain(&self) -> Vec<ClientEvent> {
            self.notifications.try_iter().collect()
        }

        fn play(&mut self, name: &str) -> (EventId, CallId) {
            let id = self.engine.play(name, &Properties::new()).unwrap();
            (id, self.bus.last_play().unwrap())
        }

        fn started(&mut self, name: &str, remote: u32) -> EventId {
            let (id, call) = self.play(name);
            self.bus.reply_play(call, remote);
            self.pump();
            self.bus.take_calls();
            id
        }

        fn event(&self, id: EventId) -> Event {
            self.engine.registry.get(id).cloned().unwrap()
        }
    }

    #[test]
    fn test_play_requires_link() {
        let (bus, _inbound) = MockBus::channel();
        let (notifier, _rx) = Notifier::channel();
        let mut engine = Engine::new(bus.clone(), notifier);

        assert_eq!(
            engine.play("ringtone", &Properties::new()),
            Err(ClientError::NotConnected)
        );
        assert!(bus.calls().is_empty());
        assert_eq!(engine.tracked_count(), 0);
    }

    #[test]
    fn test_play_passes_properties() {
        let mut h = Harness::connected();
        let props = Properties::new().with("media.vibra", false).unwrap();

        let id = h.engine.play("ringtone", &props).unwrap();
        assert_eq!(id.get(), 1);

        let call = h.bus.last_play().unwrap();
        assert!(h.bus.calls().contains(&BusCall::Play {
            call,
            name: "ringtone".to_string(),
            properties: props,
        }));
        assert_eq!(h.event(id).active, PlaybackState::New);
        assert_eq!(h.event(id).outstanding_call, Some(call));
    }

    #[test]
    fn test_rejected_play_does_not_consume_id() {
        let mut h = Harness::connected();
        h.bus.fail_next_watch();
        h.engine.disconnect();
        h.engine.connect();
        h.drain();

        assert!(matches!(
            h.engine.play("ringtone", &Properties::new()),
            Err(ClientError::NotConnected)
        ));
        assert!(h.engine.connect());
        assert_eq!(h.play("ringtone").0.get(), 1);
    }

    #[test]
    fn test_play_reply_starts_event() {
        let mut h = Harness::connected();
        let (id, call) = h.play("ringtone");

        h.bus.reply_play(call, 7);
        h.pump();

        assert_eq!(h.drain(), vec![ClientEvent::Playing(id)]);
        let event = h.event(id);
        assert_eq!(event.remote_id, Some(RemoteId::new(7)));
        assert_eq!(event.active, PlaybackState::Playing);
        assert_eq!(event.outstanding_call, None);
    }

    #[test]
    fn test_play_failure_removes_event() {
        let mut h = Harness::connected();
        let (id, call) = h.play("ringtone");

        h.bus.fail_play(
            call,
            BusError::MethodError {
                name: "org.freedesktop.DBus.Error.Failed".to_string(),
                message: "no such event".to_string(),
            },
        );
        h.pump();

        assert_eq!(h.drain(), vec![ClientEvent::Failed(id)]);
        assert_eq!(h.engine.tracked_count(), 0);

        // A duplicate reply to the same call is harmless
        h.bus.reply_play(call, 3);
        h.pump();
        assert!(h.drain().is_empty());
    }

    #[test]
    fn test_malformed_reply_fails_event() {
        let mut h = Harness::connected();
        let (id, call) = h.play("sms");

        h.bus
            .fail_play(call, BusError::MalformedReply("expected u".to_string()));
        h.pump();

        assert_eq!(h.drain(), vec![ClientEvent::Failed(id)]);
        assert_eq!(h.engine.tracked_count(), 0);
    }

    #[test]
    fn test_pause_issues_single_call() {
        let mut h = Harness::connected();
        let id = h.started("ringtone", 7);
        h.drain();

        assert!(h.engine.request(id.into(), PlaybackState::Paused));
        assert!(h.engine.request(id.into(), PlaybackState::Paused));
        assert_eq!(
            h.bus.control_calls(),
            vec![(RemoteId::new(7), Control::Pause(true))]
        );

        h.bus.reply_control(7, Control::Pause(true), Ok(()));
        h.bus.status(7, StatusCode::Paused);
        h.pump();

        assert_eq!(h.drain(), vec![ClientEvent::Paused(id)]);
        assert_eq!(h.event(id).in_flight, None);
    }

    #[test]
    fn test_request_while_in_flight_collapses() {
        let mut h = Harness::connected();
        let id = h.started("ringtone", 7);
        h.drain();

        h.engine.request(id.into(), PlaybackState::Paused);
        h.engine.request(id.into(), PlaybackState::Stopped);
        assert_eq!(h.bus.control_calls().len(), 1);

        // The pause lands, then the engine catches up with the stop
        h.bus.status(7, StatusCode::Paused);
        h.pump();
        assert_eq!(
            h.bus.control_calls(),
            vec![
                (RemoteId::new(7), Control::Pause(true)),
                (RemoteId::new(7), Control::Stop),
            ]
        );
        // Stop was requested, so the intermediate pause is not surfaced
        assert!(h.drain().is_empty());

        h.bus.status(7, StatusCode::Completed);
        h.pump();
        assert_eq!(h.drain(), vec![ClientEvent::Completed(id)]);
        assert_eq!(h.engine.tracked_count(), 0);
    }

    #[test]
    fn test_request_back_to_confirmed_state_reverts() {
        let mut h = Harness::connected();
        let id = h.started("ringtone", 7);
        h.drain();

        h.engine.request(id.into(), PlaybackState::Paused);
        h.engine.request(id.into(), PlaybackState::Playing);
        h.bus.status(7, StatusCode::Paused);
        h.pump();

        assert_eq!(
            h.bus.control_calls(),
            vec![
                (RemoteId::new(7), Control::Pause(true)),
                (RemoteId::new(7), Control::Pause(false)),
            ]
        );
        assert_eq!(h.drain(), vec![ClientEvent::Paused(id)]);

        h.bus.status(7, StatusCode::Playing);
        h.pump();
        assert_eq!(h.drain(), vec![ClientEvent::Playing(id)]);
        assert_eq!(h.event(id).in_flight, None);
    }

    #[test]
    fn test_stop_before_reply() {
        let mut h = Harness::connected();
        let (id, call) = h.play("sms");

        assert!(h.engine.request(id.into(), PlaybackState::Stopped));
        assert!(h.bus.control_calls().is_empty());
        assert_eq!(h.event(id).pending, Some(PlaybackState::Stopped));

        h.bus.reply_play(call, 9);
        h.pump();

        assert_eq!(
            h.bus.control_calls(),
            vec![(RemoteId::new(9), Control::Stop)]
        );
        assert!(h.drain().is_empty());

        h.bus.status(9, StatusCode::Playing);
        h.pump();
        assert!(h.drain().is_empty());
    }

    #[test]
    fn test_pending_is_overwritten() {
        let mut h = Harness::connected();
        let (id, call) = h.play("ringtone");

        h.engine.request(id.into(), PlaybackState::Paused);
        h.engine.request(id.into(), PlaybackState::Playing);
        assert_eq!(h.event(id).pending, Some(PlaybackState::Playing));

        h.bus.reply_play(call, 7);
        h.pump();

        assert!(h.bus.control_calls().is_empty());
        assert_eq!(h.drain(), vec![ClientEvent::Playing(id)]);
        assert_eq!(h.event(id).pending, None);
    }

    #[test]
    fn test_pending_pause_applied_after_reply() {
        let mut h = Harness::connected();
        let (id, call) = h.play("ringtone");

        h.engine.request(id.into(), PlaybackState::Paused);
        h.bus.reply_play(call, 7);
        h.pump();

        assert_eq!(h.drain(), vec![ClientEvent::Playing(id)]);
        assert_eq!(
            h.bus.control_calls(),
            vec![(RemoteId::new(7), Control::Pause(true))]
        );
        assert_eq!(h.event(id).wanted, PlaybackState::Paused);
    }

    #[test]
    fn test_duplicate_status_is_suppressed() {
        let mut h = Harness::connected();
        let id = h.started("ringtone", 7);
        assert_eq!(h.drain(), vec![ClientEvent::Playing(id)]);

        h.bus.status(7, StatusCode::Playing);
        h.bus.status(7, StatusCode::Playing);
        h.pump();
        assert!(h.drain().is_empty());
    }

    #[test]
    fn test_daemon_initiated_pause_is_accepted() {
        let mut h = Harness::connected();
        let id = h.started("ringtone", 7);
        h.drain();

        h.bus.status(7, StatusCode::Paused);
        h.pump();

        assert_eq!(h.drain(), vec![ClientEvent::Paused(id)]);
        assert!(h.bus.control_calls().is_empty());
        assert_eq!(h.event(id).wanted, PlaybackState::Paused);

        // Resuming from there is a real change
        assert!(h.engine.request(id.into(), PlaybackState::Playing));
        assert_eq!(
            h.bus.control_calls(),
            vec![(RemoteId::new(7), Control::Pause(false))]
        );
    }

    #[test]
    fn test_unknown_status_code_fails_event() {
        let mut h = Harness::connected();
        let id = h.started("ringtone", 7);
        h.drain();

        h.bus.raw_status(7, 42);
        h.pump();

        assert_eq!(h.drain(), vec![ClientEvent::Failed(id)]);
        assert_eq!(h.engine.tracked_count(), 0);
    }

    #[test]
    fn test_stale_status_is_ignored() {
        let mut h = Harness::connected();
        let id = h.started("ringtone", 7);
        h.drain();

        h.bus.status(7, StatusCode::Completed);
        h.bus.status(7, StatusCode::Playing);
        h.bus.status(7, StatusCode::Failed);
        h.bus.status(1234, StatusCode::Paused);
        h.pump();

        assert_eq!(h.drain(), vec![ClientEvent::Completed(id)]);
        assert!(!h.engine.request(id.into(), PlaybackState::Stopped));
        assert!(h.bus.control_calls().is_empty());
    }

    #[test]
    fn test_control_failure_is_not_retried() {
        let mut h = Harness::connected();
        let id = h.started("ringtone", 7);
        h.drain();

        h.engine.request(id.into(), PlaybackState::Paused);
        h.bus.reply_control(
            7,
            Control::Pause(true),
            Err(BusError::Connection("broken pipe".to_string())),
        );
        h.pump();

        let event = h.event(id);
        assert_eq!(event.in_flight, None);
        assert_eq!(event.wanted, PlaybackState::Playing);
        assert_eq!(h.bus.control_calls().len(), 1);
        assert!(h.drain().is_empty());

        // The caller can ask again
        h.engine.request(id.into(), PlaybackState::Paused);
        assert_eq!(h.bus.control_calls().len(), 2);
    }

    #[test]
    fn test_control_failure_moves_on_to_newer_request() {
        let mut h = Harness::connected();
        let id = h.started("ringtone", 7);

        h.engine.request(id.into(), PlaybackState::Paused);
        h.engine.request(id.into(), PlaybackState::Stopped);
        h.bus.reply_control(
            7,
            Control::Pause(true),
            Err(BusError::Connection("timeout".to_string())),
        );
        h.pump();

        assert_eq!(
            h.bus.control_calls(),
            vec![
                (RemoteId::new(7), Control::Pause(true)),
                (RemoteId::new(7), Control::Stop),
            ]
        );
        assert_eq!(h.event(id).in_flight, Some(PlaybackState::Stopped));
    }

    #[test]
    fn test_request_by_name_fans_out() {
        let mut h = Harness::connected();
        let first = h.started("ringtone", 7);
        let second = h.started("ringtone", 8);
        let other = h.started("sms", 9);
        h.drain();

        assert!(h.engine.request("ringtone".into(), PlaybackState::Stopped));
        assert!(!h.engine.request("alarm".into(), PlaybackState::Stopped));

        let mut calls = h.bus.control_calls();
        calls.sort_by_key(|(remote, _)| *remote);
        assert_eq!(
            calls,
            vec![
                (RemoteId::new(7), Control::Stop),
                (RemoteId::new(8), Control::Stop),
            ]
        );
        assert_eq!(h.event(first).wanted, PlaybackState::Stopped);
        assert_eq!(h.event(second).wanted, PlaybackState::Stopped);
        assert_eq!(h.event(other).wanted, PlaybackState::Playing);
    }

    #[test]
    fn test_reused_remote_id_evicts_stale_event() {
        let mut h = Harness::connected();
        let old = h.started("ringtone", 7);
        h.drain();

        let (new, call) = h.play("sms");
        h.bus.reply_play(call, 7);
        h.pump();

        assert_eq!(
            h.drain(),
            vec![ClientEvent::Failed(old), ClientEvent::Playing(new)]
        );
        assert_eq!(
            h.engine.registry.find_by_remote_id(RemoteId::new(7)),
            Some(new)
        );
    }

    #[test]
    fn test_service_loss_drops_events_silently() {
        let mut h = Harness::connected();
        h.started("ringtone", 7);
        h.play("sms");
        h.drain();

        h.bus.service_unregistered();
        h.bus.status(7, StatusCode::Failed);
        h.pump();

        assert_eq!(h.drain(), vec![ClientEvent::ConnectionStatus(false)]);
        assert_eq!(h.engine.tracked_count(), 0);
        assert!(!h.engine.is_connected());

        // Requests can still be queued while the daemon is away
        assert!(h.engine.play("ringtone", &Properties::new()).is_ok());
    }
}
