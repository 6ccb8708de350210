//! Property tests for the reconciliation engine
//!
//! These drive the engine directly and pump the mock daemon's replies by hand,
//! so every interleaving is deterministic.

use std::sync::mpsc;

use ngf_bus::{BusEvent, Control, MockBus, Properties, RemoteId, StatusCode};
use ngf_client::engine::Engine;
use ngf_client::notification::Notifier;
use ngf_client::{ClientEvent, EventId, PlaybackState};
use proptest::prelude::*;

struct Daemon {
    engine: Engine<MockBus>,
    bus: MockBus,
    inbound: mpsc::Receiver<BusEvent>,
    notifications: mpsc::Receiver<ClientEvent>,
}

impl Daemon {
    fn new() -> Self {
        let (bus, inbound) = MockBus::channel();
        let (notifier, notifications) = Notifier::channel();
        let mut engine = Engine::new(bus.clone(), notifier);
        engine.connect();
        let daemon = Self {
            engine,
            bus,
            inbound,
            notifications,
        };
        daemon.drain();
        daemon
    }

    fn pump(&mut self) {
        while let Ok(event) = self.inbound.try_recv() {
            self.engine.dispatch(event);
        }
    }

    fn drain(&self) -> Vec<ClientEvent> {
        self.notifications.try_iter().collect()
    }
}

fn target() -> impl Strategy<Value = PlaybackState> {
    prop_oneof![
        Just(PlaybackState::Playing),
        Just(PlaybackState::Paused),
        Just(PlaybackState::Stopped),
    ]
}

proptest! {
    #[test]
    fn ids_are_strictly_increasing(names in prop::collection::vec("[a-z_]{1,12}", 1..40)) {
        let mut daemon = Daemon::new();
        let mut last = 0u32;

        for name in &names {
            let id = daemon.engine.play(name, &Properties::new()).unwrap();
            prop_assert!(id.get() > last);
            last = id.get();
        }
        prop_assert_eq!(last as usize, names.len());
    }

    #[test]
    fn requests_before_reply_collapse_to_the_last(requests in prop::collection::vec(target(), 1..8)) {
        let mut daemon = Daemon::new();
        let id = daemon.engine.play("ringtone", &Properties::new()).unwrap();
        let call = daemon.bus.last_play().unwrap();

        for target in &requests {
            prop_assert!(daemon.engine.request(id.into(), *target));
        }
        prop_assert!(daemon.bus.control_calls().is_empty());

        daemon.bus.reply_play(call, 7);
        daemon.pump();

        let last = *requests.last().unwrap();
        let expected_calls = match last {
            PlaybackState::Playing => vec![],
            PlaybackState::Paused => vec![(RemoteId::new(7), Control::Pause(true))],
            _ => vec![(RemoteId::new(7), Control::Stop)],
        };
        prop_assert_eq!(daemon.bus.control_calls(), expected_calls);

        let notifications = daemon.drain();
        if last == PlaybackState::Stopped {
            prop_assert!(notifications.is_empty());
        } else {
            prop_assert_eq!(notifications, vec![ClientEvent::Playing(id)]);
        }
    }

    #[test]
    fn repeated_status_is_reported_once(statuses in prop::collection::vec(any::<bool>(), 1..20)) {
        let mut daemon = Daemon::new();
        let id = daemon.engine.play("ringtone", &Properties::new()).unwrap();
        daemon.bus.reply_play(daemon.bus.last_play().unwrap(), 7);

        for playing in &statuses {
            let status = if *playing { StatusCode::Playing } else { StatusCode::Paused };
            daemon.bus.status(7, status);
        }
        daemon.pump();

        let notifications = daemon.drain();
        for pair in notifications.windows(2) {
            prop_assert_ne!(pair[0], pair[1]);
        }
        prop_assert_eq!(notifications.first(), Some(&ClientEvent::Playing(id)));
        prop_assert!(daemon.bus.control_calls().is_empty());
    }

    #[test]
    fn at_most_one_corrective_call_in_flight(requests in prop::collection::vec(target(), 1..12)) {
        let mut daemon = Daemon::new();
        let id = daemon.engine.play("ringtone", &Properties::new()).unwrap();
        daemon.bus.reply_play(daemon.bus.last_play().unwrap(), 7);
        daemon.pump();

        for target in &requests {
            daemon.engine.request(id.into(), *target);
        }
        prop_assert!(daemon.bus.control_calls().len() <= 1);
    }

    #[test]
    fn nothing_after_terminal_status(
        completed in any::<bool>(),
        trailing in prop::collection::vec(0u32..6, 0..10),
    ) {
        let mut daemon = Daemon::new();
        let id = daemon.engine.play("ringtone", &Properties::new()).unwrap();
        daemon.bus.reply_play(daemon.bus.last_play().unwrap(), 7);
        daemon.pump();
        daemon.drain();

        let terminal = if completed { StatusCode::Completed } else { StatusCode::Failed };
        daemon.bus.status(7, terminal);
        for code in &trailing {
            daemon.bus.raw_status(7, *code);
        }
        daemon.pump();

        let expected = if completed { ClientEvent::Completed(id) } else { ClientEvent::Failed(id) };
        prop_assert_eq!(daemon.drain(), vec![expected]);
        prop_assert_eq!(daemon.engine.tracked_count(), 0);
        prop_assert!(!daemon.engine.request(EventId::new(id.get()).unwrap().into(), PlaybackState::Stopped));
    }
}
