//! In-memory transport for tests
//!
//! `MockBus` records every outbound request and lets a test play the daemon:
//! answer `Play` calls, broadcast `Status` signals and toggle service presence.
//! Clones share state, so a test can keep one handle while the client owns
//! the other.

use std::sync::{mpsc, Arc, Mutex, MutexGuard};

use crate::error::{BusError, Result};
use crate::properties::Properties;
use crate::transport::{deliver, BusEvent, BusTransport, EventSink};
use crate::types::{CallId, Control, RemoteId, StatusCode};

/// An outbound request observed by the mock
#[derive(Debug, Clone, PartialEq)]
pub enum BusCall {
    WatchService,
    SubscribeStatus,
    Unwatch,
    Play {
        call: CallId,
        name: String,
        properties: Properties,
    },
    Control {
        remote_id: RemoteId,
        control: Control,
    },
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<BusCall>,
    next_call: u64,
    linked: bool,
    fail_next_watch: bool,
}

/// Recording transport that stands in for the daemon
#[derive(Debug, Clone)]
pub struct MockBus {
    state: Arc<Mutex<MockState>>,
    sink: EventSink,
}

impl MockBus {
    pub fn new(sink: EventSink) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            sink,
        }
    }

    /// Create a mock together with the receiving end of its event channel
    pub fn channel() -> (Self, mpsc::Receiver<BusEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self::new(tx), rx)
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the calls from the others
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every request recorded so far
    pub fn calls(&self) -> Vec<BusCall> {
        self.state().calls.clone()
    }

    /// Drain the recorded requests
    pub fn take_calls(&self) -> Vec<BusCall> {
        std::mem::take(&mut self.state().calls)
    }

    /// Recorded `Pause`/`Stop` requests only
    pub fn control_calls(&self) -> Vec<(RemoteId, Control)> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                BusCall::Control { remote_id, control } => Some((*remote_id, *control)),
                _ => None,
            })
            .collect()
    }

    /// Call id of the most recent `Play` request
    pub fn last_play(&self) -> Option<CallId> {
        self.state().calls.iter().rev().find_map(|call| match call {
            BusCall::Play { call, .. } => Some(*call),
            _ => None,
        })
    }

    /// Whether `watch_service()` succeeded and `unwatch()` has not been called
    pub fn is_linked(&self) -> bool {
        self.state().linked
    }

    /// Make the next `watch_service()` fail as if the bus were unreachable
    pub fn fail_next_watch(&self) {
        self.state().fail_next_watch = true;
    }

    // ------------------------------------------------------------------------
    // Daemon side
    // ------------------------------------------------------------------------

    pub fn reply_play(&self, call: CallId, remote_id: u32) {
        deliver(
            &self.sink,
            BusEvent::PlayReply {
                call,
                result: Ok(RemoteId::new(remote_id)),
            },
        );
    }

    pub fn fail_play(&self, call: CallId, error: BusError) {
        deliver(
            &self.sink,
            BusEvent::PlayReply {
                call,
                result: Err(error),
            },
        );
    }

    pub fn reply_control(&self, remote_id: u32, control: Control, result: Result<()>) {
        deliver(
            &self.sink,
            BusEvent::ControlReply {
                remote_id: RemoteId::new(remote_id),
                control,
                result,
            },
        );
    }

    pub fn status(&self, remote_id: u32, status: StatusCode) {
        self.raw_status(remote_id, status.as_u32());
    }

    pub fn raw_status(&self, remote_id: u32, code: u32) {
        deliver(
            &self.sink,
            BusEvent::Status {
                remote_id: RemoteId::new(remote_id),
                code,
            },
        );
    }

    pub fn service_unregistered(&self) {
        deliver(&self.sink, BusEvent::ServiceUnregistered);
    }

    pub fn service_registered(&self) {
        deliver(&self.sink, BusEvent::ServiceRegistered);
    }
}

impl BusTransport for MockBus {
    fn watch_service(&mut self) -> Result<()> {
        let mut state = self.state();
        state.calls.push(BusCall::WatchService);
        if std::mem::take(&mut state.fail_next_watch) {
            return Err(BusError::Connection("mock bus unreachable".to_string()));
        }
        state.linked = true;
        Ok(())
    }

    fn subscribe_status(&mut self) -> Result<()> {
        let mut state = self.state();
        if !state.linked {
            return Err(BusError::NotConnected);
        }
        state.calls.push(BusCall::SubscribeStatus);
        Ok(())
    }

    fn unwatch(&mut self) {
        let mut state = self.state();
        state.calls.push(BusCall::Unwatch);
        state.linked = false;
    }

    fn play(&mut self, name: &str, properties: &Properties) -> Result<CallId> {
        let mut state = self.state();
        if !state.linked {
            return Err(BusError::NotConnected);
        }
        state.next_call += 1;
        let call = CallId::new(state.next_call);
        state.calls.push(BusCall::Play {
            call,
            name: name.to_string(),
            properties: properties.clone(),
        });
        Ok(call)
    }

    fn control(&mut self, remote_id: RemoteId, control: Control) -> Result<()> {
        let mut state = self.state();
        if !state.linked {
            return Err(BusError::NotConnected);
        }
        state.calls.push(BusCall::Control { remote_id, control });
        Ok(())
    }
}
