//! Event model shared by the registry, the engine and the facade

use std::num::NonZeroU32;

use ngf_bus::{CallId, RemoteId};
use serde::{Deserialize, Serialize};

/// Client-assigned handle for one playback request
///
/// Ids start at 1 and grow monotonically for the lifetime of the client;
/// zero is never a valid id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(NonZeroU32);

impl EventId {
    /// Wrap a raw id, `None` for zero
    pub fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(Self)
    }

    pub fn get(&self) -> u32 {
        self.0.get()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Target of a pause/resume/stop request: one event, or every event with a name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventRef {
    Id(EventId),
    Name(String),
}

impl From<EventId> for EventRef {
    fn from(id: EventId) -> Self {
        EventRef::Id(id)
    }
}

impl From<&str> for EventRef {
    fn from(name: &str) -> Self {
        EventRef::Name(name.to_string())
    }
}

impl From<String> for EventRef {
    fn from(name: String) -> Self {
        EventRef::Name(name)
    }
}

impl std::fmt::Display for EventRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventRef::Id(id) => write!(f, "event {}", id),
            EventRef::Name(name) => write!(f, "events named '{}'", name),
        }
    }
}

/// Playback state of a tracked event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    /// `Play` was sent, the daemon has not answered yet
    New,
    Playing,
    Paused,
    Stopped,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PlaybackState::New => "new",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// One tracked playback request, from `play` to its terminal status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: EventId,
    pub name: String,

    /// Daemon-side id, set once the `Play` reply arrives
    pub remote_id: Option<RemoteId>,

    /// Last state confirmed by the daemon
    pub active: PlaybackState,

    /// Last state requested by the caller
    pub wanted: PlaybackState,

    /// Request captured while `remote_id` was still unknown
    pub pending: Option<PlaybackState>,

    /// Target of the corrective call currently on the wire
    pub in_flight: Option<PlaybackState>,

    /// `Play` call waiting for its reply
    pub outstanding_call: Option<CallId>,
}

impl Event {
    /// A freshly requested event waiting for its `Play` reply
    pub fn new(id: EventId, name: impl Into<String>, call: CallId) -> Self {
        Self {
            id,
            name: name.into(),
            remote_id: None,
            active: PlaybackState::New,
            wanted: PlaybackState::Playing,
            pending: None,
            in_flight: None,
            outstanding_call: Some(call),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.remote_id.is_some()
    }

    pub fn snapshot(&self) -> EventSnapshot {
        EventSnapshot {
            id: self.id,
            name: self.name.clone(),
            remote_id: self.remote_id,
            active: self.active,
            wanted: self.wanted,
            pending: self.pending,
        }
    }
}

/// Read-only view of a tracked event for diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventSnapshot {
    pub id: EventId,
    pub name: String,
    pub remote_id: Option<RemoteId>,
    pub active: PlaybackState,
    pub wanted: PlaybackState,
    pub pending: Option<PlaybackState>,
}

/// Notification delivered to the client user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Connectivity to the daemon changed
    ConnectionStatus(bool),
    Playing(EventId),
    Paused(EventId),
    Completed(EventId),
    Failed(EventId),
}

impl ClientEvent {
    /// Event the notification is about, `None` for connectivity changes
    pub fn event_id(&self) -> Option<EventId> {
        match self {
            ClientEvent::ConnectionStatus(_) => None,
            ClientEvent::Playing(id)
            | ClientEvent::Paused(id)
            | ClientEvent::Completed(id)
            | ClientEvent::Failed(id) => Some(*id),
        }
    }

    /// Whether the event reached the end of its life
    pub fn is_terminal(&self) -> bool {
        matches!(self, ClientEvent::Completed(_) | ClientEvent::Failed(_))
    }
}

impl std::fmt::Display for ClientEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientEvent::ConnectionStatus(true) => write!(f, "connected"),
            ClientEvent::ConnectionStatus(false) => write!(f, "disconnected"),
            ClientEvent::Playing(id) => write!(f, "event {} playing", id),
            ClientEvent::Paused(id) => write!(f, "event {} paused", id),
            ClientEvent::Completed(id) => write!(f, "event {} completed", id),
            ClientEvent::Failed(id) => write!(f, "event {} failed", id),
        }
    }
}
