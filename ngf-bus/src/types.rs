//! Identifiers, status codes and wire constants shared by every transport

use serde::{Deserialize, Serialize};

/// Well-known bus name of the feedback daemon
pub const SERVICE_NAME: &str = "com.nokia.NonGraphicFeedback1.Backend";
/// Object path the daemon exports its interface on
pub const OBJECT_PATH: &str = "/com/nokia/NonGraphicFeedback1";
/// Interface carrying the `Play`/`Pause`/`Stop` methods and the `Status` signal
pub const INTERFACE: &str = "com.nokia.NonGraphicFeedback1";

pub const METHOD_PLAY: &str = "Play";
pub const METHOD_PAUSE: &str = "Pause";
pub const METHOD_STOP: &str = "Stop";
pub const SIGNAL_STATUS: &str = "Status";

/// Event identifier assigned by the daemon in reply to `Play`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RemoteId(u32);

impl RemoteId {
    /// Create a new RemoteId with the given value
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for RemoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "remote-{}", self.0)
    }
}

/// Token correlating an asynchronous `Play` call with its reply
///
/// Handed out by the transport when the call is issued and carried back in
/// [`BusEvent::PlayReply`](crate::BusEvent::PlayReply).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(u64);

impl CallId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "call-{}", self.0)
    }
}

/// Event state reported by the daemon's `Status` signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusCode {
    Failed,
    Completed,
    Playing,
    Paused,
}

impl StatusCode {
    /// Raw value used on the wire
    pub fn as_u32(&self) -> u32 {
        match self {
            StatusCode::Failed => 0,
            StatusCode::Completed => 1,
            StatusCode::Playing => 2,
            StatusCode::Paused => 3,
        }
    }

    /// Whether the daemon has retired the event
    pub fn is_terminal(&self) -> bool {
        matches!(self, StatusCode::Failed | StatusCode::Completed)
    }
}

/// A status value outside the known range; the daemon API has likely changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownStatusCode(pub u32);

impl std::fmt::Display for UnknownStatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown status code {}", self.0)
    }
}

impl std::error::Error for UnknownStatusCode {}

impl TryFrom<u32> for StatusCode {
    type Error = UnknownStatusCode;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(StatusCode::Failed),
            1 => Ok(StatusCode::Completed),
            2 => Ok(StatusCode::Playing),
            3 => Ok(StatusCode::Paused),
            other => Err(UnknownStatusCode(other)),
        }
    }
}

/// A fire-and-forget control call on an already started event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    /// `Pause(remote_id, true)` pauses, `Pause(remote_id, false)` resumes
    Pause(bool),
    /// `Stop(remote_id)`
    Stop,
}

impl Control {
    /// Bus method this control request is sent as
    pub fn method(&self) -> &'static str {
        match self {
            Control::Pause(_) => METHOD_PAUSE,
            Control::Stop => METHOD_STOP,
        }
    }
}

impl std::fmt::Display for Control {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Control::Pause(pause) => write!(f, "{}({})", METHOD_PAUSE, pause),
            Control::Stop => f.write_str(METHOD_STOP),
        }
    }
}
