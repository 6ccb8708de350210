//! Error types for the bus transport

use thiserror::Error;

/// Errors that can occur while talking to the feedback daemon over the bus
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// No bus link is established (`watch_service()` was never called or failed)
    #[error("Not connected to the message bus")]
    NotConnected,

    /// Opening the bus connection or adding a match rule failed
    #[error("Bus connection error: {0}")]
    Connection(String),

    /// The daemon answered a method call with an error reply
    #[error("Method call failed: {name}: {message}")]
    MethodError {
        /// D-Bus error name, e.g. `org.freedesktop.DBus.Error.InvalidArgs`
        name: String,
        /// Human readable message attached to the error reply
        message: String,
    },

    /// A reply arrived but its arguments did not have the expected shape
    #[error("Malformed reply: {0}")]
    MalformedReply(String),

    /// Property key rejected when building an event property map
    #[error("Invalid property key {0:?}")]
    InvalidPropertyKey(String),

    /// The transport's runtime could not be created or has gone away
    #[error("Transport runtime error: {0}")]
    Runtime(String),
}

/// Result type for bus operations
pub type Result<T> = std::result::Result<T, BusError>;
