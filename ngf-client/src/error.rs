use ngf_bus::BusError;
use thiserror::Error;

use crate::event::EventId;
use crate::theme::ThemeEffect;

/// Errors returned by the feedback client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// `play` was called before `connect()` established a bus link
    #[error("Not connected to the feedback daemon")]
    NotConnected,

    /// The transport refused to queue the request
    #[error("Request rejected by the transport: {0}")]
    Rejected(#[from] BusError),

    /// Registry bookkeeping failed
    #[error("Event registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Every local event id has been handed out
    #[error("Local event ids exhausted")]
    IdsExhausted,

    /// Invalid client configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The dispatcher thread could not be started
    #[error("Failed to start dispatcher thread: {0}")]
    Dispatcher(String),

    /// The theme effect has no daemon event behind it
    #[error("Theme effect {0:?} has no feedback event")]
    UnsupportedEffect(ThemeEffect),
}

/// Errors from the event registry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// An event with this local id is already tracked
    #[error("Event {0} is already registered")]
    DuplicateLocalId(EventId),

    /// No event with this local id is tracked
    #[error("Event {0} not found")]
    NotFound(EventId),
}

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Result type for registry operations
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;
