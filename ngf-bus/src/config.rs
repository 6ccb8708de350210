//! Where to find the daemon on the bus

use crate::error::{BusError, Result};
use crate::types::{INTERFACE, OBJECT_PATH, SERVICE_NAME};

/// Which message bus to connect to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusKind {
    #[default]
    System,
    Session,
}

impl std::str::FromStr for BusKind {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "system" => Ok(BusKind::System),
            "session" => Ok(BusKind::Session),
            other => Err(BusError::Connection(format!("unknown bus kind '{}'", other))),
        }
    }
}

/// Coordinates of the daemon on the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbusConfig {
    pub bus: BusKind,
    pub destination: String,
    pub path: String,
    pub interface: String,
}

impl Default for DbusConfig {
    fn default() -> Self {
        Self {
            bus: BusKind::System,
            destination: SERVICE_NAME.to_string(),
            path: OBJECT_PATH.to_string(),
            interface: INTERFACE.to_string(),
        }
    }
}
