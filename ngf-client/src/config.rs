//! Configuration for the feedback client

use std::time::Duration;

use ngf_bus::{BusKind, DbusConfig};

use crate::error::{ClientError, Result};

/// Configuration for [`NgfClient`](crate::NgfClient)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Where the daemon lives on the bus
    pub dbus: DbusConfig,

    /// How often the dispatcher thread checks whether the client is gone
    /// Default: 100 milliseconds
    pub dispatch_poll_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            dbus: DbusConfig::default(),
            dispatch_poll_interval: Duration::from_millis(100),
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Talk to a daemon on the session bus, e.g. a development instance
    pub fn session() -> Self {
        Self {
            dbus: DbusConfig {
                bus: BusKind::Session,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Defaults overridden by `NGF_BUS`, `NGF_SERVICE`, `NGF_PATH` and `NGF_INTERFACE`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(bus) = lookup("NGF_BUS") {
            config.dbus.bus = bus
                .parse()
                .map_err(|e| ClientError::Configuration(format!("NGF_BUS: {}", e)))?;
        }
        if let Some(service) = lookup("NGF_SERVICE") {
            config.dbus.destination = service;
        }
        if let Some(path) = lookup("NGF_PATH") {
            config.dbus.path = path;
        }
        if let Some(interface) = lookup("NGF_INTERFACE") {
            config.dbus.interface = interface;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<()> {
        if self.dbus.destination.is_empty() {
            return Err(ClientError::Configuration(
                "Service name must not be empty".to_string(),
            ));
        }

        if !self.dbus.path.starts_with('/') {
            return Err(ClientError::Configuration(format!(
                "Object path must be absolute: '{}'",
                self.dbus.path
            )));
        }

        if self.dbus.interface.is_empty() || !self.dbus.interface.contains('.') {
            return Err(ClientError::Configuration(format!(
                "Invalid interface name: '{}'",
                self.dbus.interface
            )));
        }

        if self.dispatch_poll_interval == Duration::ZERO {
            return Err(ClientError::Configuration(
                "Dispatch poll interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn with_bus(mut self, bus: BusKind) -> Self {
        self.dbus.bus = bus;
        self
    }

    pub fn with_service(mut self, destination: impl Into<String>) -> Self {
        self.dbus.destination = destination.into();
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.dbus.path = path.into();
        self
    }

    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.dbus.interface = interface.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.dispatch_poll_interval = interval;
        self
    }
}
