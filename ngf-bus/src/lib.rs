//! # ngf-bus
//!
//! Transport layer for the non-graphic feedback daemon (ngfd) client.
//!
//! The daemon exposes three methods and one signal on
//! `com.nokia.NonGraphicFeedback1`:
//!
//! | Member | Kind | Arguments |
//! |---|---|---|
//! | `Play` | method | `(name: s, properties: a{sv}) -> u` |
//! | `Pause` | method | `(id: u, pause: b)` |
//! | `Stop` | method | `(id: u)` |
//! | `Status` | signal | `(id: u, state: u)` |
//!
//! This crate hides the bus behind the [`BusTransport`] trait. Requests are
//! queued without blocking; replies, `Status` signals and daemon presence
//! changes all come back as [`BusEvent`]s on a single channel.
//!
//! - [`DbusTransport`] talks to the real daemon through zbus (feature `dbus`, on by default)
//! - `MockBus` records requests and plays the daemon in tests (feature `test-support`)

pub mod config;
pub mod error;
pub mod properties;
pub mod transport;
pub mod types;

#[cfg(feature = "dbus")]
pub mod dbus;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

pub use config::{BusKind, DbusConfig};
pub use error::{BusError, Result};
pub use properties::{Properties, PropertyValue};
pub use transport::{BusEvent, BusTransport, EventSink};
pub use types::{CallId, Control, RemoteId, StatusCode, UnknownStatusCode};

#[cfg(feature = "dbus")]
pub use dbus::DbusTransport;

#[cfg(any(test, feature = "test-support"))]
pub use mock::{BusCall, MockBus};
