//! # ngf-client
//!
//! A sync-first client for the non-graphic feedback daemon (ngfd), which plays
//! centrally configured sounds, vibrations and LED patterns by name.
//!
//! ## Overview
//!
//! Playing an event is fire-and-forget: [`NgfClient::play`] returns a local
//! [`EventId`] right away and the daemon assigns its own id later. The client
//! reconciles the two, keeps what the caller wants (`pause`, `resume`, `stop`)
//! in step with what the daemon reports, and surfaces the outcome as
//! [`ClientEvent`] notifications.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ngf_client::prelude::*;
//!
//! let client = NgfClient::new()?;
//! client.connect();
//!
//! let id = client.play("ringtone")?;
//! client.pause(id);
//! client.resume(id);
//! client.stop("ringtone");
//!
//! for event in client.events() {
//!     println!("{}", event);
//! }
//! ```
//!
//! ## Architecture
//!
//! 1. **Transport**: `ngf-bus` queues bus calls and turns replies, `Status`
//!    signals and daemon presence changes into events on one channel
//! 2. **Dispatcher**: a background thread applies those events in order
//! 3. **Engine**: one state machine per tracked event, at most one corrective
//!    call on the wire per event
//! 4. **Supervisor**: connectivity edges, and bulk removal of tracked events
//!    when the daemon leaves the bus

pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod handle;
pub mod iter;
pub mod notification;
pub mod registry;
pub mod supervisor;
pub mod theme;
pub mod worker;

// Re-export main types for convenience
pub use client::NgfClient;
pub use config::ClientConfig;
pub use error::{ClientError, RegistryError, Result};
pub use event::{ClientEvent, EventId, EventRef, EventSnapshot, PlaybackState};
pub use handle::{EventStatus, FeedbackEvent};
pub use iter::ClientEventIterator;
pub use theme::ThemeEffect;

// Re-export commonly used types from the transport
pub use ngf_bus::{BusKind, Properties, PropertyValue};

/// Prelude module for convenient imports
///
/// ```rust
/// use ngf_client::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        ClientConfig, ClientError, ClientEvent, ClientEventIterator, EventId, EventRef,
        EventStatus, FeedbackEvent, NgfClient, Properties, PropertyValue, Result, ThemeEffect,
    };
}
