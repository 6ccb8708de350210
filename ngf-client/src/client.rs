//! Sync-first feedback client
//!
//! Provides a fully synchronous API for playing feedback events. Bus traffic
//! is handled by the transport's own runtime and a background dispatcher
//! thread; results come back through [`NgfClient::events`].

use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;

use ngf_bus::{BusEvent, BusTransport, DbusTransport, Properties};
use parking_lot::Mutex;

use crate::config::ClientConfig;
use crate::engine::Engine;
use crate::error::{ClientError, Result};
use crate::event::{ClientEvent, EventId, EventRef, EventSnapshot, PlaybackState};
use crate::iter::ClientEventIterator;
use crate::notification::Notifier;
use crate::theme::{ThemeEffect, HAPTIC_ALERT_EVENT, HAPTIC_DURATION_PROPERTY};
use crate::worker::spawn_dispatcher;

/// Client for the non-graphic feedback daemon
///
/// All methods are non-blocking: `play`, `pause`, `resume` and `stop` queue a
/// request and return, and the daemon's answers arrive later as
/// [`ClientEvent`]s.
///
/// # Example
///
/// ```rust,ignore
/// use ngf_client::{ClientEvent, NgfClient};
///
/// let client = NgfClient::new()?;
/// client.connect();
///
/// let id = client.play("ringtone")?;
/// for event in client.events() {
///     match event {
///         ClientEvent::Completed(done) | ClientEvent::Failed(done) if done == id => break,
///         other => println!("{}", other),
///     }
/// }
/// ```
pub struct NgfClient<T: BusTransport = DbusTransport> {
    engine: Arc<Mutex<Engine<T>>>,

    /// Receive notifications produced by the engine
    notifications: Arc<Mutex<mpsc::Receiver<ClientEvent>>>,

    /// Dispatcher thread handle (kept alive)
    _dispatcher: JoinHandle<()>,
}

impl NgfClient<DbusTransport> {
    /// Create a client for the daemon on the system bus
    ///
    /// No bus connection is made until [`connect`](Self::connect).
    pub fn new() -> Result<Self> {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_config(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let (inbound_tx, inbound_rx) = mpsc::channel();
        let transport = DbusTransport::new(config.dbus.clone(), inbound_tx)?;
        Self::build(transport, inbound_rx, config.dispatch_poll_interval)
    }
}

impl<T: BusTransport> NgfClient<T> {
    /// Create a client on top of any transport
    ///
    /// `inbound` must be the receiving end of the sink the transport delivers
    /// its [`BusEvent`]s to.
    pub fn with_transport(transport: T, inbound: mpsc::Receiver<BusEvent>) -> Result<Self> {
        Self::build(
            transport,
            inbound,
            ClientConfig::default().dispatch_poll_interval,
        )
    }

    fn build(
        transport: T,
        inbound: mpsc::Receiver<BusEvent>,
        poll_interval: Duration,
    ) -> Result<Self> {
        let (notifier, notifications) = Notifier::channel();
        let engine = Arc::new(Mutex::new(Engine::new(transport, notifier)));
        let dispatcher = spawn_dispatcher(Arc::downgrade(&engine), inbound, poll_interval)?;

        Ok(Self {
            engine,
            notifications: Arc::new(Mutex::new(notifications)),
            _dispatcher: dispatcher,
        })
    }

    /// Subscribe to the daemon's presence and status signals
    ///
    /// Idempotent. Returns whether the subscriptions are in place.
    pub fn connect(&self) -> bool {
        self.engine.lock().connect()
    }

    /// Drop the subscriptions and every tracked event
    pub fn disconnect(&self) {
        self.engine.lock().disconnect();
    }

    pub fn is_connected(&self) -> bool {
        self.engine.lock().is_connected()
    }

    /// Play an event with no extra properties
    pub fn play(&self, event: &str) -> Result<EventId> {
        self.play_with(event, &Properties::new())
    }

    /// Play an event with extra properties for the daemon
    pub fn play_with(&self, event: &str, properties: &Properties) -> Result<EventId> {
        self.engine.lock().play(event, properties)
    }

    /// Pause one event, or every event with a name
    ///
    /// Returns whether at least one tracked event matched.
    pub fn pause(&self, event: impl Into<EventRef>) -> bool {
        self.engine.lock().request(event.into(), PlaybackState::Paused)
    }

    pub fn resume(&self, event: impl Into<EventRef>) -> bool {
        self.engine.lock().request(event.into(), PlaybackState::Playing)
    }

    pub fn stop(&self, event: impl Into<EventRef>) -> bool {
        self.engine.lock().request(event.into(), PlaybackState::Stopped)
    }

    /// Play the daemon event behind a theme effect
    pub fn play_effect(&self, effect: ThemeEffect) -> Result<EventId> {
        let name = effect
            .event_name()
            .ok_or(ClientError::UnsupportedEffect(effect))?;
        self.play(name)
    }

    /// Play a plain vibration of the given length
    pub fn play_haptic(&self, duration: Duration) -> Result<EventId> {
        let millis = u32::try_from(duration.as_millis()).unwrap_or(u32::MAX);
        let properties = Properties::new().with(HAPTIC_DURATION_PROPERTY, millis)?;
        self.play_with(HAPTIC_ALERT_EVENT, &properties)
    }

    /// Get a blocking iterator over notifications
    ///
    /// All iterators share one queue: each notification is delivered once.
    pub fn events(&self) -> ClientEventIterator {
        ClientEventIterator::new(Arc::clone(&self.notifications))
    }

    /// Number of events currently tracked
    pub fn tracked_count(&self) -> usize {
        self.engine.lock().tracked_count()
    }

    /// Read-only view of every tracked event
    pub fn snapshot(&self) -> Vec<EventSnapshot> {
        self.engine.lock().snapshot()
    }
}

impl<T: BusTransport> Drop for NgfClient<T> {
    fn drop(&mut self) {
        let mut engine = self.engine.lock();
        tracing::debug!(
            "NgfClient dropping, {} events still tracked",
            engine.tracked_count()
        );
        engine.disconnect();
    }
}
