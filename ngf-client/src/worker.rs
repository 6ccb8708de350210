//! Background dispatcher thread
//!
//! Drains the transport's inbound channel and applies every event to the
//! engine under its lock, one at a time. This is the only place inbound bus
//! traffic enters the engine, which keeps replies, signals and presence
//! changes strictly ordered.

use std::sync::{mpsc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ngf_bus::{BusEvent, BusTransport};
use parking_lot::Mutex;

use crate::engine::Engine;
use crate::error::{ClientError, Result};

/// Spawn the dispatcher thread
///
/// The thread holds only a weak reference to the engine and exits on its own
/// once the client that owns the engine is dropped; `poll_interval` bounds how
/// long that takes when the bus is quiet.
pub fn spawn_dispatcher<T: BusTransport>(
    engine: Weak<Mutex<Engine<T>>>,
    inbound: mpsc::Receiver<BusEvent>,
    poll_interval: Duration,
) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("ngf-dispatch".to_string())
        .spawn(move || run_dispatch_loop(engine, inbound, poll_interval))
        .map_err(|e| ClientError::Dispatcher(e.to_string()))
}

fn run_dispatch_loop<T: BusTransport>(
    engine: Weak<Mutex<Engine<T>>>,
    inbound: mpsc::Receiver<BusEvent>,
    poll_interval: Duration,
) {
    tracing::debug!("Dispatcher started");

    loop {
        match inbound.recv_timeout(poll_interval) {
            Ok(event) => {
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                tracing::trace!("Dispatch {:?}", event);
                engine.lock().dispatch(event);
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if engine.strong_count() == 0 {
                    break;
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                tracing::debug!("Inbound channel closed");
                break;
            }
        }
    }

    tracing::debug!("Dispatcher shut down");
}
