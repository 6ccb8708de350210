//! D-Bus transport backed by zbus
//!
//! The zbus connection lives on a dedicated `ngf-dbus` thread that owns its
//! own tokio runtime. [`DbusTransport`] is only a handle: it sends
//! [`Command`]s to that thread and, for the subscription commands, waits for
//! the acknowledgement on a std channel. Method replies, the `Status` signal
//! and name-owner changes are forwarded to the [`EventSink`] as [`BusEvent`]s.
//!
//! No runtime is entered or dropped on the caller's thread, so the handle can
//! be used from plain threads and from async code alike.

use std::collections::HashMap;
use std::sync::mpsc as std_mpsc;
use std::thread::{self, JoinHandle};

use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use zbus::zvariant::Value;
use zbus::{Connection, Proxy};

use crate::config::{BusKind, DbusConfig};
use crate::error::{BusError, Result};
use crate::properties::{Properties, PropertyValue};
use crate::transport::{deliver, BusEvent, BusTransport, EventSink};
use crate::types::{CallId, Control, RemoteId, METHOD_PLAY, SIGNAL_STATUS};

type Ack = std_mpsc::Sender<Result<()>>;

/// Requests from the [`DbusTransport`] handle to the bus thread
#[derive(Debug)]
pub(crate) enum Command {
    /// Open the link, watch the daemon's name and subscribe to `Status`
    Watch { ack: Ack },
    /// Re-bind the `Status` subscription
    Subscribe { ack: Ack },
    /// Drop subscriptions and the link
    Unwatch,
    Play {
        call: CallId,
        name: String,
        properties: HashMap<String, Value<'static>>,
    },
    Control {
        remote_id: RemoteId,
        control: Control,
    },
}

/// zbus implementation of [`BusTransport`]
pub struct DbusTransport {
    config: DbusConfig,
    commands: mpsc::UnboundedSender<Command>,
    linked: bool,
    next_call: u64,
    _worker: JoinHandle<()>,
}

impl DbusTransport {
    /// Start the bus thread; no bus connection is made until `watch_service()`
    pub fn new(config: DbusConfig, sink: EventSink) -> Result<Self> {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let worker = spawn_bus_worker(config.clone(), command_rx, sink)?;

        Ok(Self {
            config,
            commands,
            linked: false,
            next_call: 0,
            _worker: worker,
        })
    }

    pub fn config(&self) -> &DbusConfig {
        &self.config
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| BusError::Runtime("bus thread has stopped".to_string()))
    }

    /// Send a subscription command and wait for the bus thread to answer
    fn request(&self, command: impl FnOnce(Ack) -> Command) -> Result<()> {
        let (ack, done) = std_mpsc::channel();
        self.send(command(ack))?;
        done.recv()
            .map_err(|_| BusError::Runtime("bus thread dropped the request".to_string()))?
    }

    fn ensure_linked(&self) -> Result<()> {
        if self.linked {
            Ok(())
        } else {
            Err(BusError::NotConnected)
        }
    }
}

impl BusTransport for DbusTransport {
    fn watch_service(&mut self) -> Result<()> {
        self.request(|ack| Command::Watch { ack })?;
        self.linked = true;
        Ok(())
    }

    fn subscribe_status(&mut self) -> Result<()> {
        self.ensure_linked()?;
        self.request(|ack| Command::Subscribe { ack })
    }

    fn unwatch(&mut self) {
        if !std::mem::take(&mut self.linked) {
            return;
        }
        if let Err(e) = self.send(Command::Unwatch) {
            tracing::trace!("Unwatch not delivered: {}", e);
        }
    }

    fn play(&mut self, name: &str, properties: &Properties) -> Result<CallId> {
        self.ensure_linked()?;
        let call = CallId::new(self.next_call + 1);
        self.send(Command::Play {
            call,
            name: name.to_string(),
            properties: to_variant_map(properties),
        })?;
        self.next_call += 1;
        Ok(call)
    }

    fn control(&mut self, remote_id: RemoteId, control: Control) -> Result<()> {
        self.ensure_linked()?;
        self.send(Command::Control { remote_id, control })
    }
}

impl Drop for DbusTransport {
    fn drop(&mut self) {
        // Closing the command channel ends the bus thread
        self.unwatch();
    }
}

/// Spawn the `ngf-dbus` thread and wait until its runtime is up
fn spawn_bus_worker(
    config: DbusConfig,
    commands: mpsc::UnboundedReceiver<Command>,
    sink: EventSink,
) -> Result<JoinHandle<()>> {
    let (ready_tx, ready_rx) = std_mpsc::channel();

    let worker = thread::Builder::new()
        .name("ngf-dbus".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    let _ = ready_tx.send(Err(BusError::Runtime(e.to_string())));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));

            runtime.block_on(run_bus_loop(config, commands, sink));
        })
        .map_err(|e| BusError::Runtime(e.to_string()))?;

    ready_rx
        .recv()
        .map_err(|_| BusError::Runtime("bus thread exited during startup".to_string()))??;
    Ok(worker)
}

/// State owned by the bus thread
struct BusLink {
    config: DbusConfig,
    sink: EventSink,
    proxy: Option<Proxy<'static>>,
    presence_task: Option<tokio::task::JoinHandle<()>>,
    status_task: Option<tokio::task::JoinHandle<()>>,
}

async fn run_bus_loop(
    config: DbusConfig,
    mut commands: mpsc::UnboundedReceiver<Command>,
    sink: EventSink,
) {
    let mut link = BusLink {
        config,
        sink,
        proxy: None,
        presence_task: None,
        status_task: None,
    };
    tracing::debug!("Bus thread started");

    while let Some(command) = commands.recv().await {
        match command {
            Command::Watch { ack } => {
                let _ = ack.send(link.watch().await);
            }
            Command::Subscribe { ack } => {
                let _ = ack.send(link.subscribe_status().await);
            }
            Command::Unwatch => link.unwatch(),
            Command::Play {
                call,
                name,
                properties,
            } => link.play(call, name, properties),
            Command::Control { remote_id, control } => link.control(remote_id, control),
        }
    }

    link.unwatch();
    tracing::debug!("Bus thread stopped");
}

impl BusLink {
    async fn open(&mut self) -> Result<Proxy<'static>> {
        if let Some(proxy) = &self.proxy {
            return Ok(proxy.clone());
        }

        let connection = match self.config.bus {
            BusKind::System => Connection::system().await,
            BusKind::Session => Connection::session().await,
        }
        .map_err(connection_error)?;

        let proxy = Proxy::new(
            &connection,
            self.config.destination.clone(),
            self.config.path.clone(),
            self.config.interface.clone(),
        )
        .await
        .map_err(connection_error)?;

        tracing::debug!(
            "Opened {:?} bus link to {}",
            self.config.bus,
            self.config.destination
        );
        self.proxy = Some(proxy.clone());
        Ok(proxy)
    }

    async fn watch(&mut self) -> Result<()> {
        let proxy = self.open().await?;
        if self.presence_task.is_none() {
            self.watch_presence(proxy).await?;
        }
        self.subscribe_status().await
    }

    async fn watch_presence(&mut self, proxy: Proxy<'static>) -> Result<()> {
        let sink = self.sink.clone();
        let (ready_tx, ready_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut owners = match proxy.receive_owner_changed().await {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(connection_error(e)));
                    return;
                }
            };

            while let Some(owner) = owners.next().await {
                let event = match owner {
                    Some(name) => {
                        tracing::debug!("Feedback daemon owner is now {}", name);
                        BusEvent::ServiceRegistered
                    }
                    None => BusEvent::ServiceUnregistered,
                };
                deliver(&sink, event);
            }
        });

        wait_ready(ready_rx).await?;
        self.presence_task = Some(task);
        Ok(())
    }

    async fn subscribe_status(&mut self) -> Result<()> {
        let proxy = self.proxy.clone().ok_or(BusError::NotConnected)?;
        if let Some(task) = self.status_task.take() {
            task.abort();
        }

        let sink = self.sink.clone();
        let (ready_tx, ready_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut statuses = match proxy.receive_signal(SIGNAL_STATUS).await {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(connection_error(e)));
                    return;
                }
            };

            while let Some(message) = statuses.next().await {
                match message.body().deserialize::<(u32, u32)>() {
                    Ok((remote_id, code)) => deliver(
                        &sink,
                        BusEvent::Status {
                            remote_id: RemoteId::new(remote_id),
                            code,
                        },
                    ),
                    Err(e) => tracing::warn!("Ignoring malformed {} signal: {}", SIGNAL_STATUS, e),
                }
            }
        });

        wait_ready(ready_rx).await?;
        self.status_task = Some(task);
        tracing::debug!("Subscribed to {} signals", SIGNAL_STATUS);
        Ok(())
    }

    fn unwatch(&mut self) {
        if let Some(task) = self.status_task.take() {
            task.abort();
        }
        if let Some(task) = self.presence_task.take() {
            task.abort();
        }
        if self.proxy.take().is_some() {
            tracing::debug!("Closed bus link to {}", self.config.destination);
        }
    }

    fn play(&self, call: CallId, name: String, properties: HashMap<String, Value<'static>>) {
        let sink = self.sink.clone();
        let Some(proxy) = self.proxy.clone() else {
            deliver(
                &sink,
                BusEvent::PlayReply {
                    call,
                    result: Err(BusError::NotConnected),
                },
            );
            return;
        };

        tokio::spawn(async move {
            let result = match proxy
                .call_method(METHOD_PLAY, &(name.as_str(), &properties))
                .await
            {
                Ok(reply) => reply
                    .body()
                    .deserialize::<u32>()
                    .map(RemoteId::new)
                    .map_err(|e| BusError::MalformedReply(e.to_string())),
                Err(e) => Err(call_error(e)),
            };
            deliver(&sink, BusEvent::PlayReply { call, result });
        });
    }

    fn control(&self, remote_id: RemoteId, control: Control) {
        let sink = self.sink.clone();
        let Some(proxy) = self.proxy.clone() else {
            deliver(
                &sink,
                BusEvent::ControlReply {
                    remote_id,
                    control,
                    result: Err(BusError::NotConnected),
                },
            );
            return;
        };
        let id = remote_id.as_u32();

        tokio::spawn(async move {
            let sent = match control {
                Control::Pause(pause) => proxy.call_method(control.method(), &(id, pause)).await,
                Control::Stop => proxy.call_method(control.method(), &id).await,
            };
            let result = sent.map(|_| ()).map_err(call_error);
            deliver(
                &sink,
                BusEvent::ControlReply {
                    remote_id,
                    control,
                    result,
                },
            );
        });
    }
}

async fn wait_ready(ready_rx: oneshot::Receiver<Result<()>>) -> Result<()> {
    ready_rx
        .await
        .map_err(|_| BusError::Runtime("subscription task ended early".to_string()))?
}

fn to_variant_map(properties: &Properties) -> HashMap<String, Value<'static>> {
    properties
        .iter()
        .map(|(key, value)| {
            let value = match value {
                PropertyValue::Bool(v) => Value::from(*v),
                PropertyValue::Int(v) => Value::from(*v),
                PropertyValue::UInt(v) => Value::from(*v),
                PropertyValue::Str(v) => Value::from(v.clone()),
            };
            (key.to_string(), value)
        })
        .collect()
}

fn connection_error(e: zbus::Error) -> BusError {
    BusError::Connection(e.to_string())
}

fn call_error(e: zbus::Error) -> BusError {
    match e {
        zbus::Error::MethodError(name, message, _) => BusError::MethodError {
            name: name.to_string(),
            message: message.unwrap_or_default(),
        },
        other => BusError::Connection(other.to_string()),
    }
}
