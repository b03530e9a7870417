//! The connection engine.
//!
//! [`Client`] owns at most one live transport. It opens it through a
//! [`Connector`], reads from it on a spawned task (see `read_loop`),
//! writes encoded lines to it, and reports everything that happens as
//! events on its [`EventBus`].
//!
//! Each public operation (`connect`, `send`, `disconnect`) first runs the
//! operation's interceptor chain (see [`crate::hooks`]); the engine
//! behavior below is the chain's default.
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected ──connect()──► Connecting ──ok──► Connected
//!       ▲                          │                 │
//!       └────────── error ─────────┘   disconnect() / EOF / read error
//!       └────────────────────────────────────────────┘
//! ```

mod read_loop;
mod transport;

pub use self::transport::{BoxedStream, Connector, Stream, TcpConnector};

use crate::config::Config;
use crate::error::{ClientError, ErrorCause, ErrorKind};
use crate::events::{Event, EventBus, ListenerId, Subscription, names};
use crate::hooks::{Hook, HookRegistry};
use crate::plugin::{Capabilities, Plugin, PluginContext, PluginError};
use crate::telemetry::spans;
use parking_lot::Mutex;
use slirc_proto::encode::{Terminator, encode_line};
use slirc_proto::Message;
use std::fmt;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, WriteHalf};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, trace};

// ============================================================================
// Operation arguments
// ============================================================================

/// Where the client is (or was last) connected.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RemoteAddr {
    pub hostname: String,
    pub port: u16,
    pub tls: bool,
    /// Request path, meaningful for WebSocket transports only.
    pub path: Option<String>,
}

impl RemoteAddr {
    pub fn new(hostname: impl Into<String>, port: u16, tls: bool) -> Self {
        Self {
            hostname: hostname.into(),
            port,
            tls,
            path: None,
        }
    }
}

impl fmt::Display for RemoteAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hostname, self.port)?;
        if let Some(path) = &self.path {
            f.write_str(path)?;
        }
        if self.tls {
            f.write_str(" (tls)")?;
        }
        Ok(())
    }
}

/// Transport options for [`Client::connect`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectOptions {
    pub tls: bool,
    pub path: Option<String>,
}

/// Arguments flowing through the `connect` chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectArgs {
    pub hostname: String,
    pub port: u16,
    pub options: ConnectOptions,
}

impl ConnectArgs {
    pub fn remote_addr(&self) -> RemoteAddr {
        RemoteAddr {
            hostname: self.hostname.clone(),
            port: self.port,
            tls: self.options.tls,
            path: self.options.path.clone(),
        }
    }
}

/// One outgoing parameter. `None` marks an absent parameter: trailing
/// absent ones are dropped and inner ones encode as empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param(pub Option<String>);

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Self(Some(value.to_owned()))
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Self(Some(value))
    }
}

impl From<&String> for Param {
    fn from(value: &String) -> Self {
        Self(Some(value.clone()))
    }
}

impl<T: Into<String>> From<Option<T>> for Param {
    fn from(value: Option<T>) -> Self {
        Self(value.map(Into::into))
    }
}

/// Arguments flowing through the `send` chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendArgs {
    pub command: String,
    pub params: Vec<Option<String>>,
}

impl SendArgs {
    pub fn new<I>(command: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Param>,
    {
        Self {
            command: command.into(),
            params: params.into_iter().map(|p| p.into().0).collect(),
        }
    }
}

/// Phase of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

// ============================================================================
// Client
// ============================================================================

struct Transport {
    id: u64,
    writer: WriteHalf<BoxedStream>,
    shutdown: CancellationToken,
}

/// Upper bound on a graceful transport release.
pub(crate) const RELEASE_TIMEOUT: Duration = Duration::from_secs(5);

/// Cancellation handle of the live transport, reachable without the
/// writer lock.
struct Live {
    id: u64,
    shutdown: CancellationToken,
}

#[derive(Default)]
struct State {
    phase: ConnectionState,
    remote_addr: RemoteAddr,
    live: Option<Live>,
}

struct Inner {
    config: Config,
    events: EventBus<Event>,
    hooks: HookRegistry,
    capabilities: Capabilities,
    connector: Arc<dyn Connector>,
    state: Mutex<State>,
    transport: tokio::sync::Mutex<Option<Transport>>,
    connecting: tokio::sync::Mutex<()>,
    closing: tokio::sync::Mutex<()>,
    next_transport_id: AtomicU64,
}

/// Handle to a client engine. Cheap to clone; clones share the engine.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Client")
            .field("state", &state.phase)
            .field("remote_addr", &state.remote_addr)
            .finish_non_exhaustive()
    }
}

/// Assembles a [`Client`] and installs its plugins.
pub struct ClientBuilder {
    config: Config,
    connector: Arc<dyn Connector>,
    plugins: Vec<Box<dyn Plugin>>,
}

impl ClientBuilder {
    /// Replace the default [`TcpConnector`].
    pub fn connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Arc::new(connector);
        self
    }

    /// Add a plugin. Plugins install in the order they are added.
    pub fn plugin(mut self, plugin: impl Plugin + 'static) -> Self {
        self.plugins.push(Box::new(plugin));
        self
    }

    /// Build the client and install every plugin.
    ///
    /// Listener counts are memorized once all plugins are installed; only
    /// `error` listeners added after that count as application handlers.
    pub fn build(self) -> Result<Client, PluginError> {
        let client = Client::from_parts(self.config, self.connector);

        for plugin in &self.plugins {
            let name = plugin.name();
            let mut ctx = PluginContext::new(&client, name);
            plugin.install(&mut ctx)?;
            client.inner.capabilities.add_plugin(name);
            debug!(plugin = name, "Plugin installed");
        }

        client.inner.events.memorize_listener_counts();
        Ok(client)
    }
}

impl Client {
    /// Client with the default connector and no plugins.
    pub fn new(config: Config) -> Self {
        let client = Self::from_parts(config, Arc::new(TcpConnector::new()));
        client.inner.events.memorize_listener_counts();
        client
    }

    pub fn builder(config: Config) -> ClientBuilder {
        ClientBuilder {
            config,
            connector: Arc::new(TcpConnector::new()),
            plugins: Vec::new(),
        }
    }

    fn from_parts(config: Config, connector: Arc<dyn Connector>) -> Self {
        let events = EventBus::new();
        events.create_multi_event(names::RAW, names::RAW_PREFIX);

        Self {
            inner: Arc::new(Inner {
                config,
                events,
                hooks: HookRegistry::new(),
                capabilities: Capabilities::default(),
                connector,
                state: Mutex::new(State::default()),
                transport: tokio::sync::Mutex::new(None),
                connecting: tokio::sync::Mutex::new(()),
                closing: tokio::sync::Mutex::new(()),
                next_transport_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn events(&self) -> &EventBus<Event> {
        &self.inner.events
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.inner.hooks
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.inner.capabilities
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.lock().phase
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Address of the current or most recent connection attempt.
    pub fn remote_addr(&self) -> RemoteAddr {
        self.inner.state.lock().remote_addr.clone()
    }

    /// Record the connection phase. Transport-replacing interceptors call
    /// this; the built-in transport maintains it itself.
    pub fn set_state(&self, phase: ConnectionState) {
        self.inner.state.lock().phase = phase;
    }

    pub fn set_remote_addr(&self, addr: RemoteAddr) {
        self.inner.state.lock().remote_addr = addr;
    }

    // ------------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------------

    pub fn on<F>(&self, name: &str, listener: F) -> Subscription<Event>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.inner.events.on(name, listener)
    }

    pub fn once<F>(&self, name: &str, listener: F) -> Subscription<Event>
    where
        F: FnOnce(&Event) + Send + 'static,
    {
        self.inner.events.once(name, listener)
    }

    /// Future for the next `name` event. Registered immediately.
    pub fn wait(&self, name: &str) -> impl Future<Output = Option<Event>> + Send + use<> {
        self.inner.events.wait(name)
    }

    pub fn off(&self, name: &str, id: ListenerId) -> bool {
        self.inner.events.off(name, id)
    }

    pub fn emit(&self, name: &str, event: &Event) {
        self.inner.events.emit(name, event);
    }

    /// Publish an inbound message as `raw:<COMMAND>` (and so `raw`).
    pub fn emit_raw(&self, message: Message) {
        trace!(command = %message.command, "<- {}", message);
        let name = message.event_name();
        self.emit(&name, &Event::Raw(Arc::new(message)));
    }

    /// Classify and publish an error.
    ///
    /// Silent conditions (see [`ClientError::is_silent`]) are dropped.
    ///
    /// # Panics
    ///
    /// Panics if no `error` listener was added beyond those present when
    /// plugins finished installing. Inside a transport reader the panic
    /// aborts the process (see [`Client::spawn_reader`]).
    pub fn emit_error(&self, kind: ErrorKind, cause: impl Into<ErrorCause>) {
        let err = ClientError::new(kind, cause);
        if err.is_silent() {
            debug!(kind = %kind, error = %err, "Absorbed transport error");
            return;
        }

        if !self.inner.events.has_unmemorized_listeners(names::ERROR) {
            error!(kind = %kind, code = err.error_code(), error = %err, "Unhandled client error");
            panic!("unhandled client error (no `error` listener registered): {err}");
        }

        debug!(kind = %kind, code = err.error_code(), error = %err, "Client error");
        self.emit(names::ERROR, &Event::Error(Arc::new(err)));
    }

    // ------------------------------------------------------------------------
    // Hooks and capabilities
    // ------------------------------------------------------------------------

    /// Install an interceptor. See [`crate::hooks`].
    pub fn hook_call(&self, hook: Hook) {
        self.inner.hooks.hook_call(hook);
    }

    /// Invoke a plugin-registered command.
    pub async fn command(&self, name: &str, args: Vec<String>) -> Result<Option<String>, PluginError> {
        let handler = self.inner.capabilities.command(name)?;
        Ok(handler(self.clone(), args).await)
    }

    // ------------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------------

    /// Open a connection. Returns the remote address on success; failures
    /// are reported as `connect` errors and yield `None`.
    pub async fn connect(
        &self,
        hostname: impl Into<String>,
        port: u16,
        options: ConnectOptions,
    ) -> Option<RemoteAddr> {
        let args = ConnectArgs {
            hostname: hostname.into(),
            port,
            options,
        };
        self.inner.hooks.connect.invoke(self.clone(), args).await
    }

    /// Encode and write one line. Returns the exact text written (with its
    /// terminator); failures are reported as `write` errors and yield `None`.
    ///
    /// ```no_run
    /// # async fn demo(client: slircc::Client) {
    /// client.send("PRIVMSG", ["#rust", "hello there"]).await;
    /// client.send("TOPIC", [Some("#rust"), None]).await;
    /// # }
    /// ```
    pub async fn send<I>(&self, command: impl Into<String>, params: I) -> Option<String>
    where
        I: IntoIterator,
        I::Item: Into<Param>,
    {
        self.send_args(SendArgs::new(command, params)).await
    }

    /// Send `parts[0]` as the command and the rest as parameters.
    pub async fn send_raw(&self, parts: &[&str]) -> Option<String> {
        let Some((command, params)) = parts.split_first() else {
            self.emit_error(ErrorKind::Write, "empty command");
            return None;
        };
        self.send(*command, params.iter().copied()).await
    }

    pub async fn send_args(&self, args: SendArgs) -> Option<String> {
        self.inner.hooks.send.invoke(self.clone(), args).await
    }

    /// Release the transport. No-op when not connected.
    pub async fn disconnect(&self) {
        self.inner.hooks.disconnect.invoke(self.clone(), ()).await
    }

    // ------------------------------------------------------------------------
    // Built-in behavior (chain defaults)
    // ------------------------------------------------------------------------

    pub(crate) async fn default_connect(&self, args: ConnectArgs) -> Option<RemoteAddr> {
        // At most one live transport: overlapping connects queue here.
        let _connecting = self.inner.connecting.lock().await;

        // The old connection goes first so its `disconnected` carries its
        // own address.
        self.close(None).await;

        let addr = args.remote_addr();
        {
            let mut state = self.inner.state.lock();
            state.remote_addr = addr.clone();
            state.phase = ConnectionState::Connecting;
        }
        info!(remote = %addr, "Connecting");
        self.emit(names::CONNECTING, &Event::Connecting(addr.clone()));

        let stream = match self.inner.connector.connect(&addr).await {
            Ok(stream) => stream,
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                self.emit_error(ErrorKind::Connect, e);
                return None;
            }
        };

        let id = self.inner.next_transport_id.fetch_add(1, Ordering::Relaxed);
        let (reader, writer) = tokio::io::split(stream);
        let shutdown = CancellationToken::new();
        {
            let mut transport = self.inner.transport.lock().await;
            *transport = Some(Transport {
                id,
                writer,
                shutdown: shutdown.clone(),
            });
            let mut state = self.inner.state.lock();
            state.live = Some(Live {
                id,
                shutdown: shutdown.clone(),
            });
            state.phase = ConnectionState::Connected;
        }
        info!(remote = %addr, transport = id, "Connected");
        self.emit(names::CONNECTED, &Event::Connected(addr.clone()));

        let span = spans::connection(id, &addr);
        let client = self.clone();
        Self::spawn_reader(
            self.clone().read_loop(id, reader, shutdown).instrument(span),
            move || async move { client.close(Some(id)).await },
        );

        Some(addr)
    }

    /// Run a transport reader on its own task.
    ///
    /// A panic in the reader (an error nobody listens for, or a panicking
    /// listener) releases the transport through `teardown` and then aborts
    /// the process.
    pub(crate) fn spawn_reader<R, T, F>(reader: R, teardown: T)
    where
        R: Future<Output = ()> + Send + 'static,
        T: FnOnce() -> F + Send + 'static,
        F: Future<Output = ()> + Send + 'static,
    {
        let task = tokio::spawn(reader);
        tokio::spawn(async move {
            let Err(e) = task.await else {
                return;
            };
            if !e.is_panic() {
                return;
            }
            // Teardown can hit the same unhandled error; abort either way.
            let _ = tokio::spawn(teardown()).await;
            error!("Transport reader panicked, aborting");
            std::process::abort();
        });
    }

    pub(crate) async fn default_send(&self, args: SendArgs) -> Option<String> {
        let mut guard = self.inner.transport.lock().await;
        let Some(transport) = guard.as_mut() else {
            drop(guard);
            self.emit_error(ErrorKind::Write, ErrorCause::NotConnected);
            return None;
        };

        let line = match encode_line(&args.command, args.params, Terminator::CrLf) {
            Ok(line) => line,
            Err(e) => {
                drop(guard);
                self.emit_error(ErrorKind::Write, e);
                return None;
            }
        };

        let shutdown = transport.shutdown.clone();
        let written = tokio::select! {
            biased;
            _ = shutdown.cancelled() => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "transport released during write",
            )),
            written = async {
                transport.writer.write_all(line.as_bytes()).await?;
                transport.writer.flush().await
            } => written,
        };
        drop(guard);

        match written {
            Ok(()) => {
                trace!("-> {}", line.trim_end_matches(['\r', '\n']));
                Some(line)
            }
            Err(e) => {
                self.emit_error(ErrorKind::Write, e);
                None
            }
        }
    }

    pub(crate) async fn default_disconnect(&self) {
        self.close(None).await;
    }

    /// Release the transport if present.
    ///
    /// With `only = Some(id)`, does nothing unless transport `id` is still
    /// the live one, so a stale read loop cannot close a newer connection.
    /// The transport is cancelled before the writer lock is taken, so a
    /// write stuck on a peer that stopped reading gives way. The handle is
    /// cleared even when the release fails; `disconnected` is published
    /// either way, after the `close` error if there was one.
    pub(crate) async fn close(&self, only: Option<u64>) {
        let _closing = self.inner.closing.lock().await;

        let live = {
            let mut state = self.inner.state.lock();
            match &state.live {
                Some(live) if only.is_none_or(|id| id == live.id) => {
                    state.phase = ConnectionState::Disconnected;
                    state.live.take()
                }
                _ => None,
            }
        };
        let Some(live) = live else {
            return;
        };
        live.shutdown.cancel();

        let taken = {
            let mut guard = self.inner.transport.lock().await;
            match guard.as_ref() {
                Some(t) if t.id == live.id => guard.take(),
                _ => None,
            }
        };
        let released = match taken {
            Some(mut transport) => {
                match tokio::time::timeout(RELEASE_TIMEOUT, transport.writer.shutdown()).await {
                    Ok(result) => result,
                    Err(_) => Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "transport release timed out",
                    )),
                }
            }
            None => Ok(()),
        };

        if let Err(e) = released {
            self.emit_error(ErrorKind::Close, e);
        }

        let addr = self.remote_addr();
        info!(remote = %addr, transport = live.id, "Disconnected");
        self.emit(names::DISCONNECTED, &Event::Disconnected(addr));
    }
}
