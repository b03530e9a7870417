//! WebSocket transport plugin.
//!
//! Replaces the socket transport with a WebSocket one behind the same
//! `connect`/`send`/`disconnect` surface. Each WebSocket message carries
//! exactly one IRC line without terminator, in both directions. The
//! interceptors never call through, so the built-in socket transport is not
//! touched while the plugin is active.

use crate::client::{Client, ConnectArgs, ConnectionState, RELEASE_TIMEOUT, RemoteAddr, SendArgs};
use crate::error::{ErrorCause, ErrorKind};
use crate::events::{Event, names};
use crate::hooks::Hook;
use crate::plugin::{Plugin, PluginContext, PluginError};
use crate::telemetry::spans;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use slirc_proto::encode::{Terminator, encode_line};
use slirc_proto::framer::parse_line;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct WsConnection {
    id: u64,
    sink: SplitSink<WsStream, WsMessage>,
    shutdown: CancellationToken,
}

#[derive(Default)]
struct Shared {
    conn: Mutex<Option<WsConnection>>,
    /// Id and cancellation handle of the live connection.
    live: parking_lot::Mutex<Option<(u64, CancellationToken)>>,
    connecting: Mutex<()>,
    closing: Mutex<()>,
    next_id: AtomicU64,
}

/// Installs WebSocket interceptors when `[client] websocket = true`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketPlugin;

impl Plugin for WebSocketPlugin {
    fn name(&self) -> &'static str {
        "websocket"
    }

    fn install(&self, ctx: &mut PluginContext<'_>) -> Result<(), PluginError> {
        if !ctx.config().client.websocket {
            debug!("WebSocket transport disabled");
            return Ok(());
        }

        let shared = Arc::new(Shared::default());

        let state = Arc::clone(&shared);
        ctx.hook_call(Hook::connect(move |client, args, _next| {
            connect(client, args, Arc::clone(&state))
        }));

        let state = Arc::clone(&shared);
        ctx.hook_call(Hook::send(move |client, args, _next| {
            send(client, args, Arc::clone(&state))
        }));

        let state = Arc::clone(&shared);
        ctx.hook_call(Hook::disconnect(move |client, (), _next| {
            disconnect(client, Arc::clone(&state))
        }));

        Ok(())
    }
}

/// `ws(s)://host:port/path` for a connect request.
pub fn url_for(args: &ConnectArgs) -> String {
    let scheme = if args.options.tls { "wss" } else { "ws" };
    let path = normalize_path(args.options.path.as_deref());
    format!("{scheme}://{}:{}{path}", args.hostname, args.port)
}

fn normalize_path(path: Option<&str>) -> String {
    match path {
        None | Some("") => "/".to_owned(),
        Some(p) if p.starts_with('/') => p.to_owned(),
        Some(p) => format!("/{p}"),
    }
}

async fn connect(client: Client, args: ConnectArgs, shared: Arc<Shared>) -> Option<RemoteAddr> {
    let _connecting = shared.connecting.lock().await;
    close(&client, &shared, None, true).await;

    let url = url_for(&args);
    let mut addr = args.remote_addr();
    addr.path = Some(normalize_path(args.options.path.as_deref()));

    client.set_remote_addr(addr.clone());
    client.set_state(ConnectionState::Connecting);
    info!(url = %url, "Connecting");
    client.emit(names::CONNECTING, &Event::Connecting(addr.clone()));

    let stream = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            client.set_state(ConnectionState::Disconnected);
            client.emit_error(ErrorKind::Connect, e);
            return None;
        }
    };

    let id = shared.next_id.fetch_add(1, Ordering::Relaxed);
    let (sink, stream) = stream.split();
    let shutdown = CancellationToken::new();
    {
        let mut conn = shared.conn.lock().await;
        *conn = Some(WsConnection {
            id,
            sink,
            shutdown: shutdown.clone(),
        });
        *shared.live.lock() = Some((id, shutdown.clone()));
    }
    client.set_state(ConnectionState::Connected);
    info!(url = %url, "Connected");
    client.emit(names::CONNECTED, &Event::Connected(addr.clone()));

    let span = spans::websocket(&url);
    let reader = read_loop(client.clone(), stream, shutdown, Arc::clone(&shared), id);
    let (client, shared) = (client.clone(), Arc::clone(&shared));
    Client::spawn_reader(reader.instrument(span), move || async move {
        close(&client, &shared, Some(id), false).await
    });

    Some(addr)
}

async fn read_loop(
    client: Client,
    mut stream: SplitStream<WsStream>,
    shutdown: CancellationToken,
    shared: Arc<Shared>,
    id: u64,
) {
    // Whether we still owe the server a close frame on exit.
    let mut send_close = true;

    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            next = stream.next() => next,
        };

        match next {
            Some(Ok(WsMessage::Text(text))) => dispatch(&client, text.as_bytes()),
            Some(Ok(WsMessage::Binary(data))) => dispatch(&client, &data),
            Some(Ok(WsMessage::Close(frame))) => {
                debug!(?frame, "Server closed the WebSocket");
                send_close = false;
                break;
            }
            // Ping/pong are answered by tungstenite.
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                client.emit_error(ErrorKind::Read, e);
                send_close = false;
                break;
            }
            None => {
                debug!("End of stream");
                send_close = false;
                break;
            }
        }
    }

    close(&client, &shared, Some(id), send_close).await;
}

fn dispatch(client: &Client, payload: &[u8]) {
    match parse_line(payload) {
        Ok(message) => client.emit_raw(message),
        Err(e) => client.emit_error(ErrorKind::Read, e),
    }
}

async fn send(client: Client, args: SendArgs, shared: Arc<Shared>) -> Option<String> {
    let mut guard = shared.conn.lock().await;
    let Some(conn) = guard.as_mut() else {
        drop(guard);
        client.emit_error(ErrorKind::Write, ErrorCause::NotConnected);
        return None;
    };

    let line = match encode_line(&args.command, args.params, Terminator::None) {
        Ok(line) => line,
        Err(e) => {
            drop(guard);
            client.emit_error(ErrorKind::Write, e);
            return None;
        }
    };

    let shutdown = conn.shutdown.clone();
    let sent = tokio::select! {
        biased;
        _ = shutdown.cancelled() => Err(tungstenite::Error::Io(io::Error::new(
            io::ErrorKind::NotConnected,
            "transport released during write",
        ))),
        sent = conn.sink.send(WsMessage::Text(line.clone())) => sent,
    };
    drop(guard);

    match sent {
        Ok(()) => Some(line),
        Err(e) => {
            client.emit_error(ErrorKind::Write, e);
            None
        }
    }
}

async fn disconnect(client: Client, shared: Arc<Shared>) {
    close(&client, &shared, None, true).await;
}

/// Release the live connection, or only connection `id` when given.
///
/// Cancels first, then takes the sink and, if `send_close`, says goodbye
/// with a normal close frame.
async fn close(client: &Client, shared: &Shared, only: Option<u64>, send_close: bool) {
    let _closing = shared.closing.lock().await;

    let live = {
        let mut live = shared.live.lock();
        match &*live {
            Some((id, _)) if only.is_none_or(|only| only == *id) => live.take(),
            _ => None,
        }
    };
    let Some((id, shutdown)) = live else {
        return;
    };
    shutdown.cancel();
    client.set_state(ConnectionState::Disconnected);

    let taken = {
        let mut conn = shared.conn.lock().await;
        match conn.as_ref() {
            Some(c) if c.id == id => conn.take(),
            _ => None,
        }
    };
    let result = match taken {
        Some(mut conn) if send_close => {
            let frame = CloseFrame {
                code: CloseCode::Normal,
                reason: "".into(),
            };
            let goodbye = conn.sink.send(WsMessage::Close(Some(frame)));
            match tokio::time::timeout(RELEASE_TIMEOUT, goodbye).await {
                Ok(result) => result,
                Err(_) => Err(tungstenite::Error::Io(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "close frame timed out",
                ))),
            }
        }
        _ => Ok(()),
    };

    if let Err(e) = result {
        client.emit_error(ErrorKind::Close, e);
    }

    let addr = client.remote_addr();
    info!(remote = %addr, "Disconnected");
    client.emit(names::DISCONNECTED, &Event::Disconnected(addr));
}
