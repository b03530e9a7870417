//! slircc - Straylight IRC Client
//!
//! A pluggable IRC client connection engine. The [`Client`] owns one
//! transport at a time, frames inbound bytes into messages with
//! [`slirc_proto`], and publishes everything on a named [`events::EventBus`].
//! Plugins extend it by subscribing to events, wrapping the `connect`,
//! `send` and `disconnect` operations ([`hooks`]), and registering named
//! capabilities ([`plugin`]).
//!
//! ```no_run
//! use slircc::{Client, ConnectOptions, Config};
//! use slircc::events::names;
//!
//! # async fn demo() {
//! let client = Client::new(Config::default());
//! client.on(names::ERROR, |event| eprintln!("{:?}", event.as_error()));
//! client.on("raw:PING", |event| println!("{:?}", event.as_raw()));
//!
//! if client.connect("irc.libera.chat", 6697, ConnectOptions { tls: true, path: None }).await.is_some() {
//!     client.send("NICK", ["slircc"]).await;
//!     client.send("USER", ["slircc", "0", "*", "Straylight IRC Client"]).await;
//! }
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod hooks;
pub mod plugin;
pub mod telemetry;
pub mod websocket;

pub use self::client::{
    Client, ClientBuilder, ConnectArgs, ConnectOptions, ConnectionState, Connector, Param,
    RemoteAddr, SendArgs, TcpConnector,
};
pub use self::config::{Config, ConfigError};
pub use self::error::{ClientError, ErrorCause, ErrorKind};
pub use self::events::{Event, EventBus, Subscription};
pub use self::hooks::{Hook, Next};
pub use self::plugin::{Plugin, PluginContext, PluginError};
pub use self::websocket::WebSocketPlugin;
pub use slirc_proto::Message;
