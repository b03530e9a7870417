//! Client-side helpers: building a client over the mock network and
//! recording what it publishes.

#![allow(dead_code)]

use super::server::{MockServer, mock_pair};
use parking_lot::Mutex;
use slircc::events::names;
use slircc::{Client, Config, ErrorKind, Event, Message, RemoteAddr};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// One published event, flattened for assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Connecting(RemoteAddr),
    Connected(RemoteAddr),
    Disconnected(RemoteAddr),
    Error(ErrorKind, String),
    Raw(Message),
}

/// Records lifecycle, error and raw events in publication order.
///
/// Attaching registers an `error` listener, which counts as the
/// application's handler.
#[derive(Clone, Default)]
pub struct EventLog {
    entries: Arc<Mutex<Vec<Recorded>>>,
}

impl EventLog {
    pub fn attach(client: &Client) -> Self {
        let log = Self::default();
        for name in [
            names::CONNECTING,
            names::CONNECTED,
            names::DISCONNECTED,
            names::ERROR,
            names::RAW,
        ] {
            let entries = Arc::clone(&log.entries);
            client.on(name, move |event| {
                let recorded = match event {
                    Event::Connecting(addr) => Recorded::Connecting(addr.clone()),
                    Event::Connected(addr) => Recorded::Connected(addr.clone()),
                    Event::Disconnected(addr) => Recorded::Disconnected(addr.clone()),
                    Event::Error(err) => Recorded::Error(err.kind, err.to_string()),
                    Event::Raw(msg) => Recorded::Raw((**msg).clone()),
                    Event::Custom(_) => return,
                };
                entries.lock().push(recorded);
            });
        }
        log
    }

    pub fn entries(&self) -> Vec<Recorded> {
        self.entries.lock().clone()
    }

    pub fn errors(&self) -> Vec<(ErrorKind, String)> {
        self.entries
            .lock()
            .iter()
            .filter_map(|e| match e {
                Recorded::Error(kind, text) => Some((*kind, text.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn raw(&self) -> Vec<Message> {
        self.entries
            .lock()
            .iter()
            .filter_map(|e| match e {
                Recorded::Raw(msg) => Some(msg.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn disconnects(&self) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|e| matches!(e, Recorded::Disconnected(_)))
            .count()
    }
}

/// A client wired to a fresh mock network, with an [`EventLog`] attached.
pub fn mock_client() -> (Client, MockServer, EventLog) {
    mock_client_with(Config::default())
}

pub fn mock_client_with(config: Config) -> (Client, MockServer, EventLog) {
    let (connector, server) = mock_pair();
    let client = Client::builder(config)
        .connector(connector)
        .build()
        .expect("no plugins to fail");
    let log = EventLog::attach(&client);
    (client, server, log)
}

/// Await `fut`, failing the test after five seconds.
pub async fn within<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("timed out")
}

/// Give spawned tasks a moment to run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
