//! Named publish/subscribe registry.
//!
//! [`EventBus`] keys listeners by event name. Publishing is synchronous:
//! [`EventBus::emit`] snapshots the listeners under the lock, releases it and
//! then invokes them in registration order, so a listener may subscribe or
//! unsubscribe (itself included) while it runs.
//!
//! A *multi-event* (see [`EventBus::create_multi_event`]) is a catch-all name
//! whose listeners also receive every event whose name starts with a given
//! prefix. The client uses this for `raw`, which sees every `raw:<COMMAND>`.
//!
//! The client's payload type is [`Event`]; well-known names live in
//! [`names`].

use crate::client::RemoteAddr;
use crate::error::ClientError;
use parking_lot::Mutex;
use slirc_proto::Message;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;

/// Listener identity, unique per bus.
pub type ListenerId = u64;

type Listener<P> = Arc<dyn Fn(&P) + Send + Sync>;

/// Well-known event names published by the engine.
pub mod names {
    /// Transport open is about to be attempted.
    pub const CONNECTING: &str = "connecting";
    /// Transport is open and the read loop is running.
    pub const CONNECTED: &str = "connected";
    /// Transport was released.
    pub const DISCONNECTED: &str = "disconnected";
    /// A classified, non-silent engine error.
    pub const ERROR: &str = "error";
    /// Catch-all for every inbound message.
    pub const RAW: &str = "raw";
    /// Prefix of per-command inbound events.
    pub const RAW_PREFIX: &str = "raw:";

    /// Event name for an inbound command, e.g. `raw:PRIVMSG`.
    pub fn raw(command: &str) -> String {
        format!("{RAW_PREFIX}{command}")
    }
}

// ============================================================================
// Payload
// ============================================================================

/// Payload carried by client events.
#[derive(Debug, Clone)]
pub enum Event {
    Connecting(RemoteAddr),
    Connected(RemoteAddr),
    Disconnected(RemoteAddr),
    Error(Arc<ClientError>),
    Raw(Arc<Message>),
    /// Payload of a plugin-defined event.
    Custom(Arc<dyn Any + Send + Sync>),
}

impl Event {
    pub fn remote_addr(&self) -> Option<&RemoteAddr> {
        match self {
            Self::Connecting(addr) | Self::Connected(addr) | Self::Disconnected(addr) => Some(addr),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&ClientError> {
        match self {
            Self::Error(err) => Some(err),
            _ => None,
        }
    }

    pub fn as_raw(&self) -> Option<&Message> {
        match self {
            Self::Raw(msg) => Some(msg),
            _ => None,
        }
    }

    /// Wrap a plugin payload.
    pub fn custom<T: Any + Send + Sync>(value: T) -> Self {
        Self::Custom(Arc::new(value))
    }

    /// Borrow a plugin payload as `T`.
    pub fn downcast_custom<T: Any + Send + Sync>(&self) -> Option<&T> {
        match self {
            Self::Custom(value) => value.downcast_ref(),
            _ => None,
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

struct Entry<P> {
    id: ListenerId,
    listener: Listener<P>,
}

struct MultiEvent {
    name: String,
    prefix: String,
}

struct Registry<P> {
    listeners: HashMap<String, Vec<Entry<P>>>,
    multi: Vec<MultiEvent>,
    memorized: HashMap<String, usize>,
    next_id: ListenerId,
}

impl<P> Registry<P> {
    fn add(&mut self, name: &str, listener: Listener<P>) -> ListenerId {
        let id = self.next_id;
        self.next_id += 1;
        self.listeners
            .entry(name.to_owned())
            .or_default()
            .push(Entry { id, listener });
        id
    }

    fn remove(&mut self, name: &str, id: ListenerId) -> bool {
        let Some(entries) = self.listeners.get_mut(name) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| e.id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            self.listeners.remove(name);
        }
        removed
    }

    fn direct_count(&self, name: &str) -> usize {
        self.listeners.get(name).map_or(0, Vec::len)
    }

    /// Multi-events whose prefix covers `name` (never `name` itself).
    fn covering<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MultiEvent> + 'a {
        self.multi
            .iter()
            .filter(move |m| m.name != name && name.starts_with(&m.prefix))
    }

    fn count(&self, name: &str) -> usize {
        self.direct_count(name)
            + self
                .covering(name)
                .map(|m| self.direct_count(&m.name))
                .sum::<usize>()
    }

    fn snapshot(&self, name: &str) -> Vec<Listener<P>> {
        let mut matched: Vec<&Entry<P>> = self
            .listeners
            .get(name)
            .into_iter()
            .flatten()
            .collect();

        let mut merged = false;
        for multi in self.covering(name) {
            if let Some(entries) = self.listeners.get(&multi.name) {
                matched.extend(entries);
                merged = true;
            }
        }
        if merged {
            matched.sort_by_key(|e| e.id);
        }

        matched.into_iter().map(|e| Arc::clone(&e.listener)).collect()
    }
}

/// Handle to one registration, returned by [`EventBus::on`].
///
/// Dropping it leaves the listener registered; call
/// [`Subscription::unsubscribe`] to remove it.
pub struct Subscription<P> {
    registry: Weak<Mutex<Registry<P>>>,
    name: String,
    id: ListenerId,
}

impl<P> Subscription<P> {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Remove the listener. Returns `false` if it was already gone.
    pub fn unsubscribe(self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.lock().remove(&self.name, self.id),
            None => false,
        }
    }
}

impl<P> std::fmt::Debug for Subscription<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("name", &self.name)
            .field("id", &self.id)
            .finish()
    }
}

/// Named publish/subscribe registry over payloads of type `P`.
pub struct EventBus<P> {
    registry: Arc<Mutex<Registry<P>>>,
}

impl<P> Clone for EventBus<P> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<P> Default for EventBus<P> {
    fn default() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                listeners: HashMap::new(),
                multi: Vec::new(),
                memorized: HashMap::new(),
                next_id: 0,
            })),
        }
    }
}

impl<P: 'static> EventBus<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a durable listener for `name`.
    pub fn on<F>(&self, name: &str, listener: F) -> Subscription<P>
    where
        F: Fn(&P) + Send + Sync + 'static,
    {
        let id = self.registry.lock().add(name, Arc::new(listener));
        Subscription {
            registry: Arc::downgrade(&self.registry),
            name: name.to_owned(),
            id,
        }
    }

    /// Register a listener that runs for the next publication of `name`
    /// only and then removes itself.
    pub fn once<F>(&self, name: &str, listener: F) -> Subscription<P>
    where
        F: FnOnce(&P) + Send + 'static,
    {
        let slot = Mutex::new(Some(listener));
        let registry = Arc::downgrade(&self.registry);
        let key = name.to_owned();

        // The closure needs its own id to unregister, so reserve it first.
        let mut guard = self.registry.lock();
        let id = guard.next_id;
        guard.add(
            name,
            Arc::new(move |payload: &P| {
                let Some(listener) = slot.lock().take() else {
                    return;
                };
                if let Some(registry) = registry.upgrade() {
                    registry.lock().remove(&key, id);
                }
                listener(payload);
            }),
        );
        drop(guard);

        Subscription {
            registry: Arc::downgrade(&self.registry),
            name: name.to_owned(),
            id,
        }
    }

    /// Future resolving with the payload of the next publication of `name`.
    ///
    /// The listener is registered when this is called, not when the future
    /// is first polled. Resolves to `None` if the bus is dropped first.
    pub fn wait(&self, name: &str) -> impl Future<Output = Option<P>> + Send + use<P>
    where
        P: Clone + Send,
    {
        let (tx, rx) = oneshot::channel();
        self.once(name, move |payload: &P| {
            let _ = tx.send(payload.clone());
        });
        async move { rx.await.ok() }
    }

    /// Remove listener `id` from `name`. Returns whether it was registered.
    pub fn off(&self, name: &str, id: ListenerId) -> bool {
        self.registry.lock().remove(name, id)
    }

    /// Publish `payload` to every listener of `name`, including catch-all
    /// listeners of covering multi-events, in registration order.
    pub fn emit(&self, name: &str, payload: &P) {
        let listeners = self.registry.lock().snapshot(name);
        for listener in listeners {
            listener(payload);
        }
    }

    /// Live listener count for `name`. For a name covered by a multi-event
    /// this includes the catch-all listeners.
    pub fn listener_count(&self, name: &str) -> usize {
        self.registry.lock().count(name)
    }

    /// Declare `name` as a catch-all for every event starting with `prefix`.
    pub fn create_multi_event(&self, name: &str, prefix: &str) {
        let mut registry = self.registry.lock();
        if registry.multi.iter().any(|m| m.name == name) {
            return;
        }
        registry.multi.push(MultiEvent {
            name: name.to_owned(),
            prefix: prefix.to_owned(),
        });
    }

    /// Snapshot current listener counts as the baseline for
    /// [`EventBus::has_unmemorized_listeners`].
    pub fn memorize_listener_counts(&self) {
        let mut registry = self.registry.lock();
        let counts = registry
            .listeners
            .iter()
            .map(|(name, entries)| (name.clone(), entries.len()))
            .collect();
        registry.memorized = counts;
    }

    /// Whether `name` has more listeners now than at the last
    /// [`EventBus::memorize_listener_counts`].
    pub fn has_unmemorized_listeners(&self, name: &str) -> bool {
        let registry = self.registry.lock();
        let baseline = registry.memorized.get(name).copied().unwrap_or(0);
        registry.direct_count(name) > baseline
    }
}
