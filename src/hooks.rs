//! Interceptor chains around the engine's public operations.
//!
//! Each operation (`connect`, `send`, `disconnect`) owns a [`Chain`]: an
//! ordered list of interceptors wrapped around a built-in default. Invoking
//! the chain runs the most recently installed interceptor first; each one
//! receives a [`Next`] continuation and decides whether to call through,
//! possibly with altered arguments, or to short-circuit with its own result.
//! The default sits at the bottom and runs only if every interceptor above
//! it calls through.
//!
//! Interceptors are installed with [`HookRegistry::hook_call`] (or
//! [`crate::Client::hook_call`]) and are permanent for the client's lifetime.

use crate::client::{Client, ConnectArgs, RemoteAddr, SendArgs};
use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// An interceptor over context `C`, arguments `A`, result `R`.
pub type Interceptor<C, A, R> =
    Arc<dyn Fn(C, A, Next<C, A, R>) -> BoxFuture<'static, R> + Send + Sync>;

/// The innermost behavior of a chain.
pub type DefaultHandler<C, A, R> = Arc<dyn Fn(C, A) -> BoxFuture<'static, R> + Send + Sync>;

/// Continuation handed to an interceptor: the rest of the chain below it.
pub struct Next<C, A, R> {
    interceptors: Arc<[Interceptor<C, A, R>]>,
    remaining: usize,
    default: DefaultHandler<C, A, R>,
}

impl<C, A, R> Next<C, A, R> {
    /// Run the remainder of the chain.
    pub fn run(self, ctx: C, args: A) -> BoxFuture<'static, R> {
        match self.remaining.checked_sub(1) {
            None => (self.default)(ctx, args),
            Some(index) => {
                let interceptor = Arc::clone(&self.interceptors[index]);
                let next = Next {
                    interceptors: self.interceptors,
                    remaining: index,
                    default: self.default,
                };
                interceptor(ctx, args, next)
            }
        }
    }
}

/// Ordered interceptors wrapped around a default.
pub struct Chain<C, A, R> {
    interceptors: RwLock<Vec<Interceptor<C, A, R>>>,
    default: DefaultHandler<C, A, R>,
}

impl<C, A, R> Chain<C, A, R> {
    pub fn new(default: DefaultHandler<C, A, R>) -> Self {
        Self {
            interceptors: RwLock::new(Vec::new()),
            default,
        }
    }

    /// Add an interceptor on top of the chain.
    pub fn push(&self, interceptor: Interceptor<C, A, R>) {
        self.interceptors.write().push(interceptor);
    }

    pub fn len(&self) -> usize {
        self.interceptors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run the chain from the top.
    ///
    /// The interceptor list is snapshotted first, so an interceptor installed
    /// while a call is in flight applies from the next call on.
    pub fn invoke(&self, ctx: C, args: A) -> BoxFuture<'static, R> {
        let interceptors: Arc<[Interceptor<C, A, R>]> = self.interceptors.read().clone().into();
        Next {
            remaining: interceptors.len(),
            interceptors,
            default: Arc::clone(&self.default),
        }
        .run(ctx, args)
    }
}

// ============================================================================
// Client operations
// ============================================================================

/// Hookable client operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Connect,
    Send,
    Disconnect,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connect => "connect",
            Self::Send => "send",
            Self::Disconnect => "disconnect",
        })
    }
}

pub type ConnectInterceptor = Interceptor<Client, ConnectArgs, Option<RemoteAddr>>;
pub type SendInterceptor = Interceptor<Client, SendArgs, Option<String>>;
pub type DisconnectInterceptor = Interceptor<Client, (), ()>;

/// An interceptor tagged with the operation it wraps.
#[derive(Clone)]
pub enum Hook {
    Connect(ConnectInterceptor),
    Send(SendInterceptor),
    Disconnect(DisconnectInterceptor),
}

impl Hook {
    /// Wrap `connect`.
    pub fn connect<F, Fut>(f: F) -> Self
    where
        F: Fn(Client, ConnectArgs, Next<Client, ConnectArgs, Option<RemoteAddr>>) -> Fut
            + Send
            + Sync
            + 'static,
        Fut: Future<Output = Option<RemoteAddr>> + Send + 'static,
    {
        Self::Connect(Arc::new(
            move |client: Client,
                  args: ConnectArgs,
                  next: Next<Client, ConnectArgs, Option<RemoteAddr>>|
                  -> BoxFuture<'static, Option<RemoteAddr>> { Box::pin(f(client, args, next)) },
        ))
    }

    /// Wrap `send`.
    pub fn send<F, Fut>(f: F) -> Self
    where
        F: Fn(Client, SendArgs, Next<Client, SendArgs, Option<String>>) -> Fut
            + Send
            + Sync
            + 'static,
        Fut: Future<Output = Option<String>> + Send + 'static,
    {
        Self::Send(Arc::new(
            move |client: Client,
                  args: SendArgs,
                  next: Next<Client, SendArgs, Option<String>>|
                  -> BoxFuture<'static, Option<String>> { Box::pin(f(client, args, next)) },
        ))
    }

    /// Wrap `disconnect`.
    pub fn disconnect<F, Fut>(f: F) -> Self
    where
        F: Fn(Client, (), Next<Client, (), ()>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::Disconnect(Arc::new(
            move |client: Client, args: (), next: Next<Client, (), ()>| -> BoxFuture<'static, ()> {
                Box::pin(f(client, args, next))
            },
        ))
    }

    pub fn operation(&self) -> Operation {
        match self {
            Self::Connect(_) => Operation::Connect,
            Self::Send(_) => Operation::Send,
            Self::Disconnect(_) => Operation::Disconnect,
        }
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Hook").field(&self.operation()).finish()
    }
}

/// Per-operation interceptor chains of one client.
pub struct HookRegistry {
    pub(crate) connect: Chain<Client, ConnectArgs, Option<RemoteAddr>>,
    pub(crate) send: Chain<Client, SendArgs, Option<String>>,
    pub(crate) disconnect: Chain<Client, (), ()>,
}

impl HookRegistry {
    /// Registry whose chains bottom out in the built-in engine behavior.
    pub(crate) fn new() -> Self {
        Self {
            connect: Chain::new(Arc::new(
                |client: Client, args: ConnectArgs| -> BoxFuture<'static, Option<RemoteAddr>> {
                    Box::pin(async move { client.default_connect(args).await })
                },
            )),
            send: Chain::new(Arc::new(
                |client: Client, args: SendArgs| -> BoxFuture<'static, Option<String>> {
                    Box::pin(async move { client.default_send(args).await })
                },
            )),
            disconnect: Chain::new(Arc::new(|client: Client, _: ()| -> BoxFuture<'static, ()> {
                Box::pin(async move { client.default_disconnect().await })
            })),
        }
    }

    /// Install `hook` on top of its operation's chain.
    pub fn hook_call(&self, hook: Hook) {
        let operation = hook.operation();
        match hook {
            Hook::Connect(f) => self.connect.push(f),
            Hook::Send(f) => self.send.push(f),
            Hook::Disconnect(f) => self.disconnect.push(f),
        }
        debug!(%operation, depth = self.count(operation), "Interceptor installed");
    }

    /// Number of interceptors installed for `operation`.
    pub fn count(&self, operation: Operation) -> usize {
        match operation {
            Operation::Connect => self.connect.len(),
            Operation::Send => self.send.len(),
            Operation::Disconnect => self.disconnect.len(),
        }
    }
}
