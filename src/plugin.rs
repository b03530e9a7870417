//! Plugins and the capability registry.
//!
//! A [`Plugin`] is installed once, while the client is being built. Through
//! its [`PluginContext`] it can subscribe to events, install interceptors,
//! and register named capabilities: commands callable via
//! [`Client::command`] and event kinds it publishes. Capabilities live in
//! [`Capabilities`], a registry owned by the client; the client type itself
//! never changes shape.

use crate::client::Client;
use crate::config::Config;
use crate::events::{Event, Subscription};
use crate::hooks::Hook;
use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Plugin installation and capability lookup errors.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("command {name:?} already registered by plugin {owner:?}")]
    DuplicateCommand { name: String, owner: String },

    #[error("event {name:?} already registered by plugin {owner:?}")]
    DuplicateEvent { name: String, owner: String },

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("plugin {plugin:?} failed to install: {reason}")]
    Install { plugin: String, reason: String },
}

/// Handler behind a registered command.
pub type CommandHandler =
    Arc<dyn Fn(Client, Vec<String>) -> BoxFuture<'static, Option<String>> + Send + Sync>;

/// Extension installed into a client at build time.
pub trait Plugin: Send + Sync {
    /// Unique plugin name, used as the owner of its capabilities.
    fn name(&self) -> &'static str;

    fn install(&self, ctx: &mut PluginContext<'_>) -> Result<(), PluginError>;
}

/// Plugin built from a closure, see [`from_fn`].
pub struct FnPlugin<F> {
    name: &'static str,
    install: F,
}

impl<F> Plugin for FnPlugin<F>
where
    F: Fn(&mut PluginContext<'_>) -> Result<(), PluginError> + Send + Sync,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn install(&self, ctx: &mut PluginContext<'_>) -> Result<(), PluginError> {
        (self.install)(ctx)
    }
}

/// Build a plugin from its name and install function.
pub fn from_fn<F>(name: &'static str, install: F) -> FnPlugin<F>
where
    F: Fn(&mut PluginContext<'_>) -> Result<(), PluginError> + Send + Sync,
{
    FnPlugin { name, install }
}

/// What a plugin sees while installing.
pub struct PluginContext<'a> {
    client: &'a Client,
    plugin: &'static str,
}

impl<'a> PluginContext<'a> {
    pub(crate) fn new(client: &'a Client, plugin: &'static str) -> Self {
        Self { client, plugin }
    }

    pub fn client(&self) -> &'a Client {
        self.client
    }

    pub fn config(&self) -> &'a Config {
        self.client.config()
    }

    /// Name of the plugin being installed.
    pub fn plugin(&self) -> &'static str {
        self.plugin
    }

    pub fn hook_call(&mut self, hook: Hook) {
        debug!(plugin = self.plugin, operation = %hook.operation(), "Plugin hook");
        self.client.hook_call(hook);
    }

    pub fn on<F>(&mut self, name: &str, listener: F) -> Subscription<Event>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.client.on(name, listener)
    }

    /// Register command `name`, callable through [`Client::command`].
    pub fn register_command<F, Fut>(&mut self, name: &str, handler: F) -> Result<(), PluginError>
    where
        F: Fn(Client, Vec<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<String>> + Send + 'static,
    {
        let handler: CommandHandler = Arc::new(
            move |client: Client, args: Vec<String>| -> BoxFuture<'static, Option<String>> {
                Box::pin(handler(client, args))
            },
        );
        self.client
            .capabilities()
            .add_command(name, self.plugin, handler)
    }

    /// Declare that this plugin publishes events named `name`.
    pub fn register_event(&mut self, name: &str) -> Result<(), PluginError> {
        self.client.capabilities().add_event(name, self.plugin)
    }
}

struct RegisteredCommand {
    owner: &'static str,
    handler: CommandHandler,
}

/// Registry of plugin-provided commands and event kinds.
#[derive(Default)]
pub struct Capabilities {
    commands: RwLock<BTreeMap<String, RegisteredCommand>>,
    events: RwLock<BTreeMap<String, &'static str>>,
    plugins: RwLock<BTreeSet<&'static str>>,
}

impl Capabilities {
    fn add_command(
        &self,
        name: &str,
        owner: &'static str,
        handler: CommandHandler,
    ) -> Result<(), PluginError> {
        let mut commands = self.commands.write();
        if let Some(existing) = commands.get(name) {
            return Err(PluginError::DuplicateCommand {
                name: name.to_owned(),
                owner: existing.owner.to_owned(),
            });
        }
        commands.insert(name.to_owned(), RegisteredCommand { owner, handler });
        debug!(plugin = owner, command = name, "Command registered");
        Ok(())
    }

    fn add_event(&self, name: &str, owner: &'static str) -> Result<(), PluginError> {
        let mut events = self.events.write();
        if let Some(existing) = events.get(name) {
            return Err(PluginError::DuplicateEvent {
                name: name.to_owned(),
                owner: (*existing).to_owned(),
            });
        }
        events.insert(name.to_owned(), owner);
        Ok(())
    }

    pub(crate) fn add_plugin(&self, name: &'static str) {
        self.plugins.write().insert(name);
    }

    pub(crate) fn command(&self, name: &str) -> Result<CommandHandler, PluginError> {
        self.commands
            .read()
            .get(name)
            .map(|c| Arc::clone(&c.handler))
            .ok_or_else(|| PluginError::UnknownCommand(name.to_owned()))
    }

    pub fn has_command(&self, name: &str) -> bool {
        self.commands.read().contains_key(name)
    }

    /// Registered command names, sorted.
    pub fn commands(&self) -> Vec<String> {
        self.commands.read().keys().cloned().collect()
    }

    /// Registered event names, sorted.
    pub fn events(&self) -> Vec<String> {
        self.events.read().keys().cloned().collect()
    }

    /// Plugin owning `command`, if registered.
    pub fn command_owner(&self, command: &str) -> Option<&'static str> {
        self.commands.read().get(command).map(|c| c.owner)
    }

    /// Names of installed plugins, sorted.
    pub fn plugins(&self) -> Vec<&'static str> {
        self.plugins.read().iter().copied().collect()
    }
}
