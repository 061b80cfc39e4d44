// SPDX-FileCopyrightText: 2026 Terrella Contributors
// SPDX-License-Identifier: MIT

//! Command routing: one router per capability maps a command-type string to
//! an async handler and always produces a [`CommandResult`].

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::protocol::{Capability, CommandEnvelope, CommandResult};

/// Error a handler can surface; the dispatch boundary converts every variant
/// into a failed result, so nothing above it sees a raw error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// Malformed or missing command fields; terminal for the call.
    InvalidParams(String),
    /// A referenced id does not exist.
    NotFound(String),
    /// The rendering engine rejected the operation.
    Engine(String),
    /// An external geolocation backend failed; recoverable from the core's
    /// point of view, failed from the caller's.
    Backend(String),
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidParams(message) => write!(f, "invalid parameters: {message}"),
            Self::NotFound(message) => f.write_str(message),
            Self::Engine(message) => write!(f, "engine error: {message}"),
            Self::Backend(message) => write!(f, "backend error: {message}"),
        }
    }
}

impl std::error::Error for HandlerError {}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidParams(err.to_string())
    }
}

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<CommandResult, HandlerError>> + Send>>;

type Handler<Ctx> = Arc<dyn Fn(Arc<Ctx>, CommandEnvelope) -> HandlerFuture + Send + Sync>;

/// A per-capability mapping from command-type string to handler.
///
/// The router is stateless apart from this map; side effects live in
/// whatever the handlers touch through the injected context.
pub struct CommandRouter<Ctx> {
    capability: Capability,
    handlers: BTreeMap<String, Handler<Ctx>>,
}

impl<Ctx> CommandRouter<Ctx> {
    pub fn new(capability: Capability) -> Self {
        Self {
            capability,
            handlers: BTreeMap::new(),
        }
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    /// Register `handler` under `command`. The last registration for a given
    /// command wins; capability routers use this deliberately to expose
    /// compatibility aliases for one underlying operation.
    pub fn register<F>(&mut self, command: impl Into<String>, handler: F)
    where
        F: Fn(Arc<Ctx>, CommandEnvelope) -> HandlerFuture + Send + Sync + 'static,
    {
        self.handlers.insert(command.into(), Arc::new(handler));
    }

    /// Register `alias` as another name for the handler already registered
    /// under `target`. Both names converge on the same canonical handler.
    pub fn register_alias(&mut self, alias: impl Into<String>, target: &str) {
        if let Some(handler) = self.handlers.get(target).cloned() {
            self.handlers.insert(alias.into(), handler);
        }
    }

    pub fn command_types(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Execute the handler for `envelope` and always produce a result.
    ///
    /// An unregistered command type is a terminal routing error; handler
    /// errors are caught here and converted, never propagated.
    pub async fn dispatch(&self, ctx: Arc<Ctx>, envelope: CommandEnvelope) -> CommandResult {
        let Some(handler) = self.handlers.get(envelope.command.as_str()) else {
            return CommandResult::fail(format!("unknown command type: {}", envelope.command));
        };
        let command = envelope.command.clone();
        match handler(ctx, envelope).await {
            Ok(result) => result,
            Err(err) => {
                tracing::debug!(capability = %self.capability, %command, error = %err, "handler failed");
                CommandResult::fail(err.to_string())
            }
        }
    }
}

impl<Ctx> fmt::Debug for CommandRouter<Ctx> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRouter")
            .field("capability", &self.capability)
            .field("commands", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
