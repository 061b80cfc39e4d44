// SPDX-FileCopyrightText: 2026 Terrella Contributors
// SPDX-License-Identifier: MIT

//! The command-sending half of the transport: delivers envelopes to whatever
//! viewer is attached per capability, enforces a timeout per outstanding
//! command, and resolves each call exactly once.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::protocol::{Capability, CommandEnvelope, CommandResult, ResultFrame};

pub mod http;
pub mod pending;

pub use pending::PendingCommands;

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Which wire carries the envelopes. Selected once at construction; nothing
/// else branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransportStrategy {
    /// One bidirectional WebSocket per capability; commands and results
    /// share the channel.
    Socket,
    /// Half-duplex: commands go out over an SSE event stream, results come
    /// back as discrete POSTs correlated by command id.
    Stream,
}

impl TransportStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportStrategy::Socket => "socket",
            TransportStrategy::Stream => "stream",
        }
    }
}

impl fmt::Display for TransportStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStrategyError(pub String);

impl fmt::Display for ParseStrategyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown transport strategy: {} (expected socket or stream)", self.0)
    }
}

impl std::error::Error for ParseStrategyError {}

impl FromStr for TransportStrategy {
    type Err = ParseStrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "socket" | "ws" | "websocket" => Ok(TransportStrategy::Socket),
            "stream" | "sse" => Ok(TransportStrategy::Stream),
            other => Err(ParseStrategyError(other.to_owned())),
        }
    }
}

struct Channel {
    sender: Option<mpsc::UnboundedSender<CommandEnvelope>>,
    generation: u64,
    commands_sent: u64,
    results_received: u64,
    results_dropped: u64,
}

impl Channel {
    fn new() -> Self {
        Self {
            sender: None,
            generation: 0,
            commands_sent: 0,
            results_received: 0,
            results_dropped: 0,
        }
    }
}

/// The feed handed to a transport connection task on attach: envelopes to
/// push to the viewer, plus the generation token for the matching detach.
pub struct CommandFeed {
    pub capability: Capability,
    pub generation: u64,
    pub receiver: mpsc::UnboundedReceiver<CommandEnvelope>,
}

/// Point-in-time snapshot of one capability channel.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ChannelStatus {
    pub capability: Capability,
    pub connected: bool,
    pub commands_sent: u64,
    pub results_received: u64,
    pub results_dropped: u64,
}

/// Per-capability command delivery with correlation, timeout, and stats.
pub struct ViewerBridge {
    strategy: TransportStrategy,
    default_timeout: Duration,
    channels: Mutex<BTreeMap<Capability, Channel>>,
    pending: PendingCommands,
}

impl ViewerBridge {
    pub fn new(strategy: TransportStrategy, default_timeout: Duration) -> Self {
        let channels = Capability::ALL
            .into_iter()
            .map(|capability| (capability, Channel::new()))
            .collect();
        Self {
            strategy,
            default_timeout,
            channels: Mutex::new(channels),
            pending: PendingCommands::new(),
        }
    }

    pub fn strategy(&self) -> TransportStrategy {
        self.strategy
    }

    /// Attach a viewer connection to `capability`. A new attachment
    /// supersedes the previous one: the old feed's receiver closes and its
    /// later detach becomes a no-op.
    pub fn attach(&self, capability: Capability) -> CommandFeed {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut channels = self.channels.lock().expect("bridge lock poisoned");
        let channel = channels.entry(capability).or_insert_with(Channel::new);
        channel.generation += 1;
        channel.sender = Some(sender);
        CommandFeed {
            capability,
            generation: channel.generation,
            receiver,
        }
    }

    /// Detach the connection identified by `generation`; stale generations
    /// (already superseded) are ignored.
    pub fn detach(&self, capability: Capability, generation: u64) {
        let mut channels = self.channels.lock().expect("bridge lock poisoned");
        if let Some(channel) = channels.get_mut(&capability) {
            if channel.generation == generation {
                channel.sender = None;
            }
        }
    }

    pub fn is_attached(&self, capability: Capability) -> bool {
        let channels = self.channels.lock().expect("bridge lock poisoned");
        channels
            .get(&capability)
            .is_some_and(|channel| channel.sender.is_some())
    }

    /// Send `envelope` to the viewer attached for `capability` and wait for
    /// the correlated result.
    ///
    /// Always resolves: with the viewer's result, or with a failed result
    /// when no viewer is attached (fail fast) or `timeout` elapses. A result
    /// arriving after the timeout is discarded and counted, never delivered
    /// to a later waiter.
    pub async fn execute_command(
        &self,
        capability: Capability,
        mut envelope: CommandEnvelope,
        timeout: Option<Duration>,
    ) -> CommandResult {
        let timeout = timeout.unwrap_or(self.default_timeout);
        let id = envelope
            .id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone();
        let command = envelope.command.clone();

        let sender = {
            let mut channels = self.channels.lock().expect("bridge lock poisoned");
            let Some(channel) = channels.get_mut(&capability) else {
                return CommandResult::fail(format!("no channel for capability {capability}"));
            };
            match &channel.sender {
                Some(sender) => {
                    channel.commands_sent += 1;
                    sender.clone()
                }
                None => {
                    return CommandResult::fail(format!(
                        "viewer not connected for capability {capability}"
                    ))
                }
            }
        };

        let receiver = self.pending.register(id.clone());
        if sender.send(envelope).is_err() {
            self.pending.discard(&id);
            return CommandResult::fail(format!(
                "viewer disconnected before {command} was sent"
            ));
        }

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => CommandResult::fail(format!(
                "pending slot for {command} was superseded"
            )),
            Err(_) => {
                self.pending.discard(&id);
                tracing::debug!(%capability, %command, timeout_ms = timeout.as_millis() as u64, "command timed out");
                CommandResult::fail(format!(
                    "{command} timed out after {}ms",
                    timeout.as_millis()
                ))
            }
        }
    }

    /// Deliver a correlated reply. Returns whether a waiter consumed it;
    /// late results are counted and dropped.
    pub fn complete(&self, capability: Capability, frame: ResultFrame) -> bool {
        let delivered = self.pending.complete(&frame.id, frame.result);
        let mut channels = self.channels.lock().expect("bridge lock poisoned");
        if let Some(channel) = channels.get_mut(&capability) {
            if delivered {
                channel.results_received += 1;
            } else {
                channel.results_dropped += 1;
                tracing::debug!(%capability, id = %frame.id, "dropped late or unknown result");
            }
        }
        delivered
    }

    /// Snapshot of every capability channel.
    pub fn status(&self) -> Vec<ChannelStatus> {
        let channels = self.channels.lock().expect("bridge lock poisoned");
        channels
            .iter()
            .map(|(capability, channel)| ChannelStatus {
                capability: *capability,
                connected: channel.sender.is_some(),
                commands_sent: channel.commands_sent,
                results_received: channel.results_received,
                results_dropped: channel.results_dropped,
            })
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl fmt::Debug for ViewerBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewerBridge")
            .field("strategy", &self.strategy)
            .field("default_timeout", &self.default_timeout)
            .field("status", &self.status())
            .finish()
    }
}
