// SPDX-FileCopyrightText: 2026 Terrella Contributors
// SPDX-License-Identifier: MIT

//! The command-receiving half of the transport: the viewer host dials the
//! bridge, pumps envelopes through its capability routers, and reconnects
//! with capped backoff when the connection drops.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::bridge::TransportStrategy;
use crate::capability::{self, HandlerContext};
use crate::protocol::Capability;
use crate::router::CommandRouter;

mod runtime;

/// Lifecycle of one logical connection to a bridge endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connecting,
    Open,
    Closed,
    Reconnecting,
}

impl ConnectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Open => "open",
            ConnectionStatus::Closed => "closed",
            ConnectionStatus::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capped exponential backoff for endpoint reconnects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Maximum reconnect attempts before the endpoint is surfaced as
    /// permanently Closed.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl ReconnectPolicy {
    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt <= self.max_retries
    }

    /// Delay before reconnect `attempt` (1-indexed), jittered ±10% and
    /// capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return self.initial_delay;
        }
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let jitter = 1.0 + (time_jitter() * 0.2 - 0.1);
        Duration::from_secs_f64((base * jitter).min(self.max_delay.as_secs_f64()))
    }
}

/// Pseudo-random value in `[0, 1)` hashed from the clock; enough spread to
/// keep simultaneous reconnects from thundering in step.
fn time_jitter() -> f64 {
    let mut hasher = DefaultHasher::new();
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
        .hash(&mut hasher);
    (hasher.finish() as f64) / (u64::MAX as f64)
}

/// Point-in-time view of one endpoint's connection record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSnapshot {
    pub name: String,
    pub address: String,
    pub protocol: TransportStrategy,
    pub status: ConnectionStatus,
    pub reconnect_attempts: u32,
}

#[derive(Debug, Clone)]
pub(crate) struct ConnectionRecord {
    pub name: String,
    pub address: String,
    pub protocol: TransportStrategy,
    pub status: ConnectionStatus,
    pub reconnect_attempts: u32,
}

impl ConnectionRecord {
    fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            name: self.name.clone(),
            address: self.address.clone(),
            protocol: self.protocol,
            status: self.status,
            reconnect_attempts: self.reconnect_attempts,
        }
    }
}

pub(crate) type SharedRecords = Arc<Mutex<BTreeMap<Capability, ConnectionRecord>>>;

#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Bridge base URL, e.g. `http://127.0.0.1:7700`.
    pub base_url: String,
    pub strategy: TransportStrategy,
    pub capabilities: Vec<Capability>,
    pub reconnect: ReconnectPolicy,
    pub heartbeat: Duration,
}

impl HostConfig {
    pub fn new(base_url: impl Into<String>, strategy: TransportStrategy) -> Self {
        Self {
            base_url: base_url.into(),
            strategy,
            capabilities: Capability::ALL.to_vec(),
            reconnect: ReconnectPolicy::default(),
            heartbeat: Duration::from_secs(15),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Vec<Capability>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }
}

/// A viewer host: one connection record (and one pump task) per configured
/// capability endpoint, all sharing one scene session and engine.
pub struct ViewerHost {
    config: HostConfig,
    ctx: Arc<HandlerContext>,
    routers: BTreeMap<Capability, Arc<CommandRouter<HandlerContext>>>,
    records: SharedRecords,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ViewerHost {
    pub fn new(config: HostConfig, ctx: Arc<HandlerContext>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            ctx,
            routers: capability::build_routers(),
            records: Arc::new(Mutex::new(BTreeMap::new())),
            shutdown,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn context(&self) -> &Arc<HandlerContext> {
        &self.ctx
    }

    /// Establish the channel for every configured endpoint. Returns once
    /// each endpoint's first attempt has resolved; partial connectivity is a
    /// valid operating state, so failed endpoints come back Reconnecting (or
    /// Closed) rather than failing the call.
    pub async fn connect(&self) -> Vec<ConnectionSnapshot> {
        let mut first_attempts = Vec::new();

        for &capability in &self.config.capabilities {
            {
                let mut records = self.records.lock().expect("host records lock poisoned");
                records.insert(
                    capability,
                    ConnectionRecord {
                        name: capability.to_string(),
                        address: self.config.base_url.clone(),
                        protocol: self.config.strategy,
                        status: ConnectionStatus::Connecting,
                        reconnect_attempts: 0,
                    },
                );
            }

            let Some(router) = self.routers.get(&capability).cloned() else {
                continue;
            };
            let (first_tx, first_rx) = oneshot::channel();
            let task = runtime::EndpointTask {
                base_url: self.config.base_url.clone(),
                capability,
                strategy: self.config.strategy,
                policy: self.config.reconnect.clone(),
                heartbeat: self.config.heartbeat,
                ctx: self.ctx.clone(),
                router,
                records: self.records.clone(),
                shutdown: self.shutdown.subscribe(),
            };
            let handle = tokio::spawn(runtime::run_endpoint(task, first_tx));
            self.tasks.lock().expect("host tasks lock poisoned").push(handle);
            first_attempts.push(first_rx);
        }

        for first in first_attempts {
            let _ = first.await;
        }
        self.status()
    }

    /// Release every underlying channel. Idempotent: safe to call when
    /// already disconnected.
    pub async fn disconnect(&self) {
        let _ = self.shutdown.send(true);
        let tasks: Vec<JoinHandle<()>> = {
            let mut tasks = self.tasks.lock().expect("host tasks lock poisoned");
            tasks.drain(..).collect()
        };
        for task in tasks {
            let _ = task.await;
        }
    }

    /// Point-in-time snapshot per endpoint.
    pub fn status(&self) -> Vec<ConnectionSnapshot> {
        let records = self.records.lock().expect("host records lock poisoned");
        records.values().map(ConnectionRecord::snapshot).collect()
    }

    pub fn status_of(&self, capability: Capability) -> Option<ConnectionSnapshot> {
        let records = self.records.lock().expect("host records lock poisoned");
        records.get(&capability).map(ConnectionRecord::snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn backoff_grows_and_caps() {
        let policy = ReconnectPolicy {
            max_retries: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            multiplier: 2.0,
        };

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        let second = policy.delay_for_attempt(2);
        assert!(second >= Duration::from_millis(180) && second <= Duration::from_millis(220));
        // Far past the cap, jitter included.
        assert!(policy.delay_for_attempt(10) <= Duration::from_millis(550));
    }

    #[rstest]
    #[case(0, true)]
    #[case(3, true)]
    #[case(4, false)]
    fn retry_budget_is_bounded(#[case] attempt: u32, #[case] expected: bool) {
        let policy = ReconnectPolicy::default().with_max_retries(3);
        assert_eq!(policy.should_retry(attempt), expected);
    }

    #[tokio::test]
    async fn unreachable_bridge_leaves_endpoints_reconnecting() {
        // Nothing listens on this port; connect() must still return with a
        // usable status rather than hang or error.
        let config = HostConfig::new("http://127.0.0.1:9", TransportStrategy::Socket)
            .with_capabilities(vec![Capability::Camera])
            .with_reconnect(
                ReconnectPolicy::default()
                    .with_max_retries(2)
                    .with_initial_delay(Duration::from_millis(50)),
            );
        let host = ViewerHost::new(config, crate::capability::test_context());

        let snapshots = host.connect().await;
        assert_eq!(snapshots.len(), 1);

        // The first dial has resolved, the loop may still be moving the
        // record off Connecting; give it a bounded moment.
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        loop {
            let snapshot = host.status_of(Capability::Camera).expect("camera endpoint");
            if matches!(
                snapshot.status,
                ConnectionStatus::Reconnecting | ConnectionStatus::Closed
            ) {
                break;
            }
            assert!(std::time::Instant::now() < deadline, "stuck at {snapshot:?}");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        host.disconnect().await;
        // Idempotent.
        host.disconnect().await;
    }
}
