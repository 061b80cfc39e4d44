// SPDX-FileCopyrightText: 2026 Terrella Contributors
// SPDX-License-Identifier: MIT

//! Per-endpoint connection loop: dial, pump envelopes in arrival order
//! through the capability router, reply, and reconnect with backoff.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{oneshot, watch};
use tokio_tungstenite::tungstenite::Message;

use crate::bridge::TransportStrategy;
use crate::capability::HandlerContext;
use crate::host::{ConnectionStatus, ReconnectPolicy, SharedRecords};
use crate::protocol::{Capability, CommandEnvelope, ResultFrame};
use crate::router::CommandRouter;

pub(crate) struct EndpointTask {
    pub base_url: String,
    pub capability: Capability,
    pub strategy: TransportStrategy,
    pub policy: ReconnectPolicy,
    pub heartbeat: Duration,
    pub ctx: Arc<HandlerContext>,
    pub router: Arc<CommandRouter<HandlerContext>>,
    pub records: SharedRecords,
    pub shutdown: watch::Receiver<bool>,
}

enum SessionEnd {
    /// The remote closed or errored; reconnect applies.
    Remote,
    /// The host is shutting down; stop without retrying.
    Shutdown,
}

pub(crate) async fn run_endpoint(mut task: EndpointTask, first_attempt: oneshot::Sender<()>) {
    let mut first_attempt = Some(first_attempt);
    let mut attempts: u32 = 0;

    loop {
        let session = match task.strategy {
            TransportStrategy::Socket => run_socket_session(&mut task, &mut first_attempt).await,
            TransportStrategy::Stream => run_stream_session(&mut task, &mut first_attempt).await,
        };
        notify_first_attempt(&mut first_attempt);

        match session {
            Ok(SessionEnd::Shutdown) | Err(SessionEnd::Shutdown) => {
                set_status(&task, ConnectionStatus::Closed);
                return;
            }
            Ok(SessionEnd::Remote) => {
                tracing::info!(capability = %task.capability, "bridge connection closed");
            }
            Err(SessionEnd::Remote) => {}
        }

        attempts += 1;
        record_attempts(&task, attempts);
        if !task.policy.should_retry(attempts) {
            tracing::warn!(
                capability = %task.capability,
                attempts,
                "reconnect budget exhausted, endpoint closed"
            );
            set_status(&task, ConnectionStatus::Closed);
            return;
        }

        set_status(&task, ConnectionStatus::Reconnecting);
        let delay = task.policy.delay_for_attempt(attempts);
        tracing::info!(
            capability = %task.capability,
            attempt = attempts,
            delay_ms = delay.as_millis() as u64,
            "scheduling reconnect"
        );
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            changed = task.shutdown.changed() => {
                if changed.is_err() || *task.shutdown.borrow() {
                    set_status(&task, ConnectionStatus::Closed);
                    return;
                }
            }
        }
    }
}

/// Resolve the host's `connect()` waiter once the first dial attempt has an
/// outcome, successful or not.
fn notify_first_attempt(first_attempt: &mut Option<oneshot::Sender<()>>) {
    if let Some(first) = first_attempt.take() {
        let _ = first.send(());
    }
}

/// Mark the endpoint Open and zero the attempt counter; a successful open
/// resets the budget.
fn mark_open(task: &EndpointTask) {
    let mut records = task.records.lock().expect("host records lock poisoned");
    if let Some(record) = records.get_mut(&task.capability) {
        record.status = ConnectionStatus::Open;
        record.reconnect_attempts = 0;
    }
}

fn set_status(task: &EndpointTask, status: ConnectionStatus) {
    let mut records = task.records.lock().expect("host records lock poisoned");
    if let Some(record) = records.get_mut(&task.capability) {
        record.status = status;
    }
}

fn record_attempts(task: &EndpointTask, attempts: u32) {
    let mut records = task.records.lock().expect("host records lock poisoned");
    if let Some(record) = records.get_mut(&task.capability) {
        record.reconnect_attempts = attempts;
    }
}

fn shutdown_requested(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

/// Dispatch one inbound envelope and build its correlated reply. Envelopes
/// without an id still execute, but there is nothing to correlate a reply
/// with, so none is sent.
async fn handle_envelope(
    raw: &str,
    capability: Capability,
    ctx: &Arc<HandlerContext>,
    router: &CommandRouter<HandlerContext>,
) -> Option<ResultFrame> {
    let envelope: CommandEnvelope = match serde_json::from_str(raw) {
        Ok(envelope) => envelope,
        Err(err) => {
            tracing::warn!(%capability, error = %err, "malformed command envelope");
            return None;
        }
    };
    let id = envelope.id.clone();
    let result = router.dispatch(ctx.clone(), envelope).await;
    match id {
        Some(id) => Some(ResultFrame { id, result }),
        None => {
            tracing::warn!(%capability, "command arrived without a correlation id");
            None
        }
    }
}

fn ws_url(base_url: &str, capability: Capability) -> String {
    let ws_base = if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base_url.to_owned()
    };
    format!("{}/bridge/{capability}/channel", ws_base.trim_end_matches('/'))
}

async fn run_socket_session(
    task: &mut EndpointTask,
    first_attempt: &mut Option<oneshot::Sender<()>>,
) -> Result<SessionEnd, SessionEnd> {
    if shutdown_requested(&task.shutdown) {
        return Ok(SessionEnd::Shutdown);
    }

    let url = ws_url(&task.base_url, task.capability);
    let dialed = tokio_tungstenite::connect_async(url.as_str()).await;
    notify_first_attempt(first_attempt);
    let (stream, _response) = match dialed {
        Ok(connected) => connected,
        Err(err) => {
            tracing::warn!(capability = %task.capability, error = %err, "socket dial failed");
            return Err(SessionEnd::Remote);
        }
    };
    mark_open(task);
    tracing::info!(capability = %task.capability, %url, "socket channel open");

    let (mut sink, mut source) = stream.split();
    let mut heartbeat = tokio::time::interval(task.heartbeat);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    heartbeat.reset();

    loop {
        tokio::select! {
            changed = task.shutdown.changed() => {
                if changed.is_err() || *task.shutdown.borrow() {
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(SessionEnd::Shutdown);
                }
            }
            _ = heartbeat.tick() => {
                if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                    return Ok(SessionEnd::Remote);
                }
            }
            inbound = source.next() => {
                match inbound {
                    None => return Ok(SessionEnd::Remote),
                    Some(Err(err)) => {
                        tracing::warn!(capability = %task.capability, error = %err, "socket read failed");
                        return Ok(SessionEnd::Remote);
                    }
                    Some(Ok(Message::Text(text))) => {
                        let Some(frame) =
                            handle_envelope(text.as_str(), task.capability, &task.ctx, &task.router).await
                        else {
                            continue;
                        };
                        let reply = match serde_json::to_string(&frame) {
                            Ok(reply) => reply,
                            Err(err) => {
                                tracing::warn!(capability = %task.capability, error = %err, "unserializable result");
                                continue;
                            }
                        };
                        if sink.send(Message::Text(reply.into())).await.is_err() {
                            return Ok(SessionEnd::Remote);
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = sink.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Close(_))) => return Ok(SessionEnd::Remote),
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

async fn run_stream_session(
    task: &mut EndpointTask,
    first_attempt: &mut Option<oneshot::Sender<()>>,
) -> Result<SessionEnd, SessionEnd> {
    if shutdown_requested(&task.shutdown) {
        return Ok(SessionEnd::Shutdown);
    }

    let client = reqwest::Client::new();
    let base = task.base_url.trim_end_matches('/');
    let events_url = format!("{base}/bridge/{}/events", task.capability);
    let result_url = format!("{base}/bridge/{}/result", task.capability);

    let subscribed = client
        .get(&events_url)
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .send()
        .await;
    notify_first_attempt(first_attempt);
    let response = match subscribed {
        Ok(response) if response.status().is_success() => response,
        Ok(response) => {
            tracing::warn!(
                capability = %task.capability,
                status = %response.status(),
                "event stream subscription rejected"
            );
            return Err(SessionEnd::Remote);
        }
        Err(err) => {
            tracing::warn!(capability = %task.capability, error = %err, "event stream dial failed");
            return Err(SessionEnd::Remote);
        }
    };
    mark_open(task);
    tracing::info!(capability = %task.capability, url = %events_url, "event stream open");

    let mut chunks = response.bytes_stream();
    let mut buffer = String::new();

    loop {
        tokio::select! {
            changed = task.shutdown.changed() => {
                if changed.is_err() || *task.shutdown.borrow() {
                    return Ok(SessionEnd::Shutdown);
                }
            }
            chunk = chunks.next() => {
                match chunk {
                    None => return Ok(SessionEnd::Remote),
                    Some(Err(err)) => {
                        tracing::warn!(capability = %task.capability, error = %err, "event stream read failed");
                        return Ok(SessionEnd::Remote);
                    }
                    Some(Ok(bytes)) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                        for data in drain_sse_events(&mut buffer) {
                            let Some(frame) =
                                handle_envelope(&data, task.capability, &task.ctx, &task.router).await
                            else {
                                continue;
                            };
                            deliver_result(&client, &result_url, task.capability, &frame).await;
                        }
                    }
                }
            }
        }
    }
}

/// Result delivery on the stream strategy is best effort: the event source
/// may be down, and the handler's side effects already happened. Failure is
/// logged, never retried, and never re-thrown into application logic.
async fn deliver_result(
    client: &reqwest::Client,
    result_url: &str,
    capability: Capability,
    frame: &ResultFrame,
) {
    match client.post(result_url).json(frame).send().await {
        Ok(response) if response.status().is_success() => {}
        Ok(response) => {
            tracing::warn!(
                %capability,
                id = %frame.id,
                status = %response.status(),
                "result delivery rejected"
            );
        }
        Err(err) => {
            tracing::warn!(%capability, id = %frame.id, error = %err, "result delivery failed");
        }
    }
}

/// Pull complete SSE events out of `buffer`, returning each event's joined
/// data payload. Incomplete trailing input stays buffered.
fn drain_sse_events(buffer: &mut String) -> Vec<String> {
    if buffer.contains("\r\n") {
        // A trailing lone '\r' pairs up once the next chunk arrives.
        *buffer = buffer.replace("\r\n", "\n");
    }
    let mut events = Vec::new();
    while let Some(boundary) = buffer.find("\n\n") {
        let block: String = buffer.drain(..boundary + 2).collect();
        let mut data_lines = Vec::new();
        for line in block.lines() {
            if let Some(rest) = line.strip_prefix("data:") {
                data_lines.push(rest.strip_prefix(' ').unwrap_or(rest).to_owned());
            }
            // Comment and retry lines are ignored.
        }
        if !data_lines.is_empty() {
            events.push(data_lines.join("\n"));
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_swaps_scheme_and_appends_the_channel_path() {
        assert_eq!(
            ws_url("http://127.0.0.1:7700", Capability::Camera),
            "ws://127.0.0.1:7700/bridge/camera/channel"
        );
        assert_eq!(
            ws_url("https://bridge.example/", Capability::Geo),
            "wss://bridge.example/bridge/geo/channel"
        );
    }

    #[test]
    fn sse_parser_extracts_data_and_keeps_partial_input() {
        let mut buffer = String::from("data: {\"a\":1}\n\n: keep-alive\n\ndata: {\"b\"");
        let events = drain_sse_events(&mut buffer);
        assert_eq!(events, vec!["{\"a\":1}".to_owned()]);
        assert_eq!(buffer, "data: {\"b\"");

        buffer.push_str(":2}\n\n");
        let events = drain_sse_events(&mut buffer);
        assert_eq!(events, vec!["{\"b\":2}".to_owned()]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn sse_parser_joins_multiline_data_and_handles_crlf() {
        let mut buffer = String::from("data: line one\r\ndata: line two\r\n\r\n");
        // CRLF event boundaries arrive as \r\n\r\n; normalize check.
        let events = drain_sse_events(&mut buffer);
        assert_eq!(events, vec!["line one\nline two".to_owned()]);
    }

    #[tokio::test]
    async fn handle_envelope_drops_uncorrelated_commands() {
        let ctx = crate::capability::test_context();
        let router = crate::capability::camera::router();
        let frame = handle_envelope(
            "{\"type\":\"camera_status\"}",
            Capability::Camera,
            &ctx,
            &router,
        )
        .await;
        assert!(frame.is_none());
    }

    #[tokio::test]
    async fn handle_envelope_replies_with_the_command_id() {
        let ctx = crate::capability::test_context();
        let router = crate::capability::camera::router();
        let frame = handle_envelope(
            "{\"id\":\"c-3\",\"type\":\"camera_status\"}",
            Capability::Camera,
            &ctx,
            &router,
        )
        .await
        .expect("frame");
        assert_eq!(frame.id, "c-3");
        assert!(frame.result.success);
    }

    #[tokio::test]
    async fn handle_envelope_tolerates_malformed_input() {
        let ctx = crate::capability::test_context();
        let router = crate::capability::camera::router();
        assert!(handle_envelope("not json", Capability::Camera, &ctx, &router)
            .await
            .is_none());
    }
}
