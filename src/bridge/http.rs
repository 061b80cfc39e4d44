// SPDX-FileCopyrightText: 2026 Terrella Contributors
// SPDX-License-Identifier: MIT

//! HTTP surface of the bridge: the WebSocket channel (socket strategy) and
//! the SSE event stream + result POST pair (stream strategy).

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use crate::protocol::{Capability, ResultFrame};

use super::{TransportStrategy, ViewerBridge};

/// Bridge routes, mounted next to the MCP service on the same server.
pub fn router(bridge: Arc<ViewerBridge>) -> Router {
    Router::new()
        .route("/bridge/{capability}/channel", get(channel_handler))
        .route("/bridge/{capability}/events", get(events_handler))
        .route("/bridge/{capability}/result", post(result_handler))
        .with_state(bridge)
}

fn parse_capability(raw: &str) -> Result<Capability, Response> {
    raw.parse().map_err(|_| {
        (StatusCode::NOT_FOUND, format!("unknown capability: {raw}")).into_response()
    })
}

async fn channel_handler(
    State(bridge): State<Arc<ViewerBridge>>,
    Path(capability): Path<String>,
    upgrade: WebSocketUpgrade,
) -> Response {
    let capability = match parse_capability(&capability) {
        Ok(capability) => capability,
        Err(response) => return response,
    };
    if bridge.strategy() != TransportStrategy::Socket {
        return (
            StatusCode::CONFLICT,
            "bridge is configured for the stream strategy",
        )
            .into_response();
    }
    upgrade
        .on_upgrade(move |socket| serve_channel(bridge, capability, socket))
        .into_response()
}

async fn serve_channel(bridge: Arc<ViewerBridge>, capability: Capability, mut socket: WebSocket) {
    let mut feed = bridge.attach(capability);
    tracing::info!(%capability, "viewer channel attached");

    loop {
        tokio::select! {
            outbound = feed.receiver.recv() => {
                // A closed feed means a newer attachment superseded this one.
                let Some(envelope) = outbound else { break };
                let frame = match serde_json::to_string(&envelope) {
                    Ok(frame) => frame,
                    Err(err) => {
                        tracing::warn!(%capability, error = %err, "unserializable envelope");
                        continue;
                    }
                };
                if socket.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => accept_result(&bridge, capability, text.as_str()),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        tracing::warn!(%capability, error = %err, "viewer channel error");
                        break;
                    }
                }
            }
        }
    }

    bridge.detach(capability, feed.generation);
    tracing::info!(%capability, "viewer channel detached");
}

/// A malformed frame degrades to a log line; it never crashes the process
/// or the channel task.
fn accept_result(bridge: &ViewerBridge, capability: Capability, text: &str) {
    match serde_json::from_str::<ResultFrame>(text) {
        Ok(frame) => {
            bridge.complete(capability, frame);
        }
        Err(err) => {
            tracing::warn!(%capability, error = %err, "malformed result frame");
        }
    }
}

/// Detaches the SSE attachment when the subscriber goes away and the stream
/// is dropped.
struct SseAttachment {
    bridge: Arc<ViewerBridge>,
    capability: Capability,
    generation: u64,
}

impl Drop for SseAttachment {
    fn drop(&mut self) {
        self.bridge.detach(self.capability, self.generation);
        tracing::info!(capability = %self.capability, "viewer event stream detached");
    }
}

async fn events_handler(
    State(bridge): State<Arc<ViewerBridge>>,
    Path(capability): Path<String>,
) -> Response {
    let capability = match parse_capability(&capability) {
        Ok(capability) => capability,
        Err(response) => return response,
    };
    if bridge.strategy() != TransportStrategy::Stream {
        return (
            StatusCode::CONFLICT,
            "bridge is configured for the socket strategy",
        )
            .into_response();
    }

    let feed = bridge.attach(capability);
    tracing::info!(%capability, "viewer event stream attached");
    let attachment = SseAttachment {
        bridge,
        capability,
        generation: feed.generation,
    };

    let stream = futures_util::stream::unfold(
        (feed.receiver, attachment),
        |(mut receiver, attachment)| async move {
            loop {
                let envelope = receiver.recv().await?;
                match serde_json::to_string(&envelope) {
                    Ok(data) => {
                        let event = Event::default().data(data);
                        return Some((Ok::<_, Infallible>(event), (receiver, attachment)));
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "unserializable envelope");
                    }
                }
            }
        },
    );

    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

async fn result_handler(
    State(bridge): State<Arc<ViewerBridge>>,
    Path(capability): Path<String>,
    Json(frame): Json<ResultFrame>,
) -> Response {
    let capability = match parse_capability(&capability) {
        Ok(capability) => capability,
        Err(response) => return response,
    };
    let accepted = bridge.complete(capability, frame);
    Json(json!({ "accepted": accepted })).into_response()
}
