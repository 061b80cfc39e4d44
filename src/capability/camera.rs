// SPDX-FileCopyrightText: 2026 Terrella Contributors
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use crate::engine::CameraPose;
use crate::model::GeoPosition;
use crate::protocol::{Capability, CommandEnvelope, CommandResult};
use crate::router::{CommandRouter, HandlerError, HandlerFuture};

use super::HandlerContext;

const DEFAULT_FLIGHT_DURATION_S: f64 = 3.0;

pub fn router() -> CommandRouter<HandlerContext> {
    let mut router = CommandRouter::new(Capability::Camera);
    router.register("camera_set_view", |ctx, envelope| -> HandlerFuture {
        Box::pin(set_view(ctx, envelope))
    });
    router.register("camera_fly_to", |ctx, envelope| -> HandlerFuture {
        Box::pin(fly_to(ctx, envelope))
    });
    router.register("camera_track_entity", |ctx, envelope| -> HandlerFuture {
        Box::pin(track_entity(ctx, envelope))
    });
    router.register("camera_stop_tracking", |ctx, envelope| -> HandlerFuture {
        Box::pin(stop_tracking(ctx, envelope))
    });
    router.register("camera_status", |ctx, envelope| -> HandlerFuture {
        Box::pin(status(ctx, envelope))
    });
    // Pre-rename command spelling still in the wild.
    router.register_alias("camera_flyto", "camera_fly_to");
    router
}

#[derive(Debug, Deserialize)]
struct ViewParams {
    longitude: f64,
    latitude: f64,
    #[serde(default)]
    height: Option<f64>,
    #[serde(default)]
    heading_deg: f64,
    #[serde(default = "default_pitch")]
    pitch_deg: f64,
    #[serde(default)]
    roll_deg: f64,
    #[serde(default)]
    duration_s: Option<f64>,
}

fn default_pitch() -> f64 {
    -90.0
}

impl ViewParams {
    fn pose(&self) -> Result<CameraPose, HandlerError> {
        let position = GeoPosition::new(
            self.longitude,
            self.latitude,
            self.height.unwrap_or(1_000_000.0),
        );
        if !position.is_valid() {
            return Err(HandlerError::InvalidParams(format!(
                "position out of range: longitude {}, latitude {}",
                self.longitude, self.latitude
            )));
        }
        Ok(CameraPose {
            position,
            heading_deg: self.heading_deg,
            pitch_deg: self.pitch_deg,
            roll_deg: self.roll_deg,
        })
    }
}

async fn set_view(
    ctx: Arc<HandlerContext>,
    envelope: CommandEnvelope,
) -> Result<CommandResult, HandlerError> {
    let params: ViewParams = envelope.params()?;
    let pose = params.pose()?;
    ctx.engine.set_camera(pose);
    Ok(CommandResult::ok_with("camera repositioned")
        .with_field("camera", serde_json::to_value(pose)?))
}

async fn fly_to(
    ctx: Arc<HandlerContext>,
    envelope: CommandEnvelope,
) -> Result<CommandResult, HandlerError> {
    let params: ViewParams = envelope.params()?;
    let pose = params.pose()?;
    let duration_s = params.duration_s.unwrap_or(DEFAULT_FLIGHT_DURATION_S);
    if !(duration_s.is_finite() && duration_s >= 0.0) {
        return Err(HandlerError::InvalidParams(format!(
            "duration_s must be a non-negative number, got {duration_s}"
        )));
    }

    // The flight is the suspension point; a newer reposition settles it as
    // cancelled, which is normal operation rather than a failure.
    let outcome = ctx.engine.fly_camera(pose, duration_s).await;
    Ok(
        CommandResult::ok_with(format!("camera flight {}", outcome.as_str()))
            .with_field("outcome", json!(outcome.as_str()))
            .with_field("duration_s", json!(duration_s))
            .with_field("camera", serde_json::to_value(pose)?),
    )
}

#[derive(Debug, Deserialize)]
struct TrackParams {
    entity_id: String,
}

async fn track_entity(
    ctx: Arc<HandlerContext>,
    envelope: CommandEnvelope,
) -> Result<CommandResult, HandlerError> {
    let params: TrackParams = envelope.params()?;
    let mut session = ctx.session.lock().await;
    if !session.entities().contains(&params.entity_id) {
        return Err(HandlerError::NotFound(format!(
            "entity {} not found",
            params.entity_id
        )));
    }
    let previous = session.set_tracked_entity(Some(params.entity_id.clone()));
    ctx.engine.track_object(Some(&params.entity_id));
    drop(session);

    Ok(CommandResult::ok_with(format!("tracking entity {}", params.entity_id))
        .with_field("entity_id", json!(params.entity_id))
        .with_field("previous_entity_id", json!(previous)))
}

async fn stop_tracking(
    ctx: Arc<HandlerContext>,
    _envelope: CommandEnvelope,
) -> Result<CommandResult, HandlerError> {
    let mut session = ctx.session.lock().await;
    let previous = session.set_tracked_entity(None);
    ctx.engine.track_object(None);
    drop(session);

    let message = match &previous {
        Some(entity_id) => format!("stopped tracking entity {entity_id}"),
        None => "nothing was tracked".to_owned(),
    };
    Ok(CommandResult::ok_with(message).with_field("previous_entity_id", json!(previous)))
}

async fn status(
    ctx: Arc<HandlerContext>,
    _envelope: CommandEnvelope,
) -> Result<CommandResult, HandlerError> {
    let session = ctx.session.lock().await;
    let tracked = session.tracked_entity().map(ToOwned::to_owned);
    drop(session);

    Ok(CommandResult::ok()
        .with_field("camera", serde_json::to_value(ctx.engine.camera())?)
        .with_field("clock", serde_json::to_value(ctx.engine.clock())?)
        .with_field("tracked_entity_id", json!(tracked)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::test_context;
    use crate::model::{EntityKind, EntityRecord};
    use serde_json::json;

    fn envelope(command: &str, payload: serde_json::Value) -> CommandEnvelope {
        CommandEnvelope::with_payload(command, payload).expect("envelope")
    }

    #[tokio::test]
    async fn set_view_moves_the_camera() {
        let ctx = test_context();
        let router = router();
        let result = router
            .dispatch(
                ctx.clone(),
                envelope(
                    "camera_set_view",
                    json!({ "longitude": 13.4, "latitude": 52.5, "height": 2000.0 }),
                ),
            )
            .await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(ctx.engine.camera().position.latitude, 52.5);
    }

    #[tokio::test]
    async fn set_view_rejects_out_of_range_positions() {
        let ctx = test_context();
        let result = router()
            .dispatch(
                ctx,
                envelope("camera_set_view", json!({ "longitude": 480.0, "latitude": 12.0 })),
            )
            .await;
        assert!(!result.success);
        assert!(result.error.expect("error").contains("out of range"));
    }

    #[tokio::test]
    async fn fly_to_reports_the_outcome() {
        let ctx = test_context();
        let result = router()
            .dispatch(
                ctx,
                envelope(
                    "camera_fly_to",
                    json!({ "longitude": 2.35, "latitude": 48.86, "duration_s": 0.02 }),
                ),
            )
            .await;
        assert!(result.success);
        assert_eq!(result.data["outcome"], "completed");
    }

    #[tokio::test]
    async fn flyto_alias_reaches_the_same_handler() {
        let ctx = test_context();
        let result = router()
            .dispatch(
                ctx,
                envelope(
                    "camera_flyto",
                    json!({ "longitude": 2.35, "latitude": 48.86, "duration_s": 0.0 }),
                ),
            )
            .await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn tracking_requires_an_existing_entity() {
        let ctx = test_context();
        let result = router()
            .dispatch(
                ctx,
                envelope("camera_track_entity", json!({ "entity_id": "entity_missing" })),
            )
            .await;
        assert!(!result.success);
        assert!(result.error.expect("error").contains("not found"));
    }

    #[tokio::test]
    async fn track_then_stop_round_trips() {
        let ctx = test_context();
        let entity_id = {
            let mut session = ctx.session.lock().await;
            session
                .entities_mut()
                .create(
                    None,
                    EntityRecord::at(EntityKind::Point, GeoPosition::new(0.0, 0.0, 0.0)),
                )
                .expect("create entity")
        };

        let router = router();
        let tracked = router
            .dispatch(
                ctx.clone(),
                envelope("camera_track_entity", json!({ "entity_id": entity_id })),
            )
            .await;
        assert!(tracked.success);
        assert_eq!(ctx.engine.tracked_object().as_deref(), Some(entity_id.as_str()));

        let stopped = router
            .dispatch(ctx.clone(), CommandEnvelope::new("camera_stop_tracking"))
            .await;
        assert!(stopped.success);
        assert_eq!(stopped.data["previous_entity_id"], json!(entity_id));
        assert_eq!(ctx.engine.tracked_object(), None);

        // Idempotent: stopping again succeeds and reports nothing tracked.
        let again = router
            .dispatch(ctx, CommandEnvelope::new("camera_stop_tracking"))
            .await;
        assert!(again.success);
        assert_eq!(again.data["previous_entity_id"], json!(null));
    }

    #[tokio::test]
    async fn status_reports_camera_clock_and_tracking() {
        let ctx = test_context();
        let result = router()
            .dispatch(ctx, CommandEnvelope::new("camera_status"))
            .await;
        assert!(result.success);
        assert!(result.data["camera"]["position"]["longitude"].is_number());
        assert!(result.data["clock"]["should_animate"].is_boolean());
        assert_eq!(result.data["tracked_entity_id"], json!(null));
    }
}
