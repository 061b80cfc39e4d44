// SPDX-FileCopyrightText: 2026 Terrella Contributors
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::model::{AnimationRecord, LoopMode, Waypoint};
use crate::protocol::{Capability, CommandEnvelope, CommandResult};
use crate::router::{CommandRouter, HandlerError, HandlerFuture};

use super::HandlerContext;

pub fn router() -> CommandRouter<HandlerContext> {
    let mut router = CommandRouter::new(Capability::Animation);
    router.register("animation_create", |ctx, envelope| -> HandlerFuture {
        Box::pin(create(ctx, envelope))
    });
    router.register("animation_play", |ctx, envelope| -> HandlerFuture {
        Box::pin(play(ctx, envelope))
    });
    router.register("animation_pause", |ctx, envelope| -> HandlerFuture {
        Box::pin(pause(ctx, envelope))
    });
    router.register("animation_update", |ctx, envelope| -> HandlerFuture {
        Box::pin(update(ctx, envelope))
    });
    router.register("animation_list", |ctx, envelope| -> HandlerFuture {
        Box::pin(list(ctx, envelope))
    });
    router.register("animation_remove", |ctx, envelope| -> HandlerFuture {
        Box::pin(remove(ctx, envelope))
    });
    // Older clients use start/stop.
    router.register_alias("animation_start", "animation_play");
    router.register_alias("animation_stop", "animation_pause");
    router
}

#[derive(Debug, Deserialize)]
struct CreateParams {
    #[serde(default)]
    animation_id: Option<String>,
    entity_id: String,
    waypoints: Vec<Waypoint>,
    #[serde(default)]
    speed: Option<f64>,
    #[serde(default)]
    loop_mode: Option<LoopMode>,
    #[serde(default)]
    start_playing: bool,
}

async fn create(
    ctx: Arc<HandlerContext>,
    envelope: CommandEnvelope,
) -> Result<CommandResult, HandlerError> {
    let params: CreateParams = envelope.params()?;

    if params.waypoints.len() < 2 {
        return Err(HandlerError::InvalidParams(format!(
            "an animation needs at least 2 waypoints, got {}",
            params.waypoints.len()
        )));
    }
    for pair in params.waypoints.windows(2) {
        if pair[1].time_offset_s < pair[0].time_offset_s {
            return Err(HandlerError::InvalidParams(
                "waypoint time offsets must be non-decreasing".to_owned(),
            ));
        }
    }
    if params.waypoints[0].time_offset_s < 0.0 {
        return Err(HandlerError::InvalidParams(
            "waypoint time offsets must not be negative".to_owned(),
        ));
    }
    if let Some(bad) = params
        .waypoints
        .iter()
        .find(|waypoint| !waypoint.position.is_valid())
    {
        return Err(HandlerError::InvalidParams(format!(
            "waypoint position out of range: longitude {}, latitude {}",
            bad.position.longitude, bad.position.latitude
        )));
    }
    let speed = params.speed.unwrap_or(1.0);
    if !(speed.is_finite() && speed > 0.0) {
        return Err(HandlerError::InvalidParams(format!(
            "speed must be positive, got {speed}"
        )));
    }

    let now_s = ctx.engine.now_s();
    let mut session = ctx.session.lock().await;
    // The target must exist at creation time; disappearing later is fine
    // (animation reads through entity_id stay nil-safe).
    if !session.entities().contains(&params.entity_id) {
        return Err(HandlerError::NotFound(format!(
            "entity {} not found",
            params.entity_id
        )));
    }

    let mut record = AnimationRecord::new(params.entity_id, params.waypoints);
    record.speed = speed;
    record.loop_mode = params.loop_mode.unwrap_or_default();
    if params.start_playing {
        record.playing = true;
        record.started_at_s = Some(now_s);
    }
    let duration_s = record.duration_s;
    let playing = record.playing;
    let animation_id = session
        .animations_mut()
        .create(params.animation_id, record)
        .map_err(|err| HandlerError::InvalidParams(err.to_string()))?;
    drop(session);

    Ok(CommandResult::ok_with(format!("animation {animation_id} created"))
        .with_field("animation_id", json!(animation_id))
        .with_field("duration_s", json!(duration_s))
        .with_field("playing", json!(playing)))
}

#[derive(Debug, Deserialize)]
struct TargetParams {
    animation_id: String,
}

async fn play(
    ctx: Arc<HandlerContext>,
    envelope: CommandEnvelope,
) -> Result<CommandResult, HandlerError> {
    let params: TargetParams = envelope.params()?;
    let now_s = ctx.engine.now_s();
    let mut session = ctx.session.lock().await;
    session
        .animations_mut()
        .update(&params.animation_id, |record| {
            if !record.playing {
                record.playing = true;
                record.started_at_s = Some(now_s);
            }
        })
        .map_err(|err| HandlerError::NotFound(err.to_string()))?;
    drop(session);

    Ok(CommandResult::ok_with(format!("animation {} playing", params.animation_id))
        .with_field("animation_id", json!(params.animation_id))
        .with_field("playing", json!(true)))
}

async fn pause(
    ctx: Arc<HandlerContext>,
    envelope: CommandEnvelope,
) -> Result<CommandResult, HandlerError> {
    let params: TargetParams = envelope.params()?;
    let now_s = ctx.engine.now_s();
    let mut session = ctx.session.lock().await;
    session
        .animations_mut()
        .update(&params.animation_id, |record| {
            record.checkpoint(now_s);
            record.playing = false;
            record.started_at_s = None;
        })
        .map_err(|err| HandlerError::NotFound(err.to_string()))?;
    let elapsed_s = session
        .animations()
        .get(&params.animation_id)
        .map(|record| record.elapsed_s(now_s))
        .unwrap_or(0.0);
    drop(session);

    Ok(CommandResult::ok_with(format!("animation {} paused", params.animation_id))
        .with_field("animation_id", json!(params.animation_id))
        .with_field("playing", json!(false))
        .with_field("elapsed_s", json!(elapsed_s)))
}

#[derive(Debug, Deserialize)]
struct UpdateParams {
    animation_id: String,
    #[serde(default)]
    speed: Option<f64>,
    #[serde(default)]
    loop_mode: Option<LoopMode>,
}

async fn update(
    ctx: Arc<HandlerContext>,
    envelope: CommandEnvelope,
) -> Result<CommandResult, HandlerError> {
    let params: UpdateParams = envelope.params()?;
    if let Some(speed) = params.speed {
        if !(speed.is_finite() && speed > 0.0) {
            return Err(HandlerError::InvalidParams(format!(
                "speed must be positive, got {speed}"
            )));
        }
    }

    let now_s = ctx.engine.now_s();
    let mut session = ctx.session.lock().await;
    session
        .animations_mut()
        .update(&params.animation_id, |record| {
            // Fold elapsed time at the old speed before switching rates.
            record.checkpoint(now_s);
            if let Some(speed) = params.speed {
                record.speed = speed;
            }
            if let Some(loop_mode) = params.loop_mode {
                record.loop_mode = loop_mode;
            }
        })
        .map_err(|err| HandlerError::NotFound(err.to_string()))?;
    drop(session);

    Ok(CommandResult::ok_with(format!("animation {} updated", params.animation_id))
        .with_field("animation_id", json!(params.animation_id)))
}

async fn list(
    ctx: Arc<HandlerContext>,
    _envelope: CommandEnvelope,
) -> Result<CommandResult, HandlerError> {
    let now_s = ctx.engine.now_s();
    let session = ctx.session.lock().await;
    let animations: Vec<Value> = session
        .animations()
        .iter()
        .map(|(animation_id, record)| {
            json!({
                "animation_id": animation_id,
                "entity_id": record.entity_id,
                // Nil-safe: the entity may have been removed out of band.
                "entity_exists": session.entities().contains(&record.entity_id),
                "playing": record.playing,
                "speed": record.speed,
                "loop_mode": record.loop_mode,
                "duration_s": record.duration_s,
                "elapsed_s": record.elapsed_s(now_s),
                "progress": record.progress(now_s),
            })
        })
        .collect();
    let count = animations.len();
    drop(session);

    Ok(CommandResult::ok()
        .with_field("animations", json!(animations))
        .with_field("count", json!(count)))
}

async fn remove(
    ctx: Arc<HandlerContext>,
    envelope: CommandEnvelope,
) -> Result<CommandResult, HandlerError> {
    let params: TargetParams = envelope.params()?;
    let mut session = ctx.session.lock().await;
    session
        .animations_mut()
        .remove(&params.animation_id)
        .map_err(|err| HandlerError::NotFound(err.to_string()))?;
    drop(session);

    Ok(CommandResult::ok_with(format!("animation {} removed", params.animation_id))
        .with_field("animation_id", json!(params.animation_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::test_context;
    use crate::model::{EntityKind, EntityRecord, GeoPosition};

    fn envelope(command: &str, payload: Value) -> CommandEnvelope {
        CommandEnvelope::with_payload(command, payload).expect("envelope")
    }

    async fn seed_entity(ctx: &HandlerContext, entity_id: &str) {
        let mut session = ctx.session.lock().await;
        session
            .entities_mut()
            .create(
                Some(entity_id.to_owned()),
                EntityRecord::at(EntityKind::Point, GeoPosition::new(0.0, 0.0, 0.0)),
            )
            .expect("seed entity");
    }

    fn two_waypoints() -> Value {
        json!([
            { "position": { "longitude": 0.0, "latitude": 0.0 }, "time_offset_s": 0.0 },
            { "position": { "longitude": 10.0, "latitude": 10.0 }, "time_offset_s": 10.0 },
        ])
    }

    #[tokio::test]
    async fn create_list_remove_round_trip() {
        let ctx = test_context();
        seed_entity(&ctx, "e1").await;
        let router = router();

        let created = router
            .dispatch(
                ctx.clone(),
                envelope(
                    "animation_create",
                    json!({
                        "animation_id": "anim_1",
                        "entity_id": "e1",
                        "waypoints": two_waypoints(),
                    }),
                ),
            )
            .await;
        assert!(created.success, "{:?}", created.error);
        assert_eq!(created.data["animation_id"], "anim_1");
        assert_eq!(created.data["duration_s"], 10.0);

        let listed = router
            .dispatch(ctx.clone(), CommandEnvelope::new("animation_list"))
            .await;
        assert_eq!(listed.data["count"], 1);
        assert_eq!(listed.data["animations"][0]["animation_id"], "anim_1");
        assert_eq!(listed.data["animations"][0]["entity_exists"], true);

        let removed = router
            .dispatch(
                ctx.clone(),
                envelope("animation_remove", json!({ "animation_id": "anim_1" })),
            )
            .await;
        assert!(removed.success);

        let relisted = router
            .dispatch(ctx, CommandEnvelope::new("animation_list"))
            .await;
        assert_eq!(relisted.data["count"], 0);
    }

    #[tokio::test]
    async fn create_rejects_fewer_than_two_waypoints() {
        let ctx = test_context();
        seed_entity(&ctx, "e1").await;
        let result = router()
            .dispatch(
                ctx,
                envelope(
                    "animation_create",
                    json!({
                        "entity_id": "e1",
                        "waypoints": [
                            { "position": { "longitude": 0.0, "latitude": 0.0 }, "time_offset_s": 0.0 },
                        ],
                    }),
                ),
            )
            .await;
        assert!(!result.success);
        assert!(result.error.expect("error").contains("2 waypoints"));
    }

    #[tokio::test]
    async fn create_rejects_malformed_ids() {
        let ctx = test_context();
        seed_entity(&ctx, "e1").await;
        let result = router()
            .dispatch(
                ctx,
                envelope(
                    "animation_create",
                    json!({
                        "animation_id": "anim 1",
                        "entity_id": "e1",
                        "waypoints": two_waypoints(),
                    }),
                ),
            )
            .await;
        assert!(!result.success);
        assert!(result.error.expect("error").contains("invalid id"));
    }

    #[tokio::test]
    async fn create_rejects_a_missing_entity() {
        let ctx = test_context();
        let result = router()
            .dispatch(
                ctx,
                envelope(
                    "animation_create",
                    json!({ "entity_id": "ghost", "waypoints": two_waypoints() }),
                ),
            )
            .await;
        assert!(!result.success);
        assert!(result.error.expect("error").contains("ghost"));
    }

    #[tokio::test]
    async fn create_rejects_decreasing_offsets() {
        let ctx = test_context();
        seed_entity(&ctx, "e1").await;
        let result = router()
            .dispatch(
                ctx,
                envelope(
                    "animation_create",
                    json!({
                        "entity_id": "e1",
                        "waypoints": [
                            { "position": { "longitude": 0.0, "latitude": 0.0 }, "time_offset_s": 5.0 },
                            { "position": { "longitude": 1.0, "latitude": 1.0 }, "time_offset_s": 1.0 },
                        ],
                    }),
                ),
            )
            .await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn play_pause_controls_progress_accumulation() {
        let ctx = test_context();
        seed_entity(&ctx, "e1").await;
        let router = router();
        router
            .dispatch(
                ctx.clone(),
                envelope(
                    "animation_create",
                    json!({
                        "animation_id": "a",
                        "entity_id": "e1",
                        "waypoints": two_waypoints(),
                    }),
                ),
            )
            .await;

        let played = router
            .dispatch(ctx.clone(), envelope("animation_play", json!({ "animation_id": "a" })))
            .await;
        assert!(played.success);

        let paused = router
            .dispatch(ctx.clone(), envelope("animation_pause", json!({ "animation_id": "a" })))
            .await;
        assert!(paused.success);
        assert!(paused.data["elapsed_s"].as_f64().expect("elapsed") >= 0.0);

        // Playing twice is idempotent.
        let again = router
            .dispatch(ctx.clone(), envelope("animation_play", json!({ "animation_id": "a" })))
            .await;
        assert!(again.success);

        let aliased = router
            .dispatch(ctx, envelope("animation_stop", json!({ "animation_id": "a" })))
            .await;
        assert!(aliased.success);
        assert_eq!(aliased.data["playing"], false);
    }

    #[tokio::test]
    async fn update_validates_speed() {
        let ctx = test_context();
        seed_entity(&ctx, "e1").await;
        let router = router();
        router
            .dispatch(
                ctx.clone(),
                envelope(
                    "animation_create",
                    json!({
                        "animation_id": "a",
                        "entity_id": "e1",
                        "waypoints": two_waypoints(),
                    }),
                ),
            )
            .await;

        let rejected = router
            .dispatch(
                ctx.clone(),
                envelope("animation_update", json!({ "animation_id": "a", "speed": 0.0 })),
            )
            .await;
        assert!(!rejected.success);

        let accepted = router
            .dispatch(
                ctx,
                envelope(
                    "animation_update",
                    json!({ "animation_id": "a", "speed": 2.0, "loop_mode": "repeat" }),
                ),
            )
            .await;
        assert!(accepted.success);
    }

    #[tokio::test]
    async fn control_commands_fail_gracefully_on_missing_ids() {
        let ctx = test_context();
        let router = router();
        for command in ["animation_play", "animation_pause", "animation_remove"] {
            let result = router
                .dispatch(ctx.clone(), envelope(command, json!({ "animation_id": "nope" })))
                .await;
            assert!(!result.success, "{command} should fail");
            assert!(result.error.expect("error").contains("nope"));
        }
    }

    #[tokio::test]
    async fn listing_survives_entity_removal() {
        let ctx = test_context();
        seed_entity(&ctx, "e1").await;
        let router = router();
        router
            .dispatch(
                ctx.clone(),
                envelope(
                    "animation_create",
                    json!({
                        "animation_id": "a",
                        "entity_id": "e1",
                        "waypoints": two_waypoints(),
                    }),
                ),
            )
            .await;

        {
            let mut session = ctx.session.lock().await;
            session.remove_entity("e1").expect("remove entity");
        }

        let listed = router.dispatch(ctx, CommandEnvelope::new("animation_list")).await;
        assert!(listed.success);
        assert_eq!(listed.data["animations"][0]["entity_exists"], false);
    }
}
