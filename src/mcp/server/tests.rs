// SPDX-FileCopyrightText: 2026 Terrella Contributors
// SPDX-License-Identifier: MIT

use super::*;
use crate::bridge::{TransportStrategy, DEFAULT_COMMAND_TIMEOUT};
use crate::capability::{self, HandlerContext};
use crate::model::{GeoPosition, Waypoint};
use crate::protocol::ResultFrame;

fn fresh_mcp() -> TerrellaMcp {
    let bridge = Arc::new(ViewerBridge::new(
        TransportStrategy::Socket,
        DEFAULT_COMMAND_TIMEOUT,
    ));
    TerrellaMcp::new(bridge)
}

/// Attach an in-process viewer to every capability channel: envelopes are
/// dispatched straight into the capability routers and completed back on the
/// bridge, exercising the whole correlation path without a socket.
fn spawn_loopback_viewer(bridge: &Arc<ViewerBridge>) -> Arc<HandlerContext> {
    let ctx = capability::test_context();
    for (capability, router) in capability::build_routers() {
        let mut feed = bridge.attach(capability);
        let bridge = bridge.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move {
            while let Some(envelope) = feed.receiver.recv().await {
                let Some(id) = envelope.id.clone() else { continue };
                let result = router.dispatch(ctx.clone(), envelope).await;
                bridge.complete(capability, ResultFrame { id, result });
            }
        });
    }
    ctx
}

fn view(longitude: f64, latitude: f64) -> CameraViewParams {
    CameraViewParams {
        longitude,
        latitude,
        height: None,
        heading_deg: None,
        pitch_deg: None,
        roll_deg: None,
    }
}

fn waypoints() -> Vec<Waypoint> {
    vec![
        Waypoint {
            position: GeoPosition::new(0.0, 0.0, 0.0),
            time_offset_s: 0.0,
        },
        Waypoint {
            position: GeoPosition::new(10.0, 10.0, 0.0),
            time_offset_s: 10.0,
        },
    ]
}

#[tokio::test]
async fn validation_failure_is_result_shaped_not_a_protocol_error() {
    let mcp = fresh_mcp();
    let Json(outcome) = mcp
        .camera_set_view(Parameters(view(999.0, 0.0)))
        .await
        .expect("tools never surface protocol errors for domain failures");
    assert!(!outcome.success);
    let error = outcome.error.expect("error populated");
    assert!(error.contains("longitude"), "got {error}");
    // The check fired before the bridge: no command was ever sent.
    assert!(mcp.bridge().status().iter().all(|channel| channel.commands_sent == 0));
}

#[tokio::test]
async fn disconnected_viewer_is_a_user_visible_failure() {
    let mcp = fresh_mcp();
    let Json(outcome) = mcp.camera_status().await.expect("result-shaped");
    assert!(!outcome.success);
    assert!(outcome.error.expect("error").contains("not connected"));
}

#[tokio::test]
async fn entity_tools_round_trip_through_the_bridge() {
    let mcp = fresh_mcp();
    let _ctx = spawn_loopback_viewer(mcp.bridge());

    let Json(created) = mcp
        .entity_create(Parameters(EntityCreateParams {
            entity_id: Some("pin-1".to_owned()),
            name: Some("Pin".to_owned()),
            kind: None,
            position: Some(GeoPosition::new(13.4, 52.5, 0.0)),
            positions: None,
            properties: None,
        }))
        .await
        .expect("result-shaped");
    assert!(created.success, "{:?}", created.error);
    assert_eq!(created.data["entity_id"], "pin-1");

    let Json(listed) = mcp.entity_list().await.expect("result-shaped");
    assert!(listed.success);
    assert_eq!(listed.data["count"], 1);

    let Json(removed) = mcp
        .entity_remove(Parameters(EntityTargetParams {
            entity_id: "pin-1".to_owned(),
        }))
        .await
        .expect("result-shaped");
    assert!(removed.success);

    let Json(missing) = mcp
        .entity_remove(Parameters(EntityTargetParams {
            entity_id: "pin-1".to_owned(),
        }))
        .await
        .expect("result-shaped");
    assert!(!missing.success, "second remove fails gracefully");
}

#[tokio::test]
async fn animation_lifecycle_matches_the_scene_store() {
    let mcp = fresh_mcp();
    let _ctx = spawn_loopback_viewer(mcp.bridge());

    let Json(entity) = mcp
        .entity_create(Parameters(EntityCreateParams {
            entity_id: Some("rover".to_owned()),
            name: None,
            kind: None,
            position: Some(GeoPosition::new(0.0, 0.0, 0.0)),
            positions: None,
            properties: None,
        }))
        .await
        .expect("result-shaped");
    assert!(entity.success);

    let Json(created) = mcp
        .animation_create(Parameters(AnimationCreateParams {
            animation_id: Some("anim_1".to_owned()),
            entity_id: "rover".to_owned(),
            waypoints: waypoints(),
            speed: None,
            loop_mode: None,
            start_playing: false,
        }))
        .await
        .expect("result-shaped");
    assert!(created.success, "{:?}", created.error);

    let Json(listed) = mcp.animation_list().await.expect("result-shaped");
    assert_eq!(listed.data["count"], 1);
    assert_eq!(listed.data["animations"][0]["animation_id"], "anim_1");

    let Json(removed) = mcp
        .animation_remove(Parameters(AnimationTargetParams {
            animation_id: "anim_1".to_owned(),
        }))
        .await
        .expect("result-shaped");
    assert!(removed.success);

    let Json(relisted) = mcp.animation_list().await.expect("result-shaped");
    assert_eq!(relisted.data["count"], 0);
}

#[tokio::test]
async fn animation_create_validates_waypoints_before_the_bridge() {
    let mcp = fresh_mcp();
    let Json(outcome) = mcp
        .animation_create(Parameters(AnimationCreateParams {
            animation_id: None,
            entity_id: "rover".to_owned(),
            waypoints: Vec::new(),
            speed: None,
            loop_mode: None,
            start_playing: false,
        }))
        .await
        .expect("result-shaped");
    assert!(!outcome.success);
    assert!(outcome.error.expect("error").contains("2 waypoints"));
}

#[tokio::test]
async fn fly_to_budget_covers_the_flight_duration() {
    let mcp = fresh_mcp();
    let _ctx = spawn_loopback_viewer(mcp.bridge());

    let Json(outcome) = mcp
        .camera_fly_to(Parameters(CameraFlyToParams {
            view: view(2.35, 48.86),
            duration_s: Some(0.05),
        }))
        .await
        .expect("result-shaped");
    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(outcome.data["outcome"], "completed");
}

#[tokio::test]
async fn geo_tools_cache_and_evict_fixes() {
    let mcp = fresh_mcp();
    let _ctx = spawn_loopback_viewer(mcp.bridge());

    let Json(resolved) = mcp
        .geo_geocode(Parameters(GeocodeParams {
            query: "berlin".to_owned(),
            location_id: Some("hq".to_owned()),
        }))
        .await
        .expect("result-shaped");
    assert!(resolved.success, "{:?}", resolved.error);
    assert_eq!(resolved.data["location_id"], "hq");

    let Json(cached) = mcp.geo_cache_list().await.expect("result-shaped");
    assert_eq!(cached.data["count"], 1);

    let Json(evicted) = mcp
        .geo_cache_remove(Parameters(LocationTargetParams {
            location_id: "hq".to_owned(),
        }))
        .await
        .expect("result-shaped");
    assert!(evicted.success);
}

#[tokio::test]
async fn search_rejects_nonpositive_radius_in_the_facade() {
    let mcp = fresh_mcp();
    let Json(outcome) = mcp
        .geo_search_nearby(Parameters(SearchNearbyParams {
            longitude: 2.35,
            latitude: 48.86,
            radius_m: 0.0,
            category: None,
            limit: None,
        }))
        .await
        .expect("result-shaped");
    assert!(!outcome.success);
    assert!(outcome.error.expect("error").contains("radius_m"));
}

#[tokio::test]
async fn bridge_status_reports_channels_and_counters() {
    let mcp = fresh_mcp();
    let Json(before) = mcp.bridge_status().await.expect("status");
    assert_eq!(before.channels.len(), 4);
    assert!(before.channels.iter().all(|channel| !channel.connected));

    let _ctx = spawn_loopback_viewer(mcp.bridge());
    let Json(after) = mcp.bridge_status().await.expect("status");
    assert!(after.channels.iter().all(|channel| channel.connected));
    assert_eq!(after.pending_commands, 0);
}

#[test]
fn flight_timeout_exceeds_the_duration_by_the_network_buffer() {
    let timeout = flight_timeout(12.0);
    assert_eq!(timeout, Duration::from_secs_f64(12.0 + FLIGHT_NETWORK_BUFFER_S));
}
