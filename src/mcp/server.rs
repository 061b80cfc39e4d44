// SPDX-FileCopyrightText: 2026 Terrella Contributors
// SPDX-License-Identifier: MIT

use std::sync::Arc;
use std::time::Duration;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::{Json, Parameters};
use rmcp::model::{ServerCapabilities, ServerInfo};
use rmcp::{tool, tool_handler, tool_router, ErrorData, ServerHandler, ServiceExt};
use serde::Serialize;

use crate::bridge::ViewerBridge;
use crate::model::Waypoint;
use crate::protocol::{Capability, CommandEnvelope};

use super::types::*;

/// Default budget for a quick scene mutation or query.
const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(10);
/// Budget for operations that hit a geolocation backend.
const GEO_TOOL_TIMEOUT: Duration = Duration::from_secs(15);
/// Slack added on top of an animated transition's own duration.
const FLIGHT_NETWORK_BUFFER_S: f64 = 5.0;

/// The tool façade: validates input shape, forwards a command envelope over
/// the bridge with an explicit timeout, and shapes the correlated result.
///
/// Tools never surface a domain failure as an MCP protocol error; validation
/// failures and transport failures alike come back as a result-shaped
/// response with `success: false`.
#[derive(Clone)]
pub struct TerrellaMcp {
    bridge: Arc<ViewerBridge>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl TerrellaMcp {
    pub fn new(bridge: Arc<ViewerBridge>) -> Self {
        Self {
            bridge,
            tool_router: Self::tool_router(),
        }
    }

    pub fn bridge(&self) -> &Arc<ViewerBridge> {
        &self.bridge
    }

    pub async fn serve_stdio(self) -> Result<(), rmcp::RmcpError> {
        let service = self.serve((tokio::io::stdin(), tokio::io::stdout())).await?;
        service.waiting().await?;
        Ok(())
    }

    async fn run(
        &self,
        capability: Capability,
        command: &str,
        params: impl Serialize,
        timeout: Duration,
    ) -> Json<CommandOutcome> {
        let envelope = match CommandEnvelope::with_payload(command, params) {
            Ok(envelope) => envelope,
            Err(err) => return Json(CommandOutcome::rejected(format!("invalid parameters: {err}"))),
        };
        let result = self
            .bridge
            .execute_command(capability, envelope, Some(timeout))
            .await;
        Json(result.into())
    }

    /// Instantly reposition the camera to a longitude/latitude/height view.
    #[tool(name = "camera.set_view")]
    async fn camera_set_view(
        &self,
        Parameters(params): Parameters<CameraViewParams>,
    ) -> Result<Json<CommandOutcome>, ErrorData> {
        if let Err(error) = validate_view(&params) {
            return Ok(Json(CommandOutcome::rejected(error)));
        }
        Ok(self
            .run(Capability::Camera, "camera_set_view", params, DEFAULT_TOOL_TIMEOUT)
            .await)
    }

    /// Fly the camera to a view over `duration_s` seconds; resolves when the
    /// flight completes or a newer reposition cancels it.
    #[tool(name = "camera.fly_to")]
    async fn camera_fly_to(
        &self,
        Parameters(params): Parameters<CameraFlyToParams>,
    ) -> Result<Json<CommandOutcome>, ErrorData> {
        if let Err(error) = validate_view(&params.view) {
            return Ok(Json(CommandOutcome::rejected(error)));
        }
        let duration_s = params.duration_s.unwrap_or(3.0);
        if let Err(error) = validate_duration(duration_s) {
            return Ok(Json(CommandOutcome::rejected(error)));
        }
        // The flight must be allowed to finish before the caller gives up.
        let timeout = flight_timeout(duration_s);
        Ok(self
            .run(Capability::Camera, "camera_fly_to", params, timeout)
            .await)
    }

    /// Keep the camera locked onto an entity created earlier.
    #[tool(name = "camera.track_entity")]
    async fn camera_track_entity(
        &self,
        Parameters(params): Parameters<EntityTargetParams>,
    ) -> Result<Json<CommandOutcome>, ErrorData> {
        Ok(self
            .run(
                Capability::Camera,
                "camera_track_entity",
                params,
                DEFAULT_TOOL_TIMEOUT,
            )
            .await)
    }

    /// Stop tracking; reports which entity was tracked, if any.
    #[tool(name = "camera.stop_tracking")]
    async fn camera_stop_tracking(&self) -> Result<Json<CommandOutcome>, ErrorData> {
        Ok(self
            .run(
                Capability::Camera,
                "camera_stop_tracking",
                serde_json::Map::new(),
                DEFAULT_TOOL_TIMEOUT,
            )
            .await)
    }

    /// Current camera pose, scene clock, and tracked entity.
    #[tool(name = "camera.status")]
    async fn camera_status(&self) -> Result<Json<CommandOutcome>, ErrorData> {
        Ok(self
            .run(
                Capability::Camera,
                "camera_status",
                serde_json::Map::new(),
                DEFAULT_TOOL_TIMEOUT,
            )
            .await)
    }

    /// Create one visual entity (point, label, billboard, polyline, model).
    #[tool(name = "entity.create")]
    async fn entity_create(
        &self,
        Parameters(params): Parameters<EntityCreateParams>,
    ) -> Result<Json<CommandOutcome>, ErrorData> {
        if let Err(error) = validate_entity_positions(&params) {
            return Ok(Json(CommandOutcome::rejected(error)));
        }
        Ok(self
            .run(Capability::Entity, "entity_create", params, DEFAULT_TOOL_TIMEOUT)
            .await)
    }

    /// Create a batch of entities; invalid entries are skipped and counted,
    /// the batch itself succeeds.
    #[tool(name = "entity.create_batch")]
    async fn entity_create_batch(
        &self,
        Parameters(params): Parameters<EntityCreateBatchParams>,
    ) -> Result<Json<CommandOutcome>, ErrorData> {
        if params.entities.is_empty() {
            return Ok(Json(CommandOutcome::rejected("entities must not be empty")));
        }
        Ok(self
            .run(
                Capability::Entity,
                "entity_create_batch",
                params,
                DEFAULT_TOOL_TIMEOUT,
            )
            .await)
    }

    /// Merge fields into an existing entity.
    #[tool(name = "entity.update")]
    async fn entity_update(
        &self,
        Parameters(params): Parameters<EntityUpdateParams>,
    ) -> Result<Json<CommandOutcome>, ErrorData> {
        Ok(self
            .run(Capability::Entity, "entity_update", params, DEFAULT_TOOL_TIMEOUT)
            .await)
    }

    /// Fetch one entity record by id.
    #[tool(name = "entity.get")]
    async fn entity_get(
        &self,
        Parameters(params): Parameters<EntityTargetParams>,
    ) -> Result<Json<CommandOutcome>, ErrorData> {
        Ok(self
            .run(Capability::Entity, "entity_get", params, DEFAULT_TOOL_TIMEOUT)
            .await)
    }

    /// List the session's entities.
    #[tool(name = "entity.list")]
    async fn entity_list(&self) -> Result<Json<CommandOutcome>, ErrorData> {
        Ok(self
            .run(
                Capability::Entity,
                "entity_list",
                serde_json::Map::new(),
                DEFAULT_TOOL_TIMEOUT,
            )
            .await)
    }

    /// Remove an entity; clears camera tracking if it was the target.
    #[tool(name = "entity.remove")]
    async fn entity_remove(
        &self,
        Parameters(params): Parameters<EntityTargetParams>,
    ) -> Result<Json<CommandOutcome>, ErrorData> {
        Ok(self
            .run(Capability::Entity, "entity_remove", params, DEFAULT_TOOL_TIMEOUT)
            .await)
    }

    /// Create a waypoint animation for an entity.
    #[tool(name = "animation.create")]
    async fn animation_create(
        &self,
        Parameters(params): Parameters<AnimationCreateParams>,
    ) -> Result<Json<CommandOutcome>, ErrorData> {
        if let Err(error) = validate_waypoints(&params.waypoints) {
            return Ok(Json(CommandOutcome::rejected(error)));
        }
        Ok(self
            .run(
                Capability::Animation,
                "animation_create",
                params,
                DEFAULT_TOOL_TIMEOUT,
            )
            .await)
    }

    /// Start or resume an animation.
    #[tool(name = "animation.play")]
    async fn animation_play(
        &self,
        Parameters(params): Parameters<AnimationTargetParams>,
    ) -> Result<Json<CommandOutcome>, ErrorData> {
        Ok(self
            .run(
                Capability::Animation,
                "animation_play",
                params,
                DEFAULT_TOOL_TIMEOUT,
            )
            .await)
    }

    /// Pause an animation, keeping its accumulated progress.
    #[tool(name = "animation.pause")]
    async fn animation_pause(
        &self,
        Parameters(params): Parameters<AnimationTargetParams>,
    ) -> Result<Json<CommandOutcome>, ErrorData> {
        Ok(self
            .run(
                Capability::Animation,
                "animation_pause",
                params,
                DEFAULT_TOOL_TIMEOUT,
            )
            .await)
    }

    /// Change an animation's speed or loop mode.
    #[tool(name = "animation.update")]
    async fn animation_update(
        &self,
        Parameters(params): Parameters<AnimationUpdateParams>,
    ) -> Result<Json<CommandOutcome>, ErrorData> {
        Ok(self
            .run(
                Capability::Animation,
                "animation_update",
                params,
                DEFAULT_TOOL_TIMEOUT,
            )
            .await)
    }

    /// List animations with progress computed at query time.
    #[tool(name = "animation.list")]
    async fn animation_list(&self) -> Result<Json<CommandOutcome>, ErrorData> {
        Ok(self
            .run(
                Capability::Animation,
                "animation_list",
                serde_json::Map::new(),
                DEFAULT_TOOL_TIMEOUT,
            )
            .await)
    }

    /// Remove an animation.
    #[tool(name = "animation.remove")]
    async fn animation_remove(
        &self,
        Parameters(params): Parameters<AnimationTargetParams>,
    ) -> Result<Json<CommandOutcome>, ErrorData> {
        Ok(self
            .run(
                Capability::Animation,
                "animation_remove",
                params,
                DEFAULT_TOOL_TIMEOUT,
            )
            .await)
    }

    /// Resolve a place query to coordinates and cache the fix by id.
    #[tool(name = "geo.geocode")]
    async fn geo_geocode(
        &self,
        Parameters(params): Parameters<GeocodeParams>,
    ) -> Result<Json<CommandOutcome>, ErrorData> {
        if params.query.trim().is_empty() {
            return Ok(Json(CommandOutcome::rejected("query must not be empty")));
        }
        Ok(self
            .run(Capability::Geo, "geo_geocode", params, GEO_TOOL_TIMEOUT)
            .await)
    }

    /// Search for places around a position.
    #[tool(name = "geo.search_nearby")]
    async fn geo_search_nearby(
        &self,
        Parameters(params): Parameters<SearchNearbyParams>,
    ) -> Result<Json<CommandOutcome>, ErrorData> {
        if let Err(error) = validate_search(&params) {
            return Ok(Json(CommandOutcome::rejected(error)));
        }
        Ok(self
            .run(Capability::Geo, "geo_search_nearby", params, GEO_TOOL_TIMEOUT)
            .await)
    }

    /// Compute a route between two positions.
    #[tool(name = "geo.route")]
    async fn geo_route(
        &self,
        Parameters(params): Parameters<RouteParams>,
    ) -> Result<Json<CommandOutcome>, ErrorData> {
        Ok(self
            .run(Capability::Geo, "geo_route", params, GEO_TOOL_TIMEOUT)
            .await)
    }

    /// List cached geolocation fixes.
    #[tool(name = "geo.cache_list")]
    async fn geo_cache_list(&self) -> Result<Json<CommandOutcome>, ErrorData> {
        Ok(self
            .run(
                Capability::Geo,
                "geo_cache_list",
                serde_json::Map::new(),
                DEFAULT_TOOL_TIMEOUT,
            )
            .await)
    }

    /// Drop a cached geolocation fix.
    #[tool(name = "geo.cache_remove")]
    async fn geo_cache_remove(
        &self,
        Parameters(params): Parameters<LocationTargetParams>,
    ) -> Result<Json<CommandOutcome>, ErrorData> {
        Ok(self
            .run(
                Capability::Geo,
                "geo_cache_remove",
                params,
                DEFAULT_TOOL_TIMEOUT,
            )
            .await)
    }

    /// Transport snapshot: per-capability connection flags and counters.
    #[tool(name = "bridge.status")]
    async fn bridge_status(&self) -> Result<Json<BridgeStatusResponse>, ErrorData> {
        Ok(Json(BridgeStatusResponse {
            strategy: self.bridge.strategy(),
            channels: self.bridge.status(),
            pending_commands: self.bridge.pending_count(),
        }))
    }
}

#[tool_handler]
impl ServerHandler for TerrellaMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Terrella globe control server (tools: camera.set_view, camera.fly_to, camera.track_entity, camera.stop_tracking, camera.status, entity.create, entity.create_batch, entity.update, entity.get, entity.list, entity.remove, animation.create, animation.play, animation.pause, animation.update, animation.list, animation.remove, geo.geocode, geo.search_nearby, geo.route, geo.cache_list, geo.cache_remove, bridge.status). Commands run on the attached globe viewer; check bridge.status when calls report the viewer as not connected."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

// Structural validation helpers for the tool layer.
include!("server/helpers.rs");

#[cfg(test)]
mod tests;
