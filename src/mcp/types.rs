// SPDX-FileCopyrightText: 2026 Terrella Contributors
// SPDX-License-Identifier: MIT

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bridge::{ChannelStatus, TransportStrategy};
use crate::geo::TravelMode;
use crate::model::{EntityKind, GeoPosition, LoopMode, Waypoint};
use crate::protocol::CommandResult;

/// Result-shaped tool response: every tool returns this, success or not,
/// validation failure included. Capability fields ride in the flattened map.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CommandOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub data: serde_json::Map<String, Value>,
}

impl CommandOutcome {
    /// A validation failure shaped like any other failed result.
    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
            data: serde_json::Map::new(),
        }
    }
}

impl From<CommandResult> for CommandOutcome {
    fn from(result: CommandResult) -> Self {
        Self {
            success: result.success,
            message: result.message,
            error: result.error,
            data: result.data,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CameraViewParams {
    /// Degrees east, -180 to 180.
    pub longitude: f64,
    /// Degrees north, -90 to 90.
    pub latitude: f64,
    /// Meters above the ellipsoid; defaults to a continental overview.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading_deg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch_deg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll_deg: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CameraFlyToParams {
    #[serde(flatten)]
    pub view: CameraViewParams,
    /// Flight duration in seconds; defaults to 3.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_s: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EntityTargetParams {
    pub entity_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EntityCreateParams {
    /// Optional explicit id; when omitted a unique id is allocated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<EntityKind>,
    /// Anchor position; polylines may pass `positions` instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<GeoPosition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub positions: Option<Vec<GeoPosition>>,
    /// Open property bag forwarded to the viewer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<serde_json::Map<String, Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EntityCreateBatchParams {
    /// Batch entries; invalid entries are skipped and reported, valid ones
    /// are created.
    pub entities: Vec<EntityCreateParams>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EntityUpdateParams {
    pub entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<EntityKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<GeoPosition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub positions: Option<Vec<GeoPosition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<serde_json::Map<String, Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AnimationCreateParams {
    /// Optional explicit id; when omitted a unique id is allocated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animation_id: Option<String>,
    /// Entity the animation drives; must exist at creation time.
    pub entity_id: String,
    /// At least two waypoints with non-decreasing time offsets.
    pub waypoints: Vec<Waypoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_mode: Option<LoopMode>,
    /// Start playing immediately.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub start_playing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AnimationTargetParams {
    pub animation_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AnimationUpdateParams {
    pub animation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_mode: Option<LoopMode>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GeocodeParams {
    /// Free-form place query, e.g. "Berlin" or "Eiffel Tower".
    pub query: String,
    /// Optional explicit cache id for the resolved fix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchNearbyParams {
    pub longitude: f64,
    pub latitude: f64,
    /// Search radius in meters; must be positive.
    pub radius_m: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RouteParams {
    pub from: GeoPosition,
    pub to: GeoPosition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<TravelMode>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LocationTargetParams {
    pub location_id: String,
}

/// Response of `bridge.status`: the transport snapshot per capability.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BridgeStatusResponse {
    pub strategy: TransportStrategy,
    pub channels: Vec<ChannelStatus>,
    pub pending_commands: usize,
}
