// SPDX-FileCopyrightText: 2026 Terrella Contributors
// SPDX-License-Identifier: MIT

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A geographic position in degrees, height in meters above the ellipsoid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GeoPosition {
    pub longitude: f64,
    pub latitude: f64,
    #[serde(default)]
    pub height: f64,
}

impl GeoPosition {
    pub fn new(longitude: f64, latitude: f64, height: f64) -> Self {
        Self {
            longitude,
            latitude,
            height,
        }
    }

    pub fn is_valid(&self) -> bool {
        (-180.0..=180.0).contains(&self.longitude)
            && (-90.0..=90.0).contains(&self.latitude)
            && self.longitude.is_finite()
            && self.latitude.is_finite()
            && self.height.is_finite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    #[default]
    Point,
    Label,
    Billboard,
    Polyline,
    Model,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Point => "point",
            EntityKind::Label => "label",
            EntityKind::Billboard => "billboard",
            EntityKind::Polyline => "polyline",
            EntityKind::Model => "model",
        }
    }
}

/// A managed record describing one identified visual object.
///
/// The record is the store-side truth; the engine holds the live object under
/// the same id and may lose it independently, so every lookup through an
/// entity id elsewhere in the session is nil-safe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub kind: EntityKind,
    /// First entry is the anchor position; polylines use all of them.
    pub positions: Vec<GeoPosition>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub properties: serde_json::Map<String, Value>,
}

impl EntityRecord {
    pub fn at(kind: EntityKind, position: GeoPosition) -> Self {
        Self {
            name: None,
            kind,
            positions: vec![position],
            properties: serde_json::Map::new(),
        }
    }

    pub fn anchor(&self) -> Option<GeoPosition> {
        self.positions.first().copied()
    }
}
