// SPDX-FileCopyrightText: 2026 Terrella Contributors
// SPDX-License-Identifier: MIT

//! Geolocation backend seam.
//!
//! Concrete providers (Nominatim, OSRM, Overpass, …) are external
//! collaborators behind [`GeoBackend`]; each enforces its own rate limits
//! and is assumed to fail with a recoverable [`GeoError`]. The in-repo
//! [`OfflineAtlas`] is the reference implementation.

use std::fmt;

use futures_util::future::BoxFuture;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::model::GeoPosition;

pub mod offline;

pub use offline::OfflineAtlas;

/// A resolved geocode result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoFix {
    pub label: String,
    pub position: GeoPosition,
}

/// One nearby-search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Place {
    pub name: String,
    pub category: String,
    pub position: GeoPosition,
    pub distance_m: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TravelMode {
    #[default]
    Driving,
    Walking,
    Cycling,
}

impl TravelMode {
    /// Nominal speed in meters per second used for duration estimates.
    pub fn speed_mps(self) -> f64 {
        match self {
            TravelMode::Driving => 25.0,
            TravelMode::Walking => 1.4,
            TravelMode::Cycling => 5.0,
        }
    }
}

/// A computed route between two positions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutePlan {
    pub mode: TravelMode,
    pub distance_m: f64,
    pub duration_s: f64,
    pub points: Vec<GeoPosition>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeoError {
    /// The query resolved to nothing.
    NoMatch(String),
    /// The backend is unreachable or over its rate limit.
    Unavailable(String),
}

impl fmt::Display for GeoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoMatch(query) => write!(f, "no match for {query:?}"),
            Self::Unavailable(message) => write!(f, "backend unavailable: {message}"),
        }
    }
}

impl std::error::Error for GeoError {}

/// The interface every geolocation provider implements.
pub trait GeoBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn geocode(&self, query: &str) -> BoxFuture<'static, Result<GeoFix, GeoError>>;

    fn search_nearby(
        &self,
        center: GeoPosition,
        radius_m: f64,
        category: Option<&str>,
        limit: usize,
    ) -> BoxFuture<'static, Result<Vec<Place>, GeoError>>;

    fn route(
        &self,
        from: GeoPosition,
        to: GeoPosition,
        mode: TravelMode,
    ) -> BoxFuture<'static, Result<RoutePlan, GeoError>>;
}

/// Great-circle distance in meters.
pub fn haversine_m(a: GeoPosition, b: GeoPosition) -> f64 {
    const EARTH_RADIUS_M: f64 = 6_371_008.8;
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();
    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}
