// SPDX-FileCopyrightText: 2026 Terrella Contributors
// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};

use super::entity::GeoPosition;

/// A cached geolocation fix: the result of a geocode lookup kept addressable
/// by id so later commands can reuse it without another backend call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationRecord {
    pub label: String,
    pub position: GeoPosition,
    /// Name of the backend that produced the fix.
    pub source: String,
    /// Unix epoch seconds at caching time.
    pub cached_at_s: f64,
}

impl LocationRecord {
    pub fn new(
        label: impl Into<String>,
        position: GeoPosition,
        source: impl Into<String>,
    ) -> Self {
        let cached_at_s = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs_f64())
            .unwrap_or(0.0);
        Self {
            label: label.into(),
            position,
            source: source.into(),
            cached_at_s,
        }
    }

    /// Seconds the fix has been cached, derived at query time.
    pub fn age_s(&self, now_epoch_s: f64) -> f64 {
        (now_epoch_s - self.cached_at_s).max(0.0)
    }
}
