// SPDX-FileCopyrightText: 2026 Terrella Contributors
// SPDX-License-Identifier: MIT

use futures_util::future::BoxFuture;

use crate::model::GeoPosition;

use super::{haversine_m, GeoBackend, GeoError, GeoFix, Place, RoutePlan, TravelMode};

/// Built-in gazetteer backend: substring geocoding over a fixed place table,
/// radius search, and great-circle routing. No network, no rate limits;
/// useful on its own and as the test double for remote providers.
#[derive(Debug, Clone, Default)]
pub struct OfflineAtlas;

struct GazetteerEntry {
    name: &'static str,
    category: &'static str,
    longitude: f64,
    latitude: f64,
}

const GAZETTEER: &[GazetteerEntry] = &[
    GazetteerEntry { name: "Berlin, Germany", category: "city", longitude: 13.405, latitude: 52.52 },
    GazetteerEntry { name: "Paris, France", category: "city", longitude: 2.3522, latitude: 48.8566 },
    GazetteerEntry { name: "London, United Kingdom", category: "city", longitude: -0.1276, latitude: 51.5072 },
    GazetteerEntry { name: "New York, USA", category: "city", longitude: -74.006, latitude: 40.7128 },
    GazetteerEntry { name: "San Francisco, USA", category: "city", longitude: -122.4194, latitude: 37.7749 },
    GazetteerEntry { name: "Tokyo, Japan", category: "city", longitude: 139.6917, latitude: 35.6895 },
    GazetteerEntry { name: "Sydney, Australia", category: "city", longitude: 151.2093, latitude: -33.8688 },
    GazetteerEntry { name: "Nairobi, Kenya", category: "city", longitude: 36.8219, latitude: -1.2921 },
    GazetteerEntry { name: "São Paulo, Brazil", category: "city", longitude: -46.6333, latitude: -23.5505 },
    GazetteerEntry { name: "Reykjavik, Iceland", category: "city", longitude: -21.8277, latitude: 64.1283 },
    GazetteerEntry { name: "Eiffel Tower", category: "landmark", longitude: 2.2945, latitude: 48.8584 },
    GazetteerEntry { name: "Brandenburg Gate", category: "landmark", longitude: 13.3777, latitude: 52.5163 },
    GazetteerEntry { name: "Tower Bridge", category: "landmark", longitude: -0.0754, latitude: 51.5055 },
    GazetteerEntry { name: "Statue of Liberty", category: "landmark", longitude: -74.0445, latitude: 40.6892 },
    GazetteerEntry { name: "Golden Gate Bridge", category: "landmark", longitude: -122.4783, latitude: 37.8199 },
    GazetteerEntry { name: "Mount Fuji", category: "peak", longitude: 138.7274, latitude: 35.3606 },
    GazetteerEntry { name: "Mont Blanc", category: "peak", longitude: 6.8652, latitude: 45.8326 },
    GazetteerEntry { name: "Kilimanjaro", category: "peak", longitude: 37.3556, latitude: -3.0674 },
];

const ROUTE_POINTS: usize = 17;

impl OfflineAtlas {
    pub fn new() -> Self {
        Self
    }
}

impl GeoBackend for OfflineAtlas {
    fn name(&self) -> &'static str {
        "offline-atlas"
    }

    fn geocode(&self, query: &str) -> BoxFuture<'static, Result<GeoFix, GeoError>> {
        let query = query.trim().to_owned();
        Box::pin(async move {
            if query.is_empty() {
                return Err(GeoError::NoMatch(query));
            }
            let needle = query.to_lowercase();
            GAZETTEER
                .iter()
                .find(|entry| entry.name.to_lowercase().contains(&needle))
                .map(|entry| GeoFix {
                    label: entry.name.to_owned(),
                    position: GeoPosition::new(entry.longitude, entry.latitude, 0.0),
                })
                .ok_or(GeoError::NoMatch(query))
        })
    }

    fn search_nearby(
        &self,
        center: GeoPosition,
        radius_m: f64,
        category: Option<&str>,
        limit: usize,
    ) -> BoxFuture<'static, Result<Vec<Place>, GeoError>> {
        let category = category.map(str::to_lowercase);
        Box::pin(async move {
            let mut places: Vec<Place> = GAZETTEER
                .iter()
                .filter(|entry| {
                    category
                        .as_deref()
                        .map(|wanted| entry.category == wanted)
                        .unwrap_or(true)
                })
                .filter_map(|entry| {
                    let position = GeoPosition::new(entry.longitude, entry.latitude, 0.0);
                    let distance_m = haversine_m(center, position);
                    (distance_m <= radius_m).then(|| Place {
                        name: entry.name.to_owned(),
                        category: entry.category.to_owned(),
                        position,
                        distance_m,
                    })
                })
                .collect();
            places.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));
            places.truncate(limit);
            Ok(places)
        })
    }

    fn route(
        &self,
        from: GeoPosition,
        to: GeoPosition,
        mode: TravelMode,
    ) -> BoxFuture<'static, Result<RoutePlan, GeoError>> {
        Box::pin(async move {
            let distance_m = haversine_m(from, to);
            let points = (0..ROUTE_POINTS)
                .map(|step| {
                    let t = step as f64 / (ROUTE_POINTS - 1) as f64;
                    GeoPosition::new(
                        from.longitude + (to.longitude - from.longitude) * t,
                        from.latitude + (to.latitude - from.latitude) * t,
                        from.height + (to.height - from.height) * t,
                    )
                })
                .collect();
            Ok(RoutePlan {
                mode,
                distance_m,
                duration_s: distance_m / mode.speed_mps(),
                points,
            })
        })
    }
}
