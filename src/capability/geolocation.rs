// SPDX-FileCopyrightText: 2026 Terrella Contributors
// SPDX-License-Identifier: MIT

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Deserialize;
use serde_json::{json, Value};

use crate::geo::TravelMode;
use crate::model::{GeoPosition, LocationRecord};
use crate::protocol::{Capability, CommandEnvelope, CommandResult};
use crate::router::{CommandRouter, HandlerError, HandlerFuture};
use crate::scene::validate_record_id;

use super::HandlerContext;

const DEFAULT_SEARCH_LIMIT: usize = 10;

pub fn router() -> CommandRouter<HandlerContext> {
    let mut router = CommandRouter::new(Capability::Geo);
    router.register("geo_geocode", |ctx, envelope| -> HandlerFuture {
        Box::pin(geocode(ctx, envelope))
    });
    router.register("geo_search_nearby", |ctx, envelope| -> HandlerFuture {
        Box::pin(search_nearby(ctx, envelope))
    });
    router.register("geo_route", |ctx, envelope| -> HandlerFuture {
        Box::pin(route(ctx, envelope))
    });
    router.register("geo_cache_list", |ctx, envelope| -> HandlerFuture {
        Box::pin(cache_list(ctx, envelope))
    });
    router.register("geo_cache_remove", |ctx, envelope| -> HandlerFuture {
        Box::pin(cache_remove(ctx, envelope))
    });
    router
}

fn epoch_now_s() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or(0.0)
}

#[derive(Debug, Deserialize)]
struct GeocodeParams {
    query: String,
    #[serde(default)]
    location_id: Option<String>,
}

async fn geocode(
    ctx: Arc<HandlerContext>,
    envelope: CommandEnvelope,
) -> Result<CommandResult, HandlerError> {
    let params: GeocodeParams = envelope.params()?;
    if params.query.trim().is_empty() {
        return Err(HandlerError::InvalidParams("query must not be empty".to_owned()));
    }
    // Check the cache id shape before spending a backend call on the query.
    if let Some(id) = &params.location_id {
        validate_record_id(id).map_err(|err| HandlerError::InvalidParams(err.to_string()))?;
    }

    let fix = ctx
        .geo
        .geocode(&params.query)
        .await
        .map_err(|err| HandlerError::Backend(err.to_string()))?;

    let mut session = ctx.session.lock().await;
    let location_id = session
        .locations_mut()
        .create(
            params.location_id,
            LocationRecord::new(fix.label.clone(), fix.position, ctx.geo.name()),
        )
        .map_err(|err| HandlerError::InvalidParams(err.to_string()))?;
    drop(session);

    Ok(CommandResult::ok_with(format!("resolved {:?} to {}", params.query, fix.label))
        .with_field("location_id", json!(location_id))
        .with_field("label", json!(fix.label))
        .with_field("position", serde_json::to_value(fix.position)?))
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    longitude: f64,
    latitude: f64,
    radius_m: f64,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

async fn search_nearby(
    ctx: Arc<HandlerContext>,
    envelope: CommandEnvelope,
) -> Result<CommandResult, HandlerError> {
    let params: SearchParams = envelope.params()?;
    let center = GeoPosition::new(params.longitude, params.latitude, 0.0);
    if !center.is_valid() {
        return Err(HandlerError::InvalidParams(format!(
            "position out of range: longitude {}, latitude {}",
            params.longitude, params.latitude
        )));
    }
    if !(params.radius_m.is_finite() && params.radius_m > 0.0) {
        return Err(HandlerError::InvalidParams(format!(
            "radius_m must be positive, got {}",
            params.radius_m
        )));
    }

    let places = ctx
        .geo
        .search_nearby(
            center,
            params.radius_m,
            params.category.as_deref(),
            params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT),
        )
        .await
        .map_err(|err| HandlerError::Backend(err.to_string()))?;

    let count = places.len();
    Ok(CommandResult::ok_with(format!("found {count} places"))
        .with_field("places", serde_json::to_value(places)?)
        .with_field("count", json!(count)))
}

#[derive(Debug, Deserialize)]
struct RouteParams {
    from: GeoPosition,
    to: GeoPosition,
    #[serde(default)]
    mode: TravelMode,
}

async fn route(
    ctx: Arc<HandlerContext>,
    envelope: CommandEnvelope,
) -> Result<CommandResult, HandlerError> {
    let params: RouteParams = envelope.params()?;
    if !params.from.is_valid() || !params.to.is_valid() {
        return Err(HandlerError::InvalidParams(
            "route endpoints must be valid positions".to_owned(),
        ));
    }

    let plan = ctx
        .geo
        .route(params.from, params.to, params.mode)
        .await
        .map_err(|err| HandlerError::Backend(err.to_string()))?;

    Ok(CommandResult::ok_with(format!(
        "route computed: {:.1} km",
        plan.distance_m / 1000.0
    ))
    .with_field("distance_m", json!(plan.distance_m))
    .with_field("duration_s", json!(plan.duration_s))
    .with_field("mode", serde_json::to_value(plan.mode)?)
    .with_field("points", serde_json::to_value(&plan.points)?))
}

async fn cache_list(
    ctx: Arc<HandlerContext>,
    _envelope: CommandEnvelope,
) -> Result<CommandResult, HandlerError> {
    let now_s = epoch_now_s();
    let session = ctx.session.lock().await;
    let locations: Vec<Value> = session
        .locations()
        .iter()
        .map(|(location_id, record)| {
            json!({
                "location_id": location_id,
                "label": record.label,
                "position": record.position,
                "source": record.source,
                "age_s": record.age_s(now_s),
            })
        })
        .collect();
    let count = locations.len();
    drop(session);

    Ok(CommandResult::ok()
        .with_field("locations", json!(locations))
        .with_field("count", json!(count)))
}

#[derive(Debug, Deserialize)]
struct CacheRemoveParams {
    location_id: String,
}

async fn cache_remove(
    ctx: Arc<HandlerContext>,
    envelope: CommandEnvelope,
) -> Result<CommandResult, HandlerError> {
    let params: CacheRemoveParams = envelope.params()?;
    let mut session = ctx.session.lock().await;
    session
        .locations_mut()
        .remove(&params.location_id)
        .map_err(|err| HandlerError::NotFound(err.to_string()))?;
    drop(session);

    Ok(CommandResult::ok_with(format!("location {} removed", params.location_id))
        .with_field("location_id", json!(params.location_id)))
}
