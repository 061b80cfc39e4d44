// SPDX-FileCopyrightText: 2026 Terrella Contributors
// SPDX-License-Identifier: MIT

/// Tool-layer validation: structural checks on input shape before anything
/// crosses the bridge. Handlers re-validate domain rules on their side.
fn validate_longitude_latitude(longitude: f64, latitude: f64) -> Result<(), String> {
    if !(longitude.is_finite() && (-180.0..=180.0).contains(&longitude)) {
        return Err(format!("longitude must be within [-180, 180], got {longitude}"));
    }
    if !(latitude.is_finite() && (-90.0..=90.0).contains(&latitude)) {
        return Err(format!("latitude must be within [-90, 90], got {latitude}"));
    }
    Ok(())
}

fn validate_view(params: &CameraViewParams) -> Result<(), String> {
    validate_longitude_latitude(params.longitude, params.latitude)?;
    if let Some(height) = params.height {
        if !height.is_finite() {
            return Err(format!("height must be a finite number, got {height}"));
        }
    }
    Ok(())
}

fn validate_duration(duration_s: f64) -> Result<(), String> {
    if !(duration_s.is_finite() && duration_s >= 0.0) {
        return Err(format!("duration_s must be a non-negative number, got {duration_s}"));
    }
    Ok(())
}

/// The timeout budget of an animated transition: its own duration plus a
/// fixed network buffer, so a healthy flight can never time out.
fn flight_timeout(duration_s: f64) -> Duration {
    Duration::from_secs_f64(duration_s + FLIGHT_NETWORK_BUFFER_S)
}

fn validate_entity_positions(params: &EntityCreateParams) -> Result<(), String> {
    let positions: Vec<_> = match (&params.positions, &params.position) {
        (Some(positions), _) if !positions.is_empty() => positions.iter().collect(),
        (_, Some(position)) => vec![position],
        _ => return Err("position or positions is required".to_owned()),
    };
    for position in positions {
        validate_longitude_latitude(position.longitude, position.latitude)?;
    }
    Ok(())
}

fn validate_waypoints(waypoints: &[Waypoint]) -> Result<(), String> {
    if waypoints.len() < 2 {
        return Err(format!(
            "an animation needs at least 2 waypoints, got {}",
            waypoints.len()
        ));
    }
    for waypoint in waypoints {
        validate_longitude_latitude(waypoint.position.longitude, waypoint.position.latitude)?;
    }
    Ok(())
}

fn validate_search(params: &SearchNearbyParams) -> Result<(), String> {
    validate_longitude_latitude(params.longitude, params.latitude)?;
    if !(params.radius_m.is_finite() && params.radius_m > 0.0) {
        return Err(format!("radius_m must be positive, got {}", params.radius_m));
    }
    Ok(())
}
