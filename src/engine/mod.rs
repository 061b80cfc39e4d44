// SPDX-FileCopyrightText: 2026 Terrella Contributors
// SPDX-License-Identifier: MIT

//! The narrow capability interface the core depends on for rendering.
//!
//! The concrete viewer (a Cesium scene in a browser, or the in-repo headless
//! engine) sits behind [`GlobeEngine`]; handlers never see more surface than
//! this. Animated camera repositioning settles a single-resolution future:
//! exactly one of completion or cancellation fires.

use std::fmt;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::model::{EntityRecord, GeoPosition};

pub mod headless;

pub use headless::HeadlessEngine;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraPose {
    pub position: GeoPosition,
    pub heading_deg: f64,
    pub pitch_deg: f64,
    pub roll_deg: f64,
}

impl CameraPose {
    pub fn looking_down_at(position: GeoPosition) -> Self {
        Self {
            position,
            heading_deg: 0.0,
            pitch_deg: -90.0,
            roll_deg: 0.0,
        }
    }
}

/// Point-in-time snapshot of the scene clock.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClockState {
    pub current_time_s: f64,
    pub multiplier: f64,
    pub should_animate: bool,
}

/// How an animated camera transition ended. A newer flight (or an
/// instantaneous reposition) cancels the one in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlightOutcome {
    Completed,
    Cancelled,
}

impl FlightOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            FlightOutcome::Completed => "completed",
            FlightOutcome::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    Rejected(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected(message) => write!(f, "engine rejected operation: {message}"),
        }
    }
}

impl std::error::Error for EngineError {}

/// Rendering-engine capabilities the core is allowed to use.
pub trait GlobeEngine: Send + Sync {
    /// Add or replace the visual object under `id`.
    fn add_object(&self, id: &str, record: &EntityRecord) -> Result<(), EngineError>;

    /// Remove the visual object under `id`; returns whether it existed.
    fn remove_object(&self, id: &str) -> bool;

    fn has_object(&self, id: &str) -> bool;

    fn object_count(&self) -> usize;

    fn clock(&self) -> ClockState;

    fn set_clock_running(&self, running: bool);

    fn set_clock_multiplier(&self, multiplier: f64);

    /// Current scene-clock reading in seconds.
    fn now_s(&self) -> f64;

    fn camera(&self) -> CameraPose;

    /// Instantaneous reposition; cancels any flight in progress.
    fn set_camera(&self, pose: CameraPose);

    /// Animated reposition. The returned future settles exactly once, with
    /// `Completed` when the transition lands or `Cancelled` when a newer
    /// reposition supersedes it.
    fn fly_camera(&self, pose: CameraPose, duration_s: f64) -> BoxFuture<'static, FlightOutcome>;

    /// Set or clear the tracked object; `None` clears.
    fn track_object(&self, id: Option<&str>);

    fn tracked_object(&self) -> Option<String>;
}
