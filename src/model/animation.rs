// SPDX-FileCopyrightText: 2026 Terrella Contributors
// SPDX-License-Identifier: MIT

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::entity::GeoPosition;

/// What happens when an animation reaches its final waypoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    /// Hold the final state.
    #[default]
    Clamp,
    /// Restart from the first waypoint.
    Repeat,
    /// Play backwards to the start, then forwards again.
    Bounce,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Waypoint {
    pub position: GeoPosition,
    /// Seconds after the animation start at which this waypoint is reached.
    pub time_offset_s: f64,
}

/// A managed record describing one entity animation.
///
/// `entity_id` is a correlated reference into the entity store and the
/// engine's object graph; the target may have been removed out of band, so
/// reads through it are nil-safe. Progress is never stored: it is derived
/// from the clock reading supplied at query time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnimationRecord {
    pub entity_id: String,
    pub waypoints: Vec<Waypoint>,
    /// Base duration at speed 1.0, in seconds.
    pub duration_s: f64,
    pub speed: f64,
    pub loop_mode: LoopMode,
    pub playing: bool,
    /// Clock reading when playback (re)started; `None` while paused.
    pub started_at_s: Option<f64>,
    /// Playback seconds accumulated before the last pause.
    pub elapsed_base_s: f64,
}

impl AnimationRecord {
    pub fn new(entity_id: impl Into<String>, waypoints: Vec<Waypoint>) -> Self {
        let duration_s = waypoints
            .last()
            .map(|waypoint| waypoint.time_offset_s)
            .unwrap_or(0.0);
        Self {
            entity_id: entity_id.into(),
            waypoints,
            duration_s,
            speed: 1.0,
            loop_mode: LoopMode::default(),
            playing: false,
            started_at_s: None,
            elapsed_base_s: 0.0,
        }
    }

    /// Playback seconds elapsed at clock reading `now_s`, speed applied.
    pub fn elapsed_s(&self, now_s: f64) -> f64 {
        let running = match (self.playing, self.started_at_s) {
            (true, Some(started)) => (now_s - started).max(0.0) * self.speed,
            _ => 0.0,
        };
        self.elapsed_base_s + running
    }

    /// Progress fraction in `[0, 1]` at clock reading `now_s`, folded through
    /// the loop mode.
    pub fn progress(&self, now_s: f64) -> f64 {
        if self.duration_s <= 0.0 {
            return 1.0;
        }
        let raw = self.elapsed_s(now_s) / self.duration_s;
        match self.loop_mode {
            LoopMode::Clamp => raw.min(1.0),
            LoopMode::Repeat => raw.fract(),
            LoopMode::Bounce => {
                let phase = raw % 2.0;
                if phase <= 1.0 {
                    phase
                } else {
                    2.0 - phase
                }
            }
        }
    }

    /// Fold the running span into the accumulated base. Used before any
    /// change that alters how elapsed time is computed (pause, speed change).
    pub fn checkpoint(&mut self, now_s: f64) {
        self.elapsed_base_s = self.elapsed_s(now_s);
        self.started_at_s = if self.playing { Some(now_s) } else { None };
    }
}
