// SPDX-FileCopyrightText: 2026 Terrella Contributors
// SPDX-License-Identifier: MIT

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use tokio::sync::oneshot;

use crate::model::{EntityRecord, GeoPosition};

use super::{CameraPose, ClockState, EngineError, FlightOutcome, GlobeEngine};

/// In-memory globe engine driven by `tokio::time`.
///
/// Serves as the reference implementation behind [`GlobeEngine`]: it keeps
/// the identified-object map, a multiplier-aware clock, and a camera whose
/// animated transitions run as real timed tasks, so the whole system is
/// exercisable without a browser.
#[derive(Clone)]
pub struct HeadlessEngine {
    inner: Arc<Mutex<EngineInner>>,
}

struct EngineInner {
    objects: BTreeMap<String, EntityRecord>,
    camera: CameraPose,
    tracked: Option<String>,
    clock: ClockInner,
    flight_cancel: Option<oneshot::Sender<()>>,
}

struct ClockInner {
    base_sim_s: f64,
    anchored_at: Instant,
    multiplier: f64,
    running: bool,
}

impl ClockInner {
    fn now_s(&self) -> f64 {
        if self.running {
            self.base_sim_s + self.anchored_at.elapsed().as_secs_f64() * self.multiplier
        } else {
            self.base_sim_s
        }
    }

    /// Fold the running span into the base before changing rate or state.
    fn rebase(&mut self) {
        self.base_sim_s = self.now_s();
        self.anchored_at = Instant::now();
    }
}

impl HeadlessEngine {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(EngineInner {
                objects: BTreeMap::new(),
                camera: CameraPose::looking_down_at(GeoPosition::new(0.0, 0.0, 10_000_000.0)),
                tracked: None,
                clock: ClockInner {
                    base_sim_s: 0.0,
                    anchored_at: Instant::now(),
                    multiplier: 1.0,
                    running: true,
                },
                flight_cancel: None,
            })),
        }
    }

    fn cancel_active_flight(inner: &mut EngineInner) {
        if let Some(cancel) = inner.flight_cancel.take() {
            let _ = cancel.send(());
        }
    }
}

impl Default for HeadlessEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobeEngine for HeadlessEngine {
    fn add_object(&self, id: &str, record: &EntityRecord) -> Result<(), EngineError> {
        if record.positions.is_empty() {
            return Err(EngineError::Rejected(format!(
                "object {id} has no position"
            )));
        }
        let mut inner = self.inner.lock().expect("engine lock poisoned");
        inner.objects.insert(id.to_owned(), record.clone());
        Ok(())
    }

    fn remove_object(&self, id: &str) -> bool {
        let mut inner = self.inner.lock().expect("engine lock poisoned");
        if inner.tracked.as_deref() == Some(id) {
            inner.tracked = None;
        }
        inner.objects.remove(id).is_some()
    }

    fn has_object(&self, id: &str) -> bool {
        let inner = self.inner.lock().expect("engine lock poisoned");
        inner.objects.contains_key(id)
    }

    fn object_count(&self) -> usize {
        let inner = self.inner.lock().expect("engine lock poisoned");
        inner.objects.len()
    }

    fn clock(&self) -> ClockState {
        let inner = self.inner.lock().expect("engine lock poisoned");
        ClockState {
            current_time_s: inner.clock.now_s(),
            multiplier: inner.clock.multiplier,
            should_animate: inner.clock.running,
        }
    }

    fn set_clock_running(&self, running: bool) {
        let mut inner = self.inner.lock().expect("engine lock poisoned");
        inner.clock.rebase();
        inner.clock.running = running;
    }

    fn set_clock_multiplier(&self, multiplier: f64) {
        let mut inner = self.inner.lock().expect("engine lock poisoned");
        inner.clock.rebase();
        inner.clock.multiplier = multiplier;
    }

    fn now_s(&self) -> f64 {
        let inner = self.inner.lock().expect("engine lock poisoned");
        inner.clock.now_s()
    }

    fn camera(&self) -> CameraPose {
        let inner = self.inner.lock().expect("engine lock poisoned");
        inner.camera
    }

    fn set_camera(&self, pose: CameraPose) {
        let mut inner = self.inner.lock().expect("engine lock poisoned");
        Self::cancel_active_flight(&mut inner);
        inner.camera = pose;
    }

    fn fly_camera(&self, pose: CameraPose, duration_s: f64) -> BoxFuture<'static, FlightOutcome> {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();

        {
            let mut inner = self.inner.lock().expect("engine lock poisoned");
            Self::cancel_active_flight(&mut inner);
            inner.flight_cancel = Some(cancel_tx);
        }

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let outcome = tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs_f64(duration_s.max(0.0))) => {
                    let mut inner = inner.lock().expect("engine lock poisoned");
                    inner.camera = pose;
                    FlightOutcome::Completed
                }
                _ = cancel_rx => FlightOutcome::Cancelled,
            };
            let _ = done_tx.send(outcome);
        });

        Box::pin(async move { done_rx.await.unwrap_or(FlightOutcome::Cancelled) })
    }

    fn track_object(&self, id: Option<&str>) {
        let mut inner = self.inner.lock().expect("engine lock poisoned");
        inner.tracked = id.map(ToOwned::to_owned);
    }

    fn tracked_object(&self) -> Option<String> {
        let inner = self.inner.lock().expect("engine lock poisoned");
        inner.tracked.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntityKind;

    fn record() -> EntityRecord {
        EntityRecord::at(EntityKind::Point, GeoPosition::new(13.4, 52.5, 0.0))
    }

    #[test]
    fn objects_round_trip() {
        let engine = HeadlessEngine::new();
        engine.add_object("ent_1", &record()).expect("add object");
        assert!(engine.has_object("ent_1"));
        assert_eq!(engine.object_count(), 1);
        assert!(engine.remove_object("ent_1"));
        assert!(!engine.remove_object("ent_1"));
    }

    #[test]
    fn add_object_rejects_positionless_records() {
        let engine = HeadlessEngine::new();
        let mut empty = record();
        empty.positions.clear();
        assert!(engine.add_object("ent_1", &empty).is_err());
    }

    #[test]
    fn removing_the_tracked_object_clears_engine_tracking() {
        let engine = HeadlessEngine::new();
        engine.add_object("ent_1", &record()).expect("add object");
        engine.track_object(Some("ent_1"));
        engine.remove_object("ent_1");
        assert_eq!(engine.tracked_object(), None);
    }

    #[test]
    fn paused_clock_stands_still() {
        let engine = HeadlessEngine::new();
        engine.set_clock_running(false);
        let first = engine.now_s();
        std::thread::sleep(Duration::from_millis(20));
        let second = engine.now_s();
        assert_eq!(first, second);
        assert!(!engine.clock().should_animate);
    }

    #[tokio::test]
    async fn flight_completes_and_moves_the_camera() {
        let engine = HeadlessEngine::new();
        let target = CameraPose::looking_down_at(GeoPosition::new(2.35, 48.86, 500_000.0));
        let outcome = engine.fly_camera(target, 0.02).await;
        assert_eq!(outcome, FlightOutcome::Completed);
        assert_eq!(engine.camera().position.latitude, 48.86);
    }

    #[tokio::test]
    async fn newer_flight_cancels_the_one_in_progress() {
        let engine = HeadlessEngine::new();
        let slow = engine.fly_camera(
            CameraPose::looking_down_at(GeoPosition::new(0.0, 0.0, 1000.0)),
            5.0,
        );
        let fast = engine.fly_camera(
            CameraPose::looking_down_at(GeoPosition::new(1.0, 1.0, 1000.0)),
            0.02,
        );
        let (slow_outcome, fast_outcome) = tokio::join!(slow, fast);
        assert_eq!(slow_outcome, FlightOutcome::Cancelled);
        assert_eq!(fast_outcome, FlightOutcome::Completed);
    }

    #[tokio::test]
    async fn instant_reposition_cancels_the_flight() {
        let engine = HeadlessEngine::new();
        let flight = engine.fly_camera(
            CameraPose::looking_down_at(GeoPosition::new(0.0, 0.0, 1000.0)),
            5.0,
        );
        engine.set_camera(CameraPose::looking_down_at(GeoPosition::new(9.0, 9.0, 1000.0)));
        assert_eq!(flight.await, FlightOutcome::Cancelled);
        assert_eq!(engine.camera().position.longitude, 9.0);
    }
}
