// SPDX-FileCopyrightText: 2026 Terrella Contributors
// SPDX-License-Identifier: MIT

use crate::model::{AnimationRecord, EntityRecord, LocationRecord};

use super::store::{RecordStore, StoreError};

/// The single source of truth for everything this session created and can
/// still reference by id.
///
/// One session owns one instance; it is constructed per session and injected
/// into handlers, never reached through ambient module state. All access is
/// from the event-loop thread behind the context lock; overlapping updates to
/// the same id are last-write-wins by policy.
#[derive(Debug)]
pub struct SceneSession {
    entities: RecordStore<EntityRecord>,
    animations: RecordStore<AnimationRecord>,
    locations: RecordStore<LocationRecord>,
    tracked_entity: Option<String>,
}

impl SceneSession {
    pub fn new() -> Self {
        Self {
            entities: RecordStore::new("entity"),
            animations: RecordStore::new("anim"),
            locations: RecordStore::new("loc"),
            tracked_entity: None,
        }
    }

    pub fn entities(&self) -> &RecordStore<EntityRecord> {
        &self.entities
    }

    pub fn entities_mut(&mut self) -> &mut RecordStore<EntityRecord> {
        &mut self.entities
    }

    pub fn animations(&self) -> &RecordStore<AnimationRecord> {
        &self.animations
    }

    pub fn animations_mut(&mut self) -> &mut RecordStore<AnimationRecord> {
        &mut self.animations
    }

    pub fn locations(&self) -> &RecordStore<LocationRecord> {
        &self.locations
    }

    pub fn locations_mut(&mut self) -> &mut RecordStore<LocationRecord> {
        &mut self.locations
    }

    /// The at-most-one tracked camera target.
    pub fn tracked_entity(&self) -> Option<&str> {
        self.tracked_entity.as_deref()
    }

    /// Replace the tracked target. Superseding an existing target clears the
    /// old reference; the caller is responsible for mirroring the change into
    /// the engine.
    pub fn set_tracked_entity(&mut self, entity_id: Option<String>) -> Option<String> {
        std::mem::replace(&mut self.tracked_entity, entity_id)
    }

    /// Remove an entity and release every cross-reference held elsewhere in
    /// the session. Returns whether the removed entity was the tracked
    /// camera target (so the caller can untrack it in the engine too).
    ///
    /// Animations that reference the entity are kept; their entity reads are
    /// nil-safe by contract.
    pub fn remove_entity(&mut self, entity_id: &str) -> Result<RemovedEntity, StoreError> {
        let record = self.entities.remove(entity_id)?;
        let was_tracked = self.tracked_entity.as_deref() == Some(entity_id);
        if was_tracked {
            self.tracked_entity = None;
        }
        Ok(RemovedEntity {
            record,
            was_tracked,
        })
    }
}

impl Default for SceneSession {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct RemovedEntity {
    pub record: EntityRecord,
    pub was_tracked: bool,
}
