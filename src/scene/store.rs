// SPDX-FileCopyrightText: 2026 Terrella Contributors
// SPDX-License-Identifier: MIT

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// An in-memory keyed table of managed records.
///
/// The store is the single mutation point for its records: handlers go
/// through `create`/`update`/`remove`, nothing else touches the map. Ids are
/// either caller-supplied (accepted verbatim once they pass the shape rule,
/// so callers can re-address the same record idempotently) or generated here
/// in one place, in the `prefix_timestamp_suffix` shape, collision-checked
/// against the map.
#[derive(Debug)]
pub struct RecordStore<R> {
    prefix: &'static str,
    records: BTreeMap<String, R>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    NotFound { id: String },
    InvalidId { id: String, reason: &'static str },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { id } => write!(f, "no record with id {id}"),
            Self::InvalidId { id, reason } => write!(f, "invalid id {id:?}: {reason}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Shape rule for caller-supplied record ids. Ids travel as JSON payload
/// values and key the store maps, so empty strings and whitespace or control
/// characters would make records unaddressable or ambiguous to re-address.
/// Generated ids satisfy the rule by construction.
pub fn validate_record_id(id: &str) -> Result<(), StoreError> {
    if id.is_empty() {
        return Err(StoreError::InvalidId {
            id: id.to_owned(),
            reason: "must not be empty",
        });
    }
    if id.chars().any(|ch| ch.is_whitespace() || ch.is_control()) {
        return Err(StoreError::InvalidId {
            id: id.to_owned(),
            reason: "must not contain whitespace or control characters",
        });
    }
    Ok(())
}

impl<R> RecordStore<R> {
    pub fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            records: BTreeMap::new(),
        }
    }

    /// Insert `record` under `id`, or under a freshly generated id when the
    /// caller supplied none. Returns the final id. A caller-supplied id must
    /// pass the shape rule and is then kept verbatim; one that already
    /// exists replaces the record (last write wins, by policy).
    pub fn create(&mut self, id: Option<String>, record: R) -> Result<String, StoreError> {
        let id = match id {
            Some(id) => {
                validate_record_id(&id)?;
                id
            }
            None => self.allocate_id(),
        };
        self.records.insert(id.clone(), record);
        Ok(id)
    }

    /// Pure lookup; absence is a normal outcome, not an error.
    pub fn get(&self, id: &str) -> Option<&R> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// Apply `apply` to the record under `id`; error when absent.
    pub fn update(&mut self, id: &str, apply: impl FnOnce(&mut R)) -> Result<(), StoreError> {
        match self.records.get_mut(id) {
            Some(record) => {
                apply(record);
                Ok(())
            }
            None => Err(StoreError::NotFound { id: id.to_owned() }),
        }
    }

    /// Remove the record under `id`. Removing an absent id returns an error
    /// rather than panicking, so a second remove fails gracefully.
    pub fn remove(&mut self, id: &str) -> Result<R, StoreError> {
        self.records
            .remove(id)
            .ok_or_else(|| StoreError::NotFound { id: id.to_owned() })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &R)> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn allocate_id(&self) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or(0);
        loop {
            let candidate = format!("{}_{}_{:04x}", self.prefix, millis, id_suffix());
            if !self.records.contains_key(candidate.as_str()) {
                return candidate;
            }
        }
    }
}

static SUFFIX_COUNTER: AtomicU64 = AtomicU64::new(0);

/// 16-bit suffix hashed from the clock and a process-wide counter; the
/// counter makes same-millisecond allocations distinct before the store's
/// collision probe even runs.
fn id_suffix() -> u64 {
    let mut hasher = DefaultHasher::new();
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
        .hash(&mut hasher);
    SUFFIX_COUNTER.fetch_add(1, Ordering::Relaxed).hash(&mut hasher);
    hasher.finish() & 0xffff
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_id_round_trips_verbatim() {
        let mut store = RecordStore::new("anim");
        let id = store.create(Some("anim_1".to_owned()), 7u32).expect("create");
        assert_eq!(id, "anim_1");
        assert_eq!(store.get("anim_1"), Some(&7));
    }

    #[test]
    fn generated_id_round_trips() {
        let mut store = RecordStore::new("anim");
        let id = store.create(None, 41u32).expect("create");
        assert!(id.starts_with("anim_"));
        assert_eq!(store.get(&id), Some(&41));
    }

    #[test]
    fn five_hundred_generated_ids_do_not_collide() {
        let mut store = RecordStore::new("ent");
        for index in 0..500u32 {
            store.create(None, index).expect("create");
        }
        assert_eq!(store.len(), 500);
    }

    #[test]
    fn malformed_caller_ids_are_rejected_not_stored() {
        let mut store = RecordStore::new("ent");
        for bad in ["", "pin 1", "pin\t1", "pin\n1"] {
            let result = store.create(Some(bad.to_owned()), 1u32);
            assert!(
                matches!(result, Err(StoreError::InvalidId { .. })),
                "{bad:?} should be rejected"
            );
        }
        assert!(store.is_empty());
    }

    #[test]
    fn generated_ids_pass_the_shape_rule() {
        let mut store: RecordStore<u32> = RecordStore::new("loc");
        let id = store.create(None, 3).expect("create");
        assert!(validate_record_id(&id).is_ok());
    }

    #[test]
    fn update_absent_id_errors() {
        let mut store: RecordStore<u32> = RecordStore::new("loc");
        let result = store.update("loc_missing", |record| *record += 1);
        assert_eq!(
            result,
            Err(StoreError::NotFound {
                id: "loc_missing".to_owned()
            })
        );
    }

    #[test]
    fn double_remove_fails_gracefully() {
        let mut store = RecordStore::new("ent");
        store.create(Some("ent_1".to_owned()), 1u32).expect("create");
        assert!(store.remove("ent_1").is_ok());
        assert!(store.remove("ent_1").is_err());
    }

    #[test]
    fn explicit_id_replaces_existing_record() {
        let mut store = RecordStore::new("ent");
        store.create(Some("ent_1".to_owned()), 1u32).expect("create");
        store.create(Some("ent_1".to_owned()), 2u32).expect("create");
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("ent_1"), Some(&2));
    }
}
