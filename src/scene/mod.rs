// SPDX-FileCopyrightText: 2026 Terrella Contributors
// SPDX-License-Identifier: MIT

//! The scene state store: keyed record tables plus the session that owns
//! them and keeps cross-references consistent on removal.

pub mod session;
pub mod store;

pub use session::SceneSession;
pub use store::{validate_record_id, RecordStore, StoreError};
