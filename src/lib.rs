// SPDX-FileCopyrightText: 2026 Terrella Contributors
// SPDX-License-Identifier: MIT

//! Terrella: globe viewer control plane (MCP tools + command bridge).
//!
//! The crate is a single-crate layout: the MCP tool façade under `mcp`, the
//! command/result wire contract under `protocol`, and the two halves of the
//! viewer transport under `bridge` (command-sending) and `host`
//! (command-receiving, reconnecting).

pub mod bridge;
pub mod capability;
pub mod engine;
pub mod geo;
pub mod host;
pub mod mcp;
pub mod model;
pub mod protocol;
pub mod router;
pub mod scene;
