// SPDX-FileCopyrightText: 2026 Terrella Contributors
// SPDX-License-Identifier: MIT

//! Capability handlers: camera, entity, animation, and geolocation command
//! implementations registered on per-capability routers.
//!
//! Handlers share one [`HandlerContext`] (the scene session behind a lock,
//! the engine, and the geolocation backend) injected at dispatch time.
//! Each handler validates its parameters, performs its mutation inside one
//! lock scope, and suspends only for secondary confirmation (a camera
//! flight, a backend call).

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::engine::GlobeEngine;
use crate::geo::GeoBackend;
use crate::protocol::Capability;
use crate::router::CommandRouter;
use crate::scene::SceneSession;

pub mod animation;
pub mod camera;
pub mod entity;
pub mod geolocation;

/// Everything a handler may touch. Constructed once per viewer session and
/// injected into dispatch, so tests can instantiate isolated copies.
pub struct HandlerContext {
    pub session: Mutex<SceneSession>,
    pub engine: Arc<dyn GlobeEngine>,
    pub geo: Arc<dyn GeoBackend>,
}

impl HandlerContext {
    pub fn new(engine: Arc<dyn GlobeEngine>, geo: Arc<dyn GeoBackend>) -> Self {
        Self {
            session: Mutex::new(SceneSession::new()),
            engine,
            geo,
        }
    }
}

/// One router per capability, fully registered.
pub fn build_routers() -> BTreeMap<Capability, Arc<CommandRouter<HandlerContext>>> {
    BTreeMap::from([
        (Capability::Camera, Arc::new(camera::router())),
        (Capability::Entity, Arc::new(entity::router())),
        (Capability::Animation, Arc::new(animation::router())),
        (Capability::Geo, Arc::new(geolocation::router())),
    ])
}

#[cfg(test)]
pub(crate) fn test_context() -> Arc<HandlerContext> {
    use crate::engine::HeadlessEngine;
    use crate::geo::OfflineAtlas;

    Arc::new(HandlerContext::new(
        Arc::new(HeadlessEngine::new()),
        Arc::new(OfflineAtlas::new()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CommandEnvelope;

    #[tokio::test]
    async fn every_registered_command_produces_a_defined_result() {
        // Dispatch each command with an empty payload: handlers must come
        // back with a result (usually a validation failure), never hang or
        // panic past the dispatch boundary.
        let ctx = test_context();
        for (capability, router) in build_routers() {
            let commands: Vec<String> =
                router.command_types().map(ToOwned::to_owned).collect();
            assert!(!commands.is_empty(), "{capability} has no commands");
            for command in commands {
                let result = router
                    .dispatch(ctx.clone(), CommandEnvelope::new(command.clone()))
                    .await;
                if !result.success {
                    assert!(
                        result.error.as_deref().is_some_and(|error| !error.is_empty()),
                        "{command} failed without an error message"
                    );
                }
            }
        }
    }

    #[tokio::test]
    async fn command_names_are_namespaced_by_capability() {
        for (capability, router) in build_routers() {
            for command in router.command_types() {
                assert!(
                    command.starts_with(capability.as_str()),
                    "{command} is not namespaced under {capability}"
                );
            }
        }
    }
}
