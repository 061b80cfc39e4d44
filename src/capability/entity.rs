// SPDX-FileCopyrightText: 2026 Terrella Contributors
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::model::{EntityKind, EntityRecord, GeoPosition};
use crate::protocol::{Capability, CommandEnvelope, CommandResult};
use crate::router::{CommandRouter, HandlerError, HandlerFuture};
use crate::scene::SceneSession;

use super::HandlerContext;

pub fn router() -> CommandRouter<HandlerContext> {
    let mut router = CommandRouter::new(Capability::Entity);
    router.register("entity_create", |ctx, envelope| -> HandlerFuture {
        Box::pin(create(ctx, envelope))
    });
    router.register("entity_create_batch", |ctx, envelope| -> HandlerFuture {
        Box::pin(create_batch(ctx, envelope))
    });
    router.register("entity_update", |ctx, envelope| -> HandlerFuture {
        Box::pin(update(ctx, envelope))
    });
    router.register("entity_get", |ctx, envelope| -> HandlerFuture {
        Box::pin(get(ctx, envelope))
    });
    router.register("entity_list", |ctx, envelope| -> HandlerFuture {
        Box::pin(list(ctx, envelope))
    });
    router.register("entity_remove", |ctx, envelope| -> HandlerFuture {
        Box::pin(remove(ctx, envelope))
    });
    // The singular spelling predates the batch command.
    router.register_alias("entity_add", "entity_create");
    router
}

#[derive(Debug, Clone, Deserialize)]
struct CreateParams {
    #[serde(default)]
    entity_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    kind: EntityKind,
    #[serde(default)]
    position: Option<GeoPosition>,
    #[serde(default)]
    positions: Option<Vec<GeoPosition>>,
    #[serde(default)]
    properties: Option<serde_json::Map<String, Value>>,
}

impl CreateParams {
    fn into_record(self) -> Result<(Option<String>, EntityRecord), HandlerError> {
        let positions = match (self.positions, self.position) {
            (Some(positions), _) if !positions.is_empty() => positions,
            (_, Some(position)) => vec![position],
            _ => {
                return Err(HandlerError::InvalidParams(
                    "position or positions is required".to_owned(),
                ))
            }
        };
        if let Some(bad) = positions.iter().find(|position| !position.is_valid()) {
            return Err(HandlerError::InvalidParams(format!(
                "position out of range: longitude {}, latitude {}",
                bad.longitude, bad.latitude
            )));
        }
        if self.kind == EntityKind::Polyline && positions.len() < 2 {
            return Err(HandlerError::InvalidParams(
                "a polyline needs at least 2 positions".to_owned(),
            ));
        }

        Ok((
            self.entity_id,
            EntityRecord {
                name: self.name,
                kind: self.kind,
                positions,
                properties: self.properties.unwrap_or_default(),
            },
        ))
    }
}

/// Insert into the store and the engine inside one lock scope; if the engine
/// rejects the object, the store insert is rolled back so the two stay in
/// step. The store enforces the id shape rule for caller-supplied ids.
fn create_one(
    ctx: &HandlerContext,
    session: &mut SceneSession,
    params: CreateParams,
) -> Result<String, HandlerError> {
    let (explicit_id, record) = params.into_record()?;
    let entity_id = session
        .entities_mut()
        .create(explicit_id, record.clone())
        .map_err(|err| HandlerError::InvalidParams(err.to_string()))?;
    if let Err(err) = ctx.engine.add_object(&entity_id, &record) {
        let _ = session.entities_mut().remove(&entity_id);
        return Err(HandlerError::Engine(err.to_string()));
    }
    Ok(entity_id)
}

async fn create(
    ctx: Arc<HandlerContext>,
    envelope: CommandEnvelope,
) -> Result<CommandResult, HandlerError> {
    let params: CreateParams = envelope.params()?;
    let mut session = ctx.session.lock().await;
    let entity_id = create_one(&ctx, &mut session, params)?;
    drop(session);

    Ok(CommandResult::ok_with(format!("entity {entity_id} created"))
        .with_field("entity_id", json!(entity_id)))
}

#[derive(Debug, Deserialize)]
struct CreateBatchParams {
    entities: Vec<CreateParams>,
}

/// Creates the valid entries and skips the invalid ones; the overall result
/// is a success with qualifying counts, not a failure.
async fn create_batch(
    ctx: Arc<HandlerContext>,
    envelope: CommandEnvelope,
) -> Result<CommandResult, HandlerError> {
    let params: CreateBatchParams = envelope.params()?;
    if params.entities.is_empty() {
        return Err(HandlerError::InvalidParams("entities must not be empty".to_owned()));
    }
    let total = params.entities.len();

    let mut created = Vec::new();
    let mut skipped = Vec::new();
    let mut session = ctx.session.lock().await;
    for (index, entry) in params.entities.into_iter().enumerate() {
        match create_one(&ctx, &mut session, entry) {
            Ok(entity_id) => created.push(entity_id),
            Err(err) => skipped.push(json!({ "index": index, "reason": err.to_string() })),
        }
    }
    drop(session);

    Ok(CommandResult::ok_with(format!(
        "created {} of {} entities ({} skipped)",
        created.len(),
        total,
        skipped.len()
    ))
    .with_field("created", json!(created))
    .with_field("skipped", json!(skipped)))
}

#[derive(Debug, Deserialize)]
struct UpdateParams {
    entity_id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    kind: Option<EntityKind>,
    #[serde(default)]
    position: Option<GeoPosition>,
    #[serde(default)]
    positions: Option<Vec<GeoPosition>>,
    #[serde(default)]
    properties: Option<serde_json::Map<String, Value>>,
}

async fn update(
    ctx: Arc<HandlerContext>,
    envelope: CommandEnvelope,
) -> Result<CommandResult, HandlerError> {
    let params: UpdateParams = envelope.params()?;

    let new_positions = match (&params.positions, &params.position) {
        (Some(positions), _) => Some(positions.clone()),
        (None, Some(position)) => Some(vec![*position]),
        (None, None) => None,
    };
    if let Some(positions) = &new_positions {
        if positions.is_empty() {
            return Err(HandlerError::InvalidParams("positions must not be empty".to_owned()));
        }
        if let Some(bad) = positions.iter().find(|position| !position.is_valid()) {
            return Err(HandlerError::InvalidParams(format!(
                "position out of range: longitude {}, latitude {}",
                bad.longitude, bad.latitude
            )));
        }
    }

    let mut session = ctx.session.lock().await;
    session
        .entities_mut()
        .update(&params.entity_id, |record| {
            if let Some(name) = params.name.clone() {
                record.name = Some(name);
            }
            if let Some(kind) = params.kind {
                record.kind = kind;
            }
            if let Some(positions) = new_positions.clone() {
                record.positions = positions;
            }
            if let Some(properties) = params.properties.clone() {
                for (key, value) in properties {
                    record.properties.insert(key, value);
                }
            }
        })
        .map_err(|err| HandlerError::NotFound(err.to_string()))?;

    let record = session
        .entities()
        .get(&params.entity_id)
        .cloned()
        .ok_or_else(|| HandlerError::NotFound(format!("no record with id {}", params.entity_id)))?;
    ctx.engine
        .add_object(&params.entity_id, &record)
        .map_err(|err| HandlerError::Engine(err.to_string()))?;
    drop(session);

    Ok(CommandResult::ok_with(format!("entity {} updated", params.entity_id))
        .with_field("entity_id", json!(params.entity_id)))
}

#[derive(Debug, Deserialize)]
struct TargetParams {
    entity_id: String,
}

async fn get(
    ctx: Arc<HandlerContext>,
    envelope: CommandEnvelope,
) -> Result<CommandResult, HandlerError> {
    let params: TargetParams = envelope.params()?;
    let session = ctx.session.lock().await;
    let record = session
        .entities()
        .get(&params.entity_id)
        .cloned()
        .ok_or_else(|| HandlerError::NotFound(format!("entity {} not found", params.entity_id)))?;
    drop(session);

    Ok(CommandResult::ok()
        .with_field("entity_id", json!(params.entity_id))
        .with_field("entity", serde_json::to_value(&record)?)
        .with_field("rendered", json!(ctx.engine.has_object(&params.entity_id))))
}

async fn list(
    ctx: Arc<HandlerContext>,
    _envelope: CommandEnvelope,
) -> Result<CommandResult, HandlerError> {
    let session = ctx.session.lock().await;
    let entities: Vec<Value> = session
        .entities()
        .iter()
        .map(|(entity_id, record)| {
            json!({
                "entity_id": entity_id,
                "name": record.name,
                "kind": record.kind.as_str(),
                "position": record.anchor(),
            })
        })
        .collect();
    let count = entities.len();
    drop(session);

    Ok(CommandResult::ok()
        .with_field("entities", json!(entities))
        .with_field("count", json!(count)))
}

async fn remove(
    ctx: Arc<HandlerContext>,
    envelope: CommandEnvelope,
) -> Result<CommandResult, HandlerError> {
    let params: TargetParams = envelope.params()?;
    let mut session = ctx.session.lock().await;
    let removed = session
        .remove_entity(&params.entity_id)
        .map_err(|err| HandlerError::NotFound(err.to_string()))?;
    if removed.was_tracked {
        ctx.engine.track_object(None);
    }
    ctx.engine.remove_object(&params.entity_id);
    drop(session);

    Ok(CommandResult::ok_with(format!("entity {} removed", params.entity_id))
        .with_field("entity_id", json!(params.entity_id))
        .with_field("was_tracked", json!(removed.was_tracked)))
}
