// SPDX-FileCopyrightText: 2026 Terrella Contributors
// SPDX-License-Identifier: MIT

//! The command/result wire contract.
//!
//! Everything that crosses the viewer bridge is one of two shapes: a
//! [`CommandEnvelope`] going out (`{ id?, type, ...payload }`) and a
//! [`ResultFrame`] coming back (`{ id, success, message?, error?, ...data }`).
//! Consumers treat unknown extra fields as opaque pass-through.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Capability area served by one command router and one bridge channel.
///
/// The transport layer selects the channel by capability; the routers never
/// see envelopes for another capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Camera,
    Entity,
    Animation,
    Geo,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::Camera,
        Capability::Entity,
        Capability::Animation,
        Capability::Geo,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Camera => "camera",
            Capability::Entity => "entity",
            Capability::Animation => "animation",
            Capability::Geo => "geo",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseCapabilityError(pub String);

impl fmt::Display for ParseCapabilityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown capability: {}", self.0)
    }
}

impl std::error::Error for ParseCapabilityError {}

impl FromStr for Capability {
    type Err = ParseCapabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "camera" => Ok(Capability::Camera),
            "entity" => Ok(Capability::Entity),
            "animation" => Ok(Capability::Animation),
            "geo" => Ok(Capability::Geo),
            other => Err(ParseCapabilityError(other.to_owned())),
        }
    }
}

/// The typed unit of communication: a named command plus an open payload.
///
/// `id` is the correlation token; callers may supply one, the transport
/// generates one when absent. `type` on the wire selects the handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub command: String,
    #[serde(flatten)]
    pub payload: serde_json::Map<String, Value>,
}

impl CommandEnvelope {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            id: None,
            command: command.into(),
            payload: serde_json::Map::new(),
        }
    }

    /// Build an envelope whose payload is the serialized form of `params`.
    /// `params` must serialize to a JSON object.
    pub fn with_payload(
        command: impl Into<String>,
        params: impl Serialize,
    ) -> Result<Self, serde_json::Error> {
        let value = serde_json::to_value(params)?;
        let payload = match value {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            other => {
                return Err(serde::ser::Error::custom(format!(
                    "command payload must be an object, got {other}"
                )))
            }
        };
        Ok(Self {
            id: None,
            command: command.into(),
            payload,
        })
    }

    /// Deserialize the open payload into a typed parameter struct.
    pub fn params<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.payload.clone()))
    }
}

/// The result every dispatch produces, success or not.
///
/// `error` is populated iff `success` is false; the constructors keep that
/// convention. Extra capability fields ride in the flattened `data` map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub data: serde_json::Map<String, Value>,
}

impl CommandResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
            error: None,
            data: serde_json::Map::new(),
        }
    }

    pub fn ok_with(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::ok()
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
            data: serde_json::Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }
}

/// A correlated reply: the result plus the id of the command it answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultFrame {
    pub id: String,
    #[serde(flatten)]
    pub result: CommandResult,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn capability_round_trips_through_str() {
        for capability in Capability::ALL {
            let parsed: Capability = capability.as_str().parse().expect("parse capability");
            assert_eq!(parsed, capability);
        }
        assert!("viewer".parse::<Capability>().is_err());
    }

    #[test]
    fn envelope_flattens_payload_on_the_wire() {
        let envelope = CommandEnvelope::with_payload(
            "entity_create",
            json!({ "entity_id": "e1", "name": "Pin" }),
        )
        .expect("build envelope");

        let wire = serde_json::to_value(&envelope).expect("serialize");
        assert_eq!(wire["type"], "entity_create");
        assert_eq!(wire["entity_id"], "e1");
        assert_eq!(wire["name"], "Pin");
        assert!(wire.get("id").is_none());
    }

    #[test]
    fn envelope_accepts_unknown_extra_fields() {
        let envelope: CommandEnvelope = serde_json::from_value(json!({
            "id": "c-1",
            "type": "camera_set_view",
            "longitude": 13.4,
            "latitude": 52.5,
            "vendor_extension": { "nested": true },
        }))
        .expect("deserialize");

        assert_eq!(envelope.id.as_deref(), Some("c-1"));
        assert_eq!(envelope.command, "camera_set_view");
        assert_eq!(envelope.payload["vendor_extension"]["nested"], true);
    }

    #[test]
    fn result_constructors_keep_the_error_convention() {
        let ok = CommandResult::ok_with("done");
        assert!(ok.success);
        assert!(ok.error.is_none());

        let fail = CommandResult::fail("broken");
        assert!(!fail.success);
        assert_eq!(fail.error.as_deref(), Some("broken"));
        assert!(fail.message.is_none());
    }

    #[test]
    fn result_frame_flattens_result_fields() {
        let frame = ResultFrame {
            id: "c-9".to_owned(),
            result: CommandResult::ok().with_field("count", json!(3)),
        };
        let wire = serde_json::to_value(&frame).expect("serialize");
        assert_eq!(wire["id"], "c-9");
        assert_eq!(wire["success"], true);
        assert_eq!(wire["count"], 3);
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let result = CommandEnvelope::with_payload("entity_create", json!([1, 2, 3]));
        assert!(result.is_err());
    }
}
