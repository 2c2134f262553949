//! Domain events carried by the things/channels stream.

use std::collections::HashMap;

use serde_json::{Map, Value};

/// Operation tags written by the things service.
pub const THING_REMOVE: &str = "thing.remove";
pub const THING_DISCONNECT: &str = "thing.disconnect";
pub const CHANNEL_UPDATE: &str = "channel.update";
pub const CHANNEL_REMOVE: &str = "channel.remove";

const OPERATION: &str = "operation";

/// An event that affects bootstrap configurations.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    RemoveThing {
        id: String,
    },
    DisconnectThing {
        channel_id: String,
        thing_id: String,
    },
    UpdateChannel {
        id: String,
        name: String,
        metadata: Map<String, Value>,
    },
    RemoveChannel {
        id: String,
    },
}

impl DomainEvent {
    /// Wire tag of this event.
    pub fn operation(&self) -> &'static str {
        match self {
            DomainEvent::RemoveThing { .. } => THING_REMOVE,
            DomainEvent::DisconnectThing { .. } => THING_DISCONNECT,
            DomainEvent::UpdateChannel { .. } => CHANNEL_UPDATE,
            DomainEvent::RemoveChannel { .. } => CHANNEL_REMOVE,
        }
    }
}

/// Result of decoding an entry payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Event(DomainEvent),
    /// The operation tag is missing or not one this service reacts to.
    Ignored { operation: String },
}

/// Decode an entry payload against its `operation` tag.
///
/// Missing fields default to the empty string. A missing `metadata` field is
/// treated as `{}`, and metadata that is not a JSON object becomes an empty map.
pub fn decode(fields: &HashMap<String, String>) -> Decoded {
    let operation = read(fields, OPERATION);
    let event = match operation.as_str() {
        THING_REMOVE => DomainEvent::RemoveThing {
            id: read(fields, "id"),
        },
        THING_DISCONNECT => DomainEvent::DisconnectThing {
            channel_id: read(fields, "chan_id"),
            thing_id: read(fields, "thing_id"),
        },
        CHANNEL_UPDATE => DomainEvent::UpdateChannel {
            id: read(fields, "id"),
            name: read(fields, "name"),
            metadata: decode_metadata(fields.get("metadata").map(String::as_str).unwrap_or("{}")),
        },
        CHANNEL_REMOVE => DomainEvent::RemoveChannel {
            id: read(fields, "id"),
        },
        _ => return Decoded::Ignored { operation },
    };
    Decoded::Event(event)
}

fn read(fields: &HashMap<String, String>, key: &str) -> String {
    fields.get(key).cloned().unwrap_or_default()
}

fn decode_metadata(raw: &str) -> Map<String, Value> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(_) | Err(_) => Map::new(),
    }
}
