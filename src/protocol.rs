/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Wire protocol: the message shapes exchanged between server and browser.
//!
//! JSON-tagged enums over `serde`/`serde_json`, the same pair this crate's
//! sibling actor messages (`actors/root.rs`, `actors/watcher.rs`) use for
//! their wire shapes. Framing and transport (how bytes cross the WebSocket)
//! are the concrete router/WebSocket library's job, out of scope here; this
//! module only defines what those bytes decode to.

use serde::{Deserialize, Serialize};

use crate::id::{ComponentId, RequestId};

/// A single `get`-family query kind, carried on the `get` command and echoed
/// back (as a reserved event name) on the matching reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GetSubType {
    Value,
    Html,
    Style,
    Propertie,
    Attribute,
}

impl GetSubType {
    /// The reserved client->server event name that carries this query's reply.
    pub fn reply_event_name(self) -> &'static str {
        match self {
            GetSubType::Value => "get_value",
            GetSubType::Html => "get_html",
            GetSubType::Style => "get_style",
            GetSubType::Propertie => "get_propertie",
            GetSubType::Attribute => "get_attribute",
        }
    }

    pub fn from_reply_event_name(name: &str) -> Option<Self> {
        Some(match name {
            "get_value" => GetSubType::Value,
            "get_html" => GetSubType::Html,
            "get_style" => GetSubType::Style,
            "get_propertie" => GetSubType::Propertie,
            "get_attribute" => GetSubType::Attribute,
            _ => return None,
        })
    }
}

/// Server -> client mutation command. Externally tagged by `type`, matching
/// the wire table: `fill`, `text`, `style`, `propertie`, `set`, `attribute`,
/// `script`, `get`, `remove`, `addNode`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    #[serde(rename = "fill")]
    Fill { id: ComponentId, value: String },

    #[serde(rename = "text")]
    Text { id: ComponentId, value: String },

    #[serde(rename = "style")]
    Style {
        id: ComponentId,
        propertie: String,
        value: String,
    },

    #[serde(rename = "propertie")]
    Propertie {
        id: ComponentId,
        propertie: String,
        value: String,
    },

    #[serde(rename = "set")]
    Set { id: ComponentId, value: String },

    #[serde(rename = "attribute")]
    Attribute {
        id: ComponentId,
        propertie: String,
        value: String,
    },

    #[serde(rename = "script")]
    Script { value: String },

    #[serde(rename = "get")]
    Get {
        id: ComponentId,
        sub_type: GetSubType,
        id_ret: RequestId,
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },

    #[serde(rename = "remove")]
    Remove { id: ComponentId },

    #[serde(rename = "addNode")]
    AddNode { id: ComponentId, value: String },
}

impl Command {
    /// The element identifier this command targets, when it has one (`script`
    /// commands have none — they run in page scope).
    pub fn target_id(&self) -> Option<&ComponentId> {
        match self {
            Command::Fill { id, .. }
            | Command::Text { id, .. }
            | Command::Style { id, .. }
            | Command::Propertie { id, .. }
            | Command::Set { id, .. }
            | Command::Attribute { id, .. }
            | Command::Get { id, .. }
            | Command::Remove { id, .. }
            | Command::AddNode { id, .. } => Some(id),
            Command::Script { .. } => None,
        }
    }
}

/// Client -> server event envelope. `id_ret` is present only when the event
/// is a reply to a server-issued `get` query; `id` is absent on that same
/// reply (see scenario 2 in the design notes) since a `get` reply answers a
/// pending request, not a component.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_ret: Option<RequestId>,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ComponentId>,
    pub data: serde_json::Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Data,
}

impl EventEnvelope {
    /// Decode the payload once, at the protocol boundary, into a tagged
    /// [`EventPayload`] rather than passing the raw `serde_json::Value`
    /// downstream — resolves the open question in the design notes about not
    /// reproducing the source's inconsistent opaque-string-vs-decoded-value
    /// handling.
    pub fn payload(&self) -> EventPayload {
        match &self.data {
            serde_json::Value::String(s) => EventPayload::Text(s.clone()),
            other => EventPayload::Structured(other.clone()),
        }
    }

    /// If this envelope is a reply to a `get`-family query, the query kind it answers.
    pub fn get_reply_kind(&self) -> Option<GetSubType> {
        GetSubType::from_reply_event_name(&self.event)
    }
}

/// An inbound event's payload, decoded once at the protocol boundary.
#[derive(Clone, Debug, PartialEq)]
pub enum EventPayload {
    /// The payload was a JSON string — the common case for form values, get-replies, etc.
    Text(String),
    /// The payload was any other JSON value (object, array, number, bool, null).
    Structured(serde_json::Value),
}

impl EventPayload {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            EventPayload::Text(s) => Some(s),
            EventPayload::Structured(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_command_round_trips() {
        let cmd = Command::Fill {
            id: ComponentId::new("root").unwrap(),
            value: "<button>n=1</button>".to_string(),
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["type"], "fill");
        assert_eq!(json["id"], "root");
        let decoded: Command = serde_json::from_value(json).unwrap();
        match decoded {
            Command::Fill { id, value } => {
                assert_eq!(id.as_str(), "root");
                assert_eq!(value, "<button>n=1</button>");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn get_command_carries_request_id_and_subtype() {
        let id_ret = RequestId::new();
        let cmd = Command::Get {
            id: ComponentId::new("inp").unwrap(),
            sub_type: GetSubType::Value,
            id_ret,
            value: None,
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["sub_type"], "value");
        assert_eq!(json["id_ret"], id_ret.to_string());
    }

    #[test]
    fn event_envelope_decodes_string_payload_as_text() {
        let envelope: EventEnvelope = serde_json::from_value(serde_json::json!({
            "type": "data",
            "event": "get_value",
            "id": "inp",
            "data": "hello",
            "id_ret": RequestId::new().to_string(),
        }))
        .unwrap();
        assert_eq!(envelope.payload(), EventPayload::Text("hello".to_string()));
        assert_eq!(envelope.get_reply_kind(), Some(GetSubType::Value));
    }

    #[test]
    fn event_envelope_decodes_object_payload_as_structured() {
        let envelope: EventEnvelope = serde_json::from_value(serde_json::json!({
            "type": "data",
            "event": "Move",
            "id": "card1",
            "data": {"to": "done"},
        }))
        .unwrap();
        assert!(matches!(envelope.payload(), EventPayload::Structured(_)));
        assert_eq!(envelope.get_reply_kind(), None);
    }

    #[test]
    fn get_reply_envelope_with_no_id_field_still_decodes() {
        let envelope: EventEnvelope = serde_json::from_value(serde_json::json!({
            "type": "data",
            "event": "get_value",
            "id_ret": "r1",
            "data": "hello",
        }))
        .unwrap();
        assert_eq!(envelope.id, None);
        assert_eq!(envelope.payload(), EventPayload::Text("hello".to_string()));
    }
}
