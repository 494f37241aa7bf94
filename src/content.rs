//! Message content wire format.
//!
//! DESIGN
//! ======
//! Structured content (text plus attachment ids plus entity refs) travels as
//! a small JSON envelope inside the message body. A message with neither
//! attachments nor refs is sent as bare text so older clients still read it.
//!
//! Parsing is keyed on shape: any JSON object carrying `text`, `attachments`
//! or `entity_refs` is an envelope, with or without a `v` field. Envelopes
//! written by other clients omit `v`; one with a `v` other than 1 is bare
//! text, as is anything else. `parse(build(x)) == x` for every input.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

const ENVELOPE_VERSION: u8 = 1;
const ENVELOPE_KEYS: [&str; 3] = ["text", "attachments", "entity_refs"];

/// Pointer from a chat message to an unrelated business record. Carried,
/// never interpreted: display fields such as `title` or `url` ride along in
/// `extra` and are written back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EntityRef {
    #[must_use]
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self { kind: kind.into(), id: id.into(), extra: Map::new() }
    }
}

/// Structured payload decoded from a message body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedContent {
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<Uuid>,
    #[serde(default)]
    pub entity_refs: Vec<EntityRef>,
}

#[derive(Serialize)]
struct EnvelopeOut<'a> {
    v: u8,
    text: &'a str,
    attachments: &'a [Uuid],
    entity_refs: &'a [EntityRef],
}

#[derive(Deserialize)]
struct EnvelopeIn {
    #[serde(default)]
    v: Option<u8>,
    #[serde(default)]
    text: String,
    #[serde(default)]
    attachments: Vec<Uuid>,
    #[serde(default)]
    entity_refs: Vec<EntityRef>,
}

/// Serialize text, attachment ids and entity refs into a message body.
#[must_use]
pub fn build_message_content(text: &str, attachment_ids: &[Uuid], entity_refs: &[EntityRef]) -> String {
    // Text that decodes as an envelope is always wrapped.
    if attachment_ids.is_empty() && entity_refs.is_empty() && decode_envelope(text).is_none() {
        return text.to_owned();
    }

    let envelope = EnvelopeOut { v: ENVELOPE_VERSION, text, attachments: attachment_ids, entity_refs };
    serde_json::to_string(&envelope).unwrap_or_else(|_| text.to_owned())
}

/// Decode a message body. Never fails: unknown shapes are bare text.
#[must_use]
pub fn parse_message_content(content: &str) -> ParsedContent {
    decode_envelope(content).unwrap_or_else(|| ParsedContent {
        text: content.to_owned(),
        attachments: Vec::new(),
        entity_refs: Vec::new(),
    })
}

fn decode_envelope(content: &str) -> Option<ParsedContent> {
    if !content.trim_start().starts_with('{') {
        return None;
    }
    let object: Map<String, Value> = serde_json::from_str(content).ok()?;
    if !ENVELOPE_KEYS.iter().any(|key| object.contains_key(*key)) {
        return None;
    }
    let envelope: EnvelopeIn = serde_json::from_value(Value::Object(object)).ok()?;
    if envelope.v.is_some_and(|v| v != ENVELOPE_VERSION) {
        return None;
    }
    Some(ParsedContent {
        text: envelope.text,
        attachments: envelope.attachments,
        entity_refs: envelope.entity_refs,
    })
}

#[cfg(test)]
#[path = "content_test.rs"]
mod tests;
