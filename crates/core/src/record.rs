//! Stored records, change-feed events and outgoing notifications.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::error::Result;
use crate::payload::Payload;

/// Field the decoded payload is stored under.
pub const PAYLOAD_FIELD: &str = "order";

/// Field the record image is nested under in a notification body.
pub const NEW_RECORD_FIELD: &str = "new_record";

/// Subject attached to every creation notification.
pub const NOTIFICATION_SUBJECT: &str = "New Order Inserted";

/// Where a record's idempotency key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// Taken verbatim from the payload's key field.
    Supplied,
    /// Freshly generated; redelivery of the same body yields a new record.
    Synthesized,
}

/// The unit kept in the store: at most one per key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub key: String,
    pub payload: Payload,
}

impl Record {
    pub fn new(key: impl Into<String>, payload: Payload) -> Self {
        Self {
            key: key.into(),
            payload,
        }
    }

    /// Builds a record, keying it by `id_field` or by a fresh UUID.
    pub fn from_payload(payload: Payload, id_field: &str) -> (Self, KeySource) {
        match payload.supplied_key(id_field) {
            Some(key) => (Self::new(key, payload), KeySource::Supplied),
            None => (
                Self::new(Uuid::new_v4().to_string(), payload),
                KeySource::Synthesized,
            ),
        }
    }

    /// Store document: `{ <id_field>: key, "order": payload }`.
    pub fn to_document(&self, id_field: &str) -> Value {
        let mut doc = Map::with_capacity(2);
        doc.insert(id_field.to_string(), Value::String(self.key.clone()));
        doc.insert(PAYLOAD_FIELD.to_string(), self.payload.to_value());
        Value::Object(doc)
    }
}

/// Kind of mutation reported on the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(Self::Created),
            "updated" => Some(Self::Updated),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }
}

/// One entry on the store's change feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub key: String,
    /// Record after the change; absent for deletions.
    pub new_image: Option<Record>,
    /// Feed position. Monotonic within one key's history.
    pub sequence: u64,
}

impl ChangeEvent {
    pub fn is_creation(&self) -> bool {
        self.kind == ChangeKind::Created
    }

    /// Wire form: `{ eventKind, key, newImage?, sequence }`.
    pub fn to_wire(&self, id_field: &str) -> Value {
        let mut wire = json!({
            "eventKind": self.kind.as_str(),
            "key": self.key,
            "sequence": self.sequence,
        });
        if let Some(image) = &self.new_image {
            wire["newImage"] = image.to_document(id_field);
        }
        wire
    }
}

/// Message handed to the topic for each newly created record.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub subject: String,
    /// Key of the record the notification describes.
    pub key: String,
    /// `{ "new_record": <record document> }`
    pub body: Value,
}

impl Notification {
    pub fn new_record(image: &Record, id_field: &str) -> Self {
        let mut body = Map::with_capacity(1);
        body.insert(NEW_RECORD_FIELD.to_string(), image.to_document(id_field));

        Self {
            subject: NOTIFICATION_SUBJECT.to_string(),
            key: image.key.clone(),
            body: Value::Object(body),
        }
    }

    pub fn body_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.body)?)
    }
}
