//! Event data model: records, pre-annotated messages and batches.

mod batch;

pub use batch::{BATCH_ENVELOPE_BYTES, BatchOptions, EventBatch};

use crate::common::{EventHubError, EventHubResult};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Message annotation carrying the partition key used for service-side routing.
pub const PARTITION_KEY_ANNOTATION: &str = "x-opt-partition-key";

/// Application property carrying the W3C trace context of the send.
pub const DIAGNOSTIC_ID_PROPERTY: &str = "Diagnostic-Id";

/// A single event: opaque body plus application properties and transport annotations.
///
/// Records are mutable only until they are placed in a batch; the batch hands out
/// shared references afterwards.
///
/// # Examples
///
/// ```no_run
/// use producer::model::EventRecord;
///
/// let record = EventRecord::from_text("order created")
///     .with_property("order_id", 1042)
///     .with_content_type("text/plain");
///
/// assert_eq!(record.body(), b"order created");
/// ```
#[derive(Serialize, Clone, PartialEq, Debug, Default)]
pub struct EventRecord {
    body: Vec<u8>,
    properties: BTreeMap<String, Value>,
    annotations: BTreeMap<String, Value>,
    message_id: Option<String>,
    content_type: Option<String>,
}

impl EventRecord {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    pub fn from_text(text: &str) -> Self {
        Self::new(text.as_bytes().to_vec())
    }

    /// Creates a record with a JSON-serialized body and `application/json` content type.
    ///
    /// # Errors
    ///
    /// Returns [`EventHubError::Validation`] if the data cannot be serialized.
    pub fn from_json<T: Serialize>(data: &T) -> EventHubResult<Self> {
        let body = serde_json::to_vec(data)
            .map_err(|e| EventHubError::validation(format!("event body is not serializable: {e}")))?;
        Ok(Self::new(body).with_content_type("application/json"))
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn properties(&self) -> &BTreeMap<String, Value> {
        &self.properties
    }

    pub fn annotations(&self) -> &BTreeMap<String, Value> {
        &self.annotations
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// The partition key stamped on the record, if any.
    pub fn partition_key(&self) -> Option<&str> {
        self.annotations
            .get(PARTITION_KEY_ANNOTATION)
            .and_then(Value::as_str)
    }

    pub(crate) fn set_partition_key(&mut self, partition_key: &str) {
        self.annotations.insert(
            PARTITION_KEY_ANNOTATION.to_string(),
            Value::String(partition_key.to_string()),
        );
    }

    pub(crate) fn properties_mut(&mut self) -> &mut BTreeMap<String, Value> {
        &mut self.properties
    }

    /// Estimated encoded size of the record inside a batch.
    pub fn size_in_bytes(&self) -> u64 {
        let body = self.body.len() as u64;
        let overhead = if body < 256 { 5 } else { 8 };
        let optional = self.message_id.as_ref().map_or(0, |s| s.len() as u64 + 2)
            + self.content_type.as_ref().map_or(0, |s| s.len() as u64 + 2);

        body + overhead + encoded_map_size(&self.properties) + encoded_map_size(&self.annotations) + optional
    }
}

fn encoded_map_size(map: &BTreeMap<String, Value>) -> u64 {
    if map.is_empty() {
        return 0;
    }
    map.iter()
        .map(|(key, value)| key.len() as u64 + value.to_string().len() as u64 + 2)
        .sum::<u64>()
        + 4
}

/// A message that already carries its own transport annotations.
///
/// Converted into an [`EventRecord`] on the outbound path; nothing is dropped.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct AnnotatedMessage {
    pub body: Vec<u8>,
    pub message_annotations: BTreeMap<String, Value>,
    pub application_properties: BTreeMap<String, Value>,
    pub message_id: Option<String>,
    pub content_type: Option<String>,
}

impl From<AnnotatedMessage> for EventRecord {
    fn from(message: AnnotatedMessage) -> Self {
        Self {
            body: message.body,
            properties: message.application_properties,
            annotations: message.message_annotations,
            message_id: message.message_id,
            content_type: message.content_type,
        }
    }
}
