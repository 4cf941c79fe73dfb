//! Normalization of caller input into one canonical batch.

use crate::common::{EventHubError, EventHubResult};
use crate::model::{AnnotatedMessage, EventBatch, EventRecord};
use crate::outcome::OutcomeBridge;
use crate::tracing_hook::TracingHook;

/// Every input shape accepted by [`Producer::send`](crate::producer::Producer::send).
#[derive(Debug, Clone)]
pub enum SendInput {
    /// One event
    Single(EventRecord),
    /// One message carrying its own transport annotations
    Annotated(AnnotatedMessage),
    /// A batch built by the caller; it already carries its routing key
    Batch(EventBatch),
    /// Any number of events sent as one batch
    Sequence(Vec<EventRecord>),
}

impl From<EventRecord> for SendInput {
    fn from(record: EventRecord) -> Self {
        SendInput::Single(record)
    }
}

impl From<AnnotatedMessage> for SendInput {
    fn from(message: AnnotatedMessage) -> Self {
        SendInput::Annotated(message)
    }
}

impl From<EventBatch> for SendInput {
    fn from(batch: EventBatch) -> Self {
        SendInput::Batch(batch)
    }
}

impl From<Vec<EventRecord>> for SendInput {
    fn from(records: Vec<EventRecord>) -> Self {
        SendInput::Sequence(records)
    }
}

/// Turns `input` into exactly one batch routed back to `bridge` on completion.
///
/// The partition key is stamped on single records and sequences. A pre-built
/// batch keeps its own key and is rejected if `partition_key` names a different
/// one. `max_size_in_bytes` bounds batches built here; pre-built batches keep
/// the bound they were built with and are re-measured after tracing.
///
/// # Errors
///
/// Returns [`EventHubError::Validation`] on a key conflict or when the records
/// do not fit the size bound. No transport interaction happens before this.
pub fn wrap_input(
    input: SendInput,
    partition_key: Option<&str>,
    hook: Option<&dyn TracingHook>,
    bridge: &OutcomeBridge,
    max_size_in_bytes: u64,
) -> EventHubResult<EventBatch> {
    let mut batch = match input {
        SendInput::Single(record) => {
            wrap_records(vec![record], partition_key, hook, max_size_in_bytes)?
        }
        SendInput::Annotated(message) => {
            wrap_records(vec![message.into()], partition_key, hook, max_size_in_bytes)?
        }
        SendInput::Sequence(records) => {
            wrap_records(records, partition_key, hook, max_size_in_bytes)?
        }
        SendInput::Batch(batch) => wrap_batch(batch, partition_key, hook)?,
    };
    batch.set_on_send_complete(bridge.clone());
    Ok(batch)
}

fn wrap_records(
    mut records: Vec<EventRecord>,
    partition_key: Option<&str>,
    hook: Option<&dyn TracingHook>,
    max_size_in_bytes: u64,
) -> EventHubResult<EventBatch> {
    if let Some(hook) = hook {
        records.iter_mut().for_each(|record| hook.trace_record(record));
    }
    EventBatch::from_records(
        records,
        partition_key.map(str::to_string),
        None,
        max_size_in_bytes,
    )
}

fn wrap_batch(
    mut batch: EventBatch,
    partition_key: Option<&str>,
    hook: Option<&dyn TracingHook>,
) -> EventHubResult<EventBatch> {
    if let Some(key) = partition_key {
        if batch.partition_key() != Some(key) {
            return Err(EventHubError::validation(
                "The partition_key does not match the one of the EventBatch",
            ));
        }
    }
    if let Some(hook) = hook {
        batch.records_mut().for_each(|record| hook.trace_record(record));
        batch.remeasure()?;
    }
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_MAX_BATCH_SIZE_BYTES;
    use crate::model::{BATCH_ENVELOPE_BYTES, BatchOptions, DIAGNOSTIC_ID_PROPERTY};
    use crate::tracing_hook::DiagnosticIdHook;

    fn keyed_batch(key: &str) -> EventBatch {
        let mut batch = EventBatch::new(BatchOptions {
            partition_key: Some(key.to_string()),
            ..BatchOptions::default()
        })
        .unwrap();
        batch.try_add(EventRecord::from_text("one")).unwrap();
        batch
    }

    #[test]
    fn test_single_record_gets_partition_key() {
        let bridge = OutcomeBridge::new();
        let batch = wrap_input(
            EventRecord::from_text("hello").into(),
            Some("A"),
            None,
            &bridge,
            DEFAULT_MAX_BATCH_SIZE_BYTES,
        )
        .unwrap();

        assert_eq!(batch.len(), 1);
        assert_eq!(batch.partition_key(), Some("A"));
        assert_eq!(batch.records()[0].partition_key(), Some("A"));
        assert!(batch.on_send_complete().is_some());
    }

    #[test]
    fn test_sequence_is_traced_and_keyed() {
        let bridge = OutcomeBridge::new();
        let records = (0..3).map(|i| EventRecord::from_text(&i.to_string())).collect::<Vec<_>>();

        let batch = wrap_input(
            records.into(),
            Some("K"),
            Some(&DiagnosticIdHook),
            &bridge,
            DEFAULT_MAX_BATCH_SIZE_BYTES,
        )
        .unwrap();

        assert_eq!(batch.len(), 3);
        for record in batch.records() {
            assert_eq!(record.partition_key(), Some("K"));
            assert!(record.properties().contains_key(DIAGNOSTIC_ID_PROPERTY));
        }
    }

    #[test]
    fn test_prebuilt_batch_rejects_different_key() {
        let bridge = OutcomeBridge::new();
        let result = wrap_input(
            keyed_batch("B").into(),
            Some("A"),
            None,
            &bridge,
            DEFAULT_MAX_BATCH_SIZE_BYTES,
        );

        assert!(matches!(result, Err(EventHubError::Validation(_))));
    }

    #[test]
    fn test_prebuilt_batch_accepts_same_or_missing_key() {
        let bridge = OutcomeBridge::new();
        let same = wrap_input(
            keyed_batch("B").into(),
            Some("B"),
            Some(&DiagnosticIdHook),
            &bridge,
            DEFAULT_MAX_BATCH_SIZE_BYTES,
        )
        .unwrap();
        assert!(same.records()[0].properties().contains_key(DIAGNOSTIC_ID_PROPERTY));

        let missing = wrap_input(
            keyed_batch("B").into(),
            None,
            None,
            &bridge,
            DEFAULT_MAX_BATCH_SIZE_BYTES,
        )
        .unwrap();
        assert_eq!(missing.partition_key(), Some("B"));
    }

    #[test]
    fn test_unkeyed_batch_rejects_explicit_key() {
        let bridge = OutcomeBridge::new();
        let mut batch = EventBatch::new(BatchOptions::default()).unwrap();
        batch.try_add(EventRecord::from_text("one")).unwrap();

        let result = wrap_input(batch.into(), Some("A"), None, &bridge, DEFAULT_MAX_BATCH_SIZE_BYTES);
        assert!(matches!(result, Err(EventHubError::Validation(_))));
    }

    #[test]
    fn test_traced_prebuilt_batch_must_still_fit() {
        let bridge = OutcomeBridge::new();
        let mut batch = EventBatch::new(BatchOptions {
            max_size_in_bytes: Some(200),
            ..BatchOptions::default()
        })
        .unwrap();
        while batch.try_add(EventRecord::from_text("reading")).is_ok() {}

        let result = wrap_input(
            batch.into(),
            None,
            Some(&DiagnosticIdHook),
            &bridge,
            DEFAULT_MAX_BATCH_SIZE_BYTES,
        );
        assert!(matches!(result, Err(EventHubError::Validation(_))));
    }

    #[test]
    fn test_traced_prebuilt_batch_reports_grown_size() {
        let bridge = OutcomeBridge::new();
        let mut batch = EventBatch::new(BatchOptions::default()).unwrap();
        batch.try_add(EventRecord::from_text("reading")).unwrap();
        let untraced = batch.size_in_bytes();

        let wrapped = wrap_input(
            batch.into(),
            None,
            Some(&DiagnosticIdHook),
            &bridge,
            DEFAULT_MAX_BATCH_SIZE_BYTES,
        )
        .unwrap();

        assert!(wrapped.size_in_bytes() > untraced);
        assert_eq!(
            wrapped.size_in_bytes(),
            BATCH_ENVELOPE_BYTES + wrapped.records()[0].size_in_bytes()
        );
    }

    #[test]
    fn test_sequence_exceeding_bound_is_rejected() {
        let bridge = OutcomeBridge::new();
        let records = vec![EventRecord::new(vec![0u8; 64]); 4];

        let result = wrap_input(records.into(), None, None, &bridge, 128);
        assert!(matches!(result, Err(EventHubError::Validation(_))));
    }
}
