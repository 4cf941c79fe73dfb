use super::EventRecord;
use crate::common::{EventHubError, EventHubResult};
use crate::config::DEFAULT_MAX_BATCH_SIZE_BYTES;
use crate::outcome::OutcomeBridge;
use crate::tracing_hook::TracingHook;
use std::sync::Arc;

/// Fixed encoding cost of the batch envelope itself.
pub const BATCH_ENVELOPE_BYTES: u64 = 24;

/// Options for building an [`EventBatch`].
///
/// A batch is routed either by partition key or by explicit partition id; setting
/// both is rejected.
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Upper bound of the encoded batch (default: 1 MiB)
    pub max_size_in_bytes: Option<u64>,
    /// Key hashed by the service to pick a partition
    pub partition_key: Option<String>,
    /// Explicit partition to send to
    pub partition_id: Option<String>,
}

/// An ordered, size-bounded group of records sent as one transport unit.
///
/// Every record in the batch shares the batch's routing target: records added to a
/// keyed batch are stamped with the batch key. The batch is consumed by value when
/// sent, after which it can no longer change.
///
/// # Examples
///
/// ```no_run
/// use producer::model::{BatchOptions, EventBatch, EventRecord};
///
/// let mut batch = EventBatch::new(BatchOptions {
///     partition_key: Some("device-7".to_string()),
///     ..BatchOptions::default()
/// })?;
///
/// batch.try_add(EventRecord::from_text("reading 1"))?;
/// batch.try_add(EventRecord::from_text("reading 2"))?;
/// assert_eq!(batch.len(), 2);
/// # Ok::<(), producer::common::EventHubError>(())
/// ```
#[derive(Clone)]
pub struct EventBatch {
    records: Vec<EventRecord>,
    max_size_in_bytes: u64,
    size_in_bytes: u64,
    partition_key: Option<String>,
    partition_id: Option<String>,
    on_send_complete: Option<OutcomeBridge>,
    /// Applied in `try_add` so the measured size includes the trace property
    tracing_hook: Option<Arc<dyn TracingHook>>,
}

impl std::fmt::Debug for EventBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBatch")
            .field("records", &self.records.len())
            .field("size_in_bytes", &self.size_in_bytes)
            .field("max_size_in_bytes", &self.max_size_in_bytes)
            .field("partition_key", &self.partition_key)
            .field("partition_id", &self.partition_id)
            .finish()
    }
}

impl EventBatch {
    /// Creates an empty batch.
    ///
    /// # Errors
    ///
    /// Returns [`EventHubError::Validation`] if both a partition key and a
    /// partition id are given, or the size bound is smaller than the envelope.
    pub fn new(options: BatchOptions) -> EventHubResult<Self> {
        if options.partition_key.is_some() && options.partition_id.is_some() {
            return Err(EventHubError::validation(
                "partition_id and partition_key cannot be both set",
            ));
        }
        let max_size_in_bytes = options
            .max_size_in_bytes
            .unwrap_or(DEFAULT_MAX_BATCH_SIZE_BYTES);
        if max_size_in_bytes <= BATCH_ENVELOPE_BYTES {
            return Err(EventHubError::validation(format!(
                "max_size_in_bytes must exceed the batch envelope of {BATCH_ENVELOPE_BYTES} bytes"
            )));
        }

        Ok(Self {
            records: Vec::new(),
            max_size_in_bytes,
            size_in_bytes: BATCH_ENVELOPE_BYTES,
            partition_key: options.partition_key,
            partition_id: options.partition_id,
            on_send_complete: None,
            tracing_hook: None,
        })
    }

    /// Folds records into a new batch, stamping the key on each.
    pub(crate) fn from_records(
        records: impl IntoIterator<Item = EventRecord>,
        partition_key: Option<String>,
        partition_id: Option<String>,
        max_size_in_bytes: u64,
    ) -> EventHubResult<Self> {
        let mut batch = Self::new(BatchOptions {
            max_size_in_bytes: Some(max_size_in_bytes),
            partition_key,
            partition_id,
        })?;
        for record in records {
            batch.try_add(record)?;
        }
        Ok(batch)
    }

    /// Adds a record, stamping the batch partition key on it.
    ///
    /// Batches created by a producer also trace the record here, before it is
    /// measured.
    ///
    /// # Errors
    ///
    /// Returns [`EventHubError::Validation`] if the record would push the batch
    /// past its size bound. The batch is left unchanged.
    pub fn try_add(&mut self, mut record: EventRecord) -> EventHubResult<()> {
        if let Some(key) = &self.partition_key {
            record.set_partition_key(key);
        }
        if let Some(hook) = &self.tracing_hook {
            hook.trace_record(&mut record);
        }

        let size = record.size_in_bytes();
        if self.size_in_bytes + size > self.max_size_in_bytes {
            return Err(EventHubError::validation(format!(
                "EventBatch has reached its size limit: {} bytes",
                self.max_size_in_bytes
            )));
        }

        self.size_in_bytes += size;
        self.records.push(record);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn size_in_bytes(&self) -> u64 {
        self.size_in_bytes
    }

    pub fn max_size_in_bytes(&self) -> u64 {
        self.max_size_in_bytes
    }

    pub fn partition_key(&self) -> Option<&str> {
        self.partition_key.as_deref()
    }

    pub fn partition_id(&self) -> Option<&str> {
        self.partition_id.as_deref()
    }

    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    pub(crate) fn records_mut(&mut self) -> impl Iterator<Item = &mut EventRecord> {
        self.records.iter_mut()
    }

    /// Traces every record added from now on.
    pub(crate) fn set_tracing_hook(&mut self, hook: Option<Arc<dyn TracingHook>>) {
        self.tracing_hook = hook;
    }

    /// Recomputes the size after records were changed in place.
    ///
    /// # Errors
    ///
    /// Returns [`EventHubError::Validation`] if the records no longer fit the
    /// size bound.
    pub(crate) fn remeasure(&mut self) -> EventHubResult<()> {
        self.size_in_bytes = BATCH_ENVELOPE_BYTES
            + self
                .records
                .iter()
                .map(EventRecord::size_in_bytes)
                .sum::<u64>();
        if self.size_in_bytes > self.max_size_in_bytes {
            return Err(EventHubError::validation(format!(
                "EventBatch content of {} bytes exceeds its size limit of {} bytes",
                self.size_in_bytes, self.max_size_in_bytes
            )));
        }
        Ok(())
    }

    /// Routes delivery notifications for this batch into `bridge`.
    pub(crate) fn set_on_send_complete(&mut self, bridge: OutcomeBridge) {
        self.on_send_complete = Some(bridge);
    }

    pub(crate) fn on_send_complete(&self) -> Option<&OutcomeBridge> {
        self.on_send_complete.as_ref()
    }

    /// Moves the records out, leaving the routing metadata in place.
    pub(crate) fn take_records(&mut self) -> Vec<EventRecord> {
        self.size_in_bytes = BATCH_ENVELOPE_BYTES;
        std::mem::take(&mut self.records)
    }
}
