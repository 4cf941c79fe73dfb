use crate::auth::AuthProvider;
use crate::common::{EventHubError, EventHubResult};
use crate::model::EventBatch;
use crate::producer::{Producer, ProducerOptions, SendOptions};
use crate::transport::TransportConnector;
use crate::wrapper::SendInput;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Options for [`ProducerClient::create_batch`].
#[derive(Debug, Clone, Default)]
pub struct CreateBatchOptions {
    pub partition_id: Option<String>,
    pub partition_key: Option<String>,
    /// Must not exceed what the link accepts; defaults to the link limit
    pub max_size_in_bytes: Option<u64>,
    /// Bounds opening the link
    pub timeout: Option<Duration>,
}

#[derive(Default)]
struct ClientState {
    /// Keyed by partition id; `None` is the service-routed producer
    producers: HashMap<Option<String>, Arc<Producer>>,
    closed: bool,
}

/// Routes sends to per-partition producers created on first use.
///
/// Each producer owns its own link, so sends to different partitions proceed
/// concurrently while sends to one partition stay serialized.
pub struct ProducerClient {
    event_hub: String,
    connector: Arc<dyn TransportConnector>,
    auth: Arc<dyn AuthProvider>,
    options: ProducerOptions,
    state: Mutex<ClientState>,
}

impl std::fmt::Debug for ProducerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProducerClient")
            .field("event_hub", &self.event_hub)
            .field("options", &self.options)
            .finish()
    }
}

impl ProducerClient {
    /// `options.partition_id` is ignored; every producer gets its own.
    pub fn new(
        event_hub: impl Into<String>,
        connector: Arc<dyn TransportConnector>,
        auth: Arc<dyn AuthProvider>,
        options: ProducerOptions,
    ) -> EventHubResult<Self> {
        options.config.validate()?;
        Ok(Self {
            event_hub: event_hub.into(),
            connector,
            auth,
            options,
            state: Mutex::new(ClientState::default()),
        })
    }

    pub fn event_hub(&self) -> &str {
        &self.event_hub
    }

    /// Sends `input` through the producer of the requested partition.
    ///
    /// A pre-built batch bound to a partition is routed there unless
    /// `options.partition_id` says otherwise.
    pub async fn send(
        &self,
        input: impl Into<SendInput>,
        mut options: SendOptions,
    ) -> EventHubResult<()> {
        let input = input.into();
        if options.partition_id.is_none() {
            if let SendInput::Batch(batch) = &input {
                options.partition_id = batch.partition_id().map(str::to_string);
            }
        }
        if options.partition_id.is_some() && options.partition_key.is_some() {
            return Err(EventHubError::validation(
                "partition_id and partition_key cannot be both set",
            ));
        }

        let producer = self.get_or_create_producer(options.partition_id.clone()).await?;
        producer.send(input, options).await
    }

    /// Creates an empty batch sized from the target partition's link.
    pub async fn create_batch(&self, options: CreateBatchOptions) -> EventHubResult<EventBatch> {
        if options.partition_id.is_some() && options.partition_key.is_some() {
            return Err(EventHubError::validation(
                "partition_id and partition_key cannot be both set",
            ));
        }
        let producer = self.get_or_create_producer(options.partition_id).await?;
        producer
            .create_batch(
                options.partition_key,
                options.max_size_in_bytes,
                options.timeout,
            )
            .await
    }

    async fn get_or_create_producer(
        &self,
        partition_id: Option<String>,
    ) -> EventHubResult<Arc<Producer>> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(EventHubError::Closed);
        }

        if let Some(producer) = state.producers.get(&partition_id) {
            return Ok(Arc::clone(producer));
        }

        log::info!(
            "Creating producer for {} (partition: {:?})",
            self.event_hub,
            partition_id
        );
        let producer = Arc::new(Producer::new(
            self.event_hub.clone(),
            Arc::clone(&self.connector),
            Arc::clone(&self.auth),
            ProducerOptions {
                partition_id: partition_id.clone(),
                ..self.options.clone()
            },
        )?);
        state.producers.insert(partition_id, Arc::clone(&producer));
        Ok(producer)
    }

    /// Number of producers created so far.
    pub async fn producer_count(&self) -> usize {
        self.state.lock().await.producers.len()
    }

    /// Closes every producer. Later calls are rejected with [`EventHubError::Closed`].
    ///
    /// All producers are closed even if some fail; the first failure is returned.
    pub async fn close(&self) -> EventHubResult<()> {
        let producers = {
            let mut state = self.state.lock().await;
            state.closed = true;
            std::mem::take(&mut state.producers)
        };

        let mut first_error = None;
        for (partition_id, producer) in producers {
            if let Err(e) = producer.close().await {
                log::error!(
                    "Failed to close producer for partition {:?}: {e}",
                    partition_id
                );
                first_error.get_or_insert(e);
            }
        }

        log::info!("Producer client for {} closed", self.event_hub);
        first_error.map_or(Ok(()), Err)
    }
}
