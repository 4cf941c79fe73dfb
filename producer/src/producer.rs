use crate::auth::AuthProvider;
use crate::common::{EventHubError, EventHubResult};
use crate::config::ProducerConfig;
use crate::connection::{LinkLifecycle, LinkOptions};
use crate::model::{BatchOptions, EventBatch};
use crate::outcome::OutcomeBridge;
use crate::retry::{DefaultErrorClassifier, ErrorClassifier, RetryExecutor};
use crate::session::{SendRequest, SendSession};
use crate::tracing_hook::{DiagnosticIdHook, TracingHook};
use crate::transport::TransportConnector;
use crate::wrapper::{SendInput, wrap_input};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{Instrument, info_span};
use uuid::Uuid;

/// Construction-time settings of a [`Producer`].
#[derive(Clone)]
pub struct ProducerOptions {
    /// Partition every send is routed to; `None` lets the service assign one
    pub partition_id: Option<String>,
    pub config: ProducerConfig,
    /// Defaults to [`DefaultErrorClassifier`] honoring `config.auto_reconnect()`
    pub classifier: Option<Arc<dyn ErrorClassifier>>,
    /// Applied to every outgoing record; `None` disables instrumentation
    pub tracing_hook: Option<Arc<dyn TracingHook>>,
}

impl Default for ProducerOptions {
    fn default() -> Self {
        Self {
            partition_id: None,
            config: ProducerConfig::default(),
            classifier: None,
            tracing_hook: Some(Arc::new(DiagnosticIdHook)),
        }
    }
}

impl std::fmt::Debug for ProducerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProducerOptions")
            .field("partition_id", &self.partition_id)
            .field("config", &self.config)
            .field("custom_classifier", &self.classifier.is_some())
            .field("tracing_hook", &self.tracing_hook.is_some())
            .finish()
    }
}

/// Per-call settings of [`Producer::send`].
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Key hashed by the service to pick a partition
    pub partition_key: Option<String>,
    /// Must match the producer's partition when given
    pub partition_id: Option<String>,
    /// Overall deadline for the send including retries; `None` waits as long as
    /// the retry budget allows
    pub timeout: Option<Duration>,
}

impl SendOptions {
    pub fn with_partition_key(mut self, key: impl Into<String>) -> Self {
        self.partition_key = Some(key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

struct ProducerState {
    links: LinkLifecycle,
    closed: bool,
}

/// Sends events to one event hub target over a single link.
///
/// Every public operation runs under one exclusivity lock: a `send` covers
/// wrapping, every retry and the final outcome, and `close` cannot interleave
/// with it. Share the producer behind an `Arc` to send from several tasks.
///
/// # Examples
///
/// ```no_run
/// use producer::auth::StaticTokenProvider;
/// use producer::model::EventRecord;
/// use producer::producer::{Producer, ProducerOptions, SendOptions};
/// use producer::transport::TransportConnector;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// async fn example(connector: Arc<dyn TransportConnector>) -> producer::common::EventHubResult<()> {
///     let producer = Producer::new(
///         "telemetry",
///         connector,
///         Arc::new(StaticTokenProvider::new("<sas>", "servicebus.windows.net:sastoken")),
///         ProducerOptions::default(),
///     )?;
///
///     producer
///         .send(
///             EventRecord::from_text("reading 1"),
///             SendOptions::default()
///                 .with_partition_key("sensor-7")
///                 .with_timeout(Duration::from_secs(10)),
///         )
///         .await?;
///
///     producer.close().await
/// }
/// ```
pub struct Producer {
    name: String,
    target: String,
    partition_id: Option<String>,
    config: ProducerConfig,
    bridge: OutcomeBridge,
    retry: RetryExecutor,
    tracing_hook: Option<Arc<dyn TracingHook>>,
    state: Mutex<ProducerState>,
}

impl std::fmt::Debug for Producer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Producer")
            .field("name", &self.name)
            .field("target", &self.target)
            .field("partition_id", &self.partition_id)
            .finish()
    }
}

impl Producer {
    /// Creates a producer. No link is opened until the first send.
    ///
    /// # Errors
    ///
    /// Returns [`EventHubError::Configuration`] if `options.config` is invalid.
    pub fn new(
        target: impl Into<String>,
        connector: Arc<dyn TransportConnector>,
        auth: Arc<dyn AuthProvider>,
        options: ProducerOptions,
    ) -> EventHubResult<Self> {
        options.config.validate()?;

        let mut name = format!("EHProducer-{}", Uuid::new_v4());
        let mut target = target.into();
        if let Some(partition_id) = &options.partition_id {
            name.push_str(&format!("-partition{partition_id}"));
            target = format!("{target}/Partitions/{partition_id}");
        }

        let classifier = options.classifier.unwrap_or_else(|| {
            Arc::new(DefaultErrorClassifier::new(options.config.auto_reconnect()))
        });
        let retry = RetryExecutor::new(name.clone(), options.config.retry_policy(), classifier);
        let link_options = LinkOptions::from_config(name.clone(), &options.config);
        let links = LinkLifecycle::new(target.clone(), connector, auth, link_options);

        log::debug!("Created producer {name} for {target}");
        Ok(Self {
            name,
            target,
            partition_id: options.partition_id,
            config: options.config,
            bridge: OutcomeBridge::new(),
            retry,
            tracing_hook: options.tracing_hook,
            state: Mutex::new(ProducerState {
                links,
                closed: false,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Address the link is opened against, partition-qualified when bound.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn partition_id(&self) -> Option<&str> {
        self.partition_id.as_deref()
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    /// Sends `input` as one batch and waits for the service to acknowledge it.
    ///
    /// Empty input completes without contacting the transport.
    ///
    /// # Errors
    ///
    /// - [`EventHubError::Closed`] after [`close`](Self::close)
    /// - [`EventHubError::Validation`] for conflicting routing or oversized input;
    ///   nothing is sent
    /// - [`EventHubError::Timeout`] once `options.timeout` elapses, wrapping the
    ///   last failure
    /// - [`EventHubError::Connection`] or [`EventHubError::Send`] when retries are
    ///   exhausted or the failure is fatal
    pub async fn send(
        &self,
        input: impl Into<SendInput>,
        options: SendOptions,
    ) -> EventHubResult<()> {
        let span = info_span!(
            "eventhub.send",
            producer = %self.name,
            partition = self.partition_id.as_deref().unwrap_or("-"),
        );
        self.send_locked(input.into(), options).instrument(span).await
    }

    async fn send_locked(&self, input: SendInput, options: SendOptions) -> EventHubResult<()> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(EventHubError::Closed);
        }
        self.check_routing(&input, &options)?;

        let max_size_in_bytes = self.batch_size_bound(&state.links);
        let batch = wrap_input(
            input,
            options.partition_key.as_deref(),
            self.tracing_hook.as_deref(),
            &self.bridge,
            max_size_in_bytes,
        )?;
        if batch.is_empty() {
            log::debug!("{}: nothing to send", self.name);
            return Ok(());
        }
        // A pre-built batch may declare a larger bound than the link accepts;
        // only its content has to fit.
        if batch.size_in_bytes() > max_size_in_bytes {
            return Err(EventHubError::validation(format!(
                "EventBatch content of {} bytes exceeds the link limit of {max_size_in_bytes} bytes",
                batch.size_in_bytes()
            )));
        }

        let count = batch.len();
        let mut session = SendSession::new(
            &mut state.links,
            self.config.send_timeout(),
            SendRequest::new(batch),
        );
        self.retry
            .execute(&mut session, options.timeout, |session, ctx| {
                Box::pin(session.attempt(ctx))
            })
            .await?;

        log::debug!("{}: sent {count} events to {}", self.name, self.target);
        Ok(())
    }

    fn check_routing(&self, input: &SendInput, options: &SendOptions) -> EventHubResult<()> {
        if options.partition_id.is_some() && options.partition_key.is_some() {
            return Err(EventHubError::validation(
                "partition_id and partition_key cannot be both set",
            ));
        }
        if let Some(partition_id) = options.partition_id.as_deref() {
            if self.partition_id.as_deref() != Some(partition_id) {
                return Err(EventHubError::validation(format!(
                    "partition_id {partition_id} does not match producer partition {:?}",
                    self.partition_id
                )));
            }
        }
        if let SendInput::Batch(batch) = input {
            if let Some(partition_id) = batch.partition_id() {
                if self.partition_id.as_deref() != Some(partition_id) {
                    return Err(EventHubError::validation(format!(
                        "EventBatch partition {partition_id} does not match producer partition {:?}",
                        self.partition_id
                    )));
                }
            }
        }
        Ok(())
    }

    fn batch_size_bound(&self, links: &LinkLifecycle) -> u64 {
        let configured = self.config.max_batch_size_bytes();
        links
            .max_message_size()
            .map_or(configured, |advertised| advertised.min(configured))
    }

    /// Opens the link with retries and returns an empty batch sized from it.
    ///
    /// Records added to the batch are traced as they are added, so the trace
    /// property counts toward the size limit.
    ///
    /// # Errors
    ///
    /// Returns [`EventHubError::Validation`] when `max_size_in_bytes` exceeds what
    /// the link accepts, or a partition key is given for a partition-bound
    /// producer.
    pub async fn create_batch(
        &self,
        partition_key: Option<String>,
        max_size_in_bytes: Option<u64>,
        timeout: Option<Duration>,
    ) -> EventHubResult<EventBatch> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(EventHubError::Closed);
        }
        self.open_with_retry(&mut state.links, timeout).await?;

        let bound = self.batch_size_bound(&state.links);
        if max_size_in_bytes.is_some_and(|requested| requested > bound) {
            return Err(EventHubError::validation(format!(
                "Max message size: {} is too large, acceptable max batch size is: {bound} bytes.",
                max_size_in_bytes.unwrap_or_default()
            )));
        }

        let mut batch = EventBatch::new(BatchOptions {
            max_size_in_bytes: Some(max_size_in_bytes.unwrap_or(bound)),
            partition_key,
            partition_id: self.partition_id.clone(),
        })?;
        batch.set_tracing_hook(self.tracing_hook.clone());
        Ok(batch)
    }

    async fn open_with_retry(
        &self,
        links: &mut LinkLifecycle,
        timeout: Option<Duration>,
    ) -> EventHubResult<()> {
        self.retry
            .execute(links, timeout, |links, ctx| Box::pin(links.open(ctx.deadline)))
            .await
    }

    /// Closes the link and rejects further operations.
    ///
    /// Waits for an in-flight send to finish. Calling it again is a no-op.
    pub async fn close(&self) -> EventHubResult<()> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Ok(());
        }
        state.closed = true;
        log::info!("Closing producer {}", self.name);
        state.links.close().await
    }
}
