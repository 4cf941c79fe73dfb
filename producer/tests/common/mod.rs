//! Scripted in-memory transport shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use producer::auth::{AuthToken, StaticTokenProvider};
use producer::common::{ErrorCondition, EventHubError, EventHubResult};
use producer::connection::LinkOptions;
use producer::model::EventRecord;
use producer::outcome::{DeliveryOutcome, OutcomeNotifier};
use producer::producer::{Producer, ProducerOptions};
use producer::transport::{TransportConnector, TransportLink};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Every interaction with the fake, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Open(String),
    SetTimeout(Option<Duration>),
    Enqueue(Vec<String>),
    AwaitStart,
    AwaitEnd,
    Close,
}

/// How the link finishes one send window.
#[derive(Debug, Clone)]
pub struct Window {
    pub delay: Duration,
    pub outcome: Option<DeliveryOutcome>,
    /// Trailing records left unacknowledged
    pub keep_pending: usize,
    pub completion_error: Option<EventHubError>,
}

impl Window {
    pub fn ok() -> Self {
        Self {
            delay: Duration::ZERO,
            outcome: Some(DeliveryOutcome::ok()),
            keep_pending: 0,
            completion_error: None,
        }
    }

    pub fn timeout_keeping(pending: usize) -> Self {
        Self {
            outcome: Some(DeliveryOutcome::timeout()),
            keep_pending: pending,
            ..Self::ok()
        }
    }

    pub fn error(condition: &str) -> Self {
        Self {
            outcome: Some(DeliveryOutcome::error(ErrorCondition::new(condition))),
            ..Self::ok()
        }
    }

    pub fn failing(error: EventHubError) -> Self {
        Self {
            outcome: None,
            completion_error: Some(error),
            ..Self::ok()
        }
    }

    /// Leaves every queued record pending, as a link lost mid-window does.
    pub fn unacknowledged(mut self) -> Self {
        self.keep_pending = usize::MAX;
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Default)]
struct Shared {
    calls: Mutex<Vec<Call>>,
    windows: Mutex<VecDeque<Window>>,
    open_failures: Mutex<VecDeque<EventHubError>>,
    max_message_size: Option<u64>,
}

impl Shared {
    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

/// Connector whose links follow a script of [`Window`]s; unscripted windows succeed.
#[derive(Default)]
pub struct FakeTransport {
    shared: Arc<Shared>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_max_message_size(max: u64) -> Arc<Self> {
        Arc::new(Self {
            shared: Arc::new(Shared {
                max_message_size: Some(max),
                ..Shared::default()
            }),
        })
    }

    pub fn script(&self, windows: impl IntoIterator<Item = Window>) {
        self.shared.windows.lock().unwrap().extend(windows);
    }

    pub fn fail_opens(&self, errors: impl IntoIterator<Item = EventHubError>) {
        self.shared.open_failures.lock().unwrap().extend(errors);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.shared.calls.lock().unwrap().clone()
    }

    pub fn enqueues(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Enqueue(bodies) => Some(bodies),
                _ => None,
            })
            .collect()
    }

    pub fn opens(&self) -> usize {
        self.count(|call| matches!(call, Call::Open(_)))
    }

    pub fn closes(&self) -> usize {
        self.count(|call| matches!(call, Call::Close))
    }

    fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|call| predicate(call)).count()
    }
}

#[async_trait]
impl TransportConnector for FakeTransport {
    async fn open(
        &self,
        target: &str,
        _credential: &AuthToken,
        _options: &LinkOptions,
    ) -> EventHubResult<Box<dyn TransportLink>> {
        self.shared.record(Call::Open(target.to_string()));
        if let Some(error) = self.shared.open_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        Ok(Box::new(FakeLink {
            shared: Arc::clone(&self.shared),
            queued: Vec::new(),
            notifier: None,
        }))
    }
}

struct FakeLink {
    shared: Arc<Shared>,
    queued: Vec<EventRecord>,
    notifier: Option<OutcomeNotifier>,
}

#[async_trait]
impl TransportLink for FakeLink {
    fn set_message_timeout(&mut self, timeout: Option<Duration>) {
        self.shared.record(Call::SetTimeout(timeout));
    }

    fn enqueue_records(&mut self, records: Vec<EventRecord>, notifier: OutcomeNotifier) {
        self.shared.record(Call::Enqueue(records.iter().map(body_text).collect()));
        self.queued.extend(records);
        self.notifier = Some(notifier);
    }

    async fn await_completion(&mut self) -> EventHubResult<()> {
        self.shared.record(Call::AwaitStart);
        let window = self
            .shared
            .windows
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(Window::ok);
        if !window.delay.is_zero() {
            tokio::time::sleep(window.delay).await;
        }
        self.shared.record(Call::AwaitEnd);

        if let Some(error) = window.completion_error {
            return Err(error);
        }
        let acknowledged = self.queued.len().saturating_sub(window.keep_pending);
        self.queued.drain(..acknowledged);
        if let (Some(outcome), Some(notifier)) = (window.outcome, self.notifier.take()) {
            notifier.notify(outcome);
        }
        Ok(())
    }

    fn pending_records(&mut self) -> Vec<EventRecord> {
        std::mem::take(&mut self.queued)
    }

    fn max_message_size(&self) -> Option<u64> {
        self.shared.max_message_size
    }

    async fn close(&mut self) -> EventHubResult<()> {
        self.shared.record(Call::Close);
        Ok(())
    }
}

pub fn body_text(record: &EventRecord) -> String {
    String::from_utf8_lossy(record.body()).into_owned()
}

pub fn records(count: usize) -> Vec<EventRecord> {
    (0..count)
        .map(|i| EventRecord::from_text(&format!("event-{i}")))
        .collect()
}

pub fn producer(transport: &Arc<FakeTransport>, options: ProducerOptions) -> Producer {
    Producer::new(
        "telemetry",
        Arc::clone(transport) as Arc<dyn TransportConnector>,
        Arc::new(StaticTokenProvider::new("sas", "servicebus.windows.net:sastoken")),
        options,
    )
    .expect("valid producer options")
}
