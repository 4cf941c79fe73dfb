//! One send attempt over the producer's link.
//!
//! ```text
//! attempt(ctx)
//!   ├─ nothing unsent ────────────────→ done
//!   ├─ open link (bounded by ctx.deadline)
//!   ├─ remaining == 0 ────────────────→ timeout(last error)
//!   ├─ link.set_message_timeout(remaining)
//!   ├─ link.enqueue_records(unsent, bridge.arm())
//!   ├─ await completion (bounded by remaining)
//!   ├─ unsent = link.pending_records()
//!   └─ bridge.take()
//!        ├─ Ok      → done
//!        ├─ Timeout → retryable timeout
//!        └─ Error   → condition mapped onto the error taxonomy
//! ```

use crate::common::{ErrorCondition, EventHubError, EventHubResult};
use crate::connection::LinkLifecycle;
use crate::model::{EventBatch, EventRecord};
use crate::outcome::{DeliveryOutcome, OutcomeBridge, OutcomeStatus};
use crate::retry::AttemptContext;
use std::time::Duration;
use tokio::time::Instant;

/// A batch in flight plus the records still owed to the service.
#[derive(Debug)]
pub struct SendRequest {
    pub batch: EventBatch,
    /// Deadline of the whole send, refreshed from every attempt context
    pub deadline: Option<Instant>,
    /// Records to enqueue on the next attempt
    pub unsent: Vec<EventRecord>,
}

impl SendRequest {
    pub fn new(mut batch: EventBatch) -> Self {
        let unsent = batch.take_records();
        Self {
            batch,
            deadline: None,
            unsent,
        }
    }
}

/// Drives a [`SendRequest`] across attempts. Lives for one `send` call.
///
/// Outcomes are read from the bridge registered on the request's batch.
pub(crate) struct SendSession<'a> {
    links: &'a mut LinkLifecycle,
    bridge: OutcomeBridge,
    /// Message timeout used when the send has no deadline
    default_message_timeout: Option<Duration>,
    request: SendRequest,
}

impl<'a> SendSession<'a> {
    pub(crate) fn new(
        links: &'a mut LinkLifecycle,
        default_message_timeout: Option<Duration>,
        request: SendRequest,
    ) -> Self {
        let bridge = request.batch.on_send_complete().cloned().unwrap_or_default();
        Self {
            links,
            bridge,
            default_message_timeout,
            request,
        }
    }

    #[cfg(test)]
    pub(crate) fn unsent(&self) -> &[EventRecord] {
        &self.request.unsent
    }

    pub(crate) async fn attempt(&mut self, ctx: AttemptContext) -> EventHubResult<()> {
        self.request.deadline = ctx.deadline;
        if self.request.unsent.is_empty() {
            log::debug!(
                "No records outstanding for {} after attempt {}",
                self.links.target(),
                ctx.attempt
            );
            return Ok(());
        }
        self.links.open(ctx.deadline).await?;

        let remaining = ctx.remaining();
        if remaining.is_some_and(|remaining| remaining.is_zero()) {
            return Err(EventHubError::timeout_after(ctx.last_error));
        }
        let window = remaining.or(self.default_message_timeout);

        let notifier = self.bridge.arm();
        let records = std::mem::take(&mut self.request.unsent);
        let count = records.len();

        let Some(link) = self.links.link_mut() else {
            self.request.unsent = records;
            return Err(EventHubError::connection("link is not open"));
        };
        link.set_message_timeout(window);
        link.enqueue_records(records, notifier);
        log::debug!(
            "Enqueued {count} records to {} (attempt {}, window {window:?})",
            self.links.target(),
            ctx.attempt
        );

        let link = self
            .links
            .link_mut()
            .ok_or_else(|| EventHubError::connection("link is not open"))?;
        let completion = match window {
            Some(window) => tokio::time::timeout(window, link.await_completion())
                .await
                .unwrap_or_else(|elapsed| Err(elapsed.into())),
            None => link.await_completion().await,
        };
        let pending = link.pending_records();

        let result = completion.and_then(|()| self.read_outcome(!pending.is_empty()));
        match result {
            Ok(()) => {
                self.request.unsent.clear();
                Ok(())
            }
            Err(error) => {
                self.request.unsent = pending;
                if error.is_connection_level() {
                    self.links.reset().await;
                }
                Err(error)
            }
        }
    }

    fn read_outcome(&self, records_pending: bool) -> EventHubResult<()> {
        match self.bridge.take() {
            Some(DeliveryOutcome {
                status: OutcomeStatus::Ok,
                ..
            }) => Ok(()),
            Some(DeliveryOutcome {
                status: OutcomeStatus::Timeout,
                ..
            }) => Err(EventHubError::timeout("send window timed out")),
            Some(DeliveryOutcome {
                status: OutcomeStatus::Error,
                condition,
            }) => Err(EventHubError::from_condition(condition.unwrap_or_else(|| {
                ErrorCondition::with_description(
                    "amqp:internal-error",
                    "send failed without a condition",
                )
            }))),
            None if records_pending => Err(EventHubError::timeout(
                "link completed without an outcome while records are pending",
            )),
            None => Ok(()),
        }
    }
}
