//! Transport capability consumed by the producer.
//!
//! The wire protocol lives behind these traits. A [`TransportConnector`] opens
//! links; a [`TransportLink`] carries one send window at a time.

use crate::auth::AuthToken;
use crate::common::EventHubResult;
use crate::connection::LinkOptions;
use crate::model::EventRecord;
use crate::outcome::OutcomeNotifier;
use async_trait::async_trait;
use std::time::Duration;

/// Opens transport links to an event hub target.
#[async_trait]
pub trait TransportConnector: Send + Sync {
    /// Opens a send link to `target`.
    ///
    /// # Errors
    ///
    /// Connection-level failures should be reported as
    /// [`EventHubError::Connection`](crate::common::EventHubError::Connection).
    async fn open(
        &self,
        target: &str,
        credential: &AuthToken,
        options: &LinkOptions,
    ) -> EventHubResult<Box<dyn TransportLink>>;
}

/// One open send link.
///
/// The producer enqueues a window of records, then waits for the link to finish
/// it. The verdict for the window is written through the [`OutcomeNotifier`]
/// passed with the records, possibly from another thread.
#[async_trait]
pub trait TransportLink: Send {
    /// Timeout applied to every message of the next window.
    fn set_message_timeout(&mut self, timeout: Option<Duration>);

    /// Queues records for delivery; nothing is sent until the window is awaited.
    fn enqueue_records(&mut self, records: Vec<EventRecord>, notifier: OutcomeNotifier);

    /// Resolves once the link has finished the current window.
    async fn await_completion(&mut self) -> EventHubResult<()>;

    /// Drains the records the link still holds unacknowledged.
    fn pending_records(&mut self) -> Vec<EventRecord>;

    /// Largest message the link accepts, if advertised.
    fn max_message_size(&self) -> Option<u64> {
        None
    }

    /// Whether the link can still carry sends.
    fn is_usable(&self) -> bool {
        true
    }

    async fn close(&mut self) -> EventHubResult<()>;
}
