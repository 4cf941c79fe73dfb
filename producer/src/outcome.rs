//! Delivery outcome hand-off between the transport and the waiting sender.
//!
//! The transport reports a send window's verdict from its own execution context.
//! [`OutcomeBridge`] is the single slot that verdict lands in; the send session
//! arms it before every attempt and reads it once the link signals completion.

use crate::common::ErrorCondition;
use std::sync::{Arc, Mutex, MutexGuard};

/// Verdict of a send window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    Ok,
    Timeout,
    Error,
}

/// Status plus the optional condition describing a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub status: OutcomeStatus,
    pub condition: Option<ErrorCondition>,
}

impl DeliveryOutcome {
    pub fn ok() -> Self {
        Self {
            status: OutcomeStatus::Ok,
            condition: None,
        }
    }

    pub fn timeout() -> Self {
        Self {
            status: OutcomeStatus::Timeout,
            condition: None,
        }
    }

    pub fn error(condition: ErrorCondition) -> Self {
        Self {
            status: OutcomeStatus::Error,
            condition: Some(condition),
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    epoch: u64,
    outcome: Option<DeliveryOutcome>,
}

/// Single-slot outcome store shared between a producer and its transport.
///
/// Not a queue: only the verdict of the current attempt is kept. Each call to
/// [`arm`](OutcomeBridge::arm) clears the slot and invalidates notifiers handed
/// out for earlier attempts, so a late notification can never be misread.
#[derive(Debug, Clone, Default)]
pub struct OutcomeBridge {
    slot: Arc<Mutex<Slot>>,
}

impl OutcomeBridge {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        // A writer cannot leave the slot half-updated, so a poisoned lock is still usable.
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Clears the slot and returns the notifier for the next attempt.
    pub fn arm(&self) -> OutcomeNotifier {
        let mut slot = self.lock();
        slot.epoch += 1;
        slot.outcome = None;
        OutcomeNotifier {
            slot: Arc::clone(&self.slot),
            epoch: slot.epoch,
        }
    }

    /// Reads and clears the outcome of the current attempt.
    pub fn take(&self) -> Option<DeliveryOutcome> {
        self.lock().outcome.take()
    }
}

/// Write handle given to the transport for one attempt.
///
/// Cheap to clone and safe to call from any thread.
#[derive(Debug, Clone)]
pub struct OutcomeNotifier {
    slot: Arc<Mutex<Slot>>,
    epoch: u64,
}

impl OutcomeNotifier {
    /// Records the outcome of the attempt this notifier was armed for.
    ///
    /// Returns `false` when the notification was dropped: the bridge has been
    /// re-armed since, or this attempt already received its outcome.
    pub fn notify(&self, outcome: DeliveryOutcome) -> bool {
        let mut slot = self
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.epoch != self.epoch {
            log::debug!("Dropping stale delivery outcome {:?}", outcome.status);
            return false;
        }
        if slot.outcome.is_some() {
            return false;
        }
        slot.outcome = Some(outcome);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::conditions;

    #[test]
    fn test_notify_then_take_once() {
        let bridge = OutcomeBridge::new();
        let notifier = bridge.arm();

        assert!(notifier.notify(DeliveryOutcome::ok()));
        assert_eq!(bridge.take(), Some(DeliveryOutcome::ok()));
        assert_eq!(bridge.take(), None);
    }

    #[test]
    fn test_second_notification_is_ignored() {
        let bridge = OutcomeBridge::new();
        let notifier = bridge.arm();

        assert!(notifier.notify(DeliveryOutcome::timeout()));
        assert!(!notifier.notify(DeliveryOutcome::ok()));
        assert_eq!(bridge.take(), Some(DeliveryOutcome::timeout()));
    }

    #[test]
    fn test_rearm_discards_stale_outcome() {
        let bridge = OutcomeBridge::new();
        let first = bridge.arm();
        first.notify(DeliveryOutcome::error(ErrorCondition::new(conditions::SERVER_BUSY)));

        let second = bridge.arm();
        assert_eq!(bridge.take(), None);

        assert!(!first.notify(DeliveryOutcome::timeout()));
        assert!(second.notify(DeliveryOutcome::ok()));
        assert_eq!(bridge.take(), Some(DeliveryOutcome::ok()));
    }

    #[test]
    fn test_notify_from_another_thread_is_visible() {
        let bridge = OutcomeBridge::new();
        let notifier = bridge.arm();

        std::thread::spawn(move || notifier.notify(DeliveryOutcome::ok()))
            .join()
            .unwrap();

        assert_eq!(bridge.take(), Some(DeliveryOutcome::ok()));
    }
}
