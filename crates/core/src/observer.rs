//! Observability hooks for the gatekeeper.
//!
//! The gatekeeper reports suppressed recipients to a [`DeliveryObserver`].
//! Nothing is reported unless an observer is injected; [`TracingObserver`]
//! turns the events into structured log lines.

use tracing::info;

use crate::EmailMessage;

/// Receives best-effort notifications about gatekeeper decisions.
///
/// Implementations must not fail, a missing or broken sink never
/// changes the outcome of a delivery.
pub trait DeliveryObserver: Send + Sync {
    /// Called when one or more recipients were removed from a message.
    fn recipients_suppressed(&self, message: &EmailMessage, rejected: &[String]);

    /// Called when a message was left without a `To` recipient and
    /// therefore not handed to the transport.
    fn delivery_skipped(&self, _message: &EmailMessage) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl DeliveryObserver for NoopObserver {
    fn recipients_suppressed(&self, _message: &EmailMessage, _rejected: &[String]) {}
}

/// Observer that emits `tracing` events at `INFO` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl DeliveryObserver for TracingObserver {
    fn recipients_suppressed(&self, message: &EmailMessage, rejected: &[String]) {
        info!(
            message_id = %message.message_id,
            suppressed = %rejected.join(", "),
            "Suppressed delivery to non-whitelisted recipients"
        );
    }

    fn delivery_skipped(&self, message: &EmailMessage) {
        info!(
            message_id = %message.message_id,
            "No whitelisted To recipient left, delivery skipped"
        );
    }
}
