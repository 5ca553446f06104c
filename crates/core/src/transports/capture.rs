//! In-memory transport that captures messages instead of sending them.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::{EmailMessage, Transport, TransportFuture};

/// Transport that keeps every delivered message in memory.
///
/// This is the default delivery method, nothing leaves the process and
/// the captured messages can be inspected through [`deliveries`](Self::deliveries).
#[derive(Debug, Default)]
pub struct TestTransport {
    deliveries: Mutex<Vec<EmailMessage>>,
}

impl TestTransport {
    /// Creates a new, empty [`TestTransport`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the messages delivered so far, oldest first.
    pub fn deliveries(&self) -> Vec<EmailMessage> {
        self.lock().clone()
    }

    /// Returns the number of messages delivered so far.
    pub fn count(&self) -> usize {
        self.lock().len()
    }

    /// Drops every captured message.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<EmailMessage>> {
        self.deliveries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for TestTransport {
    fn deliver_now<'a>(&'a self, message: &'a EmailMessage) -> TransportFuture<'a> {
        Box::pin(async move {
            debug!(
                message_id = %message.message_id,
                recipients = message.envelope_recipients().len(),
                "Captured email in test transport"
            );
            self.lock().push(message.clone());
            Ok(())
        })
    }

    fn name(&self) -> &str {
        "test"
    }
}
