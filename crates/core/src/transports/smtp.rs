//! SMTP transport.
//!
//! Relays the serialized message through `lettre`'s
//! `AsyncSmtpTransport` on a plain (non-TLS) connection, which is what
//! local catch-all servers such as Mailpit or the Mailsis SMTP server
//! expect.

use lettre::{
    address::Envelope, message::Mailbox, Address, AsyncSmtpTransport, AsyncTransport,
    Tokio1Executor,
};
use tracing::{debug, error, info};

use crate::{EmailMessage, Transport, TransportError, TransportFuture};

/// Transport that relays emails to an SMTP server.
pub struct SmtpTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    host: String,
    port: u16,
    sender: Option<Address>,
}

impl SmtpTransport {
    /// Creates a new [`SmtpTransport`] for the given host and port.
    ///
    /// The envelope sender is taken from each message's `From` header
    /// unless overridden with [`with_sender`](Self::with_sender).
    pub fn new(host: &str, port: u16) -> Self {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
            .port(port)
            .build();
        info!(host = %host, port = port, "SMTP transport initialized");
        Self {
            transport,
            host: host.to_string(),
            port,
            sender: None,
        }
    }

    /// Uses a fixed envelope sender for every message.
    pub fn with_sender(mut self, sender: Address) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Returns the `host:port` pair this transport connects to.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn envelope(&self, message: &EmailMessage) -> Result<Envelope, TransportError> {
        let sender = match &self.sender {
            Some(sender) => Some(sender.clone()),
            None if message.from.is_empty() => None,
            None => Some(parse_address(&message.from)?),
        };
        let recipients = message
            .envelope_recipients()
            .into_iter()
            .map(parse_address)
            .collect::<Result<Vec<_>, _>>()?;
        Envelope::new(sender, recipients)
            .map_err(|e| TransportError::Message(format!("Invalid envelope: {e}")))
    }
}

/// Parses either a bare address or a `Name <address>` mailbox.
fn parse_address(value: &str) -> Result<Address, TransportError> {
    value
        .parse::<Mailbox>()
        .map(|mailbox| mailbox.email)
        .map_err(|e| TransportError::Message(format!("Invalid address '{value}': {e}")))
}

impl Transport for SmtpTransport {
    fn deliver_now<'a>(&'a self, message: &'a EmailMessage) -> TransportFuture<'a> {
        Box::pin(async move {
            let envelope = self.envelope(message)?;
            debug!(
                message_id = %message.message_id,
                endpoint = %self.endpoint(),
                recipients = envelope.to().len(),
                "Relaying email over SMTP"
            );
            self.transport
                .send_raw(&envelope, message.to_raw_without_bcc().as_bytes())
                .await
                .map_err(|e| {
                    error!(
                        message_id = %message.message_id,
                        endpoint = %self.endpoint(),
                        error = %e,
                        "Failed to relay email over SMTP"
                    );
                    if e.is_permanent() {
                        TransportError::Rejected(e.to_string())
                    } else {
                        TransportError::Connection(e.to_string())
                    }
                })?;
            info!(
                message_id = %message.message_id,
                endpoint = %self.endpoint(),
                "Relayed email over SMTP"
            );
            Ok(())
        })
    }

    fn name(&self) -> &str {
        "smtp"
    }
}
