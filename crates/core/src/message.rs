//! Email message type handed through the gatekeeper to transports.
//!
//! [`EmailMessage`] keeps the recipient fields, subject and body as
//! structured values so they can be rewritten in place, and every other
//! header as an ordered list that is serialized back unchanged.

use chrono::Utc;
use uuid::Uuid;

use crate::{parse_raw_headers, RecipientField, Recipients};

/// Headers that are held as structured fields rather than in the
/// generic header list.
const STRUCTURED_HEADERS: [&str; 5] = ["From", "To", "Cc", "Bcc", "Subject"];

/// Represents an outbound email message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    /// Unique message identifier, taken from the `Message-ID` header
    /// when present, otherwise generated.
    pub message_id: String,

    /// Sender address, RFC 5322 address format.
    pub from: String,

    to: Recipients,
    cc: Recipients,
    bcc: Recipients,
    subject: String,

    /// Remaining headers in their original order (case-preserved keys,
    /// trimmed values).
    headers: Vec<(String, String)>,

    /// Message body after the blank-line separator.
    body: String,
}

impl EmailMessage {
    /// Builds a new message with a generated identifier and a `Date` header.
    pub fn new(
        from: impl Into<String>,
        to: impl Into<Recipients>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            from: from.into(),
            to: to.into(),
            cc: Recipients::Absent,
            bcc: Recipients::Absent,
            subject: subject.into(),
            headers: vec![("Date".to_string(), Utc::now().to_rfc2822())],
            body: body.into(),
        }
    }

    /// Parses a raw RFC 5322 message.
    ///
    /// `From`, `To`, `Cc`, `Bcc` and `Subject` are matched case-insensitively
    /// and recipient headers are read as comma separated lists. Repeated
    /// recipient headers are merged.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use mailgate_core::{EmailMessage, Recipients};
    ///
    /// let message = EmailMessage::parse(
    ///     "From: noreply@site.com\r\nTo: garrett@site.com, matt@site.com\r\nSubject: Hi\r\n\r\nBody",
    /// );
    /// assert_eq!(message.from, "noreply@site.com");
    /// assert_eq!(message.to().len(), 2);
    /// assert_eq!(message.cc(), &Recipients::Absent);
    /// assert_eq!(message.subject(), "Hi");
    /// assert_eq!(message.body(), "Body");
    /// ```
    pub fn parse(raw: &str) -> Self {
        let (parsed, content) = parse_raw_headers(raw);

        let mut from = String::new();
        let mut subject = String::new();
        let mut to = Vec::new();
        let mut cc = Vec::new();
        let mut bcc = Vec::new();
        let mut headers = Vec::with_capacity(parsed.len());

        for (key, value) in parsed {
            let target = if key.eq_ignore_ascii_case("To") {
                &mut to
            } else if key.eq_ignore_ascii_case("Cc") {
                &mut cc
            } else if key.eq_ignore_ascii_case("Bcc") {
                &mut bcc
            } else if key.eq_ignore_ascii_case("From") {
                from = value;
                continue;
            } else if key.eq_ignore_ascii_case("Subject") {
                subject = value;
                continue;
            } else {
                headers.push((key, value));
                continue;
            };
            target.extend(Recipients::parse_header(&value).iter().map(str::to_string));
        }

        let message_id = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("Message-ID"))
            .map(|(_, v)| {
                v.strip_prefix('<')
                    .and_then(|s| s.strip_suffix('>'))
                    .unwrap_or(v.as_str())
                    .to_string()
            })
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Self {
            message_id,
            from,
            to: Recipients::from_addresses(to),
            cc: Recipients::from_addresses(cc),
            bcc: Recipients::from_addresses(bcc),
            subject,
            headers,
            body: content.to_string(),
        }
    }

    /// Returns the value of a recipient field.
    pub fn recipients(&self, field: RecipientField) -> &Recipients {
        match field {
            RecipientField::To => &self.to,
            RecipientField::Cc => &self.cc,
            RecipientField::Bcc => &self.bcc,
        }
    }

    /// Replaces the value of a recipient field.
    pub fn set_recipients(&mut self, field: RecipientField, value: impl Into<Recipients>) {
        let value = value.into();
        match field {
            RecipientField::To => self.to = value,
            RecipientField::Cc => self.cc = value,
            RecipientField::Bcc => self.bcc = value,
        }
    }

    pub fn to(&self) -> &Recipients {
        &self.to
    }

    pub fn set_to(&mut self, value: impl Into<Recipients>) {
        self.to = value.into();
    }

    pub fn cc(&self) -> &Recipients {
        &self.cc
    }

    pub fn set_cc(&mut self, value: impl Into<Recipients>) {
        self.cc = value.into();
    }

    pub fn bcc(&self) -> &Recipients {
        &self.bcc
    }

    pub fn set_bcc(&mut self, value: impl Into<Recipients>) {
        self.bcc = value.into();
    }

    /// Returns the email subject, empty when none was set.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn set_subject(&mut self, subject: impl Into<String>) {
        self.subject = subject.into();
    }

    /// Returns the message body after the header section.
    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<String>) {
        self.body = body.into();
    }

    /// Returns the first non-structured header value matching `name`
    /// (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns a reference to the ordered list of non-structured headers.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Appends a header, structured header names are routed to their
    /// dedicated field instead.
    pub fn add_header(&mut self, name: &str, value: &str) {
        match STRUCTURED_HEADERS
            .iter()
            .find(|h| h.eq_ignore_ascii_case(name))
            .copied()
        {
            Some("From") => self.from = value.to_string(),
            Some("Subject") => self.subject = value.to_string(),
            Some("To") => self.to = Recipients::parse_header(value),
            Some("Cc") => self.cc = Recipients::parse_header(value),
            Some("Bcc") => self.bcc = Recipients::parse_header(value),
            _ => self.headers.push((name.to_string(), value.to_string())),
        }
    }

    /// Returns every address across `To`, `Cc` and `Bcc` without
    /// duplicates, in first-seen order.
    pub fn envelope_recipients(&self) -> Vec<&str> {
        let mut addresses: Vec<&str> = Vec::new();
        for field in RecipientField::ALL {
            for address in self.recipients(field).iter() {
                if !addresses.contains(&address) {
                    addresses.push(address);
                }
            }
        }
        addresses
    }

    /// Serializes the message (headers, blank line, body) with CRLF
    /// line endings.
    ///
    /// Generic headers come first in their original order, followed by
    /// `From`, the recipient fields that are set and `Subject`.
    pub fn to_raw(&self) -> String {
        self.serialize(true)
    }

    /// Serializes the message like [`to_raw`](Self::to_raw) but leaves the
    /// `Bcc` header out, as required when handing the data to an SMTP relay.
    pub fn to_raw_without_bcc(&self) -> String {
        self.serialize(false)
    }

    fn serialize(&self, include_bcc: bool) -> String {
        let mut raw = String::with_capacity(self.body.len() + 256);

        for (key, value) in &self.headers {
            push_header(&mut raw, key, value);
        }
        if !self.from.is_empty() {
            push_header(&mut raw, "From", &self.from);
        }
        for field in RecipientField::ALL {
            if field == RecipientField::Bcc && !include_bcc {
                continue;
            }
            if let Some(value) = self.recipients(field).to_header() {
                push_header(&mut raw, field.header_name(), &value);
            }
        }
        push_header(&mut raw, "Subject", &self.subject);

        raw.push_str("\r\n");
        raw.push_str(&self.body);
        raw
    }
}

fn push_header(raw: &mut String, key: &str, value: &str) {
    raw.push_str(key);
    raw.push_str(": ");
    raw.push_str(value);
    raw.push_str("\r\n");
}
