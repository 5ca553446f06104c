//! Recipient gatekeeper placed in front of a mail transport.
//!
//! The [`Gatekeeper`] removes every `To`, `Cc` and `Bcc` address that does
//! not match its [`Whitelist`], optionally records the removed addresses
//! in the body, prefixes the subject and only then hands the message to
//! the wrapped [`Transport`]. A message left without any `To` recipient is
//! not delivered at all.

use std::sync::Arc;

use tracing::debug;

use crate::{
    ConfigurationError, DeliveryObserver, EmailMessage, GatekeeperConfig, NoopObserver,
    RecipientField, Transport, TransportRegistry, TransportResult, Whitelist,
};

/// Label placed in front of the removed addresses appended to the body.
pub const EXTRACTED_RECIPIENTS_LABEL: &str = "Extracted Recipients: ";

/// Outcome of a single [`Gatekeeper::deliver`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Addresses removed from the message, in first-seen order.
    pub rejected: Vec<String>,

    /// Whether the message was handed to the transport.
    pub delivered: bool,
}

/// Filters message recipients against a whitelist before delivery.
pub struct Gatekeeper {
    whitelist: Whitelist,
    transport: Arc<dyn Transport>,
    append_emails: bool,
    subject_prefix: Option<String>,
    observer: Arc<dyn DeliveryObserver>,
}

impl std::fmt::Debug for Gatekeeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gatekeeper")
            .field("whitelist", &self.whitelist.as_str())
            .field("transport", &self.transport.name())
            .field("append_emails", &self.append_emails)
            .field("subject_prefix", &self.subject_prefix)
            .finish()
    }
}

impl Gatekeeper {
    /// Creates a new [`Gatekeeper`], resolving the transport from the
    /// built-in registry.
    pub fn new(config: GatekeeperConfig) -> Result<Self, ConfigurationError> {
        Self::with_registry(config, &TransportRegistry::default())
    }

    /// Creates a new [`Gatekeeper`], resolving the transport from the given
    /// registry.
    pub fn with_registry(
        config: GatekeeperConfig,
        registry: &TransportRegistry,
    ) -> Result<Self, ConfigurationError> {
        let transport = registry.build(&config.delivery_method, &config.delivery_settings)?;
        debug!(
            delivery_method = %config.delivery_method,
            whitelist = %config.whitelist,
            "Gatekeeper initialized"
        );
        Ok(Self::with_transport(config, transport))
    }

    /// Creates a new [`Gatekeeper`] around an already built transport,
    /// `delivery_method` and `delivery_settings` are ignored.
    pub fn with_transport(config: GatekeeperConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            whitelist: config.whitelist,
            transport,
            append_emails: config.append_emails,
            subject_prefix: config.subject_prefix,
            observer: Arc::new(NoopObserver),
        }
    }

    /// Replaces the observer notified about suppressed recipients.
    pub fn with_observer(mut self, observer: Arc<dyn DeliveryObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Returns the whitelist in use.
    pub fn whitelist(&self) -> &Whitelist {
        &self.whitelist
    }

    /// Returns the wrapped transport.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Filters the message recipients in place and hands the message to
    /// the transport when a `To` recipient is left.
    ///
    /// The message keeps its rewritten recipients, body and subject even
    /// when delivery is skipped or the transport fails. Transport errors
    /// are returned unchanged.
    pub async fn deliver(&self, message: &mut EmailMessage) -> TransportResult<DeliveryReport> {
        let rejected = self.filter(message);

        if self.append_emails && !rejected.is_empty() {
            let separator = annotation_separator(message.body());
            let mut body = message.body().to_string();
            body.push_str(separator);
            body.push_str(EXTRACTED_RECIPIENTS_LABEL);
            body.push_str(&rejected.join(", "));
            message.set_body(body);
        }

        if let Some(prefix) = &self.subject_prefix {
            let subject = format!("{prefix}{}", message.subject());
            message.set_subject(subject);
        }

        if !rejected.is_empty() {
            self.observer.recipients_suppressed(message, &rejected);
        }

        if message.to().is_absent() {
            self.observer.delivery_skipped(message);
            debug!(
                message_id = %message.message_id,
                "Skipping delivery, no To recipient left"
            );
            return Ok(DeliveryReport {
                rejected,
                delivered: false,
            });
        }

        debug!(
            message_id = %message.message_id,
            transport = self.transport.name(),
            rejected = rejected.len(),
            "Handing email to transport"
        );
        self.transport.deliver_now(message).await?;

        Ok(DeliveryReport {
            rejected,
            delivered: true,
        })
    }

    /// Filters each recipient field independently and returns the
    /// addresses that no longer appear in any of them.
    fn filter(&self, message: &mut EmailMessage) -> Vec<String> {
        let original: Vec<String> = message
            .envelope_recipients()
            .into_iter()
            .map(str::to_string)
            .collect();

        for field in RecipientField::ALL {
            let filtered = message.recipients(field).filter(&self.whitelist);
            message.set_recipients(field, filtered);
        }

        let surviving = message.envelope_recipients();
        original
            .into_iter()
            .filter(|address| !surviving.contains(&address.as_str()))
            .collect()
    }
}

/// Blank line separating the body from the rejected-recipient note,
/// written with the line ending the body already uses (CRLF when it has
/// none).
fn annotation_separator(body: &str) -> &'static str {
    if body.contains("\r\n") || !body.contains('\n') {
        "\r\n\r\n"
    } else {
        "\n\n"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use regex::Regex;

    use super::*;
    use crate::{Recipients, TestTransport, TransportError, TransportFuture};

    fn gatekeeper(config: GatekeeperConfig) -> (Gatekeeper, Arc<TestTransport>) {
        let transport = Arc::new(TestTransport::new());
        let gatekeeper = Gatekeeper::with_transport(config, transport.clone());
        (gatekeeper, transport)
    }

    fn site_whitelist() -> GatekeeperConfig {
        GatekeeperConfig::default().with_whitelist(Regex::new("@site.com").unwrap())
    }

    struct FailingTransport;

    impl Transport for FailingTransport {
        fn deliver_now<'a>(&'a self, _message: &'a EmailMessage) -> TransportFuture<'a> {
            Box::pin(async { Err(TransportError::Connection("refused".to_string())) })
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        suppressed: Mutex<Vec<Vec<String>>>,
        skipped: AtomicUsize,
    }

    impl DeliveryObserver for RecordingObserver {
        fn recipients_suppressed(&self, _message: &EmailMessage, rejected: &[String]) {
            self.suppressed.lock().unwrap().push(rejected.to_vec());
        }

        fn delivery_skipped(&self, _message: &EmailMessage) {
            self.skipped.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_no_whitelist_keeps_recipient() {
        let (gatekeeper, transport) = gatekeeper(GatekeeperConfig::default());
        let mut message = EmailMessage::new("noreply@site.com", "garrett@site.com", "Hi", "Body");

        let report = gatekeeper.deliver(&mut message).await.unwrap();

        assert_eq!(message.to(), &Recipients::Single("garrett@site.com".to_string()));
        assert_eq!(message.body(), "Body");
        assert!(report.rejected.is_empty());
        assert!(report.delivered);
        assert_eq!(transport.count(), 1);
    }

    #[tokio::test]
    async fn test_removes_non_whitelisted_to() {
        let (gatekeeper, transport) = gatekeeper(site_whitelist());
        let mut message = EmailMessage::new(
            "noreply@site.com",
            vec!["garrett@site.com", "matt@site.com", "non-staff@user.com"],
            "Hi",
            "Body",
        );

        let report = gatekeeper.deliver(&mut message).await.unwrap();

        assert_eq!(
            message.to(),
            &Recipients::from(vec!["garrett@site.com", "matt@site.com"])
        );
        assert_eq!(report.rejected, vec!["non-staff@user.com".to_string()]);
        assert!(message
            .body()
            .ends_with("Extracted Recipients: non-staff@user.com"));
        assert_eq!(message.body(), "Body\r\n\r\nExtracted Recipients: non-staff@user.com");
        assert_eq!(transport.deliveries()[0], message);
    }

    #[tokio::test]
    async fn test_cc_becomes_absent() {
        let (gatekeeper, _) = gatekeeper(site_whitelist());
        let mut message = EmailMessage::new(
            "noreply@site.com",
            vec!["garrett@site.com", "matt@site.com"],
            "Hi",
            "Body",
        );
        message.set_cc("george@whitehouse.gov");

        gatekeeper.deliver(&mut message).await.unwrap();

        assert_eq!(
            message.to(),
            &Recipients::from(vec!["garrett@site.com", "matt@site.com"])
        );
        assert_eq!(message.cc(), &Recipients::Absent);
    }

    #[tokio::test]
    async fn test_bcc_collapses_to_single() {
        let config = GatekeeperConfig::default()
            .with_whitelist(Regex::new("site.com|copy.com").unwrap());
        let (gatekeeper, _) = gatekeeper(config);
        let mut message = EmailMessage::new(
            "noreply@site.com",
            vec!["garrett@site.com", "matt@site.com"],
            "Hi",
            "Body",
        );
        message.set_bcc(vec!["luke@skywalker.com", "luke@copy.com"]);

        gatekeeper.deliver(&mut message).await.unwrap();

        assert_eq!(
            message.to(),
            &Recipients::from(vec!["garrett@site.com", "matt@site.com"])
        );
        assert_eq!(message.bcc(), &Recipients::Single("luke@copy.com".to_string()));
    }

    #[tokio::test]
    async fn test_subject_prefix() {
        let config = GatekeeperConfig::default().with_subject_prefix("[staging] ");
        let (gatekeeper, _) = gatekeeper(config);
        let mut message = EmailMessage::new(
            "noreply@site.com",
            "garrett@site.com",
            "Welcome to the site!",
            "Body",
        );

        gatekeeper.deliver(&mut message).await.unwrap();

        assert_eq!(message.subject(), "[staging] Welcome to the site!");
        assert_eq!(message.body(), "Body");
    }

    #[tokio::test]
    async fn test_subject_prefix_applied_when_skipped() {
        let config = site_whitelist().with_subject_prefix("[staging] ");
        let (gatekeeper, _) = gatekeeper(config);
        let mut message =
            EmailMessage::new("noreply@site.com", "someone@user.com", "Hello", "Body");

        gatekeeper.deliver(&mut message).await.unwrap();

        assert_eq!(message.subject(), "[staging] Hello");
    }

    #[tokio::test]
    async fn test_skips_delivery_without_to() {
        let (gatekeeper, transport) = gatekeeper(site_whitelist());
        let mut message = EmailMessage::new(
            "noreply@site.com",
            vec!["non-staff@user.com", "other@user.com"],
            "Hi",
            "Body",
        );
        message.set_cc("matt@site.com");

        let report = gatekeeper.deliver(&mut message).await.unwrap();

        assert!(!report.delivered);
        assert_eq!(transport.count(), 0);
        assert!(message.to().is_absent());
        assert_eq!(message.cc(), &Recipients::from("matt@site.com"));
        assert_eq!(
            message.body(),
            "Body\r\n\r\nExtracted Recipients: non-staff@user.com, other@user.com"
        );
    }

    #[tokio::test]
    async fn test_skips_delivery_when_to_was_never_set() {
        let (gatekeeper, transport) = gatekeeper(GatekeeperConfig::default());
        let mut message = EmailMessage::new("noreply@site.com", None::<&str>, "Hi", "Body");
        message.set_bcc("garrett@site.com");

        let report = gatekeeper.deliver(&mut message).await.unwrap();

        assert!(!report.delivered);
        assert!(report.rejected.is_empty());
        assert_eq!(transport.count(), 0);
    }

    #[tokio::test]
    async fn test_fields_are_filtered_independently() {
        let config = GatekeeperConfig::default()
            .with_whitelist(Regex::new("^garrett").unwrap());
        let (gatekeeper, _) = gatekeeper(config);
        let mut message = EmailMessage::new(
            "noreply@site.com",
            vec!["garrett@site.com", "matt@site.com"],
            "Hi",
            "Body",
        );
        message.set_cc(vec!["matt@site.com", "garrett@user.com"]);

        let report = gatekeeper.deliver(&mut message).await.unwrap();

        assert_eq!(message.to(), &Recipients::from("garrett@site.com"));
        assert_eq!(message.cc(), &Recipients::from("garrett@user.com"));
        assert_eq!(report.rejected, vec!["matt@site.com".to_string()]);
    }

    #[tokio::test]
    async fn test_address_surviving_in_other_field_is_not_rejected() {
        let config = GatekeeperConfig::default().with_whitelist(Regex::new("@site.com").unwrap());
        let (gatekeeper, _) = gatekeeper(config);
        let mut message = EmailMessage::new(
            "noreply@site.com",
            vec!["garrett@site.com", "non-staff@user.com"],
            "Hi",
            "Body",
        );
        message.set_cc(vec!["garrett@site.com", "non-staff@user.com"]);

        let report = gatekeeper.deliver(&mut message).await.unwrap();

        assert_eq!(report.rejected, vec!["non-staff@user.com".to_string()]);
    }

    #[tokio::test]
    async fn test_append_emails_disabled() {
        let (gatekeeper, _) = gatekeeper(site_whitelist().with_append_emails(false));
        let mut message = EmailMessage::new(
            "noreply@site.com",
            vec!["garrett@site.com", "non-staff@user.com"],
            "Hi",
            "Body",
        );

        let report = gatekeeper.deliver(&mut message).await.unwrap();

        assert_eq!(report.rejected.len(), 1);
        assert_eq!(message.body(), "Body");
    }

    #[tokio::test]
    async fn test_append_emails_keeps_lf_line_endings() {
        let (gatekeeper, _) = gatekeeper(site_whitelist());
        let mut message = EmailMessage::new(
            "noreply@site.com",
            vec!["garrett@site.com", "non-staff@user.com"],
            "Hi",
            "Line one\nLine two",
        );

        gatekeeper.deliver(&mut message).await.unwrap();

        assert_eq!(
            message.body(),
            "Line one\nLine two\n\nExtracted Recipients: non-staff@user.com"
        );
        assert!(!message.body().contains('\r'));
    }

    #[tokio::test]
    async fn test_append_emails_keeps_crlf_line_endings() {
        let (gatekeeper, _) = gatekeeper(site_whitelist());
        let mut message = EmailMessage::new(
            "noreply@site.com",
            vec!["garrett@site.com", "non-staff@user.com"],
            "Hi",
            "Line one\r\nLine two",
        );

        gatekeeper.deliver(&mut message).await.unwrap();

        assert_eq!(
            message.body(),
            "Line one\r\nLine two\r\n\r\nExtracted Recipients: non-staff@user.com"
        );
    }

    #[tokio::test]
    async fn test_match_all_rejects_nothing() {
        let (gatekeeper, transport) = gatekeeper(GatekeeperConfig::default());
        let mut message = EmailMessage::new(
            "noreply@site.com",
            vec!["garrett@site.com", "george@whitehouse.gov"],
            "Hi",
            "Body",
        );
        message.set_cc("non-staff@user.com");
        message.set_bcc(vec!["luke@skywalker.com", "luke@copy.com"]);
        let original = message.clone();

        let report = gatekeeper.deliver(&mut message).await.unwrap();

        assert!(report.rejected.is_empty());
        assert!(report.delivered);
        assert_eq!(message.to(), original.to());
        assert_eq!(message.cc(), &Recipients::Single("non-staff@user.com".to_string()));
        assert_eq!(message.bcc(), original.bcc());
        assert_eq!(message.body(), "Body");
        assert_eq!(transport.count(), 1);
    }

    #[tokio::test]
    async fn test_quoted_display_name_kept_whole() {
        let (gatekeeper, transport) = gatekeeper(site_whitelist());
        let mut message = EmailMessage::parse(
            "From: noreply@site.com\r\n\
             To: \"Doe, John\" <john@site.com>\r\n\
             Subject: Hi\r\n\r\nBody",
        );

        let report = gatekeeper.deliver(&mut message).await.unwrap();

        assert!(report.rejected.is_empty());
        assert_eq!(
            message.to(),
            &Recipients::Single("\"Doe, John\" <john@site.com>".to_string())
        );
        assert_eq!(message.body(), "Body");
        assert_eq!(transport.count(), 1);
    }

    #[tokio::test]
    async fn test_deliver_is_idempotent() {
        let (gatekeeper, transport) = gatekeeper(site_whitelist());
        let mut message = EmailMessage::new(
            "noreply@site.com",
            vec!["garrett@site.com", "non-staff@user.com"],
            "Hi",
            "Body",
        );
        message.set_bcc(vec!["luke@skywalker.com", "matt@site.com"]);

        gatekeeper.deliver(&mut message).await.unwrap();
        let (to, cc, bcc) = (message.to().clone(), message.cc().clone(), message.bcc().clone());
        let body = message.body().to_string();

        let report = gatekeeper.deliver(&mut message).await.unwrap();

        assert!(report.rejected.is_empty());
        assert_eq!(message.to(), &to);
        assert_eq!(message.cc(), &cc);
        assert_eq!(message.bcc(), &bcc);
        assert_eq!(message.body(), body);
        assert_eq!(transport.count(), 2);
    }

    #[tokio::test]
    async fn test_transport_error_propagates_after_mutation() {
        let gatekeeper = Gatekeeper::with_transport(
            site_whitelist().with_subject_prefix("[staging] "),
            Arc::new(FailingTransport),
        );
        let mut message = EmailMessage::new(
            "noreply@site.com",
            vec!["garrett@site.com", "non-staff@user.com"],
            "Hi",
            "Body",
        );

        let result = gatekeeper.deliver(&mut message).await;

        assert!(matches!(result, Err(TransportError::Connection(_))));
        assert_eq!(message.to(), &Recipients::from("garrett@site.com"));
        assert_eq!(message.subject(), "[staging] Hi");
    }

    #[tokio::test]
    async fn test_observer_notified() {
        let observer = Arc::new(RecordingObserver::default());
        let (gatekeeper, _) = gatekeeper(site_whitelist());
        let gatekeeper = gatekeeper.with_observer(observer.clone());

        let mut message = EmailMessage::new(
            "noreply@site.com",
            vec!["garrett@site.com", "non-staff@user.com"],
            "Hi",
            "Body",
        );
        gatekeeper.deliver(&mut message).await.unwrap();

        let mut message = EmailMessage::new("noreply@site.com", "other@user.com", "Hi", "Body");
        gatekeeper.deliver(&mut message).await.unwrap();

        let mut message = EmailMessage::new("noreply@site.com", "matt@site.com", "Hi", "Body");
        gatekeeper.deliver(&mut message).await.unwrap();

        assert_eq!(
            *observer.suppressed.lock().unwrap(),
            vec![
                vec!["non-staff@user.com".to_string()],
                vec!["other@user.com".to_string()]
            ]
        );
        assert_eq!(observer.skipped.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_new_with_unknown_transport() {
        let config = GatekeeperConfig::default()
            .with_delivery_method("carrier_pigeon", Default::default());
        let result = Gatekeeper::new(config);
        assert_eq!(
            result.err(),
            Some(ConfigurationError::UnknownTransport(
                "carrier_pigeon".to_string()
            ))
        );
    }

    #[test]
    fn test_new_defaults_to_test_transport() {
        let gatekeeper = Gatekeeper::new(GatekeeperConfig::default()).unwrap();
        assert_eq!(gatekeeper.transport().name(), "test");
        assert!(gatekeeper.whitelist().is_match_all());
    }

    #[tokio::test]
    async fn test_with_custom_registry() {
        let transport = Arc::new(TestTransport::new());
        let mut registry = TransportRegistry::new();
        let shared = transport.clone();
        registry.register("capture", move |_| Ok(shared.clone()));

        let config = site_whitelist().with_delivery_method("capture", Default::default());
        let gatekeeper = Gatekeeper::with_registry(config, &registry).unwrap();

        let mut message = EmailMessage::new("noreply@site.com", "matt@site.com", "Hi", "Body");
        gatekeeper.deliver(&mut message).await.unwrap();

        assert_eq!(transport.count(), 1);
    }

    #[test]
    fn test_gatekeeper_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Gatekeeper>();
    }
}
