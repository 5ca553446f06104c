//! Name-keyed registry of transport constructors.
//!
//! The gatekeeper resolves its `delivery_method` here. Built-in names are
//! `test`, `file` and `smtp`; hosts can add their own transports with
//! [`TransportRegistry::register`].

use std::{collections::HashMap, fmt::Display, path::PathBuf, sync::Arc};

use lettre::Address;

use crate::{DeliverySettings, FileTransport, SmtpTransport, TestTransport, Transport};

/// Constructor building a transport out of its settings.
pub type TransportConstructor =
    Arc<dyn Fn(&DeliverySettings) -> Result<Arc<dyn Transport>, ConfigurationError> + Send + Sync>;

/// Errors raised while building a gatekeeper from its configuration.
#[derive(Debug, PartialEq, Eq)]
pub enum ConfigurationError {
    /// No transport is registered under the given name.
    UnknownTransport(String),
    /// A transport setting is missing its expected type or value.
    InvalidSettings {
        transport: String,
        key: String,
        reason: String,
    },
}

impl Display for ConfigurationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigurationError::UnknownTransport(name) => {
                write!(f, "Unknown delivery method: {name}")
            }
            ConfigurationError::InvalidSettings {
                transport,
                key,
                reason,
            } => write!(f, "Invalid setting '{key}' for {transport}: {reason}"),
        }
    }
}

impl std::error::Error for ConfigurationError {}

/// Registry mapping delivery method names to transport constructors.
#[derive(Clone)]
pub struct TransportRegistry {
    constructors: HashMap<String, TransportConstructor>,
}

impl std::fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names = self.names();
        names.sort_unstable();
        f.debug_struct("TransportRegistry")
            .field("transports", &names)
            .finish()
    }
}

impl Default for TransportRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("test", |_| Ok(Arc::new(TestTransport::new())));
        registry.register("file", build_file_transport);
        registry.register("smtp", build_smtp_transport);
        registry
    }
}

impl TransportRegistry {
    /// Creates a registry holding the built-in transports.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry without any transport.
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Registers a constructor under `name`, replacing any previous one.
    pub fn register<F>(&mut self, name: &str, constructor: F) -> &mut Self
    where
        F: Fn(&DeliverySettings) -> Result<Arc<dyn Transport>, ConfigurationError>
            + Send
            + Sync
            + 'static,
    {
        self.constructors
            .insert(name.to_string(), Arc::new(constructor));
        self
    }

    /// Returns the constructor registered under `name`.
    pub fn resolve(&self, name: &str) -> Result<TransportConstructor, ConfigurationError> {
        self.constructors
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigurationError::UnknownTransport(name.to_string()))
    }

    /// Resolves `name` and builds the transport with the given settings.
    pub fn build(
        &self,
        name: &str,
        settings: &DeliverySettings,
    ) -> Result<Arc<dyn Transport>, ConfigurationError> {
        let constructor = self.resolve(name)?;
        constructor(settings)
    }

    /// Returns whether a transport is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Returns the registered names, in no particular order.
    pub fn names(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }
}

fn build_file_transport(
    settings: &DeliverySettings,
) -> Result<Arc<dyn Transport>, ConfigurationError> {
    let path = setting_str(settings, "file", "path")?.unwrap_or("mailbox");
    Ok(Arc::new(FileTransport::new(PathBuf::from(path))))
}

fn build_smtp_transport(
    settings: &DeliverySettings,
) -> Result<Arc<dyn Transport>, ConfigurationError> {
    let host = setting_str(settings, "smtp", "host")?.unwrap_or("127.0.0.1");
    let port = setting_port(settings, "smtp", "port")?.unwrap_or(25);
    let mut transport = SmtpTransport::new(host, port);
    if let Some(sender) = setting_str(settings, "smtp", "from")? {
        let sender = sender
            .parse::<Address>()
            .map_err(|e| invalid_setting("smtp", "from", e))?;
        transport = transport.with_sender(sender);
    }
    Ok(Arc::new(transport))
}

/// Reads an optional string setting.
pub fn setting_str<'a>(
    settings: &'a DeliverySettings,
    transport: &str,
    key: &str,
) -> Result<Option<&'a str>, ConfigurationError> {
    match settings.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_str()
            .map(Some)
            .ok_or_else(|| invalid_setting(transport, key, "expected a string")),
    }
}

/// Reads an optional TCP port setting.
pub fn setting_port(
    settings: &DeliverySettings,
    transport: &str,
    key: &str,
) -> Result<Option<u16>, ConfigurationError> {
    match settings.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_integer()
            .and_then(|port| u16::try_from(port).ok())
            .map(Some)
            .ok_or_else(|| invalid_setting(transport, key, "expected a port number")),
    }
}

fn invalid_setting(transport: &str, key: &str, reason: impl Display) -> ConfigurationError {
    ConfigurationError::InvalidSettings {
        transport: transport.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
