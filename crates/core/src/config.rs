//! Gatekeeper configuration loaded from TOML.
//!
//! Every option of the `[gatekeeper]` table is optional: the whitelist
//! defaults to match-all, the delivery method to `test` with no settings,
//! and the body annotation is on unless `append_emails = false`.

use std::{fs, path::Path};

use serde::Deserialize;

use crate::Whitelist;

/// Transport specific settings, passed verbatim to the transport constructor.
pub type DeliverySettings = toml::Table;

/// Top-level configuration file for Mailgate.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gatekeeper: GatekeeperConfig,
}

/// Gatekeeper configuration, read once when the gatekeeper is built.
#[derive(Debug, Clone, Deserialize)]
pub struct GatekeeperConfig {
    /// Pattern an address must contain a match for, matches everything
    /// when not set.
    #[serde(default)]
    pub whitelist: Whitelist,

    /// Name of the transport the filtered message is handed to.
    #[serde(default = "default_delivery_method")]
    pub delivery_method: String,

    /// Settings for the selected transport.
    #[serde(default)]
    pub delivery_settings: DeliverySettings,

    /// Appends the list of removed recipients to the body.
    #[serde(default = "default_true")]
    pub append_emails: bool,

    /// Text prepended verbatim to the subject.
    #[serde(default)]
    pub subject_prefix: Option<String>,
}

impl Default for GatekeeperConfig {
    fn default() -> Self {
        Self {
            whitelist: Whitelist::default(),
            delivery_method: default_delivery_method(),
            delivery_settings: DeliverySettings::new(),
            append_emails: default_true(),
            subject_prefix: None,
        }
    }
}

impl GatekeeperConfig {
    /// Sets the whitelist, from a compiled [`regex::Regex`] or a [`Whitelist`].
    pub fn with_whitelist(mut self, whitelist: impl Into<Whitelist>) -> Self {
        self.whitelist = whitelist.into();
        self
    }

    /// Selects the transport and its settings.
    pub fn with_delivery_method(mut self, name: &str, settings: DeliverySettings) -> Self {
        self.delivery_method = name.to_string();
        self.delivery_settings = settings;
        self
    }

    pub fn with_append_emails(mut self, append_emails: bool) -> Self {
        self.append_emails = append_emails;
        self
    }

    pub fn with_subject_prefix(mut self, prefix: &str) -> Self {
        self.subject_prefix = Some(prefix.to_string());
        self
    }
}

/// Loads configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    toml::from_str(&content).map_err(ConfigError::Parse)
}

/// Errors that can occur while loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// An I/O error occurred reading the file.
    Io(std::io::Error),
    /// A parse error occurred deserializing TOML.
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Config I/O error: {e}"),
            ConfigError::Parse(e) => write!(f, "Config parse error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

fn default_delivery_method() -> String {
    "test".to_string()
}

fn default_true() -> bool {
    true
}
