//! Allow-list pattern for recipient addresses.

use std::{fmt::Display, str::FromStr};

use regex::Regex;
use serde::{de, Deserialize, Deserializer};

/// Pattern that matches every address.
const MATCH_ALL: &str = "";

/// Errors that can occur while building a [`Whitelist`].
#[derive(Debug)]
pub enum WhitelistError {
    /// The pattern is not a valid regular expression.
    InvalidPattern(regex::Error),
}

impl Display for WhitelistError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WhitelistError::InvalidPattern(e) => write!(f, "Invalid whitelist pattern: {e}"),
        }
    }
}

impl std::error::Error for WhitelistError {}

impl From<regex::Error> for WhitelistError {
    fn from(e: regex::Error) -> Self {
        WhitelistError::InvalidPattern(e)
    }
}

/// Regular expression an address must contain a match for in order to
/// remain a recipient.
///
/// Matching is unanchored: `@site.com` accepts `garrett@site.com` and
/// also `garrett@site.com.evil.org`. Anchor the pattern explicitly
/// (`@site\.com$`) when the whole domain must match.
///
/// # Examples
///
/// ```rust
/// use mailgate_core::Whitelist;
///
/// let whitelist: Whitelist = "@site.com".parse().unwrap();
/// assert!(whitelist.allows("garrett@site.com"));
/// assert!(!whitelist.allows("non-staff@user.com"));
/// assert!(Whitelist::default().allows("anyone@anywhere.org"));
/// ```
#[derive(Debug, Clone)]
pub struct Whitelist {
    pattern: Regex,
}

impl Whitelist {
    /// Compiles a new [`Whitelist`] from a raw pattern string.
    pub fn new(pattern: &str) -> Result<Self, WhitelistError> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }

    /// Returns whether the address contains a match for the pattern.
    pub fn allows(&self, address: &str) -> bool {
        self.pattern.is_match(address)
    }

    /// Returns whether this whitelist lets every address through.
    pub fn is_match_all(&self) -> bool {
        self.pattern.as_str() == MATCH_ALL
    }

    /// Returns the source of the underlying pattern.
    pub fn as_str(&self) -> &str {
        self.pattern.as_str()
    }
}

impl Default for Whitelist {
    fn default() -> Self {
        Self {
            pattern: Regex::new(MATCH_ALL).expect("empty pattern is always valid"),
        }
    }
}

impl From<Regex> for Whitelist {
    fn from(pattern: Regex) -> Self {
        Self { pattern }
    }
}

impl FromStr for Whitelist {
    type Err = WhitelistError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Display for Whitelist {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.pattern.as_str())
    }
}

impl<'de> Deserialize<'de> for Whitelist {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let pattern = String::deserialize(deserializer)?;
        Self::new(&pattern).map_err(de::Error::custom)
    }
}
