//! Recipient field values for `To`, `Cc` and `Bcc`.
//!
//! A field either holds nothing, a single address or several addresses.
//! [`Recipients::from_addresses`] is the only way to build a value out of
//! a list, so a one-element result always collapses to
//! [`Recipients::Single`] and an empty one to [`Recipients::Absent`].

use std::fmt::Display;

use crate::Whitelist;

/// The three recipient fields of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecipientField {
    To,
    Cc,
    Bcc,
}

impl RecipientField {
    /// All recipient fields, in header order.
    pub const ALL: [RecipientField; 3] = [RecipientField::To, RecipientField::Cc, RecipientField::Bcc];

    /// Returns the header name used for this field.
    pub fn header_name(&self) -> &'static str {
        match self {
            RecipientField::To => "To",
            RecipientField::Cc => "Cc",
            RecipientField::Bcc => "Bcc",
        }
    }
}

impl Display for RecipientField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.header_name())
    }
}

/// Value of a recipient field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Recipients {
    /// The field is not set.
    #[default]
    Absent,
    /// Exactly one address.
    Single(String),
    /// Two or more addresses, in their original order.
    Many(Vec<String>),
}

impl Recipients {
    /// Builds a field value from a list of addresses, collapsing a
    /// one-element list into [`Recipients::Single`] and an empty list
    /// into [`Recipients::Absent`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// use mailgate_core::Recipients;
    ///
    /// assert_eq!(Recipients::from_addresses(Vec::<String>::new()), Recipients::Absent);
    /// assert_eq!(
    ///     Recipients::from_addresses(["a@site.com"]),
    ///     Recipients::Single("a@site.com".to_string())
    /// );
    /// assert!(matches!(
    ///     Recipients::from_addresses(["a@site.com", "b@site.com"]),
    ///     Recipients::Many(_)
    /// ));
    /// ```
    pub fn from_addresses<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut addresses: Vec<String> = addresses.into_iter().map(Into::into).collect();
        match addresses.len() {
            0 => Recipients::Absent,
            1 => Recipients::Single(addresses.remove(0)),
            _ => Recipients::Many(addresses),
        }
    }

    /// Parses a comma separated header value (e.g. `a@x.com, b@y.com`).
    ///
    /// Commas inside a quoted display name or inside `<...>` do not
    /// separate entries. Blank entries are skipped, so an empty header
    /// yields [`Recipients::Absent`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// use mailgate_core::Recipients;
    ///
    /// let recipients = Recipients::parse_header("garrett@site.com, matt@site.com");
    /// assert_eq!(recipients.len(), 2);
    /// assert_eq!(
    ///     Recipients::parse_header("\"Doe, John\" <john@site.com>"),
    ///     Recipients::Single("\"Doe, John\" <john@site.com>".to_string())
    /// );
    /// assert_eq!(Recipients::parse_header("  "), Recipients::Absent);
    /// ```
    pub fn parse_header(value: &str) -> Self {
        Self::from_addresses(
            split_address_list(value)
                .into_iter()
                .map(str::trim)
                .filter(|address| !address.is_empty()),
        )
    }

    /// Returns whether the field holds no address.
    pub fn is_absent(&self) -> bool {
        matches!(self, Recipients::Absent)
    }

    /// Returns the number of addresses in the field.
    pub fn len(&self) -> usize {
        match self {
            Recipients::Absent => 0,
            Recipients::Single(_) => 1,
            Recipients::Many(addresses) => addresses.len(),
        }
    }

    /// Returns whether the field holds no address, same as [`is_absent`](Self::is_absent).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over the addresses of the field in order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let addresses: &[String] = match self {
            Recipients::Absent => &[],
            Recipients::Single(address) => std::slice::from_ref(address),
            Recipients::Many(addresses) => addresses,
        };
        addresses.iter().map(String::as_str)
    }

    /// Returns a new field value keeping only the addresses accepted by
    /// the whitelist.
    pub fn filter(&self, whitelist: &Whitelist) -> Self {
        if self.is_absent() {
            return Recipients::Absent;
        }
        Self::from_addresses(self.iter().filter(|address| whitelist.allows(address)))
    }

    /// Serializes the field as a header value, `None` when absent.
    pub fn to_header(&self) -> Option<String> {
        match self {
            Recipients::Absent => None,
            Recipients::Single(address) => Some(address.clone()),
            Recipients::Many(addresses) => Some(addresses.join(", ")),
        }
    }
}

/// Splits an address list on the commas that sit outside quoted strings
/// and angle brackets, backslash escapes inside quotes are honoured.
fn split_address_list(value: &str) -> Vec<&str> {
    let mut entries = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let mut escaped = false;
    let mut angle = 0usize;

    for (index, c) in value.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            '<' if !quoted => angle += 1,
            '>' if !quoted => angle = angle.saturating_sub(1),
            ',' if !quoted && angle == 0 => {
                entries.push(&value[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    entries.push(&value[start..]);
    entries
}

impl From<&str> for Recipients {
    fn from(address: &str) -> Self {
        Recipients::Single(address.to_string())
    }
}

impl From<String> for Recipients {
    fn from(address: String) -> Self {
        Recipients::Single(address)
    }
}

impl From<Vec<String>> for Recipients {
    fn from(addresses: Vec<String>) -> Self {
        Self::from_addresses(addresses)
    }
}

impl From<Vec<&str>> for Recipients {
    fn from(addresses: Vec<&str>) -> Self {
        Self::from_addresses(addresses)
    }
}

impl<T: Into<Recipients>> From<Option<T>> for Recipients {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}
