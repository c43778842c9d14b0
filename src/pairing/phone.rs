//! Phone number validation and sender normalisation.

use crate::error::{BridgeError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

// ASCII only: `\d` would also accept Arabic-Indic and other Unicode digits.
static DIGITS_ONLY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]+$").expect("static regex"));

/// A phone number in international format with no `+`, spaces, `()` or `-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Validate user input. Empty input is reported separately from malformed input.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(BridgeError::MissingPhoneNumber);
        }
        if !DIGITS_ONLY.is_match(raw) {
            return Err(BridgeError::InvalidPhoneNumber(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The user JID for this number.
    pub fn jid(&self) -> String {
        format!("{}@s.whatsapp.net", self.0)
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PhoneNumber {
    type Error = BridgeError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<PhoneNumber> for String {
    fn from(value: PhoneNumber) -> Self {
        value.0
    }
}

/// Session key for an inbound sender.
///
/// Senders may arrive as bare digits, `972501234567@c.us`, or with a
/// linked-device suffix (`972501234567:34@s.whatsapp.net`); all map to the digits.
pub fn sender_key(from: &str) -> &str {
    let without_server = from.split('@').next().unwrap_or(from);
    without_server
        .split(':')
        .next()
        .unwrap_or(without_server)
}
