//! Device pairing
//!
//! A `PairingConnector` links this service to a user's WhatsApp account as a
//! companion device by pairing code, then answers questions about that
//! account (connection state, group membership). The connector is constructed
//! once at startup and shared as `Arc<dyn PairingConnector>` by the HTTP
//! handlers and the conversation engine.

mod offline;
mod phone;

pub use offline::OfflineConnector;
pub use phone::{PhoneNumber, sender_key};

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque reference to a linked device session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionHandle(String);

impl SessionHandle {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of asking the connector to link a phone number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingOutcome {
    /// The user must enter `code` under Settings > Linked Devices.
    Code { code: String, handle: SessionHandle },
    /// Credentials on disk are already registered; no code is needed.
    AlreadyRegistered { handle: SessionHandle },
}

impl PairingOutcome {
    pub fn handle(&self) -> &SessionHandle {
        match self {
            Self::Code { handle, .. } | Self::AlreadyRegistered { handle } => handle,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Code { code, .. } => Some(code),
            Self::AlreadyRegistered { .. } => None,
        }
    }
}

/// A group the linked account participates in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfo {
    /// Group JID (`<id>@g.us`)
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub participant_count: usize,
    /// Creation time as a unix timestamp, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation: Option<i64>,
}

/// Links and queries the service's one companion device.
///
/// A connector holds a single linked account for the whole service, not one
/// per sender. Once any sender has paired, every later `request_pairing_code`
/// answers `AlreadyRegistered` and `groups` lists that account's groups,
/// whoever is asking.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PairingConnector: Send + Sync {
    /// Start linking `phone` as a companion device.
    async fn request_pairing_code(&self, phone: &PhoneNumber) -> Result<PairingOutcome>;

    /// Groups of the shared linked account. Fails with `NotConnected` before linking.
    async fn groups(&self) -> Result<Vec<GroupInfo>>;

    async fn is_connected(&self) -> bool;

    /// Log the linked device out and forget its credentials.
    async fn disconnect(&self) -> Result<()>;
}

/// Format an 8-character pairing code for display (`XXXX-XXXX`).
pub fn format_pairing_code(code: &str) -> String {
    if code.len() == 8 && code.is_ascii() {
        format!("{}-{}", &code[..4], &code[4..])
    } else {
        code.to_string()
    }
}
