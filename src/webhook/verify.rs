//! Webhook verification handshake.
//!
//! Before delivering events the Cloud API calls
//! `GET /webhook/whatsapp?hub.mode=subscribe&hub.verify_token=..&hub.challenge=..`
//! and expects the challenge back verbatim.

use crate::config::SecretString;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// Respond 200 with this body.
    Verified(String),
    /// Mode and token present but wrong: 403.
    Forbidden,
    /// Mode or token missing: 400.
    BadRequest,
}

/// Check a verification request against the configured secret.
///
/// With no secret configured every well-formed request is forbidden.
pub fn verify(query: &VerifyQuery, expected: Option<&SecretString>) -> Verification {
    let present = |v: &Option<String>| v.as_deref().filter(|s| !s.is_empty()).map(str::to_string);

    let (Some(mode), Some(token)) = (present(&query.mode), present(&query.verify_token)) else {
        return Verification::BadRequest;
    };

    let token_ok = expected.is_some_and(|secret| secret.matches(&token));
    if mode == "subscribe" && token_ok {
        Verification::Verified(query.challenge.clone().unwrap_or_default())
    } else {
        Verification::Forbidden
    }
}
