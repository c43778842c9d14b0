//! Inbound Cloud API webhook payload.
//!
//! Only the first message of the first change of the first entry is acted on:
//! `entry[0].changes[0].value.messages[0]`.

use crate::error::{BridgeError, Result};
use serde::Deserialize;
use serde_json::Value;

/// `object` discriminator sent by the Cloud API for WhatsApp events.
pub const BUSINESS_ACCOUNT_OBJECT: &str = "whatsapp_business_account";

#[derive(Debug, Deserialize)]
struct Metadata {
    phone_number_id: String,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    from: String,
    text: Option<RawText>,
}

#[derive(Debug, Deserialize)]
struct RawText {
    #[serde(default)]
    body: String,
}

/// A user message extracted from a webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Business number that received the message; replies are sent from it.
    pub phone_number_id: String,
    /// Sender as delivered (digits, possibly with an `@` suffix).
    pub from: String,
    /// Text body, empty for non-text messages.
    pub text: String,
}

/// Whether the body's `object` field identifies a WhatsApp business account event.
pub fn is_business_account(body: &Value) -> bool {
    body.get("object").and_then(Value::as_str) == Some(BUSINESS_ACCOUNT_OBJECT)
}

/// Extract the first message, if the delivery carries one.
///
/// Only `entry[0].changes[0].value` is read; other entries, changes and
/// messages are ignored whatever their shape. Status-only deliveries yield
/// `Ok(None)`. A first message that is malformed or lacks the metadata needed
/// to reply is an error.
pub fn first_message(body: &Value) -> Result<Option<InboundMessage>> {
    let Some(value) = body.pointer("/entry/0/changes/0/value") else {
        return Ok(None);
    };
    let Some(raw) = value.pointer("/messages/0") else {
        return Ok(None);
    };

    let message = RawMessage::deserialize(raw).map_err(|e| BridgeError::Payload(e.to_string()))?;

    let metadata = value
        .get("metadata")
        .ok_or_else(|| BridgeError::Payload("message without metadata.phone_number_id".into()))
        .and_then(|m| Metadata::deserialize(m).map_err(|e| BridgeError::Payload(e.to_string())))?;

    Ok(Some(InboundMessage {
        phone_number_id: metadata.phone_number_id,
        from: message.from,
        text: message.text.map(|t| t.body).unwrap_or_default(),
    }))
}
