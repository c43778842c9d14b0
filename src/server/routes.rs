//! Route handlers.

use super::AppState;
use super::policy::{always_acknowledge, propagate};
use crate::error::BridgeError;
use crate::pairing::{PairingOutcome, PhoneNumber};
use crate::webhook::{Verification, VerifyQuery, is_business_account, verify};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// GET /
pub async fn welcome() -> Json<Value> {
    Json(json!({ "status": "success", "message": "Welcome to the API" }))
}

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "success",
        "message": "Server is healthy",
        "version": crate::VERSION,
    }))
}

/// Anything not routed.
pub async fn not_found(uri: Uri) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "status": "error", "message": format!("Route {uri} not found") })),
    )
        .into_response()
}

/// GET /webhook/whatsapp -- verification handshake.
pub async fn verify_webhook(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> Response {
    match verify(&query, state.verify_token.as_ref()) {
        Verification::Verified(challenge) => {
            tracing::info!("Webhook: verified");
            (StatusCode::OK, challenge).into_response()
        }
        Verification::Forbidden => {
            tracing::warn!("Webhook: verification rejected");
            StatusCode::FORBIDDEN.into_response()
        }
        Verification::BadRequest => StatusCode::BAD_REQUEST.into_response(),
    }
}

/// POST /webhook/whatsapp -- event delivery.
///
/// Bodies that are not JSON or not from a business account get 404; everything
/// else is acknowledged whatever happens while processing it.
pub async fn receive_webhook(State(state): State<AppState>, body: Bytes) -> Response {
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    if !is_business_account(&body) {
        tracing::debug!("Webhook: ignoring delivery for unknown object");
        return StatusCode::NOT_FOUND.into_response();
    }

    always_acknowledge(state.dispatcher.dispatch(&body)).await
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectRequest {
    phone_number: Option<Value>,
}

impl ConnectRequest {
    /// Parse the request body. An empty body counts as `{}`.
    fn from_body(body: &[u8]) -> crate::error::Result<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body).map_err(|e| BridgeError::Payload(e.to_string()))
    }

    /// `phoneNumber` as given, either a digit string or a non-negative integer.
    fn phone_number(&self) -> crate::error::Result<PhoneNumber> {
        match &self.phone_number {
            None | Some(Value::Null) => PhoneNumber::parse(""),
            Some(Value::String(raw)) => PhoneNumber::parse(raw),
            Some(Value::Number(n)) if n.is_u64() => PhoneNumber::parse(&n.to_string()),
            Some(other) => Err(BridgeError::InvalidPhoneNumber(other.to_string())),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConnectResponse {
    success: bool,
    pairing_code: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    already_registered: bool,
}

/// POST /api/whatsapp/baileys/connect
pub async fn connect(State(state): State<AppState>, body: Bytes) -> Response {
    let phone = match ConnectRequest::from_body(&body).and_then(|req| req.phone_number()) {
        Ok(phone) => phone,
        Err(e) => return propagate::<()>(Err(e), "Failed to connect to WhatsApp"),
    };

    tracing::info!("API: pairing requested for {}", phone);
    let result = state
        .connector
        .request_pairing_code(&phone)
        .await
        .map(|outcome| {
            let already_registered = matches!(outcome, PairingOutcome::AlreadyRegistered { .. });
            Json(ConnectResponse {
                success: true,
                pairing_code: outcome.code().map(str::to_string),
                already_registered,
            })
        });
    propagate(result, "Failed to connect to WhatsApp")
}

/// GET /api/whatsapp/baileys/groups
pub async fn groups(State(state): State<AppState>) -> Response {
    let result = if state.connector.is_connected().await {
        state.connector.groups().await
    } else {
        Err(BridgeError::NotConnected)
    };

    propagate(
        result.map(|groups| {
            Json(json!({
                "success": true,
                "count": groups.len(),
                "groups": groups,
            }))
        }),
        "Failed to get WhatsApp groups",
    )
}

/// GET /api/whatsapp/baileys/status
pub async fn status(State(state): State<AppState>) -> Json<Value> {
    let connected = state.connector.is_connected().await;
    Json(json!({ "success": true, "isConnected": connected }))
}

/// POST /api/whatsapp/baileys/disconnect
pub async fn disconnect(State(state): State<AppState>) -> Response {
    let result = state.connector.disconnect().await.map(|()| {
        tracing::info!("API: disconnected");
        Json(json!({ "success": true, "message": "Disconnected from WhatsApp" }))
    });
    propagate(result, "Failed to disconnect from WhatsApp")
}
