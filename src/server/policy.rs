//! HTTP error policies.
//!
//! The webhook endpoint and the device API fail differently on purpose:
//! the Cloud API retries any non-2xx delivery, so webhook processing errors
//! are logged and acknowledged, while device API callers get the error.

use crate::error::{BridgeError, Result};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::any::Any;
use std::future::Future;

/// Body returned for every accepted webhook delivery.
pub const EVENT_RECEIVED: &str = "EVENT_RECEIVED";

/// Run `work`, log any failure, and acknowledge with `200 EVENT_RECEIVED`.
pub async fn always_acknowledge<F>(work: F) -> Response
where
    F: Future<Output = Result<()>>,
{
    if let Err(e) = work.await {
        tracing::warn!("Webhook: processing failed [{}]: {}", e.code(), e);
    }
    (StatusCode::OK, EVENT_RECEIVED).into_response()
}

/// Pass a successful response through, or map the error to a JSON failure body.
///
/// Caller mistakes (bad phone number, not connected) become 400 with the
/// error text as `message`. Anything else becomes 500 with `failure` as the
/// message and the error text under `error`.
pub fn propagate<T: IntoResponse>(result: Result<T>, failure: &'static str) -> Response {
    match result {
        Ok(ok) => ok.into_response(),
        Err(e) => ApiError::from_error(e, failure).into_response(),
    }
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    error: Option<String>,
}

impl ApiError {
    fn from_error(e: BridgeError, failure: &'static str) -> Self {
        if e.is_client_error() {
            tracing::debug!("API: rejected request: {}", e);
            Self {
                status: StatusCode::BAD_REQUEST,
                message: e.to_string(),
                error: None,
            }
        } else {
            tracing::error!("API: {} [{}]: {}", failure, e.code(), e);
            Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: failure.to_string(),
                error: Some(e.to_string()),
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({ "success": false, "message": self.message });
        if let Some(error) = self.error {
            body["error"] = json!(error);
        }
        (self.status, Json(body)).into_response()
    }
}

/// Response for a handler that panicked.
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!("Handler panicked: {}", detail);

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "status": "error", "message": "Something went wrong!" })),
    )
        .into_response()
}
