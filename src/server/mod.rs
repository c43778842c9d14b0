//! HTTP server powered by axum.
//!
//! Serves:
//! - `GET  /` - welcome
//! - `GET  /health` - health check
//! - `GET  /webhook/whatsapp` - Cloud API verification handshake
//! - `POST /webhook/whatsapp` - Cloud API event delivery
//! - `POST /api/whatsapp/baileys/connect` - request a pairing code
//! - `GET  /api/whatsapp/baileys/groups` - groups of the linked account
//! - `GET  /api/whatsapp/baileys/status` - connection status
//! - `POST /api/whatsapp/baileys/disconnect` - unlink the device
//!
//! The device routes are also served under `/api/whatsapp/device`.

pub mod policy;
mod routes;

use crate::config::{SecretString, ServerConfig};
use crate::pairing::PairingConnector;
use crate::webhook::WebhookDispatcher;
use axum::{
    Router,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub verify_token: Option<SecretString>,
    pub dispatcher: Arc<WebhookDispatcher>,
    pub connector: Arc<dyn PairingConnector>,
}

/// Build the axum router.
pub fn build_router(state: AppState, allowed_origins: &[String]) -> Router {
    let cors = if allowed_origins.is_empty() {
        CorsLayer::new()
    } else {
        let origins: Vec<_> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    };

    let device = Router::new()
        .route("/connect", post(routes::connect))
        .route("/groups", get(routes::groups))
        .route("/status", get(routes::status))
        .route("/disconnect", post(routes::disconnect));

    Router::new()
        .route("/", get(routes::welcome))
        .route("/health", get(routes::health))
        .route(
            "/webhook/whatsapp",
            get(routes::verify_webhook).post(routes::receive_webhook),
        )
        .nest("/api/whatsapp/baileys", device.clone())
        .nest("/api/whatsapp/device", device)
        .fallback(routes::not_found)
        .layer(CatchPanicLayer::custom(policy::panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until Ctrl-C or SIGTERM.
pub async fn start_server(config: &ServerConfig, state: AppState) -> anyhow::Result<()> {
    let app = build_router(state, &config.allowed_origins);
    let addr: SocketAddr = format!("{}:{}", config.bind, config.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid server address: {}", e))?;

    tracing::info!("Server starting on http://{}", addr);
    tracing::info!("   Webhook: http://{}/webhook/whatsapp", addr);
    tracing::info!("   Device:  http://{}/api/whatsapp/baileys", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler failed: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    tracing::info!("Shutdown signal received");
}
