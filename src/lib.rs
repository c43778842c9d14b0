//! wa-pairbridge - WhatsApp Cloud API webhook bridge
//!
//! Receives WhatsApp Cloud API webhook events and walks each sender through
//! linking their WhatsApp account as a companion device by pairing code,
//! then reports how many groups they belong to.
//!
//! ## Features
//!
//! - **Webhook:** Cloud API verification handshake and event delivery
//! - **Conversation:** per-sender state machine with session TTL and per-sender locking
//! - **Device API:** connect / groups / status / disconnect over HTTP
//! - **Echo mode:** stateless echo replies for testing the Cloud API wiring
//!
//! ## Quick Start
//!
//! ```bash
//! export WEBHOOK_VERIFY_TOKEN=... ACCESS_TOKEN=...
//! wa-pairbridge serve --port 3000
//! ```

pub mod cli;
pub mod cloud_api;
pub mod config;
pub mod conversation;
pub mod error;
pub mod logging;
pub mod pairing;
pub mod server;
pub mod webhook;

pub use error::{BridgeError, Result};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
