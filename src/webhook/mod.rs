//! Cloud API webhook: verification handshake and event dispatch.

mod payload;
mod verify;

pub use payload::{BUSINESS_ACCOUNT_OBJECT, InboundMessage, first_message, is_business_account};
pub use verify::{Verification, VerifyQuery, verify};

use crate::cloud_api::Messenger;
use crate::config::WebhookMode;
use crate::conversation::{ConversationEngine, replies};
use crate::error::Result;
use serde_json::Value;
use std::sync::Arc;

/// Routes an accepted delivery to echo or conversation handling.
pub struct WebhookDispatcher {
    mode: WebhookMode,
    messenger: Arc<dyn Messenger>,
    engine: Arc<ConversationEngine>,
}

impl WebhookDispatcher {
    pub fn new(
        mode: WebhookMode,
        messenger: Arc<dyn Messenger>,
        engine: Arc<ConversationEngine>,
    ) -> Self {
        Self {
            mode,
            messenger,
            engine,
        }
    }

    pub fn mode(&self) -> WebhookMode {
        self.mode
    }

    /// Handle the first message of a business-account delivery, if any.
    pub async fn dispatch(&self, body: &Value) -> Result<()> {
        let Some(message) = first_message(body)? else {
            tracing::debug!("Webhook: delivery without messages");
            return Ok(());
        };

        tracing::info!(
            "Webhook: message from {} to {} ({} chars)",
            message.from,
            message.phone_number_id,
            message.text.chars().count()
        );

        match self.mode {
            WebhookMode::Echo => {
                self.messenger
                    .send(
                        &message.phone_number_id,
                        &message.from,
                        &replies::echo(&message.text),
                    )
                    .await
            }
            WebhookMode::Conversation => {
                let state = self.engine.handle(&message).await?;
                tracing::debug!("Webhook: {} now {:?}", message.from, state);
                Ok(())
            }
        }
    }
}
