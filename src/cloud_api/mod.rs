//! WhatsApp Cloud API outbound messaging.
//!
//! `send` issues one authenticated POST to
//! `{base_url}/{api_version}/{phone_number_id}/messages`. Failures are
//! returned to the caller; deciding whether to swallow them is the caller's job.

use crate::config::{CloudApiConfig, SecretString};
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send a plain text message from the business number `phone_number_id` to `to`.
    async fn send(&self, phone_number_id: &str, to: &str, text: &str) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct TextBody<'a> {
    body: &'a str,
}

/// Request body for a text message.
#[derive(Debug, Serialize)]
struct OutboundText<'a> {
    messaging_product: &'static str,
    to: &'a str,
    text: TextBody<'a>,
}

/// `Messenger` backed by the Graph API.
pub struct CloudApiMessenger {
    http: Client,
    base_url: String,
    api_version: String,
    access_token: Option<SecretString>,
}

impl CloudApiMessenger {
    pub fn new(config: &CloudApiConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_version: config.api_version.clone(),
            access_token: config.access_token.clone(),
        })
    }

    fn messages_url(&self, phone_number_id: &str) -> String {
        format!(
            "{}/{}/{}/messages",
            self.base_url, self.api_version, phone_number_id
        )
    }
}

#[async_trait]
impl Messenger for CloudApiMessenger {
    async fn send(&self, phone_number_id: &str, to: &str, text: &str) -> Result<()> {
        let token = self
            .access_token
            .as_ref()
            .ok_or(BridgeError::NotConfigured("cloud_api.access_token"))?;

        let payload = OutboundText {
            messaging_product: "whatsapp",
            to,
            text: TextBody { body: text },
        };

        let resp = self
            .http
            .post(self.messages_url(phone_number_id))
            .bearer_auth(token.expose_secret())
            .json(&payload)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            tracing::error!("Cloud API: send to {} failed with {}: {}", to, status, body);
            return Err(BridgeError::CloudApi { status, body });
        }

        tracing::info!("Cloud API: message sent to {}", to);
        tracing::debug!("Cloud API: message body to {}: {}", to, text);
        Ok(())
    }
}
