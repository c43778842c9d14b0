//! Subcommand implementations.

use crate::cloud_api::{CloudApiMessenger, Messenger};
use crate::config::Config;
use crate::conversation::{ConversationEngine, InMemorySessionStore, SessionStore};
use crate::pairing::{OfflineConnector, PairingConnector};
use crate::server::{AppState, start_server};
use crate::webhook::WebhookDispatcher;
use anyhow::{Context, Result};
use std::sync::Arc;

/// Wire up the collaborators and run the server until shutdown.
pub(super) async fn cmd_serve(config: &Config) -> Result<()> {
    config.validate()?;

    let connector: Arc<dyn PairingConnector> = Arc::new(
        OfflineConnector::new(config.pairing.auth_dir.clone()).with_context(|| {
            format!(
                "Failed to open pairing credentials at {:?}",
                config.pairing.auth_dir
            )
        })?,
    );
    let messenger: Arc<dyn Messenger> = Arc::new(
        CloudApiMessenger::new(&config.cloud_api).context("Failed to build Cloud API client")?,
    );
    let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new(config.sessions.ttl()));

    let engine = Arc::new(ConversationEngine::new(
        store,
        messenger.clone(),
        connector.clone(),
    ));
    let dispatcher = Arc::new(WebhookDispatcher::new(
        config.webhook.mode,
        messenger,
        engine,
    ));

    tracing::info!(
        "Webhook mode: {:?}, session TTL: {:?}",
        dispatcher.mode(),
        config.sessions.ttl()
    );

    let state = AppState {
        verify_token: config.webhook.verify_token.clone(),
        dispatcher,
        connector,
    };
    start_server(&config.server, state).await
}

pub(super) fn cmd_init(force: bool) -> Result<()> {
    let path = Config::system_config_path();
    if path.exists() && !force {
        anyhow::bail!(
            "Configuration already exists at {:?}. Use --force to overwrite.",
            path
        );
    }

    Config::default().save(&path)?;
    println!("Configuration written to {}", path.display());
    println!("Set WEBHOOK_VERIFY_TOKEN and ACCESS_TOKEN in the environment before serving.");
    Ok(())
}

pub(super) fn cmd_config(config: &Config, show_secrets: bool) -> Result<()> {
    let rendered = toml::to_string_pretty(config).context("Failed to render configuration")?;
    println!("{rendered}");

    if show_secrets {
        let reveal = |secret: Option<&crate::config::SecretString>| {
            secret.map_or("<unset>", |s| s.expose_secret()).to_string()
        };
        println!("# secrets");
        println!(
            "webhook.verify_token = {:?}",
            reveal(config.webhook.verify_token.as_ref())
        );
        println!(
            "cloud_api.access_token = {:?}",
            reveal(config.cloud_api.access_token.as_ref())
        );
    }
    Ok(())
}
