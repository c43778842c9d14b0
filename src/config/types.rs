//! Configuration types, defaults, loading, and validation.

use super::secrets::SecretString;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP listener configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Inbound webhook configuration
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Outbound WhatsApp Cloud API configuration
    #[serde(default)]
    pub cloud_api: CloudApiConfig,

    /// Device pairing configuration
    #[serde(default)]
    pub pairing: PairingConfig,

    /// Conversation session configuration
    #[serde(default)]
    pub sessions: SessionConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (default: "0.0.0.0")
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Listen port (default: 3000)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed CORS origins. Empty means no cross-origin requests.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            allowed_origins: vec![],
        }
    }
}

/// How inbound webhook messages are answered.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WebhookMode {
    /// Run the per-user pairing conversation
    #[default]
    Conversation,
    /// Reply to every message with "Echo: <text>"
    Echo,
}

impl std::str::FromStr for WebhookMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "conversation" => Ok(Self::Conversation),
            "echo" => Ok(Self::Echo),
            other => anyhow::bail!("Unknown webhook mode: {other} (expected conversation or echo)"),
        }
    }
}

/// Inbound webhook configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WebhookConfig {
    /// Secret the Cloud API must echo back during the verification handshake
    #[serde(default)]
    pub verify_token: Option<SecretString>,

    /// "conversation" (default) or "echo"
    #[serde(default)]
    pub mode: WebhookMode,
}

/// Outbound WhatsApp Cloud API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudApiConfig {
    /// Bearer token for the Graph API
    #[serde(default)]
    pub access_token: Option<SecretString>,

    /// Graph API base URL (default: "https://graph.facebook.com")
    #[serde(default = "default_graph_url")]
    pub base_url: String,

    /// Graph API version segment (default: "v22.0")
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_graph_url() -> String {
    "https://graph.facebook.com".to_string()
}

fn default_api_version() -> String {
    "v22.0".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for CloudApiConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            base_url: default_graph_url(),
            api_version: default_api_version(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Device pairing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingConfig {
    /// Directory holding the linked-device credential files
    #[serde(default = "default_auth_dir")]
    pub auth_dir: PathBuf,
}

fn default_auth_dir() -> PathBuf {
    pairbridge_home().join("auth_info")
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            auth_dir: default_auth_dir(),
        }
    }
}

/// Conversation session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Idle time after which a conversation restarts from scratch.
    /// `None` or `0` keeps sessions for the life of the process.
    #[serde(default = "default_session_ttl")]
    pub ttl_secs: Option<u64>,
}

fn default_session_ttl() -> Option<u64> {
    Some(86_400)
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl(),
        }
    }
}

impl SessionConfig {
    /// The effective TTL, with `0` treated as disabled.
    pub fn ttl(&self) -> Option<std::time::Duration> {
        self.ttl_secs
            .filter(|&s| s > 0)
            .map(std::time::Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,

    /// Also log to a daily-rolling file at this path
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Expand leading `~` or `~/` in a path to the actual home directory.
fn expand_tilde(p: &Path) -> PathBuf {
    if let Ok(rest) = p.strip_prefix("~") {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest)
    } else {
        p.to_path_buf()
    }
}

/// Base directory for config and credentials: `~/.wa-pairbridge/`
pub fn pairbridge_home() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".wa-pairbridge")
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Priority (lowest to highest):
    /// 1. Default values
    /// 2. System config: ~/.wa-pairbridge/config.toml
    /// 3. Local config: ./wa-pairbridge.toml
    /// 4. Environment variables
    pub fn load() -> Result<Self> {
        tracing::debug!("Loading configuration...");

        let mut config = Self::default();

        let system_config_path = Self::system_config_path();
        if system_config_path.exists() {
            tracing::debug!("Loading system config from: {:?}", system_config_path);
            config = Self::from_file(&system_config_path)?;
        }

        let local_config_path = Self::local_config_path();
        if local_config_path.exists() {
            tracing::debug!("Loading local config from: {:?}", local_config_path);
            config = Self::from_file(&local_config_path)?;
        }

        config = Self::apply_env_overrides(config, |k| std::env::var(k).ok())?;
        config.pairing.auth_dir = expand_tilde(&config.pairing.auth_dir);

        tracing::debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Load configuration from a specific file path
    ///
    /// Priority (lowest to highest):
    /// 1. Default values
    /// 2. Custom config file (specified path)
    /// 3. Environment variables
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!("Loading configuration from custom path: {:?}", path);

        if !path.exists() {
            anyhow::bail!("Config file not found: {:?}", path);
        }

        let mut config = Self::from_file(path)?;
        config = Self::apply_env_overrides(config, |k| std::env::var(k).ok())?;
        config.pairing.auth_dir = expand_tilde(&config.pairing.auth_dir);

        tracing::debug!("Configuration loaded successfully from custom path");
        Ok(config)
    }

    /// Get the system config path: ~/.wa-pairbridge/config.toml
    pub fn system_config_path() -> PathBuf {
        pairbridge_home().join("config.toml")
    }

    /// Get the local config path: ./wa-pairbridge.toml
    fn local_config_path() -> PathBuf {
        PathBuf::from("./wa-pairbridge.toml")
    }

    /// Parse a TOML file. Sections absent from the file keep their defaults.
    fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        toml::from_str(&contents).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Apply environment variable overrides.
    ///
    /// `WEBHOOK_VERIFY_TOKEN`, `ACCESS_TOKEN` and `PORT` are the names Cloud API
    /// deployments conventionally use; the rest are prefixed.
    fn apply_env_overrides<F>(mut config: Self, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = var("WEBHOOK_VERIFY_TOKEN") {
            config.webhook.verify_token = Some(SecretString::new(token));
        }

        if let Some(token) = var("ACCESS_TOKEN") {
            config.cloud_api.access_token = Some(SecretString::new(token));
        }

        if let Some(port) = var("PORT") {
            config.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid PORT: {port}"))?;
        }

        if let Some(bind) = var("WA_PAIRBRIDGE_BIND") {
            config.server.bind = bind;
        }

        if let Some(mode) = var("WA_PAIRBRIDGE_WEBHOOK_MODE") {
            config.webhook.mode = mode.parse()?;
        }

        if let Some(url) = var("WA_PAIRBRIDGE_GRAPH_URL") {
            config.cloud_api.base_url = url;
        }

        if let Some(dir) = var("WA_PAIRBRIDGE_AUTH_DIR") {
            config.pairing.auth_dir = PathBuf::from(dir);
        }

        if let Some(ttl) = var("WA_PAIRBRIDGE_SESSION_TTL_SECS") {
            config.sessions.ttl_secs = Some(
                ttl.trim()
                    .parse()
                    .with_context(|| format!("Invalid WA_PAIRBRIDGE_SESSION_TTL_SECS: {ttl}"))?,
            );
        }

        if let Some(level) = var("WA_PAIRBRIDGE_LOG_LEVEL") {
            config.logging.level = level;
        }

        if let Some(file) = var("WA_PAIRBRIDGE_LOG_FILE") {
            config.logging.file = Some(PathBuf::from(file));
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        tracing::debug!("Validating configuration...");

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            );
        }

        if self.server.port == 0 {
            anyhow::bail!("Server port must be non-zero");
        }

        if self.cloud_api.api_version.trim().is_empty() {
            anyhow::bail!("cloud_api.api_version must not be empty");
        }

        if self.webhook.verify_token.as_ref().is_none_or(SecretString::is_empty) {
            tracing::warn!("No webhook verify token configured; verification requests will be rejected");
        }

        if self.cloud_api.access_token.as_ref().is_none_or(SecretString::is_empty) {
            tracing::warn!("No Cloud API access token configured; outbound replies will fail");
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Rotate config backups before writing.
    ///
    /// Keeps up to `max_backups` copies named `config.toml.backup1` (newest)
    /// through `config.toml.backupN` (oldest). Errors are ignored.
    fn backup_config(path: &Path, max_backups: usize) {
        if !path.exists() {
            return;
        }

        let Some(parent) = path.parent() else {
            return;
        };
        let stem = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        for i in (1..=max_backups).rev() {
            let src = parent.join(format!("{stem}.backup{i}"));
            if i == max_backups {
                let _ = fs::remove_file(&src);
            } else {
                let dst = parent.join(format!("{stem}.backup{}", i + 1));
                if src.exists() {
                    let _ = fs::rename(&src, &dst);
                }
            }
        }

        let backup1 = parent.join(format!("{stem}.backup1"));
        if let Err(e) = fs::copy(path, &backup1) {
            tracing::warn!("Failed to back up config before write: {e}");
        } else {
            tracing::debug!("Config backed up to {}", backup1.display());
        }
    }

    /// Save configuration to a file.
    ///
    /// Secrets serialize as `[REDACTED]`, so they are left out of the written file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut sanitized = self.clone();
        sanitized.webhook.verify_token = None;
        sanitized.cloud_api.access_token = None;

        let toml_string =
            toml::to_string_pretty(&sanitized).context("Failed to serialize config to TOML")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        Self::backup_config(path, 5);

        fs::write(path, toml_string)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        tracing::info!("Configuration saved to: {:?}", path);
        Ok(())
    }
}
