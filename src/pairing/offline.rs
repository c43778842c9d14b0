//! Offline pairing connector.
//!
//! Issues pairing codes locally and keeps the linked-device record in
//! `<auth_dir>/creds.json`, so a registered device survives restarts.
//! No WhatsApp socket is opened; once a code is issued the device counts as
//! linked, and its groups are whatever the credential file records.

use super::{GroupInfo, PairingConnector, PairingOutcome, PhoneNumber, SessionHandle, format_pairing_code};
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::RwLock;

const CREDS_FILE: &str = "creds.json";

/// Pairing-code alphabet (no 0/O or I/1 look-alikes).
const CODE_ALPHABET: &[u8] = b"123456789ABCDEFGHJKLMNPQRSTVWXYZ";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Credentials {
    phone_number: String,
    handle: SessionHandle,
    registered: bool,
    paired_at: DateTime<Utc>,
    #[serde(default)]
    groups: Vec<GroupInfo>,
}

pub struct OfflineConnector {
    auth_dir: PathBuf,
    creds: RwLock<Option<Credentials>>,
}

impl OfflineConnector {
    /// Open (creating if needed) the credential directory and load any saved device.
    pub fn new(auth_dir: impl Into<PathBuf>) -> Result<Self> {
        let auth_dir = auth_dir.into();
        std::fs::create_dir_all(&auth_dir)?;

        let path = auth_dir.join(CREDS_FILE);
        let creds = if path.exists() {
            let bytes = std::fs::read(&path)?;
            match serde_json::from_slice::<Credentials>(&bytes) {
                Ok(creds) => {
                    tracing::info!(
                        "Pairing: loaded credentials for {} (registered: {})",
                        creds.phone_number,
                        creds.registered
                    );
                    Some(creds)
                }
                Err(e) => {
                    tracing::warn!("Pairing: ignoring unreadable {}: {}", path.display(), e);
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            auth_dir,
            creds: RwLock::new(creds),
        })
    }

    fn creds_path(&self) -> PathBuf {
        self.auth_dir.join(CREDS_FILE)
    }

    /// Write via a temp file so a crash never leaves a half-written creds.json.
    async fn persist(&self, creds: &Credentials) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(creds)?;
        let tmp = self.auth_dir.join(format!("{CREDS_FILE}.tmp"));
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, self.creds_path()).await?;
        Ok(())
    }

    fn generate_pairing_code() -> String {
        let mut rng = rand::rng();
        (0..8)
            .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
            .collect()
    }
}

#[async_trait]
impl PairingConnector for OfflineConnector {
    async fn request_pairing_code(&self, phone: &PhoneNumber) -> Result<PairingOutcome> {
        let mut guard = self.creds.write().await;

        if let Some(creds) = guard.as_ref()
            && creds.registered
        {
            tracing::info!("Pairing: {} already registered, no pairing code needed", phone);
            return Ok(PairingOutcome::AlreadyRegistered {
                handle: creds.handle.clone(),
            });
        }

        let creds = Credentials {
            phone_number: phone.to_string(),
            handle: SessionHandle::new(),
            registered: true,
            paired_at: Utc::now(),
            groups: Vec::new(),
        };
        self.persist(&creds).await?;

        let code = format_pairing_code(&Self::generate_pairing_code());
        tracing::info!("Pairing: issued pairing code for {}", phone.jid());

        let handle = creds.handle.clone();
        *guard = Some(creds);
        Ok(PairingOutcome::Code { code, handle })
    }

    async fn groups(&self) -> Result<Vec<GroupInfo>> {
        match self.creds.read().await.as_ref() {
            Some(creds) if creds.registered => Ok(creds.groups.clone()),
            _ => Err(BridgeError::NotConnected),
        }
    }

    async fn is_connected(&self) -> bool {
        self.creds
            .read()
            .await
            .as_ref()
            .is_some_and(|c| c.registered)
    }

    async fn disconnect(&self) -> Result<()> {
        let mut guard = self.creds.write().await;
        if guard.take().is_some() {
            match tokio::fs::remove_file(self.creds_path()).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            tracing::info!("Pairing: disconnected from WhatsApp");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn phone() -> PhoneNumber {
        PhoneNumber::parse("972501234567").unwrap()
    }

    #[test]
    fn test_generate_pairing_code() {
        let code = OfflineConnector::generate_pairing_code();
        assert_eq!(code.len(), 8);
        assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
    }

    #[tokio::test]
    async fn test_new_creates_auth_dir() {
        let dir = TempDir::new().unwrap();
        let auth_dir = dir.path().join("auth_info");
        let connector = OfflineConnector::new(&auth_dir).unwrap();
        assert!(auth_dir.is_dir());
        assert!(!connector.is_connected().await);
    }

    #[tokio::test]
    async fn test_pairing_lifecycle() {
        let dir = TempDir::new().unwrap();
        let connector = OfflineConnector::new(dir.path()).unwrap();

        assert!(matches!(
            connector.groups().await,
            Err(BridgeError::NotConnected)
        ));

        let outcome = connector.request_pairing_code(&phone()).await.unwrap();
        let code = outcome.code().expect("fresh device gets a code");
        assert_eq!(code.len(), 9);
        assert_eq!(&code[4..5], "-");
        assert!(connector.is_connected().await);
        assert!(dir.path().join(CREDS_FILE).exists());
        assert!(connector.groups().await.unwrap().is_empty());

        let again = connector.request_pairing_code(&phone()).await.unwrap();
        assert!(matches!(again, PairingOutcome::AlreadyRegistered { .. }));
        assert_eq!(again.handle(), outcome.handle());

        connector.disconnect().await.unwrap();
        assert!(!connector.is_connected().await);
        assert!(!dir.path().join(CREDS_FILE).exists());
    }

    #[tokio::test]
    async fn test_credentials_survive_restart() {
        let dir = TempDir::new().unwrap();
        let handle = {
            let connector = OfflineConnector::new(dir.path()).unwrap();
            connector
                .request_pairing_code(&phone())
                .await
                .unwrap()
                .handle()
                .clone()
        };

        let reopened = OfflineConnector::new(dir.path()).unwrap();
        assert!(reopened.is_connected().await);
        let outcome = reopened.request_pairing_code(&phone()).await.unwrap();
        assert_eq!(outcome, PairingOutcome::AlreadyRegistered { handle });
    }

    #[tokio::test]
    async fn test_groups_from_credentials_file() {
        let dir = TempDir::new().unwrap();
        let creds = serde_json::json!({
            "phone_number": "972501234567",
            "handle": "h-1",
            "registered": true,
            "paired_at": "2026-01-01T00:00:00Z",
            "groups": [
                {"id": "1@g.us", "name": "Family Group", "participantCount": 5},
                {"id": "2@g.us", "name": "Work Team", "participantCount": 8}
            ]
        });
        std::fs::write(dir.path().join(CREDS_FILE), creds.to_string()).unwrap();

        let connector = OfflineConnector::new(dir.path()).unwrap();
        let groups = connector.groups().await.unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[1].name, "Work Team");
    }

    #[tokio::test]
    async fn test_corrupt_credentials_are_ignored() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CREDS_FILE), "{not json").unwrap();
        let connector = OfflineConnector::new(dir.path()).unwrap();
        assert!(!connector.is_connected().await);
    }

    #[tokio::test]
    async fn test_disconnect_when_not_connected_is_ok() {
        let dir = TempDir::new().unwrap();
        let connector = OfflineConnector::new(dir.path()).unwrap();
        assert!(connector.disconnect().await.is_ok());
    }
}
