use std::sync::RwLock;

use anyhow::{Context, Result};
use keyring::Entry;
use tracing::debug;

use super::SessionStore;

const SERVICE_NAME: &str = "evebox-client";

/// Session store backed by the OS keychain, one entry per server.
pub struct KeyringSessionStore {
    account: String,
    session_id: RwLock<Option<String>>,
}

impl KeyringSessionStore {
    /// Open the keychain entry for `server_url` and load any stored session.
    pub fn open(server_url: &str) -> Result<Self> {
        let entry = Self::entry(server_url)?;
        let session_id = match entry.get_password() {
            Ok(session_id) => Some(session_id),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => return Err(e).context("Failed to read session from keychain"),
        };
        debug!(has_session = session_id.is_some(), "Keychain session loaded");
        Ok(Self {
            account: server_url.to_string(),
            session_id: RwLock::new(session_id),
        })
    }

    fn entry(account: &str) -> Result<Entry> {
        Entry::new(SERVICE_NAME, account).context("Failed to create keyring entry")
    }
}

impl SessionStore for KeyringSessionStore {
    fn get(&self) -> Option<String> {
        self.session_id.read().ok().and_then(|s| s.clone())
    }

    fn set(&self, session_id: Option<String>) -> Result<()> {
        let mut guard = self
            .session_id
            .write()
            .map_err(|_| anyhow::anyhow!("session lock poisoned"))?;
        let entry = Self::entry(&self.account)?;
        match session_id {
            Some(ref session_id) => entry
                .set_password(session_id)
                .context("Failed to store session in keychain")?,
            None => match entry.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => {}
                Err(e) => return Err(e).context("Failed to delete session from keychain"),
            },
        }
        *guard = session_id;
        Ok(())
    }
}
