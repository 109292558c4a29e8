//! Client configuration management.
//!
//! This module handles loading and saving the client configuration: which
//! server to talk to, the last used username, and where the session token
//! is kept.
//!
//! Configuration is stored at `~/.config/evebox-client/config.json`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::api::{ApiClient, RequestPipeline, ReqwestTransport};
use crate::auth::{FileSessionStore, KeyringSessionStore, MemorySessionStore, SessionStore};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "evebox-client";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Server used when nothing else is configured (EveBox's default port).
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5636";

/// Environment overrides, also read from `.env`.
pub const ENV_SERVER_URL: &str = "EVEBOX_URL";
pub const ENV_USERNAME: &str = "EVEBOX_USERNAME";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    #[default]
    File,
    Keyring,
    Memory,
}

impl std::str::FromStr for SessionBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Ok(SessionBackend::File),
            "keyring" => Ok(SessionBackend::Keyring),
            "memory" => Ok(SessionBackend::Memory),
            other => Err(anyhow::anyhow!("unknown session backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server_url: Option<String>,
    pub username: Option<String>,
    pub session_backend: SessionBackend,
    pub request_timeout_secs: Option<u64>,
    pub accept_invalid_certs: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Apply `EVEBOX_URL` / `EVEBOX_USERNAME` from the environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(
            std::env::var(ENV_SERVER_URL).ok(),
            std::env::var(ENV_USERNAME).ok(),
        );
    }

    fn apply_overrides(&mut self, server_url: Option<String>, username: Option<String>) {
        if let Some(url) = server_url.filter(|u| !u.is_empty()) {
            self.server_url = Some(url);
        }
        if let Some(username) = username.filter(|u| !u.is_empty()) {
            self.username = Some(username);
        }
    }

    pub fn server_url(&self) -> &str {
        self.server_url.as_deref().unwrap_or(DEFAULT_SERVER_URL)
    }

    /// Session cache directory, one per server so switching servers does
    /// not reuse a foreign session.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME).join(self.server_key()?))
    }

    /// Filesystem-safe name for the configured server.
    fn server_key(&self) -> Result<String> {
        let url = Url::parse(self.server_url())
            .with_context(|| format!("Invalid server URL: {}", self.server_url()))?;
        let host = url.host_str().unwrap_or("localhost");
        let key = match url.port_or_known_default() {
            Some(port) => format!("{}_{}", host, port),
            None => host.to_string(),
        };
        Ok(key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '_' { c } else { '_' })
            .collect())
    }

    pub fn session_store(&self) -> Result<Arc<dyn SessionStore>> {
        let store: Arc<dyn SessionStore> = match self.session_backend {
            SessionBackend::File => Arc::new(FileSessionStore::open(self.cache_dir()?)),
            SessionBackend::Keyring => Arc::new(KeyringSessionStore::open(self.server_url())?),
            SessionBackend::Memory => Arc::new(MemorySessionStore::new()),
        };
        Ok(store)
    }

    pub fn transport(&self) -> Result<ReqwestTransport> {
        let timeout = self.request_timeout_secs.map(Duration::from_secs);
        ReqwestTransport::new(self.server_url(), timeout, self.accept_invalid_certs)
            .context("Failed to create HTTP transport")
    }

    /// Pipeline with the configured transport and session store and the
    /// default (logging) side effects.
    pub fn pipeline(&self) -> Result<RequestPipeline> {
        Ok(RequestPipeline::new(
            Arc::new(self.transport()?),
            self.session_store()?,
        ))
    }

    pub fn client(&self) -> Result<ApiClient> {
        Ok(ApiClient::new(self.pipeline()?))
    }
}
