//! Credential handling: environment override, OS keychain, remembered username.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

/// Keychain service name; entries are keyed by (service, username).
const SERVICE: &str = "ewant-report";

/// Small sidecar file remembering the last-used username. The password never
/// touches the filesystem; it lives in the OS secret store.
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Load credentials from the environment (`.env` honored), taking
    /// precedence over the keychain. Returns `None` unless both
    /// `EWANT_USER` and `EWANT_PASSWORD` are set.
    pub fn from_env() -> Option<Self> {
        let _ = dotenvy::dotenv();
        let username = std::env::var("EWANT_USER").ok()?;
        let password = std::env::var("EWANT_PASSWORD").ok()?;
        Some(Self { username, password })
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredConfig {
    username: String,
}

/// Persistent credential store: username in a JSON sidecar, password in the
/// OS keychain.
pub struct CredentialStore {
    config_path: PathBuf,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(CONFIG_FILE),
        }
    }
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn with_config_path(path: &std::path::Path) -> Self {
        Self {
            config_path: path.to_path_buf(),
        }
    }

    /// The username remembered from the last save, if any. Unreadable or
    /// malformed sidecar files degrade to "nothing remembered".
    pub fn last_username(&self) -> Option<String> {
        let raw = std::fs::read_to_string(&self.config_path).ok()?;
        match serde_json::from_str::<StoredConfig>(&raw) {
            Ok(stored) if !stored.username.is_empty() => Some(stored.username),
            Ok(_) => None,
            Err(e) => {
                warn!("ignoring malformed {}: {e}", self.config_path.display());
                None
            }
        }
    }

    /// Load credentials for `username` (or the remembered one) from the
    /// keychain.
    pub fn load(&self, username: Option<&str>) -> Result<Credentials> {
        let username = match username {
            Some(name) => name.to_string(),
            None => match self.last_username() {
                Some(name) => name,
                None => bail!(
                    "no username given and none remembered; \
                     pass --username or run the login command first"
                ),
            },
        };

        let entry = keyring::Entry::new(SERVICE, &username)
            .context("Failed to open the OS keychain")?;
        let password = match entry.get_password() {
            Ok(password) => password,
            Err(keyring::Error::NoEntry) => bail!(
                "no stored password for {username}; run the login command first"
            ),
            Err(e) => return Err(e).context("Failed to read the OS keychain"),
        };

        Ok(Credentials { username, password })
    }

    /// Resolve the credentials for a run. An explicit `--username` names a
    /// keychain account and overrides environment credentials; without it,
    /// the environment wins over the remembered keychain entry.
    pub fn resolve(
        &self,
        username: Option<&str>,
        env: Option<Credentials>,
    ) -> Result<Credentials> {
        match (username, env) {
            (Some(name), env) => {
                if env.is_some() {
                    warn!(
                        "--username given, ignoring EWANT_USER/EWANT_PASSWORD \
                         environment credentials"
                    );
                }
                self.load(Some(name))
            }
            (None, Some(creds)) => Ok(creds),
            (None, None) => self.load(None),
        }
    }

    /// Persist credentials: password into the keychain, username into the
    /// sidecar file.
    pub fn save(&self, credentials: &Credentials) -> Result<()> {
        let entry = keyring::Entry::new(SERVICE, &credentials.username)
            .context("Failed to open the OS keychain")?;
        entry
            .set_password(&credentials.password)
            .context("Failed to store the password in the OS keychain")?;

        let stored = StoredConfig {
            username: credentials.username.clone(),
        };
        let raw = serde_json::to_string_pretty(&stored)?;
        std::fs::write(&self.config_path, raw)
            .with_context(|| format!("Failed to write {}", self.config_path.display()))?;
        Ok(())
    }
}
