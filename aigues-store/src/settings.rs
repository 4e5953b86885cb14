//! Account settings and their persistent store.

use aigues_core::{is_valid_username, mask_identifier, Credentials};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::persistence::{default_settings_path, load_json, save_json};

/// Default polling interval: four hours.
pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 14_400;

fn default_scan_interval() -> u64 {
    DEFAULT_SCAN_INTERVAL_SECS
}

// ============================================================================
// Settings
// ============================================================================

/// Account configuration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// NIF/NIE used to log in.
    pub username: String,

    /// Account password.
    pub password: String,

    /// Company identifier, if the account acts for a company.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_identification: Option<String>,

    /// Session token supplied by the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Contracts to poll.
    #[serde(default)]
    pub contracts: Vec<String>,

    /// Polling interval in seconds.
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,

    /// API base URL override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_host: Option<String>,
}

impl Settings {
    /// Creates settings for an account with no contracts yet.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            company_identification: None,
            token: None,
            contracts: Vec::new(),
            scan_interval_secs: DEFAULT_SCAN_INTERVAL_SECS,
            api_host: None,
        }
    }

    /// Checks the username shape and that at least one contract is set.
    pub fn validate(&self) -> Result<(), StoreError> {
        if !is_valid_username(&self.username) {
            return Err(StoreError::Config(format!(
                "invalid username '{}': expected a NIF/NIE",
                self.username
            )));
        }
        if self.contracts.is_empty() {
            return Err(StoreError::Config("no contracts configured".to_string()));
        }
        if self.scan_interval_secs == 0 {
            return Err(StoreError::Config("scan interval must be positive".to_string()));
        }
        Ok(())
    }

    /// Login credentials.
    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.username, &self.password)
            .with_company(self.company_identification.clone())
    }

    /// Polling interval.
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    /// Account identifier safe to display: the company identifier if set,
    /// otherwise the username, masked.
    pub fn masked_identifier(&self) -> String {
        let id = self
            .company_identification
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or(&self.username);
        mask_identifier(id)
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("company_identification", &self.company_identification)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("contracts", &self.contracts)
            .field("scan_interval_secs", &self.scan_interval_secs)
            .field("api_host", &self.api_host)
            .finish()
    }
}

// ============================================================================
// Settings Store
// ============================================================================

/// Settings bound to a file.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    settings: Arc<RwLock<Settings>>,
    path: PathBuf,
}

impl SettingsStore {
    /// Wraps settings that will be saved to `path`.
    pub fn new(path: PathBuf, settings: Settings) -> Self {
        Self {
            settings: Arc::new(RwLock::new(settings)),
            path,
        }
    }

    /// Loads settings from the default path.
    ///
    /// # Errors
    ///
    /// Returns error if the file is missing or unreadable.
    pub async fn load_default() -> Result<Self, StoreError> {
        Self::load(default_settings_path()).await
    }

    /// Loads settings from a path.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] if the file does not exist, or the
    /// underlying error if it cannot be read or parsed.
    pub async fn load(path: PathBuf) -> Result<Self, StoreError> {
        if !tokio::fs::try_exists(&path).await? {
            return Err(StoreError::Config(format!(
                "no settings at {}, run `aigues setup` first",
                path.display()
            )));
        }

        info!(path = %path.display(), "Loading settings");
        let settings: Settings = load_json(&path).await?;
        debug!(contracts = settings.contracts.len(), "Settings loaded");
        Ok(Self::new(path, settings))
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Gets a copy of the current settings.
    pub async fn get(&self) -> Settings {
        self.settings.read().await.clone()
    }

    /// Updates settings in memory.
    pub async fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut Settings),
    {
        let mut settings = self.settings.write().await;
        f(&mut settings);
    }

    /// Saves settings to disk.
    ///
    /// # Errors
    ///
    /// Returns error if settings cannot be written to disk.
    pub async fn save(&self) -> Result<(), StoreError> {
        let settings = self.settings.read().await;
        save_json(&self.path, &*settings).await?;
        info!(path = %self.path.display(), "Settings saved");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> Settings {
        let mut settings = Settings::new("12345678Z", "secret");
        settings.contracts = vec!["W1234567".to_string()];
        settings
    }

    #[test]
    fn test_validate() {
        assert!(configured().validate().is_ok());

        let mut bad_user = configured();
        bad_user.username = "1234".to_string();
        assert!(matches!(bad_user.validate(), Err(StoreError::Config(_))));

        let mut no_contracts = configured();
        no_contracts.contracts.clear();
        assert!(no_contracts.validate().is_err());

        let mut zero = configured();
        zero.scan_interval_secs = 0;
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_masked_identifier() {
        let mut settings = configured();
        assert_eq!(settings.masked_identifier(), "***78Z");

        settings.company_identification = Some("B65432109".to_string());
        assert_eq!(settings.masked_identifier(), "***109");
    }

    #[test]
    fn test_defaults_when_fields_missing() {
        let settings: Settings =
            serde_json::from_str(r#"{"username":"12345678Z","password":"p"}"#).unwrap();
        assert_eq!(settings.scan_interval_secs, DEFAULT_SCAN_INTERVAL_SECS);
        assert!(settings.contracts.is_empty());
        assert!(settings.token.is_none());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut settings = configured();
        settings.token = Some("tok.en.value".to_string());
        let debug = format!("{settings:?}");
        assert!(!debug.contains("secret"));
        assert!(!debug.contains("tok.en.value"));
    }

    #[test]
    fn test_credentials_ignore_empty_company() {
        let mut settings = configured();
        settings.company_identification = Some(String::new());
        assert!(settings.credentials().company_identification.is_none());
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = SettingsStore::load(dir.path().join("settings.json")).await;
        assert!(matches!(result, Err(StoreError::Config(_))));
    }

    #[tokio::test]
    async fn test_save_update_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aigues").join("settings.json");

        let store = SettingsStore::new(path.clone(), configured());
        store.save().await.unwrap();

        store
            .update(|s| s.token = Some("new-token".to_string()))
            .await;
        store.save().await.unwrap();

        let reloaded = SettingsStore::load(path).await.unwrap();
        let settings = reloaded.get().await;
        assert_eq!(settings.token.as_deref(), Some("new-token"));
        assert_eq!(settings.contracts, vec!["W1234567"]);
    }
}
