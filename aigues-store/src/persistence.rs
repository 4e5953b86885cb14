//! File persistence helpers.
//!
//! Handles loading and saving settings and statistics with owner-only
//! permissions.

use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::StoreError;

// ============================================================================
// Default Paths
// ============================================================================

/// Returns the default configuration directory.
///
/// - macOS: `~/Library/Application Support/Aigues`
/// - Linux: `~/.config/aigues`
/// - Windows: `%APPDATA%\aigues`
pub fn default_config_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        dirs::home_dir()
            .map(|h| h.join("Library").join("Application Support").join("Aigues"))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    #[cfg(not(target_os = "macos"))]
    {
        dirs::config_dir()
            .map(|c| c.join("aigues"))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Returns the default data directory, where statistics are kept.
///
/// - macOS: `~/Library/Application Support/Aigues`
/// - Linux: `~/.local/share/aigues`
/// - Windows: `%APPDATA%\aigues`
pub fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        default_config_dir()
    }

    #[cfg(not(target_os = "macos"))]
    {
        dirs::data_dir()
            .map(|d| d.join("aigues"))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Returns the default settings file path.
pub fn default_settings_path() -> PathBuf {
    default_config_dir().join("settings.json")
}

// ============================================================================
// Permissions
// ============================================================================

/// Owner read/write.
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

/// Owner read/write/execute.
#[cfg(unix)]
const DIR_MODE: u32 = 0o700;

/// Applies a Unix permission mode to `path`.
#[cfg(unix)]
async fn restrict(path: &Path, mode: u32) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await?;
    debug!(path = %path.display(), mode = format!("{mode:o}"), "Permissions restricted");
    Ok(())
}

#[cfg(not(unix))]
async fn restrict(_path: &Path, _mode: u32) -> Result<(), StoreError> {
    Ok(())
}

#[cfg(not(unix))]
const FILE_MODE: u32 = 0;

#[cfg(not(unix))]
const DIR_MODE: u32 = 0;

// ============================================================================
// File Operations
// ============================================================================

/// Creates the parent directories of `path`, owner-only.
///
/// Every directory created below the default config or data directory is
/// restricted, as is the immediate parent of a custom path.
async fn create_secure_parent_dirs(path: &Path) -> Result<(), StoreError> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() || tokio::fs::try_exists(parent).await? {
        return Ok(());
    }

    debug!(path = %parent.display(), "Creating directory");
    tokio::fs::create_dir_all(parent).await?;
    restrict(parent, DIR_MODE).await?;

    let roots = [default_config_dir(), default_data_dir()];
    let mut current = parent.to_path_buf();
    while current.pop() {
        if !roots.iter().any(|root| current.starts_with(root)) {
            break;
        }
        restrict(&current, DIR_MODE).await?;
    }
    Ok(())
}

/// Saves data to a JSON file.
///
/// The file is written to a sibling temp file and renamed into place, then
/// restricted to the owner.
pub async fn save_json<T: Serialize>(path: &Path, data: &T) -> Result<(), StoreError> {
    debug!(path = %path.display(), "Saving JSON file");

    create_secure_parent_dirs(path).await?;

    let json = serde_json::to_string_pretty(data)?;
    let temp_path = path.with_extension("json.tmp");
    tokio::fs::write(&temp_path, &json).await?;
    restrict(&temp_path, FILE_MODE).await?;
    tokio::fs::rename(&temp_path, path).await?;

    Ok(())
}

/// Loads data from a JSON file.
pub async fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    debug!(path = %path.display(), "Loading JSON file");

    let content = tokio::fs::read_to_string(path).await?;
    let data = serde_json::from_str(&content)?;

    debug!(path = %path.display(), "JSON file loaded");
    Ok(data)
}

/// Loads data from a JSON file, returning default if not found.
pub async fn load_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    match load_json(path).await {
        Ok(data) => data,
        Err(e) => {
            if !matches!(e, StoreError::Io(_)) {
                warn!(path = %path.display(), error = %e, "Failed to load, using defaults");
            }
            T::default()
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_dir() {
        let path = default_config_dir();
        assert!(!path.as_os_str().is_empty());
    }

    #[test]
    fn test_default_data_dir() {
        let path = default_data_dir();
        assert!(!path.as_os_str().is_empty());
    }

    #[test]
    fn test_default_settings_path() {
        let path = default_settings_path();
        assert!(path.ends_with("settings.json"));
    }

    #[tokio::test]
    async fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data.json");

        save_json(&path, &vec![1, 2, 3]).await.unwrap();
        let loaded: Vec<i32> = load_json(&path).await.unwrap();
        assert_eq!(loaded, vec![1, 2, 3]);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_load_or_default_on_missing_and_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let value: Vec<i32> = load_json_or_default(&missing).await;
        assert!(value.is_empty());

        let corrupt = dir.path().join("corrupt.json");
        tokio::fs::write(&corrupt, "{not json").await.unwrap();
        let value: Vec<i32> = load_json_or_default(&corrupt).await;
        assert!(value.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_and_dir_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secure").join("settings.json");
        save_json(&path, &"secret").await.unwrap();

        let file_mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);

        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700);
    }
}
