//! Persistent client-side storage.
//!
//! One JSON file per key in the platform-appropriate config directory:
//! - Linux: `~/.config/lancelink/`
//! - macOS: `~/Library/Application Support/lancelink/`
//! - Windows: `%APPDATA%\lancelink\`
//!
//! Tests point it at a temporary directory instead.

use std::path::PathBuf;

use serde::{de::DeserializeOwned, Serialize};

/// Slot holding the bearer token. Absence of this slot means "anonymous".
pub const TOKEN_KEY: &str = "auth_token";
/// Slot holding the serialized identity snapshot.
pub const SESSION_KEY: &str = "auth_session";
/// Slot holding the path to return to after the next login.
pub const REDIRECT_KEY: &str = "post_login_redirect";

#[derive(Debug, Clone)]
pub struct Storage {
    dir: PathBuf,
}

impl Storage {
    /// Open storage in the platform config directory.
    ///
    /// Returns `None` if no config directory is available.
    pub fn open_default() -> Option<Self> {
        let dir = dirs::config_dir()?.join("lancelink");
        Some(Self::with_dir(dir))
    }

    /// Open storage rooted at an explicit directory.
    pub fn with_dir(dir: PathBuf) -> Self {
        if !dir.exists() {
            if let Err(err) = std::fs::create_dir_all(&dir) {
                tracing::warn!("failed to create storage dir {:?}: {}", dir, err);
            }
        }
        Self { dir }
    }

    /// Save a value. Returns `true` if the operation succeeded.
    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> bool {
        match serde_json::to_string(value) {
            Ok(json) => std::fs::write(self.file_path(key), json).is_ok(),
            Err(_) => false,
        }
    }

    /// Load a value. Returns `None` if the key doesn't exist or fails to parse.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let json = std::fs::read_to_string(self.file_path(key)).ok()?;
        serde_json::from_str(&json).ok()
    }

    pub fn remove(&self, key: &str) {
        let _ = std::fs::remove_file(self.file_path(key));
    }

    pub fn exists(&self, key: &str) -> bool {
        self.file_path(key).exists()
    }

    fn file_path(&self, key: &str) -> PathBuf {
        // Sanitize key to be a valid filename
        let safe_key = key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
        self.dir.join(format!("{}.json", safe_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_storage() -> (tempfile::TempDir, Storage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::with_dir(dir.path().to_path_buf());
        (dir, storage)
    }

    #[test]
    fn save_load_remove_round_trip() {
        let (_guard, storage) = temp_storage();
        assert!(storage.save(TOKEN_KEY, &"tok-123".to_string()));
        assert!(storage.exists(TOKEN_KEY));
        let token: String = storage.load(TOKEN_KEY).unwrap();
        assert_eq!(token, "tok-123");
        storage.remove(TOKEN_KEY);
        assert!(!storage.exists(TOKEN_KEY));
        assert!(storage.load::<String>(TOKEN_KEY).is_none());
    }

    #[test]
    fn keys_with_path_separators_are_sanitized() {
        let (_guard, storage) = temp_storage();
        assert!(storage.save("weird/key:name", &1u32));
        assert_eq!(storage.load::<u32>("weird/key:name"), Some(1));
    }
}
