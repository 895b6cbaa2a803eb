use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Fixed name the session token is stored under.
pub const TOKEN_KEY: &str = "authToken";

const SERVICE_NAME: &str = "fittrack";

/// Owner read/write only; the file holds a bearer credential.
#[cfg(unix)]
const TOKEN_FILE_MODE: u32 = 0o600;

/// Durable storage for the single opaque session token.
///
/// The token is never inspected. A backend that cannot be read (locked
/// keychain, unreadable file) reports the token as absent rather than
/// failing, so callers only ever see "have a token" or "don't".
pub trait TokenStore: Send + Sync {
    /// Read the stored token, if any.
    fn get(&self) -> Option<String>;

    /// Persist a token, replacing any previous value.
    fn set(&self, token: &str) -> Result<()>;

    /// Erase the stored token. Clearing an empty store succeeds.
    fn clear(&self) -> Result<()>;
}

/// Token storage backed by the OS keychain.
pub struct KeyringTokenStore {
    service: String,
}

impl KeyringTokenStore {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    /// Use a custom keychain service name (one per API host, for instance).
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(&self.service, TOKEN_KEY).context("Failed to create keyring entry")
    }
}

impl Default for KeyringTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore for KeyringTokenStore {
    fn get(&self) -> Option<String> {
        let entry = match self.entry() {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Keychain unavailable, treating token as absent");
                return None;
            }
        };
        match entry.get_password() {
            Ok(token) => Some(token),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                warn!(error = %e, "Failed to read token from keychain");
                None
            }
        }
    }

    fn set(&self, token: &str) -> Result<()> {
        self.entry()?
            .set_password(token)
            .context("Failed to store token in keychain")
    }

    fn clear(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete token from keychain"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenFile {
    #[serde(rename = "authToken")]
    auth_token: String,
}

/// Token storage backed by a small JSON file, for machines without a keychain.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self) -> Option<String> {
        if !self.path.exists() {
            return None;
        }
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!(error = %e, path = %self.path.display(), "Failed to read token file");
                return None;
            }
        };
        match serde_json::from_str::<TokenFile>(&contents) {
            Ok(file) => Some(file.auth_token),
            Err(e) => {
                warn!(error = %e, path = %self.path.display(), "Corrupt token file, ignoring");
                None
            }
        }
    }

    fn set(&self, token: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create token directory")?;
        }
        let contents = serde_json::to_string(&TokenFile {
            auth_token: token.to_string(),
        })?;
        write_private(&self.path, &contents).context("Failed to write token file")?;
        debug!(path = %self.path.display(), "Token written");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path).context("Failed to remove token file")?;
        }
        Ok(())
    }
}

/// Write `contents` to `path`, creating or truncating it, with permissions
/// restricted to the owner. An existing file is tightened too.
fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(TOKEN_FILE_MODE);
    }

    let mut file = options.open(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(TOKEN_FILE_MODE))?;
    }
    file.write_all(contents.as_bytes())
}

/// Process-local token storage. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> Option<String> {
        self.token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set(&self, token: &str) -> Result<()> {
        *self
            .token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self
            .token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryTokenStore::new();
        assert!(store.get().is_none());

        store.set("abc123").unwrap();
        assert_eq!(store.get().as_deref(), Some("abc123"));

        store.clear().unwrap();
        assert!(store.get().is_none());
    }

    #[test]
    fn test_memory_store_clear_is_idempotent() {
        let store = MemoryTokenStore::new();
        assert!(store.clear().is_ok());
        assert!(store.clear().is_ok());
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("token.json");

        FileTokenStore::new(path.clone()).set("t1").unwrap();

        let reopened = FileTokenStore::new(path.clone());
        assert_eq!(reopened.get().as_deref(), Some("t1"));

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"authToken\""));
    }

    #[test]
    fn test_file_store_missing_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("token.json"));
        assert!(store.get().is_none());
        assert!(store.clear().is_ok());
    }

    #[test]
    fn test_file_store_corrupt_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, "not json").unwrap();

        let store = FileTokenStore::new(path);
        assert!(store.get().is_none());
    }

    #[test]
    fn test_file_store_clear_removes_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("token.json"));
        store.set("t1").unwrap();
        store.clear().unwrap();
        assert!(store.get().is_none());
        assert!(!store.path().exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        let store = FileTokenStore::new(path.clone());

        store.set("t1").unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        // A file left world-readable by something else is tightened on write.
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
        store.set("t2").unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(store.get().as_deref(), Some("t2"));
    }
}
