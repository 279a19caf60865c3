/// Session state and pluggable key-value storage
use crate::lock::StoreLockManager;
use keyring::Entry;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

/// Storage key for the bearer credential
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Storage key for the identity credential
pub const ID_TOKEN_KEY: &str = "id_token";

/// Storage key for the "next login must be interactive" flag
pub const FORCE_LOGIN_KEY: &str = "is_fullLogout";

const FLAG_SET: &str = "true";
const FLAG_CLEARED: &str = "false";

const SESSION_FILE: &str = "session.json";
const SESSION_TEMP_FILE: &str = "session.json.tmp";

/// Persisted session as seen by the controller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: Option<String>,
    pub id_token: Option<String>,
    pub force_login: bool,
}

impl Session {
    /// A session is authenticated exactly when an access token is stored
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }
}

/// Tokens returned by the backend's code exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Storage interface for session values
///
/// Values are opaque strings, mirroring browser local storage.
pub trait KeyValueStore: Send + Sync {
    /// Get a value by key
    fn get(&self, key: &str) -> Result<Option<String>, String>;

    /// Set a value
    fn set(&self, key: &str, value: &str) -> Result<(), String>;

    /// Remove a value. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), String>;
}

/// In-memory storage implementation
///
/// Clones share the same underlying map, so a test can keep one handle
/// while the controller owns another.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStore {
    /// Create a new, empty memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, String> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), String> {
        self.values.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), String> {
        self.values.write().remove(key);
        Ok(())
    }
}

/// File-based storage implementation using XDG conventions
///
/// All values live in a single JSON object file. Writes are a locked
/// read-modify-write that replaces the file by rename, so concurrent harness
/// processes neither lose updates nor read a partially written file.
#[derive(Debug, Clone)]
pub struct FileStore {
    base_path: PathBuf,
    locks: StoreLockManager,
}

impl FileStore {
    /// Create a new file store for an application
    ///
    /// Respects XDG Base Directory Specification on Unix systems:
    /// - Checks $XDG_DATA_HOME environment variable first
    /// - Falls back to the platform data directory
    ///
    /// Stores values in `<data_dir>/<app_name>/session.json`.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use codeflow::session::FileStore;
    ///
    /// let store = FileStore::new("my-harness").unwrap();
    /// ```
    pub fn new(app_name: &str) -> Result<Self, String> {
        let base_dir = if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
            PathBuf::from(xdg_data)
        } else {
            dirs::data_dir().ok_or_else(|| "Could not determine data directory".to_string())?
        };

        Self::with_path(base_dir.join(app_name))
    }

    /// Create a file store rooted at a custom directory
    pub fn with_path(path: PathBuf) -> Result<Self, String> {
        fs::create_dir_all(&path)
            .map_err(|e| format!("Failed to create storage directory: {}", e))?;

        let locks = StoreLockManager::new(path.clone())
            .map_err(|e| format!("Failed to prepare store lock: {}", e))?;

        Ok(Self {
            base_path: path,
            locks,
        })
    }

    fn values_path(&self) -> PathBuf {
        self.base_path.join(SESSION_FILE)
    }

    fn load_values(&self) -> Result<HashMap<String, String>, String> {
        let path = self.values_path();
        if !path.exists() {
            return Ok(HashMap::new());
        }

        let content =
            fs::read_to_string(&path).map_err(|e| format!("Failed to read session file: {}", e))?;

        serde_json::from_str(&content).map_err(|e| format!("Failed to parse session file: {}", e))
    }

    fn save_values(&self, values: &HashMap<String, String>) -> Result<(), String> {
        let content = serde_json::to_string_pretty(values)
            .map_err(|e| format!("Failed to serialize session: {}", e))?;

        // Only called under the store lock, so the temp file has one writer
        let temp_path = self.base_path.join(SESSION_TEMP_FILE);
        fs::write(&temp_path, content)
            .map_err(|e| format!("Failed to write session file: {}", e))?;

        fs::rename(&temp_path, self.values_path())
            .map_err(|e| format!("Failed to replace session file: {}", e))
    }

    fn update<F>(&self, change: F) -> Result<(), String>
    where
        F: FnOnce(&mut HashMap<String, String>),
    {
        let _lock = self
            .locks
            .acquire_lock("session")
            .map_err(|e| format!("Failed to lock session file: {}", e))?;

        let mut values = self.load_values()?;
        change(&mut values);
        self.save_values(&values)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, String> {
        Ok(self.load_values()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), String> {
        self.update(|values| {
            values.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), String> {
        self.update(|values| {
            values.remove(key);
        })
    }
}

/// Secure storage using the OS credential manager
///
/// This storage backend uses platform-specific secure storage:
/// - macOS: Keychain
/// - Windows: Credential Manager
/// - Linux: Secret Service API (libsecret)
///
/// Each key is its own keyring entry under the service `codeflow-<app_name>`.
#[derive(Debug, Clone)]
pub struct SecureStore {
    app_name: String,
}

impl SecureStore {
    /// Create a new secure store
    ///
    /// # Example
    ///
    /// ```
    /// use codeflow::session::SecureStore;
    ///
    /// let store = SecureStore::new("my-harness");
    /// ```
    pub fn new(app_name: &str) -> Self {
        Self {
            app_name: app_name.to_string(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry, String> {
        let service = format!("codeflow-{}", self.app_name);
        Entry::new(&service, key).map_err(|e| format!("Failed to create keyring entry: {}", e))
    }
}

impl KeyValueStore for SecureStore {
    fn get(&self, key: &str) -> Result<Option<String>, String> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(format!("Failed to read from keyring: {}", e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), String> {
        self.entry(key)?
            .set_password(value)
            .map_err(|e| format!("Failed to save to keyring: {}", e))
    }

    fn remove(&self, key: &str) -> Result<(), String> {
        match self.entry(key)?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(format!("Failed to delete from keyring: {}", e)),
        }
    }
}

/// Typed view of the session keys over any [`KeyValueStore`]
pub struct SessionStore<S: KeyValueStore> {
    storage: Arc<S>,
}

impl<S: KeyValueStore> Clone for SessionStore<S> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
        }
    }
}

impl<S: KeyValueStore> SessionStore<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Read the whole session in one go
    pub fn load(&self) -> Result<Session, String> {
        Ok(Session {
            access_token: self.access_token()?,
            id_token: self.id_token()?,
            force_login: self.force_login()?,
        })
    }

    pub fn access_token(&self) -> Result<Option<String>, String> {
        self.storage.get(ACCESS_TOKEN_KEY)
    }

    pub fn id_token(&self) -> Result<Option<String>, String> {
        self.storage.get(ID_TOKEN_KEY)
    }

    /// Persist the tokens of a successful exchange
    ///
    /// `id_token` is written only when the backend returned one; a stale
    /// identity token from an earlier session is dropped otherwise.
    pub fn save_tokens(&self, tokens: &TokenSet) -> Result<(), String> {
        self.storage.set(ACCESS_TOKEN_KEY, &tokens.access_token)?;
        match &tokens.id_token {
            Some(id_token) => self.storage.set(ID_TOKEN_KEY, id_token),
            None => self.storage.remove(ID_TOKEN_KEY),
        }
    }

    /// Remove both tokens. The force-login flag is left untouched.
    pub fn clear_tokens(&self) -> Result<(), String> {
        // Attempt both removals even if the first one fails
        let access = self.storage.remove(ACCESS_TOKEN_KEY);
        let id = self.storage.remove(ID_TOKEN_KEY);
        access.and(id)
    }

    pub fn force_login(&self) -> Result<bool, String> {
        Ok(self.storage.get(FORCE_LOGIN_KEY)?.as_deref() == Some(FLAG_SET))
    }

    pub fn set_force_login(&self, force: bool) -> Result<(), String> {
        self.storage
            .set(FORCE_LOGIN_KEY, if force { FLAG_SET } else { FLAG_CLEARED })
    }

    /// Consume the force-login flag
    ///
    /// Returns whether it was set; a set flag is written back as `"false"`.
    pub fn take_force_login(&self) -> Result<bool, String> {
        let forced = self.force_login()?;
        if forced {
            self.set_force_login(false)?;
        }
        Ok(forced)
    }
}
