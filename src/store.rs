use crate::error::{ClientError, Result};
use crate::record::{Session, User};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const TOKEN_KEY: &str = "biodiversity_token";
pub const USER_KEY: &str = "biodiversity_user";

/// Version written into every credential file.
pub const SCHEMA_VERSION: u32 = 1;

/// Key-value persistence for the session token and cached profile.
pub trait CredentialStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;

    fn token(&self) -> Result<Option<String>> {
        self.get(TOKEN_KEY)
    }

    /// The cached profile. An unparsable record reads as absent.
    fn user(&self) -> Result<Option<User>> {
        let Some(raw) = self.get(USER_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(user) => Ok(Some(user)),
            Err(err) => {
                warn!("Ignoring unreadable cached user record: {}", err);
                Ok(None)
            }
        }
    }

    fn set_user(&self, user: &User) -> Result<()> {
        let raw = serde_json::to_string(user).map_err(|e| ClientError::Storage(e.to_string()))?;
        self.set(USER_KEY, &raw)
    }

    fn save_session(&self, session: &Session) -> Result<()> {
        self.set(TOKEN_KEY, &session.token)?;
        self.set_user(&session.user)
    }

    fn clear(&self) -> Result<()> {
        self.remove(TOKEN_KEY)?;
        self.remove(USER_KEY)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialFile {
    #[serde(default = "legacy_version")]
    schema_version: u32,
    #[serde(default)]
    entries: BTreeMap<String, String>,
}

fn legacy_version() -> u32 {
    1
}

pub fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("USERPROFILE").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn default_store_path() -> PathBuf {
    home_dir().join(".fieldlog").join("credentials.json")
}

/// JSON file backed store. Every write replaces the file atomically.
pub struct FileCredentialStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(&self) -> Result<CredentialFile> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(CredentialFile::default());
            }
            Err(err) => {
                return Err(ClientError::Storage(format!(
                    "failed to read {}: {err}",
                    self.path.display()
                )));
            }
        };
        let file: CredentialFile = serde_json::from_slice(&data).map_err(|err| {
            ClientError::Storage(format!("failed to parse {}: {err}", self.path.display()))
        })?;
        if file.schema_version > SCHEMA_VERSION {
            warn!(
                "Credential file {} has unknown schema_version {}; ignoring it",
                self.path.display(),
                file.schema_version
            );
            return Ok(CredentialFile::default());
        }
        Ok(file)
    }

    fn write_file(&self, file: &CredentialFile) -> Result<()> {
        let storage_err =
            |err: std::io::Error| ClientError::Storage(format!("{}: {err}", self.path.display()));
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir).map_err(storage_err)?;
            }
        }
        let bytes =
            serde_json::to_vec_pretty(file).map_err(|e| ClientError::Storage(e.to_string()))?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, bytes).map_err(storage_err)?;
        fs::rename(&tmp_path, &self.path).map_err(storage_err)?;
        debug!("Wrote credentials to {}", self.path.display());
        Ok(())
    }

    fn update(&self, apply: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| ClientError::Storage("credential store lock poisoned".to_string()))?;
        let mut file = self.read_file()?;
        apply(&mut file.entries);
        file.schema_version = SCHEMA_VERSION;
        self.write_file(&file)
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| ClientError::Storage("credential store lock poisoned".to_string()))?;
        Ok(self.read_file()?.entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        self.update(|entries| {
            entries.remove(key);
        })
    }
}

/// In-process store, used by tests and short-lived embeddings.
#[derive(Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| ClientError::Storage("credential store lock poisoned".to_string()))
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries()?.remove(key);
        Ok(())
    }
}
