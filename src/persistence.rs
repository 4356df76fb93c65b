use crate::config::APP_DIR;
use crate::models::{push_recent, ProjectCommand, RecentProject, Snapshot};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

pub const LAST_SESSION_KEY: &str = "last-session";
pub const RECENT_PROJECTS_KEY: &str = "recent-projects";
const PROJECT_COMMANDS_PREFIX: &str = "project-commands:";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored record is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("could not find a data directory")]
    NoStorageDir,
}

/// Durable string records keyed by name.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// One pretty-printed JSON file per key.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store under the platform data directory.
    pub fn open_default() -> Result<Self, StoreError> {
        Ok(Self::new(data_dir()?))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_key(key)))
    }
}

impl KvStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)?;
        }
        // Write then rename so a crash never leaves half a record behind.
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.remove(key);
        Ok(())
    }
}

pub fn data_dir() -> Result<PathBuf, StoreError> {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR))
        .ok_or(StoreError::NoStorageDir)
}

/// Keys contain paths; keep file names portable and reversible.
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

fn save_json<T: Serialize + ?Sized>(store: &dyn KvStore, key: &str, value: &T) -> Result<(), StoreError> {
    let contents = serde_json::to_string_pretty(value)?;
    store.put(key, &contents)
}

/// Missing and unreadable records both come back as `None`; the latter is logged.
fn load_json<T: DeserializeOwned>(store: &dyn KvStore, key: &str) -> Option<T> {
    let contents = match store.get(key) {
        Ok(Some(contents)) => contents,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!(key, error = %e, "could not read stored record");
            return None;
        }
    };
    match serde_json::from_str(&contents) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, error = %e, "ignoring unreadable stored record");
            None
        }
    }
}

pub fn save_last_session(store: &dyn KvStore, snapshot: &Snapshot) -> Result<(), StoreError> {
    save_json(store, LAST_SESSION_KEY, snapshot)
}

pub fn load_last_session(store: &dyn KvStore) -> Option<Snapshot> {
    load_json(store, LAST_SESSION_KEY)
}

pub fn load_recent(store: &dyn KvStore) -> Vec<RecentProject> {
    load_json(store, RECENT_PROJECTS_KEY).unwrap_or_default()
}

/// Move `path` to the front of the recent list and persist it. Returns the new list.
pub fn record_recent(
    store: &dyn KvStore,
    path: &Path,
    name: Option<String>,
    limit: usize,
) -> Result<Vec<RecentProject>, StoreError> {
    let mut recent = load_recent(store);
    push_recent(&mut recent, RecentProject::new(path.to_path_buf(), name), limit);
    save_json(store, RECENT_PROJECTS_KEY, &recent)?;
    Ok(recent)
}

fn project_commands_key(path: &Path) -> String {
    format!("{PROJECT_COMMANDS_PREFIX}{}", path.display())
}

pub fn load_project_commands(store: &dyn KvStore, path: &Path) -> Vec<ProjectCommand> {
    load_json(store, &project_commands_key(path)).unwrap_or_default()
}

pub fn save_project_commands(
    store: &dyn KvStore,
    path: &Path,
    commands: &[ProjectCommand],
) -> Result<(), StoreError> {
    let key = project_commands_key(path);
    if commands.is_empty() {
        return store.delete(&key);
    }
    save_json(store, &key, commands)
}
