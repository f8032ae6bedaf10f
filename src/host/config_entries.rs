/// Config-entry store: the records the config flow creates, their load
/// state, and the update-listener hook.
///
/// Records are persisted as JSON when a storage path is configured.
/// Runtime state (`EntryState`, listener registration) is never persisted;
/// every entry starts `Uninitialized` after a restart.

use super::HostError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

const STORAGE_VERSION: u32 = 1;

/// Load state of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    #[default]
    Uninitialized,
    /// Setup failed as not ready; the host will try again.
    SetupRetry,
    Ready,
    Unloaded,
}

/// A configured instance of an integration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub entry_id: String,
    pub domain: String,
    pub title: String,
    pub version: u32,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub options: Map<String, Value>,
    pub unique_id: Option<String>,
    #[serde(skip)]
    pub state: EntryState,
    #[serde(skip)]
    pub update_listener: bool,
}

impl ConfigEntry {
    pub fn new(
        domain: &str,
        title: &str,
        version: u32,
        data: Map<String, Value>,
        unique_id: Option<String>,
    ) -> Self {
        Self {
            entry_id: Uuid::new_v4().to_string(),
            domain: domain.to_string(),
            title: title.to_string(),
            version,
            data,
            options: Map::new(),
            unique_id,
            state: EntryState::Uninitialized,
            update_listener: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntries {
    version: u32,
    entries: Vec<ConfigEntry>,
}

/// Shared handle to the entry records.
#[derive(Debug, Clone, Default)]
pub struct ConfigEntries {
    path: Option<PathBuf>,
    entries: Arc<RwLock<Vec<ConfigEntry>>>,
}

impl ConfigEntries {
    /// In-memory store; nothing is written to disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads records from `path`. A missing file is an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, HostError> {
        let path = path.into();
        let entries = if path.exists() {
            let contents = fs::read_to_string(&path).map_err(|e| HostError::Storage {
                path: path.clone(),
                source: e,
            })?;
            let stored: StoredEntries = serde_json::from_str(&contents)?;
            log::debug!("Loaded {} config entries from {}", stored.entries.len(), path.display());
            stored.entries
        } else {
            Vec::new()
        };

        Ok(Self {
            path: Some(path),
            entries: Arc::new(RwLock::new(entries)),
        })
    }

    pub fn storage_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// All records for `domain`, in creation order.
    pub fn entries(&self, domain: &str) -> Vec<ConfigEntry> {
        self.read()
            .iter()
            .filter(|e| e.domain == domain)
            .cloned()
            .collect()
    }

    pub fn get(&self, entry_id: &str) -> Option<ConfigEntry> {
        self.read().iter().find(|e| e.entry_id == entry_id).cloned()
    }

    pub fn has_unique_id(&self, domain: &str, unique_id: &str) -> bool {
        self.read()
            .iter()
            .any(|e| e.domain == domain && e.unique_id.as_deref() == Some(unique_id))
    }

    pub fn add(&self, entry: ConfigEntry) -> Result<(), HostError> {
        log::info!("Added config entry {} ({})", entry.title, entry.entry_id);
        self.write().push(entry);
        self.save()
    }

    pub fn remove(&self, entry_id: &str) -> Result<Option<ConfigEntry>, HostError> {
        let removed = {
            let mut entries = self.write();
            let index = entries.iter().position(|e| e.entry_id == entry_id);
            index.map(|i| entries.remove(i))
        };
        if removed.is_some() {
            self.save()?;
        }
        Ok(removed)
    }

    /// Replaces the entry's options and persists. Returns the updated
    /// record; firing the update listener is up to the caller.
    pub fn update_options(
        &self,
        entry_id: &str,
        options: Map<String, Value>,
    ) -> Result<ConfigEntry, HostError> {
        let updated = self.modify(entry_id, |entry| entry.options = options)?;
        self.save()?;
        Ok(updated)
    }

    pub fn set_state(&self, entry_id: &str, state: EntryState) -> Result<(), HostError> {
        self.modify(entry_id, |entry| entry.state = state)?;
        log::debug!("Config entry {} is now {:?}", entry_id, state);
        Ok(())
    }

    pub fn add_update_listener(&self, entry_id: &str) -> Result<(), HostError> {
        self.modify(entry_id, |entry| entry.update_listener = true).map(|_| ())
    }

    pub fn remove_update_listener(&self, entry_id: &str) -> Result<(), HostError> {
        self.modify(entry_id, |entry| entry.update_listener = false).map(|_| ())
    }

    fn modify(
        &self,
        entry_id: &str,
        change: impl FnOnce(&mut ConfigEntry),
    ) -> Result<ConfigEntry, HostError> {
        let mut entries = self.write();
        let entry = entries
            .iter_mut()
            .find(|e| e.entry_id == entry_id)
            .ok_or_else(|| HostError::UnknownEntry(entry_id.to_string()))?;
        change(entry);
        Ok(entry.clone())
    }

    fn save(&self) -> Result<(), HostError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let stored = StoredEntries {
            version: STORAGE_VERSION,
            entries: self.read().clone(),
        };
        let contents = serde_json::to_string_pretty(&stored)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| HostError::Storage {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        fs::write(path, contents).map_err(|e| HostError::Storage {
            path: path.clone(),
            source: e,
        })
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<ConfigEntry>> {
        self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<ConfigEntry>> {
        self.entries.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
