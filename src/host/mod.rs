/// Host side of the integration: everything the water temperature logic
/// consumes but does not own.
///
/// - `config_entries`  - entry records, load state, update listeners
/// - `data`            - per-entry runtime registry
/// - `entity_registry` - unique id → entity id, device grouping
/// - `states`          - last written state per entity
///
/// `Host` ties these together with the data source built on the shared HTTP
/// client and drives entry setup, including the retry schedule for entries
/// that are not ready. Retries scheduled after a failed reload run as
/// background tasks that `unload_entry` and `shutdown` cancel.

pub mod config_entries;
pub mod data;
pub mod entity_registry;
pub mod states;

use crate::config::Settings;
use crate::config_flow::{ConfigFlow, FlowResult, UserInput};
use crate::entry::{self, EntryRuntime};
use crate::ingest::{OmwClient, WaterSource};
use crate::model::{SetupError, UpdateError, DOMAIN, UPDATE_INTERVAL};
use config_entries::{ConfigEntries, ConfigEntry, EntryState};
use data::IntegrationData;
use entity_registry::EntityRegistry;
use serde_json::{Map, Value};
use states::StateMachine;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

const USER_AGENT: &str = concat!("vizhomerseklet/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum HostError {
    #[error("unknown config entry {0}")]
    UnknownEntry(String),

    #[error("config flow aborted: {0}")]
    FlowAborted(String),

    #[error("config entry storage error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config entry storage is malformed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error(transparent)]
    Setup(#[from] SetupError),
}

// ---------------------------------------------------------------------------
// Retry schedule
// ---------------------------------------------------------------------------

/// Delay before setup attempt `attempt + 1`: 10 s, 20 s, 40 s, then 80 s
/// for every further attempt.
pub fn retry_delay(attempt: u32) -> Duration {
    Duration::from_secs(5 * 2u64.pow(attempt.clamp(1, 4)))
}

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

pub struct Host {
    pub config_entries: ConfigEntries,
    pub data: IntegrationData<Arc<EntryRuntime>>,
    pub entity_registry: EntityRegistry,
    pub states: StateMachine,
    source: Arc<dyn WaterSource>,
    update_interval: Duration,
    /// Background setup retries, keyed by entry id.
    pending_retries: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl Host {
    /// Host for the daemon: OMW fetcher on a shared HTTP client and config
    /// entries loaded from the configured storage path.
    pub fn new(settings: &Settings) -> Result<Self, HostError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(HostError::HttpClient)?;
        let source = Arc::new(OmwClient::with_endpoint(
            http,
            settings.api.url.clone(),
            settings.request_timeout(),
        ));
        let config_entries = match &settings.storage.path {
            Some(path) => ConfigEntries::load(path)?,
            None => ConfigEntries::in_memory(),
        };

        let mut host = Self::with_source(source, settings.update_interval());
        host.config_entries = config_entries;
        Ok(host)
    }

    /// Host around an arbitrary data source, with in-memory entries.
    pub fn with_source(source: Arc<dyn WaterSource>, update_interval: Duration) -> Self {
        Self {
            config_entries: ConfigEntries::in_memory(),
            data: IntegrationData::new(),
            entity_registry: EntityRegistry::new(),
            states: StateMachine::new(),
            source,
            update_interval,
            pending_retries: Mutex::new(HashMap::new()),
        }
    }

    pub fn source(&self) -> Arc<dyn WaterSource> {
        Arc::clone(&self.source)
    }

    pub fn update_interval(&self) -> Duration {
        self.update_interval
    }

    pub fn entry_runtime(&self, entry_id: &str) -> Option<Arc<EntryRuntime>> {
        self.data.get(entry_id)
    }

    // --- Config flow --------------------------------------------------------

    /// Runs the user step. A `CreateEntry` result has already been stored
    /// when this returns.
    pub fn start_config_flow(&self, user_input: Option<&UserInput>) -> Result<FlowResult, HostError> {
        let current = self.config_entries.entries(DOMAIN);
        let result = ConfigFlow::new(&current).step_user(user_input);

        if let FlowResult::CreateEntry {
            title,
            data,
            unique_id,
            version,
            ..
        } = &result
        {
            if self.config_entries.has_unique_id(DOMAIN, unique_id) {
                return Err(HostError::FlowAborted("already_configured".to_string()));
            }
            let entry = ConfigEntry::new(DOMAIN, title, *version, data.clone(), Some(unique_id.clone()));
            self.config_entries.add(entry)?;
        }

        Ok(result)
    }

    /// Walks the whole flow (form, then empty submission) and returns the
    /// created entry.
    pub fn configure(&self) -> Result<ConfigEntry, HostError> {
        for user_input in [None, Some(UserInput::new())] {
            match self.start_config_flow(user_input.as_ref())? {
                FlowResult::Abort { reason } => return Err(HostError::FlowAborted(reason)),
                FlowResult::Form { step_id, .. } => {
                    log::debug!("Config flow showing step '{}'", step_id);
                }
                FlowResult::CreateEntry { .. } => {
                    return self
                        .config_entries
                        .entries(DOMAIN)
                        .pop()
                        .ok_or_else(|| HostError::UnknownEntry(DOMAIN.to_string()));
                }
            }
        }
        Err(HostError::FlowAborted("flow did not create an entry".to_string()))
    }

    // --- Entry lifecycle ----------------------------------------------------

    /// One setup attempt. On `NotReady` the entry is left in `SetupRetry`
    /// with nothing registered.
    pub async fn setup_entry(self: &Arc<Self>, entry_id: &str) -> Result<(), HostError> {
        let entry = self
            .config_entries
            .get(entry_id)
            .ok_or_else(|| HostError::UnknownEntry(entry_id.to_string()))?;
        if self.data.contains(entry_id) {
            return Ok(());
        }

        let host = Arc::clone(self);
        let task_entry = entry.clone();
        let outcome = tokio::spawn(async move { entry::setup_entry(&host, &task_entry).await })
            .await
            .unwrap_or_else(|e| Err(SetupError::NotReady(UpdateError::Unexpected(e.to_string()))));

        match outcome {
            Ok(()) => {
                self.config_entries.set_state(entry_id, EntryState::Ready)?;
                log::info!("Config entry '{}' is ready", entry.title);
                Ok(())
            }
            Err(error) => {
                self.config_entries.set_state(entry_id, EntryState::SetupRetry)?;
                log::warn!("Config entry '{}' not ready yet: {}", entry.title, error);
                Err(error.into())
            }
        }
    }

    /// Sets the entry up, retrying not-ready failures on `retry_delay`
    /// until it succeeds. Other errors end the loop.
    pub async fn setup_entry_with_retry(self: &Arc<Self>, entry_id: &str) -> Result<(), HostError> {
        match self.setup_entry(entry_id).await {
            Err(HostError::Setup(_)) => self.retry_setup(entry_id).await,
            other => other,
        }
    }

    /// Waits `retry_delay(attempt)` before each further setup attempt until
    /// one succeeds or fails with something other than not-ready.
    async fn retry_setup(self: &Arc<Self>, entry_id: &str) -> Result<(), HostError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let delay = retry_delay(attempt);
            log::info!("Retrying setup of {} in {:?}", entry_id, delay);
            tokio::time::sleep(delay).await;

            match self.setup_entry(entry_id).await {
                Err(HostError::Setup(_)) => continue,
                other => return other,
            }
        }
    }

    /// Runs `retry_setup` in the background, replacing any retry already
    /// pending for the entry.
    fn schedule_setup_retry(self: &Arc<Self>, entry_id: &str) {
        let host = Arc::clone(self);
        let id = entry_id.to_string();
        let handle = tokio::spawn(async move {
            if let Err(e) = host.retry_setup(&id).await {
                log::error!("Giving up on setup of {}: {}", id, e);
            }
            host.lock_retries().remove(&id);
        });

        if let Some(previous) = self.lock_retries().insert(entry_id.to_string(), handle) {
            previous.abort();
        }
    }

    fn cancel_setup_retry(&self, entry_id: &str) {
        if let Some(handle) = self.lock_retries().remove(entry_id) {
            handle.abort();
            log::debug!("Cancelled pending setup retry of {}", entry_id);
        }
    }

    pub fn has_pending_retry(&self, entry_id: &str) -> bool {
        self.lock_retries()
            .get(entry_id)
            .is_some_and(|handle| !handle.is_finished())
    }

    fn lock_retries(&self) -> std::sync::MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
        self.pending_retries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns `false` if the entry was not loaded.
    pub fn unload_entry(&self, entry_id: &str) -> Result<bool, HostError> {
        let entry = self
            .config_entries
            .get(entry_id)
            .ok_or_else(|| HostError::UnknownEntry(entry_id.to_string()))?;

        self.cancel_setup_retry(entry_id);
        let unloaded = entry::unload_entry(self, &entry);
        if unloaded {
            self.config_entries.set_state(entry_id, EntryState::Unloaded)?;
            log::info!("Config entry '{}' unloaded", entry.title);
        }
        Ok(unloaded)
    }

    /// Stores new options and fires the entry's update listener, which
    /// reloads it. A reload that fails as not ready leaves the entry in
    /// `SetupRetry` with a background retry on the `retry_delay` schedule.
    pub async fn update_entry(
        self: &Arc<Self>,
        entry_id: &str,
        options: Map<String, Value>,
    ) -> Result<(), HostError> {
        let entry = self.config_entries.update_options(entry_id, options)?;
        if !entry.update_listener {
            return Ok(());
        }

        self.cancel_setup_retry(entry_id);
        match entry::update_listener(self, &entry).await {
            Ok(()) => {
                self.config_entries.set_state(entry_id, EntryState::Ready)?;
                Ok(())
            }
            Err(error) => {
                self.config_entries.set_state(entry_id, EntryState::SetupRetry)?;
                log::warn!("Reload of '{}' failed, will retry: {}", entry.title, error);
                self.schedule_setup_retry(entry_id);
                Err(error.into())
            }
        }
    }

    /// Cancels pending retries and unloads every loaded entry of this
    /// integration.
    pub fn shutdown(&self) {
        for (entry_id, handle) in self.lock_retries().drain() {
            handle.abort();
            log::debug!("Cancelled pending setup retry of {}", entry_id);
        }
        for entry in self.config_entries.entries(DOMAIN) {
            if let Err(e) = self.unload_entry(&entry.entry_id) {
                log::error!("Failed to unload {}: {}", entry.entry_id, e);
            }
        }
    }
}

impl Default for Host {
    fn default() -> Self {
        Self::with_source(
            Arc::new(OmwClient::new(reqwest::Client::new())),
            UPDATE_INTERVAL,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_schedule_doubles_then_caps() {
        let delays: Vec<u64> = (1..=6).map(|a| retry_delay(a).as_secs()).collect();
        assert_eq!(delays, vec![10, 20, 40, 80, 80, 80]);
    }

    #[test]
    fn test_configure_creates_single_entry() {
        let host = Host::default();
        let entry = host.configure().expect("first flow creates the entry");

        assert_eq!(entry.domain, DOMAIN);
        assert_eq!(entry.state, EntryState::Uninitialized);

        let again = host.configure();
        assert!(
            matches!(again, Err(HostError::FlowAborted(ref reason)) if reason == "single_instance_allowed"),
            "got {:?}",
            again
        );
        assert_eq!(host.config_entries.entries(DOMAIN).len(), 1);
    }

    #[test]
    fn test_new_host_takes_settings() {
        let settings = crate::config::parse_settings(
            "[coordinator]\nupdate_interval_minutes = 5\n",
            std::path::Path::new("t.toml"),
        )
        .expect("valid settings");
        let host = Host::new(&settings).expect("client builds");

        assert_eq!(host.update_interval(), Duration::from_secs(300));
        assert!(host.config_entries.storage_path().is_none());
        assert!(host.config_entries.entries(DOMAIN).is_empty());
    }

    #[test]
    fn test_unknown_entry_unload() {
        let host = Host::default();
        assert!(matches!(host.unload_entry("nope"), Err(HostError::UnknownEntry(_))));
    }
}
