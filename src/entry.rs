/// Config entry lifecycle for the water temperature integration.
///
/// ```text
/// Uninitialized ──setup_entry──▶ Ready ──unload_entry──▶ Unloaded
///       │                          ▲                        │
///       └── NotReady (host retries)│                        │
///                                  └──── update_listener ───┘
/// ```
///
/// Setup fetches and validates once. Only a valid dataset gets an entry
/// runtime (coordinator + sensors) registered; any failure leaves nothing
/// behind and is reported as `SetupError::NotReady` so the host retries.

use crate::coordinator::UpdateCoordinator;
use crate::host::config_entries::ConfigEntry;
use crate::host::Host;
use crate::model::{SetupError, DOMAIN};
use crate::sensor::{setup_sensor_platform, SensorPlatform};
use std::sync::Arc;

/// Entity platforms this integration provides.
pub const PLATFORMS: &[&str] = &["sensor"];

/// Everything kept alive for a loaded entry.
pub struct EntryRuntime {
    pub coordinator: Arc<UpdateCoordinator>,
    pub sensors: SensorPlatform,
}

/// Fetches and validates once, registers the entry runtime, sets up the
/// sensor platform and starts the periodic refresh.
///
/// # Errors
/// `SetupError::NotReady` on any fetch or validation failure.
pub async fn setup_entry(host: &Host, entry: &ConfigEntry) -> Result<(), SetupError> {
    let coordinator =
        UpdateCoordinator::first_refresh(DOMAIN, host.source(), host.update_interval()).await?;

    log::debug!(
        "Setting up {:?} for {} with {} records",
        PLATFORMS,
        entry.entry_id,
        coordinator.snapshot().dataset.len()
    );
    let sensors = setup_sensor_platform(
        &entry.entry_id,
        &coordinator,
        &host.entity_registry,
        &host.states,
    );
    coordinator.start();

    host.data.insert(
        &entry.entry_id,
        Arc::new(EntryRuntime {
            coordinator,
            sensors,
        }),
    );

    if let Err(e) = host.config_entries.add_update_listener(&entry.entry_id) {
        log::warn!("Could not register update listener for {}: {}", entry.entry_id, e);
    }

    Ok(())
}

/// Tears down the sensors and the refresh task and drops the entry's
/// dataset. Returns `false` if the entry was not loaded.
pub fn unload_entry(host: &Host, entry: &ConfigEntry) -> bool {
    let Some(runtime) = host.data.remove(&entry.entry_id) else {
        return false;
    };

    runtime.sensors.unload();
    runtime.coordinator.shutdown();

    if let Err(e) = host.config_entries.remove_update_listener(&entry.entry_id) {
        log::warn!("Could not remove update listener for {}: {}", entry.entry_id, e);
    }
    true
}

/// Reacts to an entry update by reloading it.
pub async fn update_listener(host: &Host, entry: &ConfigEntry) -> Result<(), SetupError> {
    log::info!("Reloading {} after configuration update", entry.title);
    unload_entry(host, entry);
    setup_entry(host, entry).await
}
