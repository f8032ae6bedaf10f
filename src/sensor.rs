/// Water temperature sensor platform.
///
/// One `WaterTemperatureSensor` per `(nameOfRiver, type)` seen when the
/// entry is set up. Sensors keep no copy of the data: every read looks up
/// their identity key in the coordinator's current snapshot, so a failed
/// refresh leaves them showing the last fetched value.
///
/// Sensors are grouped under one synthetic device per water type
/// ("Folyók" for rivers, "Tavak" otherwise).

use crate::coordinator::UpdateCoordinator;
use crate::host::entity_registry::{DeviceInfo, EntityRegistry, EntityRequest};
use crate::host::states::{EntityState, StateMachine};
use crate::model::{find_record, IdentityKey, WaterRecord, WaterType, DOMAIN};
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub const ENTITY_DOMAIN: &str = "sensor";

pub const ICON_LOW: &str = "mdi:thermometer-low";
pub const ICON_HIGH: &str = "mdi:thermometer-high";
pub const ICON_NEUTRAL: &str = "mdi:thermometer";

const LOW_TEMPERATURE: f64 = 10.0;
const HIGH_TEMPERATURE: f64 = 15.0;

const MANUFACTURER: &str = "HungaroMet";
const MODEL: &str = "Vízhőmérséklet szenzor";
const SW_VERSION: &str = "1.0.0";

// ---------------------------------------------------------------------------
// Sensor entity
// ---------------------------------------------------------------------------

pub struct WaterTemperatureSensor {
    coordinator: Arc<UpdateCoordinator>,
    key: IdentityKey,
    entity_id: String,
    unique_id: String,
    native_unit: String,
}

impl WaterTemperatureSensor {
    pub fn new(coordinator: Arc<UpdateCoordinator>, record: &WaterRecord, entity_id: String) -> Self {
        Self {
            coordinator,
            key: record.key(),
            entity_id,
            unique_id: unique_id_for(&record.key()),
            native_unit: record.unit.clone(),
        }
    }

    pub fn key(&self) -> &IdentityKey {
        &self.key
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn native_unit_of_measurement(&self) -> &str {
        &self.native_unit
    }

    pub fn device_class(&self) -> &'static str {
        "temperature"
    }

    pub fn state_class(&self) -> &'static str {
        "measurement"
    }

    /// Name shown to users: device name followed by the water body name.
    pub fn friendly_name(&self) -> String {
        format!("{} {}", device_name(&self.key.water_type), self.key.name)
    }

    /// True while the coordinator holds a dataset. A failed refresh keeps
    /// the previous one, so sensors stay available on stale data; the
    /// failure shows up in the coordinator's snapshot instead.
    pub fn available(&self) -> bool {
        !self.coordinator.snapshot().dataset.is_empty()
    }

    /// Current `avgTemp` for this water body, `None` when the record is
    /// gone from the dataset or its temperature is unknown.
    pub fn native_value(&self) -> Option<f64> {
        let snapshot = self.coordinator.snapshot();
        find_record(&snapshot.dataset, &self.key).and_then(|record| record.avg_temp)
    }

    pub fn icon(&self) -> &'static str {
        icon_for(self.native_value())
    }

    /// `type` label plus one `location → "value unit"` pair per
    /// `lastMeasurement` entry. Empty when the record is gone.
    pub fn extra_state_attributes(&self) -> Map<String, Value> {
        let snapshot = self.coordinator.snapshot();
        let Some(record) = find_record(&snapshot.dataset, &self.key) else {
            return Map::new();
        };

        let mut attributes = Map::new();
        attributes.insert("type".to_string(), Value::from(record.water_type.label()));
        for measurement in &record.last_measurements {
            attributes.insert(
                measurement.location.clone(),
                Value::from(format!("{} {}", measurement.value, record.unit)),
            );
        }
        attributes
    }

    pub fn device_info(&self) -> DeviceInfo {
        device_info_for(&self.key.water_type)
    }

    /// Full display state as written to the state machine.
    pub fn state(&self) -> EntityState {
        let value = self.native_value();
        let mut attributes = self.extra_state_attributes();
        attributes.insert(
            "unit_of_measurement".to_string(),
            Value::from(self.native_unit.clone()),
        );
        attributes.insert("device_class".to_string(), Value::from(self.device_class()));
        attributes.insert("state_class".to_string(), Value::from(self.state_class()));
        attributes.insert("icon".to_string(), Value::from(icon_for(value)));
        attributes.insert("friendly_name".to_string(), Value::from(self.friendly_name()));

        let now = Utc::now();
        EntityState {
            entity_id: self.entity_id.clone(),
            state: value.map_or_else(|| "unknown".to_string(), |v| v.to_string()),
            attributes,
            available: self.available(),
            last_changed: now,
            last_updated: now,
        }
    }
}

/// `magyar_vizek_{type}_{lowercased name}`.
pub fn unique_id_for(key: &IdentityKey) -> String {
    format!("magyar_vizek_{}_{}", key.water_type, key.name.to_lowercase())
}

/// Below 10° low, above 15° high, anything else (unknown included) neutral.
pub fn icon_for(value: Option<f64>) -> &'static str {
    match value {
        Some(t) if t < LOW_TEMPERATURE => ICON_LOW,
        Some(t) if t > HIGH_TEMPERATURE => ICON_HIGH,
        _ => ICON_NEUTRAL,
    }
}

fn device_name(water_type: &WaterType) -> &'static str {
    match water_type {
        WaterType::River => "Folyók",
        _ => "Tavak",
    }
}

pub fn device_info_for(water_type: &WaterType) -> DeviceInfo {
    DeviceInfo {
        identifiers: vec![(DOMAIN.to_string(), format!("magyar_vizek_{}", water_type))],
        name: device_name(water_type).to_string(),
        manufacturer: MANUFACTURER.to_string(),
        model: MODEL.to_string(),
        sw_version: SW_VERSION.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

/// The sensors of one config entry plus the task that rewrites their
/// states whenever the coordinator publishes.
pub struct SensorPlatform {
    sensors: Arc<Vec<WaterTemperatureSensor>>,
    states: StateMachine,
    listener: JoinHandle<()>,
}

impl SensorPlatform {
    pub fn sensors(&self) -> &[WaterTemperatureSensor] {
        &self.sensors
    }

    pub fn sensor(&self, entity_id: &str) -> Option<&WaterTemperatureSensor> {
        self.sensors.iter().find(|s| s.entity_id == entity_id)
    }

    /// Stops listening and removes the sensors' states. Registry entries
    /// are kept so a later setup reuses the same entity ids.
    pub fn unload(&self) {
        self.listener.abort();
        for sensor in self.sensors.iter() {
            self.states.remove(&sensor.entity_id);
        }
        log::debug!("Unloaded {} sensors", self.sensors.len());
    }
}

/// Creates one sensor per distinct identity key in the coordinator's
/// current dataset, registers them, writes their initial states and
/// subscribes them to coordinator updates.
pub fn setup_sensor_platform(
    config_entry_id: &str,
    coordinator: &Arc<UpdateCoordinator>,
    registry: &EntityRegistry,
    states: &StateMachine,
) -> SensorPlatform {
    let snapshot = coordinator.snapshot();
    let mut seen: HashSet<IdentityKey> = HashSet::new();
    let mut sensors = Vec::new();

    for record in snapshot.dataset.iter() {
        if !seen.insert(record.key()) {
            log::debug!("Skipping duplicate record for {}", record.key());
            continue;
        }

        let key = record.key();
        let unique_id = unique_id_for(&key);
        let device = registry.get_or_create_device(config_entry_id, &device_info_for(&key.water_type));
        let object_id = format!("{} {}", device.name, key.name);
        let entry = registry.get_or_create(&EntityRequest {
            domain: ENTITY_DOMAIN,
            platform: DOMAIN,
            unique_id: &unique_id,
            config_entry_id,
            suggested_object_id: &object_id,
            device_id: Some(&device.id),
            original_name: &key.name,
        });

        sensors.push(WaterTemperatureSensor::new(Arc::clone(coordinator), record, entry.entity_id));
    }

    let sensors = Arc::new(sensors);
    for sensor in sensors.iter() {
        states.set(sensor.state());
    }
    log::info!("Added {} water temperature sensors", sensors.len());

    let listener = {
        let sensors = Arc::clone(&sensors);
        let states = states.clone();
        let mut updates = coordinator.subscribe();
        tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                for sensor in sensors.iter() {
                    states.set(sensor.state());
                }
            }
        })
    };

    SensorPlatform {
        sensors,
        states: states.clone(),
        listener,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
