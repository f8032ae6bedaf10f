/// Entity and device registry.
///
/// Maps each entity's `unique_id` to a stable `entity_id` and groups
/// entities under devices. Registrations outlive unload/reload, so a
/// water body keeps its entity id for the lifetime of the process.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Device metadata an entity supplies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    /// `(domain, identifier)` pairs; a device matches if any pair matches.
    pub identifiers: Vec<(String, String)>,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub sw_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceEntry {
    pub id: String,
    pub identifiers: Vec<(String, String)>,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub sw_version: String,
    pub config_entries: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryEntry {
    pub entity_id: String,
    pub unique_id: String,
    /// Integration that provides the entity.
    pub platform: String,
    pub config_entry_id: String,
    pub device_id: Option<String>,
    pub original_name: String,
}

/// What a platform asks the registry for.
#[derive(Debug, Clone)]
pub struct EntityRequest<'a> {
    /// Entity domain, e.g. `"sensor"`.
    pub domain: &'a str,
    pub platform: &'a str,
    pub unique_id: &'a str,
    pub config_entry_id: &'a str,
    pub suggested_object_id: &'a str,
    pub device_id: Option<&'a str>,
    pub original_name: &'a str,
}

#[derive(Debug, Default)]
struct Registry {
    /// Keyed by `(platform, unique_id)`.
    entities: BTreeMap<(String, String), RegistryEntry>,
    devices: Vec<DeviceEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    inner: Arc<RwLock<Registry>>,
}

// ---------------------------------------------------------------------------
// Registry operations
// ---------------------------------------------------------------------------

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the device matching any of `info.identifiers`, creating it
    /// if none does. The config entry is linked either way.
    pub fn get_or_create_device(&self, config_entry_id: &str, info: &DeviceInfo) -> DeviceEntry {
        let mut registry = self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(device) = registry
            .devices
            .iter_mut()
            .find(|d| d.identifiers.iter().any(|id| info.identifiers.contains(id)))
        {
            device.config_entries.insert(config_entry_id.to_string());
            return device.clone();
        }

        let id = info
            .identifiers
            .first()
            .map(|(domain, identifier)| slugify(&format!("{} {}", domain, identifier)))
            .unwrap_or_else(|| slugify(&info.name));
        let device = DeviceEntry {
            id,
            identifiers: info.identifiers.clone(),
            name: info.name.clone(),
            manufacturer: info.manufacturer.clone(),
            model: info.model.clone(),
            sw_version: info.sw_version.clone(),
            config_entries: BTreeSet::from([config_entry_id.to_string()]),
        };
        log::debug!("Registered device {} ({})", device.name, device.id);
        registry.devices.push(device.clone());
        device
    }

    /// Returns the existing registration for `(platform, unique_id)` or
    /// registers a new entity id derived from the suggested object id,
    /// suffixed `_2`, `_3`, … on collision.
    pub fn get_or_create(&self, request: &EntityRequest<'_>) -> RegistryEntry {
        let mut registry = self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        let key = (request.platform.to_string(), request.unique_id.to_string());

        if let Some(existing) = registry.entities.get_mut(&key) {
            existing.config_entry_id = request.config_entry_id.to_string();
            existing.device_id = request.device_id.map(str::to_string);
            return existing.clone();
        }

        let base = format!("{}.{}", request.domain, slugify(request.suggested_object_id));
        let mut entity_id = base.clone();
        let mut suffix = 2;
        while registry.entities.values().any(|e| e.entity_id == entity_id) {
            entity_id = format!("{}_{}", base, suffix);
            suffix += 1;
        }

        let entry = RegistryEntry {
            entity_id,
            unique_id: request.unique_id.to_string(),
            platform: request.platform.to_string(),
            config_entry_id: request.config_entry_id.to_string(),
            device_id: request.device_id.map(str::to_string),
            original_name: request.original_name.to_string(),
        };
        log::debug!("Registered {} for {}", entry.entity_id, entry.unique_id);
        registry.entities.insert(key, entry.clone());
        entry
    }

    pub fn entities_for_config_entry(&self, config_entry_id: &str) -> Vec<RegistryEntry> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entities
            .values()
            .filter(|e| e.config_entry_id == config_entry_id)
            .cloned()
            .collect()
    }

    pub fn device(&self, device_id: &str) -> Option<DeviceEntry> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .devices
            .iter()
            .find(|d| d.id == device_id)
            .cloned()
    }

    pub fn devices(&self) -> Vec<DeviceEntry> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .devices
            .clone()
    }
}

/// Lowercase ASCII slug: Hungarian accents folded, runs of anything else
/// collapsed to a single `_`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_separator = false;

    for c in text.chars().flat_map(char::to_lowercase) {
        let folded = match c {
            'á' | 'à' | 'â' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'ö' | 'ő' => 'o',
            'ú' | 'ù' | 'û' | 'ü' | 'ű' => 'u',
            other => other,
        };
        if folded.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('_');
            }
            pending_separator = false;
            slug.push(folded);
        } else {
            pending_separator = true;
        }
    }

    if slug.is_empty() {
        "unnamed".to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request<'a>(unique_id: &'a str, object_id: &'a str) -> EntityRequest<'a> {
        EntityRequest {
            domain: "sensor",
            platform: "magyar_vizhomerseklet",
            unique_id,
            config_entry_id: "entry-1",
            suggested_object_id: object_id,
            device_id: None,
            original_name: object_id,
        }
    }

    fn device_info(identifier: &str, name: &str) -> DeviceInfo {
        DeviceInfo {
            identifiers: vec![("magyar_vizhomerseklet".to_string(), identifier.to_string())],
            name: name.to_string(),
            manufacturer: "HungaroMet".to_string(),
            model: "Vízhőmérséklet szenzor".to_string(),
            sw_version: "1.0.0".to_string(),
        }
    }

    #[test]
    fn test_slugify_folds_hungarian_accents() {
        assert_eq!(slugify("Folyók Tisza"), "folyok_tisza");
        assert_eq!(slugify("Tavak Velencei-tó"), "tavak_velencei_to");
        assert_eq!(slugify("Hármas-Körös"), "harmas_koros");
        assert_eq!(slugify("  Őrség  Szűcs "), "orseg_szucs");
        assert_eq!(slugify("!!!"), "unnamed");
    }

    #[test]
    fn test_same_unique_id_keeps_entity_id() {
        let registry = EntityRegistry::new();
        let first = registry.get_or_create(&request("magyar_vizek_river_tisza", "Folyók Tisza"));
        let again = registry.get_or_create(&request("magyar_vizek_river_tisza", "Folyók Tisza"));

        assert_eq!(first.entity_id, "sensor.folyok_tisza");
        assert_eq!(first, again);
        assert_eq!(registry.entities_for_config_entry("entry-1").len(), 1);
    }

    #[test]
    fn test_colliding_object_ids_get_suffix() {
        let registry = EntityRegistry::new();
        let a = registry.get_or_create(&request("unique_a", "Tisza"));
        let b = registry.get_or_create(&request("unique_b", "Tisza"));
        let c = registry.get_or_create(&request("unique_c", "Tisza"));

        assert_eq!(a.entity_id, "sensor.tisza");
        assert_eq!(b.entity_id, "sensor.tisza_2");
        assert_eq!(c.entity_id, "sensor.tisza_3");
    }

    #[test]
    fn test_devices_are_shared_by_identifier() {
        let registry = EntityRegistry::new();
        let rivers = registry.get_or_create_device("entry-1", &device_info("magyar_vizek_river", "Folyók"));
        let again = registry.get_or_create_device("entry-1", &device_info("magyar_vizek_river", "Folyók"));
        let lakes = registry.get_or_create_device("entry-1", &device_info("magyar_vizek_lake", "Tavak"));

        assert_eq!(rivers.id, again.id);
        assert_ne!(rivers.id, lakes.id);
        assert_eq!(registry.devices().len(), 2);
        assert_eq!(registry.device(&lakes.id).unwrap().name, "Tavak");
    }
}
