/// State machine: the last state each entity wrote, keyed by entity id.
///
/// Written from the async side (sensor listeners), read from the endpoint
/// thread, so it sits behind a plain `RwLock`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Display state of one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityState {
    pub entity_id: String,
    /// Rendered value, or `"unknown"`.
    pub state: String,
    pub attributes: Map<String, Value>,
    pub available: bool,
    /// Last time `state` changed.
    pub last_changed: DateTime<Utc>,
    /// Last time the entity wrote, changed or not.
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct StateMachine {
    states: Arc<RwLock<BTreeMap<String, EntityState>>>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes `state`, keeping `last_changed` when the value is unchanged.
    pub fn set(&self, mut state: EntityState) {
        let mut states = self.states.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = states.get(&state.entity_id) {
            if previous.state == state.state {
                state.last_changed = previous.last_changed;
            }
        }
        states.insert(state.entity_id.clone(), state);
    }

    pub fn get(&self, entity_id: &str) -> Option<EntityState> {
        self.states
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(entity_id)
            .cloned()
    }

    pub fn remove(&self, entity_id: &str) -> Option<EntityState> {
        self.states
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(entity_id)
    }

    /// All states, ordered by entity id.
    pub fn all(&self) -> Vec<EntityState> {
        self.states
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect()
    }

    /// States whose entity id starts with `prefix` (e.g. `"sensor."`).
    pub fn all_in_domain(&self, domain: &str) -> Vec<EntityState> {
        let prefix = format!("{}.", domain);
        self.all()
            .into_iter()
            .filter(|s| s.entity_id.starts_with(&prefix))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn state(entity_id: &str, value: &str, at: DateTime<Utc>) -> EntityState {
        EntityState {
            entity_id: entity_id.to_string(),
            state: value.to_string(),
            attributes: Map::new(),
            available: true,
            last_changed: at,
            last_updated: at,
        }
    }

    #[test]
    fn test_unchanged_value_keeps_last_changed() {
        let states = StateMachine::new();
        let t0 = Utc::now();
        let t1 = t0 + Duration::minutes(30);

        states.set(state("sensor.folyok_tisza", "12.5", t0));
        states.set(state("sensor.folyok_tisza", "12.5", t1));

        let current = states.get("sensor.folyok_tisza").unwrap();
        assert_eq!(current.last_changed, t0);
        assert_eq!(current.last_updated, t1);
    }

    #[test]
    fn test_changed_value_moves_last_changed() {
        let states = StateMachine::new();
        let t0 = Utc::now();
        let t1 = t0 + Duration::minutes(30);

        states.set(state("sensor.folyok_tisza", "12.5", t0));
        states.set(state("sensor.folyok_tisza", "13.0", t1));

        assert_eq!(states.get("sensor.folyok_tisza").unwrap().last_changed, t1);
    }

    #[test]
    fn test_domain_filter_and_remove() {
        let states = StateMachine::new();
        let now = Utc::now();
        states.set(state("sensor.tavak_balaton", "12", now));
        states.set(state("binary_sensor.other", "on", now));

        assert_eq!(states.all().len(), 2);
        assert_eq!(states.all_in_domain("sensor").len(), 1);

        assert!(states.remove("sensor.tavak_balaton").is_some());
        assert!(states.get("sensor.tavak_balaton").is_none());
    }
}
