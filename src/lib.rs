/// vizhomerseklet: Hungarian water temperature integration.
///
/// Polls the OMW water temperature feed (HungaroMet data for rivers and
/// lakes) and exposes one temperature sensor per water body.
///
/// # Module structure
///
/// ```text
/// vizhomerseklet
/// ├── model       - shared data types (WaterRecord, IdentityKey, error enums)
/// ├── config      - daemon configuration loader (vizhomerseklet.toml)
/// ├── ingest
/// │   ├── omw      - OMW feed client behind the WaterSource trait
/// │   ├── validate - payload shape checks and record coercion
/// │   └── fixtures (test only) - representative API response payloads
/// ├── coordinator - periodic refresh, snapshot fan-out to listeners
/// ├── sensor      - water temperature sensor entities and platform setup
/// ├── config_flow - single-instance, field-less setup flow
/// ├── entry       - config entry setup / unload / reload
/// ├── host        - config entries, entity registry, state machine
/// └── endpoint    - read-only HTTP view of sensors and entry health
/// ```

/// Public modules
pub mod config;
pub mod config_flow;
pub mod coordinator;
pub mod endpoint;
pub mod entry;
pub mod host;
pub mod ingest;
pub mod model;
pub mod sensor;
