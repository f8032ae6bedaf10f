/// Shared data types for the water temperature service.
///
/// `WaterRecord` is the typed form of one element of the OMW API `data`
/// array. Records are produced only by `ingest::validate`; everything
/// downstream (coordinator, sensors, endpoint) trusts their shape.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Integration domain, used for unique ids, device identifiers and the
/// config-entry unique id.
pub const DOMAIN: &str = "magyar_vizhomerseklet";

/// Public endpoint serving the current Hungarian water temperatures.
pub const API_URL: &str = "https://api.omw.hu/water_temp_hu.php";

/// Upper bound for a single fetch, covering connect, send and body decode.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Coordinator refresh period.
pub const UPDATE_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Unit used when a record carries no `unitOfMeasurement`.
pub const DEFAULT_UNIT: &str = "°C";

// ---------------------------------------------------------------------------
// Water bodies
// ---------------------------------------------------------------------------

/// Kind of water body as reported in the `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub enum WaterType {
    River,
    Lake,
    /// Any value the API may introduce later; passed through untouched.
    Other(String),
}

impl WaterType {
    pub fn from_api(raw: &str) -> Self {
        match raw {
            "river" => WaterType::River,
            "lake" => WaterType::Lake,
            other => WaterType::Other(other.to_string()),
        }
    }

    /// The raw API spelling.
    pub fn as_str(&self) -> &str {
        match self {
            WaterType::River => "river",
            WaterType::Lake => "lake",
            WaterType::Other(raw) => raw,
        }
    }

    /// Hungarian label shown in the `type` state attribute.
    pub fn label(&self) -> &str {
        match self {
            WaterType::River => "Folyó",
            WaterType::Lake => "Tó",
            WaterType::Other(raw) => raw,
        }
    }
}

impl fmt::Display for WaterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<WaterType> for String {
    fn from(water_type: WaterType) -> Self {
        water_type.as_str().to_string()
    }
}

/// Structural identity of a water body: the API assigns no ids, so a
/// sensor is bound to the `(nameOfRiver, type)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    pub name: String,
    pub water_type: WaterType,
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.water_type)
    }
}

/// One `lastMeasurement` entry: a measuring location and its raw value,
/// already rendered as display text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LastMeasurement {
    pub location: String,
    pub value: String,
}

/// A validated water body record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaterRecord {
    pub water_type: WaterType,
    pub name: String,
    /// `avgTemp` coerced to a float; `None` when absent or unparseable.
    pub avg_temp: Option<f64>,
    pub unit: String,
    pub last_measurements: Vec<LastMeasurement>,
}

impl WaterRecord {
    pub fn key(&self) -> IdentityKey {
        IdentityKey {
            name: self.name.clone(),
            water_type: self.water_type.clone(),
        }
    }

    pub fn matches(&self, key: &IdentityKey) -> bool {
        self.name == key.name && self.water_type == key.water_type
    }
}

/// Ordered records from one successful fetch. Replaced wholesale on every
/// refresh.
pub type Dataset = Vec<WaterRecord>;

/// First record in `dataset` bound to `key`.
pub fn find_record<'a>(dataset: &'a [WaterRecord], key: &IdentityKey) -> Option<&'a WaterRecord> {
    dataset.iter().find(|record| record.matches(key))
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Transient failure talking to the API. The next coordinator tick (or the
/// host's entry retry) is the only recovery path.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("API returned HTTP {0}")]
    Status(u16),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("response body is not JSON: {0}")]
    Decode(String),
}

/// The payload decoded but does not have the expected shape.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PayloadError {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("payload has no `data` field")]
    MissingData,

    #[error("`data` is not an array")]
    DataNotArray,

    #[error("`data` array is empty")]
    EmptyData,

    #[error("no record in `data` carries `type` and `nameOfRiver`")]
    NoValidRecords,
}

/// Failure of one fetch + validate cycle.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

/// Entry setup failure. The host answers it by scheduling another setup
/// attempt.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("entry not ready: {0}")]
    NotReady(#[from] UpdateError),
}
